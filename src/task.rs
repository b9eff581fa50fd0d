//! Background analysis tasks.
//!
//! A task is created on upload (`pending`), flipped to `processing` when a
//! run is started, and ends `completed` or `failed`. Runs execute on the
//! tokio runtime; callers poll [`TaskCoordinator::status`].
//!
//! ## Progress checkpoints
//!
//! | progress | stage |
//! |---|---|
//! | 0 | uploaded |
//! | 10 | analysis started |
//! | 10–59 | per-page analysis |
//! | 60 | generating article / note |
//! | 80 | rendering note image |
//! | 100 | completed |
//!
//! Progress never decreases within a run.
//!
//! ## Store
//!
//! Tasks live behind the [`TaskStore`] trait. [`MemoryTaskStore`] keeps them
//! in a `DashMap`: writers see their own writes immediately, pollers see the
//! latest whole-field overwrite. Nothing survives a restart.

use crate::analyze::{check, AnalysisOptions, PaperAnalysisPipeline};
use crate::config::{AppConfig, Artifact};
use crate::content::ContentGenerator;
use crate::error::{PaperError, TaskError};
use crate::extract::PdfExtractor;
use crate::gateway::ModelGateway;
use crate::note::NoteRenderer;
use crate::output::{save_analysis, TaskResult};
use crate::progress::{ProgressSink, Stage};
use crate::prompts::Language;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        })
    }
}

/// One analysis job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<TaskResult>,
}

impl Task {
    fn new(task_id: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            progress: 0,
            message: "uploaded".to_string(),
            result: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lang() -> String {
    "zh".to_string()
}

/// What a run should produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    #[serde(default = "default_true")]
    pub translate: bool,
    #[serde(default = "default_lang")]
    pub target_lang: String,
    #[serde(default = "default_true")]
    pub generate_article: bool,
    #[serde(default = "default_true")]
    pub generate_note: bool,
    #[serde(default = "default_true")]
    pub generate_image: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            translate: true,
            target_lang: default_lang(),
            generate_article: true,
            generate_note: true,
            generate_image: true,
        }
    }
}

/// Storage for task records.
///
/// `update` runs the closure while holding the entry, so a check-and-set
/// inside one call is atomic with respect to other updates of that task.
pub trait TaskStore: Send + Sync {
    fn insert(&self, task: Task);
    fn get(&self, task_id: &str) -> Option<Task>;
    /// Returns `false` when the task does not exist.
    fn update(&self, task_id: &str, f: &mut dyn FnMut(&mut Task)) -> bool;
}

/// In-process task store.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<String, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, task: Task) {
        self.tasks.insert(task.task_id.clone(), task);
    }

    fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.value().clone())
    }

    fn update(&self, task_id: &str, f: &mut dyn FnMut(&mut Task)) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }
}

/// Owns task bookkeeping and runs analyses in the background.
pub struct TaskCoordinator {
    config: Arc<AppConfig>,
    store: Arc<dyn TaskStore>,
    extractor: Arc<dyn PdfExtractor>,
    pipeline: PaperAnalysisPipeline,
    renderer: NoteRenderer,
    running: DashMap<String, CancellationToken>,
}

impl TaskCoordinator {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn PdfExtractor>,
        gateway: Arc<dyn ModelGateway>,
        renderer: NoteRenderer,
    ) -> Self {
        Self {
            pipeline: PaperAnalysisPipeline::new(extractor.clone(), gateway),
            config,
            store,
            extractor,
            renderer,
            running: DashMap::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn extractor(&self) -> &Arc<dyn PdfExtractor> {
        &self.extractor
    }

    /// Fresh task id.
    pub fn new_task_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Register a new pending task.
    pub fn create(&self) -> String {
        self.create_with_id(Self::new_task_id())
    }

    /// Register a pending task under an id the caller already used, for
    /// example as the upload file name.
    pub fn create_with_id(&self, task_id: String) -> String {
        self.store.insert(Task::new(task_id.clone()));
        info!(task_id = %task_id, "Task created");
        task_id
    }

    pub fn status(&self, task_id: &str) -> Result<Task, TaskError> {
        self.store
            .get(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// The result of a completed task.
    pub fn result(&self, task_id: &str) -> Result<TaskResult, TaskError> {
        let task = self.status(task_id)?;
        match (task.status, task.result) {
            (TaskStatus::Completed, Some(result)) => Ok(result),
            (status, _) => Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Start a background run for a pending task.
    ///
    /// The task is `processing` by the time this returns.
    pub fn start(
        self: &Arc<Self>,
        task_id: &str,
        pdf_path: PathBuf,
        options: TaskOptions,
    ) -> Result<(), TaskError> {
        let mut claimed = false;
        let mut seen = TaskStatus::Pending;
        let exists = self.store.update(task_id, &mut |t| {
            seen = t.status;
            if t.status == TaskStatus::Pending {
                t.status = TaskStatus::Processing;
                t.message = "queued".to_string();
                claimed = true;
            }
        });
        if !exists {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        if !claimed {
            warn!(task_id, status = %seen, "Refusing to start task twice");
            return Err(TaskError::AlreadyRunning(task_id.to_string()));
        }

        let cancel = CancellationToken::new();
        self.running.insert(task_id.to_string(), cancel.clone());

        let this = Arc::clone(self);
        let id = task_id.to_string();
        tokio::spawn(async move {
            // A panicking run still has to end `failed` and release its token.
            let outcome = AssertUnwindSafe(this.execute(&id, &pdf_path, &options, &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(PaperError::Internal(panic_message(&*panic))));
            this.finish(&id, outcome);
            this.running.remove(&id);
        });
        Ok(())
    }

    /// Fire the cancellation token of a running task.
    pub fn cancel(&self, task_id: &str) -> Result<(), TaskError> {
        let task = self.status(task_id)?;
        match self.running.get(task_id) {
            Some(token) => {
                info!(task_id, "Cancelling task");
                token.cancel();
                Ok(())
            }
            None => Err(TaskError::NotRunning {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
            }),
        }
    }

    fn set_progress(&self, task_id: &str, progress: u8, message: &str) {
        self.store.update(task_id, &mut |t| {
            t.progress = t.progress.max(progress.min(100));
            t.message = message.to_string();
        });
    }

    fn finish(&self, task_id: &str, outcome: Result<TaskResult, PaperError>) {
        let mut outcome = Some(outcome);
        self.store.update(task_id, &mut |t| match outcome.take() {
            Some(Ok(result)) => {
                t.status = TaskStatus::Completed;
                t.progress = 100;
                t.message = "completed".to_string();
                t.result = Some(result);
            }
            Some(Err(PaperError::Cancelled)) => {
                t.status = TaskStatus::Failed;
                t.message = "cancelled".to_string();
                t.result = None;
            }
            Some(Err(e)) => {
                t.status = TaskStatus::Failed;
                t.message = format!("processing failed: {e}");
                t.result = None;
            }
            None => {}
        });

        if let Some(task) = self.store.get(task_id) {
            match task.status {
                TaskStatus::Completed => info!(task_id, "Task completed"),
                _ => error!(task_id, message = %task.message, "Task failed"),
            }
        }
    }

    async fn execute(
        &self,
        task_id: &str,
        pdf_path: &Path,
        options: &TaskOptions,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, PaperError> {
        let mut written = Vec::new();
        let outcome = self
            .produce(task_id, pdf_path, options, cancel, &mut written)
            .await;
        if outcome.is_err() {
            for path in &written {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!("Failed to remove partial artifact {}: {}", path.display(), e);
                }
            }
        }
        outcome
    }

    async fn produce(
        &self,
        task_id: &str,
        pdf_path: &Path,
        options: &TaskOptions,
        cancel: &CancellationToken,
        written: &mut Vec<PathBuf>,
    ) -> Result<TaskResult, PaperError> {
        let language = Language::from_code(&options.target_lang);

        self.set_progress(task_id, 10, "analysing paper");
        let sink = TaskProgress {
            coordinator: self,
            task_id,
        };
        let analysis = self
            .pipeline
            .run(
                pdf_path,
                &AnalysisOptions {
                    translate: options.translate,
                    language,
                    page_image_dir: self.config.page_image_dir(task_id),
                },
                &sink,
                cancel,
            )
            .await?;

        self.set_progress(task_id, 60, "generating content");
        let analysis_path = self.config.artifact_path(task_id, Artifact::Analysis);
        check(cancel)?;
        save_analysis(&analysis, &analysis_path).await?;
        written.push(analysis_path);

        let generator = ContentGenerator::new(self.pipeline.gateway().clone(), language);
        let mut result = TaskResult {
            analysis,
            ..Default::default()
        };

        if options.generate_article {
            check(cancel)?;
            let article = generator.article(&result.analysis).await;
            let path = self.config.artifact_path(task_id, Artifact::Article);
            check(cancel)?;
            write_artifact(&path, &article).await?;
            written.push(path.clone());
            result.article = Some(article);
            result.article_path = Some(path);
        }

        if options.generate_note {
            check(cancel)?;
            let note = generator.note_text(&result.analysis).await;
            let path = self.config.artifact_path(task_id, Artifact::Note);
            check(cancel)?;
            write_artifact(&path, &note).await?;
            written.push(path.clone());
            result.note = Some(note);
            result.note_path = Some(path);
        }

        if options.generate_image {
            self.set_progress(task_id, 80, "generating image");
            check(cancel)?;
            let structured = generator.note_structured(&result.analysis).await;
            let path = self.config.artifact_path(task_id, Artifact::NoteImage);
            check(cancel)?;
            let path = self.renderer.render(&structured, &path).await?;
            written.push(path.clone());
            result.image_path = Some(path);
        }

        Ok(result)
    }
}

async fn write_artifact(path: &Path, contents: &str) -> Result<(), PaperError> {
    let write_err = |source| PaperError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, contents).await.map_err(write_err)
}

/// Maps pipeline events onto task progress.
struct TaskProgress<'a> {
    coordinator: &'a TaskCoordinator,
    task_id: &'a str,
}

impl TaskProgress<'_> {
    fn page(&self, page_num: usize, total_pages: usize) {
        let span = 50 * page_num / total_pages.max(1);
        let progress = (10 + span).min(59) as u8;
        self.coordinator.set_progress(
            self.task_id,
            progress,
            &format!("analysing page {page_num}/{total_pages}"),
        );
    }
}

impl ProgressSink for TaskProgress<'_> {
    fn on_stage(&self, stage: Stage) {
        self.coordinator.set_progress(self.task_id, 10, stage.label());
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize) {
        self.page(page_num, total_pages);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, _error: &str) {
        self.page(page_num, total_pages);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("run panicked: {detail}")
}
