//! Error types for the paperlens library.
//!
//! Failure handling is layered, and each layer gets its own type:
//!
//! * [`PaperError`]: **Fatal** for a whole task: the document cannot be read
//!   at all, an output file cannot be written, or the configuration is
//!   invalid. The task coordinator turns these into `failed` task states.
//!
//! * [`ModelError`]: a single provider call failed. The gateway never
//!   swallows these; every call site decides whether to degrade to an inline
//!   diagnostic string or a default record.
//!
//! * [`RenderError`]: the note image could not be produced by either
//!   screenshot backend.
//!
//! * [`TaskError`]: lookups against the task store (unknown id, task not in
//!   the right state).
//!
//! PDF extraction has no error type on purpose: every extractor method
//! degrades to an empty value and logs.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort an analysis task.
#[derive(Debug, Error)]
pub enum PaperError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The PDF has zero readable pages.
    #[error("Unable to read the PDF or the file is empty: '{path}'")]
    UnreadableDocument { path: PathBuf },

    /// The task was cancelled through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    // ── Rendering ─────────────────────────────────────────────────────────
    /// Note image rendering failed on every backend.
    #[error(transparent)]
    Render(#[from] RenderError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected provider has no API key.
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to a hosted model provider.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Provider answered with a non-success status.
    #[error("{provider} API error (HTTP {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Request never reached the provider or the connection dropped.
    #[error("{provider} request failed: {detail}")]
    Transport { provider: String, detail: String },

    /// A provider client library reported a failure (edgequake-llm `LlmError`).
    #[error("{provider} provider error: {detail}")]
    Provider { provider: String, detail: String },

    /// Response body did not have the expected shape.
    #[error("{provider} returned an unreadable response: {detail}")]
    Parse { provider: String, detail: String },

    /// An image attachment could not be read from disk.
    #[error("Failed to read image '{path}': {detail}")]
    Image { path: PathBuf, detail: String },
}

/// Note image rendering failure.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A custom template was supplied but could not be read.
    #[error("Failed to read template '{path}': {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template failed to parse or render.
    #[error("Failed to render template '{name}': {source}")]
    TemplateSyntax {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// A single backend failed.
    #[error("{backend}: {detail}")]
    Backend { backend: &'static str, detail: String },

    /// Both the primary and the secondary backend failed.
    #[error("Image generation failed: {primary}; {secondary}")]
    AllBackendsFailed { primary: String, secondary: String },

    /// Output directory could not be created.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Task store lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The task exists but has not reached the state the caller needs.
    #[error("Task {task_id} is {status}, not completed")]
    InvalidState { task_id: String, status: String },

    /// A run was already started for this task.
    #[error("Task {0} has already been started")]
    AlreadyRunning(String),

    /// Cancellation was requested for a task with no live run.
    #[error("Task {task_id} is {status}, not running")]
    NotRunning { task_id: String, status: String },
}
