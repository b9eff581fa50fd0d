//! Jinja templates for the note image, rendered with minijinja.
//!
//! Templates are read at render time so a custom layout needs no rebuild.
//! Names ending in `.html` or `.htm` are autoescaped; anything else renders
//! values verbatim. Unknown variables render as the empty string.

use crate::error::RenderError;
use crate::output::StructuredNote;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;

/// Built-in note layout.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/note.html");

/// Name the built-in layout is registered under.
pub const DEFAULT_TEMPLATE_NAME: &str = "note.html";

/// Render `source` with `context`; `name` picks the escaping mode.
pub fn render<S: Serialize>(name: &str, source: &str, context: S) -> Result<String, RenderError> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|name| {
        if name.ends_with(".html") || name.ends_with(".htm") {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });
    let syntax = |e: minijinja::Error| RenderError::TemplateSyntax {
        name: name.to_string(),
        source: e,
    };
    env.add_template(name, source).map_err(syntax)?;
    env.get_template(name)
        .and_then(|t| t.render(context))
        .map_err(syntax)
}

/// Template variables for a structured note.
#[derive(Debug, Serialize)]
pub struct NoteContext<'a> {
    pub title: &'a str,
    pub hook: &'a str,
    pub key_points: &'a [String],
    pub highlight: &'a str,
    pub conclusion: &'a str,
    pub width: u32,
    pub height: u32,
}

impl<'a> NoteContext<'a> {
    /// `default_title` stands in for a blank note title.
    pub fn new(note: &'a StructuredNote, default_title: &'a str, width: u32, height: u32) -> Self {
        let title = if note.title.trim().is_empty() {
            default_title
        } else {
            note.title.as_str()
        };
        Self {
            title,
            hook: &note.hook,
            key_points: &note.key_points,
            highlight: &note.highlight,
            conclusion: &note.conclusion,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn html_names_are_escaped() {
        let ctx = HashMap::from([("name", "<i>R&D")]);
        assert_eq!(
            render("t.html", "a {{ name }} {{ other }}", &ctx).unwrap(),
            "a &lt;i&gt;R&amp;D "
        );
        assert_eq!(render("t.txt", "{{name}}", &ctx).unwrap(), "<i>R&D");
    }

    #[test]
    fn note_context_defaults_title() {
        let note = StructuredNote {
            hook: "<script>".into(),
            key_points: vec!["a < b".into(), "c".into()],
            ..Default::default()
        };
        let ctx = NoteContext::new(&note, "📚 Paper digest", 1080, 1920);
        assert_eq!(ctx.title, "📚 Paper digest");
        assert_eq!(ctx.key_points.len(), 2);

        let html = render(
            DEFAULT_TEMPLATE_NAME,
            "{% for p in key_points %}<li>{{ p }}</li>{% endfor %}|{{ hook }}",
            &ctx,
        )
        .unwrap();
        assert_eq!(html, "<li>a &lt; b</li><li>c</li>|&lt;script&gt;");
    }

    #[test]
    fn broken_template_is_reported() {
        let err = render("bad.html", "{% for p in %}", ()).unwrap_err();
        assert!(matches!(err, RenderError::TemplateSyntax { .. }));
        assert!(err.to_string().contains("bad.html"));
    }

    #[test]
    fn default_template_renders_every_field() {
        let note = StructuredNote {
            title: "Attention".into(),
            hook: "hook text".into(),
            key_points: vec!["first point".into(), "second point".into()],
            highlight: "highlight text".into(),
            conclusion: "conclusion text".into(),
        };
        let html = render(
            DEFAULT_TEMPLATE_NAME,
            DEFAULT_TEMPLATE,
            NoteContext::new(&note, "", 1080, 1920),
        )
        .unwrap();
        for needle in [
            "<h1>Attention</h1>",
            "hook text",
            "<li>first point</li>",
            "<li>second point</li>",
            "highlight text",
            "conclusion text",
            "width: 1080px",
            "height: 1920px",
        ] {
            assert!(html.contains(needle), "missing {needle}");
        }
        assert!(!html.contains("{{") && !html.contains("{%"));
    }
}
