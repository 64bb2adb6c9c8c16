//! Event and error rendering for sinks, plus tracing bootstrap.

use std::io::IsTerminal;

use crate::channels::errors::{ErrorEvent, ErrorScope};
use crate::event_bus::Event;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta
pub const RESET_COLOR: &str = "\x1b[0m";

/// Controls whether ANSI color codes are included in formatted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability (checks `stderr.is_terminal()`).
    #[default]
    Auto,
    /// Always include ANSI color codes.
    Colored,
    /// Never include ANSI color codes (logs, files).
    Plain,
}

impl FormatterMode {
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for a telemetry item.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender>;
}

/// Plain text formatter with optional ANSI color.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainFormatter {
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.mode.is_colored() {
            format!("{color}{text}{RESET_COLOR}")
        } else {
            text.to_string()
        }
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let tag = self.paint(CONTEXT_COLOR, event.type_tag());
        EventRender {
            context: Some(event.type_tag().to_string()),
            lines: vec![format!("{tag} {event}\n")],
        }
    }

    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender> {
        errors
            .iter()
            .map(|event| {
                let scope = match &event.scope {
                    ErrorScope::Node { kind, step } => format!("node {kind}@{step}"),
                    ErrorScope::Scheduler { step } => format!("scheduler@{step}"),
                    ErrorScope::Runner { session, step } => {
                        format!("runner {session}@{step}")
                    }
                    ErrorScope::App => "app".to_string(),
                };
                let mut lines = vec![format!(
                    "{} {}\n",
                    self.paint(LINE_COLOR, &scope),
                    event.error.message
                )];
                let mut cause = event.error.cause.as_deref();
                while let Some(inner) = cause {
                    lines.push(format!("  caused by: {}\n", inner.message));
                    cause = inner.cause.as_deref();
                }
                EventRender {
                    context: Some(scope),
                    lines,
                }
            })
            .collect()
    }
}

/// Render error events as human-readable text without color.
pub fn pretty_print(events: &[ErrorEvent]) -> String {
    let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
    let renders = formatter.render_errors(events);
    let mut out = String::new();
    for (idx, render) in renders.into_iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        for line in render.lines {
            out.push_str(&line);
        }
    }
    out
}

/// Install a `tracing` subscriber honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
pub fn init() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::errors::ErrorChain;

    #[test]
    fn pretty_print_includes_cause_chain() {
        let event = ErrorEvent::node(
            "explorer",
            2,
            ErrorChain::msg("search failed").with_cause(ErrorChain::msg("connection reset")),
        );
        let text = pretty_print(&[event]);
        assert!(text.contains("node explorer@2"));
        assert!(text.contains("caused by: connection reset"));
    }
}
