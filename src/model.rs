use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on the retained output buffer, in characters.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    /// Delay between the last edit and the compile-preview pass.
    #[serde(with = "humantime_serde")]
    pub debounce_delay: Duration,
    /// Maximum number of characters retained in the output console.
    pub max_output_chars: usize,
    /// Optional prelude script loaded into the execution context as a
    /// global module. Loading it is fallible and happens at context startup.
    pub prelude: Option<PathBuf>,
    /// Trigger one compile preview immediately after the editor opens.
    pub compile_on_open: bool,
    pub theme: String,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(500),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            prelude: None,
            compile_on_open: true,
            theme: "default".into(),
        }
    }
}

/// Events emitted by the session controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlaygroundEvent {
    /// A run was accepted; prior output should be discarded.
    RunStarted,
    /// A run request was refused because one is already in flight.
    RunRejected { reason: String },
    /// One line produced by the running script (print/debug channels,
    /// banners, the return-value trailer).
    Output { line: String },
    /// Operation-count heartbeat, cadence controlled by the engine.
    OpsUpdate { ops: u64 },
    /// The run resolved; exactly one of these per accepted run.
    RunFinished { outcome: RunOutcome },
    /// Result of a compile preview request.
    Preview { seq: u64, result: PreviewResult },
}

/// How an accepted run resolved. A script that throws still ends in
/// `Completed`; the exception text travels through the output lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    /// Forcibly stopped by the user.
    Stopped,
    /// The execution context failed to initialize. Lazy-load state is reset
    /// so the next run retries from scratch.
    LoadFailed { error: String },
    /// The execution context died without sending `End`.
    ContextLost { error: String },
}

impl RunOutcome {
    /// Render a human-readable status line for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            RunOutcome::Completed => "Run completed".to_string(),
            RunOutcome::Stopped => "Script stopped by user".to_string(),
            RunOutcome::LoadFailed { error } => {
                format!("Execution context failed to load: {error}")
            }
            RunOutcome::ContextLost { error } => {
                format!("Execution context lost: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PreviewResult {
    /// Compiled cleanly; carries the AST dump for the viewer.
    Clean { ast: String },
    Diagnostic(CompileDiagnostic),
}

/// Structured compile error surfaced by the engine boundary. Positions are
/// 1-based when present, matching what the parser reports.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct CompileDiagnostic {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CompileDiagnostic {
    /// Zero-based one-character marker span for the editor, covering exactly
    /// the reported column: `(line-1, column-1)` to `(line-1, column)`.
    /// `None` when either coordinate is missing; such errors are log-only.
    pub fn marker_span(&self) -> Option<((u32, u32), (u32, u32))> {
        match (self.line, self.column) {
            (Some(line), Some(column)) if line > 0 && column > 0 => {
                Some(((line - 1, column - 1), (line - 1, column)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_span_covers_one_char_zero_based() {
        let diag = CompileDiagnostic {
            message: "unexpected token".into(),
            line: Some(3),
            column: Some(5),
        };
        assert_eq!(diag.marker_span(), Some(((2, 4), (2, 5))));
    }

    #[test]
    fn marker_span_requires_both_coordinates() {
        let no_col = CompileDiagnostic {
            message: "eof".into(),
            line: Some(3),
            column: None,
        };
        assert_eq!(no_col.marker_span(), None);
        let no_line = CompileDiagnostic {
            message: "eof".into(),
            line: None,
            column: Some(5),
        };
        assert_eq!(no_line.marker_span(), None);
    }
}
