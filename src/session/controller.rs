//! Run-session lifecycle controller.
//!
//! Owns single-flight enforcement and the execution-context state machine,
//! and relays output/progress events to presentation layers. All session
//! state lives as fields of one controller value; every state transition is
//! a method on it.

use crate::engine;
use crate::engine::RuntimeOptions;
use crate::model::{PlaygroundConfig, PlaygroundEvent, PreviewResult, RunOutcome};
use crate::session::context::{ContextCommand, ContextEvent, ExecutionContext};
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Start a run. Rejected, not queued, while another run is in flight.
    Run { script: String },
    /// Forcibly stop the in-flight run. No-op when idle.
    Cancel,
    /// Compile-only pass for diagnostics and the AST view. `seq` lets the
    /// UI drop superseded results.
    Preview { seq: u64, script: String },
    Quit,
}

/// Execution-context slot. Loading/Ready/Busy hold the live context; the
/// slot returns to `Unloaded` whenever one is terminated or lost, so the
/// next run loads from scratch.
enum ContextSlot {
    Unloaded,
    /// Waiting for `Ready`; `queued` holds the script that triggered the load.
    Loading {
        ctx: ExecutionContext,
        queued: Option<String>,
    },
    Ready {
        ctx: ExecutionContext,
    },
    Busy {
        ctx: ExecutionContext,
    },
}

struct SessionController {
    options: RuntimeOptions,
    slot: ContextSlot,
    running: bool,
    event_tx: UnboundedSender<PlaygroundEvent>,
}

/// Drive the session based on UI commands and relay events back to
/// presentation layers. Returns when `Quit` arrives or the command channel
/// closes.
pub(crate) async fn run_controller(
    config: &PlaygroundConfig,
    event_tx: UnboundedSender<PlaygroundEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut ctl = SessionController::new(config, event_tx);
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Run { script }) => ctl.handle_run(script),
                    Some(UiCommand::Cancel) => ctl.handle_cancel(),
                    Some(UiCommand::Preview { seq, script }) => ctl.handle_preview(seq, script).await,
                    Some(UiCommand::Quit) | None => {
                        ctl.shutdown();
                        break;
                    }
                }
            }
            ev = ctl.next_context_event() => {
                ctl.on_context_event(ev);
            }
        }
    }
    Ok(())
}

impl SessionController {
    fn new(config: &PlaygroundConfig, event_tx: UnboundedSender<PlaygroundEvent>) -> Self {
        Self {
            options: RuntimeOptions {
                prelude: config.prelude.clone(),
            },
            slot: ContextSlot::Unloaded,
            running: false,
            event_tx,
        }
    }

    /// Resolve the next event from the current context, or park forever when
    /// none is loaded. Stale messages cannot arrive here: a terminated
    /// context takes its event channel with it.
    async fn next_context_event(&mut self) -> Option<ContextEvent> {
        match &mut self.slot {
            ContextSlot::Loading { ctx, .. }
            | ContextSlot::Ready { ctx }
            | ContextSlot::Busy { ctx } => ctx.recv().await,
            ContextSlot::Unloaded => futures::future::pending().await,
        }
    }

    fn handle_run(&mut self, script: String) {
        if self.running {
            tracing::warn!("run request rejected: another script is already running");
            self.emit(PlaygroundEvent::RunRejected {
                reason: "another script is already running".into(),
            });
            return;
        }
        if matches!(
            self.slot,
            ContextSlot::Loading { .. } | ContextSlot::Busy { .. }
        ) {
            // Single-flight should make this unreachable; log and refuse
            // rather than double-book the context.
            tracing::error!("run requested while the execution context is occupied");
            self.emit(PlaygroundEvent::RunRejected {
                reason: "execution context is busy".into(),
            });
            return;
        }

        self.running = true;
        self.emit(PlaygroundEvent::RunStarted);
        self.emit_output(format!("Running script at {}\n", now_rfc3339()));

        match std::mem::replace(&mut self.slot, ContextSlot::Unloaded) {
            ContextSlot::Unloaded => {
                let ctx = ExecutionContext::spawn(self.options.clone());
                tracing::debug!(generation = ctx.generation(), "loading execution context");
                self.slot = ContextSlot::Loading {
                    ctx,
                    queued: Some(script),
                };
            }
            ContextSlot::Ready { ctx } => self.post_run(ctx, script),
            occupied => self.slot = occupied,
        }
    }

    /// Post the run command to a ready context. The context only moves to
    /// `Busy` when the post succeeds; an unreachable context counts as lost.
    fn post_run(&mut self, ctx: ExecutionContext, script: String) {
        if ctx.post(ContextCommand::Run { script }).is_err() {
            tracing::error!(
                generation = ctx.generation(),
                "execution context unreachable; discarding it"
            );
            ctx.terminate();
            self.slot = ContextSlot::Unloaded;
            self.finish(RunOutcome::ContextLost {
                error: "execution context is unreachable".into(),
            });
            return;
        }
        self.slot = ContextSlot::Busy { ctx };
    }

    fn handle_cancel(&mut self) {
        if !self.running {
            tracing::debug!("cancel ignored: no script is running");
            return;
        }
        // Hard stop: terminate the context outright and treat the
        // termination itself as completion. `End` is not waited for.
        match std::mem::replace(&mut self.slot, ContextSlot::Unloaded) {
            ContextSlot::Loading { ctx, .. }
            | ContextSlot::Ready { ctx }
            | ContextSlot::Busy { ctx } => ctx.terminate(),
            ContextSlot::Unloaded => {}
        }
        self.emit_output(format!("\nStopped at {}", now_rfc3339()));
        self.finish(RunOutcome::Stopped);
    }

    async fn handle_preview(&mut self, seq: u64, script: String) {
        // Compile on a blocking thread; the engine is not Send, so the pass
        // builds its own thread-local engine over there.
        let result = tokio::task::spawn_blocking(move || match engine::ast_dump(&script) {
            Ok(ast) => PreviewResult::Clean { ast },
            Err(diag) => PreviewResult::Diagnostic(diag),
        })
        .await;
        match result {
            Ok(result) => self.emit(PlaygroundEvent::Preview { seq, result }),
            Err(e) => tracing::error!("compile preview task failed: {e}"),
        }
    }

    fn on_context_event(&mut self, ev: Option<ContextEvent>) {
        match ev {
            Some(ContextEvent::Ready) => {
                match std::mem::replace(&mut self.slot, ContextSlot::Unloaded) {
                    ContextSlot::Loading { ctx, queued } => {
                        tracing::debug!(generation = ctx.generation(), "execution context ready");
                        match queued {
                            Some(script) => self.post_run(ctx, script),
                            None => self.slot = ContextSlot::Ready { ctx },
                        }
                    }
                    other => {
                        tracing::warn!("unexpected Ready from execution context");
                        self.slot = other;
                    }
                }
            }
            Some(ContextEvent::LoadFailed { error }) => {
                tracing::warn!(%error, "execution context failed to load");
                // Reset all lazy-load state; the next run retries from scratch.
                self.slot = ContextSlot::Unloaded;
                self.emit_output(format!("\nFailed to load the execution context: {error}"));
                if self.running {
                    self.finish(RunOutcome::LoadFailed { error });
                }
            }
            Some(ContextEvent::Output { line }) => {
                if self.running {
                    self.emit(PlaygroundEvent::Output { line });
                } else {
                    tracing::debug!("dropping output with no active session");
                }
            }
            Some(ContextEvent::UpdateOps { ops }) => {
                if self.running {
                    self.emit(PlaygroundEvent::OpsUpdate { ops });
                } else {
                    tracing::debug!("dropping ops heartbeat with no active session");
                }
            }
            Some(ContextEvent::End) => {
                match std::mem::replace(&mut self.slot, ContextSlot::Unloaded) {
                    ContextSlot::Busy { ctx } => {
                        // The context survives the run and is reused next time.
                        self.slot = ContextSlot::Ready { ctx };
                        self.emit_output(format!("Finished at {}", now_rfc3339()));
                        self.finish(RunOutcome::Completed);
                    }
                    other => {
                        tracing::warn!("unexpected End from execution context");
                        self.slot = other;
                    }
                }
            }
            None => {
                tracing::error!("execution context channel closed unexpectedly");
                self.slot = ContextSlot::Unloaded;
                if self.running {
                    self.finish(RunOutcome::ContextLost {
                        error: "execution context terminated unexpectedly".into(),
                    });
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if self.running {
            self.finish(RunOutcome::Stopped);
        }
        match std::mem::replace(&mut self.slot, ContextSlot::Unloaded) {
            ContextSlot::Loading { ctx, .. }
            | ContextSlot::Ready { ctx }
            | ContextSlot::Busy { ctx } => ctx.terminate(),
            ContextSlot::Unloaded => {}
        }
    }

    /// Resolve the session exactly once. Every exit path funnels through
    /// here so `running` can never be left stuck.
    fn finish(&mut self, outcome: RunOutcome) {
        self.running = false;
        self.emit(PlaygroundEvent::RunFinished { outcome });
    }

    fn emit(&self, event: PlaygroundEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_output(&self, line: String) {
        self.emit(PlaygroundEvent::Output { line });
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlaygroundConfig;
    use std::io::Write as _;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        cmd_tx: UnboundedSender<UiCommand>,
        events: UnboundedReceiver<PlaygroundEvent>,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    fn spawn_controller(config: PlaygroundConfig) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move { run_controller(&config, event_tx, cmd_rx).await });
        Harness {
            cmd_tx,
            events,
            task,
        }
    }

    impl Harness {
        fn send(&self, cmd: UiCommand) {
            self.cmd_tx.send(cmd).unwrap();
        }

        fn run(&self, script: &str) {
            self.send(UiCommand::Run {
                script: script.into(),
            });
        }

        async fn next_event(&mut self) -> PlaygroundEvent {
            tokio::time::timeout(Duration::from_secs(10), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed")
        }

        /// Skip events until one matches the predicate.
        async fn wait_for(
            &mut self,
            mut pred: impl FnMut(&PlaygroundEvent) -> bool,
        ) -> PlaygroundEvent {
            loop {
                let ev = self.next_event().await;
                if pred(&ev) {
                    return ev;
                }
            }
        }

        /// Collect output lines until the run resolves.
        async fn finish_run(&mut self) -> (Vec<String>, RunOutcome) {
            let mut lines = Vec::new();
            loop {
                match self.next_event().await {
                    PlaygroundEvent::Output { line } => lines.push(line),
                    PlaygroundEvent::RunFinished { outcome } => return (lines, outcome),
                    _ => {}
                }
            }
        }

        async fn quit(self) {
            self.send(UiCommand::Quit);
            tokio::time::timeout(Duration::from_secs(10), self.task)
                .await
                .expect("controller did not shut down")
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn run_streams_output_and_completes() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.run(r#"print("hello"); 10"#);
        assert!(matches!(
            h.next_event().await,
            PlaygroundEvent::RunStarted
        ));
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert!(lines[0].starts_with("Running script at "));
        assert!(lines.iter().any(|l| l == "[PRINT] hello"));
        assert!(lines.iter().any(|l| l.contains(r#"Script returned: "10""#)));
        assert!(lines.last().unwrap().starts_with("Finished at "));
        h.quit().await;
    }

    #[tokio::test]
    async fn exceptions_are_reported_in_output_not_as_failures() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.run("undefined_fn()");
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert!(lines.iter().any(|l| l.contains("EXCEPTION:")));
        h.quit().await;
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_running() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.run("loop { }");
        h.wait_for(|ev| matches!(ev, PlaygroundEvent::RunStarted))
            .await;
        h.run("1 + 1");
        h.wait_for(|ev| matches!(ev, PlaygroundEvent::RunRejected { .. }))
            .await;
        // The in-flight session is untouched: cancel it and run again.
        h.send(UiCommand::Cancel);
        let ev = h
            .wait_for(|ev| matches!(ev, PlaygroundEvent::RunFinished { .. }))
            .await;
        assert!(matches!(
            ev,
            PlaygroundEvent::RunFinished {
                outcome: RunOutcome::Stopped
            }
        ));
        h.run(r#"print("again"); 1"#);
        h.wait_for(|ev| matches!(ev, PlaygroundEvent::RunStarted))
            .await;
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert!(lines.iter().any(|l| l == "[PRINT] again"));
        h.quit().await;
    }

    #[tokio::test]
    async fn cancel_on_idle_controller_is_a_noop() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.send(UiCommand::Cancel);
        // The next observable event must be the RunStarted of a fresh run,
        // not a RunFinished produced by the stray cancel.
        h.run("2 + 2");
        assert!(matches!(
            h.next_event().await,
            PlaygroundEvent::RunStarted
        ));
        let (_, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        h.quit().await;
    }

    #[tokio::test]
    async fn cancel_stops_a_nonterminating_script() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.run("loop { }");
        h.wait_for(|ev| matches!(ev, PlaygroundEvent::RunStarted))
            .await;
        h.send(UiCommand::Cancel);
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Stopped));
        assert!(lines.iter().any(|l| l.contains("Stopped at ")));
        // No output may surface after the cancellation is acknowledged.
        let late = tokio::time::timeout(Duration::from_millis(200), h.events.recv()).await;
        assert!(late.is_err(), "unexpected event after cancel: {late:?}");
        h.quit().await;
    }

    #[tokio::test]
    async fn context_is_reused_across_runs() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        for (script, expected) in [("1 + 2", "3"), ("2 * 2", "4")] {
            h.run(script);
            let (lines, outcome) = h.finish_run().await;
            assert!(matches!(outcome, RunOutcome::Completed));
            let wanted = format!("Script returned: \"{expected}\"");
            assert!(lines.iter().any(|l| l.contains(&wanted)));
        }
        h.quit().await;
    }

    #[tokio::test]
    async fn load_failure_rejects_and_a_later_run_loads_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let prelude = dir.path().join("prelude.rhai");
        let config = PlaygroundConfig {
            prelude: Some(prelude.clone()),
            ..Default::default()
        };
        let mut h = spawn_controller(config);

        h.run("triple(2)");
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::LoadFailed { .. }));
        assert!(lines
            .iter()
            .any(|l| l.contains("Failed to load the execution context")));

        // Repairing the prelude is picked up by the next run: the failed
        // load left no cached state behind.
        let mut file = std::fs::File::create(&prelude).unwrap();
        writeln!(file, "fn triple(x) {{ x * 3 }}").unwrap();
        h.run("triple(2)");
        let (lines, outcome) = h.finish_run().await;
        assert!(matches!(outcome, RunOutcome::Completed));
        assert!(lines.iter().any(|l| l.contains(r#"Script returned: "6""#)));
        h.quit().await;
    }

    #[tokio::test]
    async fn preview_reports_diagnostics_and_ast() {
        let mut h = spawn_controller(PlaygroundConfig::default());
        h.send(UiCommand::Preview {
            seq: 7,
            script: "fn broken( {".into(),
        });
        let ev = h
            .wait_for(|ev| matches!(ev, PlaygroundEvent::Preview { .. }))
            .await;
        match ev {
            PlaygroundEvent::Preview {
                seq,
                result: PreviewResult::Diagnostic(diag),
            } => {
                assert_eq!(seq, 7);
                assert_eq!(diag.line, Some(1));
                assert!(diag.column.is_some());
            }
            other => panic!("expected diagnostic preview, got {other:?}"),
        }

        h.send(UiCommand::Preview {
            seq: 8,
            script: "let x = 1; x + 1".into(),
        });
        let ev = h
            .wait_for(|ev| matches!(ev, PlaygroundEvent::Preview { .. }))
            .await;
        match ev {
            PlaygroundEvent::Preview {
                seq,
                result: PreviewResult::Clean { ast },
            } => {
                assert_eq!(seq, 8);
                assert!(ast.contains("// Statements:"));
            }
            other => panic!("expected clean preview, got {other:?}"),
        }
        h.quit().await;
    }
}
