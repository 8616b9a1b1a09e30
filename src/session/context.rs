//! The isolated execution context.
//!
//! A dedicated thread hosts the `ScriptRuntime` so non-terminating scripts
//! never stall the control side. Commands arrive on a blocking channel;
//! events leave on an async one, in emission order. Each instance carries a
//! generation number so anything stale can be attributed in logs.

use crate::engine::{RunEmit, RuntimeOptions, ScriptRuntime};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Requests posted into the context. At most one run is outstanding; the
/// controller's single-flight invariant guarantees it, so the context serves
/// commands strictly one at a time and never re-validates.
#[derive(Debug)]
pub(crate) enum ContextCommand {
    Run { script: String },
}

/// Messages from the context back to the controller, FIFO per instance.
#[derive(Debug)]
pub(crate) enum ContextEvent {
    /// Initialization finished; run commands may now be posted.
    Ready,
    /// Initialization failed; the context thread has already exited.
    LoadFailed { error: String },
    Output { line: String },
    UpdateOps { ops: u64 },
    /// The run concluded (completed or threw). Exactly one per run command;
    /// none is guaranteed after a forced termination.
    End,
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ExecutionContext {
    generation: u64,
    halt: Arc<AtomicBool>,
    cmd_tx: std_mpsc::Sender<ContextCommand>,
    events: UnboundedReceiver<ContextEvent>,
}

impl ExecutionContext {
    /// Spawn the context thread. `Ready` or `LoadFailed` arrives on the
    /// event channel once initialization resolves; the caller must not post
    /// a run command before `Ready`.
    pub(crate) fn spawn(options: RuntimeOptions) -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let halt = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let thread_halt = halt.clone();
        std::thread::spawn(move || context_main(options, thread_halt, cmd_rx, event_tx, generation));
        Self {
            generation,
            halt,
            cmd_tx,
            events,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn post(&self, cmd: ContextCommand) -> Result<(), ()> {
        self.cmd_tx.send(cmd).map_err(|_| ())
    }

    pub(crate) async fn recv(&mut self) -> Option<ContextEvent> {
        self.events.recv().await
    }

    /// Hard stop with no grace period. Raises the halt flag (observed by the
    /// engine's progress hook, which aborts the evaluation) and disowns the
    /// context: both channels drop here, so no further event from this
    /// generation can reach the controller and no `End` is waited for.
    pub(crate) fn terminate(self) {
        self.halt.store(true, Ordering::Relaxed);
        tracing::debug!(
            generation = self.generation,
            "execution context terminated"
        );
    }
}

fn context_main(
    options: RuntimeOptions,
    halt: Arc<AtomicBool>,
    cmd_rx: std_mpsc::Receiver<ContextCommand>,
    event_tx: UnboundedSender<ContextEvent>,
    generation: u64,
) {
    let runtime = match ScriptRuntime::new(&options) {
        Ok(r) => r,
        Err(e) => {
            let _ = event_tx.send(ContextEvent::LoadFailed {
                error: e.to_string(),
            });
            return;
        }
    };
    if event_tx.send(ContextEvent::Ready).is_err() {
        return;
    }

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            ContextCommand::Run { script } => {
                let emit_tx = event_tx.clone();
                let emit = move |e: RunEmit| {
                    // Sends fail only when the controller has disowned this
                    // context; late output is dropped on the floor.
                    let _ = match e {
                        RunEmit::Line(line) => emit_tx.send(ContextEvent::Output { line }),
                        RunEmit::Ops(ops) => emit_tx.send(ContextEvent::UpdateOps { ops }),
                    };
                };
                let trailer = match runtime.run(&script, emit, halt.clone()) {
                    Ok(value) => format!("\nScript returned: \"{value}\""),
                    Err(error) => format!("\nEXCEPTION: {error}"),
                };
                let _ = event_tx.send(ContextEvent::Output { line: trailer });
                let _ = event_tx.send(ContextEvent::End);
            }
        }
    }
    tracing::debug!(generation, "execution context thread exiting");
}
