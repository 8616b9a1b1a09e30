use crate::model::{CompileDiagnostic, PlaygroundConfig, PlaygroundEvent, RunOutcome};
use crate::session::{run_controller, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "rhai-playground",
    version,
    about = "Terminal playground for Rhai scripts with an optional TUI"
)]
pub struct Cli {
    /// Script file to open in the editor (or execute with --text)
    pub script: Option<PathBuf>,

    /// Start from a bundled example script (hello_world, fibonacci, ...)
    #[arg(long)]
    pub example: Option<String>,

    /// Compile only and report diagnostics, then exit (no execution)
    #[arg(long)]
    pub check: bool,

    /// Print the AST of the compiled script and exit
    #[arg(long)]
    pub ast: bool,

    /// Run the script without the TUI, streaming output to stdout
    #[arg(long)]
    pub text: bool,

    /// Delay between the last edit and the compile preview
    #[arg(long, default_value = "500ms")]
    pub debounce: humantime::Duration,

    /// Maximum characters retained in the output console
    #[arg(long, default_value_t = crate::model::DEFAULT_MAX_OUTPUT_CHARS)]
    pub max_output: usize,

    /// Prelude script loaded into the execution context as a global module
    #[arg(long)]
    pub prelude: Option<PathBuf>,

    /// Color theme for the TUI
    #[arg(long, default_value = "default")]
    pub theme: String,

    /// Compile the initial buffer as soon as the editor opens
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub compile_on_open: bool,

    /// Embedding handshake id: announce embed-loaded on stdout and wait for
    /// embed-init on stdin to seed the initial script before first render
    #[arg(long)]
    pub embed: Option<String>,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.check || args.ast {
        return run_compile_only(&args);
    }

    if args.text {
        return run_text(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_text(args).await
    }
}

/// Build a `PlaygroundConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> PlaygroundConfig {
    PlaygroundConfig {
        debounce_delay: Duration::from(args.debounce),
        max_output_chars: args.max_output,
        prelude: args.prelude.clone(),
        compile_on_open: args.compile_on_open,
        theme: args.theme.clone(),
    }
}

/// Resolve the initial script text: embed handshake first, then an explicit
/// file, then a bundled example, then the default snippet.
pub fn resolve_script(args: &Cli) -> Result<String> {
    if let Some(id) = &args.embed {
        return crate::embed::negotiate(id);
    }
    if let Some(path) = &args.script {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()));
    }
    if let Some(name) = &args.example {
        let example = crate::example_scripts::find(name).with_context(|| {
            format!(
                "unknown example '{name}' (available: {})",
                crate::example_scripts::names().join(", ")
            )
        })?;
        return Ok(example.source.to_string());
    }
    Ok(crate::example_scripts::initial_script().to_string())
}

fn diagnostic_error(diag: &CompileDiagnostic) -> anyhow::Error {
    match (diag.line, diag.column) {
        (Some(line), Some(column)) => {
            anyhow::anyhow!("compile error at line {line}, column {column}: {}", diag.message)
        }
        _ => anyhow::anyhow!("compile error: {}", diag.message),
    }
}

fn run_compile_only(args: &Cli) -> Result<()> {
    let script = resolve_script(args)?;
    if args.ast {
        match crate::engine::ast_dump(&script) {
            Ok(dump) => {
                println!("{dump}");
                Ok(())
            }
            Err(diag) => Err(diagnostic_error(&diag)),
        }
    } else {
        match crate::engine::check(&script) {
            Ok(()) => {
                println!("no compile errors");
                Ok(())
            }
            Err(diag) => Err(diagnostic_error(&diag)),
        }
    }
}

/// Headless run: drive the session controller once and stream its output.
/// Ctrl-C maps to a cancel command, same as the TUI stop key.
async fn run_text(args: Cli) -> Result<()> {
    let script = resolve_script(&args)?;
    let config = build_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PlaygroundEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let controller = tokio::spawn(async move { run_controller(&config, event_tx, cmd_rx).await });

    let _ = cmd_tx.send(UiCommand::Run { script });

    let mut failure: Option<String> = None;
    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                match ev {
                    Some(PlaygroundEvent::Output { line }) => {
                        let _ = out_tx.send(OutputLine::Stdout(line));
                    }
                    Some(PlaygroundEvent::OpsUpdate { ops }) => {
                        let _ = out_tx.send(OutputLine::Stderr(format!("ops executed: {ops}")));
                    }
                    Some(PlaygroundEvent::RunFinished { outcome }) => {
                        if !matches!(outcome, RunOutcome::Completed) {
                            failure = Some(outcome.to_message());
                        }
                        break;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = out_tx.send(OutputLine::Stderr("Cancelling…".into()));
                let _ = cmd_tx.send(UiCommand::Cancel);
            }
        }
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    drop(out_tx);
    let _ = out_handle.await;
    controller.await.context("controller task failed")??;

    if let Some(msg) = failure {
        anyhow::bail!(msg);
    }
    Ok(())
}
