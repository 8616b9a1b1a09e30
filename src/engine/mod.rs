//! Boundary to the Rhai engine.
//!
//! Everything the rest of the crate knows about Rhai lives here: a
//! compile-only pass for diagnostics, an AST dump for the viewer, and the
//! run entry point with print/debug/progress plumbing. The engine is not
//! `Send`, so a `ScriptRuntime` is built and used on one thread only; the
//! compile-only engine is thread-local for the same reason.

mod diagnostics;
mod progress;

use crate::model::CompileDiagnostic;
use rhai::{Dynamic, Engine, Module, OptimizationLevel, Scope, Shared, AST};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to read prelude {path}: {source}")]
    PreludeIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("prelude failed to compile: {0}")]
    PreludeCompile(CompileDiagnostic),
    #[error("prelude failed to evaluate: {0}")]
    PreludeEval(String),
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub prelude: Option<PathBuf>,
}

/// One value emitted during a script run.
#[derive(Debug, Clone)]
pub enum RunEmit {
    /// A finished output line (print/debug channels).
    Line(String),
    /// Operation-count heartbeat.
    Ops(u64),
}

thread_local! {
    // Dedicated engine for compile-only passes. Optimization is disabled so
    // the dump reflects the statements as written.
    static CHECK_ENGINE: Engine = {
        let mut engine = Engine::new();
        engine.set_optimization_level(OptimizationLevel::None);
        engine.disable_symbol("eval");
        engine
    };
}

/// Compile without executing; surfaces the parser's structured error.
pub fn check(script: &str) -> Result<(), CompileDiagnostic> {
    CHECK_ENGINE.with(|engine| {
        engine
            .compile(script)
            .map(|_| ())
            .map_err(diagnostics::from_parse_error)
    })
}

/// Compile and render the Debug representation of the AST for the viewer.
pub fn ast_dump(script: &str) -> Result<String, CompileDiagnostic> {
    CHECK_ENGINE.with(|engine| {
        let ast = engine
            .compile(script)
            .map_err(diagnostics::from_parse_error)?;
        Ok(render_ast(&ast))
    })
}

fn render_ast(ast: &AST) -> String {
    use std::fmt::Write;
    let mut out = format!(
        "// Statements:\n{:#?}\n\n// Script-defined functions:\n",
        ast.statements()
    );
    for f in ast.iter_functions() {
        let _ = writeln!(&mut out, "{:#?}", f);
    }
    out
}

/// Host for script execution. Owned by one execution-context thread; a fresh
/// engine is assembled per run so script state never leaks between runs,
/// with the prelude module shared across them.
#[derive(Debug)]
pub struct ScriptRuntime {
    prelude: Option<Shared<Module>>,
}

impl ScriptRuntime {
    pub fn new(options: &RuntimeOptions) -> Result<Self, EngineError> {
        let prelude = match &options.prelude {
            Some(path) => Some(Shared::new(load_prelude(path)?)),
            None => None,
        };
        Ok(Self { prelude })
    }

    fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.disable_symbol("eval");
        if let Some(module) = &self.prelude {
            engine.register_global_module(module.clone());
        }
        engine
    }

    /// Compile and evaluate `script`, emitting output lines and heartbeats
    /// through `emit`. The `halt` flag is checked from the progress hook and
    /// aborts the evaluation when set.
    pub fn run(
        &self,
        script: &str,
        emit: impl Fn(RunEmit) + Clone + 'static,
        halt: Arc<AtomicBool>,
    ) -> Result<String, String> {
        let mut engine = self.build_engine();

        {
            let emit = emit.clone();
            engine.on_print(move |s| emit(RunEmit::Line(format!("[PRINT] {s}"))));
        }
        {
            let emit = emit.clone();
            engine.on_debug(move |s, src, pos| {
                let line = src.map_or_else(
                    || format!("[DEBUG] <script>:[{pos}] {s}"),
                    |src| format!("[DEBUG] {src}:[{pos}] {s}"),
                );
                emit(RunEmit::Line(line));
            });
        }

        let ast = engine.compile(script).map_err(|e| e.to_string())?;

        let throttle = RefCell::new(progress::OpsThrottle::new());
        engine.on_progress(move |ops| {
            if halt.load(Ordering::Relaxed) {
                // Terminates the evaluation with ErrorTerminated.
                return Some(Dynamic::UNIT);
            }
            if let Some(due) = throttle.borrow_mut().observe(ops, Instant::now()) {
                emit(RunEmit::Ops(due));
            }
            None
        });

        let result: Dynamic = engine.eval_ast(&ast).map_err(|e| e.to_string())?;
        Ok(result.to_string())
    }
}

fn load_prelude(path: &Path) -> Result<Module, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::PreludeIo {
        path: path.display().to_string(),
        source,
    })?;
    let mut engine = Engine::new();
    engine.disable_symbol("eval");
    let ast = engine
        .compile(&text)
        .map_err(|e| EngineError::PreludeCompile(diagnostics::from_parse_error(e)))?;
    Module::eval_ast_as_new(Scope::new(), &ast, &engine)
        .map_err(|e| EngineError::PreludeEval(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::rc::Rc;

    fn collecting_emit() -> (Rc<RefCell<Vec<RunEmit>>>, impl Fn(RunEmit) + Clone + 'static) {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let sink2 = sink.clone();
        (sink, move |e| sink2.borrow_mut().push(e))
    }

    fn lines(emits: &[RunEmit]) -> Vec<String> {
        emits
            .iter()
            .filter_map(|e| match e {
                RunEmit::Line(l) => Some(l.clone()),
                RunEmit::Ops(_) => None,
            })
            .collect()
    }

    #[test]
    fn check_accepts_valid_source() {
        assert!(check("let x = 1 + 2; x * 3").is_ok());
    }

    #[test]
    fn check_reports_position_for_parse_error() {
        let diag = check("fn broken( {").unwrap_err();
        assert!(!diag.message.is_empty());
        assert_eq!(diag.line, Some(1));
        assert!(diag.column.is_some());
    }

    #[test]
    fn ast_dump_renders_statements_and_functions() {
        let dump = ast_dump("fn double(x) { x * 2 }\ndouble(4);").unwrap();
        assert!(dump.contains("// Statements:"));
        assert!(dump.contains("// Script-defined functions:"));
    }

    #[test]
    fn run_emits_print_lines_and_return_value() {
        let runtime = ScriptRuntime::new(&RuntimeOptions::default()).unwrap();
        let (sink, emit) = collecting_emit();
        let halt = Arc::new(AtomicBool::new(false));
        let result = runtime.run(r#"print("hello"); 10"#, emit, halt).unwrap();
        assert_eq!(result, "10");
        assert_eq!(lines(&sink.borrow()), vec!["[PRINT] hello".to_string()]);
    }

    #[test]
    fn run_surfaces_runtime_errors() {
        let runtime = ScriptRuntime::new(&RuntimeOptions::default()).unwrap();
        let (_, emit) = collecting_emit();
        let halt = Arc::new(AtomicBool::new(false));
        let err = runtime.run("undefined_fn()", emit, halt).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn halt_flag_terminates_evaluation() {
        let runtime = ScriptRuntime::new(&RuntimeOptions::default()).unwrap();
        let (_, emit) = collecting_emit();
        // Pre-set halt: even a non-terminating script must abort.
        let halt = Arc::new(AtomicBool::new(true));
        let err = runtime.run("loop { }", emit, halt).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn eval_symbol_is_disabled() {
        let runtime = ScriptRuntime::new(&RuntimeOptions::default()).unwrap();
        let (_, emit) = collecting_emit();
        let halt = Arc::new(AtomicBool::new(false));
        assert!(runtime.run(r#"eval("1 + 1")"#, emit, halt).is_err());
    }

    #[test]
    fn prelude_functions_are_callable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fn double(x) {{ x * 2 }}").unwrap();
        let runtime = ScriptRuntime::new(&RuntimeOptions {
            prelude: Some(file.path().to_path_buf()),
        })
        .unwrap();
        let (_, emit) = collecting_emit();
        let halt = Arc::new(AtomicBool::new(false));
        assert_eq!(runtime.run("double(21)", emit, halt).unwrap(), "42");
    }

    #[test]
    fn broken_prelude_fails_initialization() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fn broken( {{").unwrap();
        let err = ScriptRuntime::new(&RuntimeOptions {
            prelude: Some(file.path().to_path_buf()),
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::PreludeCompile(_)));
    }

    #[test]
    fn missing_prelude_fails_initialization() {
        let err = ScriptRuntime::new(&RuntimeOptions {
            prelude: Some(PathBuf::from("/nonexistent/prelude.rhai")),
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::PreludeIo { .. }));
    }
}
