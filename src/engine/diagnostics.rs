use crate::model::CompileDiagnostic;
use rhai::ParseError;

/// Map the parser's error into the structured diagnostic the editor
/// understands. Line/column stay 1-based; both are absent for errors the
/// parser cannot position (e.g. unexpected end of input in some cases).
pub(crate) fn from_parse_error(e: ParseError) -> CompileDiagnostic {
    let ParseError(err, pos) = e;
    CompileDiagnostic {
        message: err.to_string(),
        line: pos.line().map(|x| x as u32),
        column: pos.position().map(|x| x as u32),
    }
}
