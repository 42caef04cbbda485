//! Compile errors as source reports.

use ariadne::{Label, Report, ReportKind, Source};
use vesper::CompileError;

/// Prints `error` against `source` if it carries a span that fits in it.
/// Returns false when there is nothing to point at.
pub fn compile_error(error: &CompileError, filename: &str, source: &str) -> bool {
    let Some(span) = error.span() else {
        return false;
    };
    if span.start > span.end || span.end > source.len() {
        log::warn!("span {span} of `{error}` is outside {filename}");
        return false;
    }

    let result = Report::build(ReportKind::Error, (filename, span.range()))
        .with_message(error.to_string())
        .with_label(
            Label::new((filename, span.range())).with_message(reason(error)),
        )
        .finish()
        .eprint((filename, Source::from(source)));
    if let Err(err) = result {
        log::warn!("failed to print report: {err}");
        return false;
    }
    true
}

fn reason(error: &CompileError) -> &'static str {
    match error {
        CompileError::UnresolvedReference { .. } => "not a local, an argument or a helper",
        CompileError::UnresolvedComponent { .. }
        | CompileError::UnresolvedHelper { .. }
        | CompileError::UnresolvedModifier { .. } => "not registered",
        CompileError::BlockParameterArity { .. } => "wrong number of block parameters",
        CompileError::AttributeOutsideElement { .. } => "no element is open here",
        CompileError::UnbalancedElement { .. } => "element is not balanced",
        CompileError::UnknownBlock { .. } => "block reference",
        CompileError::InvalidArguments { .. } => "invalid arguments",
        CompileError::ReservedName { .. } => "reserved",
        CompileError::UnsupportedWireVersion { .. } => "wire version",
        CompileError::WireOpTooNew { .. } => "newer than the declared wire version",
    }
}
