//! basename and dirname builtins

use crate::{BuiltinError, Invocation, Outcome, Streams};

/// Last component of `path`, ignoring trailing slashes. `/` maps to itself.
#[must_use]
pub fn basename_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "" } else { "/" };
    }
    match trimmed.rfind('/') {
        Some(slash) => &trimmed[slash + 1..],
        None => trimmed,
    }
}

/// Everything before the last component of `path`.
#[must_use]
pub fn dirname_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    match trimmed.rfind('/') {
        None => ".",
        Some(slash) => {
            let parent = trimmed[..slash].trim_end_matches('/');
            if parent.is_empty() { "/" } else { parent }
        }
    }
}

pub(crate) fn basename(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    each_line("basename", inv, streams, basename_of)
}

pub(crate) fn dirname(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    each_line("dirname", inv, streams, dirname_of)
}

fn each_line(
    tool: &'static str,
    inv: &Invocation<'_>,
    streams: &mut dyn Streams,
    transform: fn(&str) -> &str,
) -> Result<Outcome, BuiltinError> {
    if inv.args.is_empty() {
        return Err(BuiltinError::usage(tool, "missing operand"));
    }
    let mut out = String::new();
    for arg in inv.args {
        out.push_str(transform(arg));
        out.push('\n');
    }
    streams.stdout(out.as_bytes())?;
    Ok(Outcome::Status(0))
}
