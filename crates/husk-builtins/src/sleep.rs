//! sleep builtin - pause for a total duration

use std::time::Duration;

use crate::{BuiltinError, Invocation, Outcome};

/// Usage: sleep NUMBER[smhd]...
///
/// All arguments are summed. The executor performs the actual wait.
pub(crate) fn run(inv: &Invocation<'_>) -> Result<Outcome, BuiltinError> {
    if inv.args.is_empty() {
        return Err(BuiltinError::usage("sleep", "missing operand"));
    }

    let mut total = 0.0f64;
    for arg in inv.args {
        total += parse_interval(arg)
            .ok_or_else(|| BuiltinError::usage("sleep", format!("invalid time interval '{arg}'")))?;
    }

    let duration = Duration::try_from_secs_f64(total)
        .map_err(|_| BuiltinError::usage("sleep", "time interval out of range"))?;
    Ok(Outcome::Sleep(duration))
}

fn parse_interval(arg: &str) -> Option<f64> {
    let (number, scale) = match arg.char_indices().last()? {
        (i, 's') => (&arg[..i], 1.0),
        (i, 'm') => (&arg[..i], 60.0),
        (i, 'h') => (&arg[..i], 3600.0),
        (i, 'd') => (&arg[..i], 86400.0),
        _ => (arg, 1.0),
    };
    // f64 parsing would also accept "inf" and "nan"
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    Some(value * scale)
}
