//! seq builtin - print a sequence of numbers

use crate::{BuiltinError, Invocation, Outcome, Streams};

const CHUNK: usize = 8 * 1024;

/// Usage: seq [-w] [-s SEP] [-t TERM] [FIRST [INCREMENT]] LAST
///
/// Without an increment the direction follows FIRST and LAST.
pub(crate) fn run(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let mut separator = "\n".to_string();
    let mut terminator = "\n".to_string();
    let mut equal_width = false;
    let mut nums: Vec<&str> = Vec::new();

    let mut args = inv.args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-s" | "-t" => {
                let value = args
                    .next()
                    .ok_or_else(|| BuiltinError::usage("seq", format!("option requires an argument -- {}", &arg[1..])))?;
                if arg == "-s" {
                    separator.clone_from(value);
                } else {
                    terminator.clone_from(value);
                }
            }
            "-w" => equal_width = true,
            s if s.starts_with("-s") && s.len() > 2 => separator = s[2..].to_string(),
            s if s.starts_with("-t") && s.len() > 2 => terminator = s[2..].to_string(),
            s => nums.push(s),
        }
    }

    let values = nums.iter().map(|s| parse_number(s)).collect::<Result<Vec<f64>, _>>()?;
    let (first, increment, last) = match values[..] {
        [] => return Err(BuiltinError::usage("seq", "missing operand")),
        [last] => (1.0, 1.0, last),
        [first, last] => (first, if first > last { -1.0 } else { 1.0 }, last),
        [first, increment, last] => (first, increment, last),
        _ => return Err(BuiltinError::usage("seq", format!("extra operand '{}'", nums[3]))),
    };

    if increment == 0.0 {
        return Err(BuiltinError::usage("seq", "zero increment"));
    }
    if first < last && increment < 0.0 {
        return Err(BuiltinError::usage("seq", "needs positive increment"));
    }
    if first > last && increment > 0.0 {
        return Err(BuiltinError::usage("seq", "needs negative decrement"));
    }

    let all_integer = first.fract() == 0.0 && increment.fract() == 0.0 && last.fract() == 0.0;
    let width = if equal_width && all_integer {
        format_number(first, true).len().max(format_number(last, true).len())
    } else {
        0
    };

    let mut output = String::new();
    let mut emitted = false;
    let mut step = 0u64;
    loop {
        #[allow(clippy::cast_precision_loss)]
        let current = first + increment * step as f64;
        if (increment > 0.0 && current > last) || (increment < 0.0 && current < last) {
            break;
        }
        if emitted {
            output.push_str(&separator);
        }
        emitted = true;

        let text = format_number(current, all_integer);
        if width > text.len() {
            pad_zeros(&mut output, &text, width);
        } else {
            output.push_str(&text);
        }

        if output.len() >= CHUNK {
            streams.stdout(output.as_bytes())?;
            output.clear();
        }
        step += 1;
    }

    if emitted {
        output.push_str(&terminator);
    }
    if !output.is_empty() {
        streams.stdout(output.as_bytes())?;
    }
    Ok(Outcome::Status(0))
}

fn parse_number(text: &str) -> Result<f64, BuiltinError> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| BuiltinError::usage("seq", format!("invalid floating point argument: '{text}'")))
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(value: f64, integer: bool) -> String {
    if integer {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{value:.10}");
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn pad_zeros(out: &mut String, text: &str, width: usize) {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text),
    };
    out.push_str(sign);
    for _ in 0..width - text.len() {
        out.push('0');
    }
    out.push_str(digits);
}
