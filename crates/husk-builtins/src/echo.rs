//! echo builtin - write arguments to stdout

use crate::{BuiltinError, Invocation, Outcome, Streams};

/// Usage: echo [-neE] [ARG]...
///
/// A leading argument is only taken as options when every character after
/// the dash is one of `n`, `e`, `E`; anything else is printed literally.
pub(crate) fn run(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let mut newline = true;
    let mut escapes = false;
    let mut args = inv.args;

    while let Some(flags) = args.first().and_then(|arg| arg.strip_prefix('-')) {
        if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
            break;
        }
        for c in flags.chars() {
            match c {
                'n' => newline = false,
                'e' => escapes = true,
                _ => escapes = false,
            }
        }
        args = &args[1..];
    }

    let joined = args.join(" ");
    let mut out = if escapes {
        let (bytes, stop) = unescape(&joined);
        if stop {
            newline = false;
        }
        bytes
    } else {
        joined.into_bytes()
    };
    if newline {
        out.push(b'\n');
    }

    streams.stdout(&out)?;
    Ok(Outcome::Status(0))
}

/// Interpret backslash escapes. The flag is set when `\c` cut the output.
fn unescape(text: &str) -> (Vec<u8>, bool) {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = bytes[i + 1];
        i += 2;
        match escape {
            b'\\' => out.push(b'\\'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'c' => return (out, true),
            b'e' => out.push(0x1b),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'0' => {
                let digits = bytes[i..].iter().take(3).take_while(|b| (b'0'..=b'7').contains(b)).count();
                let value = bytes[i..i + digits]
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                out.push((value & 0xff) as u8);
                i += digits;
            }
            b'x' => {
                let digits = bytes[i..].iter().take(2).take_while(|b| b.is_ascii_hexdigit()).count();
                if digits == 0 {
                    out.extend_from_slice(b"\\x");
                } else {
                    let hex = std::str::from_utf8(&bytes[i..i + digits]).unwrap_or("0");
                    out.push(u8::from_str_radix(hex, 16).unwrap_or(0));
                    i += digits;
                }
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    (out, false)
}
