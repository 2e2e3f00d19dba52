//! exit builtin

use crate::{BuiltinError, Invocation, Outcome};

/// Usage: exit [N]
///
/// Without an argument the previous status is kept. Codes wrap modulo 256.
pub(crate) fn exit(inv: &Invocation<'_>) -> Result<Outcome, BuiltinError> {
    match inv.args {
        [] => Ok(Outcome::Exit(inv.last_status.rem_euclid(256))),
        [code] => {
            let code: i64 = code
                .parse()
                .map_err(|_| BuiltinError::usage("exit", format!("{code}: numeric argument required")))?;
            #[allow(clippy::cast_possible_truncation)]
            let code = code.rem_euclid(256) as i32;
            Ok(Outcome::Exit(code))
        }
        _ => Err(BuiltinError::usage("exit", "too many arguments")),
    }
}
