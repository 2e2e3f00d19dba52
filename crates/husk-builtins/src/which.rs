//! Program lookup, shared by the `which` builtin and process spawning

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{BuiltinError, Invocation, Outcome, Streams};

/// Find the executable `name` would run.
///
/// Names containing a slash are taken relative to `cwd`; anything else is
/// searched for in `path_var` (a `PATH`-style list).
#[must_use]
pub fn resolve_program(name: &str, path_var: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        let candidate = cwd.join(name);
        return is_executable(&candidate).then_some(candidate);
    }

    env::split_paths(path_var?)
        .map(|dir| cwd.join(dir).join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Usage: which NAME...
pub(crate) fn run(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    if inv.args.is_empty() {
        return Err(BuiltinError::usage("which", "missing operand"));
    }

    let path_var = inv.vars.var("PATH");
    let mut out = String::new();
    let mut missing = false;
    for name in inv.args {
        if crate::Builtin::from_name(name).is_some() {
            out.push_str(&format!("{name}: shell built-in command\n"));
            continue;
        }
        match resolve_program(name, path_var.as_deref(), inv.cwd) {
            Some(found) => {
                out.push_str(&found.display().to_string());
                out.push('\n');
            }
            None => {
                missing = true;
                out.push_str(&format!("{name} not found\n"));
            }
        }
    }
    streams.stdout(out.as_bytes())?;
    Ok(Outcome::Status(i32::from(missing)))
}
