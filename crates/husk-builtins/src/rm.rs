//! rm builtin - remove files and directories

use std::fs;
use std::io;
use std::path::{Component, Path};

use crate::{BuiltinError, Invocation, Outcome, Streams, parse_args, report};

struct Options {
    recursive: bool,
    force: bool,
    dir: bool,
    verbose: bool,
}

/// Usage: rm [-rRfdv] [--preserve-root|--no-preserve-root] PATH...
///
/// The filesystem root, `.` and `..` are never removed, whatever the flags.
pub(crate) fn run(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    // 'P' only exists to accept --preserve-root / --no-preserve-root
    let args = parse_args(
        "rm",
        inv.args,
        "rRfdvi",
        &[
            ("recursive", 'r'),
            ("force", 'f'),
            ("dir", 'd'),
            ("verbose", 'v'),
            ("preserve-root", 'P'),
            ("no-preserve-root", 'P'),
        ],
    )?;
    let opts = Options {
        recursive: args.has('r') || args.has('R'),
        force: args.last_of('f', 'i'),
        dir: args.has('d'),
        verbose: args.has('v'),
    };

    if args.operands.is_empty() {
        if opts.force {
            return Ok(Outcome::Status(0));
        }
        return Err(BuiltinError::usage("rm", "missing operand"));
    }

    let mut failed = false;
    for operand in &args.operands {
        match remove_operand(inv, operand, &opts, streams) {
            Ok(complete) => failed |= !complete,
            Err(err @ BuiltinError::Write(_)) => return Err(err),
            Err(err) => {
                failed = true;
                report(streams, &err)?;
            }
        }
    }
    Ok(Outcome::Status(i32::from(failed)))
}

/// `Ok(false)` when a recursive removal left entries behind; those errors
/// are already on stderr.
fn remove_operand(
    inv: &Invocation<'_>,
    operand: &str,
    opts: &Options,
    streams: &mut dyn Streams,
) -> Result<bool, BuiltinError> {
    if matches!(Path::new(operand).components().next_back(), Some(Component::CurDir | Component::ParentDir)) {
        return Err(BuiltinError::path("rm", operand, "refusing to remove '.' or '..' directory"));
    }

    let path = inv.resolve(operand);
    if is_root(&path) {
        return Err(BuiltinError::path("rm", operand, "refusing to remove root directory"));
    }

    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound && opts.force => return Ok(true),
        Err(err) => return Err(BuiltinError::io("rm", operand, &err)),
    };

    if !meta.is_dir() {
        fs::remove_file(&path).map_err(|err| BuiltinError::io("rm", operand, &err))?;
        removed(streams, opts, "removed", operand)?;
        return Ok(true);
    }

    if opts.recursive {
        return remove_tree(&path, operand, opts, streams);
    }
    if opts.dir {
        fs::remove_dir(&path).map_err(|err| BuiltinError::io("rm", operand, &err))?;
        removed(streams, opts, "removed directory", operand)?;
        return Ok(true);
    }
    Err(BuiltinError::path("rm", operand, "is a directory"))
}

/// Remove `path` and everything under it, reporting each entry that cannot
/// be removed and carrying on with its siblings. A directory that kept an
/// entry is left in place.
fn remove_tree(path: &Path, display: &str, opts: &Options, streams: &mut dyn Streams) -> Result<bool, BuiltinError> {
    let entries = fs::read_dir(path).map_err(|err| BuiltinError::io("rm", display, &err))?;
    let mut complete = true;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                report(streams, &BuiltinError::io("rm", display, &err))?;
                complete = false;
                continue;
            }
        };
        let child = format!("{}/{}", display.trim_end_matches('/'), entry.file_name().to_string_lossy());
        let child_path = entry.path();
        let result = if entry.file_type().is_ok_and(|t| t.is_dir()) {
            remove_tree(&child_path, &child, opts, streams)
        } else {
            match fs::remove_file(&child_path) {
                Ok(()) => removed(streams, opts, "removed", &child).map(|()| true),
                Err(err) => Err(BuiltinError::io("rm", &child, &err)),
            }
        };
        match result {
            Ok(done) => complete &= done,
            Err(err @ BuiltinError::Write(_)) => return Err(err),
            Err(err) => {
                report(streams, &err)?;
                complete = false;
            }
        }
    }
    if !complete {
        return Ok(false);
    }
    fs::remove_dir(path).map_err(|err| BuiltinError::io("rm", display, &err))?;
    removed(streams, opts, "removed directory", display)?;
    Ok(true)
}

fn removed(streams: &mut dyn Streams, opts: &Options, what: &str, display: &str) -> Result<(), BuiltinError> {
    if opts.verbose {
        streams.stdout(format!("{what} '{display}'\n").as_bytes())?;
    }
    Ok(())
}

/// Whether `path` names a filesystem root (`/`, or a drive root on Windows)
fn is_root(path: &Path) -> bool {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved.parent().is_none()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::testing::{run_in, running_as_root};
    use crate::{Builtin, Outcome};

    #[test]
    fn test_rm_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "x").unwrap();
        let (outcome, _) = run_in(Builtin::Rm, dir.path(), &["f"]);
        assert_eq!(outcome, Outcome::Status(0));
        assert!(!dir.path().join("f").exists());
    }

    #[test]
    fn test_rm_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["nope"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "rm: nope: No such file or directory\n");

        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-f", "nope"]);
        assert_eq!(outcome, Outcome::Status(0));
        assert!(capture.err.is_empty());
    }

    #[test]
    fn test_rm_directory_needs_flag() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["d"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "rm: d: is a directory\n");
        assert!(dir.path().join("d").exists());
    }

    #[test]
    fn test_rm_dir_flag() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::create_dir(dir.path().join("full")).unwrap();
        fs::write(dir.path().join("full/x"), "x").unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();

        assert_eq!(run_in(Builtin::Rm, dir.path(), &["-d", "empty"]).0, Outcome::Status(0));
        assert_eq!(run_in(Builtin::Rm, dir.path(), &["-d", "file"]).0, Outcome::Status(0));

        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-d", "full"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "rm: full: Directory not empty\n");
        assert!(dir.path().join("full/x").exists());
    }

    #[test]
    fn test_rm_recursive_verbose() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("t/u")).unwrap();
        fs::write(dir.path().join("t/u/f"), "x").unwrap();

        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-rv", "t"]);
        assert_eq!(outcome, Outcome::Status(0));
        assert_eq!(
            capture.out(),
            "removed 't/u/f'\nremoved directory 't/u'\nremoved directory 't'\n"
        );
        assert!(!dir.path().join("t").exists());
    }

    #[test]
    fn test_rm_refuses_root_and_dots() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-rf", "--no-preserve-root", "/"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "rm: /: refusing to remove root directory\n");

        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-rf", "."]);
        assert_eq!(outcome, Outcome::Status(1));
        assert!(capture.err().contains("refusing to remove '.' or '..'"));
        assert!(dir.path().exists());
    }

    #[test]
    fn test_rm_recursive_keeps_going_past_a_locked_entry() {
        if running_as_root() {
            return;
        }
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("locked")).unwrap();
        fs::write(tree.join("locked/kept"), "x").unwrap();
        for name in ["a", "b", "z"] {
            fs::write(tree.join(name), "x").unwrap();
        }
        fs::set_permissions(tree.join("locked"), fs::Permissions::from_mode(0o555)).unwrap();

        let (outcome, capture) = run_in(Builtin::Rm, dir.path(), &["-rf", "tree", "other"]);
        fs::set_permissions(tree.join("locked"), fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "rm: tree/locked/kept: Permission denied\n");
        for name in ["a", "b", "z"] {
            assert!(!tree.join(name).exists(), "{name} was left behind");
        }
        assert!(tree.join("locked/kept").exists());
    }

    #[test]
    fn test_rm_continues_after_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b"), "x").unwrap();
        let (outcome, _) = run_in(Builtin::Rm, dir.path(), &["a", "b"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert!(!dir.path().join("b").exists());
    }
}
