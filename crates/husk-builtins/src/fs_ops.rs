//! mkdir, touch and pwd builtins

use std::fs;
use std::time::SystemTime;

use crate::{BuiltinError, Invocation, Outcome, Streams, parse_args, report};

/// Usage: mkdir [-pv] DIR...
pub(crate) fn mkdir(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let args = parse_args("mkdir", inv.args, "pv", &[("parents", 'p'), ("verbose", 'v')])?;
    if args.operands.is_empty() {
        return Err(BuiltinError::usage("mkdir", "missing operand"));
    }

    let mut failed = false;
    for operand in &args.operands {
        let path = inv.resolve(operand);
        let result = if args.has('p') {
            fs::create_dir_all(&path)
        } else {
            fs::create_dir(&path)
        };
        match result {
            Ok(()) if args.has('v') => {
                streams.stdout(format!("mkdir: created directory '{operand}'\n").as_bytes())?;
            }
            Ok(()) => {}
            Err(err) => {
                failed = true;
                report(streams, &BuiltinError::io("mkdir", *operand, &err))?;
            }
        }
    }
    Ok(Outcome::Status(i32::from(failed)))
}

/// Usage: touch [-c] FILE...
pub(crate) fn touch(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let args = parse_args("touch", inv.args, "c", &[("no-create", 'c')])?;
    if args.operands.is_empty() {
        return Err(BuiltinError::usage("touch", "missing file operand"));
    }

    let mut failed = false;
    for operand in &args.operands {
        let path = inv.resolve(operand);
        let result = if path.exists() {
            fs::File::options()
                .append(true)
                .open(&path)
                .and_then(|file| file.set_modified(SystemTime::now()))
        } else if args.has('c') {
            Ok(())
        } else {
            fs::File::create(&path).map(drop)
        };
        if let Err(err) = result {
            failed = true;
            report(streams, &BuiltinError::io("touch", *operand, &err))?;
        }
    }
    Ok(Outcome::Status(i32::from(failed)))
}

/// Usage: pwd
pub(crate) fn pwd(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    streams.stdout(format!("{}\n", inv.cwd.display()).as_bytes())?;
    Ok(Outcome::Status(0))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::testing::run_in;
    use crate::{Builtin, Outcome};

    #[test]
    fn test_mkdir() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, capture) = run_in(Builtin::Mkdir, dir.path(), &["-v", "a"]);
        assert_eq!(outcome, Outcome::Status(0));
        assert_eq!(capture.out(), "mkdir: created directory 'a'\n");
        assert!(dir.path().join("a").is_dir());

        let (outcome, capture) = run_in(Builtin::Mkdir, dir.path(), &["a"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "mkdir: a: File exists\n");
    }

    #[test]
    fn test_mkdir_parents() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_in(Builtin::Mkdir, dir.path(), &["x/y/z"]).0, Outcome::Status(1));
        assert_eq!(run_in(Builtin::Mkdir, dir.path(), &["-p", "x/y/z"]).0, Outcome::Status(0));
        assert!(dir.path().join("x/y/z").is_dir());
    }

    #[test]
    fn test_touch() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_in(Builtin::Touch, dir.path(), &["new"]).0, Outcome::Status(0));
        assert!(dir.path().join("new").is_file());

        fs::write(dir.path().join("kept"), "data").unwrap();
        assert_eq!(run_in(Builtin::Touch, dir.path(), &["kept"]).0, Outcome::Status(0));
        assert_eq!(fs::read_to_string(dir.path().join("kept")).unwrap(), "data");

        assert_eq!(run_in(Builtin::Touch, dir.path(), &["-c", "absent"]).0, Outcome::Status(0));
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn test_pwd() {
        let dir = tempfile::tempdir().unwrap();
        let (_, capture) = run_in(Builtin::Pwd, dir.path(), &[]);
        assert_eq!(capture.out(), format!("{}\n", dir.path().display()));
    }
}
