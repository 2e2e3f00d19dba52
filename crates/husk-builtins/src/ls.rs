//! ls builtin - list directory contents

use std::fs;
use std::path::Path;

use crate::error::io_reason;
use crate::{BuiltinError, Invocation, Outcome, Streams, parse_args, report};

const FLUSH_AT: usize = 8 * 1024;

/// Which entries of a directory are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hidden {
    /// Skip dotfiles
    Skip,
    /// `-A`: dotfiles, but not `.` and `..`
    AlmostAll,
    /// `-a`: everything including `.` and `..`
    All,
}

struct Listing<'s> {
    hidden: Hidden,
    recursive: bool,
    streams: &'s mut dyn Streams,
    out: String,
    failed: bool,
}

/// Usage: ls [-aAdR1] [PATH]...
///
/// Output is always one entry per line. File operands are printed first,
/// then each directory, with a `path:` header when more than one listing is
/// produced.
pub(crate) fn run(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let args = parse_args(
        "ls",
        inv.args,
        "aAdR1",
        &[("all", 'a'), ("almost-all", 'A'), ("directory", 'd'), ("recursive", 'R')],
    )?;
    let hidden = if args.last_of('a', 'A') {
        Hidden::All
    } else if args.has('A') {
        Hidden::AlmostAll
    } else {
        Hidden::Skip
    };
    let mut operands = args.operands.clone();
    if operands.is_empty() {
        operands.push(".");
    }

    let mut listing = Listing {
        hidden,
        recursive: args.has('R'),
        streams,
        out: String::new(),
        failed: false,
    };

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for operand in &operands {
        let path = inv.resolve(operand);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() && !args.has('d') => dirs.push(*operand),
            Ok(_) => files.push(*operand),
            Err(err) => {
                listing.failed = true;
                report(listing.streams, &BuiltinError::io("ls", *operand, &err))?;
            }
        }
    }
    files.sort_unstable();
    dirs.sort_unstable();

    for file in &files {
        listing.line(file)?;
    }

    let headers = operands.len() > 1 || listing.recursive;
    for (i, dir) in dirs.iter().enumerate() {
        if i > 0 || !files.is_empty() {
            listing.line("")?;
        }
        listing.directory(&inv.resolve(dir), dir, headers)?;
    }

    listing.flush()?;
    Ok(Outcome::Status(i32::from(listing.failed)))
}

impl Listing<'_> {
    fn line(&mut self, text: &str) -> Result<(), BuiltinError> {
        self.out.push_str(text);
        self.out.push('\n');
        if self.out.len() >= FLUSH_AT {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BuiltinError> {
        if !self.out.is_empty() {
            self.streams.stdout(self.out.as_bytes())?;
            self.out.clear();
        }
        Ok(())
    }

    fn directory(&mut self, path: &Path, display: &str, header: bool) -> Result<(), BuiltinError> {
        if header {
            self.line(&format!("{display}:"))?;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                self.fail(display, &err)?;
                return Ok(());
            }
        };

        let mut names = Vec::new();
        let mut subdirs = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.fail(display, &err)?;
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && self.hidden == Hidden::Skip {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir {
                subdirs.push(name.clone());
            }
            names.push(name);
        }
        if self.hidden == Hidden::All {
            names.push(".".to_string());
            names.push("..".to_string());
        }
        names.sort_unstable();
        for name in &names {
            self.line(name)?;
        }

        if self.recursive {
            subdirs.sort_unstable();
            for sub in subdirs {
                let child = if display.ends_with('/') {
                    format!("{display}{sub}")
                } else {
                    format!("{display}/{sub}")
                };
                self.line("")?;
                self.directory(&path.join(&sub), &child, true)?;
            }
        }
        Ok(())
    }

    fn fail(&mut self, display: &str, err: &std::io::Error) -> Result<(), BuiltinError> {
        self.failed = true;
        // Keep stdout and stderr in listing order
        self.flush()?;
        let err = BuiltinError::path("ls", display, io_reason(err));
        report(self.streams, &err)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::testing::{run_in, running_as_root};
    use crate::{Builtin, Outcome};

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner"), "i").unwrap();
        dir
    }

    #[test]
    fn test_ls_sorted() {
        let dir = fixture();
        let (outcome, capture) = run_in(Builtin::Ls, dir.path(), &[]);
        assert_eq!(outcome, Outcome::Status(0));
        assert_eq!(capture.out(), "a.txt\nb.txt\nsub\n");
    }

    #[test]
    fn test_ls_hidden_flags() {
        let dir = fixture();
        assert_eq!(
            run_in(Builtin::Ls, dir.path(), &["-A"]).1.out(),
            ".hidden\na.txt\nb.txt\nsub\n"
        );
        assert_eq!(
            run_in(Builtin::Ls, dir.path(), &["-a"]).1.out(),
            ".\n..\n.hidden\na.txt\nb.txt\nsub\n"
        );
    }

    #[test]
    fn test_ls_directory_flag() {
        let dir = fixture();
        assert_eq!(run_in(Builtin::Ls, dir.path(), &["-d", "sub"]).1.out(), "sub\n");
    }

    #[test]
    fn test_ls_files_before_directories() {
        let dir = fixture();
        assert_eq!(
            run_in(Builtin::Ls, dir.path(), &["sub", "b.txt"]).1.out(),
            "b.txt\n\nsub:\ninner\n"
        );
    }

    #[test]
    fn test_ls_recursive() {
        let dir = fixture();
        assert_eq!(
            run_in(Builtin::Ls, dir.path(), &["-R"]).1.out(),
            ".:\na.txt\nb.txt\nsub\n\n./sub:\ninner\n"
        );
    }

    #[test]
    fn test_ls_missing_path() {
        let dir = fixture();
        let (outcome, capture) = run_in(Builtin::Ls, dir.path(), &["nope", "a.txt"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "ls: nope: No such file or directory\n");
        assert_eq!(capture.out(), "a.txt\n");
    }

    #[test]
    fn test_ls_continues_after_permission_denied() {
        if running_as_root() {
            return;
        }
        use std::os::unix::fs::PermissionsExt;

        let dir = fixture();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (outcome, capture) = run_in(Builtin::Ls, dir.path(), &["-R"]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(outcome, Outcome::Status(1));
        assert!(capture.err().contains("ls: ./locked: Permission denied"));
        assert!(capture.out().contains("./sub:\ninner\n"));
    }

    #[test]
    fn test_ls_bad_option() {
        let (outcome, capture) = run_in(Builtin::Ls, std::path::Path::new("/"), &["-z"]);
        assert_eq!(outcome, Outcome::Status(1));
        assert_eq!(capture.err(), "ls: illegal option -- z\n");
    }
}
