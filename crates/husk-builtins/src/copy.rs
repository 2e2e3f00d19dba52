//! cp and mv builtins

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::path::basename_of;
use crate::{BuiltinError, Invocation, Outcome, Streams, parse_args, report};

#[derive(Debug, Clone, Copy)]
struct Options {
    recursive: bool,
    force: bool,
    no_clobber: bool,
    verbose: bool,
}

/// One source and where it goes
struct Transfer<'a> {
    source: &'a str,
    source_path: PathBuf,
    dest: String,
    dest_path: PathBuf,
}

/// Resolve operands into transfers. With several sources, or a directory as
/// the last operand, each source lands inside that directory.
fn plan<'a>(tool: &'static str, inv: &Invocation<'_>, operands: &[&'a str]) -> Result<Vec<Transfer<'a>>, BuiltinError> {
    let (target, sources) = match operands.split_last() {
        None => return Err(BuiltinError::usage(tool, "missing file operand")),
        Some((only, [])) => {
            return Err(BuiltinError::usage(
                tool,
                format!("missing destination file operand after '{only}'"),
            ));
        }
        Some((target, sources)) => (*target, sources),
    };

    let target_path = inv.resolve(target);
    let into_dir = target_path.is_dir();
    if sources.len() > 1 && !into_dir {
        return Err(BuiltinError::path(tool, target, "is not a directory"));
    }

    Ok(sources
        .iter()
        .map(|&source| {
            let (dest, dest_path) = if into_dir {
                let name = basename_of(source);
                (
                    format!("{}/{name}", target.trim_end_matches('/')),
                    target_path.join(name),
                )
            } else {
                (target.to_string(), target_path.clone())
            };
            Transfer {
                source,
                source_path: inv.resolve(source),
                dest,
                dest_path,
            }
        })
        .collect())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Usage: cp [-Rrfnv] SOURCE... DEST
pub(crate) fn cp(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let args = parse_args(
        "cp",
        inv.args,
        "Rrfnv",
        &[("recursive", 'R'), ("force", 'f'), ("no-clobber", 'n'), ("verbose", 'v')],
    )?;
    let opts = Options {
        recursive: args.has('R') || args.has('r'),
        force: args.has('f'),
        no_clobber: args.last_of('n', 'f'),
        verbose: args.has('v'),
    };

    let mut failed = false;
    for transfer in plan("cp", inv, &args.operands)? {
        if let Err(err) = copy_one(&transfer, opts, streams) {
            if matches!(err, BuiltinError::Write(_)) {
                return Err(err);
            }
            failed = true;
            report(streams, &err)?;
        }
    }
    Ok(Outcome::Status(i32::from(failed)))
}

fn copy_one(t: &Transfer<'_>, opts: Options, streams: &mut dyn Streams) -> Result<(), BuiltinError> {
    let meta = fs::symlink_metadata(&t.source_path).map_err(|err| BuiltinError::io("cp", t.source, &err))?;

    if meta.is_dir() && !opts.recursive {
        return Err(BuiltinError::path("cp", t.source, "is a directory (not copied)"));
    }
    if same_file(&t.source_path, &t.dest_path) {
        return Err(BuiltinError::usage(
            "cp",
            format!("{} and {} are identical (not copied)", t.source, t.dest),
        ));
    }
    if opts.no_clobber && fs::symlink_metadata(&t.dest_path).is_ok() {
        return Ok(());
    }

    if meta.is_dir() {
        if let Ok(dest) = fs::canonicalize(&t.dest_path)
            && let Ok(source) = fs::canonicalize(&t.source_path)
            && dest.starts_with(&source)
        {
            return Err(BuiltinError::usage(
                "cp",
                format!("cannot copy a directory, '{}', into itself, '{}'", t.source, t.dest),
            ));
        }
        copy_tree(&t.source_path, &t.dest_path, opts).map_err(|err| BuiltinError::io("cp", t.source, &err))?;
    } else {
        copy_file(&t.source_path, &t.dest_path, opts.force).map_err(|err| BuiltinError::io("cp", &t.dest, &err))?;
    }

    if opts.verbose {
        streams.stdout(format!("'{}' -> '{}'\n", t.source, t.dest).as_bytes())?;
    }
    Ok(())
}

fn copy_file(source: &Path, dest: &Path, force: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        if fs::symlink_metadata(source)?.file_type().is_symlink() {
            let link = fs::read_link(source)?;
            if fs::symlink_metadata(dest).is_ok() {
                fs::remove_file(dest)?;
            }
            return std::os::unix::fs::symlink(link, dest);
        }
    }

    match fs::copy(source, dest) {
        Ok(_) => Ok(()),
        Err(err) if force && err.kind() == io::ErrorKind::PermissionDenied => {
            fs::remove_file(dest)?;
            fs::copy(source, dest).map(|_| ())
        }
        Err(err) => Err(err),
    }
}

fn copy_tree(source: &Path, dest: &Path, opts: Options) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target, opts)?;
        } else if !(opts.no_clobber && fs::symlink_metadata(&target).is_ok()) {
            copy_file(&entry.path(), &target, opts.force)?;
        }
    }
    Ok(())
}

/// Usage: mv [-fnv] SOURCE... DEST
pub(crate) fn mv(inv: &Invocation<'_>, streams: &mut dyn Streams) -> Result<Outcome, BuiltinError> {
    let args = parse_args(
        "mv",
        inv.args,
        "fnv",
        &[("force", 'f'), ("no-clobber", 'n'), ("verbose", 'v')],
    )?;
    let opts = Options {
        recursive: true,
        force: args.has('f'),
        no_clobber: args.last_of('n', 'f'),
        verbose: args.has('v'),
    };

    let mut failed = false;
    for transfer in plan("mv", inv, &args.operands)? {
        if let Err(err) = move_one(&transfer, opts, streams) {
            if matches!(err, BuiltinError::Write(_)) {
                return Err(err);
            }
            failed = true;
            report(streams, &err)?;
        }
    }
    Ok(Outcome::Status(i32::from(failed)))
}

fn move_one(t: &Transfer<'_>, opts: Options, streams: &mut dyn Streams) -> Result<(), BuiltinError> {
    let meta = fs::symlink_metadata(&t.source_path).map_err(|err| BuiltinError::io("mv", t.source, &err))?;
    if same_file(&t.source_path, &t.dest_path) {
        return Err(BuiltinError::usage(
            "mv",
            format!("{} and {} are identical", t.source, t.dest),
        ));
    }
    if opts.no_clobber && fs::symlink_metadata(&t.dest_path).is_ok() {
        return Ok(());
    }

    match fs::rename(&t.source_path, &t.dest_path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            // Different filesystems: copy, then remove the original
            let moved = if meta.is_dir() {
                copy_tree(&t.source_path, &t.dest_path, opts).and_then(|()| fs::remove_dir_all(&t.source_path))
            } else {
                copy_file(&t.source_path, &t.dest_path, true).and_then(|()| fs::remove_file(&t.source_path))
            };
            moved.map_err(|err| BuiltinError::io("mv", t.source, &err))?;
        }
        Err(err) => return Err(BuiltinError::io("mv", t.source, &err)),
    }

    if opts.verbose {
        streams.stdout(format!("renamed '{}' -> '{}'\n", t.source, t.dest).as_bytes())?;
    }
    Ok(())
}
