//! Coreutils-style commands that run inside the shell process
//!
//! Every builtin has the same contract: it receives its arguments, the
//! working directory and read access to shell variables, writes through the
//! [`Streams`] it is handed and returns an [`Outcome`]. Builtins never read
//! stdin.

use std::io;
use std::path::Path;
use std::time::Duration;

mod copy;
mod echo;
pub mod error;
mod fs_ops;
mod ls;
mod path;
mod rm;
mod seq;
mod sleep;
mod status;
pub mod which;

pub use error::BuiltinError;

/// Read access to shell variables
pub trait VarLookup {
    fn var(&self, name: &str) -> Option<String>;
}

impl VarLookup for std::collections::HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Output side of a builtin
pub trait Streams {
    /// Queue bytes for stdout.
    ///
    /// # Errors
    ///
    /// `BrokenPipe` once the reader has gone away; other errors from the sink.
    fn stdout(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Queue bytes for stderr.
    ///
    /// # Errors
    ///
    /// As for [`Streams::stdout`].
    fn stderr(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Everything a builtin gets to see
pub struct Invocation<'a> {
    /// Arguments after the command name
    pub args: &'a [String],
    pub cwd: &'a Path,
    pub vars: &'a dyn VarLookup,
    /// `$?` before this command
    pub last_status: i32,
}

impl Invocation<'_> {
    /// Resolve an operand against the working directory
    #[must_use]
    pub fn resolve(&self, operand: &str) -> std::path::PathBuf {
        self.cwd.join(operand)
    }
}

/// How a builtin finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Status(i32),
    /// Stop the enclosing script with this code
    Exit(i32),
    /// Succeed after the given delay; the executor owns the timer
    Sleep(Duration),
}

/// The closed set of builtin commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Echo,
    Seq,
    Sleep,
    Basename,
    Dirname,
    True,
    False,
    Exit,
    Ls,
    Rm,
    Cp,
    Mv,
    Mkdir,
    Touch,
    Which,
    Pwd,
}

impl Builtin {
    pub const ALL: [Self; 16] = [
        Self::Echo,
        Self::Seq,
        Self::Sleep,
        Self::Basename,
        Self::Dirname,
        Self::True,
        Self::False,
        Self::Exit,
        Self::Ls,
        Self::Rm,
        Self::Cp,
        Self::Mv,
        Self::Mkdir,
        Self::Touch,
        Self::Which,
        Self::Pwd,
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Seq => "seq",
            Self::Sleep => "sleep",
            Self::Basename => "basename",
            Self::Dirname => "dirname",
            Self::True => "true",
            Self::False => "false",
            Self::Exit => "exit",
            Self::Ls => "ls",
            Self::Rm => "rm",
            Self::Cp => "cp",
            Self::Mv => "mv",
            Self::Mkdir => "mkdir",
            Self::Touch => "touch",
            Self::Which => "which",
            Self::Pwd => "pwd",
        }
    }

    /// Run the builtin to completion. Errors are rendered on stderr and
    /// turned into exit status 1; a closed stdout ends the command quietly.
    pub fn run(self, inv: &Invocation<'_>, streams: &mut dyn Streams) -> Outcome {
        let result = match self {
            Self::Echo => echo::run(inv, streams),
            Self::Seq => seq::run(inv, streams),
            Self::Sleep => sleep::run(inv),
            Self::Basename => path::basename(inv, streams),
            Self::Dirname => path::dirname(inv, streams),
            Self::True => Ok(Outcome::Status(0)),
            Self::False => Ok(Outcome::Status(1)),
            Self::Exit => status::exit(inv),
            Self::Ls => ls::run(inv, streams),
            Self::Rm => rm::run(inv, streams),
            Self::Cp => copy::cp(inv, streams),
            Self::Mv => copy::mv(inv, streams),
            Self::Mkdir => fs_ops::mkdir(inv, streams),
            Self::Touch => fs_ops::touch(inv, streams),
            Self::Which => which::run(inv, streams),
            Self::Pwd => fs_ops::pwd(inv, streams),
        };

        match result {
            Ok(outcome) => outcome,
            Err(BuiltinError::Write(err)) if err.kind() == io::ErrorKind::BrokenPipe => Outcome::Status(1),
            Err(BuiltinError::Write(err)) => {
                let message = format!("{}: write error: {}\n", self.name(), error::io_reason(&err));
                let _ = streams.stderr(message.as_bytes());
                Outcome::Status(1)
            }
            Err(err) => {
                let _ = streams.stderr(format!("{err}\n").as_bytes());
                Outcome::Status(1)
            }
        }
    }
}

/// Print a non-fatal error and keep going
pub(crate) fn report(streams: &mut dyn Streams, err: &BuiltinError) -> Result<(), BuiltinError> {
    streams.stderr(format!("{err}\n").as_bytes())?;
    Ok(())
}

/// Parsed command line: short flags and operands
pub(crate) struct Args<'a> {
    flags: Vec<char>,
    pub operands: Vec<&'a str>,
}

impl Args<'_> {
    pub fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }

    /// Whether `a` was given after the last `b`
    pub fn last_of(&self, a: char, b: char) -> bool {
        let pos = |flag| self.flags.iter().rposition(|&c| c == flag);
        match (pos(a), pos(b)) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Split `args` into flags and operands. Long options map onto short flags
/// through `long`; `--` ends option parsing and a lone `-` is an operand.
pub(crate) fn parse_args<'a>(
    tool: &'static str,
    args: &'a [String],
    short: &str,
    long: &[(&str, char)],
) -> Result<Args<'a>, BuiltinError> {
    let mut flags = Vec::new();
    let mut operands = Vec::new();
    let mut options_done = false;

    for arg in args {
        if options_done || arg == "-" || !arg.starts_with('-') {
            operands.push(arg.as_str());
        } else if arg == "--" {
            options_done = true;
        } else if let Some(name) = arg.strip_prefix("--") {
            let &(_, flag) = long
                .iter()
                .find(|(long_name, _)| *long_name == name)
                .ok_or_else(|| BuiltinError::usage(tool, format!("unrecognized option '{arg}'")))?;
            flags.push(flag);
        } else {
            for c in arg[1..].chars() {
                if !short.contains(c) {
                    return Err(BuiltinError::usage(tool, format!("illegal option -- {c}")));
                }
                flags.push(c);
            }
        }
    }

    Ok(Args { flags, operands })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_from_name_round_trips() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(Builtin::from_name("cat"), None);
    }

    #[test]
    fn test_true_false() {
        assert_eq!(run(Builtin::True, &[]).0, Outcome::Status(0));
        assert_eq!(run(Builtin::False, &["ignored"]).0, Outcome::Status(1));
    }

    #[test]
    fn test_broken_pipe_is_quiet() {
        let args = vec!["hello".to_string()];
        let vars = std::collections::HashMap::new();
        let inv = Invocation {
            args: &args,
            cwd: Path::new("/"),
            vars: &vars,
            last_status: 0,
        };
        let mut capture = Capture {
            closed: true,
            ..Capture::default()
        };
        assert_eq!(Builtin::Echo.run(&inv, &mut capture), Outcome::Status(1));
        assert!(capture.err.is_empty());
    }

    #[test]
    fn test_parse_args() {
        let args: Vec<String> = ["-rf", "a", "--", "-b", "--verbose"].iter().map(|s| s.to_string()).collect();
        let parsed = parse_args("rm", &args[..2], "rfv", &[("verbose", 'v')]).unwrap();
        assert!(parsed.has('r') && parsed.has('f'));
        assert_eq!(parsed.operands, vec!["a"]);

        let parsed = parse_args("rm", &args, "rfv", &[("verbose", 'v')]).unwrap();
        assert_eq!(parsed.operands, vec!["a", "-b", "--verbose"]);

        let err = parse_args("rm", &args[3..4], "rfv", &[]).err().unwrap();
        assert_eq!(err.to_string(), "rm: illegal option -- b");
    }
}
