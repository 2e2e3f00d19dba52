//! Builtins that act on the shell scope itself

use husk_parser::escape;

use crate::env::ShellEnv;

/// What a shell-scope builtin printed and how it ended
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Output {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    fn failed(code: i32, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: format!("{message}\n"),
        }
    }
}

pub(super) fn is_shell_builtin(name: &str, argc: usize) -> bool {
    name == "cd" || (name == "export" && argc == 0)
}

pub(super) fn run(name: &str, args: &[String], env: &mut ShellEnv) -> Output {
    match name {
        "cd" => cd(args, env),
        _ => export(env),
    }
}

/// `cd [DIR | -]`
fn cd(args: &[String], env: &mut ShellEnv) -> Output {
    if args.len() > 1 {
        return Output::failed(1, "cd: too many arguments");
    }
    let target = args.first().map(String::as_str);
    match env.change_dir(target) {
        Ok(cwd) if target == Some("-") => Output {
            stdout: format!("{}\n", cwd.display()),
            ..Output::default()
        },
        Ok(_) => Output::default(),
        Err(err) => Output::failed(err.exit_code(), &err),
    }
}

/// Bare `export`: list exported shell variables
fn export(env: &ShellEnv) -> Output {
    let mut stdout = String::new();
    for (name, value) in env.exported() {
        stdout.push_str(&format!("export {name}={}\n", escape(value)));
    }
    Output {
        stdout,
        ..Output::default()
    }
}
