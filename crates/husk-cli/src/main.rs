//! husk command-line interface
//!
//! `husk [-c STRING] [--cwd DIR] [FILE]`. Without a script argument the
//! script is read from stdin.

use std::io::Read;
use std::process;

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use husk_ast::Script;
use husk_interpreter::Interpreter;
use husk_parser::Parser;

fn cli() -> Command {
    Command::new("husk")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Embeddable POSIX-like shell")
        .arg(
            Arg::new("command")
                .short('c')
                .long("command")
                .value_name("STRING")
                .help("Execute command string")
                .num_args(1)
                .conflicts_with("file"),
        )
        .arg(
            Arg::new("cwd")
                .long("cwd")
                .value_name("DIR")
                .help("Run in DIR instead of the current directory")
                .num_args(1),
        )
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Script file to execute")
                .index(1),
        )
}

fn main() {
    let matches = cli().get_matches();
    match run(&matches) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{e:#}");
            process::exit(1);
        }
    }
}

fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let script = load_script(matches)?;

    let mut interpreter = Interpreter::from_process().context("husk: cannot read the working directory")?;
    if let Some(dir) = matches.get_one::<String>("cwd") {
        let mut env = interpreter.env().clone();
        env.change_dir(Some(dir))?;
        interpreter = Interpreter::new(env);
    }
    Ok(interpreter.execute(&script)?)
}

fn load_script(matches: &ArgMatches) -> anyhow::Result<Script> {
    if let Some(command) = matches.get_one::<String>("command") {
        return Ok(Parser::new(command)?.parse()?);
    }
    if let Some(path) = matches.get_one::<String>("file") {
        let content = std::fs::read_to_string(path).with_context(|| format!("husk: {path}"))?;
        return Ok(Parser::new_with_filename(&content, path)?.parse()?);
    }
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("husk: reading script from stdin")?;
    Ok(Parser::new_with_filename(&content, "<stdin>")?.parse()?)
}
