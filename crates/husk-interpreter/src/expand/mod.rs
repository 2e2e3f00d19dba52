//! Turning AST words into argv strings
//!
//! Each word goes through, in order:
//!
//! 1. variable, tilde and command substitution
//! 2. brace expansion
//! 3. field splitting, applied only to unquoted command substitutions
//! 4. pathname expansion of fields with unquoted glob characters
//!
//! Quoted text never takes part in steps 2 to 4. Variable values are never
//! split or globbed.

mod braces;
mod pathname;

use husk_ast::{Assign, Atom, ModifierKind, Script, SimpleAtom, VarModifier};

use crate::env::ShellEnv;
use crate::error::ExecError;

pub use braces::braces;

/// Runs command substitutions for the expander
pub(crate) trait Substitute {
    /// Run `script` in a copy of `env` and return everything it wrote to
    /// stdout.
    fn substitute(&mut self, script: &Script, env: &ShellEnv) -> Result<String, ExecError>;
}

/// A word after substitution, before brace expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Lit {
        text: String,
        /// Came from quotes; keeps an otherwise empty field alive
        quoted: bool,
        /// May contribute glob characters
        glob: bool,
    },
    /// Unquoted command substitution output, split on whitespace
    Split(String),
    Open,
    Comma,
    Close,
}

impl Piece {
    pub(crate) fn literal(text: &str) -> Self {
        Self::Lit {
            text: text.to_string(),
            quoted: false,
            glob: false,
        }
    }

    /// Concatenate pieces without splitting or globbing
    pub(crate) fn join(pieces: &[Self]) -> String {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Self::Lit { text, .. } | Self::Split(text) => out.push_str(text),
                Self::Open => out.push('{'),
                Self::Comma => out.push(','),
                Self::Close => out.push('}'),
            }
        }
        out
    }
}

/// One output field under construction
#[derive(Default)]
struct Field {
    text: String,
    /// `text` with everything that must match literally escaped
    pattern: String,
    globbable: bool,
    keep: bool,
}

impl Field {
    fn push(&mut self, text: &str, glob: bool) {
        self.text.push_str(text);
        if glob {
            self.pattern.push_str(text);
            self.globbable |= pathname::has_glob_chars(text);
        } else {
            self.pattern.push_str(&pathname::escape(text));
        }
    }

    fn finish(&mut self, fields: &mut Vec<Self>) {
        let field = std::mem::take(self);
        if field.keep || !field.text.is_empty() {
            fields.push(field);
        }
    }
}

pub(crate) struct Expander<'x> {
    env: &'x ShellEnv,
    subst: &'x mut dyn Substitute,
}

impl<'x> Expander<'x> {
    pub fn new(env: &'x ShellEnv, subst: &'x mut dyn Substitute) -> Self {
        Self { env, subst }
    }

    /// Expand command words into argv
    pub fn fields(&mut self, words: &[Atom]) -> Result<Vec<String>, ExecError> {
        let mut argv = Vec::new();
        for word in words {
            self.word_fields(word, &mut argv)?;
        }
        Ok(argv)
    }

    /// Expand a word to exactly one string: no splitting, braces or globs
    pub fn string(&mut self, word: &Atom) -> Result<String, ExecError> {
        Ok(Piece::join(&self.pieces(word)?))
    }

    /// Value of `NAME=value`; an absent value is the empty string
    pub fn assign_value(&mut self, assign: &Assign) -> Result<String, ExecError> {
        match &assign.value {
            Some(value) => self.string(value),
            None => Ok(String::new()),
        }
    }

    fn word_fields(&mut self, word: &Atom, argv: &mut Vec<String>) -> Result<(), ExecError> {
        let pieces = self.pieces(word)?;
        let variants = if pieces.contains(&Piece::Open) {
            braces::expand(pieces)
        } else {
            vec![pieces]
        };

        for variant in variants {
            for field in split_fields(variant) {
                if field.globbable {
                    let found = pathname::matches(&field.pattern, self.env.cwd());
                    if !found.is_empty() {
                        argv.extend(found);
                        continue;
                    }
                }
                argv.push(field.text);
            }
        }
        Ok(())
    }

    fn pieces(&mut self, word: &Atom) -> Result<Vec<Piece>, ExecError> {
        let mut pieces = Vec::with_capacity(word.parts().len());
        for part in word.parts() {
            let piece = match part {
                SimpleAtom::Text(text) => Piece::Lit {
                    text: text.clone(),
                    quoted: false,
                    glob: true,
                },
                SimpleAtom::QuotedText(text) => Piece::Lit {
                    text: text.clone(),
                    quoted: true,
                    glob: false,
                },
                SimpleAtom::Var { name, modifier, quoted } => Piece::Lit {
                    text: self.variable(name, modifier.as_ref()),
                    quoted: *quoted,
                    glob: false,
                },
                SimpleAtom::CmdSubst { script, quoted } => {
                    let mut output = self.subst.substitute(script, self.env)?;
                    strip_trailing_newline(&mut output);
                    if *quoted {
                        Piece::Lit {
                            text: output,
                            quoted: true,
                            glob: false,
                        }
                    } else {
                        Piece::Split(output)
                    }
                }
                SimpleAtom::Tilde => Piece::literal(&self.env.get("HOME").unwrap_or_else(|| "~".to_string())),
                SimpleAtom::BraceBegin => Piece::Open,
                SimpleAtom::BraceComma => Piece::Comma,
                SimpleAtom::BraceEnd => Piece::Close,
            };
            pieces.push(piece);
        }
        Ok(pieces)
    }

    fn variable(&self, name: &str, modifier: Option<&VarModifier>) -> String {
        let value = self.env.get(name);
        let Some(modifier) = modifier else {
            return value.unwrap_or_default();
        };
        let set = value
            .as_deref()
            .is_some_and(|value| !(modifier.check_empty && value.is_empty()));
        match (modifier.kind, set) {
            (ModifierKind::Default, true) => value.unwrap_or_default(),
            (ModifierKind::Default, false) | (ModifierKind::Alternative, true) => modifier.word.clone(),
            (ModifierKind::Alternative, false) => String::new(),
        }
    }
}

/// Split on whitespace inside `Split` pieces only
fn split_fields(pieces: Vec<Piece>) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut current = Field::default();
    for piece in pieces {
        match piece {
            Piece::Lit { text, quoted, glob } => {
                current.push(&text, glob);
                current.keep |= quoted;
            }
            Piece::Split(text) => {
                for (i, word) in text.split([' ', '\t', '\n']).enumerate() {
                    if i > 0 {
                        current.finish(&mut fields);
                    }
                    current.push(word, true);
                }
            }
            Piece::Open => current.push("{", false),
            Piece::Comma => current.push(",", false),
            Piece::Close => current.push("}", false),
        }
    }
    current.finish(&mut fields);
    fields
}

fn strip_trailing_newline(text: &mut String) {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.pop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use husk_ast::Expr;

    use super::*;

    /// Substitutes every `$(...)` with fixed output
    struct Fixed(&'static str);

    impl Substitute for Fixed {
        fn substitute(&mut self, _: &Script, _: &ShellEnv) -> Result<String, ExecError> {
            Ok(self.0.to_string())
        }
    }

    fn words(source: &str) -> Vec<Atom> {
        let script = husk_parser::parse(&format!("cmd {source}")).unwrap();
        match &script.statements[0].expressions[0] {
            Expr::Cmd(cmd) => cmd.name_and_args[1..].to_vec(),
            other => panic!("expected a command, got {other:?}"),
        }
    }

    fn env_in(cwd: &Path) -> ShellEnv {
        let inherited: HashMap<String, String> = [
            ("HOME".to_string(), "/home/me".to_string()),
            ("EMPTY".to_string(), String::new()),
            ("SPACED".to_string(), "a  *".to_string()),
        ]
        .into();
        ShellEnv::new(inherited, cwd.to_path_buf())
    }

    fn expand_in(cwd: &Path, source: &str, subst: &'static str) -> Vec<String> {
        let env = env_in(cwd);
        let mut fixed = Fixed(subst);
        Expander::new(&env, &mut fixed).fields(&words(source)).unwrap()
    }

    fn expand(source: &str) -> Vec<String> {
        expand_in(Path::new("/nonexistent"), source, "")
    }

    #[test]
    fn test_variables_are_not_split_or_globbed() {
        assert_eq!(expand("$SPACED"), ["a  *"]);
        assert_eq!(expand("x${SPACED}y"), ["xa  *y"]);
    }

    #[test]
    fn test_empty_unquoted_expansion_is_dropped() {
        assert_eq!(expand("$EMPTY $UNSET end"), ["end"]);
        assert_eq!(expand("\"$EMPTY\" ''"), ["", ""]);
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(expand("${UNSET:-dflt} ${EMPTY:-dflt} ${EMPTY-dflt}"), ["dflt", "dflt"]);
        assert_eq!(expand("${HOME:+alt} ${UNSET:+alt}x"), ["alt", "x"]);
    }

    #[test]
    fn test_tilde() {
        assert_eq!(expand("~ ~/bin"), ["/home/me", "/home/me/bin"]);
        assert_eq!(expand("'~'"), ["~"]);
    }

    #[test]
    fn test_braces_after_substitution() {
        assert_eq!(expand("$HOME/{a,b}"), ["/home/me/a", "/home/me/b"]);
        assert_eq!(expand("'{a,b}'"), ["{a,b}"]);
    }

    #[test]
    fn test_unquoted_substitution_splits() {
        let dir = Path::new("/nonexistent");
        assert_eq!(expand_in(dir, "$(x)", " one  two\n"), ["one", "two"]);
        assert_eq!(expand_in(dir, "pre$(x)post", "a b\n"), ["prea", "bpost"]);
        assert_eq!(expand_in(dir, "\"$(x)\"", "a b\n"), ["a b"]);
        assert_eq!(expand_in(dir, "$(x)", "\n"), Vec::<String>::new());
    }

    #[test]
    fn test_substitution_strips_one_newline() {
        let dir = Path::new("/nonexistent");
        assert_eq!(expand_in(dir, "\"$(x)\"", "line\n\n"), ["line\n"]);
        assert_eq!(expand_in(dir, "\"$(x)\"", "crlf\r\n"), ["crlf"]);
    }

    #[test]
    fn test_globbing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.md"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(expand_in(dir.path(), "*.txt", ""), ["a.txt", "b.txt"]);
        assert_eq!(expand_in(dir.path(), "'*'.txt", ""), ["*.txt"]);
        assert_eq!(expand_in(dir.path(), "*.none", ""), ["*.none"]);
        assert_eq!(expand_in(dir.path(), "{a,c}.*", ""), ["a.txt", "c.md"]);
        assert_eq!(expand_in(dir.path(), "$(x)", "*.md"), ["c.md"]);
    }

    #[test]
    fn test_string_expansion_is_single() {
        let env = env_in(Path::new("/"));
        let mut fixed = Fixed("a b\n");
        let mut expander = Expander::new(&env, &mut fixed);
        let word = &words("{x,y}*$(cmd)")[0];
        assert_eq!(expander.string(word).unwrap(), "{x,y}*a b");
    }
}
