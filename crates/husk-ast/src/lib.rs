//! Abstract Syntax Tree definitions for Husk
//!
//! Tokens and AST nodes keep byte spans so that lexing and parsing errors can
//! be reported as `file:line:column`.

use std::fmt;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub const fn to(self, other: Span) -> Self {
        let start = if self.start < other.start { self.start } else { other.start };
        let end = if self.end > other.end { self.end } else { other.end };
        Self { start, end }
    }
}

/// Line and column position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Convert byte span to line/column positions
#[derive(Debug)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (pos, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(pos + 1);
            }
        }
        Self { line_starts }
    }

    #[must_use]
    pub fn position(&self, byte_offset: usize) -> Position {
        match self.line_starts.binary_search(&byte_offset) {
            Ok(line) => Position::new(line + 1, 1),
            Err(line) => {
                let line_start = self.line_starts[line - 1];
                Position::new(line, byte_offset - line_start + 1)
            }
        }
    }

    #[must_use]
    pub fn span_to_positions(&self, span: Span) -> (Position, Position) {
        (self.position(span.start), self.position(span.end))
    }
}

/// A value interpolated into a script by the host, as seen by the lexer.
///
/// The lexer never re-reads the contents of a slot as script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSlot {
    /// A string or path, spliced in as literal text
    Text(String),
    /// A list of strings, one word per element
    List(Vec<String>),
    /// An opaque host object (buffer, byte source); only valid as a redirect target
    Object,
}

/// Top-level program: statements separated by `;` or newlines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One statement. Every expression except possibly the last is backgrounded
/// (`a & b & c`).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub expressions: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Simple command: `FOO=1 ls -la > out`
    Cmd(Cmd),
    /// `cmd1 | cmd2 | cmd3`
    Pipeline(Pipeline),
    /// `left && right`, `left || right`
    Cond(Box<Cond>),
    /// Assignment-only statement: `A=1 B=2`, `export A=1`
    Assign(Vec<Assign>),
    /// `( script )`
    Subshell(Subshell),
    /// `expr &`
    Async(Box<Expr>),
}

/// Simple command with command-local assigns and redirects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cmd {
    pub assigns: Vec<Assign>,
    pub name_and_args: Vec<Atom>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub items: Vec<PipelineItem>,
}

/// Anything that can be a pipeline stage. Conditionals bind looser than
/// pipes and are deliberately absent.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineItem {
    Cmd(Cmd),
    Assign(Vec<Assign>),
    Subshell(Subshell),
}

impl From<PipelineItem> for Expr {
    fn from(item: PipelineItem) -> Self {
        match item {
            PipelineItem::Cmd(cmd) => Self::Cmd(cmd),
            PipelineItem::Assign(assigns) => Self::Assign(assigns),
            PipelineItem::Subshell(subshell) => Self::Subshell(subshell),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub op: CondOp,
    pub left: Expr,
    pub right: Expr,
}

/// `label=value`. `value` is `None` only for `export label`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub label: String,
    pub value: Option<Atom>,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subshell {
    pub script: Script,
    pub redirects: Vec<Redirect>,
}

/// A parsed word
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Simple(SimpleAtom),
    /// Adjacent fragments forming one word, e.g. `foo"$VAR"bar`
    Compound(Vec<SimpleAtom>),
}

impl Atom {
    /// Build an atom from fragments, collapsing single-fragment words.
    #[must_use]
    pub fn from_parts(mut parts: Vec<SimpleAtom>) -> Self {
        if parts.len() == 1 {
            Self::Simple(parts.remove(0))
        } else {
            Self::Compound(parts)
        }
    }

    #[must_use]
    pub fn parts(&self) -> &[SimpleAtom] {
        match self {
            Self::Simple(part) => std::slice::from_ref(part),
            Self::Compound(parts) => parts,
        }
    }

    /// The literal text of the atom when it contains no expansions at all
    #[must_use]
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in self.parts() {
            match part {
                SimpleAtom::Text(text) | SimpleAtom::QuotedText(text) => out.push_str(text),
                _ => return None,
            }
        }
        Some(out)
    }

    #[must_use]
    pub fn has_brace_expansion(&self) -> bool {
        self.parts().iter().any(|part| matches!(part, SimpleAtom::BraceBegin))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleAtom {
    /// Unquoted text, subject to brace and glob expansion
    Text(String),
    /// Single-quoted, double-quoted or escaped literal text
    QuotedText(String),
    Var {
        name: String,
        modifier: Option<VarModifier>,
        quoted: bool,
    },
    CmdSubst {
        script: Box<Script>,
        quoted: bool,
    },
    /// `~` at the start of a word
    Tilde,
    BraceBegin,
    BraceComma,
    BraceEnd,
}

/// `${NAME:-word}` style modifiers; `word` is literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarModifier {
    pub kind: ModifierKind,
    /// `:` form: treat an empty value like an unset one
    pub check_empty: bool,
    pub word: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    /// `${NAME:-word}`
    Default,
    /// `${NAME:+word}`
    Alternative,
}

/// Which descriptors a redirect touches and how the target is opened.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RedirectSpec(u8);

impl RedirectSpec {
    pub const STDIN: Self = Self(1);
    pub const STDOUT: Self = Self(1 << 1);
    pub const STDERR: Self = Self(1 << 2);
    pub const TRUNCATE: Self = Self(1 << 3);
    pub const APPEND: Self = Self(1 << 4);
    pub const DUPLICATE_OUT: Self = Self(1 << 5);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `<` style: the target is opened for reading
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.contains(Self::STDIN) && !self.contains(Self::TRUNCATE) && !self.contains(Self::APPEND)
    }

    #[must_use]
    pub const fn is_append(self) -> bool {
        self.contains(Self::APPEND)
    }

    #[must_use]
    pub const fn is_duplicate(self) -> bool {
        self.contains(Self::DUPLICATE_OUT)
    }

    /// Map a redirect operator to its flags.
    #[must_use]
    pub fn from_operator(op: &str) -> Option<Self> {
        let out = |fd: Self, mode: Self| fd.union(mode);
        let spec = match op {
            "<" | "0<" => Self::STDIN,
            "0>" => out(Self::STDIN, Self::TRUNCATE),
            ">" | "1>" => out(Self::STDOUT, Self::TRUNCATE),
            ">>" | "1>>" => out(Self::STDOUT, Self::APPEND),
            "2>" => out(Self::STDERR, Self::TRUNCATE),
            "2>>" => out(Self::STDERR, Self::APPEND),
            "&>" => out(Self::STDOUT.union(Self::STDERR), Self::TRUNCATE),
            "&>>" => out(Self::STDOUT.union(Self::STDERR), Self::APPEND),
            "2>&1" => out(Self::STDERR, Self::DUPLICATE_OUT),
            "1>&2" | ">&2" => out(Self::STDOUT, Self::DUPLICATE_OUT),
            _ => return None,
        };
        Some(spec)
    }
}

impl std::ops::BitOr for RedirectSpec {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for RedirectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::STDIN, "stdin"),
            (Self::STDOUT, "stdout"),
            (Self::STDERR, "stderr"),
            (Self::TRUNCATE, "truncate"),
            (Self::APPEND, "append"),
            (Self::DUPLICATE_OUT, "duplicate_out"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "RedirectSpec({})", set.join("|"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub spec: RedirectSpec,
    pub target: RedirectTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    /// A word naming a file
    Atom(Atom),
    /// An interpolated host object
    Host(usize),
    /// `2>&1` / `1>&2`: no target of its own
    Duplicate,
}

/// What went wrong while lexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedSingleQuote,
    UnterminatedDoubleQuote,
    UnterminatedSubstitution,
    UnterminatedBacktick,
    ObjectInQuotes,
    UnknownHostValue,
    ReservedCharacter,
    BadSubstitution,
}

impl LexErrorKind {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::UnterminatedSingleQuote => "unterminated single quote",
            Self::UnterminatedDoubleQuote => "unterminated double quote",
            Self::UnterminatedSubstitution => "unterminated command substitution",
            Self::UnterminatedBacktick => "unterminated backtick command substitution",
            Self::ObjectInQuotes => "JS object reference not allowed in double quotes",
            Self::UnknownHostValue => "reference to an unknown interpolated value",
            Self::ReservedCharacter => "reserved character \\x08 in script text",
            Self::BadSubstitution => "bad substitution",
        }
    }
}

/// Errors that abort a script before any command runs
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HuskError {
    #[error("husk:{filename}:{line}:{column}: ERR_LEX: {}", .kind.message())]
    Lex {
        kind: LexErrorKind,
        span: Span,
        filename: String,
        line: usize,
        column: usize,
    },

    #[error("husk:{filename}:{line}:{column}: ERR_SYNTAX: {message}")]
    Syntax {
        message: String,
        span: Span,
        filename: String,
        line: usize,
        column: usize,
    },

    #[error("husk: ERR_EXPANSION: {message}")]
    Expansion { message: String },
}

impl HuskError {
    #[must_use]
    pub fn lex(kind: LexErrorKind, span: Span, source_map: &SourceMap, filename: &str) -> Self {
        let pos = source_map.position(span.start);
        Self::Lex {
            kind,
            span,
            filename: filename.to_string(),
            line: pos.line,
            column: pos.column,
        }
    }

    #[must_use]
    pub fn syntax(message: String, span: Span, source_map: &SourceMap, filename: &str) -> Self {
        let pos = source_map.position(span.start);
        Self::Syntax {
            message,
            span,
            filename: filename.to_string(),
            line: pos.line,
            column: pos.column,
        }
    }

    #[must_use]
    pub fn expansion(message: impl Into<String>) -> Self {
        Self::Expansion {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Lex { span, .. } | Self::Syntax { span, .. } => *span,
            Self::Expansion { .. } => Span::dummy(),
        }
    }

    /// The bare message without location prefix
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Lex { kind, .. } => kind.message().to_string(),
            Self::Syntax { message, .. } | Self::Expansion { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        let span = Span::new(10, 20);
        assert_eq!(span.start, 10);
        assert_eq!(span.end, 20);
        assert_eq!(span.to(Span::new(2, 12)), Span::new(2, 20));
    }

    #[test]
    fn test_source_map() {
        let source = "echo hello\necho world\n";
        let source_map = SourceMap::new(source);

        let pos = source_map.position(0);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 1);

        let pos = source_map.position(4);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 5);

        let pos = source_map.position(11);
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 1);
    }

    #[test]
    fn test_redirect_operators() {
        let out = RedirectSpec::from_operator(">").unwrap();
        assert!(out.contains(RedirectSpec::STDOUT));
        assert!(out.contains(RedirectSpec::TRUNCATE));
        assert!(!out.is_append());

        let both = RedirectSpec::from_operator("&>>").unwrap();
        assert!(both.contains(RedirectSpec::STDOUT | RedirectSpec::STDERR));
        assert!(both.is_append());
        assert!(!both.contains(RedirectSpec::TRUNCATE));

        assert!(RedirectSpec::from_operator("<").unwrap().is_read());
        assert!(!RedirectSpec::from_operator("0>").unwrap().is_read());
        assert!(RedirectSpec::from_operator("2>&1").unwrap().is_duplicate());
        assert_eq!(RedirectSpec::from_operator("=>"), None);
    }

    #[test]
    fn test_redirect_debug_lists_flags() {
        let spec = RedirectSpec::from_operator("2>>").unwrap();
        assert_eq!(format!("{spec:?}"), "RedirectSpec(stderr|append)");
    }

    #[test]
    fn test_atom_literal() {
        let atom = Atom::from_parts(vec![
            SimpleAtom::Text("foo".into()),
            SimpleAtom::QuotedText("bar".into()),
        ]);
        assert_eq!(atom.as_literal().as_deref(), Some("foobar"));

        let var = Atom::from_parts(vec![SimpleAtom::Var {
            name: "HOME".into(),
            modifier: None,
            quoted: false,
        }]);
        assert!(matches!(var, Atom::Simple(_)));
        assert_eq!(var.as_literal(), None);
    }

    #[test]
    fn test_error_with_proper_format() {
        let source = "echo hello\necho 'oops";
        let source_map = SourceMap::new(source);
        let span = Span::new(16, 21);

        let error = HuskError::lex(LexErrorKind::UnterminatedSingleQuote, span, &source_map, "test.sh");

        let error_str = format!("{error}");
        assert!(error_str.contains("husk:test.sh:2:6"));
        assert!(error_str.contains("ERR_LEX: unterminated single quote"));
        assert_eq!(error.span(), span);
    }

    #[test]
    fn test_pipeline_item_into_expr() {
        let expr: Expr = PipelineItem::Assign(vec![]).into();
        assert!(matches!(expr, Expr::Assign(_)));
    }
}
