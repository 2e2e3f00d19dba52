//! Lexical analysis for Husk shell
//!
//! Scanning uses two logos automata: one for unquoted text and one for the
//! inside of double quotes. A frame stack tracks open quotes and command
//! substitutions so that `)`, `"` and backticks close the right construct.
//! Host values are spliced in through reserved markers and are never
//! re-lexed as script text.

use husk_ast::{HostSlot, HuskError, LexErrorKind, ModifierKind, RedirectSpec, SourceMap, Span, VarModifier};
use logos::Logos;

/// Reserved character framing host value placeholders in template text
pub const HOST_MARKER: char = '\x08';

/// Placeholder text standing for host slot `index`
#[must_use]
pub fn host_placeholder(index: usize) -> String {
    format!("{HOST_MARKER}{index}{HOST_MARKER}")
}

/// Shell tokens handed to the parser
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    /// Unquoted text; brace and glob characters stay active
    Text(String),
    /// Single-quoted, backslash-escaped or host-provided literal text
    QuotedText(String),
    /// Literal text from inside double quotes
    DoubleQuotedText(String),
    /// `$NAME`, `${NAME}`, `${NAME:-word}`, `$?`
    Var {
        name: String,
        modifier: Option<VarModifier>,
        quoted: bool,
    },
    /// `~` at the start of a word
    Tilde,
    /// Blank run separating two words
    Delimit,
    /// `;` or newline
    Semicolon,
    Pipe,
    DoublePipe,
    Ampersand,
    DoubleAmpersand,
    Redirect(RedirectSpec),
    BraceBegin,
    Comma,
    BraceEnd,
    /// `$(` or an opening backtick
    CmdSubstBegin {
        quoted: bool,
    },
    /// `)` or backtick closing a substitution
    CmdSubstEnd,
    OpenParen,
    CloseParen,
    /// Host object reference, by slot index
    JSObjRef(usize),
    Eof,
}

impl Token {
    /// Whether the token can be part of a word
    #[must_use]
    pub const fn is_word_part(&self) -> bool {
        matches!(
            self,
            Self::Text(_)
                | Self::QuotedText(_)
                | Self::DoubleQuotedText(_)
                | Self::Var { .. }
                | Self::Tilde
                | Self::BraceBegin
                | Self::Comma
                | Self::BraceEnd
                | Self::CmdSubstBegin { .. }
        )
    }
}

/// Token with location information
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    pub text: String,
}

fn redirect(lex: &mut logos::Lexer<'_, Plain>) -> Option<RedirectSpec> {
    RedirectSpec::from_operator(lex.slice())
}

/// Raw tokens outside of double quotes
#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
enum Plain {
    #[regex(r"[ \t\r\x0c]+")]
    Blank,

    #[token("\n")]
    Newline,

    /// Backslash-newline joins lines
    #[token("\\\n")]
    Continuation,

    #[regex(r"\\[^\n]")]
    Escape,

    /// Trailing backslash at end of input
    #[token("\\")]
    Backslash,

    #[regex(r"'[^']*'")]
    SingleQuoted,

    #[token("'")]
    UnclosedSingleQuote,

    #[token("\"")]
    DoubleQuote,

    #[token("$(")]
    SubstOpen,

    #[token("`")]
    Backtick,

    #[regex(r"\$\{[^}\n]*\}")]
    BracedVar,

    #[token("${")]
    UnclosedBracedVar,

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    Var,

    #[token("$?")]
    Status,

    /// A `$` that starts no expansion
    #[token("$")]
    Dollar,

    #[token(";")]
    Semicolon,

    #[token("|")]
    Pipe,

    #[token("||")]
    DoublePipe,

    #[token("&")]
    Ampersand,

    #[token("&&")]
    DoubleAmpersand,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[token("<", redirect)]
    #[token("0<", redirect)]
    #[token("0>", redirect)]
    #[token(">", redirect)]
    #[token("1>", redirect)]
    #[token(">>", redirect)]
    #[token("1>>", redirect)]
    #[token("2>", redirect)]
    #[token("2>>", redirect)]
    #[token("&>", redirect)]
    #[token("&>>", redirect)]
    #[token("2>&1", redirect)]
    #[token("1>&2", redirect)]
    #[token(">&2", redirect)]
    Redirect(RedirectSpec),

    #[token("{")]
    BraceOpen,

    #[token(",")]
    Comma,

    #[token("}")]
    BraceClose,

    #[token("#")]
    Hash,

    #[token("~")]
    Tilde,

    #[token("\x08")]
    Marker,

    #[regex(r#"[^ \t\r\x0c\n'"\\$`;|&()<>{},#~\x08]+"#)]
    Word,
}

/// Raw tokens between double quotes
#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
enum Quoted {
    #[token("\"")]
    Close,

    /// Only `\$`, `` \` ``, `\"` and `\\` are escapes inside double quotes
    #[regex(r#"\\[$`"\\]"#)]
    Escape,

    #[token("\\\n")]
    Continuation,

    #[token("\\")]
    Backslash,

    #[token("$(")]
    SubstOpen,

    #[token("`")]
    Backtick,

    #[regex(r"\$\{[^}\n]*\}")]
    BracedVar,

    #[token("${")]
    UnclosedBracedVar,

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    Var,

    #[token("$?")]
    Status,

    #[token("$")]
    Dollar,

    #[token("\x08")]
    Marker,

    #[regex(r#"[^"\\$`\x08]+"#)]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    DoubleQuote,
    Subst { parens: usize },
    Backtick,
}

/// Per-word bookkeeping for brace balancing
#[derive(Debug, Clone, Copy, Default)]
struct WordState {
    in_word: bool,
    start: usize,
    brace_depth: usize,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    open: usize,
    first_token: usize,
    /// Word state of the enclosing text, restored when a substitution closes
    saved: WordState,
}

/// Lexer that produces tokens with spans
pub struct Lexer<'input> {
    input: &'input str,
    slots: &'input [HostSlot],
    filename: String,
    pos: usize,
    tokens: Vec<SpannedToken>,
    frames: Vec<Frame>,
    word: WordState,
}

impl<'input> Lexer<'input> {
    #[must_use]
    pub fn new(input: &'input str) -> Self {
        Self::with_host(input, &[])
    }

    /// Lexer for a template whose placeholders refer to `slots`
    #[must_use]
    pub fn with_host(input: &'input str, slots: &'input [HostSlot]) -> Self {
        Self {
            input,
            slots,
            filename: "<input>".to_string(),
            pos: 0,
            tokens: Vec::new(),
            frames: Vec::new(),
            word: WordState::default(),
        }
    }

    /// Name reported in error locations
    #[must_use]
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = filename.to_string();
        self
    }

    /// Tokenize the entire input
    ///
    /// # Errors
    ///
    /// Returns `HuskError::Lex` for unterminated quotes or substitutions,
    /// malformed `${...}` and invalid host value references.
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, HuskError> {
        while self.pos < self.input.len() {
            if matches!(self.frames.last(), Some(frame) if frame.kind == FrameKind::DoubleQuote) {
                self.step_quoted()?;
            } else {
                self.step_plain()?;
            }
        }

        if let Some(frame) = self.frames.last() {
            let kind = match frame.kind {
                FrameKind::DoubleQuote => LexErrorKind::UnterminatedDoubleQuote,
                FrameKind::Subst { .. } => LexErrorKind::UnterminatedSubstitution,
                FrameKind::Backtick => LexErrorKind::UnterminatedBacktick,
            };
            return Err(self.error(kind, Span::new(frame.open, self.input.len())));
        }

        self.end_word();
        let end = self.input.len();
        self.push(Token::Eof, Span::new(end, end));
        Ok(std::mem::take(&mut self.tokens))
    }

    fn step_plain(&mut self) -> Result<(), HuskError> {
        let input = self.input;
        let mut lex = Plain::lexer(&input[self.pos..]);
        let Some(result) = lex.next() else {
            self.pos = self.input.len();
            return Ok(());
        };
        let range = lex.span();
        let span = Span::new(self.pos + range.start, self.pos + range.end);
        let slice = lex.slice();
        self.pos = span.end;

        let Ok(raw) = result else {
            self.word_part(Token::Text(slice.to_string()), span);
            return Ok(());
        };

        match raw {
            Plain::Blank => {
                if self.word.in_word {
                    self.end_word();
                    self.push(Token::Delimit, span);
                }
            }
            Plain::Newline => self.operator(Token::Semicolon, span),
            Plain::Continuation => {}
            Plain::Escape => self.word_part(Token::QuotedText(slice[1..].to_string()), span),
            Plain::Backslash => self.word_part(Token::Text("\\".to_string()), span),
            Plain::SingleQuoted => {
                self.word_part(Token::QuotedText(slice[1..slice.len() - 1].to_string()), span);
            }
            Plain::UnclosedSingleQuote => {
                return Err(self.error(
                    LexErrorKind::UnterminatedSingleQuote,
                    Span::new(span.start, self.input.len()),
                ));
            }
            Plain::DoubleQuote => {
                self.begin_word();
                self.frames.push(Frame {
                    kind: FrameKind::DoubleQuote,
                    open: span.start,
                    first_token: self.tokens.len(),
                    saved: self.word,
                });
            }
            Plain::SubstOpen => self.open_subst(FrameKind::Subst { parens: 0 }, false, span),
            Plain::Backtick => {
                if matches!(self.frames.last(), Some(frame) if frame.kind == FrameKind::Backtick) {
                    self.close_subst(span);
                } else {
                    self.open_subst(FrameKind::Backtick, false, span);
                }
            }
            Plain::BracedVar => {
                let token = self.braced_var(slice, span, false)?;
                self.word_part(token, span);
            }
            Plain::UnclosedBracedVar => return Err(self.error(LexErrorKind::BadSubstitution, span)),
            Plain::Var => self.word_part(simple_var(&slice[1..], false), span),
            Plain::Status => self.word_part(simple_var("?", false), span),
            Plain::Dollar => self.word_part(Token::Text("$".to_string()), span),
            Plain::Semicolon => self.operator(Token::Semicolon, span),
            Plain::Pipe => self.operator(Token::Pipe, span),
            Plain::DoublePipe => self.operator(Token::DoublePipe, span),
            Plain::Ampersand => self.operator(Token::Ampersand, span),
            Plain::DoubleAmpersand => self.operator(Token::DoubleAmpersand, span),
            Plain::OpenParen => {
                if let Some(Frame {
                    kind: FrameKind::Subst { parens },
                    ..
                }) = self.frames.last_mut()
                {
                    *parens += 1;
                }
                self.operator(Token::OpenParen, span);
            }
            Plain::CloseParen => match self.frames.last_mut() {
                Some(Frame {
                    kind: FrameKind::Subst { parens: 0 },
                    ..
                }) => self.close_subst(span),
                Some(Frame {
                    kind: FrameKind::Subst { parens },
                    ..
                }) => {
                    *parens -= 1;
                    self.operator(Token::CloseParen, span);
                }
                _ => self.operator(Token::CloseParen, span),
            },
            Plain::Redirect(spec) => self.operator(Token::Redirect(spec), span),
            Plain::BraceOpen => {
                self.begin_word();
                self.word.brace_depth += 1;
                self.push(Token::BraceBegin, span);
            }
            Plain::Comma => {
                if self.word.in_word && self.word.brace_depth > 0 {
                    self.push(Token::Comma, span);
                } else {
                    self.word_part(Token::Text(",".to_string()), span);
                }
            }
            Plain::BraceClose => {
                if self.word.in_word && self.word.brace_depth > 0 {
                    self.word.brace_depth -= 1;
                    self.push(Token::BraceEnd, span);
                } else {
                    self.word_part(Token::Text("}".to_string()), span);
                }
            }
            Plain::Hash => {
                if self.word.in_word {
                    self.word_part(Token::Text("#".to_string()), span);
                } else {
                    self.pos = self.input[self.pos..]
                        .find('\n')
                        .map_or(self.input.len(), |offset| self.pos + offset);
                }
            }
            Plain::Tilde => {
                let ends_prefix = self.input[self.pos..]
                    .chars()
                    .next()
                    .is_none_or(|next| next == '/' || ends_word(next));
                if !self.word.in_word && ends_prefix {
                    self.word_part(Token::Tilde, span);
                } else {
                    self.word_part(Token::Text("~".to_string()), span);
                }
            }
            Plain::Marker => self.host_value(span.start, false)?,
            Plain::Word => self.word_part(Token::Text(slice.to_string()), span),
        }
        Ok(())
    }

    fn step_quoted(&mut self) -> Result<(), HuskError> {
        let input = self.input;
        let mut lex = Quoted::lexer(&input[self.pos..]);
        let Some(result) = lex.next() else {
            self.pos = self.input.len();
            return Ok(());
        };
        let range = lex.span();
        let span = Span::new(self.pos + range.start, self.pos + range.end);
        let slice = lex.slice();
        self.pos = span.end;

        let Ok(raw) = result else {
            self.word_part(Token::DoubleQuotedText(slice.to_string()), span);
            return Ok(());
        };

        match raw {
            Quoted::Close => {
                if let Some(frame) = self.frames.pop()
                    && self.tokens.len() == frame.first_token
                {
                    // `""` is still a word
                    self.push(Token::DoubleQuotedText(String::new()), Span::new(frame.open, span.end));
                }
            }
            Quoted::Escape => self.word_part(Token::DoubleQuotedText(slice[1..].to_string()), span),
            Quoted::Continuation => {}
            Quoted::Backslash => self.word_part(Token::DoubleQuotedText("\\".to_string()), span),
            Quoted::SubstOpen => self.open_subst(FrameKind::Subst { parens: 0 }, true, span),
            Quoted::Backtick => self.open_subst(FrameKind::Backtick, true, span),
            Quoted::BracedVar => {
                let token = self.braced_var(slice, span, true)?;
                self.word_part(token, span);
            }
            Quoted::UnclosedBracedVar => return Err(self.error(LexErrorKind::BadSubstitution, span)),
            Quoted::Var => self.word_part(simple_var(&slice[1..], true), span),
            Quoted::Status => self.word_part(simple_var("?", true), span),
            Quoted::Dollar => self.word_part(Token::DoubleQuotedText("$".to_string()), span),
            Quoted::Marker => self.host_value(span.start, true)?,
            Quoted::Text => self.word_part(Token::DoubleQuotedText(slice.to_string()), span),
        }
        Ok(())
    }

    fn open_subst(&mut self, kind: FrameKind, quoted: bool, span: Span) {
        self.begin_word();
        let saved = std::mem::take(&mut self.word);
        self.frames.push(Frame {
            kind,
            open: span.start,
            first_token: self.tokens.len(),
            saved,
        });
        self.push(Token::CmdSubstBegin { quoted }, span);
    }

    fn close_subst(&mut self, span: Span) {
        self.end_word();
        if let Some(frame) = self.frames.pop() {
            self.word = frame.saved;
        }
        self.push(Token::CmdSubstEnd, span);
    }

    /// Splice host slot `index` in at the current position. `self.pos` is
    /// just past the opening marker.
    fn host_value(&mut self, start: usize, quoted: bool) -> Result<(), HuskError> {
        let input = self.input;
        let rest = &input[self.pos..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let closed = rest[digits..].starts_with(HOST_MARKER);
        if digits == 0 || !closed {
            return Err(self.error(LexErrorKind::ReservedCharacter, Span::new(start, self.pos)));
        }
        let index: usize = rest[..digits]
            .parse()
            .map_err(|_| self.error(LexErrorKind::UnknownHostValue, Span::new(start, self.pos + digits)))?;
        self.pos += digits + HOST_MARKER.len_utf8();
        let span = Span::new(start, self.pos);

        let slots = self.slots;
        let Some(slot) = slots.get(index) else {
            return Err(self.error(LexErrorKind::UnknownHostValue, span));
        };
        match slot {
            HostSlot::Text(text) if quoted => self.word_part(Token::DoubleQuotedText(text.clone()), span),
            HostSlot::Text(text) => self.word_part(Token::QuotedText(text.clone()), span),
            HostSlot::List(items) if quoted => self.word_part(Token::DoubleQuotedText(items.join(" ")), span),
            HostSlot::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.end_word();
                        self.push(Token::Delimit, span);
                    }
                    self.word_part(Token::QuotedText(item.clone()), span);
                }
            }
            HostSlot::Object if quoted => return Err(self.error(LexErrorKind::ObjectInQuotes, span)),
            HostSlot::Object => self.word_part(Token::JSObjRef(index), span),
        }
        Ok(())
    }

    fn braced_var(&self, slice: &str, span: Span, quoted: bool) -> Result<Token, HuskError> {
        let body = &slice[2..slice.len() - 1];
        let name_len = if body.starts_with('?') {
            1
        } else {
            body.char_indices()
                .take_while(|&(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
                .count()
        };
        if name_len == 0 {
            return Err(self.error(LexErrorKind::BadSubstitution, span));
        }
        let (name, rest) = body.split_at(name_len);
        let modifier = parse_modifier(rest).ok_or_else(|| self.error(LexErrorKind::BadSubstitution, span))?;
        Ok(Token::Var {
            name: name.to_string(),
            modifier,
            quoted,
        })
    }

    fn begin_word(&mut self) {
        if !self.word.in_word {
            self.word = WordState {
                in_word: true,
                start: self.tokens.len(),
                brace_depth: 0,
            };
        }
    }

    /// Close the current word. Brace tokens of a word whose braces never
    /// balanced fall back to plain text.
    fn end_word(&mut self) {
        if !self.word.in_word {
            return;
        }
        if self.word.brace_depth > 0 {
            let mut nested = 0usize;
            for spanned in &mut self.tokens[self.word.start..] {
                let literal = match spanned.token {
                    Token::CmdSubstBegin { .. } => {
                        nested += 1;
                        continue;
                    }
                    Token::CmdSubstEnd => {
                        nested = nested.saturating_sub(1);
                        continue;
                    }
                    Token::BraceBegin if nested == 0 => "{",
                    Token::Comma if nested == 0 => ",",
                    Token::BraceEnd if nested == 0 => "}",
                    _ => continue,
                };
                spanned.token = Token::Text(literal.to_string());
            }
        }
        self.word = WordState::default();
    }

    fn word_part(&mut self, token: Token, span: Span) {
        self.begin_word();
        self.push(token, span);
    }

    fn operator(&mut self, token: Token, span: Span) {
        self.end_word();
        self.push(token, span);
    }

    fn push(&mut self, token: Token, span: Span) {
        let text = self.input.get(span.start..span.end).unwrap_or_default().to_string();
        self.tokens.push(SpannedToken { token, span, text });
    }

    fn error(&self, kind: LexErrorKind, span: Span) -> HuskError {
        HuskError::lex(kind, span, &SourceMap::new(self.input), &self.filename)
    }
}

fn simple_var(name: &str, quoted: bool) -> Token {
    Token::Var {
        name: name.to_string(),
        modifier: None,
        quoted,
    }
}

fn ends_word(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')' | '<' | '>')
}

/// Parse what follows the name in `${NAME...}`. `None` means malformed.
fn parse_modifier(rest: &str) -> Option<Option<VarModifier>> {
    if rest.is_empty() {
        return Some(None);
    }
    let (check_empty, rest) = match rest.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let kind = match rest.chars().next() {
        Some('-') => ModifierKind::Default,
        Some('+') => ModifierKind::Alternative,
        _ => return None,
    };
    Some(Some(VarModifier {
        kind,
        check_empty,
        word: rest[1..].to_string(),
    }))
}
