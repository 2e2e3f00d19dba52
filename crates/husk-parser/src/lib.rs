//! Recursive-descent parser for Husk shell
//!
//! Precedence from loosest to tightest: `;`/newline, `&`, `&&`/`||`, `|`,
//! simple command. Subshells are accepted only at the start of a pipeline
//! item and may be followed by redirects only.

use husk_ast::{
    Assign, Atom, Cmd, Cond, CondOp, Expr, HostSlot, HuskError, Pipeline, PipelineItem, Redirect,
    RedirectSpec, RedirectTarget, Script, SimpleAtom, SourceMap, Span, Statement, Subshell,
};
use husk_lexer::{Lexer, SpannedToken, Token};

// String processing utilities
pub mod string_utils;

pub use string_utils::escape;

#[derive(Debug)]
pub struct Parser {
    input: String,
    source_map: SourceMap,
    filename: String,
    tokens: Vec<SpannedToken>,
}

impl Parser {
    /// Create a new parser for the given input
    ///
    /// # Errors
    ///
    /// Returns `HuskError` if there are lexical errors in the input
    pub fn new(input: &str) -> Result<Self, HuskError> {
        Self::new_with_filename(input, "<input>")
    }

    /// Create a new parser for the given input with a filename
    ///
    /// # Errors
    ///
    /// Returns `HuskError` if there are lexical errors in the input
    pub fn new_with_filename(input: &str, filename: &str) -> Result<Self, HuskError> {
        Self::build(input, &[], filename)
    }

    /// Create a parser for a template whose placeholders refer to `slots`
    ///
    /// # Errors
    ///
    /// Returns `HuskError` if there are lexical errors in the input
    pub fn with_template(input: &str, slots: &[HostSlot]) -> Result<Self, HuskError> {
        Self::build(input, slots, "<template>")
    }

    fn build(input: &str, slots: &[HostSlot], filename: &str) -> Result<Self, HuskError> {
        let tokens = Lexer::with_host(input, slots).with_filename(filename).tokenize()?;
        Ok(Self {
            input: input.to_string(),
            source_map: SourceMap::new(input),
            filename: filename.to_string(),
            tokens,
        })
    }

    /// Parse the input into a script AST
    ///
    /// # Errors
    ///
    /// Returns `HuskError` if there are syntax errors during parsing
    pub fn parse(&self) -> Result<Script, HuskError> {
        let mut cursor = Cursor { parser: self, pos: 0 };
        cursor.script(Closer::Eof)
    }

    /// Get access to the source map for error reporting
    #[must_use]
    pub const fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    /// Get access to the filename
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Get access to the original input
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Get access to the tokens (useful for debugging)
    #[must_use]
    pub fn tokens(&self) -> &[SpannedToken] {
        &self.tokens
    }
}

/// Parse `input` in one go.
///
/// # Errors
///
/// Returns `HuskError` for lexical or syntax errors
pub fn parse(input: &str) -> Result<Script, HuskError> {
    Parser::new(input)?.parse()
}

/// Token that ends the script being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    Eof,
    Paren,
    Subst,
}

struct Cursor<'p> {
    parser: &'p Parser,
    pos: usize,
}

impl<'p> Cursor<'p> {
    fn current(&self) -> &'p SpannedToken {
        let tokens = &self.parser.tokens;
        // The lexer always ends the stream with Eof
        &tokens[self.pos.min(tokens.len() - 1)]
    }

    fn peek(&self) -> &'p Token {
        &self.current().token
    }

    fn advance(&mut self) -> &'p SpannedToken {
        let token = self.current();
        if self.pos < self.parser.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn skip_delimits(&mut self) {
        while *self.peek() == Token::Delimit {
            self.advance();
        }
    }

    /// Skip blanks and newlines, but not `;`
    fn skip_newlines(&mut self) {
        loop {
            let current = self.current();
            match current.token {
                Token::Delimit => {}
                Token::Semicolon if current.text == "\n" => {}
                _ => return,
            }
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Delimit | Token::Semicolon) {
            self.advance();
        }
    }

    fn at_closer(&self, closer: Closer) -> bool {
        matches!(
            (closer, self.peek()),
            (Closer::Eof, Token::Eof) | (Closer::Paren, Token::CloseParen) | (Closer::Subst, Token::CmdSubstEnd)
        )
    }

    fn error(&self, message: String, span: Span) -> HuskError {
        HuskError::syntax(message, span, &self.parser.source_map, &self.parser.filename)
    }

    fn unexpected(&self) -> HuskError {
        let current = self.current();
        let message = match current.token {
            Token::Eof => "Unexpected EOF".to_string(),
            Token::Semicolon if current.text == "\n" => "Unexpected newline".to_string(),
            _ => format!("Unexpected `{}`", current.text),
        };
        self.error(message, current.span)
    }

    fn script(&mut self, closer: Closer) -> Result<Script, HuskError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_closer(closer) {
                break;
            }
            if *self.peek() == Token::Eof {
                return Err(self.unexpected());
            }
            statements.push(self.statement()?);

            self.skip_delimits();
            if self.at_closer(closer) {
                break;
            }
            if *self.peek() != Token::Semicolon {
                return Err(self.unexpected());
            }
        }
        Ok(Script { statements })
    }

    fn statement(&mut self) -> Result<Statement, HuskError> {
        let start = self.current().span;
        let mut end = start;
        let mut expressions = Vec::new();
        loop {
            let expr = self.cond()?;
            self.skip_delimits();
            if *self.peek() != Token::Ampersand {
                end = end.to(self.parser.tokens[self.pos.saturating_sub(1)].span);
                expressions.push(expr);
                break;
            }
            end = self.advance().span;
            self.skip_delimits();
            if matches!(self.peek(), Token::DoubleAmpersand | Token::DoublePipe) {
                return Err(self.error(
                    "\"&\" cannot be used as the left operand of \"&&\" or \"||\"".to_string(),
                    end,
                ));
            }
            expressions.push(Expr::Async(Box::new(expr)));
            if !starts_item(self.peek()) {
                break;
            }
        }
        Ok(Statement {
            expressions,
            span: start.to(end),
        })
    }

    fn cond(&mut self) -> Result<Expr, HuskError> {
        let mut left = self.pipeline()?;
        loop {
            self.skip_delimits();
            let op = match self.peek() {
                Token::DoubleAmpersand => CondOp::And,
                Token::DoublePipe => CondOp::Or,
                _ => return Ok(left),
            };
            self.advance();
            self.skip_newlines();
            let right = self.pipeline()?;
            left = Expr::Cond(Box::new(Cond { op, left, right }));
        }
    }

    fn pipeline(&mut self) -> Result<Expr, HuskError> {
        let mut items = vec![self.pipeline_item()?];
        loop {
            self.skip_delimits();
            if *self.peek() != Token::Pipe {
                break;
            }
            self.advance();
            self.skip_newlines();
            items.push(self.pipeline_item()?);
        }

        if items.len() == 1 {
            if let Some(item) = items.pop() {
                return Ok(item.into());
            }
        }
        Ok(Expr::Pipeline(Pipeline { items }))
    }

    fn pipeline_item(&mut self) -> Result<PipelineItem, HuskError> {
        self.skip_delimits();
        match self.peek() {
            Token::OpenParen => self.subshell(),
            token if starts_item(token) => self.command(),
            _ => Err(self.unexpected()),
        }
    }

    fn subshell(&mut self) -> Result<PipelineItem, HuskError> {
        self.advance();
        let script = self.script(Closer::Paren)?;
        if script.is_empty() {
            return Err(self.unexpected());
        }
        // at_closer(Paren) held when script() returned
        self.advance();

        let mut redirects = Vec::new();
        loop {
            self.skip_delimits();
            match self.peek() {
                Token::Redirect(spec) => redirects.push(self.redirect(*spec)?),
                token if token.is_word_part() || matches!(token, Token::OpenParen | Token::JSObjRef(_)) => {
                    return Err(self.unexpected());
                }
                _ => break,
            }
        }
        Ok(PipelineItem::Subshell(Subshell { script, redirects }))
    }

    fn command(&mut self) -> Result<PipelineItem, HuskError> {
        let mut assigns: Vec<Assign> = Vec::new();
        let mut words: Vec<Atom> = Vec::new();
        let mut redirects = Vec::new();
        let mut export = false;
        // Assignments before `export` land in the shell scope
        let mut prefix = 0;

        loop {
            self.skip_delimits();
            let current = self.current();
            match &current.token {
                Token::Redirect(spec) => redirects.push(self.redirect(*spec)?),
                Token::JSObjRef(_) => {
                    return Err(self.error(
                        "JS object reference can only be used as a redirect target".to_string(),
                        current.span,
                    ));
                }
                token if token.is_word_part() => {
                    let atom = self.word()?;
                    if export {
                        assigns.push(self.export_operand(atom, current.span)?);
                    } else if words.is_empty() && let Some((label, value)) = string_utils::split_assignment(&atom) {
                        assigns.push(Assign {
                            label,
                            value: Some(value),
                            exported: false,
                        });
                    } else if words.is_empty() && is_export(&atom) {
                        export = true;
                        prefix = assigns.len();
                    } else {
                        words.push(atom);
                    }
                }
                _ => break,
            }
        }

        if export {
            if assigns.len() == prefix {
                let name = Atom::Simple(SimpleAtom::Text("export".to_string()));
                return Ok(PipelineItem::Cmd(Cmd {
                    assigns,
                    name_and_args: vec![name],
                    redirects,
                }));
            }
            return Ok(PipelineItem::Assign(assigns));
        }

        if words.is_empty() && redirects.is_empty() {
            return Ok(PipelineItem::Assign(assigns));
        }
        Ok(PipelineItem::Cmd(Cmd {
            assigns,
            name_and_args: words,
            redirects,
        }))
    }

    fn export_operand(&self, atom: Atom, span: Span) -> Result<Assign, HuskError> {
        if let Some((label, value)) = string_utils::split_assignment(&atom) {
            return Ok(Assign {
                label,
                value: Some(value),
                exported: true,
            });
        }
        match atom.as_literal() {
            Some(name) if string_utils::is_valid_variable_name(&name) => Ok(Assign {
                label: name,
                value: None,
                exported: true,
            }),
            _ => Err(self.error("export: not a valid identifier".to_string(), span)),
        }
    }

    fn redirect(&mut self, spec: RedirectSpec) -> Result<Redirect, HuskError> {
        self.advance();
        if spec.is_duplicate() {
            return Ok(Redirect {
                spec,
                target: RedirectTarget::Duplicate,
            });
        }

        self.skip_delimits();
        let target = match self.peek() {
            Token::JSObjRef(index) => {
                self.advance();
                RedirectTarget::Host(*index)
            }
            token if token.is_word_part() => RedirectTarget::Atom(self.word()?),
            _ => return Err(self.unexpected()),
        };
        Ok(Redirect { spec, target })
    }

    /// Collect one word: a maximal run of adjacent word fragments
    fn word(&mut self) -> Result<Atom, HuskError> {
        let mut parts: Vec<SimpleAtom> = Vec::new();
        loop {
            let part = match self.peek() {
                Token::Text(text) => SimpleAtom::Text(text.clone()),
                Token::QuotedText(text) | Token::DoubleQuotedText(text) => SimpleAtom::QuotedText(text.clone()),
                Token::Var { name, modifier, quoted } => SimpleAtom::Var {
                    name: name.clone(),
                    modifier: modifier.clone(),
                    quoted: *quoted,
                },
                Token::Tilde => SimpleAtom::Tilde,
                Token::BraceBegin => SimpleAtom::BraceBegin,
                Token::Comma => SimpleAtom::BraceComma,
                Token::BraceEnd => SimpleAtom::BraceEnd,
                Token::CmdSubstBegin { quoted } => {
                    let quoted = *quoted;
                    self.advance();
                    let script = self.script(Closer::Subst)?;
                    SimpleAtom::CmdSubst {
                        script: Box::new(script),
                        quoted,
                    }
                }
                _ => break,
            };
            self.advance();
            push_part(&mut parts, part);
        }
        Ok(Atom::from_parts(parts))
    }
}

/// Append a fragment, merging adjacent literal text of the same kind.
fn push_part(parts: &mut Vec<SimpleAtom>, part: SimpleAtom) {
    match (parts.last_mut(), part) {
        (Some(SimpleAtom::Text(last)), SimpleAtom::Text(text))
        | (Some(SimpleAtom::QuotedText(last)), SimpleAtom::QuotedText(text)) => last.push_str(&text),
        (_, part) => parts.push(part),
    }
}

fn starts_item(token: &Token) -> bool {
    token.is_word_part() || matches!(token, Token::Redirect(_) | Token::OpenParen | Token::JSObjRef(_))
}

fn is_export(atom: &Atom) -> bool {
    matches!(atom, Atom::Simple(SimpleAtom::Text(text)) if text == "export")
}
