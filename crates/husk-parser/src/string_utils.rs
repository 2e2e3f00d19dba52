//! String processing utilities for the Husk parser
//!
//! Assignment detection, variable name validation and quoting of arbitrary
//! strings back into script text.

use husk_ast::{Atom, SimpleAtom};

/// Parse an assignment word into name and value components
///
/// Returns None if the text doesn't contain a valid assignment pattern
#[must_use]
pub fn parse_assignment(text: &str) -> Option<(&str, &str)> {
    let eq_pos = text.find('=')?;
    let (name, value) = (&text[..eq_pos], &text[eq_pos + 1..]);
    is_valid_variable_name(name).then_some((name, value))
}

/// Split a parsed word of the form `NAME=value` into its label and value.
///
/// Only an unquoted leading fragment can name a variable: `"A"=1` is a
/// command word, `A="1 2"` is an assignment.
#[must_use]
pub fn split_assignment(atom: &Atom) -> Option<(String, Atom)> {
    let parts = atom.parts();
    let SimpleAtom::Text(first) = parts.first()? else {
        return None;
    };
    let (name, rest) = parse_assignment(first)?;

    let mut value = Vec::with_capacity(parts.len());
    if !rest.is_empty() {
        value.push(SimpleAtom::Text(rest.to_string()));
    }
    value.extend(parts[1..].iter().cloned());
    if value.is_empty() {
        value.push(SimpleAtom::QuotedText(String::new()));
    }
    Some((name.to_string(), Atom::from_parts(value)))
}

/// Check if a string is a valid POSIX variable name
///
/// Variable names must start with letter or underscore, followed by
/// letters, digits, or underscores
#[must_use]
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    // First character must be letter or underscore
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | ':' | '@' | '%' | '+' | '-')
}

/// Quote `input` so that it lexes back as exactly one literal word.
///
/// Strings made only of characters without shell meaning are returned
/// unchanged; everything else is single-quoted.
#[must_use]
pub fn escape(input: &str) -> String {
    if !input.is_empty() && input.chars().all(is_safe_char) {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for c in input.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
