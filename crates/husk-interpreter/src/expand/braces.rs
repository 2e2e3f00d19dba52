//! Brace expansion over expanded word pieces

use husk_lexer::{Lexer, Token};

use super::Piece;

/// Expand every brace group, left to right, into the cartesian product of
/// its alternatives. A group with fewer than two alternatives is kept as
/// literal text.
pub(crate) fn expand(pieces: Vec<Piece>) -> Vec<Vec<Piece>> {
    let mut out = Vec::new();
    expand_into(pieces, &mut out);
    out
}

fn expand_into(mut pieces: Vec<Piece>, out: &mut Vec<Vec<Piece>>) {
    let Some((open, close)) = first_group(&pieces) else {
        out.push(pieces);
        return;
    };

    let alternatives = split_alternatives(&pieces[open + 1..close]);
    if alternatives.len() < 2 {
        pieces[open] = Piece::literal("{");
        pieces[close] = Piece::literal("}");
        expand_into(pieces, out);
        return;
    }

    for alternative in alternatives {
        let mut next = Vec::with_capacity(pieces.len());
        next.extend_from_slice(&pieces[..open]);
        next.extend_from_slice(alternative);
        next.extend_from_slice(&pieces[close + 1..]);
        expand_into(next, out);
    }
}

/// The first `{` that has a matching `}`, with that `}`
fn first_group(pieces: &[Piece]) -> Option<(usize, usize)> {
    pieces
        .iter()
        .enumerate()
        .filter(|(_, piece)| matches!(piece, Piece::Open))
        .find_map(|(open, _)| matching_close(pieces, open).map(|close| (open, close)))
}

fn matching_close(pieces: &[Piece], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, piece) in pieces.iter().enumerate().skip(open) {
        match piece {
            Piece::Open => depth += 1,
            Piece::Close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a group's contents at its top-level commas
fn split_alternatives(content: &[Piece]) -> Vec<&[Piece]> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, piece) in content.iter().enumerate() {
        match piece {
            Piece::Open => depth += 1,
            Piece::Close => depth = depth.saturating_sub(1),
            Piece::Comma if depth == 0 => {
                out.push(&content[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&content[start..]);
    out
}

/// Brace-expand `pattern` as written, keeping everything outside brace
/// groups (quotes, spaces, operators) verbatim.
///
/// ```
/// assert_eq!(husk_interpreter::braces("echo {a,b}.txt"), ["echo a.txt", "echo b.txt"]);
/// ```
#[must_use]
pub fn braces(pattern: &str) -> Vec<String> {
    let Ok(tokens) = Lexer::new(pattern).tokenize() else {
        return vec![pattern.to_string()];
    };
    let pieces = tokens
        .into_iter()
        .filter_map(|spanned| match spanned.token {
            Token::BraceBegin => Some(Piece::Open),
            Token::Comma => Some(Piece::Comma),
            Token::BraceEnd => Some(Piece::Close),
            Token::Eof => None,
            _ => Some(Piece::literal(&spanned.text)),
        })
        .collect();
    expand(pieces).iter().map(|pieces| Piece::join(pieces)).collect()
}
