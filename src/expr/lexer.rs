//! Expression tokenizer
//!
//! Single pass over `char_indices`, same shape as the template tokenizer:
//! peekable iterator, byte positions kept for error reporting.

use std::iter::Peekable;
use std::str::CharIndices;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

/// Token plus its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub tok: Tok,
    pub pos: usize,
}

/// Lexing failure: byte position + what went wrong
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub pos: usize,
    pub details: String,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let tok = match ch {
            '0'..='9' | '.' => lex_number(source, &mut chars)?,
            '"' | '\'' => lex_string(&mut chars, ch)?,
            '`' => lex_quoted_ident(&mut chars)?,
            c if c.is_alphabetic() || c == '_' => lex_ident(source, &mut chars),
            _ => {
                chars.next();
                lex_symbol(ch, pos, &mut chars)?
            }
        };
        tokens.push(Spanned { tok, pos });
    }

    Ok(tokens)
}

fn lex_symbol(
    ch: char,
    pos: usize,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<Tok, LexError> {
    let mut followed_by = |c: char| {
        if chars.peek().map(|(_, n)| *n) == Some(c) {
            chars.next();
            true
        } else {
            false
        }
    };

    let tok = match ch {
        '+' => Tok::Plus,
        '-' => Tok::Minus,
        '*' => Tok::Star,
        '/' => Tok::Slash,
        '%' => Tok::Percent,
        '^' => Tok::Caret,
        '(' => Tok::LParen,
        ')' => Tok::RParen,
        ',' => Tok::Comma,
        '?' => Tok::Question,
        ':' => Tok::Colon,
        '=' if followed_by('=') => Tok::Eq,
        '!' if followed_by('=') => Tok::Ne,
        '!' => Tok::Not,
        '<' if followed_by('=') => Tok::Le,
        '<' => Tok::Lt,
        '>' if followed_by('=') => Tok::Ge,
        '>' => Tok::Gt,
        '&' if followed_by('&') => Tok::And,
        '|' if followed_by('|') => Tok::Or,
        other => {
            return Err(LexError {
                pos,
                details: format!("unexpected character '{}'", other),
            })
        }
    };
    Ok(tok)
}

fn lex_number(source: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<Tok, LexError> {
    let start = chars.peek().map(|(i, _)| *i).unwrap_or(0);
    let mut end = start;
    let mut seen_exp = false;
    let mut prev = ' ';

    while let Some(&(i, c)) = chars.peek() {
        let accept = c.is_ascii_digit()
            || c == '.'
            || (!seen_exp && (c == 'e' || c == 'E'))
            || ((c == '+' || c == '-') && (prev == 'e' || prev == 'E'));
        if !accept {
            break;
        }
        if c == 'e' || c == 'E' {
            seen_exp = true;
        }
        prev = c;
        end = i + c.len_utf8();
        chars.next();
    }

    let text = &source[start..end];
    text.parse::<f64>().map(Tok::Number).map_err(|_| LexError {
        pos: start,
        details: format!("invalid number '{}'", text),
    })
}

fn lex_string(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> Result<Tok, LexError> {
    let (start, _) = chars.next().unwrap_or((0, quote));
    let mut out = String::new();

    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c if c == quote => return Ok(Tok::Str(out)),
            c => out.push(c),
        }
    }

    Err(LexError {
        pos: start,
        details: "unterminated string".to_string(),
    })
}

/// `` `Unit Price` `` names a column that is not a plain identifier
fn lex_quoted_ident(chars: &mut Peekable<CharIndices<'_>>) -> Result<Tok, LexError> {
    let (start, _) = chars.next().unwrap_or((0, '`'));
    let mut out = String::new();

    for (_, c) in chars.by_ref() {
        if c == '`' {
            return Ok(Tok::Ident(out));
        }
        out.push(c);
    }

    Err(LexError {
        pos: start,
        details: "unterminated `quoted` name".to_string(),
    })
}

fn lex_ident(source: &str, chars: &mut Peekable<CharIndices<'_>>) -> Tok {
    let start = chars.peek().map(|(i, _)| *i).unwrap_or(0);
    let mut end = start;

    while let Some(&(i, c)) = chars.peek() {
        if !(c.is_alphanumeric() || c == '_') {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }

    match &source[start..end] {
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        word => Tok::Ident(word.to_string()),
    }
}
