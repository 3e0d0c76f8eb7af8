//! Text encoding of persisted counters.
//!
//! A store is a parenthesized list with one record per line, so that a store
//! kept under version control produces one-line diffs:
//!
//! ```text
//! (
//! ((text-mode . forward-word) . 12)
//! ((prog-mode . "odd name") . 3)
//! )
//! ```
//!
//! Identifiers are written bare unless they contain whitespace, parentheses,
//! quotes, `;` or `\`, in which case they are double-quoted with backslash
//! escapes. The reader is whitespace-insensitive, skips `;` comments, accepts
//! `nil` as the empty list, and keeps duplicate keys (callers sum them).

use std::fmt::{self, Write};
use std::path::Path;

use crate::data::table::CounterKey;
use crate::error::KeyfreqError;

/// One persisted (key, count) record.
pub type Record = (CounterKey, u64);

/// Parse failure with the 1-based line where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub line: usize,
    pub message: String,
}

impl DecodeError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// Attach the store path, producing [`KeyfreqError::CorruptStore`].
    pub fn into_store_error(self, path: &Path) -> KeyfreqError {
        KeyfreqError::CorruptStore {
            path: path.to_path_buf(),
            line: self.line,
            message: self.message,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for DecodeError {}

/// Serialize records, one per line, in the order given.
pub fn encode<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = (&'a CounterKey, u64)>,
{
    let mut out = String::from("(\n");
    for (key, count) in records {
        out.push_str("((");
        push_ident(&mut out, &key.context);
        out.push_str(" . ");
        push_ident(&mut out, &key.action);
        // Writing into a String cannot fail.
        let _ = writeln!(out, ") . {})", count);
    }
    out.push_str(")\n");
    out
}

/// Parse a whole store. Either every record parses or nothing is returned.
///
/// Empty (or whitespace-only) input is an empty store.
pub fn decode(input: &str) -> Result<Vec<Record>, DecodeError> {
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.store()
}

fn needs_quoting(ident: &str) -> bool {
    ident.is_empty()
        || ident == "."
        || ident.chars().any(|c| c.is_whitespace() || is_delimiter(c))
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '"' | ';' | '\\')
}

fn push_ident(out: &mut String, ident: &str) {
    if !needs_quoting(ident) {
        out.push_str(ident);
        return;
    }
    out.push('"');
    for c in ident.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Dot,
    Atom(String),
    Quoted(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Atom(s) => format!("'{}'", s),
            Token::Quoted(s) => format!("\"{}\"", s),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, DecodeError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '(' => tokens.push((Token::Open, line)),
            ')' => tokens.push((Token::Close, line)),
            '"' => {
                let start = line;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        None => return Err(DecodeError::new(start, "unterminated string")),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(c @ ('"' | '\\')) => value.push(c),
                            Some(c) => {
                                return Err(DecodeError::new(
                                    line,
                                    format!("unknown escape '\\{}'", c),
                                ))
                            }
                            None => return Err(DecodeError::new(start, "unterminated string")),
                        },
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            value.push(c);
                        }
                    }
                }
                tokens.push((Token::Quoted(value), start));
            }
            '\\' => return Err(DecodeError::new(line, "stray '\\' outside a string")),
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || is_delimiter(next) {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                let token = if atom == "." {
                    Token::Dot
                } else {
                    Token::Atom(atom)
                };
                tokens.push((token, line));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn store(mut self) -> Result<Vec<Record>, DecodeError> {
        let mut records = Vec::new();

        match self.next() {
            None => return Ok(records),
            Some((Token::Atom(a), _)) if a == "nil" => {}
            Some((Token::Open, _)) => loop {
                match self.peek() {
                    Some(Token::Close) => {
                        self.next();
                        break;
                    }
                    Some(_) => records.push(self.record()?),
                    None => return Err(self.eof("')' closing the store")),
                }
            },
            Some((token, line)) => {
                return Err(DecodeError::new(
                    line,
                    format!("expected '(' opening the store, found {}", token.describe()),
                ))
            }
        }

        if let Some((token, line)) = self.next() {
            return Err(DecodeError::new(
                line,
                format!("trailing content after the store: {}", token.describe()),
            ));
        }
        Ok(records)
    }

    /// `((context . action) . count)`
    fn record(&mut self) -> Result<Record, DecodeError> {
        self.expect(Token::Open, "'(' opening a record")?;
        self.expect(Token::Open, "'(' opening a key")?;
        let context = self.ident("context")?;
        self.expect(Token::Dot, "'.' between context and action")?;
        let action = self.ident("action")?;
        self.expect(Token::Close, "')' closing a key")?;
        self.expect(Token::Dot, "'.' before the count")?;
        let count = self.count()?;
        self.expect(Token::Close, "')' closing a record")?;
        Ok((CounterKey::new(context, action), count))
    }

    fn ident(&mut self, what: &str) -> Result<String, DecodeError> {
        match self.next() {
            Some((Token::Atom(s), _)) | Some((Token::Quoted(s), _)) => Ok(s),
            Some((token, line)) => Err(DecodeError::new(
                line,
                format!("expected {}, found {}", what, token.describe()),
            )),
            None => Err(self.eof(what)),
        }
    }

    fn count(&mut self) -> Result<u64, DecodeError> {
        match self.next() {
            Some((Token::Atom(s), line)) => s
                .parse()
                .map_err(|_| DecodeError::new(line, format!("invalid count '{}'", s))),
            Some((token, line)) => Err(DecodeError::new(
                line,
                format!("expected a count, found {}", token.describe()),
            )),
            None => Err(self.eof("a count")),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), DecodeError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, line)) => Err(DecodeError::new(
                line,
                format!("expected {}, found {}", what, token.describe()),
            )),
            None => Err(self.eof(what)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eof(&self, what: &str) -> DecodeError {
        let line = self.tokens.last().map(|(_, l)| *l).unwrap_or(1);
        DecodeError::new(line, format!("unexpected end of store, expected {}", what))
    }
}
