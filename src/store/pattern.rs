//! Shell-style glob patterns matched against full key paths.
//!
//! Syntax:
//! - `*` matches any run of characters except `/`
//! - `?` matches a single character except `/`
//! - `[...]` matches one character from the class; ranges (`a-z`) and
//!   negation (`[^...]` or `[!...]`) are supported
//! - `\c` matches `c` literally
//!
//! Patterns are compiled once so a malformed pattern is rejected even when
//! the store holds no entries.

use crate::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Star,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

impl Token {
    fn matches_char(
        &self,
        c: char,
    ) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyChar => c != '/',
            Token::Class { negated, ranges } => {
                let hit = ranges.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
                hit != *negated
            }
            Token::Star => false,
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
}

impl Pattern {
    /// Compiles `pattern`, failing with [`StoreError::BadPattern`] on
    /// malformed syntax.
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        let bad = |reason: &'static str| StoreError::BadPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                }
                '?' => tokens.push(Token::AnyChar),
                '\\' => match chars.next() {
                    Some(escaped) => tokens.push(Token::Literal(escaped)),
                    None => return Err(bad("trailing escape")),
                },
                '[' => {
                    let negated = matches!(chars.peek(), Some('^') | Some('!'));
                    if negated {
                        chars.next();
                    }
                    let mut ranges = Vec::new();
                    loop {
                        match chars.peek() {
                            Some(']') if !ranges.is_empty() => {
                                chars.next();
                                break;
                            }
                            None => return Err(bad("unterminated character class")),
                            _ => {}
                        }
                        let lo = class_char(&mut chars).map_err(bad)?;
                        let hi = if chars.peek() == Some(&'-') {
                            chars.next();
                            class_char(&mut chars).map_err(bad)?
                        } else {
                            lo
                        };
                        if lo > hi {
                            return Err(bad("inverted character range"));
                        }
                        ranges.push((lo, hi));
                    }
                    tokens.push(Token::Class { negated, ranges });
                }
                other => tokens.push(Token::Literal(other)),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` matches the whole pattern.
    pub fn matches(
        &self,
        name: &str,
    ) -> bool {
        let name: Vec<char> = name.chars().collect();
        match_tokens(&self.tokens, &name)
    }
}

/// Reads one (possibly escaped) class member. A class member can never be
/// an unescaped `-` or `]`, so `[]a]` and `[-a]` are rejected.
fn class_char(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<char, &'static str> {
    match chars.next() {
        None => Err("unterminated character class"),
        Some('-') | Some(']') => Err("empty or malformed character class"),
        Some('\\') => chars.next().ok_or("trailing escape"),
        Some(c) => Ok(c),
    }
}

fn match_tokens(
    tokens: &[Token],
    name: &[char],
) -> bool {
    match tokens.split_first() {
        None => name.is_empty(),
        Some((Token::Star, rest)) => {
            let mut i = 0;
            loop {
                if match_tokens(rest, &name[i..]) {
                    return true;
                }
                if i >= name.len() || name[i] == '/' {
                    return false;
                }
                i += 1;
            }
        }
        Some((token, rest)) => match name.split_first() {
            Some((c, tail)) => token.matches_char(*c) && match_tokens(rest, tail),
            None => false,
        },
    }
}
