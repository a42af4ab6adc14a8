// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tokenization of specification text.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Base,
    Block,
    Field,
    FieldHigh,
    Mask,
    Padding,
    TaggedUnion,
    Tag,
    Ident(String),
    Int(u64),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "base" => Self::Base,
            "block" => Self::Block,
            "field" => Self::Field,
            "field_high" => Self::FieldHigh,
            "mask" => Self::Mask,
            "padding" => Self::Padding,
            "tagged_union" => Self::TaggedUnion,
            "tag" => Self::Tag,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("base"),
            Self::Block => f.write_str("block"),
            Self::Field => f.write_str("field"),
            Self::FieldHigh => f.write_str("field_high"),
            Self::Mask => f.write_str("mask"),
            Self::Padding => f.write_str("padding"),
            Self::TaggedUnion => f.write_str("tagged_union"),
            Self::Tag => f.write_str("tag"),
            Self::Ident(name) => f.write_str(name),
            Self::Int(value) => write!(f, "{value}"),
            Self::LBrace => f.write_str("{"),
            Self::RBrace => f.write_str("}"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Splits `source` into tokens, always ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;
        let kind = match c {
            b'\n' => {
                line += 1;
                pos += 1;
                continue;
            }
            b' ' | b'\t' | b'\r' => {
                pos += 1;
                continue;
            }
            b'#' => {
                pos = skip_line(bytes, pos);
                continue;
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                pos = skip_line(bytes, pos);
                continue;
            }
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'0'..=b'9' => {
                let (value, end) = integer(source, pos, line)?;
                pos = end;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    line,
                });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                pos += 1;
                while pos < bytes.len() && is_word(bytes[pos]) {
                    pos += 1;
                }
                let word = &source[start..pos];
                // A lone underscore is not an identifier.
                if word == "_" {
                    return Err(Error::UnexpectedCharacter { line, found: '_' });
                }
                // Keywords are all lowercase or all uppercase; mixed case
                // spellings are identifiers.
                let keyword = if word.bytes().all(|b| !b.is_ascii_lowercase()) {
                    TokenKind::keyword(&word.to_ascii_lowercase())
                } else {
                    TokenKind::keyword(word)
                };
                let kind = keyword.unwrap_or_else(|| TokenKind::Ident(word.to_string()));
                tokens.push(Token { kind, line });
                continue;
            }
            _ => {
                let found = source[pos..].chars().next().unwrap_or('\0');
                return Err(Error::UnexpectedCharacter { line, found });
            }
        };
        pos += 1;
        tokens.push(Token { kind, line });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    log::trace!("tokenized {} tokens over {line} lines", tokens.len());
    Ok(tokens)
}

const fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn skip_line(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] != b'\n' {
        pos += 1;
    }
    pos
}

/// Lexes an integer literal starting at `start`: decimal, `0x` hex, `0b`
/// binary, `0o` or leading-zero octal, with an optional `l`/`L` suffix.
fn integer(source: &str, start: usize, line: usize) -> Result<(u64, usize)> {
    let bytes = source.as_bytes();
    let digits_while = |mut pos: usize, pred: fn(u8) -> bool| {
        while pos < bytes.len() && pred(bytes[pos]) {
            pos += 1;
        }
        pos
    };
    let is_octal = |c: u8| matches!(c, b'0'..=b'7');

    let (radix, digits_start, end) = if bytes[start] == b'0' {
        match bytes.get(start + 1) {
            Some(b'x' | b'X') => {
                let end = digits_while(start + 2, |c| c.is_ascii_hexdigit());
                (16, start + 2, end)
            }
            Some(b'b' | b'B') => {
                let end = digits_while(start + 2, |c| matches!(c, b'0' | b'1'));
                (2, start + 2, end)
            }
            Some(b'o' | b'O') => (8, start + 2, digits_while(start + 2, is_octal)),
            Some(c) if is_octal(*c) => (8, start + 1, digits_while(start + 1, is_octal)),
            _ => (10, start, start + 1),
        }
    } else {
        (10, start, digits_while(start, |c| c.is_ascii_digit()))
    };

    let invalid = |end: usize| Error::InvalidInteger {
        line,
        literal: source[start..end.max(start + 1)].to_string(),
    };
    if digits_start == end {
        return Err(invalid(end));
    }
    let value = u64::from_str_radix(&source[digits_start..end], radix)
        .map_err(|_| invalid(end))?;
    let end = if matches!(bytes.get(end), Some(b'l' | b'L')) {
        end + 1
    } else {
        end
    };
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn keyword_spellings() {
        assert_eq!(
            kinds("BASE base TAGGED_UNION field_high"),
            vec![
                TokenKind::Base,
                TokenKind::Base,
                TokenKind::TaggedUnion,
                TokenKind::FieldHigh,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("Tag Mask Block"),
            vec![
                TokenKind::Ident("Tag".to_string()),
                TokenKind::Ident("Mask".to_string()),
                TokenKind::Ident("Block".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn capitalised_keywords_name_fields() {
        let spec = crate::parser::parse("base 32 block b { field Tag 16 field Mask 16 }").unwrap();
        let names = spec
            .blocks
            .values()
            .flatten()
            .flat_map(|block| &block.fields)
            .filter_map(|field| field.name.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Tag", "Mask"]);
    }

    #[test]
    fn integer_literals() {
        assert_eq!(
            kinds("42 0x2a 0X2A 0b101010 0o52 052 0 7l 9L"),
            vec![
                TokenKind::Int(42),
                TokenKind::Int(42),
                TokenKind::Int(42),
                TokenKind::Int(42),
                TokenKind::Int(42),
                TokenKind::Int(42),
                TokenKind::Int(0),
                TokenKind::Int(7),
                TokenKind::Int(9),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let tokens = tokenize("-- comment\n# another\nblock x -- trailing\n{ }").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Block);
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[1].kind, TokenKind::Ident("x".to_string()));
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn identifiers() {
        assert_eq!(
            kinds("a _ab cap_t2"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("_ab".to_string()),
                TokenKind::Ident("cap_t2".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unexpected_character() {
        assert!(matches!(
            tokenize("block x {\n  field y 3;\n}"),
            Err(Error::UnexpectedCharacter {
                line: 2,
                found: ';'
            })
        ));
        assert!(matches!(
            tokenize("field _ 3"),
            Err(Error::UnexpectedCharacter { found: '_', .. })
        ));
    }

    #[test]
    fn integer_overflow() {
        assert!(matches!(
            tokenize("0x10000000000000000"),
            Err(Error::InvalidInteger { line: 1, .. })
        ));
        assert!(matches!(tokenize("0x"), Err(Error::InvalidInteger { .. })));
    }
}
