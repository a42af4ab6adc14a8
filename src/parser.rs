// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Recursive-descent parsing of the specification language.
//!
//! ```text
//! program    := (base | block | union)*
//! base       := BASE INT [ '(' INT ',' INT ')' ]
//! block      := BLOCK ID [ '(' [ ID (',' ID)* ] ')' ] '{' field* '}'
//! field      := (FIELD | FIELD_HIGH) ID INT | PADDING INT
//! union      := TAGGED_UNION ID ID [ '(' ID (',' ID)* ')' ] '{' mask* tag* '}'
//! mask       := MASK INT INT
//! tag        := TAG ID (INT | '(' INT (',' INT)* ')')
//! ```

use crate::ast::{RawBlock, RawField, RawTag, RawUnion, Spec};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::word::BaseSpec;

/// Parses a complete specification.
pub fn parse(source: &str) -> Result<Spec> {
    Parser::new(tokenize(source)?).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    // The base in force for the declarations that follow it.
    current_base: Option<BaseSpec>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            current_base: None,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn next(&mut self) -> &Token {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: &'static str) -> Error {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        Error::Syntax {
            line: token.line,
            found: token.kind.to_string(),
            expected,
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<()> {
        if self.peek() == kind {
            self.next();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.next();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = self.peek() {
            let name = name.clone();
            self.next();
            Ok(name)
        } else {
            Err(self.error("an identifier"))
        }
    }

    fn int(&mut self) -> Result<u64> {
        if let TokenKind::Int(value) = *self.peek() {
            self.next();
            Ok(value)
        } else {
            Err(self.error("an integer"))
        }
    }

    fn size(&mut self) -> Result<u32> {
        let line = self.tokens[self.pos.min(self.tokens.len() - 1)].line;
        let value = self.int()?;
        u32::try_from(value).map_err(|_| Error::InvalidInteger {
            line,
            literal: value.to_string(),
        })
    }

    fn base_for(&self, object: &str) -> Result<BaseSpec> {
        self.current_base.ok_or_else(|| Error::NoBase {
            object: object.to_string(),
        })
    }

    fn program(mut self) -> Result<Spec> {
        let mut spec = Spec::default();
        loop {
            match self.peek() {
                TokenKind::Base => {
                    let base = self.base()?;
                    spec.blocks.entry(base).or_default();
                    spec.unions.entry(base).or_default();
                    self.current_base = Some(base);
                }
                TokenKind::Block => {
                    let block = self.block()?;
                    let base = self.base_for(&block.name)?;
                    spec.blocks.entry(base).or_default().push(block);
                }
                TokenKind::TaggedUnion => {
                    let union = self.tagged_union()?;
                    let base = self.base_for(&union.name)?;
                    spec.unions.entry(base).or_default().push(union);
                }
                TokenKind::Eof => break,
                _ => return Err(self.error("base, block or tagged_union")),
            }
        }
        spec.default_base = self.current_base;
        Ok(spec)
    }

    fn base(&mut self) -> Result<BaseSpec> {
        self.expect(&TokenKind::Base, "base")?;
        let base = self.int()?;
        if self.eat(&TokenKind::LParen) {
            let base_bits = self.int()?;
            self.expect(&TokenKind::Comma, "','")?;
            let sign_extend = self.int()?;
            self.expect(&TokenKind::RParen, "')'")?;
            BaseSpec::new(base, base_bits, sign_extend)
        } else {
            BaseSpec::new(base, base, 0)
        }
    }

    fn block(&mut self) -> Result<RawBlock> {
        self.expect(&TokenKind::Block, "block")?;
        let name = self.ident()?;

        let visible_order = if self.eat(&TokenKind::LParen) {
            let mut order = Vec::new();
            if !self.eat(&TokenKind::RParen) {
                order.push(self.ident()?);
                while self.eat(&TokenKind::Comma) {
                    order.push(self.ident()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
            }
            Some(order)
        } else {
            None
        };

        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        loop {
            let field = match self.peek() {
                TokenKind::Field | TokenKind::FieldHigh => {
                    let high = self.next().kind == TokenKind::FieldHigh;
                    let name = self.ident()?;
                    let size = self.size()?;
                    RawField {
                        name: Some(name),
                        size,
                        high,
                    }
                }
                TokenKind::Padding => {
                    self.next();
                    RawField {
                        name: None,
                        size: self.size()?,
                        high: false,
                    }
                }
                TokenKind::RBrace => break,
                _ => return Err(self.error("field, field_high, padding or '}'")),
            };
            fields.push(field);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;

        Ok(RawBlock {
            name,
            fields,
            visible_order,
        })
    }

    fn tagged_union(&mut self) -> Result<RawUnion> {
        self.expect(&TokenKind::TaggedUnion, "tagged_union")?;
        let name = self.ident()?;
        let tag_name = self.ident()?;

        let mut tag_slices = Vec::new();
        if self.eat(&TokenKind::LParen) {
            tag_slices.push(self.ident()?);
            while self.eat(&TokenKind::Comma) {
                tag_slices.push(self.ident()?);
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut masks = Vec::new();
        while self.eat(&TokenKind::Mask) {
            let width = self.size()?;
            let mask = self.int()?;
            masks.push((width, mask));
        }

        let mut tags = Vec::new();
        while self.eat(&TokenKind::Tag) {
            let name = self.ident()?;
            let values = if self.eat(&TokenKind::LParen) {
                let mut values = vec![self.int()?];
                while self.eat(&TokenKind::Comma) {
                    values.push(self.int()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                values
            } else {
                vec![self.int()?]
            };
            tags.push(RawTag { name, values });
        }
        self.expect(&TokenKind::RBrace, "tag or '}'")?;

        Ok(RawUnion {
            name,
            tag_name,
            tag_slices,
            masks,
            tags,
        })
    }
}
