//! Recursive-descent parser over the token stream (C2, spec.md §4.2).
//!
//! One token of lookahead is held in `current`; a second token of
//! lookahead comes free by peeking the lexer without consuming it — this
//! is the `peekt` the spec describes, used exclusively to tell an
//! identifier-as-rule-reference apart from an identifier that starts the
//! next definition.

use crate::ast::Ast;
use crate::error::PegError;
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    pub fn new(source: &str) -> Result<Parser, PegError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.advance()?;
        Ok(Parser { lexer, current })
    }

    /// Parses the whole grammar: `Definition+ END`.
    pub fn parse_grammar(&mut self) -> Result<Ast, PegError> {
        let mut defs = Vec::new();
        defs.push(self.parse_definition()?);
        while !self.at(&TokenKind::End) {
            defs.push(self.parse_definition()?);
        }
        self.expect(&TokenKind::End)?;
        Ok(Ast::Grammar(defs))
    }

    fn bump(&mut self) -> Result<Token, PegError> {
        let next = self.lexer.advance()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, PegError> {
        if self.at(kind) {
            self.bump()
        } else {
            Err(PegError::ParseExpected {
                expected: describe(kind),
                actual: describe(&self.current.kind),
                pos: self.current.pos,
            })
        }
    }

    /// True when `current` is an identifier not immediately followed by
    /// `ARROW` — i.e. it is a rule reference, not the start of a new
    /// definition.
    fn current_is_identifier_use(&mut self) -> Result<bool, PegError> {
        match &self.current.kind {
            TokenKind::Ident(_) => Ok(self.lexer.peek()?.kind != TokenKind::Arrow),
            _ => Ok(false),
        }
    }

    fn starts_prefix(&mut self) -> Result<bool, PegError> {
        Ok(match &self.current.kind {
            TokenKind::And
            | TokenKind::Not
            | TokenKind::OpCap
            | TokenKind::Literal(_)
            | TokenKind::String(_)
            | TokenKind::Class(_)
            | TokenKind::Dot
            | TokenKind::Open
            | TokenKind::OpCb
            | TokenKind::OpLs => true,
            TokenKind::Ident(_) => self.current_is_identifier_use()?,
            _ => false,
        })
    }

    fn parse_definition(&mut self) -> Result<Ast, PegError> {
        let name = match &self.current.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => {
                return Err(PegError::ParseExpected {
                    expected: "identifier".into(),
                    actual: describe(&self.current.kind),
                    pos: self.current.pos,
                })
            }
        };
        self.bump()?;
        self.expect(&TokenKind::Arrow)?;
        let body = self.parse_expression()?;
        Ok(Ast::Definition(name, Box::new(body)))
    }

    /// `Sequence (PRIORITY Sequence)*`.
    fn parse_expression(&mut self) -> Result<Ast, PegError> {
        let mut alts = vec![self.parse_sequence()?];
        while self.at(&TokenKind::Priority) {
            self.bump()?;
            alts.push(self.parse_sequence()?);
        }
        Ok(Ast::Expression(alts))
    }

    /// `Prefix*`; an empty sequence is legal.
    fn parse_sequence(&mut self) -> Result<Ast, PegError> {
        let mut items = Vec::new();
        while self.starts_prefix()? {
            items.push(self.parse_prefix()?);
        }
        Ok(Ast::Sequence(items))
    }

    /// `(AND | NOT)? Labeled`.
    fn parse_prefix(&mut self) -> Result<Ast, PegError> {
        let wrap: Option<fn(Box<Ast>) -> Ast> = match self.current.kind {
            TokenKind::And => Some(Ast::And),
            TokenKind::Not => Some(Ast::Not),
            _ => None,
        };
        if wrap.is_some() {
            self.bump()?;
        }
        let body = self.parse_labeled()?;
        Ok(match wrap {
            Some(ctor) => ctor(Box::new(body)),
            None => body,
        })
    }

    /// `Suffix (LABEL IDENT)?`.
    fn parse_labeled(&mut self) -> Result<Ast, PegError> {
        let suffix = self.parse_suffix()?;
        if self.at(&TokenKind::Label) {
            self.bump()?;
            let name = self.expect_ident()?;
            Ok(Ast::Label(name, Box::new(suffix)))
        } else {
            Ok(suffix)
        }
    }

    /// `Primary (QUESTION | STAR | PLUS)?`.
    fn parse_suffix(&mut self) -> Result<Ast, PegError> {
        let primary = self.parse_primary()?;
        let ctor: Option<fn(Box<Ast>) -> Ast> = match self.current.kind {
            TokenKind::Question => Some(Ast::Question),
            TokenKind::Star => Some(Ast::Star),
            TokenKind::Plus => Some(Ast::Plus),
            _ => None,
        };
        match ctor {
            Some(ctor) => {
                self.bump()?;
                Ok(ctor(Box::new(primary)))
            }
            None => Ok(primary),
        }
    }

    fn expect_ident(&mut self) -> Result<String, PegError> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.bump()?;
                Ok(name)
            }
            _ => Err(PegError::ParseExpected {
                expected: "identifier".into(),
                actual: describe(&self.current.kind),
                pos: self.current.pos,
            }),
        }
    }

    fn parse_primary(&mut self) -> Result<Ast, PegError> {
        match self.current.kind.clone() {
            TokenKind::OpCap => {
                self.bump()?;
                let name = self.expect_ident()?;
                Ok(Ast::CaptureNode(Box::new(Ast::Identifier(name))))
            }
            TokenKind::Ident(name) if self.current_is_identifier_use()? => {
                self.bump()?;
                Ok(Ast::Identifier(name))
            }
            TokenKind::Literal(s) => {
                self.bump()?;
                Ok(Ast::literal(s))
            }
            TokenKind::String(s) => {
                self.bump()?;
                Ok(Ast::string(s))
            }
            TokenKind::Class(items) => {
                self.bump()?;
                Ok(Ast::class(items))
            }
            TokenKind::Dot => {
                self.bump()?;
                Ok(Ast::dot())
            }
            TokenKind::Open => {
                self.bump()?;
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::Close)?;
                Ok(inner)
            }
            TokenKind::OpCb => {
                self.bump()?;
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::ClCb)?;
                Ok(Ast::CaptureBlock(Box::new(inner)))
            }
            TokenKind::OpLs => {
                self.bump()?;
                let mut items = Vec::new();
                while self.starts_prefix()? {
                    items.push(self.parse_expression()?);
                }
                self.expect(&TokenKind::ClCb)?;
                Ok(Ast::List(items))
            }
            other => Err(PegError::ParseExpected {
                expected: "primary expression".into(),
                actual: describe(&other),
                pos: self.current.pos,
            }),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("identifier `{name}`"),
        TokenKind::Literal(s) => format!("literal '{s}'"),
        TokenKind::String(s) => format!("string \"{s}\""),
        TokenKind::Class(_) => "character class".into(),
        TokenKind::Arrow => "`<-`".into(),
        TokenKind::Priority => "`/`".into(),
        TokenKind::Dot => "`.`".into(),
        TokenKind::Star => "`*`".into(),
        TokenKind::Plus => "`+`".into(),
        TokenKind::Question => "`?`".into(),
        TokenKind::And => "`&`".into(),
        TokenKind::Not => "`!`".into(),
        TokenKind::Label => "`^`".into(),
        TokenKind::OpCap => "`%`".into(),
        TokenKind::OpCb => "`%{`".into(),
        TokenKind::OpLs => "`{`".into(),
        TokenKind::ClCb => "`}`".into(),
        TokenKind::Open => "`(`".into(),
        TokenKind::Close => "`)`".into(),
        TokenKind::End => "end of input".into(),
    }
}
