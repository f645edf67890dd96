//! Tokenizer for the PEG grammar dialect (C1, spec.md §4.1).

use crate::ast::ClassItem;
use crate::error::{PegError, Position};

/// A lexical token kind. Payload-carrying kinds fold the payload in
/// directly, so two tokens compare equal iff both kind (including payload)
/// and position match.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Literal(String),
    String(String),
    Class(Vec<ClassItem>),
    Arrow,
    Priority,
    Dot,
    Star,
    Plus,
    Question,
    And,
    Not,
    Label,
    OpCap,
    OpCb,
    OpLs,
    ClCb,
    Open,
    Close,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

impl Token {
    fn new(kind: TokenKind, pos: Position) -> Token {
        Token { kind, pos }
    }
}

/// Hand-written tokenizer over a fully materialized code-point sequence.
/// Exposes a one-token lookahead buffer so the parser's `peekt`-style
/// speculative lex (deciding whether an identifier starts a definition) can
/// be built on top without the lexer itself needing to support rewind.
pub struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    /// Column within the current line (code points since the last `\n`,
    /// or since the start of input); reset to 0 on every newline. This is
    /// what `Position::offset` reports — a line-relative column, not a
    /// whole-file offset — so the error reporter's caret lands under the
    /// offending character instead of drifting past the end of the line
    /// on every line after the first.
    col: usize,
    peeked: Option<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            idx: 0,
            line: 1,
            col: 0,
            peeked: None,
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token, PegError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex_token()?);
        }
        Ok(self
            .peeked
            .as_ref()
            .expect("just set to Some above when it was None, and never cleared in between"))
    }

    /// Consumes and returns the next token.
    pub fn advance(&mut self) -> Result<Token, PegError> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.lex_token()
    }

    /// A checkpoint cheap enough to snapshot/restore around a speculative
    /// lookahead lex (used by the parser to disambiguate `IDENT ARROW` from
    /// a bare identifier use without a second lexer).
    pub fn checkpoint(&self) -> (usize, usize, usize) {
        (self.idx, self.line, self.col)
    }

    pub fn restore(&mut self, checkpoint: (usize, usize, usize)) {
        self.idx = checkpoint.0;
        self.line = checkpoint.1;
        self.col = checkpoint.2;
        self.peeked = None;
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn peekc(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peekc2(&self) -> Option<char> {
        self.chars.get(self.idx + 1).copied()
    }

    fn nextc(&mut self) -> Option<char> {
        let c = self.peekc()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_spacing(&mut self) {
        loop {
            match self.peekc() {
                Some(c) if c.is_whitespace() => {
                    self.nextc();
                }
                Some('#') => {
                    while let Some(c) = self.peekc() {
                        if c == '\n' {
                            break;
                        }
                        self.nextc();
                    }
                }
                _ => break,
            }
        }
    }

    /// Decodes a single escape sequence (the `\` has already been consumed)
    /// or, lacking one, the character itself.
    fn read_delimited_char(&mut self, start: Position) -> Result<char, PegError> {
        match self.nextc() {
            Some('\\') => match self.nextc() {
                Some('n') => Ok('\n'),
                Some('r') => Ok('\r'),
                Some('t') => Ok('\t'),
                Some('\'') => Ok('\''),
                Some('"') => Ok('"'),
                Some('[') => Ok('['),
                Some(']') => Ok(']'),
                Some('-') => Ok('-'),
                Some('\\') => Ok('\\'),
                Some('x') => {
                    let mut digits = String::new();
                    while let Some(c) = self.peekc() {
                        if c.is_ascii_hexdigit() {
                            digits.push(c);
                            self.nextc();
                        } else {
                            break;
                        }
                    }
                    let code = u32::from_str_radix(&digits, 16)
                        .map_err(|_| PegError::Unterminated { what: "hex escape", pos: start })?;
                    char::from_u32(code)
                        .ok_or(PegError::Unterminated { what: "hex escape", pos: start })
                }
                Some(other) => Ok(other),
                None => Err(PegError::Unterminated { what: "escape", pos: start }),
            },
            Some(c) => Ok(c),
            None => Err(PegError::Unterminated { what: "literal", pos: start }),
        }
    }

    fn lex_quoted(&mut self, delim: char, start: Position) -> Result<String, PegError> {
        let mut out = String::new();
        loop {
            match self.peekc() {
                None => return Err(PegError::Unterminated { what: "literal", pos: start }),
                Some(c) if c == delim => {
                    self.nextc();
                    return Ok(out);
                }
                _ => out.push(self.read_delimited_char(start)?),
            }
        }
    }

    fn lex_class(&mut self, start: Position) -> Result<Vec<ClassItem>, PegError> {
        let mut items = Vec::new();
        loop {
            match self.peekc() {
                None => return Err(PegError::Unterminated { what: "class", pos: start }),
                Some(']') => {
                    self.nextc();
                    return Ok(items);
                }
                _ => {
                    let lo = self.read_delimited_char(start)?;
                    if self.peekc() == Some('-') && self.peekc2() != Some(']') {
                        self.nextc();
                        let hi = self.read_delimited_char(start)?;
                        items.push(ClassItem::Range(lo, hi));
                    } else {
                        items.push(ClassItem::Char(lo));
                    }
                }
            }
        }
    }

    fn lex_token(&mut self) -> Result<Token, PegError> {
        self.skip_spacing();
        let start = self.pos();
        let Some(c) = self.peekc() else {
            return Ok(Token::new(TokenKind::End, start));
        };

        if c.is_alphabetic() || c == '_' {
            let mut name = String::new();
            while let Some(c) = self.peekc() {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                    self.nextc();
                } else {
                    break;
                }
            }
            return Ok(Token::new(TokenKind::Ident(name), start));
        }

        match c {
            '\'' => {
                self.nextc();
                let s = self.lex_quoted('\'', start)?;
                Ok(Token::new(TokenKind::Literal(s), start))
            }
            '"' => {
                self.nextc();
                let s = self.lex_quoted('"', start)?;
                Ok(Token::new(TokenKind::String(s), start))
            }
            '[' => {
                self.nextc();
                let items = self.lex_class(start)?;
                Ok(Token::new(TokenKind::Class(items), start))
            }
            '<' => {
                self.nextc();
                if self.peekc() == Some('-') {
                    self.nextc();
                    Ok(Token::new(TokenKind::Arrow, start))
                } else {
                    Err(PegError::MissingArrowDash { pos: start })
                }
            }
            '/' => {
                self.nextc();
                Ok(Token::new(TokenKind::Priority, start))
            }
            '.' => {
                self.nextc();
                Ok(Token::new(TokenKind::Dot, start))
            }
            '*' => {
                self.nextc();
                Ok(Token::new(TokenKind::Star, start))
            }
            '+' => {
                self.nextc();
                Ok(Token::new(TokenKind::Plus, start))
            }
            '?' => {
                self.nextc();
                Ok(Token::new(TokenKind::Question, start))
            }
            '&' => {
                self.nextc();
                Ok(Token::new(TokenKind::And, start))
            }
            '!' => {
                self.nextc();
                Ok(Token::new(TokenKind::Not, start))
            }
            '^' => {
                self.nextc();
                Ok(Token::new(TokenKind::Label, start))
            }
            '(' => {
                self.nextc();
                Ok(Token::new(TokenKind::Open, start))
            }
            ')' => {
                self.nextc();
                Ok(Token::new(TokenKind::Close, start))
            }
            '}' => {
                self.nextc();
                Ok(Token::new(TokenKind::ClCb, start))
            }
            '{' => {
                self.nextc();
                Ok(Token::new(TokenKind::OpLs, start))
            }
            '%' => {
                self.nextc();
                if self.peekc() == Some('{') {
                    self.nextc();
                    Ok(Token::new(TokenKind::OpCb, start))
                } else {
                    Ok(Token::new(TokenKind::OpCap, start))
                }
            }
            other => Err(PegError::Lex { ch: other, pos: start }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lex = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let tok = lex.advance().unwrap();
            let end = tok.kind == TokenKind::End;
            out.push(tok.kind);
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_a_simple_definition() {
        let got = kinds("Num <- [0-9]+");
        assert_eq!(
            got,
            vec![
                TokenKind::Ident("Num".into()),
                TokenKind::Arrow,
                TokenKind::Class(vec![ClassItem::Range('0', '9')]),
                TokenKind::Plus,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn skips_comments_and_whitespace() {
        let got = kinds("  # a comment\n  Foo <- .  # trailing\n");
        assert_eq!(
            got,
            vec![
                TokenKind::Ident("Foo".into()),
                TokenKind::Arrow,
                TokenKind::Dot,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn lone_angle_bracket_is_a_hard_error() {
        let mut lex = Lexer::new("Foo < Bar");
        lex.advance().unwrap();
        let err = lex.advance().unwrap_err();
        assert!(matches!(err, PegError::MissingArrowDash { .. }));
    }

    #[test]
    fn decodes_hex_escape_in_literal() {
        let got = kinds(r"'\x41'");
        assert_eq!(got, vec![TokenKind::Literal("A".into()), TokenKind::End]);
    }

    #[test]
    fn capture_tokens_distinguish_bare_and_block_forms() {
        let got = kinds("%Foo %{ Bar }");
        assert_eq!(
            got,
            vec![
                TokenKind::OpCap,
                TokenKind::Ident("Foo".into()),
                TokenKind::OpCb,
                TokenKind::Ident("Bar".into()),
                TokenKind::ClCb,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn unrecognized_byte_is_a_lex_error() {
        let mut lex = Lexer::new("$");
        let err = lex.advance().unwrap_err();
        assert!(matches!(err, PegError::Lex { ch: '$', .. }));
    }
}
