use crate::ast::Loc;
use crate::lexer::{LocatedToken, Token};
use crate::parser::{InnerParseError, ParseError, Result};

#[derive(Debug)]
pub struct Cursor<'a> {
    tokens: &'a [LocatedToken],
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [LocatedToken]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Position of the current token, or of the last one at EOF.
    pub fn get_loc(&self) -> Loc {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(LocatedToken::get_loc)
            .unwrap_or_default()
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position).map(LocatedToken::get_inner)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens
            .get(self.position + n)
            .map(LocatedToken::get_inner)
    }

    pub fn peek_is(&self, t: &Token) -> bool {
        self.peek() == Some(t)
    }

    pub fn bump(&mut self) {
        self.position += 1;
    }

    pub fn bump_if(&mut self, t: &Token) -> bool {
        let matched = self.peek() == Some(t);
        if matched {
            self.bump();
        }
        matched
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    pub fn peek_or_error(&self) -> Result<&'a Token> {
        self.peek()
            .ok_or_else(|| InnerParseError::UnexpectedEof.set_loc(self.get_loc()))
    }

    pub fn next_or_error(&mut self) -> Result<&'a Token> {
        let loc = self.get_loc();
        let next = self
            .tokens
            .get(self.position)
            .ok_or_else(|| InnerParseError::UnexpectedEof.set_loc(loc))?;
        self.position += 1;
        Ok(next.get_inner())
    }

    pub fn expect(&mut self, t: &Token) -> Result<()> {
        let loc = self.get_loc();
        let next = self.next_or_error()?;
        if next == t {
            Ok(())
        } else {
            Err(InnerParseError::ExpectedButGot(t.clone(), next.clone()).set_loc(loc))
        }
    }

    /// Error-recovery skip: advances past the next `;`, or stops before a
    /// `}` so the caller can close its block. Brackets opened while
    /// skipping are balanced first.
    pub fn synchronize(&mut self) {
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            match t {
                Token::Semicolon if depth == 0 => {
                    self.bump();
                    return;
                }
                Token::OpenCurly => depth += 1,
                Token::CloseCurly => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => (),
            }
            self.bump();
        }
    }
}
