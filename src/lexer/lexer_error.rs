use crate::ast::Loc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InnerLexError {
    #[error("unexpected character: {0:?}")]
    UnexpectedChar(char),
    #[error("bad integer constant suffix: {0:?}")]
    BadConstantSuffix(char),
    #[error("integer constant out of range: {0}")]
    ConstantOutOfRange(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedChar,
    #[error("empty character literal")]
    EmptyChar,
    #[error("character literal with more than one byte")]
    OverlongChar,
    #[error("unknown escape sequence: \\{0}")]
    UnknownEscape(char),
    #[error("unterminated block comment")]
    UnterminatedComment,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{inner}")]
pub struct LexError {
    pub inner: InnerLexError,
    pub loc: Loc,
}

impl LexError {
    pub fn get_loc(&self) -> Loc {
        self.loc
    }
}

impl InnerLexError {
    pub(super) fn set_loc(self, loc: Loc) -> LexError {
        LexError { inner: self, loc }
    }
}
