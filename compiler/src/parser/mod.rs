/// Parser for service programs
///
/// Hand-written recursive descent parser for the service language.
mod lexer;
mod parse;

pub use lexer::{Lexer, Token, TokenKind};
pub use parse::{ParseError, Parser};

#[cfg(test)]
mod tests;
