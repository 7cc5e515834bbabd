/// Lexer for service programs
///
/// Tokenizes source text into a stream of tokens. Keywords are lexed as
/// identifiers; the parser decides from context, so `type` or `location`
/// can still be used as subnode names.
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral,
    LongLiteral,
    DoubleLiteral,
    StringLiteral,
    BoolLiteral,

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Colon,        // :
    Semicolon,    // ;
    Comma,        // ,
    Dot,          // .
    At,           // @
    Hash,         // #
    Question,     // ?

    // Operators
    Pipe,         // |
    OrOr,         // ||
    AndAnd,       // &&
    Bang,         // !
    Assign,       // =
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    PlusPlus,     // ++
    MinusMinus,   // --
    PlusAssign,   // +=
    MinusAssign,  // -=
    StarAssign,   // *=
    SlashAssign,  // /=
    DeepCopy,     // <<
    Arrow,        // ->

    // Identifier (keywords included)
    Ident,

    // Malformed input; the lexeme holds the message
    Error,

    // End of file
    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(error) = self.skip_whitespace_and_comments() {
            return error;
        }

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof, "");
        }

        let start_line = self.line;
        let start_column = self.column;
        let c = self.advance();
        let next = self.peek();

        let (kind, lexeme) = match c {
            '(' => (TokenKind::LeftParen, "("),
            ')' => (TokenKind::RightParen, ")"),
            '{' => (TokenKind::LeftBrace, "{"),
            '}' => (TokenKind::RightBrace, "}"),
            '[' => (TokenKind::LeftBracket, "["),
            ']' => (TokenKind::RightBracket, "]"),
            ':' => (TokenKind::Colon, ":"),
            ';' => (TokenKind::Semicolon, ";"),
            ',' => (TokenKind::Comma, ","),
            '.' => (TokenKind::Dot, "."),
            '@' => (TokenKind::At, "@"),
            '#' => (TokenKind::Hash, "#"),
            '?' => (TokenKind::Question, "?"),
            '%' => (TokenKind::Percent, "%"),
            '|' if next == '|' => (TokenKind::OrOr, "||"),
            '|' => (TokenKind::Pipe, "|"),
            '&' if next == '&' => (TokenKind::AndAnd, "&&"),
            '!' if next == '=' => (TokenKind::NotEqual, "!="),
            '!' => (TokenKind::Bang, "!"),
            '=' if next == '=' => (TokenKind::Equal, "=="),
            '=' => (TokenKind::Assign, "="),
            '<' if next == '<' => (TokenKind::DeepCopy, "<<"),
            '<' if next == '=' => (TokenKind::LessEqual, "<="),
            '<' => (TokenKind::Less, "<"),
            '>' if next == '=' => (TokenKind::GreaterEqual, ">="),
            '>' => (TokenKind::Greater, ">"),
            '+' if next == '+' => (TokenKind::PlusPlus, "++"),
            '+' if next == '=' => (TokenKind::PlusAssign, "+="),
            '+' => (TokenKind::Plus, "+"),
            '-' if next == '-' => (TokenKind::MinusMinus, "--"),
            '-' if next == '=' => (TokenKind::MinusAssign, "-="),
            '-' if next == '>' => (TokenKind::Arrow, "->"),
            '-' => (TokenKind::Minus, "-"),
            '*' if next == '=' => (TokenKind::StarAssign, "*="),
            '*' => (TokenKind::Star, "*"),
            '/' if next == '=' => (TokenKind::SlashAssign, "/="),
            '/' => (TokenKind::Slash, "/"),
            '"' => return self.string_literal(start_line, start_column),
            c if c.is_ascii_digit() => return self.number_literal(c, start_line, start_column),
            c if c.is_alphabetic() || c == '_' => {
                return self.identifier_or_keyword(c, start_line, start_column);
            }
            c => {
                return Token {
                    kind: TokenKind::Error,
                    lexeme: format!("Unexpected character '{}'", c),
                    line: start_line,
                    column: start_column,
                };
            }
        };

        // Two-character operators consume their second character here
        if lexeme.len() == 2 {
            self.advance();
        }

        Token {
            kind,
            lexeme: lexeme.to_string(),
            line: start_line,
            column: start_column,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Returns an error token for an unterminated block comment
    fn skip_whitespace_and_comments(&mut self) -> Option<Token> {
        loop {
            if self.is_at_end() {
                return None;
            }

            match self.peek() {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            return Some(Token {
                                kind: TokenKind::Error,
                                lexeme: "Unterminated block comment".to_string(),
                                line,
                                column,
                            });
                        }
                        if self.peek() == '*' && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return None,
            }
        }
    }

    fn string_literal(&mut self, line: usize, column: usize) -> Token {
        const MAX_STRING_LENGTH: usize = 1_000_000; // 1MB limit

        let mut value = String::new();
        while !self.is_at_end() && self.peek() != '"' {
            if value.len() >= MAX_STRING_LENGTH {
                return Token {
                    kind: TokenKind::Error,
                    lexeme: format!(
                        "String exceeds maximum length of {} bytes",
                        MAX_STRING_LENGTH
                    ),
                    line,
                    column,
                };
            }

            if self.peek() == '\n' {
                return Token {
                    kind: TokenKind::Error,
                    lexeme: "Unterminated string literal (newline)".to_string(),
                    line,
                    column,
                };
            }

            if self.peek() == '\\' {
                self.advance();
                if !self.is_at_end() {
                    let escaped = match self.peek() {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        c => c,
                    };
                    value.push(escaped);
                    self.advance();
                }
            } else {
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return Token {
                kind: TokenKind::Error,
                lexeme: "Unterminated string literal (EOF)".to_string(),
                line,
                column,
            };
        }

        self.advance(); // consume closing "

        Token {
            kind: TokenKind::StringLiteral,
            lexeme: value,
            line,
            column,
        }
    }

    fn number_literal(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut value = String::from(first);
        let mut kind = TokenKind::IntLiteral;

        while self.peek().is_ascii_digit() {
            value.push(self.advance());
        }

        if self.peek() == '.' && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            kind = TokenKind::DoubleLiteral;
            value.push(self.advance());
            while self.peek().is_ascii_digit() {
                value.push(self.advance());
            }
        } else if matches!(self.peek(), 'L' | 'l') {
            kind = TokenKind::LongLiteral;
            self.advance();
        }

        Token {
            kind,
            lexeme: value,
            line,
            column,
        }
    }

    fn identifier_or_keyword(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut value = String::from(first);

        while self.peek().is_alphanumeric() || self.peek() == '_' {
            value.push(self.advance());
        }

        let kind = match value.as_str() {
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        };

        Token {
            kind,
            lexeme: value,
            line,
            column,
        }
    }

    fn make_token(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token {
            kind,
            lexeme: lexeme.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.position += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::IntLiteral => "INT",
            TokenKind::LongLiteral => "LONG",
            TokenKind::DoubleLiteral => "DOUBLE",
            TokenKind::StringLiteral => "STRING",
            TokenKind::BoolLiteral => "BOOL",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::At => "@",
            TokenKind::Hash => "#",
            TokenKind::Question => "?",
            TokenKind::Pipe => "|",
            TokenKind::OrOr => "||",
            TokenKind::AndAnd => "&&",
            TokenKind::Bang => "!",
            TokenKind::Assign => "=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::DeepCopy => "<<",
            TokenKind::Arrow => "->",
            TokenKind::Ident => "IDENT",
            TokenKind::Error => "ERROR",
            TokenKind::Eof => "EOF",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let mut lexer = Lexer::new("main { login(req)(res) { csets.sid = new } }");
        let tokens = lexer.tokenize();

        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].lexeme, "main");
        assert_eq!(tokens[1].kind, TokenKind::LeftBrace);
        assert_eq!(tokens[2].lexeme, "login");
        assert_eq!(tokens[3].kind, TokenKind::LeftParen);
        assert_eq!(tokens[10].lexeme, "csets");
        assert_eq!(tokens[11].kind, TokenKind::Dot);
        assert_eq!(tokens[13].kind, TokenKind::Assign);
        assert_eq!(tokens[14].lexeme, "new");
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 7L 3.25 0");
        let tokens = lexer.tokenize();

        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].kind, TokenKind::LongLiteral);
        assert_eq!(tokens[1].lexeme, "7");
        assert_eq!(tokens[2].kind, TokenKind::DoubleLiteral);
        assert_eq!(tokens[2].lexeme, "3.25");
        assert_eq!(tokens[3].kind, TokenKind::IntLiteral);
    }

    #[test]
    fn test_indexed_path_is_not_a_double() {
        assert_eq!(
            kinds("a[0].b"),
            vec![
                TokenKind::Ident,
                TokenKind::LeftBracket,
                TokenKind::IntLiteral,
                TokenKind::RightBracket,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""socket://localhost:8000" "a\"b""#);
        let tokens = lexer.tokenize();

        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].lexeme, "socket://localhost:8000");
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].lexeme, "a\"b");
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("<< -> ++ -- += == != <= || && | ;"),
            vec![
                TokenKind::DeepCopy,
                TokenKind::Arrow,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::PlusAssign,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::OrOr,
                TokenKind::AndAnd,
                TokenKind::Pipe,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        let mut lexer = Lexer::new("// line comment\n/* block\ncomment */ 42");
        let tokens = lexer.tokenize();

        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let tokens = Lexer::new("/* never closed").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].lexeme.contains("Unterminated block comment"));
    }

    #[test]
    fn test_unterminated_string_newline() {
        let tokens = Lexer::new("\"hello\n").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].lexeme.contains("Unterminated"));
    }

    #[test]
    fn test_unterminated_string_eof() {
        let tokens = Lexer::new("\"hello").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].lexeme.contains("Unterminated"));
    }

    #[test]
    fn test_newline_handling() {
        let mut lexer = Lexer::new("a\n  b\nc");
        let tokens = lexer.tokenize();

        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_max_string_length() {
        let mut input = String::from("\"");
        for _ in 0..1_000_001 {
            input.push('a');
        }
        input.push('"');

        let tokens = Lexer::new(&input).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].lexeme.contains("maximum length"));
    }
}
