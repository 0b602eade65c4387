//! Lexer: tokenizes rule and condition expressions
//!
//! Keywords are case-insensitive. Identifiers may contain dots to address
//! nested entity attributes (`owner.email`).

use super::{ExpressionError, ExpressionResult};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text (unescaped for string literals)
    pub text: String,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            col,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    And,
    Or,
    Not,
    Contains,
    In,
    True,
    False,
    Null,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    NumberLiteral,

    // Operators
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Structural
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
            Self::Contains => write!(f, "CONTAINS"),
            Self::In => write!(f, "IN"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::NumberLiteral => write!(f, "number"),
            Self::Eq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::OpenBracket => write!(f, "["),
            Self::CloseBracket => write!(f, "]"),
            Self::Comma => write!(f, ","),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire input, ending with an `Eof` token.
    pub fn tokenize(&mut self) -> ExpressionResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.pos + 1));
                break;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> ExpressionResult<Token> {
        let ch = self.input[self.pos];
        let col = self.pos + 1;

        let single = |kind: TokenKind| Token::new(kind, ch.to_string(), col);

        match ch {
            '(' => {
                self.advance();
                Ok(single(TokenKind::OpenParen))
            }
            ')' => {
                self.advance();
                Ok(single(TokenKind::CloseParen))
            }
            '[' => {
                self.advance();
                Ok(single(TokenKind::OpenBracket))
            }
            ']' => {
                self.advance();
                Ok(single(TokenKind::CloseBracket))
            }
            ',' => {
                self.advance();
                Ok(single(TokenKind::Comma))
            }
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
                Ok(Token::new(TokenKind::Eq, "==", col))
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::NotEq, "!=", col))
                } else {
                    Ok(Token::new(TokenKind::Not, "!", col))
                }
            }
            '<' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        Ok(Token::new(TokenKind::Le, "<=", col))
                    }
                    Some('>') => {
                        self.advance();
                        Ok(Token::new(TokenKind::NotEq, "<>", col))
                    }
                    _ => Ok(Token::new(TokenKind::Lt, "<", col)),
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::Ge, ">=", col))
                } else {
                    Ok(Token::new(TokenKind::Gt, ">", col))
                }
            }
            '&' => self.read_doubled('&', TokenKind::And, col),
            '|' => self.read_doubled('|', TokenKind::Or, col),
            '"' | '\'' => self.read_string(ch),
            c if c.is_ascii_digit() => Ok(self.read_number()),
            '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => Ok(self.read_number()),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_word()),
            _ => Err(ExpressionError::Syntax {
                col,
                message: format!("Unexpected character '{}'", ch),
            }),
        }
    }

    fn read_doubled(&mut self, ch: char, kind: TokenKind, col: usize) -> ExpressionResult<Token> {
        self.advance();
        if self.peek() != Some(ch) {
            return Err(ExpressionError::Syntax {
                col,
                message: format!("Expected '{}{}'", ch, ch),
            });
        }
        self.advance();
        Ok(Token::new(kind, format!("{}{}", ch, ch), col))
    }

    fn read_string(&mut self, quote: char) -> ExpressionResult<Token> {
        let col = self.pos + 1;
        self.advance();
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(ExpressionError::Syntax {
                        col,
                        message: "Unterminated string literal".to_string(),
                    })
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(c) => value.push(c),
                        None => continue,
                    }
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::StringLiteral, value, col))
    }

    fn read_number(&mut self) -> Token {
        let col = self.pos + 1;
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.input[start..self.pos].iter().collect();
        Token::new(TokenKind::NumberLiteral, text, col)
    }

    fn read_word(&mut self) -> Token {
        let col = self.pos + 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.input[start..self.pos].iter().collect();

        let kind = match text.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "CONTAINS" => TokenKind::Contains,
            "IN" => TokenKind::In,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            "NULL" | "NONE" => TokenKind::Null,
            _ => TokenKind::Identifier,
        };

        Token::new(kind, text, col)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}
