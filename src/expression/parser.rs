//! Parser: recursive descent over lexer tokens
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := and ( OR and )*
//! and        := unary ( AND unary )*
//! unary      := NOT unary | comparison
//! comparison := operand [ op operand | [NOT] IN operand | CONTAINS operand ]
//! operand    := literal | path | '(' expr ')' | '[' list ']'
//! ```

use std::fmt;

use serde_json::{Number, Value};

use super::lexer::{Lexer, Token, TokenKind};
use super::{ExpressionError, ExpressionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    In,
    NotIn,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "CONTAINS",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        };
        f.write_str(s)
    }
}

/// Parsed expression tree
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted attribute path into the entity
    Path(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Self::Literal(v) => write!(f, "{}", v),
            Self::Path(p) => f.write_str(p),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Not(inner) => write!(f, "NOT {}", inner),
            Self::And(l, r) => write!(f, "({} AND {})", l, r),
            Self::Or(l, r) => write!(f, "({} OR {})", l, r),
            Self::Compare { op, left, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

/// Deepest expression tree the parser will build. Groups, `NOT`, lists and
/// each chained `AND` / `OR` count one level.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Parse expression text into a tree; trailing tokens are an error.
    pub fn parse(input: &str) -> ExpressionResult<Expr> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self {
            tokens,
            pos: 0,
            depth: 0,
        };

        if parser.check(TokenKind::Eof) {
            return Err(ExpressionError::Empty);
        }

        let expr = parser.parse_or()?;
        if !parser.check(TokenKind::Eof) {
            let tok = parser.peek();
            return Err(ExpressionError::UnexpectedToken {
                expected: "end of input".to_string(),
                found: tok.text.clone(),
                col: tok.col,
            });
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        while self.check(TokenKind::Or) {
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        while self.check(TokenKind::And) {
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        if self.check(TokenKind::Not) {
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    /// Enters one nesting level, failing past [`MAX_NESTING`].
    fn descend(&mut self) -> ExpressionResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(ExpressionError::Syntax {
                col: self.peek().col,
                message: "Expression nested too deeply".to_string(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let left = self.parse_operand()?;

        let op = match self.peek_kind() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Contains => CompareOp::Contains,
            TokenKind::In => CompareOp::In,
            TokenKind::Not if self.peek_next_kind() == TokenKind::In => {
                self.advance();
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> ExpressionResult<Expr> {
        let tok = self.advance().clone();
        match tok.kind {
            TokenKind::Identifier => Ok(Expr::Path(tok.text)),
            TokenKind::StringLiteral => Ok(Expr::Literal(Value::String(tok.text))),
            TokenKind::NumberLiteral => parse_number(&tok).map(Expr::Literal),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::OpenParen => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(TokenKind::CloseParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::OpenBracket => {
                self.descend()?;
                let mut items = Vec::new();
                while !self.check(TokenKind::CloseBracket) {
                    items.push(self.parse_operand()?);
                    if !self.check(TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(TokenKind::CloseBracket)?;
                self.depth -= 1;
                Ok(Expr::List(items))
            }
            TokenKind::Eof => Err(ExpressionError::UnexpectedEof("operand".to_string())),
            _ => Err(ExpressionError::UnexpectedToken {
                expected: "operand".to_string(),
                found: tok.text,
                col: tok.col,
            }),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn peek_next_kind(&self) -> TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        self.tokens[idx].kind.clone()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> ExpressionResult<&Token> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else if self.check(TokenKind::Eof) {
            Err(ExpressionError::UnexpectedEof(kind.to_string()))
        } else {
            let tok = self.peek();
            Err(ExpressionError::UnexpectedToken {
                expected: kind.to_string(),
                found: tok.text.clone(),
                col: tok.col,
            })
        }
    }
}

fn parse_number(tok: &Token) -> ExpressionResult<Value> {
    let invalid = || ExpressionError::Syntax {
        col: tok.col,
        message: format!("'{}' is not a valid number", tok.text),
    };

    if let Ok(i) = tok.text.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    let f = tok.text.parse::<f64>().map_err(|_| invalid())?;
    Number::from_f64(f).map(Value::Number).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence_and_binds_tighter() {
        let expr = Parser::parse("a OR b AND c").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_grouping() {
        let expr = Parser::parse("(a OR b) AND c").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn test_comparison_literals() {
        let expr = Parser::parse("size >= 10").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                op: CompareOp::Ge,
                left: Box::new(Expr::Path("size".to_string())),
                right: Box::new(Expr::Literal(json!(10))),
            }
        );
    }

    #[test]
    fn test_not_in_list() {
        let expr = Parser::parse("status NOT IN ['draft', 'retired']").unwrap();
        match expr {
            Expr::Compare { op, right, .. } => {
                assert_eq!(op, CompareOp::NotIn);
                assert!(matches!(*right, Expr::List(ref items) if items.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_display_round_trips_meaning() {
        let expr = Parser::parse("owner != null and tier in [1, 2]").unwrap();
        assert_eq!(expr.to_string(), "(owner != null AND tier IN [1, 2])");
    }

    #[test]
    fn test_empty_expression() {
        assert!(matches!(Parser::parse("   "), Err(ExpressionError::Empty)));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = Parser::parse("a == 1 b").unwrap_err();
        assert!(matches!(err, ExpressionError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_missing_close_paren() {
        let err = Parser::parse("(a == 1").unwrap_err();
        assert!(matches!(err, ExpressionError::UnexpectedEof(_)));
    }

    fn assert_too_deep(input: &str) {
        match Parser::parse(input) {
            Err(ExpressionError::Syntax { message, .. }) => {
                assert_eq!(message, "Expression nested too deeply")
            }
            other => panic!("expected nesting error, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_parentheses_rejected() {
        let deep = format!("{}x{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_too_deep(&deep);
    }

    #[test]
    fn test_deep_not_and_lists_rejected() {
        assert_too_deep(&format!("{}x", "NOT ".repeat(100_000)));
        assert_too_deep(&format!("x IN {}1{}", "[".repeat(100_000), "]".repeat(100_000)));
    }

    #[test]
    fn test_long_chain_rejected() {
        let terms: Vec<String> = (0..100_000).map(|i| format!("a{} == 1", i)).collect();
        assert_too_deep(&terms.join(" AND "));
    }

    #[test]
    fn test_nesting_within_limit() {
        let depth = MAX_NESTING - 1;
        let nested = format!("{}x == 1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(Parser::parse(&nested).is_ok());

        let terms: Vec<String> = (0..10).map(|i| format!("a{} == {}", i, i)).collect();
        assert!(Parser::parse(&terms.join(" OR ")).is_ok());
    }
}
