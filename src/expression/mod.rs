//! Rule and condition expressions
//!
//! A small boolean language over entity attributes used by validation,
//! conditional and policy steps:
//!
//! ```text
//! size >= 10 AND owner != null
//! status IN ['active', 'draft'] OR NOT archived
//! tags CONTAINS 'pii'
//! ```
//!
//! The engine only talks to the [`ExpressionEvaluator`] trait, so another
//! language can be plugged in without touching the handlers.

pub mod eval;
pub mod lexer;
pub mod parser;

use thiserror::Error;

use crate::execution::context::Entity;

pub use eval::Evaluator;
pub use parser::{CompareOp, Expr, Parser};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at column {col}: {message}")]
    Syntax { col: usize, message: String },

    #[error("Unexpected token at column {col}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        col: usize,
    },

    #[error("Unexpected end of expression: expected {0}")]
    UnexpectedEof(String),

    #[error("Empty expression")]
    Empty,

    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Evaluates rules and conditions against entity data.
pub trait ExpressionEvaluator: Send + Sync {
    /// Returns the verdict and a human-readable explanation.
    fn evaluate_rule(&self, rule: &str, entity: &Entity) -> ExpressionResult<(bool, String)>;

    fn evaluate_condition(&self, condition: &str, entity: &Entity) -> ExpressionResult<bool>;
}

/// Evaluator for the built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate_rule(&self, rule: &str, entity: &Entity) -> ExpressionResult<(bool, String)> {
        let expr = Parser::parse(rule)?;
        let evaluator = Evaluator::new(entity);

        if evaluator.test(&expr)? {
            return Ok((true, format!("Rule passed: {}", rule.trim())));
        }

        let reasons = evaluator.explain_failure(&expr)?;
        Ok((false, format!("Rule failed: {}", reasons.join("; "))))
    }

    fn evaluate_condition(&self, condition: &str, entity: &Entity) -> ExpressionResult<bool> {
        let expr = Parser::parse(condition)?;
        Evaluator::new(entity).test(&expr)
    }
}
