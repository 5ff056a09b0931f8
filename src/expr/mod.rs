//! # Expression Evaluator
//!
//! Compiles user-supplied math expressions once and evaluates them any
//! number of times against a [`Scope`].
//!
//! ## Seam
//!
//! Operations only talk to the [`Evaluator`] trait:
//!
//! ```rust,ignore
//! pub trait Evaluator: Send + Sync {
//!     type Compiled: Send + Sync;
//!     fn compile(&self, source: &str) -> Result<Self::Compiled>;
//!     fn evaluate(&self, compiled: &Self::Compiled, scope: &Scope<'_>) -> Result<ExprValue>;
//! }
//! ```
//!
//! [`MathEvaluator`] is the built-in language: numbers, strings, `+ - * / % ^`,
//! comparisons, `and`/`or`/`not`, `cond ? a : b`, and a small function set
//! (`abs`, `sqrt`, `round`, `log`, `min`, `max`, `concat`, `if`, …).
//!
//! ## Scope layering
//!
//! ```text
//! +-----------------------------+
//! |  row fields (column names)  |   checked first
//! +-----------------------------+
//! |  scalar variables (globals) |   fallback
//! +-----------------------------+
//! |  constants: pi, e           |   last
//! +-----------------------------+
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use bakehouse::expr::{Evaluator, ExprValue, MathEvaluator, Scope};
//! use bakehouse::store::Scalar;
//!
//! let mut globals = HashMap::new();
//! globals.insert("rate".to_string(), Scalar::Number(2.0));
//!
//! let engine = MathEvaluator;
//! let compiled = engine.compile("rate * 21").unwrap();
//! let value = engine.evaluate(&compiled, &Scope::new(&globals)).unwrap();
//! assert_eq!(value, ExprValue::Number(42.0));
//! ```

mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BakeError, Result};
use crate::store::{Row, Scalar, Value};

pub use eval::EvalError;
pub use parser::{BinaryOp, Expr, UnaryOp};

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl ExprValue {
    /// Cell form: booleans and text become text
    pub fn into_scalar(self) -> Scalar {
        match self {
            ExprValue::Number(n) => Scalar::Number(n),
            ExprValue::Text(s) => Scalar::Text(s),
            ExprValue::Bool(b) => Scalar::Text(b.to_string()),
        }
    }

    /// Variable form: numbers stay numbers, anything else becomes a string
    pub fn into_value(self) -> Value {
        Value::from(self.into_scalar())
    }
}

/// Name → scalar view for one evaluation. Never mutated by evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    globals: Option<&'a HashMap<String, Scalar>>,
    row: Option<&'a Row>,
}

impl<'a> Scope<'a> {
    pub fn new(globals: &'a HashMap<String, Scalar>) -> Self {
        Self {
            globals: Some(globals),
            row: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Layer a row over the globals; row fields win on collision
    pub fn with_row(self, row: &'a Row) -> Self {
        Self {
            row: Some(row),
            ..self
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Scalar> {
        self.row
            .and_then(|r| r.get(name))
            .or_else(|| self.globals.and_then(|g| g.get(name)))
    }
}

/// Pluggable expression language
pub trait Evaluator: Send + Sync {
    type Compiled: Send + Sync;

    fn compile(&self, source: &str) -> Result<Self::Compiled>;

    fn evaluate(&self, compiled: &Self::Compiled, scope: &Scope<'_>) -> Result<ExprValue>;
}

/// A parsed expression plus its source text (for error messages)
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: Arc<str>,
    ast: Expr,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

/// Built-in arithmetic/comparison language
#[derive(Debug, Clone, Copy, Default)]
pub struct MathEvaluator;

impl Evaluator for MathEvaluator {
    type Compiled = CompiledExpr;

    fn compile(&self, source: &str) -> Result<CompiledExpr> {
        let parse_error = |pos: usize, details: String| BakeError::ExpressionParse {
            expr: source.to_string(),
            position: pos,
            details,
        };

        let tokens = lexer::tokenize(source).map_err(|e| parse_error(e.pos, e.details))?;
        let ast = parser::parse(&tokens, source.len())
            .map_err(|e| parse_error(e.pos, e.details))?;

        Ok(CompiledExpr {
            source: Arc::from(source),
            ast,
        })
    }

    fn evaluate(&self, compiled: &CompiledExpr, scope: &Scope<'_>) -> Result<ExprValue> {
        eval::eval(&compiled.ast, scope).map_err(|e| BakeError::expression(compiled.source(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str, globals: &HashMap<String, Scalar>) -> Result<ExprValue> {
        let engine = MathEvaluator;
        let compiled = engine.compile(src)?;
        engine.evaluate(&compiled, &Scope::new(globals))
    }

    fn num(src: &str) -> f64 {
        match run(src, &HashMap::new()).unwrap() {
            ExprValue::Number(n) => n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(num("1 + 2 * 3"), 7.0);
        assert_eq!(num("(1 + 2) * 3"), 9.0);
        assert_eq!(num("-2^2"), -4.0);
        assert_eq!(num("2^-1"), 0.5);
        assert_eq!(num("7 % 4"), 3.0);
        assert_eq!(num("10 / 4"), 2.5);
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert_eq!(num("1 / 0"), f64::INFINITY);
    }

    #[test]
    fn runaway_nesting_is_a_parse_error() {
        let engine = MathEvaluator;
        let err = engine.compile(&"(".repeat(10_000)).unwrap_err();
        assert!(matches!(
            &err,
            BakeError::ExpressionParse { details, .. } if details == "expression nested too deeply"
        ));

        let chain = format!("1{}", " + 1".repeat(50_000));
        assert!(matches!(
            engine.compile(&chain),
            Err(BakeError::ExpressionParse { .. })
        ));
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(num("sqrt(16) + abs(-2)"), 6.0);
        assert_eq!(num("round(3.14159, 2)"), 3.14);
        assert_eq!(num("round(2.5)"), 3.0);
        assert_eq!(num("max(1, 5, 3) - min(4, 2)"), 3.0);
        assert!((num("log(8, 2)") - 3.0).abs() < 1e-12);
        assert_eq!(num("pow(2, 10)"), 1024.0);
        assert!((num("pi") - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn scope_shadows_constants() {
        let mut globals = HashMap::new();
        globals.insert("e".to_string(), Scalar::Number(5.0));
        assert_eq!(run("e * 2", &globals).unwrap(), ExprValue::Number(10.0));
    }

    #[test]
    fn row_fields_win_over_globals() {
        let mut globals = HashMap::new();
        globals.insert("A".to_string(), Scalar::Number(100.0));
        globals.insert("k".to_string(), Scalar::Number(10.0));
        let mut row = Row::new();
        row.insert("A".to_string(), Scalar::Number(2.0));

        let engine = MathEvaluator;
        let compiled = engine.compile("A + k").unwrap();
        let scope = Scope::new(&globals).with_row(&row);
        assert_eq!(engine.evaluate(&compiled, &scope).unwrap(), ExprValue::Number(12.0));
        // same compiled expression, no row
        assert_eq!(
            engine.evaluate(&compiled, &Scope::new(&globals)).unwrap(),
            ExprValue::Number(110.0)
        );
    }

    #[test]
    fn comparisons_and_logic_yield_booleans() {
        let g = HashMap::new();
        assert_eq!(run("3 > 2 and 1 == 1", &g).unwrap(), ExprValue::Bool(true));
        assert_eq!(run("'abc' == 'abc'", &g).unwrap(), ExprValue::Bool(true));
        assert_eq!(run("'10' == 10", &g).unwrap(), ExprValue::Bool(true));
        assert_eq!(run("not (1 < 0)", &g).unwrap(), ExprValue::Bool(true));
        assert_eq!(run("1 > 2 ? 'big' : 'small'", &g).unwrap(), ExprValue::Text("small".into()));
    }

    #[test]
    fn short_circuit_skips_undefined_names() {
        let g = HashMap::new();
        assert_eq!(run("false and ghost", &g).unwrap(), ExprValue::Bool(false));
        assert_eq!(run("if(1, 2, ghost)", &g).unwrap(), ExprValue::Number(2.0));
    }

    #[test]
    fn text_coercion() {
        let mut globals = HashMap::new();
        globals.insert("n".to_string(), Scalar::Text("4".into()));
        globals.insert("word".to_string(), Scalar::Text("hi".into()));

        assert_eq!(run("n * 2", &globals).unwrap(), ExprValue::Number(8.0));
        assert_eq!(
            run("concat(word, '-', 1)", &globals).unwrap(),
            ExprValue::Text("hi-1".into())
        );
        let err = run("word + 1", &globals).unwrap_err();
        assert!(err.to_string().contains("Cannot convert"));
    }

    #[test]
    fn undefined_symbol_is_expression_error() {
        let err = run("ghost + 1", &HashMap::new()).unwrap_err();
        match err {
            BakeError::Expression { expr, cause } => {
                assert_eq!(expr, "ghost + 1");
                assert_eq!(cause, "Undefined symbol ghost");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_expression_is_parse_error() {
        let err = MathEvaluator.compile("1 +").unwrap_err();
        assert!(matches!(err, BakeError::ExpressionParse { position: 3, .. }));
        assert!(matches!(MathEvaluator.compile("   "), Err(BakeError::ExpressionParse { .. })));
    }

    #[test]
    fn unknown_function_and_arity() {
        let g = HashMap::new();
        assert!(run("frobnicate(1)", &g).unwrap_err().to_string().contains("Undefined function"));
        assert!(run("sqrt(1, 2)", &g).is_err());
    }

    #[test]
    fn result_conversion() {
        assert_eq!(ExprValue::Bool(true).into_scalar(), Scalar::Text("true".into()));
        assert_eq!(ExprValue::Number(1.0).into_value(), Value::number(1.0));
        assert_eq!(ExprValue::Text("x".into()).into_value(), Value::string("x"));
    }
}
