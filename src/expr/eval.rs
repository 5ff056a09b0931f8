//! Tree-walking evaluation of a parsed [`Expr`] against a [`Scope`]

use std::cmp::Ordering;
use std::fmt;

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::{ExprValue, Scope};
use crate::store::{format_number, parse_number, Scalar};

/// Runtime failure inside an expression (undefined name, bad operand, …)
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError(pub String);

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type EvalResult<T> = Result<T, EvalError>;

fn fail<T>(msg: impl Into<String>) -> EvalResult<T> {
    Err(EvalError(msg.into()))
}

pub fn eval(expr: &Expr, scope: &Scope<'_>) -> EvalResult<ExprValue> {
    match expr {
        Expr::Number(n) => Ok(ExprValue::Number(*n)),
        Expr::Text(s) => Ok(ExprValue::Text(s.clone())),
        Expr::Bool(b) => Ok(ExprValue::Bool(*b)),
        Expr::Name(name) => lookup(name, scope),
        Expr::Unary { op, operand } => {
            let v = eval(operand, scope)?;
            match op {
                UnaryOp::Neg => Ok(ExprValue::Number(-to_number(&v)?)),
                UnaryOp::Plus => Ok(ExprValue::Number(to_number(&v)?)),
                UnaryOp::Not => Ok(ExprValue::Bool(!truthy(&v))),
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            if truthy(&eval(cond, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Call { name, args } => call(name, args, scope),
    }
}

fn lookup(name: &str, scope: &Scope<'_>) -> EvalResult<ExprValue> {
    if let Some(scalar) = scope.lookup(name) {
        return Ok(ExprValue::from(scalar.clone()));
    }
    match name {
        "pi" => Ok(ExprValue::Number(std::f64::consts::PI)),
        "e" => Ok(ExprValue::Number(std::f64::consts::E)),
        _ => fail(format!("Undefined symbol {}", name)),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: &Scope<'_>) -> EvalResult<ExprValue> {
    let l = eval(lhs, scope)?;

    // short-circuit
    match op {
        BinaryOp::And if !truthy(&l) => return Ok(ExprValue::Bool(false)),
        BinaryOp::Or if truthy(&l) => return Ok(ExprValue::Bool(true)),
        _ => {}
    }

    let r = eval(rhs, scope)?;

    let value = match op {
        BinaryOp::Add => ExprValue::Number(to_number(&l)? + to_number(&r)?),
        BinaryOp::Sub => ExprValue::Number(to_number(&l)? - to_number(&r)?),
        BinaryOp::Mul => ExprValue::Number(to_number(&l)? * to_number(&r)?),
        BinaryOp::Div => ExprValue::Number(to_number(&l)? / to_number(&r)?),
        BinaryOp::Rem => ExprValue::Number(to_number(&l)? % to_number(&r)?),
        BinaryOp::Pow => ExprValue::Number(to_number(&l)?.powf(to_number(&r)?)),
        BinaryOp::Eq => ExprValue::Bool(compare(&l, &r) == Some(Ordering::Equal)),
        BinaryOp::Ne => ExprValue::Bool(compare(&l, &r) != Some(Ordering::Equal)),
        BinaryOp::Lt => ExprValue::Bool(compare(&l, &r) == Some(Ordering::Less)),
        BinaryOp::Le => ExprValue::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => ExprValue::Bool(compare(&l, &r) == Some(Ordering::Greater)),
        BinaryOp::Ge => ExprValue::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::And | BinaryOp::Or => ExprValue::Bool(truthy(&r)),
    };
    Ok(value)
}

/// Numeric when both sides read as numbers, textual otherwise.
/// `None` means incomparable (NaN involved).
fn compare(l: &ExprValue, r: &ExprValue) -> Option<Ordering> {
    match (numeric(l), numeric(r)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(l.to_string().cmp(&r.to_string())),
    }
}

fn numeric(v: &ExprValue) -> Option<f64> {
    match v {
        ExprValue::Number(n) => Some(*n),
        ExprValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        ExprValue::Text(s) => parse_number(s),
    }
}

fn to_number(v: &ExprValue) -> EvalResult<f64> {
    numeric(v).ok_or_else(|| EvalError(format!("Cannot convert {:?} to a number", v.to_string())))
}

fn truthy(v: &ExprValue) -> bool {
    match v {
        ExprValue::Bool(b) => *b,
        ExprValue::Number(n) => *n != 0.0 && !n.is_nan(),
        ExprValue::Text(s) => !s.is_empty(),
    }
}

fn call(name: &str, args: &[Expr], scope: &Scope<'_>) -> EvalResult<ExprValue> {
    // lazy: only the chosen branch is evaluated
    if name == "if" {
        let [cond, then, otherwise] = args else {
            return fail("Function if expects 3 arguments");
        };
        return if truthy(&eval(cond, scope)?) {
            eval(then, scope)
        } else {
            eval(otherwise, scope)
        };
    }

    let values = args
        .iter()
        .map(|a| eval(a, scope))
        .collect::<EvalResult<Vec<_>>>()?;

    match name {
        "concat" => Ok(ExprValue::Text(
            values.iter().map(ToString::to_string).collect(),
        )),
        "string" => Ok(ExprValue::Text(single(name, &values)?.to_string())),
        "number" => Ok(ExprValue::Number(to_number(single(name, &values)?)?)),
        "min" | "max" => {
            if values.is_empty() {
                return fail(format!("Function {} expects at least 1 argument", name));
            }
            let nums = values.iter().map(to_number).collect::<EvalResult<Vec<_>>>()?;
            let pick = if name == "min" { f64::min } else { f64::max };
            Ok(ExprValue::Number(nums.into_iter().reduce(pick).unwrap_or(f64::NAN)))
        }
        "round" => {
            let (x, digits) = one_or_two(name, &values)?;
            let factor = 10f64.powi(digits.unwrap_or(0.0) as i32);
            Ok(ExprValue::Number((x * factor).round() / factor))
        }
        "log" => {
            let (x, base) = one_or_two(name, &values)?;
            Ok(ExprValue::Number(match base {
                Some(b) => x.ln() / b.ln(),
                None => x.ln(),
            }))
        }
        "pow" | "mod" => {
            let [a, b] = values.as_slice() else {
                return fail(format!("Function {} expects 2 arguments", name));
            };
            let (a, b) = (to_number(a)?, to_number(b)?);
            Ok(ExprValue::Number(if name == "pow" { a.powf(b) } else { a % b }))
        }
        _ => {
            let Some(f) = unary_math(name) else {
                return fail(format!("Undefined function {}", name));
            };
            Ok(ExprValue::Number(f(to_number(single(name, &values)?)?)))
        }
    }
}

fn unary_math(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "abs" => f64::abs,
        "sqrt" => f64::sqrt,
        "cbrt" => f64::cbrt,
        "exp" => f64::exp,
        "log10" => f64::log10,
        "log2" => f64::log2,
        "floor" => f64::floor,
        "ceil" => f64::ceil,
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "sign" => |x| if x == 0.0 || x.is_nan() { x } else { x.signum() },
        _ => return None,
    };
    Some(f)
}

fn single<'v>(name: &str, values: &'v [ExprValue]) -> EvalResult<&'v ExprValue> {
    match values {
        [v] => Ok(v),
        _ => fail(format!("Function {} expects 1 argument", name)),
    }
}

fn one_or_two(name: &str, values: &[ExprValue]) -> EvalResult<(f64, Option<f64>)> {
    match values {
        [x] => Ok((to_number(x)?, None)),
        [x, y] => Ok((to_number(x)?, Some(to_number(y)?))),
        _ => fail(format!("Function {} expects 1 or 2 arguments", name)),
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Number(n) => f.write_str(&format_number(*n)),
            ExprValue::Text(s) => f.write_str(s),
            ExprValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<Scalar> for ExprValue {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Number(n) => ExprValue::Number(n),
            Scalar::Text(t) => ExprValue::Text(t),
        }
    }
}
