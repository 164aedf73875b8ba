//! Expression evaluation against a variable scope
//!
//! Evaluation is pure and side-effect-free. Missing variables and absent
//! path segments resolve to `Value::Null` (the sentinel) rather than
//! raising; errors are reserved for malformed input and failed numeric
//! coercion, and callers in the engine surface those as a log line plus
//! the sentinel.

use serde_json::{Map, Value};

use crate::builtins;
use crate::error::{EvalError, Result};
use crate::parser::{self, BinaryOp, Expr, PathSeg, UnaryOp};
use crate::template;
use crate::value::{self, is_truthy};

/// Variable scope for one evaluation: the session variables plus any
/// per-element locals (`item`, `index`) layered on top by sequence
/// builtins. Locals shadow session variables of the same name.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    base: &'a Map<String, Value>,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    /// Create a scope over a variables map.
    pub fn new(base: &'a Map<String, Value>) -> Self {
        Self {
            base,
            locals: Vec::new(),
        }
    }

    /// Derive a child scope with additional locals layered on top.
    pub(crate) fn child(&self, extra: Vec<(String, Value)>) -> Scope<'a> {
        let mut locals = self.locals.clone();
        locals.extend(extra);
        Scope {
            base: self.base,
            locals,
        }
    }

    /// Look up a root name, innermost locals first.
    fn root(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .or_else(|| self.base.get(name))
    }

    /// Whether a root name exists at all (even bound to null).
    fn has_root(&self, name: &str) -> bool {
        self.locals.iter().any(|(k, _)| k == name) || self.base.contains_key(name)
    }
}

/// Evaluate an expression string against a scope.
///
/// Tried in order: a template containing `{{ … }}` placeholders (a
/// template that is exactly one placeholder returns the raw typed value,
/// anything else interpolates to a string), then the expression grammar
/// proper — bare dotted paths, call expressions and literal arithmetic.
pub fn evaluate(expr: &str, scope: &Scope) -> Result<Value> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    if template::has_placeholder(trimmed) {
        if let Some(inner) = template::single_placeholder(trimmed) {
            return evaluate_fragment(inner.trim(), scope);
        }
        return Ok(Value::String(template::interpolate(trimmed, scope)));
    }
    evaluate_fragment(trimmed, scope)
}

/// Evaluate without template detection (used for placeholder bodies).
pub(crate) fn evaluate_fragment(expr: &str, scope: &Scope) -> Result<Value> {
    let ast = parser::parse(expr)?;
    eval_expr(&ast, scope)
}

/// Evaluate an expression as a boolean condition.
///
/// Total: an evaluation error logs at warn level and counts as false,
/// so a broken condition never crashes the engine loop.
pub fn evaluate_condition(expr: &str, scope: &Scope) -> bool {
    match evaluate(expr, scope) {
        Ok(v) => is_truthy(&v),
        Err(e) => {
            log::warn!("condition '{}' failed to evaluate: {}", expr, e);
            false
        }
    }
}

pub(crate) fn eval_expr(expr: &Expr, scope: &Scope) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segments) => Ok(resolve_path(segments, scope)),
        Expr::Unary { op, operand } => {
            let v = eval_expr(operand, scope)?;
            match op {
                UnaryOp::Neg => value::number(-value::require_f64(&v)?),
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&v))),
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scope),
        Expr::Call { function, args } => builtins::call(function, args, scope),
        Expr::Member { base, segments } => {
            let v = eval_expr(base, scope)?;
            Ok(walk_segments(&v, segments).cloned().unwrap_or(Value::Null))
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<Value> {
    // Short-circuit logic first; both sides are truthiness-tested
    match op {
        BinaryOp::And => {
            let l = eval_expr(left, scope)?;
            if !is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            let r = eval_expr(right, scope)?;
            return Ok(Value::Bool(is_truthy(&r)));
        }
        BinaryOp::Or => {
            let l = eval_expr(left, scope)?;
            if is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            let r = eval_expr(right, scope)?;
            return Ok(Value::Bool(is_truthy(&r)));
        }
        _ => {}
    }

    let l = eval_expr(left, scope)?;
    let r = eval_expr(right, scope)?;
    match op {
        BinaryOp::Add => value::number(value::require_f64(&l)? + value::require_f64(&r)?),
        BinaryOp::Sub => value::number(value::require_f64(&l)? - value::require_f64(&r)?),
        BinaryOp::Mul => value::number(value::require_f64(&l)? * value::require_f64(&r)?),
        BinaryOp::Div => {
            let divisor = value::require_f64(&r)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            value::number(value::require_f64(&l)? / divisor)
        }
        BinaryOp::Rem => {
            let divisor = value::require_f64(&r)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            value::number(value::require_f64(&l)? % divisor)
        }
        BinaryOp::Eq => Ok(Value::Bool(value::loose_eq(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!value::loose_eq(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = order_values(&l, &r)?;
            let b = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(b))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn order_values(l: &Value, r: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (value::as_f64(l), value::as_f64(r)) {
        return Ok(x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal));
    }
    if let (Value::String(x), Value::String(y)) = (l, r) {
        return Ok(x.cmp(y));
    }
    Err(EvalError::NotOrdered {
        left: value::type_name(l),
        right: value::type_name(r),
    })
}

/// Resolve a dotted path by successive lookups. Any absent segment or
/// type mismatch yields the null sentinel; this never errors.
pub(crate) fn resolve_path(segments: &[PathSeg], scope: &Scope) -> Value {
    let Some(PathSeg::Key(name)) = segments.first() else {
        return Value::Null;
    };
    let Some(root) = scope.root(name) else {
        return Value::Null;
    };
    walk_segments(root, &segments[1..])
        .cloned()
        .unwrap_or(Value::Null)
}

/// Whether every segment of a path exists, regardless of its value.
/// Distinguishes "bound to null" from "never set" for isDefined().
pub(crate) fn path_is_defined(segments: &[PathSeg], scope: &Scope) -> bool {
    let Some(PathSeg::Key(name)) = segments.first() else {
        return false;
    };
    if !scope.has_root(name) {
        return false;
    }
    let Some(root) = scope.root(name) else {
        return false;
    };
    walk_segments(root, &segments[1..]).is_some()
}

/// Walk non-root segments down a value tree.
fn walk_segments<'v>(root: &'v Value, segments: &[PathSeg]) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (PathSeg::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSeg::Index(i), Value::Array(items)) => items.get(*i)?,
            // dot-notation numeric keys on objects ("a.0" against {"0": …})
            (PathSeg::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            // bracket string keys on arrays never resolve
            _ => return None,
        };
    }
    Some(current)
}
