//! Builtin function table
//!
//! All builtins are pure and total over their inputs. Sequence builtins
//! (`where`, `select`, …) receive their per-element argument unevaluated
//! and run it once per element with `item` and `index` bound in a child
//! scope.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{EvalError, Result};
use crate::eval::{eval_expr, path_is_defined, Scope};
use crate::parser::Expr;
use crate::value::{self, display_string, is_truthy, loose_eq};

pub(crate) fn call(function: &str, args: &[Expr], scope: &Scope) -> Result<Value> {
    match function {
        "len" => {
            exact("len", args, 1)?;
            let v = eval_expr(&args[0], scope)?;
            let n = match &v {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => 0,
            };
            Ok(Value::from(n as u64))
        }
        "split" => {
            exact("split", args, 2)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            let d = display_string(&eval_expr(&args[1], scope)?);
            let parts: Vec<Value> = if d.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(&d).map(|p| Value::String(p.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "join" => {
            exact("join", args, 2)?;
            let items = sequence("join", eval_expr(&args[0], scope)?)?;
            let d = display_string(&eval_expr(&args[1], scope)?);
            let joined = items
                .iter()
                .map(display_string)
                .collect::<Vec<_>>()
                .join(&d);
            Ok(Value::String(joined))
        }
        "toNumber" => {
            exact("toNumber", args, 1)?;
            let v = eval_expr(&args[0], scope)?;
            match value::as_f64(&v) {
                Some(f) => value::number(f),
                None => Ok(Value::Null),
            }
        }
        "trim" => {
            exact("trim", args, 1)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            Ok(Value::String(s.trim().to_string()))
        }
        "upper" => {
            exact("upper", args, 1)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            Ok(Value::String(s.to_uppercase()))
        }
        "lower" => {
            exact("lower", args, 1)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            Ok(Value::String(s.to_lowercase()))
        }
        "contains" => {
            exact("contains", args, 2)?;
            let container = eval_expr(&args[0], scope)?;
            let needle = eval_expr(&args[1], scope)?;
            let found = match &container {
                Value::String(s) => s.contains(&display_string(&needle)),
                Value::Array(a) => a.iter().any(|v| loose_eq(v, &needle)),
                Value::Object(o) => o.contains_key(&display_string(&needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "startsWith" => {
            exact("startsWith", args, 2)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            let p = display_string(&eval_expr(&args[1], scope)?);
            Ok(Value::Bool(s.starts_with(&p)))
        }
        "endsWith" => {
            exact("endsWith", args, 2)?;
            let s = display_string(&eval_expr(&args[0], scope)?);
            let p = display_string(&eval_expr(&args[1], scope)?);
            Ok(Value::Bool(s.ends_with(&p)))
        }
        "isEmpty" => {
            exact("isEmpty", args, 1)?;
            let v = eval_expr(&args[0], scope)?;
            let empty = match &v {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                _ => false,
            };
            Ok(Value::Bool(empty))
        }
        "coalesce" => {
            at_least("coalesce", args, 1)?;
            for arg in args {
                let v = eval_expr(arg, scope)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            Ok(Value::Null)
        }
        "isNull" => {
            exact("isNull", args, 1)?;
            Ok(Value::Bool(eval_expr(&args[0], scope)?.is_null()))
        }
        "isNotNull" => {
            exact("isNotNull", args, 1)?;
            Ok(Value::Bool(!eval_expr(&args[0], scope)?.is_null()))
        }
        "isDefined" => {
            exact("isDefined", args, 1)?;
            Ok(Value::Bool(arg_is_defined(&args[0], scope)?))
        }
        "isUndefined" => {
            exact("isUndefined", args, 1)?;
            Ok(Value::Bool(!arg_is_defined(&args[0], scope)?))
        }
        "addItem" => {
            exact("addItem", args, 2)?;
            let mut items = sequence("addItem", eval_expr(&args[0], scope)?)?;
            items.push(eval_expr(&args[1], scope)?);
            Ok(Value::Array(items))
        }
        "removeItem" => {
            exact("removeItem", args, 2)?;
            let mut items = sequence("removeItem", eval_expr(&args[0], scope)?)?;
            let target = eval_expr(&args[1], scope)?;
            items.retain(|v| !loose_eq(v, &target));
            Ok(Value::Array(items))
        }
        "removeAt" => {
            exact("removeAt", args, 2)?;
            let mut items = sequence("removeAt", eval_expr(&args[0], scope)?)?;
            let index = index_arg("removeAt", &eval_expr(&args[1], scope)?)?;
            if index < items.len() {
                items.remove(index);
            }
            Ok(Value::Array(items))
        }

        // --- sequence family, per-element scope {item, index} ---
        "where" => {
            exact("where", args, 2)?;
            let items = sequence("where", eval_expr(&args[0], scope)?)?;
            let mut kept = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                if is_truthy(&per_item(&args[1], scope, &item, i)?) {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        }
        "select" => {
            exact("select", args, 2)?;
            let items = sequence("select", eval_expr(&args[0], scope)?)?;
            let mut mapped = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                mapped.push(per_item(&args[1], scope, item, i)?);
            }
            Ok(Value::Array(mapped))
        }
        "orderBy" => {
            between("orderBy", args, 1, 3)?;
            let items = sequence("orderBy", eval_expr(&args[0], scope)?)?;
            let (key_expr, descending) = order_by_args(args, scope)?;
            let mut keyed = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let key = match key_expr {
                    Some(expr) => per_item(expr, scope, &item, i)?,
                    None => item.clone(),
                };
                keyed.push((key, item));
            }
            keyed.sort_by(|(a, _), (b, _)| value::ordering(a, b));
            if descending {
                keyed.reverse();
            }
            Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
        }
        "distinct" => {
            between("distinct", args, 1, 2)?;
            let items = sequence("distinct", eval_expr(&args[0], scope)?)?;
            let mut seen = HashSet::new();
            let mut unique = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let key = match args.get(1) {
                    Some(expr) => per_item(expr, scope, &item, i)?,
                    None => item.clone(),
                };
                // canonical form gives structural dedup for objects too
                if seen.insert(key.to_string()) {
                    unique.push(item);
                }
            }
            Ok(Value::Array(unique))
        }
        "take" => {
            exact("take", args, 2)?;
            let items = sequence("take", eval_expr(&args[0], scope)?)?;
            let n = index_arg("take", &eval_expr(&args[1], scope)?)?;
            Ok(Value::Array(items.into_iter().take(n).collect()))
        }
        "skip" => {
            exact("skip", args, 2)?;
            let items = sequence("skip", eval_expr(&args[0], scope)?)?;
            let n = index_arg("skip", &eval_expr(&args[1], scope)?)?;
            Ok(Value::Array(items.into_iter().skip(n).collect()))
        }
        "sum" => {
            between("sum", args, 1, 2)?;
            let numbers = numeric_values("sum", args, scope)?;
            value::number(numbers.iter().sum())
        }
        "avg" => {
            between("avg", args, 1, 2)?;
            let numbers = numeric_values("avg", args, scope)?;
            if numbers.is_empty() {
                return Ok(Value::Null);
            }
            value::number(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        "min" => {
            between("min", args, 1, 2)?;
            let keys = selected_values("min", args, scope)?;
            Ok(keys
                .into_iter()
                .min_by(|a, b| value::ordering(a, b))
                .unwrap_or(Value::Null))
        }
        "max" => {
            between("max", args, 1, 2)?;
            let keys = selected_values("max", args, scope)?;
            Ok(keys
                .into_iter()
                .max_by(|a, b| value::ordering(a, b))
                .unwrap_or(Value::Null))
        }
        "count" => {
            between("count", args, 1, 2)?;
            let items = sequence("count", eval_expr(&args[0], scope)?)?;
            let n = match args.get(1) {
                None => items.len(),
                Some(pred) => {
                    let mut n = 0;
                    for (i, item) in items.iter().enumerate() {
                        if is_truthy(&per_item(pred, scope, item, i)?) {
                            n += 1;
                        }
                    }
                    n
                }
            };
            Ok(Value::from(n as u64))
        }
        "first" => {
            between("first", args, 1, 2)?;
            let items = sequence("first", eval_expr(&args[0], scope)?)?;
            match args.get(1) {
                None => Ok(items.into_iter().next().unwrap_or(Value::Null)),
                Some(pred) => {
                    for (i, item) in items.into_iter().enumerate() {
                        if is_truthy(&per_item(pred, scope, &item, i)?) {
                            return Ok(item);
                        }
                    }
                    Ok(Value::Null)
                }
            }
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn exact(function: &'static str, args: &[Expr], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(EvalError::Arity {
            function,
            expected: n.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

fn at_least(function: &'static str, args: &[Expr], n: usize) -> Result<()> {
    if args.len() < n {
        return Err(EvalError::Arity {
            function,
            expected: format!("at least {}", n),
            got: args.len(),
        });
    }
    Ok(())
}

fn between(function: &'static str, args: &[Expr], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::Arity {
            function,
            expected: format!("{}-{}", min, max),
            got: args.len(),
        });
    }
    Ok(())
}

/// Arrays pass through, null counts as the empty sequence.
fn sequence(function: &'static str, v: Value) -> Result<Vec<Value>> {
    match v {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(EvalError::NotASequence {
            function,
            got: value::type_name(&other),
        }),
    }
}

/// Evaluate a per-element argument with `item` and `index` bound.
fn per_item(expr: &Expr, scope: &Scope, item: &Value, index: usize) -> Result<Value> {
    let child = scope.child(vec![
        ("item".to_string(), item.clone()),
        ("index".to_string(), Value::from(index as u64)),
    ]);
    eval_expr(expr, &child)
}

fn index_arg(function: &'static str, v: &Value) -> Result<usize> {
    let f = value::as_f64(v).ok_or_else(|| EvalError::NotNumeric(format!("{}() index", function)))?;
    Ok(if f <= 0.0 { 0 } else { f as usize })
}

/// isDefined/isUndefined look at path existence when given a path,
/// and at null-ness for any other expression.
fn arg_is_defined(arg: &Expr, scope: &Scope) -> Result<bool> {
    if let Expr::Path(segments) = arg {
        return Ok(path_is_defined(segments, scope));
    }
    Ok(!eval_expr(arg, scope)?.is_null())
}

/// Elements (or selected keys) coerced to numbers; non-numeric entries
/// are skipped so aggregates stay total over mixed data.
fn numeric_values(function: &'static str, args: &[Expr], scope: &Scope) -> Result<Vec<f64>> {
    let keys = selected_values(function, args, scope)?;
    Ok(keys.iter().filter_map(value::as_f64).collect())
}

fn selected_values(function: &'static str, args: &[Expr], scope: &Scope) -> Result<Vec<Value>> {
    let items = sequence(function, eval_expr(&args[0], scope)?)?;
    match args.get(1) {
        None => Ok(items),
        Some(selector) => {
            let mut keys = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                keys.push(per_item(selector, scope, item, i)?);
            }
            Ok(keys)
        }
    }
}

/// Disambiguate orderBy's optional arguments: a literal "asc"/"desc"
/// string is a direction, anything else is a key expression.
fn order_by_args<'e>(args: &'e [Expr], scope: &Scope) -> Result<(Option<&'e Expr>, bool)> {
    match args.len() {
        1 => Ok((None, false)),
        2 => {
            if let Expr::Literal(Value::String(s)) = &args[1] {
                if s.eq_ignore_ascii_case("asc") || s.eq_ignore_ascii_case("desc") {
                    return Ok((None, s.eq_ignore_ascii_case("desc")));
                }
            }
            Ok((Some(&args[1]), false))
        }
        _ => {
            let dir = display_string(&eval_expr(&args[2], scope)?);
            Ok((Some(&args[1]), dir.eq_ignore_ascii_case("desc")))
        }
    }
}
