//! Builtin functions available to macro-time code.
//!
//! Arithmetic and comparison work on numbers with int/float promotion. The
//! `%`-prefixed sequence builtins are S-expression aware: they accept both
//! runtime sequences and raw list forms, which is what lets macro bodies
//! take arguments apart without evaluating them first.

use crate::ast::{Form, VECTOR};
use crate::errors::{codes, HqlError, Result};
use crate::interp::value::{form_to_value, BuiltinFn, Value};

pub fn lookup_builtin(name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match name {
        "+" => add,
        "-" => sub,
        "*" => mul,
        "/" => div,
        "%" => rem,
        "<" => lt,
        ">" => gt,
        "<=" => le,
        ">=" => ge,
        "==" => num_eq,
        "!=" => num_ne,
        "eq?" => structural_eq,
        "not" => not,
        "str" => str_concat,
        "list" => make_list,
        "list?" => is_list,
        "symbol?" => is_symbol,
        "name" => symbol_name,
        "%first" => seq_first,
        "%rest" => seq_rest,
        "%length" => seq_length,
        "%empty?" => seq_empty,
        "%nth" => seq_nth,
        _ => return None,
    };
    Some(f)
}

fn arity(args: &[Value], expected: usize, who: &str) -> Result<()> {
    if args.len() != expected {
        return Err(HqlError::runtime(format!(
            "Wrong number of arguments to {}: expected {}, got {}",
            who,
            expected,
            args.len()
        ))
        .with_code(codes::ARITY_MISMATCH));
    }
    Ok(())
}

fn number(value: &Value, who: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        HqlError::runtime(format!(
            "{}: expected number, got {}",
            who,
            value.type_name()
        ))
        .with_code(codes::TYPE_MISMATCH)
    })
}

fn all_ints(args: &[Value]) -> bool {
    args.iter().all(|v| matches!(v, Value::Int(_)))
}

fn fold_numeric(
    args: &[Value],
    who: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    if args.is_empty() {
        return Err(HqlError::runtime(format!(
            "Wrong number of arguments to {}: expected at least 1, got 0",
            who
        ))
        .with_code(codes::ARITY_MISMATCH));
    }
    if all_ints(args) {
        let mut acc = match args[0] {
            Value::Int(n) => n,
            _ => unreachable!(),
        };
        for v in &args[1..] {
            if let Value::Int(n) = v {
                acc = int_op(acc, *n);
            }
        }
        return Ok(Value::Int(acc));
    }
    let mut acc = number(&args[0], who)?;
    for v in &args[1..] {
        acc = float_op(acc, number(v, who)?);
    }
    Ok(Value::Float(acc))
}

fn add(args: &[Value]) -> Result<Value> {
    fold_numeric(args, "+", i64::wrapping_add, |a, b| a + b)
}

fn sub(args: &[Value]) -> Result<Value> {
    if args.len() == 1 {
        return match &args[0] {
            Value::Int(n) => Ok(Value::Int(-n)),
            other => Ok(Value::Float(-number(other, "-")?)),
        };
    }
    fold_numeric(args, "-", i64::wrapping_sub, |a, b| a - b)
}

fn mul(args: &[Value]) -> Result<Value> {
    fold_numeric(args, "*", i64::wrapping_mul, |a, b| a * b)
}

fn div(args: &[Value]) -> Result<Value> {
    arity(args, 2, "/")?;
    let b = number(&args[1], "/")?;
    if b == 0.0 {
        return Err(HqlError::runtime("Division by zero").with_code(codes::TYPE_MISMATCH));
    }
    // Exact integer division stays an integer.
    if let (Value::Int(x), Value::Int(y)) = (&args[0], &args[1]) {
        if x % y == 0 {
            return Ok(Value::Int(x / y));
        }
    }
    Ok(Value::Float(number(&args[0], "/")? / b))
}

fn rem(args: &[Value]) -> Result<Value> {
    arity(args, 2, "%")?;
    if let (Value::Int(x), Value::Int(y)) = (&args[0], &args[1]) {
        if *y == 0 {
            return Err(HqlError::runtime("Division by zero").with_code(codes::TYPE_MISMATCH));
        }
        return Ok(Value::Int(x % y));
    }
    Ok(Value::Float(number(&args[0], "%")? % number(&args[1], "%")?))
}

fn compare(args: &[Value], who: &str, op: fn(f64, f64) -> bool) -> Result<Value> {
    arity(args, 2, who)?;
    Ok(Value::Bool(op(number(&args[0], who)?, number(&args[1], who)?)))
}

fn lt(args: &[Value]) -> Result<Value> {
    compare(args, "<", |a, b| a < b)
}

fn gt(args: &[Value]) -> Result<Value> {
    compare(args, ">", |a, b| a > b)
}

fn le(args: &[Value]) -> Result<Value> {
    compare(args, "<=", |a, b| a <= b)
}

fn ge(args: &[Value]) -> Result<Value> {
    compare(args, ">=", |a, b| a >= b)
}

fn num_eq(args: &[Value]) -> Result<Value> {
    arity(args, 2, "==")?;
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a == b)),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Bool(x == y)),
            _ => Ok(Value::Bool(a == b)),
        },
    }
}

fn num_ne(args: &[Value]) -> Result<Value> {
    match num_eq(args)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => unreachable!(),
    }
}

fn structural_eq(args: &[Value]) -> Result<Value> {
    arity(args, 2, "eq?")?;
    Ok(Value::Bool(args[0] == args[1]))
}

fn not(args: &[Value]) -> Result<Value> {
    arity(args, 1, "not")?;
    Ok(Value::Bool(!args[0].truthy()))
}

fn str_concat(args: &[Value]) -> Result<Value> {
    let mut out = String::new();
    for v in args {
        out.push_str(&v.to_string());
    }
    Ok(Value::Str(out))
}

fn make_list(args: &[Value]) -> Result<Value> {
    Ok(Value::List(args.to_vec()))
}

fn is_list(args: &[Value]) -> Result<Value> {
    arity(args, 1, "list?")?;
    let result = match &args[0] {
        Value::List(_) | Value::Splice(_) => true,
        Value::Form(form) => form.as_list().is_some(),
        _ => false,
    };
    Ok(Value::Bool(result))
}

fn is_symbol(args: &[Value]) -> Result<Value> {
    arity(args, 1, "symbol?")?;
    let result = matches!(&args[0], Value::Form(form) if form.as_symbol().is_some());
    Ok(Value::Bool(result))
}

fn symbol_name(args: &[Value]) -> Result<Value> {
    arity(args, 1, "name")?;
    match &args[0] {
        Value::Form(form) => match form.as_symbol() {
            Some(name) => Ok(Value::Str(name.trim_start_matches(':').to_string())),
            None => Err(HqlError::runtime("name: expected symbol, got list")
                .with_code(codes::TYPE_MISMATCH)),
        },
        Value::Str(s) => Ok(Value::Str(s.clone())),
        other => Err(HqlError::runtime(format!(
            "name: expected symbol, got {}",
            other.type_name()
        ))
        .with_code(codes::TYPE_MISMATCH)),
    }
}

// ---------------------------------------------------------------------------
// Sequence introspection
// ---------------------------------------------------------------------------

// Views a value as a sequence of values. List forms contribute their
// elements, with the reader-synthesized `vector` head stripped so macro
// code sees `[1 2]` as two elements.
fn sequence_items(value: &Value, who: &str) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Splice(forms) => Ok(forms.iter().map(form_to_value).collect()),
        Value::Form(form) => {
            let items = form.as_list().ok_or_else(|| {
                HqlError::runtime(format!("{}: expected list, got {}", who, form))
                    .with_code(codes::TYPE_MISMATCH)
            })?;
            let items: &[Form] = if form.head_symbol() == Some(VECTOR) {
                &items[1..]
            } else {
                items
            };
            Ok(items.iter().map(form_to_value).collect())
        }
        other => Err(HqlError::runtime(format!(
            "{}: expected list, got {}",
            who,
            other.type_name()
        ))
        .with_code(codes::TYPE_MISMATCH)),
    }
}

fn seq_first(args: &[Value]) -> Result<Value> {
    arity(args, 1, "%first")?;
    let items = sequence_items(&args[0], "%first")?;
    Ok(items.into_iter().next().unwrap_or(Value::Null))
}

fn seq_rest(args: &[Value]) -> Result<Value> {
    arity(args, 1, "%rest")?;
    let items = sequence_items(&args[0], "%rest")?;
    if items.is_empty() {
        Ok(Value::List(Vec::new()))
    } else {
        Ok(Value::List(items[1..].to_vec()))
    }
}

fn seq_length(args: &[Value]) -> Result<Value> {
    arity(args, 1, "%length")?;
    Ok(Value::Int(sequence_items(&args[0], "%length")?.len() as i64))
}

fn seq_empty(args: &[Value]) -> Result<Value> {
    arity(args, 1, "%empty?")?;
    Ok(Value::Bool(sequence_items(&args[0], "%empty?")?.is_empty()))
}

fn seq_nth(args: &[Value]) -> Result<Value> {
    arity(args, 2, "%nth")?;
    let items = sequence_items(&args[0], "%nth")?;
    let idx = match &args[1] {
        Value::Int(n) if *n >= 0 => *n as usize,
        other => {
            return Err(HqlError::runtime(format!(
                "%nth: expected non-negative integer index, got {}",
                other.type_name()
            ))
            .with_code(codes::TYPE_MISMATCH))
        }
    };
    Ok(items.get(idx).cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::reader::read_program;

    #[test]
    fn arithmetic_keeps_ints_narrow() {
        assert_eq!(add(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(
            add(&[Value::Int(1), Value::Float(0.5)]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(div(&[Value::Int(10), Value::Int(2)]).unwrap(), Value::Int(5));
        assert_eq!(
            div(&[Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn sequence_builtins_on_forms() {
        let forms = read_program("(foo 1 2)", "t.hql").unwrap();
        let arg = Value::Form(forms[0].clone());
        let first = seq_first(&[arg.clone()]).unwrap();
        assert!(matches!(&first, Value::Form(f) if f.as_symbol() == Some("foo")));
        assert_eq!(seq_length(&[arg]).unwrap(), Value::Int(3));
    }

    #[test]
    fn vector_head_is_stripped() {
        let forms = read_program("[1 2 3]", "t.hql").unwrap();
        let arg = Value::Form(forms[0].clone());
        assert_eq!(seq_first(&[arg.clone()]).unwrap(), Value::Int(1));
        assert_eq!(seq_length(&[arg]).unwrap(), Value::Int(3));
    }

    #[test]
    fn symbol_predicates() {
        let forms = read_program("abc (a)", "t.hql").unwrap();
        assert_eq!(
            is_symbol(&[Value::Form(forms[0].clone())]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            is_list(&[Value::Form(forms[1].clone())]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            symbol_name(&[Value::Form(forms[0].clone())]).unwrap(),
            Value::Str("abc".into())
        );
    }
}
