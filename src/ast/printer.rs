//! Pretty printer for forms.
//!
//! Prints back the surface syntax the reader accepts, including the sugar
//! the reader expands: quote family prefixes, `[...]` vectors, `{...}` maps.
//! `read(print(form))` yields a structurally equal tree, which the reader
//! round-trip tests rely on.

use super::{Form, Literal, Sexp, HASH_MAP, VECTOR};

const QUOTE_SUGAR: &[(&str, &str)] = &[
    ("quote", "'"),
    ("quasiquote", "`"),
    ("unquote", "~"),
    ("unquote-splicing", "~@"),
];

pub fn print_form(form: &Form) -> String {
    let mut out = String::new();
    write_form(form, &mut out);
    out
}

pub fn print_program(forms: &[Form]) -> String {
    forms.iter().map(print_form).collect::<Vec<_>>().join("\n")
}

fn write_form(form: &Form, out: &mut String) {
    match &*form.sexp {
        Sexp::Symbol(name) => out.push_str(name),
        Sexp::Literal(lit) => write_literal(lit, out),
        Sexp::List(items) => write_list(form, items, out),
    }
}

fn write_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::Null => out.push_str("null"),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(n) => out.push_str(&n.to_string()),
        Literal::Float(n) => {
            // Keep a decimal point so the reader parses it back as a float.
            if n.fract() == 0.0 && n.is_finite() {
                out.push_str(&format!("{:.1}", n));
            } else {
                out.push_str(&n.to_string());
            }
        }
        Literal::Str(s) => write_string(s, out),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn write_list(form: &Form, items: &[Form], out: &mut String) {
    if let Some(head) = form.head_symbol() {
        if items.len() == 2 {
            if let Some((_, sigil)) = QUOTE_SUGAR.iter().find(|(name, _)| *name == head) {
                out.push_str(sigil);
                write_form(&items[1], out);
                return;
            }
        }
        if head == VECTOR {
            write_delimited(&items[1..], "[", "]", out);
            return;
        }
        if head == HASH_MAP && print_map(&items[1..], out) {
            return;
        }
    }
    write_delimited(items, "(", ")", out);
}

fn write_delimited(items: &[Form], open: &str, close: &str, out: &mut String) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_form(item, out);
    }
    out.push_str(close);
}

// Maps only print as `{...}` when every key is printable in map syntax;
// computed keys fall back to the canonical (hash-map ...) spelling.
fn print_map(entries: &[Form], out: &mut String) -> bool {
    if entries.len() % 2 != 0 {
        return false;
    }
    let printable = entries.chunks(2).all(|pair| {
        pair[0].as_keyword().is_some() || matches!(pair[0].as_literal(), Some(Literal::Str(_)))
    });
    if !printable {
        return false;
    }
    out.push('{');
    for (i, pair) in entries.chunks(2).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if let Some(key) = pair[0].as_keyword() {
            out.push(':');
            out.push_str(key);
            out.push(' ');
        } else if let Some(Literal::Str(key)) = pair[0].as_literal() {
            write_string(key, out);
            out.push_str(": ");
        }
        write_form(&pair[1], out);
    }
    out.push('}');
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Form;

    fn sym(name: &str) -> Form {
        Form::symbol(name, None)
    }

    #[test]
    fn prints_quote_sugar() {
        let quoted = Form::list(vec![sym("quote"), sym("x")], None);
        assert_eq!(print_form(&quoted), "'x");
    }

    #[test]
    fn prints_vector_sugar() {
        let vector = Form::list(vec![sym(VECTOR), Form::int(1, None), Form::int(2, None)], None);
        assert_eq!(print_form(&vector), "[1 2]");
    }

    #[test]
    fn float_keeps_decimal_point() {
        let f = Form::literal(Literal::Float(3.0), None);
        assert_eq!(print_form(&f), "3.0");
    }

    #[test]
    fn map_with_keyword_keys() {
        let map = Form::list(
            vec![sym(HASH_MAP), sym(":a"), Form::int(1, None)],
            None,
        );
        assert_eq!(print_form(&map), "{:a 1}");
    }
}
