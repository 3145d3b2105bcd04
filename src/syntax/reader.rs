//! Reader: source text to S-expression forms with positions.
//!
//! The grammar lives in `grammar.pest`. The reader performs the shorthand
//! rewrites at read time: quote-family prefixes become `(quote ...)` style
//! lists, `[...]` becomes a `(vector ...)` list, `{...}` becomes a
//! `(hash-map ...)` list with normalized keys. Every produced form carries
//! 1-based line/column metadata for the file being read.
//!
//! A delimiter pre-scan runs before pest so unterminated lists, strings and
//! block comments report the position where the construct was opened rather
//! than wherever pest gave up.

use std::sync::Arc;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{Form, Literal, Meta, Sexp, HASH_MAP, VECTOR};
use crate::errors::{codes, HqlError, Result, SourceContext};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct HqlParser;

/// Parse a source buffer into its top-level forms.
pub fn read_program(source: &str, file_path: &str) -> Result<Vec<Form>> {
    let ctx = SourceContext::new(file_path, source);
    scan_delimiters(source, file_path, &ctx)?;

    let pairs = HqlParser::parse(Rule::program, source)
        .map_err(|e| convert_pest_error(e, source, file_path, &ctx))?;

    let file: Arc<str> = Arc::from(file_path);
    let program = pairs.peek().expect("program rule always present");
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_form(p, &file, &ctx))
        .collect()
}

fn build_form(pair: Pair<Rule>, file: &Arc<str>, ctx: &SourceContext) -> Result<Form> {
    let meta = meta_of(&pair, file);

    match pair.as_rule() {
        Rule::quoted => build_prefix("quote", pair, meta, file, ctx),
        Rule::quasiquoted => build_prefix("quasiquote", pair, meta, file, ctx),
        Rule::unquoted => build_prefix("unquote", pair, meta, file, ctx),
        Rule::unquote_splice => build_prefix("unquote-splicing", pair, meta, file, ctx),

        Rule::list => {
            let elements: Result<Vec<_>> =
                pair.into_inner().map(|p| build_form(p, file, ctx)).collect();
            Ok(Form::list(elements?, Some(meta)))
        }

        Rule::vector => {
            let mut elements = vec![Form::symbol(VECTOR, Some(meta.clone()))];
            for p in pair.into_inner() {
                elements.push(build_form(p, file, ctx)?);
            }
            Ok(Form::list(elements, Some(meta)))
        }

        Rule::map_lit => {
            let mut elements = vec![Form::symbol(HASH_MAP, Some(meta.clone()))];
            for entry in pair.into_inner() {
                let (key, value) = build_map_entry(entry, file, ctx)?;
                elements.push(key);
                elements.push(value);
            }
            Ok(Form::list(elements, Some(meta)))
        }

        Rule::string => {
            let text = pair.as_str();
            let content = unescape_string(text, &meta, ctx)?;
            Ok(Form::string(content, Some(meta)))
        }

        Rule::number => parse_number(pair.as_str(), meta, ctx),

        Rule::boolean => Ok(Form::literal(
            Literal::Bool(pair.as_str() == "true"),
            Some(meta),
        )),

        Rule::null => Ok(Form::literal(Literal::Null, Some(meta))),

        Rule::keyword | Rule::symbol => Ok(Form::symbol(pair.as_str(), Some(meta))),

        rule => Err(HqlError::parse(format!("Unexpected token: {:?}", rule))
            .with_code(codes::UNEXPECTED_TOKEN)
            .at(&meta)
            .with_source(ctx)),
    }
}

fn build_prefix(
    head: &str,
    pair: Pair<Rule>,
    meta: Meta,
    file: &Arc<str>,
    ctx: &SourceContext,
) -> Result<Form> {
    let inner = pair.into_inner().next().ok_or_else(|| {
        HqlError::parse("Unexpected end of input after reader prefix")
            .with_code(codes::UNEXPECTED_EOF)
            .at(&meta)
            .with_source(ctx)
    })?;
    let quoted = build_form(inner, file, ctx)?;
    Ok(Form::list(
        vec![Form::symbol(head, Some(meta.clone())), quoted],
        Some(meta),
    ))
}

// Map entries normalize to a (key value) pair. Bare JSON keys become
// keyword symbols so `{x: 1}` and `{:x 1}` produce the same tree; string
// keys stay string literals.
fn build_map_entry(
    entry: Pair<Rule>,
    file: &Arc<str>,
    ctx: &SourceContext,
) -> Result<(Form, Form)> {
    let inner = entry.into_inner().next().expect("map entry has a body");
    match inner.as_rule() {
        Rule::json_entry => {
            let mut parts = inner.into_inner();
            let key_pair = parts.next().expect("json entry has a key");
            let key_meta = meta_of(&key_pair, file);
            let key_inner = key_pair.into_inner().next().expect("json key has content");
            let key = match key_inner.as_rule() {
                Rule::string => {
                    let content = unescape_string(key_inner.as_str(), &key_meta, ctx)?;
                    Form::string(content, Some(key_meta))
                }
                _ => Form::symbol(format!(":{}", key_inner.as_str()), Some(key_meta)),
            };
            let value_pair = parts.next().expect("json entry has a value");
            Ok((key, build_form(value_pair, file, ctx)?))
        }
        Rule::kw_entry => {
            let mut parts = inner.into_inner();
            let key_pair = parts.next().expect("kw entry has a key");
            let key = Form::symbol(key_pair.as_str(), Some(meta_of(&key_pair, file)));
            let value_pair = parts.next().expect("kw entry has a value");
            Ok((key, build_form(value_pair, file, ctx)?))
        }
        rule => Err(HqlError::parse(format!("Unexpected token in map literal: {:?}", rule))
            .with_code(codes::UNEXPECTED_TOKEN)
            .with_source(ctx)),
    }
}

fn parse_number(text: &str, meta: Meta, ctx: &SourceContext) -> Result<Form> {
    let is_float = text.contains('.') || text.contains('e') || text.contains('E');
    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Form::literal(Literal::Int(n), Some(meta)));
        }
    }
    text.parse::<f64>()
        .map(|n| Form::literal(Literal::Float(n), Some(meta.clone())))
        .map_err(|_| {
            HqlError::parse(format!("Invalid number literal '{}'", text))
                .with_code(codes::UNEXPECTED_TOKEN)
                .at(&meta)
                .with_source(ctx)
        })
}

fn unescape_string(raw: &str, meta: &Meta, ctx: &SourceContext) -> Result<String> {
    let inner = &raw[1..raw.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('u') => {
                // Grammar guarantees the \u{...} shape; collect the hex run.
                let mut hex = String::new();
                for c in chars.by_ref() {
                    if c == '{' {
                        continue;
                    }
                    if c == '}' {
                        break;
                    }
                    hex.push(c);
                }
                let code = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                match code {
                    Some(c) => result.push(c),
                    None => {
                        return Err(HqlError::parse(format!(
                            "Invalid character escape \\u{{{}}}",
                            hex
                        ))
                        .with_code(codes::INVALID_CHARACTER)
                        .at(meta)
                        .with_source(ctx))
                    }
                }
            }
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    Ok(result)
}

fn meta_of(pair: &Pair<Rule>, file: &Arc<str>) -> Meta {
    let span = pair.as_span();
    let (line, column) = span.start_pos().line_col();
    let (end_line, end_column) = span.end_pos().line_col();
    Meta::new(
        Arc::clone(file),
        line as u32,
        column as u32,
        end_line as u32,
        end_column as u32,
    )
}

// ============================================================================
// DELIMITER PRE-SCAN
// ============================================================================

// Tracks open delimiters, strings and block comments in one pass so
// unterminated constructs are reported where they start.
fn scan_delimiters(source: &str, file_path: &str, ctx: &SourceContext) -> Result<()> {
    let file: Arc<str> = Arc::from(file_path);
    let mut stack: Vec<(char, u32, u32)> = Vec::new();
    let mut line = 1u32;
    let mut column = 1u32;
    let mut chars = source.chars().peekable();
    let mut in_string: Option<(u32, u32)> = None;
    let mut in_line_comment = false;
    let mut block_comment: Option<(u32, u32)> = None;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        let (cur_line, cur_col) = (line, column);
        if ch == '\n' {
            line += 1;
            column = 1;
            in_line_comment = false;
        } else {
            column += 1;
        }

        if in_line_comment {
            continue;
        }
        if block_comment.is_some() {
            if ch == '|' && chars.peek() == Some(&'#') {
                chars.next();
                column += 1;
                block_comment = None;
            }
            continue;
        }
        if in_string.is_some() {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = None;
            }
            continue;
        }

        match ch {
            '"' => in_string = Some((cur_line, cur_col)),
            ';' => in_line_comment = true,
            '#' if chars.peek() == Some(&'|') => {
                chars.next();
                column += 1;
                block_comment = Some((cur_line, cur_col));
            }
            '(' | '[' | '{' => stack.push((ch, cur_line, cur_col)),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, ..)) if open == expected => {}
                    _ => {
                        let meta = point_meta(&file, cur_line, cur_col);
                        return Err(HqlError::parse(format!("Unexpected token '{}'", ch))
                            .with_code(codes::UNEXPECTED_TOKEN)
                            .at(&meta)
                            .with_source(ctx));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some((l, c)) = in_string {
        let meta = point_meta(&file, l, c);
        return Err(HqlError::parse("Unclosed string literal")
            .with_code(codes::UNCLOSED_STRING)
            .at(&meta)
            .with_source(ctx));
    }
    if let Some((l, c)) = block_comment {
        let meta = point_meta(&file, l, c);
        return Err(HqlError::parse("Unclosed block comment")
            .with_code(codes::UNCLOSED_COMMENT)
            .at(&meta)
            .with_source(ctx));
    }
    if let Some((open, l, c)) = stack.pop() {
        let meta = point_meta(&file, l, c);
        return Err(HqlError::parse(format!("Unclosed list opened with '{}'", open))
            .with_code(codes::UNCLOSED_LIST)
            .at(&meta)
            .with_source(ctx));
    }
    Ok(())
}

fn point_meta(file: &Arc<str>, line: u32, column: u32) -> Meta {
    Meta::new(Arc::clone(file), line, column, line, column + 1)
}

fn convert_pest_error(
    error: pest::error::Error<Rule>,
    source: &str,
    file_path: &str,
    ctx: &SourceContext,
) -> HqlError {
    let file: Arc<str> = Arc::from(file_path);
    let (pos, _) = match error.location {
        pest::error::InputLocation::Pos(p) => (p, p),
        pest::error::InputLocation::Span((s, e)) => (s, e),
    };
    let (line, column) = match error.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l as u32, c as u32),
        pest::error::LineColLocation::Span((l, c), _) => (l as u32, c as u32),
    };
    let meta = point_meta(&file, line, column);

    if pos >= source.len() {
        return HqlError::parse("Unexpected end of input")
            .with_code(codes::UNEXPECTED_EOF)
            .at(&meta)
            .with_source(ctx);
    }
    let offending = source[pos..].chars().next().unwrap_or('\0');
    if offending.is_control() && offending != '\n' && offending != '\t' && offending != '\r' {
        return HqlError::parse(format!("Invalid character (U+{:04X})", offending as u32))
            .with_code(codes::INVALID_CHARACTER)
            .at(&meta)
            .with_source(ctx);
    }
    HqlError::parse(format!("Unexpected token '{}'", offending))
        .with_code(codes::UNEXPECTED_TOKEN)
        .at(&meta)
        .with_source(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    fn read_one(source: &str) -> Form {
        let forms = read_program(source, "test.hql").expect("read");
        assert_eq!(forms.len(), 1, "expected one form from {:?}", source);
        forms.into_iter().next().unwrap()
    }

    #[test]
    fn empty_input() {
        assert!(read_program("", "test.hql").unwrap().is_empty());
        assert!(read_program("  ; comment\n", "test.hql").unwrap().is_empty());
    }

    #[test]
    fn numbers_narrowest_parse() {
        assert_eq!(read_one("42").as_literal(), Some(&Literal::Int(42)));
        assert_eq!(read_one("-7").as_literal(), Some(&Literal::Int(-7)));
        assert_eq!(read_one("4.5").as_literal(), Some(&Literal::Float(4.5)));
        assert_eq!(read_one("1e3").as_literal(), Some(&Literal::Float(1000.0)));
    }

    #[test]
    fn quote_family_rewrites() {
        assert_eq!(read_one("'x").to_source(), "'x");
        let qq = read_one("`(a ~b ~@c)");
        assert_eq!(qq.head_symbol(), Some("quasiquote"));
        let inner = qq.as_list().unwrap()[1].as_list().unwrap();
        assert_eq!(inner[1].head_symbol(), Some("unquote"));
        assert_eq!(inner[2].head_symbol(), Some("unquote-splicing"));
    }

    #[test]
    fn vector_rewrite() {
        let v = read_one("[1 2 3]");
        assert_eq!(v.head_symbol(), Some(crate::ast::VECTOR));
        assert_eq!(v.as_list().unwrap().len(), 4);
    }

    #[test]
    fn map_styles_are_aliased() {
        let lisp_style = read_one("{:x 10 :y 20}");
        let json_style = read_one("{x: 10, y: 20}");
        assert!(lisp_style.structural_eq(&json_style));
        let string_key = read_one("{\"k\": 1}");
        let entries = string_key.as_list().unwrap();
        assert_eq!(entries[1].as_literal(), Some(&Literal::Str("k".into())));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            read_one(r#""a\nb\t\u{48}""#).as_literal(),
            Some(&Literal::Str("a\nb\tH".into()))
        );
    }

    #[test]
    fn positions_are_one_based() {
        let forms = read_program("(+ 1 2)\n(- 3)", "pos.hql").unwrap();
        let first = forms[0].meta.as_ref().unwrap();
        assert_eq!((first.line, first.column), (1, 1));
        let minus = forms[1].as_list().unwrap()[0].meta.as_ref().unwrap();
        assert_eq!((minus.line, minus.column), (2, 2));
        let plus = forms[0].as_list().unwrap()[0].meta.as_ref().unwrap();
        assert_eq!((plus.line, plus.column), (1, 2));
    }

    #[test]
    fn unclosed_list_reports_open_position() {
        let err = read_program("(a b", "t.hql").unwrap_err();
        assert_eq!(err.code, codes::UNCLOSED_LIST);
        assert_eq!(err.location.as_ref().unwrap().column, 1);
    }

    #[test]
    fn unclosed_string_and_comment() {
        let err = read_program("\"abc", "t.hql").unwrap_err();
        assert_eq!(err.code, codes::UNCLOSED_STRING);
        let err = read_program("#| hmm", "t.hql").unwrap_err();
        assert_eq!(err.code, codes::UNCLOSED_COMMENT);
    }

    #[test]
    fn stray_close_paren() {
        let err = read_program("(a))", "t.hql").unwrap_err();
        assert_eq!(err.code, codes::UNEXPECTED_TOKEN);
    }

    #[test]
    fn dotted_and_method_symbols() {
        assert_eq!(read_one("a.b.c").as_symbol(), Some("a.b.c"));
        let call = read_one("(.log console)");
        assert_eq!(call.head_symbol(), Some(".log"));
    }

    #[test]
    fn round_trip_through_printer() {
        let source = "(fn greet [name] (print \"hi\" name)) {:a 1} [1 2.0 true nil]";
        let forms = read_program(source, "rt.hql").unwrap();
        let printed = crate::ast::printer::print_program(&forms);
        let reread = read_program(&printed, "rt.hql").unwrap();
        assert_eq!(forms.len(), reread.len());
        for (a, b) in forms.iter().zip(&reread) {
            assert!(a.structural_eq(b), "{} != {}", a, b);
        }
    }
}
