//! ESTree to module text, with source map recording.
//!
//! A precedence-aware printer. Every token emitted through [`Codegen::token`]
//! records a mapping from its generated position to the node's original
//! location; identifiers also record their name so tools can rename-trace.
//! The output favors readability: two-space indent, one statement per line,
//! spaces around binary operators.

use super::estree::{ImportSpecifier, Loc, Node};
use super::lower::format_number;
use super::sourcemap::{SourceMap, SourceMapBuilder};

#[derive(Debug)]
pub struct GeneratedModule {
    pub code: String,
    pub map: Option<SourceMap>,
}

#[derive(Debug, Default)]
pub struct GenOptions {
    /// Output file name recorded in the map.
    pub file: String,
    pub source_map: bool,
    /// Original source embedded as `sourcesContent`.
    pub source_content: Option<(String, String)>,
}

pub fn generate(program: &Node, opts: &GenOptions) -> GeneratedModule {
    let mut map = opts.source_map.then(|| {
        let mut builder = SourceMapBuilder::new(opts.file.clone());
        if let Some((source, content)) = &opts.source_content {
            builder.set_source_content(source, content);
        }
        builder
    });
    let mut gen = Codegen {
        out: String::new(),
        line: 0,
        col: 0,
        indent: 0,
        map: map.take(),
    };
    if let Node::Program { body, .. } = program {
        for stmt in body {
            gen.emit_stmt(stmt);
            gen.newline();
        }
    }
    GeneratedModule {
        code: gen.out,
        map: gen.map.map(SourceMapBuilder::build),
    }
}

// Operator precedence, loosely after the target language's table.
fn prec(node: &Node) -> u8 {
    match node {
        Node::ArrowFunctionExpression { .. } | Node::FunctionExpression { .. } => 2,
        Node::AssignmentExpression { .. } => 2,
        Node::ConditionalExpression { .. } => 3,
        Node::LogicalExpression { operator, .. } => match operator.as_str() {
            "??" => 4,
            "||" => 5,
            _ => 6,
        },
        Node::BinaryExpression { operator, .. } => match operator.as_str() {
            "===" | "!==" | "==" | "!=" => 9,
            "<" | ">" | "<=" | ">=" | "instanceof" | "in" => 10,
            "+" | "-" => 11,
            _ => 12,
        },
        Node::UnaryExpression { .. } => 14,
        Node::CallExpression { .. } | Node::NewExpression { .. } | Node::MemberExpression { .. } => {
            17
        }
        _ => 20,
    }
}

struct Codegen {
    out: String,
    line: u32,
    col: u32,
    indent: usize,
    map: Option<SourceMapBuilder>,
}

impl Codegen {
    fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
        self.out.push_str(text);
    }

    /// Emits a token and records its mapping.
    fn token(&mut self, text: &str, loc: &Loc, name: Option<&str>) {
        if let Some(map) = &mut self.map {
            map.add_mapping(
                self.line,
                self.col,
                &loc.source,
                loc.start.line.saturating_sub(1),
                loc.start.column,
                name,
            );
        }
        self.push(text);
    }

    fn newline(&mut self) {
        self.push("\n");
        for _ in 0..self.indent {
            self.push("  ");
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn emit_stmt(&mut self, node: &Node) {
        match node {
            Node::VariableDeclaration {
                kind,
                declarations,
                loc,
            } => {
                self.token(kind, loc, None);
                self.push(" ");
                for (i, decl) in declarations.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.emit_stmt(decl);
                }
                self.push(";");
            }
            Node::VariableDeclarator { id, init, .. } => {
                self.emit_expr(id, 2);
                if let Some(init) = init {
                    self.push(" = ");
                    self.emit_expr(init, 2);
                }
            }
            Node::FunctionDeclaration {
                id,
                params,
                body,
                loc,
            } => {
                self.token("function", loc, None);
                self.push(" ");
                self.token(id, loc, Some(id));
                self.emit_params(params);
                self.push(" ");
                self.emit_stmt(body);
            }
            Node::ClassDeclaration { id, body, loc } => {
                self.token("class", loc, None);
                self.push(" ");
                self.token(id, loc, Some(id));
                self.push(" {");
                self.indent += 1;
                for member in body {
                    self.newline();
                    self.emit_stmt(member);
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
            Node::PropertyDefinition {
                key,
                is_private,
                value,
                loc,
            } => {
                if *is_private && !key.starts_with('#') {
                    self.push("#");
                }
                self.token(key, loc, Some(key));
                if let Some(value) = value {
                    self.push(" = ");
                    self.emit_expr(value, 2);
                }
                self.push(";");
            }
            Node::MethodDefinition {
                key,
                is_constructor,
                is_static,
                params,
                body,
                loc,
            } => {
                if *is_static {
                    self.push("static ");
                }
                let printed = if *is_constructor { "constructor" } else { key };
                self.token(printed, loc, Some(printed));
                self.emit_params(params);
                self.push(" ");
                self.emit_stmt(body);
            }
            Node::IfStatement {
                test,
                consequent,
                alternate,
                loc,
            } => {
                self.token("if", loc, None);
                self.push(" (");
                self.emit_expr(test, 1);
                self.push(") ");
                self.emit_stmt(consequent);
                if let Some(alternate) = alternate {
                    self.push(" else ");
                    self.emit_stmt(alternate);
                }
            }
            Node::WhileStatement { test, body, loc } => {
                self.token("while", loc, None);
                self.push(" (");
                self.emit_expr(test, 1);
                self.push(") ");
                self.emit_stmt(body);
            }
            Node::ForOfStatement {
                binding,
                right,
                body,
                loc,
            } => {
                self.token("for", loc, None);
                self.push(" (const ");
                self.push(binding);
                self.push(" of ");
                self.emit_expr(right, 2);
                self.push(") ");
                self.emit_stmt(body);
            }
            Node::ThrowStatement { argument, loc } => {
                self.token("throw", loc, None);
                self.push(" ");
                self.emit_expr(argument, 2);
                self.push(";");
            }
            Node::TryStatement {
                block,
                param,
                handler,
                finalizer,
                loc,
            } => {
                self.token("try", loc, None);
                self.push(" ");
                self.emit_stmt(block);
                if let Some(handler) = handler {
                    self.push(" catch ");
                    if let Some(param) = param {
                        self.push("(");
                        self.push(param);
                        self.push(") ");
                    }
                    self.emit_stmt(handler);
                }
                if let Some(finalizer) = finalizer {
                    self.push(" finally ");
                    self.emit_stmt(finalizer);
                }
            }
            Node::ReturnStatement { argument, loc } => {
                self.token("return", loc, None);
                if let Some(argument) = argument {
                    self.push(" ");
                    self.emit_expr(argument, 2);
                }
                self.push(";");
            }
            Node::ExpressionStatement { expression, .. } => {
                // Leading `function`, `class` and `{` would re-parse as
                // declarations or blocks.
                let needs_parens = matches!(
                    &**expression,
                    Node::FunctionExpression { .. } | Node::ObjectExpression { .. }
                );
                if needs_parens {
                    self.push("(");
                    self.emit_expr(expression, 1);
                    self.push(")");
                } else {
                    self.emit_expr(expression, 1);
                }
                self.push(";");
            }
            Node::BlockStatement { body, .. } => {
                if body.is_empty() {
                    self.push("{}");
                    return;
                }
                self.push("{");
                self.indent += 1;
                for stmt in body {
                    self.newline();
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
            Node::ImportDeclaration {
                specifiers,
                source,
                loc,
            } => self.emit_import(specifiers, source, loc),
            Node::ExportNamedDeclaration {
                specifiers,
                declaration,
                loc,
            } => {
                self.token("export", loc, None);
                match declaration {
                    Some(declaration) => {
                        self.push(" ");
                        self.emit_stmt(declaration);
                    }
                    None => {
                        self.push(" { ");
                        for (i, (local, exported)) in specifiers.iter().enumerate() {
                            if i > 0 {
                                self.push(", ");
                            }
                            self.push(local);
                            if local != exported {
                                self.push(" as ");
                                self.push(exported);
                            }
                        }
                        self.push(" };");
                    }
                }
            }
            other => self.emit_expr(other, 1),
        }
    }

    fn emit_import(&mut self, specifiers: &[ImportSpecifier], source: &str, loc: &Loc) {
        self.token("import", loc, None);
        self.push(" ");
        let mut named: Vec<&ImportSpecifier> = Vec::new();
        let mut first = true;
        for spec in specifiers {
            match spec {
                ImportSpecifier::Default { local } => {
                    if !first {
                        self.push(", ");
                    }
                    self.push(local);
                    first = false;
                }
                ImportSpecifier::Namespace { local } => {
                    if !first {
                        self.push(", ");
                    }
                    self.push("* as ");
                    self.push(local);
                    first = false;
                }
                ImportSpecifier::Named { .. } => named.push(spec),
            }
        }
        if !named.is_empty() {
            if !first {
                self.push(", ");
            }
            self.push("{ ");
            for (i, spec) in named.iter().enumerate() {
                if let ImportSpecifier::Named { imported, local } = spec {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(imported);
                    if imported != local {
                        self.push(" as ");
                        self.push(local);
                    }
                }
            }
            self.push(" }");
        }
        self.push(" from ");
        self.push(&quote_string(source));
        self.push(";");
    }

    fn emit_params(&mut self, params: &[Node]) {
        self.push("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.emit_expr(param, 2);
        }
        self.push(")");
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn emit_expr(&mut self, node: &Node, min_prec: u8) {
        let my_prec = prec(node);
        let parens = my_prec < min_prec;
        if parens {
            self.push("(");
        }
        self.emit_expr_inner(node, my_prec);
        if parens {
            self.push(")");
        }
    }

    fn emit_expr_inner(&mut self, node: &Node, my_prec: u8) {
        match node {
            Node::Identifier { name, loc } => self.token(name, loc, Some(name)),
            Node::StringLiteral { value, loc } => {
                let quoted = quote_string(value);
                self.token(&quoted, loc, None);
            }
            Node::NumberLiteral { value, int, loc } => {
                let text = format_number(*value, *int);
                self.token(&text, loc, None);
            }
            Node::BooleanLiteral { value, loc } => {
                self.token(if *value { "true" } else { "false" }, loc, None);
            }
            Node::NullLiteral { loc } => self.token("null", loc, None),
            Node::TemplateLiteral {
                quasis,
                expressions,
                loc,
            } => {
                self.token("`", loc, None);
                for (i, quasi) in quasis.iter().enumerate() {
                    self.push(&escape_template(quasi));
                    if let Some(expr) = expressions.get(i) {
                        self.push("${");
                        self.emit_expr(expr, 1);
                        self.push("}");
                    }
                }
                self.push("`");
            }
            Node::UnaryExpression {
                operator,
                argument,
                loc,
            } => {
                self.token(operator, loc, None);
                if operator.chars().all(|c| c.is_ascii_alphabetic()) {
                    self.push(" ");
                }
                self.emit_expr(argument, 15);
            }
            Node::BinaryExpression {
                operator,
                left,
                right,
                loc,
            } => {
                self.emit_expr(left, my_prec);
                self.push(" ");
                self.token(operator, loc, None);
                self.push(" ");
                self.emit_expr(right, my_prec + 1);
            }
            Node::LogicalExpression {
                operator,
                left,
                right,
                loc,
            } => {
                // Mixing ?? with && or || requires explicit grouping.
                let operand_floor = if operator == "??" { 7 } else { my_prec };
                self.emit_expr(left, operand_floor);
                self.push(" ");
                self.token(operator, loc, None);
                self.push(" ");
                self.emit_expr(right, operand_floor.max(my_prec + 1));
            }
            Node::ConditionalExpression {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.emit_expr(test, 4);
                self.push(" ? ");
                self.emit_expr(consequent, 3);
                self.push(" : ");
                self.emit_expr(alternate, 3);
            }
            Node::AssignmentExpression { left, right, loc } => {
                self.emit_expr(left, 17);
                self.push(" ");
                self.token("=", loc, None);
                self.push(" ");
                self.emit_expr(right, 2);
            }
            Node::CallExpression {
                callee, arguments, ..
            } => {
                self.emit_expr(callee, 17);
                self.push("(");
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.emit_expr(arg, 2);
                }
                self.push(")");
            }
            Node::NewExpression {
                callee,
                arguments,
                loc,
            } => {
                self.token("new", loc, None);
                self.push(" ");
                self.emit_expr(callee, 18);
                self.push("(");
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.emit_expr(arg, 2);
                }
                self.push(")");
            }
            Node::MemberExpression {
                object,
                property,
                computed,
                ..
            } => {
                // A bare number before `.` re-parses as a decimal point.
                if matches!(&**object, Node::NumberLiteral { .. }) {
                    self.push("(");
                    self.emit_expr(object, 1);
                    self.push(")");
                } else {
                    self.emit_expr(object, 17);
                }
                if *computed {
                    self.push("[");
                    self.emit_expr(property, 1);
                    self.push("]");
                } else {
                    self.push(".");
                    self.emit_expr(property, 20);
                }
            }
            Node::SpreadElement { argument, .. } => {
                self.push("...");
                self.emit_expr(argument, 2);
            }
            Node::ArrayExpression { elements, .. } | Node::ArrayPattern { elements, .. } => {
                self.push("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.emit_expr(element, 2);
                }
                self.push("]");
            }
            Node::ObjectExpression { properties, .. } | Node::ObjectPattern { properties, .. } => {
                if properties.is_empty() {
                    self.push("{}");
                    return;
                }
                self.push("{ ");
                for (i, prop) in properties.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.emit_expr(prop, 2);
                }
                self.push(" }");
            }
            Node::Property {
                key,
                value,
                computed,
                shorthand,
                ..
            } => {
                if *computed {
                    self.push("[");
                    self.emit_expr(key, 1);
                    self.push("]");
                } else {
                    self.emit_expr(key, 20);
                }
                if !*shorthand {
                    self.push(": ");
                    self.emit_expr(value, 2);
                }
            }
            Node::ArrowFunctionExpression {
                params,
                body,
                expression,
                ..
            } => {
                self.emit_params(params);
                self.push(" => ");
                if *expression {
                    // Object literal bodies would parse as blocks.
                    if matches!(&**body, Node::ObjectExpression { .. }) {
                        self.push("(");
                        self.emit_expr(body, 1);
                        self.push(")");
                    } else {
                        self.emit_expr(body, 3);
                    }
                } else {
                    self.emit_stmt(body);
                }
            }
            Node::FunctionExpression {
                id,
                params,
                body,
                loc,
            } => {
                self.token("function", loc, None);
                if let Some(id) = id {
                    self.push(" ");
                    self.push(id);
                }
                self.emit_params(params);
                self.push(" ");
                self.emit_stmt(body);
            }
            Node::RestElement { argument, .. } => {
                self.push("...");
                self.emit_expr(argument, 2);
            }
            Node::AssignmentPattern { left, right, .. } => {
                self.emit_expr(left, 17);
                self.push(" = ");
                self.emit_expr(right, 2);
            }
            other => self.emit_stmt(other),
        }
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_template(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::lower::lower_program;
    use crate::ir::builder::build_program;
    use crate::syntax::reader::read_program;
    use crate::syntax::transform_program;
    use std::collections::HashSet;

    fn gen(source: &str) -> String {
        let forms = read_program(source, "g.hql").unwrap();
        let forms = transform_program(forms).unwrap();
        let program = build_program(&forms, "g.hql", &HashSet::new(), &|_: &str| false).unwrap();
        let (node, _) = lower_program(&program).unwrap();
        generate(&node, &GenOptions::default()).code
    }

    #[test]
    fn arithmetic_folds_left() {
        assert_eq!(gen("(+ 1 2 3)").trim(), "1 + 2 + 3;");
    }

    #[test]
    fn precedence_parenthesizes() {
        assert_eq!(gen("(* (+ 1 2) 3)").trim(), "(1 + 2) * 3;");
        assert_eq!(gen("(+ 1 (* 2 3))").trim(), "1 + 2 * 3;");
    }

    #[test]
    fn const_and_let() {
        assert_eq!(gen("(let x 1)").trim(), "const x = 1;");
        assert_eq!(gen("(var y 2)").trim(), "let y = 2;");
    }

    #[test]
    fn function_declaration() {
        let code = gen("(fn add [a b] (+ a b))");
        assert!(code.contains("function add(a, b) {"));
        assert!(code.contains("return a + b;"));
    }

    #[test]
    fn arrow_lambda() {
        let code = gen("(let f (=> (+ $0 1)))");
        assert_eq!(code.trim(), "const f = ($0) => $0 + 1;");
    }

    #[test]
    fn method_call_and_member() {
        assert_eq!(gen("(.push items 4)").trim(), "items.push(4);");
        assert_eq!(gen("(user .name)").trim(), "user.name;");
        assert_eq!(gen("console.log").trim(), "console.log;");
    }

    #[test]
    fn negative_literal_is_unary() {
        assert_eq!(gen("(let n -5)").trim(), "const n = -5;");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(gen(r#"(let s "a\"b")"#).trim(), r#"const s = "a\"b";"#);
    }

    #[test]
    fn import_and_export() {
        let code = gen("(import [a, b as c] from \"./m.hql\")");
        assert_eq!(code.trim(), "import { a, b as c } from \"./m.js\";");
        let code = gen("(export \"answer\" 42)");
        assert_eq!(code.trim(), "export const answer = 42;");
    }

    #[test]
    fn if_statement_and_expression() {
        let code = gen("(if ok (do (effect)) (do (other)))");
        assert!(code.starts_with("if (ok) {"));
        assert!(code.contains("} else {"));

        let code = gen("(let r (if ok 1 2))");
        assert_eq!(code.trim(), "const r = ok ? 1 : 2;");
    }

    #[test]
    fn json_map_params_emit_object_default() {
        let code = gen("(fn multiply {x: 10 y: 20} (* x y))");
        assert!(code.contains("function multiply(__hql_params = {}) {"));
        assert!(code.contains("const x = __hql_params.x ?? 10;"));
        assert!(code.contains("const y = __hql_params.y ?? 20;"));
        assert!(code.contains("return x * y;"));
    }

    #[test]
    fn interop_iife_resolves_and_invokes() {
        let code = gen("(.toUpperCase name)");
        assert!(code.contains("typeof __hql_member === \"function\""));
        assert!(code.contains("__hql_member.call(__hql_obj)"));
    }

    #[test]
    fn template_literal() {
        let code = gen("(let s (template-literal \"a\" x \"b\"))");
        assert_eq!(code.trim(), "const s = `a${x}b`;");
    }

    #[test]
    fn source_map_records_operator_position() {
        let source = "(print-it (+ 1 2 3))";
        let forms = read_program(source, "map.hql").unwrap();
        let forms = transform_program(forms).unwrap();
        let program = build_program(&forms, "map.hql", &HashSet::new(), &|_: &str| false).unwrap();
        let (node, _) = lower_program(&program).unwrap();
        let out = generate(
            &node,
            &GenOptions {
                file: "map.js".to_string(),
                source_map: true,
                source_content: Some(("map.hql".to_string(), source.to_string())),
            },
        );
        let map = out.map.unwrap();
        let parsed = crate::emit::sourcemap::parse_source_map(&map.to_json()).unwrap();

        // Find the generated `+` and map it back to source column 11
        // (0-based) where the `+` sits.
        let code_line = out.code.lines().next().unwrap();
        let plus_col = code_line.find('+').unwrap() as u32;
        let mapped = crate::emit::sourcemap::map_position(&parsed, 1, plus_col).unwrap();
        assert_eq!(mapped.source, "map.hql");
        assert_eq!(mapped.line, 1);
        assert_eq!(mapped.column, 11);
    }

    #[test]
    fn class_with_private_field() {
        let code = gen(
            "(class Counter (field count 0) (field #secret 7) \
             (fn bump [self] (= self.count (+ self.count 1))))",
        );
        assert!(code.contains("class Counter {"));
        assert!(code.contains("#secret = 7;"));
        assert!(code.contains("this.count = 0;"));
        assert!(code.contains("const self = this;"));
    }

    #[test]
    fn enums() {
        let code = gen("(enum Color (case red) (case green \"g\"))");
        assert!(code.contains("const Color = __hql_deepFreeze({ red: \"red\", green: \"g\" });"));

        let code = gen("(enum Shape (case circle [radius]))");
        assert!(code.contains("class Shape {"));
        assert!(code.contains("static circle(radius) {"));
        assert!(code.contains("return new Shape(\"circle\", { radius });"));
    }

    #[test]
    fn for_loop_normalizes_sequence() {
        let code = gen("(for [x (range 3)] (use-it x))");
        assert!(code.contains("for (const x of __hql_toSequence(__hql_range(3))) {"));
    }
}
