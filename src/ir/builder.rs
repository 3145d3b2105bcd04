//! Lowers canonical forms into the IR.
//!
//! The builder is position-faithful: every IR node carries the metadata of
//! the form it came from, falling back to a synthetic file-start position
//! for nodes macros produced without one. Identifier names are sanitized
//! into the target language's identifier space (`my-var` becomes `my_var`,
//! `empty?` becomes `empty_p`), consistently across definitions and uses.

use std::collections::HashSet;

use crate::ast::{Form, Literal, Meta, Sexp, HASH_MAP, VECTOR};
use crate::errors::{codes, HqlError, Result};
use crate::syntax::parse_param_vector;

use super::{
    ArrayElem, ClassCtor, ClassField, ClassMethod, DeclKind, EnumCase, Expr, FnParam, ImportSpec,
    ObjectProp, Pattern, Program, PropKey, Stmt,
};

/// Heads that always lower as statements, even in tail position.
const STATEMENT_HEADS: &[&str] = &[
    "let", "var", "const", "fn", "macro", "class", "enum", "import", "export", "while", "for",
    "try",
];

pub struct IrBuilder<'a> {
    file: String,
    /// Export names that are macros; they exist only at compile time and
    /// are dropped from emitted export lists.
    macro_exports: &'a HashSet<String>,
    /// Tells whether an imported name resolved to a macro, which likewise
    /// has no runtime import.
    is_macro_import: &'a dyn Fn(&str) -> bool,
}

/// Lowers a macro-expanded program.
pub fn build_program(
    forms: &[Form],
    file: &str,
    macro_exports: &HashSet<String>,
    is_macro_import: &dyn Fn(&str) -> bool,
) -> Result<Program> {
    let builder = IrBuilder {
        file: file.to_string(),
        macro_exports,
        is_macro_import,
    };
    let mut body = Vec::with_capacity(forms.len());
    for form in forms {
        if let Some(stmt) = builder.lower_stmt(form)? {
            body.push(stmt);
        }
    }
    Ok(Program {
        body,
        position: Meta::synthetic(file),
    })
}

/// Maps a source identifier into the target identifier space.
pub fn sanitize_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '-' => out.push('_'),
            '?' => out.push_str("_p"),
            '!' => out.push_str("_x"),
            '*' => out.push_str("_star"),
            '+' => out.push_str("_plus"),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '#' => out.push(c),
            _ => out.push('_'),
        }
    }
    out
}

impl<'a> IrBuilder<'a> {
    fn pos(&self, form: &Form) -> Meta {
        form.meta
            .clone()
            .unwrap_or_else(|| Meta::synthetic(&self.file))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Lowers a top-level or block-level form. Returns `None` for forms
    /// with no runtime counterpart (macro-only export lists).
    fn lower_stmt(&self, form: &Form) -> Result<Option<Stmt>> {
        let position = self.pos(form);
        let items = match form.as_list() {
            Some(items) if !items.is_empty() => items,
            _ => {
                return Ok(Some(Stmt::ExprStmt {
                    expr: self.lower_expr(form)?,
                    position,
                }))
            }
        };

        match form.head_symbol() {
            Some("let") => self.lower_decl(DeclKind::Const, form, items).map(Some),
            Some("var") => self.lower_decl(DeclKind::Let, form, items).map(Some),
            Some("const") => self.lower_decl(DeclKind::Const, form, items).map(Some),
            Some("fn")
                if items.len() >= 3
                    && items[1].as_symbol().is_some_and(|n| n != "__anon") =>
            {
                self.lower_fn_decl(form, items).map(Some)
            }
            Some("class") => self.lower_class(form, items).map(Some),
            Some("enum") => self.lower_enum(form, items).map(Some),
            Some("if") => self.lower_if_stmt(form, items).map(Some),
            Some("when") | Some("unless") => self.lower_when_stmt(form, items).map(Some),
            Some("while") => {
                let test = self.lower_expr(self.arg(form, items, 1)?)?;
                let body = self.lower_block(&items[2..])?;
                Ok(Some(Stmt::While {
                    test,
                    body,
                    position,
                }))
            }
            Some("for") => self.lower_for_stmt(form, items).map(Some),
            Some("throw") => Ok(Some(Stmt::Throw {
                argument: self.lower_expr(self.arg(form, items, 1)?)?,
                position,
            })),
            Some("try") => self.lower_try(form, items).map(Some),
            Some("return") => Ok(Some(Stmt::Return {
                argument: items.get(1).map(|a| self.lower_expr(a)).transpose()?,
                position,
            })),
            Some("do") => Ok(Some(Stmt::Block {
                body: self.lower_block(&items[1..])?,
                position,
            })),
            Some("import") => self.lower_import(form, items),
            Some("export") => self.lower_export(form, items),
            _ => Ok(Some(Stmt::ExprStmt {
                expr: self.lower_expr(form)?,
                position,
            })),
        }
    }

    fn arg<'f>(&self, form: &Form, items: &'f [Form], index: usize) -> Result<&'f Form> {
        items.get(index).ok_or_else(|| {
            HqlError::transform(format!(
                "Malformed {} form",
                form.head_symbol().unwrap_or("expression")
            ))
            .at_opt(form.meta.as_ref())
        })
    }

    /// Block of statements (no implicit return).
    fn lower_block(&self, forms: &[Form]) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(forms.len());
        for form in forms {
            if let Some(stmt) = self.lower_stmt(form)? {
                out.push(stmt);
            }
        }
        Ok(out)
    }

    /// Function body: every form but the last is a statement; the last
    /// becomes a return unless it only makes sense as a statement.
    fn lower_fn_body(&self, forms: &[Form]) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(forms.len());
        for (i, form) in forms.iter().enumerate() {
            let is_last = i + 1 == forms.len();
            if !is_last {
                if let Some(stmt) = self.lower_stmt(form)? {
                    out.push(stmt);
                }
                continue;
            }
            let head = form.head_symbol();
            if head == Some("throw") {
                out.push(Stmt::Throw {
                    argument: self.lower_expr(self.arg(form, form.as_list().unwrap(), 1)?)?,
                    position: self.pos(form),
                });
            } else if head.map(|h| STATEMENT_HEADS.contains(&h)) == Some(true) {
                if let Some(stmt) = self.lower_stmt(form)? {
                    out.push(stmt);
                }
            } else {
                out.push(Stmt::Return {
                    argument: Some(self.lower_expr(form)?),
                    position: self.pos(form),
                });
            }
        }
        Ok(out)
    }

    // Declaration shapes:
    //   (let name init?)            plain declaration
    //   (let [pat expr ...] body)   binding block (statement position)
    // Patterns appear in the name slot of a binding pair.
    fn lower_decl(&self, kind: DeclKind, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let first = self.arg(form, items, 1)?;

        if let Some(name) = first.as_symbol() {
            let init = items.get(2).map(|f| self.lower_expr(f)).transpose()?;
            return Ok(Stmt::VarDecl {
                kind,
                pattern: Pattern::Ident {
                    name: sanitize_ident(name),
                    position: self.pos(first),
                },
                init,
                position,
            });
        }

        // Binding block.
        if first.head_symbol() == Some(VECTOR) {
            let pairs = &first.as_list().unwrap()[1..];
            if pairs.len() % 2 != 0 {
                return Err(HqlError::transform(
                    "Binding vector needs an even number of elements",
                )
                .at_opt(first.meta.as_ref()));
            }
            let mut body = Vec::new();
            for pair in pairs.chunks(2) {
                body.push(Stmt::VarDecl {
                    kind,
                    pattern: self.lower_pattern(&pair[0])?,
                    init: Some(self.lower_expr(&pair[1])?),
                    position: self.pos(&pair[0]),
                });
            }
            body.extend(self.lower_block(&items[2..])?);
            return Ok(Stmt::Block { body, position });
        }

        // (let (name value) body...) single-binding block.
        if let Some(binding) = first.as_list() {
            if binding.len() == 2 {
                let mut body = vec![Stmt::VarDecl {
                    kind,
                    pattern: self.lower_pattern(&binding[0])?,
                    init: Some(self.lower_expr(&binding[1])?),
                    position: self.pos(&binding[0]),
                }];
                body.extend(self.lower_block(&items[2..])?);
                return Ok(Stmt::Block { body, position });
            }
        }

        Err(HqlError::transform("Malformed declaration form").at_opt(form.meta.as_ref()))
    }

    fn lower_pattern(&self, form: &Form) -> Result<Pattern> {
        let position = self.pos(form);
        if let Some(name) = form.as_symbol() {
            return Ok(Pattern::Ident {
                name: sanitize_ident(name),
                position,
            });
        }
        match form.head_symbol() {
            Some(h) if h == VECTOR => {
                let items = &form.as_list().unwrap()[1..];
                let mut elements = Vec::new();
                let mut i = 0;
                while i < items.len() {
                    if items[i].is_symbol("&") {
                        let inner = self.lower_pattern(self.arg(form, items, i + 1)?)?;
                        elements.push(Pattern::Rest {
                            position: inner.position().clone(),
                            inner: Box::new(inner),
                        });
                        i += 2;
                        continue;
                    }
                    elements.push(self.lower_pattern(&items[i])?);
                    i += 1;
                }
                Ok(Pattern::Array { elements, position })
            }
            Some(h) if h == HASH_MAP => {
                let entries = &form.as_list().unwrap()[1..];
                let mut props = Vec::new();
                for pair in entries.chunks(2) {
                    if pair.len() != 2 {
                        return Err(HqlError::transform("Malformed map pattern")
                            .at_opt(form.meta.as_ref()));
                    }
                    let key = self.map_key_name(&pair[0])?;
                    props.push((key, self.lower_pattern(&pair[1])?));
                }
                Ok(Pattern::Object { props, position })
            }
            _ => Err(HqlError::transform("Unsupported destructuring pattern")
                .at_opt(form.meta.as_ref())),
        }
    }

    fn map_key_name(&self, key: &Form) -> Result<String> {
        if let Some(kw) = key.as_keyword() {
            return Ok(sanitize_ident(kw));
        }
        if let Some(Literal::Str(s)) = key.as_literal() {
            return Ok(s.clone());
        }
        Err(HqlError::transform("Map pattern keys must be keywords or strings")
            .at_opt(key.meta.as_ref()))
    }

    fn lower_fn_decl(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let name = sanitize_ident(items[1].as_symbol().unwrap());
        let params_form = self.arg(form, items, 2)?;

        // JSON-map parameter list: one object parameter with `??` defaults.
        if params_form.head_symbol() == Some(HASH_MAP) {
            let entries = &params_form.as_list().unwrap()[1..];
            let mut json_defaults = Vec::new();
            for pair in entries.chunks(2) {
                if pair.len() != 2 {
                    return Err(HqlError::transform("Malformed parameter map")
                        .at_opt(params_form.meta.as_ref()));
                }
                let key = self.map_key_name(&pair[0])?;
                json_defaults.push((key, self.lower_expr(&pair[1])?));
            }
            return Ok(Stmt::FnDecl {
                name,
                params: Vec::new(),
                body: self.lower_fn_body(&items[3..])?,
                uses_json_map_params: true,
                json_defaults,
                is_async: false,
                position,
            });
        }

        let params = self.lower_params(params_form)?;
        Ok(Stmt::FnDecl {
            name,
            params,
            body: self.lower_fn_body(&items[3..])?,
            uses_json_map_params: false,
            json_defaults: Vec::new(),
            is_async: false,
            position,
        })
    }

    fn lower_params(&self, params_form: &Form) -> Result<Vec<FnParam>> {
        let spec = parse_param_vector(params_form)?;
        let mut params = Vec::with_capacity(spec.params.len() + 1);
        for param in &spec.params {
            params.push(FnParam {
                pattern: self.lower_pattern(&param.pattern)?,
                default: param.default.as_ref().map(|d| self.lower_expr(d)).transpose()?,
            });
        }
        if let Some(rest) = &spec.rest {
            let position = self.pos(params_form);
            params.push(FnParam {
                pattern: Pattern::Rest {
                    inner: Box::new(Pattern::Ident {
                        name: sanitize_ident(rest),
                        position: position.clone(),
                    }),
                    position,
                },
                default: None,
            });
        }
        Ok(params)
    }

    fn lower_class(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let name = self
            .arg(form, items, 1)?
            .as_symbol()
            .map(sanitize_ident)
            .ok_or_else(|| {
                HqlError::transform("Class name must be a symbol").at_opt(form.meta.as_ref())
            })?;

        let mut fields = Vec::new();
        let mut ctor = None;
        let mut methods = Vec::new();

        for member in &items[2..] {
            let member_items = member.as_list().unwrap_or_default();
            match member.head_symbol() {
                Some("field") | Some("var") | Some("let") => {
                    let field_name = self
                        .arg(member, member_items, 1)?
                        .as_symbol()
                        .ok_or_else(|| {
                            HqlError::transform("Field name must be a symbol")
                                .at_opt(member.meta.as_ref())
                        })?;
                    let is_private = field_name.starts_with('#');
                    fields.push(ClassField {
                        name: sanitize_ident(field_name.trim_start_matches('#')),
                        is_private,
                        value: member_items
                            .get(2)
                            .map(|v| self.lower_expr(v))
                            .transpose()?,
                        position: self.pos(member),
                    });
                }
                Some("constructor") | Some("init") => {
                    let params = self.method_params(self.arg(member, member_items, 1)?)?;
                    let body = self.method_body(
                        self.arg(member, member_items, 1)?,
                        &member_items[2..],
                        false,
                    )?;
                    ctor = Some(ClassCtor {
                        params,
                        body,
                        position: self.pos(member),
                    });
                }
                Some("fn") => {
                    let method_name = self
                        .arg(member, member_items, 1)?
                        .as_symbol()
                        .map(sanitize_ident)
                        .ok_or_else(|| {
                            HqlError::transform("Method name must be a symbol")
                                .at_opt(member.meta.as_ref())
                        })?;
                    let params_form = self.arg(member, member_items, 2)?;
                    let params = self.method_params(params_form)?;
                    let body = self.method_body(params_form, &member_items[3..], true)?;
                    methods.push(ClassMethod {
                        name: method_name,
                        params,
                        body,
                        is_static: false,
                        position: self.pos(member),
                    });
                }
                _ => {
                    return Err(HqlError::transform(
                        "Class members are (field ...), (constructor ...) and (fn ...) forms",
                    )
                    .at_opt(member.meta.as_ref()))
                }
            }
        }

        Ok(Stmt::ClassDecl {
            name,
            fields,
            ctor,
            methods,
            position,
        })
    }

    // Method parameter lists may lead with `self`; the receiver is dropped
    // from the parameter list and bound in the body prologue instead.
    fn method_params(&self, params_form: &Form) -> Result<Vec<FnParam>> {
        let params = self.lower_params(params_form)?;
        if self.takes_self(params_form) {
            Ok(params.into_iter().skip(1).collect())
        } else {
            Ok(params)
        }
    }

    fn takes_self(&self, params_form: &Form) -> bool {
        params_form
            .as_list()
            .map(|items| items.len() > 1 && items[1].is_symbol("self"))
            .unwrap_or(false)
    }

    fn method_body(&self, params_form: &Form, body: &[Form], implicit_return: bool) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        if self.takes_self(params_form) {
            let position = self.pos(params_form);
            stmts.push(Stmt::VarDecl {
                kind: DeclKind::Const,
                pattern: Pattern::Ident {
                    name: "self".to_string(),
                    position: position.clone(),
                },
                init: Some(Expr::Ident {
                    name: "this".to_string(),
                    position: position.clone(),
                }),
                position,
            });
        }
        let lowered = if implicit_return {
            self.lower_fn_body(body)?
        } else {
            self.lower_block(body)?
        };
        stmts.extend(lowered);
        Ok(stmts)
    }

    fn lower_enum(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let name = self
            .arg(form, items, 1)?
            .as_symbol()
            .map(sanitize_ident)
            .ok_or_else(|| {
                HqlError::transform("Enum name must be a symbol").at_opt(form.meta.as_ref())
            })?;

        let mut cases = Vec::new();
        for case in &items[2..] {
            let case_items = case.as_list().unwrap_or_default();
            if case.head_symbol() != Some("case") {
                return Err(HqlError::transform("Enum members must be (case ...) forms")
                    .at_opt(case.meta.as_ref()));
            }
            let case_name = self
                .arg(case, case_items, 1)?
                .as_symbol()
                .map(sanitize_ident)
                .ok_or_else(|| {
                    HqlError::transform("Enum case name must be a symbol")
                        .at_opt(case.meta.as_ref())
                })?;

            let mut raw = None;
            let mut associated = Vec::new();
            if let Some(payload) = case_items.get(2) {
                if payload.head_symbol() == Some(VECTOR) {
                    for field in &payload.as_list().unwrap()[1..] {
                        let field_name = field.as_symbol().map(sanitize_ident).ok_or_else(|| {
                            HqlError::transform("Associated value names must be symbols")
                                .at_opt(field.meta.as_ref())
                        })?;
                        associated.push(field_name);
                    }
                } else {
                    raw = Some(self.lower_expr(payload)?);
                }
            }
            cases.push(EnumCase {
                name: case_name,
                raw,
                associated,
                position: self.pos(case),
            });
        }

        Ok(Stmt::EnumDecl {
            name,
            cases,
            position,
        })
    }

    fn lower_if_stmt(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let test = self.lower_expr(self.arg(form, items, 1)?)?;
        let consequent = self.branch_stmts(self.arg(form, items, 2)?)?;
        let alternate = items.get(3).map(|alt| self.branch_stmts(alt)).transpose()?;
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
            position,
        })
    }

    fn lower_when_stmt(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let mut test = self.lower_expr(self.arg(form, items, 1)?)?;
        if form.head_symbol() == Some("unless") {
            test = Expr::Unary {
                op: "!".to_string(),
                position: test.position().clone(),
                operand: Box::new(test),
            };
        }
        Ok(Stmt::If {
            test,
            consequent: self.lower_block(&items[2..])?,
            alternate: None,
            position,
        })
    }

    fn branch_stmts(&self, form: &Form) -> Result<Vec<Stmt>> {
        if form.head_symbol() == Some("do") {
            return self.lower_block(&form.as_list().unwrap()[1..]);
        }
        Ok(self.lower_stmt(form)?.into_iter().collect())
    }

    // (for [x seq] body...) iterates a normalized sequence.
    fn lower_for_stmt(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let binding_form = self.arg(form, items, 1)?;
        let binding_items = binding_form.as_list().unwrap_or_default();
        if binding_form.head_symbol() != Some(VECTOR) || binding_items.len() != 3 {
            return Err(HqlError::transform("for expects a [name sequence] binding")
                .at_opt(binding_form.meta.as_ref()));
        }
        let binding = binding_items[1].as_symbol().map(sanitize_ident).ok_or_else(|| {
            HqlError::transform("for binding must be a symbol")
                .at_opt(binding_items[1].meta.as_ref())
        })?;
        let seq = self.lower_expr(&binding_items[2])?;
        let seq_pos = seq.position().clone();
        Ok(Stmt::ForOf {
            binding,
            iterable: Expr::Call {
                callee: Box::new(Expr::Ident {
                    name: "__hql_toSequence".to_string(),
                    position: seq_pos.clone(),
                }),
                args: vec![seq],
                position: seq_pos,
            },
            body: self.lower_block(&items[2..])?,
            position,
        })
    }

    fn lower_try(&self, form: &Form, items: &[Form]) -> Result<Stmt> {
        let position = self.pos(form);
        let mut block_forms = Vec::new();
        let mut catch_param = None;
        let mut handler = None;
        let mut finalizer = None;

        for item in &items[1..] {
            match item.head_symbol() {
                Some("catch") => {
                    let catch_items = item.as_list().unwrap();
                    let param = self.arg(item, catch_items, 1)?;
                    catch_param = Some(param.as_symbol().map(sanitize_ident).ok_or_else(|| {
                        HqlError::transform("catch binding must be a symbol")
                            .at_opt(param.meta.as_ref())
                    })?);
                    handler = Some(self.lower_block(&catch_items[2..])?);
                }
                Some("finally") => {
                    finalizer = Some(self.lower_block(&item.as_list().unwrap()[1..])?);
                }
                _ => block_forms.push(item.clone()),
            }
        }

        Ok(Stmt::Try {
            block: self.lower_block(&block_forms)?,
            catch_param,
            handler,
            finalizer,
            position,
        })
    }

    // ------------------------------------------------------------------
    // Imports and exports
    // ------------------------------------------------------------------

    fn lower_import(&self, form: &Form, items: &[Form]) -> Result<Option<Stmt>> {
        let position = self.pos(form);

        // (import "path")
        if items.len() == 2 {
            let source = self.import_source(&items[1])?;
            let local = derived_module_name(&source);
            return Ok(Some(Stmt::Import {
                specifiers: vec![ImportSpec::Namespace { local }],
                source: rewrite_specifier(&source),
                position,
            }));
        }

        // (import name from "path") | (import [a b] from "path")
        if items.len() == 4 && items[2].is_symbol("from") {
            let source = self.import_source(&items[3])?;
            let specifiers = if let Some(name) = items[1].as_symbol() {
                vec![ImportSpec::Namespace {
                    local: sanitize_ident(name),
                }]
            } else if items[1].head_symbol() == Some(VECTOR) {
                parse_import_vector(&items[1])?
                    .into_iter()
                    // Names that resolved to macros are compile-time only.
                    // Aliased macro imports register under the alias.
                    .filter(|(imported, local, _)| {
                        !(self.is_macro_import)(imported) && !(self.is_macro_import)(local)
                    })
                    .map(|(imported, local, _)| ImportSpec::Named {
                        imported: sanitize_ident(&imported),
                        local: sanitize_ident(&local),
                    })
                    .collect()
            } else {
                return Err(HqlError::import("Malformed import form")
                    .at_opt(items[1].meta.as_ref()));
            };
            if specifiers.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Stmt::Import {
                specifiers,
                source: rewrite_specifier(&source),
                position,
            }));
        }

        Err(HqlError::import("Malformed import form").at_opt(form.meta.as_ref()))
    }

    fn import_source(&self, form: &Form) -> Result<String> {
        match form.as_literal() {
            Some(Literal::Str(path)) => Ok(path.clone()),
            _ => Err(HqlError::import("Import path must be a string literal")
                .at_opt(form.meta.as_ref())),
        }
    }

    fn lower_export(&self, form: &Form, items: &[Form]) -> Result<Option<Stmt>> {
        let position = self.pos(form);

        // (export [a b]) vector export.
        if items.len() == 2 && items[1].head_symbol() == Some(VECTOR) {
            let mut specifiers = Vec::new();
            for (name, alias, _) in parse_import_vector(&items[1])? {
                // Macro exports have no runtime value.
                if self.macro_exports.contains(&name) {
                    continue;
                }
                let local = sanitize_ident(&name);
                let exported = sanitize_ident(&alias);
                specifiers.push((local, exported));
            }
            if specifiers.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Stmt::ExportNamed {
                specifiers,
                position,
            }));
        }

        // (export "name" expr) named export.
        if items.len() == 3 {
            if let Some(Literal::Str(name)) = items[1].as_literal() {
                let ident = sanitize_ident(name);
                let decl = Stmt::VarDecl {
                    kind: DeclKind::Const,
                    pattern: Pattern::Ident {
                        name: ident,
                        position: self.pos(&items[1]),
                    },
                    init: Some(self.lower_expr(&items[2])?),
                    position: position.clone(),
                };
                return Ok(Some(Stmt::ExportDecl {
                    decl: Box::new(decl),
                    position,
                }));
            }
        }

        Err(HqlError::import("Malformed export form").at_opt(form.meta.as_ref()))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn lower_expr(&self, form: &Form) -> Result<Expr> {
        let position = self.pos(form);
        match &*form.sexp {
            Sexp::Literal(lit) => Ok(self.lower_literal(lit, position)),
            Sexp::Symbol(name) => Ok(self.lower_symbol(name, position)),
            Sexp::List(items) => self.lower_list_expr(form, items, position),
        }
    }

    fn lower_literal(&self, lit: &Literal, position: Meta) -> Expr {
        match lit {
            Literal::Null => Expr::NullLit { position },
            Literal::Bool(b) => Expr::BoolLit {
                value: *b,
                position,
            },
            Literal::Int(n) => Expr::NumberLit {
                value: *n as f64,
                int: true,
                position,
            },
            Literal::Float(n) => Expr::NumberLit {
                value: *n,
                int: false,
                position,
            },
            Literal::Str(s) => Expr::StringLit {
                value: s.clone(),
                position,
            },
        }
    }

    fn lower_symbol(&self, name: &str, position: Meta) -> Expr {
        if name.len() > 1 && name.starts_with(':') {
            return Expr::StringLit {
                value: name[1..].to_string(),
                position,
            };
        }
        if name.contains('.') && name.len() > 1 && !name.starts_with('.') {
            return self.member_chain(name, &position);
        }
        Expr::Ident {
            name: sanitize_ident(name),
            position,
        }
    }

    fn member_chain(&self, dotted: &str, position: &Meta) -> Expr {
        let mut segments = dotted.split('.');
        let mut expr = Expr::Ident {
            name: sanitize_ident(segments.next().unwrap()),
            position: position.clone(),
        };
        for segment in segments {
            expr = Expr::Member {
                object: Box::new(expr),
                property: Box::new(Expr::Ident {
                    name: sanitize_ident(segment),
                    position: position.clone(),
                }),
                computed: false,
                position: position.clone(),
            };
        }
        expr
    }

    fn lower_list_expr(&self, form: &Form, items: &[Form], position: Meta) -> Result<Expr> {
        let Some(head) = items.first() else {
            return Ok(Expr::NullLit { position });
        };

        if let Some(name) = head.as_symbol() {
            match name {
                "quote" => return self.lower_quoted(self.arg(form, items, 1)?),
                "vector" => {
                    let elements = items[1..]
                        .iter()
                        .map(|e| self.lower_expr(e).map(ArrayElem::Item))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Expr::Array { elements, position });
                }
                "hash-map" => return self.lower_hash_map(form, &items[1..], position),
                "if" => {
                    let test = self.lower_expr(self.arg(form, items, 1)?)?;
                    let consequent = self.lower_expr(self.arg(form, items, 2)?)?;
                    let alternate = match items.get(3) {
                        Some(alt) => self.lower_expr(alt)?,
                        None => Expr::NullLit {
                            position: position.clone(),
                        },
                    };
                    return Ok(Expr::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                        position,
                    });
                }
                "cond" => return self.lower_cond(&items[1..], position),
                "when" | "unless" => {
                    let mut test = self.lower_expr(self.arg(form, items, 1)?)?;
                    if name == "unless" {
                        test = Expr::Unary {
                            op: "!".to_string(),
                            position: test.position().clone(),
                            operand: Box::new(test),
                        };
                    }
                    let consequent = self.body_as_expr(&items[2..], &position)?;
                    return Ok(Expr::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(Expr::NullLit {
                            position: position.clone(),
                        }),
                        position,
                    });
                }
                "do" => return self.body_as_expr(&items[1..], &position),
                "let" | "var" | "const" => {
                    // A binding block in expression position runs in an
                    // immediately-invoked arrow.
                    let stmt = self.lower_stmt(form)?;
                    return Ok(self.iife(stmt.into_iter().collect(), position));
                }
                "fn" => return self.lower_fn_expr(form, items, position),
                "=" => {
                    let target = self.lower_expr(self.arg(form, items, 1)?)?;
                    let value = self.lower_expr(self.arg(form, items, 2)?)?;
                    return Ok(Expr::Assign {
                        target: Box::new(target),
                        value: Box::new(value),
                        position,
                    });
                }
                "not" => {
                    let operand = self.lower_expr(self.arg(form, items, 1)?)?;
                    return Ok(Expr::Unary {
                        op: "!".to_string(),
                        operand: Box::new(operand),
                        position,
                    });
                }
                // Operator nodes anchor at the operator token itself, so
                // the source map points at the operator, not the paren.
                "and" | "or" => {
                    let op = if name == "and" { "&&" } else { "||" };
                    return self.fold_logical(op, form, &items[1..], self.pos(head));
                }
                "+" | "-" | "*" | "/" | "%" => {
                    return self.fold_binary(name, form, &items[1..], self.pos(head))
                }
                "<" | ">" | "<=" | ">=" => {
                    return self.binary_pair(name, form, items, self.pos(head))
                }
                "==" => return self.binary_pair("===", form, items, self.pos(head)),
                "!=" => return self.binary_pair("!==", form, items, self.pos(head)),
                "js-call" => {
                    let object = self.lower_expr(self.arg(form, items, 1)?)?;
                    let method = self.string_arg(form, items, 2)?;
                    let args = items[3..]
                        .iter()
                        .map(|a| self.lower_expr(a))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Expr::MethodCall {
                        object: Box::new(object),
                        method,
                        args,
                        position,
                    });
                }
                "js-get" => {
                    let object = self.lower_expr(self.arg(form, items, 1)?)?;
                    let property = self.string_arg(form, items, 2)?;
                    return Ok(Expr::Member {
                        object: Box::new(object),
                        property: Box::new(Expr::Ident {
                            name: property,
                            position: position.clone(),
                        }),
                        computed: false,
                        position,
                    });
                }
                "js-interop" => {
                    let object = self.lower_expr(self.arg(form, items, 1)?)?;
                    let property = self.string_arg(form, items, 2)?;
                    return Ok(Expr::InteropIife {
                        object: Box::new(object),
                        property,
                        position,
                    });
                }
                "get" => {
                    return self.helper_call("__hql_get", form, &items[1..], 2..=3, position)
                }
                "nth" => {
                    return self.helper_call("__hql_getNumeric", form, &items[1..], 2..=2, position)
                }
                "range" => {
                    return self.helper_call("__hql_range", form, &items[1..], 1..=3, position)
                }
                "new" => {
                    let callee = self.lower_expr(self.arg(form, items, 1)?)?;
                    let args = items[2..]
                        .iter()
                        .map(|a| self.lower_expr(a))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Expr::New {
                        callee: Box::new(callee),
                        args,
                        position,
                    });
                }
                "throw" => {
                    let argument = self.lower_expr(self.arg(form, items, 1)?)?;
                    return Ok(Expr::Call {
                        callee: Box::new(Expr::Ident {
                            name: "__hql_throw".to_string(),
                            position: position.clone(),
                        }),
                        args: vec![argument],
                        position,
                    });
                }
                "template-literal" => return self.lower_template(&items[1..], position),
                "while" | "for" | "try" => {
                    let stmt = self.lower_stmt(form)?;
                    return Ok(self.iife(stmt.into_iter().collect(), position));
                }
                _ => {}
            }

            // Dotted call head: (a.b.c args) is a method call on a.b.
            if name.contains('.') && !name.starts_with('.') {
                let (object_path, method) = name.rsplit_once('.').unwrap();
                let object = self.member_chain(object_path, &self.pos(head));
                let args = items[1..]
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Expr::MethodCall {
                    object: Box::new(object),
                    method: sanitize_ident(method),
                    args,
                    position,
                });
            }
        }

        // Plain application.
        let callee = self.lower_expr(head)?;
        let args = items[1..]
            .iter()
            .map(|a| self.lower_expr(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            position,
        })
    }

    fn string_arg(&self, form: &Form, items: &[Form], index: usize) -> Result<String> {
        match self.arg(form, items, index)?.as_literal() {
            Some(Literal::Str(s)) => Ok(s.clone()),
            _ => Err(HqlError::transform("Expected a string literal")
                .at_opt(form.meta.as_ref())),
        }
    }

    fn helper_call(
        &self,
        helper: &str,
        form: &Form,
        args: &[Form],
        arity: std::ops::RangeInclusive<usize>,
        position: Meta,
    ) -> Result<Expr> {
        if !arity.contains(&args.len()) {
            return Err(HqlError::transform(format!(
                "Wrong number of arguments to {}",
                form.head_symbol().unwrap_or("helper")
            ))
            .at_opt(form.meta.as_ref()));
        }
        let args = args
            .iter()
            .map(|a| self.lower_expr(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Call {
            callee: Box::new(Expr::Ident {
                name: helper.to_string(),
                position: position.clone(),
            }),
            args,
            position,
        })
    }

    fn fold_binary(&self, op: &str, form: &Form, args: &[Form], position: Meta) -> Result<Expr> {
        match args.len() {
            0 => Err(HqlError::transform(format!("Operator {} needs arguments", op))
                .at_opt(form.meta.as_ref())),
            1 => {
                let operand = self.lower_expr(&args[0])?;
                if op == "-" || op == "+" {
                    Ok(Expr::Unary {
                        op: op.to_string(),
                        operand: Box::new(operand),
                        position,
                    })
                } else {
                    Ok(operand)
                }
            }
            _ => {
                let mut acc = self.lower_expr(&args[0])?;
                for arg in &args[1..] {
                    let right = self.lower_expr(arg)?;
                    acc = Expr::Binary {
                        op: op.to_string(),
                        left: Box::new(acc),
                        right: Box::new(right),
                        position: position.clone(),
                    };
                }
                Ok(acc)
            }
        }
    }

    fn fold_logical(&self, op: &str, form: &Form, args: &[Form], position: Meta) -> Result<Expr> {
        if args.is_empty() {
            return Err(HqlError::transform(format!("Operator {} needs arguments", op))
                .at_opt(form.meta.as_ref()));
        }
        let mut acc = self.lower_expr(&args[0])?;
        for arg in &args[1..] {
            let right = self.lower_expr(arg)?;
            acc = Expr::Logical {
                op: op.to_string(),
                left: Box::new(acc),
                right: Box::new(right),
                position: position.clone(),
            };
        }
        Ok(acc)
    }

    fn binary_pair(&self, op: &str, form: &Form, items: &[Form], position: Meta) -> Result<Expr> {
        let left = self.lower_expr(self.arg(form, items, 1)?)?;
        let right = self.lower_expr(self.arg(form, items, 2)?)?;
        Ok(Expr::Binary {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
            position,
        })
    }

    fn lower_cond(&self, args: &[Form], position: Meta) -> Result<Expr> {
        let mut pairs: Vec<(Option<Expr>, Expr)> = Vec::new();
        for pair in args.chunks(2) {
            match pair {
                [test, result] => {
                    let is_default = matches!(test.as_symbol(), Some("else" | ":else"));
                    let test_expr = if is_default {
                        None
                    } else {
                        Some(self.lower_expr(test)?)
                    };
                    pairs.push((test_expr, self.lower_expr(result)?));
                }
                _ => {
                    return Err(HqlError::transform("cond requires test/result pairs")
                        .at_opt(pair[0].meta.as_ref()))
                }
            }
        }

        let mut acc = Expr::NullLit {
            position: position.clone(),
        };
        for (test, result) in pairs.into_iter().rev() {
            acc = match test {
                None => result,
                Some(test) => Expr::Conditional {
                    position: test.position().clone(),
                    test: Box::new(test),
                    consequent: Box::new(result),
                    alternate: Box::new(acc),
                },
            };
        }
        Ok(acc)
    }

    fn lower_fn_expr(&self, form: &Form, items: &[Form], position: Meta) -> Result<Expr> {
        let (name, params_index) = match items.get(1).and_then(Form::as_symbol) {
            Some(name) => (Some(sanitize_ident(name)), 2),
            None => (None, 1),
        };
        let params_form = self.arg(form, items, params_index)?;
        let params = self.lower_params(params_form)?;
        let body = self.lower_fn_body(&items[params_index + 1..])?;
        if name.as_deref() == Some("__anon") {
            // Arrow sugar lowers to an actual arrow.
            let expression = matches!(body.as_slice(), [Stmt::Return { .. }]);
            return Ok(Expr::Arrow {
                params,
                body,
                expression,
                is_async: false,
                position,
            });
        }
        Ok(Expr::Function {
            name,
            params,
            body,
            is_async: false,
            position,
        })
    }

    fn lower_hash_map(&self, form: &Form, entries: &[Form], position: Meta) -> Result<Expr> {
        if entries.len() % 2 != 0 {
            return Err(HqlError::transform("Map literal needs key/value pairs")
                .at_opt(form.meta.as_ref()));
        }
        let mut props = Vec::with_capacity(entries.len() / 2);
        for pair in entries.chunks(2) {
            let key = if let Some(kw) = pair[0].as_keyword() {
                PropKey::Ident(sanitize_ident(kw))
            } else if let Some(Literal::Str(s)) = pair[0].as_literal() {
                PropKey::Str(s.clone())
            } else {
                PropKey::Computed(self.lower_expr(&pair[0])?)
            };
            props.push(ObjectProp::Entry {
                key,
                value: self.lower_expr(&pair[1])?,
            });
        }
        Ok(Expr::Object { props, position })
    }

    // Quoted data becomes plain data: symbols are strings, lists arrays.
    fn lower_quoted(&self, form: &Form) -> Result<Expr> {
        let position = self.pos(form);
        match &*form.sexp {
            Sexp::Literal(lit) => Ok(self.lower_literal(lit, position)),
            Sexp::Symbol(name) => Ok(Expr::StringLit {
                value: name.clone(),
                position,
            }),
            Sexp::List(items) => {
                // Quoted maps stay maps; other lists become arrays.
                if form.head_symbol() == Some(HASH_MAP) {
                    let entries = &items[1..];
                    let mut props = Vec::with_capacity(entries.len() / 2);
                    for pair in entries.chunks(2) {
                        if pair.len() != 2 {
                            return Err(HqlError::transform("Map literal needs key/value pairs")
                                .at_opt(form.meta.as_ref()));
                        }
                        let key = if let Some(kw) = pair[0].as_keyword() {
                            PropKey::Ident(sanitize_ident(kw))
                        } else if let Some(Literal::Str(s)) = pair[0].as_literal() {
                            PropKey::Str(s.clone())
                        } else {
                            PropKey::Computed(self.lower_quoted(&pair[0])?)
                        };
                        props.push(ObjectProp::Entry {
                            key,
                            value: self.lower_quoted(&pair[1])?,
                        });
                    }
                    return Ok(Expr::Object { props, position });
                }
                let items = if form.head_symbol() == Some(VECTOR) {
                    &items[1..]
                } else {
                    items
                };
                let elements = items
                    .iter()
                    .map(|e| self.lower_quoted(e).map(ArrayElem::Item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::Array { elements, position })
            }
        }
    }

    fn lower_template(&self, args: &[Form], position: Meta) -> Result<Expr> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut expect_string = true;
        for arg in args {
            match arg.as_literal() {
                Some(Literal::Str(s)) => {
                    quasis.push(s.clone());
                    expect_string = false;
                }
                _ => {
                    if expect_string {
                        quasis.push(String::new());
                    }
                    exprs.push(self.lower_expr(arg)?);
                    expect_string = true;
                }
            }
        }
        while quasis.len() <= exprs.len() {
            quasis.push(String::new());
        }
        Ok(Expr::TemplateLit {
            quasis,
            exprs,
            position,
        })
    }

    fn body_as_expr(&self, forms: &[Form], position: &Meta) -> Result<Expr> {
        if forms.len() == 1 {
            if let Ok(expr) = self.lower_expr(&forms[0]) {
                return Ok(expr);
            }
        }
        let body = self.lower_fn_body(forms)?;
        Ok(self.iife(body, position.clone()))
    }

    fn iife(&self, body: Vec<Stmt>, position: Meta) -> Expr {
        Expr::Call {
            callee: Box::new(Expr::Arrow {
                params: Vec::new(),
                body,
                expression: false,
                is_async: false,
                position: position.clone(),
            }),
            args: Vec::new(),
            position,
        }
    }
}

/// Parses `[a b c as d]` vectors used by imports and exports into
/// `(name, alias, position)` triples; alias equals name when absent.
pub fn parse_import_vector(form: &Form) -> Result<Vec<(String, String, Option<Meta>)>> {
    let items = &form.as_list().unwrap()[1..];
    let mut out = Vec::new();
    let mut i = 0;
    while i < items.len() {
        let name = items[i].as_symbol().ok_or_else(|| {
            HqlError::import("Import vector entries must be symbols")
                .at_opt(items[i].meta.as_ref())
        })?;
        if items.get(i + 1).map(|f| f.is_symbol("as")) == Some(true) {
            let alias = items.get(i + 2).and_then(Form::as_symbol).ok_or_else(|| {
                HqlError::import("Expected a symbol after 'as'")
                    .at_opt(items[i + 1].meta.as_ref())
            })?;
            out.push((name.to_string(), alias.to_string(), items[i].meta.clone()));
            i += 3;
        } else {
            out.push((name.to_string(), name.to_string(), items[i].meta.clone()));
            i += 1;
        }
    }
    Ok(out)
}

/// Emitted import specifiers link against compiled output.
pub fn rewrite_specifier(source: &str) -> String {
    match source.strip_suffix(".hql") {
        Some(stem) => format!("{}.js", stem),
        None => source.to_string(),
    }
}

/// Namespace name for a bare `(import "path")`.
pub fn derived_module_name(source: &str) -> String {
    let stem = source
        .rsplit('/')
        .next()
        .unwrap_or(source)
        .trim_end_matches(".hql")
        .trim_end_matches(".js")
        .trim_end_matches(".ts");
    let cleaned = sanitize_ident(stem);
    if cleaned
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(true)
    {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::reader::read_program;
    use crate::syntax::transform_program;

    fn build(source: &str) -> Program {
        let forms = read_program(source, "b.hql").unwrap();
        let forms = transform_program(forms).unwrap();
        build_program(&forms, "b.hql", &HashSet::new(), &|_: &str| false).unwrap()
    }

    #[test]
    fn let_lowers_to_const() {
        let program = build("(let x 1)");
        assert!(matches!(
            &program.body[0],
            Stmt::VarDecl { kind: DeclKind::Const, .. }
        ));
        let program = build("(var y 2)");
        assert!(matches!(
            &program.body[0],
            Stmt::VarDecl { kind: DeclKind::Let, .. }
        ));
    }

    #[test]
    fn operator_folding() {
        let program = build("(+ 1 2 3)");
        let Stmt::ExprStmt { expr, .. } = &program.body[0] else { panic!() };
        let Expr::Binary { op, left, .. } = expr else { panic!() };
        assert_eq!(op, "+");
        assert!(matches!(&**left, Expr::Binary { .. }));
    }

    #[test]
    fn equality_is_strict() {
        let program = build("(== a b)");
        let Stmt::ExprStmt { expr, .. } = &program.body[0] else { panic!() };
        assert!(matches!(expr, Expr::Binary { op, .. } if op == "==="));
    }

    #[test]
    fn dotted_symbols_are_member_chains() {
        let program = build("a.b.c");
        let Stmt::ExprStmt { expr, .. } = &program.body[0] else { panic!() };
        let Expr::Member { property, .. } = expr else { panic!() };
        assert!(matches!(&**property, Expr::Ident { name, .. } if name == "c"));
    }

    #[test]
    fn dotted_call_is_method_call() {
        let program = build("(console.log 1)");
        let Stmt::ExprStmt { expr, .. } = &program.body[0] else { panic!() };
        assert!(matches!(expr, Expr::MethodCall { method, .. } if method == "log"));
    }

    #[test]
    fn fn_with_json_map_params() {
        let program = build("(fn multiply {x: 10 y: 20} (* x y))");
        let Stmt::FnDecl {
            uses_json_map_params,
            json_defaults,
            params,
            ..
        } = &program.body[0]
        else {
            panic!()
        };
        assert!(*uses_json_map_params);
        assert!(params.is_empty());
        assert_eq!(json_defaults.len(), 2);
        assert_eq!(json_defaults[0].0, "x");
    }

    #[test]
    fn fn_tail_position_returns() {
        let program = build("(fn add [a b] (+ a b))");
        let Stmt::FnDecl { body, .. } = &program.body[0] else { panic!() };
        assert!(matches!(body.last(), Some(Stmt::Return { .. })));
    }

    #[test]
    fn hyphenated_names_are_sanitized() {
        let program = build("(let my-value 1) my-value");
        let Stmt::VarDecl { pattern, .. } = &program.body[0] else { panic!() };
        assert!(matches!(pattern, Pattern::Ident { name, .. } if name == "my_value"));
        let Stmt::ExprStmt { expr, .. } = &program.body[1] else { panic!() };
        assert!(matches!(expr, Expr::Ident { name, .. } if name == "my_value"));
    }

    #[test]
    fn class_fields_and_methods() {
        let program = build(
            "(class Counter (field count 0) (field #secret 1) \
             (constructor [initial] (= this.count initial)) \
             (fn bump [self] (= self.count (+ self.count 1))))",
        );
        let Stmt::ClassDecl {
            fields,
            ctor,
            methods,
            ..
        } = &program.body[0]
        else {
            panic!()
        };
        assert_eq!(fields.len(), 2);
        assert!(fields[1].is_private);
        assert!(ctor.is_some());
        assert_eq!(methods.len(), 1);
        // The self receiver binds in the prologue, not the params.
        assert!(methods[0].params.is_empty());
        assert!(matches!(&methods[0].body[0], Stmt::VarDecl { .. }));
    }

    #[test]
    fn enum_shapes() {
        let program = build("(enum Color (case red) (case green \"g\"))");
        let Stmt::EnumDecl { cases, .. } = &program.body[0] else { panic!() };
        assert!(cases[0].raw.is_none());
        assert!(cases[1].raw.is_some());

        let program = build("(enum Shape (case circle [radius]) (case rect [w h]))");
        let Stmt::EnumDecl { cases, .. } = &program.body[0] else { panic!() };
        assert_eq!(cases[0].associated, vec!["radius"]);
        assert_eq!(cases[1].associated.len(), 2);
    }

    #[test]
    fn import_forms() {
        let program = build("(import [a b, c as d] from \"./m.hql\")");
        let Stmt::Import {
            specifiers, source, ..
        } = &program.body[0]
        else {
            panic!()
        };
        assert_eq!(source, "./m.js");
        assert_eq!(specifiers.len(), 3);
        assert!(matches!(
            &specifiers[2],
            ImportSpec::Named { imported, local } if imported == "c" && local == "d"
        ));

        let program = build("(import \"./utils/math.hql\")");
        let Stmt::Import { specifiers, .. } = &program.body[0] else { panic!() };
        assert!(matches!(
            &specifiers[0],
            ImportSpec::Namespace { local } if local == "math"
        ));
    }

    #[test]
    fn macro_only_export_is_dropped() {
        let forms = read_program("(export [my-macro])", "b.hql").unwrap();
        let mut macros = HashSet::new();
        macros.insert("my-macro".to_string());
        let program = build_program(&forms, "b.hql", &macros, &|_: &str| false).unwrap();
        assert!(program.body.is_empty());
    }

    #[test]
    fn get_lowers_to_helper() {
        let program = build("(get m \"k\" 0)");
        let Stmt::ExprStmt { expr, .. } = &program.body[0] else { panic!() };
        let Expr::Call { callee, args, .. } = expr else { panic!() };
        assert!(matches!(&**callee, Expr::Ident { name, .. } if name == "__hql_get"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn destructuring_binding() {
        let program = build("(let [[a b] pair] (+ a b))");
        let Stmt::Block { body, .. } = &program.body[0] else { panic!() };
        let Stmt::VarDecl { pattern, .. } = &body[0] else { panic!() };
        assert!(matches!(pattern, Pattern::Array { elements, .. } if elements.len() == 2));
    }
}
