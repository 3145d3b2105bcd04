//! Semantic validation: a single scope pass over the IR.
//!
//! Two checks, both scoped to one lexical scope at a time:
//!
//! 1. Duplicate declarations. A name declared twice in the same scope is an
//!    error, reported with both locations.
//! 2. Temporal dead zone. A reference at statement index `i` to a name the
//!    same scope declares at index `j > i` is an error. The rule is
//!    same-scope only, which is exactly what exempts closures: a reference
//!    inside a nested function lives in the function's scope, so it may see
//!    bindings the outer scope declares later.
//!
//! Scopes are introduced by the program, function bodies, blocks, class
//! bodies, and catch clauses. Patterns flatten to all their bound names.

use std::collections::HashMap;

use crate::ast::Meta;
use crate::errors::{codes, HqlError, Result, SourceContext};
use crate::ir::{
    ArrayElem, ClassMethod, Expr, FnParam, ObjectProp, Pattern, Program, PropKey, Stmt,
};

/// Validator with optional source context for richer diagnostics.
pub struct SemanticValidator<'a> {
    source: Option<&'a SourceContext>,
}

impl<'a> SemanticValidator<'a> {
    pub fn new() -> Self {
        Self { source: None }
    }

    pub fn with_source(source: &'a SourceContext) -> Self {
        Self {
            source: Some(source),
        }
    }

    pub fn validate(&self, program: &Program) -> Result<()> {
        self.check_scope(&program.body, Vec::new())
    }

    fn attach(&self, err: HqlError) -> HqlError {
        match self.source {
            Some(ctx) => err.with_source(ctx),
            None => err,
        }
    }

    // One lexical scope. `seeded` names (parameters, catch bindings, loop
    // bindings) are visible from the start.
    fn check_scope(&self, stmts: &[Stmt], seeded: Vec<(String, Meta)>) -> Result<()> {
        let mut declared: HashMap<String, (usize, Meta)> = HashMap::new();
        for (name, pos) in seeded {
            if let Some((_, first)) = declared.get(&name) {
                return Err(self.duplicate(&name, first, &pos));
            }
            declared.insert(name, (0, pos));
        }

        // Pass 1: collect declarations with their statement index.
        for (index, stmt) in stmts.iter().enumerate() {
            for (name, pos) in declarations_of(stmt) {
                if let Some((_, first)) = declared.get(&name) {
                    return Err(self.duplicate(&name, first, &pos));
                }
                declared.insert(name, (index, pos));
            }
        }

        // Pass 2: references against declaration indices, then recurse into
        // nested scopes.
        for (index, stmt) in stmts.iter().enumerate() {
            for (name, pos) in references_of(stmt) {
                if let Some((decl_index, decl_pos)) = declared.get(&name) {
                    if *decl_index > index {
                        return Err(self.attach(
                            HqlError::validation(format!(
                                "'{}' is referenced before its declaration",
                                name
                            ))
                            .with_code(codes::TDZ_VIOLATION)
                            .at(&pos)
                            .with_related("declared here", decl_pos)
                            .with_suggestion(format!(
                                "Move the declaration of '{}' above this use.",
                                name
                            )),
                        ));
                    }
                }
            }
            self.check_nested(stmt)?;
        }
        Ok(())
    }

    fn duplicate(&self, name: &str, first: &Meta, second: &Meta) -> HqlError {
        self.attach(
            HqlError::validation(format!("Duplicate declaration of '{}'", name))
                .with_code(codes::INVALID_EXPRESSION)
                .at(second)
                .with_related("first declared here", first),
        )
    }

    fn check_nested(&self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block { body, .. } => self.check_scope(body, Vec::new())?,
            Stmt::If {
                consequent,
                alternate,
                test,
                ..
            } => {
                self.check_expr_functions(test)?;
                self.check_scope(consequent, Vec::new())?;
                if let Some(alt) = alternate {
                    self.check_scope(alt, Vec::new())?;
                }
            }
            Stmt::While { test, body, .. } => {
                self.check_expr_functions(test)?;
                self.check_scope(body, Vec::new())?;
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
                position,
            } => {
                self.check_expr_functions(iterable)?;
                self.check_scope(body, vec![(binding.clone(), position.clone())])?;
            }
            Stmt::Try {
                block,
                catch_param,
                handler,
                finalizer,
                position,
            } => {
                self.check_scope(block, Vec::new())?;
                if let Some(handler) = handler {
                    let seeded = catch_param
                        .iter()
                        .map(|p| (p.clone(), position.clone()))
                        .collect();
                    self.check_scope(handler, seeded)?;
                }
                if let Some(finalizer) = finalizer {
                    self.check_scope(finalizer, Vec::new())?;
                }
            }
            Stmt::FnDecl {
                params,
                body,
                json_defaults,
                position,
                ..
            } => {
                for (_, default) in json_defaults {
                    self.check_expr_functions(default)?;
                }
                let mut seeded = param_names(params, position);
                for (name, _) in json_defaults {
                    seeded.push((name.clone(), position.clone()));
                }
                self.check_scope(body, seeded)?;
            }
            Stmt::ClassDecl {
                fields,
                ctor,
                methods,
                position,
                ..
            } => {
                for field in fields {
                    if let Some(value) = &field.value {
                        self.check_expr_functions(value)?;
                    }
                }
                if let Some(ctor) = ctor {
                    self.check_scope(&ctor.body, param_names(&ctor.params, position))?;
                }
                for ClassMethod {
                    params,
                    body,
                    position,
                    ..
                } in methods
                {
                    self.check_scope(body, param_names(params, position))?;
                }
            }
            Stmt::EnumDecl { cases, .. } => {
                for case in cases {
                    if let Some(raw) = &case.raw {
                        self.check_expr_functions(raw)?;
                    }
                }
            }
            Stmt::VarDecl { init, .. } => {
                if let Some(init) = init {
                    self.check_expr_functions(init)?;
                }
            }
            Stmt::ExprStmt { expr, .. }
            | Stmt::Throw {
                argument: expr, ..
            } => self.check_expr_functions(expr)?,
            Stmt::Return { argument, .. } => {
                if let Some(expr) = argument {
                    self.check_expr_functions(expr)?;
                }
            }
            Stmt::ExportDecl { decl, .. } => self.check_nested(decl)?,
            Stmt::Import { .. } | Stmt::ExportNamed { .. } => {}
        }
        Ok(())
    }

    // Function expressions open their own scopes; find and validate them.
    fn check_expr_functions(&self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Arrow {
                params,
                body,
                position,
                ..
            }
            | Expr::Function {
                params,
                body,
                position,
                ..
            } => self.check_scope(body, param_names(params, position)),
            Expr::Unary { operand, .. } => self.check_expr_functions(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.check_expr_functions(left)?;
                self.check_expr_functions(right)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.check_expr_functions(test)?;
                self.check_expr_functions(consequent)?;
                self.check_expr_functions(alternate)
            }
            Expr::Assign { target, value, .. } => {
                self.check_expr_functions(target)?;
                self.check_expr_functions(value)
            }
            Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
                self.check_expr_functions(callee)?;
                args.iter().try_for_each(|a| self.check_expr_functions(a))
            }
            Expr::MethodCall { object, args, .. } => {
                self.check_expr_functions(object)?;
                args.iter().try_for_each(|a| self.check_expr_functions(a))
            }
            Expr::InteropIife { object, .. } => self.check_expr_functions(object),
            Expr::Member {
                object, property, computed, ..
            } => {
                self.check_expr_functions(object)?;
                if *computed {
                    self.check_expr_functions(property)?;
                }
                Ok(())
            }
            Expr::Array { elements, .. } => elements.iter().try_for_each(|e| match e {
                ArrayElem::Item(expr) | ArrayElem::Spread(expr) => self.check_expr_functions(expr),
            }),
            Expr::Object { props, .. } => props.iter().try_for_each(|p| match p {
                ObjectProp::Entry { key, value } => {
                    if let PropKey::Computed(key) = key {
                        self.check_expr_functions(key)?;
                    }
                    self.check_expr_functions(value)
                }
                ObjectProp::Spread(expr) => self.check_expr_functions(expr),
            }),
            Expr::TemplateLit { exprs, .. } => {
                exprs.iter().try_for_each(|e| self.check_expr_functions(e))
            }
            _ => Ok(()),
        }
    }
}

impl Default for SemanticValidator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper used by the driver.
pub fn validate_program(program: &Program, source: Option<&SourceContext>) -> Result<()> {
    match source {
        Some(ctx) => SemanticValidator::with_source(ctx).validate(program),
        None => SemanticValidator::new().validate(program),
    }
}

fn param_names(params: &[FnParam], position: &Meta) -> Vec<(String, Meta)> {
    let mut names = Vec::new();
    for param in params {
        let mut bound = Vec::new();
        param.pattern.bound_names(&mut bound);
        for name in bound {
            names.push((name, position.clone()));
        }
    }
    names
}

fn declarations_of(stmt: &Stmt) -> Vec<(String, Meta)> {
    let mut out = Vec::new();
    match stmt {
        Stmt::VarDecl {
            pattern, position, ..
        } => {
            let mut names = Vec::new();
            pattern.bound_names(&mut names);
            for name in names {
                out.push((name, position.clone()));
            }
        }
        Stmt::FnDecl { name, position, .. }
        | Stmt::ClassDecl { name, position, .. }
        | Stmt::EnumDecl { name, position, .. } => {
            out.push((name.clone(), position.clone()));
        }
        Stmt::Import {
            specifiers,
            position,
            ..
        } => {
            for spec in specifiers {
                let local = match spec {
                    crate::ir::ImportSpec::Named { local, .. }
                    | crate::ir::ImportSpec::Namespace { local }
                    | crate::ir::ImportSpec::Default { local } => local,
                };
                out.push((local.clone(), position.clone()));
            }
        }
        Stmt::ExportDecl { decl, .. } => out.extend(declarations_of(decl)),
        _ => {}
    }
    out
}

// Shallow identifier references of one statement: compound expressions are
// walked, nested functions and child scopes are not.
fn references_of(stmt: &Stmt) -> Vec<(String, Meta)> {
    let mut out = Vec::new();
    match stmt {
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                expr_refs(init, &mut out);
            }
        }
        Stmt::ExprStmt { expr, .. } | Stmt::Throw { argument: expr, .. } => {
            expr_refs(expr, &mut out)
        }
        Stmt::If { test, .. } | Stmt::While { test, .. } => expr_refs(test, &mut out),
        Stmt::ForOf { iterable, .. } => expr_refs(iterable, &mut out),
        Stmt::Return { argument, .. } => {
            if let Some(expr) = argument {
                expr_refs(expr, &mut out);
            }
        }
        Stmt::EnumDecl { cases, .. } => {
            for case in cases {
                if let Some(raw) = &case.raw {
                    expr_refs(raw, &mut out);
                }
            }
        }
        Stmt::ExportDecl { decl, .. } => out.extend(references_of(decl)),
        // Export specifiers are hoisted in the target language; they never
        // participate in TDZ ordering.
        _ => {}
    }
    out
}

fn expr_refs(expr: &Expr, out: &mut Vec<(String, Meta)>) {
    match expr {
        Expr::Ident { name, position } => {
            if name != "this" && name != "super" {
                out.push((name.clone(), position.clone()));
            }
        }
        Expr::Unary { operand, .. } => expr_refs(operand, out),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            expr_refs(left, out);
            expr_refs(right, out);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            expr_refs(test, out);
            expr_refs(consequent, out);
            expr_refs(alternate, out);
        }
        Expr::Assign { target, value, .. } => {
            expr_refs(target, out);
            expr_refs(value, out);
        }
        Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
            expr_refs(callee, out);
            for arg in args {
                expr_refs(arg, out);
            }
        }
        Expr::MethodCall { object, args, .. } => {
            expr_refs(object, out);
            for arg in args {
                expr_refs(arg, out);
            }
        }
        Expr::InteropIife { object, .. } => expr_refs(object, out),
        Expr::Member {
            object,
            property,
            computed,
            ..
        } => {
            expr_refs(object, out);
            if *computed {
                expr_refs(property, out);
            }
        }
        Expr::Array { elements, .. } => {
            for element in elements {
                match element {
                    ArrayElem::Item(e) | ArrayElem::Spread(e) => expr_refs(e, out),
                }
            }
        }
        Expr::Object { props, .. } => {
            for prop in props {
                match prop {
                    ObjectProp::Entry { key, value } => {
                        if let PropKey::Computed(key) = key {
                            expr_refs(key, out);
                        }
                        expr_refs(value, out);
                    }
                    ObjectProp::Spread(e) => expr_refs(e, out),
                }
            }
        }
        Expr::TemplateLit { exprs, .. } => {
            for e in exprs {
                expr_refs(e, out);
            }
        }
        // Nested functions are their own scopes; their references do not
        // participate in this scope's TDZ ordering.
        Expr::Arrow { .. } | Expr::Function { .. } => {}
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build_program;
    use crate::syntax::reader::read_program;
    use crate::syntax::transform_program;
    use std::collections::HashSet;

    fn validate_src(source: &str) -> Result<()> {
        let forms = read_program(source, "v.hql").unwrap();
        let forms = transform_program(forms).unwrap();
        let program = build_program(&forms, "v.hql", &HashSet::new(), &|_: &str| false).unwrap();
        validate_program(&program, None)
    }

    #[test]
    fn tdz_in_a_block() {
        let err = validate_src("(do (print-it x) (let x 1))").unwrap_err();
        assert_eq!(err.code, codes::TDZ_VIOLATION);
    }

    #[test]
    fn duplicate_declaration_in_block() {
        let err = validate_src("(do (let x 1) (let x 2))").unwrap_err();
        assert_eq!(err.code, codes::INVALID_EXPRESSION);
        assert!(err.related.is_some());
    }

    #[test]
    fn closure_over_later_declaration_is_fine() {
        validate_src("(fn use-later [] later) (let later 1)").unwrap();
    }

    #[test]
    fn direct_use_before_declaration_fails() {
        let err = validate_src("(print-it later) (let later 1)").unwrap_err();
        assert_eq!(err.code, codes::TDZ_VIOLATION);
    }

    #[test]
    fn params_shadowing_is_a_duplicate() {
        let err = validate_src("(fn f [a] (let a 2) a)").unwrap_err();
        assert_eq!(err.code, codes::INVALID_EXPRESSION);
    }

    #[test]
    fn sibling_scopes_do_not_conflict() {
        validate_src("(do (let x 1)) (do (let x 2))").unwrap();
    }

    #[test]
    fn catch_param_is_scoped() {
        validate_src("(try (dangerous) (catch e (handle e)))").unwrap();
    }
}
