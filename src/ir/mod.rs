//! Typed intermediate representation.
//!
//! A closed sum over everything the emitter knows how to print. Every node
//! carries the source position it lowered from; the emitter turns those
//! into ESTree `loc` spans and, eventually, source-map segments. The IR is
//! serializable so tooling (`hql ast`) can dump it as JSON.

use serde::Serialize;

use crate::ast::Meta;

pub mod builder;

/// Positions reuse the reader's metadata record.
pub type Position = Meta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expr {
    NumberLit {
        value: f64,
        /// Printed without a decimal point when true.
        int: bool,
        position: Position,
    },
    StringLit {
        value: String,
        position: Position,
    },
    BoolLit {
        value: bool,
        position: Position,
    },
    NullLit {
        position: Position,
    },
    TemplateLit {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
        position: Position,
    },
    Ident {
        name: String,
        position: Position,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        position: Position,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },
    Logical {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        position: Position,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        position: Position,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        position: Position,
    },
    /// `obj.method(args)` with the receiver kept as the `this` binding.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        position: Position,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
        position: Position,
    },
    /// Property access that invokes the resolved member iff it is a
    /// function, preserving `this`. Emitted as a self-invoking arrow.
    InteropIife {
        object: Box<Expr>,
        property: String,
        position: Position,
    },
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
        position: Position,
    },
    Array {
        elements: Vec<ArrayElem>,
        position: Position,
    },
    Object {
        props: Vec<ObjectProp>,
        position: Position,
    },
    Arrow {
        params: Vec<FnParam>,
        body: Vec<Stmt>,
        /// Single-expression bodies print without braces.
        expression: bool,
        is_async: bool,
        position: Position,
    },
    Function {
        name: Option<String>,
        params: Vec<FnParam>,
        body: Vec<Stmt>,
        is_async: bool,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> &Position {
        match self {
            Expr::NumberLit { position, .. }
            | Expr::StringLit { position, .. }
            | Expr::BoolLit { position, .. }
            | Expr::NullLit { position }
            | Expr::TemplateLit { position, .. }
            | Expr::Ident { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Logical { position, .. }
            | Expr::Conditional { position, .. }
            | Expr::Assign { position, .. }
            | Expr::Call { position, .. }
            | Expr::MethodCall { position, .. }
            | Expr::New { position, .. }
            | Expr::InteropIife { position, .. }
            | Expr::Member { position, .. }
            | Expr::Array { position, .. }
            | Expr::Object { position, .. }
            | Expr::Arrow { position, .. }
            | Expr::Function { position, .. } => position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayElem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObjectProp {
    Entry { key: PropKey, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropKey {
    Ident(String),
    Str(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Pattern {
    Ident {
        name: String,
        position: Position,
    },
    Array {
        elements: Vec<Pattern>,
        position: Position,
    },
    Object {
        props: Vec<(String, Pattern)>,
        position: Position,
    },
    Rest {
        inner: Box<Pattern>,
        position: Position,
    },
    Assign {
        pattern: Box<Pattern>,
        default: Box<Expr>,
        position: Position,
    },
}

impl Pattern {
    pub fn position(&self) -> &Position {
        match self {
            Pattern::Ident { position, .. }
            | Pattern::Array { position, .. }
            | Pattern::Object { position, .. }
            | Pattern::Rest { position, .. }
            | Pattern::Assign { position, .. } => position,
        }
    }

    /// All identifier names this pattern binds, in source order.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Ident { name, .. } => out.push(name.clone()),
            Pattern::Array { elements, .. } => {
                for element in elements {
                    element.bound_names(out);
                }
            }
            Pattern::Object { props, .. } => {
                for (_, pattern) in props {
                    pattern.bound_names(out);
                }
            }
            Pattern::Rest { inner, .. } => inner.bound_names(out),
            Pattern::Assign { pattern, .. } => pattern.bound_names(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FnParam {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassField {
    pub name: String,
    pub is_private: bool,
    pub value: Option<Expr>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMethod {
    pub name: String,
    pub params: Vec<FnParam>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCtor {
    pub params: Vec<FnParam>,
    pub body: Vec<Stmt>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumCase {
    pub name: String,
    pub raw: Option<Expr>,
    pub associated: Vec<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ImportSpec {
    Named { imported: String, local: String },
    Namespace { local: String },
    Default { local: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Stmt {
    VarDecl {
        kind: DeclKind,
        pattern: Pattern,
        init: Option<Expr>,
        position: Position,
    },
    /// A `fn` declaration. JSON-map parameter lists collapse into a single
    /// `__hql_params = {}` parameter destructured in the prologue.
    FnDecl {
        name: String,
        params: Vec<FnParam>,
        body: Vec<Stmt>,
        uses_json_map_params: bool,
        json_defaults: Vec<(String, Expr)>,
        is_async: bool,
        position: Position,
    },
    ClassDecl {
        name: String,
        fields: Vec<ClassField>,
        ctor: Option<ClassCtor>,
        methods: Vec<ClassMethod>,
        position: Position,
    },
    EnumDecl {
        name: String,
        cases: Vec<EnumCase>,
        position: Position,
    },
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        alternate: Option<Vec<Stmt>>,
        position: Position,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        position: Position,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
        position: Position,
    },
    Throw {
        argument: Expr,
        position: Position,
    },
    Try {
        block: Vec<Stmt>,
        catch_param: Option<String>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
        position: Position,
    },
    Return {
        argument: Option<Expr>,
        position: Position,
    },
    ExprStmt {
        expr: Expr,
        position: Position,
    },
    Block {
        body: Vec<Stmt>,
        position: Position,
    },
    Import {
        specifiers: Vec<ImportSpec>,
        source: String,
        position: Position,
    },
    ExportNamed {
        /// (local, exported) pairs.
        specifiers: Vec<(String, String)>,
        position: Position,
    },
    /// `export` wrapping a declaration, e.g. `export const name = expr;`.
    ExportDecl {
        decl: Box<Stmt>,
        position: Position,
    },
}

impl Stmt {
    pub fn position(&self) -> &Position {
        match self {
            Stmt::VarDecl { position, .. }
            | Stmt::FnDecl { position, .. }
            | Stmt::ClassDecl { position, .. }
            | Stmt::EnumDecl { position, .. }
            | Stmt::If { position, .. }
            | Stmt::While { position, .. }
            | Stmt::ForOf { position, .. }
            | Stmt::Throw { position, .. }
            | Stmt::Try { position, .. }
            | Stmt::Return { position, .. }
            | Stmt::ExprStmt { position, .. }
            | Stmt::Block { position, .. }
            | Stmt::Import { position, .. }
            | Stmt::ExportNamed { position, .. }
            | Stmt::ExportDecl { position, .. } => position,
        }
    }
}
