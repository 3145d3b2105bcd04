//! IR to ESTree conversion.
//!
//! Exhaustive dispatch over the IR sum type. Along the way the lowerer
//! scans every identifier it emits against the runtime helper names, so the
//! driver knows which helper definitions to inject into the prelude.
//!
//! Noteworthy conversions: negative numeric literals become unary minus
//! over a positive literal to satisfy the target grammar, and the interop
//! access expands to a self-invoking arrow that resolves the property and
//! calls it with the receiver bound iff it resolved to a function.

use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::ast::Meta;
use crate::errors::Result;
use crate::ir::{
    ArrayElem, ClassCtor, ClassField, ClassMethod, DeclKind, EnumCase, Expr, FnParam, ImportSpec,
    ObjectProp, Pattern, Program, PropKey, Stmt,
};

use super::estree::{ImportSpecifier, LineCol, Loc, Node};
use super::helpers;

pub struct Lowerer {
    used_helpers: RefCell<BTreeSet<&'static str>>,
}

/// Lowers a program, returning the tree and the set of runtime helpers it
/// references.
pub fn lower_program(program: &Program) -> Result<(Node, BTreeSet<&'static str>)> {
    let lowerer = Lowerer {
        used_helpers: RefCell::new(BTreeSet::new()),
    };
    let body = program
        .body
        .iter()
        .map(|stmt| lowerer.lower_stmt(stmt))
        .collect::<Result<Vec<_>>>()?;
    let node = Node::Program {
        body,
        loc: Loc::from_meta(&program.position),
    };
    Ok((node, lowerer.used_helpers.into_inner()))
}

impl Lowerer {
    fn ident(&self, name: &str, meta: &Meta) -> Node {
        if let Some(helper) = helpers::helper_name(name) {
            self.used_helpers.borrow_mut().insert(helper);
        }
        Node::Identifier {
            name: name.to_string(),
            loc: Loc::token(meta, name.len()),
        }
    }

    fn lower_stmt(&self, stmt: &Stmt) -> Result<Node> {
        let loc = Loc::from_meta(stmt.position());
        match stmt {
            Stmt::VarDecl {
                kind,
                pattern,
                init,
                position,
            } => Ok(self.var_decl(*kind, pattern, init.as_ref(), position)?),
            Stmt::FnDecl {
                name,
                params,
                body,
                uses_json_map_params,
                json_defaults,
                position,
                ..
            } => {
                let (params, prologue) = if *uses_json_map_params {
                    self.json_map_params(json_defaults, position)?
                } else {
                    (self.lower_params(params)?, Vec::new())
                };
                let mut stmts = prologue;
                for stmt in body {
                    stmts.push(self.lower_stmt(stmt)?);
                }
                Ok(Node::FunctionDeclaration {
                    id: name.clone(),
                    params,
                    body: Box::new(Node::BlockStatement {
                        body: stmts,
                        loc: loc.clone(),
                    }),
                    loc,
                })
            }
            Stmt::ClassDecl {
                name,
                fields,
                ctor,
                methods,
                position,
            } => self.lower_class(name, fields, ctor.as_ref(), methods, position),
            Stmt::EnumDecl {
                name,
                cases,
                position,
            } => self.lower_enum(name, cases, position),
            Stmt::If {
                test,
                consequent,
                alternate,
                ..
            } => Ok(Node::IfStatement {
                test: Box::new(self.lower_expr(test)?),
                consequent: Box::new(self.block(consequent, &loc)?),
                alternate: alternate
                    .as_ref()
                    .map(|alt| self.block(alt, &loc).map(Box::new))
                    .transpose()?,
                loc,
            }),
            Stmt::While { test, body, .. } => Ok(Node::WhileStatement {
                test: Box::new(self.lower_expr(test)?),
                body: Box::new(self.block(body, &loc)?),
                loc,
            }),
            Stmt::ForOf {
                binding,
                iterable,
                body,
                ..
            } => Ok(Node::ForOfStatement {
                binding: binding.clone(),
                right: Box::new(self.lower_expr(iterable)?),
                body: Box::new(self.block(body, &loc)?),
                loc,
            }),
            Stmt::Throw { argument, .. } => Ok(Node::ThrowStatement {
                argument: Box::new(self.lower_expr(argument)?),
                loc,
            }),
            Stmt::Try {
                block,
                catch_param,
                handler,
                finalizer,
                ..
            } => Ok(Node::TryStatement {
                block: Box::new(self.block(block, &loc)?),
                param: catch_param.clone(),
                handler: handler
                    .as_ref()
                    .map(|h| self.block(h, &loc).map(Box::new))
                    .transpose()?,
                finalizer: finalizer
                    .as_ref()
                    .map(|f| self.block(f, &loc).map(Box::new))
                    .transpose()?,
                loc,
            }),
            Stmt::Return { argument, .. } => Ok(Node::ReturnStatement {
                argument: argument
                    .as_ref()
                    .map(|a| self.lower_expr(a).map(Box::new))
                    .transpose()?,
                loc,
            }),
            Stmt::ExprStmt { expr, .. } => Ok(Node::ExpressionStatement {
                expression: Box::new(self.lower_expr(expr)?),
                loc,
            }),
            Stmt::Block { body, .. } => self.block(body, &loc),
            Stmt::Import {
                specifiers, source, ..
            } => Ok(Node::ImportDeclaration {
                specifiers: specifiers
                    .iter()
                    .map(|spec| match spec {
                        ImportSpec::Named { imported, local } => ImportSpecifier::Named {
                            imported: imported.clone(),
                            local: local.clone(),
                        },
                        ImportSpec::Namespace { local } => ImportSpecifier::Namespace {
                            local: local.clone(),
                        },
                        ImportSpec::Default { local } => ImportSpecifier::Default {
                            local: local.clone(),
                        },
                    })
                    .collect(),
                source: source.clone(),
                loc,
            }),
            Stmt::ExportNamed { specifiers, .. } => Ok(Node::ExportNamedDeclaration {
                specifiers: specifiers.clone(),
                declaration: None,
                loc,
            }),
            Stmt::ExportDecl { decl, .. } => Ok(Node::ExportNamedDeclaration {
                specifiers: Vec::new(),
                declaration: Some(Box::new(self.lower_stmt(decl)?)),
                loc,
            }),
        }
    }

    fn block(&self, body: &[Stmt], loc: &Loc) -> Result<Node> {
        Ok(Node::BlockStatement {
            body: body
                .iter()
                .map(|stmt| self.lower_stmt(stmt))
                .collect::<Result<Vec<_>>>()?,
            loc: loc.clone(),
        })
    }

    fn var_decl(
        &self,
        kind: DeclKind,
        pattern: &Pattern,
        init: Option<&Expr>,
        position: &Meta,
    ) -> Result<Node> {
        let loc = Loc::from_meta(position);
        let kind = match kind {
            DeclKind::Const => "const",
            DeclKind::Let => "let",
            DeclKind::Var => "var",
        };
        let declarator = Node::VariableDeclarator {
            id: Box::new(self.lower_pattern(pattern)?),
            init: init.map(|e| self.lower_expr(e).map(Box::new)).transpose()?,
            loc: loc.clone(),
        };
        Ok(Node::VariableDeclaration {
            kind,
            declarations: vec![declarator],
            loc,
        })
    }

    fn lower_params(&self, params: &[FnParam]) -> Result<Vec<Node>> {
        params
            .iter()
            .map(|param| {
                let pattern = self.lower_pattern(&param.pattern)?;
                match &param.default {
                    Some(default) => Ok(Node::AssignmentPattern {
                        loc: pattern.loc().clone(),
                        left: Box::new(pattern),
                        right: Box::new(self.lower_expr(default)?),
                    }),
                    None => Ok(pattern),
                }
            })
            .collect()
    }

    fn lower_pattern(&self, pattern: &Pattern) -> Result<Node> {
        let loc = Loc::from_meta(pattern.position());
        match pattern {
            Pattern::Ident { name, position } => Ok(self.ident(name, position)),
            Pattern::Array { elements, .. } => Ok(Node::ArrayPattern {
                elements: elements
                    .iter()
                    .map(|e| self.lower_pattern(e))
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Pattern::Object { props, .. } => Ok(Node::ObjectPattern {
                properties: props
                    .iter()
                    .map(|(key, value)| {
                        let value = self.lower_pattern(value)?;
                        let shorthand =
                            matches!(&value, Node::Identifier { name, .. } if name == key);
                        Ok(Node::Property {
                            key: Box::new(Node::Identifier {
                                name: key.clone(),
                                loc: value.loc().clone(),
                            }),
                            value: Box::new(value),
                            computed: false,
                            shorthand,
                            loc: loc.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Pattern::Rest { inner, .. } => Ok(Node::RestElement {
                argument: Box::new(self.lower_pattern(inner)?),
                loc,
            }),
            Pattern::Assign {
                pattern, default, ..
            } => Ok(Node::AssignmentPattern {
                left: Box::new(self.lower_pattern(pattern)?),
                right: Box::new(self.lower_expr(default)?),
                loc,
            }),
        }
    }

    // `{k: default}` parameter lists: one `__hql_params = {}` parameter and
    // a `const k = __hql_params.k ?? default;` prologue per key.
    fn json_map_params(
        &self,
        defaults: &[(String, Expr)],
        position: &Meta,
    ) -> Result<(Vec<Node>, Vec<Node>)> {
        let loc = Loc::from_meta(position);
        let params = vec![Node::AssignmentPattern {
            left: Box::new(self.ident("__hql_params", position)),
            right: Box::new(Node::ObjectExpression {
                properties: Vec::new(),
                loc: loc.clone(),
            }),
            loc: loc.clone(),
        }];

        let mut prologue = Vec::new();
        for (name, default) in defaults {
            let member = Node::MemberExpression {
                object: Box::new(self.ident("__hql_params", position)),
                property: Box::new(Node::Identifier {
                    name: name.clone(),
                    loc: loc.clone(),
                }),
                computed: false,
                loc: loc.clone(),
            };
            let init = Node::LogicalExpression {
                operator: "??".to_string(),
                left: Box::new(member),
                right: Box::new(self.lower_expr(default)?),
                loc: loc.clone(),
            };
            prologue.push(Node::VariableDeclaration {
                kind: "const",
                declarations: vec![Node::VariableDeclarator {
                    id: Box::new(Node::Identifier {
                        name: name.clone(),
                        loc: loc.clone(),
                    }),
                    init: Some(Box::new(init)),
                    loc: loc.clone(),
                }],
                loc: loc.clone(),
            });
        }
        Ok((params, prologue))
    }

    fn lower_class(
        &self,
        name: &str,
        fields: &[ClassField],
        ctor: Option<&ClassCtor>,
        methods: &[ClassMethod],
        position: &Meta,
    ) -> Result<Node> {
        let loc = Loc::from_meta(position);
        let mut body = Vec::new();

        // Private fields must be declared in the class body.
        for field in fields.iter().filter(|f| f.is_private) {
            body.push(Node::PropertyDefinition {
                key: field.name.clone(),
                is_private: true,
                value: field
                    .value
                    .as_ref()
                    .map(|v| self.lower_expr(v).map(Box::new))
                    .transpose()?,
                loc: Loc::from_meta(&field.position),
            });
        }

        // Public fields initialize in the constructor prologue.
        let public_fields: Vec<&ClassField> = fields.iter().filter(|f| !f.is_private).collect();
        let needs_ctor = ctor.is_some() || !public_fields.is_empty();
        if needs_ctor {
            let mut ctor_body = Vec::new();
            for field in &public_fields {
                let target = Node::MemberExpression {
                    object: Box::new(Node::Identifier {
                        name: "this".to_string(),
                        loc: Loc::from_meta(&field.position),
                    }),
                    property: Box::new(Node::Identifier {
                        name: field.name.clone(),
                        loc: Loc::from_meta(&field.position),
                    }),
                    computed: false,
                    loc: Loc::from_meta(&field.position),
                };
                let value = match &field.value {
                    Some(v) => self.lower_expr(v)?,
                    None => Node::NullLiteral {
                        loc: Loc::from_meta(&field.position),
                    },
                };
                ctor_body.push(Node::ExpressionStatement {
                    expression: Box::new(Node::AssignmentExpression {
                        left: Box::new(target),
                        right: Box::new(value),
                        loc: Loc::from_meta(&field.position),
                    }),
                    loc: Loc::from_meta(&field.position),
                });
            }

            let params = match ctor {
                Some(ctor) => {
                    for stmt in &ctor.body {
                        ctor_body.push(self.lower_stmt(stmt)?);
                    }
                    self.lower_params(&ctor.params)?
                }
                None => Vec::new(),
            };

            body.push(Node::MethodDefinition {
                key: "constructor".to_string(),
                is_constructor: true,
                is_static: false,
                params,
                body: Box::new(Node::BlockStatement {
                    body: ctor_body,
                    loc: loc.clone(),
                }),
                loc: loc.clone(),
            });
        }

        for method in methods {
            let method_loc = Loc::from_meta(&method.position);
            body.push(Node::MethodDefinition {
                key: method.name.clone(),
                is_constructor: false,
                is_static: method.is_static,
                params: self.lower_params(&method.params)?,
                body: Box::new(Node::BlockStatement {
                    body: method
                        .body
                        .iter()
                        .map(|s| self.lower_stmt(s))
                        .collect::<Result<Vec<_>>>()?,
                    loc: method_loc.clone(),
                }),
                loc: method_loc,
            });
        }

        Ok(Node::ClassDeclaration {
            id: name.to_string(),
            body,
            loc,
        })
    }

    // Raw-valued enums freeze an object literal; associated values build a
    // class with per-case static factories.
    fn lower_enum(&self, name: &str, cases: &[EnumCase], position: &Meta) -> Result<Node> {
        let loc = Loc::from_meta(position);
        let has_associated = cases.iter().any(|c| !c.associated.is_empty());

        if !has_associated {
            let properties = cases
                .iter()
                .map(|case| {
                    let value = match &case.raw {
                        Some(raw) => self.lower_expr(raw)?,
                        None => Node::StringLiteral {
                            value: case.name.clone(),
                            loc: Loc::from_meta(&case.position),
                        },
                    };
                    Ok(Node::Property {
                        key: Box::new(Node::Identifier {
                            name: case.name.clone(),
                            loc: Loc::from_meta(&case.position),
                        }),
                        value: Box::new(value),
                        computed: false,
                        shorthand: false,
                        loc: Loc::from_meta(&case.position),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let frozen = Node::CallExpression {
                callee: Box::new(self.ident("__hql_deepFreeze", position)),
                arguments: vec![Node::ObjectExpression {
                    properties,
                    loc: loc.clone(),
                }],
                loc: loc.clone(),
            };
            return Ok(Node::VariableDeclaration {
                kind: "const",
                declarations: vec![Node::VariableDeclarator {
                    id: Box::new(Node::Identifier {
                        name: name.to_string(),
                        loc: loc.clone(),
                    }),
                    init: Some(Box::new(frozen)),
                    loc: loc.clone(),
                }],
                loc,
            });
        }

        // constructor(tag, values) { this.tag = tag; Object.assign(this, values); }
        let mut body = Vec::new();
        let ctor_body = vec![
            Node::ExpressionStatement {
                expression: Box::new(Node::AssignmentExpression {
                    left: Box::new(Node::MemberExpression {
                        object: Box::new(Node::Identifier {
                            name: "this".to_string(),
                            loc: loc.clone(),
                        }),
                        property: Box::new(Node::Identifier {
                            name: "tag".to_string(),
                            loc: loc.clone(),
                        }),
                        computed: false,
                        loc: loc.clone(),
                    }),
                    right: Box::new(Node::Identifier {
                        name: "tag".to_string(),
                        loc: loc.clone(),
                    }),
                    loc: loc.clone(),
                }),
                loc: loc.clone(),
            },
            Node::ExpressionStatement {
                expression: Box::new(Node::CallExpression {
                    callee: Box::new(Node::MemberExpression {
                        object: Box::new(Node::Identifier {
                            name: "Object".to_string(),
                            loc: loc.clone(),
                        }),
                        property: Box::new(Node::Identifier {
                            name: "assign".to_string(),
                            loc: loc.clone(),
                        }),
                        computed: false,
                        loc: loc.clone(),
                    }),
                    arguments: vec![
                        Node::Identifier {
                            name: "this".to_string(),
                            loc: loc.clone(),
                        },
                        Node::Identifier {
                            name: "values".to_string(),
                            loc: loc.clone(),
                        },
                    ],
                    loc: loc.clone(),
                }),
                loc: loc.clone(),
            },
        ];
        body.push(Node::MethodDefinition {
            key: "constructor".to_string(),
            is_constructor: true,
            is_static: false,
            params: vec![
                Node::Identifier {
                    name: "tag".to_string(),
                    loc: loc.clone(),
                },
                Node::Identifier {
                    name: "values".to_string(),
                    loc: loc.clone(),
                },
            ],
            body: Box::new(Node::BlockStatement {
                body: ctor_body,
                loc: loc.clone(),
            }),
            loc: loc.clone(),
        });

        for case in cases {
            let case_loc = Loc::from_meta(&case.position);
            let payload = Node::ObjectExpression {
                properties: case
                    .associated
                    .iter()
                    .map(|field| Node::Property {
                        key: Box::new(Node::Identifier {
                            name: field.clone(),
                            loc: case_loc.clone(),
                        }),
                        value: Box::new(Node::Identifier {
                            name: field.clone(),
                            loc: case_loc.clone(),
                        }),
                        computed: false,
                        shorthand: true,
                        loc: case_loc.clone(),
                    })
                    .collect(),
                loc: case_loc.clone(),
            };
            let construct = Node::NewExpression {
                callee: Box::new(Node::Identifier {
                    name: name.to_string(),
                    loc: case_loc.clone(),
                }),
                arguments: vec![
                    Node::StringLiteral {
                        value: case.name.clone(),
                        loc: case_loc.clone(),
                    },
                    payload,
                ],
                loc: case_loc.clone(),
            };
            body.push(Node::MethodDefinition {
                key: case.name.clone(),
                is_constructor: false,
                is_static: true,
                params: case
                    .associated
                    .iter()
                    .map(|field| Node::Identifier {
                        name: field.clone(),
                        loc: case_loc.clone(),
                    })
                    .collect(),
                body: Box::new(Node::BlockStatement {
                    body: vec![Node::ReturnStatement {
                        argument: Some(Box::new(construct)),
                        loc: case_loc.clone(),
                    }],
                    loc: case_loc.clone(),
                }),
                loc: case_loc,
            });
        }

        Ok(Node::ClassDeclaration {
            id: name.to_string(),
            body,
            loc,
        })
    }

    pub fn lower_expr(&self, expr: &Expr) -> Result<Node> {
        let loc = Loc::from_meta(expr.position());
        match expr {
            Expr::NumberLit {
                value,
                int,
                position,
            } => {
                let token_len = format_number(*value, *int).len();
                let token_loc = Loc::token(position, token_len);
                if *value < 0.0 {
                    // The grammar has no negative literals; emit unary minus.
                    Ok(Node::UnaryExpression {
                        operator: "-".to_string(),
                        argument: Box::new(Node::NumberLiteral {
                            value: -*value,
                            int: *int,
                            loc: token_loc.clone(),
                        }),
                        loc: token_loc,
                    })
                } else {
                    Ok(Node::NumberLiteral {
                        value: *value,
                        int: *int,
                        loc: token_loc,
                    })
                }
            }
            Expr::StringLit { value, position } => Ok(Node::StringLiteral {
                value: value.clone(),
                loc: Loc::token(position, value.len() + 2),
            }),
            Expr::BoolLit { value, position } => Ok(Node::BooleanLiteral {
                value: *value,
                loc: Loc::token(position, if *value { 4 } else { 5 }),
            }),
            Expr::NullLit { position } => Ok(Node::NullLiteral {
                loc: Loc::token(position, 4),
            }),
            Expr::TemplateLit { quasis, exprs, .. } => Ok(Node::TemplateLiteral {
                quasis: quasis.clone(),
                expressions: exprs
                    .iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::Ident { name, position } => Ok(self.ident(name, position)),
            Expr::Unary { op, operand, .. } => Ok(Node::UnaryExpression {
                operator: op.clone(),
                argument: Box::new(self.lower_expr(operand)?),
                loc,
            }),
            Expr::Binary {
                op, left, right, ..
            } => Ok(Node::BinaryExpression {
                operator: op.clone(),
                left: Box::new(self.lower_expr(left)?),
                right: Box::new(self.lower_expr(right)?),
                loc,
            }),
            Expr::Logical {
                op, left, right, ..
            } => Ok(Node::LogicalExpression {
                operator: op.clone(),
                left: Box::new(self.lower_expr(left)?),
                right: Box::new(self.lower_expr(right)?),
                loc,
            }),
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => Ok(Node::ConditionalExpression {
                test: Box::new(self.lower_expr(test)?),
                consequent: Box::new(self.lower_expr(consequent)?),
                alternate: Box::new(self.lower_expr(alternate)?),
                loc,
            }),
            Expr::Assign { target, value, .. } => Ok(Node::AssignmentExpression {
                left: Box::new(self.lower_expr(target)?),
                right: Box::new(self.lower_expr(value)?),
                loc,
            }),
            Expr::Call { callee, args, .. } => Ok(Node::CallExpression {
                callee: Box::new(self.lower_expr(callee)?),
                arguments: args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::MethodCall {
                object,
                method,
                args,
                position,
            } => Ok(Node::CallExpression {
                callee: Box::new(Node::MemberExpression {
                    object: Box::new(self.lower_expr(object)?),
                    property: Box::new(Node::Identifier {
                        name: method.clone(),
                        loc: Loc::token(position, method.len()),
                    }),
                    computed: false,
                    loc: loc.clone(),
                }),
                arguments: args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::New { callee, args, .. } => Ok(Node::NewExpression {
                callee: Box::new(self.lower_expr(callee)?),
                arguments: args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::InteropIife {
                object,
                property,
                position,
            } => self.interop_iife(object, property, position),
            Expr::Member {
                object,
                property,
                computed,
                ..
            } => Ok(Node::MemberExpression {
                object: Box::new(self.lower_expr(object)?),
                property: Box::new(self.lower_expr(property)?),
                computed: *computed,
                loc,
            }),
            Expr::Array { elements, .. } => Ok(Node::ArrayExpression {
                elements: elements
                    .iter()
                    .map(|element| match element {
                        ArrayElem::Item(e) => self.lower_expr(e),
                        ArrayElem::Spread(e) => Ok(Node::SpreadElement {
                            loc: Loc::from_meta(e.position()),
                            argument: Box::new(self.lower_expr(e)?),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::Object { props, .. } => Ok(Node::ObjectExpression {
                properties: props
                    .iter()
                    .map(|prop| match prop {
                        ObjectProp::Entry { key, value } => {
                            let value_node = self.lower_expr(value)?;
                            let (key_node, computed) = match key {
                                PropKey::Ident(name) => (
                                    Node::Identifier {
                                        name: name.clone(),
                                        loc: value_node.loc().clone(),
                                    },
                                    false,
                                ),
                                PropKey::Str(s) => (
                                    Node::StringLiteral {
                                        value: s.clone(),
                                        loc: value_node.loc().clone(),
                                    },
                                    false,
                                ),
                                PropKey::Computed(e) => (self.lower_expr(e)?, true),
                            };
                            Ok(Node::Property {
                                loc: value_node.loc().clone(),
                                key: Box::new(key_node),
                                value: Box::new(value_node),
                                computed,
                                shorthand: false,
                            })
                        }
                        ObjectProp::Spread(e) => Ok(Node::SpreadElement {
                            loc: Loc::from_meta(e.position()),
                            argument: Box::new(self.lower_expr(e)?),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?,
                loc,
            }),
            Expr::Arrow {
                params,
                body,
                expression,
                ..
            } => {
                let params = self.lower_params(params)?;
                if *expression {
                    if let [Stmt::Return {
                        argument: Some(expr),
                        ..
                    }] = body.as_slice()
                    {
                        return Ok(Node::ArrowFunctionExpression {
                            params,
                            body: Box::new(self.lower_expr(expr)?),
                            expression: true,
                            loc,
                        });
                    }
                }
                Ok(Node::ArrowFunctionExpression {
                    params,
                    body: Box::new(Node::BlockStatement {
                        body: body
                            .iter()
                            .map(|s| self.lower_stmt(s))
                            .collect::<Result<Vec<_>>>()?,
                        loc: loc.clone(),
                    }),
                    expression: false,
                    loc,
                })
            }
            Expr::Function {
                name, params, body, ..
            } => Ok(Node::FunctionExpression {
                id: name.clone(),
                params: self.lower_params(params)?,
                body: Box::new(Node::BlockStatement {
                    body: body
                        .iter()
                        .map(|s| self.lower_stmt(s))
                        .collect::<Result<Vec<_>>>()?,
                    loc: loc.clone(),
                }),
                loc,
            }),
        }
    }

    // ((obj) => { const member = obj.prop; return typeof member ===
    // "function" ? member.call(obj) : member; })(target)
    fn interop_iife(&self, object: &Expr, property: &str, position: &Meta) -> Result<Node> {
        let loc = Loc::from_meta(position);
        let obj = || Node::Identifier {
            name: "__hql_obj".to_string(),
            loc: loc.clone(),
        };
        let member_ident = || Node::Identifier {
            name: "__hql_member".to_string(),
            loc: loc.clone(),
        };

        let resolve = Node::VariableDeclaration {
            kind: "const",
            declarations: vec![Node::VariableDeclarator {
                id: Box::new(member_ident()),
                init: Some(Box::new(Node::MemberExpression {
                    object: Box::new(obj()),
                    property: Box::new(Node::Identifier {
                        name: property.to_string(),
                        loc: loc.clone(),
                    }),
                    computed: false,
                    loc: loc.clone(),
                })),
                loc: loc.clone(),
            }],
            loc: loc.clone(),
        };

        let is_function = Node::BinaryExpression {
            operator: "===".to_string(),
            left: Box::new(Node::UnaryExpression {
                operator: "typeof".to_string(),
                argument: Box::new(member_ident()),
                loc: loc.clone(),
            }),
            right: Box::new(Node::StringLiteral {
                value: "function".to_string(),
                loc: loc.clone(),
            }),
            loc: loc.clone(),
        };

        let invoke = Node::CallExpression {
            callee: Box::new(Node::MemberExpression {
                object: Box::new(member_ident()),
                property: Box::new(Node::Identifier {
                    name: "call".to_string(),
                    loc: loc.clone(),
                }),
                computed: false,
                loc: loc.clone(),
            }),
            arguments: vec![obj()],
            loc: loc.clone(),
        };

        let select = Node::ReturnStatement {
            argument: Some(Box::new(Node::ConditionalExpression {
                test: Box::new(is_function),
                consequent: Box::new(invoke),
                alternate: Box::new(member_ident()),
                loc: loc.clone(),
            })),
            loc: loc.clone(),
        };

        let arrow = Node::ArrowFunctionExpression {
            params: vec![obj()],
            body: Box::new(Node::BlockStatement {
                body: vec![resolve, select],
                loc: loc.clone(),
            }),
            expression: false,
            loc: loc.clone(),
        };

        Ok(Node::CallExpression {
            callee: Box::new(arrow),
            arguments: vec![self.lower_expr(object)?],
            loc,
        })
    }
}

/// Prints a numeric literal the way the generator will.
pub fn format_number(value: f64, int: bool) -> String {
    let abs = value.abs();
    if int || abs.fract() == 0.0 {
        format!("{}", abs as i64)
    } else {
        format!("{}", abs)
    }
}
