//! Tree assembly helper.
//!
//! Every node gets a fresh [`NodeId`] and a position one past the previous
//! node, so creation order is textual order. Dependency tracking compares
//! these positions, which makes the order in which a tree is built
//! significant.

use std::rc::Rc;

use crate::{Position, Span};

use super::ast::{
    Access, BinaryOp, ClassDef, Expr, ExprKind, FuncDef, NodeId, Param, Program, Section, Stmt,
    StmtKind, TypeDecl, UnaryOp, VarDecl,
};

#[derive(Debug)]
pub struct AstBuilder {
    file: Rc<String>,
    next_id: u32,
    pos: u32,
}

impl AstBuilder {
    pub fn new(file: &str) -> Self {
        AstBuilder {
            file: Rc::new(file.to_string()),
            next_id: 0,
            pos: 0,
        }
    }

    pub fn file(&self) -> Rc<String> {
        Rc::clone(&self.file)
    }

    /// The position the next node will receive.
    pub fn peek_position(&self) -> u32 {
        self.pos + 1
    }

    fn next(&mut self) -> (NodeId, Span) {
        self.next_id += 1;
        self.pos += 1;
        (
            NodeId(self.next_id),
            Span::at(Position(self.pos, Rc::clone(&self.file))),
        )
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let (id, span) = self.next();
        Expr { id, kind, span }
    }

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        let (id, span) = self.next();
        Stmt { id, kind, span }
    }

    /// Parses `"Foo.Bar[][]"`, with a trailing `@` marking a reference.
    pub fn ty(&mut self, text: &str) -> TypeDecl {
        let (_, span) = self.next();
        let mut text = text.trim();
        let is_ref = text.ends_with('@');
        if is_ref {
            text = text.trim_end_matches('@').trim_end();
        }
        let mut array_depth = 0;
        while let Some(rest) = text.strip_suffix("[]") {
            array_depth += 1;
            text = rest;
        }
        TypeDecl {
            path: text.split('.').map(|part| part.to_string()).collect(),
            array_depth,
            is_ref,
            span,
        }
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(ExprKind::Int(value))
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::Float(value))
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.expr(ExprKind::Str(value.to_string()))
    }

    pub fn id(&mut self, name: &str) -> Expr {
        self.expr(ExprKind::Id(name.to_string()))
    }

    pub fn decl(&mut self, ty: &str, name: &str) -> Expr {
        let ty = self.ty(ty);
        self.decl_with(VarDecl {
            ty,
            name: name.to_string(),
            is_static: false,
            is_const: false,
            access: Access::Public,
        })
    }

    pub fn static_decl(&mut self, ty: &str, name: &str) -> Expr {
        let ty = self.ty(ty);
        self.decl_with(VarDecl {
            ty,
            name: name.to_string(),
            is_static: true,
            is_const: false,
            access: Access::Public,
        })
    }

    pub fn decl_with(&mut self, decl: VarDecl) -> Expr {
        self.expr(ExprKind::Decl(decl))
    }

    pub fn chuck(&mut self, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Chuck {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(&mut self, op: UnaryOp, expr: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn call(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.id(name);
        self.call_expr(callee, args)
    }

    pub fn call_expr(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn member(&mut self, base: Expr, name: &str) -> Expr {
        self.expr(ExprKind::Member {
            base: Box::new(base),
            name: name.to_string(),
        })
    }

    pub fn method_call(&mut self, base: Expr, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.member(base, name);
        self.call_expr(callee, args)
    }

    pub fn new_object(&mut self, ty: &str) -> Expr {
        let ty = self.ty(ty);
        self.expr(ExprKind::New(ty))
    }

    pub fn spork(&mut self, call: Expr) -> Expr {
        self.expr(ExprKind::Spork(Box::new(call)))
    }

    pub fn ternary(&mut self, condition: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
        self.expr(ExprKind::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn array(&mut self, elements: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Array(elements))
    }

    pub fn index(&mut self, base: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::Index {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn cast(&mut self, expr: Expr, ty: &str) -> Expr {
        let ty = self.ty(ty);
        self.expr(ExprKind::Cast {
            expr: Box::new(expr),
            ty,
        })
    }

    pub fn print(&mut self, exprs: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Print(exprs))
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn block(&mut self, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(body))
    }

    pub fn if_stmt(&mut self, condition: Expr, then_body: Stmt, else_body: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::If {
            condition,
            then_body: Box::new(then_body),
            else_body: else_body.map(Box::new),
        })
    }

    pub fn while_stmt(&mut self, condition: Expr, body: Stmt) -> Stmt {
        self.stmt(StmtKind::While {
            condition,
            body: Box::new(body),
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn brk(&mut self) -> Stmt {
        self.stmt(StmtKind::Break)
    }

    pub fn cont(&mut self) -> Stmt {
        self.stmt(StmtKind::Continue)
    }

    /// `params` are `(type, name)` pairs.
    pub fn func(
        &mut self,
        return_type: &str,
        name: &str,
        params: &[(&str, &str)],
        body: Vec<Stmt>,
    ) -> FuncDef {
        let return_type = self.ty(return_type);
        let params = params
            .iter()
            .map(|(ty, name)| {
                let ty = self.ty(ty);
                Param {
                    span: ty.span.clone(),
                    ty,
                    name: name.to_string(),
                }
            })
            .collect();
        let body = self.block(body);
        let (id, span) = self.next();
        FuncDef {
            id,
            name: name.to_string(),
            return_type,
            params,
            body,
            is_static: false,
            access: Access::Public,
            doc: None,
            span,
        }
    }

    pub fn class(
        &mut self,
        name: &str,
        extends: Option<&str>,
        is_public: bool,
        body: Vec<Section>,
    ) -> ClassDef {
        let extends = extends.map(|parent| self.ty(parent));
        let (id, span) = self.next();
        ClassDef {
            id,
            name: name.to_string(),
            extends,
            is_public,
            body,
            doc: None,
            span,
        }
    }

    pub fn program(&mut self, sections: Vec<Section>) -> Program {
        let (_, span) = self.next();
        Program { sections, span }
    }
}

impl Section {
    pub fn stmt(stmt: Stmt) -> Self {
        Section::Stmt(stmt)
    }

    pub fn func(def: FuncDef) -> Self {
        Section::Func(Rc::new(def))
    }

    pub fn class(def: ClassDef) -> Self {
        Section::Class(Rc::new(def))
    }
}
