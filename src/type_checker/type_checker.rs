//! The checking pipeline for one context.
//!
//! Pass 1 registers a shell type for every class so classes can name each
//! other in any order. Pass 2 first declares everything with a signature
//! (class parents, members, methods, top-level functions and top-level
//! variables) and then checks class bodies, function bodies and top-level
//! statements in textual order.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::{
    ast::ast::{
        BinaryOp, ClassDef, Expr, ExprKind, FuncDef, Program, Section, Stmt, StmtKind, TypeDecl,
        UnaryOp, VarDecl,
    },
    errors::errors::{Error, ErrorImpl},
    Position, MK_ERROR,
};

use super::{
    context::{ContextId, HowMuch, Progress},
    depends::{Dependency, GraphRef},
    env::Environment,
    namespace::NspcId,
    scope::Climb,
    symbols::{Func, FuncId, FuncParam, Value, ValueId},
    types::{sizes, Origin, PrimKind, Type, TypeId, TypeKind},
};

/// Declaration nested in a top-level statement: `int x;` or `5 => int x;`.
fn leading_decl(expr: &Expr) -> Option<(&Expr, &VarDecl)> {
    match &expr.kind {
        ExprKind::Decl(decl) => Some((expr, decl)),
        ExprKind::Chuck { rhs, .. } => leading_decl(rhs),
        _ => None,
    }
}

/// A call or instantiation that runs as soon as it is reached.
#[derive(Debug, Clone)]
pub(crate) struct DeferredUse {
    target: GraphRef,
    name: String,
    pos: Position,
    is_class_def: bool,
}

/// How a call reaches the object it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    /// `f()`: the enclosing instance, if there is one.
    Implicit,
    /// `obj.f()`
    Instance,
    /// `Type.f()`
    Static,
}

type Callee = (String, Vec<FuncId>, Receiver);

fn is_auto(decl: &TypeDecl) -> bool {
    decl.path.len() == 1 && decl.path[0] == "auto"
}

fn collect_classes(sections: &[Section], out: &mut Vec<Rc<ClassDef>>) {
    for section in sections {
        if let Section::Class(def) = section {
            out.push(Rc::clone(def));
            collect_classes(&def.body, out);
        }
    }
}

impl Environment {
    /// Makes, loads, checks and unloads a context in one go.
    pub fn check_program(&mut self, program: Program, filename: &str) -> Result<ContextId, Error> {
        let ctx = self.make_context(program, filename);
        self.load_context(ctx)?;
        let result = self.check_context(ctx, HowMuch::All);
        self.unload_context(ctx)?;
        result.map(|_| ctx)
    }

    pub fn check_context(&mut self, ctx: ContextId, how_much: HowMuch) -> Result<(), Error> {
        let result = self.run_passes(ctx, how_much);
        if let Err(err) = &result {
            // A committed context stays committed; only a check in progress
            // can fail it.
            if let Some(context) = self
                .contexts
                .get_mut(ctx)
                .filter(|context| context.progress != Progress::FullyDone)
            {
                context.has_error = true;
            }
            self.diagnostics.report(err.clone());
        }
        result
    }

    fn run_passes(&mut self, ctx: ContextId, how_much: HowMuch) -> Result<(), Error> {
        let Some(context) = self.contexts.get(ctx) else {
            return Err(self.invalid_context(ctx, "context does not exist"));
        };
        let (progress, has_error, tree) = (
            context.progress,
            context.has_error,
            context.parse_tree.clone(),
        );

        if self.context != Some(ctx) {
            return Err(self.invalid_context(ctx, "context is not loaded"));
        }
        if has_error {
            return Err(self.invalid_context(ctx, "context already failed to check"));
        }
        let Some(tree) = tree else {
            return Err(self.invalid_context(ctx, "context has no tree to check"));
        };
        match (how_much, progress) {
            (_, Progress::FullyDone) => {
                return Err(self.invalid_context(ctx, "context is already fully checked"))
            }
            (HowMuch::NoClasses, Progress::NotStarted) => {
                return Err(self.invalid_context(ctx, "classes have not been scanned yet"))
            }
            _ => {}
        }

        if progress == Progress::NotStarted {
            self.scan_classes(&tree)?;
            self.contexts[ctx].progress = Progress::ClassesScanned;
            debug!(file = %self.contexts[ctx].filename, "classes scanned");
        }
        if how_much == HowMuch::ClassesOnly {
            return Ok(());
        }

        self.declare_program(&tree)?;
        self.check_sections(&tree.sections)?;
        self.check_deferred_uses()?;
        self.contexts[ctx].progress = Progress::FullyDone;
        info!(file = %self.contexts[ctx].filename, "context checked");
        Ok(())
    }

    fn annotate_type(&mut self, expr: &Expr, t: TypeId) {
        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.expr_types.insert(expr.id, t);
        }
    }

    fn annotate_value(&mut self, expr: &Expr, v: ValueId) {
        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.value_refs.insert(expr.id, v);
        }
    }

    fn class_type_of(&self, def: &ClassDef) -> Option<TypeId> {
        self.context
            .and_then(|c| self.contexts.get(c))
            .and_then(|c| c.annotations.class_types.get(&def.id).copied())
    }

    fn func_of(&self, def: &FuncDef) -> Option<FuncId> {
        self.context
            .and_then(|c| self.contexts.get(c))
            .and_then(|c| c.annotations.func_defs.get(&def.id).copied())
    }

    // ---------------------------------------------------------------------
    // Pass 1

    fn scan_classes(&mut self, tree: &Program) -> Result<(), Error> {
        for section in &tree.sections {
            if let Section::Class(def) = section {
                self.register_class(def, None)?;
            }
        }
        Ok(())
    }

    fn register_class(&mut self, def: &ClassDef, outer: Option<TypeId>) -> Result<(), Error> {
        let pos = &def.span.start;
        self.check_reserved(&def.name, pos)?;

        let Some(ctx_nspc) = self.context_nspc() else {
            return MK_ERROR!(
                ErrorImpl::InvalidContextState {
                    filename: pos.1.to_string(),
                    message: String::from("no context loaded"),
                },
                pos
            );
        };
        let lexical = outer
            .and_then(|class| self.types[class].info)
            .unwrap_or(ctx_nspc);
        if self
            .lookup_type_from(lexical, &def.name, Climb::Outward, false)
            .is_some()
        {
            return MK_ERROR!(
                ErrorImpl::DuplicateDeclaration {
                    name: def.name.clone()
                },
                pos
            );
        }

        let where_ = if outer.is_some() || !def.is_public {
            lexical
        } else {
            let public = self
                .context
                .and_then(|c| self.contexts.get(c))
                .and_then(|c| c.public_class_def);
            if let Some(first) = public {
                return MK_ERROR!(
                    ErrorImpl::MultiplePublicClasses {
                        first: self.type_name(first),
                        second: def.name.clone(),
                    },
                    pos
                );
            }
            self.user().unwrap_or(self.global())
        };

        let mut ty = Type::new(TypeKind::Object, &def.name, None, sizes::REF);
        ty.origin = Origin::UserDefined;
        ty.is_complete = false;
        ty.owner = Some(where_);
        ty.doc = def.doc.clone().unwrap_or_default();
        let t = self.types.insert(ty);
        self.own_type(t);
        self.new_class_nspc(t, Some(lexical));
        self.nspcs[where_].types.add(&def.name, t);

        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.class_types.insert(def.id, t);
            if outer.is_none() && def.is_public {
                context.public_class_def = Some(t);
            }
        }
        debug!(class = %def.name, public = def.is_public, "registered class");

        for section in &def.body {
            if let Section::Class(inner) = section {
                self.register_class(inner, Some(t))?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pass 2, declarations

    fn declare_program(&mut self, tree: &Program) -> Result<(), Error> {
        let mut classes = vec![];
        collect_classes(&tree.sections, &mut classes);
        let by_type: FxHashMap<TypeId, Rc<ClassDef>> = classes
            .iter()
            .filter_map(|def| self.class_type_of(def).map(|t| (t, Rc::clone(def))))
            .collect();

        let mut visiting = FxHashSet::default();
        let mut done = FxHashSet::default();
        for def in &classes {
            self.declare_class(def, &by_type, &mut visiting, &mut done)?;
        }

        for section in &tree.sections {
            match section {
                Section::Func(def) => self.declare_func(def, None)?,
                Section::Stmt(stmt) => self.preregister_decl(stmt)?,
                Section::Class(_) => {}
            }
        }
        Ok(())
    }

    /// Declares `def` after its parent, so layouts and vtables extend a
    /// finished parent.
    fn declare_class(
        &mut self,
        def: &ClassDef,
        by_type: &FxHashMap<TypeId, Rc<ClassDef>>,
        visiting: &mut FxHashSet<TypeId>,
        done: &mut FxHashSet<TypeId>,
    ) -> Result<(), Error> {
        let pos = &def.span.start;
        let Some(t) = self.class_type_of(def) else {
            return Ok(());
        };
        if done.contains(&t) {
            return Ok(());
        }
        if !visiting.insert(t) {
            return MK_ERROR!(
                ErrorImpl::CyclicInheritance {
                    class: def.name.clone()
                },
                pos
            );
        }
        let Some(info) = self.types[t].info else {
            return Ok(());
        };

        let parent = match &def.extends {
            Some(decl) => {
                let lexical = self.nspcs[info].parent.unwrap_or(self.global());
                self.nspc_stack.push(lexical);
                let resolved = self.resolve_type_decl(decl);
                self.nspc_stack.pop();
                let parent = resolved?;

                if parent == t {
                    return MK_ERROR!(
                        ErrorImpl::CyclicInheritance {
                            class: def.name.clone()
                        },
                        pos
                    );
                }
                if let Some(parent_def) = by_type.get(&parent) {
                    self.declare_class(parent_def, by_type, visiting, done)?;
                }
                if !self.isobj(parent) || self.isnull(parent) || self.types[parent].array_depth() > 0
                {
                    return MK_ERROR!(
                        ErrorImpl::TypeMismatch {
                            expected: String::from("a class"),
                            received: self.type_name(parent),
                        },
                        &decl.span.start
                    );
                }
                parent
            }
            None => self.builtins.object,
        };

        self.types[t].parent = Some(parent);
        self.inherit_layout(t);

        self.class_stack.push(t);
        self.nspc_stack.push(info);
        let result = self.declare_members(def);
        self.nspc_stack.pop();
        self.class_stack.pop();
        result?;

        let obj_size = self.nspcs[info].offset;
        let ty = &mut self.types[t];
        ty.is_complete = true;
        ty.obj_size = obj_size;
        visiting.remove(&t);
        done.insert(t);
        Ok(())
    }

    fn declare_members(&mut self, def: &ClassDef) -> Result<(), Error> {
        for section in &def.body {
            match section {
                Section::Stmt(stmt) => self.preregister_decl(stmt)?,
                Section::Func(func) => self.declare_func(func, self.class_top())?,
                Section::Class(_) => {}
            }
        }
        Ok(())
    }

    /// Registers a top-level or member variable before its declaration is
    /// reached, so function bodies can refer to it.
    fn preregister_decl(&mut self, stmt: &Stmt) -> Result<(), Error> {
        let StmtKind::Expr(expr) = &stmt.kind else {
            return Ok(());
        };
        let Some((decl_expr, decl)) = leading_decl(expr) else {
            return Ok(());
        };
        if is_auto(&decl.ty) {
            return Ok(());
        }

        let t = self.resolve_type_decl(&decl.ty)?;
        self.check_self_containment(decl, t, &decl_expr.span.start)?;
        self.declare_value(decl, t, &decl_expr.span.start, false)?;
        Ok(())
    }

    /// A class cannot hold an instance of itself.
    fn check_self_containment(&self, decl: &VarDecl, t: TypeId, pos: &Position) -> Result<(), Error> {
        if self.func.is_none()
            && self.class_top() == Some(t)
            && !decl.ty.is_ref
            && decl.ty.array_depth == 0
        {
            return MK_ERROR!(
                ErrorImpl::IncompleteType {
                    type_: self.type_name(t)
                },
                pos
            );
        }
        Ok(())
    }

    fn declare_value(
        &mut self,
        decl: &VarDecl,
        t: TypeId,
        pos: &Position,
        checked: bool,
    ) -> Result<ValueId, Error> {
        self.check_reserved(&decl.name, pos)?;
        let nspc = self.nspc_top();
        if self.nspcs[nspc]
            .values
            .lookup(&decl.name, Climb::Current)
            .filter(|v| self.values.contains(*v))
            .is_some()
        {
            return MK_ERROR!(
                ErrorImpl::DuplicateDeclaration {
                    name: decl.name.clone()
                },
                pos
            );
        }
        if self.isvoid(t) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a non-void type"),
                    received: self.type_name(t),
                },
                pos
            );
        }

        let in_class_body = self.func.is_none() && self.class_top().is_some();
        if decl.is_static && !in_class_body {
            return MK_ERROR!(
                ErrorImpl::MisplacedControl {
                    keyword: String::from("static")
                },
                pos
            );
        }

        let mut value = Value::new(&decl.name, t);
        value.is_const = decl.is_const;
        value.access = decl.access;
        value.owner = Some(nspc);
        value.is_decl_checked = checked;
        value.depend_init_where = pos.0;

        if in_class_body {
            value.owner_class = self.class_top();
            let namespace = &mut self.nspcs[nspc];
            if decl.is_static {
                value.is_static = true;
                value.offset = namespace.class_data_size;
                namespace.class_data_size += self.types[t].size;
            } else {
                value.is_member = true;
                value.offset = namespace.offset;
                namespace.offset += self.types[t].size;
            }
        } else {
            value.offset = self.frame_offset;
            self.frame_offset = self.next_offset(self.frame_offset, t);
            value.is_context_top_level = self.is_global() && self.nspcs[nspc].values.depth() == 1;
        }

        let v = self.values.insert(value);
        self.own_value(v);
        self.nspcs[nspc].values.add(&decl.name, v);
        Ok(v)
    }

    fn declare_func(&mut self, def: &Rc<FuncDef>, class: Option<TypeId>) -> Result<(), Error> {
        let pos = &def.span.start;
        self.check_reserved(&def.name, pos)?;
        if def.is_static && class.is_none() {
            return MK_ERROR!(
                ErrorImpl::MisplacedControl {
                    keyword: String::from("static")
                },
                pos
            );
        }

        let ret = self.resolve_type_decl(&def.return_type)?;
        let mut params: Vec<FuncParam> = vec![];
        for param in &def.params {
            self.check_reserved(&param.name, &param.span.start)?;
            if params.iter().any(|other| other.name == param.name) {
                return MK_ERROR!(
                    ErrorImpl::DuplicateDeclaration {
                        name: param.name.clone()
                    },
                    &param.span.start
                );
            }
            let ty = self.resolve_type_decl(&param.ty)?;
            if self.isvoid(ty) {
                return MK_ERROR!(
                    ErrorImpl::TypeMismatch {
                        expected: String::from("a non-void type"),
                        received: self.type_name(ty),
                    },
                    &param.span.start
                );
            }
            params.push(FuncParam {
                name: param.name.clone(),
                ty,
            });
        }

        let where_ = self.nspc_top();
        let mut func = Func::new(&def.name, &def.name, ret).with_def(Rc::clone(def));
        func.params = params;
        func.is_member = class.is_some() && !def.is_static;
        func.is_static = def.is_static;
        func.owner_class = class;
        func.doc = def.doc.clone().unwrap_or_default();
        let f = self.register_func(func, where_, def.access, pos)?;

        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.func_defs.insert(def.id, f);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Pass 2, bodies

    fn check_sections(&mut self, sections: &[Section]) -> Result<(), Error> {
        for section in sections {
            match section {
                Section::Class(def) => self.check_class_body(def)?,
                Section::Func(def) => self.check_func_body(def)?,
                Section::Stmt(stmt) => self.check_stmt(stmt)?,
            }
        }
        Ok(())
    }

    fn check_class_body(&mut self, def: &ClassDef) -> Result<(), Error> {
        let Some(t) = self.class_type_of(def) else {
            return Ok(());
        };
        let Some(info) = self.types[t].info else {
            return Ok(());
        };

        self.class_stack.push(t);
        self.nspc_stack.push(info);
        let result = self.check_sections(&def.body);
        self.nspc_stack.pop();
        self.class_stack.pop();
        result?;

        self.types[t].obj_size = self.nspcs[info].offset;
        Ok(())
    }

    fn check_func_body(&mut self, def: &FuncDef) -> Result<(), Error> {
        let Some(f) = self.func_of(def) else {
            return Ok(());
        };
        let nspc = self.nspc_top();

        let saved = (self.func.replace(f), self.frame_offset, self.loop_depth);
        self.frame_offset = 0;
        self.loop_depth = 0;
        self.nspcs[nspc].push();

        let result = self.check_func_inner(def, f, nspc);

        self.nspcs[nspc].pop();
        (self.func, self.frame_offset, self.loop_depth) = saved;
        result
    }

    fn check_func_inner(
        &mut self,
        def: &FuncDef,
        f: FuncId,
        nspc: NspcId,
    ) -> Result<(), Error> {
        let params = self.funcs[f].params.clone();
        for (param, written) in params.iter().zip(&def.params) {
            let mut value = Value::new(&param.name, param.ty);
            value.owner = Some(nspc);
            value.offset = self.frame_offset;
            value.depend_init_where = written.span.start.0;
            self.frame_offset = self.next_offset(self.frame_offset, param.ty);
            let v = self.values.insert(value);
            self.own_value(v);
            self.nspcs[nspc].values.add(&param.name, v);
        }
        self.check_stmt(&def.body)
    }

    fn check_scoped(&mut self, stmt: &Stmt) -> Result<(), Error> {
        let nspc = self.nspc_top();
        self.nspcs[nspc].push();
        let result = self.check_stmt(stmt);
        self.nspcs[nspc].pop();
        result
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        let pos = &stmt.span.start;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.check_expr(expr)?;
            }
            StmtKind::Block(body) => {
                let nspc = self.nspc_top();
                self.nspcs[nspc].push();
                let result = body.iter().try_for_each(|stmt| self.check_stmt(stmt));
                self.nspcs[nspc].pop();
                result?;
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.check_condition(condition)?;
                self.check_scoped(then_body)?;
                if let Some(else_body) = else_body {
                    self.check_scoped(else_body)?;
                }
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition)?;
                self.loop_depth += 1;
                let result = self.check_scoped(body);
                self.loop_depth -= 1;
                result?;
            }
            StmtKind::Return(value) => self.check_return(value.as_ref(), pos)?,
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return MK_ERROR!(
                        ErrorImpl::MisplacedControl {
                            keyword: keyword.to_string()
                        },
                        pos
                    );
                }
            }
        }
        Ok(())
    }

    fn check_condition(&mut self, condition: &Expr) -> Result<(), Error> {
        let t = self.check_expr(condition)?;
        let usable = self.iskindofint(t)
            || matches!(
                self.prim(t),
                Some(PrimKind::Float | PrimKind::Time | PrimKind::Dur)
            );
        if !usable {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("int"),
                    received: self.type_name(t),
                },
                &condition.span.start
            );
        }
        Ok(())
    }

    fn check_return(&mut self, value: Option<&Expr>, pos: &Position) -> Result<(), Error> {
        let Some(f) = self.func else {
            return MK_ERROR!(
                ErrorImpl::MisplacedControl {
                    keyword: String::from("return")
                },
                pos
            );
        };
        let (ret, name) = (self.funcs[f].ret, self.funcs[f].base_name.clone());

        match value {
            None if !self.isvoid(ret) => MK_ERROR!(
                ErrorImpl::InvalidReturn {
                    message: format!(
                        "'{}' must return a value of type '{}'",
                        name,
                        self.type_name(ret)
                    )
                },
                pos
            ),
            None => Ok(()),
            Some(expr) => {
                let t = self.check_expr(expr)?;
                if self.isvoid(ret) {
                    return MK_ERROR!(
                        ErrorImpl::InvalidReturn {
                            message: format!("'{}' returns void but a value was given", name)
                        },
                        pos
                    );
                }
                if !self.assignable(t, ret) {
                    return MK_ERROR!(
                        ErrorImpl::InvalidReturn {
                            message: format!(
                                "'{}' returns '{}', found '{}'",
                                name,
                                self.type_name(ret),
                                self.type_name(t)
                            )
                        },
                        pos
                    );
                }
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Expressions

    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Result<TypeId, Error> {
        let b = self.builtins;
        let pos = &expr.span.start;
        let t = match &expr.kind {
            ExprKind::Int(_) => b.int,
            ExprKind::Float(_) => b.float,
            ExprKind::Str(_) => b.string,
            ExprKind::Id(name) => self.check_id(expr, name)?,
            ExprKind::Decl(decl) => self.check_decl(expr, decl, None)?,
            ExprKind::Chuck { lhs, rhs } => self.check_chuck(expr, lhs, rhs)?,
            ExprKind::Binary { op, lhs, rhs } => {
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                match self.binary_result(*op, lt, rt) {
                    Some(t) => t,
                    None => return self.no_such_operator(&op.to_string(), lt, rt, pos),
                }
            }
            ExprKind::Unary { op, expr: operand } => self.check_unary(*op, operand, pos)?,
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args)?,
            ExprKind::Member { base, name } => self.check_member(base, name, expr)?,
            ExprKind::New(decl) => self.check_new(decl, pos)?,
            ExprKind::Spork(call) => self.check_spork(call, pos)?,
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.check_condition(condition)?;
                let tt = self.check_expr(then_expr)?;
                let et = self.check_expr(else_expr)?;
                match self.unify(tt, et) {
                    Some(t) => t,
                    None => {
                        return MK_ERROR!(
                            ErrorImpl::TypeMismatch {
                                expected: self.type_name(tt),
                                received: self.type_name(et),
                            },
                            &else_expr.span.start
                        )
                    }
                }
            }
            ExprKind::Array(elements) => self.check_array_literal(elements, pos)?,
            ExprKind::Index { base, index } => {
                let bt = self.check_expr(base)?;
                let it = self.check_expr(index)?;
                let Some(TypeKind::Array { element, depth }) = self.types.get(bt).map(|t| t.kind)
                else {
                    return MK_ERROR!(
                        ErrorImpl::TypeMismatch {
                            expected: String::from("array"),
                            received: self.type_name(bt),
                        },
                        &base.span.start
                    );
                };
                if self.prim(it) != Some(PrimKind::Int) {
                    return MK_ERROR!(
                        ErrorImpl::TypeMismatch {
                            expected: String::from("int"),
                            received: self.type_name(it),
                        },
                        &index.span.start
                    );
                }
                if depth == 1 {
                    element
                } else {
                    let owner = self.nspc_top();
                    self.new_array_type(element, depth - 1, owner)
                }
            }
            ExprKind::Cast { expr: inner, ty } => {
                let from = self.check_expr(inner)?;
                let to = self.resolve_type_decl(ty)?;
                let numeric = |env: &Self, t| {
                    matches!(env.prim(t), Some(PrimKind::Int | PrimKind::Float))
                };
                let allowed = self.equals(from, to)
                    || (numeric(self, from) && numeric(self, to))
                    || (self.isobj(from) && self.isobj(to) && (self.isa(from, to) || self.isa(to, from)));
                if !allowed {
                    return MK_ERROR!(
                        ErrorImpl::TypeMismatch {
                            expected: self.type_name(to),
                            received: self.type_name(from),
                        },
                        pos
                    );
                }
                to
            }
            ExprKind::Print(exprs) => {
                for inner in exprs {
                    self.check_expr(inner)?;
                }
                b.void
            }
        };
        self.annotate_type(expr, t);
        Ok(t)
    }

    fn no_such_operator<T>(&self, op: &str, lhs: TypeId, rhs: TypeId, pos: &Position) -> Result<T, Error> {
        MK_ERROR!(
            ErrorImpl::NoSuchOperator {
                op: op.to_string(),
                lhs: self.type_name(lhs),
                rhs: self.type_name(rhs),
            },
            pos
        )
    }

    fn in_member_func(&self) -> bool {
        self.func
            .and_then(|f| self.funcs.get(f))
            .map(|f| f.is_member)
            .unwrap_or(false)
    }

    fn in_static_func(&self) -> bool {
        self.func
            .and_then(|f| self.funcs.get(f))
            .map(|f| f.is_static)
            .unwrap_or(false)
    }

    fn func_type(&self, f: FuncId) -> TypeId {
        self.funcs
            .get(f)
            .and_then(|func| func.value_ref)
            .and_then(|v| self.values.get(v))
            .map(|value| value.ty)
            .unwrap_or(self.builtins.function)
    }

    fn check_id(&mut self, expr: &Expr, name: &str) -> Result<TypeId, Error> {
        let pos = &expr.span.start;
        if name == "this" {
            if let (Some(class), false) = (self.class_top(), self.in_static_func()) {
                return Ok(class);
            }
            return MK_ERROR!(
                ErrorImpl::UndeclaredIdentifier {
                    name: name.to_string()
                },
                pos
            );
        }

        let stay = self.in_member_func();
        if let Some(v) = self.lookup_value(name, Climb::Outward, stay) {
            self.use_value(v, pos)?;
            self.annotate_value(expr, v);
            return Ok(self.values[v].ty);
        }
        if let Some(f) = self.lookup_func(name, Climb::Outward, false) {
            return Ok(self.func_type(f));
        }
        MK_ERROR!(
            ErrorImpl::UndeclaredIdentifier {
                name: name.to_string()
            },
            pos
        )
    }

    /// Validates a read of `v` and records it in the current dependency
    /// graph.
    fn use_value(&mut self, v: ValueId, pos: &Position) -> Result<(), Error> {
        let value = self.values[v].clone();
        if value.is_member && self.in_static_func() {
            return MK_ERROR!(
                ErrorImpl::AccessViolation {
                    name: value.name,
                    access: String::from("instance"),
                },
                pos
            );
        }
        // Code running in the same region as a later declaration cannot
        // read it yet; function bodies record a dependency instead.
        if !value.is_decl_checked && self.func.is_none() && value.owner == Some(self.nspc_top()) {
            return MK_ERROR!(ErrorImpl::UndeclaredIdentifier { name: value.name }, pos);
        }

        let local = value
            .owner
            .map(|owner| self.current_context_owns(owner))
            .unwrap_or(false);
        if !local {
            return Ok(());
        }
        let dependency = Dependency {
            value: v,
            init_where: value.depend_init_where,
            use_where: pos.0,
            is_member: value.is_member,
        };
        if let Some(f) = self.func {
            if value.is_context_top_level || value.is_member {
                self.funcs[f].depends.add(dependency);
            }
        } else if let Some(class) = self.class_top() {
            if value.is_context_top_level {
                self.types[class].depends.add(dependency);
            }
        }
        Ok(())
    }

    /// Links a call into the current graph, or checks it for forward use
    /// when it runs immediately.
    fn note_call(&mut self, f: FuncId, pos: &Position) -> Result<(), Error> {
        let target = GraphRef::Func(f);
        if let Some(current) = self.func {
            if current != f {
                self.funcs[current].depends.add_remote(target);
            }
            return Ok(());
        }
        if let Some(class) = self.class_top() {
            self.types[class].depends.add_remote(target);
            if self.funcs[f].is_member {
                let name = self.funcs[f].base_name.clone();
                return self.defer_forward_use(target, &name, pos, true);
            }
            return Ok(());
        }
        let name = self.funcs[f].base_name.clone();
        self.defer_forward_use(target, &name, pos, false)
    }

    fn note_instantiation(&mut self, t: TypeId, pos: &Position) -> Result<(), Error> {
        let target = GraphRef::Type(t);
        if let Some(current) = self.func {
            self.funcs[current].depends.add_remote(target);
            return Ok(());
        }
        if let Some(class) = self.class_top() {
            if class != t {
                self.types[class].depends.add_remote(target);
            }
            return Ok(());
        }
        let name = self.type_name(t);
        self.defer_forward_use(target, &name, pos, false)
    }

    fn defer_forward_use(
        &mut self,
        target: GraphRef,
        name: &str,
        pos: &Position,
        is_class_def: bool,
    ) -> Result<(), Error> {
        self.deferred_uses.push(DeferredUse {
            target,
            name: name.to_string(),
            pos: pos.clone(),
            is_class_def,
        });
        Ok(())
    }

    /// Function bodies can follow the code that calls them, so graphs are
    /// only searched once the whole context has been checked.
    fn check_deferred_uses(&mut self) -> Result<(), Error> {
        for deferred in std::mem::take(&mut self.deferred_uses) {
            let Some(dependency) = self.locate(deferred.target, deferred.pos.0, deferred.is_class_def)
            else {
                continue;
            };
            let variable = self
                .values
                .get(dependency.value)
                .map(|value| value.name.clone())
                .unwrap_or_default();
            return MK_ERROR!(
                ErrorImpl::IllegalForwardUse {
                    function: deferred.name,
                    variable,
                },
                deferred.pos
            );
        }
        Ok(())
    }

    /// Declares (or completes the pre-registered declaration of) a variable.
    fn check_decl(
        &mut self,
        expr: &Expr,
        decl: &VarDecl,
        inferred: Option<TypeId>,
    ) -> Result<TypeId, Error> {
        let pos = &expr.span.start;
        let t = match inferred {
            Some(t) => t,
            None if is_auto(&decl.ty) => return self.infer_auto(&decl.name, None, pos),
            None => self.resolve_type_decl(&decl.ty)?,
        };

        let nspc = self.nspc_top();
        let preregistered = self.nspcs[nspc]
            .values
            .lookup(&decl.name, Climb::Current)
            .filter(|v| {
                self.values
                    .get(*v)
                    .map(|value| !value.is_decl_checked && value.depend_init_where == pos.0)
                    .unwrap_or(false)
            });
        let v = match preregistered {
            Some(v) => {
                self.values[v].is_decl_checked = true;
                v
            }
            None => {
                self.check_self_containment(decl, t, pos)?;
                self.declare_value(decl, t, pos, true)?
            }
        };

        let instantiates = inferred.is_none()
            && !decl.ty.is_ref
            && matches!(self.types[t].kind, TypeKind::Object);
        if instantiates {
            if !self.types[t].is_complete {
                return MK_ERROR!(
                    ErrorImpl::IncompleteType {
                        type_: self.type_name(t)
                    },
                    pos
                );
            }
            self.note_instantiation(t, pos)?;
        }

        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.decl_values.insert(expr.id, vec![v]);
        }
        Ok(t)
    }

    fn check_chuck(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<TypeId, Error> {
        let lt = self.check_expr(lhs)?;

        if let ExprKind::Decl(decl) = &rhs.kind {
            if is_auto(&decl.ty) {
                let inferred = self.infer_auto(&decl.name, Some(lt), &rhs.span.start)?;
                let t = self.check_decl(rhs, decl, Some(inferred))?;
                self.annotate_type(rhs, t);
                return Ok(t);
            }
        }

        if let Some((name, candidates, receiver)) = self.callee_candidates(rhs)? {
            return self.resolve_call(expr, &name, &candidates, &[lt], receiver);
        }

        let rt = self.check_expr(rhs)?;
        let is_target = matches!(
            rhs.kind,
            ExprKind::Decl(_) | ExprKind::Id(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        );
        if !is_target {
            return self.no_such_operator("=>", lt, rt, &expr.span.start);
        }
        self.check_mutable(rhs)?;
        if !self.assignable(lt, rt) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: self.type_name(rt),
                    received: self.type_name(lt),
                },
                &expr.span.start
            );
        }
        Ok(rt)
    }

    fn check_mutable(&self, target: &Expr) -> Result<(), Error> {
        let value = self
            .context
            .and_then(|c| self.contexts.get(c))
            .and_then(|c| c.annotations.value_refs.get(&target.id).copied())
            .and_then(|v| self.values.get(v));
        match value {
            Some(value) if value.is_const => MK_ERROR!(
                ErrorImpl::ConstAssignment {
                    name: value.name.clone()
                },
                &target.span.start
            ),
            _ => Ok(()),
        }
    }

    /// A base expression naming a class rather than a value.
    fn static_base(&self, base: &Expr) -> Option<TypeId> {
        let ExprKind::Id(name) = &base.kind else {
            return None;
        };
        if self
            .lookup_value(name, Climb::Outward, self.in_member_func())
            .is_some()
        {
            return None;
        }
        self.lookup_type(name, Climb::Outward, false)
    }

    /// Every overload `type.name` could mean, nearest class first.
    fn method_candidates(&self, t: TypeId, name: &str) -> Vec<FuncId> {
        self.ancestry(t)
            .into_iter()
            .filter_map(|class| {
                let info = self.types.get(class)?.info?;
                Some(self.nspcs.get(info)?.funcs.lookup(name, Climb::Global))
            })
            .flat_map(|head| self.overload_chain(head))
            .collect()
    }

    /// Functions a callee expression can refer to. `None` when the callee
    /// is not a function name.
    fn callee_candidates(&mut self, callee: &Expr) -> Result<Option<Callee>, Error> {
        match &callee.kind {
            ExprKind::Id(name) => {
                if self
                    .lookup_value(name, Climb::Outward, self.in_member_func())
                    .is_some()
                {
                    return Ok(None);
                }
                let Some(head) = self.lookup_func(name, Climb::Outward, false) else {
                    return Ok(None);
                };
                let candidates = match self.funcs[head].owner_class {
                    Some(class) => self.method_candidates(class, name),
                    None => self.overload_chain(Some(head)),
                };
                let t = self.func_type(head);
                self.annotate_type(callee, t);
                Ok(Some((name.clone(), candidates, Receiver::Implicit)))
            }
            ExprKind::Member { base, name } => {
                let (owner, receiver) = match self.static_base(base) {
                    Some(class) => {
                        self.annotate_type(base, class);
                        (class, Receiver::Static)
                    }
                    None => (self.check_expr(base)?, Receiver::Instance),
                };
                let candidates = self.method_candidates(owner, name);
                let Some(first) = candidates.first().copied() else {
                    return Ok(None);
                };
                let t = self.func_type(first);
                self.annotate_type(callee, t);
                Ok(Some((name.clone(), candidates, receiver)))
            }
            _ => Ok(None),
        }
    }

    fn match_overload(&self, candidates: &[FuncId], args: &[TypeId]) -> Option<FuncId> {
        let params_of = |f: FuncId| self.funcs[f].param_types();
        candidates
            .iter()
            .copied()
            .find(|f| self.same_params(&params_of(*f), args))
            .or_else(|| {
                candidates.iter().copied().find(|f| {
                    let params = params_of(*f);
                    params.len() == args.len()
                        && args.iter().zip(&params).all(|(a, p)| self.assignable(*a, *p))
                })
            })
    }

    fn resolve_call(
        &mut self,
        call: &Expr,
        name: &str,
        candidates: &[FuncId],
        args: &[TypeId],
        receiver: Receiver,
    ) -> Result<TypeId, Error> {
        let pos = &call.span.start;
        let Some(f) = self.match_overload(candidates, args) else {
            let arguments: Vec<String> = args.iter().map(|a| self.type_name(*a)).collect();
            return MK_ERROR!(
                ErrorImpl::NoMatchingOverload {
                    name: name.to_string(),
                    arguments: arguments.join(", "),
                },
                pos
            );
        };

        let (is_member, access, owner_class, ret) = {
            let func = &self.funcs[f];
            let access = func
                .value_ref
                .and_then(|v| self.values.get(v))
                .map(|value| value.access)
                .unwrap_or_default();
            (func.is_member, access, func.owner_class, func.ret)
        };
        let no_instance = match receiver {
            Receiver::Static => true,
            Receiver::Instance => false,
            Receiver::Implicit => {
                self.in_static_func() || (self.func.is_none() && self.class_top().is_none())
            }
        };
        if is_member && no_instance {
            return MK_ERROR!(
                ErrorImpl::AccessViolation {
                    name: name.to_string(),
                    access: String::from("instance"),
                },
                pos
            );
        }
        if let Some(owner) = owner_class {
            self.check_access(access, owner, name, pos)?;
        }

        if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.annotations.call_targets.insert(call.id, f);
        }
        self.note_call(f, pos)?;
        Ok(ret)
    }

    fn check_access(
        &self,
        access: crate::ast::ast::Access,
        owner: TypeId,
        name: &str,
        pos: &Position,
    ) -> Result<(), Error> {
        use crate::ast::ast::Access;
        let allowed = match access {
            Access::Public => true,
            Access::Private => self.class_stack.contains(&owner),
            Access::Protected => self
                .class_stack
                .iter()
                .any(|class| self.isa(*class, owner)),
        };
        if allowed {
            return Ok(());
        }
        MK_ERROR!(
            ErrorImpl::AccessViolation {
                name: name.to_string(),
                access: access.to_string(),
            },
            pos
        )
    }

    fn check_call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> Result<TypeId, Error> {
        let mut arg_types = vec![];
        for arg in args {
            arg_types.push(self.check_expr(arg)?);
        }

        if let Some((name, candidates, receiver)) = self.callee_candidates(callee)? {
            return self.resolve_call(call, &name, &candidates, &arg_types, receiver);
        }

        let t = self.check_expr(callee)?;
        match self.types[t].func() {
            Some(f) => {
                let name = self.funcs[f].base_name.clone();
                let candidates = self.overload_chain(Some(f));
                self.resolve_call(call, &name, &candidates, &arg_types, Receiver::Implicit)
            }
            None => MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("function"),
                    received: self.type_name(t),
                },
                &callee.span.start
            ),
        }
    }

    fn check_member(&mut self, base: &Expr, name: &str, expr: &Expr) -> Result<TypeId, Error> {
        let pos = &expr.span.start;
        let (owner, static_only) = match self.static_base(base) {
            Some(class) => {
                self.annotate_type(base, class);
                (class, true)
            }
            None => (self.check_expr(base)?, false),
        };

        if let Some(v) = self.find_value_in_type(owner, name) {
            let value = self.values[v].clone();
            if static_only && value.is_member {
                return MK_ERROR!(
                    ErrorImpl::AccessViolation {
                        name: name.to_string(),
                        access: String::from("instance"),
                    },
                    pos
                );
            }
            if let Some(class) = value.owner_class {
                self.check_access(value.access, class, name, pos)?;
            }
            self.annotate_value(expr, v);
            return Ok(value.ty);
        }
        if let Some(f) = self.find_func_in_type(owner, name) {
            return Ok(self.func_type(f));
        }
        MK_ERROR!(
            ErrorImpl::UndeclaredIdentifier {
                name: format!("{}.{}", self.type_name(owner), name)
            },
            pos
        )
    }

    fn check_new(&mut self, decl: &TypeDecl, pos: &Position) -> Result<TypeId, Error> {
        let t = self.resolve_type_decl(decl)?;
        if decl.array_depth > 0 || !matches!(self.types[t].kind, TypeKind::Object) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a class"),
                    received: self.type_name(t),
                },
                pos
            );
        }
        if !self.types[t].is_complete {
            return MK_ERROR!(
                ErrorImpl::IncompleteType {
                    type_: self.type_name(t)
                },
                pos
            );
        }
        self.note_instantiation(t, pos)?;
        Ok(t)
    }

    fn check_spork(&mut self, call: &Expr, pos: &Position) -> Result<TypeId, Error> {
        if !matches!(call.kind, ExprKind::Call { .. }) {
            return MK_ERROR!(
                ErrorImpl::SporkRestriction {
                    message: String::from("only function calls can be sporked")
                },
                pos
            );
        }
        if self.sporking {
            return MK_ERROR!(
                ErrorImpl::SporkRestriction {
                    message: String::from("a spork cannot be nested inside another spork")
                },
                pos
            );
        }

        self.sporking = true;
        let result = self.check_expr(call);
        self.sporking = false;
        result?;
        Ok(self.builtins.shred)
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, pos: &Position) -> Result<TypeId, Error> {
        let t = self.check_expr(operand)?;
        let prim = self.prim(t);
        let result = match op {
            UnaryOp::Neg => prim.map(|_| t),
            UnaryOp::Not => (self.iskindofint(t) || prim == Some(PrimKind::Float))
                .then_some(self.builtins.int),
            UnaryOp::Inc | UnaryOp::Dec => {
                if !matches!(operand.kind, ExprKind::Id(_) | ExprKind::Member { .. } | ExprKind::Index { .. }) {
                    None
                } else {
                    self.check_mutable(operand)?;
                    matches!(prim, Some(PrimKind::Int | PrimKind::Float)).then_some(t)
                }
            }
        };
        match result {
            Some(t) => Ok(t),
            None => MK_ERROR!(
                ErrorImpl::NoSuchOperator {
                    op: op.to_string(),
                    lhs: String::new(),
                    rhs: self.type_name(t),
                },
                pos
            ),
        }
    }

    /// Common type of two branches or array elements.
    fn unify(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if self.equals(a, b) {
            return Some(a);
        }
        let numeric = |t| matches!(self.prim(t), Some(PrimKind::Int | PrimKind::Float));
        if numeric(a) && numeric(b) {
            return Some(self.builtins.float);
        }
        if self.isobj(a) && self.isobj(b) {
            return self.find_common_anc(a, b);
        }
        None
    }

    fn check_array_literal(&mut self, elements: &[Expr], pos: &Position) -> Result<TypeId, Error> {
        let mut common: Option<TypeId> = None;
        for element in elements {
            let t = self.check_expr(element)?;
            common = match common {
                None => Some(t),
                Some(previous) => match self.unify(previous, t) {
                    Some(unified) => Some(unified),
                    None => {
                        return MK_ERROR!(
                            ErrorImpl::TypeMismatch {
                                expected: self.type_name(previous),
                                received: self.type_name(t),
                            },
                            &element.span.start
                        )
                    }
                },
            };
        }

        let Some(element) = common else {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a non-empty array"),
                    received: String::from("[]"),
                },
                pos
            );
        };
        if self.isnull(element) || self.isvoid(element) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a concrete element type"),
                    received: self.type_name(element),
                },
                pos
            );
        }
        let owner = self.nspc_top();
        Ok(self.new_array_type(element, 1, owner))
    }

    fn binary_result(&self, op: BinaryOp, lhs: TypeId, rhs: TypeId) -> Option<TypeId> {
        use PrimKind::*;
        let b = self.builtins;
        let (l, r) = (self.prim(lhs), self.prim(rhs));
        let is_string = |t| self.equals(t, b.string);

        if op.is_logical() || op.is_bitwise() {
            return (self.iskindofint(lhs) && self.iskindofint(rhs)).then_some(b.int);
        }

        if op.is_comparison() {
            let comparable = match (l, r) {
                (Some(Int | Float), Some(Int | Float)) => true,
                (Some(a), Some(c)) if a == c => {
                    matches!(a, Time | Dur) || matches!(op, BinaryOp::Eq | BinaryOp::Neq)
                }
                _ if is_string(lhs) && is_string(rhs) => true,
                _ => {
                    matches!(op, BinaryOp::Eq | BinaryOp::Neq)
                        && self.isobj(lhs)
                        && self.isobj(rhs)
                        && (self.isa(lhs, rhs) || self.isa(rhs, lhs))
                }
            };
            return comparable.then_some(b.int);
        }

        match (op, l, r) {
            (_, Some(Int), Some(Int)) => Some(b.int),
            (_, Some(Int | Float), Some(Int | Float)) => Some(b.float),
            (BinaryOp::Add, Some(Time), Some(Dur))
            | (BinaryOp::Add, Some(Dur), Some(Time))
            | (BinaryOp::Sub, Some(Time), Some(Dur)) => Some(b.time),
            (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mod, Some(Dur), Some(Dur))
            | (BinaryOp::Sub, Some(Time), Some(Time)) => Some(b.dur),
            (BinaryOp::Mul | BinaryOp::Div, Some(Dur), Some(Int | Float))
            | (BinaryOp::Mul, Some(Int | Float), Some(Dur)) => Some(b.dur),
            (BinaryOp::Div, Some(Dur | Time), Some(Dur)) => Some(b.float),
            (
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div,
                Some(a @ (Complex | Polar | Vec3 | Vec4)),
                Some(c),
            ) if a == c => Some(lhs),
            (BinaryOp::Mul, Some(Vec3 | Vec4), Some(Int | Float)) => Some(lhs),
            (BinaryOp::Mul, Some(Int | Float), Some(Vec3 | Vec4)) => Some(rhs),
            (BinaryOp::Add, _, _) => {
                let printable = |t| {
                    is_string(t) || matches!(self.prim(t), Some(Int | Float))
                };
                ((is_string(lhs) && printable(rhs)) || (is_string(rhs) && printable(lhs)))
                    .then_some(b.string)
            }
            _ => None,
        }
    }
}
