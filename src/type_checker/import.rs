//! Registration API for native extensions.
//!
//! A class is imported in one sequence: `import_class_begin` (or one of the
//! signal-generator variants), any number of member variables, static
//! variables and functions, then `import_class_end`. The class becomes
//! visible only at the end. Any failing call aborts the whole import and
//! releases everything it created.

use tracing::{debug, info, warn};

use crate::{
    ast::ast::Access,
    errors::errors::{Error, ErrorImpl},
    Position, MK_ERROR,
};

use super::{
    env::{is_identifier, parse_type_str, Environment},
    namespace::NspcId,
    scope::Climb,
    symbols::{Func, FuncId, FuncParam, NativeHook, Value, ValueId},
    types::{Origin, Type, TypeId, TypeKind, UGenInfo},
};

/// Bookkeeping for the class currently being imported.
#[derive(Debug)]
pub(crate) struct ImportFrame {
    pub(crate) class: TypeId,
    pub(crate) nspc: NspcId,
    pub(crate) where_: NspcId,
    /// Members are being added to an existing built-in class.
    pub(crate) reopened: bool,
    pub(crate) created_types: Vec<TypeId>,
    pub(crate) created_values: Vec<ValueId>,
    pub(crate) created_funcs: Vec<FuncId>,
    pub(crate) created_nspcs: Vec<NspcId>,
    /// Layout at begin, restored when a reopened class import aborts.
    pub(crate) start_layout: (usize, usize),
}

/// A function description handed over by an extension.
#[derive(Debug, Clone)]
pub struct ImportedFunc {
    pub ret: String,
    pub name: String,
    pub params: Vec<(String, String)>,
    pub code: NativeHook,
    pub doc: String,
}

impl ImportedFunc {
    pub fn new(ret: &str, name: &str, code: NativeHook) -> Self {
        ImportedFunc {
            ret: ret.to_string(),
            name: name.to_string(),
            params: vec![],
            code,
            doc: String::new(),
        }
    }

    pub fn arg(mut self, ty: &str, name: &str) -> Self {
        self.params.push((ty.to_string(), name.to_string()));
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }
}

fn contract<T>(message: impl Into<String>) -> Result<T, Error> {
    MK_ERROR!(
        ErrorImpl::ImportContractViolation {
            message: message.into()
        },
        Position::null()
    )
}

impl Environment {
    /// Runs one builder step; on failure the in-progress import is aborted.
    fn import_step<T>(
        &mut self,
        step: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let result = step(self);
        if let Err(err) = &result {
            self.diagnostics.report(err.clone());
            self.import_abort();
        }
        result
    }

    fn frame(&self) -> Result<&ImportFrame, Error> {
        match self.import.as_ref() {
            Some(frame) => Ok(frame),
            None => contract("no class import in progress"),
        }
    }

    fn check_import_name(&self, name: &str) -> Result<(), Error> {
        if !is_identifier(name) {
            return contract(format!("'{}' is not a valid identifier", name));
        }
        self.check_reserved(name, &Position::null())
    }

    fn import_type(&mut self, text: &str) -> Result<TypeId, Error> {
        let Some((path, depth)) = parse_type_str(text) else {
            return contract(format!("'{}' is not a valid type", text));
        };
        self.resolve_type_path(&path, depth, &Position::null())
    }

    pub fn import_class_begin(
        &mut self,
        name: &str,
        parent: &str,
        where_: NspcId,
        pre_ctor: Option<NativeHook>,
        dtor: Option<NativeHook>,
        doc: &str,
    ) -> Result<TypeId, Error> {
        self.import_step(|env| env.begin_class(name, parent, where_, pre_ctor, dtor, doc, None))
    }

    /// Begins a signal generator; `parent` must be `UGen` or derive from it.
    #[allow(clippy::too_many_arguments)]
    pub fn import_ugen_begin(
        &mut self,
        name: &str,
        parent: &str,
        where_: NspcId,
        pre_ctor: Option<NativeHook>,
        dtor: Option<NativeHook>,
        info: UGenInfo,
        doc: &str,
    ) -> Result<TypeId, Error> {
        let required = self.builtins.ugen;
        self.import_step(|env| {
            env.begin_class(name, parent, where_, pre_ctor, dtor, doc, Some((info, required)))
        })
    }

    /// Begins a signal analyzer; `parent` must be `UAna` or derive from it.
    #[allow(clippy::too_many_arguments)]
    pub fn import_uana_begin(
        &mut self,
        name: &str,
        parent: &str,
        where_: NspcId,
        pre_ctor: Option<NativeHook>,
        dtor: Option<NativeHook>,
        info: UGenInfo,
        doc: &str,
    ) -> Result<TypeId, Error> {
        let required = self.builtins.uana;
        self.import_step(|env| {
            env.begin_class(name, parent, where_, pre_ctor, dtor, doc, Some((info, required)))
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn begin_class(
        &mut self,
        name: &str,
        parent: &str,
        where_: NspcId,
        pre_ctor: Option<NativeHook>,
        dtor: Option<NativeHook>,
        doc: &str,
        ugen: Option<(UGenInfo, TypeId)>,
    ) -> Result<TypeId, Error> {
        if let Some(frame) = &self.import {
            return contract(format!(
                "cannot begin '{}' while '{}' is still being imported",
                name, self.types[frame.class].base_name
            ));
        }
        if self.context.is_some() {
            return contract(format!("cannot import '{}' while a context is loaded", name));
        }
        if !self.nspcs.contains(where_) {
            return contract(format!("target namespace for '{}' does not exist", name));
        }
        self.check_import_name(name)?;
        if self
            .lookup_type_from(where_, name, Climb::Outward, false)
            .is_some()
        {
            return MK_ERROR!(
                ErrorImpl::DuplicateDeclaration {
                    name: name.to_string()
                },
                Position::null()
            );
        }

        let parent = self.import_type(parent)?;
        if !self.isobj(parent) || self.types[parent].array_depth() > 0 || parent == self.builtins.null {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a class"),
                    received: self.type_name(parent),
                },
                Position::null()
            );
        }
        if let Some((_, required)) = ugen {
            if !self.isa(parent, required) {
                return MK_ERROR!(
                    ErrorImpl::TypeMismatch {
                        expected: self.type_name(required),
                        received: self.type_name(parent),
                    },
                    Position::null()
                );
            }
        }

        let mut ty = Type::new(TypeKind::Object, name, Some(parent), super::types::sizes::REF);
        ty.owner = Some(where_);
        ty.origin = Origin::NativeExtension;
        ty.is_complete = false;
        ty.has_constructor = pre_ctor.is_some();
        ty.has_destructor = dtor.is_some();
        ty.doc = doc.to_string();
        ty.ugen_info = ugen.map(|(info, _)| info);
        let class = self.types.insert(ty);

        self.import = Some(ImportFrame {
            class,
            nspc: where_,
            where_,
            reopened: false,
            created_types: vec![class],
            created_values: vec![],
            created_funcs: vec![],
            created_nspcs: vec![],
            start_layout: (0, 0),
        });

        let nspc = self.new_class_nspc(class, Some(where_));
        self.inherit_layout(class);
        self.nspcs[nspc].pre_ctor = pre_ctor;
        self.nspcs[nspc].dtor = dtor;
        if let Some(frame) = self.import.as_mut() {
            frame.nspc = nspc;
        }
        self.class_stack.push(class);
        self.nspc_stack.push(nspc);
        debug!(class = name, "import begun");
        Ok(class)
    }

    /// Starts adding members to an existing built-in class.
    pub(crate) fn import_class_reopen(&mut self, class: TypeId) -> Result<(), Error> {
        if self.import.is_some() || self.context.is_some() {
            return contract("cannot reopen a class while another import or context is active");
        }
        let Some(nspc) = self.types.get(class).and_then(|t| t.info) else {
            return contract("class has no member namespace");
        };
        let where_ = self.types[class].owner.unwrap_or(self.global());
        let start_layout = (self.nspcs[nspc].offset, self.nspcs[nspc].class_data_size);
        self.import = Some(ImportFrame {
            class,
            nspc,
            where_,
            reopened: true,
            created_types: vec![],
            created_values: vec![],
            created_funcs: vec![],
            created_nspcs: vec![],
            start_layout,
        });
        self.class_stack.push(class);
        self.nspc_stack.push(nspc);
        Ok(())
    }

    /// Adds an instance variable and returns its offset in the instance.
    pub fn import_mvar(
        &mut self,
        ty: &str,
        name: &str,
        is_const: bool,
        doc: &str,
    ) -> Result<usize, Error> {
        self.import_step(|env| {
            let v = env.import_var(ty, name, is_const, None, doc)?;
            Ok(env.values[v].offset)
        })
    }

    /// Adds a static variable stored at a native address.
    pub fn import_svar(
        &mut self,
        ty: &str,
        name: &str,
        is_const: bool,
        addr: NativeHook,
        doc: &str,
    ) -> Result<ValueId, Error> {
        self.import_step(|env| env.import_var(ty, name, is_const, Some(addr), doc))
    }

    fn import_var(
        &mut self,
        ty: &str,
        name: &str,
        is_const: bool,
        addr: Option<NativeHook>,
        doc: &str,
    ) -> Result<ValueId, Error> {
        let (class, nspc) = {
            let frame = self.frame()?;
            (frame.class, frame.nspc)
        };
        self.check_import_name(name)?;
        if self.nspcs[nspc].values.lookup(name, Climb::Current).is_some()
            || self.nspcs[nspc].funcs.lookup(name, Climb::Current).is_some()
        {
            return MK_ERROR!(
                ErrorImpl::DuplicateDeclaration {
                    name: name.to_string()
                },
                Position::null()
            );
        }

        let t = self.import_type(ty)?;
        if self.isvoid(t) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a non-void type"),
                    received: self.type_name(t),
                },
                Position::null()
            );
        }

        let mut value = Value::new(name, t);
        value.is_const = is_const;
        value.owner = Some(nspc);
        value.owner_class = Some(class);
        value.access = Access::Public;
        value.doc = doc.to_string();
        value.addr = addr;
        let namespace = &mut self.nspcs[nspc];
        if addr.is_some() {
            value.is_static = true;
            value.offset = namespace.class_data_size;
            namespace.class_data_size += self.types[t].size;
        } else {
            value.is_member = true;
            value.offset = namespace.offset;
            namespace.offset = namespace.offset + self.types[t].size;
        }

        let v = self.values.insert(value);
        self.own_value(v);
        self.nspcs[nspc].values.add(name, v);
        Ok(v)
    }

    /// Adds a member function.
    pub fn import_mfun(&mut self, func: ImportedFunc) -> Result<FuncId, Error> {
        self.import_step(|env| env.import_func(func, false))
    }

    /// Adds a static function.
    pub fn import_sfun(&mut self, func: ImportedFunc) -> Result<FuncId, Error> {
        self.import_step(|env| env.import_func(func, true))
    }

    fn import_func(&mut self, imported: ImportedFunc, is_static: bool) -> Result<FuncId, Error> {
        let (class, nspc) = {
            let frame = self.frame()?;
            (frame.class, frame.nspc)
        };
        self.check_import_name(&imported.name)?;

        let ret = self.import_type(&imported.ret)?;
        let mut params = vec![];
        for (ty, name) in &imported.params {
            self.check_import_name(name)?;
            if params.iter().any(|param: &FuncParam| &param.name == name) {
                return MK_ERROR!(
                    ErrorImpl::DuplicateDeclaration { name: name.clone() },
                    Position::null()
                );
            }
            let ty = self.import_type(ty)?;
            if self.isvoid(ty) {
                return MK_ERROR!(
                    ErrorImpl::TypeMismatch {
                        expected: String::from("a non-void type"),
                        received: self.type_name(ty),
                    },
                    Position::null()
                );
            }
            params.push(FuncParam {
                name: name.clone(),
                ty,
            });
        }

        let mut func = Func::new(&imported.name, &imported.name, ret);
        func.params = params;
        func.code = Some(imported.code);
        func.is_member = !is_static;
        func.is_static = is_static;
        func.owner_class = Some(class);
        func.doc = imported.doc;
        self.register_func(func, nspc, Access::Public, &Position::null())
    }

    pub fn import_add_ex(&mut self, example: &str) -> Result<(), Error> {
        self.import_step(|env| {
            let class = env.frame()?.class;
            env.types[class].examples.push(example.to_string());
            Ok(())
        })
    }

    /// Finishes the class and makes it visible in its target namespace.
    pub fn import_class_end(&mut self) -> Result<TypeId, Error> {
        let Some(frame) = self.import.take() else {
            return self.import_step(|_| contract("import_class_end without a matching begin"));
        };

        self.class_stack.pop();
        self.nspc_stack.pop();
        let class = frame.class;
        let name = self.types[class].base_name.clone();

        self.nspcs[frame.nspc].commit();
        let obj_size = self.nspcs[frame.nspc].offset;
        let ty = &mut self.types[class];
        ty.obj_size = obj_size;
        ty.is_complete = true;

        if !frame.reopened {
            let where_ = &mut self.nspcs[frame.where_];
            where_.types.add(&name, class);
            where_.commit();
            info!(class = %name, "imported class");
        }
        Ok(class)
    }

    /// Drops the in-progress import, if any, releasing everything it created.
    pub fn import_abort(&mut self) {
        let Some(frame) = self.import.take() else {
            return;
        };
        self.class_stack.pop();
        self.nspc_stack.pop();

        if let Some(nspc) = self.nspcs.get_mut(frame.nspc) {
            nspc.rollback();
        }
        for f in &frame.created_funcs {
            self.funcs.remove(*f);
        }
        for v in &frame.created_values {
            self.values.remove(*v);
        }
        for t in &frame.created_types {
            self.types.remove(*t);
        }
        for n in &frame.created_nspcs {
            self.nspcs.remove(*n);
        }
        if frame.reopened {
            let funcs = &self.funcs;
            if let Some(nspc) = self.nspcs.get_mut(frame.nspc) {
                nspc.vtable.retain(|f| funcs.contains(*f));
                (nspc.offset, nspc.class_data_size) = frame.start_layout;
            }
        }
        warn!(class = ?frame.class, "import aborted");
    }
}
