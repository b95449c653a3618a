//! Namespaces: three parallel scoped tables plus class layout data.

use tracing::debug;

use super::{
    scope::Scope,
    symbols::{FuncId, NativeHook, ValueId},
    types::TypeId,
};

crate::MK_HANDLE!(
    /// Handle to a [`Namespace`] record.
    NspcId
);

#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    pub types: Scope<TypeId>,
    pub values: Scope<ValueId>,
    pub funcs: Scope<FuncId>,
    /// Virtual table: slot index to implementing function.
    pub vtable: Vec<FuncId>,
    /// Size of the static data segment.
    pub class_data_size: usize,
    pub pre_ctor: Option<NativeHook>,
    pub dtor: Option<NativeHook>,
    /// Enclosing lexical namespace, not the parent class.
    pub parent: Option<NspcId>,
    /// Next free instance offset when describing a class layout.
    pub offset: usize,
    /// The class this namespace describes, if any.
    pub class_type: Option<TypeId>,
}

impl Namespace {
    pub fn new(name: &str, parent: Option<NspcId>) -> Self {
        Namespace {
            name: name.to_string(),
            types: Scope::new(),
            values: Scope::new(),
            funcs: Scope::new(),
            vtable: vec![],
            class_data_size: 0,
            pre_ctor: None,
            dtor: None,
            parent,
            offset: 0,
            class_type: None,
        }
    }

    pub fn is_class(&self) -> bool {
        self.class_type.is_some()
    }

    pub fn push(&mut self) {
        self.types.push();
        self.values.push();
        self.funcs.push();
    }

    pub fn pop(&mut self) {
        self.types.pop();
        self.values.pop();
        self.funcs.pop();
    }

    pub fn commit(&mut self) {
        if self.types.has_pending() || self.values.has_pending() || self.funcs.has_pending() {
            debug!(namespace = %self.name, "committing namespace");
        }
        self.types.commit();
        self.values.commit();
        self.funcs.commit();
    }

    /// Drops pending additions. The symbols themselves are released
    /// through the owning context or import.
    pub fn rollback(&mut self) {
        let types = self.types.rollback().len();
        let values = self.values.rollback().len();
        let funcs = self.funcs.rollback().len();
        if types + values + funcs > 0 {
            debug!(namespace = %self.name, types, values, funcs, "rolled back namespace");
        }
    }

    pub fn get_types(&self) -> Vec<TypeId> {
        self.types.get_top_level(false)
    }

    pub fn get_values(&self) -> Vec<ValueId> {
        self.values.get_top_level(false)
    }

    pub fn get_funcs(&self, include_mangled: bool) -> Vec<FuncId> {
        self.funcs.get_top_level(include_mangled)
    }
}
