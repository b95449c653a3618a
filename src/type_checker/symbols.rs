use std::rc::Rc;

use crate::ast::ast::{Access, FuncDef};

use super::{
    arena::Arena,
    depends::DependencyGraph,
    namespace::NspcId,
    types::{Type, TypeId},
};

crate::MK_HANDLE!(
    /// Handle to a [`Value`] record.
    ValueId
);

crate::MK_HANDLE!(
    /// Handle to a [`Func`] record.
    FuncId
);

/// A callback or address supplied by a native extension. Stored, never
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHook(pub usize);

/// A named storage location.
#[derive(Debug, Clone)]
pub struct Value {
    pub ty: TypeId,
    pub name: String,
    pub offset: usize,
    pub addr: Option<NativeHook>,
    pub is_const: bool,
    pub is_member: bool,
    pub is_static: bool,
    pub is_context_top_level: bool,
    /// False while a pre-registered declaration has not been reached.
    pub is_decl_checked: bool,
    pub access: Access,
    pub owner: Option<NspcId>,
    pub owner_class: Option<TypeId>,
    pub func_ref: Option<FuncId>,
    pub func_num_overloads: usize,
    /// Position from which the value counts as initialized.
    pub depend_init_where: u32,
    pub doc: String,
}

impl Value {
    pub fn new(name: &str, ty: TypeId) -> Self {
        Value {
            ty,
            name: name.to_string(),
            offset: 0,
            addr: None,
            is_const: false,
            is_member: false,
            is_static: false,
            is_context_top_level: false,
            is_decl_checked: true,
            access: Access::Public,
            owner: None,
            owner_class: None,
            func_ref: None,
            func_num_overloads: 0,
            depend_init_where: 0,
            doc: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncParam {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct Func {
    /// Mangled name: `base@overload@owner`.
    pub name: String,
    pub base_name: String,
    pub params: Vec<FuncParam>,
    pub ret: TypeId,
    pub code: Option<NativeHook>,
    pub is_member: bool,
    pub is_static: bool,
    pub vt_index: Option<usize>,
    pub value_ref: Option<ValueId>,
    /// Next overload sharing `base_name` in the same namespace.
    pub next: Option<FuncId>,
    /// The parent-class value this function overrides.
    pub up: Option<ValueId>,
    pub owner_class: Option<TypeId>,
    pub depends: DependencyGraph,
    pub doc: String,
    ast: Option<Rc<FuncDef>>,
}

impl Func {
    pub fn new(name: &str, base_name: &str, ret: TypeId) -> Self {
        Func {
            name: name.to_string(),
            base_name: base_name.to_string(),
            params: vec![],
            ret,
            code: None,
            is_member: false,
            is_static: false,
            vt_index: None,
            value_ref: None,
            next: None,
            up: None,
            owner_class: None,
            depends: DependencyGraph::new(),
            doc: String::new(),
            ast: None,
        }
    }

    pub fn with_def(mut self, def: Rc<FuncDef>) -> Self {
        self.ast = Some(def);
        self
    }

    /// The definition this function was checked from, until decoupled.
    pub fn def(&self) -> Option<&Rc<FuncDef>> {
        self.ast.as_ref()
    }

    pub fn funcdef_decouple_ast(&mut self) {
        self.ast = None;
    }

    pub fn param_types(&self) -> Vec<TypeId> {
        self.params.iter().map(|param| param.ty).collect()
    }

    /// Human-readable signature, e.g. `fun void Foo.bar( int a, float b[] )`.
    pub fn signature(
        &self,
        types: &Arena<TypeId, Type>,
        include_fun_keyword: bool,
        include_return: bool,
    ) -> String {
        let name_of = |t: TypeId| {
            types
                .get(t)
                .map(|ty| ty.name().to_string())
                .unwrap_or_else(|| String::from("<released>"))
        };

        let mut out = String::new();
        if include_fun_keyword {
            out.push_str("fun ");
        }
        if include_return {
            out.push_str(&name_of(self.ret));
            out.push(' ');
        }
        if let Some(owner) = self.owner_class {
            out.push_str(&name_of(owner));
            out.push('.');
        }
        out.push_str(&self.base_name);
        out.push('(');

        let params: Vec<String> = self
            .params
            .iter()
            .map(|param| match types.get(param.ty) {
                Some(ty) => match ty.array_element() {
                    Some(element) => format!(
                        "{} {}{}",
                        name_of(element),
                        param.name,
                        "[]".repeat(ty.array_depth() as usize)
                    ),
                    None => format!("{} {}", ty.name(), param.name),
                },
                None => format!("<released> {}", param.name),
            })
            .collect();
        if !params.is_empty() {
            out.push(' ');
            out.push_str(&params.join(", "));
            out.push(' ');
        }
        out.push(')');
        out
    }
}
