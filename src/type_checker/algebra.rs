//! Type algebra: equality, subtyping, common ancestors, array types and
//! the categorical predicates the checker and code generator rely on.

use crate::{
    errors::errors::{Error, ErrorImpl},
    Position, MK_ERROR,
};

use super::{
    env::Environment,
    namespace::NspcId,
    types::{Kind, Origin, PrimKind, Type, TypeId, TypeKind},
};

impl Environment {
    pub fn type_name(&self, t: TypeId) -> String {
        self.types
            .get(t)
            .map(|ty| ty.name().to_string())
            .unwrap_or_else(|| String::from("<released>"))
    }

    fn kind_of(&self, t: TypeId) -> Option<TypeKind> {
        self.types.get(t).map(|ty| ty.kind)
    }

    pub(crate) fn prim(&self, t: TypeId) -> Option<PrimKind> {
        match self.kind_of(t)? {
            TypeKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Identity by declaration; arrays compare element and depth.
    pub fn equals(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.kind_of(a), self.kind_of(b)) {
            (
                Some(TypeKind::Array {
                    element: ea,
                    depth: da,
                }),
                Some(TypeKind::Array {
                    element: eb,
                    depth: db,
                }),
            ) => da == db && self.equals(ea, eb),
            _ => false,
        }
    }

    /// `a` is `b` or derives from it.
    pub fn isa(&self, a: TypeId, b: TypeId) -> bool {
        if self.equals(a, b) {
            return true;
        }
        match (self.kind_of(a), self.kind_of(b)) {
            (Some(TypeKind::Null), _) => self.isobj(b),
            (
                Some(TypeKind::Array {
                    element: ea,
                    depth: da,
                }),
                Some(TypeKind::Array {
                    element: eb,
                    depth: db,
                }),
            ) => da == db && self.isa(ea, eb),
            _ => self
                .ancestry(a)
                .into_iter()
                .skip(1)
                .any(|ancestor| self.equals(ancestor, b)),
        }
    }

    /// Closest type both `a` and `b` are. `None` when they share nothing,
    /// which only happens outside the object hierarchy.
    pub fn find_common_anc(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if self.isa(a, b) {
            return Some(b);
        }
        if self.isa(b, a) {
            return Some(a);
        }
        if !self.isobj(a) || !self.isobj(b) {
            return None;
        }
        self.ancestry(a)
            .into_iter()
            .find(|ancestor| self.isa(b, *ancestor))
            .or(Some(self.builtins.object))
    }

    /// The array type of `element` with `depth` dimensions, created once
    /// and reused afterwards. Arrays of arrays are flattened.
    pub fn new_array_type(&mut self, element: TypeId, depth: u32, owner: NspcId) -> TypeId {
        let (element, depth) = match self.kind_of(element) {
            Some(TypeKind::Array {
                element: inner,
                depth: inner_depth,
            }) => (inner, depth + inner_depth),
            _ => (element, depth),
        };

        if let Some(existing) = self.array_types.get(&(element, depth)) {
            if self.types.contains(*existing) {
                return *existing;
            }
        }

        let name = format!("{}{}", self.type_name(element), "[]".repeat(depth as usize));
        let mut ty = Type::new(
            TypeKind::Array { element, depth },
            &name,
            Some(self.builtins.array),
            super::types::sizes::REF,
        );
        ty.owner = Some(owner);
        ty.info = self.types[self.builtins.array].info;
        ty.origin = Origin::Generated;
        let t = self.types.insert(ty);
        self.array_types.insert((element, depth), t);
        t
    }

    pub fn isvoid(&self, t: TypeId) -> bool {
        matches!(self.kind_of(t), Some(TypeKind::Void))
    }

    pub fn isnull(&self, t: TypeId) -> bool {
        matches!(self.kind_of(t), Some(TypeKind::Null))
    }

    pub fn isprim(&self, t: TypeId) -> bool {
        matches!(self.kind_of(t), Some(TypeKind::Primitive(_)))
    }

    pub fn isfunc(&self, t: TypeId) -> bool {
        matches!(self.kind_of(t), Some(TypeKind::Function { .. }))
    }

    /// Objects, arrays and `null`.
    pub fn isobj(&self, t: TypeId) -> bool {
        match self.kind_of(t) {
            Some(TypeKind::Null) => true,
            Some(TypeKind::Object) | Some(TypeKind::Array { .. }) => self
                .ancestry(t)
                .into_iter()
                .any(|ancestor| ancestor == self.builtins.object),
            _ => false,
        }
    }

    /// Integers and references, which are moved around like integers.
    pub fn iskindofint(&self, t: TypeId) -> bool {
        self.prim(t) == Some(PrimKind::Int) || self.isobj(t)
    }

    pub fn getkindof(&self, t: TypeId) -> Kind {
        match self.kind_of(t) {
            None | Some(TypeKind::Void) | Some(TypeKind::Auto) => Kind::Void,
            Some(TypeKind::Primitive(prim)) => match prim {
                PrimKind::Int => Kind::Int,
                PrimKind::Float | PrimKind::Time | PrimKind::Dur => Kind::Float,
                PrimKind::Complex | PrimKind::Polar => Kind::Complex,
                PrimKind::Vec3 => Kind::Vec3,
                PrimKind::Vec4 => Kind::Vec4,
            },
            Some(_) => Kind::Int,
        }
    }

    /// Offset following a slot of type `t` placed at `current`.
    pub fn next_offset(&self, current: usize, t: TypeId) -> usize {
        current + self.types.get(t).map(|ty| ty.size).unwrap_or(0)
    }

    /// `from` can be stored where `to` is expected.
    pub fn assignable(&self, from: TypeId, to: TypeId) -> bool {
        self.isa(from, to)
            || (self.prim(from) == Some(PrimKind::Int) && self.prim(to) == Some(PrimKind::Float))
    }

    /// The type an `auto` declaration named `name` takes from its
    /// initializer.
    pub fn infer_auto(
        &self,
        name: &str,
        initializer: Option<TypeId>,
        pos: &Position,
    ) -> Result<TypeId, Error> {
        let Some(t) = initializer else {
            return MK_ERROR!(
                ErrorImpl::ExpectedExplicitValue {
                    name: name.to_string()
                },
                pos
            );
        };
        if self.isvoid(t) || self.isnull(t) || matches!(self.kind_of(t), Some(TypeKind::Auto)) {
            return MK_ERROR!(
                ErrorImpl::TypeMismatch {
                    expected: String::from("a concrete type"),
                    received: self.type_name(t),
                },
                pos
            );
        }
        Ok(t)
    }
}
