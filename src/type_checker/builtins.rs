//! Built-in types, values and members.

use crate::{ast::ast::Access, errors::errors::Error};

use super::{
    arena::Arena,
    env::Environment,
    import::ImportedFunc,
    symbols::{NativeHook, Value},
    types::{sizes, PrimKind, Type, TypeId, TypeKind, UGenInfo},
};

/// Placeholder code pointer for members implemented by the runtime itself.
pub const RUNTIME_HOOK: NativeHook = NativeHook(0);

/// Handles to every built-in type. Fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub void: TypeId,
    pub auto: TypeId,
    pub int: TypeId,
    pub float: TypeId,
    pub time: TypeId,
    pub dur: TypeId,
    pub complex: TypeId,
    pub polar: TypeId,
    pub vec3: TypeId,
    pub vec4: TypeId,
    pub null: TypeId,
    pub function: TypeId,
    pub object: TypeId,
    pub array: TypeId,
    pub string: TypeId,
    pub event: TypeId,
    pub ugen: TypeId,
    pub uana: TypeId,
    pub uanablob: TypeId,
    pub shred: TypeId,
    pub io: TypeId,
    pub fileio: TypeId,
    pub chout: TypeId,
    pub cherr: TypeId,
    pub class: TypeId,
    pub dac: TypeId,
    pub adc: TypeId,
}

fn prim(types: &mut Arena<TypeId, Type>, kind: PrimKind, name: &str, size: usize) -> TypeId {
    types.insert(Type::new(TypeKind::Primitive(kind), name, None, size))
}

fn class(types: &mut Arena<TypeId, Type>, name: &str, parent: Option<TypeId>) -> TypeId {
    types.insert(Type::new(TypeKind::Object, name, parent, sizes::REF))
}

impl Builtins {
    pub(crate) fn allocate(types: &mut Arena<TypeId, Type>) -> Self {
        let void = types.insert(Type::new(TypeKind::Void, "void", None, sizes::VOID));
        let auto = types.insert(Type::new(TypeKind::Auto, "auto", None, sizes::VOID));
        let int = prim(types, PrimKind::Int, "int", sizes::INT);
        let float = prim(types, PrimKind::Float, "float", sizes::FLOAT);
        let time = prim(types, PrimKind::Time, "time", sizes::TIME);
        let dur = prim(types, PrimKind::Dur, "dur", sizes::DUR);
        let complex = prim(types, PrimKind::Complex, "complex", sizes::COMPLEX);
        let polar = prim(types, PrimKind::Polar, "polar", sizes::POLAR);
        let vec3 = prim(types, PrimKind::Vec3, "vec3", sizes::VEC3);
        let vec4 = prim(types, PrimKind::Vec4, "vec4", sizes::VEC4);
        let null = types.insert(Type::new(TypeKind::Null, "null", None, sizes::REF));
        let function = types.insert(Type::new(
            TypeKind::Function { func: None },
            "function",
            None,
            sizes::REF,
        ));

        let object = class(types, "Object", None);
        let array = class(types, "array", Some(object));
        let string = class(types, "string", Some(object));
        let event = class(types, "Event", Some(object));
        let ugen = class(types, "UGen", Some(object));
        let uana = class(types, "UAna", Some(ugen));
        let uanablob = class(types, "UAnaBlob", Some(object));
        let shred = class(types, "Shred", Some(object));
        let io = class(types, "IO", Some(event));
        let fileio = class(types, "FileIO", Some(io));
        let chout = class(types, "StdOut", Some(io));
        let cherr = class(types, "StdErr", Some(io));
        let class_type = class(types, "Class", Some(object));
        let dac = class(types, "DAC", Some(ugen));
        let adc = class(types, "ADC", Some(ugen));

        for t in [ugen, dac, adc] {
            types[t].ugen_info = Some(UGenInfo::default());
        }
        types[uana].ugen_info = Some(UGenInfo {
            tock: Some(RUNTIME_HOOK),
            ..UGenInfo::default()
        });

        Builtins {
            void,
            auto,
            int,
            float,
            time,
            dur,
            complex,
            polar,
            vec3,
            vec4,
            null,
            function,
            object,
            array,
            string,
            event,
            ugen,
            uana,
            uanablob,
            shred,
            io,
            fileio,
            chout,
            cherr,
            class: class_type,
            dac,
            adc,
        }
    }

    pub fn all(&self) -> [TypeId; 27] {
        [
            self.void,
            self.auto,
            self.int,
            self.float,
            self.time,
            self.dur,
            self.complex,
            self.polar,
            self.vec3,
            self.vec4,
            self.null,
            self.function,
            self.object,
            self.array,
            self.string,
            self.event,
            self.ugen,
            self.uana,
            self.uanablob,
            self.shred,
            self.io,
            self.fileio,
            self.chout,
            self.cherr,
            self.class,
            self.dac,
            self.adc,
        ]
    }

    /// Object types other than `Object`, parents before children.
    fn derived_classes(&self) -> [TypeId; 14] {
        [
            self.array,
            self.string,
            self.event,
            self.ugen,
            self.uana,
            self.uanablob,
            self.shred,
            self.io,
            self.fileio,
            self.chout,
            self.cherr,
            self.class,
            self.dac,
            self.adc,
        ]
    }
}

impl Environment {
    pub(crate) fn install_builtins(&mut self) -> Result<(), Error> {
        let b = self.builtins;
        let global = self.global();

        for t in b.all() {
            let name = self.types[t].base_name.clone();
            self.types[t].owner = Some(global);
            self.nspcs[global].types.add(&name, t);
        }

        // Object's members first, so every derived vtable starts with them.
        self.new_class_nspc(b.object, Some(global));
        self.import_class_reopen(b.object)?;
        self.import_mfun(
            ImportedFunc::new("string", "toString", RUNTIME_HOOK)
                .doc("textual representation of the object"),
        )?;
        self.import_class_end()?;

        for t in b.derived_classes() {
            self.new_class_nspc(t, Some(global));
            self.inherit_layout(t);
        }

        self.import_class_reopen(b.string)?;
        self.import_mfun(
            ImportedFunc::new("int", "length", RUNTIME_HOOK).doc("number of characters"),
        )?;
        self.import_class_end()?;

        self.import_class_reopen(b.event)?;
        self.import_mfun(
            ImportedFunc::new("void", "signal", RUNTIME_HOOK).doc("wake the first waiting shred"),
        )?;
        self.import_mfun(
            ImportedFunc::new("void", "broadcast", RUNTIME_HOOK).doc("wake every waiting shred"),
        )?;
        self.import_class_end()?;

        self.import_class_reopen(b.shred)?;
        self.import_mfun(ImportedFunc::new("int", "id", RUNTIME_HOOK).doc("shred id"))?;
        self.import_class_end()?;

        self.import_class_reopen(b.ugen)?;
        self.import_mfun(
            ImportedFunc::new("float", "gain", RUNTIME_HOOK)
                .arg("float", "value")
                .doc("set the output gain"),
        )?;
        self.import_class_end()?;

        // Derived classes were laid out before their ancestors gained
        // members; refresh them now that every vtable is final.
        for t in b.derived_classes() {
            self.refresh_builtin_layout(t);
        }

        for (name, ty) in [
            ("now", b.time),
            ("true", b.int),
            ("false", b.int),
            ("maybe", b.int),
            ("pi", b.float),
            ("me", b.shred),
            ("null", b.null),
            ("dac", b.dac),
            ("adc", b.adc),
            ("blackhole", b.ugen),
            ("chout", b.chout),
            ("cherr", b.cherr),
            ("samp", b.dur),
            ("ms", b.dur),
            ("second", b.dur),
            ("minute", b.dur),
            ("hour", b.dur),
            ("day", b.dur),
            ("week", b.dur),
        ] {
            self.global_value(name, ty);
        }

        self.nspcs[global].commit();
        Ok(())
    }

    /// Prepends inherited vtable slots a built-in class is missing.
    fn refresh_builtin_layout(&mut self, t: TypeId) {
        let Some(info) = self.types[t].info else {
            return;
        };
        let Some(parent_info) = self.types[t].parent.and_then(|p| self.types[p].info) else {
            return;
        };
        let inherited = self.nspcs[parent_info].vtable.clone();
        let own: Vec<_> = self.nspcs[info]
            .vtable
            .iter()
            .copied()
            .filter(|f| self.funcs[*f].owner_class == Some(t))
            .collect();

        let mut vtable = inherited;
        for f in own {
            self.funcs[f].vt_index = Some(vtable.len());
            vtable.push(f);
        }
        self.nspcs[info].vtable = vtable;
    }

    fn global_value(&mut self, name: &str, ty: TypeId) {
        let global = self.global();
        let mut value = Value::new(name, ty);
        value.is_const = true;
        value.access = Access::Public;
        value.owner = Some(global);
        let v = self.values.insert(value);
        self.nspcs[global].values.add(name, v);
    }
}
