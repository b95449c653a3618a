use std::collections::HashMap;

use lazy_static::lazy_static;

/// Which table a reserved name comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKind {
    Word,
    Type,
    Value,
}

lazy_static! {
    pub static ref RESERVED_LOOKUP: HashMap<&'static str, ReservedKind> = {
        let mut map = HashMap::new();
        for word in [
            "if", "else", "while", "until", "for", "repeat", "break", "continue", "return",
            "switch", "class", "extends", "public", "static", "pure", "interface", "implements",
            "protected", "private", "function", "fun", "spork", "new", "const", "global", "do",
            "loop", "foreach", "typeof", "instanceof", "operator",
        ] {
            map.insert(word, ReservedKind::Word);
        }
        for ty in [
            "void", "auto", "same", "int", "float", "time", "dur", "complex", "polar", "vec3",
            "vec4", "string", "Object", "array", "Event", "UGen", "UAna", "Shred", "Class",
        ] {
            map.insert(ty, ReservedKind::Type);
        }
        for value in [
            "now", "true", "false", "maybe", "pi", "this", "super", "me", "null", "NULL", "dac",
            "adc", "blackhole", "chout", "cherr", "samp", "ms", "second", "minute", "hour", "day",
            "week",
        ] {
            map.insert(value, ReservedKind::Value);
        }
        map
    };
}
