use std::fmt::Write;

use super::{env::Environment, types::TypeId};

impl Environment {
    /// Plain-text description of a type and everything it can do.
    pub fn apropos(&self, t: TypeId) -> String {
        let Some(ty) = self.types.get(t) else {
            return String::from("<released type>\n");
        };

        let mut out = String::new();
        let chain: Vec<String> = self
            .ancestry(t)
            .into_iter()
            .map(|ancestor| self.type_name(ancestor))
            .collect();
        let keyword = if self.isobj(t) { "class" } else { "type" };
        let _ = writeln!(out, "{} {}", keyword, chain.join(" extends "));
        let _ = writeln!(out, "  origin: {}", ty.origin);
        if !ty.doc.is_empty() {
            let _ = writeln!(out, "  {}", ty.doc);
        }

        for (index, owner) in self.ancestry(t).into_iter().enumerate() {
            let section = self.describe_members(owner);
            if section.is_empty() {
                continue;
            }
            if index > 0 {
                let _ = writeln!(out, "  inherited from {}:", self.type_name(owner));
            }
            out.push_str(&section);
        }

        if !ty.examples.is_empty() {
            let _ = writeln!(out, "  examples:");
            for example in &ty.examples {
                let _ = writeln!(out, "    {}", example);
            }
        }
        out
    }

    fn describe_members(&self, owner: TypeId) -> String {
        let mut out = String::new();
        let Some(nspc) = self
            .types
            .get(owner)
            .and_then(|ty| ty.info)
            .and_then(|info| self.nspcs.get(info))
        else {
            return out;
        };
        // Array types share the member namespace of `array`.
        if self.types.get(owner).and_then(|ty| ty.array_element()).is_some() {
            return out;
        }

        let values: Vec<_> = nspc
            .get_values()
            .into_iter()
            .filter_map(|v| self.values.get(v))
            .filter(|value| value.func_ref.is_none())
            .collect();
        if !values.is_empty() {
            let _ = writeln!(out, "  member variables:");
            for value in values {
                let prefix = if value.is_static { "static " } else { "" };
                let _ = writeln!(out, "    {}{} {}", prefix, self.type_name(value.ty), value.name);
            }
        }

        let funcs: Vec<_> = nspc
            .get_funcs(true)
            .into_iter()
            .filter_map(|f| self.funcs.get(f))
            .filter(|func| func.owner_class == Some(owner))
            .collect();
        let mut signatures: Vec<String> = funcs
            .iter()
            .map(|func| {
                let prefix = if func.is_static { "static " } else { "" };
                format!("{}{}", prefix, func.signature(&self.types, true, true))
            })
            .collect();
        signatures.sort();
        signatures.dedup();
        if !signatures.is_empty() {
            let _ = writeln!(out, "  functions:");
            for signature in signatures {
                let _ = writeln!(out, "    {}", signature);
            }
        }
        out
    }
}
