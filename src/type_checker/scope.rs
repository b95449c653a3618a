//! Scoped symbol table with staged top-level writes.
//!
//! A `Scope` is a stack of frames. Writes into the outermost frame are held
//! in a pending buffer until `commit()` merges them, or `rollback()` throws
//! them away; this is what lets a fragment that fails to check leave no
//! trace in the permanent symbol space.

use rustc_hash::FxHashMap;

/// Separates internal (mangled) names from anything a user can type.
pub const MANGLE_SENTINEL: char = '@';

/// How far a lookup may search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Climb {
    /// Innermost frame only (plus the pending buffer when the innermost
    /// frame is the outermost one).
    Current,
    /// Innermost to outermost frame, then the pending buffer.
    Outward,
    /// Outermost frame and the pending buffer only.
    Global,
}

impl From<i64> for Climb {
    fn from(climb: i64) -> Self {
        match climb {
            0 => Climb::Current,
            c if c > 0 => Climb::Outward,
            _ => Climb::Global,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scope<T: Copy> {
    frames: Vec<FxHashMap<String, T>>,
    commit_map: FxHashMap<String, T>,
}

impl<T: Copy> Default for Scope<T> {
    fn default() -> Self {
        Scope {
            frames: vec![FxHashMap::default()],
            commit_map: FxHashMap::default(),
        }
    }
}

impl<T: Copy> Scope<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    /// Removes the innermost frame and hands back what it held. The
    /// outermost frame is never popped; use `reset()` to empty it.
    pub fn pop(&mut self) -> Option<Vec<T>> {
        if self.frames.len() <= 1 {
            return None;
        }
        self.frames
            .pop()
            .map(|frame| frame.into_values().collect())
    }

    /// Back to exactly one empty frame and no pending writes.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.commit_map.clear();
        self.push();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.commit_map.is_empty()
    }

    pub fn add(&mut self, id: &str, value: T) {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.last_mut() {
                frame.insert(id.to_string(), value);
            }
        } else {
            self.commit_map.insert(id.to_string(), value);
        }
    }

    /// Merges pending writes into the outermost frame.
    pub fn commit(&mut self) {
        let pending = std::mem::take(&mut self.commit_map);
        self.frames[0].extend(pending);
    }

    /// Discards pending writes, returning them so their owner can release them.
    pub fn rollback(&mut self) -> Vec<T> {
        std::mem::take(&mut self.commit_map).into_values().collect()
    }

    pub fn lookup(&self, id: &str, climb: Climb) -> Option<T> {
        match climb {
            Climb::Current => {
                let found = self.frames.last().and_then(|frame| frame.get(id)).copied();
                if found.is_none() && self.frames.len() == 1 {
                    return self.commit_map.get(id).copied();
                }
                found
            }
            Climb::Outward => self
                .frames
                .iter()
                .rev()
                .find_map(|frame| frame.get(id).copied())
                .or_else(|| self.commit_map.get(id).copied()),
            Climb::Global => self.frames[0]
                .get(id)
                .copied()
                .or_else(|| self.commit_map.get(id).copied()),
        }
    }

    /// True for names like `toString@0@Object` that no user could write.
    pub fn is_mangled(name: &str) -> bool {
        name.contains(MANGLE_SENTINEL)
    }

    pub fn get_top_level(&self, include_mangled: bool) -> Vec<T> {
        self.get_level(0, include_mangled)
    }

    /// Entries of one frame ordered by name. Level 0 also includes pending
    /// writes.
    pub fn get_level(&self, level: usize, include_mangled: bool) -> Vec<T> {
        let Some(frame) = self.frames.get(level) else {
            return vec![];
        };

        let mut entries: Vec<(&String, &T)> = frame.iter().collect();
        if level == 0 {
            entries.extend(self.commit_map.iter());
        }
        entries.retain(|(name, _)| include_mangled || !Self::is_mangled(name));
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, value)| *value).collect()
    }

    /// Drops every entry (committed or pending) that fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for frame in self.frames.iter_mut() {
            frame.retain(|_, value| keep(value));
        }
        self.commit_map.retain(|_, value| keep(value));
    }
}
