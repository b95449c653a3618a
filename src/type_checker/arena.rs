//! Generational storage for symbol records.
//!
//! Types, values, functions and namespaces reference each other freely, so
//! they are stored here and addressed by handle. Removing a record bumps the
//! slot's generation; every handle minted before that point stops resolving.

use std::{marker::PhantomData, ops::{Index, IndexMut}};

pub trait Handle: Copy + Eq {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> u32;
    fn generation(self) -> u32;
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Arena<H: Handle, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _handle: PhantomData<H>,
}

impl<H: Handle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Arena {
            slots: vec![],
            free: vec![],
            len: 0,
            _handle: PhantomData,
        }
    }
}

impl<H: Handle, T> Arena<H, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return H::from_parts(index, slot.generation);
        }

        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        H::from_parts((self.slots.len() - 1) as u32, 0)
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Releases the record; the handle (and every copy of it) becomes stale.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (H::from_parts(index as u32, slot.generation), value))
        })
    }
}

impl<H: Handle, T> Index<H> for Arena<H, T> {
    type Output = T;

    /// Panics on a stale handle, the way slice indexing panics out of bounds.
    fn index(&self, handle: H) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!(
                "stale handle (slot {}, generation {})",
                handle.index(),
                handle.generation()
            ),
        }
    }
}

impl<H: Handle, T> IndexMut<H> for Arena<H, T> {
    fn index_mut(&mut self, handle: H) -> &mut T {
        let (index, generation) = (handle.index(), handle.generation());
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale handle (slot {}, generation {})", index, generation),
        }
    }
}
