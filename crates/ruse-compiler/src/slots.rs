//! Local slot table for bytecode emission.
//!
//! Slot 0 is always the receiver, slot 1 the context parameter. Long and
//! double values consume two consecutive slots per the target ABI. Slots
//! are allocated at first declaration and never reused; a shadowing
//! declaration simply remaps the name.

use indexmap::IndexMap;
use ruse_ast::{TypeDescriptor, ValueKind};
use ruse_runtime::{CodeBuilder, Op};

#[derive(Debug, Clone)]
struct Entry {
    slot: u16,
    ty: TypeDescriptor,
}

/// Ordered name → (slot, type) table.
#[derive(Debug, Clone)]
pub struct LocalSlotTable {
    entries: IndexMap<String, Entry>,
    next_slot: u16,
}

impl LocalSlotTable {
    /// Table pre-populated with the receiver (slot 0) and the context
    /// parameter (slot 1).
    pub fn new(context_name: &str, context_ty: TypeDescriptor) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(
            context_name.to_string(),
            Entry {
                slot: 1,
                ty: context_ty,
            },
        );
        Self {
            entries,
            // slot 0 = receiver, slot 1 = context (always a reference)
            next_slot: 2,
        }
    }

    /// Map another name onto the argument slot (the `with` target shares
    /// slot 1 with the context parameter).
    pub fn alias_argument(&mut self, name: &str, ty: TypeDescriptor) {
        self.entries.insert(name.to_string(), Entry { slot: 1, ty });
    }

    /// Allocate a slot for a declaration. Wide primitives take two.
    pub fn allocate(&mut self, name: &str, ty: TypeDescriptor) -> u16 {
        let slot = self.next_slot;
        self.next_slot += ty.slot_size();
        self.entries.insert(name.to_string(), Entry { slot, ty });
        slot
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn slot(&self, name: &str) -> Option<u16> {
        self.entries.get(name).map(|e| e.slot)
    }

    pub fn ty(&self, name: &str) -> Option<&TypeDescriptor> {
        self.entries.get(name).map(|e| &e.ty)
    }

    pub fn kind(&self, name: &str) -> Option<ValueKind> {
        self.ty(name).map(|ty| ty.value_kind())
    }

    /// Emit the load instruction for a named variable.
    pub fn load(&self, code: &mut CodeBuilder, name: &str) -> Option<ValueKind> {
        let entry = self.entries.get(name)?;
        let kind = entry.ty.value_kind();
        code.emit(Op::Load(kind, entry.slot));
        Some(kind)
    }

    /// Emit the store instruction for a named variable.
    pub fn store(&self, code: &mut CodeBuilder, name: &str) -> Option<ValueKind> {
        let entry = self.entries.get(name)?;
        let kind = entry.ty.value_kind();
        code.emit(Op::Store(kind, entry.slot));
        Some(kind)
    }

    /// Total slot count for the method header.
    pub fn max_slots(&self) -> u16 {
        self.next_slot
    }

    /// Names currently mapped, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruse_ast::PrimitiveTag;

    #[test]
    fn context_sits_at_slot_one() {
        let table = LocalSlotTable::new("__context", TypeDescriptor::reference("java.util.Map"));
        assert_eq!(table.slot("__context"), Some(1));
        assert_eq!(table.max_slots(), 2);
    }

    #[test]
    fn wide_primitives_take_two_slots() {
        let mut table =
            LocalSlotTable::new("__context", TypeDescriptor::reference("java.util.Map"));
        let a = table.allocate("a", TypeDescriptor::primitive(PrimitiveTag::Long));
        let b = table.allocate("b", TypeDescriptor::primitive(PrimitiveTag::Int));
        let c = table.allocate("c", TypeDescriptor::primitive(PrimitiveTag::Double));
        assert_eq!((a, b, c), (2, 4, 5));
        assert_eq!(table.max_slots(), 7);
    }

    #[test]
    fn shadowing_remaps_without_reuse() {
        let mut table =
            LocalSlotTable::new("__context", TypeDescriptor::reference("java.util.Map"));
        let first = table.allocate("x", TypeDescriptor::primitive(PrimitiveTag::Int));
        let second = table.allocate("x", TypeDescriptor::primitive(PrimitiveTag::Double));
        assert_ne!(first, second);
        assert_eq!(table.slot("x"), Some(second));
        assert_eq!(
            table.kind("x"),
            Some(ValueKind::Double)
        );
    }
}
