//! Stack slots for the foreign runtime
//!
//! A `Slot` is what actually sits on the runtime's value stack.
//! Primitive cases carry their content; tables, natives and userdata
//! are references into the engine heap and compare by identity, unlike
//! host-side `Value` tables which compare by content.

use std::cmp::Ordering;
use std::rc::Rc;

/// Identity of a heap table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

/// Identity of a native callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NativeId(pub(crate) usize);

/// Identity of a foreign handle wrapping a host object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandleId(pub(crate) usize);

/// The runtime's type tag for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Native,
    Userdata,
}

impl SlotKind {
    /// The runtime's canonical name for this tag
    pub fn name(self) -> &'static str {
        match self {
            SlotKind::Nil => "nil",
            SlotKind::Boolean => "boolean",
            SlotKind::Number => "number",
            SlotKind::String => "string",
            SlotKind::Table => "table",
            SlotKind::Native => "function",
            SlotKind::Userdata => "userdata",
        }
    }
}

/// A single slot of the runtime's value stack
#[derive(Debug, Clone)]
pub enum Slot {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Table(TableId),
    Native(NativeId),
    Userdata(HandleId),
}

impl Slot {
    /// Shorthand for string slots used as table keys
    pub(crate) fn key(s: &str) -> Slot {
        Slot::String(Rc::from(s))
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Nil => SlotKind::Nil,
            Slot::Boolean(_) => SlotKind::Boolean,
            Slot::Number(_) => SlotKind::Number,
            Slot::String(_) => SlotKind::String,
            Slot::Table(_) => SlotKind::Table,
            Slot::Native(_) => SlotKind::Native,
            Slot::Userdata(_) => SlotKind::Userdata,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }
}

// Slots key the heap tables' maps, so they need a total order: type
// rank first, then content for primitives and arena identity for heap
// references.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Slot::Boolean(a), Slot::Boolean(b)) => a.cmp(b),
            (Slot::Number(a), Slot::Number(b)) => a.total_cmp(b),
            (Slot::String(a), Slot::String(b)) => a.cmp(b),
            (Slot::Table(a), Slot::Table(b)) => a.cmp(b),
            (Slot::Native(a), Slot::Native(b)) => a.cmp(b),
            (Slot::Userdata(a), Slot::Userdata(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}
