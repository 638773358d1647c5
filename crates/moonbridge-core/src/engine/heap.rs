//! Heap objects backing the runtime's reference types

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::slot::{HandleId, NativeId, Slot, TableId};
use super::{Engine, ScriptError};

/// A native callable following the runtime's calling convention: its
/// arguments are stack positions `1..=N` of the callee's window, its
/// results are whatever it leaves on top, and the return value is the
/// result count.
pub type NativeFn = Rc<dyn Fn(&mut Engine) -> Result<usize, ScriptError>>;

/// Who is responsible for destroying the host object behind a handle.
///
/// `RuntimeOwned` handles hold the only strong reference to the object,
/// so releasing it at destroy time destroys the object. `HostOwned`
/// handles merely borrow an object some host owner keeps alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    RuntimeOwned,
    HostOwned,
}

/// A table living in the engine heap: identity-keyed, deterministic
/// iteration order for `next`-style traversal.
#[derive(Default)]
pub(crate) struct TableObject {
    pub entries: BTreeMap<Slot, Slot>,
    pub metatable: Option<TableId>,
}

/// One foreign handle: a host object plus its ownership flag.
pub(crate) struct HandleEntry {
    /// The wrapped host object; `None` once destroyed or released
    pub object: Option<Rc<RefCell<dyn Any>>>,

    /// Consumed exactly once, at destroy time. A second destroy (an
    /// explicit delete followed by the collector visiting the same
    /// handle) finds `None` and does nothing.
    pub ownership: Option<Ownership>,

    /// Class descriptor table used for method lookup
    pub metatable: Option<TableId>,
}

/// Arena storage for tables, natives and handles. Ids are never
/// reused, so a stale id can at worst name an already-released entry.
#[derive(Default)]
pub(crate) struct Heap {
    tables: Vec<TableObject>,
    natives: Vec<NativeFn>,
    handles: Vec<HandleEntry>,
}

impl Heap {
    pub fn alloc_table(&mut self) -> TableId {
        let id = TableId(self.tables.len());
        self.tables.push(TableObject::default());
        id
    }

    pub fn table(&self, id: TableId) -> &TableObject {
        &self.tables[id.0]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut TableObject {
        &mut self.tables[id.0]
    }

    pub fn alloc_native(&mut self, function: NativeFn) -> NativeId {
        let id = NativeId(self.natives.len());
        self.natives.push(function);
        id
    }

    pub fn native(&self, id: NativeId) -> NativeFn {
        Rc::clone(&self.natives[id.0])
    }

    pub fn alloc_handle(
        &mut self,
        object: Rc<RefCell<dyn Any>>,
        ownership: Ownership,
    ) -> HandleId {
        let id = HandleId(self.handles.len());
        self.handles.push(HandleEntry {
            object: Some(object),
            ownership: Some(ownership),
            metatable: None,
        });
        id
    }

    pub fn handle(&self, id: HandleId) -> &HandleEntry {
        &self.handles[id.0]
    }

    pub fn handle_mut(&mut self, id: HandleId) -> &mut HandleEntry {
        &mut self.handles[id.0]
    }

    /// Destroy-sweep over every live handle, consuming each ownership
    /// flag. Runs when the engine is torn down.
    pub fn sweep_handles(&mut self) {
        for entry in &mut self.handles {
            if entry.ownership.take().is_some() {
                entry.object = None;
            }
        }
    }
}
