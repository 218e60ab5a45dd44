//! Runtime-owned userdata storage.
//!
//! A userdata is a slot the runtime allocates and tracks; the embedder places
//! a native payload into it and attaches a metatable. The [`UserdataHeap`]
//! keeps every live slot so collection and shutdown can find the ones that
//! still need finalizing.

use std::any::Any;
use std::cell::{BorrowError, BorrowMutError, Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::table::TableRef;

/// Identity of a slot in the [`UserdataHeap`].
///
/// The generation guards against a recycled slot being mistaken for the
/// userdata that previously lived there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserdataId {
    pub index: u32,
    pub generation: u32,
}

struct UserdataCell {
    id: UserdataId,
    payload: RefCell<Option<Box<dyn Any>>>,
    metatable: RefCell<Option<TableRef>>,
    finalized: Cell<bool>,
}

/// Shared handle to a full userdata.
#[derive(Clone)]
pub struct AnyUserdata(Rc<UserdataCell>);

impl AnyUserdata {
    fn new(id: UserdataId) -> Self {
        Self(Rc::new(UserdataCell {
            id,
            payload: RefCell::new(None),
            metatable: RefCell::new(None),
            finalized: Cell::new(false),
        }))
    }

    pub fn id(&self) -> UserdataId {
        self.0.id
    }

    /// Store a payload, returning the previous one.
    pub fn set_payload(&self, payload: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.0.payload.borrow_mut().replace(payload)
    }

    /// Move the payload out, leaving the slot empty.
    ///
    /// Returns `None` when the slot is already empty or currently borrowed.
    pub fn take_payload(&self) -> Option<Box<dyn Any>> {
        self.0.payload.try_borrow_mut().ok()?.take()
    }

    pub fn has_payload(&self) -> bool {
        self.0
            .payload
            .try_borrow()
            .map(|p| p.is_some())
            .unwrap_or(true)
    }

    pub fn try_borrow_payload(&self) -> Result<Ref<'_, Option<Box<dyn Any>>>, BorrowError> {
        self.0.payload.try_borrow()
    }

    pub fn try_borrow_payload_mut(
        &self,
    ) -> Result<RefMut<'_, Option<Box<dyn Any>>>, BorrowMutError> {
        self.0.payload.try_borrow_mut()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.metatable.borrow().clone()
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        let old = std::mem::replace(&mut *self.0.metatable.borrow_mut(), metatable);
        drop(old);
    }

    /// Whether the finalizer has already run for this userdata.
    pub fn is_finalized(&self) -> bool {
        self.0.finalized.get()
    }

    /// Mark the userdata finalized, returning `false` if it already was.
    pub(crate) fn mark_finalized(&self) -> bool {
        !self.0.finalized.replace(true)
    }

    pub fn ptr_eq(&self, other: &AnyUserdata) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for AnyUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyUserdata")
            .field("id", &self.0.id)
            .field("finalized", &self.0.finalized.get())
            .finish_non_exhaustive()
    }
}

struct HeapSlot {
    generation: u32,
    serial: u64,
    cell: Option<AnyUserdata>,
}

/// Generational arena of live userdata.
pub struct UserdataHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    next_serial: u64,
}

impl UserdataHeap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            next_serial: 0,
        }
    }

    /// Allocate an empty userdata.
    pub fn allocate(&mut self) -> AnyUserdata {
        let serial = self.next_serial;
        self.next_serial += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let cell = AnyUserdata::new(UserdataId {
                index,
                generation: slot.generation,
            });
            slot.serial = serial;
            slot.cell = Some(cell.clone());
            cell
        } else {
            let index = self.slots.len() as u32;
            let cell = AnyUserdata::new(UserdataId {
                index,
                generation: 0,
            });
            self.slots.push(HeapSlot {
                generation: 0,
                serial,
                cell: Some(cell.clone()),
            });
            cell
        }
    }

    /// Release a slot. The removed handle is returned so the caller can drop
    /// it outside any borrow of the heap.
    pub fn free(&mut self, id: UserdataId) -> Option<AnyUserdata> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.cell.is_none() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        slot.cell.take()
    }

    pub fn contains(&self, id: UserdataId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.cell.is_some())
    }

    /// Userdata referenced by nothing but the heap itself.
    pub fn unreachable(&self) -> Vec<AnyUserdata> {
        self.slots
            .iter()
            .filter_map(|slot| slot.cell.as_ref())
            .filter(|cell| cell.strong_count() == 1)
            .cloned()
            .collect()
    }

    /// Every live userdata, newest allocation first.
    pub fn live_newest_first(&self) -> Vec<AnyUserdata> {
        let mut live: Vec<(u64, AnyUserdata)> = self
            .slots
            .iter()
            .filter_map(|slot| slot.cell.clone().map(|cell| (slot.serial, cell)))
            .collect();
        live.sort_by(|a, b| b.0.cmp(&a.0));
        live.into_iter().map(|(_, cell)| cell).collect()
    }

    /// Number of live userdata.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UserdataHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UserdataHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserdataHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}
