//! Persistent ("strong") iterator handles and the container-side registry.
//!
//! A strong iterator survives in-place mutation of the array it walks. The
//! container keeps a non-owning registry of live handles so structural edits
//! can repair or invalidate them; a handle that is simply dropped
//! deregisters itself implicitly, because its weak registry entry stops
//! upgrading and is pruned on the next walk.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc, Weak};

/// Where a strong iterator currently points.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IterState {
    /// Not yet started, or pushed off the front by a removal: the next
    /// advance lands on the first element.
    Reset,
    /// On the element at this position.
    At(usize),
    /// Off the end, or invalidated by a structural edit.
    Invalid,
}

pub(crate) struct IterCell {
    state: Cell<IterState>,
}

impl IterCell {
    pub(crate) fn state(&self) -> IterState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: IterState) {
        self.state.set(state);
    }
}

/// An externally held iteration cursor that remains usable, or is explicitly
/// invalidated, across structural mutation of its array.
///
/// Obtained from [`crate::VArray::register_iter`]; advanced with
/// [`crate::VArray::advance_iter`].
pub struct StrongIter {
    cell: Rc<IterCell>,
}

impl StrongIter {
    pub(crate) fn new() -> Self {
        StrongIter {
            cell: Rc::new(IterCell {
                state: Cell::new(IterState::Reset),
            }),
        }
    }

    pub(crate) fn cell(&self) -> &Rc<IterCell> {
        &self.cell
    }

    /// The current state of this iterator.
    #[must_use]
    pub fn state(&self) -> IterState {
        self.cell.state()
    }

    /// Returns `true` while the iterator is on a live element.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.cell.state(), IterState::At(_))
    }

    /// The position of the element the iterator is on, if any.
    #[must_use]
    pub fn pos(&self) -> Option<usize> {
        match self.cell.state() {
            IterState::At(p) => Some(p),
            _ => None,
        }
    }
}

impl Debug for StrongIter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StrongIter").field(&self.state()).finish()
    }
}

/// The container-side registry: non-owning references to the live handles
/// attached to one array.
#[derive(Default)]
pub(crate) struct Registry {
    cells: RefCell<Vec<Weak<IterCell>>>,
}

impl Registry {
    pub(crate) fn register(&self, cell: &Rc<IterCell>) {
        self.cells.borrow_mut().push(Rc::downgrade(cell));
    }

    pub(crate) fn contains(&self, cell: &Rc<IterCell>) -> bool {
        self.cells
            .borrow()
            .iter()
            .any(|w| w.upgrade().map_or(false, |c| Rc::ptr_eq(&c, cell)))
    }

    /// Walks every still-live handle, pruning dead entries as it goes.
    pub(crate) fn for_each_live<F: FnMut(&Rc<IterCell>)>(&self, mut f: F) {
        self.cells.borrow_mut().retain(|w| match w.upgrade() {
            Some(cell) => {
                f(&cell);
                true
            }
            None => false,
        });
    }

    /// Moves every entry onto `other`, leaving this registry empty. The
    /// handles themselves keep their state; only their attachment moves.
    pub(crate) fn drain_into(&self, other: &Registry) {
        other.cells.borrow_mut().append(&mut self.cells.borrow_mut());
    }

    /// Detaches every registered handle, marking it invalid. Used by edits
    /// whose position churn is not repaired incrementally.
    pub(crate) fn invalidate_all(&self) {
        for weak in self.cells.borrow_mut().drain(..) {
            if let Some(cell) = weak.upgrade() {
                cell.set_state(IterState::Invalid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_handles_are_pruned() {
        let registry = Registry::default();
        let a = StrongIter::new();
        let b = StrongIter::new();
        registry.register(a.cell());
        registry.register(b.cell());
        drop(b);

        let mut seen = 0;
        registry.for_each_live(|_| seen += 1);
        assert_eq!(seen, 1);
        assert!(registry.contains(a.cell()));
    }

    #[test]
    fn invalidate_all_detaches() {
        let registry = Registry::default();
        let it = StrongIter::new();
        registry.register(it.cell());
        it.cell().set_state(IterState::At(3));

        registry.invalidate_all();
        assert_eq!(it.state(), IterState::Invalid);
        assert!(!registry.contains(it.cell()));
    }
}
