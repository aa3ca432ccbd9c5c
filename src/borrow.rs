//! Active-borrow tracking
//!
//! A borrow is an ephemeral, non-owning relation between a call and a
//! binding. It is opened when the call takes the argument and closed when
//! the call completes, so no borrow ever survives the statement that
//! introduced it. The per-binding "at most one live borrow" rule lives in
//! [`crate::state::BindingTracker`]; this module tracks the open handles so
//! the checker can sweep statement and function boundaries.

use crate::common::NodeId;
use crate::fir::VarId;

/// Handle identifying one live borrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BorrowHandle(u32);

/// One live borrow: borrower call, borrowed binding, start point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Borrow {
    pub handle: BorrowHandle,
    pub var: VarId,
    pub origin: NodeId,
}

/// Set of currently live borrows
#[derive(Debug, Default)]
pub struct BorrowSet {
    live: Vec<Borrow>,
    next: u32,
}

impl BorrowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a borrow of `var` for the call at `origin`
    pub fn open(&mut self, var: VarId, origin: NodeId) -> BorrowHandle {
        let handle = BorrowHandle(self.next);
        self.next += 1;
        self.live.push(Borrow {
            handle,
            var,
            origin,
        });
        handle
    }

    /// Close a borrow, returning it if it was still live
    pub fn close(&mut self, handle: BorrowHandle) -> Option<Borrow> {
        let idx = self.live.iter().position(|b| b.handle == handle)?;
        Some(self.live.swap_remove(idx))
    }

    /// Borrows still live at a boundary; closes them all
    ///
    /// Anything returned here outlived the operation that created it.
    pub fn sweep(&mut self) -> Vec<Borrow> {
        let mut leftovers = std::mem::take(&mut self.live);
        leftovers.sort_by_key(|b| b.origin);
        leftovers
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn live(&self) -> &[Borrow] {
        &self.live
    }
}
