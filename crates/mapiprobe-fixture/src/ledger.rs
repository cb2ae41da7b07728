use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use mapiprobe_core::{EntryId, FreeHook, OpenFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandleKind {
    Subsystem,
    Session,
    Table,
    RowSet,
    Buffer,
    Store,
    Folder,
    Message,
    Converter,
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOpen {
    pub display_name: String,
    pub flags: OpenFlags,
}

#[derive(Debug, Default)]
struct LedgerState {
    acquired: BTreeMap<HandleKind, usize>,
    released: BTreeMap<HandleKind, usize>,
    store_opens: Vec<StoreOpen>,
    message_opens: Vec<EntryId>,
    logoffs: usize,
    conversions: usize,
}

/// Acquire/release bookkeeping for every handle the fixture hands out,
/// plus a record of the calls tests want to assert on.
#[derive(Debug, Clone, Default)]
pub struct Ledger(Rc<RefCell<LedgerState>>);

impl Ledger {
    pub(crate) fn acquire(&self, kind: HandleKind) {
        *self.0.borrow_mut().acquired.entry(kind).or_default() += 1;
    }

    pub(crate) fn release(&self, kind: HandleKind) {
        *self.0.borrow_mut().released.entry(kind).or_default() += 1;
    }

    pub(crate) fn track(&self, kind: HandleKind) -> Tracked {
        self.acquire(kind);
        Tracked {
            ledger: self.clone(),
            kind,
        }
    }

    pub(crate) fn free_hook(&self, kind: HandleKind) -> FreeHook {
        self.acquire(kind);
        let ledger = self.clone();
        FreeHook::new(move || ledger.release(kind))
    }

    pub(crate) fn record_store_open(&self, display_name: &str, flags: OpenFlags) {
        self.0.borrow_mut().store_opens.push(StoreOpen {
            display_name: display_name.to_string(),
            flags,
        });
    }

    pub(crate) fn record_message_open(&self, entry_id: &EntryId) {
        self.0.borrow_mut().message_opens.push(entry_id.clone());
    }

    pub(crate) fn record_logoff(&self) {
        self.0.borrow_mut().logoffs += 1;
    }

    pub(crate) fn record_conversion(&self) {
        self.0.borrow_mut().conversions += 1;
    }

    pub fn acquired(&self, kind: HandleKind) -> usize {
        self.0.borrow().acquired.get(&kind).copied().unwrap_or(0)
    }

    pub fn released(&self, kind: HandleKind) -> usize {
        self.0.borrow().released.get(&kind).copied().unwrap_or(0)
    }

    /// Kinds whose acquire and release counts differ, as
    /// `(kind, acquired, released)`.
    pub fn unbalanced(&self) -> Vec<(HandleKind, usize, usize)> {
        let state = self.0.borrow();
        let mut kinds: Vec<HandleKind> = state.acquired.keys().copied().collect();
        kinds.extend(state.released.keys().copied());
        kinds.sort();
        kinds.dedup();
        kinds
            .into_iter()
            .filter_map(|kind| {
                let acquired = state.acquired.get(&kind).copied().unwrap_or(0);
                let released = state.released.get(&kind).copied().unwrap_or(0);
                (acquired != released).then_some((kind, acquired, released))
            })
            .collect()
    }

    pub fn is_balanced(&self) -> bool {
        self.unbalanced().is_empty()
    }

    pub fn store_opens(&self) -> Vec<StoreOpen> {
        self.0.borrow().store_opens.clone()
    }

    pub fn message_opens(&self) -> Vec<EntryId> {
        self.0.borrow().message_opens.clone()
    }

    pub fn logoffs(&self) -> usize {
        self.0.borrow().logoffs
    }

    pub fn conversions(&self) -> usize {
        self.0.borrow().conversions
    }
}

/// Counts one release on drop.
#[derive(Debug)]
pub(crate) struct Tracked {
    ledger: Ledger,
    kind: HandleKind,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger.release(self.kind);
    }
}
