//! Correlation id → pending slot table shared by callers and the reply consumer.
//!
//! Every operation runs under a single lock, so a reply can never observe a
//! half-inserted entry and a shutdown drain can never race a take. Once the
//! table has been shut down it stays sealed: later inserts are refused with
//! the shutdown cause instead of registering slots nobody will ever resolve.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use transport::ShutdownSignal;

use crate::envelope::RpcReturn;
use crate::slot::Slot;

pub type ReplySlot = Arc<Slot<RpcReturn>>;

#[derive(Default)]
struct Continuations {
    pending: HashMap<String, ReplySlot>,
    sealed: Option<ShutdownSignal>,
}

#[derive(Default)]
pub struct ContinuationMap {
    inner: Mutex<Continuations>,
}

impl ContinuationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `slot` under `correlation_id`.
    ///
    /// Fails with the recorded cause once the map has been shut down.
    pub fn insert(&self, correlation_id: String, slot: ReplySlot) -> Result<(), ShutdownSignal> {
        let mut inner = self.inner.lock();
        if let Some(signal) = &inner.sealed {
            return Err(signal.clone());
        }
        inner.pending.insert(correlation_id, slot);
        Ok(())
    }

    /// Removes and returns the slot for `correlation_id`, if one is pending.
    pub fn take(&self, correlation_id: &str) -> Option<ReplySlot> {
        self.inner.lock().pending.remove(correlation_id)
    }

    /// Removes and returns every pending slot without resolving it.
    ///
    /// Callers own the returned slots and must fill each one: a waiter that
    /// times out after its slot was removed waits for that fill.
    pub(crate) fn drain(&self) -> SmallVec<[ReplySlot; 8]> {
        self.inner.lock().pending.drain().map(|(_, slot)| slot).collect()
    }

    /// Seals the map with `signal` and returns every pending slot.
    ///
    /// Once sealed, nothing can be inserted, so slots drained after the seal
    /// are the complete set.
    pub fn shutdown(&self, signal: &ShutdownSignal) -> SmallVec<[ReplySlot; 8]> {
        {
            let mut inner = self.inner.lock();
            if inner.sealed.is_none() {
                inner.sealed = Some(signal.clone());
            }
        }
        self.drain()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
