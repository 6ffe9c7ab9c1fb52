use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-key mutual exclusion. Slots nobody holds are pruned on the next acquire.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        slots.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Lock a slot, recovering from poisoning; the guarded data is `()`.
pub(crate) fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
