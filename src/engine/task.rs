use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use crate::lookup::{NetworkLookup, RecordForNetwork};

use super::{Callback, ErrorHook};

/// State every lookup task of one engine run works against.
pub(super) struct Shared<L> {
    lookup: Arc<L>,
    callback: Option<Callback>,
    on_error: Option<ErrorHook>,
    aggregate: Mutex<Vec<RecordForNetwork>>,
    matched: AtomicUsize,
    failed: AtomicUsize,
}

impl<L> Shared<L>
where
    L: NetworkLookup,
{
    pub(super) fn new(
        lookup: Arc<L>,
        callback: Option<Callback>,
        on_error: Option<ErrorHook>,
    ) -> Self {
        Self {
            lookup,
            callback,
            on_error,
            aggregate: Mutex::new(Vec::new()),
            matched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Looks up one key. The callback runs before the records are appended,
    /// and neither happens unless the lookup produced at least one record.
    pub(super) fn process(&self, key: &str) {
        let records = match self.lookup.lookup(key) {
            Ok(records) => records,
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    input = key,
                    code = err.code(),
                    "An error occurred when retrieving records: {}",
                    err
                );
                if let Some(on_error) = &self.on_error {
                    on_error(key, &err);
                }
                return;
            }
        };

        if records.is_empty() {
            trace!(input = key, "no records");
            return;
        }

        if let Some(callback) = &self.callback {
            callback(key, &records);
        }

        self.matched.fetch_add(1, Ordering::Relaxed);
        self.aggregate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    pub(super) fn matched(&self) -> usize {
        self.matched.load(Ordering::Relaxed)
    }

    pub(super) fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub(super) fn take_records(&self) -> Vec<RecordForNetwork> {
        std::mem::take(
            &mut *self
                .aggregate
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
