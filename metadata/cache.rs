/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-kind metadata cache.
//!
//! Readers load the published snapshot without taking a lock. A reload
//! builds a fresh record list off to the side and swaps it in only when the
//! whole paginated fetch succeeded; a failed reload leaves the previous
//! snapshot in place and reports to the diagnostic log instead of the caller.
//!
//! At most one reload per cache runs at a time. A reload requested while
//! another is in flight is folded into it: the running reloader fetches once
//! more before releasing the gate, so the newest request is always served by
//! a fetch that started after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::fetch::{FetchError, PagedFetcher};
use super::snapshot::{Aggregate, Snapshot};
use super::{Entity, MetadataKind, decode_page};
use crate::diagnostics::DiagnosticLog;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new snapshot holding `records` entries was published.
    Replaced { records: usize },
    /// The fetch failed; the previous snapshot is still published.
    Retained,
    /// Another reload was in flight and will run again on our behalf.
    Coalesced,
    Closed,
}

impl ReloadOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ReloadOutcome::Replaced { .. })
    }
}

pub struct MetadataCache<T: Entity> {
    published: ArcSwap<Snapshot<T>>,
    fetcher: PagedFetcher,
    log: Arc<DiagnosticLog>,
    reload_gate: Mutex<()>,
    rerun_requested: AtomicBool,
    closed: AtomicBool,
    generation: AtomicU64,
}

impl<T: Entity> MetadataCache<T> {
    pub fn new(fetcher: PagedFetcher, log: Arc<DiagnosticLog>) -> Self {
        Self {
            published: ArcSwap::from_pointee(Snapshot::empty()),
            fetcher,
            log,
            reload_gate: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> MetadataKind {
        T::KIND
    }

    /// Refreshes from the collection endpoint. Never fails outright: errors
    /// go to the diagnostic log and the outcome says what happened.
    pub fn reload(&self) -> ReloadOutcome {
        let mut last = None;
        loop {
            if self.is_closed() {
                return last.unwrap_or(ReloadOutcome::Closed);
            }
            let Some(gate) = self.reload_gate.try_lock() else {
                self.rerun_requested.store(true, Ordering::SeqCst);
                return last.unwrap_or(ReloadOutcome::Coalesced);
            };
            loop {
                self.rerun_requested.store(false, Ordering::SeqCst);
                last = Some(self.reload_exclusive());
                if !self.rerun_requested.load(Ordering::SeqCst) || self.is_closed() {
                    break;
                }
            }
            drop(gate);
            // A request that lost the race for the gate after our last check
            // would otherwise go unserved.
            if !self.rerun_requested.load(Ordering::SeqCst) {
                return last.unwrap_or(ReloadOutcome::Retained);
            }
        }
    }

    fn reload_exclusive(&self) -> ReloadOutcome {
        let kind = T::KIND;
        let started = Instant::now();
        let mut accumulator: Vec<T> = Vec::new();
        let mut skipped = 0_usize;
        let fetched = self.fetcher.fetch_paged(T::COLLECTION_PATH, |body| {
            // Decode the whole page first so a retried page never leaves
            // half of itself behind in the accumulator.
            let page = decode_page::<T>(body)?;
            skipped += page.skipped;
            accumulator.extend(page.records);
            Ok(())
        });

        match fetched {
            Ok(report) => {
                if self.is_closed() {
                    return ReloadOutcome::Closed;
                }
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = Snapshot::from_records(accumulator, generation, OffsetDateTime::now_utc());
                let records = snapshot.len();
                self.published.store(Arc::new(snapshot));
                if skipped > 0 {
                    self.log.warn(format!(
                        "{kind} metadata: skipped {skipped} items without a guid"
                    ));
                }
                self.log.debug(format!(
                    "{kind}>>reload complete - loaded: {records} items from {} pages ({} retries) in {:?}",
                    report.pages,
                    report.retries,
                    started.elapsed()
                ));
                ReloadOutcome::Replaced { records }
            }
            Err(FetchError::Cancelled) => {
                self.log.debug(format!("{kind}>>reload cancelled"));
                ReloadOutcome::Retained
            }
            Err(err) => {
                self.log.warn(format!("*** {kind} metadata error: {err}"));
                ReloadOutcome::Retained
            }
        }
    }

    /// The published snapshot. Holding it pins that version; later reloads
    /// publish new snapshots without touching this one.
    pub fn all(&self) -> Arc<Snapshot<T>> {
        self.published.load_full()
    }

    /// The record with `guid`, or the blank default record.
    pub fn find_by_id(&self, guid: &str) -> T {
        self.published.load().find_by_id(guid)
    }

    pub fn len(&self) -> usize {
        self.published.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.published.load().generation()
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        self.published.load().loaded_at()
    }

    /// Memoized aggregate over whatever snapshot is published right now.
    pub fn aggregate(&self, which: Aggregate, compute: impl FnOnce(&[T]) -> u64) -> u64 {
        self.published.load().aggregate_with(which, compute)
    }

    /// Stops future reloads. Reads keep serving the last snapshot.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
