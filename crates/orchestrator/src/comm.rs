//! Rank-to-rank communication for ranks running as threads
//!
//! Every collective is blocking: all ranks must call it in the same order.
//! Shared state sits behind mutexes; a poisoned mutex means a rank died
//! mid-exchange and is reported as [`SolverError::Communication`].

use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use kernel::CellId;
use rustc_hash::FxHashMap;

use crate::error::{SolverError, SolverResult};
use crate::halo::HaloPayload;

type Outbox = FxHashMap<CellId, HaloPayload>;

struct SharedState {
    barrier: Barrier,
    reduce_slots: Mutex<Vec<u32>>,
    outboxes: Vec<Mutex<Outbox>>,
}

/// One rank's handle on the shared communication state
#[derive(Clone)]
pub struct Communicator {
    rank: usize,
    size: usize,
    shared: Arc<SharedState>,
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator {
    /// Create connected communicators for `size` ranks, indexed by rank.
    pub fn create(size: usize) -> Vec<Communicator> {
        let shared = Arc::new(SharedState {
            barrier: Barrier::new(size),
            reduce_slots: Mutex::new(vec![0; size]),
            outboxes: (0..size).map(|_| Mutex::new(Outbox::default())).collect(),
        });
        (0..size)
            .map(|rank| Communicator {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// This rank's index
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block until every rank reaches this point.
    pub fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>, what: &str) -> SolverResult<MutexGuard<'a, T>> {
        mutex.lock().map_err(|_| SolverError::Communication {
            rank: self.rank,
            reason: format!("{} poisoned", what),
        })
    }

    /// Maximum of `value` over all ranks.
    pub fn all_reduce_max(&self, value: u32) -> SolverResult<u32> {
        let published = self
            .lock(&self.shared.reduce_slots, "reduction slots")
            .map(|mut slots| slots[self.rank] = value);
        self.barrier();
        if let Err(err) = published {
            // Peers still wait on the second barrier
            self.barrier();
            return Err(err);
        }
        let result = self
            .lock(&self.shared.reduce_slots, "reduction slots")
            .map(|slots| slots.iter().copied().max().unwrap_or(value));
        // Nobody may overwrite a slot before every rank has read
        self.barrier();
        result
    }

    /// Publish `outgoing` and collect the payloads of `wanted` cells from
    /// their owners. `wanted` lists `(cell, owner rank)` pairs.
    pub fn exchange(
        &self,
        outgoing: Outbox,
        wanted: &[(CellId, usize)],
    ) -> SolverResult<Vec<(CellId, HaloPayload)>> {
        *self.lock(&self.shared.outboxes[self.rank], "halo outbox")? = outgoing;
        self.barrier();

        let received = self.collect(wanted);
        self.barrier();
        received
    }

    fn collect(&self, wanted: &[(CellId, usize)]) -> SolverResult<Vec<(CellId, HaloPayload)>> {
        let mut received = Vec::with_capacity(wanted.len());
        for &(id, owner) in wanted {
            let outbox = self.lock(&self.shared.outboxes[owner], "halo outbox")?;
            let payload = outbox.get(&id).cloned().ok_or_else(|| SolverError::Communication {
                rank: self.rank,
                reason: format!("rank {} published no payload for cell {}", owner, id),
            })?;
            received.push((id, payload));
        }
        Ok(received)
    }
}
