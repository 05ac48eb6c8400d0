//! Background chunk generation with prioritised requests
//!
//! Worker threads pull requests from a shared crossbeam channel, generate the
//! chunk and send the result back. Every request carries a cancellation flag;
//! cancelled chunks stop at the next phase boundary and their results are
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use glam::IVec2;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::constants::MAX_PENDING_REQUESTS;
use crate::core::error::{Result, TerrainError};
use crate::world::generator::{CancellationToken, ChunkTerrain, TerrainContext, TerrainGenerator};

/// Queued chunk job. `generation` tells a re-request apart from an earlier, cancelled one.
#[derive(Clone, Debug)]
struct ChunkRequest {
    coord: IVec2,
    generation: u64,
    cancel: CancellationToken,
}

/// Result of background chunk generation
pub struct ChunkResult {
    pub coord: IVec2,
    pub result: Result<ChunkTerrain>,
    generation: u64,
}

struct PendingRequest {
    generation: u64,
    flag: Arc<AtomicBool>,
}

/// Manages background chunk generation with worker threads
pub struct RegionLoader {
    request_tx: Sender<ChunkRequest>,
    result_rx: Receiver<ChunkResult>,
    pending: FxHashMap<IVec2, PendingRequest>,
    next_generation: u64,
    worker_count: usize,
}

impl RegionLoader {
    /// One worker per CPU
    pub fn new(generator: Arc<TerrainGenerator>, context: Arc<TerrainContext>) -> std::io::Result<Self> {
        Self::with_worker_count(num_cpus::get().max(1), generator, context)
    }

    pub fn with_worker_count(
        num_workers: usize,
        generator: Arc<TerrainGenerator>,
        context: Arc<TerrainContext>,
    ) -> std::io::Result<Self> {
        // Bounded channels prevent unbounded memory growth
        let (request_tx, request_rx) = bounded::<ChunkRequest>(MAX_PENDING_REQUESTS);
        let (result_tx, result_rx) = bounded::<ChunkResult>(MAX_PENDING_REQUESTS);

        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let generator = Arc::clone(&generator);
            let context = Arc::clone(&context);

            thread::Builder::new()
                .name(format!("terrain-gen-{}", worker_id))
                .spawn(move || {
                    // Exits once the loader drops its request sender
                    while let Ok(req) = rx.recv() {
                        if req.cancel.is_cancelled() {
                            continue;
                        }
                        let result = generator.generate_chunk(&context, req.coord, &req.cancel);
                        if let Err(err) = &result {
                            if !matches!(err, TerrainError::Cancelled { .. }) {
                                error!(worker_id, coord = ?req.coord, %err, "chunk generation failed");
                            }
                        }
                        if tx
                            .send(ChunkResult {
                                coord: req.coord,
                                result,
                                generation: req.generation,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                })?;
        }

        Ok(RegionLoader {
            request_tx,
            result_rx,
            pending: FxHashMap::default(),
            next_generation: 0,
            worker_count: num_workers,
        })
    }

    /// Queue a chunk for generation.
    /// Returns false when the chunk is already pending or the queue is full.
    pub fn request_chunk(&mut self, coord: IVec2) -> bool {
        if self.pending.contains_key(&coord) || self.pending.len() >= MAX_PENDING_REQUESTS {
            return false;
        }

        let flag = Arc::new(AtomicBool::new(false));
        let generation = self.next_generation;
        let request = ChunkRequest {
            coord,
            generation,
            cancel: CancellationToken::from_flag(Arc::clone(&flag)),
        };
        match self.request_tx.try_send(request) {
            Ok(()) => {
                self.next_generation += 1;
                self.pending.insert(coord, PendingRequest { generation, flag });
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(?coord, "request queue full, chunk deferred");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(?coord, "terrain workers are gone");
                false
            }
        }
    }

    /// Request multiple chunks, lowest priority value (e.g. distance squared) first
    pub fn request_chunks(&mut self, requests: &[(IVec2, i32)]) -> usize {
        let mut sorted: Vec<_> = requests
            .iter()
            .filter(|(coord, _)| !self.pending.contains_key(coord))
            .copied()
            .collect();
        sorted.sort_by_key(|(_, priority)| *priority);

        let mut queued = 0;
        for (coord, _) in sorted {
            if self.pending.len() >= MAX_PENDING_REQUESTS {
                break; // Don't overwhelm the queue
            }
            if self.request_chunk(coord) {
                queued += 1;
            }
        }
        queued
    }

    pub fn is_pending(&self, coord: IVec2) -> bool {
        self.pending.contains_key(&coord)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Poll for completed chunks (non-blocking).
    /// Results of cancelled requests are dropped.
    pub fn poll_results(&mut self, max_results: usize) -> Vec<ChunkResult> {
        let mut results = Vec::with_capacity(max_results);

        while results.len() < max_results {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    if self.accept(&result) {
                        results.push(result);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        results
    }

    /// Block until a result for a pending chunk arrives, or every request is done.
    pub fn wait_result(&mut self) -> Option<ChunkResult> {
        while !self.pending.is_empty() {
            let result = self.result_rx.recv().ok()?;
            if self.accept(&result) {
                return Some(result);
            }
        }
        None
    }

    /// Settles the pending entry a result belongs to; stale results are rejected.
    fn accept(&mut self, result: &ChunkResult) -> bool {
        match self.pending.get(&result.coord) {
            Some(pending) if pending.generation == result.generation => {
                self.pending.remove(&result.coord);
                true
            }
            _ => false,
        }
    }

    /// Cancel a pending chunk request
    pub fn cancel(&mut self, coord: IVec2) {
        if let Some(pending) = self.pending.remove(&coord) {
            pending.flag.store(true, Ordering::Relaxed);
        }
    }

    /// Cancel all pending requests (for example when ownership changes)
    pub fn clear_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parcel::OwnershipSet;
    use crate::utils::settings::TerrainSettings;

    fn loader(workers: usize) -> RegionLoader {
        let settings = TerrainSettings {
            world_min: [-4, -4],
            world_max: [3, 3],
            chunk_size_parcels: 4,
            trees: Vec::new(),
            ..TerrainSettings::default()
        };
        let generator = TerrainGenerator::new(settings.clone()).unwrap();
        let context = generator.prepare(OwnershipSet::new(settings.bounds(), [IVec2::ZERO]));
        RegionLoader::with_worker_count(workers, Arc::new(generator), Arc::new(context)).unwrap()
    }

    #[test]
    fn loads_requested_chunks() {
        let mut loader = loader(2);
        let queued = loader.request_chunks(&[(IVec2::new(1, 1), 0), (IVec2::new(0, 0), 5), (IVec2::new(1, 1), 1)]);
        assert_eq!(queued, 2);
        assert!(loader.is_pending(IVec2::ZERO));

        let mut coords = Vec::new();
        while let Some(result) = loader.wait_result() {
            assert!(result.result.is_ok());
            coords.push(result.coord);
        }
        coords.sort_by_key(|c| c.x);
        assert_eq!(coords, vec![IVec2::ZERO, IVec2::ONE]);
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn duplicate_requests_are_ignored() {
        let mut loader = loader(1);
        assert!(loader.request_chunk(IVec2::ZERO));
        assert!(!loader.request_chunk(IVec2::ZERO));
        assert_eq!(loader.pending_count(), 1);
        assert!(loader.wait_result().is_some());
    }

    #[test]
    fn cancelled_requests_produce_no_results() {
        let mut loader = loader(1);
        loader.request_chunk(IVec2::ZERO);
        loader.request_chunk(IVec2::ONE);
        loader.clear_pending();
        assert_eq!(loader.pending_count(), 0);
        assert!(loader.wait_result().is_none());
        assert!(loader.poll_results(8).is_empty());
    }

    #[test]
    fn re_request_after_cancel_gets_fresh_result() {
        let mut loader = loader(1);
        assert!(loader.request_chunk(IVec2::ONE));
        thread::sleep(std::time::Duration::from_millis(20));
        loader.cancel(IVec2::ONE);
        assert!(!loader.is_pending(IVec2::ONE));
        assert!(loader.request_chunk(IVec2::ONE));

        let result = loader.wait_result().unwrap();
        assert_eq!(result.coord, IVec2::ONE);
        let chunk = result.result.unwrap();
        assert_eq!(chunk.coord, IVec2::ONE);
        assert_eq!(loader.pending_count(), 0);
        assert!(loader.wait_result().is_none());
    }

    #[test]
    fn stale_results_are_rejected() {
        let mut loader = loader(1);
        assert!(loader.request_chunk(IVec2::ZERO));
        let stale = ChunkResult {
            coord: IVec2::ZERO,
            result: Err(TerrainError::Cancelled { x: 0, y: 0 }),
            generation: 41,
        };
        assert!(!loader.accept(&stale));
        assert!(loader.is_pending(IVec2::ZERO));
        assert!(loader.wait_result().unwrap().result.is_ok());
    }
}
