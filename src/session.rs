//! Editing session: the glue between the editor and the epoch chain.
//!
//! Incoming delta groups buffer on the caller's thread while a single
//! offloaded worker runs the VDF over the current tip hash. When the
//! worker completes, the buffered deltas are sealed into the next epoch
//! and the next delay starts over the new tip. Empty intervals discard
//! the proof and restart over the *same* tip, so idle time never enters
//! the chain but the clock keeps ticking.
//!
//! Cancellation is identity-based: every worker carries the generation it
//! was spawned under, and `poll` drops messages from superseded
//! generations. Switching or loading a document bumps the generation, so
//! a stale worker's completion can never advance the new chain.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::chain::{EpochChain, TARGET_EPOCH_SECONDS};
use crate::delta::DeltaGroup;
use crate::vdf::{VdfComputer, VdfProof};

/// User-visible session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Cold-start calibration probe is running.
    Calibrating,
    /// The VDF for the named epoch is underway.
    Sealing { epoch: u64, percent: u8 },
    /// The named epoch was appended to the chain.
    Sealed { epoch: u64 },
    /// The worker failed; the chain was not advanced.
    Failed,
}

enum WorkerEvent {
    Progress(u8),
    Complete { proof: VdfProof, duration: f64 },
    Failed(String),
}

struct WorkerMessage {
    generation: u64,
    event: WorkerEvent,
}

/// Owns the chain, the delta buffer and the single in-flight VDF worker.
pub struct EditingSession {
    computer: Arc<VdfComputer>,
    chain: EpochChain,
    pending: Vec<DeltaGroup>,
    iterations: u64,
    generation: u64,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    worker: Option<thread::JoinHandle<()>>,
    status: SessionStatus,
}

impl EditingSession {
    /// Starts a session on a fresh document, calibrating the iteration
    /// count first.
    pub fn start(computer: Arc<VdfComputer>) -> Self {
        log::info!("session: calibrating VDF difficulty");
        let iterations = EpochChain::calibrate(&computer);
        log::info!("session: calibrated to {iterations} iterations per epoch");
        Self::with_iterations(computer, iterations)
    }

    /// Starts a session with a caller-supplied iteration count, skipping
    /// calibration.
    pub fn with_iterations(computer: Arc<VdfComputer>, iterations: u64) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut session = Self {
            computer,
            chain: EpochChain::new(),
            pending: Vec::new(),
            iterations: iterations.max(1),
            generation: 0,
            tx,
            rx,
            worker: None,
            status: SessionStatus::Calibrating,
        };
        session.spawn_worker();
        session
    }

    /// Buffers one delta group in arrival order.
    pub fn push_delta(&mut self, group: DeltaGroup) {
        self.pending.push(group);
    }

    /// Drains worker messages and advances the chain on completions.
    /// Non-blocking; call from the session's main loop.
    pub fn poll(&mut self) -> Result<()> {
        loop {
            let message = match self.rx.try_recv() {
                Ok(message) => message,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break,
            };
            // Messages from superseded workers are dropped unseen.
            if message.generation != self.generation {
                continue;
            }
            match message.event {
                WorkerEvent::Progress(percent) => {
                    self.status = SessionStatus::Sealing {
                        epoch: self.chain.tip().epoch_number + 1,
                        percent,
                    };
                }
                WorkerEvent::Complete { proof, duration } => {
                    self.seal(proof, duration)?;
                }
                WorkerEvent::Failed(err) => {
                    log::warn!("session: VDF computation error: {err}");
                    self.status = SessionStatus::Failed;
                    self.spawn_worker();
                }
            }
        }
        Ok(())
    }

    /// Discards the current document and restarts from a fresh genesis.
    /// The in-flight worker is invalidated by identity, not awaited.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pending.clear();
        self.chain.genesis();
        self.spawn_worker();
    }

    /// Replaces the session state with a loaded chain and re-seeds the
    /// VDF loop from its tip.
    pub fn load(&mut self, chain: EpochChain) {
        self.generation += 1;
        self.pending.clear();
        self.chain = chain;
        self.spawn_worker();
    }

    pub fn chain(&self) -> &EpochChain {
        &self.chain
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the current-generation worker is still computing.
    pub fn is_sealing(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn seal(&mut self, proof: VdfProof, duration: f64) -> Result<()> {
        if self.pending.is_empty() {
            // Idle interval: nothing to seal. Restart over the same tip.
            self.spawn_worker();
            return Ok(());
        }

        let deltas = std::mem::take(&mut self.pending);
        let iterations = proof.iterations;
        let epoch_number = {
            let epoch = self
                .chain
                .append(deltas, &proof, iterations, duration)
                .context("sealing epoch")?;
            epoch.epoch_number
        };
        self.status = SessionStatus::Sealed {
            epoch: epoch_number,
        };
        self.iterations =
            EpochChain::adjust_iterations(duration, TARGET_EPOCH_SECONDS, self.iterations);
        log::debug!(
            "session: sealed epoch {epoch_number} in {duration:.2}s, next difficulty {}",
            self.iterations
        );
        self.spawn_worker();
        Ok(())
    }

    fn spawn_worker(&mut self) {
        // A superseded worker runs to completion detached; its messages
        // fail the generation check in `poll`.
        drop(self.worker.take());

        let generation = self.generation;
        let input = self.chain.tip().hash.clone();
        let iterations = self.iterations;
        let computer = Arc::clone(&self.computer);
        let tx = self.tx.clone();
        let progress_tx = self.tx.clone();

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let outcome = computer.compute_proof(
                &input,
                iterations,
                Some(move |percent: u8| {
                    let _ = progress_tx.send(WorkerMessage {
                        generation,
                        event: WorkerEvent::Progress(percent),
                    });
                }),
            );
            let event = match outcome {
                Ok(proof) => WorkerEvent::Complete {
                    proof,
                    duration: started.elapsed().as_secs_f64(),
                },
                Err(err) => WorkerEvent::Failed(err.to_string()),
            };
            let _ = tx.send(WorkerMessage { generation, event });
        });

        self.worker = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::insert_group;
    use std::time::Duration;

    const TEST_ITERATIONS: u64 = 32;

    fn poll_until<F>(session: &mut EditingSession, mut done: F)
    where
        F: FnMut(&EditingSession) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !done(session) {
            assert!(Instant::now() < deadline, "session did not make progress");
            session.poll().expect("poll");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_deltas_seal_into_epochs() {
        let computer = Arc::new(VdfComputer::new());
        let mut session = EditingSession::with_iterations(computer, TEST_ITERATIONS);

        session.push_delta(insert_group("hello "));
        session.push_delta(insert_group("world"));
        poll_until(&mut session, |s| s.chain().len() >= 2);

        let epoch = &session.chain().epochs()[1];
        assert_eq!(epoch.epoch_number, 1);
        assert_eq!(epoch.deltas.len(), 2);
        assert_eq!(session.pending_len(), 0);
        assert_eq!(
            epoch.previous_hash.as_deref(),
            Some(crate::chain::GENESIS_HASH)
        );
    }

    #[test]
    fn test_idle_intervals_do_not_append() {
        let computer = Arc::new(VdfComputer::new());
        let mut session = EditingSession::with_iterations(computer, TEST_ITERATIONS);

        // Let at least one VDF complete with an empty buffer.
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline && session.chain().len() == 1 {
            session.poll().expect("poll");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.chain().len(), 1, "idle epoch must not be appended");

        // A buffered delta still seals afterwards over the same tip.
        session.push_delta(insert_group("late"));
        poll_until(&mut session, |s| s.chain().len() >= 2);
        assert_eq!(
            session.chain().epochs()[1].previous_hash.as_deref(),
            Some(crate::chain::GENESIS_HASH)
        );
    }

    #[test]
    fn test_reset_invalidates_inflight_worker() {
        let computer = Arc::new(VdfComputer::new());
        let mut session = EditingSession::with_iterations(computer, TEST_ITERATIONS);

        session.push_delta(insert_group("doomed"));
        session.reset();
        assert_eq!(session.pending_len(), 0);
        assert_eq!(session.chain().len(), 1);

        // The new document seals its own first epoch normally.
        session.push_delta(insert_group("fresh"));
        poll_until(&mut session, |s| s.chain().len() >= 2);
        assert_eq!(session.chain().epochs()[1].deltas, vec![insert_group("fresh")]);
    }

    #[test]
    fn test_load_reseeds_from_tip() {
        let computer = Arc::new(VdfComputer::new());
        let mut donor = EditingSession::with_iterations(Arc::clone(&computer), TEST_ITERATIONS);
        donor.push_delta(insert_group("history"));
        poll_until(&mut donor, |s| s.chain().len() >= 2);
        let chain = donor.chain().clone();
        let tip_hash = chain.tip().hash.clone();

        let mut session = EditingSession::with_iterations(computer, TEST_ITERATIONS);
        session.load(chain);
        session.push_delta(insert_group("continued"));
        poll_until(&mut session, |s| s.chain().len() >= 3);
        assert_eq!(
            session.chain().epochs()[2].previous_hash.as_deref(),
            Some(tip_hash.as_str())
        );
    }
}
