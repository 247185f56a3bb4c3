//! Ordering of concurrent unlock attempts
//!
//! An unlock form re-derives the key on every keystroke, so several
//! attempts may be in flight at once and may finish out of order. Each
//! attempt takes a ticket from an [`AttemptSequencer`]; when it finishes,
//! only the holder of the most recently issued ticket may act on a
//! success. Older attempts run to completion and are discarded.

use crate::kdf::KdfParams;
use crate::link_ops::attempt_decrypt;
use crate::payload::LinkPayload;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use zeroize::Zeroizing;

/// Sequence number of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttemptTicket(u64);

impl AttemptTicket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing tickets.
#[derive(Debug, Default)]
pub struct AttemptSequencer {
    latest: AtomicU64,
}

impl AttemptSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> AttemptTicket {
        AttemptTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True only for the most recently issued ticket.
    pub fn is_current(&self, ticket: AttemptTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Result of one unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Correct password and still the latest attempt: navigate here.
    Unlocked(String),
    /// Wrong password or tampered link. Nothing to show.
    Rejected,
    /// A newer attempt was started before this one finished.
    Superseded,
}

/// A parsed link together with the bookkeeping for attempts against it.
#[derive(Debug, Clone)]
pub struct DecryptSession {
    payload: Arc<LinkPayload>,
    params: KdfParams,
    sequencer: Arc<AttemptSequencer>,
}

impl DecryptSession {
    pub fn new(payload: LinkPayload, params: KdfParams) -> Self {
        Self {
            payload: Arc::new(payload),
            params,
            sequencer: Arc::new(AttemptSequencer::new()),
        }
    }

    pub fn payload(&self) -> &LinkPayload {
        &self.payload
    }

    /// Run one attempt on the calling thread.
    pub fn attempt(&self, password: &str) -> AttemptOutcome {
        let ticket = self.sequencer.begin();
        run_attempt(&self.payload, &self.params, &self.sequencer, ticket, password)
    }

    /// Run one attempt on its own thread.
    ///
    /// The ticket is taken before the thread starts, so attempts are ordered
    /// by when they were submitted, not by when they finish.
    pub fn spawn_attempt(&self, password: Zeroizing<String>) -> JoinHandle<AttemptOutcome> {
        self.spawn_with_ticket(self.sequencer.begin(), password)
    }

    fn spawn_with_ticket(
        &self,
        ticket: AttemptTicket,
        password: Zeroizing<String>,
    ) -> JoinHandle<AttemptOutcome> {
        let payload = Arc::clone(&self.payload);
        let sequencer = Arc::clone(&self.sequencer);
        let params = self.params;
        thread::spawn(move || run_attempt(&payload, &params, &sequencer, ticket, &password))
    }
}

fn run_attempt(
    payload: &LinkPayload,
    params: &KdfParams,
    sequencer: &AttemptSequencer,
    ticket: AttemptTicket,
    password: &str,
) -> AttemptOutcome {
    tracing::trace!(sequence = ticket.sequence(), "unlock attempt started");

    let outcome = match attempt_decrypt(payload, password, params) {
        Ok(_) if !sequencer.is_current(ticket) => AttemptOutcome::Superseded,
        Ok(destination) => AttemptOutcome::Unlocked(destination),
        Err(_) => AttemptOutcome::Rejected,
    };

    tracing::debug!(
        sequence = ticket.sequence(),
        unlocked = matches!(outcome, AttemptOutcome::Unlocked(_)),
        superseded = matches!(outcome, AttemptOutcome::Superseded),
        "unlock attempt finished"
    );
    outcome
}
