//! Per-rank message matching for the in-process backend.
//!
//! Messages match posted receives by (source, tag) in arrival order. A
//! message with no posted receive waits in the unexpected queue; a posted
//! receive with no message waits in the posted list until one arrives.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::BenchError;
use crate::parallel::Tag;

pub(crate) type Payload = Box<dyn Any + Send>;

/// Group-wide abort flag.
#[derive(Default)]
pub(crate) struct AbortSignal {
    aborted: AtomicBool,
    code: AtomicI32,
}

impl AbortSignal {
    pub(crate) fn raise(&self, code: i32) {
        self.code.store(code, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<(), BenchError> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(BenchError::Aborted(self.code.load(Ordering::SeqCst)));
        }
        Ok(())
    }
}

pub(crate) struct Envelope {
    pub id: u64,
    pub source: usize,
    pub tag: Tag,
    pub payload: Payload,
    pub synchronous: bool,
}

struct PostedReceive {
    id: u64,
    source: usize,
    tag: Tag,
    payload: Option<Payload>,
}

#[derive(Default)]
struct MailboxState {
    unexpected: VecDeque<Envelope>,
    posted: Vec<PostedReceive>,
    // synchronous sends whose message has been matched
    matched: HashSet<u64>,
}

pub(crate) enum Delivery {
    /// Landed in a posted receive.
    Matched,
    /// Queued as unexpected.
    Queued,
    /// Refused: no receive posted and the sender required one.
    NotPosted,
}

#[derive(Default)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    changed: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, MailboxState>) -> MutexGuard<'a, MailboxState> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn deliver(&self, envelope: Envelope, require_posted: bool) -> Delivery {
        let mut guard = self.lock();
        let state = &mut *guard;
        let slot = state.posted.iter_mut().find(|p| {
            p.payload.is_none() && p.source == envelope.source && p.tag == envelope.tag
        });
        match slot {
            Some(slot) => {
                slot.payload = Some(envelope.payload);
                self.changed.notify_all();
                Delivery::Matched
            }
            None if require_posted => Delivery::NotPosted,
            None => {
                state.unexpected.push_back(envelope);
                Delivery::Queued
            }
        }
    }

    /// Blocks the sender of synchronous message `id` until it is matched.
    pub(crate) fn wait_matched(&self, id: u64, signal: &AbortSignal) -> Result<(), BenchError> {
        let mut state = self.lock();
        loop {
            if state.matched.remove(&id) {
                return Ok(());
            }
            signal.check()?;
            state = self.wait(state);
        }
    }

    pub(crate) fn post(&self, id: u64, source: usize, tag: Tag) {
        let mut state = self.lock();
        let queued = state
            .unexpected
            .iter()
            .position(|e| e.source == source && e.tag == tag);
        let payload = match queued.and_then(|pos| state.unexpected.remove(pos)) {
            Some(envelope) => {
                if envelope.synchronous {
                    state.matched.insert(envelope.id);
                    self.changed.notify_all();
                }
                Some(envelope.payload)
            }
            None => None,
        };
        state.posted.push(PostedReceive { id, source, tag, payload });
    }

    pub(crate) fn wait_posted(&self, id: u64, signal: &AbortSignal) -> Result<Payload, BenchError> {
        let mut state = self.lock();
        loop {
            if let Some(pos) = state
                .posted
                .iter()
                .position(|p| p.id == id && p.payload.is_some())
            {
                let posted = state.posted.remove(pos);
                if let Some(payload) = posted.payload {
                    return Ok(payload);
                }
            }
            if let Err(e) = signal.check() {
                state.posted.retain(|p| p.id != id);
                return Err(e);
            }
            state = self.wait(state);
        }
    }

    /// Withdraws posted receive `id`. Returns whether a message had already
    /// landed in it.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        let mut state = self.lock();
        match state.posted.iter().position(|p| p.id == id) {
            Some(pos) => state.posted.remove(pos).payload.is_some(),
            None => false,
        }
    }

    pub(crate) fn wake_all(&self) {
        let _state = self.lock();
        self.changed.notify_all();
    }

    #[cfg(test)]
    fn pending(&self) -> (usize, usize) {
        let state = self.lock();
        (state.unexpected.len(), state.posted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: u64, source: usize, tag: Tag, value: i32, synchronous: bool) -> Envelope {
        Envelope { id, source, tag, payload: Box::new(vec![value]), synchronous }
    }

    fn value(payload: Payload) -> i32 {
        payload.downcast::<Vec<i32>>().unwrap()[0]
    }

    #[test]
    fn unexpected_messages_match_in_arrival_order() {
        let mb = Mailbox::default();
        let signal = AbortSignal::default();
        assert!(matches!(mb.deliver(envelope(1, 2, 0, 10, false), false), Delivery::Queued));
        assert!(matches!(mb.deliver(envelope(2, 2, 0, 20, false), false), Delivery::Queued));
        mb.post(100, 2, 0);
        mb.post(101, 2, 0);
        assert_eq!(value(mb.wait_posted(100, &signal).unwrap()), 10);
        assert_eq!(value(mb.wait_posted(101, &signal).unwrap()), 20);
        assert_eq!(mb.pending(), (0, 0));
    }

    #[test]
    fn matching_respects_source_and_tag() {
        let mb = Mailbox::default();
        let signal = AbortSignal::default();
        mb.post(100, 1, 5);
        assert!(matches!(mb.deliver(envelope(1, 1, 0, 7, false), false), Delivery::Queued));
        assert!(matches!(mb.deliver(envelope(2, 3, 5, 8, false), false), Delivery::Queued));
        assert!(matches!(mb.deliver(envelope(3, 1, 5, 9, false), false), Delivery::Matched));
        assert_eq!(value(mb.wait_posted(100, &signal).unwrap()), 9);
        assert_eq!(mb.pending(), (2, 0));
    }

    #[test]
    fn ready_delivery_requires_a_posted_receive() {
        let mb = Mailbox::default();
        assert!(matches!(mb.deliver(envelope(1, 0, 0, 1, false), true), Delivery::NotPosted));
        assert_eq!(mb.pending(), (0, 0));
        mb.post(100, 0, 0);
        assert!(matches!(mb.deliver(envelope(2, 0, 0, 1, false), true), Delivery::Matched));
    }

    #[test]
    fn posting_matches_a_queued_synchronous_send() {
        let mb = Mailbox::default();
        let signal = AbortSignal::default();
        assert!(matches!(mb.deliver(envelope(7, 0, 0, 1, true), false), Delivery::Queued));
        mb.post(100, 0, 0);
        mb.wait_matched(7, &signal).unwrap();
    }

    #[test]
    fn cancel_reports_whether_data_had_landed() {
        let mb = Mailbox::default();
        mb.post(100, 0, 0);
        assert!(!mb.cancel(100));
        mb.post(101, 0, 0);
        mb.deliver(envelope(1, 0, 0, 1, false), false);
        assert!(mb.cancel(101));
        assert_eq!(mb.pending(), (0, 0));
    }

    #[test]
    fn abort_releases_waiters() {
        let mb = Mailbox::default();
        let signal = AbortSignal::default();
        mb.post(100, 0, 0);
        signal.raise(3);
        assert_eq!(mb.wait_posted(100, &signal).unwrap_err(), BenchError::Aborted(3));
        assert_eq!(mb.wait_matched(9, &signal).unwrap_err(), BenchError::Aborted(3));
    }
}
