// Copyright (c) 2026 Mesh Coordination Authors.
//
// Licensed under the MIT license <LICENSE-MIT https://opensource.org/licenses/MIT> or the
// Modified BSD license <LICENSE-BSD https://opensource.org/licenses/BSD-3-Clause>, at your
// option. This file may not be copied, modified, or distributed except according to those
// terms.

use crate::arbiter::message::{FaultMessage, SiteFailureForwardMessage, SiteFailureMessage};
use crate::hsid::Hsid;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// The wire-level subjects the arbiter routes on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Subject {
    Failure,
    SiteFailureUpdate,
    SiteFailureForward,
}

/// A message in flight, tagged with the subject it was sent on. The payload types
/// themselves stay free of any notion of subject or transport.
#[derive(Clone, Debug)]
pub enum WireMessage {
    Failure(FaultMessage),
    SiteFailureUpdate(SiteFailureMessage),
    SiteFailureForward(SiteFailureForwardMessage),
}

impl WireMessage {
    pub fn subject(&self) -> Subject {
        match self {
            WireMessage::Failure(_) => Subject::Failure,
            WireMessage::SiteFailureUpdate(_) => Subject::SiteFailureUpdate,
            WireMessage::SiteFailureForward(_) => Subject::SiteFailureForward,
        }
    }
}

/// The mailbox abstraction the arbiter is driven through. The real implementation
/// lives outside this crate (it owns transport, retries, and peer liveness); this
/// trait only states the contract the driver depends on.
pub trait Mailbox {
    /// Fire-and-forget broadcast to `dests`.
    fn send(&self, dests: &[Hsid], msg: WireMessage);

    /// Non-blocking receive of the next queued message whose subject is in `subjects`.
    fn recv(&self, subjects: &[Subject]) -> Option<WireMessage>;

    /// Blocking receive, with a timeout, of the next queued message whose subject is
    /// in `subjects`.
    fn recv_blocking(&self, subjects: &[Subject], timeout: Duration) -> Option<WireMessage>;

    /// Pushes `msg` back onto the head of the queue, to be redelivered on the next
    /// receive call.
    fn deliver_front(&self, msg: WireMessage);
}

/// An in-process mailbox used by this crate's own tests. Not part of the public
/// contract the surrounding system relies on.
pub struct InProcessMailbox {
    inbox: Mutex<VecDeque<WireMessage>>,
    notify: Condvar,
}

impl Default for InProcessMailbox {
    fn default() -> Self {
        InProcessMailbox {
            inbox: Mutex::new(VecDeque::new()),
            notify: Condvar::new(),
        }
    }
}

impl InProcessMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: injects a message directly, as if it had arrived over the wire.
    pub fn deliver(&self, msg: WireMessage) {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.push_back(msg);
        self.notify.notify_all();
    }

    fn take_matching(inbox: &mut VecDeque<WireMessage>, subjects: &[Subject]) -> Option<WireMessage> {
        let pos = inbox.iter().position(|m| subjects.contains(&m.subject()))?;
        inbox.remove(pos)
    }
}

impl Mailbox for InProcessMailbox {
    fn send(&self, _dests: &[Hsid], msg: WireMessage) {
        // This test double has no addressing: every "send" is self-delivery, which
        // is sufficient for the scenarios this crate exercises directly against it.
        self.deliver(msg);
    }

    fn recv(&self, subjects: &[Subject]) -> Option<WireMessage> {
        let mut inbox = self.inbox.lock().unwrap();
        Self::take_matching(&mut inbox, subjects)
    }

    fn recv_blocking(&self, subjects: &[Subject], timeout: Duration) -> Option<WireMessage> {
        let mut inbox = self.inbox.lock().unwrap();
        if let Some(msg) = Self::take_matching(&mut inbox, subjects) {
            return Some(msg);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self.notify.wait_timeout(inbox, deadline - now).unwrap();
            inbox = guard;
            if let Some(msg) = Self::take_matching(&mut inbox, subjects) {
                return Some(msg);
            }
            if result.timed_out() {
                return None;
            }
        }
    }

    fn deliver_front(&self, msg: WireMessage) {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.push_front(msg);
        self.notify.notify_all();
    }
}

/// A mailbox shared across threads delegates straight to the wrapped implementation,
/// so a mesh transport can be handed out as `Arc<dyn Mailbox>` without a newtype.
impl<T: Mailbox + ?Sized> Mailbox for Arc<T> {
    fn send(&self, dests: &[Hsid], msg: WireMessage) {
        (**self).send(dests, msg)
    }

    fn recv(&self, subjects: &[Subject]) -> Option<WireMessage> {
        (**self).recv(subjects)
    }

    fn recv_blocking(&self, subjects: &[Subject], timeout: Duration) -> Option<WireMessage> {
        (**self).recv_blocking(subjects, timeout)
    }

    fn deliver_front(&self, msg: WireMessage) {
        (**self).deliver_front(msg)
    }
}
