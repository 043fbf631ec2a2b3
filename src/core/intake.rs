use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use super::node::TimerNode;

/// What producers ask of the worker.
pub(crate) enum Event {
    Register(Arc<TimerNode>),
    Cancel(Arc<TimerNode>),
}

struct Envelope {
    event: Event,
    next: *mut Envelope,
}

/// Lock-free LIFO intake from producer threads to the worker.
///
/// `push` CAS-loops a new head in; `drain` swaps the whole chain out with a
/// null terminator standing in for the empty state. Drained events come back
/// in reverse arrival order, which the worker-side fold tolerates: a Cancel
/// met before its Register only sets the flag, and the Register then sees it.
pub(crate) struct EventStack {
    head: AtomicPtr<Envelope>,
}

impl EventStack {
    pub(crate) fn new() -> Self {
        EventStack {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Any thread. Lock-free; retries only when another producer won the CAS.
    pub(crate) fn push(&self, event: Event) {
        let env = Box::into_raw(Box::new(Envelope {
            event,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*env).next = head };
            match self
                .head
                .compare_exchange_weak(head, env, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Worker only: take the whole chain in one swap and walk it.
    pub(crate) fn drain(&self) -> Drain {
        Drain {
            cur: self.head.swap(ptr::null_mut(), Ordering::Acquire),
        }
    }
}

impl Drop for EventStack {
    fn drop(&mut self) {
        // Free whatever was pushed after the worker stopped draining.
        drop(Drain {
            cur: *self.head.get_mut(),
        });
    }
}

pub(crate) struct Drain {
    cur: *mut Envelope,
}

impl Iterator for Drain {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.cur.is_null() {
            return None;
        }
        let env = unsafe { Box::from_raw(self.cur) };
        self.cur = env.next;
        Some(env.event)
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        while self.next().is_some() {}
    }
}
