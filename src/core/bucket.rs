use std::sync::Arc;

use super::node::{self, TimerNode};

/// One spoke of the wheel: a sentinel head whose `next` chain is the live
/// list of timers hashed to this slot.
pub(crate) struct Bucket {
    head: Box<TimerNode>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Bucket {
            head: Box::new(TimerNode::sentinel()),
        }
    }

    /// Link `node` right after the sentinel. The chain keeps one strong
    /// reference until the node is unlinked again.
    pub(crate) fn add(&mut self, node: Arc<TimerNode>) {
        let head: *const TimerNode = &*self.head;
        let raw = Arc::into_raw(node);
        unsafe {
            let first = (*head).next_ptr();
            (*raw).set_prev(head);
            (*raw).set_next(first);
            if !first.is_null() {
                (*first).set_prev(raw);
            }
            (*head).set_next(raw);
        }
    }

    /// Walk the chain once. Canceled nodes are unlinked and released,
    /// nodes with `expiry <= now` are unlinked and handed back for firing,
    /// everything else stays for a later revolution.
    ///
    /// Cancels are normally folded into unlinking while the event queue is
    /// drained, so meeting one here is unexpected; it is logged and removed
    /// all the same.
    pub(crate) fn prune(&mut self, now: u64, expired: &mut Vec<Arc<TimerNode>>) {
        unsafe {
            let mut cur = self.head.next_ptr();
            while !cur.is_null() {
                let timer = &*cur;
                let next = timer.next_ptr();
                if timer.is_canceled() {
                    tracing::warn!(
                        expiry = timer.expiry(),
                        "canceled timer was still linked at prune"
                    );
                    drop(node::unlink(timer));
                } else if timer.expiry() <= now {
                    expired.push(node::unlink(timer));
                }
                cur = next;
            }
        }
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        unsafe {
            let mut cur = self.head.next_ptr();
            while !cur.is_null() {
                let timer = &*cur;
                let next = timer.next_ptr();
                drop(node::unlink(timer));
                cur = next;
            }
        }
    }
}
