use std::sync::Arc;

use super::bucket::Bucket;
use super::intake::Event;
use super::node::{self, TimerNode};

/// The rotating spoke array. A timer with expiry `e` lives in spoke
/// `(e / tick_ms) % size` and is collected on the first pass where the
/// current time has reached it. A timer further out than one full
/// revolution is skipped on each pass until its expiry comes around, so the
/// worst extra delay for such a timer is about `size * tick_ms`.
///
/// The wheel keeps no clock of its own; `advance` is driven with the
/// caller's notion of "now" in milliseconds.
pub(crate) struct Wheel {
    buckets: Box<[Bucket]>,
    tick_ms: u64,
    last_ms: u64,
}

impl Wheel {
    pub(crate) fn new(size: usize, tick_ms: u64) -> Self {
        let buckets = (0..size).map(|_| Bucket::new()).collect::<Vec<_>>();
        Wheel {
            buckets: buckets.into_boxed_slice(),
            tick_ms,
            last_ms: 0,
        }
    }

    fn bucket_index(&self, expiry: u64) -> usize {
        ((expiry / self.tick_ms) % self.buckets.len() as u64) as usize
    }

    /// Fold one drained intake event into the spokes. Worker thread only.
    pub(crate) fn apply(&mut self, event: Event) {
        match event {
            Event::Register(timer) => {
                // The producer may have canceled between pushing Register
                // and this drain; the flag is ordered before the push.
                if timer.is_canceled() {
                    return;
                }
                let index = self.bucket_index(timer.expiry());
                self.buckets[index].add(timer);
            }
            Event::Cancel(timer) => {
                timer.mark_canceled();
                unsafe {
                    if timer.is_linked() {
                        drop(node::unlink(&timer));
                    }
                }
            }
        }
    }

    /// Advance to `now`, pruning every spoke the wheel passed over since the
    /// previous call. The pass count is clamped to one full revolution so a
    /// long stall (GC-style pause, suspended host) costs at most `size`
    /// prunes, and a clock that has not moved costs none.
    pub(crate) fn advance(&mut self, now: u64, expired: &mut Vec<Arc<TimerNode>>) {
        let last_index = self.last_ms / self.tick_ms;
        let now_index = now / self.tick_ms;
        let ticks = now_index
            .saturating_sub(last_index)
            .min(self.buckets.len() as u64);

        for i in 0..ticks {
            let slot = ((last_index + i) % self.buckets.len() as u64) as usize;
            self.buckets[slot].prune(now, expired);
        }
        self.last_ms = self.last_ms.max(now);
    }
}
