use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::basic::ExecuteError;
use crate::time_wheel::{Executor, Task};

/// A single scheduled timer, doubly linked into at most one bucket.
///
/// Producers only ever touch `canceled`; the task cell and the `prev`/`next`
/// links belong to the wheel worker alone. That single-writer rule is what
/// makes the unsafe `Send`/`Sync` impls below hold.
pub(crate) struct TimerNode {
    expiry: u64,
    canceled: AtomicBool,
    task: UnsafeCell<Option<Task>>,
    exec: Option<Arc<dyn Executor>>,
    prev: UnsafeCell<*const TimerNode>,
    next: UnsafeCell<*const TimerNode>,
}

unsafe impl Send for TimerNode {}
unsafe impl Sync for TimerNode {}

impl TimerNode {
    pub(crate) fn new(task: Task, exec: Arc<dyn Executor>, expiry: u64) -> Self {
        TimerNode {
            expiry,
            canceled: AtomicBool::new(false),
            task: UnsafeCell::new(Some(task)),
            exec: Some(exec),
            prev: UnsafeCell::new(ptr::null()),
            next: UnsafeCell::new(ptr::null()),
        }
    }

    /// Empty head node anchoring a bucket's chain. Never fired, never unlinked.
    pub(crate) fn sentinel() -> Self {
        TimerNode {
            expiry: 0,
            canceled: AtomicBool::new(false),
            task: UnsafeCell::new(None),
            exec: None,
            prev: UnsafeCell::new(ptr::null()),
            next: UnsafeCell::new(ptr::null()),
        }
    }

    pub(crate) fn expiry(&self) -> u64 {
        self.expiry
    }

    pub(crate) fn mark_canceled(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    // Link accessors. Worker thread only.

    pub(crate) unsafe fn next_ptr(&self) -> *const TimerNode {
        *self.next.get()
    }

    pub(crate) unsafe fn prev_ptr(&self) -> *const TimerNode {
        *self.prev.get()
    }

    pub(crate) unsafe fn set_next(&self, to: *const TimerNode) {
        *self.next.get() = to;
    }

    pub(crate) unsafe fn set_prev(&self, to: *const TimerNode) {
        *self.prev.get() = to;
    }

    /// Every linked node has a predecessor (the sentinel at least).
    pub(crate) unsafe fn is_linked(&self) -> bool {
        !(*self.prev.get()).is_null()
    }

    /// Hand the callback to its executor. At most one call ever takes the
    /// task out of the cell; a canceled node is left untouched. Worker
    /// thread only.
    pub(crate) unsafe fn fire(&self, faults: &dyn Fn(ExecuteError)) {
        if self.is_canceled() {
            return;
        }
        if let (Some(task), Some(exec)) = ((*self.task.get()).take(), self.exec.as_ref()) {
            if let Err(err) = exec.execute(task) {
                faults(err);
            }
        }
    }
}

/// Detach `node` from its chain and reclaim the strong reference the chain
/// holds (the one leaked by `Bucket::add`).
///
/// The caller must be the worker thread and must know the node is linked.
pub(crate) unsafe fn unlink(node: &TimerNode) -> Arc<TimerNode> {
    let prev = node.prev_ptr();
    debug_assert!(!prev.is_null(), "unlink of an unlinked node");

    // The predecessor's next field is the exact pointer Bucket::add leaked.
    let raw = (*prev).next_ptr();
    debug_assert!(ptr::eq(raw, node));

    let next = node.next_ptr();
    (*prev).set_next(next);
    if !next.is_null() {
        (*next).set_prev(prev);
    }
    node.set_prev(ptr::null());
    node.set_next(ptr::null());

    Arc::from_raw(raw)
}
