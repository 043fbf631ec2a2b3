use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::{Event, EventStack, TimerNode, Wheel};
use crate::{ExecuteError, TimerError, TimerResult};

pub const DEFAULT_WHEEL_SIZE: usize = 512;
pub const DEFAULT_TICK: Duration = Duration::from_millis(200);

/// A callback waiting for its deadline.
pub type Task = Box<dyn FnOnce() + Send>;

/// Anything that accepts a task and eventually runs it: inline, on a pool,
/// on a single-thread loop. Returning `Err` counts as a non-fatal submit
/// failure and goes to the wheel's fault hook; a panic is fatal and takes
/// the worker down with it.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<(), ExecuteError>;
}

/// Runs the task synchronously on whichever thread submits it. For timers
/// fired by the wheel that is the worker thread, so keep the work short and
/// non-blocking.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        task();
        Ok(())
    }
}

struct Shared {
    intake: EventStack,
    alive: AtomicBool,
    origin: Instant,
    tick_ms: u64,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Best-effort cancellation handle returned by `schedule`. Cancelling marks
/// the timer and queues an unlink for the worker's next drain; a callback
/// already handed to its executor still runs.
pub struct Cancellable {
    bound: Option<(Arc<TimerNode>, Arc<Shared>)>,
}

impl Cancellable {
    fn noop() -> Self {
        Cancellable { bound: None }
    }

    fn bound(node: Arc<TimerNode>, shared: Arc<Shared>) -> Self {
        Cancellable {
            bound: Some((node, shared)),
        }
    }

    /// Idempotent; callable from any thread, before or after the fire.
    pub fn cancel(&self) {
        if let Some((node, shared)) = &self.bound {
            node.mark_canceled();
            shared.intake.push(Event::Cancel(Arc::clone(node)));
        }
    }
}

/// Low-resolution approximate timer: a hashed wheel of `wheel_size` spokes
/// advanced every `tick` by a dedicated worker thread. Registration and
/// cancellation are cheap from any thread; expired callbacks are submitted
/// to their executor, never run inline on the producer.
///
/// Accuracy is one tick, and `wheel_size * tick` is the practical scheduling
/// horizon: a timer with a longer delay still fires, but may wait up to one
/// extra revolution of the wheel beyond its deadline.
pub struct TimerWheel {
    shared: Arc<Shared>,
    handler: JoinHandle<()>,
}

impl TimerWheel {
    /// 512 spokes, 200 ms tick.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WHEEL_SIZE, DEFAULT_TICK).expect("default wheel geometry is valid")
    }

    pub fn new(wheel_size: usize, tick: Duration) -> TimerResult<Self> {
        Self::with_fault_hook(wheel_size, tick, |err| {
            tracing::error!(%err, "failed to dispatch an expired timer");
        })
    }

    /// Like `new`, with an override for the non-fatal fault hook invoked
    /// when an executor rejects an expired timer's callback.
    pub fn with_fault_hook<F>(wheel_size: usize, tick: Duration, fault_hook: F) -> TimerResult<Self>
    where
        F: Fn(ExecuteError) + Send + 'static,
    {
        if wheel_size == 0 {
            return Err(TimerError::ZeroWheelSize);
        }
        if tick.as_millis() == 0 {
            return Err(TimerError::ZeroTick);
        }
        let tick_ms =
            u64::try_from(tick.as_millis()).map_err(|_| TimerError::TickOutOfRange(tick))?;

        let shared = Arc::new(Shared {
            intake: EventStack::new(),
            alive: AtomicBool::new(true),
            origin: Instant::now(),
            tick_ms,
        });
        let worker = Worker {
            wheel: Wheel::new(wheel_size, tick_ms),
            shared: Arc::clone(&shared),
            fault_hook: Box::new(fault_hook),
        };
        let handler = thread::Builder::new()
            .name(format!("tickwheel-{}x{}ms", wheel_size, tick_ms))
            .spawn(move || worker.run())
            .expect("failed to spawn timer wheel worker");

        Ok(TimerWheel { shared, handler })
    }

    /// Schedule `task` to run inline on the worker thread after `delay`.
    /// Reserved for short, non-blocking work; anything heavier belongs on
    /// its own executor via `schedule_on`.
    pub fn schedule<F>(&self, task: F, delay: Duration) -> TimerResult<Cancellable>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_on(task, Arc::new(DirectExecutor), delay)
    }

    /// Schedule `task` to be submitted to `executor` once `delay` has
    /// passed, give or take one tick. A zero delay bypasses the wheel: the
    /// task is submitted on the calling thread right away and the returned
    /// handle cancels nothing.
    pub fn schedule_on<F>(
        &self,
        task: F,
        executor: Arc<dyn Executor>,
        delay: Duration,
    ) -> TimerResult<Cancellable>
    where
        F: FnOnce() + Send + 'static,
    {
        let delay_ms =
            u64::try_from(delay.as_millis()).map_err(|_| TimerError::DelayOutOfRange(delay))?;
        if !self.shared.alive.load(Ordering::Acquire) {
            return Err(TimerError::NotRunning);
        }
        if delay_ms == 0 {
            executor.execute(Box::new(task))?;
            return Ok(Cancellable::noop());
        }

        let expiry = self
            .shared
            .now_ms()
            .checked_add(delay_ms)
            .ok_or(TimerError::DelayOutOfRange(delay))?;
        let node = Arc::new(TimerNode::new(Box::new(task), executor, expiry));
        self.shared
            .intake
            .push(Event::Register(Arc::clone(&node)));
        Ok(Cancellable::bound(node, Arc::clone(&self.shared)))
    }

    /// Stop the worker after its current tick and fail all later `schedule`
    /// calls. Returns immediately; timers still queued when the worker
    /// exits are released without firing.
    pub fn shutdown(&self) {
        self.shared.alive.store(false, Ordering::Release);
        self.handler.thread().unpark();
    }
}

impl Drop for TimerWheel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the alive flag when the worker unwinds, so a panicking executor
/// (fatal per the dispatch contract) also flips `schedule` into the
/// not-running failure path.
struct AliveGuard(Arc<Shared>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.alive.store(false, Ordering::Release);
    }
}

struct Worker {
    wheel: Wheel,
    shared: Arc<Shared>,
    fault_hook: Box<dyn Fn(ExecuteError) + Send>,
}

impl Worker {
    fn run(mut self) {
        let _alive = AliveGuard(Arc::clone(&self.shared));
        tracing::debug!("timer wheel worker running");

        let mut expired = Vec::new();
        loop {
            for event in self.shared.intake.drain() {
                self.wheel.apply(event);
            }

            let now = self.shared.now_ms();
            self.wheel.advance(now, &mut expired);
            for timer in expired.drain(..) {
                // Worker thread: the only caller of fire.
                unsafe { timer.fire(&*self.fault_hook) };
            }

            if !self.shared.alive.load(Ordering::Acquire) {
                break;
            }

            let spent = self.shared.now_ms().saturating_sub(now);
            if spent < self.shared.tick_ms {
                thread::park_timeout(Duration::from_millis(self.shared.tick_ms - spent));
            }
        }

        tracing::debug!("timer wheel worker stopped");
        // Dropping the wheel here releases every bucket and its chain.
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use rand::Rng;

    use super::*;

    struct FailingExecutor;

    impl Executor for FailingExecutor {
        fn execute(&self, _task: Task) -> Result<(), ExecuteError> {
            Err(ExecuteError::new("queue full"))
        }
    }

    struct CountingExecutor(AtomicUsize);

    impl Executor for CountingExecutor {
        fn execute(&self, task: Task) -> Result<(), ExecuteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            task();
            Ok(())
        }
    }

    #[test]
    fn construction_rejects_bad_geometry() {
        assert_eq!(
            TimerWheel::new(0, Duration::from_millis(50)).err(),
            Some(TimerError::ZeroWheelSize)
        );
        assert_eq!(
            TimerWheel::new(8, Duration::from_micros(100)).err(),
            Some(TimerError::ZeroTick)
        );
    }

    #[test]
    fn fires_inside_the_expected_window() {
        let wheel = TimerWheel::new(4, Duration::from_millis(50)).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let start = Instant::now();
        wheel
            .schedule(move || tx.send(Instant::now()).unwrap(), Duration::from_millis(75))
            .unwrap();

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let elapsed = fired_at.duration_since(start);
        // Lower bound has a millisecond of truncation slack; the upper
        // bound is one tick plus generous room for a loaded machine.
        assert!(elapsed >= Duration::from_millis(74), "fired early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(600), "fired late: {elapsed:?}");
    }

    #[test]
    fn a_thousand_timers_all_fire_once() {
        const COUNT: usize = 1_000;

        let wheel = TimerWheel::new(8, Duration::from_millis(10)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        let start = Instant::now();
        for _ in 0..COUNT {
            let tx = tx.clone();
            wheel
                .schedule(move || tx.send(Instant::now()).unwrap(), Duration::from_millis(25))
                .unwrap();
        }

        for _ in 0..COUNT {
            let fired_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let elapsed = fired_at.duration_since(start);
            assert!(elapsed >= Duration::from_millis(24), "fired early: {elapsed:?}");
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancel_well_before_expiry_suppresses_the_fire() {
        let wheel = TimerWheel::new(16, Duration::from_millis(20)).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let target = Arc::clone(&fired);
        let handle = wheel
            .schedule(
                move || {
                    target.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(400),
            )
            .unwrap();
        handle.cancel();
        handle.cancel();

        thread::sleep(Duration::from_millis(700));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_dispatch_reaches_the_fault_hook_once() {
        let faults = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&faults);
        let wheel = TimerWheel::with_fault_hook(8, Duration::from_millis(10), move |err| {
            assert_eq!(err, ExecuteError::new("queue full"));
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        wheel
            .schedule_on(|| {}, Arc::new(FailingExecutor), Duration::from_millis(10))
            .unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(faults.load(Ordering::SeqCst), 1);

        // The wheel survives the fault and keeps dispatching.
        let (tx, rx) = crossbeam_channel::bounded(1);
        wheel
            .schedule(move || tx.send(()).unwrap(), Duration::from_millis(10))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_delay_runs_synchronously_and_skips_the_wheel() {
        let wheel = TimerWheel::new(8, Duration::from_millis(50)).unwrap();
        let executor = Arc::new(CountingExecutor(AtomicUsize::new(0)));

        let caller = thread::current().id();
        let ran_on = Arc::new(std::sync::Mutex::new(None));
        let slot = Arc::clone(&ran_on);
        let handle = wheel
            .schedule_on(
                move || *slot.lock().unwrap() = Some(thread::current().id()),
                Arc::clone(&executor) as Arc<dyn Executor>,
                Duration::ZERO,
            )
            .unwrap();

        // Already ran, on this very thread, before schedule returned.
        assert_eq!(executor.0.load(Ordering::SeqCst), 1);
        assert_eq!(*ran_on.lock().unwrap(), Some(caller));
        handle.cancel();
        assert_eq!(executor.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_delay_surfaces_the_rejection_to_the_caller() {
        let wheel = TimerWheel::new(8, Duration::from_millis(50)).unwrap();
        let result = wheel.schedule_on(|| {}, Arc::new(FailingExecutor), Duration::ZERO);
        assert_eq!(
            result.err(),
            Some(TimerError::Rejected(ExecuteError::new("queue full")))
        );
    }

    #[test]
    fn absurd_delay_is_out_of_range() {
        let wheel = TimerWheel::new(8, Duration::from_millis(50)).unwrap();
        let delay = Duration::from_secs(u64::MAX);
        assert_eq!(
            wheel.schedule(|| {}, delay).err(),
            Some(TimerError::DelayOutOfRange(delay))
        );
    }

    #[test]
    fn shutdown_is_monotonic_and_quiescent() {
        const COUNT: usize = 100;

        let wheel = TimerWheel::new(16, Duration::from_millis(20)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut rng = rand::thread_rng();
        for _ in 0..COUNT {
            let tx = tx.clone();
            let delay = Duration::from_millis(rng.gen_range(0..500));
            let _ = wheel.schedule(move || tx.send(Instant::now()).unwrap(), delay);
        }

        thread::sleep(Duration::from_millis(250));
        wheel.shutdown();
        let stopped = Instant::now();

        assert_eq!(
            wheel.schedule(|| {}, Duration::from_millis(10)).err(),
            Some(TimerError::NotRunning)
        );

        // Anything already in flight lands within the current tick plus
        // scheduling slack; after that the wheel is silent.
        thread::sleep(Duration::from_millis(600));
        while let Ok(fired_at) = rx.try_recv() {
            if fired_at > stopped {
                let past = fired_at.duration_since(stopped);
                assert!(past <= Duration::from_millis(300), "fired {past:?} after shutdown");
            }
        }
    }

    #[test]
    fn concurrent_schedule_and_cancel_keep_exact_counts() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let wheel = Arc::new(TimerWheel::new(16, Duration::from_millis(20)).unwrap());
        let fired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let wheel = Arc::clone(&wheel);
                let fired = Arc::clone(&fired);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let fired = Arc::clone(&fired);
                        let handle = wheel
                            .schedule(
                                move || {
                                    fired.fetch_add(1, Ordering::SeqCst);
                                },
                                Duration::from_millis(300),
                            )
                            .unwrap();
                        if i % 2 == 0 {
                            handle.cancel();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        thread::sleep(Duration::from_millis(700));
        assert_eq!(fired.load(Ordering::SeqCst), THREADS * PER_THREAD / 2);
    }
}
