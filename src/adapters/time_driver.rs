//! Time driver behind the `async-io-mini` timers used by the io task.
//!
//! `async_io_mini::Timer` schedules its wakeups through `embassy-time-driver`,
//! which links against a single global driver. This module registers it:
//!
//! - **`target_os = "espidf"`**: ticks are `esp_timer_get_time()` microseconds
//!   since boot.
//! - **`not(target_os = "espidf")`**: ticks are microseconds since the first
//!   call, read from `std::time::Instant`.
//!
//! Pending wakers live in a fixed-capacity generic queue. One alarm thread
//! sleeps until the earliest deadline and fires every expired waker.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::task::Waker;
use std::time::Duration;

use embassy_time_driver::Driver;
use embassy_time_queue_utils::Queue;
use log::warn;

/// Stack for the alarm thread; it only walks the queue and calls `wake`.
const ALARM_STACK_SIZE: usize = 4 * 1024;

/// Longest the alarm thread sleeps without a deadline in the queue.
const IDLE_WAIT: Duration = Duration::from_secs(1);

struct Inner {
    queue: Queue,
    alarm_running: bool,
    /// Set when an earlier deadline arrived while the alarm thread slept.
    rescheduled: bool,
    #[cfg(not(target_os = "espidf"))]
    epoch: Option<std::time::Instant>,
}

pub struct LinkTimeDriver {
    inner: Mutex<Inner>,
    signal: Condvar,
}

embassy_time_driver::time_driver_impl!(static DRIVER: LinkTimeDriver = LinkTimeDriver::new());

impl LinkTimeDriver {
    const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: Queue::new(),
                alarm_running: false,
                rescheduled: false,
                #[cfg(not(target_os = "espidf"))]
                epoch: None,
            }),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking waker must not take the timers down with it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(target_os = "espidf")]
    fn ticks(_inner: &mut Inner) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn ticks(inner: &mut Inner) -> u64 {
        let epoch = *inner.epoch.get_or_insert_with(std::time::Instant::now);
        epoch.elapsed().as_micros() as u64
    }

    fn ensure_alarm(&'static self, inner: &mut Inner) {
        if inner.alarm_running {
            return;
        }
        let spawned = std::thread::Builder::new()
            .name("link-alarm".into())
            .stack_size(ALARM_STACK_SIZE)
            .spawn(move || self.alarm_loop());
        match spawned {
            Ok(_) => inner.alarm_running = true,
            Err(e) => warn!("TIMER: alarm thread spawn failed: {}", e),
        }
    }

    fn alarm_loop(&self) {
        let mut inner = self.lock();
        loop {
            let now = Self::ticks(&mut inner);
            // fires every expired waker; returns u64::MAX when empty
            let next = inner.queue.next_expiration(now);
            let wait = if next == u64::MAX {
                IDLE_WAIT
            } else {
                Duration::from_micros(next.saturating_sub(now)).min(IDLE_WAIT)
            };
            inner.rescheduled = false;
            let (guard, _) = self
                .signal
                .wait_timeout_while(inner, wait, |i| !i.rescheduled)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Current driver time in ticks (microseconds).
    pub fn now_ticks() -> u64 {
        DRIVER.now()
    }
}

impl Driver for LinkTimeDriver {
    fn now(&self) -> u64 {
        Self::ticks(&mut self.lock())
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        let mut inner = self.lock();
        DRIVER.ensure_alarm(&mut inner);
        if inner.queue.schedule_wake(at, waker) {
            inner.rescheduled = true;
            self.signal.notify_one();
        }
    }
}
