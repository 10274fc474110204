//! Background link task: routing and keepalive on one dedicated thread.
//!
//! Runs an `edge-executor` with `async-io-mini` timers (no busy-spinning).
//! Two concurrent futures share the session:
//!
//! 1. **Route**: `Session::poll_once` every `poll_interval_ms`
//! 2. **Keepalive**: `Session::send_keepalive` every `keepalive_interval_ms`
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │  arctic-link thread                          │
//!  │  ┌────────────────────────────────────────┐  │
//!  │  │  futures_lite::block_on                │  │
//!  │  │  ┌──────────────────────────────────┐  │  │
//!  │  │  │  edge_executor::LocalExecutor    │  │  │
//!  │  │  │   ┌─────────┐    ┌───────────┐   │  │  │
//!  │  │  │   │ Route   │    │ Keepalive │   │  │  │
//!  │  │  │   │ 10ms ⏱  │    │ 2s ⏱      │   │  │  │
//!  │  │  │   └─────────┘    └───────────┘   │  │  │
//!  │  │  └──────────────────────────────────┘  │  │
//!  │  └────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────┘
//! ```
//!
//! This thread is the only caller of `poll_once`, so it is the only writer
//! of the connection flag. Application threads reach the link through
//! their channel handles.

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;
use std::sync::Arc;

use log::info;

use super::session::Session;
use crate::app::ports::Clock;

/// Task stack on the device; the host uses the platform default.
#[cfg(target_os = "espidf")]
const IO_STACK_SIZE: usize = 16 * 1024;

type SharedSession = Rc<RefCell<Session>>;

async fn route_loop(session: SharedSession, clock: Arc<dyn Clock>, period: Duration) {
    loop {
        session.borrow_mut().poll_once(clock.now_ms());
        async_io_mini::Timer::after(period).await;
    }
}

async fn keepalive_loop(session: SharedSession, period: Duration) {
    loop {
        async_io_mini::Timer::after(period).await;
        session.borrow().send_keepalive();
    }
}

fn run(session: Session, clock: Arc<dyn Clock>) {
    let poll = Duration::from_millis(u64::from(session.config().poll_interval_ms));
    let keepalive = Duration::from_millis(u64::from(session.config().keepalive_interval_ms));

    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let session: SharedSession = Rc::new(RefCell::new(session));

    executor
        .spawn(route_loop(Rc::clone(&session), clock, poll))
        .detach();
    executor
        .spawn(keepalive_loop(Rc::clone(&session), keepalive))
        .detach();

    info!(
        "LINK: io task started (poll {}ms, keepalive {}ms)",
        poll.as_millis(),
        keepalive.as_millis()
    );

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Move a started session onto its own thread and run it forever.
///
/// Channel handles and the OTA handle stay usable from the caller: clone
/// the `Arc`s before handing the session over.
pub fn spawn(session: Session, clock: Arc<dyn Clock>) -> std::io::Result<std::thread::JoinHandle<()>> {
    let builder = std::thread::Builder::new().name("arctic-link".into());
    #[cfg(target_os = "espidf")]
    let builder = builder.stack_size(IO_STACK_SIZE);
    builder.spawn(move || run(session, clock))
}
