//! OTA firmware update channel.
//!
//! Flow: `SETUP -s <size> -md5 <hash>` → `READY` → N × chunk → `ACK` each →
//! `DONE` once the target reports every byte written and the digest
//! matches. The caller restarts the device afterwards.
//!
//! ```text
//!   Idle ──SETUP──▶ AwaitingSetup ──begin ok──▶ Transferring ──finished──▶ Idle (Completed)
//!                         │ begin err                │ overflow / short write /
//!                         ▼                          │ digest mismatch / end err
//!                       Idle (ERROR)                 ├──────────────▶ Idle (ERROR)
//!                                                    │ inactivity > timeout
//!                                                    ├──────────────▶ Idle (TIMEOUT)
//!                                                    │ peer lost
//!                                                    └──────────────▶ Idle (silent)
//! ```
//!
//! Every acknowledgement is tagged `KIND[n]` with a counter that starts at
//! 0 for each transfer, so the companion can spot duplicates and drops.
//! Acknowledgements bypass the uplink gate.
//!
//! Lock order: OTA state, then transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::registry::ChannelIds;
use super::session::{Gate, SessionContext};
use crate::app::ports::{DigestAccumulator, FirmwareTarget};
use crate::channel::ChannelCore;
use crate::command::Command;
use crate::error::{OtaError, SendError, SessionError};
use crate::protocol::{AckKind, HIDE, OTA_DIGEST_FLAG, OTA_SETUP, OTA_SIZE_FLAG, SHOW};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    /// `SETUP` parsed, target being opened.
    AwaitingSetup,
    Transferring,
}

/// How the most recent transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaOutcome {
    Completed,
    Failed(OtaError),
    TimedOut,
}

struct Transfer {
    expected_size: u32,
    received: u32,
    expected_digest: heapless::String<32>,
    last_activity_ms: u64,
}

struct OtaInner {
    state: OtaState,
    transfer: Option<Transfer>,
    ack_counter: u32,
    last_outcome: Option<OtaOutcome>,
    target: Box<dyn FirmwareTarget>,
    digest: Box<dyn DigestAccumulator>,
}

pub struct Ota {
    core: ChannelCore,
    inner: Mutex<OtaInner>,
    completed: AtomicBool,
    timeout_ms: u64,
}

impl Ota {
    pub fn new(
        target: Box<dyn FirmwareTarget>,
        digest: Box<dyn DigestAccumulator>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            core: ChannelCore::new("OTA"),
            inner: Mutex::new(OtaInner {
                state: OtaState::Idle,
                transfer: None,
                ack_counter: 0,
                last_outcome: None,
                target,
                digest,
            }),
            completed: AtomicBool::new(false),
            timeout_ms,
        }
    }

    pub fn start(&self, ctx: Arc<SessionContext>, ids: ChannelIds) -> Result<(), SessionError> {
        self.core.bind(ctx, ids)
    }

    pub fn identifiers(&self) -> Option<&ChannelIds> {
        self.core.identifiers()
    }

    pub fn state(&self) -> OtaState {
        self.lock().state
    }

    pub fn last_outcome(&self) -> Option<OtaOutcome> {
        self.lock().last_outcome
    }

    /// Counter value the next acknowledgement will carry.
    pub fn ack_counter(&self) -> u32 {
        self.lock().ack_counter
    }

    /// `(received, expected)` bytes of the running transfer.
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.lock()
            .transfer
            .as_ref()
            .map(|t| (t.received, t.expected_size))
    }

    /// A transfer has completed and the new image awaits a restart.
    pub fn available(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Consume the completion latch.
    pub fn take_completed(&self) -> bool {
        self.completed.swap(false, Ordering::AcqRel)
    }

    pub fn hide(&self) -> Result<(), SendError> {
        self.core.emit(true, HIDE, Gate::Control)
    }

    pub fn show(&self) -> Result<(), SendError> {
        self.core.emit(true, SHOW, Gate::Control)
    }

    /// Handle one inbound payload: a `SETUP` command or an image chunk.
    pub fn deliver(&self, payload: &[u8], now_ms: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if payload.starts_with(OTA_SETUP.as_bytes()) {
            let text = String::from_utf8_lossy(payload);
            let cmd = Command::parse(&text);
            if cmd.base() == OTA_SETUP {
                self.setup(inner, &cmd, now_ms);
                return;
            }
        }
        self.chunk(inner, payload, now_ms);
    }

    /// Abort a transfer that has been idle longer than the timeout.
    pub fn service(&self, now_ms: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(transfer) = inner.transfer.as_ref() else {
            return;
        };
        if now_ms.saturating_sub(transfer.last_activity_ms) <= self.timeout_ms {
            return;
        }
        warn!(
            "OTA: timed out after {} of {} bytes",
            transfer.received, transfer.expected_size
        );
        inner.target.abort();
        self.ack(inner, AckKind::Timeout);
        inner.last_outcome = Some(OtaOutcome::TimedOut);
        Self::clear(inner);
    }

    /// Peer went away: abort without acknowledging.
    pub fn connection_lost(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.transfer.is_none() {
            return;
        }
        warn!("OTA: connection lost, transfer aborted");
        inner.target.abort();
        inner.last_outcome = Some(OtaOutcome::Failed(OtaError::ConnectionLost));
        Self::clear(inner);
    }

    fn setup(&self, inner: &mut OtaInner, cmd: &Command, now_ms: u64) {
        if inner.transfer.is_some() {
            warn!("OTA: setup during transfer, restarting from zero");
            inner.target.abort();
        }
        Self::clear(inner);
        inner.state = OtaState::AwaitingSetup;

        let Some(size) = cmd
            .arg(OTA_SIZE_FLAG)
            .parse::<u32>()
            .ok()
            .filter(|&s| s > 0)
        else {
            return self.fail(inner, OtaError::InvalidSize);
        };

        let digest = cmd.arg(OTA_DIGEST_FLAG);
        let mut expected_digest = heapless::String::<32>::new();
        if digest.len() != 32
            || !digest.bytes().all(|b| b.is_ascii_hexdigit())
            || expected_digest.push_str(digest).is_err()
        {
            return self.fail(inner, OtaError::InvalidDigest);
        }

        if let Err(e) = inner.target.begin(size) {
            return self.fail(inner, OtaError::Begin(e));
        }
        inner.digest.begin();
        inner.transfer = Some(Transfer {
            expected_size: size,
            received: 0,
            expected_digest,
            last_activity_ms: now_ms,
        });
        inner.state = OtaState::Transferring;
        info!("OTA: receiving {} bytes", size);
        self.ack(inner, AckKind::Ready);
    }

    fn chunk(&self, inner: &mut OtaInner, payload: &[u8], now_ms: u64) {
        let Some(transfer) = inner.transfer.as_mut() else {
            debug!("OTA: {} bytes outside a transfer, dropped", payload.len());
            return;
        };
        transfer.last_activity_ms = now_ms;

        let len = payload.len() as u32;
        if transfer.received.saturating_add(len) > transfer.expected_size {
            return self.fail(inner, OtaError::Overflow);
        }
        transfer.received += len;

        inner.digest.add(payload);
        let written = inner.target.write(payload);
        if written != payload.len() {
            if let Some(e) = inner.target.last_error() {
                warn!("OTA: {}", e);
            }
            return self.fail(inner, OtaError::ShortWrite);
        }
        self.ack(inner, AckKind::Ack);

        if inner.target.is_finished() {
            self.finish(inner);
        }
    }

    fn finish(&self, inner: &mut OtaInner) {
        let actual = inner.digest.finalize();
        let matches = inner
            .transfer
            .as_ref()
            .is_some_and(|t| actual.eq_ignore_ascii_case(&t.expected_digest));
        if !matches {
            return self.fail(inner, OtaError::DigestMismatch);
        }
        match inner.target.end() {
            Ok(()) => {
                info!("OTA: image verified, restart to apply");
                self.ack(inner, AckKind::Done);
                inner.last_outcome = Some(OtaOutcome::Completed);
                self.completed.store(true, Ordering::Release);
                Self::clear(inner);
            }
            Err(e) => self.fail(inner, OtaError::End(e)),
        }
    }

    fn fail(&self, inner: &mut OtaInner, error: OtaError) {
        warn!("OTA: {}", error);
        inner.target.abort();
        self.ack(inner, AckKind::Error);
        inner.last_outcome = Some(OtaOutcome::Failed(error));
        Self::clear(inner);
    }

    fn ack(&self, inner: &mut OtaInner, kind: AckKind) {
        let msg = kind.tagged(inner.ack_counter);
        inner.ack_counter = inner.ack_counter.wrapping_add(1);
        if let Err(e) = self.core.emit(false, &msg, Gate::Control) {
            debug!("OTA: {} not sent: {}", msg, e);
        }
    }

    fn clear(inner: &mut OtaInner) {
        inner.state = OtaState::Idle;
        inner.transfer = None;
        inner.ack_counter = 0;
    }

    fn lock(&self) -> MutexGuard<'_, OtaInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
