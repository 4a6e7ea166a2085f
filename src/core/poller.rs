//! Reading requests, single-shot or periodic
//!
//! The poller never owns a timer itself. Periodic mode subscribes to a
//! [`Ticker`], which delivers ticks tagged with the poll session id back to
//! whoever drives the poller; [`Poller::on_tick`] turns a tick into a write.
//! Stopping unsubscribes from the ticker, and any tick still in flight for
//! the old session is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::codec::Command;
use super::connection::ConnectionManager;
use super::SensorError;

/// Source of periodic ticks
pub trait Ticker: Send {
    /// Start delivering ticks for `poll_id` every `interval`,
    /// replacing any previous subscription
    fn subscribe(&mut self, poll_id: u64, interval: Duration);

    /// Stop delivering ticks. Idempotent.
    fn unsubscribe(&mut self);
}

/// Ticker that never ticks; for one-shot use without periodic polling
#[derive(Debug, Default)]
pub struct NoTicker;

impl Ticker for NoTicker {
    fn subscribe(&mut self, _poll_id: u64, _interval: Duration) {}
    fn unsubscribe(&mut self) {}
}

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollerState {
    /// Not polling
    #[default]
    Idle,
    /// Requesting a reading every interval
    Active,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// An active periodic poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSession {
    /// Session id carried by this session's ticks
    pub id: u64,
    /// Tick interval
    pub interval: Duration,
}

impl PollSession {
    /// Interval in milliseconds
    pub fn interval_ms(&self) -> u64 {
        u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Issues "request reading" commands
pub struct Poller {
    ticker: Box<dyn Ticker>,
    session: Option<PollSession>,
    next_id: u64,
}

impl Poller {
    /// Create an idle poller
    pub fn new(ticker: Box<dyn Ticker>) -> Self {
        Self {
            ticker,
            session: None,
            next_id: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> PollerState {
        if self.session.is_some() {
            PollerState::Active
        } else {
            PollerState::Idle
        }
    }

    /// Active session, if any
    pub fn session(&self) -> Option<PollSession> {
        self.session
    }

    /// Send one request right away. Does not touch the poll state.
    pub fn start_single(&self, conn: &mut ConnectionManager) -> Result<(), SensorError> {
        conn.write(Command::RequestReading)
    }

    /// Idle → Active. Requires an open connection.
    ///
    /// If a session is already active it is replaced, so there is never more
    /// than one tick subscription.
    pub fn start_periodic(
        &mut self,
        conn: &ConnectionManager,
        interval: Duration,
    ) -> Result<PollSession, SensorError> {
        if !conn.is_open() {
            return Err(SensorError::NotConnected);
        }
        if interval.is_zero() {
            return Err(SensorError::InvalidInterval(0));
        }

        self.stop();

        self.next_id += 1;
        let session = PollSession {
            id: self.next_id,
            interval,
        };
        self.ticker.subscribe(session.id, interval);
        self.session = Some(session);
        tracing::debug!("Polling every {:?} (session {})", interval, session.id);
        Ok(session)
    }

    /// Active → Idle. Returns false if already idle.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        self.ticker.unsubscribe();
        tracing::debug!("Polling session {} stopped", session.id);
        true
    }

    /// Handle a tick. Writes only if `poll_id` is the active session.
    ///
    /// Returns whether a request was sent.
    pub fn on_tick(&mut self, poll_id: u64, conn: &mut ConnectionManager) -> Result<bool, SensorError> {
        match self.session {
            Some(session) if session.id == poll_id => {
                conn.write(Command::RequestReading)?;
                Ok(true)
            }
            _ => {
                tracing::trace!("Ignoring stale tick {}", poll_id);
                Ok(false)
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
