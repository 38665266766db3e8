//! [`LinkWatchdog`] – remote link liveness.
//!
//! The receiver stamps every remote-control frame on arrival.  The link is
//! alive while the newest stamp is no older than the timeout; before the
//! first frame it is lost.

use std::time::{Duration, Instant};

/// Frames older than this mean the remote control is off or out of range.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_millis(200);

/// Health of the remote link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    Alive,
    Lost,
}

/// Tracks the newest frame stamp of the remote link.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use engineer_kernel::link_watchdog::{LinkHealth, LinkWatchdog};
///
/// let mut wd = LinkWatchdog::new(Duration::from_millis(200));
/// let t0 = Instant::now();
/// assert_eq!(wd.health(t0), LinkHealth::Lost);
///
/// wd.heartbeat(t0);
/// assert_eq!(wd.health(t0 + Duration::from_millis(150)), LinkHealth::Alive);
/// assert_eq!(wd.health(t0 + Duration::from_millis(250)), LinkHealth::Lost);
/// ```
#[derive(Debug, Clone)]
pub struct LinkWatchdog {
    timeout: Duration,
    last_heartbeat: Option<Instant>,
}

impl Default for LinkWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_TIMEOUT)
    }
}

impl LinkWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_heartbeat: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Record a frame received at `stamp`.  Older stamps than the newest one
    /// seen are ignored.
    pub fn heartbeat(&mut self, stamp: Instant) {
        match self.last_heartbeat {
            Some(last) if last >= stamp => {}
            _ => self.last_heartbeat = Some(stamp),
        }
    }

    /// Health of the link as seen at `now`.
    pub fn health(&self, now: Instant) -> LinkHealth {
        match self.last_heartbeat {
            Some(last) if now.saturating_duration_since(last) <= self.timeout => LinkHealth::Alive,
            _ => LinkHealth::Lost,
        }
    }

    pub fn is_alive(&self, now: Instant) -> bool {
        self.health(now) == LinkHealth::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_before_first_heartbeat() {
        let wd = LinkWatchdog::default();
        assert_eq!(wd.health(Instant::now()), LinkHealth::Lost);
        assert_eq!(wd.timeout(), DEFAULT_LINK_TIMEOUT);
    }

    #[test]
    fn heartbeat_keeps_link_alive() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(20));
        let t0 = Instant::now();
        wd.heartbeat(t0);
        wd.heartbeat(t0 + Duration::from_millis(15));
        assert!(wd.is_alive(t0 + Duration::from_millis(30)));
    }

    #[test]
    fn silent_link_is_lost() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(20));
        let t0 = Instant::now();
        wd.heartbeat(t0);
        assert_eq!(wd.health(t0 + Duration::from_millis(21)), LinkHealth::Lost);
    }

    #[test]
    fn exact_timeout_is_still_alive() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(200));
        let t0 = Instant::now();
        wd.heartbeat(t0);
        assert!(wd.is_alive(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn stale_stamp_does_not_rewind() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(20));
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(50);
        wd.heartbeat(t1);
        wd.heartbeat(t0);
        assert_eq!(wd.last_heartbeat(), Some(t1));
    }

    #[test]
    fn future_stamp_counts_as_alive() {
        let mut wd = LinkWatchdog::default();
        let t0 = Instant::now();
        wd.heartbeat(t0 + Duration::from_millis(5));
        assert!(wd.is_alive(t0));
    }
}
