//! Topology configuration

use std::time::Duration;

use linx_core::{LinxError, LinxResult};

/// Slot budgets and timers for one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Peers connecting to us
    pub max_incoming: usize,
    /// Peers we connect to; must exceed `max_incoming`
    pub max_outgoing: usize,
    /// How long an admitted link may stay unresolved
    pub pending_timeout: Duration,
    /// How often pending links are checked for expiry
    pub sweep_interval: Duration,
    /// Re-announce while incoming slots are free (disabled when `None`)
    pub reannounce_interval: Option<Duration>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            max_incoming: 3,
            max_outgoing: 6,
            pending_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            reannounce_interval: None,
        }
    }
}

impl TopologyConfig {
    pub fn with_slots(mut self, max_incoming: usize, max_outgoing: usize) -> Self {
        self.max_incoming = max_incoming;
        self.max_outgoing = max_outgoing;
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_reannounce_interval(mut self, interval: Duration) -> Self {
        self.reannounce_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> LinxResult<()> {
        if self.max_incoming == 0 {
            return Err(LinxError::Config("max_incoming must be at least 1".into()));
        }
        if self.max_outgoing <= self.max_incoming {
            return Err(LinxError::Config(format!(
                "max_outgoing ({}) must exceed max_incoming ({})",
                self.max_outgoing, self.max_incoming
            )));
        }
        if self.pending_timeout.is_zero() || self.sweep_interval.is_zero() {
            return Err(LinxError::Config("timeouts must be non-zero".into()));
        }
        if matches!(self.reannounce_interval, Some(d) if d.is_zero()) {
            return Err(LinxError::Config("reannounce interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TopologyConfig::default();
        assert_eq!((config.max_incoming, config.max_outgoing), (3, 6));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_outgoing_must_exceed_incoming() {
        assert!(TopologyConfig::default().with_slots(3, 3).validate().is_err());
        assert!(TopologyConfig::default().with_slots(4, 2).validate().is_err());
        assert!(TopologyConfig::default().with_slots(1, 2).validate().is_ok());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = TopologyConfig::default().with_pending_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(LinxError::Config(_))));
        let config = TopologyConfig::default().with_reannounce_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
