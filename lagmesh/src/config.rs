//! Delay bounds and shaping tree parameters.

use lagmesh_tc::{op::DEFAULT_NETEM_LIMIT, port::MAX_PRIO_BANDS};

use crate::error::{Error, Result};

/// Port of peer 0. Peer `i` sends from and receives on `DEFAULT_BASE_PORT + i`.
pub const DEFAULT_BASE_PORT: u16 = 10_000;

/// Default lower bound of generated delays, in milliseconds.
pub const DEFAULT_MIN_DELAY_MS: u32 = 50;

/// Default upper bound of generated delays, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u32 = 150;

/// Largest supported peer count: every classifier needs one band per peer and a `prio` qdisc
/// has at most 16.
pub const MAX_PEERS: usize = MAX_PRIO_BANDS as usize;

/// Inclusive bounds for generated one-way delays, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBounds {
    /// Smallest delay drawn.
    pub min: u32,
    /// Largest delay drawn.
    pub max: u32,
}

impl Default for DelayBounds {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_DELAY_MS, max: DEFAULT_MAX_DELAY_MS }
    }
}

impl DelayBounds {
    /// Bounds `min..=max`. See [`DelayBounds::validate`].
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Bounds producing the same delay for every pair.
    pub const fn fixed(delay_ms: u32) -> Self {
        Self { min: delay_ms, max: delay_ms }
    }

    /// Reject `min > max`.
    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(Error::InvertedBounds { min: self.min, max: self.max });
        }
        Ok(())
    }

    /// Whether `delay_ms` lies within the bounds.
    pub const fn contains(&self, delay_ms: u32) -> bool {
        self.min <= delay_ms && delay_ms <= self.max
    }
}

/// Parameters of the shaping tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapingConfig {
    /// Port of peer 0.
    pub base_port: u16,
    /// Preference of every installed filter.
    pub filter_priority: u16,
    /// Queue limit of every delay shaper, in packets.
    pub netem_limit: u32,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            filter_priority: 1,
            netem_limit: DEFAULT_NETEM_LIMIT,
        }
    }
}

impl ShapingConfig {
    /// Set the port of peer 0.
    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    /// Set the preference of every filter.
    pub fn with_filter_priority(mut self, filter_priority: u16) -> Self {
        self.filter_priority = filter_priority;
        self
    }

    /// Set the queue limit of every delay shaper.
    pub fn with_netem_limit(mut self, netem_limit: u32) -> Self {
        self.netem_limit = netem_limit;
        self
    }

    /// The port identifying `peer`, if it fits in 16 bits.
    pub fn port_of(&self, peer: usize) -> Option<u16> {
        u16::try_from(peer).ok().and_then(|offset| self.base_port.checked_add(offset))
    }

    /// Check that a tree for `peers` peers can be built with this configuration.
    pub fn validate_peers(&self, peers: usize) -> Result<()> {
        if peers == 0 {
            return Err(Error::NoPeers);
        }
        if peers > MAX_PEERS {
            return Err(Error::TooManyPeers { peers, max: MAX_PEERS });
        }
        if self.port_of(peers - 1).is_none() {
            return Err(Error::PortRange { base_port: self.base_port, peers });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds() {
        let bounds = DelayBounds::default();
        assert_eq!((bounds.min, bounds.max), (50, 150));
        assert!(bounds.validate().is_ok());
        assert!(bounds.contains(50) && bounds.contains(150) && !bounds.contains(151));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = DelayBounds::new(10, 5).validate().unwrap_err();
        assert!(matches!(err, Error::InvertedBounds { min: 10, max: 5 }));
        assert!(err.is_invalid_argument());
        assert!(DelayBounds::fixed(0).validate().is_ok());
    }

    #[test]
    fn peer_limits() {
        let config = ShapingConfig::default();
        assert!(matches!(config.validate_peers(0), Err(Error::NoPeers)));
        assert!(config.validate_peers(1).is_ok());
        assert!(config.validate_peers(MAX_PEERS).is_ok());
        assert!(matches!(
            config.validate_peers(MAX_PEERS + 1),
            Err(Error::TooManyPeers { peers: 17, max: 16 })
        ));
    }

    #[test]
    fn port_range() {
        let config = ShapingConfig::default().with_base_port(65_530);
        assert_eq!(config.port_of(5), Some(65_535));
        assert_eq!(config.port_of(6), None);
        assert!(config.validate_peers(6).is_ok());
        assert!(matches!(config.validate_peers(7), Err(Error::PortRange { .. })));
    }
}
