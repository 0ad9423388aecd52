//! The full reset, generate, build sequence.

use lagmesh_tc::CommandPort;
use rand::Rng;

use crate::{
    builder::{build, BuildError, BuildReport},
    config::{DelayBounds, ShapingConfig},
    error::Result,
    matrix::DelayMatrix,
    reset::{reset, ResetOutcome},
};

/// A validated emulation setup: how many peers, how far apart, and how the tree is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emulation {
    peers: usize,
    bounds: DelayBounds,
    config: ShapingConfig,
}

/// The result of [`Emulation::apply`].
///
/// The matrix is always available, whether or not the tree could be built.
#[derive(Debug)]
pub struct Applied {
    /// The generated delays.
    pub matrix: DelayMatrix,
    /// What the reset found.
    pub reset: ResetOutcome,
    /// Outcome of the build.
    pub build: std::result::Result<BuildReport, BuildError>,
}

impl Emulation {
    /// Validate the arguments. Nothing is touched if this fails.
    pub fn new(peers: usize, bounds: DelayBounds, config: ShapingConfig) -> Result<Self> {
        bounds.validate()?;
        config.validate_peers(peers)?;
        Ok(Self { peers, bounds, config })
    }

    /// Number of peers.
    pub const fn peers(&self) -> usize {
        self.peers
    }

    /// Bounds of the generated delays.
    pub const fn bounds(&self) -> DelayBounds {
        self.bounds
    }

    /// Layout parameters of the tree.
    pub const fn config(&self) -> &ShapingConfig {
        &self.config
    }

    /// Clear the interface, draw a delay matrix and build the tree enforcing it.
    ///
    /// Requires exclusive use of the interface for the duration of the call.
    pub fn apply<P, R>(&self, port: &mut P, rng: &mut R) -> Result<Applied>
    where
        P: CommandPort + ?Sized,
        R: Rng + ?Sized,
    {
        let reset = reset(port);
        let matrix = DelayMatrix::generate(self.peers, self.bounds, rng)?;
        let build = build(port, &matrix, &self.config);

        match &build {
            Ok(report) if report.is_clean() => {
                tracing::info!(device = port.device(), peers = self.peers, "latency emulation in place");
            }
            Ok(report) => {
                tracing::warn!(
                    device = port.device(),
                    unrouted = ?report.unrouted_pairs(),
                    "latency emulation partially in place"
                );
            }
            Err(e) => tracing::error!(device = port.device(), %e, "failed to build shaping tree"),
        }

        Ok(Applied { matrix, reset, build })
    }
}
