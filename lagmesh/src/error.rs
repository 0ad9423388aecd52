use lagmesh_tc::PortError;

/// Errors raised before or outside of tree construction.
///
/// Every variant except [`Error::Teardown`] is an invalid argument, detected before anything
/// touches the interface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer count is zero.
    #[error("at least one peer is required")]
    NoPeers,

    /// A classifier cannot hold one band per peer.
    #[error("{peers} peers exceed the maximum of {max}")]
    TooManyPeers {
        /// Requested peer count.
        peers: usize,
        /// Largest supported peer count.
        max: usize,
    },

    /// The minimum delay is above the maximum.
    #[error("minimum delay {min}ms exceeds maximum delay {max}ms")]
    InvertedBounds {
        /// Lower bound, in milliseconds.
        min: u32,
        /// Upper bound, in milliseconds.
        max: u32,
    },

    /// The last peer's port would not fit in 16 bits.
    #[error("ports for {peers} peers starting at {base_port} exceed 65535")]
    PortRange {
        /// Port of peer 0.
        base_port: u16,
        /// Requested peer count.
        peers: usize,
    },

    /// Explicit rows that are not square, not symmetric, or have a non-zero diagonal.
    #[error("invalid delay matrix: {0}")]
    InvalidMatrix(String),

    /// Removing the root qdisc failed, including because there was none.
    #[error("failed to tear down shaping tree: {0}")]
    Teardown(#[source] PortError),
}

impl Error {
    /// Whether this error is caused by the arguments rather than by the interface.
    pub const fn is_invalid_argument(&self) -> bool {
        !matches!(self, Self::Teardown(_))
    }
}

/// Result type for lagmesh operations.
pub type Result<T> = std::result::Result<T, Error>;
