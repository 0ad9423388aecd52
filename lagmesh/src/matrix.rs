//! Symmetric one-way delay matrices.

use std::fmt;

use rand::Rng;

use crate::{
    config::DelayBounds,
    error::{Error, Result},
};

/// An `N×N` matrix of one-way delays in milliseconds.
///
/// `delay(i, j)` is the delay applied to packets sent by peer `i` to peer `j`. The matrix is
/// symmetric and its diagonal is zero. It is never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayMatrix {
    peers: usize,
    delays: Vec<u32>,
}

impl DelayMatrix {
    /// Draw a delay uniformly from `bounds` for every unordered pair of distinct peers.
    pub fn generate<R: Rng + ?Sized>(peers: usize, bounds: DelayBounds, rng: &mut R) -> Result<Self> {
        if peers == 0 {
            return Err(Error::NoPeers);
        }
        bounds.validate()?;

        let mut delays = vec![0; peers * peers];
        for i in 0..peers {
            for j in i + 1..peers {
                let delay = rng.gen_range(bounds.min..=bounds.max);
                delays[i * peers + j] = delay;
                delays[j * peers + i] = delay;
            }
        }

        tracing::debug!(peers, min = bounds.min, max = bounds.max, "generated delay matrix");

        Ok(Self { peers, delays })
    }

    /// Build a matrix from explicit rows, checking that it is square, symmetric and has a zero
    /// diagonal.
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Result<Self> {
        let peers = rows.len();
        if peers == 0 {
            return Err(Error::NoPeers);
        }
        if let Some(row) = rows.iter().position(|row| row.len() != peers) {
            return Err(Error::InvalidMatrix(format!(
                "row {row} has {} entries, expected {peers}",
                rows[row].len()
            )));
        }

        let delays: Vec<u32> = rows.into_iter().flatten().collect();
        let matrix = Self { peers, delays };
        for i in 0..peers {
            if matrix.get(i, i) != 0 {
                return Err(Error::InvalidMatrix(format!("non-zero self-delay for peer {i}")));
            }
            for j in i + 1..peers {
                if matrix.get(i, j) != matrix.get(j, i) {
                    return Err(Error::InvalidMatrix(format!("asymmetric delay between {i} and {j}")));
                }
            }
        }

        Ok(matrix)
    }

    /// Number of peers.
    pub const fn len(&self) -> usize {
        self.peers
    }

    /// Always false; a matrix has at least one peer.
    pub const fn is_empty(&self) -> bool {
        self.peers == 0
    }

    /// The delay from `source` to `destination`.
    ///
    /// # Panics
    ///
    /// If either index is out of range.
    pub fn get(&self, source: usize, destination: usize) -> u32 {
        assert!(source < self.peers && destination < self.peers, "peer index out of range");
        self.delays[source * self.peers + destination]
    }

    /// Rows of the matrix; row `i` holds the delays from peer `i`.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.delays.chunks(self.peers)
    }
}

impl fmt::Display for DelayMatrix {
    /// One row per line, formatted as `[0, 72, 131]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{row:?}")?;
        }
        Ok(())
    }
}
