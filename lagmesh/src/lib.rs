#![doc(issue_tracker_base_url = "https://github.com/chainbound/lagmesh/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! # lagmesh
//!
//! Emulates heterogeneous latency between `N` peer processes that all talk over one interface
//! (usually loopback). Each peer `i` owns port `base_port + i`, used as its source port when
//! sending and as the destination port when receiving. A symmetric [`DelayMatrix`] assigns a
//! one-way delay to each ordered pair, and a three-level `tc` tree enforces it:
//!
//! 1. a root `prio` classifier splitting traffic by source port,
//! 2. one `prio` classifier per source splitting its traffic by destination port,
//! 3. one `netem` shaper per ordered pair.
//!
//! See [`plan`] for the layout and [`handle`] for the numbering scheme.
//!
//! ## Usage
//!
//! ```
//! use lagmesh::{DelayBounds, Emulation, ShapingConfig};
//! use lagmesh_tc::MemoryPort;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let emulation = Emulation::new(4, DelayBounds::new(20, 80), ShapingConfig::default()).unwrap();
//! let mut port = MemoryPort::new("lo");
//! let applied = emulation.apply(&mut port, &mut StdRng::seed_from_u64(1)).unwrap();
//!
//! assert!(applied.build.unwrap().is_clean());
//! println!("{}", applied.matrix);
//! ```
//!
//! ## Exclusive access
//!
//! The qdisc configuration of an interface is global, kernel-level state with no locking.
//! Resets and builds assume they are the only writers: two builds on the same interface, or a
//! reset during a build, leave an inconsistent tree. Callers must serialize access.

pub mod builder;
pub mod config;
pub mod emulation;
mod error;
pub mod handle;
pub mod matrix;
pub mod plan;
pub mod reset;

pub use builder::{build, BuildError, BuildReport};
pub use config::{DelayBounds, ShapingConfig};
pub use emulation::{Applied, Emulation};
pub use error::{Error, Result};
pub use matrix::DelayMatrix;
pub use reset::{reset, teardown, ResetOutcome};
