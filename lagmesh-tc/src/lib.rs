#![doc(issue_tracker_base_url = "https://github.com/chainbound/lagmesh/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! # Traffic Control Operations
//!
//! The vocabulary lagmesh uses to talk to the Linux traffic control subsystem: qdisc handles,
//! the handful of operations needed to build a `prio` / `netem` tree keyed on UDP/TCP ports,
//! and the [`CommandPort`](port::CommandPort) seam through which those operations reach an
//! interface.
//!
//! Three ports are provided:
//!
//! - [`TcCommand`](port::TcCommand) spawns the `tc` utility once per operation.
//! - [`MemoryPort`](port::MemoryPort) models an interface's qdisc tree in memory. It is what
//!   tests and dry runs use.
//! - `NetlinkPort` (Linux only) sends the equivalent rtnetlink requests directly.

pub mod command;
pub mod handle;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod op;
pub mod port;

pub use handle::{ClassId, Handle, Parent};
pub use op::{PortMatch, TcOperation};
pub use port::{CommandPort, MemoryPort, PortError, TcCommand};
