//! The seam between shaping logic and the interface being shaped.
//!
//! An interface's qdisc configuration is a single kernel-wide resource without any locking.
//! Everything that touches it goes through a [`CommandPort`], which owns the device name and
//! executes one [`TcOperation`] at a time, blocking until the operation has been applied or
//! rejected.

use std::io;

use crate::{
    command::{self, Runner},
    op::TcOperation,
};

mod memory;
pub use memory::{FilterEntry, MemoryPort, QdiscKind, QdiscNode, MAX_PRIO_BANDS, MIN_PRIO_BANDS};

/// Errors returned by a [`CommandPort`].
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The `tc` utility failed.
    #[error("tc command failed: {0}")]
    Command(#[from] command::Error),

    /// The qdisc to delete does not exist.
    #[error("no such qdisc")]
    NotFound,

    /// The operation violates the qdisc tree's rules.
    #[error("operation rejected: {reason}")]
    Rejected {
        /// What was wrong with it.
        reason: String,
    },

    /// The interface does not exist.
    #[error("interface {name} not found: {source}")]
    Interface {
        /// Interface name.
        name: String,
        /// The lookup error.
        source: io::Error,
    },

    /// Local I/O failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The kernel refused an rtnetlink request, or the socket failed.
    #[cfg(target_os = "linux")]
    #[error("rtnetlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),
}

impl PortError {
    /// Whether the error says the targeted qdisc does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::Command(command::Error::NonZero(output)) => {
                let stderr = output.stderr.as_str();
                stderr.contains("handle of zero") || stderr.contains("No such file or directory")
            }
            _ => false,
        }
    }
}

/// Executes traffic control operations against a single network interface.
pub trait CommandPort {
    /// The interface this port operates on.
    fn device(&self) -> &str;

    /// Applies `op` to the interface.
    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError>;
}

impl<P: CommandPort + ?Sized> CommandPort for &mut P {
    fn device(&self) -> &str {
        (**self).device()
    }

    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError> {
        (**self).execute(op)
    }
}

impl<P: CommandPort + ?Sized> CommandPort for Box<P> {
    fn device(&self) -> &str {
        (**self).device()
    }

    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError> {
        (**self).execute(op)
    }
}

/// The default traffic control utility.
pub const TC_PROGRAM: &str = "tc";

/// A [`CommandPort`] that spawns the `tc` utility for every operation.
#[derive(Debug, Clone)]
pub struct TcCommand {
    device: String,
    program: String,
}

impl TcCommand {
    /// Create a port for `device` using `tc` from `PATH`.
    pub fn new(device: impl Into<String>) -> Self {
        Self { device: device.into(), program: TC_PROGRAM.to_string() }
    }

    /// Use a different `tc` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl CommandPort for TcCommand {
    fn device(&self) -> &str {
        &self.device
    }

    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError> {
        Runner::run(&self.program, op.args(&self.device))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Handle, Parent};

    #[test]
    fn tc_command_surfaces_failures() {
        // `false` ignores its arguments and always exits with status 1.
        let mut port = TcCommand::new("lo").with_program("false");
        let op = TcOperation::AddPrio { parent: Parent::Root, handle: Handle(1), bands: 3 };
        let err = port.execute(&op).unwrap_err();
        assert!(matches!(err, PortError::Command(command::Error::NonZero(_))));
        assert!(!err.is_not_found());
    }

    #[test]
    fn tc_command_passes_arguments() {
        // `true` accepts anything, which is enough to check the plumbing.
        let mut port = TcCommand::new("lo").with_program("true");
        port.execute(&TcOperation::DeleteRoot).unwrap();
        assert_eq!(port.device(), "lo");
    }

    #[test]
    fn missing_program_is_io_error() {
        let mut port = TcCommand::new("lo").with_program("/nonexistent/lagmesh-tc");
        let err = port.execute(&TcOperation::DeleteRoot).unwrap_err();
        assert!(matches!(err, PortError::Command(command::Error::Io(_))));
    }

    #[test]
    fn boxed_ports_forward() {
        let mut port: Box<dyn CommandPort> = Box::new(MemoryPort::new("lo"));
        assert_eq!(port.device(), "lo");
        assert!(port.execute(&TcOperation::DeleteRoot).unwrap_err().is_not_found());
    }
}
