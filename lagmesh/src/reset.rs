//! Removing a shaping tree.

use lagmesh_tc::{CommandPort, TcOperation};

use crate::error::{Error, Result};

/// What [`reset`] found on the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// A root qdisc existed and was removed together with its descendants.
    Removed,
    /// There was nothing to remove.
    Absent,
    /// Deleting the root failed for another reason; the failure was logged and ignored.
    Ignored,
}

/// Remove the root qdisc of the port's interface, if any.
///
/// This never fails: an interface without a shaping tree is the expected state on a first run,
/// and any other failure will surface when the next build tries to create its root. Calling it
/// twice in a row is a no-op the second time.
pub fn reset<P: CommandPort + ?Sized>(port: &mut P) -> ResetOutcome {
    match port.execute(&TcOperation::DeleteRoot) {
        Ok(()) => {
            tracing::debug!(device = port.device(), "removed existing shaping tree");
            ResetOutcome::Removed
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(device = port.device(), "no shaping tree to remove");
            ResetOutcome::Absent
        }
        Err(e) => {
            tracing::debug!(device = port.device(), ?e, "ignoring failure to remove root qdisc");
            ResetOutcome::Ignored
        }
    }
}

/// Remove the shaping tree, reporting any failure, including the absence of a tree.
pub fn teardown<P: CommandPort + ?Sized>(port: &mut P) -> Result<()> {
    port.execute(&TcOperation::DeleteRoot).map_err(Error::Teardown)?;
    tracing::info!(device = port.device(), "shaping tree removed");
    Ok(())
}
