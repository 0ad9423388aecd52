//! # rtnetlink Backend
//!
//! Issues the same operations as the `tc` utility would, as rtnetlink requests on a socket
//! owned by the port. The port stays synchronous: each request is driven to completion on a
//! private current-thread tokio runtime before [`CommandPort::execute`] returns.
//!
//! | Operation    | Message                  | Payload                          |
//! |--------------|--------------------------|----------------------------------|
//! | `DeleteRoot` | `RTM_DELQDISC`           | parent `TC_H_ROOT`               |
//! | `AddPrio`    | `RTM_NEWQDISC`           | `prio`, `tc_prio_qopt`           |
//! | `AddNetem`   | `RTM_NEWQDISC`           | `netem`, `tc_netem_qopt`         |
//! | `AddFilter`  | `RTM_NEWTFILTER`         | `u32`, classid + one port key    |

use std::num::NonZeroI32;

use futures::StreamExt as _;
use nix::libc::{EINVAL, ENOENT};
use rtnetlink::packet_core::{
    ErrorMessage, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_REQUEST,
};
use rtnetlink::packet_route::{
    tc::{TcHandle, TcMessage},
    RouteNetlinkMessage,
};

use crate::handle::Parent;
use crate::op::TcOperation;
use crate::port::{CommandPort, PortError};

pub mod core;
pub mod filter;
pub mod netem;
mod nla;
pub mod prio;

use filter::U32PortFilterRequest;
use netem::{NetemQopt, QdiscNetemRequest};
use prio::QdiscPrioRequest;

/// Addressing shared by qdisc and filter requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QdiscRequestInner {
    /// The network interface index (from `if_nametoindex`).
    pub interface_index: i32,
    /// Where this qdisc or filter attaches.
    pub parent: TcHandle,
    /// This qdisc's own handle.
    pub handle: TcHandle,
}

impl QdiscRequestInner {
    /// Create a new request for the given interface, defaulting to root parent.
    pub fn new(index: i32) -> Self {
        Self { interface_index: index, parent: TcHandle::ROOT, handle: TcHandle::default() }
    }

    /// Attach to `parent`.
    pub fn with_parent(mut self, parent: TcHandle) -> Self {
        self.parent = parent;
        self
    }

    /// Set the handle of the created qdisc.
    pub fn with_handle(mut self, handle: TcHandle) -> Self {
        self.handle = handle;
        self
    }
}

fn tc_parent(parent: Parent) -> TcHandle {
    match parent {
        Parent::Root => TcHandle::ROOT,
        Parent::Class(class) => TcHandle::from(class.as_u32()),
    }
}

/// A [`CommandPort`] speaking rtnetlink directly.
#[derive(Debug)]
pub struct NetlinkPort {
    device: String,
    if_index: i32,
    tick_in_usec: f64,
    handle: rtnetlink::Handle,
    runtime: tokio::runtime::Runtime,
}

impl NetlinkPort {
    /// Open a netlink socket for `device`.
    pub fn new(device: impl Into<String>) -> Result<Self, PortError> {
        let device = device.into();
        let if_index = nix::net::if_::if_nametoindex(device.as_str()).map_err(|errno| {
            PortError::Interface { name: device.clone(), source: errno.into() }
        })?;
        let tick_in_usec = core::tc_core_init()?;

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let handle = {
            let _guard = runtime.enter();
            let (connection, handle, _) = rtnetlink::new_connection()?;
            runtime.spawn(connection);
            handle
        };

        tracing::debug!(%device, if_index, "opened rtnetlink connection");

        Ok(Self { device, if_index: if_index as i32, tick_in_usec, handle, runtime })
    }

    fn message(&self, op: &TcOperation) -> Result<NetlinkMessage<RouteNetlinkMessage>, PortError> {
        let inner = QdiscRequestInner::new(self.if_index);
        let message = match *op {
            TcOperation::DeleteRoot => delete_root_request(self.if_index),
            TcOperation::AddPrio { parent, handle, bands } => QdiscPrioRequest::new(
                inner
                    .with_parent(tc_parent(parent))
                    .with_handle(TcHandle::from(handle.as_u32())),
                bands,
            )
            .build(),
            TcOperation::AddNetem { parent, handle, delay_ms, limit } => {
                let qopt = NetemQopt::fixed_delay(delay_ms, limit, self.tick_in_usec).ok_or_else(
                    || PortError::Rejected {
                        reason: format!("delay of {delay_ms}ms overflows netem latency"),
                    },
                )?;
                QdiscNetemRequest::new(
                    inner
                        .with_parent(tc_parent(parent))
                        .with_handle(TcHandle::from(handle.as_u32())),
                    qopt,
                )
                .build()
            }
            TcOperation::AddFilter { parent, priority, matcher, flow_id } => {
                U32PortFilterRequest::new(
                    inner.with_parent(TcHandle::from(parent.as_u32())),
                    matcher,
                    flow_id.as_u32(),
                )
                .with_priority(priority)
                .build()
            }
        };
        Ok(message)
    }
}

/// `RTM_DELQDISC` for the root qdisc of interface `if_index`, taking every descendant with it.
pub fn delete_root_request(if_index: i32) -> NetlinkMessage<RouteNetlinkMessage> {
    let mut tc_message = TcMessage::with_index(if_index);
    tc_message.header.parent = TcHandle::ROOT;

    let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::DelQueueDiscipline(tc_message));
    nl_req.header.flags = NLM_F_REQUEST | NLM_F_ACK;
    nl_req
}

/// Map a kernel error reply to `op` into a [`PortError`].
///
/// Deleting the root of an interface without one fails with `ENOENT` (or `EINVAL` on older
/// kernels, "Cannot delete qdisc with handle of zero"), which is reported as
/// [`PortError::NotFound`].
fn reply_error(op: &TcOperation, e: ErrorMessage) -> PortError {
    let code = e.code.map(NonZeroI32::get);
    match op {
        TcOperation::DeleteRoot if matches!(code, Some(c) if c == -ENOENT || c == -EINVAL) => {
            PortError::NotFound
        }
        _ => PortError::Netlink(rtnetlink::Error::NetlinkError(e)),
    }
}

impl CommandPort for NetlinkPort {
    fn device(&self) -> &str {
        &self.device
    }

    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError> {
        let message = self.message(op)?;
        let handle = &mut self.handle;

        let reply = self.runtime.block_on(async move {
            let mut res = handle.request(message)?;
            while let Some(msg) = res.next().await {
                // An acknowledgement is an error message without a code.
                if let NetlinkPayload::Error(e) = msg.payload {
                    if e.code.is_some() {
                        return Ok(Some(e));
                    }
                }
            }
            Ok::<_, rtnetlink::Error>(None)
        })?;

        match reply {
            Some(e) => {
                tracing::debug!(?e, %op, "netlink request failed");
                Err(reply_error(op, e))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    fn is_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn error_message(errno: i32) -> ErrorMessage {
        let mut e = ErrorMessage::default();
        e.code = NonZeroI32::new(-errno);
        e
    }

    #[test]
    fn missing_root_is_not_found() {
        for errno in [ENOENT, EINVAL] {
            let err = reply_error(&TcOperation::DeleteRoot, error_message(errno));
            assert!(matches!(err, PortError::NotFound), "errno {errno}: {err:?}");
            assert!(err.is_not_found());
        }
    }

    #[test]
    fn other_replies_stay_netlink_errors() {
        let err = reply_error(&TcOperation::DeleteRoot, error_message(nix::libc::EPERM));
        assert!(matches!(err, PortError::Netlink(_)));
        assert!(!err.is_not_found());

        // Only the root deletion treats ENOENT as an absent tree.
        let add = TcOperation::AddPrio {
            parent: Parent::Class(Handle(1).class(1)),
            handle: Handle(2),
            bands: 3,
        };
        let err = reply_error(&add, error_message(ENOENT));
        assert!(matches!(err, PortError::Netlink(_)));
    }

    #[test]
    fn delete_root_layout() {
        let message = delete_root_request(7);
        assert_eq!(message.header.flags, NLM_F_REQUEST | NLM_F_ACK);

        let NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelQueueDiscipline(tc)) =
            message.payload
        else {
            panic!("expected RTM_DELQDISC")
        };
        assert_eq!(tc.header.index, 7);
        assert_eq!(tc.header.parent, TcHandle::ROOT);
        assert_eq!(tc.header.handle, TcHandle::default());
        assert!(tc.attributes.is_empty());
    }

    #[test]
    fn unknown_interface_is_reported() {
        let err = NetlinkPort::new("lagmesh-none0").unwrap_err();
        assert!(matches!(err, PortError::Interface { .. }));
    }

    #[test]
    #[ignore = "requires CAP_NET_ADMIN and replaces the qdisc tree of lo"]
    fn builds_and_deletes_a_root_on_loopback() {
        let _ = tracing_subscriber::fmt::try_init();
        assert!(is_root());

        let mut port = NetlinkPort::new("lo").unwrap();
        let _ = port.execute(&TcOperation::DeleteRoot);

        port.execute(&TcOperation::AddPrio { parent: Parent::Root, handle: Handle(1), bands: 3 })
            .unwrap();
        port.execute(&TcOperation::AddNetem {
            parent: Parent::Class(Handle(1).class(1)),
            handle: Handle(2),
            delay_ms: 5,
            limit: 1_000,
        })
        .unwrap();
        port.execute(&TcOperation::AddFilter {
            parent: Handle(1),
            priority: 1,
            matcher: crate::op::PortMatch::Destination(10_000),
            flow_id: Handle(1).class(1),
        })
        .unwrap();

        port.execute(&TcOperation::DeleteRoot).unwrap();
        assert!(port.execute(&TcOperation::DeleteRoot).is_err());
    }
}
