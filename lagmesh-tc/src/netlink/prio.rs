//! `prio` qdisc support.

use nix::libc::TCA_OPTIONS;
use rtnetlink::packet_core::{
    DefaultNla, NetlinkMessage, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST,
};
use rtnetlink::packet_route::{
    tc::{TcAttribute, TcMessage},
    RouteNetlinkMessage,
};

use super::QdiscRequestInner;

/// The priority map `tc` installs when none is given. Entries index bands from 0, so the
/// qdisc needs at least 3 bands.
pub const DEFAULT_PRIORITY_MAP: [u8; 16] = [1, 2, 2, 2, 1, 2, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];

/// Builder for a `prio` qdisc request.
///
/// The options payload is the kernel's `tc_prio_qopt`:
///
/// ```c
/// struct tc_prio_qopt {
///     int   bands;
///     __u8  priomap[TC_PRIO_MAX+1];
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QdiscPrioRequest {
    /// Interface, parent and handle of the qdisc.
    pub inner: QdiscRequestInner,
    /// Number of bands, between 3 and 16.
    pub bands: u32,
    /// Band for each of the 16 packet priorities.
    pub priomap: [u8; 16],
}

impl QdiscPrioRequest {
    /// Create a request for a prio qdisc with `bands` bands and the default priority map.
    pub fn new(inner: QdiscRequestInner, bands: u32) -> Self {
        Self { inner, bands, priomap: DEFAULT_PRIORITY_MAP }
    }

    pub(crate) fn options(&self) -> Vec<u8> {
        let mut qopt = Vec::with_capacity(4 + self.priomap.len());
        qopt.extend_from_slice(&(self.bands as i32).to_ne_bytes());
        qopt.extend_from_slice(&self.priomap);
        qopt
    }

    /// Build the `RTM_NEWQDISC` message.
    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_message = TcMessage::with_index(self.inner.interface_index);
        tc_message.header.parent = self.inner.parent;
        tc_message.header.handle = self.inner.handle;

        tc_message.attributes.push(TcAttribute::Kind("prio".to_string()));
        tc_message.attributes.push(TcAttribute::Other(DefaultNla::new(TCA_OPTIONS, self.options())));

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::NewQueueDiscipline(tc_message));
        nl_req.header.flags = NLM_F_CREATE | NLM_F_EXCL | NLM_F_REQUEST | NLM_F_ACK;

        nl_req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_layout() {
        let request = QdiscPrioRequest::new(QdiscRequestInner::new(1), 5);
        let options = request.options();
        assert_eq!(options.len(), 20);
        assert_eq!(i32::from_ne_bytes(options[..4].try_into().unwrap()), 5);
        assert_eq!(&options[4..], &DEFAULT_PRIORITY_MAP);
    }
}
