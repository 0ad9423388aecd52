//! `netem` qdisc support, restricted to a fixed delay.

use nix::libc::TCA_OPTIONS;
use rtnetlink::packet_core::{
    DefaultNla, NetlinkMessage, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST,
};
use rtnetlink::packet_route::{
    tc::{TcAttribute, TcMessage},
    RouteNetlinkMessage,
};

use super::core::msec_to_ticks;
use super::QdiscRequestInner;

/// The kernel's `tc_netem_qopt`. Field order matters.
///
/// ```c
/// struct tc_netem_qopt {
///     __u32 latency;    /* Delay in scheduler ticks */
///     __u32 limit;      /* Queue size limit in packets */
///     __u32 loss;
///     __u32 gap;
///     __u32 duplicate;
///     __u32 jitter;     /* Jitter in scheduler ticks */
/// };
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetemQopt {
    /// Latency in packet scheduler ticks.
    pub latency: u32,
    /// Queue size limit in packets.
    pub limit: u32,
    /// Random loss probability, scaled to `u32::MAX`.
    pub loss: u32,
    /// Re-ordering gap, 0 for none.
    pub gap: u32,
    /// Random duplication probability, scaled to `u32::MAX`.
    pub duplicate: u32,
    /// Jitter in packet scheduler ticks.
    pub jitter: u32,
}

impl NetemQopt {
    /// A fixed delay with no loss, reordering, duplication or jitter.
    ///
    /// Returns `None` if the delay does not fit in the latency field at this tick rate.
    pub fn fixed_delay(delay_ms: u32, limit: u32, tick_in_usec: f64) -> Option<Self> {
        let latency = msec_to_ticks(delay_ms, tick_in_usec)?;
        Some(Self { latency, limit, ..Default::default() })
    }

    /// Serialize in native endian order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(4 * 6);
        vec.extend_from_slice(&self.latency.to_ne_bytes());
        vec.extend_from_slice(&self.limit.to_ne_bytes());
        vec.extend_from_slice(&self.loss.to_ne_bytes());
        vec.extend_from_slice(&self.gap.to_ne_bytes());
        vec.extend_from_slice(&self.duplicate.to_ne_bytes());
        vec.extend_from_slice(&self.jitter.to_ne_bytes());
        vec
    }
}

/// Builder for a `netem` qdisc request.
#[derive(Debug)]
pub struct QdiscNetemRequest {
    /// Interface, parent and handle of the qdisc.
    pub inner: QdiscRequestInner,
    /// The `TCA_OPTIONS` payload.
    pub options: NetemQopt,
}

impl QdiscNetemRequest {
    /// Create a request for a netem qdisc with `options`.
    pub fn new(inner: QdiscRequestInner, options: NetemQopt) -> Self {
        Self { inner, options }
    }

    /// Build the `RTM_NEWQDISC` message.
    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_message = TcMessage::with_index(self.inner.interface_index);
        tc_message.header.parent = self.inner.parent;
        tc_message.header.handle = self.inner.handle;

        tc_message.attributes.push(TcAttribute::Kind("netem".to_string()));
        tc_message
            .attributes
            .push(TcAttribute::Other(DefaultNla::new(TCA_OPTIONS, self.options.to_bytes())));

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::NewQueueDiscipline(tc_message));
        nl_req.header.flags = NLM_F_CREATE | NLM_F_EXCL | NLM_F_REQUEST | NLM_F_ACK;

        nl_req
    }
}
