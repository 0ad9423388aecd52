//! `u32` filters matching a transport port.
//!
//! `tc filter add ... u32 match ip sport 10000 0xffff flowid 1:1` compiles down to a single
//! 32-bit key over the word at offset 20 of the IPv4 header, which holds the source port in its
//! upper half and the destination port in its lower half (assuming no IP options).

use rtnetlink::packet_core::{NetlinkMessage, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST};
use rtnetlink::packet_route::{
    tc::{TcAttribute, TcHandle, TcMessage},
    RouteNetlinkMessage,
};

use super::nla::{build_nested_options, build_nla};
use super::QdiscRequestInner;
use crate::op::PortMatch;

/// EtherType for IPv4 packets (0x0800).
const ETH_P_IP: u16 = nix::libc::ETH_P_IP as u16;

// U32 filter TCA_OPTIONS sub-attributes (from linux/pkt_cls.h)
const TCA_U32_CLASSID: u16 = 1;
const TCA_U32_SEL: u16 = 5;

/// Marks a u32 filter as terminal, required for it to return a classification result.
const TC_U32_TERMINAL: u8 = 1;

/// Offset of the 32-bit word holding both ports, relative to the start of the IPv4 header.
const PORTS_OFFSET: i32 = 20;

/// The kernel's `tc_u32_sel`, without the trailing keys.
#[derive(Debug, Clone, Copy, Default)]
struct TcU32Sel {
    flags: u8,
    offshift: u8,
    nkeys: u8,
    offmask: u16,
    off: u16,
    offoff: i16,
    hoff: i16,
    hmask: u32,
}

/// The kernel's `tc_u32_key`. `mask` and `val` are in network byte order on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TcU32Key {
    mask: u32,
    val: u32,
    off: i32,
    offmask: i32,
}

impl TcU32Key {
    /// The key matching `matcher` exactly, as `tc`'s `pack_key16` lays it out.
    fn for_port(matcher: PortMatch) -> Self {
        let port = u32::from(matcher.port());
        let (mask, val) = match matcher {
            PortMatch::Source(_) => (0xffff_0000, port << 16),
            PortMatch::Destination(_) => (0x0000_ffff, port),
        };
        Self { mask, val, off: PORTS_OFFSET, offmask: 0 }
    }
}

/// Builder for a `u32` filter steering packets with a given port into a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U32PortFilterRequest {
    /// `parent` is the classifier qdisc the filter is attached to.
    pub inner: QdiscRequestInner,
    /// The port to match.
    pub matcher: PortMatch,
    /// Class receiving matched packets, as `major << 16 | minor`.
    pub class_id: u32,
    /// Filter preference; lower values are tried first.
    pub priority: u16,
}

impl U32PortFilterRequest {
    /// Create a filter with preference 1.
    pub fn new(inner: QdiscRequestInner, matcher: PortMatch, class_id: u32) -> Self {
        Self { inner, matcher, class_id, priority: 1 }
    }

    /// Set the filter preference.
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn selector(&self) -> Vec<u8> {
        let sel = TcU32Sel { flags: TC_U32_TERMINAL, nkeys: 1, ..Default::default() };
        let key = TcU32Key::for_port(self.matcher);

        let mut bytes = Vec::with_capacity(16 + 16);
        bytes.push(sel.flags);
        bytes.push(sel.offshift);
        bytes.push(sel.nkeys);
        bytes.push(0); // padding
        bytes.extend_from_slice(&sel.offmask.to_ne_bytes());
        bytes.extend_from_slice(&sel.off.to_ne_bytes());
        bytes.extend_from_slice(&sel.offoff.to_ne_bytes());
        bytes.extend_from_slice(&sel.hoff.to_ne_bytes());
        bytes.extend_from_slice(&sel.hmask.to_ne_bytes());

        bytes.extend_from_slice(&key.mask.to_be_bytes());
        bytes.extend_from_slice(&key.val.to_be_bytes());
        bytes.extend_from_slice(&key.off.to_ne_bytes());
        bytes.extend_from_slice(&key.offmask.to_ne_bytes());
        bytes
    }

    /// Build the `RTM_NEWTFILTER` message.
    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_msg = TcMessage::with_index(self.inner.interface_index);
        tc_msg.header.parent = self.inner.parent;
        // Let the kernel pick the filter handle.
        tc_msg.header.handle = TcHandle::from(0u32);
        tc_msg.header.info = ((self.priority as u32) << 16) | (ETH_P_IP.to_be() as u32);

        tc_msg.attributes.push(TcAttribute::Kind("u32".to_string()));

        let mut options = build_nla(TCA_U32_CLASSID, &self.class_id.to_ne_bytes());
        options.extend(build_nla(TCA_U32_SEL, &self.selector()));
        tc_msg.attributes.push(TcAttribute::Other(build_nested_options(options)));

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::NewTrafficFilter(tc_msg));
        nl_req.header.flags = NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL;

        nl_req
    }
}
