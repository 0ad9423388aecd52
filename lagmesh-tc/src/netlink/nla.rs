//! Netlink attribute building.

use nix::libc::TCA_OPTIONS;
use rtnetlink::packet_core::{DefaultNla, NLA_HEADER_SIZE};

/// Build one NLA: a 4-byte `length | type` header followed by `value`, padded to 4 bytes.
pub(crate) fn build_nla(nla_type: u16, value: &[u8]) -> Vec<u8> {
    let nla_len = NLA_HEADER_SIZE + value.len();
    let padded_len = (nla_len + 3) & !3;

    let mut buf = vec![0u8; padded_len];
    buf[0..2].copy_from_slice(&(nla_len as u16).to_ne_bytes());
    buf[2..4].copy_from_slice(&nla_type.to_ne_bytes());
    buf[NLA_HEADER_SIZE..NLA_HEADER_SIZE + value.len()].copy_from_slice(value);

    buf
}

/// Wrap already encoded sub-attributes in a `TCA_OPTIONS` attribute.
pub(crate) fn build_nested_options(sub_attrs: Vec<u8>) -> DefaultNla {
    DefaultNla::new(TCA_OPTIONS, sub_attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_four_bytes() {
        let nla = build_nla(1, &[0xaa, 0xbb, 0xcc]);
        assert_eq!(nla.len(), 8);
        assert_eq!(u16::from_ne_bytes([nla[0], nla[1]]), 7);
        assert_eq!(u16::from_ne_bytes([nla[2], nla[3]]), 1);
        assert_eq!(&nla[4..], &[0xaa, 0xbb, 0xcc, 0]);
    }
}
