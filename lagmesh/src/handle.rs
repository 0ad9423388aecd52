//! Handle numbering of the shaping tree.
//!
//! | Node                       | Handle (major)        | Parent             |
//! |----------------------------|-----------------------|--------------------|
//! | Root classifier            | `1`                   | root               |
//! | Classifier of source `i`   | `i + 2`               | `1:(i + 1)`        |
//! | Shaper for pair `(i, j)`   | `N * (i + 1) + j + 2` | `(i + 2):(j + 1)`  |
//!
//! Source classifiers occupy `[2, N + 1]` and pair shapers `[N + 2, N² + 2N + 1]`, so every
//! handle in a tree of `N` peers is distinct. The functions here are pure and work on `u32` so
//! that property holds (and can be checked) independently of the 16-bit range of real handles.

use lagmesh_tc::{handle::Handle, port::MIN_PRIO_BANDS};

/// Major number of the root classifier.
pub const ROOT_MAJOR: u32 = 1;

/// Handle of the root classifier.
pub const ROOT: Handle = Handle(ROOT_MAJOR as u16);

/// Number of bands of every classifier in a tree of `peers` peers.
///
/// The default priority map addresses bands 0 to 2, so there are never fewer than 3.
pub const fn bands(peers: u32) -> u32 {
    if peers > MIN_PRIO_BANDS {
        peers
    } else {
        MIN_PRIO_BANDS
    }
}

/// Major number of the classifier for packets sent by `source`.
pub const fn source_major(source: u32) -> u32 {
    source + 2
}

/// Major number of the delay shaper for packets sent by `source` to `destination`.
pub const fn pair_major(peers: u32, source: u32, destination: u32) -> u32 {
    peers * (source + 1) + destination + 2
}

/// Band of a classifier dedicated to `peer`; bands are numbered from 1.
pub const fn band_of(peer: u32) -> u16 {
    (peer + 1) as u16
}

/// Every major number of a tree of `peers` peers, in construction order.
pub fn all_majors(peers: u32) -> impl Iterator<Item = u32> {
    let sources = (0..peers).map(source_major);
    let pairs = (0..peers)
        .flat_map(move |source| (0..peers).map(move |destination| (source, destination)))
        .map(move |(source, destination)| pair_major(peers, source, destination));
    std::iter::once(ROOT_MAJOR).chain(sources).chain(pairs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn bands_floor() {
        assert_eq!(bands(1), 3);
        assert_eq!(bands(2), 3);
        assert_eq!(bands(3), 3);
        assert_eq!(bands(5), 5);
        assert_eq!(bands(16), 16);
    }

    #[test]
    fn handles_are_distinct_for_small_trees() {
        for peers in [1u32, 2, 5] {
            let majors: HashSet<u32> = all_majors(peers).collect();
            assert_eq!(majors.len() as u32, 1 + peers + peers * peers);
        }
    }

    #[test]
    fn two_peer_layout() {
        assert_eq!(source_major(0), 2);
        assert_eq!(source_major(1), 3);
        assert_eq!(
            [pair_major(2, 0, 0), pair_major(2, 0, 1), pair_major(2, 1, 0), pair_major(2, 1, 1)],
            [4, 5, 6, 7]
        );
    }

    proptest! {
        #[test]
        fn ranges_are_disjoint(peers in 1u32..512) {
            let majors: Vec<u32> = all_majors(peers).collect();
            let distinct: HashSet<u32> = majors.iter().copied().collect();
            prop_assert_eq!(distinct.len(), majors.len());

            for source in 0..peers {
                let major = source_major(source);
                prop_assert!((2..=peers + 1).contains(&major));
                for destination in 0..peers {
                    let major = pair_major(peers, source, destination);
                    prop_assert!((peers + 2..=peers * (peers + 1) + peers + 1).contains(&major));
                }
            }
        }
    }
}
