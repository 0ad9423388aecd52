//! Packet scheduler time base.
//!
//! The kernel's traffic control subsystem expresses netem latency in its own time unit
//! ("ticks"). The conversion factor is exposed in `/proc/net/psched`.

use std::io::{self, Read as _};

/// Path to the kernel's packet scheduler timing information.
pub const PSCHED_PATH: &str = "/proc/net/psched";

/// Read the number of scheduler ticks per microsecond from [`PSCHED_PATH`].
///
/// The file holds four hex values, `t2us us2t clock resolution`; the ratio of the first two is
/// the tick rate. Adapted from `iproute2/tc/tc_core.c`.
pub fn tc_core_init() -> io::Result<f64> {
    let mut file = std::fs::File::open(PSCHED_PATH)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let tick_in_usec = parse_psched(&contents)?;
    tracing::debug!(tick_in_usec, "read {PSCHED_PATH}");

    Ok(tick_in_usec)
}

fn parse_psched(contents: &str) -> io::Result<f64> {
    let mut iter = contents.split_whitespace();
    let mut next_hex = |name: &str| {
        iter.next()
            .and_then(|value| u32::from_str_radix(value, 16).ok())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, format!("{PSCHED_PATH}: bad {name}"))
            })
    };

    let t2us = next_hex("t2us")?;
    let us2t = next_hex("us2t")?;
    if us2t == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("{PSCHED_PATH}: zero us2t")));
    }

    Ok(t2us as f64 / us2t as f64)
}

/// Convert milliseconds to packet scheduler ticks, or `None` if the result does not fit the
/// kernel's 32-bit tick fields.
pub fn msec_to_ticks(delay_ms: u32, tick_in_usec: f64) -> Option<u32> {
    let ticks = (f64::from(delay_ms) * 1_000.0 * tick_in_usec).trunc();
    (ticks <= f64::from(u32::MAX)).then_some(ticks as u32)
}
