//! The traffic control operations lagmesh issues.
//!
//! Every operation maps to exactly one `tc` invocation (or one rtnetlink request), which keeps
//! the relationship between a shaping tree and the commands that built it one to one.

use std::fmt;

use crate::handle::{ClassId, Handle, Parent};

/// The default `netem` queue limit, in packets.
pub const DEFAULT_NETEM_LIMIT: u32 = 1_000;

/// Mask matching all 16 bits of a port.
pub const FULL_PORT_MASK: u16 = 0xffff;

/// A classification predicate on the transport port of an IPv4 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMatch {
    /// Matches packets whose source port equals the value.
    Source(u16),
    /// Matches packets whose destination port equals the value.
    Destination(u16),
}

impl PortMatch {
    /// The port being matched.
    pub const fn port(self) -> u16 {
        match self {
            Self::Source(port) | Self::Destination(port) => port,
        }
    }

    /// The `tc u32 match ip` selector keyword.
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Source(_) => "sport",
            Self::Destination(_) => "dport",
        }
    }
}

impl fmt::Display for PortMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.selector(), self.port())
    }
}

/// A single traffic control operation against one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcOperation {
    /// Remove the root qdisc, and with it the whole tree.
    DeleteRoot,
    /// Add a `prio` classifier qdisc.
    AddPrio {
        /// Where the qdisc attaches.
        parent: Parent,
        /// Handle of the new qdisc.
        handle: Handle,
        /// Number of bands, 3 to 16.
        bands: u32,
    },
    /// Add a `netem` qdisc applying a fixed delay.
    AddNetem {
        /// Where the qdisc attaches.
        parent: Parent,
        /// Handle of the new qdisc.
        handle: Handle,
        /// Delay applied to every packet, in milliseconds.
        delay_ms: u32,
        /// Queue limit in packets.
        limit: u32,
    },
    /// Add a `u32` filter on `parent` steering matching IPv4 packets into `flow_id`.
    AddFilter {
        /// The classifier qdisc the filter is installed on.
        parent: Handle,
        /// Filter preference; lower is evaluated first.
        priority: u16,
        /// The port predicate, always with a full mask.
        matcher: PortMatch,
        /// The class matching packets are sent to.
        flow_id: ClassId,
    },
}

impl TcOperation {
    /// Handle of the qdisc this operation creates, if any.
    pub const fn created_handle(&self) -> Option<Handle> {
        match self {
            Self::AddPrio { handle, .. } | Self::AddNetem { handle, .. } => Some(*handle),
            Self::DeleteRoot | Self::AddFilter { .. } => None,
        }
    }

    /// The `tc` arguments for this operation on `device`.
    pub fn args(&self, device: &str) -> Vec<String> {
        self.args_inner(Some(device))
    }

    /// The full shell command line for this operation on `device`.
    pub fn command_line(&self, device: &str) -> String {
        format!("tc {}", self.args(device).join(" "))
    }

    fn args_inner(&self, device: Option<&str>) -> Vec<String> {
        let mut args = Vec::with_capacity(20);
        let (object, verb) = match self {
            Self::DeleteRoot => ("qdisc", "del"),
            Self::AddPrio { .. } | Self::AddNetem { .. } => ("qdisc", "add"),
            Self::AddFilter { .. } => ("filter", "add"),
        };
        args.extend([object.to_string(), verb.to_string()]);
        if let Some(device) = device {
            args.extend(["dev".to_string(), device.to_string()]);
        }

        match self {
            Self::DeleteRoot => args.push("root".to_string()),
            Self::AddPrio { parent, handle, bands } => {
                push_parent(&mut args, parent);
                args.extend([
                    "handle".to_string(),
                    handle.to_string(),
                    "prio".to_string(),
                    "bands".to_string(),
                    bands.to_string(),
                ]);
            }
            Self::AddNetem { parent, handle, delay_ms, limit } => {
                push_parent(&mut args, parent);
                args.extend(["handle".to_string(), handle.to_string(), "netem".to_string()]);
                if *limit != DEFAULT_NETEM_LIMIT {
                    args.extend(["limit".to_string(), limit.to_string()]);
                }
                args.extend(["delay".to_string(), format!("{delay_ms}ms")]);
            }
            Self::AddFilter { parent, priority, matcher, flow_id } => {
                args.extend([
                    "protocol".to_string(),
                    "ip".to_string(),
                    "parent".to_string(),
                    parent.to_string(),
                    "prio".to_string(),
                    priority.to_string(),
                    "u32".to_string(),
                    "match".to_string(),
                    "ip".to_string(),
                    matcher.selector().to_string(),
                    matcher.port().to_string(),
                    format!("{FULL_PORT_MASK:#x}"),
                    "flowid".to_string(),
                    flow_id.to_string(),
                ]);
            }
        }

        args
    }
}

fn push_parent(args: &mut Vec<String>, parent: &Parent) {
    match parent {
        Parent::Root => args.push("root".to_string()),
        Parent::Class(class) => args.extend(["parent".to_string(), class.to_string()]),
    }
}

impl fmt::Display for TcOperation {
    /// Formats the operation as `tc` arguments without the device.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args_inner(None).join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_root_command() {
        assert_eq!(TcOperation::DeleteRoot.command_line("lo"), "tc qdisc del dev lo root");
    }

    #[test]
    fn prio_commands() {
        let root = TcOperation::AddPrio { parent: Parent::Root, handle: Handle(1), bands: 3 };
        assert_eq!(root.command_line("lo"), "tc qdisc add dev lo root handle 1: prio bands 3");

        let child = TcOperation::AddPrio {
            parent: Parent::Class(Handle(1).class(12)),
            handle: Handle(13),
            bands: 16,
        };
        assert_eq!(
            child.command_line("lo"),
            "tc qdisc add dev lo parent 1:c handle d: prio bands 16"
        );
        assert_eq!(child.created_handle(), Some(Handle(13)));
    }

    #[test]
    fn netem_command_omits_default_limit() {
        let op = TcOperation::AddNetem {
            parent: Parent::Class(Handle(2).class(1)),
            handle: Handle(4),
            delay_ms: 120,
            limit: DEFAULT_NETEM_LIMIT,
        };
        assert_eq!(op.command_line("lo"), "tc qdisc add dev lo parent 2:1 handle 4: netem delay 120ms");

        let op = TcOperation::AddNetem {
            parent: Parent::Class(Handle(2).class(1)),
            handle: Handle(4),
            delay_ms: 0,
            limit: 5_000,
        };
        assert_eq!(
            op.command_line("eth0"),
            "tc qdisc add dev eth0 parent 2:1 handle 4: netem limit 5000 delay 0ms"
        );
    }

    #[test]
    fn filter_commands() {
        let op = TcOperation::AddFilter {
            parent: Handle(1),
            priority: 1,
            matcher: PortMatch::Source(10_001),
            flow_id: Handle(1).class(2),
        };
        assert_eq!(
            op.command_line("lo"),
            "tc filter add dev lo protocol ip parent 1: prio 1 u32 match ip sport 10001 0xffff flowid 1:2"
        );
        assert_eq!(op.created_handle(), None);

        let op = TcOperation::AddFilter {
            parent: Handle(3),
            priority: 1,
            matcher: PortMatch::Destination(10_000),
            flow_id: Handle(3).class(1),
        };
        assert_eq!(
            op.to_string(),
            "filter add protocol ip parent 3: prio 1 u32 match ip dport 10000 0xffff flowid 3:1"
        );
    }
}
