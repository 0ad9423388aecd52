//! The shaping tree as data.
//!
//! A [`ShapingPlan`] lists every node and classification rule of the tree enforcing a
//! [`DelayMatrix`], in the order they must be created. Building it is pure; the
//! [`builder`](crate::builder) then replays it against a [`CommandPort`](lagmesh_tc::CommandPort).
//!
//! ```text
//!                           prio 1: (max(N,3) bands)
//!              sport = base+0 │             │ sport = base+1
//!                        1:1  ▼             ▼  1:2
//!                 prio 2: (per source)   prio 3: (per source)
//!          dport=base+0 │   │ dport=base+1      ...
//!                  2:1  ▼   ▼  2:2
//!             netem N+2:    netem N+3:     one shaper per ordered pair
//! ```

use std::fmt;

use lagmesh_tc::{ClassId, Handle, Parent, PortMatch, TcOperation};

use crate::{
    config::ShapingConfig,
    error::{Error, Result},
    handle::{band_of, bands, pair_major, source_major, ROOT},
    matrix::DelayMatrix,
};

/// What a node of the shaping tree does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The `prio` qdisc at the root, splitting traffic by source port.
    RootClassifier {
        /// Number of bands.
        bands: u32,
    },
    /// The `prio` qdisc holding traffic sent by `peer`, splitting it by destination port.
    SourceClassifier {
        /// The sending peer.
        peer: usize,
        /// Number of bands.
        bands: u32,
    },
    /// The `netem` qdisc delaying traffic from `source` to `destination`.
    DelayShaper {
        /// The sending peer.
        source: usize,
        /// The receiving peer.
        destination: usize,
        /// One-way delay, in milliseconds.
        delay_ms: u32,
    },
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootClassifier { .. } => f.write_str("root classifier"),
            Self::SourceClassifier { peer, .. } => write!(f, "classifier of peer {peer}"),
            Self::DelayShaper { source, destination, delay_ms } => {
                write!(f, "{delay_ms}ms shaper {source} → {destination}")
            }
        }
    }
}

/// A node of the shaping tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapingNode {
    /// Handle of the qdisc.
    pub handle: Handle,
    /// Band (or root) it attaches to.
    pub parent: Parent,
    /// What it does.
    pub kind: NodeKind,
}

impl ShapingNode {
    /// The operation creating this node.
    pub fn operation(&self, config: &ShapingConfig) -> TcOperation {
        match self.kind {
            NodeKind::RootClassifier { bands } | NodeKind::SourceClassifier { bands, .. } => {
                TcOperation::AddPrio { parent: self.parent, handle: self.handle, bands }
            }
            NodeKind::DelayShaper { delay_ms, .. } => TcOperation::AddNetem {
                parent: self.parent,
                handle: self.handle,
                delay_ms,
                limit: config.netem_limit,
            },
        }
    }
}

impl fmt::Display for ShapingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.handle)
    }
}

/// The traffic a classification rule steers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Everything sent by `peer`.
    Source {
        /// The sending peer.
        peer: usize,
    },
    /// Traffic sent by `source` to `destination`.
    Pair {
        /// The sending peer.
        source: usize,
        /// The receiving peer.
        destination: usize,
    },
}

/// A filter on `classifier` sending packets matched by `matcher` into `flow_id`, the band
/// holding `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Classifier the filter is installed on.
    pub classifier: Handle,
    /// Port predicate.
    pub matcher: PortMatch,
    /// Band receiving matched packets.
    pub flow_id: ClassId,
    /// Qdisc attached to that band.
    pub target: Handle,
    /// The traffic steered.
    pub route: Route,
}

impl ClassificationRule {
    /// The operation installing this rule.
    pub fn operation(&self, config: &ShapingConfig) -> TcOperation {
        TcOperation::AddFilter {
            parent: self.classifier,
            priority: config.filter_priority,
            matcher: self.matcher,
            flow_id: self.flow_id,
        }
    }
}

/// One step of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Create a qdisc.
    Node(ShapingNode),
    /// Install a filter.
    Rule(ClassificationRule),
}

impl Step {
    /// The node created by this step, if any.
    pub const fn node(&self) -> Option<&ShapingNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Rule(_) => None,
        }
    }

    /// The rule installed by this step, if any.
    pub const fn rule(&self) -> Option<&ClassificationRule> {
        match self {
            Self::Node(_) => None,
            Self::Rule(rule) => Some(rule),
        }
    }
}

/// Every node and rule of the tree for one delay matrix, in creation order.
///
/// Parents always precede their children: the root, then each source classifier followed by
/// its source-port rule, then each pair shaper followed by its destination-port rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapingPlan {
    peers: usize,
    steps: Vec<Step>,
}

impl ShapingPlan {
    /// Lay out the tree enforcing `matrix`.
    ///
    /// Fails if the tree cannot be numbered or addressed with this configuration.
    pub fn new(matrix: &DelayMatrix, config: &ShapingConfig) -> Result<Self> {
        let peers = matrix.len();
        config.validate_peers(peers)?;

        let n = peers as u32;
        let bands = bands(n);
        let port = |peer: usize| {
            config.port_of(peer).ok_or(Error::PortRange { base_port: config.base_port, peers })
        };
        let handle = |major: u32| {
            u16::try_from(major)
                .map(Handle)
                .map_err(|_| Error::TooManyPeers { peers, max: crate::config::MAX_PEERS })
        };

        let mut steps = Vec::with_capacity(1 + 2 * peers + 2 * peers * peers);
        steps.push(Step::Node(ShapingNode {
            handle: ROOT,
            parent: Parent::Root,
            kind: NodeKind::RootClassifier { bands },
        }));

        for i in 0..peers {
            let source = handle(source_major(i as u32))?;
            let band = ROOT.class(band_of(i as u32));
            steps.push(Step::Node(ShapingNode {
                handle: source,
                parent: Parent::Class(band),
                kind: NodeKind::SourceClassifier { peer: i, bands },
            }));
            steps.push(Step::Rule(ClassificationRule {
                classifier: ROOT,
                matcher: PortMatch::Source(port(i)?),
                flow_id: band,
                target: source,
                route: Route::Source { peer: i },
            }));
        }

        for i in 0..peers {
            let source = handle(source_major(i as u32))?;
            for j in 0..peers {
                let shaper = handle(pair_major(n, i as u32, j as u32))?;
                let band = source.class(band_of(j as u32));
                steps.push(Step::Node(ShapingNode {
                    handle: shaper,
                    parent: Parent::Class(band),
                    kind: NodeKind::DelayShaper { source: i, destination: j, delay_ms: matrix.get(i, j) },
                }));
                steps.push(Step::Rule(ClassificationRule {
                    classifier: source,
                    matcher: PortMatch::Destination(port(j)?),
                    flow_id: band,
                    target: shaper,
                    route: Route::Pair { source: i, destination: j },
                }));
            }
        }

        Ok(Self { peers, steps })
    }

    /// Number of peers.
    pub const fn peers(&self) -> usize {
        self.peers
    }

    /// All steps, in creation order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The nodes, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ShapingNode> {
        self.steps.iter().filter_map(Step::node)
    }

    /// The rules, in creation order.
    pub fn rules(&self) -> impl Iterator<Item = &ClassificationRule> {
        self.steps.iter().filter_map(Step::rule)
    }

    /// The operations building the tree, in order.
    pub fn operations<'a>(
        &'a self,
        config: &'a ShapingConfig,
    ) -> impl Iterator<Item = TcOperation> + 'a {
        self.steps.iter().map(move |step| match step {
            Step::Node(node) => node.operation(config),
            Step::Rule(rule) => rule.operation(config),
        })
    }
}
