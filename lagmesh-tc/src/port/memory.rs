//! An in-memory stand-in for an interface's qdisc tree.

use std::{collections::BTreeMap, fmt};

use super::{CommandPort, PortError};
use crate::{
    handle::{ClassId, Handle, Parent},
    op::{PortMatch, TcOperation},
};

/// Maximum number of bands of a `prio` qdisc (`TCQ_PRIO_BANDS`).
pub const MAX_PRIO_BANDS: u32 = 16;

/// Minimum number of bands compatible with the default priority map, whose entries go up to
/// band index 2.
pub const MIN_PRIO_BANDS: u32 = 3;

type FailurePredicate = Box<dyn FnMut(&TcOperation) -> bool + Send>;

/// The kind of an installed qdisc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QdiscKind {
    /// A `prio` classifier.
    Prio {
        /// Number of bands.
        bands: u32,
    },
    /// A `netem` delay shaper.
    Netem {
        /// Fixed delay in milliseconds.
        delay_ms: u32,
        /// Queue limit in packets.
        limit: u32,
    },
}

/// A qdisc installed on a [`MemoryPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QdiscNode {
    /// Handle of the qdisc.
    pub handle: Handle,
    /// Where it is attached.
    pub parent: Parent,
    /// What it does.
    pub kind: QdiscKind,
}

/// A filter installed on a [`MemoryPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEntry {
    /// The classifier the filter is attached to.
    pub parent: Handle,
    /// Filter preference; lower values are tried first.
    pub priority: u16,
    /// The port predicate.
    pub matcher: PortMatch,
    /// Class receiving matched packets.
    pub flow_id: ClassId,
}

impl FilterEntry {
    fn matches(&self, source_port: u16, destination_port: u16) -> bool {
        match self.matcher {
            PortMatch::Source(port) => port == source_port,
            PortMatch::Destination(port) => port == destination_port,
        }
    }
}

/// A [`CommandPort`] that applies operations to an in-memory qdisc tree.
///
/// The model enforces the rules the kernel applies to the operations lagmesh issues: a single
/// root qdisc, unique handles, qdiscs and filters only attached to existing `prio` bands, one
/// qdisc per band, and deletion of the root taking the whole tree with it. Every accepted
/// operation is appended to [`MemoryPort::log`].
pub struct MemoryPort {
    device: String,
    qdiscs: BTreeMap<Handle, QdiscNode>,
    filters: Vec<FilterEntry>,
    log: Vec<TcOperation>,
    fail_when: Option<FailurePredicate>,
}

impl fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPort")
            .field("device", &self.device)
            .field("qdiscs", &self.qdiscs.len())
            .field("filters", &self.filters.len())
            .field("log", &self.log.len())
            .field("fail_when", &self.fail_when.is_some())
            .finish()
    }
}

impl MemoryPort {
    /// Create an empty tree for `device`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            qdiscs: BTreeMap::new(),
            filters: Vec::new(),
            log: Vec::new(),
            fail_when: None,
        }
    }

    /// Reject every operation for which `predicate` returns true, before it is applied.
    pub fn fail_when(
        mut self,
        predicate: impl FnMut(&TcOperation) -> bool + Send + 'static,
    ) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Stop injecting failures.
    pub fn clear_failures(&mut self) {
        self.fail_when = None;
    }

    /// Operations accepted so far, in order.
    pub fn log(&self) -> &[TcOperation] {
        &self.log
    }

    /// Number of accepted operations satisfying `predicate`.
    pub fn count(&self, predicate: impl Fn(&TcOperation) -> bool) -> usize {
        self.log.iter().filter(|op| predicate(op)).count()
    }

    /// Installed qdiscs, ordered by handle.
    pub fn qdiscs(&self) -> impl Iterator<Item = &QdiscNode> {
        self.qdiscs.values()
    }

    /// The qdisc with `handle`, if installed.
    pub fn qdisc(&self, handle: Handle) -> Option<&QdiscNode> {
        self.qdiscs.get(&handle)
    }

    /// The root qdisc, if any.
    pub fn root(&self) -> Option<&QdiscNode> {
        self.qdiscs.values().find(|node| node.parent == Parent::Root)
    }

    /// Installed filters, in installation order.
    pub fn filters(&self) -> &[FilterEntry] {
        &self.filters
    }

    /// Number of installed qdiscs.
    pub fn node_count(&self) -> usize {
        self.qdiscs.len()
    }

    /// Whether no qdisc is installed.
    pub fn is_empty(&self) -> bool {
        self.qdiscs.is_empty()
    }

    /// Follow an IPv4 packet with the given ports from the root through the filters and return
    /// the leaf qdisc it ends up in.
    ///
    /// Returns `None` if the packet is not matched by a filter at some classifier (the kernel
    /// would fall back to the priority map) or lands in a band with no qdisc attached.
    pub fn classify(&self, source_port: u16, destination_port: u16) -> Option<&QdiscNode> {
        let mut node = self.root()?;
        loop {
            match node.kind {
                QdiscKind::Netem { .. } => return Some(node),
                QdiscKind::Prio { .. } => {
                    let filter = self
                        .filters_of(node.handle)
                        .find(|filter| filter.matches(source_port, destination_port))?;
                    node = self.child_of(filter.flow_id)?;
                }
            }
        }
    }

    fn filters_of(&self, parent: Handle) -> impl Iterator<Item = &FilterEntry> {
        let mut filters: Vec<_> = self.filters.iter().filter(|f| f.parent == parent).collect();
        // Stable, so installation order breaks ties like the kernel does.
        filters.sort_by_key(|f| f.priority);
        filters.into_iter()
    }

    fn child_of(&self, class: ClassId) -> Option<&QdiscNode> {
        self.qdiscs.values().find(|node| node.parent == Parent::Class(class))
    }

    fn check_class(&self, class: ClassId) -> Result<(), PortError> {
        let Some(owner) = self.qdiscs.get(&class.qdisc()) else {
            return Err(rejected(format!("parent qdisc {} does not exist", class.qdisc())));
        };
        match owner.kind {
            QdiscKind::Prio { bands } if (1..=bands).contains(&u32::from(class.minor)) => Ok(()),
            QdiscKind::Prio { bands } => {
                Err(rejected(format!("class {class} outside of {bands} bands")))
            }
            QdiscKind::Netem { .. } => Err(rejected(format!("qdisc {} is classless", owner.handle))),
        }
    }

    fn add_qdisc(&mut self, parent: Parent, handle: Handle, kind: QdiscKind) -> Result<(), PortError> {
        if handle.major() == 0 {
            return Err(rejected("handle major must be non-zero".to_string()));
        }
        if self.qdiscs.contains_key(&handle) {
            return Err(rejected(format!("handle {handle} already in use")));
        }
        if let QdiscKind::Prio { bands } = kind {
            if !(MIN_PRIO_BANDS..=MAX_PRIO_BANDS).contains(&bands) {
                return Err(rejected(format!(
                    "prio supports {MIN_PRIO_BANDS} to {MAX_PRIO_BANDS} bands, got {bands}"
                )));
            }
        }
        match parent {
            Parent::Root => {
                if let Some(root) = self.root() {
                    return Err(rejected(format!("root qdisc {} already exists", root.handle)));
                }
            }
            Parent::Class(class) => {
                self.check_class(class)?;
                if let Some(existing) = self.child_of(class) {
                    return Err(rejected(format!(
                        "class {class} already holds qdisc {}",
                        existing.handle
                    )));
                }
            }
        }

        self.qdiscs.insert(handle, QdiscNode { handle, parent, kind });
        Ok(())
    }

    fn add_filter(&mut self, filter: FilterEntry) -> Result<(), PortError> {
        match self.qdiscs.get(&filter.parent) {
            Some(QdiscNode { kind: QdiscKind::Prio { .. }, .. }) => {}
            Some(node) => return Err(rejected(format!("qdisc {} is classless", node.handle))),
            None => return Err(rejected(format!("qdisc {} does not exist", filter.parent))),
        }
        if filter.flow_id.qdisc() != filter.parent {
            return Err(rejected(format!(
                "flowid {} does not belong to {}",
                filter.flow_id, filter.parent
            )));
        }
        self.check_class(filter.flow_id)?;

        self.filters.push(filter);
        Ok(())
    }
}

fn rejected(reason: String) -> PortError {
    PortError::Rejected { reason }
}

impl CommandPort for MemoryPort {
    fn device(&self) -> &str {
        &self.device
    }

    fn execute(&mut self, op: &TcOperation) -> Result<(), PortError> {
        if let Some(fail_when) = self.fail_when.as_mut() {
            if fail_when(op) {
                tracing::debug!(%op, "injected failure");
                return Err(rejected(format!("injected failure: {op}")));
            }
        }

        match *op {
            TcOperation::DeleteRoot => {
                if self.root().is_none() {
                    return Err(PortError::NotFound);
                }
                // Deleting the root takes every descendant and filter with it.
                self.qdiscs.clear();
                self.filters.clear();
            }
            TcOperation::AddPrio { parent, handle, bands } => {
                self.add_qdisc(parent, handle, QdiscKind::Prio { bands })?;
            }
            TcOperation::AddNetem { parent, handle, delay_ms, limit } => {
                self.add_qdisc(parent, handle, QdiscKind::Netem { delay_ms, limit })?;
            }
            TcOperation::AddFilter { parent, priority, matcher, flow_id } => {
                self.add_filter(FilterEntry { parent, priority, matcher, flow_id })?;
            }
        }

        self.log.push(op.clone());
        Ok(())
    }
}
