//! Building the shaping tree.
//!
//! The builder replays a [`ShapingPlan`] against a [`CommandPort`], one operation per node or
//! rule. Construction is not transactional:
//!
//! - a node that cannot be created aborts the build, since every later node either depends on
//!   it or would leave traffic misrouted; the error carries the partial [`BuildReport`];
//! - a rule that cannot be installed is recorded and the build carries on, so the report says
//!   exactly which pairs are not delayed as requested.
//!
//! Whatever was created stays on the interface until the next [`reset`](crate::reset::reset).

use lagmesh_tc::{CommandPort, Handle, PortError};

use crate::{
    config::ShapingConfig,
    error::Error,
    matrix::DelayMatrix,
    plan::{ClassificationRule, Route, ShapingNode, ShapingPlan, Step},
};

/// A rule that could not be installed.
#[derive(Debug)]
pub struct FailedRule {
    /// The rule.
    pub rule: ClassificationRule,
    /// Why the port refused it.
    pub error: PortError,
}

/// What a build did to the interface.
#[derive(Debug, Default)]
pub struct BuildReport {
    peers: usize,
    /// Handles of created nodes, in creation order.
    pub created: Vec<Handle>,
    /// Handles of planned nodes that were never created.
    pub not_created: Vec<Handle>,
    /// Rules installed.
    pub installed: Vec<ClassificationRule>,
    /// Rules that failed to install.
    pub failed: Vec<FailedRule>,
}

impl BuildReport {
    fn new(peers: usize) -> Self {
        Self { peers, ..Default::default() }
    }

    /// Whether every planned node and rule is in place.
    pub fn is_clean(&self) -> bool {
        self.not_created.is_empty() && self.failed.is_empty()
    }

    /// Ordered `(source, destination)` pairs whose traffic is not steered into their shaper
    /// because a rule on the way failed to install.
    pub fn unrouted_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<_> = self
            .failed
            .iter()
            .flat_map(|failed| match failed.rule.route {
                Route::Source { peer } => (0..self.peers).map(|j| (peer, j)).collect::<Vec<_>>(),
                Route::Pair { source, destination } => vec![(source, destination)],
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The matrix or configuration cannot be turned into a tree; nothing was touched.
    #[error(transparent)]
    Invalid(#[from] Error),

    /// A node could not be created.
    #[error("failed to create {node}: {source}")]
    Node {
        /// The node.
        node: ShapingNode,
        /// Why the port refused it.
        #[source]
        source: PortError,
        /// What was done before the failure.
        report: Box<BuildReport>,
    },
}

impl BuildError {
    /// The partial report of an aborted build.
    pub fn report(&self) -> Option<&BuildReport> {
        match self {
            Self::Invalid(_) => None,
            Self::Node { report, .. } => Some(report.as_ref()),
        }
    }
}

/// Build the tree enforcing `matrix` on the port's interface.
///
/// The interface must not hold a root qdisc, see [`reset`](crate::reset::reset). Nothing
/// guards against concurrent builders on the same interface: handles are fixed by the numbering
/// scheme, so interleaved builds (or a reset during a build) corrupt each other's trees.
pub fn build<P: CommandPort + ?Sized>(
    port: &mut P,
    matrix: &DelayMatrix,
    config: &ShapingConfig,
) -> Result<BuildReport, BuildError> {
    let plan = ShapingPlan::new(matrix, config)?;
    build_plan(port, &plan, config)
}

/// Replay an existing plan. See [`build`].
pub fn build_plan<P: CommandPort + ?Sized>(
    port: &mut P,
    plan: &ShapingPlan,
    config: &ShapingConfig,
) -> Result<BuildReport, BuildError> {
    let span = tracing::debug_span!("build", device = port.device(), peers = plan.peers());
    let _enter = span.enter();

    let mut report = BuildReport::new(plan.peers());
    let steps = plan.steps();

    for (index, step) in steps.iter().enumerate() {
        match step {
            Step::Node(node) => {
                if let Err(source) = port.execute(&node.operation(config)) {
                    tracing::error!(handle = %node.handle, parent = %node.parent, ?source, "failed to create {}", node.kind);
                    report.not_created =
                        steps[index..].iter().filter_map(Step::node).map(|node| node.handle).collect();
                    return Err(BuildError::Node { node: *node, source, report: Box::new(report) });
                }
                tracing::debug!(handle = %node.handle, parent = %node.parent, "created {}", node.kind);
                report.created.push(node.handle);
            }
            Step::Rule(rule) => match port.execute(&rule.operation(config)) {
                Ok(()) => {
                    tracing::debug!(classifier = %rule.classifier, matcher = %rule.matcher, flow_id = %rule.flow_id, "installed filter");
                    report.installed.push(*rule);
                }
                Err(error) => {
                    tracing::warn!(classifier = %rule.classifier, matcher = %rule.matcher, ?error, "failed to install filter");
                    report.failed.push(FailedRule { rule: *rule, error });
                }
            },
        }
    }

    tracing::debug!(
        nodes = report.created.len(),
        rules = report.installed.len(),
        failed_rules = report.failed.len(),
        "shaping tree built"
    );

    Ok(report)
}
