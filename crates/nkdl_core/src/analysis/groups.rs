//! Render-order partitioning.

use std::collections::BTreeMap;

use crate::models::SortPolicy;
use crate::project::OutputNode;

/// Output nodes partitioned by render order, lowest order first.
///
/// Every node appears in exactly one group and no group is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOrderGroups {
    groups: BTreeMap<i32, Vec<OutputNode>>,
}

impl RenderOrderGroups {
    /// Partition `nodes`, ordering each group by `policy`.
    pub fn new(nodes: Vec<OutputNode>, policy: SortPolicy) -> Self {
        let mut groups: BTreeMap<i32, Vec<OutputNode>> = BTreeMap::new();
        for node in sort_nodes(nodes, policy) {
            groups.entry(node.render_order).or_default().push(node);
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Number of nodes across all groups.
    pub fn node_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Render orders in ascending order.
    pub fn orders(&self) -> Vec<i32> {
        self.groups.keys().copied().collect()
    }

    pub fn get(&self, order: i32) -> Option<&[OutputNode]> {
        self.groups.get(&order).map(Vec::as_slice)
    }

    /// Groups in ascending render order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &[OutputNode])> {
        self.groups.iter().map(|(order, nodes)| (*order, nodes.as_slice()))
    }

    /// All nodes, lowest render order first.
    pub fn nodes(&self) -> impl Iterator<Item = &OutputNode> {
        self.groups.values().flatten()
    }
}

/// Order nodes according to `policy`. Sorting is stable, so ties keep their
/// declaration order.
pub fn sort_nodes(mut nodes: Vec<OutputNode>, policy: SortPolicy) -> Vec<OutputNode> {
    match policy {
        SortPolicy::Declaration => {}
        SortPolicy::Alphabetical => nodes.sort_by(|a, b| a.name.cmp(&b.name)),
        SortPolicy::RenderOrder => nodes.sort_by_key(|n| n.render_order),
        SortPolicy::RenderOrderThenAlphabetical => nodes.sort_by(|a, b| {
            a.render_order
                .cmp(&b.render_order)
                .then_with(|| a.name.cmp(&b.name))
        }),
    }
    nodes
}

/// Dependencies between render-order groups.
///
/// Each group depends on exactly the group immediately before it; the lowest
/// group depends on nothing.
pub fn dependency_edges(groups: &RenderOrderGroups) -> BTreeMap<i32, Vec<i32>> {
    let orders = groups.orders();
    let mut edges = BTreeMap::new();
    for (index, order) in orders.iter().enumerate() {
        let upstream = match index {
            0 => Vec::new(),
            _ => vec![orders[index - 1]],
        };
        edges.insert(*order, upstream);
    }
    edges
}
