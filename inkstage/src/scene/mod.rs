//! # Scene graph
//!
//! A retained tree of paintable nodes, stored in an arena keyed by [`NodeId`].
//! Renderers own disjoint subtrees and mutate them across `await` points, so the
//! graph is shared behind `Arc<parking_lot::RwLock<Graph>>` - see [`SharedGraph`].
//!
//! Removal is terminal and tolerant: writes addressed to a node that no longer
//! exists are silent no-ops. That is what makes late async completions (a bitmap
//! fetch resolving after its renderer was destroyed) safe without cancellation
//! tokens.

pub mod raster;

use std::sync::Arc;

use inkstage_core::color::Color;
use inkstage_core::units::Rect;

pub type NodeId = inkstage_core::Id<Node>;

/// The graph handle renderers hold. Write locks are short: no lock is ever held
/// across an `await`.
pub type SharedGraph = Arc<parking_lot::RwLock<Graph>>;

/// Per-node compositing rule, applied against whatever the node is painted over
/// *within its isolated group*.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompositeMode {
    /// Normal painting.
    SourceOver,
    /// Keep the source only where the destination already has coverage, discarding
    /// the destination. This is the mask-uniformity trick: a full-viewport rect
    /// painted `SourceIn` over opaque shapes is clipped to exactly their
    /// silhouette, at exactly the rect's own alpha.
    SourceIn,
    /// Erase: destination coverage is removed where the source has coverage.
    DestinationOut,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group {
        /// Isolated groups composite through an offscreen surface, so child
        /// `SourceIn`/`DestinationOut` rules cannot reach content outside the
        /// group.
        isolate: bool,
    },
    Line {
        points: Vec<ultraviolet::Vec2>,
        width: f32,
        color: Color,
        clip: Option<Rect>,
    },
    Rect {
        rect: Rect,
        color: Color,
    },
    Image {
        /// `None` until a fetch completes - nothing is painted meanwhile.
        bitmap: Option<Arc<image::RgbaImage>>,
        /// Painted size in canvas units; the bitmap is sampled to fit.
        size: [f32; 2],
        offset: ultraviolet::Vec2,
    },
    /// Non-painting annotation ("loading", error text). Kept in the tree so a UI
    /// front-end can surface it; the software compositor skips it.
    Label {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    parent: Option<NodeId>,
    /// Paint order, back-to-front.
    children: smallvec::SmallVec<[NodeId; 4]>,
    pub visible: bool,
    /// Applied when compositing an isolated group; ignored elsewhere.
    pub opacity: f32,
    pub composite: CompositeMode,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: smallvec::SmallVec::new(),
            visible: true,
            opacity: 1.0,
            composite: CompositeMode::SourceOver,
            kind,
        }
    }
    #[must_use]
    pub fn group(isolate: bool) -> Self {
        Self::new(NodeKind::Group { isolate })
    }
    #[must_use]
    pub fn label(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Label { text: text.into() })
    }
    #[must_use = "builder method returns the modified node"]
    pub fn with_composite(mut self, composite: CompositeMode) -> Self {
        self.composite = composite;
        self
    }
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }
}

pub struct Graph {
    nodes: hashbrown::HashMap<NodeId, Node>,
    root: NodeId,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        let root_id = NodeId::fresh();
        let mut nodes = hashbrown::HashMap::new();
        nodes.insert(root_id, Node::group(false));
        Self {
            nodes,
            root: root_id,
        }
    }
    /// Wrap a fresh graph in the handle renderers share.
    #[must_use]
    pub fn new_shared() -> SharedGraph {
        Arc::new(parking_lot::RwLock::new(Self::new()))
    }
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }
    /// Insert `node` as the topmost (last-painted) child of `parent`.
    ///
    /// # Panics
    /// If `parent` is absent or not a group - that is a construction-order bug,
    /// not a runtime condition.
    pub fn attach(&mut self, parent: NodeId, node: Node) -> NodeId {
        assert!(
            self.nodes.get(&parent).is_some_and(Node::is_group),
            "attach target {parent} is not a live group"
        );
        let id = NodeId::fresh();
        let mut node = node;
        node.parent = Some(parent);
        self.nodes.insert(id, node);
        // Unwrap: checked above, insert can't displace it (fresh id).
        self.nodes.get_mut(&parent).unwrap().children.push(id);
        id
    }
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }
    /// `None` if the node has been removed. Stale writers must treat that as
    /// "do nothing", never as an error.
    #[must_use]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }
    /// Remove a node and its whole subtree. Removing an already-removed id is a
    /// no-op. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        // Children are orphaned wholesale - no parent links to fix below this
        // point, they all die together.
        let mut pending: Vec<NodeId> = node.children.into_vec();
        while let Some(next) = pending.pop() {
            if let Some(dead) = self.nodes.remove(&next) {
                pending.extend(dead.children);
            }
        }
    }
    /// Visibility toggle that tolerates removed nodes.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }
    /// Replace `parent`'s paint order. `order` must be a permutation of the current
    /// children.
    pub fn set_child_order(&mut self, parent: NodeId, order: &[NodeId]) {
        let Some(node) = self.nodes.get_mut(&parent) else {
            return;
        };
        debug_assert_eq!(node.children.len(), order.len());
        debug_assert!(order.iter().all(|id| node.children.contains(id)));
        node.children = order.iter().copied().collect();
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remove_is_recursive_and_idempotent() {
        let mut graph = Graph::new();
        let group = graph.attach(graph.root(), Node::group(false));
        let child = graph.attach(group, Node::label("hi"));
        let grandchild_parent = graph.attach(group, Node::group(true));
        let grandchild = graph.attach(grandchild_parent, Node::label("bye"));

        graph.remove(group);
        for id in [group, child, grandchild_parent, grandchild] {
            assert!(!graph.contains(id));
        }
        // Second removal, and writes to the dead ids, are no-ops.
        graph.remove(group);
        graph.set_visible(child, true);
        assert!(graph.get_mut(grandchild).is_none());
    }

    #[test]
    fn attach_appends_topmost() {
        let mut graph = Graph::new();
        let a = graph.attach(graph.root(), Node::label("a"));
        let b = graph.attach(graph.root(), Node::label("b"));
        assert_eq!(graph.get(graph.root()).unwrap().children(), &[a, b]);
    }

    #[test]
    fn reorder() {
        let mut graph = Graph::new();
        let a = graph.attach(graph.root(), Node::label("a"));
        let b = graph.attach(graph.root(), Node::label("b"));
        let c = graph.attach(graph.root(), Node::label("c"));
        graph.set_child_order(graph.root(), &[c, a, b]);
        assert_eq!(graph.get(graph.root()).unwrap().children(), &[c, a, b]);
    }

    #[test]
    #[should_panic(expected = "not a live group")]
    fn attach_to_leaf_is_fatal() {
        let mut graph = Graph::new();
        let leaf = graph.attach(graph.root(), Node::label("leaf"));
        let _ = graph.attach(leaf, Node::label("child"));
    }
}
