/*!
The tree/view interface (§6 "Tree view (consumed)").

Topology construction and view-membership are explicitly out of scope for the core (§1): this
module only defines the narrow [`TreeView`] trait the phase engine and router consume, plus a
small static in-memory implementation ([`StaticTree`]) that is concrete enough to run the scenarios
in §8 and to serve as a reference for a real deployment's view-membership service.
*/

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::identity::{NodeName, PeerInfo};
use crate::suite::Suite;

/// A tree topology snapshot, identified by an integer that changes only via ViewChange (§4.8).
pub type ViewNumber = u64;

/// The tree/view interface consumed by the router and phase engine.
///
/// Implementations answer these questions for any view this node currently knows about; a view
/// the node has never been told about (e.g. because it missed a ViewChange) may return `None`
/// from [`TreeView::parent`]/[`TreeView::children`] or report `false`/`0` from the boolean and
/// count queries, at the implementation's discretion.
pub trait TreeView<S: Suite>: Send + Sync {
    /// Is this node the root in `view`?
    fn is_root(&self, view: ViewNumber) -> bool;

    /// Is `name` this node's parent in `view`?
    fn is_parent(&self, view: ViewNumber, name: &str) -> bool;

    /// Is `name` one of this node's children in `view`?
    fn is_child(&self, view: ViewNumber, name: &str) -> bool;

    /// This node's parent in `view`, or `None` if this node is root (or the view is unknown).
    fn parent(&self, view: ViewNumber) -> Option<PeerInfo<S>>;

    /// This node's children in `view`, keyed by name.
    fn children(&self, view: ViewNumber) -> BTreeMap<NodeName, PeerInfo<S>>;

    /// `self.children(view).len()`, broken out since the phase engine consults it on every
    /// Announce/Commit/Respond to size channels and wait counts.
    fn n_children(&self, view: ViewNumber) -> usize {
        self.children(view).len()
    }

    /// All peers in the network, regardless of position in the current view; used by ViewChange
    /// to compute "everyone except the new parent" as the new child set.
    fn peers(&self) -> BTreeMap<NodeName, PeerInfo<S>>;

    /// Installs a new view: `parent` is `None` for a node that becomes root, `Some` otherwise;
    /// `children` is this node's full child set under the new view.
    fn new_view(&self, view: ViewNumber, parent: Option<PeerInfo<S>>, children: BTreeMap<NodeName, PeerInfo<S>>);
}

#[derive(Debug, Clone)]
struct ViewEntry<S: Suite> {
    parent: Option<PeerInfo<S>>,
    children: BTreeMap<NodeName, PeerInfo<S>>,
}

/// A static, in-memory [`TreeView`] backed by an explicit per-view parent/children table.
///
/// This is a reference implementation, not the out-of-scope "tree-topology construction"
/// component itself: callers still have to decide what each view's topology should be (e.g. from
/// a config file, a membership service, or — in tests — a literal tree like the ones in §8's
/// scenarios) and install it with [`StaticTree::new`]/[`TreeView::new_view`].
#[derive(Debug)]
pub struct StaticTree<S: Suite> {
    me: NodeName,
    peers: BTreeMap<NodeName, PeerInfo<S>>,
    views: RwLock<BTreeMap<ViewNumber, ViewEntry<S>>>,
}

impl<S: Suite> StaticTree<S> {
    /// Creates a tree view for node `me`, with an initial view installed from `parent`/`children`,
    /// and `peers` naming every node that could ever appear in a future ViewChange.
    pub fn new(
        me: impl Into<NodeName>,
        initial_view: ViewNumber,
        parent: Option<PeerInfo<S>>,
        children: BTreeMap<NodeName, PeerInfo<S>>,
        peers: BTreeMap<NodeName, PeerInfo<S>>,
    ) -> Self {
        let mut views = BTreeMap::new();
        views.insert(initial_view, ViewEntry { parent, children });
        Self {
            me: me.into(),
            peers,
            views: RwLock::new(views),
        }
    }
}

impl<S: Suite> TreeView<S> for StaticTree<S> {
    fn is_root(&self, view: ViewNumber) -> bool {
        self.views
            .read()
            .expect("view lock poisoned")
            .get(&view)
            .map(|entry| entry.parent.is_none())
            .unwrap_or(false)
    }

    fn is_parent(&self, view: ViewNumber, name: &str) -> bool {
        self.parent(view).map(|p| p.name == name).unwrap_or(false)
    }

    fn is_child(&self, view: ViewNumber, name: &str) -> bool {
        self.views
            .read()
            .expect("view lock poisoned")
            .get(&view)
            .map(|entry| entry.children.contains_key(name))
            .unwrap_or(false)
    }

    fn parent(&self, view: ViewNumber) -> Option<PeerInfo<S>> {
        self.views
            .read()
            .expect("view lock poisoned")
            .get(&view)
            .and_then(|entry| entry.parent.clone())
    }

    fn children(&self, view: ViewNumber) -> BTreeMap<NodeName, PeerInfo<S>> {
        self.views
            .read()
            .expect("view lock poisoned")
            .get(&view)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    fn peers(&self) -> BTreeMap<NodeName, PeerInfo<S>> {
        self.peers.clone()
    }

    fn new_view(&self, view: ViewNumber, parent: Option<PeerInfo<S>>, children: BTreeMap<NodeName, PeerInfo<S>>) {
        tracing::info!(
            node = %self.me,
            view,
            parent = ?parent.as_ref().map(|p| &p.name),
            children = children.len(),
            "installed new view"
        );
        self.views
            .write()
            .expect("view lock poisoned")
            .insert(view, ViewEntry { parent, children });
    }
}
