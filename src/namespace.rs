//! Name bindings, and the shadow overlay used while a formula is staged.

use ahash::AHashMap;

use crate::node::NodeId;

/// A named container mapping unique string keys to nodes.
///
/// Insertion order is irrelevant; writes overwrite.
#[derive(Debug, Default)]
pub(crate) struct Namespace {
    bindings: AHashMap<String, NodeId>,
}

impl Namespace {
    pub(crate) fn get(&self, name: &str) -> Option<NodeId> {
        self.bindings.get(name).copied()
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, node: NodeId) {
        self.bindings.insert(name.into(), node);
    }

    pub(crate) fn unbind(&mut self, name: &str) -> Option<NodeId> {
        self.bindings.remove(name)
    }
}

/// Shadow overlay for a formula still being staged.
///
/// Writes are buffered here and become visible to later staging calls of the
/// same builder; reads fall through to the real namespace. Nothing in the
/// overlay survives the builder — the real bindings are made by the actions
/// at commit time.
#[derive(Debug, Default)]
pub(crate) struct VirtualNamespace {
    staged: AHashMap<String, NodeId>,
}

impl VirtualNamespace {
    pub(crate) fn bind(&mut self, name: impl Into<String>, node: NodeId) {
        self.staged.insert(name.into(), node);
    }

    /// Resolves `name` against the overlay first, then the underlying
    /// namespace.
    pub(crate) fn resolve(&self, base: &Namespace, name: &str) -> Option<NodeId> {
        self.staged.get(name).copied().or_else(|| base.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_overwrite() {
        let mut ns = Namespace::default();
        ns.bind("x", NodeId(0));
        ns.bind("x", NodeId(1));
        assert_eq!(ns.get("x"), Some(NodeId(1)));
    }

    #[test]
    fn unbind_removes() {
        let mut ns = Namespace::default();
        ns.bind("x", NodeId(0));
        assert_eq!(ns.unbind("x"), Some(NodeId(0)));
        assert_eq!(ns.get("x"), None);
    }

    #[test]
    fn overlay_reads_fall_through_and_writes_shadow() {
        let mut base = Namespace::default();
        base.bind("x", NodeId(0));
        base.bind("y", NodeId(1));

        let mut overlay = VirtualNamespace::default();
        overlay.bind("y", NodeId(2));
        overlay.bind("z", NodeId(3));

        assert_eq!(overlay.resolve(&base, "x"), Some(NodeId(0)));
        assert_eq!(overlay.resolve(&base, "y"), Some(NodeId(2)));
        assert_eq!(overlay.resolve(&base, "z"), Some(NodeId(3)));
        assert_eq!(overlay.resolve(&base, "w"), None);

        // The base namespace is untouched until commit.
        assert_eq!(base.get("y"), Some(NodeId(1)));
        assert_eq!(base.get("z"), None);
    }
}
