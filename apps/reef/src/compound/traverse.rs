//! Pre/leaf/post traversal over the compound forest.

use super::{CompoundId, CompoundTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorResult {
    Continue,
    /// Skip the subtree below the visited compound, including its
    /// post visit.
    Prune,
    /// Abort the whole traversal.
    Terminate,
}

pub trait CompoundVisitor {
    type Error;

    fn visit_pre(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, Self::Error> {
        let _ = (tree, id);
        Ok(VisitorResult::Continue)
    }

    fn visit_leaf(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, Self::Error> {
        let _ = (tree, id);
        Ok(VisitorResult::Continue)
    }

    fn visit_post(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, Self::Error> {
        let _ = (tree, id);
        Ok(VisitorResult::Continue)
    }
}

/// Visit one compound subtree.
pub fn accept<V: CompoundVisitor>(
    tree: &CompoundTree,
    root: CompoundId,
    visitor: &mut V,
) -> Result<VisitorResult, V::Error> {
    if tree.is_leaf(root) {
        return visitor.visit_leaf(tree, root);
    }

    match visitor.visit_pre(tree, root)? {
        VisitorResult::Continue => {}
        VisitorResult::Prune => return Ok(VisitorResult::Continue),
        VisitorResult::Terminate => return Ok(VisitorResult::Terminate),
    }

    for child in tree.children(root) {
        if accept(tree, *child, visitor)? == VisitorResult::Terminate {
            return Ok(VisitorResult::Terminate);
        }
    }

    visitor.visit_post(tree, root)
}

/// Visit every root in forest order.
pub fn accept_forest<V: CompoundVisitor>(
    tree: &CompoundTree,
    visitor: &mut V,
) -> Result<VisitorResult, V::Error> {
    for root in tree.roots() {
        if accept(tree, *root, visitor)? == VisitorResult::Terminate {
            return Ok(VisitorResult::Terminate);
        }
    }
    Ok(VisitorResult::Continue)
}
