//! Parent-chain scope resolution: locate the enclosing syntactic
//! context of an arbitrary subexpression.

use std::rc::Rc;

use super::{Ast, Kind, NodeId, Tag};
use crate::provider::Provider;

/// Nearest node of the given kind on the parent chain, starting at and
/// including `id`.
pub fn ancestor_of(ast: &Ast, id: NodeId, tag: Tag) -> Option<NodeId> {
    let mut cur = Some(id);
    while let Some(id) = cur {
        if ast.node(id).kind.tag() == tag {
            return Some(id);
        }
        cur = ast.node(id).parent;
    }
    None
}

/// The probe `id` belongs to, or `id` itself if it is one.
pub fn enclosing_probe(ast: &Ast, id: NodeId) -> Option<NodeId> {
    ancestor_of(ast, id, Tag::Probe)
}

/// The compilation unit containing `id`.
pub fn enclosing_script(ast: &Ast, id: NodeId) -> Option<NodeId> {
    ancestor_of(ast, id, Tag::Script)
}

/// The top-level statement containing `id`: the last node on the parent
/// chain before the enclosing probe.
///
/// `None` when `id` is not rooted under a probe, including when `id` is
/// the probe (or the script) itself.
pub fn enclosing_stmt(ast: &Ast, id: NodeId) -> Option<NodeId> {
    let mut cur = id;
    loop {
        let parent = ast.node(cur).parent?;
        if matches!(ast.node(parent).kind, Kind::Probe { .. }) {
            return Some(cur);
        }
        cur = parent;
    }
}

/// The provider the enclosing probe attaches to. Absent when `id` has
/// no probe ancestor or the probe has not been resolved to one yet.
pub fn provider_of(ast: &Ast, id: NodeId) -> Option<Rc<dyn Provider>> {
    let probe = enclosing_probe(ast, id)?;
    let annot = ast.annot(probe)?;
    let state = annot.borrow();
    state.probe.as_ref().and_then(|p| p.pvdr.clone())
}
