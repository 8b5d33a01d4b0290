//! Generic tree traversal used by every compiler pass.
//!
//! Child visitation order is fixed per node kind; the match below is the
//! single source of truth for it, and being exhaustive it forces an
//! update whenever a kind is added.

use thiserror::Error;
use tracing::trace;

use super::{Ast, Kind, NodeId};

/// A placeholder node reached a pass that expects a fully formed tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("placeholder node reached during traversal")]
pub struct StructureError {
    pub node: NodeId,
}

/// Pre/post-order hooks for [`walk`].
///
/// `pre` runs before a node's children; an error from it skips the
/// children and the node's `post`, and aborts the whole traversal.
/// `post` runs after all children succeeded. Both default to doing
/// nothing.
pub trait Visitor {
    type Error: From<StructureError>;

    fn pre(&mut self, ast: &Ast, id: NodeId) -> Result<(), Self::Error> {
        let _ = (ast, id);
        Ok(())
    }

    fn post(&mut self, ast: &Ast, id: NodeId) -> Result<(), Self::Error> {
        let _ = (ast, id);
        Ok(())
    }
}

/// Visit the subtree rooted at `id` in order, aborting on the first
/// error either hook returns.
pub fn walk<V: Visitor>(ast: &Ast, id: NodeId, visitor: &mut V) -> Result<(), V::Error> {
    visitor.pre(ast, id)?;

    match &ast.node(id).kind {
        Kind::Script { probes } => walk_list(ast, *probes, visitor)?,
        Kind::Probe { pred, stmts, .. } => {
            if let Some(pred) = *pred {
                walk(ast, pred, visitor)?;
            }
            walk_list(ast, *stmts, visitor)?;
        }
        Kind::If {
            cond, then, els, ..
        } => {
            walk(ast, *cond, visitor)?;
            walk_list(ast, *then, visitor)?;
            walk_list(ast, *els, visitor)?;
        }
        Kind::Unroll { stmts, .. } => walk_list(ast, *stmts, visitor)?,
        Kind::Call { args, .. } => walk_list(ast, *args, visitor)?,
        Kind::Method { map, call } => {
            walk(ast, *map, visitor)?;
            walk(ast, *call, visitor)?;
        }
        Kind::Assign { lval, expr, .. } => {
            walk(ast, *lval, visitor)?;
            if let Some(expr) = *expr {
                walk(ast, expr, visitor)?;
            }
        }
        Kind::Binop { left, right, .. } => {
            walk(ast, *left, visitor)?;
            walk(ast, *right, visitor)?;
        }
        Kind::Not { expr } => walk(ast, *expr, visitor)?,
        Kind::Map { key, .. } => walk(ast, *key, visitor)?,
        Kind::Rec { args, .. } => walk_list(ast, *args, visitor)?,
        Kind::None => {
            trace!(node = id.index(), "traversal hit a placeholder node");
            return Err(StructureError { node: id }.into());
        }
        Kind::Break
        | Kind::Continue
        | Kind::Return
        | Kind::Var { .. }
        | Kind::Int { .. }
        | Kind::Str { .. }
        | Kind::Stack => {}
    }

    visitor.post(ast, id)
}

fn walk_list<V: Visitor>(ast: &Ast, head: Option<NodeId>, visitor: &mut V) -> Result<(), V::Error> {
    let mut cur = head;
    while let Some(id) = cur {
        // capture the link before recursing into the element
        cur = ast.node(id).next;
        walk(ast, id, visitor)?;
    }
    Ok(())
}
