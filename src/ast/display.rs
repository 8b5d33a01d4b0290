//! Diagnostic tree dumper.
//!
//! One line per node, indentation reflecting depth, `|` columns marking
//! continuing sibling lists. The exact text is a debugging aid, not a
//! compatibility surface.

use std::fmt;

use thiserror::Error;

use super::walk::{walk, StructureError, Visitor};
use super::{Ast, Kind, Loc, NodeId, ValueKind};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Fmt(#[from] fmt::Error),
}

/// Render the subtree rooted at `root` into `out`.
pub fn dump<W: fmt::Write>(ast: &Ast, root: NodeId, out: &mut W) -> Result<(), DumpError> {
    let mut dumper = Dumper { depth: 0, out };
    walk(ast, root, &mut dumper)
}

/// Render the subtree rooted at `root` to a string.
pub fn dump_string(ast: &Ast, root: NodeId) -> Result<String, DumpError> {
    let mut out = String::new();
    dump(ast, root, &mut out)?;
    Ok(out)
}

/// Print the tree to stderr, in the form used by compiler debug output.
pub fn dump_stderr(ast: &Ast, root: NodeId) {
    match dump_string(ast, root) {
        Ok(rendered) => eprint!("ast:\n{rendered}"),
        Err(err) => eprintln!("ast: dump failed: {err}"),
    }
}

struct Dumper<'w, W> {
    depth: usize,
    out: &'w mut W,
}

impl<W: fmt::Write> Visitor for Dumper<'_, W> {
    type Error = DumpError;

    fn pre(&mut self, ast: &Ast, id: NodeId) -> Result<(), DumpError> {
        for i in 0..self.depth {
            let continued = nth_parent(ast, id, self.depth - i)
                .map(|p| has_next(ast, p))
                .unwrap_or(false);
            self.out.write_str(if continued { "|   " } else { "    " })?;
        }
        self.out
            .write_str(if has_next(ast, id) { "|-> " } else { "`-> " })?;
        payload(ast, id, self.out)?;
        self.out.write_char(' ')?;
        annotation(ast, id, self.out)?;
        self.out.write_char('\n')?;
        self.depth += 1;
        Ok(())
    }

    fn post(&mut self, _ast: &Ast, _id: NodeId) -> Result<(), DumpError> {
        self.depth -= 1;
        Ok(())
    }
}

/// Whether more output follows at this node's level: a later sibling, or
/// a sibling-like position inside the parent (a binop's left operand, an
/// assignment's target, an if's condition).
fn has_next(ast: &Ast, id: NodeId) -> bool {
    let node = ast.node(id);
    if node.next.is_some() {
        return true;
    }
    let Some(parent) = node.parent else {
        return false;
    };
    match &ast.node(parent).kind {
        Kind::Binop { left, .. } => *left == id,
        Kind::Assign { lval, .. } => *lval == id,
        Kind::If { cond, .. } => *cond == id,
        _ => false,
    }
}

fn nth_parent(ast: &Ast, id: NodeId, n: usize) -> Option<NodeId> {
    let mut cur = id;
    for _ in 0..n {
        cur = ast.node(cur).parent?;
    }
    Some(cur)
}

fn payload<W: fmt::Write>(ast: &Ast, id: NodeId, out: &mut W) -> fmt::Result {
    let kind = &ast.node(id).kind;
    match kind {
        Kind::None
        | Kind::Script { .. }
        | Kind::Method { .. }
        | Kind::If { .. }
        | Kind::Break
        | Kind::Continue
        | Kind::Return
        | Kind::Not { .. }
        | Kind::Rec { .. }
        | Kind::Stack => write!(out, "<{}>", kind.tag()),
        Kind::Probe { spec, .. } => out.write_str(spec),
        Kind::Assign { op, .. } => out.write_str(op),
        Kind::Map { name, .. } | Kind::Var { name } => out.write_str(name),
        Kind::Binop { op, .. } => out.write_str(op.as_str()),
        Kind::Unroll { count, .. } => write!(out, "unroll ({count})"),
        Kind::Call { module, func, .. } => {
            write!(out, "{}.{}", module.as_deref().unwrap_or("<auto>"), func)
        }
        Kind::Int { value } => write!(out, "{value:#x}"),
        Kind::Str { text } => write_escaped(out, text),
    }
}

fn annotation<W: fmt::Write>(ast: &Ast, id: NodeId, out: &mut W) -> fmt::Result {
    let tag = ast.node(id).kind.tag();
    let (ty, size, loc) = match ast.annot(id) {
        Some(cell) => {
            let annot = cell.borrow();
            (annot.ty, annot.size, annot.loc)
        }
        // unbound var/map references have nothing resolved yet
        None => (ValueKind::Unknown, 0, Loc::Nowhere),
    };

    write!(out, "(type:{tag}/{ty} size:{size:#x} loc:{loc}")?;
    match loc {
        Loc::Reg(reg) => write!(out, "/{reg}")?,
        Loc::Stack(offset) => write!(out, "/-{:#x}", -offset)?,
        Loc::Nowhere | Loc::Virtual => {}
    }
    out.write_char(')')
}

fn write_escaped<W: fmt::Write>(out: &mut W, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in text.chars() {
        if c.is_ascii_graphic() || c == ' ' {
            out.write_char(c)?;
            continue;
        }
        match c {
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            _ => write!(out, "\\x{:02x}", c as u32)?,
        }
    }
    out.write_char('"')
}
