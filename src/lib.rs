//! AST core of the krait tracing-script compiler.
//!
//! Scripts attach probes to kernel events; each probe is lowered to
//! instructions for an in-kernel virtual machine with three allocatable
//! registers and a bounded stack frame. This crate owns the pieces every
//! later pass builds on: the tree itself and its constructors, the
//! traversal engine, parent-chain scope resolution, and the per-probe
//! storage allocators consumed by code generation.
//!
//! Parsing, type resolution, provider registration and instruction
//! emission live in their own layers on top of this one.

pub mod ast;
pub mod provider;
pub mod regalloc;

pub use ast::display::{dump, dump_stderr, dump_string, DumpError};
pub use ast::navigate::{
    ancestor_of, enclosing_probe, enclosing_script, enclosing_stmt, provider_of,
};
pub use ast::walk::{walk, StructureError, Visitor};
pub use ast::{
    Ast, BinOp, Dyn, Kind, Loc, Node, NodeId, ProbeDyn, SharedDyn, Tag, ValueKind, METHOD_MODULE,
};
pub use provider::Provider;
pub use regalloc::{probe_reg, probe_stack, Category, RegBank, RegSet, StackFrame};
