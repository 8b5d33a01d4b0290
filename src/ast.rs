use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::provider::Provider;
use crate::regalloc::{RegBank, StackFrame};

pub mod display;
pub mod navigate;
pub mod walk;

/// Index of a node in its [`Ast`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Module name stamped on calls wrapped by a method node, so later passes
/// can tell method-style calls from free calls without extra state.
pub const METHOD_MODULE: &str = "method";

/// A script tree node.
///
/// Siblings form an insertion-ordered singly linked list through `next`;
/// a list is identified by its head node. `parent` is a non-owning
/// back-reference set by the constructor of the enclosing node. The
/// annotation slot is filled at construction for every kind except
/// variable and map references, which alias a symbol-table record bound
/// later (see [`Ast::bind_annot`]).
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: Kind,
    pub next: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub annot: Option<SharedDyn>,
}

/// Node kinds with their per-kind payload.
#[derive(Clone, Debug)]
pub enum Kind {
    /// Placeholder produced for malformed input; walking it is an error.
    None,
    /// A whole compilation unit: the list of probes.
    Script {
        probes: Option<NodeId>,
    },
    /// A triggerable unit: event spec, optional predicate, statements.
    Probe {
        spec: String,
        pred: Option<NodeId>,
        stmts: Option<NodeId>,
    },
    /// A call applied to a map, e.g. `@m.count()`.
    Method {
        map: NodeId,
        call: NodeId,
    },
    If {
        cond: NodeId,
        then: Option<NodeId>,
        /// Last statement of the then branch, for tail detection.
        then_last: Option<NodeId>,
        els: Option<NodeId>,
    },
    Break,
    Continue,
    Return,
    Not {
        expr: NodeId,
    },
    /// An ordered tuple of values, e.g. a map's composite key.
    Rec {
        args: Option<NodeId>,
        arity: usize,
    },
    Assign {
        op: String,
        lval: NodeId,
        /// Absent for the declare-only form.
        expr: Option<NodeId>,
    },
    Map {
        name: String,
        key: NodeId,
    },
    Var {
        name: String,
    },
    Binop {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    /// A loop body repeated a compile-time-bounded number of times.
    Unroll {
        count: i64,
        stmts: Option<NodeId>,
    },
    Call {
        module: Option<String>,
        func: String,
        args: Option<NodeId>,
        arity: usize,
    },
    Int {
        value: i64,
    },
    Str {
        text: String,
    },
    /// Synthetic marker for a value spilled to the stack frame.
    Stack,
}

impl Kind {
    pub fn tag(&self) -> Tag {
        match self {
            Kind::None => Tag::None,
            Kind::Script { .. } => Tag::Script,
            Kind::Probe { .. } => Tag::Probe,
            Kind::Method { .. } => Tag::Method,
            Kind::If { .. } => Tag::If,
            Kind::Break => Tag::Break,
            Kind::Continue => Tag::Continue,
            Kind::Return => Tag::Return,
            Kind::Not { .. } => Tag::Not,
            Kind::Rec { .. } => Tag::Rec,
            Kind::Assign { .. } => Tag::Assign,
            Kind::Map { .. } => Tag::Map,
            Kind::Var { .. } => Tag::Var,
            Kind::Binop { .. } => Tag::Binop,
            Kind::Unroll { .. } => Tag::Unroll,
            Kind::Call { .. } => Tag::Call,
            Kind::Int { .. } => Tag::Int,
            Kind::Str { .. } => Tag::Str,
            Kind::Stack => Tag::Stack,
        }
    }
}

/// Payload-free discriminant of [`Kind`], for kind queries and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    None,
    Script,
    Probe,
    Method,
    If,
    Break,
    Continue,
    Return,
    Not,
    Rec,
    Assign,
    Map,
    Var,
    Binop,
    Unroll,
    Call,
    Int,
    Str,
    Stack,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::None => "none",
            Tag::Script => "script",
            Tag::Probe => "probe",
            Tag::Method => "method",
            Tag::If => "if",
            Tag::Break => "break",
            Tag::Continue => "continue",
            Tag::Return => "return",
            Tag::Not => "not",
            Tag::Rec => "rec",
            Tag::Assign => "assign",
            Tag::Map => "map",
            Tag::Var => "var",
            Tag::Binop => "binop",
            Tag::Unroll => "unroll",
            Tag::Call => "call",
            Tag::Int => "int",
            Tag::Str => "str",
            Tag::Stack => "stack",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    LogOr,  // ||
    LogAnd, // &&
    BitOr,  // |
    BitXor, // ^
    BitAnd, // &
    Eq,     // ==
    Ne,     // !=
    Lt,     // <
    Gt,     // >
    Le,     // <=
    Ge,     // >=
    Shl,    // <<
    Shr,    // >>
    Add,    // +
    Sub,    // -
    Mul,    // *
    Div,    // /
    Mod,    // %
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::LogOr => "||",
            BinOp::LogAnd => "&&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

/// Resolved value kind of an expression, filled by type resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    Unknown,
    Int,
    Str,
    Rec,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Unknown => "none",
            ValueKind::Int => "int",
            ValueKind::Str => "str",
            ValueKind::Rec => "rec",
        })
    }
}

/// Physical storage assigned to a value by code generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Loc {
    #[default]
    Nowhere,
    /// Materialized on demand, no fixed storage.
    Virtual,
    Reg(u8),
    /// Offset from the probe's frame base (negative, frame grows down).
    Stack(isize),
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Loc::Nowhere => "nowhere",
            Loc::Virtual => "virtual",
            Loc::Reg(_) => "reg",
            Loc::Stack(_) => "stack",
        })
    }
}

/// Pass-filled metadata attached to a node (the "dyn" record).
#[derive(Clone, Debug, Default)]
pub struct Dyn {
    pub ty: ValueKind,
    pub size: usize,
    pub loc: Loc,
    /// Present only on probe annotations.
    pub probe: Option<ProbeDyn>,
}

impl Dyn {
    fn for_probe() -> Self {
        Self {
            probe: Some(ProbeDyn::new()),
            ..Self::default()
        }
    }
}

/// Per-probe compilation state carried by the probe's annotation: the
/// provider the probe attaches to and the storage allocators consumed by
/// code generation. Scoped to compiling that one probe.
#[derive(Clone, Debug, Default)]
pub struct ProbeDyn {
    pub pvdr: Option<Rc<dyn Provider>>,
    pub regs: RegBank,
    pub frame: StackFrame,
}

impl ProbeDyn {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A shared, mutable annotation cell.
///
/// Every occurrence of one variable or map name aliases a single cell
/// co-owned by the symbol table, so all references resolve to one
/// storage location. Other kinds own their cell exclusively through the
/// node.
pub type SharedDyn = Rc<RefCell<Dyn>>;

/// Arena holding one compilation unit's tree.
///
/// The arena exclusively owns every node, its text payloads, and each
/// privately allocated annotation; dropping it releases them all exactly
/// once. Annotations shared with the symbol table outlive the tree
/// through their remaining reference count.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node's annotation, if one is attached. Variable and map
    /// references have none until [`Ast::bind_annot`] runs.
    pub fn annot(&self, id: NodeId) -> Option<&SharedDyn> {
        self.node(id).annot.as_ref()
    }

    /// Attach a symbol-table record to a variable or map reference.
    pub fn bind_annot(&mut self, id: NodeId, record: SharedDyn) {
        debug_assert!(matches!(
            self.node(id).kind,
            Kind::Var { .. } | Kind::Map { .. }
        ));
        trace!(node = id.index(), "bound shared annotation");
        self.nodes[id.index()].annot = Some(record);
    }

    fn push_node(&mut self, kind: Kind, annot: Option<SharedDyn>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node {
            kind,
            next: None,
            parent: None,
            annot,
        });
        id
    }

    fn push(&mut self, kind: Kind) -> NodeId {
        let annot = match kind {
            // shared records are bound by the symbol table instead
            Kind::Var { .. } | Kind::Map { .. } => None,
            _ => Some(Rc::new(RefCell::new(Dyn::default()))),
        };
        self.push_node(kind, annot)
    }

    fn adopt(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
    }

    fn adopt_list(&mut self, head: Option<NodeId>, parent: NodeId) {
        let mut cur = head;
        while let Some(id) = cur {
            self.nodes[id.index()].parent = Some(parent);
            cur = self.nodes[id.index()].next;
        }
    }

    fn list_len(&self, head: Option<NodeId>) -> usize {
        self.siblings(head).count()
    }

    fn list_last(&self, head: Option<NodeId>) -> Option<NodeId> {
        self.siblings(head).last()
    }

    // ── Constructors ──
    //
    // Each returns a fully linked node: parents of all supplied children
    // are set before the id escapes. Text arguments are consumed.

    pub fn none(&mut self) -> NodeId {
        self.push(Kind::None)
    }

    pub fn int_lit(&mut self, value: i64) -> NodeId {
        self.push(Kind::Int { value })
    }

    pub fn str_lit(&mut self, text: String) -> NodeId {
        self.push(Kind::Str { text })
    }

    pub fn stack_slot(&mut self) -> NodeId {
        self.push(Kind::Stack)
    }

    pub fn break_stmt(&mut self) -> NodeId {
        self.push(Kind::Break)
    }

    pub fn continue_stmt(&mut self) -> NodeId {
        self.push(Kind::Continue)
    }

    pub fn return_stmt(&mut self) -> NodeId {
        self.push(Kind::Return)
    }

    pub fn var(&mut self, name: String) -> NodeId {
        self.push(Kind::Var { name })
    }

    /// A map reference. With no explicit key, a single-element record
    /// holding an empty string is synthesized so every map has a
    /// well-formed key shape.
    pub fn map(&mut self, name: String, key: Option<NodeId>) -> NodeId {
        let key = match key {
            Some(key) => key,
            None => {
                let empty = self.str_lit(String::new());
                self.rec(Some(empty))
            }
        };
        let id = self.push(Kind::Map { name, key });
        self.adopt(key, id);
        id
    }

    pub fn rec(&mut self, args: Option<NodeId>) -> NodeId {
        let arity = self.list_len(args);
        let id = self.push(Kind::Rec { args, arity });
        self.adopt_list(args, id);
        id
    }

    pub fn not(&mut self, expr: NodeId) -> NodeId {
        let id = self.push(Kind::Not { expr });
        self.adopt(expr, id);
        id
    }

    pub fn binop(&mut self, op: BinOp, left: NodeId, right: NodeId) -> NodeId {
        let id = self.push(Kind::Binop { op, left, right });
        self.adopt(left, id);
        self.adopt(right, id);
        id
    }

    /// An assignment, or with `expr` absent the declare-only form.
    pub fn assign(&mut self, lval: NodeId, expr: Option<NodeId>) -> NodeId {
        let id = self.push(Kind::Assign {
            op: "=".to_string(),
            lval,
            expr,
        });
        self.adopt(lval, id);
        if let Some(expr) = expr {
            self.adopt(expr, id);
        }
        id
    }

    /// A call applied to a map. Stamps the wrapped call's module with
    /// [`METHOD_MODULE`].
    pub fn method(&mut self, map: NodeId, call: NodeId) -> NodeId {
        debug_assert!(matches!(self.node(call).kind, Kind::Call { .. }));
        if let Kind::Call { module, .. } = &mut self.nodes[call.index()].kind {
            *module = Some(METHOD_MODULE.to_string());
        }
        let id = self.push(Kind::Method { map, call });
        self.adopt(map, id);
        self.adopt(call, id);
        id
    }

    pub fn call(&mut self, module: Option<String>, func: String, args: Option<NodeId>) -> NodeId {
        let arity = self.list_len(args);
        let id = self.push(Kind::Call {
            module,
            func,
            args,
            arity,
        });
        self.adopt_list(args, id);
        id
    }

    pub fn iff(&mut self, cond: NodeId, then: Option<NodeId>, els: Option<NodeId>) -> NodeId {
        let then_last = self.list_last(then);
        let id = self.push(Kind::If {
            cond,
            then,
            then_last,
            els,
        });
        self.adopt(cond, id);
        self.adopt_list(then, id);
        self.adopt_list(els, id);
        id
    }

    pub fn unroll(&mut self, count: i64, stmts: Option<NodeId>) -> NodeId {
        let id = self.push(Kind::Unroll { count, stmts });
        self.adopt_list(stmts, id);
        id
    }

    pub fn probe(&mut self, spec: String, pred: Option<NodeId>, stmts: Option<NodeId>) -> NodeId {
        let annot = Rc::new(RefCell::new(Dyn::for_probe()));
        let id = self.push_node(Kind::Probe { spec, pred, stmts }, Some(annot));
        if let Some(pred) = pred {
            self.adopt(pred, id);
        }
        self.adopt_list(stmts, id);
        id
    }

    pub fn script(&mut self, probes: Option<NodeId>) -> NodeId {
        let id = self.push(Kind::Script { probes });
        self.adopt_list(probes, id);
        id
    }

    // ── Sibling lists ──

    /// Append `elem` at the tail of `list`, returning the head.
    pub fn append(&mut self, list: Option<NodeId>, elem: NodeId) -> NodeId {
        let Some(head) = list else { return elem };
        let mut cur = head;
        while let Some(next) = self.nodes[cur.index()].next {
            cur = next;
        }
        self.nodes[cur.index()].next = Some(elem);
        head
    }

    /// Link a sequence of nodes into a sibling list, returning the head.
    pub fn seq<I: IntoIterator<Item = NodeId>>(&mut self, elems: I) -> Option<NodeId> {
        let mut head = None;
        let mut tail: Option<NodeId> = None;
        for id in elems {
            match tail {
                None => head = Some(id),
                Some(tail) => self.nodes[tail.index()].next = Some(id),
            }
            tail = Some(id);
        }
        head
    }

    /// Iterate a sibling list from its head, in insertion order.
    pub fn siblings(&self, head: Option<NodeId>) -> Siblings<'_> {
        Siblings { ast: self, cur: head }
    }
}

pub struct Siblings<'a> {
    ast: &'a Ast,
    cur: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cur?;
        // the link is read before the element is handed out
        self.cur = self.ast.node(id).next;
        Some(id)
    }
}
