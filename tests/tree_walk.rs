use std::cell::RefCell;
use std::rc::Rc;

use krait::{
    dump_string, enclosing_probe, enclosing_script, enclosing_stmt, probe_reg, probe_stack, walk,
    Ast, BinOp, Category, Dyn, Kind, Loc, NodeId, SharedDyn, StructureError, Tag, ValueKind,
    Visitor,
};

/// Build `kprobe:sys_write / pid == 42 { @hits[comm] = @hits[comm] + 1 }`
/// and return (script, probe, predicate lhs).
fn sample_script(ast: &mut Ast) -> (NodeId, NodeId, NodeId) {
    let pid = ast.var("pid".to_string());
    let forty_two = ast.int_lit(42);
    let pred = ast.binop(BinOp::Eq, pid, forty_two);

    let key_a = ast.var("comm".to_string());
    let rec_a = ast.rec(Some(key_a));
    let lval = ast.map("@hits".to_string(), Some(rec_a));

    let key_b = ast.var("comm".to_string());
    let rec_b = ast.rec(Some(key_b));
    let read = ast.map("@hits".to_string(), Some(rec_b));
    let one = ast.int_lit(1);
    let sum = ast.binop(BinOp::Add, read, one);

    let assign = ast.assign(lval, Some(sum));
    let probe = ast.probe("kprobe:sys_write".to_string(), Some(pred), Some(assign));
    let script = ast.script(Some(probe));
    (script, probe, pid)
}

#[derive(Debug, PartialEq)]
enum PassError {
    Structure(NodeId),
    TooComplex,
}

impl From<StructureError> for PassError {
    fn from(err: StructureError) -> Self {
        PassError::Structure(err.node)
    }
}

// ── Traversal ──

#[test]
fn test_script_traversal_visits_every_node_in_order() {
    let mut ast = Ast::new();
    let (script, _, _) = sample_script(&mut ast);

    struct Tags(Vec<Tag>);
    impl Visitor for Tags {
        type Error = StructureError;
        fn pre(&mut self, ast: &Ast, id: NodeId) -> Result<(), StructureError> {
            self.0.push(ast.node(id).kind.tag());
            Ok(())
        }
    }

    let mut tags = Tags(Vec::new());
    walk(&ast, script, &mut tags).unwrap();

    assert_eq!(
        tags.0,
        vec![
            Tag::Script,
            Tag::Probe,
            // predicate first
            Tag::Binop,
            Tag::Var,
            Tag::Int,
            // then the statement list
            Tag::Assign,
            Tag::Map,
            Tag::Rec,
            Tag::Var,
            Tag::Binop,
            Tag::Map,
            Tag::Rec,
            Tag::Var,
            Tag::Int,
        ]
    );
}

#[test]
fn test_placeholder_surfaces_as_caller_error() {
    let mut ast = Ast::new();
    let bad = ast.none();
    let probe = ast.probe("tick".to_string(), None, Some(bad));

    struct Nop;
    impl Visitor for Nop {
        type Error = PassError;
    }

    let err = walk(&ast, probe, &mut Nop).unwrap_err();
    assert_eq!(err, PassError::Structure(bad));
}

// ── Scope resolution ──

#[test]
fn test_scope_queries_from_predicate_subexpression() {
    let mut ast = Ast::new();
    let (script, probe, pid) = sample_script(&mut ast);

    assert_eq!(enclosing_probe(&ast, pid), Some(probe));
    assert_eq!(enclosing_script(&ast, pid), Some(script));
    assert_eq!(enclosing_probe(&ast, script), None);

    // the predicate root is the statement-level node for its subtree
    let stmt = enclosing_stmt(&ast, pid).unwrap();
    assert_eq!(ast.node(stmt).parent, Some(probe));
}

// ── Storage assignment ──

/// A miniature codegen pass: every integer literal gets a dynamic
/// register, falling back to an 8-byte stack slot once the bank runs
/// dry.
struct StoragePass;

impl Visitor for StoragePass {
    type Error = PassError;

    fn post(&mut self, ast: &Ast, id: NodeId) -> Result<(), PassError> {
        if !matches!(ast.node(id).kind, Kind::Int { .. }) {
            return Ok(());
        }
        let probe = enclosing_probe(ast, id).ok_or(PassError::TooComplex)?;
        let annot = ast.annot(id).expect("literals own annotations");
        let mut record = annot.borrow_mut();
        record.ty = ValueKind::Int;
        record.size = 8;
        record.loc = match probe_reg(ast, probe, Category::Dynamic) {
            Some(reg) => Loc::Reg(reg),
            None => match probe_stack(ast, probe, 8) {
                Some(offset) => Loc::Stack(offset),
                None => return Err(PassError::TooComplex),
            },
        };
        Ok(())
    }
}

#[test]
fn test_register_allocation_falls_back_to_stack() {
    let mut ast = Ast::new();
    let ints: Vec<NodeId> = (1..=5).map(|v| ast.int_lit(v)).collect();
    let stmts = ast.seq(ints.clone());
    let probe = ast.probe("tick".to_string(), None, stmts);

    walk(&ast, probe, &mut StoragePass).unwrap();

    let locs: Vec<Loc> = ints
        .iter()
        .map(|&id| ast.annot(id).unwrap().borrow().loc)
        .collect();
    assert_eq!(
        locs,
        vec![
            Loc::Reg(6),
            Loc::Reg(7),
            Loc::Reg(8),
            Loc::Stack(-8),
            Loc::Stack(-16),
        ]
    );
}

#[test]
fn test_probes_do_not_share_allocator_state() {
    let mut ast = Ast::new();
    let a1 = ast.int_lit(1);
    let first = ast.probe("tick".to_string(), None, Some(a1));
    let a2 = ast.int_lit(2);
    let second = ast.probe("tock".to_string(), None, Some(a2));
    let probes = ast.seq([first, second]);
    let script = ast.script(probes);

    walk(&ast, script, &mut StoragePass).unwrap();

    // both literals land in r6 of their own probe's bank
    assert_eq!(ast.annot(a1).unwrap().borrow().loc, Loc::Reg(6));
    assert_eq!(ast.annot(a2).unwrap().borrow().loc, Loc::Reg(6));
}

// ── Shared annotations ──

#[test]
fn test_one_record_per_name_resolves_all_occurrences() {
    let mut ast = Ast::new();
    let (script, probe, _) = sample_script(&mut ast);

    // collect every @hits occurrence
    struct FindMaps(Vec<NodeId>);
    impl Visitor for FindMaps {
        type Error = StructureError;
        fn pre(&mut self, ast: &Ast, id: NodeId) -> Result<(), StructureError> {
            if matches!(ast.node(id).kind, Kind::Map { .. }) {
                self.0.push(id);
            }
            Ok(())
        }
    }

    let mut found = FindMaps(Vec::new());
    walk(&ast, script, &mut found).unwrap();
    assert_eq!(found.0.len(), 2);

    // bind them all to one symbol-table record
    let record: SharedDyn = Rc::new(RefCell::new(Dyn::default()));
    for &id in &found.0 {
        ast.bind_annot(id, record.clone());
    }

    // codegen assigns the map a stack slot through one occurrence
    let offset = probe_stack(&ast, probe, 16).unwrap();
    ast.annot(found.0[0]).unwrap().borrow_mut().loc = Loc::Stack(offset);

    // the other occurrence observes it
    assert_eq!(
        ast.annot(found.0[1]).unwrap().borrow().loc,
        Loc::Stack(-16)
    );
}

// ── Dump ──

#[test]
fn test_dump_shows_resolved_storage() {
    let mut ast = Ast::new();
    let ints: Vec<NodeId> = (1..=4).map(|v| ast.int_lit(v)).collect();
    let stmts = ast.seq(ints);
    let probe = ast.probe("tick".to_string(), None, stmts);

    walk(&ast, probe, &mut StoragePass).unwrap();

    let out = dump_string(&ast, probe).unwrap();
    assert!(out.contains("loc:reg/6"));
    assert!(out.contains("loc:reg/8"));
    assert!(out.contains("loc:stack/-0x8"));
}
