//! Integration tests for the lowering pass.
//!
//! Parse trees are constructed by hand (the parser is an external
//! collaborator) and the lowered TAST is checked structurally.

use reef_core::ast::{CoreSymbol, Expr, LiteralValue, SendFlags};
use reef_core::context::{Config, Context};
use reef_core::desugar;
use reef_core::diagnostics::{DiagnosticCollector, ErrorCode};
use reef_core::loc::{FileId, Loc};
use reef_core::names::{NameRef, NameTable};
use reef_core::parse::Node;
use reef_core::source::{FileKind, FileTable};
use reef_core::verifier;

struct Fixture {
    names: NameTable,
    files: FileTable,
    diagnostics: DiagnosticCollector,
    file: FileId,
}

impl Fixture {
    fn with_kind(kind: FileKind) -> Self {
        let names = NameTable::new();
        let mut files = FileTable::new();
        let file = files.add_file("example", "line one\nline two\nline three\n", kind);
        Fixture {
            names,
            files,
            diagnostics: DiagnosticCollector::new(),
            file,
        }
    }

    fn new() -> Self {
        Fixture::with_kind(FileKind::Source)
    }

    fn ctx(&mut self) -> Context<'_> {
        Context::new(
            &mut self.names,
            &self.files,
            &mut self.diagnostics,
            Config::default(),
        )
    }

    fn loc(&self, start: u32, end: u32) -> Loc {
        Loc::span(self.file, start, end)
    }

    fn name(&mut self, s: &str) -> NameRef {
        self.names.intern(s)
    }

    fn lower(&mut self, node: Node) -> Expr {
        let mut ctx = self.ctx();
        desugar::lower(&mut ctx, node).expect("lowering failed")
    }

    fn has_error(&self, code: ErrorCode) -> bool {
        self.diagnostics.diagnostics().iter().any(|d| d.code == code)
    }

    fn show(&self, name: NameRef) -> &str {
        self.names.resolve(name).unwrap_or("<missing>")
    }
}

/// Unwrap the synthetic root class and return its body.
fn unit_body(expr: Expr) -> Vec<Expr> {
    match expr {
        Expr::ClassDef(class_def) => class_def.body,
        other => panic!("expected root class body, got {:?}", other),
    }
}

fn unit_single(expr: Expr) -> Expr {
    let mut body = unit_body(expr);
    assert_eq!(body.len(), 1, "expected a single top-level expression");
    body.remove(0)
}

fn lvar(fx: &mut Fixture, s: &str, start: u32, end: u32) -> Node {
    let name = fx.name(s);
    Node::LVar {
        loc: fx.loc(start, end),
        name,
    }
}

fn lvar_lhs(fx: &mut Fixture, s: &str, start: u32, end: u32) -> Node {
    let name = fx.name(s);
    Node::LVarLhs {
        loc: fx.loc(start, end),
        name,
    }
}

fn int(fx: &Fixture, v: &str, start: u32, end: u32) -> Node {
    Node::Integer {
        loc: fx.loc(start, end),
        val: v.to_string(),
    }
}

fn str_node(fx: &mut Fixture, s: &str, start: u32, end: u32) -> Node {
    let val = fx.name(s);
    Node::String {
        loc: fx.loc(start, end),
        val,
    }
}

#[test]
fn test_top_level_is_root_class() {
    let mut fx = Fixture::new();
    let node = lvar(&mut fx, "x", 0, 1);
    let tast = fx.lower(node);
    match &tast {
        Expr::ClassDef(class_def) => match class_def.name.as_ref() {
            Expr::ConstantLit(cnst) => assert_eq!(cnst.symbol, CoreSymbol::Root),
            other => panic!("expected root constant, got {:?}", other),
        },
        other => panic!("expected class body, got {:?}", other),
    }
}

#[test]
fn test_top_level_sequence_is_flattened() {
    let mut fx = Fixture::new();
    let stmts = vec![
        lvar(&mut fx, "a", 0, 1),
        lvar(&mut fx, "b", 2, 3),
        lvar(&mut fx, "c", 4, 5),
    ];
    let node = Node::Begin {
        loc: fx.loc(0, 5),
        stmts,
    };
    let body = unit_body(fx.lower(node));
    assert_eq!(body.len(), 3);
}

#[test]
fn test_and_asgn_on_local_duplicates_reference() {
    // x &&= 1  =>  if x then x = 1 else x end
    let mut fx = Fixture::new();
    let node = Node::AndAsgn {
        loc: fx.loc(0, 8),
        lhs: Box::new(lvar_lhs(&mut fx, "x", 0, 1)),
        rhs: Box::new(int(&fx, "1", 7, 8)),
    };
    let expr = unit_single(fx.lower(node));
    let x = fx.name("x");
    match expr {
        Expr::If(iff) => {
            assert!(matches!(*iff.cond, Expr::Local(ref l) if l.name == x));
            match *iff.thenp {
                Expr::Assign(assign) => {
                    assert!(matches!(*assign.lhs, Expr::Local(ref l) if l.name == x));
                    assert!(matches!(
                        *assign.rhs,
                        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1)
                    ));
                }
                other => panic!("expected assignment, got {:?}", other),
            }
            assert!(matches!(*iff.elsep, Expr::Local(ref l) if l.name == x));
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_op_asgn_on_send_evaluates_receiver_once() {
    // a.b += 1  =>  { tr = a; tr.b=(tr.b() + 1) }
    let mut fx = Fixture::new();
    let b = fx.name("b");
    let plus = fx.name("+");
    let node = Node::OpAsgn {
        loc: fx.loc(0, 8),
        lhs: Box::new(Node::Send {
            loc: fx.loc(0, 3),
            receiver: Some(Box::new(lvar(&mut fx, "a", 0, 1))),
            method: b,
            args: Vec::new(),
        }),
        op: plus,
        rhs: Box::new(int(&fx, "1", 7, 8)),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::InsSeq(seq) => {
            assert_eq!(seq.stats.len(), 1);
            match &seq.stats[0] {
                Expr::Assign(assign) => {
                    match assign.lhs.as_ref() {
                        Expr::Local(l) => assert_eq!(fx.show(l.name), "<b$2>"),
                        other => panic!("expected temp local, got {:?}", other),
                    }
                    assert!(matches!(assign.rhs.as_ref(), Expr::Local(_)));
                }
                other => panic!("expected receiver capture, got {:?}", other),
            }
            match *seq.expr {
                Expr::Send(setter) => {
                    assert_eq!(fx.show(setter.method), "b=");
                    assert_eq!(setter.args.len(), 1);
                    match &setter.args[0] {
                        Expr::Send(op_send) => {
                            assert_eq!(fx.show(op_send.method), "+");
                            match op_send.recv.as_ref() {
                                Expr::Send(read) => assert_eq!(fx.show(read.method), "b"),
                                other => panic!("expected read send, got {:?}", other),
                            }
                        }
                        other => panic!("expected operator send, got {:?}", other),
                    }
                }
                ref other => panic!("expected setter send, got {:?}", other),
            }
        }
        other => panic!("expected instruction sequence, got {:?}", other),
    }
}

#[test]
fn test_string_interpolation_folds_left() {
    // "#{x}y#{z}"  =>  x.to_s.concat("y").concat(z.to_s)
    let mut fx = Fixture::new();
    let nodes = vec![
        lvar(&mut fx, "x", 3, 4),
        str_node(&mut fx, "y", 5, 6),
        lvar(&mut fx, "z", 8, 9),
    ];
    let node = Node::DString {
        loc: fx.loc(0, 11),
        nodes,
    };
    let expr = unit_single(fx.lower(node));
    let outer = match expr {
        Expr::Send(send) => send,
        other => panic!("expected send, got {:?}", other),
    };
    assert_eq!(fx.show(outer.method), "concat");
    match &outer.args[0] {
        Expr::Send(to_s) => {
            assert_eq!(fx.show(to_s.method), "to_s");
            let z = fx.name("z");
            assert!(matches!(to_s.recv.as_ref(), Expr::Local(l) if l.name == z));
        }
        other => panic!("expected to_s send, got {:?}", other),
    }
    let inner = match outer.recv.as_ref() {
        Expr::Send(send) => send,
        other => panic!("expected inner concat, got {:?}", other),
    };
    assert_eq!(fx.show(inner.method), "concat");
    assert_eq!(inner.args[0].as_string_lit(), Some(fx.name("y")));
    match inner.recv.as_ref() {
        Expr::Send(to_s) => assert_eq!(fx.show(to_s.method), "to_s"),
        other => panic!("expected to_s send, got {:?}", other),
    }
}

#[test]
fn test_adjacent_string_parts_merge() {
    let mut fx = Fixture::new();
    let nodes = vec![
        str_node(&mut fx, "foo", 1, 4),
        str_node(&mut fx, "bar", 4, 7),
    ];
    let node = Node::DString {
        loc: fx.loc(0, 8),
        nodes,
    };
    let expr = unit_single(fx.lower(node));
    assert_eq!(expr.as_string_lit(), Some(fx.name("foobar")));
}

#[test]
fn test_symbol_interpolation_ends_with_intern() {
    let mut fx = Fixture::new();
    let nodes = vec![str_node(&mut fx, "a", 2, 3), lvar(&mut fx, "x", 5, 6)];
    let node = Node::DSymbol {
        loc: fx.loc(0, 8),
        nodes,
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => assert_eq!(fx.show(send.method), "intern"),
        other => panic!("expected intern send, got {:?}", other),
    }
}

#[test]
fn test_multiple_assignment_with_splat() {
    // a, *b, c = [1, 2, 3, 4]
    let mut fx = Fixture::new();
    let a = lvar_lhs(&mut fx, "a", 0, 1);
    let b = lvar_lhs(&mut fx, "b", 4, 5);
    let c = lvar_lhs(&mut fx, "c", 7, 8);
    let rhs = Node::Array {
        loc: fx.loc(11, 23),
        elts: vec![
            int(&fx, "1", 12, 13),
            int(&fx, "2", 15, 16),
            int(&fx, "3", 18, 19),
            int(&fx, "4", 21, 22),
        ],
    };
    let node = Node::Masgn {
        loc: fx.loc(0, 23),
        lhs: Box::new(Node::Mlhs {
            loc: fx.loc(0, 8),
            exprs: vec![
                a,
                Node::SplatLhs {
                    loc: fx.loc(3, 5),
                    var: Some(Box::new(b)),
                },
                c,
            ],
        }),
        rhs: Box::new(rhs),
    };
    let expr = unit_single(fx.lower(node));
    let seq = match expr {
        Expr::InsSeq(seq) => seq,
        other => panic!("expected instruction sequence, got {:?}", other),
    };
    assert_eq!(seq.stats.len(), 5);

    // tExp = Magic.expandSplat(tRhs, 1, 1)
    match &seq.stats[1] {
        Expr::Assign(assign) => match assign.rhs.as_ref() {
            Expr::Send(send) => {
                assert_eq!(fx.show(send.method), "expandSplat");
                assert!(send.recv.is_magic());
                assert!(matches!(
                    send.args[1],
                    Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1)
                ));
                assert!(matches!(
                    send.args[2],
                    Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1)
                ));
            }
            other => panic!("expected expandSplat send, got {:?}", other),
        },
        other => panic!("expected expansion assignment, got {:?}", other),
    }

    // a = tExp[0]
    match &seq.stats[2] {
        Expr::Assign(assign) => match assign.rhs.as_ref() {
            Expr::Send(send) => {
                assert_eq!(fx.show(send.method), "[]");
                assert!(matches!(
                    send.args[0],
                    Expr::Literal(ref lit) if lit.value == LiteralValue::Int(0)
                ));
            }
            other => panic!("expected index send, got {:?}", other),
        },
        other => panic!("expected element assignment, got {:?}", other),
    }

    // b = tExp.slice(Range.new(1, -1, true))
    match &seq.stats[3] {
        Expr::Assign(assign) => match assign.rhs.as_ref() {
            Expr::Send(send) => {
                assert_eq!(fx.show(send.method), "slice");
                match &send.args[0] {
                    Expr::Send(range_new) => {
                        assert_eq!(fx.show(range_new.method), "new");
                        assert!(matches!(
                            range_new.args[0],
                            Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1)
                        ));
                        assert!(matches!(
                            range_new.args[1],
                            Expr::Literal(ref lit) if lit.value == LiteralValue::Int(-1)
                        ));
                        assert!(matches!(
                            range_new.args[2],
                            Expr::Literal(ref lit) if lit.value == LiteralValue::True
                        ));
                    }
                    other => panic!("expected Range.new, got {:?}", other),
                }
            }
            other => panic!("expected slice send, got {:?}", other),
        },
        other => panic!("expected splat assignment, got {:?}", other),
    }

    // c = tExp[-1]
    match &seq.stats[4] {
        Expr::Assign(assign) => match assign.rhs.as_ref() {
            Expr::Send(send) => {
                assert!(matches!(
                    send.args[0],
                    Expr::Literal(ref lit) if lit.value == LiteralValue::Int(-1)
                ));
            }
            other => panic!("expected index send, got {:?}", other),
        },
        other => panic!("expected element assignment, got {:?}", other),
    }

    // The sequence evaluates to the whole right-hand side.
    assert!(matches!(*seq.expr, Expr::Local(_)));
}

#[test]
fn test_for_loop_becomes_each_with_block() {
    // for i in xs do p(i) end
    let mut fx = Fixture::new();
    let i = fx.name("i");
    let p = fx.name("p");
    let node = Node::For {
        loc: fx.loc(0, 22),
        vars: Box::new(lvar_lhs(&mut fx, "i", 4, 5)),
        expr: Box::new(lvar(&mut fx, "xs", 9, 11)),
        body: Some(Box::new(Node::Send {
            loc: fx.loc(15, 19),
            receiver: None,
            method: p,
            args: vec![lvar(&mut fx, "i", 17, 18)],
        })),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "each");
            let xs = fx.name("xs");
            assert!(matches!(send.recv.as_ref(), Expr::Local(l) if l.name == xs));
            let block = send.block.expect("each call must carry a block");
            assert_eq!(block.args.len(), 1);
            assert!(matches!(&block.args[0], Expr::Local(l) if l.name == i));
            match block.body.as_ref() {
                Expr::Send(call) => {
                    assert_eq!(fx.show(call.method), "p");
                    assert!(call.flags.contains(SendFlags::PRIVATE_OK));
                }
                other => panic!("expected call in block body, got {:?}", other),
            }
        }
        other => panic!("expected each send, got {:?}", other),
    }
}

#[test]
fn test_safe_navigation_guards_on_nil() {
    // a&.m  =>  { t = a; if t == nil then nil else t.m end }
    let mut fx = Fixture::new();
    let m = fx.name("m");
    let node = Node::CSend {
        loc: fx.loc(0, 5),
        receiver: Box::new(lvar(&mut fx, "a", 0, 1)),
        method: m,
        args: Vec::new(),
    };
    let expr = unit_single(fx.lower(node));
    let seq = match expr {
        Expr::InsSeq(seq) => seq,
        other => panic!("expected instruction sequence, got {:?}", other),
    };
    assert_eq!(seq.stats.len(), 1);
    match *seq.expr {
        Expr::If(iff) => {
            match *iff.cond {
                Expr::Send(cond) => {
                    assert_eq!(fx.show(cond.method), "==");
                    assert!(matches!(
                        cond.args[0],
                        Expr::Literal(ref lit) if lit.value == LiteralValue::Nil
                    ));
                }
                ref other => panic!("expected nil comparison, got {:?}", other),
            }
            assert!(matches!(
                *iff.thenp,
                Expr::Literal(ref lit) if lit.value == LiteralValue::Nil
            ));
            assert!(matches!(*iff.elsep, Expr::Send(ref s) if s.method == m));
        }
        ref other => panic!("expected guard, got {:?}", other),
    }
}

#[test]
fn test_symbol_block_pass_expands_to_block() {
    // xs.map(&:name)  =>  xs.map { |t| t.name() }
    let mut fx = Fixture::new();
    let map = fx.name("map");
    let sym = fx.name("name");
    let node = Node::Send {
        loc: fx.loc(0, 14),
        receiver: Some(Box::new(lvar(&mut fx, "xs", 0, 2))),
        method: map,
        args: vec![Node::BlockPass {
            loc: fx.loc(7, 13),
            block: Box::new(Node::Symbol {
                loc: fx.loc(8, 13),
                val: sym,
            }),
        }],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(send.method, map);
            let block = send.block.expect("expected synthesized block");
            assert_eq!(block.args.len(), 1);
            // The synthesized parameter has a zero-length loc.
            assert!(block.args[0].loc().is_zero_length());
            match block.body.as_ref() {
                Expr::Send(body) => assert_eq!(body.method, sym),
                other => panic!("expected forwarding send, got {:?}", other),
            }
        }
        other => panic!("expected send with block, got {:?}", other),
    }
}

#[test]
fn test_splat_argument_routes_through_magic() {
    // f(*xs)  =>  Magic.callWithSplat(self, :f, xs.to_a)
    let mut fx = Fixture::new();
    let f = fx.name("f");
    let node = Node::Send {
        loc: fx.loc(0, 6),
        receiver: None,
        method: f,
        args: vec![Node::Splat {
            loc: fx.loc(2, 5),
            var: Box::new(lvar(&mut fx, "xs", 3, 5)),
        }],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "callWithSplat");
            assert!(send.recv.is_magic());
            assert_eq!(send.args.len(), 3);
            assert_eq!(send.args[1].as_symbol_lit(), Some(f));
        }
        other => panic!("expected intrinsic call, got {:?}", other),
    }
}

#[test]
fn test_block_pass_expression_routes_through_magic() {
    // a.f(1, &blk)  =>  Magic.callWithBlock(a, :f, blk, 1)
    let mut fx = Fixture::new();
    let f = fx.name("f");
    let node = Node::Send {
        loc: fx.loc(0, 11),
        receiver: Some(Box::new(lvar(&mut fx, "a", 0, 1))),
        method: f,
        args: vec![
            int(&fx, "1", 4, 5),
            Node::BlockPass {
                loc: fx.loc(7, 11),
                block: Box::new(lvar(&mut fx, "blk", 8, 11)),
            },
        ],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "callWithBlock");
            assert!(send.recv.is_magic());
            assert_eq!(send.args.len(), 4);
            assert_eq!(send.args[1].as_symbol_lit(), Some(f));
            assert!(matches!(
                send.args[3],
                Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1)
            ));
        }
        other => panic!("expected intrinsic call, got {:?}", other),
    }
}

fn simple_def(fx: &mut Fixture, body: Option<Box<Node>>, args: Option<Box<Node>>) -> Node {
    let name = fx.name("m");
    Node::DefMethod {
        loc: fx.loc(0, 20),
        decl_loc: fx.loc(0, 6),
        name,
        args,
        body,
    }
}

fn method_of(expr: Expr) -> reef_core::ast::MethodDef {
    match unit_single(expr) {
        Expr::MethodDef(method) => method,
        other => panic!("expected method definition, got {:?}", other),
    }
}

#[test]
fn test_method_args_end_with_block_arg() {
    let mut fx = Fixture::new();
    let x = fx.name("x");
    let args = Node::Args {
        loc: fx.loc(6, 9),
        args: vec![Node::Arg {
            loc: fx.loc(7, 8),
            name: x,
        }],
    };
    let node = simple_def(&mut fx, None, Some(Box::new(args)));
    let method = method_of(fx.lower(node));
    assert_eq!(method.args.len(), 2);
    assert!(matches!(method.args[0], Expr::Local(ref l) if l.name == x));
    match &method.args[1] {
        Expr::BlockArg(blk) => assert!(!blk.loc.exists()),
        other => panic!("expected synthesized block parameter, got {:?}", other),
    }
}

#[test]
fn test_block_given_guards_on_block_arg() {
    let mut fx = Fixture::new();
    let block_given = fx.name("block_given?");
    let body = Node::Send {
        loc: fx.loc(10, 22),
        receiver: None,
        method: block_given,
        args: Vec::new(),
    };
    let node = simple_def(&mut fx, Some(Box::new(body)), None);
    let method = method_of(fx.lower(node));
    match *method.body {
        Expr::If(iff) => {
            let blk = fx.name("<blk>");
            assert!(matches!(*iff.cond, Expr::Local(ref l) if l.name == blk));
            assert!(matches!(*iff.thenp, Expr::Send(_)));
            assert!(matches!(
                *iff.elsep,
                Expr::Literal(ref lit) if lit.value == LiteralValue::False
            ));
        }
        ref other => panic!("expected guard, got {:?}", other),
    }
}

#[test]
fn test_yield_with_named_block_parameter() {
    let mut fx = Fixture::new();
    let cb = fx.name("cb");
    let args = Node::Args {
        loc: fx.loc(6, 9),
        args: vec![Node::Blockarg {
            loc: fx.loc(7, 9),
            name: cb,
        }],
    };
    let body = Node::Yield {
        loc: fx.loc(12, 19),
        exprs: vec![int(&fx, "1", 18, 19)],
    };
    let node = simple_def(&mut fx, Some(Box::new(body)), Some(Box::new(args)));
    let method = method_of(fx.lower(node));
    match *method.body {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "call");
            assert!(matches!(send.recv.as_ref(), Expr::Local(l) if l.name == cb));
        }
        ref other => panic!("expected call send, got {:?}", other),
    }
    assert!(!fx.has_error(ErrorCode::UnnamedBlockParameter));
}

#[test]
fn test_yield_without_block_parameter_is_reported() {
    let mut fx = Fixture::new();
    let body = Node::Yield {
        loc: fx.loc(10, 15),
        exprs: Vec::new(),
    };
    let node = simple_def(&mut fx, Some(Box::new(body)), None);
    let _ = fx.lower(node);
    assert!(fx.has_error(ErrorCode::UnnamedBlockParameter));
}

#[test]
fn test_destructuring_parameter_prepends_assignment() {
    // def m((a, b)) ... end
    let mut fx = Fixture::new();
    let a = lvar_lhs(&mut fx, "a", 8, 9);
    let b = lvar_lhs(&mut fx, "b", 11, 12);
    let args = Node::Args {
        loc: fx.loc(6, 13),
        args: vec![Node::Mlhs {
            loc: fx.loc(7, 13),
            exprs: vec![a, b],
        }],
    };
    let body = lvar(&mut fx, "a", 15, 16);
    let node = simple_def(&mut fx, Some(Box::new(body)), Some(Box::new(args)));
    let method = method_of(fx.lower(node));
    match &method.args[0] {
        Expr::Local(l) => assert_eq!(fx.show(l.name), "<destructureArg$2>"),
        other => panic!("expected substituted parameter, got {:?}", other),
    }
    match method.body.as_ref() {
        Expr::InsSeq(seq) => {
            // The destructure runs before the original body.
            assert!(matches!(&seq.stats[0], Expr::InsSeq(_)));
        }
        other => panic!("expected destructure prefix, got {:?}", other),
    }
}

#[test]
fn test_until_negates_condition() {
    let mut fx = Fixture::new();
    let node = Node::Until {
        loc: fx.loc(0, 16),
        cond: Box::new(lvar(&mut fx, "done", 6, 10)),
        body: Some(Box::new(lvar(&mut fx, "x", 12, 13))),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::While(wl) => match *wl.cond {
            Expr::Send(send) => assert_eq!(fx.show(send.method), "!"),
            ref other => panic!("expected negation, got {:?}", other),
        },
        other => panic!("expected while, got {:?}", other),
    }
}

#[test]
fn test_post_test_loop_breaks_after_body() {
    // begin x end until done  =>  while true do { x; if done then break } end
    let mut fx = Fixture::new();
    let body = Node::Kwbegin {
        loc: fx.loc(0, 11),
        stmts: vec![lvar(&mut fx, "x", 6, 7)],
    };
    let node = Node::UntilPost {
        loc: fx.loc(0, 22),
        cond: Box::new(lvar(&mut fx, "done", 18, 22)),
        body: Box::new(body),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::While(wl) => {
            assert!(matches!(
                *wl.cond,
                Expr::Literal(ref lit) if lit.value == LiteralValue::True
            ));
            match *wl.body {
                Expr::InsSeq(seq) => match *seq.expr {
                    Expr::If(iff) => assert!(matches!(*iff.thenp, Expr::Break(_))),
                    ref other => panic!("expected break guard, got {:?}", other),
                },
                ref other => panic!("expected sequenced body, got {:?}", other),
            }
        }
        other => panic!("expected while, got {:?}", other),
    }
}

#[test]
fn test_case_patterns_use_triple_eq() {
    // case x; when 1, 2 then "one"; else "other" end
    let mut fx = Fixture::new();
    let one = str_node(&mut fx, "one", 22, 27);
    let other = str_node(&mut fx, "other", 34, 41);
    let node = Node::Case {
        loc: fx.loc(0, 45),
        condition: Some(Box::new(lvar(&mut fx, "x", 5, 6))),
        whens: vec![Node::When {
            loc: fx.loc(8, 27),
            patterns: vec![int(&fx, "1", 13, 14), int(&fx, "2", 16, 17)],
            body: Some(Box::new(one)),
        }],
        else_: Some(Box::new(other)),
    };
    let expr = unit_single(fx.lower(node));
    let seq = match expr {
        Expr::InsSeq(seq) => seq,
        other => panic!("expected capture sequence, got {:?}", other),
    };
    let iff = match *seq.expr {
        Expr::If(iff) => iff,
        ref other => panic!("expected dispatch, got {:?}", other),
    };
    // The first pattern is outermost: if 1 === t then true else 2 === t.
    match *iff.cond {
        Expr::If(or_cond) => {
            match *or_cond.cond {
                Expr::Send(test) => {
                    assert_eq!(fx.show(test.method), "===");
                    assert!(matches!(
                        test.recv.as_ref(),
                        Expr::Literal(lit) if lit.value == LiteralValue::Int(1)
                    ));
                }
                ref other => panic!("expected === test, got {:?}", other),
            }
            assert!(matches!(
                *or_cond.thenp,
                Expr::Literal(ref lit) if lit.value == LiteralValue::True
            ));
            match *or_cond.elsep {
                Expr::Send(test) => {
                    assert!(matches!(
                        test.recv.as_ref(),
                        Expr::Literal(lit) if lit.value == LiteralValue::Int(2)
                    ));
                }
                ref other => panic!("expected === test, got {:?}", other),
            }
        }
        ref other => panic!("expected or-combined condition, got {:?}", other),
    }
}

#[test]
fn test_class_without_superclass_uses_placeholder() {
    let mut fx = Fixture::new();
    let c = fx.name("C");
    let node = Node::Class {
        loc: fx.loc(0, 12),
        decl_loc: fx.loc(0, 7),
        name: Box::new(Node::Const {
            loc: fx.loc(6, 7),
            scope: None,
            name: c,
        }),
        superclass: None,
        body: None,
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::ClassDef(class_def) => {
            assert_eq!(class_def.ancestors.len(), 1);
            assert!(matches!(
                class_def.ancestors[0],
                Expr::ConstantLit(ref cnst) if cnst.symbol == CoreSymbol::Todo
            ));
        }
        other => panic!("expected class, got {:?}", other),
    }
}

#[test]
fn test_singleton_class_of_non_self_is_rejected() {
    let mut fx = Fixture::new();
    let node = Node::SClass {
        loc: fx.loc(0, 18),
        decl_loc: fx.loc(0, 8),
        expr: Box::new(lvar(&mut fx, "obj", 9, 12)),
        body: None,
    };
    let expr = unit_single(fx.lower(node));
    assert!(expr.is_empty_tree());
    assert!(fx.has_error(ErrorCode::InvalidSingletonDef));
}

#[test]
fn test_def_on_non_self_singleton_is_rejected() {
    let mut fx = Fixture::new();
    let m = fx.name("m");
    let node = Node::DefS {
        loc: fx.loc(0, 14),
        decl_loc: fx.loc(0, 9),
        singleton: Box::new(lvar(&mut fx, "obj", 4, 7)),
        name: m,
        args: None,
        body: None,
    };
    let expr = unit_single(fx.lower(node));
    assert!(expr.is_empty_tree());
    assert!(fx.has_error(ErrorCode::InvalidSingletonDef));
}

#[test]
fn test_constant_op_assignment_is_rejected() {
    let mut fx = Fixture::new();
    let c = fx.name("LIMIT");
    let plus = fx.name("+");
    let node = Node::OpAsgn {
        loc: fx.loc(0, 10),
        lhs: Box::new(Node::ConstLhs {
            loc: fx.loc(0, 5),
            scope: None,
            name: c,
        }),
        op: plus,
        rhs: Box::new(int(&fx, "1", 9, 10)),
    };
    let expr = unit_single(fx.lower(node));
    assert!(expr.is_empty_tree());
    assert!(fx.has_error(ErrorCode::NoConstantReassignment));
}

#[test]
fn test_integer_literal_decoding() {
    let mut fx = Fixture::new();
    let expr = unit_single(fx.lower(int(&fx, "1_000_000", 0, 9)));
    assert!(matches!(
        expr,
        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(1_000_000)
    ));

    let mut fx = Fixture::new();
    let expr = unit_single(fx.lower(int(&fx, "~5", 0, 2)));
    assert!(matches!(
        expr,
        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(!5)
    ));
}

#[test]
fn test_integer_out_of_range_defaults_to_zero() {
    let mut fx = Fixture::new();
    let expr = unit_single(fx.lower(int(&fx, "99999999999999999999999999", 0, 26)));
    assert!(matches!(
        expr,
        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(0)
    ));
    assert!(fx.has_error(ErrorCode::IntegerOutOfRange));
}

#[test]
fn test_malformed_float_becomes_nan() {
    let mut fx = Fixture::new();
    let node = Node::Float {
        loc: fx.loc(0, 5),
        val: "1.2.3".to_string(),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Literal(lit) => match lit.value {
            LiteralValue::Float(v) => assert!(v.is_nan()),
            other => panic!("expected float, got {:?}", other),
        },
        other => panic!("expected literal, got {:?}", other),
    }
    assert!(fx.has_error(ErrorCode::FloatOutOfRange));
}

#[test]
fn test_rescue_binds_fresh_temporary() {
    // begin x rescue then y end — no binding written in the source.
    let mut fx = Fixture::new();
    let node = Node::Rescue {
        loc: fx.loc(0, 24),
        body: Some(Box::new(lvar(&mut fx, "x", 6, 7))),
        rescue: vec![Node::Resbody {
            loc: fx.loc(8, 20),
            exception: None,
            var: None,
            body: Some(Box::new(lvar(&mut fx, "y", 19, 20))),
        }],
        else_: None,
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Rescue(rescue) => {
            assert_eq!(rescue.rescue_cases.len(), 1);
            let case = &rescue.rescue_cases[0];
            assert!(case.exceptions.is_empty());
            match case.var.as_ref() {
                Expr::Local(l) => assert_eq!(fx.show(l.name), "<rescueTemp$2>"),
                other => panic!("expected temp binding, got {:?}", other),
            }
        }
        other => panic!("expected rescue, got {:?}", other),
    }
}

#[test]
fn test_rescue_exception_list_is_flattened() {
    let mut fx = Fixture::new();
    let e = fx.name("E");
    let f = fx.name("F");
    let v = lvar_lhs(&mut fx, "err", 22, 25);
    let node = Node::Rescue {
        loc: fx.loc(0, 34),
        body: Some(Box::new(lvar(&mut fx, "x", 6, 7))),
        rescue: vec![Node::Resbody {
            loc: fx.loc(8, 30),
            exception: Some(Box::new(Node::Array {
                loc: fx.loc(15, 19),
                elts: vec![
                    Node::Const {
                        loc: fx.loc(15, 16),
                        scope: None,
                        name: e,
                    },
                    Node::Const {
                        loc: fx.loc(18, 19),
                        scope: None,
                        name: f,
                    },
                ],
            })),
            var: Some(Box::new(v)),
            body: Some(Box::new(lvar(&mut fx, "err", 28, 31))),
        }],
        else_: None,
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Rescue(rescue) => {
            let case = &rescue.rescue_cases[0];
            assert_eq!(case.exceptions.len(), 2);
            let err = fx.name("err");
            assert!(matches!(case.var.as_ref(), Expr::Local(l) if l.name == err));
        }
        other => panic!("expected rescue, got {:?}", other),
    }
}

#[test]
fn test_bare_ensure_folds_into_rescue() {
    let mut fx = Fixture::new();
    let inner = Node::Rescue {
        loc: fx.loc(0, 20),
        body: Some(Box::new(lvar(&mut fx, "x", 6, 7))),
        rescue: vec![Node::Resbody {
            loc: fx.loc(8, 16),
            exception: None,
            var: None,
            body: None,
        }],
        else_: None,
    };
    let node = Node::Ensure {
        loc: fx.loc(0, 32),
        body: Some(Box::new(inner)),
        ensure: Some(Box::new(lvar(&mut fx, "cleanup", 24, 31))),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Rescue(rescue) => {
            assert_eq!(rescue.rescue_cases.len(), 1);
            let cleanup = fx.name("cleanup");
            assert!(matches!(
                rescue.ensure.as_ref(),
                Expr::Local(l) if l.name == cleanup
            ));
        }
        other => panic!("expected single rescue, got {:?}", other),
    }
}

#[test]
fn test_multi_value_return_wraps_in_array() {
    let mut fx = Fixture::new();
    let a = lvar(&mut fx, "a", 7, 8);
    let b = lvar(&mut fx, "b", 10, 11);
    let node = Node::Return {
        loc: fx.loc(0, 11),
        exprs: vec![a, b],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Return(ret) => match *ret.expr {
            Expr::Array(arr) => assert_eq!(arr.elems.len(), 2),
            ref other => panic!("expected array, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_return_of_block_pass_is_rejected() {
    let mut fx = Fixture::new();
    let node = Node::Return {
        loc: fx.loc(0, 12),
        exprs: vec![Node::BlockPass {
            loc: fx.loc(7, 12),
            block: Box::new(lvar(&mut fx, "blk", 8, 11)),
        }],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Return(ret) => assert!(ret.expr.is_empty_tree()),
        other => panic!("expected return, got {:?}", other),
    }
    assert!(fx.has_error(ErrorCode::UnsupportedNode));
}

#[test]
fn test_defined_flattens_constant_path() {
    // defined?(A::B)  =>  Magic.defined?("A", "B")
    let mut fx = Fixture::new();
    let a = fx.name("A");
    let b = fx.name("B");
    let node = Node::Defined {
        loc: fx.loc(0, 14),
        value: Box::new(Node::Const {
            loc: fx.loc(9, 13),
            scope: Some(Box::new(Node::Const {
                loc: fx.loc(9, 10),
                scope: None,
                name: a,
            })),
            name: b,
        }),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "defined?");
            assert!(send.recv.is_magic());
            assert_eq!(send.args.len(), 2);
            assert_eq!(send.args[0].as_string_lit(), Some(a));
            assert_eq!(send.args[1].as_string_lit(), Some(b));
        }
        other => panic!("expected intrinsic call, got {:?}", other),
    }
}

#[test]
fn test_super_without_args_forwards_parameters() {
    let mut fx = Fixture::new();
    let node = Node::ZSuper { loc: fx.loc(0, 5) };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "super");
            assert!(send.recv.is_self_ref());
            assert_eq!(send.args.len(), 1);
            assert!(matches!(send.args[0], Expr::ZSuperArgs(_)));
        }
        other => panic!("expected super send, got {:?}", other),
    }
}

#[test]
fn test_ranges_build_range_new() {
    let mut fx = Fixture::new();
    let node = Node::ERange {
        loc: fx.loc(0, 5),
        from: Some(Box::new(int(&fx, "1", 0, 1))),
        to: Some(Box::new(int(&fx, "9", 4, 5))),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "new");
            assert!(matches!(
                send.recv.as_ref(),
                Expr::ConstantLit(cnst) if cnst.symbol == CoreSymbol::Range
            ));
            assert_eq!(send.args.len(), 3);
            assert!(matches!(
                send.args[2],
                Expr::Literal(ref lit) if lit.value == LiteralValue::True
            ));
        }
        other => panic!("expected Range.new, got {:?}", other),
    }
}

#[test]
fn test_regexp_folds_option_bits() {
    let mut fx = Fixture::new();
    let pattern = str_node(&mut fx, "a+", 1, 3);
    let node = Node::Regexp {
        loc: fx.loc(0, 6),
        regex: vec![pattern],
        opts: Some(Box::new(Node::Regopt {
            loc: fx.loc(4, 6),
            opts: "im".to_string(),
        })),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "new");
            assert!(matches!(
                send.recv.as_ref(),
                Expr::ConstantLit(cnst) if cnst.symbol == CoreSymbol::Regexp
            ));
            // 0 | 1 | 4, left-folded through `|` sends.
            match &send.args[1] {
                Expr::Send(or_send) => {
                    assert_eq!(fx.show(or_send.method), "|");
                    assert!(matches!(
                        or_send.args[0],
                        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(4)
                    ));
                }
                other => panic!("expected option fold, got {:?}", other),
            }
        }
        other => panic!("expected Regexp.new, got {:?}", other),
    }
}

#[test]
fn test_array_splat_concatenates() {
    // [1, *xs, 2]  =>  [1].concat(xs.to_a).concat([2])
    let mut fx = Fixture::new();
    let node = Node::Array {
        loc: fx.loc(0, 11),
        elts: vec![
            int(&fx, "1", 1, 2),
            Node::Splat {
                loc: fx.loc(4, 7),
                var: Box::new(lvar(&mut fx, "xs", 5, 7)),
            },
            int(&fx, "2", 9, 10),
        ],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "concat");
            assert!(matches!(send.args[0], Expr::Array(_)));
        }
        other => panic!("expected concat chain, got {:?}", other),
    }
}

#[test]
fn test_hash_keyword_splat_merges() {
    let mut fx = Fixture::new();
    let key = fx.name("a");
    let node = Node::Hash {
        loc: fx.loc(0, 12),
        pairs: vec![
            Node::Pair {
                loc: fx.loc(1, 5),
                key: Box::new(Node::Symbol {
                    loc: fx.loc(1, 2),
                    val: key,
                }),
                value: Box::new(int(&fx, "1", 4, 5)),
            },
            Node::Kwsplat {
                loc: fx.loc(7, 11),
                expr: Box::new(lvar(&mut fx, "xs", 9, 11)),
            },
        ],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "merge");
            match &send.args[0] {
                Expr::Send(to_h) => assert_eq!(fx.show(to_h.method), "to_h"),
                other => panic!("expected to_h send, got {:?}", other),
            }
        }
        other => panic!("expected merge chain, got {:?}", other),
    }
}

#[test]
fn test_line_literal_uses_line_number() {
    let mut fx = Fixture::new();
    // Offset 10 is on the second line of the fixture source.
    let node = Node::LineLiteral {
        loc: fx.loc(10, 18),
    };
    let expr = unit_single(fx.lower(node));
    assert!(matches!(
        expr,
        Expr::Literal(ref lit) if lit.value == LiteralValue::Int(2)
    ));
}

#[test]
fn test_file_literal_names_current_file() {
    let mut fx = Fixture::new();
    let node = Node::FileLiteral { loc: fx.loc(0, 8) };
    let expr = unit_single(fx.lower(node));
    assert_eq!(expr.as_string_lit(), Some(fx.name("example")));
}

#[test]
fn test_alias_becomes_alias_method_send() {
    let mut fx = Fixture::new();
    let a = fx.name("a");
    let b = fx.name("b");
    let node = Node::Alias {
        loc: fx.loc(0, 11),
        from: Box::new(Node::Symbol {
            loc: fx.loc(6, 8),
            val: a,
        }),
        to: Box::new(Node::Symbol {
            loc: fx.loc(9, 11),
            val: b,
        }),
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "alias_method");
            assert!(send.recv.is_self_ref());
            assert_eq!(send.args.len(), 2);
        }
        other => panic!("expected alias_method send, got {:?}", other),
    }
}

#[test]
fn test_unsupported_nodes_are_replaced() {
    let mut fx = Fixture::new();
    let dollar_tick = fx.name("$`");
    let node = Node::Backref {
        loc: fx.loc(0, 2),
        name: dollar_tick,
    };
    let expr = unit_single(fx.lower(node));
    assert!(expr.is_empty_tree());
    assert!(fx.has_error(ErrorCode::UnsupportedNode));
}

#[test]
fn test_undef_is_reported_but_still_lowered() {
    let mut fx = Fixture::new();
    let m = fx.name("m");
    let node = Node::Undef {
        loc: fx.loc(0, 8),
        exprs: vec![Node::Symbol {
            loc: fx.loc(6, 8),
            val: m,
        }],
    };
    let expr = unit_single(fx.lower(node));
    match expr {
        Expr::Send(send) => {
            assert_eq!(fx.show(send.method), "undef");
            assert!(matches!(
                send.recv.as_ref(),
                Expr::ConstantLit(cnst) if cnst.symbol == CoreSymbol::Kernel
            ));
        }
        other => panic!("expected Kernel.undef, got {:?}", other),
    }
    assert!(fx.has_error(ErrorCode::UndefUsage));
}

#[test]
fn test_rbi_method_bodies_are_rejected() {
    let mut fx = Fixture::with_kind(FileKind::Rbi);
    let work = fx.name("work");
    let body = Node::Send {
        loc: fx.loc(10, 14),
        receiver: None,
        method: work,
        args: Vec::new(),
    };
    let node = simple_def(&mut fx, Some(Box::new(body)), None);
    let _ = fx.lower(node);
    assert!(fx.has_error(ErrorCode::CodeInRbi));
    let diag = fx
        .diagnostics
        .diagnostics()
        .iter()
        .find(|d| d.code == ErrorCode::CodeInRbi)
        .expect("missing diagnostic");
    let autofix = diag.autofix.as_ref().expect("expected a fix-it");
    assert_eq!(autofix.replacement, "");
}

#[test]
fn test_rbi_instance_variable_assignments_are_allowed() {
    let mut fx = Fixture::with_kind(FileKind::Rbi);
    let ivar = fx.name("@state");
    let body = Node::Assign {
        loc: fx.loc(10, 20),
        lhs: Box::new(Node::IVarLhs {
            loc: fx.loc(10, 16),
            name: ivar,
        }),
        rhs: Box::new(int(&fx, "1", 19, 20)),
    };
    let node = simple_def(&mut fx, Some(Box::new(body)), None);
    let _ = fx.lower(node);
    assert!(!fx.has_error(ErrorCode::CodeInRbi));
}

#[test]
fn test_verifier_accepts_every_lowered_tree() {
    let mut fx = Fixture::new();
    let cond = lvar(&mut fx, "flag", 3, 7);
    let m = fx.name("m");
    let body = Node::Send {
        loc: fx.loc(14, 24),
        receiver: None,
        method: m,
        args: vec![Node::Splat {
            loc: fx.loc(16, 19),
            var: Box::new(lvar(&mut fx, "xs", 17, 19)),
        }],
    };
    let node = Node::If {
        loc: fx.loc(0, 28),
        cond: Box::new(cond),
        then_: Some(Box::new(body)),
        else_: None,
    };
    let tast = fx.lower(node);
    let mut ctx = fx.ctx();
    assert!(verifier::verify(&mut ctx, &tast).is_ok());
}

#[test]
fn test_lowering_is_deterministic() {
    fn build(fx: &mut Fixture) -> Node {
        let rhs = Node::And {
            loc: fx.loc(4, 14),
            left: Box::new(lvar(fx, "a", 4, 5)),
            right: Box::new(Node::Send {
                loc: fx.loc(9, 14),
                receiver: Some(Box::new(lvar(fx, "b", 9, 10))),
                method: fx.name("c"),
                args: Vec::new(),
            }),
        };
        Node::Masgn {
            loc: fx.loc(0, 14),
            lhs: Box::new(Node::Mlhs {
                loc: fx.loc(0, 3),
                exprs: vec![lvar_lhs(fx, "x", 0, 1), lvar_lhs(fx, "y", 2, 3)],
            }),
            rhs: Box::new(rhs),
        }
    }

    let mut fx1 = Fixture::new();
    let node1 = build(&mut fx1);
    let tast1 = fx1.lower(node1);

    let mut fx2 = Fixture::new();
    let node2 = build(&mut fx2);
    let tast2 = fx2.lower(node2);

    assert_eq!(tast1, tast2);
}
