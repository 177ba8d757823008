//! Constructors for TAST nodes.
//!
//! A thin combinator layer over the node structs; the desugar engine and
//! the rewrite passes build every node through these so the structural
//! invariants (instruction-sequence collapse, trailing block parameter)
//! hold by construction.

use super::*;
use crate::loc::Loc;
use crate::names::{Knowns, NameRef};

/// The absent expression. Carries a non-existent location derived from
/// `loc`'s file.
pub fn empty(loc: Loc) -> Expr {
    Expr::EmptyTree(EmptyTree {
        loc: Loc::none(loc.file()),
    })
}

pub fn nil(loc: Loc) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::Nil,
    })
}

pub fn true_(loc: Loc) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::True,
    })
}

pub fn false_(loc: Loc) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::False,
    })
}

pub fn int(loc: Loc, val: i64) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::Int(val),
    })
}

pub fn float(loc: Loc, val: f64) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::Float(val),
    })
}

pub fn string(loc: Loc, val: NameRef) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::String(val),
    })
}

pub fn symbol(loc: Loc, val: NameRef) -> Expr {
    Expr::Literal(Literal {
        loc,
        value: LiteralValue::Symbol(val),
    })
}

pub fn local(loc: Loc, name: NameRef) -> Expr {
    Expr::Local(Local { loc, name })
}

pub fn ident(loc: Loc, kind: IdentKind, name: NameRef) -> Expr {
    Expr::UnresolvedIdent(UnresolvedIdent { loc, kind, name })
}

pub fn self_(loc: Loc) -> Expr {
    Expr::SelfRef(SelfRef { loc })
}

pub fn constant(loc: Loc, symbol: CoreSymbol) -> Expr {
    Expr::ConstantLit(ConstantLit { loc, symbol })
}

pub fn unresolved_constant(loc: Loc, scope: Expr, cnst: NameRef) -> Expr {
    Expr::UnresolvedConstantLit(UnresolvedConstantLit {
        loc,
        scope: Box::new(scope),
        cnst,
    })
}

pub fn assign(loc: Loc, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Assign(Assign {
        loc,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

/// Assignment to a local named `name`.
pub fn assign_local(loc: Loc, name: NameRef, rhs: Expr) -> Expr {
    assign(loc, local(loc, name), rhs)
}

/// Duplicate a reference form so it can appear both as lhs and operand.
pub fn cp_ref(expr: &Expr) -> Expr {
    debug_assert!(expr.is_reference(), "cp_ref on a non-reference");
    expr.clone()
}

pub fn send(loc: Loc, recv: Expr, method: NameRef, args: Vec<Expr>, flags: SendFlags) -> Expr {
    Expr::Send(Send {
        loc,
        recv: Box::new(recv),
        method,
        args,
        flags,
        block: None,
    })
}

pub fn send_with_block(
    loc: Loc,
    recv: Expr,
    method: NameRef,
    args: Vec<Expr>,
    flags: SendFlags,
    block: Block,
) -> Expr {
    Expr::Send(Send {
        loc,
        recv: Box::new(recv),
        method,
        args,
        flags,
        block: Some(Box::new(block)),
    })
}

pub fn send0(loc: Loc, recv: Expr, method: NameRef) -> Expr {
    send(loc, recv, method, Vec::new(), SendFlags::empty())
}

pub fn send1(loc: Loc, recv: Expr, method: NameRef, arg: Expr) -> Expr {
    send(loc, recv, method, vec![arg], SendFlags::empty())
}

pub fn send2(loc: Loc, recv: Expr, method: NameRef, arg0: Expr, arg1: Expr) -> Expr {
    send(loc, recv, method, vec![arg0, arg1], SendFlags::empty())
}

pub fn send3(loc: Loc, recv: Expr, method: NameRef, arg0: Expr, arg1: Expr, arg2: Expr) -> Expr {
    send(loc, recv, method, vec![arg0, arg1, arg2], SendFlags::empty())
}

pub fn block(loc: Loc, body: Expr, args: Vec<Expr>) -> Block {
    Block {
        loc,
        args,
        body: Box::new(body),
    }
}

pub fn block1(loc: Loc, body: Expr, arg: Expr) -> Block {
    block(loc, body, vec![arg])
}

pub fn if_(loc: Loc, cond: Expr, thenp: Expr, elsep: Expr) -> Expr {
    Expr::If(If {
        loc,
        cond: Box::new(cond),
        thenp: Box::new(thenp),
        elsep: Box::new(elsep),
    })
}

pub fn while_(loc: Loc, cond: Expr, body: Expr) -> Expr {
    Expr::While(While {
        loc,
        cond: Box::new(cond),
        body: Box::new(body),
    })
}

pub fn return_(loc: Loc, expr: Expr) -> Expr {
    Expr::Return(Return {
        loc,
        expr: Box::new(expr),
    })
}

pub fn break_(loc: Loc, expr: Expr) -> Expr {
    Expr::Break(Break {
        loc,
        expr: Box::new(expr),
    })
}

pub fn next_(loc: Loc, expr: Expr) -> Expr {
    Expr::Next(Next {
        loc,
        expr: Box::new(expr),
    })
}

pub fn array(loc: Loc, elems: Vec<Expr>) -> Expr {
    Expr::Array(ArrayLit { loc, elems })
}

pub fn hash(loc: Loc, keys: Vec<Expr>, values: Vec<Expr>) -> Expr {
    debug_assert_eq!(keys.len(), values.len(), "hash keys/values out of step");
    Expr::Hash(HashLit { loc, keys, values })
}

pub fn hash0(loc: Loc) -> Expr {
    hash(loc, Vec::new(), Vec::new())
}

/// Instruction sequence. With no statements this is just `expr`; the
/// `InsSeq` node is never built empty.
pub fn ins_seq(loc: Loc, stats: Vec<Expr>, expr: Expr) -> Expr {
    if stats.is_empty() {
        return expr;
    }
    Expr::InsSeq(InsSeq {
        loc,
        stats,
        expr: Box::new(expr),
    })
}

pub fn ins_seq1(loc: Loc, stat: Expr, expr: Expr) -> Expr {
    ins_seq(loc, vec![stat], expr)
}

pub fn class_def(
    loc: Loc,
    decl_loc: Loc,
    kind: ClassDefKind,
    name: Expr,
    ancestors: Vec<Expr>,
    body: Vec<Expr>,
) -> Expr {
    Expr::ClassDef(ClassDef {
        loc,
        decl_loc,
        kind,
        name: Box::new(name),
        ancestors,
        body,
    })
}

/// Method definition. The argument list is normalized to end with a block
/// parameter; see [`ensure_block_arg`].
pub fn method(
    loc: Loc,
    decl_loc: Loc,
    name: NameRef,
    mut args: Vec<Expr>,
    body: Expr,
    flags: MethodDefFlags,
    blk_name: NameRef,
) -> Expr {
    ensure_block_arg(&mut args, blk_name, loc);
    Expr::MethodDef(MethodDef {
        loc,
        decl_loc,
        name,
        args,
        body: Box::new(body),
        flags,
    })
}

/// Append a synthesized trailing block parameter named `blk_name` unless the
/// list already ends with one. The parameter carries a non-existent location
/// because there is no source text for it.
pub fn ensure_block_arg(args: &mut Vec<Expr>, blk_name: NameRef, loc: Loc) {
    if matches!(args.last(), Some(Expr::BlockArg(_))) {
        return;
    }
    let blk_loc = Loc::none(loc.file());
    args.push(block_arg(blk_loc, local(blk_loc, blk_name)));
}

pub fn rest_arg(loc: Loc, expr: Expr) -> Expr {
    Expr::RestArg(RestArg {
        loc,
        expr: Box::new(expr),
    })
}

pub fn keyword_arg(loc: Loc, expr: Expr) -> Expr {
    Expr::KeywordArg(KeywordArg {
        loc,
        expr: Box::new(expr),
    })
}

pub fn optional_arg(loc: Loc, expr: Expr, default: Expr) -> Expr {
    Expr::OptionalArg(OptionalArg {
        loc,
        expr: Box::new(expr),
        default: Box::new(default),
    })
}

pub fn block_arg(loc: Loc, expr: Expr) -> Expr {
    Expr::BlockArg(BlockArg {
        loc,
        expr: Box::new(expr),
    })
}

pub fn shadow_arg(loc: Loc, expr: Expr) -> Expr {
    Expr::ShadowArg(ShadowArg {
        loc,
        expr: Box::new(expr),
    })
}

pub fn zsuper_args(loc: Loc) -> Expr {
    Expr::ZSuperArgs(ZSuperArgs { loc })
}

pub fn retry(loc: Loc) -> Expr {
    Expr::Retry(Retry { loc })
}

/// `T.unsafe(expr)` — downstream phases treat the result as untyped.
pub fn unsafe_(loc: Loc, expr: Expr, known: &Knowns) -> Expr {
    send1(loc, constant(loc, CoreSymbol::T), known.unsafe_, expr)
}

/// `T.let(value, type)`.
pub fn let_(loc: Loc, value: Expr, type_: Expr, known: &Knowns) -> Expr {
    send2(loc, constant(loc, CoreSymbol::T), known.let_, value, type_)
}

/// The `sig(:void)` marker prepended to rewriter-synthesized methods.
pub fn sig_void(loc: Loc, known: &Knowns) -> Expr {
    send(
        loc,
        self_(loc.with_zero_length()),
        known.sig,
        vec![symbol(loc, known.void)],
        SendFlags::PRIVATE_OK,
    )
}
