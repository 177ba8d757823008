//! Parse tree to TAST lowering.
//!
//! One recursive translation, one arm per parse-node variant. Surface
//! conveniences (compound assignment, safe navigation, interpolation,
//! splats, loops, `case`, exception handling, `super`, `defined?`, …) are
//! all encoded in terms of the canonical TAST forms; intrinsic operations
//! that later phases give special semantics are routed through the `Magic`
//! pseudo-module.
//!
//! Parse nodes are consumed by move and never retained. Side effects are
//! limited to minting fresh names and emitting diagnostics.

use crate::ast::builder;
use crate::ast::{
    self, ClassDefKind, CoreSymbol, Expr, IdentKind, MethodDefFlags, SendFlags,
};
use crate::context::Context;
use crate::diagnostics::ErrorCode;
use crate::loc::Loc;
use crate::names::{Knowns, NameRef, UniqueKind};
use crate::parse::Node;
use crate::verifier;
use smallvec::SmallVec;
use std::fmt;

/// An internal invariant violation while lowering. There is no partial
/// result: the compilation unit fails as a whole.
#[derive(Debug, Clone)]
pub struct LowerError {
    pub loc: Loc,
    pub message: String,
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to lower tree: {}", self.message)
    }
}

impl std::error::Error for LowerError {}

type Result<T> = std::result::Result<T, LowerError>;

fn err<T>(loc: Loc, message: impl Into<String>) -> Result<T> {
    Err(LowerError {
        loc,
        message: message.into(),
    })
}

/// Lower a whole compilation unit: desugar, wrap in the synthetic root
/// class body, and verify the structural invariants of the result.
///
/// On an internal failure an `InternalError` diagnostic is attached at the
/// offending location (once per unit) and the error is returned.
pub fn lower(ctx: &mut Context<'_>, node: Node) -> Result<Expr> {
    let loc = node.loc();
    let mut lowerer = Lowerer::new(ctx);
    let tree = match lowerer.lower_node(node) {
        Ok(tree) => tree,
        Err(e) => {
            lowerer.report_internal(&e);
            return Err(e);
        }
    };
    let tree = lift_top_level(loc, tree);
    if let Err(v) = verifier::verify(lowerer.ctx, &tree) {
        return err(v.loc, v.message);
    }
    Ok(tree)
}

/// Wrap the desugared unit in the synthetic root `ClassDef`. An `InsSeq`
/// unit is flattened so each statement becomes a class-body entry.
fn lift_top_level(loc: Loc, expr: Expr) -> Expr {
    let mut body = Vec::new();
    match expr {
        Expr::InsSeq(seq) => {
            body.reserve(seq.stats.len() + 1);
            body.extend(seq.stats);
            body.push(*seq.expr);
        }
        other => body.push(other),
    }
    builder::class_def(
        loc,
        loc,
        ClassDefKind::Class,
        builder::constant(loc, CoreSymbol::Root),
        Vec::new(),
        body,
    )
}

#[derive(Debug, Clone, Copy)]
struct EnclosingMethod {
    name: NameRef,
    decl_loc: Loc,
}

/// Scaffolding shared by the op-assignment lowerings. For a send lhs like
/// `x.y[z] op= rhs` we capture the receiver and each argument in a
/// temporary so every operand is evaluated exactly once, and prepare the
/// argument lists for the read (`y`) and the write (`y=`) sends.
struct OpAsgnScaffolding {
    loc: Loc,
    method: NameRef,
    flags: SendFlags,
    temp_recv: NameRef,
    stats: Vec<Expr>,
    read_args: Vec<Expr>,
    assign_args: Vec<Expr>,
}

enum DStringAcc {
    Strings(SmallVec<[Expr; 4]>),
    Concat(Expr),
}

struct Lowerer<'a, 'c> {
    ctx: &'a mut Context<'c>,
    unique_counter: u32,
    enclosing_block_arg: Option<NameRef>,
    enclosing_method: Option<EnclosingMethod>,
    loc_reported: bool,
}

impl<'a, 'c> Lowerer<'a, 'c> {
    fn new(ctx: &'a mut Context<'c>) -> Self {
        Lowerer {
            ctx,
            unique_counter: 1,
            enclosing_block_arg: None,
            enclosing_method: None,
            loc_reported: false,
        }
    }

    fn known(&self) -> Knowns {
        self.ctx.names.known()
    }

    /// Pre-increment the scope counter and mint a fresh desugar name.
    fn next_unique(&mut self, base: NameRef) -> NameRef {
        self.unique_counter += 1;
        self.ctx
            .names
            .fresh_unique(UniqueKind::Desugar, base, self.unique_counter)
    }

    fn report_internal(&mut self, e: &LowerError) {
        if self.loc_reported {
            return;
        }
        self.loc_reported = true;
        if let Some(mut b) = self.ctx.begin_error(e.loc, ErrorCode::InternalError) {
            b.set_header(format!("Failed to process tree: {}", e.message));
        }
    }

    fn lower_opt(&mut self, node: Option<Box<Node>>, loc: Loc) -> Result<Expr> {
        match node {
            Some(n) => self.lower_node(*n),
            None => Ok(builder::empty(loc)),
        }
    }

    fn unsupported_node(&mut self, node: &Node) -> Expr {
        if let Some(mut e) = self
            .ctx
            .begin_error(node.loc(), ErrorCode::UnsupportedNode)
        {
            e.set_header(format!("Unsupported node type `{}`", node.node_name()));
        }
        builder::empty(node.loc())
    }

    fn lower_node(&mut self, node: Node) -> Result<Expr> {
        let loc = node.loc();
        if !loc.exists() {
            return err(loc, format!("parse node `{}` has no location", node.node_name()));
        }
        match node {
            Node::Send {
                loc,
                receiver,
                method,
                args,
            } => self.lower_send(loc, receiver, method, args),
            Node::Const { loc, scope, name } | Node::ConstLhs { loc, scope, name } => {
                let scope = self.lower_opt(scope, loc)?;
                Ok(builder::unresolved_constant(loc, scope, name))
            }
            Node::String { loc, val } => Ok(builder::string(loc, val)),
            Node::Symbol { loc, val } => Ok(builder::symbol(loc, val)),
            Node::LVar { loc, name } | Node::LVarLhs { loc, name } => {
                Ok(builder::local(loc, name))
            }
            Node::DString { loc, nodes } => self.lower_dstring(loc, nodes),
            Node::Begin { loc, stmts } => {
                if stmts.is_empty() {
                    Ok(builder::nil(loc))
                } else {
                    self.lower_sequence(loc, stmts)
                }
            }
            Node::Kwbegin { loc, stmts } => {
                if stmts.is_empty() {
                    Ok(builder::empty(loc))
                } else {
                    self.lower_sequence(loc, stmts)
                }
            }
            Node::And { loc, left, right } => {
                let lhs = self.lower_node(*left)?;
                let rhs = self.lower_node(*right)?;
                if lhs.is_reference() {
                    let cond = builder::cp_ref(&lhs);
                    Ok(builder::if_(loc, cond, rhs, lhs))
                } else {
                    let k = self.known();
                    let temp = self.next_unique(k.and_and);
                    let assign = builder::assign_local(loc, temp, lhs);
                    let iff = builder::if_(
                        loc,
                        builder::local(loc, temp),
                        rhs,
                        builder::local(loc, temp),
                    );
                    Ok(builder::ins_seq1(loc, assign, iff))
                }
            }
            Node::Or { loc, left, right } => {
                let lhs = self.lower_node(*left)?;
                let rhs = self.lower_node(*right)?;
                if lhs.is_reference() {
                    let cond = builder::cp_ref(&lhs);
                    Ok(builder::if_(loc, cond, lhs, rhs))
                } else {
                    let k = self.known();
                    let temp = self.next_unique(k.or_or);
                    let assign = builder::assign_local(loc, temp, lhs);
                    let iff = builder::if_(
                        loc,
                        builder::local(loc, temp),
                        builder::local(loc, temp),
                        rhs,
                    );
                    Ok(builder::ins_seq1(loc, assign, iff))
                }
            }
            Node::AndAsgn { loc, lhs, rhs } => {
                let recv = self.lower_node(*lhs)?;
                let arg = self.lower_node(*rhs)?;
                match recv {
                    Expr::Send(s) => {
                        let sc = self.op_asgn_scaffolding(s);
                        Ok(self.and_asgn_from_scaffolding(loc, sc, arg))
                    }
                    recv @ (Expr::Local(_) | Expr::UnresolvedIdent(_)) => {
                        let cond = builder::cp_ref(&recv);
                        let elsep = builder::cp_ref(&recv);
                        let body = builder::assign(loc, recv, arg);
                        Ok(builder::if_(loc, cond, body, elsep))
                    }
                    Expr::UnresolvedConstantLit(_) => {
                        self.constant_reassignment(loc);
                        Ok(builder::empty(loc))
                    }
                    Expr::InsSeq(seq) => self.op_asgn_safe_nav(seq, loc, arg, |this, l, sc, a| {
                        this.and_asgn_from_scaffolding(l, sc, a)
                    }),
                    other => err(other.loc(), "unexpected left-hand side of &&="),
                }
            }
            Node::OrAsgn { loc, lhs, rhs } => {
                let recv = self.lower_node(*lhs)?;
                let arg = self.lower_node(*rhs)?;
                match recv {
                    Expr::Send(s) => {
                        let sc = self.op_asgn_scaffolding(s);
                        Ok(self.or_asgn_from_scaffolding(loc, sc, arg))
                    }
                    recv @ (Expr::Local(_) | Expr::UnresolvedIdent(_)) => {
                        let cond = builder::cp_ref(&recv);
                        let thenp = builder::cp_ref(&recv);
                        let body = builder::assign(loc, recv, arg);
                        Ok(builder::if_(loc, cond, thenp, body))
                    }
                    Expr::UnresolvedConstantLit(_) => {
                        self.constant_reassignment(loc);
                        Ok(builder::empty(loc))
                    }
                    Expr::InsSeq(seq) => self.op_asgn_safe_nav(seq, loc, arg, |this, l, sc, a| {
                        this.or_asgn_from_scaffolding(l, sc, a)
                    }),
                    other => err(other.loc(), "unexpected left-hand side of ||="),
                }
            }
            Node::OpAsgn { loc, lhs, op, rhs } => {
                let recv = self.lower_node(*lhs)?;
                let arg = self.lower_node(*rhs)?;
                match recv {
                    Expr::Send(s) => {
                        let sc = self.op_asgn_scaffolding(s);
                        Ok(self.op_asgn_from_scaffolding(loc, sc, op, arg))
                    }
                    recv @ (Expr::Local(_) | Expr::UnresolvedIdent(_)) => {
                        let lhs_copy = builder::cp_ref(&recv);
                        let send = builder::send1(loc, recv, op, arg);
                        Ok(builder::assign(loc, lhs_copy, send))
                    }
                    Expr::UnresolvedConstantLit(_) => {
                        self.constant_reassignment(loc);
                        Ok(builder::empty(loc))
                    }
                    Expr::InsSeq(seq) => self.op_asgn_safe_nav(seq, loc, arg, |this, l, sc, a| {
                        this.op_asgn_from_scaffolding(l, sc, op, a)
                    }),
                    other => err(other.loc(), "unexpected left-hand side of op-assign"),
                }
            }
            Node::CSend {
                loc,
                receiver,
                method,
                args,
            } => {
                let k = self.known();
                let temp_recv = self.next_unique(k.assign_temp);
                let recv_loc = receiver.loc();
                // Synthetic guard nodes get zero-length locs so IDE position
                // lookups never land on them.
                let zero_loc = loc.with_zero_length();
                let zero_recv_loc = recv_loc.with_zero_length();

                // The guard is a value-level `== nil`; an overridden `==`
                // changes its meaning. Deviation from strict semantics,
                // preserved deliberately.
                let lowered_recv = self.lower_node(*receiver)?;
                let assgn = builder::assign_local(zero_recv_loc, temp_recv, lowered_recv);
                let cond = builder::send1(
                    zero_loc,
                    builder::local(zero_recv_loc, temp_recv),
                    k.eq_eq,
                    builder::nil(zero_loc),
                );
                let send_node = Node::Send {
                    loc,
                    receiver: Some(Box::new(Node::LVar {
                        loc: recv_loc,
                        name: temp_recv,
                    })),
                    method,
                    args,
                };
                let send = self.lower_node(send_node)?;
                let iff = builder::if_(zero_loc, cond, builder::nil(zero_loc), send);
                Ok(builder::ins_seq1(zero_loc, assgn, iff))
            }
            Node::Self_ { loc } => Ok(builder::self_(loc)),
            Node::DSymbol { loc, nodes } => self.lower_dsymbol(loc, nodes),
            Node::FileLiteral { loc } => {
                let path = self.ctx.files.get(loc.file()).path().to_string();
                let name = self.ctx.names.intern(&path);
                Ok(builder::string(loc, name))
            }
            Node::LineLiteral { loc } => {
                let line = self.ctx.files.line(loc);
                Ok(builder::int(loc, line as i64))
            }
            Node::Cbase { loc } => Ok(builder::constant(loc, CoreSymbol::Root)),
            Node::Module {
                loc,
                decl_loc,
                name,
                body,
            } => {
                let body = self.scope_node_to_body(loc, body)?;
                let name = self.lower_node(*name)?;
                Ok(builder::class_def(
                    loc,
                    decl_loc,
                    ClassDefKind::Module,
                    name,
                    Vec::new(),
                    body,
                ))
            }
            Node::Class {
                loc,
                decl_loc,
                name,
                superclass,
                body,
            } => {
                let body = self.scope_node_to_body(loc, body)?;
                let ancestor = match superclass {
                    // No written superclass: the resolver picks the default.
                    None => builder::constant(loc, CoreSymbol::Todo),
                    Some(sup) => self.lower_node(*sup)?,
                };
                let name = self.lower_node(*name)?;
                Ok(builder::class_def(
                    loc,
                    decl_loc,
                    ClassDefKind::Class,
                    name,
                    vec![ancestor],
                    body,
                ))
            }
            Node::SClass {
                loc,
                decl_loc,
                expr,
                body,
            } => {
                let expr_loc = expr.loc();
                if !matches!(*expr, Node::Self_ { .. }) {
                    if let Some(mut e) =
                        self.ctx.begin_error(expr_loc, ErrorCode::InvalidSingletonDef)
                    {
                        e.set_header(
                            "`class << EXPRESSION` is only supported for `class << self`",
                        );
                    }
                    return Ok(builder::empty(loc));
                }
                let body = self.scope_node_to_body(loc, body)?;
                let k = self.known();
                let name = builder::ident(expr_loc, IdentKind::Class, k.singleton_class);
                Ok(builder::class_def(
                    loc,
                    decl_loc,
                    ClassDefKind::Class,
                    name,
                    Vec::new(),
                    body,
                ))
            }
            Node::Arg { loc, name } => Ok(builder::local(loc, name)),
            Node::Restarg { loc, name, name_loc } => {
                Ok(builder::rest_arg(loc, builder::local(name_loc, name)))
            }
            Node::Kwrestarg { loc, name } => Ok(builder::rest_arg(
                loc,
                builder::keyword_arg(loc, builder::local(loc, name)),
            )),
            Node::Kwarg { loc, name } => {
                Ok(builder::keyword_arg(loc, builder::local(loc, name)))
            }
            Node::Blockarg { loc, name } => {
                Ok(builder::block_arg(loc, builder::local(loc, name)))
            }
            Node::Kwoptarg {
                loc,
                name,
                name_loc,
                default,
            } => {
                let default = self.lower_node(*default)?;
                Ok(builder::optional_arg(
                    loc,
                    builder::keyword_arg(loc, builder::local(name_loc, name)),
                    default,
                ))
            }
            Node::Optarg {
                loc,
                name,
                name_loc,
                default,
            } => {
                let default = self.lower_node(*default)?;
                Ok(builder::optional_arg(
                    loc,
                    builder::local(name_loc, name),
                    default,
                ))
            }
            Node::Shadowarg { loc, name } => {
                Ok(builder::shadow_arg(loc, builder::local(loc, name)))
            }
            Node::DefMethod {
                loc,
                decl_loc,
                name,
                args,
                body,
            } => self.build_method(loc, decl_loc, name, args, body, false),
            Node::DefS {
                loc,
                decl_loc,
                singleton,
                name,
                args,
                body,
            } => {
                if !matches!(*singleton, Node::Self_ { .. }) {
                    if let Some(mut e) = self
                        .ctx
                        .begin_error(singleton.loc(), ErrorCode::InvalidSingletonDef)
                    {
                        e.set_header(
                            "`def EXPRESSION.method` is only supported for `def self.method`",
                        );
                    }
                    return Ok(builder::empty(loc));
                }
                self.build_method(loc, decl_loc, name, args, body, true)
            }
            Node::Block {
                loc,
                send,
                args,
                body,
            } => self.lower_block(loc, send, args, body),
            Node::While { loc, cond, body } => {
                let cond = self.lower_node(*cond)?;
                let body = self.lower_opt(body, loc)?;
                Ok(builder::while_(loc, cond, body))
            }
            Node::WhilePost { loc, cond, body } => {
                let is_kwbegin = matches!(*body, Node::Kwbegin { .. });
                let k = self.known();
                let cond = self.lower_node(*cond)?;
                let body = self.lower_node(*body)?;
                if is_kwbegin {
                    Ok(self.do_until(loc, builder::send0(loc, cond, k.bang), body))
                } else {
                    Ok(builder::while_(loc, cond, body))
                }
            }
            Node::Until { loc, cond, body } => {
                let k = self.known();
                let cond = self.lower_node(*cond)?;
                let body = self.lower_opt(body, loc)?;
                Ok(builder::while_(loc, builder::send0(loc, cond, k.bang), body))
            }
            Node::UntilPost { loc, cond, body } => {
                let is_kwbegin = matches!(*body, Node::Kwbegin { .. });
                let cond = self.lower_node(*cond)?;
                let body = self.lower_node(*body)?;
                if is_kwbegin {
                    Ok(self.do_until(loc, cond, body))
                } else {
                    let k = self.known();
                    Ok(builder::while_(loc, builder::send0(loc, cond, k.bang), body))
                }
            }
            Node::Nil { loc } => Ok(builder::nil(loc)),
            Node::True { loc } => Ok(builder::true_(loc)),
            Node::False { loc } => Ok(builder::false_(loc)),
            Node::IVar { loc, name } | Node::IVarLhs { loc, name } => {
                Ok(builder::ident(loc, IdentKind::Instance, name))
            }
            Node::GVar { loc, name } | Node::GVarLhs { loc, name } => {
                Ok(builder::ident(loc, IdentKind::Global, name))
            }
            Node::CVar { loc, name } | Node::CVarLhs { loc, name } => {
                Ok(builder::ident(loc, IdentKind::Class, name))
            }
            Node::NthRef { loc, nth } => {
                let name = self.ctx.names.intern(&nth.to_string());
                Ok(builder::ident(loc, IdentKind::Global, name))
            }
            Node::Assign { loc, lhs, rhs } => {
                let lhs = self.lower_node(*lhs)?;
                let rhs = self.lower_node(*rhs)?;
                Ok(builder::assign(loc, lhs, rhs))
            }
            Node::Super { loc, args } => {
                // A call to a regular method named `super`; the Send arm
                // supplies the implicit self receiver and splat handling.
                let k = self.known();
                let send = Node::Send {
                    loc,
                    receiver: None,
                    method: k.super_,
                    args,
                };
                self.lower_node(send)
            }
            Node::ZSuper { loc } => {
                let k = self.known();
                Ok(builder::send1(
                    loc,
                    builder::self_(loc),
                    k.super_,
                    builder::zsuper_args(loc),
                ))
            }
            Node::For {
                loc,
                vars,
                expr,
                body,
            } => self.lower_for(loc, vars, expr, body),
            Node::Integer { loc, val } => {
                let has_tilde = val.contains('~');
                let cleaned: String = val.chars().filter(|&c| c != '_' && c != '~').collect();
                let parsed = match cleaned.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => {
                        if let Some(mut e) =
                            self.ctx.begin_error(loc, ErrorCode::IntegerOutOfRange)
                        {
                            e.set_header(format!("Unsupported integer literal: `{}`", val));
                        }
                        0
                    }
                };
                Ok(builder::int(loc, if has_tilde { !parsed } else { parsed }))
            }
            Node::Float { loc, val } => {
                let cleaned: String = val.chars().filter(|&c| c != '_').collect();
                let parsed = match cleaned.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => {
                        if let Some(mut e) = self.ctx.begin_error(loc, ErrorCode::FloatOutOfRange)
                        {
                            e.set_header(format!("Unsupported float literal: `{}`", val));
                        }
                        f64::NAN
                    }
                };
                Ok(builder::float(loc, parsed))
            }
            Node::Complex { loc, val } => {
                let k = self.known();
                let value = self.ctx.names.intern(&val);
                Ok(builder::send2(
                    loc,
                    builder::constant(loc, CoreSymbol::Kernel),
                    k.complex,
                    builder::int(loc, 0),
                    builder::string(loc, value),
                ))
            }
            Node::Rational { loc, val } => {
                let k = self.known();
                let value = self.ctx.names.intern(&val);
                Ok(builder::send1(
                    loc,
                    builder::constant(loc, CoreSymbol::Kernel),
                    k.rational,
                    builder::string(loc, value),
                ))
            }
            Node::Array { loc, elts } => self.lower_array(loc, elts),
            Node::Hash { loc, pairs } => self.lower_hash(loc, pairs),
            Node::IRange { loc, from, to } => {
                let k = self.known();
                let from = self.lower_opt(from, loc)?;
                let to = self.lower_opt(to, loc)?;
                Ok(builder::send2(
                    loc,
                    builder::constant(loc, CoreSymbol::Range),
                    k.new_,
                    from,
                    to,
                ))
            }
            Node::ERange { loc, from, to } => {
                let k = self.known();
                let from = self.lower_opt(from, loc)?;
                let to = self.lower_opt(to, loc)?;
                Ok(builder::send3(
                    loc,
                    builder::constant(loc, CoreSymbol::Range),
                    k.new_,
                    from,
                    to,
                    builder::true_(loc),
                ))
            }
            Node::Regexp { loc, regex, opts } => {
                let k = self.known();
                let pattern = self.lower_dstring(loc, regex)?;
                let opts = self.lower_opt(opts, loc)?;
                let opts = if opts.is_empty_tree() {
                    builder::int(loc, 0)
                } else {
                    opts
                };
                Ok(builder::send2(
                    loc,
                    builder::constant(loc, CoreSymbol::Regexp),
                    k.new_,
                    pattern,
                    opts,
                ))
            }
            Node::Regopt { loc, opts } => {
                let k = self.known();
                let mut acc = builder::int(loc, 0);
                for chr in opts.chars() {
                    let flag = match chr {
                        'i' => 1, // IGNORECASE
                        'x' => 2, // EXTENDED
                        'm' => 4, // MULTILINE
                        // Encoding options are handled (and reported) by
                        // the parser.
                        _ => 0,
                    };
                    if flag != 0 {
                        acc = builder::send1(loc, acc, k.or_op, builder::int(loc, flag));
                    }
                }
                Ok(acc)
            }
            Node::Return { loc, exprs } => self.lower_exit(loc, exprs, builder::return_),
            Node::Break { loc, exprs } => self.lower_exit(loc, exprs, builder::break_),
            Node::Next { loc, exprs } => self.lower_exit(loc, exprs, builder::next_),
            Node::Retry { loc } => Ok(builder::retry(loc)),
            Node::Yield { loc, exprs } => self.lower_yield(loc, exprs),
            Node::Rescue {
                loc,
                body,
                rescue,
                else_,
            } => {
                let body = self.lower_opt(body, loc)?;
                let mut cases = Vec::with_capacity(rescue.len());
                for node in rescue {
                    match self.lower_node(node)? {
                        Expr::RescueCase(rc) => cases.push(rc),
                        other => return err(other.loc(), "malformed rescue clause"),
                    }
                }
                let else_ = self.lower_opt(else_, loc)?;
                Ok(Expr::Rescue(ast::Rescue {
                    loc,
                    body: Box::new(body),
                    rescue_cases: cases,
                    else_: Box::new(else_),
                    ensure: Box::new(builder::empty(loc)),
                }))
            }
            Node::Resbody {
                loc,
                exception,
                var,
                body,
            } => self.lower_resbody(loc, exception, var, body),
            Node::Ensure { loc, body, ensure } => {
                let body_expr = self.lower_opt(body, loc)?;
                let ensure_expr = self.lower_opt(ensure, loc)?;
                match body_expr {
                    // A bare `ensure` on an already-rescued body folds into
                    // its ensure slot.
                    Expr::Rescue(mut rescue) => {
                        rescue.ensure = Box::new(ensure_expr);
                        Ok(Expr::Rescue(rescue))
                    }
                    other => Ok(Expr::Rescue(ast::Rescue {
                        loc,
                        body: Box::new(other),
                        rescue_cases: Vec::new(),
                        else_: Box::new(builder::empty(loc)),
                        ensure: Box::new(ensure_expr),
                    })),
                }
            }
            Node::If {
                loc,
                cond,
                then_,
                else_,
            } => {
                let cond = self.lower_node(*cond)?;
                let thenp = self.lower_opt(then_, loc)?;
                let elsep = self.lower_opt(else_, loc)?;
                Ok(builder::if_(loc, cond, thenp, elsep))
            }
            Node::Masgn { loc, lhs, rhs } => {
                let rhs = self.lower_node(*rhs)?;
                match *lhs {
                    Node::Mlhs { exprs, .. } => self.lower_mlhs(loc, exprs, rhs),
                    other => err(other.loc(), "multiple assignment without a compound target"),
                }
            }
            Node::Case {
                loc,
                condition,
                whens,
                else_,
            } => self.lower_case(loc, condition, whens, else_),
            Node::Splat { loc, var } => {
                let k = self.known();
                let var = self.lower_node(*var)?;
                Ok(builder::send1(
                    loc,
                    builder::constant(loc, CoreSymbol::Magic),
                    k.splat,
                    var,
                ))
            }
            Node::Alias { loc, from, to } => {
                let k = self.known();
                let from = self.lower_node(*from)?;
                let to = self.lower_node(*to)?;
                Ok(builder::send2(
                    loc,
                    builder::self_(loc),
                    k.alias_method,
                    from,
                    to,
                ))
            }
            Node::Defined { loc, value } => {
                let k = self.known();
                let value = self.lower_node(*value)?;
                let value_loc = if value.loc().exists() { value.loc() } else { loc };
                let mut args: Vec<Expr> = Vec::new();
                let mut cur = value;
                while !cur.is_empty_tree() {
                    match cur {
                        Expr::UnresolvedConstantLit(lit) => {
                            args.push(builder::string(lit.loc, lit.cnst));
                            cur = *lit.scope;
                        }
                        // Any non-constant component degrades to the
                        // generic zero-argument form.
                        _ => {
                            args.clear();
                            break;
                        }
                    }
                }
                args.reverse();
                Ok(builder::send(
                    value_loc,
                    builder::constant(value_loc, CoreSymbol::Magic),
                    k.defined,
                    args,
                    SendFlags::empty(),
                ))
            }
            Node::XString { loc, nodes } => {
                let k = self.known();
                let interpolated = self.lower_dstring(loc, nodes)?;
                Ok(builder::send1(
                    loc,
                    builder::self_(loc),
                    k.backtick,
                    interpolated,
                ))
            }
            Node::Undef { loc, exprs } => {
                if let Some(mut e) = self.ctx.begin_error(loc, ErrorCode::UndefUsage) {
                    e.set_header("Unsupported method: undef");
                }
                let k = self.known();
                let mut args = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    args.push(self.lower_node(expr)?);
                }
                Ok(builder::send(
                    loc,
                    builder::constant(loc, CoreSymbol::Kernel),
                    k.undef,
                    args,
                    SendFlags::empty(),
                ))
            }
            n @ (Node::Backref { .. }
            | Node::Preexe { .. }
            | Node::Postexe { .. }
            | Node::IFlipflop { .. }
            | Node::EFlipflop { .. }
            | Node::MatchCurLine { .. }
            | Node::Redo { .. }
            | Node::EncodingLiteral { .. }) => Ok(self.unsupported_node(&n)),
            Node::BlockPass { loc, .. } => err(loc, "block pass outside of a send"),
            Node::Mlhs { loc, .. } => err(loc, "compound target outside of an assignment"),
            Node::SplatLhs { loc, .. } => err(loc, "splat target outside of a destructure"),
            Node::Args { loc, .. } => err(loc, "parameter list outside of a definition"),
            Node::Pair { loc, .. } => err(loc, "pair outside of a hash literal"),
            Node::Kwsplat { loc, .. } => err(loc, "keyword splat outside of a hash literal"),
            Node::When { loc, .. } => err(loc, "when clause outside of a case"),
        }
    }

    // ===== Sends and blocks =====

    fn lower_send(
        &mut self,
        loc: Loc,
        receiver: Option<Box<Node>>,
        method: NameRef,
        args: Vec<Node>,
    ) -> Result<Expr> {
        let k = self.known();
        let mut flags = SendFlags::empty();
        let mut rec = self.lower_opt(receiver, loc)?;
        if rec.is_empty_tree() {
            // Implicit receiver: `self.` never appeared in the file, so the
            // synthesized receiver gets a zero-length loc.
            rec = builder::self_(loc.with_zero_length());
            flags = flags | SendFlags::PRIVATE_OK;
        }

        if args.iter().any(|a| matches!(a, Node::Splat { .. })) {
            // A splat anywhere turns the whole argument list into one Array
            // node and routes the call through the Magic intrinsics, which
            // unpack the tuple and re-enter normal dispatch.
            let mut argnodes = args;
            let mut block: Option<Box<Node>> = None;
            if let Some(idx) = argnodes
                .iter()
                .position(|a| matches!(a, Node::BlockPass { .. }))
            {
                if let Node::BlockPass { block: b, .. } = argnodes.remove(idx) {
                    block = Some(b);
                }
            }
            let arg_array = self.lower_node(Node::Array { loc, elts: argnodes })?;
            let method_lit = builder::symbol(loc, method);
            let mut sendargs = vec![rec, method_lit, arg_array];
            match block {
                None => Ok(builder::send(
                    loc,
                    builder::constant(loc, CoreSymbol::Magic),
                    k.call_with_splat,
                    sendargs,
                    SendFlags::empty(),
                )),
                Some(b) => {
                    let converted = self.lower_node(*b)?;
                    if converted.as_symbol_lit().is_some() {
                        let blk = self.symbol_to_proc(converted)?;
                        Ok(builder::send_with_block(
                            loc,
                            builder::constant(loc, CoreSymbol::Magic),
                            k.call_with_splat,
                            sendargs,
                            SendFlags::empty(),
                            blk,
                        ))
                    } else {
                        sendargs.push(converted);
                        Ok(builder::send(
                            loc,
                            builder::constant(loc, CoreSymbol::Magic),
                            k.call_with_splat_and_block,
                            sendargs,
                            SendFlags::empty(),
                        ))
                    }
                }
            }
        } else {
            let mut lowered_args = Vec::with_capacity(args.len());
            let mut block: Option<Box<Node>> = None;
            for arg in args {
                match arg {
                    Node::BlockPass { loc: bp_loc, block: b } => {
                        if block.is_some() {
                            return err(bp_loc, "multiple block arguments in one send");
                        }
                        block = Some(b);
                    }
                    other => lowered_args.push(self.lower_node(other)?),
                }
            }

            let res = match block {
                None => builder::send(loc, rec, method, lowered_args, flags),
                Some(b) => {
                    let converted = self.lower_node(*b)?;
                    if converted.as_symbol_lit().is_some() {
                        let blk = self.symbol_to_proc(converted)?;
                        builder::send_with_block(loc, rec, method, lowered_args, flags, blk)
                    } else {
                        let method_lit = builder::symbol(loc, method);
                        let mut sendargs = vec![rec, method_lit, converted];
                        sendargs.extend(lowered_args);
                        builder::send(
                            loc,
                            builder::constant(loc, CoreSymbol::Magic),
                            k.call_with_block,
                            sendargs,
                            SendFlags::empty(),
                        )
                    }
                }
            };

            if method == k.block_given {
                if let Some(block_arg) = self.enclosing_block_arg {
                    return Ok(builder::if_(
                        loc,
                        builder::local(loc, block_arg),
                        res,
                        builder::false_(loc),
                    ));
                }
            }
            Ok(res)
        }
    }

    /// `&:sym` expands to `{ |t| t.sym() }`. The synthesized parameter has
    /// a zero-length loc.
    fn symbol_to_proc(&mut self, expr: Expr) -> Result<ast::Block> {
        let loc = expr.loc();
        let k = self.known();
        let temp = self.next_unique(k.block_pass_temp);
        let name = match expr.as_symbol_lit() {
            Some(name) => name,
            None => return err(loc, "symbol-to-proc on a non-symbol literal"),
        };
        let zero_loc = loc.with_zero_length();
        let recv = builder::local(zero_loc, temp);
        let body = builder::send0(loc, recv, name);
        Ok(builder::block1(loc, body, builder::local(zero_loc, temp)))
    }

    fn lower_block(
        &mut self,
        loc: Loc,
        send: Box<Node>,
        args: Option<Box<Node>>,
        body: Option<Box<Node>>,
    ) -> Result<Expr> {
        let mut recv = self.lower_node(*send)?;
        let (block_args, destructures) = self.lower_params(args)?;
        let lowered_body = self.lower_body(loc, body, destructures)?;
        let block = builder::block(loc, lowered_body, block_args);

        match &mut recv {
            Expr::Send(s) => {
                s.loc = loc;
                s.block = Some(Box::new(block));
                Ok(recv)
            }
            // A safe-navigation receiver lowered to an InsSeq whose final
            // If carries the real send in its else branch.
            Expr::InsSeq(seq) => {
                let iff = match seq.expr.as_mut() {
                    Expr::If(iff) => iff,
                    _ => {
                        if let Some(mut e) =
                            self.ctx.begin_error(loc, ErrorCode::UnsupportedNode)
                        {
                            e.set_header("No body in block");
                        }
                        return Ok(builder::empty(loc));
                    }
                };
                match iff.elsep.as_mut() {
                    Expr::Send(s) => {
                        s.block = Some(Box::new(block));
                        Ok(recv)
                    }
                    other => err(other.loc(), "block on a non-send expression"),
                }
            }
            other => err(other.loc(), "block on a non-send expression"),
        }
    }

    // ===== Parameters, methods, scopes =====

    /// Lower a parameter list. Compound (destructuring) parameters are
    /// replaced by a fresh local plus a destructuring assignment that the
    /// caller prepends to the body.
    fn lower_params(&mut self, argnode: Option<Box<Node>>) -> Result<(Vec<Expr>, Vec<Expr>)> {
        let mut args = Vec::new();
        let mut destructures = Vec::new();
        let node = match argnode {
            Some(node) => node,
            None => return Ok((args, destructures)),
        };
        match *node {
            Node::Args { args: params, .. } => {
                args.reserve(params.len());
                for param in params {
                    if matches!(param, Node::Mlhs { .. }) {
                        let param_loc = param.loc();
                        let k = self.known();
                        let temp = self.next_unique(k.destructure_arg);
                        args.push(builder::local(param_loc, temp));
                        let destructure = Node::Masgn {
                            loc: param_loc,
                            lhs: Box::new(param),
                            rhs: Box::new(Node::LVar {
                                loc: param_loc,
                                name: temp,
                            }),
                        };
                        destructures.push(self.lower_node(destructure)?);
                    } else {
                        args.push(self.lower_node(param)?);
                    }
                }
                Ok((args, destructures))
            }
            other => err(
                other.loc(),
                format!("unexpected parameter list node `{}`", other.node_name()),
            ),
        }
    }

    fn lower_body(
        &mut self,
        loc: Loc,
        body: Option<Box<Node>>,
        destructures: Vec<Expr>,
    ) -> Result<Expr> {
        let body = self.lower_opt(body, loc)?;
        if destructures.is_empty() {
            return Ok(body);
        }
        Ok(builder::ins_seq(loc, destructures, body))
    }

    fn build_method(
        &mut self,
        loc: Loc,
        decl_loc: Loc,
        name: NameRef,
        argnode: Option<Box<Node>>,
        body: Option<Box<Node>>,
        is_self: bool,
    ) -> Result<Expr> {
        // Fresh counter within this scope, to keep the numbers small.
        let saved_counter = std::mem::replace(&mut self.unique_counter, 1);
        let saved_method = self
            .enclosing_method
            .replace(EnclosingMethod { name, decl_loc });
        let saved_block_arg = self.enclosing_block_arg;

        let result = self.build_method_inner(loc, decl_loc, name, argnode, body, is_self);

        self.unique_counter = saved_counter;
        self.enclosing_method = saved_method;
        self.enclosing_block_arg = saved_block_arg;
        result
    }

    fn build_method_inner(
        &mut self,
        loc: Loc,
        decl_loc: Loc,
        name: NameRef,
        argnode: Option<Box<Node>>,
        body: Option<Box<Node>>,
        is_self: bool,
    ) -> Result<Expr> {
        let k = self.known();
        let (mut args, destructures) = self.lower_params(argnode)?;
        builder::ensure_block_arg(&mut args, k.blk_arg, loc);

        let blk_name = match args.last() {
            Some(Expr::BlockArg(blk)) => match blk.expr.as_ref() {
                Expr::Local(l) => l.name,
                _ => return err(loc, "block parameter must wrap a local"),
            },
            _ => return err(loc, "parameter list must end with a block parameter"),
        };
        self.enclosing_block_arg = Some(blk_name);

        let body = self.lower_body(loc, body, destructures)?;
        let body = self.validate_rbi_body(body);

        let flags = MethodDefFlags {
            self_method: is_self,
            rewriter_synthesized: false,
        };
        Ok(builder::method(loc, decl_loc, name, args, body, flags, k.blk_arg))
    }

    /// Interface-only files may not carry method bodies beyond instance
    /// variable assignments.
    fn validate_rbi_body(&mut self, body: Expr) -> Expr {
        let body_loc = body.loc();
        if !body_loc.exists() {
            return body;
        }
        if !self.ctx.files.get(body_loc.file()).is_rbi() {
            return body;
        }
        match &body {
            Expr::EmptyTree(_) => {}
            Expr::Assign(_) => {
                if !is_ivar_assign(&body) {
                    self.code_in_rbi(body_loc, body_loc);
                }
            }
            Expr::InsSeq(seq) => {
                for stat in &seq.stats {
                    if !is_ivar_assign(stat) {
                        self.code_in_rbi(stat.loc(), body_loc);
                    }
                }
                if !is_ivar_assign(&seq.expr) {
                    self.code_in_rbi(seq.expr.loc(), body_loc);
                }
            }
            _ => self.code_in_rbi(body_loc, body_loc),
        }
        body
    }

    fn code_in_rbi(&mut self, at: Loc, body_loc: Loc) {
        if let Some(mut e) = self.ctx.begin_error(at, ErrorCode::CodeInRbi) {
            e.set_header("RBI methods must not have code");
            e.replace_with("Delete the body", body_loc, "");
        }
    }

    /// Lower a class or module body, resetting the per-scope counter.
    fn scope_node_to_body(&mut self, loc: Loc, node: Option<Box<Node>>) -> Result<Vec<Expr>> {
        let saved_counter = std::mem::replace(&mut self.unique_counter, 1);
        let result = self.scope_node_to_body_inner(loc, node);
        self.unique_counter = saved_counter;
        result
    }

    fn scope_node_to_body_inner(
        &mut self,
        loc: Loc,
        node: Option<Box<Node>>,
    ) -> Result<Vec<Expr>> {
        let mut body = Vec::new();
        match node {
            Some(node) => match *node {
                Node::Begin { stmts, .. } => {
                    body.reserve(stmts.len());
                    for stat in stmts {
                        body.push(self.lower_node(stat)?);
                    }
                }
                other => body.push(self.lower_node(other)?),
            },
            None => body.push(builder::empty(loc)),
        }
        Ok(body)
    }

    // ===== Sequences, strings =====

    fn lower_sequence(&mut self, loc: Loc, stmts: Vec<Node>) -> Result<Expr> {
        let mut stmts = stmts;
        let last = match stmts.pop() {
            Some(last) => last,
            None => return Ok(builder::empty(loc)),
        };
        let mut stats = Vec::with_capacity(stmts.len());
        for stat in stmts {
            stats.push(self.lower_node(stat)?);
        }
        let expr = self.lower_node(last)?;
        Ok(builder::ins_seq(loc, stats, expr))
    }

    fn lower_dstring(&mut self, loc: Loc, nodes: Vec<Node>) -> Result<Expr> {
        let k = self.known();
        let mut it = nodes.into_iter();
        let first = match it.next() {
            Some(first) => self.lower_node(first)?,
            None => return Ok(builder::string(loc, k.empty)),
        };

        let mut acc = if is_string_lit(&first) || first.is_empty_tree() {
            let mut strings: SmallVec<[Expr; 4]> = SmallVec::new();
            strings.push(first);
            DStringAcc::Strings(strings)
        } else {
            let piece_loc = first.loc();
            DStringAcc::Concat(builder::send0(piece_loc, first, k.to_s))
        };

        for node in it {
            let mut narg = self.lower_node(node)?;
            if !is_string_lit(&narg) && !narg.is_empty_tree() {
                let piece_loc = narg.loc();
                narg = builder::send0(piece_loc, narg, k.to_s);
            }
            acc = match acc {
                DStringAcc::Strings(mut strings) if is_string_lit(&narg) => {
                    strings.push(narg);
                    DStringAcc::Strings(strings)
                }
                acc if narg.is_empty_tree() => acc,
                DStringAcc::Strings(strings) => {
                    let merged = self.merge_strings(loc, strings);
                    DStringAcc::Concat(builder::send1(loc, merged, k.concat, narg))
                }
                DStringAcc::Concat(res) => {
                    DStringAcc::Concat(builder::send1(loc, res, k.concat, narg))
                }
            };
        }

        Ok(match acc {
            DStringAcc::Strings(strings) => self.merge_strings(loc, strings),
            DStringAcc::Concat(res) => res,
        })
    }

    /// Merge adjacent literal string parts at compile time.
    fn merge_strings(&mut self, loc: Loc, mut strings: SmallVec<[Expr; 4]>) -> Expr {
        if strings.len() == 1 {
            return strings.remove(0);
        }
        let mut joined = String::new();
        for expr in &strings {
            if expr.is_empty_tree() {
                continue;
            }
            if let Some(name) = expr.as_string_lit() {
                if let Some(s) = self.ctx.names.resolve(name) {
                    joined.push_str(s);
                }
            }
        }
        let name = self.ctx.names.intern(&joined);
        builder::string(loc, name)
    }

    fn lower_dsymbol(&mut self, loc: Loc, nodes: Vec<Node>) -> Result<Expr> {
        let k = self.known();
        let mut it = nodes.into_iter();
        let first = match it.next() {
            Some(first) => self.lower_node(first)?,
            None => return Ok(builder::symbol(loc, k.empty)),
        };
        let mut res = if is_string_lit(&first) {
            first
        } else {
            builder::send0(loc, first, k.to_s)
        };
        for node in it {
            let mut narg = self.lower_node(node)?;
            if !is_string_lit(&narg) {
                narg = builder::send0(loc, narg, k.to_s);
            }
            res = builder::send1(loc, res, k.concat, narg);
        }
        Ok(builder::send0(loc, res, k.intern))
    }

    // ===== Assignment =====

    fn constant_reassignment(&mut self, loc: Loc) {
        if let Some(mut e) = self.ctx.begin_error(loc, ErrorCode::NoConstantReassignment) {
            e.set_header("Constant reassignment is not supported");
        }
    }

    fn op_asgn_scaffolding(&mut self, send: ast::Send) -> OpAsgnScaffolding {
        let mut stats = Vec::with_capacity(send.args.len() + 2);
        let temp_recv = self.next_unique(send.method);
        stats.push(builder::assign_local(send.loc, temp_recv, *send.recv));

        let mut read_args = Vec::with_capacity(send.args.len());
        let mut assign_args = Vec::with_capacity(send.args.len() + 1);
        for arg in send.args {
            let arg_loc = arg.loc();
            let name = self.next_unique(send.method);
            stats.push(builder::assign_local(arg_loc, name, arg));
            read_args.push(builder::local(arg_loc, name));
            assign_args.push(builder::local(arg_loc, name));
        }

        OpAsgnScaffolding {
            loc: send.loc,
            method: send.method,
            flags: send.flags,
            temp_recv,
            stats,
            read_args,
            assign_args,
        }
    }

    /// `lhs op= rhs` for a send lhs: `{ tmps…; tr.m=(a…, tr.m(a…) op rhs) }`.
    fn op_asgn_from_scaffolding(
        &mut self,
        loc: Loc,
        sc: OpAsgnScaffolding,
        op: NameRef,
        rhs: Expr,
    ) -> Expr {
        let OpAsgnScaffolding {
            loc: send_loc,
            method,
            flags,
            temp_recv,
            stats,
            read_args,
            mut assign_args,
        } = sc;
        let prev = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            method,
            read_args,
            flags,
        );
        let new_value = builder::send1(send_loc, prev, op, rhs);
        assign_args.push(new_value);
        let setter = self.ctx.names.setter(method);
        let res = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            setter,
            assign_args,
            flags,
        );
        builder::ins_seq(loc, stats, res)
    }

    /// `lhs &&= rhs` for a send lhs: read once, write only when truthy.
    fn and_asgn_from_scaffolding(&mut self, loc: Loc, sc: OpAsgnScaffolding, rhs: Expr) -> Expr {
        let OpAsgnScaffolding {
            loc: send_loc,
            method,
            flags,
            temp_recv,
            mut stats,
            read_args,
            mut assign_args,
        } = sc;
        assign_args.push(rhs);
        let cond = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            method,
            read_args,
            flags,
        );
        let temp_result = self.next_unique(method);
        stats.push(builder::assign_local(send_loc, temp_result, cond));

        let setter = self.ctx.names.setter(method);
        let body = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            setter,
            assign_args,
            flags,
        );
        let elsep = builder::local(send_loc, temp_result);
        let iff = builder::if_(send_loc, builder::local(send_loc, temp_result), body, elsep);
        builder::ins_seq(loc, stats, iff)
    }

    /// `lhs ||= rhs` for a send lhs: dual of `&&=`.
    fn or_asgn_from_scaffolding(&mut self, loc: Loc, sc: OpAsgnScaffolding, rhs: Expr) -> Expr {
        let OpAsgnScaffolding {
            loc: send_loc,
            method,
            flags,
            temp_recv,
            mut stats,
            read_args,
            mut assign_args,
        } = sc;
        assign_args.push(rhs);
        let cond = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            method,
            read_args,
            flags,
        );
        let temp_result = self.next_unique(method);
        stats.push(builder::assign_local(send_loc, temp_result, cond));

        let setter = self.ctx.names.setter(method);
        let elsep = builder::send(
            send_loc,
            builder::local(send_loc, temp_recv),
            setter,
            assign_args,
            flags,
        );
        let body = builder::local(send_loc, temp_result);
        let iff = builder::if_(send_loc, builder::local(send_loc, temp_result), body, elsep);
        builder::ins_seq(loc, stats, iff)
    }

    /// Op-assignment whose lhs lowered to the safe-navigation shape
    /// `{ t = x; if t == nil then nil else t.m(…) }`: rewrite the send in
    /// the else branch in place, leaving the guard untouched.
    fn op_asgn_safe_nav(
        &mut self,
        mut seq: ast::InsSeq,
        loc: Loc,
        arg: Expr,
        build: impl FnOnce(&mut Lowerer<'a, 'c>, Loc, OpAsgnScaffolding, Expr) -> Expr,
    ) -> Result<Expr> {
        let iff = match seq.expr.as_mut() {
            Expr::If(iff) => iff,
            _ => return err(loc, "unexpected left-hand side of op-assign"),
        };
        let elsep_loc = iff.elsep.loc();
        let elsep = std::mem::replace(iff.elsep.as_mut(), builder::empty(loc));
        let send = match elsep {
            Expr::Send(send) => send,
            _ => return err(elsep_loc, "unexpected left-hand side of op-assign"),
        };
        let sc = self.op_asgn_scaffolding(send);
        let wrapped = build(self, loc, sc, arg);
        *iff.elsep = wrapped;
        Ok(Expr::InsSeq(seq))
    }

    /// Multiple assignment. The sequence evaluates to the entire rhs.
    fn lower_mlhs(&mut self, loc: Loc, exprs: Vec<Node>, rhs: Expr) -> Result<Expr> {
        let k = self.known();
        let mut stats: Vec<Expr> = Vec::new();
        let temp_rhs = self.next_unique(k.assign_temp);
        let temp_expanded = self.next_unique(k.assign_temp);

        let total = exprs.len() as i64;
        let mut i: i64 = 0;
        let (mut before, mut after) = (0i64, 0i64);
        let mut did_splat = false;

        for child in exprs {
            if let Node::SplatLhs {
                loc: splat_loc,
                var,
            } = child
            {
                if did_splat {
                    return err(splat_loc, "multiple splats in one destructure");
                }
                did_splat = true;

                let lh = self.lower_opt(var, splat_loc)?;
                let left = i;
                let mut right = total - left - 1;
                if !lh.is_empty_tree() {
                    let lh_loc = lh.loc();
                    let exclusive = if right == 0 {
                        right = 1;
                        builder::false_(lh_loc)
                    } else {
                        builder::true_(lh_loc)
                    };
                    let index = builder::send3(
                        lh_loc,
                        builder::constant(lh_loc, CoreSymbol::Range),
                        k.new_,
                        builder::int(lh_loc, left),
                        builder::int(lh_loc, -right),
                        exclusive,
                    );
                    stats.push(builder::assign(
                        lh_loc,
                        lh,
                        builder::send1(loc, builder::local(loc, temp_expanded), k.slice, index),
                    ));
                }
                i = -right;
            } else {
                if did_splat {
                    after += 1;
                } else {
                    before += 1;
                }
                let val = builder::send1(
                    loc,
                    builder::local(loc, temp_expanded),
                    k.index,
                    builder::int(loc, i),
                );

                if let Node::Mlhs {
                    loc: nested_loc,
                    exprs: nested,
                } = child
                {
                    stats.push(self.lower_mlhs(nested_loc, nested, val)?);
                } else {
                    let lh = self.lower_node(child)?;
                    let lh = match lh {
                        Expr::RestArg(rest) => {
                            if let Some(mut e) = self
                                .ctx
                                .begin_error(rest.loc, ErrorCode::UnsupportedRestArgsDestructure)
                            {
                                e.set_header("Unsupported rest args in destructure");
                            }
                            *rest.expr
                        }
                        other => other,
                    };
                    let lh_loc = lh.loc();
                    stats.push(builder::assign(lh_loc, lh, val));
                }
                i += 1;
            }
        }

        let expanded = builder::send3(
            loc,
            builder::constant(loc, CoreSymbol::Magic),
            k.expand_splat,
            builder::local(loc, temp_rhs),
            builder::int(loc, before),
            builder::int(loc, after),
        );
        stats.insert(0, builder::assign_local(loc, temp_expanded, expanded));
        stats.insert(0, builder::assign_local(loc, temp_rhs, rhs));

        Ok(builder::ins_seq(
            loc,
            stats,
            builder::local(loc, temp_rhs),
        ))
    }

    // ===== Control flow =====

    /// A post-test loop over a `begin…end` body runs the body first:
    /// `while true do { body; if cond then break } end`.
    fn do_until(&mut self, loc: Loc, cond: Expr, body: Expr) -> Expr {
        let breaker = builder::if_(
            loc,
            cond,
            builder::break_(loc, builder::empty(loc)),
            builder::empty(loc),
        );
        let break_with_body = builder::ins_seq1(loc, body, breaker);
        builder::while_(loc, builder::true_(loc), break_with_body)
    }

    fn lower_for(
        &mut self,
        loc: Loc,
        vars: Box<Node>,
        expr: Box<Node>,
        body: Option<Box<Node>>,
    ) -> Result<Expr> {
        let k = self.known();
        let mut mlhs_node = *vars;
        let nice = match &mlhs_node {
            Node::Mlhs { exprs, .. } => exprs.iter().all(|c| matches!(c, Node::LVarLhs { .. })),
            Node::LVarLhs { .. } => true,
            _ => false,
        };

        let (args, body) = if nice {
            let mut args = Vec::new();
            match mlhs_node {
                Node::Mlhs { exprs, .. } => {
                    for child in exprs {
                        args.push(self.lower_node(child)?);
                    }
                }
                other => args.push(self.lower_node(other)?),
            }
            (args, self.lower_opt(body, loc)?)
        } else {
            // Degraded path: bind a temporary and destructure it inside
            // the block body.
            if !matches!(mlhs_node, Node::Mlhs { .. }) {
                mlhs_node = Node::Mlhs {
                    loc,
                    exprs: vec![mlhs_node],
                };
            }
            let temp = self.next_unique(k.for_temp);
            let masgn = Node::Masgn {
                loc,
                lhs: Box::new(mlhs_node),
                rhs: Box::new(Node::LVar { loc, name: temp }),
            };
            let destructure = self.lower_node(masgn)?;
            let body = self.lower_opt(body, loc)?;
            (
                vec![builder::local(loc, temp)],
                builder::ins_seq1(loc, destructure, body),
            )
        };

        let block = builder::block(loc, body, args);
        let each_recv = self.lower_node(*expr)?;
        Ok(builder::send_with_block(
            loc,
            each_recv,
            k.each,
            Vec::new(),
            SendFlags::empty(),
            block,
        ))
    }

    fn lower_case(
        &mut self,
        loc: Loc,
        condition: Option<Box<Node>>,
        whens: Vec<Node>,
        else_: Option<Box<Node>>,
    ) -> Result<Expr> {
        let k = self.known();
        let mut assign: Option<Expr> = None;
        let mut temp: Option<NameRef> = None;
        let mut cond_loc = loc;
        if let Some(cond_node) = condition {
            cond_loc = cond_node.loc();
            let t = self.next_unique(k.assign_temp);
            let lowered = self.lower_node(*cond_node)?;
            assign = Some(builder::assign_local(cond_loc, t, lowered));
            temp = Some(t);
        }

        let mut res = self.lower_opt(else_, loc)?;
        for when in whens.into_iter().rev() {
            let (when_loc, patterns, body) = match when {
                Node::When {
                    loc,
                    patterns,
                    body,
                } => (loc, patterns, body),
                other => return err(other.loc(), "case clause without a when"),
            };

            let mut cond: Option<Expr> = None;
            for cnode in patterns.into_iter().rev() {
                let ctree = self.lower_node(cnode)?;
                let test = match temp {
                    Some(t) => {
                        let pattern_loc = ctree.loc();
                        builder::send1(
                            pattern_loc,
                            ctree,
                            k.triple_eq,
                            builder::local(cond_loc, t),
                        )
                    }
                    None => ctree,
                };
                cond = Some(match cond {
                    None => test,
                    Some(rest) => {
                        let test_loc = test.loc();
                        builder::if_(test_loc, test, builder::true_(test_loc), rest)
                    }
                });
            }
            let cond = match cond {
                Some(cond) => cond,
                None => return err(when_loc, "when clause without patterns"),
            };
            let body = self.lower_opt(body, when_loc)?;
            res = builder::if_(when_loc, cond, body, res);
        }

        if let Some(assign) = assign {
            res = builder::ins_seq1(loc, assign, res);
        }
        Ok(res)
    }

    /// `return`/`break`/`next`: multi-value operands wrap in an Array;
    /// block-pass operands are rejected.
    fn lower_exit(
        &mut self,
        loc: Loc,
        exprs: Vec<Node>,
        make: fn(Loc, Expr) -> Expr,
    ) -> Result<Expr> {
        if exprs.len() > 1 {
            let mut elems = Vec::with_capacity(exprs.len());
            for stat in exprs {
                if matches!(stat, Node::BlockPass { .. }) {
                    self.block_arg_not_allowed(loc);
                    continue;
                }
                elems.push(self.lower_node(stat)?);
            }
            Ok(make(loc, builder::array(loc, elems)))
        } else {
            match exprs.into_iter().next() {
                None => Ok(make(loc, builder::empty(loc))),
                Some(stat) if matches!(stat, Node::BlockPass { .. }) => {
                    self.block_arg_not_allowed(loc);
                    Ok(make(loc, builder::empty(loc)))
                }
                Some(stat) => {
                    let expr = self.lower_node(stat)?;
                    Ok(make(loc, expr))
                }
            }
        }
    }

    fn block_arg_not_allowed(&mut self, loc: Loc) {
        if let Some(mut e) = self.ctx.begin_error(loc, ErrorCode::UnsupportedNode) {
            e.set_header("Block argument should not be given");
        }
    }

    fn lower_yield(&mut self, loc: Loc, exprs: Vec<Node>) -> Result<Expr> {
        let k = self.known();
        let mut args = Vec::with_capacity(exprs.len());
        for expr in exprs {
            args.push(self.lower_node(expr)?);
        }

        let recv = match self.enclosing_block_arg {
            Some(block_arg) => {
                if block_arg == k.blk_arg {
                    if let Some(method) = self.enclosing_method {
                        let shown = self
                            .ctx
                            .names
                            .resolve(method.name)
                            .unwrap_or("")
                            .to_string();
                        if let Some(mut e) = self
                            .ctx
                            .begin_error(method.decl_loc, ErrorCode::UnnamedBlockParameter)
                        {
                            e.set_header(format!(
                                "Method `{}` uses `yield` but does not mention a block parameter",
                                shown
                            ));
                            e.add_error_line(loc, "Arising from use of `yield` in method body");
                        }
                    }
                }
                builder::local(loc, block_arg)
            }
            // Outside any method (class body, top level); later phases
            // tolerate the call through the unsafe marker.
            None => builder::unsafe_(loc, builder::nil(loc), &k),
        };
        Ok(builder::send(loc, recv, k.call, args, SendFlags::empty()))
    }

    fn lower_resbody(
        &mut self,
        loc: Loc,
        exception: Option<Box<Node>>,
        var: Option<Box<Node>>,
        body: Option<Box<Node>>,
    ) -> Result<Expr> {
        let k = self.known();
        let mut exceptions: Vec<Expr> = Vec::new();
        let exceptions_expr = self.lower_opt(exception, loc)?;
        match exceptions_expr {
            Expr::EmptyTree(_) => {}
            Expr::Array(arr) => exceptions.extend(arr.elems),
            Expr::Send(send) => {
                if send.method == k.splat || send.method == k.to_a || send.method == k.concat {
                    exceptions.push(Expr::Send(send));
                } else {
                    return err(send.loc, "unexpected exception-list expression");
                }
            }
            other => return err(other.loc(), "unexpected exception-list expression"),
        }

        let var_expr = self.lower_opt(var, loc)?;
        let mut var_loc = var_expr.loc();
        let (bound, leftover) = match var_expr {
            Expr::Local(local) => (Some(local.name), None),
            other => (None, Some(other)),
        };
        let named_binding = bound.is_some();
        let var = match bound {
            Some(name) => name,
            None => self.next_unique(k.rescue_temp),
        };

        let mut body = self.lower_opt(body, loc)?;
        match leftover {
            Some(Expr::EmptyTree(_)) | None => {
                if !named_binding {
                    var_loc = loc;
                }
            }
            // A non-local binding (`rescue => @e`) becomes an assignment
            // from the caught value.
            Some(other) => {
                body = builder::ins_seq1(
                    var_loc,
                    builder::assign(var_loc, other, builder::local(var_loc, var)),
                    body,
                );
            }
        }

        Ok(Expr::RescueCase(ast::RescueCase {
            loc,
            exceptions,
            var: Box::new(builder::local(var_loc, var)),
            body: Box::new(body),
        }))
    }

    // ===== Containers =====

    fn lower_array(&mut self, loc: Loc, elts: Vec<Node>) -> Result<Expr> {
        let k = self.known();
        let mut elems: Vec<Expr> = Vec::with_capacity(elts.len());
        let mut last_merge: Option<Expr> = None;

        for stat in elts {
            if let Node::Splat { var, .. } = stat {
                // [a, *x, rest] => [a].concat(x.to_a).concat([rest])
                let var = builder::send0(loc, self.lower_node(*var)?, k.to_a);
                if elems.is_empty() {
                    last_merge = Some(match last_merge {
                        Some(prev) => builder::send1(loc, prev, k.concat, var),
                        None => var,
                    });
                } else {
                    let current = builder::array(loc, std::mem::take(&mut elems));
                    let merged = match last_merge {
                        Some(prev) => builder::send1(loc, prev, k.concat, current),
                        None => current,
                    };
                    last_merge = Some(builder::send1(loc, merged, k.concat, var));
                }
            } else {
                elems.push(self.lower_node(stat)?);
            }
        }

        Ok(if elems.is_empty() {
            match last_merge {
                Some(merged) => merged,
                None => builder::array(loc, elems),
            }
        } else {
            let arr = builder::array(loc, elems);
            match last_merge {
                Some(merged) => builder::send1(loc, merged, k.concat, arr),
                None => arr,
            }
        })
    }

    fn lower_hash(&mut self, loc: Loc, pairs: Vec<Node>) -> Result<Expr> {
        let k = self.known();
        let mut keys: Vec<Expr> = Vec::with_capacity(pairs.len());
        let mut values: Vec<Expr> = Vec::with_capacity(pairs.len());
        let mut last_merge: Option<Expr> = None;

        for pair in pairs {
            match pair {
                Node::Pair { key, value, .. } => {
                    keys.push(self.lower_node(*key)?);
                    values.push(self.lower_node(*value)?);
                }
                Node::Kwsplat { expr, .. } => {
                    // {a: 1, **x, rest} => {a: 1}.merge(x.to_h).merge(rest)
                    let expr = builder::send0(loc, self.lower_node(*expr)?, k.to_h);
                    if keys.is_empty() {
                        last_merge = Some(match last_merge {
                            Some(prev) => builder::send1(loc, prev, k.merge, expr),
                            None => expr,
                        });
                    } else {
                        let current = builder::hash(
                            loc,
                            std::mem::take(&mut keys),
                            std::mem::take(&mut values),
                        );
                        let merged = match last_merge {
                            Some(prev) => builder::send1(loc, prev, k.merge, current),
                            None => current,
                        };
                        last_merge = Some(builder::send1(loc, merged, k.merge, expr));
                    }
                }
                other => return err(other.loc(), "unexpected hash element"),
            }
        }

        Ok(if keys.is_empty() {
            match last_merge {
                Some(merged) => merged,
                None => builder::hash0(loc),
            }
        } else {
            let hash = builder::hash(loc, keys, values);
            match last_merge {
                Some(merged) => builder::send1(loc, merged, k.merge, hash),
                None => hash,
            }
        })
    }
}

fn is_string_lit(expr: &Expr) -> bool {
    expr.as_string_lit().is_some()
}

fn is_ivar_assign(expr: &Expr) -> bool {
    match expr {
        Expr::Assign(assign) => matches!(
            assign.lhs.as_ref(),
            Expr::UnresolvedIdent(id) if id.kind == IdentKind::Instance
        ),
        _ => false,
    }
}
