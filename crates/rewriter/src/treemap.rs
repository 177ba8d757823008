//! Generic TAST walking with per-kind rewrite hooks.
//!
//! [`apply`] drives a depth-first walk over an owned tree: for the
//! structured node kinds it calls the mapper's `pre_*` hook on descent,
//! rewrites the children, then calls `post_*` on ascent. `post_*` hooks
//! return a replacement expression; returning `EmptyTree` deletes the
//! node. Leaf kinds pass through untouched.

use reef_core::ast::{
    Assign, Block, ClassDef, Expr, If, InsSeq, MethodDef, Rescue, RescueCase, Send, While,
};
use reef_core::context::Context;

/// Rewrite hooks. Every hook defaults to the identity; implement only the
/// kinds a pass cares about.
pub trait TreeMapper {
    fn pre_class_def(&mut self, _ctx: &mut Context<'_>, class_def: ClassDef) -> ClassDef {
        class_def
    }
    fn post_class_def(&mut self, _ctx: &mut Context<'_>, class_def: ClassDef) -> Expr {
        Expr::ClassDef(class_def)
    }

    fn pre_method_def(&mut self, _ctx: &mut Context<'_>, method_def: MethodDef) -> MethodDef {
        method_def
    }
    fn post_method_def(&mut self, _ctx: &mut Context<'_>, method_def: MethodDef) -> Expr {
        Expr::MethodDef(method_def)
    }

    fn pre_send(&mut self, _ctx: &mut Context<'_>, send: Send) -> Send {
        send
    }
    fn post_send(&mut self, _ctx: &mut Context<'_>, send: Send) -> Expr {
        Expr::Send(send)
    }

    fn pre_block(&mut self, _ctx: &mut Context<'_>, block: Block) -> Block {
        block
    }
    fn post_block(&mut self, _ctx: &mut Context<'_>, block: Block) -> Expr {
        Expr::Block(block)
    }

    fn pre_assign(&mut self, _ctx: &mut Context<'_>, assign: Assign) -> Assign {
        assign
    }
    fn post_assign(&mut self, _ctx: &mut Context<'_>, assign: Assign) -> Expr {
        Expr::Assign(assign)
    }

    fn pre_if(&mut self, _ctx: &mut Context<'_>, iff: If) -> If {
        iff
    }
    fn post_if(&mut self, _ctx: &mut Context<'_>, iff: If) -> Expr {
        Expr::If(iff)
    }

    fn pre_while(&mut self, _ctx: &mut Context<'_>, wl: While) -> While {
        wl
    }
    fn post_while(&mut self, _ctx: &mut Context<'_>, wl: While) -> Expr {
        Expr::While(wl)
    }

    fn pre_ins_seq(&mut self, _ctx: &mut Context<'_>, seq: InsSeq) -> InsSeq {
        seq
    }
    fn post_ins_seq(&mut self, _ctx: &mut Context<'_>, seq: InsSeq) -> Expr {
        Expr::InsSeq(seq)
    }

    fn pre_rescue(&mut self, _ctx: &mut Context<'_>, rescue: Rescue) -> Rescue {
        rescue
    }
    fn post_rescue(&mut self, _ctx: &mut Context<'_>, rescue: Rescue) -> Expr {
        Expr::Rescue(rescue)
    }
}

fn apply_vec<M: TreeMapper>(
    ctx: &mut Context<'_>,
    mapper: &mut M,
    exprs: Vec<Expr>,
) -> Vec<Expr> {
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        out.push(apply(ctx, mapper, expr));
    }
    out
}

fn apply_boxed<M: TreeMapper>(
    ctx: &mut Context<'_>,
    mapper: &mut M,
    expr: Box<Expr>,
) -> Box<Expr> {
    Box::new(apply(ctx, mapper, *expr))
}

fn walk_block<M: TreeMapper>(ctx: &mut Context<'_>, mapper: &mut M, mut block: Block) -> Block {
    block.args = apply_vec(ctx, mapper, block.args);
    block.body = apply_boxed(ctx, mapper, block.body);
    block
}

fn walk_rescue_case<M: TreeMapper>(
    ctx: &mut Context<'_>,
    mapper: &mut M,
    mut case: RescueCase,
) -> RescueCase {
    case.exceptions = apply_vec(ctx, mapper, case.exceptions);
    case.var = apply_boxed(ctx, mapper, case.var);
    case.body = apply_boxed(ctx, mapper, case.body);
    case
}

/// Rewrite `expr` with `mapper`, bottom-up with pre-order entry hooks.
pub fn apply<M: TreeMapper>(ctx: &mut Context<'_>, mapper: &mut M, expr: Expr) -> Expr {
    match expr {
        Expr::ClassDef(class_def) => {
            let mut class_def = mapper.pre_class_def(ctx, class_def);
            class_def.name = apply_boxed(ctx, mapper, class_def.name);
            class_def.ancestors = apply_vec(ctx, mapper, class_def.ancestors);
            class_def.body = apply_vec(ctx, mapper, class_def.body);
            mapper.post_class_def(ctx, class_def)
        }
        Expr::MethodDef(method_def) => {
            let mut method_def = mapper.pre_method_def(ctx, method_def);
            method_def.args = apply_vec(ctx, mapper, method_def.args);
            method_def.body = apply_boxed(ctx, mapper, method_def.body);
            mapper.post_method_def(ctx, method_def)
        }
        Expr::Send(send) => {
            let mut send = mapper.pre_send(ctx, send);
            send.recv = apply_boxed(ctx, mapper, send.recv);
            send.args = apply_vec(ctx, mapper, send.args);
            send.block = send
                .block
                .map(|block| Box::new(walk_block(ctx, mapper, *block)));
            mapper.post_send(ctx, send)
        }
        Expr::Block(block) => {
            let block = mapper.pre_block(ctx, block);
            let block = walk_block(ctx, mapper, block);
            mapper.post_block(ctx, block)
        }
        Expr::Assign(assign) => {
            let mut assign = mapper.pre_assign(ctx, assign);
            assign.lhs = apply_boxed(ctx, mapper, assign.lhs);
            assign.rhs = apply_boxed(ctx, mapper, assign.rhs);
            mapper.post_assign(ctx, assign)
        }
        Expr::If(iff) => {
            let mut iff = mapper.pre_if(ctx, iff);
            iff.cond = apply_boxed(ctx, mapper, iff.cond);
            iff.thenp = apply_boxed(ctx, mapper, iff.thenp);
            iff.elsep = apply_boxed(ctx, mapper, iff.elsep);
            mapper.post_if(ctx, iff)
        }
        Expr::While(wl) => {
            let mut wl = mapper.pre_while(ctx, wl);
            wl.cond = apply_boxed(ctx, mapper, wl.cond);
            wl.body = apply_boxed(ctx, mapper, wl.body);
            mapper.post_while(ctx, wl)
        }
        Expr::InsSeq(seq) => {
            let mut seq = mapper.pre_ins_seq(ctx, seq);
            seq.stats = apply_vec(ctx, mapper, seq.stats);
            seq.expr = apply_boxed(ctx, mapper, seq.expr);
            mapper.post_ins_seq(ctx, seq)
        }
        Expr::Rescue(rescue) => {
            let mut rescue = mapper.pre_rescue(ctx, rescue);
            rescue.body = apply_boxed(ctx, mapper, rescue.body);
            rescue.rescue_cases = rescue
                .rescue_cases
                .into_iter()
                .map(|case| walk_rescue_case(ctx, mapper, case))
                .collect();
            rescue.else_ = apply_boxed(ctx, mapper, rescue.else_);
            rescue.ensure = apply_boxed(ctx, mapper, rescue.ensure);
            mapper.post_rescue(ctx, rescue)
        }
        Expr::RescueCase(case) => Expr::RescueCase(walk_rescue_case(ctx, mapper, case)),
        Expr::UnresolvedConstantLit(mut lit) => {
            lit.scope = apply_boxed(ctx, mapper, lit.scope);
            Expr::UnresolvedConstantLit(lit)
        }
        Expr::Return(mut ret) => {
            ret.expr = apply_boxed(ctx, mapper, ret.expr);
            Expr::Return(ret)
        }
        Expr::Break(mut brk) => {
            brk.expr = apply_boxed(ctx, mapper, brk.expr);
            Expr::Break(brk)
        }
        Expr::Next(mut nxt) => {
            nxt.expr = apply_boxed(ctx, mapper, nxt.expr);
            Expr::Next(nxt)
        }
        Expr::Array(mut arr) => {
            arr.elems = apply_vec(ctx, mapper, arr.elems);
            Expr::Array(arr)
        }
        Expr::Hash(mut hash) => {
            hash.keys = apply_vec(ctx, mapper, hash.keys);
            hash.values = apply_vec(ctx, mapper, hash.values);
            Expr::Hash(hash)
        }
        Expr::RestArg(mut arg) => {
            arg.expr = apply_boxed(ctx, mapper, arg.expr);
            Expr::RestArg(arg)
        }
        Expr::KeywordArg(mut arg) => {
            arg.expr = apply_boxed(ctx, mapper, arg.expr);
            Expr::KeywordArg(arg)
        }
        Expr::OptionalArg(mut arg) => {
            arg.expr = apply_boxed(ctx, mapper, arg.expr);
            arg.default = apply_boxed(ctx, mapper, arg.default);
            Expr::OptionalArg(arg)
        }
        Expr::BlockArg(mut arg) => {
            arg.expr = apply_boxed(ctx, mapper, arg.expr);
            Expr::BlockArg(arg)
        }
        Expr::ShadowArg(mut arg) => {
            arg.expr = apply_boxed(ctx, mapper, arg.expr);
            Expr::ShadowArg(arg)
        }
        leaf @ (Expr::Literal(_)
        | Expr::Local(_)
        | Expr::UnresolvedIdent(_)
        | Expr::ConstantLit(_)
        | Expr::SelfRef(_)
        | Expr::Retry(_)
        | Expr::EmptyTree(_)
        | Expr::ZSuperArgs(_)) => leaf,
    }
}
