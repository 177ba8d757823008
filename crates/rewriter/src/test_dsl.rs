//! Recognition of the test-framework DSL.
//!
//! `self.describe("D") { … }`, `self.it("N") { … }`, and the zero-argument
//! `self.before { … }` / `self.after { … }` hooks are rewritten into a
//! class and plain methods so the later phases can type-check test bodies
//! like any other code.
//!
//! Method bodies cannot define constants or classes, so a hoister walks
//! each transformed block first: constant assignments become
//! `Module.const_set` calls in place plus a declaration lifted to the
//! enclosing scope, and outermost nested classes (and nested `describe`
//! sends, which become classes anyway) are lifted out whole.

use crate::treemap::{self, TreeMapper};
use reef_core::ast::{
    builder, Assign, ClassDef, ClassDefKind, CoreSymbol, Expr, LiteralValue, MethodDefFlags, Send,
};
use reef_core::context::Context;
use reef_core::names::NameRef;

/// Flat-map the statements of a class body through the DSL recognizer.
pub fn run(ctx: &mut Context<'_>, class_def: &mut ClassDef) {
    let old = std::mem::take(&mut class_def.body);
    class_def.body.reserve(old.len());
    for stat in old {
        let stat = recurse(ctx, stat);
        class_def.body.push(stat);
    }
}

/// Rewrite `stat` if it is a matching DSL send, otherwise return it as-is.
fn recurse(ctx: &mut Context<'_>, stat: Expr) -> Expr {
    match stat {
        Expr::Send(send) => match run_single(ctx, send) {
            Ok(rewritten) => rewritten,
            Err(send) => Expr::Send(send),
        },
        other => other,
    }
}

/// Rewrite one DSL send. Returns the original send on no match.
fn run_single(ctx: &mut Context<'_>, send: Send) -> Result<Expr, Send> {
    if send.block.is_none() || !send.recv.is_self_ref() {
        return Err(send);
    }
    let k = ctx.names.known();

    if send.args.is_empty() && (send.method == k.before || send.method == k.after) {
        let name = if send.method == k.after {
            k.after_angles
        } else {
            k.initialize
        };
        return Ok(rewrite_example(ctx, send, name));
    }

    if send.args.len() != 1 {
        return Err(send);
    }

    if send.method == k.describe {
        Ok(rewrite_describe(ctx, send))
    } else if send.method == k.it {
        let arg_string = arg_to_string(ctx, &send.args[0]);
        let name = ctx.names.intern(&format!("<it '{}'>", arg_string));
        Ok(rewrite_example(ctx, send, name))
    } else {
        Err(send)
    }
}

/// `describe "D" { body }` becomes `class <describe 'D'> < self; body end`.
/// Constant assignments in the body get the declaration/`const_set`
/// treatment, with declarations placed at the head of the class body.
fn rewrite_describe(ctx: &mut Context<'_>, mut send: Send) -> Expr {
    let arg_string = arg_to_string(ctx, &send.args[0]);
    let arg_loc = send.args[0].loc();
    let name_ref = ctx.names.intern(&format!("<describe '{}'>", arg_string));

    let body = match send.block.take() {
        Some(block) => *block.body,
        None => builder::empty(send.loc),
    };
    // Classes may nest classes, so only the constant-assignment rewrite
    // applies here.
    let mut mover = ConstantMover::consts_only();
    let body = treemap::apply(ctx, &mut mover, body);
    let body = prepare_body(ctx, body);

    let mut rhs = mover.into_moved(ctx);
    rhs.push(body);

    let name = builder::unresolved_constant(arg_loc, builder::empty(arg_loc), name_ref);
    let ancestors = vec![builder::self_(arg_loc)];
    builder::class_def(
        send.loc,
        send.loc,
        ClassDefKind::Class,
        name,
        ancestors,
        rhs,
    )
}

/// `it`/`before`/`after` become a `sig(:void)`-marked synthesized method;
/// hoisted constants and classes precede it in the enclosing scope.
fn rewrite_example(ctx: &mut Context<'_>, mut send: Send, name: NameRef) -> Expr {
    let loc = send.loc;
    let k = ctx.names.known();
    let body = match send.block.take() {
        Some(block) => *block.body,
        None => builder::empty(loc),
    };
    let mut mover = ConstantMover::full();
    let body = treemap::apply(ctx, &mut mover, body);
    let body = prepare_body(ctx, body);

    let flags = MethodDefFlags {
        self_method: false,
        rewriter_synthesized: true,
    };
    let method = builder::method(loc, loc, name, Vec::new(), body, flags, k.blk_arg);
    let method = builder::ins_seq1(loc, builder::sig_void(loc, &k), method);

    let moved = mover.into_moved(ctx);
    builder::ins_seq(loc, moved, method)
}

/// Rewrite nested DSL sends inside an already-rewritten block body.
fn prepare_body(ctx: &mut Context<'_>, body: Expr) -> Expr {
    let body = recurse(ctx, body);
    match body {
        Expr::InsSeq(mut seq) => {
            let stats = std::mem::take(&mut seq.stats);
            for stat in stats {
                seq.stats.push(recurse(ctx, stat));
            }
            seq.expr = Box::new(recurse(ctx, *seq.expr));
            Expr::InsSeq(seq)
        }
        other => other,
    }
}

fn arg_to_string(ctx: &Context<'_>, arg: &Expr) -> String {
    match arg {
        Expr::Literal(lit) => match lit.value {
            LiteralValue::String(name) | LiteralValue::Symbol(name) => {
                ctx.names.resolve(name).unwrap_or("").to_string()
            }
            LiteralValue::Int(v) => v.to_string(),
            LiteralValue::Float(v) => v.to_string(),
            LiteralValue::True => "true".to_string(),
            LiteralValue::False => "false".to_string(),
            LiteralValue::Nil => "nil".to_string(),
        },
        Expr::UnresolvedConstantLit(cnst) => {
            ctx.names.resolve(cnst.cnst).unwrap_or("").to_string()
        }
        _ => "...".to_string(),
    }
}

fn is_describe_send(ctx: &Context<'_>, send: &Send) -> bool {
    send.recv.is_self_ref()
        && send.args.len() == 1
        && send.method == ctx.names.known().describe
}

/// Hoists constant and class definitions out of a block that is about to
/// become a method body. Class depth is tracked so only the outermost
/// nested definitions move.
struct ConstantMover {
    class_depth: u32,
    moved: Vec<Expr>,
    hoist_classes: bool,
}

impl ConstantMover {
    fn full() -> Self {
        ConstantMover {
            class_depth: 0,
            moved: Vec::new(),
            hoist_classes: true,
        }
    }

    fn consts_only() -> Self {
        ConstantMover {
            class_depth: 0,
            moved: Vec::new(),
            hoist_classes: false,
        }
    }

    /// The hoisted statements, with any moved DSL sends rewritten so they
    /// do not reappear as raw calls in the enclosing scope.
    fn into_moved(self, ctx: &mut Context<'_>) -> Vec<Expr> {
        self.moved
            .into_iter()
            .map(|stat| recurse(ctx, stat))
            .collect()
    }
}

impl TreeMapper for ConstantMover {
    fn post_assign(&mut self, ctx: &mut Context<'_>, assign: Assign) -> Expr {
        let (cnst_loc, cnst_name) = match assign.lhs.as_ref() {
            Expr::UnresolvedConstantLit(cnst) => (cnst.loc, cnst.cnst),
            _ => return Expr::Assign(assign),
        };
        if matches!(assign.rhs.as_ref(), Expr::UnresolvedConstantLit(_)) {
            let loc = assign.loc;
            self.moved.push(Expr::Assign(assign));
            return builder::empty(loc);
        }

        let k = ctx.names.known();
        let loc = assign.loc;
        let Assign { lhs, rhs, .. } = assign;

        // Preserve an existing type annotation on the hoisted declaration;
        // otherwise it decays to untyped.
        let decl_rhs = match rhs.as_ref() {
            Expr::Send(send) if send.method == k.let_ && send.args.len() == 2 => {
                builder::let_(loc, builder::nil(loc), send.args[1].clone(), &k)
            }
            _ => builder::unsafe_(loc, builder::nil(loc), &k),
        };
        self.moved.push(builder::assign(loc, *lhs, decl_rhs));

        let name = builder::symbol(cnst_loc, cnst_name);
        builder::send2(
            loc,
            builder::constant(loc, CoreSymbol::Module),
            k.const_set,
            name,
            *rhs,
        )
    }

    fn pre_class_def(&mut self, _ctx: &mut Context<'_>, class_def: ClassDef) -> ClassDef {
        self.class_depth += 1;
        class_def
    }

    fn post_class_def(&mut self, _ctx: &mut Context<'_>, class_def: ClassDef) -> Expr {
        self.class_depth -= 1;
        if self.hoist_classes && self.class_depth == 0 {
            let loc = class_def.loc;
            self.moved.push(Expr::ClassDef(class_def));
            return builder::empty(loc);
        }
        Expr::ClassDef(class_def)
    }

    // Nested `describe` sends end up as classes, so they move the same way
    // classes do.
    fn pre_send(&mut self, ctx: &mut Context<'_>, send: Send) -> Send {
        if self.hoist_classes && is_describe_send(ctx, &send) {
            self.class_depth += 1;
        }
        send
    }

    fn post_send(&mut self, ctx: &mut Context<'_>, send: Send) -> Expr {
        if self.hoist_classes && is_describe_send(ctx, &send) {
            self.class_depth -= 1;
            if self.class_depth == 0 {
                let loc = send.loc;
                self.moved.push(Expr::Send(send));
                return builder::empty(loc);
            }
        }
        Expr::Send(send)
    }
}
