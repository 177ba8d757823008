//! Rewriting of closed enum classes (`T::Enum`).
//!
//! A class inheriting `T::Enum` declares each variant as a constant
//! assigned from `Magic.<self-new>(self)` (usually inside an `enums do`
//! block). Each such constant becomes its own singleton subclass plus a
//! re-typed assignment, and the enum class itself is marked abstract and
//! sealed, which is what later phases need to treat the variants as a
//! closed set of typed singleton values.

use reef_core::ast::{builder, Assign, ClassDef, ClassDefKind, ConstantLit, CoreSymbol, Expr, Send};
use reef_core::context::Context;
use reef_core::diagnostics::ErrorCode;
use reef_core::names::{Knowns, UniqueKind};

#[derive(Clone, Copy, PartialEq, Eq)]
enum FromWhere {
    Inside,
    Outside,
}

enum Outcome {
    Keep(Expr),
    Replace(Vec<Expr>),
    Drop,
}

/// Rewrite `class_def` in place if it is a closed enum class.
pub fn run(ctx: &mut Context<'_>, class_def: &mut ClassDef) {
    let k = ctx.names.known();
    if !is_closed_enum(&k, class_def) {
        return;
    }
    // A body that already starts with the helpers prelude has been
    // processed; the pass is a fixpoint.
    if already_processed(&k, class_def) {
        return;
    }

    let old_rhs = std::mem::take(&mut class_def.body);
    let loc = class_def.decl_loc;
    class_def.body.reserve(old_rhs.len() + 3);
    class_def.body.push(builder::send1(
        loc,
        builder::self_(loc),
        k.extend,
        builder::constant(loc, CoreSymbol::THelpers),
    ));
    class_def
        .body
        .push(builder::send0(loc, builder::self_(loc), k.abstract_bang));
    class_def
        .body
        .push(builder::send0(loc, builder::self_(loc), k.sealed_bang));

    for stat in old_rhs {
        match stat {
            Expr::Send(mut send) if send.method == k.enums && send.block.is_some() => {
                let block = match send.block.take() {
                    Some(block) => block,
                    None => continue,
                };
                match *block.body {
                    Expr::InsSeq(seq) => {
                        for stat in seq.stats {
                            collect_new_stats(ctx, class_def, stat, FromWhere::Inside);
                        }
                        collect_new_stats(ctx, class_def, *seq.expr, FromWhere::Inside);
                    }
                    other => collect_new_stats(ctx, class_def, other, FromWhere::Inside),
                }
            }
            other => collect_new_stats(ctx, class_def, other, FromWhere::Outside),
        }
    }
}

fn collect_new_stats(
    ctx: &mut Context<'_>,
    class_def: &mut ClassDef,
    stat: Expr,
    from_where: FromWhere,
) {
    match process_stat(ctx, class_def, stat, from_where) {
        Outcome::Keep(stat) => class_def.body.push(stat),
        Outcome::Replace(stats) => class_def.body.extend(stats),
        Outcome::Drop => {}
    }
}

fn process_stat(
    ctx: &mut Context<'_>,
    class_def: &ClassDef,
    stat: Expr,
    from_where: FromWhere,
) -> Outcome {
    let k = ctx.names.known();
    let assign = match stat {
        Expr::Assign(assign) => assign,
        other => return Outcome::Keep(other),
    };
    let (cnst_loc, cnst_name) = match assign.lhs.as_ref() {
        Expr::UnresolvedConstantLit(cnst) => (cnst.loc, cnst.cnst),
        _ => return Outcome::Keep(Expr::Assign(assign)),
    };

    let rhs = match assign.rhs.as_ref() {
        Expr::Send(send) => send,
        _ => return bad_const(ctx, &assign, class_def),
    };
    if rhs.method != k.self_new && rhs.method != k.let_ {
        return bad_const(ctx, &assign, class_def);
    }
    if rhs.method == k.self_new && !rhs.recv.is_magic() {
        return bad_const(ctx, &assign, class_def);
    }
    if rhs.method == k.let_ {
        if !matches!(rhs.recv.as_ref(), Expr::UnresolvedConstantLit(_)) {
            return bad_const(ctx, &assign, class_def);
        }
        if rhs.args.len() != 2 {
            return bad_const(ctx, &assign, class_def);
        }
        match &rhs.args[0] {
            Expr::Send(inner) if is_self_new(&k, inner) => {}
            _ => return bad_const(ctx, &assign, class_def),
        }
    }

    // The assignment has the shape
    //   A = Magic.<self-new>(self) | T.let(Magic.<self-new>(self), _)
    // so it is a new enum value.

    if from_where != FromWhere::Inside {
        let shown = ctx.names.resolve(cnst_name).unwrap_or("").to_string();
        if let Some(mut e) = ctx.begin_error(assign.loc, ErrorCode::TEnumOutsideEnumsDo) {
            e.set_header(format!(
                "Definition of enum value `{}` must be within the `enums do` block for this `T::Enum`",
                shown
            ));
            e.add_error_line(class_def.decl_loc, "Enclosing definition here");
        }
    }

    let loc = assign.loc;
    let name = ctx
        .names
        .fresh_unique(UniqueKind::TEnum, cnst_name, 1);
    let class_cnst = builder::unresolved_constant(cnst_loc, builder::empty(cnst_loc), name);

    let parent = class_def.name.as_ref().clone();
    let class_rhs = vec![
        builder::send1(
            loc,
            builder::self_(loc),
            k.extend,
            builder::constant(loc, CoreSymbol::Singleton),
        ),
        builder::send0(loc, builder::self_(loc), k.final_bang),
    ];
    let variant_class = builder::class_def(
        loc,
        loc,
        ClassDefKind::Class,
        class_cnst.clone(),
        vec![parent],
        class_rhs,
    );

    let singleton_assign = builder::assign(
        loc,
        *assign.lhs,
        builder::let_(
            loc,
            builder::send0(loc, class_cnst.clone(), k.instance),
            class_cnst,
            &k,
        ),
    );

    Outcome::Replace(vec![variant_class, singleton_assign])
}

fn bad_const(ctx: &mut Context<'_>, assign: &Assign, class_def: &ClassDef) -> Outcome {
    if let Some(mut e) = ctx.begin_error(assign.loc, ErrorCode::TEnumConstNotEnumValue) {
        e.set_header("All constants defined on an `T::Enum` must be unique instances of the enum");
        e.add_error_line(class_def.loc, "Enclosing definition here");
    }
    Outcome::Drop
}

fn is_self_new(known: &Knowns, send: &Send) -> bool {
    send.method == known.self_new && send.recv.is_magic()
}

/// The first ancestor must be the constant path `T::Enum`, with the `T`
/// scoped to the root (implicitly or explicitly).
fn is_closed_enum(known: &Knowns, class_def: &ClassDef) -> bool {
    if class_def.kind != ClassDefKind::Class || class_def.ancestors.is_empty() {
        return false;
    }
    let cnst = match &class_def.ancestors[0] {
        Expr::UnresolvedConstantLit(cnst) => cnst,
        _ => return false,
    };
    if cnst.cnst != known.enum_const {
        return false;
    }
    let scope = match cnst.scope.as_ref() {
        Expr::UnresolvedConstantLit(scope) => scope,
        _ => return false,
    };
    if scope.cnst != known.t_const {
        return false;
    }
    match scope.scope.as_ref() {
        Expr::EmptyTree(_) => true,
        Expr::ConstantLit(ConstantLit {
            symbol: CoreSymbol::Root,
            ..
        }) => true,
        _ => false,
    }
}

fn already_processed(known: &Knowns, class_def: &ClassDef) -> bool {
    match class_def.body.first() {
        Some(Expr::Send(send)) => {
            send.method == known.extend
                && send.recv.is_self_ref()
                && matches!(
                    send.args.first(),
                    Some(Expr::ConstantLit(ConstantLit {
                        symbol: CoreSymbol::THelpers,
                        ..
                    }))
                )
        }
        _ => false,
    }
}
