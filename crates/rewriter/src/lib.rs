//! Reef rewriter: syntax-directed transformations over the desugared TAST.
//!
//! Passes recognize idiomatic meta-programming patterns in already-lowered
//! code and rewrite them into statically analyzable shapes:
//!
//! - [`test_dsl`] — `describe`/`it`/`before`/`after` become a class and
//!   plain methods
//! - [`typed_enum`] — `T::Enum` subclasses become sealed hierarchies of
//!   typed singleton values
//!
//! The passes run after desugaring and before name resolution, are
//! independent of each other, and are skipped entirely under autogen mode.
//! Running the rewriter over its own output leaves the tree unchanged.

pub mod test_dsl;
pub mod treemap;
pub mod typed_enum;

pub use treemap::{apply, TreeMapper};

use reef_core::ast::{ClassDef, Expr};
use reef_core::context::Context;

struct Driver;

impl TreeMapper for Driver {
    fn post_class_def(&mut self, ctx: &mut Context<'_>, mut class_def: ClassDef) -> Expr {
        run_passes(ctx, &mut class_def);
        Expr::ClassDef(class_def)
    }
}

/// Apply every enabled pass to one class body. Pass order is not
/// significant; the passes match disjoint shapes.
fn run_passes(ctx: &mut Context<'_>, class_def: &mut ClassDef) {
    typed_enum::run(ctx, class_def);
    test_dsl::run(ctx, class_def);
}

/// Run all rewrite passes over a lowered compilation unit.
pub fn run(ctx: &mut Context<'_>, tree: Expr) -> Expr {
    if ctx.config.autogen {
        return tree;
    }
    treemap::apply(ctx, &mut Driver, tree)
}
