//! Structural validation of the lowered tree.
//!
//! Runs after desugaring and asserts the invariants the later phases rely
//! on. A violation is an internal error: it aborts the compilation unit.

use crate::ast::{ClassDef, ConstantLit, CoreSymbol, Expr, RescueCase};
use crate::context::Context;
use crate::diagnostics::ErrorCode;
use crate::loc::Loc;
use std::fmt;

/// A structural invariant violation.
#[derive(Debug, Clone)]
pub struct VerifyError {
    pub loc: Loc,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TAST verification failed: {}", self.message)
    }
}

impl std::error::Error for VerifyError {}

/// Verify a lowered compilation unit. The first violation is attached as
/// an `InternalError` diagnostic and returned.
pub fn verify(ctx: &mut Context<'_>, tree: &Expr) -> Result<(), VerifyError> {
    let mut verifier = Verifier { violations: Vec::new() };
    verifier.check_root(tree);
    verifier.check_expr(tree);

    match verifier.violations.into_iter().next() {
        None => Ok(()),
        Some(violation) => {
            if let Some(mut e) = ctx.begin_error(violation.loc, ErrorCode::InternalError) {
                e.set_header(format!("TAST verification failed: {}", violation.message));
            }
            Err(violation)
        }
    }
}

struct Verifier {
    violations: Vec<VerifyError>,
}

impl Verifier {
    fn violation(&mut self, loc: Loc, message: impl Into<String>) {
        self.violations.push(VerifyError {
            loc,
            message: message.into(),
        });
    }

    /// The top of a compilation unit is a single class body naming the
    /// root scope.
    fn check_root(&mut self, tree: &Expr) {
        match tree {
            Expr::ClassDef(ClassDef { name, .. }) => {
                if !matches!(
                    name.as_ref(),
                    Expr::ConstantLit(ConstantLit {
                        symbol: CoreSymbol::Root,
                        ..
                    })
                ) {
                    self.violation(tree.loc(), "top-level class does not name the root scope");
                }
            }
            other => self.violation(other.loc(), "compilation unit is not a class body"),
        }
    }

    fn check_loc(&mut self, expr: &Expr) {
        // EmptyTree and the synthesized trailing block parameter are the
        // only nodes allowed to carry no location at all; every other
        // synthetic node carries a zero-length loc.
        if !expr.loc().exists() && !matches!(expr, Expr::EmptyTree(_) | Expr::BlockArg(_)) {
            self.violation(expr.loc(), "node without a location");
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        self.check_loc(expr);
        match expr {
            Expr::Literal(_)
            | Expr::Local(_)
            | Expr::UnresolvedIdent(_)
            | Expr::ConstantLit(_)
            | Expr::SelfRef(_)
            | Expr::Retry(_)
            | Expr::EmptyTree(_)
            | Expr::ZSuperArgs(_) => {}
            Expr::UnresolvedConstantLit(lit) => self.check_expr(&lit.scope),
            Expr::Assign(assign) => {
                if !assign.lhs.is_reference() {
                    self.violation(assign.loc, "assignment target is not a reference");
                }
                self.check_expr(&assign.lhs);
                self.check_expr(&assign.rhs);
            }
            Expr::Send(send) => {
                self.check_expr(&send.recv);
                for arg in &send.args {
                    self.check_expr(arg);
                }
                if let Some(block) = &send.block {
                    for arg in &block.args {
                        self.check_expr(arg);
                    }
                    self.check_expr(&block.body);
                }
            }
            Expr::Block(block) => {
                for arg in &block.args {
                    self.check_expr(arg);
                }
                self.check_expr(&block.body);
            }
            Expr::MethodDef(method) => {
                match method.args.last() {
                    Some(Expr::BlockArg(_)) => {}
                    _ => self.violation(
                        method.loc,
                        "method parameter list does not end with a block parameter",
                    ),
                }
                let block_args = method
                    .args
                    .iter()
                    .filter(|a| matches!(a, Expr::BlockArg(_)))
                    .count();
                if block_args > 1 {
                    self.violation(method.loc, "method has more than one block parameter");
                }
                for arg in &method.args {
                    self.check_expr(arg);
                }
                self.check_expr(&method.body);
            }
            Expr::ClassDef(class) => {
                self.check_expr(&class.name);
                for ancestor in &class.ancestors {
                    self.check_expr(ancestor);
                }
                for stat in &class.body {
                    self.check_expr(stat);
                }
            }
            Expr::If(iff) => {
                self.check_expr(&iff.cond);
                self.check_expr(&iff.thenp);
                self.check_expr(&iff.elsep);
            }
            Expr::While(wl) => {
                self.check_expr(&wl.cond);
                self.check_expr(&wl.body);
            }
            Expr::Return(ret) => self.check_expr(&ret.expr),
            Expr::Break(brk) => self.check_expr(&brk.expr),
            Expr::Next(nxt) => self.check_expr(&nxt.expr),
            Expr::Rescue(rescue) => {
                self.check_expr(&rescue.body);
                for case in &rescue.rescue_cases {
                    self.check_rescue_case(case);
                }
                self.check_expr(&rescue.else_);
                self.check_expr(&rescue.ensure);
            }
            Expr::RescueCase(case) => self.check_rescue_case(case),
            Expr::Array(arr) => {
                for elem in &arr.elems {
                    self.check_expr(elem);
                }
            }
            Expr::Hash(hash) => {
                if hash.keys.len() != hash.values.len() {
                    self.violation(hash.loc, "hash keys and values out of step");
                }
                for key in &hash.keys {
                    self.check_expr(key);
                }
                for value in &hash.values {
                    self.check_expr(value);
                }
            }
            Expr::InsSeq(seq) => {
                if seq.stats.is_empty() {
                    self.violation(seq.loc, "instruction sequence without statements");
                }
                for stat in &seq.stats {
                    self.check_expr(stat);
                }
                self.check_expr(&seq.expr);
            }
            Expr::RestArg(arg) => self.check_expr(&arg.expr),
            Expr::KeywordArg(arg) => self.check_expr(&arg.expr),
            Expr::OptionalArg(arg) => {
                self.check_expr(&arg.expr);
                self.check_expr(&arg.default);
            }
            Expr::BlockArg(arg) => {
                // A fully synthesized block parameter wraps a local with no
                // location of its own.
                if arg.loc.exists() {
                    self.check_expr(&arg.expr);
                }
            }
            Expr::ShadowArg(arg) => self.check_expr(&arg.expr),
        }
    }

    fn check_rescue_case(&mut self, case: &RescueCase) {
        for exception in &case.exceptions {
            self.check_expr(exception);
        }
        self.check_expr(&case.var);
        self.check_expr(&case.body);
    }
}
