//! The typed abstract syntax tree (TAST).
//!
//! The canonical expression vocabulary every surface construct lowers into.
//! Each node owns its children and carries a [`Loc`]; later phases (name
//! resolution, CFG construction, inference) consume this tree unchanged.

pub mod builder;

use crate::loc::Loc;
use crate::names::NameRef;
use std::ops::BitOr;

/// Symbols that are hard-wired rather than resolved: the root scope and the
/// handful of runtime classes the lowering rules reference directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSymbol {
    /// The root scope; the top of every compilation unit names it.
    Root,
    /// Placeholder ancestor for classes with no written superclass; the
    /// resolver substitutes the true default.
    Todo,
    /// The pseudo-module that sinks intrinsic operations
    /// (`callWithSplat`, `expandSplat`, `defined?`, …).
    Magic,
    Range,
    Kernel,
    Regexp,
    Module,
    Singleton,
    T,
    THelpers,
}

impl CoreSymbol {
    pub fn show(&self) -> &'static str {
        match self {
            CoreSymbol::Root => "<root>",
            CoreSymbol::Todo => "<todo>",
            CoreSymbol::Magic => "Magic",
            CoreSymbol::Range => "Range",
            CoreSymbol::Kernel => "Kernel",
            CoreSymbol::Regexp => "Regexp",
            CoreSymbol::Module => "Module",
            CoreSymbol::Singleton => "Singleton",
            CoreSymbol::T => "T",
            CoreSymbol::THelpers => "T::Helpers",
        }
    }
}

/// Binding kind of an identifier whose symbol is not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    Local,
    Instance,
    Class,
    Global,
}

/// Flags on a [`Send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendFlags(u16);

impl SendFlags {
    /// Set when the receiver was implicit, so private methods are callable.
    pub const PRIVATE_OK: SendFlags = SendFlags(1 << 0);

    pub fn empty() -> Self {
        SendFlags(0)
    }

    pub fn contains(self, other: SendFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SendFlags {
    type Output = SendFlags;

    fn bitor(self, rhs: SendFlags) -> SendFlags {
        SendFlags(self.0 | rhs.0)
    }
}

/// Flags on a [`MethodDef`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodDefFlags {
    /// Defined with `def self.m`.
    pub self_method: bool,
    /// Synthesized by a rewrite pass rather than written by the user.
    pub rewriter_synthesized: bool,
}

/// Class or module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDefKind {
    Class,
    Module,
}

/// Decoded literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    String(NameRef),
    Symbol(NameRef),
    True,
    False,
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub loc: Loc,
    pub value: LiteralValue,
}

impl Literal {
    pub fn is_string(&self) -> bool {
        matches!(self.value, LiteralValue::String(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.value, LiteralValue::Symbol(_))
    }

    pub fn as_string(&self) -> Option<NameRef> {
        match self.value {
            LiteralValue::String(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<NameRef> {
        match self.value {
            LiteralValue::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub loc: Loc,
    pub name: NameRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedIdent {
    pub loc: Loc,
    pub kind: IdentKind,
    pub name: NameRef,
}

/// Constant access `scope::name` with the scope still an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedConstantLit {
    pub loc: Loc,
    pub scope: Box<Expr>,
    pub cnst: NameRef,
}

/// Constant already bound to a hard-wired symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantLit {
    pub loc: Loc,
    pub symbol: CoreSymbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelfRef {
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub loc: Loc,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Send {
    pub loc: Loc,
    pub recv: Box<Expr>,
    pub method: NameRef,
    pub args: Vec<Expr>,
    pub flags: SendFlags,
    pub block: Option<Box<Block>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub loc: Loc,
    pub args: Vec<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub loc: Loc,
    /// The `def` header itself, without the body.
    pub decl_loc: Loc,
    pub name: NameRef,
    pub args: Vec<Expr>,
    pub body: Box<Expr>,
    pub flags: MethodDefFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub loc: Loc,
    pub decl_loc: Loc,
    pub kind: ClassDefKind,
    pub name: Box<Expr>,
    pub ancestors: Vec<Expr>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub loc: Loc,
    pub cond: Box<Expr>,
    pub thenp: Box<Expr>,
    pub elsep: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub loc: Loc,
    pub cond: Box<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Break {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Next {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retry {
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rescue {
    pub loc: Loc,
    pub body: Box<Expr>,
    pub rescue_cases: Vec<RescueCase>,
    pub else_: Box<Expr>,
    pub ensure: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescueCase {
    pub loc: Loc,
    /// Normalized exception-class list.
    pub exceptions: Vec<Expr>,
    /// The bound variable; a fresh temporary when the source bound none.
    pub var: Box<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLit {
    pub loc: Loc,
    pub elems: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashLit {
    pub loc: Loc,
    pub keys: Vec<Expr>,
    pub values: Vec<Expr>,
}

/// Instruction sequence: statements plus a final expression whose value is
/// the sequence's value. Never empty; build through
/// [`builder::ins_seq`](builder::ins_seq), which collapses the empty case.
#[derive(Debug, Clone, PartialEq)]
pub struct InsSeq {
    pub loc: Loc,
    pub stats: Vec<Expr>,
    pub expr: Box<Expr>,
}

/// The absent expression.
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyTree {
    pub loc: Loc,
}

/// Marker for `super` with no explicit argument list; later phases forward
/// the enclosing method's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ZSuperArgs {
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
    pub default: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

/// A TAST expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Local(Local),
    UnresolvedIdent(UnresolvedIdent),
    UnresolvedConstantLit(UnresolvedConstantLit),
    ConstantLit(ConstantLit),
    SelfRef(SelfRef),
    Assign(Assign),
    Send(Send),
    Block(Block),
    MethodDef(MethodDef),
    ClassDef(ClassDef),
    If(If),
    While(While),
    Return(Return),
    Break(Break),
    Next(Next),
    Retry(Retry),
    Rescue(Rescue),
    RescueCase(RescueCase),
    Array(ArrayLit),
    Hash(HashLit),
    InsSeq(InsSeq),
    EmptyTree(EmptyTree),
    ZSuperArgs(ZSuperArgs),
    RestArg(RestArg),
    KeywordArg(KeywordArg),
    OptionalArg(OptionalArg),
    BlockArg(BlockArg),
    ShadowArg(ShadowArg),
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Literal(e) => e.loc,
            Expr::Local(e) => e.loc,
            Expr::UnresolvedIdent(e) => e.loc,
            Expr::UnresolvedConstantLit(e) => e.loc,
            Expr::ConstantLit(e) => e.loc,
            Expr::SelfRef(e) => e.loc,
            Expr::Assign(e) => e.loc,
            Expr::Send(e) => e.loc,
            Expr::Block(e) => e.loc,
            Expr::MethodDef(e) => e.loc,
            Expr::ClassDef(e) => e.loc,
            Expr::If(e) => e.loc,
            Expr::While(e) => e.loc,
            Expr::Return(e) => e.loc,
            Expr::Break(e) => e.loc,
            Expr::Next(e) => e.loc,
            Expr::Retry(e) => e.loc,
            Expr::Rescue(e) => e.loc,
            Expr::RescueCase(e) => e.loc,
            Expr::Array(e) => e.loc,
            Expr::Hash(e) => e.loc,
            Expr::InsSeq(e) => e.loc,
            Expr::EmptyTree(e) => e.loc,
            Expr::ZSuperArgs(e) => e.loc,
            Expr::RestArg(e) => e.loc,
            Expr::KeywordArg(e) => e.loc,
            Expr::OptionalArg(e) => e.loc,
            Expr::BlockArg(e) => e.loc,
            Expr::ShadowArg(e) => e.loc,
        }
    }

    pub fn is_empty_tree(&self) -> bool {
        matches!(self, Expr::EmptyTree(_))
    }

    pub fn is_self_ref(&self) -> bool {
        matches!(self, Expr::SelfRef(_))
    }

    /// Whether this expression is a reference form, i.e. a valid assignment
    /// target: a local, an unresolved identifier, or a constant access.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Expr::Local(_) | Expr::UnresolvedIdent(_) | Expr::UnresolvedConstantLit(_)
        )
    }

    pub fn as_string_lit(&self) -> Option<NameRef> {
        match self {
            Expr::Literal(lit) => lit.as_string(),
            _ => None,
        }
    }

    pub fn as_symbol_lit(&self) -> Option<NameRef> {
        match self {
            Expr::Literal(lit) => lit.as_symbol(),
            _ => None,
        }
    }

    /// Whether this is the hard-wired `Magic` pseudo-module.
    pub fn is_magic(&self) -> bool {
        matches!(
            self,
            Expr::ConstantLit(ConstantLit {
                symbol: CoreSymbol::Magic,
                ..
            })
        )
    }
}
