//! The concrete parse tree handed over by the upstream parser.
//!
//! This is the input vocabulary of the desugar pass: one variant per
//! surface construct, children owned through `Box`/`Vec`. The desugarer
//! consumes nodes by value and never retains them. Numeric literals carry
//! their textual form (separators and sign markers included); decoding is
//! the desugarer's job.

use crate::loc::Loc;
use crate::names::NameRef;

/// A parse-tree node. Every variant carries the `Loc` of the source text it
/// was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ===== Literals =====
    Nil { loc: Loc },
    True { loc: Loc },
    False { loc: Loc },
    Integer { loc: Loc, val: String },
    Float { loc: Loc, val: String },
    Rational { loc: Loc, val: String },
    Complex { loc: Loc, val: String },
    String { loc: Loc, val: NameRef },
    /// Interpolated string: literal and expression parts in order.
    DString { loc: Loc, nodes: Vec<Node> },
    Symbol { loc: Loc, val: NameRef },
    /// Interpolated symbol.
    DSymbol { loc: Loc, nodes: Vec<Node> },
    /// Backtick command string, possibly interpolated.
    XString { loc: Loc, nodes: Vec<Node> },
    Regexp { loc: Loc, regex: Vec<Node>, opts: Option<Box<Node>> },
    /// Regexp option characters (`imxnesu`).
    Regopt { loc: Loc, opts: String },
    FileLiteral { loc: Loc },
    LineLiteral { loc: Loc },
    EncodingLiteral { loc: Loc },

    // ===== Variables =====
    LVar { loc: Loc, name: NameRef },
    IVar { loc: Loc, name: NameRef },
    GVar { loc: Loc, name: NameRef },
    CVar { loc: Loc, name: NameRef },
    /// Numbered regexp capture reference (`$1`, `$2`, …).
    NthRef { loc: Loc, nth: u32 },
    /// Named back-reference (`` $` ``, `$'`, …).
    Backref { loc: Loc, name: NameRef },
    LVarLhs { loc: Loc, name: NameRef },
    IVarLhs { loc: Loc, name: NameRef },
    GVarLhs { loc: Loc, name: NameRef },
    CVarLhs { loc: Loc, name: NameRef },

    // ===== Constants =====
    Const { loc: Loc, scope: Option<Box<Node>>, name: NameRef },
    ConstLhs { loc: Loc, scope: Option<Box<Node>>, name: NameRef },
    /// Explicit root scope prefix (`::`).
    Cbase { loc: Loc },
    Self_ { loc: Loc },

    // ===== Calls =====
    Send {
        loc: Loc,
        receiver: Option<Box<Node>>,
        method: NameRef,
        args: Vec<Node>,
    },
    /// Safe navigation call (`a&.m`).
    CSend {
        loc: Loc,
        receiver: Box<Node>,
        method: NameRef,
        args: Vec<Node>,
    },
    /// `&expr` in an argument list.
    BlockPass { loc: Loc, block: Box<Node> },
    /// A call with a literal block attached.
    Block {
        loc: Loc,
        send: Box<Node>,
        args: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    Super { loc: Loc, args: Vec<Node> },
    ZSuper { loc: Loc },
    Yield { loc: Loc, exprs: Vec<Node> },

    // ===== Assignment =====
    Assign { loc: Loc, lhs: Box<Node>, rhs: Box<Node> },
    OpAsgn {
        loc: Loc,
        lhs: Box<Node>,
        op: NameRef,
        rhs: Box<Node>,
    },
    AndAsgn { loc: Loc, lhs: Box<Node>, rhs: Box<Node> },
    OrAsgn { loc: Loc, lhs: Box<Node>, rhs: Box<Node> },
    /// Multiple assignment (`a, b = rhs`); `lhs` is always an `Mlhs`.
    Masgn { loc: Loc, lhs: Box<Node>, rhs: Box<Node> },
    Mlhs { loc: Loc, exprs: Vec<Node> },
    /// `*var` on the assignment side; `None` for a bare `*`.
    SplatLhs { loc: Loc, var: Option<Box<Node>> },
    /// `*expr` on the call or literal side.
    Splat { loc: Loc, var: Box<Node> },

    // ===== Sequencing =====
    Begin { loc: Loc, stmts: Vec<Node> },
    /// `begin … end` keyword block (distinct for post-test loop lowering).
    Kwbegin { loc: Loc, stmts: Vec<Node> },

    // ===== Control flow =====
    If {
        loc: Loc,
        cond: Box<Node>,
        then_: Option<Box<Node>>,
        else_: Option<Box<Node>>,
    },
    While { loc: Loc, cond: Box<Node>, body: Option<Box<Node>> },
    WhilePost { loc: Loc, cond: Box<Node>, body: Box<Node> },
    Until { loc: Loc, cond: Box<Node>, body: Option<Box<Node>> },
    UntilPost { loc: Loc, cond: Box<Node>, body: Box<Node> },
    For {
        loc: Loc,
        vars: Box<Node>,
        expr: Box<Node>,
        body: Option<Box<Node>>,
    },
    Case {
        loc: Loc,
        condition: Option<Box<Node>>,
        whens: Vec<Node>,
        else_: Option<Box<Node>>,
    },
    When {
        loc: Loc,
        patterns: Vec<Node>,
        body: Option<Box<Node>>,
    },
    Return { loc: Loc, exprs: Vec<Node> },
    Break { loc: Loc, exprs: Vec<Node> },
    Next { loc: Loc, exprs: Vec<Node> },
    Retry { loc: Loc },
    Redo { loc: Loc },
    Rescue {
        loc: Loc,
        body: Option<Box<Node>>,
        rescue: Vec<Node>,
        else_: Option<Box<Node>>,
    },
    /// One `rescue Klass => e` clause.
    Resbody {
        loc: Loc,
        exception: Option<Box<Node>>,
        var: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    Ensure {
        loc: Loc,
        body: Option<Box<Node>>,
        ensure: Option<Box<Node>>,
    },

    // ===== Definitions =====
    Module {
        loc: Loc,
        decl_loc: Loc,
        name: Box<Node>,
        body: Option<Box<Node>>,
    },
    Class {
        loc: Loc,
        decl_loc: Loc,
        name: Box<Node>,
        superclass: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    /// `class << expr` singleton class body.
    SClass {
        loc: Loc,
        decl_loc: Loc,
        expr: Box<Node>,
        body: Option<Box<Node>>,
    },
    DefMethod {
        loc: Loc,
        decl_loc: Loc,
        name: NameRef,
        args: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    /// `def expr.m`; only `expr == self` is supported.
    DefS {
        loc: Loc,
        decl_loc: Loc,
        singleton: Box<Node>,
        name: NameRef,
        args: Option<Box<Node>>,
        body: Option<Box<Node>>,
    },
    Args { loc: Loc, args: Vec<Node> },
    Arg { loc: Loc, name: NameRef },
    Restarg { loc: Loc, name: NameRef, name_loc: Loc },
    Kwarg { loc: Loc, name: NameRef },
    Kwoptarg {
        loc: Loc,
        name: NameRef,
        name_loc: Loc,
        default: Box<Node>,
    },
    Optarg {
        loc: Loc,
        name: NameRef,
        name_loc: Loc,
        default: Box<Node>,
    },
    Kwrestarg { loc: Loc, name: NameRef },
    Blockarg { loc: Loc, name: NameRef },
    Shadowarg { loc: Loc, name: NameRef },

    // ===== Containers =====
    Array { loc: Loc, elts: Vec<Node> },
    Hash { loc: Loc, pairs: Vec<Node> },
    Pair { loc: Loc, key: Box<Node>, value: Box<Node> },
    /// `**expr` inside a hash literal.
    Kwsplat { loc: Loc, expr: Box<Node> },
    IRange {
        loc: Loc,
        from: Option<Box<Node>>,
        to: Option<Box<Node>>,
    },
    ERange {
        loc: Loc,
        from: Option<Box<Node>>,
        to: Option<Box<Node>>,
    },

    // ===== Short-circuit logic =====
    And { loc: Loc, left: Box<Node>, right: Box<Node> },
    Or { loc: Loc, left: Box<Node>, right: Box<Node> },

    // ===== Misc =====
    Alias { loc: Loc, from: Box<Node>, to: Box<Node> },
    Defined { loc: Loc, value: Box<Node> },
    Undef { loc: Loc, exprs: Vec<Node> },
    Preexe { loc: Loc, body: Option<Box<Node>> },
    Postexe { loc: Loc, body: Option<Box<Node>> },
    IFlipflop {
        loc: Loc,
        left: Option<Box<Node>>,
        right: Option<Box<Node>>,
    },
    EFlipflop {
        loc: Loc,
        left: Option<Box<Node>>,
        right: Option<Box<Node>>,
    },
    /// Bare regexp in condition position (`if /re/`).
    MatchCurLine { loc: Loc, cond: Box<Node> },
}

impl Node {
    pub fn loc(&self) -> Loc {
        use Node::*;
        match self {
            Nil { loc }
            | True { loc }
            | False { loc }
            | Integer { loc, .. }
            | Float { loc, .. }
            | Rational { loc, .. }
            | Complex { loc, .. }
            | String { loc, .. }
            | DString { loc, .. }
            | Symbol { loc, .. }
            | DSymbol { loc, .. }
            | XString { loc, .. }
            | Regexp { loc, .. }
            | Regopt { loc, .. }
            | FileLiteral { loc }
            | LineLiteral { loc }
            | EncodingLiteral { loc }
            | LVar { loc, .. }
            | IVar { loc, .. }
            | GVar { loc, .. }
            | CVar { loc, .. }
            | NthRef { loc, .. }
            | Backref { loc, .. }
            | LVarLhs { loc, .. }
            | IVarLhs { loc, .. }
            | GVarLhs { loc, .. }
            | CVarLhs { loc, .. }
            | Const { loc, .. }
            | ConstLhs { loc, .. }
            | Cbase { loc }
            | Self_ { loc }
            | Send { loc, .. }
            | CSend { loc, .. }
            | BlockPass { loc, .. }
            | Block { loc, .. }
            | Super { loc, .. }
            | ZSuper { loc }
            | Yield { loc, .. }
            | Assign { loc, .. }
            | OpAsgn { loc, .. }
            | AndAsgn { loc, .. }
            | OrAsgn { loc, .. }
            | Masgn { loc, .. }
            | Mlhs { loc, .. }
            | SplatLhs { loc, .. }
            | Splat { loc, .. }
            | Begin { loc, .. }
            | Kwbegin { loc, .. }
            | If { loc, .. }
            | While { loc, .. }
            | WhilePost { loc, .. }
            | Until { loc, .. }
            | UntilPost { loc, .. }
            | For { loc, .. }
            | Case { loc, .. }
            | When { loc, .. }
            | Return { loc, .. }
            | Break { loc, .. }
            | Next { loc, .. }
            | Retry { loc }
            | Redo { loc }
            | Rescue { loc, .. }
            | Resbody { loc, .. }
            | Ensure { loc, .. }
            | Module { loc, .. }
            | Class { loc, .. }
            | SClass { loc, .. }
            | DefMethod { loc, .. }
            | DefS { loc, .. }
            | Args { loc, .. }
            | Arg { loc, .. }
            | Restarg { loc, .. }
            | Kwarg { loc, .. }
            | Kwoptarg { loc, .. }
            | Optarg { loc, .. }
            | Kwrestarg { loc, .. }
            | Blockarg { loc, .. }
            | Shadowarg { loc, .. }
            | Array { loc, .. }
            | Hash { loc, .. }
            | Pair { loc, .. }
            | Kwsplat { loc, .. }
            | IRange { loc, .. }
            | ERange { loc, .. }
            | And { loc, .. }
            | Or { loc, .. }
            | Alias { loc, .. }
            | Defined { loc, .. }
            | Undef { loc, .. }
            | Preexe { loc, .. }
            | Postexe { loc, .. }
            | IFlipflop { loc, .. }
            | EFlipflop { loc, .. }
            | MatchCurLine { loc, .. } => *loc,
        }
    }

    /// The surface-facing name of this node kind, for diagnostics.
    pub fn node_name(&self) -> &'static str {
        use Node::*;
        match self {
            Nil { .. } => "Nil",
            True { .. } => "True",
            False { .. } => "False",
            Integer { .. } => "Integer",
            Float { .. } => "Float",
            Rational { .. } => "Rational",
            Complex { .. } => "Complex",
            String { .. } => "String",
            DString { .. } => "DString",
            Symbol { .. } => "Symbol",
            DSymbol { .. } => "DSymbol",
            XString { .. } => "XString",
            Regexp { .. } => "Regexp",
            Regopt { .. } => "Regopt",
            FileLiteral { .. } => "FileLiteral",
            LineLiteral { .. } => "LineLiteral",
            EncodingLiteral { .. } => "EncodingLiteral",
            LVar { .. } => "LVar",
            IVar { .. } => "IVar",
            GVar { .. } => "GVar",
            CVar { .. } => "CVar",
            NthRef { .. } => "NthRef",
            Backref { .. } => "Backref",
            LVarLhs { .. } => "LVarLhs",
            IVarLhs { .. } => "IVarLhs",
            GVarLhs { .. } => "GVarLhs",
            CVarLhs { .. } => "CVarLhs",
            Const { .. } => "Const",
            ConstLhs { .. } => "ConstLhs",
            Cbase { .. } => "Cbase",
            Self_ { .. } => "Self",
            Send { .. } => "Send",
            CSend { .. } => "CSend",
            BlockPass { .. } => "BlockPass",
            Block { .. } => "Block",
            Super { .. } => "Super",
            ZSuper { .. } => "ZSuper",
            Yield { .. } => "Yield",
            Assign { .. } => "Assign",
            OpAsgn { .. } => "OpAsgn",
            AndAsgn { .. } => "AndAsgn",
            OrAsgn { .. } => "OrAsgn",
            Masgn { .. } => "Masgn",
            Mlhs { .. } => "Mlhs",
            SplatLhs { .. } => "SplatLhs",
            Splat { .. } => "Splat",
            Begin { .. } => "Begin",
            Kwbegin { .. } => "Kwbegin",
            If { .. } => "If",
            While { .. } => "While",
            WhilePost { .. } => "WhilePost",
            Until { .. } => "Until",
            UntilPost { .. } => "UntilPost",
            For { .. } => "For",
            Case { .. } => "Case",
            When { .. } => "When",
            Return { .. } => "Return",
            Break { .. } => "Break",
            Next { .. } => "Next",
            Retry { .. } => "Retry",
            Redo { .. } => "Redo",
            Rescue { .. } => "Rescue",
            Resbody { .. } => "Resbody",
            Ensure { .. } => "Ensure",
            Module { .. } => "Module",
            Class { .. } => "Class",
            SClass { .. } => "SClass",
            DefMethod { .. } => "DefMethod",
            DefS { .. } => "DefS",
            Args { .. } => "Args",
            Arg { .. } => "Arg",
            Restarg { .. } => "Restarg",
            Kwarg { .. } => "Kwarg",
            Kwoptarg { .. } => "Kwoptarg",
            Optarg { .. } => "Optarg",
            Kwrestarg { .. } => "Kwrestarg",
            Blockarg { .. } => "Blockarg",
            Shadowarg { .. } => "Shadowarg",
            Array { .. } => "Array",
            Hash { .. } => "Hash",
            Pair { .. } => "Pair",
            Kwsplat { .. } => "Kwsplat",
            IRange { .. } => "IRange",
            ERange { .. } => "ERange",
            And { .. } => "And",
            Or { .. } => "Or",
            Alias { .. } => "Alias",
            Defined { .. } => "Defined",
            Undef { .. } => "Undef",
            Preexe { .. } => "Preexe",
            Postexe { .. } => "Postexe",
            IFlipflop { .. } => "IFlipflop",
            EFlipflop { .. } => "EFlipflop",
            MatchCurLine { .. } => "MatchCurLine",
        }
    }
}
