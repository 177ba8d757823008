//! Reef core: the desugaring front end of a static type checker for a
//! dynamically-typed, object-oriented scripting language.
//!
//! The upstream parser hands over a concrete parse tree of roughly seventy
//! node kinds; this crate lowers it into the much smaller canonical TAST
//! that name resolution, CFG construction, and inference consume:
//!
//! - [`parse`] — the parse-tree vocabulary (input, consumed by move)
//! - [`ast`] — the TAST and its constructor layer
//! - [`names`] — interned identifiers and fresh-name allocation
//! - [`desugar`] — the lowering engine and top-level lift
//! - [`verifier`] — structural invariants of the lowered tree
//! - [`diagnostics`] — error codes, collector, and the builder interface
//!
//! # Example
//!
//! ```
//! use reef_core::context::{Config, Context};
//! use reef_core::diagnostics::DiagnosticCollector;
//! use reef_core::loc::Loc;
//! use reef_core::names::NameTable;
//! use reef_core::parse::Node;
//! use reef_core::source::{FileKind, FileTable};
//!
//! let mut names = NameTable::new();
//! let mut files = FileTable::new();
//! let mut diagnostics = DiagnosticCollector::new();
//! let file = files.add_file("demo", "x", FileKind::Source);
//!
//! let x = names.intern("x");
//! let unit = Node::LVar { loc: Loc::span(file, 0, 1), name: x };
//!
//! let mut ctx = Context::new(&mut names, &files, &mut diagnostics, Config::default());
//! let tast = reef_core::desugar::lower(&mut ctx, unit).unwrap();
//! assert!(matches!(tast, reef_core::ast::Expr::ClassDef(_)));
//! ```
//!
//! Concurrency: the core is single-threaded per compilation unit. The name
//! table is the only shared mutable resource; drivers that parallelize
//! across files go through [`names::SharedNameTable`], which serializes
//! allocation.

pub mod ast;
pub mod context;
pub mod desugar;
pub mod diagnostics;
pub mod loc;
pub mod names;
pub mod parse;
pub mod source;
pub mod verifier;

pub use ast::{builder, Expr};
pub use context::{Config, Context};
pub use diagnostics::{Diagnostic, DiagnosticCollector, ErrorCode, Severity};
pub use loc::{FileId, Loc};
pub use names::{NameRef, NameTable, SharedNameTable, UniqueKind};
pub use parse::Node;
pub use source::{FileKind, FileTable};
