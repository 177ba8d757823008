//! The mutable context threaded through a compilation-unit pass.

use crate::diagnostics::{DiagnosticCollector, ErrorBuilder, ErrorCode};
use crate::loc::Loc;
use crate::names::NameTable;
use crate::source::FileTable;

/// Driver-level switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// When set, rewrite passes are skipped entirely.
    pub autogen: bool,
}

/// Everything a pass may touch: the name table, the file table, the
/// diagnostic stream, and driver switches. Single-threaded per compilation
/// unit; the driver serializes access when parallelizing across files.
pub struct Context<'a> {
    pub names: &'a mut NameTable,
    pub files: &'a FileTable,
    pub diagnostics: &'a mut DiagnosticCollector,
    pub config: Config,
}

impl<'a> Context<'a> {
    pub fn new(
        names: &'a mut NameTable,
        files: &'a FileTable,
        diagnostics: &'a mut DiagnosticCollector,
        config: Config,
    ) -> Self {
        Context {
            names,
            files,
            diagnostics,
            config,
        }
    }

    /// Start an error report at `loc`; `None` when the code is suppressed.
    pub fn begin_error(&mut self, loc: Loc, code: ErrorCode) -> Option<ErrorBuilder<'_>> {
        self.diagnostics.begin_error(loc, code)
    }
}
