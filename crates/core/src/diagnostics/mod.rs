//! Diagnostic reporting for the desugar and rewrite passes.
//!
//! Diagnostics here are data; rendering them is the driver's concern. The
//! passes report through [`DiagnosticCollector::begin_error`], which hands
//! back a builder that commits its diagnostic when dropped. A `None` return
//! means the code is suppressed by user configuration and the caller skips
//! the (possibly expensive) message formatting entirely.

pub mod codes;

pub use codes::{ErrorCategory, ErrorCode, Severity};

use crate::loc::Loc;
use std::collections::HashSet;

/// A quick-fix attached to a diagnostic: replace `loc` with `replacement`.
#[derive(Debug, Clone)]
pub struct Autofix {
    pub label: String,
    pub loc: Loc,
    pub replacement: String,
}

/// A secondary location with an explanatory line.
#[derive(Debug, Clone)]
pub struct Note {
    pub loc: Loc,
    pub message: String,
}

/// A single reported problem.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub loc: Loc,
    /// Primary message (the "header").
    pub message: String,
    pub autofix: Option<Autofix>,
    pub notes: Vec<Note>,
}

/// Which error codes are silenced, per user configuration.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticConfig {
    suppressed: HashSet<ErrorCode>,
}

impl DiagnosticConfig {
    pub fn suppress(&mut self, code: ErrorCode) {
        self.suppressed.insert(code);
    }

    pub fn is_suppressed(&self, code: ErrorCode) -> bool {
        self.suppressed.contains(&code)
    }
}

/// Collector for batch reporting.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    config: DiagnosticConfig,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        DiagnosticCollector::default()
    }

    pub fn with_config(config: DiagnosticConfig) -> Self {
        DiagnosticCollector {
            config,
            ..DiagnosticCollector::default()
        }
    }

    /// Start building an error at `loc`. Returns `None` when `code` is
    /// suppressed; the diagnostic is committed when the builder drops.
    pub fn begin_error(&mut self, loc: Loc, code: ErrorCode) -> Option<ErrorBuilder<'_>> {
        if self.config.is_suppressed(code) {
            return None;
        }
        Some(ErrorBuilder {
            collector: self,
            diag: Some(Diagnostic {
                severity: code.severity(),
                code,
                loc,
                message: String::new(),
                autofix: None,
                notes: Vec::new(),
            }),
        })
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error | Severity::Fatal => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }
}

/// In-flight diagnostic. Commits to the collector on drop, so a bare
/// `begin_error(..)?.set_header(..)` is a complete report.
pub struct ErrorBuilder<'a> {
    collector: &'a mut DiagnosticCollector,
    diag: Option<Diagnostic>,
}

impl ErrorBuilder<'_> {
    pub fn set_header(&mut self, message: impl Into<String>) -> &mut Self {
        if let Some(diag) = self.diag.as_mut() {
            diag.message = message.into();
        }
        self
    }

    /// Attach a quick fix replacing `loc` with `replacement`.
    pub fn replace_with(
        &mut self,
        label: impl Into<String>,
        loc: Loc,
        replacement: impl Into<String>,
    ) -> &mut Self {
        if let Some(diag) = self.diag.as_mut() {
            diag.autofix = Some(Autofix {
                label: label.into(),
                loc,
                replacement: replacement.into(),
            });
        }
        self
    }

    /// Attach a secondary location with an explanatory line.
    pub fn add_error_line(&mut self, loc: Loc, message: impl Into<String>) -> &mut Self {
        if let Some(diag) = self.diag.as_mut() {
            diag.notes.push(Note {
                loc,
                message: message.into(),
            });
        }
        self
    }
}

impl Drop for ErrorBuilder<'_> {
    fn drop(&mut self) {
        if let Some(diag) = self.diag.take() {
            self.collector.report(diag);
        }
    }
}
