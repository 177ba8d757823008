//! The compilation unit file table.
//!
//! The driver registers every file it parses here; the desugarer only ever
//! reads back paths, source text, the RBI flag, and line numbers (for the
//! `__LINE__` lowering).

use crate::loc::{FileId, Loc};

/// How a file participates in type checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Ordinary source code.
    Source,
    /// An interface-only file: type declarations, no executable method
    /// bodies. The desugarer enforces the "no code" rule for these.
    Rbi,
}

/// A single registered source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: String,
    text: String,
    kind: FileKind,
}

impl SourceFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.text
    }

    pub fn is_rbi(&self) -> bool {
        self.kind == FileKind::Rbi
    }
}

/// All files of the current compilation.
#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<SourceFile>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable::default()
    }

    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        text: impl Into<String>,
        kind: FileKind,
    ) -> FileId {
        let id = FileId::new(self.files.len() as u32);
        self.files.push(SourceFile {
            path: path.into(),
            text: text.into(),
            kind,
        });
        id
    }

    pub fn get(&self, id: FileId) -> &SourceFile {
        &self.files[id.as_u32() as usize]
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 1-based line number of the start of `loc`.
    pub fn line(&self, loc: Loc) -> u32 {
        let text = self.get(loc.file()).source();
        let offset = u32::from(loc.range().start()) as usize;
        let offset = offset.min(text.len());
        text[..offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1
    }
}
