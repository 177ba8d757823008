//! Source locations.
//!
//! A [`Loc`] couples a file handle with a byte range. Synthetic nodes
//! produced by desugaring carry zero-length locations so IDE features
//! (hover, go-to-definition) skip them; a handful of nodes carry a
//! non-existent location when there is no source text at all to point at.

use std::fmt;
use text_size::{TextRange, TextSize};

/// A handle into the [`FileTable`](crate::source::FileTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    pub fn new(id: u32) -> Self {
        FileId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A byte range within a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loc {
    file: FileId,
    range: TextRange,
    present: bool,
}

impl Loc {
    /// A location covering `range` in `file`.
    pub fn new(file: FileId, range: TextRange) -> Self {
        Loc {
            file,
            range,
            present: true,
        }
    }

    /// A location covering `[start, end)` in `file`, in raw byte offsets.
    pub fn span(file: FileId, start: u32, end: u32) -> Self {
        Loc::new(
            file,
            TextRange::new(TextSize::from(start), TextSize::from(end)),
        )
    }

    /// The non-existent location for `file`. Used only where a node has no
    /// source text at all (e.g. a synthesized trailing block parameter).
    pub fn none(file: FileId) -> Self {
        Loc {
            file,
            range: TextRange::default(),
            present: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.present
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Collapse this location to a zero-length range at its start offset.
    ///
    /// Synthetic nodes inserted by desugaring use these so that mapping a
    /// text position back to a node never lands on them.
    pub fn with_zero_length(&self) -> Loc {
        Loc {
            file: self.file,
            range: TextRange::empty(self.range.start()),
            present: self.present,
        }
    }

    pub fn is_zero_length(&self) -> bool {
        self.present && self.range.is_empty()
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.present {
            write!(
                f,
                "file#{}:{}..{}",
                self.file.0,
                u32::from(self.range.start()),
                u32::from(self.range.end())
            )
        } else {
            write!(f, "file#{}:<none>", self.file.0)
        }
    }
}
