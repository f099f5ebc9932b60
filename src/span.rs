use miette::SourceSpan;

/// Position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u16,
}

impl Span {
    pub fn new(start: Idx, len: u16) -> Self {
        Span { start, len }
    }

    /// Span covering `len` bytes starting at byte offset `offs`.
    pub fn at(offs: usize, len: usize) -> Self {
        Span {
            start: Idx(offs as u32),
            len: len.min(u16::MAX as usize) as u16,
        }
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offs() + self.len()
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.offs()..self.end()
    }

    /// Smallest span containing both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        let start = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        Span::at(start, end - start)
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(value: Span) -> Self {
        value.as_range()
    }
}
