use miette::{SourceOffset, SourceSpan};
use std::cmp::{max, min};
use std::fmt;
use std::ops::Range;

/// Compact index of a byte in the preprocessed source code.
pub type SourcePosition = u32;

/// A span represents a range of bytes in an input string.
///
/// It has the same semantics as Rust's x..y range syntax.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Span {
    pub low: SourcePosition,
    pub high: SourcePosition,
}

impl From<Span> for SourceSpan {
    fn from(val: Span) -> Self {
        SourceSpan::new(
            SourceOffset::from(val.low as usize),
            val.high as usize - val.low as usize,
        )
    }
}

impl Span {
    /// Create a new span from the low and high positions.
    pub fn new(range: Range<SourcePosition>) -> Self {
        Self {
            low: range.start,
            high: range.end,
        }
    }

    /// Create a new span from a single position.
    pub fn pos(low: SourcePosition) -> Self {
        Self { low, high: low + 1 }
    }

    /// Create a new span from two positions.
    pub fn from_pair(low: &Span, high: &Span) -> Self {
        low.merge(high)
    }

    pub fn empty() -> Self {
        Self { low: 0, high: 0 }
    }

    /// Get the union of two spans.
    ///
    /// This is equivalent to `min(self.low, other.low)..max(self.high, other.high)`. This method is
    /// particularly useful when combining spans from two relevant tokens.
    ///
    /// ```
    /// use cwasm_span::Span;
    ///
    /// let a = Span::new(0..10);
    /// let b = Span::new(5..15);
    /// let c = a.merge(&b);
    /// assert_eq!(c, Span::new(0..15));
    /// ```
    pub fn merge(&self, other: &Self) -> Self {
        let low = min(self.low, other.low);
        let high = max(self.high, other.high);
        Self { low, high }
    }

    /// Resolve the start of the span into a human-readable line and column.
    pub fn location(&self, source: &str) -> SourceLocation {
        SourceLocation::of(source, self.low)
    }
}

impl From<Range<SourcePosition>> for Span {
    fn from(range: Range<SourcePosition>) -> Self {
        Self::new(range)
    }
}

/// One-based line and column of a position in a source text.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn of(source: &str, pos: SourcePosition) -> Self {
        let mut line = 1;
        let mut column = 1;
        for ch in source.bytes().take(pos as usize) {
            if ch == b'\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use crate::{SourceLocation, Span};

    #[test]
    fn test_location_counts_lines() {
        let source = "int a;\nint b;\n  int c;";
        assert_eq!(Span::pos(0).location(source), SourceLocation { line: 1, column: 1 });
        assert_eq!(Span::pos(11).location(source), SourceLocation { line: 2, column: 5 });
        assert_eq!(Span::pos(16).location(source).to_string(), "3:3");
    }
}
