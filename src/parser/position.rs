use crate::parser::Span;

/// Source code position of an expression in a file
#[derive(Clone, Copy, Debug)]
pub enum Pos {
    No,
    Pos {
        from_offset: usize,
        from_line: usize,
        from_column: usize,
        upto_offset: usize,
        upto_line: usize,
        upto_column: usize,
    },
}

// Positions never affect the equality of the syntax carrying them.
impl PartialEq for Pos {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Pos {}

impl Pos {
    /// Construct a position from the difference of two Spans
    pub fn from_upto(from: Span<'_>, upto: Span<'_>) -> Self {
        Self::Pos {
            from_offset: from.location_offset(),
            from_line: from.location_line() as usize,
            from_column: from.get_utf8_column(),
            upto_offset: upto.location_offset(),
            upto_line: upto.location_line() as usize,
            upto_column: upto.get_utf8_column(),
        }
    }

    /// `line:column` of the start, for diagnostics.
    pub fn start(&self) -> Option<(usize, usize)> {
        match self {
            Self::No => None,
            Self::Pos {
                from_line,
                from_column,
                ..
            } => Some((*from_line, *from_column)),
        }
    }
}
