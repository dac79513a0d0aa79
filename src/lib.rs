/*!
Reduces the glyph coverage of a font's CFF2 outline table.

# Example
In the example below, we keep only the glyphs with IDs 4, 9 and 23. The
glyphs are renumbered: position `i` in the list becomes glyph ID `i` in the
subsetted table.

```
// # fn main() -> Result<(), Box<dyn std::error::Error>> {
// // The raw CFF2 table, e.g. extracted from an OpenType font.
// let data = std::fs::read("fonts/NotoSansCJK.cff2")?;
//
// let table = cff2_subsetter::Table::parse(&data)?;
// let sub = cff2_subsetter::subset(&table, &[4, 9, 23])?;
//
// std::fs::write("target/NotoSansCJK-small.cff2", sub)?;
// # Ok(())
// # }
```

The subsetter rebuilds the whole table container: every index, dictionary
and offset is recomputed so that the output is a self-consistent CFF2 table.
Charstrings themselves are copied verbatim, so the glyph outlines are
bit-identical to the source. Wrapping the produced bytes back into an
OpenType font is the caller's job.
*/

#![deny(unsafe_code)]
#![deny(missing_docs)]

mod cff2;
mod read;
mod remapper;
mod write;

use std::fmt::{self, Display, Formatter};

pub use cff2::Table;

/// Subset a CFF2 table to the given glyphs.
///
/// `glyphs` is an ordered, deduplicated list of glyph IDs from the source
/// table; its order defines the glyph IDs of the subsetted table. Returns
/// the bytes of the new table.
pub fn subset(table: &Table<'_>, glyphs: &[u16]) -> Result<Vec<u8>> {
    cff2::subset(table, glyphs)
}

/// The result type for everything.
pub type Result<T> = std::result::Result<T, Error>;

/// Why subsetting failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// The source table was malformed, or a glyph in the subset list does
    /// not resolve inside it.
    MalformedFont,
    /// The glyph list left no font dictionary to keep.
    SubsetError,
    /// A computed size or offset did not fit its on-disk encoding.
    SizeOverflow,
    /// A section was not written at its planned position. This indicates a
    /// bug in the subsetter itself, never in the font.
    PlanViolation,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::MalformedFont => f.pad("malformed font"),
            Self::SubsetError => f.pad("no font dictionary survives the subset"),
            Self::SizeOverflow => f.pad("size does not fit its encoding"),
            Self::PlanViolation => f.pad("layout diverged from the plan"),
        }
    }
}

impl std::error::Error for Error {}
