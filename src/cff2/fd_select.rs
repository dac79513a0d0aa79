use crate::cff2::Table;
use crate::read::{LazyArray16, Reader};
use crate::remapper::Remapper;
use crate::write::Writer;
use crate::Error::{MalformedFont, SizeOverflow, SubsetError};
use crate::Result;
use rustc_hash::FxHashSet;

pub type FontDictRemapper = Remapper<u8, u8>;

/// The glyph to font dictionary mapping of the source table.
#[derive(Clone, Debug)]
pub(crate) enum FdSelect<'a> {
    Format0 { fds: LazyArray16<'a, u8>, raw: &'a [u8] },
    Format3 { raw: &'a [u8] },
}

impl<'a> FdSelect<'a> {
    pub fn parse(
        data: &'a [u8],
        offset: usize,
        number_of_glyphs: u16,
    ) -> Option<FdSelect<'a>> {
        let mut r = Reader::new_at(data, offset);
        match r.read::<u8>()? {
            0 => {
                let fds = r.read_array16::<u8>(number_of_glyphs)?;
                let raw = data.get(offset..r.offset())?;
                Some(FdSelect::Format0 { fds, raw })
            }
            3 => {
                let number_of_ranges = r.read::<u16>()?;
                let end = offset
                    .checked_add(3 + usize::from(number_of_ranges) * 3 + 2)?;
                let raw = data.get(offset..end)?;
                Some(FdSelect::Format3 { raw })
            }
            _ => None,
        }
    }

    /// Get the font dict index for a glyph.
    pub fn font_dict_index(&self, glyph_id: u16) -> Option<u8> {
        match self {
            FdSelect::Format0 { fds, .. } => fds.get(glyph_id),
            FdSelect::Format3 { raw } => {
                let mut r = Reader::new_at(raw, 1);
                let number_of_ranges = r.read::<u16>()?;
                if number_of_ranges == 0 {
                    return None;
                }

                // Including the sentinel range at the very end.
                let number_of_ranges = number_of_ranges.checked_add(1)?;

                let mut prev_first_glyph = r.read::<u16>()?;
                let mut prev_index = r.read::<u8>()?;
                for _ in 1..number_of_ranges {
                    let curr_first_glyph = r.read::<u16>()?;
                    if (prev_first_glyph..curr_first_glyph).contains(&glyph_id) {
                        return Some(prev_index);
                    } else if !r.at_end() {
                        prev_index = r.read::<u8>()?;
                    }

                    prev_first_glyph = curr_first_glyph;
                }

                None
            }
        }
    }

    /// The section bytes as they appear in the source table.
    pub fn raw(&self) -> &'a [u8] {
        match self {
            FdSelect::Format0 { raw, .. } => raw,
            FdSelect::Format3 { raw } => raw,
        }
    }
}

/// How the glyph to font dictionary mapping will appear in the output.
#[derive(Clone, Debug)]
pub(crate) enum FdSelectPlan<'a> {
    /// No dictionary was dropped, so the source bytes carry over unchanged.
    /// They still describe the source glyph count; consumers of unchanged
    /// dictionary layouts rely on this byte-identical form.
    Retained { raw: &'a [u8] },
    /// One dictionary index per glyph.
    Format0,
    /// Ranges of consecutive glyphs sharing a dictionary, stored as the
    /// positions in the subset list where a new range begins.
    Format3 { first_glyphs: Vec<u16> },
    /// Every glyph belongs to a single dictionary, so no table is written
    /// at all and its top dictionary operator disappears with it.
    Omitted,
}

impl FdSelectPlan<'_> {
    pub fn serialized_size(&self, num_glyphs: usize) -> usize {
        match self {
            FdSelectPlan::Retained { raw } => raw.len(),
            FdSelectPlan::Format0 => format0_size(num_glyphs),
            FdSelectPlan::Format3 { first_glyphs } => format3_size(first_glyphs.len()),
            FdSelectPlan::Omitted => 0,
        }
    }
}

/// Which font dictionaries survive, under which new indices, and how the
/// new association table is encoded.
pub(crate) struct FdSubset<'a> {
    pub remapper: FontDictRemapper,
    pub plan: FdSelectPlan<'a>,
}

pub(crate) fn plan_fd_subset<'a>(
    table: &Table<'a>,
    glyphs: &[u16],
) -> Result<FdSubset<'a>> {
    let orig_count = table.font_dicts.len() as u8;
    let mut remapper = FontDictRemapper::new();

    let Some(fd_select) = &table.fd_select else {
        // Without an FDSelect, every glyph belongs to font dictionary 0.
        remapper.remap(0);
        return Ok(FdSubset { remapper, plan: FdSelectPlan::Omitted });
    };

    let mut seen = FxHashSet::default();
    let mut first_glyphs = Vec::new();
    let mut prev_fd = None;
    for (new_gid, gid) in glyphs.iter().enumerate() {
        let fd = fd_select.font_dict_index(*gid).ok_or(MalformedFont)?;
        seen.insert(fd);

        if prev_fd != Some(fd) {
            first_glyphs.push(new_gid as u16);
            prev_fd = Some(fd);
        }
    }

    if seen.is_empty() {
        log::debug!("no font dictionary survives the glyph list");
        return Err(SubsetError);
    }

    if seen.len() == usize::from(orig_count) {
        // The retained table still references the source indices, so the
        // remapping must stay the identity.
        for fd in 0..orig_count {
            remapper.remap(fd);
        }
        let plan = FdSelectPlan::Retained { raw: fd_select.raw() };
        return Ok(FdSubset { remapper, plan });
    }

    // New indices are handed out in order of first appearance in the
    // subset list.
    for gid in glyphs {
        let fd = fd_select.font_dict_index(*gid).ok_or(MalformedFont)?;
        remapper.remap(fd);
    }

    let plan = if remapper.len() == 1 {
        FdSelectPlan::Omitted
    } else if format0_size(glyphs.len()) <= format3_size(first_glyphs.len()) {
        FdSelectPlan::Format0
    } else {
        FdSelectPlan::Format3 { first_glyphs }
    };

    Ok(FdSubset { remapper, plan })
}

pub(crate) fn write_fd_select(
    fd_select: &FdSelect,
    glyphs: &[u16],
    fds: &FdSubset,
    w: &mut Writer,
) -> Result<()> {
    match &fds.plan {
        FdSelectPlan::Retained { raw } => w.extend(raw),
        FdSelectPlan::Format0 => {
            w.write::<u8>(0);
            for gid in glyphs {
                let old = fd_select.font_dict_index(*gid).ok_or(MalformedFont)?;
                let new = fds.remapper.get(old).ok_or(SubsetError)?;
                w.write::<u8>(new);
            }
        }
        FdSelectPlan::Format3 { first_glyphs } => {
            w.write::<u8>(3);
            let number_of_ranges =
                u16::try_from(first_glyphs.len()).map_err(|_| SizeOverflow)?;
            w.write::<u16>(number_of_ranges);

            for first in first_glyphs {
                let gid = *glyphs.get(usize::from(*first)).ok_or(SubsetError)?;
                let old = fd_select.font_dict_index(gid).ok_or(MalformedFont)?;
                let new = fds.remapper.get(old).ok_or(SubsetError)?;
                w.write::<u16>(*first);
                w.write::<u8>(new);
            }

            // The sentinel range closes off the last real one.
            w.write::<u16>(u16::try_from(glyphs.len()).map_err(|_| SizeOverflow)?);
        }
        FdSelectPlan::Omitted => {}
    }

    Ok(())
}

fn format0_size(num_glyphs: usize) -> usize {
    1 + num_glyphs
}

fn format3_size(num_ranges: usize) -> usize {
    1 + 2 + num_ranges * 3 + 2
}
