mod dict;
mod fd_select;
mod index;
mod number;
mod operator;
mod plan;

use crate::cff2::dict::font_dict::{self, FontDict};
use crate::cff2::dict::top_dict::{self, TopDictData};
use crate::cff2::dict::private_dict;
use crate::cff2::fd_select::FdSelect;
use crate::cff2::index::{parse_index, serialize_index, Index};
use crate::cff2::plan::SubsetPlan;
use crate::read::Reader;
use crate::write::Writer;
use crate::Error::{MalformedFont, PlanViolation, SizeOverflow};
use crate::Result;

/// The size of the emitted CFF2 header: major and minor version, header
/// size, and the 16-bit top dictionary length.
pub(crate) const HEADER_SIZE: usize = 5;

/// A read-only structural view over a CFF2 table.
///
/// The view borrows the source bytes; nothing is copied until
/// [`subset`](crate::subset) produces the output table. Several subsetting
/// calls may share one view.
pub struct Table<'a> {
    pub(crate) top_dict: TopDictData<'a>,
    pub(crate) global_subrs: &'a [u8],
    pub(crate) var_store: Option<&'a [u8]>,
    pub(crate) fd_select: Option<FdSelect<'a>>,
    pub(crate) font_dicts: Vec<FontDict<'a>>,
    pub(crate) char_strings: Index<'a>,
    pub(crate) num_glyphs: u16,
}

impl<'a> Table<'a> {
    /// Parse a structural view over a raw CFF2 table.
    pub fn parse(data: &'a [u8]) -> Result<Table<'a>> {
        Self::parse_impl(data).ok_or(MalformedFont)
    }

    fn parse_impl(data: &'a [u8]) -> Option<Table<'a>> {
        let mut r = Reader::new(data);

        let major = r.read::<u8>()?;
        r.read::<u8>()?;
        let header_size = usize::from(r.read::<u8>()?);
        let top_dict_len = usize::from(r.read::<u16>()?);

        if major != 2 || header_size < HEADER_SIZE {
            return None;
        }

        let top_dict_data = data.get(header_size..header_size.checked_add(top_dict_len)?)?;
        let top_dict = top_dict::parse_top_dict(top_dict_data)?;

        // The global subroutine index starts right after the top dictionary.
        let global_subrs = {
            let mut r = Reader::new_at(data, header_size + top_dict_len);
            let start = r.offset();
            parse_index(&mut r)?;
            data.get(start..r.offset())?
        };

        let char_strings = {
            let mut r = Reader::new_at(data, top_dict.char_strings?);
            parse_index(&mut r)?
        };
        let num_glyphs = u16::try_from(char_strings.len()).ok()?;

        let var_store = match top_dict.var_store {
            Some(offset) => {
                let mut r = Reader::new_at(data, offset);
                let len = usize::from(r.read::<u16>()?);
                Some(data.get(offset..r.offset().checked_add(len)?)?)
            }
            None => None,
        };

        let fd_select = match top_dict.fd_select {
            Some(offset) => Some(FdSelect::parse(data, offset, num_glyphs)?),
            None => None,
        };

        let font_dicts = {
            let mut r = Reader::new_at(data, top_dict.fd_array?);
            let fd_array = parse_index(&mut r)?;
            let mut font_dicts = Vec::new();
            for font_dict_data in fd_array {
                font_dicts.push(font_dict::parse_font_dict(data, font_dict_data)?);
            }
            font_dicts
        };

        // Both FDSelect encodings address dictionaries with a single byte.
        if font_dicts.is_empty() || font_dicts.len() > 255 {
            return None;
        }

        Some(Table {
            top_dict,
            global_subrs,
            var_store,
            fd_select,
            font_dicts,
            char_strings,
            num_glyphs,
        })
    }

    /// The number of glyphs in the table.
    pub fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    /// The number of font dictionaries in the table.
    pub fn num_font_dicts(&self) -> u8 {
        self.font_dicts.len() as u8
    }

    /// The charstring bytes of a glyph.
    pub fn charstring(&self, glyph_id: u16) -> Option<&'a [u8]> {
        self.char_strings.get(u32::from(glyph_id))
    }
}

/// Plan the layout of the subsetted table, then emit every section at its
/// planned position.
pub(crate) fn subset(table: &Table<'_>, glyphs: &[u16]) -> Result<Vec<u8>> {
    let plan = SubsetPlan::create(table, glyphs).inspect_err(|e| {
        log::debug!("failed to plan the cff2 subset: {e}");
    })?;

    let mut w = Writer::with_capacity(plan.total_size);

    // Header.
    w.write::<u8>(2);
    w.write::<u8>(0);
    w.write::<u8>(HEADER_SIZE as u8);
    w.write::<u16>(u16::try_from(plan.offsets.top_dict.size).map_err(|_| SizeOverflow)?);

    check_section(&w, plan.offsets.top_dict.offset)?;
    top_dict::write_top_dict(&table.top_dict, &plan.offsets, &mut w)?;

    check_section(&w, plan.offsets.global_subrs.offset)?;
    w.extend(table.global_subrs);

    if let Some(info) = plan.offsets.var_store {
        check_section(&w, info.offset)?;
        w.extend(table.var_store.ok_or(MalformedFont)?);
    }

    if let Some(info) = plan.offsets.fd_select {
        check_section(&w, info.offset)?;
        let fd_select = table.fd_select.as_ref().ok_or(MalformedFont)?;
        fd_select::write_fd_select(fd_select, glyphs, &plan.fds, &mut w)?;
    }

    check_section(&w, plan.offsets.fd_array.offset)?;
    write_fd_array(table, &plan, &mut w)?;

    check_section(&w, plan.offsets.char_strings.offset)?;
    serialize_index(&mut w, plan.offsets.char_strings_offset_size, &plan.char_strings)?;

    check_section(&w, plan.offsets.private_dicts)?;
    for (dict, info) in table.font_dicts.iter().zip(&plan.private_dict_infos) {
        check_section(&w, info.offset)?;
        private_dict::write_private_dict(dict.private_dict, info.size, &mut w)?;

        if dict.subrs_offset.is_some() {
            // The local subroutine index follows its private dictionary
            // directly; a declared but missing index is a source defect.
            let subrs = dict.local_subrs.ok_or(MalformedFont)?;
            w.extend(subrs);
        }
    }

    if w.len() != plan.total_size {
        log::debug!("wrote {} bytes where the plan reserved {}", w.len(), plan.total_size);
        return Err(PlanViolation);
    }

    Ok(w.finish())
}

fn check_section(w: &Writer, planned: usize) -> Result<()> {
    if w.len() != planned {
        log::debug!("section starts at byte {} instead of planned {}", w.len(), planned);
        return Err(PlanViolation);
    }

    Ok(())
}

fn write_fd_array(table: &Table<'_>, plan: &SubsetPlan, w: &mut Writer) -> Result<()> {
    let mut entries = Vec::new();
    for old in plan.fds.remapper.sorted_iter() {
        let dict = table.font_dicts.get(usize::from(old)).ok_or(MalformedFont)?;
        let info = plan.private_dict_infos.get(usize::from(old)).ok_or(PlanViolation)?;

        let mut entry = Writer::new();
        font_dict::write_font_dict(dict, info, &mut entry)?;
        entries.push(entry.finish());
    }

    serialize_index(w, plan.offsets.fd_array_offset_size, &entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cff2::fd_select::FdSelectPlan;
    use crate::cff2::number::IntegerNumber;
    use crate::Error;

    /// Assembles a small CFF2 table: an empty global subroutine index, one
    /// private dictionary per font dictionary, and an optional format 0
    /// FDSelect and variation store.
    fn build_font(
        char_strings: &[&[u8]],
        num_fds: usize,
        fd_of_glyph: Option<&[u8]>,
        var_store: Option<&[u8]>,
        with_subrs: bool,
    ) -> Vec<u8> {
        let top_dict_size = 6
            + 7
            + if fd_of_glyph.is_some() { 7 } else { 0 }
            + if var_store.is_some() { 6 } else { 0 };

        let private_dict: Vec<u8> = if with_subrs {
            // StdHW 60, Subrs 4: the subroutines sit right after the dict.
            vec![199, 10, 143, 19]
        } else {
            vec![199, 10]
        };
        let local_subrs: Vec<u8> = vec![0, 0, 0, 1, 1, 1, 2, 0x0E];
        let subrs_len = if with_subrs { local_subrs.len() } else { 0 };
        let per_fd = private_dict.len() + subrs_len;

        // Each font dictionary entry: two 5-byte operands and the operator.
        let fd_entry_len = 11;
        let fd_array_len = 4 + 1 + (num_fds + 1) + fd_entry_len * num_fds;
        let char_strings_data: usize = char_strings.iter().map(|c| c.len()).sum();
        let char_strings_len = 4 + 1 + (char_strings.len() + 1) + char_strings_data;

        let var_store_offset = HEADER_SIZE + top_dict_size + 4;
        let fd_select_offset = var_store_offset + var_store.map_or(0, |v| 2 + v.len());
        let fd_array_offset = fd_select_offset + fd_of_glyph.map_or(0, |f| 1 + f.len());
        let char_strings_offset = fd_array_offset + fd_array_len;
        let private_offset = char_strings_offset + char_strings_len;

        let mut w = Writer::new();
        w.write::<u8>(2);
        w.write::<u8>(0);
        w.write::<u8>(HEADER_SIZE as u8);
        w.write::<u16>(top_dict_size as u16);

        let offset_entry = |w: &mut Writer, offset: usize, op: &[u8]| {
            IntegerNumber(offset as i32).write_as_5_bytes(w);
            w.extend(op);
        };

        offset_entry(&mut w, char_strings_offset, &[17]);
        offset_entry(&mut w, fd_array_offset, &[12, 36]);
        if fd_of_glyph.is_some() {
            offset_entry(&mut w, fd_select_offset, &[12, 37]);
        }
        if var_store.is_some() {
            offset_entry(&mut w, var_store_offset, &[24]);
        }

        // Empty global subroutine index.
        w.extend(&[0, 0, 0, 0]);

        if let Some(payload) = var_store {
            w.write::<u16>(payload.len() as u16);
            w.extend(payload);
        }

        if let Some(fds) = fd_of_glyph {
            assert_eq!(fds.len(), char_strings.len());
            w.write::<u8>(0);
            w.extend(fds);
        }

        w.write::<u32>(num_fds as u32);
        w.write::<u8>(1);
        for i in 0..=num_fds {
            w.write::<u8>((1 + i * fd_entry_len) as u8);
        }
        for i in 0..num_fds {
            IntegerNumber(private_dict.len() as i32).write_as_5_bytes(&mut w);
            IntegerNumber((private_offset + i * per_fd) as i32).write_as_5_bytes(&mut w);
            w.write::<u8>(18);
        }

        w.write::<u32>(char_strings.len() as u32);
        w.write::<u8>(1);
        let mut offset = 1u8;
        w.write::<u8>(offset);
        for char_string in char_strings {
            offset += char_string.len() as u8;
            w.write::<u8>(offset);
        }
        for char_string in char_strings {
            w.extend(char_string);
        }

        for _ in 0..num_fds {
            w.extend(&private_dict);
            if with_subrs {
                w.extend(&local_subrs);
            }
        }

        w.finish()
    }

    #[test]
    fn golden_single_dictionary() {
        let data = build_font(&[&[0x0E], &[0x14, 0x0E]], 1, None, None, false);
        let table = Table::parse(&data).unwrap();
        let sub = subset(&table, &[0, 1]).unwrap();

        #[rustfmt::skip]
        let expected = vec![
            // Header.
            2, 0, 5, 0, 13,
            // Top dictionary: CharStrings 38, FDArray 22.
            29, 0, 0, 0, 38, 17,
            29, 0, 0, 0, 22, 12, 36,
            // Empty global subroutine index.
            0, 0, 0, 0,
            // Font dictionary array.
            0, 0, 0, 1, 1, 1, 10,
            28, 0, 2, 29, 0, 0, 0, 49, 18,
            // Charstring index.
            0, 0, 0, 2, 1, 1, 2, 4, 0x0E, 0x14, 0x0E,
            // Private dictionary.
            199, 10,
        ];
        assert_eq!(sub, expected);
    }

    #[test]
    fn planned_offsets_match_layout() {
        let data = build_font(&[&[0x0E], &[0x14, 0x0E]], 1, None, None, false);
        let table = Table::parse(&data).unwrap();
        let plan = SubsetPlan::create(&table, &[0, 1]).unwrap();

        assert_eq!(plan.offsets.top_dict.offset, 5);
        assert_eq!(plan.offsets.top_dict.size, 13);
        assert_eq!(plan.offsets.global_subrs.offset, 18);
        assert_eq!(plan.offsets.fd_array.offset, 22);
        assert_eq!(plan.offsets.char_strings.offset, 38);
        assert_eq!(plan.offsets.private_dicts, 49);
        assert_eq!(plan.total_size, 51);

        let sub = subset(&table, &[0, 1]).unwrap();
        assert_eq!(sub.len(), plan.total_size);
    }

    #[test]
    fn charstrings_roundtrip() {
        let strings: &[&[u8]] = &[&[0x0A], &[0x0B, 0x0B], &[0x0C], &[0x0D], &[0x0E]];
        let data = build_font(strings, 2, Some(&[0, 0, 1, 1, 0]), None, false);
        let table = Table::parse(&data).unwrap();

        let glyphs = [4u16, 1, 2];
        let sub = subset(&table, &glyphs).unwrap();
        let sub_table = Table::parse(&sub).unwrap();

        assert_eq!(sub_table.num_glyphs(), glyphs.len() as u16);
        for (new_gid, old_gid) in glyphs.iter().enumerate() {
            assert_eq!(
                sub_table.charstring(new_gid as u16).unwrap(),
                table.charstring(*old_gid).unwrap(),
            );
        }
    }

    #[test]
    fn unchanged_dictionaries_carry_the_table_over() {
        let strings: &[&[u8]] = &[&[0x0A], &[0x0B], &[0x0C], &[0x0D], &[0x0E]];
        let fd_of_glyph = [0u8, 0, 1, 1, 0];
        let data = build_font(strings, 2, Some(&fd_of_glyph), None, false);
        let table = Table::parse(&data).unwrap();

        // Glyphs 0, 2 and 4 touch both dictionaries, so nothing is dropped.
        let glyphs = [0u16, 2, 4];
        let plan = SubsetPlan::create(&table, &glyphs).unwrap();

        assert!(matches!(plan.fds.plan, FdSelectPlan::Retained { .. }));
        assert_eq!(plan.fds.remapper.get(0), Some(0));
        assert_eq!(plan.fds.remapper.get(1), Some(1));

        // The original bytes, still sized for five glyphs, carry over.
        let sub = subset(&table, &glyphs).unwrap();
        let info = plan.offsets.fd_select.unwrap();
        assert_eq!(info.size, 1 + strings.len());
        assert_eq!(&sub[info.offset..info.offset + info.size], &[0, 0, 0, 1, 1, 0]);

        let sub_table = Table::parse(&sub).unwrap();
        assert_eq!(sub_table.num_font_dicts(), 2);
    }

    #[test]
    fn dropped_dictionary_omits_the_table() {
        let strings: &[&[u8]] = &[&[0x0A], &[0x0B], &[0x0C], &[0x0D], &[0x0E]];
        let data = build_font(strings, 2, Some(&[0, 0, 1, 1, 0]), None, false);
        let table = Table::parse(&data).unwrap();

        // Both glyphs belong to dictionary 0, so dictionary 1 is dropped and
        // no association table is needed at all.
        let glyphs = [0u16, 1];
        let plan = SubsetPlan::create(&table, &glyphs).unwrap();
        assert!(matches!(plan.fds.plan, FdSelectPlan::Omitted));
        assert_eq!(plan.offsets.fd_select, None);
        assert_eq!(plan.fds.remapper.get(0), Some(0));
        assert_eq!(plan.fds.remapper.get(1), None);

        let sub = subset(&table, &glyphs).unwrap();
        let sub_table = Table::parse(&sub).unwrap();
        assert!(sub_table.fd_select.is_none());
        assert!(sub_table.top_dict.fd_select.is_none());
        assert_eq!(sub_table.num_font_dicts(), 1);
    }

    #[test]
    fn remap_follows_first_appearance() {
        let strings: &[&[u8]] = &[&[0x0A], &[0x0B], &[0x0C], &[0x0D], &[0x0E]];
        let data = build_font(strings, 3, Some(&[0, 1, 2, 0, 2]), None, false);
        let table = Table::parse(&data).unwrap();

        // Dictionary 2 is met first, dictionary 0 never.
        let glyphs = [4u16, 1];
        let plan = SubsetPlan::create(&table, &glyphs).unwrap();
        assert_eq!(plan.fds.remapper.get(2), Some(0));
        assert_eq!(plan.fds.remapper.get(1), Some(1));
        assert_eq!(plan.fds.remapper.get(0), None);
        assert!(matches!(plan.fds.plan, FdSelectPlan::Format0));

        let sub = subset(&table, &glyphs).unwrap();
        let info = plan.offsets.fd_select.unwrap();
        assert_eq!(&sub[info.offset..info.offset + info.size], &[0, 0, 1]);

        // All three private dictionaries are still reserved in the output.
        let sub_table = Table::parse(&sub).unwrap();
        assert_eq!(sub_table.num_font_dicts(), 2);
        assert_eq!(plan.private_dict_infos.len(), 3);
    }

    #[test]
    fn long_runs_prefer_the_range_list() {
        let strings: Vec<Vec<u8>> = (0..19u8).map(|i| vec![0x80 + i]).collect();
        let strings: Vec<&[u8]> = strings.iter().map(|v| v.as_slice()).collect();
        let mut fd_of_glyph = [0u8; 19];
        for fd in fd_of_glyph.iter_mut().skip(10) {
            *fd = 1;
        }
        // A third dictionary that no glyph references forces re-encoding.
        let data = build_font(&strings, 3, Some(&fd_of_glyph), None, false);
        let table = Table::parse(&data).unwrap();

        let glyphs: Vec<u16> = (0..19).collect();
        let plan = SubsetPlan::create(&table, &glyphs).unwrap();
        assert!(matches!(plan.fds.plan, FdSelectPlan::Format3 { .. }));

        let sub = subset(&table, &glyphs).unwrap();
        let info = plan.offsets.fd_select.unwrap();
        assert_eq!(info.size, 11);
        assert_eq!(
            &sub[info.offset..info.offset + info.size],
            &[3, 0, 2, 0, 0, 0, 0, 10, 1, 0, 19],
        );
    }

    #[test]
    fn variation_store_passes_through() {
        let payload = [7u8, 7, 7, 7];
        let data =
            build_font(&[&[0x0E], &[0x0E]], 1, None, Some(&payload), false);
        let table = Table::parse(&data).unwrap();

        let plan = SubsetPlan::create(&table, &[1]).unwrap();
        let sub = subset(&table, &[1]).unwrap();

        let info = plan.offsets.var_store.unwrap();
        assert_eq!(&sub[info.offset..info.offset + info.size], &[0, 4, 7, 7, 7, 7]);
    }

    #[test]
    fn local_subrs_follow_their_private_dict() {
        let data = build_font(&[&[0x0E], &[0x0E]], 1, None, None, true);
        let table = Table::parse(&data).unwrap();
        let source_subrs = table.font_dicts[0].local_subrs.unwrap().to_vec();

        let sub = subset(&table, &[0]).unwrap();
        let sub_table = Table::parse(&sub).unwrap();
        let dict = &sub_table.font_dicts[0];

        // The subroutine offset equals the rewritten dictionary's own size.
        assert_eq!(dict.subrs_offset, Some(dict.private_dict.len()));
        assert_eq!(dict.private_dict, &[199, 10, 28, 0, 6, 19]);
        assert_eq!(dict.local_subrs.unwrap(), source_subrs.as_slice());
    }

    #[test]
    fn empty_subset_fails() {
        let data = build_font(&[&[0x0E]], 1, None, None, false);
        let table = Table::parse(&data).unwrap();
        assert_eq!(subset(&table, &[]), Err(Error::SubsetError));
    }

    #[test]
    fn unknown_glyph_fails() {
        let data = build_font(&[&[0x0E], &[0x0E]], 1, None, None, false);
        let table = Table::parse(&data).unwrap();
        assert_eq!(subset(&table, &[0, 2]), Err(Error::MalformedFont));
    }

    #[test]
    fn rejects_foreign_data() {
        assert!(matches!(Table::parse(&[]), Err(Error::MalformedFont)));
        assert!(matches!(Table::parse(&[1, 0, 4, 0, 0]), Err(Error::MalformedFont)));
        let truncated = build_font(&[&[0x0E]], 1, None, None, false);
        assert!(matches!(Table::parse(&truncated[..20]), Err(Error::MalformedFont)));
    }
}
