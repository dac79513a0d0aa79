use crate::cff2::dict::{font_dict, private_dict, top_dict};
use crate::cff2::fd_select::{self, FdSelectPlan, FdSubset};
use crate::cff2::index::{self, calc_offset_size, OffsetSize};
use crate::cff2::{Table, HEADER_SIZE};
use crate::Error::{MalformedFont, SizeOverflow, SubsetError};
use crate::Result;

/// Position and extent of one section of the output table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TableInfo {
    pub offset: usize,
    pub size: usize,
}

/// The byte layout of every section of the output table, in the order in
/// which they are emitted.
#[derive(Clone, Debug)]
pub(crate) struct SectionOffsets {
    pub top_dict: TableInfo,
    pub global_subrs: TableInfo,
    pub var_store: Option<TableInfo>,
    pub fd_select: Option<TableInfo>,
    pub fd_array: TableInfo,
    pub fd_array_offset_size: OffsetSize,
    pub char_strings: TableInfo,
    pub char_strings_offset_size: OffsetSize,
    pub private_dicts: usize,
}

/// Everything the writer needs to emit the subsetted table: the position of
/// every section, the surviving font dictionaries, and the charstrings to
/// copy. Nothing is written while this is computed.
pub(crate) struct SubsetPlan<'a> {
    pub total_size: usize,
    pub offsets: SectionOffsets,
    pub fds: FdSubset<'a>,
    pub char_strings: Vec<&'a [u8]>,
    pub private_dict_infos: Vec<TableInfo>,
}

impl<'a> SubsetPlan<'a> {
    pub fn create(table: &Table<'a>, glyphs: &[u16]) -> Result<SubsetPlan<'a>> {
        if glyphs.is_empty() {
            return Err(SubsetError);
        }

        let fds = fd_select::plan_fd_subset(table, glyphs)?;

        let mut size = HEADER_SIZE;

        let top_dict_size = top_dict::serialized_size(
            &table.top_dict,
            !matches!(fds.plan, FdSelectPlan::Omitted),
        );
        // The header stores the top dictionary length as a 16-bit field.
        if top_dict_size > usize::from(u16::MAX) {
            return Err(SizeOverflow);
        }
        let top_dict = TableInfo { offset: size, size: top_dict_size };
        size += top_dict.size;

        let global_subrs = TableInfo { offset: size, size: table.global_subrs.len() };
        size += global_subrs.size;

        let mut var_store = None;
        if let Some(raw) = table.var_store {
            var_store = Some(TableInfo { offset: size, size: raw.len() });
            size += raw.len();
        }

        let mut fd_select = None;
        let fd_select_size = fds.plan.serialized_size(glyphs.len());
        if fd_select_size > 0 {
            fd_select = Some(TableInfo { offset: size, size: fd_select_size });
            size += fd_select_size;
        }

        // One entry per surviving font dictionary.
        let mut fd_array_data_size = 0usize;
        for old in fds.remapper.sorted_iter() {
            let dict = table.font_dicts.get(usize::from(old)).ok_or(MalformedFont)?;
            fd_array_data_size += font_dict::serialized_size(dict);
        }
        let fd_array_offset_size = calc_offset_size(
            u32::try_from(fd_array_data_size).map_err(|_| SizeOverflow)?,
        );
        let fd_array = TableInfo {
            offset: size,
            size: index::serialized_size(
                fd_array_offset_size,
                usize::from(fds.remapper.len()),
                fd_array_data_size,
            ),
        };
        size += fd_array.size;

        // One entry per glyph of the subset, in subset order.
        let mut char_strings = Vec::with_capacity(glyphs.len());
        let mut char_strings_data_size = 0usize;
        for gid in glyphs {
            let char_string = table.charstring(*gid).ok_or(MalformedFont)?;
            char_strings.push(char_string);
            char_strings_data_size += char_string.len();
        }
        let char_strings_offset_size = calc_offset_size(
            u32::try_from(char_strings_data_size).map_err(|_| SizeOverflow)?,
        );
        let char_strings_info = TableInfo {
            offset: size,
            size: index::serialized_size(
                char_strings_offset_size,
                glyphs.len(),
                char_strings_data_size,
            ),
        };
        size += char_strings_info.size;

        // Every original font dictionary keeps its private dictionary, with
        // the local subroutine index right behind it.
        let private_dicts = size;
        let mut private_dict_infos = Vec::with_capacity(table.font_dicts.len());
        for dict in &table.font_dicts {
            let info = TableInfo {
                offset: size,
                size: private_dict::serialized_size(dict.private_dict),
            };
            // The subroutine offset operand is a 16-bit integer.
            if info.size > usize::from(i16::MAX as u16) {
                return Err(SizeOverflow);
            }
            private_dict_infos.push(info);
            size += info.size + dict.local_subrs.map_or(0, |subrs| subrs.len());
        }

        // Every patched offset is written as a 4-byte integer operand.
        if i32::try_from(size).is_err() {
            return Err(SizeOverflow);
        }

        Ok(SubsetPlan {
            total_size: size,
            offsets: SectionOffsets {
                top_dict,
                global_subrs,
                var_store,
                fd_select,
                fd_array,
                fd_array_offset_size,
                char_strings: char_strings_info,
                char_strings_offset_size,
                private_dicts,
            },
            fds,
            char_strings,
            private_dict_infos,
        })
    }
}
