use crate::cff2::dict::{operators::*, DictionaryParser, MAX_OPERANDS};
use crate::cff2::number::{IntegerNumber, Number};
use crate::cff2::operator::Operator;
use crate::cff2::plan::SectionOffsets;
use crate::write::Writer;
use crate::Error::{MalformedFont, SizeOverflow};
use crate::Result;
use std::array;

/// A 29-prefixed integer, always 5 bytes long.
const LONG_INT_SIZE: usize = 5;

/// The top dictionary of the source table, with the offsets of the sections
/// it points to.
#[derive(Default, Debug, Clone)]
pub struct TopDictData<'a> {
    pub data: &'a [u8],
    pub char_strings: Option<usize>,
    pub var_store: Option<usize>,
    pub fd_array: Option<usize>,
    pub fd_select: Option<usize>,
}

pub fn parse_top_dict(data: &[u8]) -> Option<TopDictData<'_>> {
    let mut top_dict = TopDictData { data, ..TopDictData::default() };

    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(data, &mut operands_buffer);

    while let Some(operator) = dict_parser.parse_next() {
        match operator {
            CHAR_STRINGS => top_dict.char_strings = Some(dict_parser.parse_offset()?),
            VSTORE => top_dict.var_store = Some(dict_parser.parse_offset()?),
            FD_ARRAY => top_dict.fd_array = Some(dict_parser.parse_offset()?),
            FD_SELECT => top_dict.fd_select = Some(dict_parser.parse_offset()?),
            _ => {}
        }
    }

    Some(top_dict)
}

/// The size of the re-emitted top dictionary.
///
/// Offset operators are forced to a fixed five byte operand so that the
/// writer can patch in values that are only known once the whole layout has
/// been computed. Everything else keeps its source bytes.
pub fn serialized_size(top_dict: &TopDictData, has_fd_select: bool) -> usize {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(top_dict.data, &mut operands_buffer);

    let mut size = 0;
    while let Some(operator) = dict_parser.parse_next() {
        size += match operator {
            CHAR_STRINGS | VSTORE | FD_ARRAY => forced_entry_size(operator),
            FD_SELECT => {
                if has_fd_select {
                    forced_entry_size(operator)
                } else {
                    0
                }
            }
            _ => dict_parser.entry_span().len(),
        };
    }

    size
}

pub fn write_top_dict(
    top_dict: &TopDictData,
    offsets: &SectionOffsets,
    w: &mut Writer,
) -> Result<()> {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(top_dict.data, &mut operands_buffer);

    while let Some(operator) = dict_parser.parse_next() {
        match operator {
            CHAR_STRINGS => write_offset_entry(w, operator, offsets.char_strings.offset)?,
            VSTORE => {
                let info = offsets.var_store.ok_or(MalformedFont)?;
                write_offset_entry(w, operator, info.offset)?;
            }
            FD_ARRAY => write_offset_entry(w, operator, offsets.fd_array.offset)?,
            FD_SELECT => {
                // The operator is dropped along with the table when every
                // glyph ended up in the same font dictionary.
                if let Some(info) = offsets.fd_select {
                    write_offset_entry(w, operator, info.offset)?;
                }
            }
            _ => w.extend(dict_parser.entry_span()),
        }
    }

    Ok(())
}

fn forced_entry_size(operator: Operator) -> usize {
    LONG_INT_SIZE + operator.as_bytes().len()
}

fn write_offset_entry(w: &mut Writer, operator: Operator, offset: usize) -> Result<()> {
    let value = i32::try_from(offset).map_err(|_| SizeOverflow)?;
    IntegerNumber(value).write_as_5_bytes(w);
    w.extend(operator.as_bytes());
    Ok(())
}
