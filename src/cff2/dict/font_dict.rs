use crate::cff2::dict::{operators, private_dict, DictionaryParser, MAX_OPERANDS};
use crate::cff2::index::parse_index;
use crate::cff2::number::{IntegerNumber, Number};
use crate::cff2::plan::TableInfo;
use crate::read::Reader;
use crate::write::Writer;
use crate::Error::SizeOverflow;
use crate::Result;
use std::array;

/// The forced encoding of the private dictionary reference: a 3 byte size,
/// a 5 byte offset and the operator itself.
const PRIVATE_ENTRY_SIZE: usize = 3 + 5 + 1;

/// One entry of the font dictionary array, together with the private
/// dictionary and local subroutine index it references.
#[derive(Default, Clone, Debug)]
pub(crate) struct FontDict<'a> {
    /// The bytes of the font dictionary itself.
    pub data: &'a [u8],
    /// The bytes of the private dictionary. Empty if the font dictionary
    /// does not reference one.
    pub private_dict: &'a [u8],
    /// The local subroutine offset declared inside the private dictionary.
    pub subrs_offset: Option<usize>,
    /// The raw local subroutine index, if the private dictionary declares one.
    pub local_subrs: Option<&'a [u8]>,
}

pub fn parse_font_dict<'a>(
    table_data: &'a [u8],
    font_dict_data: &'a [u8],
) -> Option<FontDict<'a>> {
    let mut font_dict = FontDict { data: font_dict_data, ..FontDict::default() };

    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(font_dict_data, &mut operands_buffer);
    while let Some(operator) = dict_parser.parse_next() {
        if operator == operators::PRIVATE {
            let private_dict_range = dict_parser.parse_range()?;
            let private_dict_data = table_data.get(private_dict_range.clone())?;
            font_dict.private_dict = private_dict_data;

            if let Some(subrs_offset) = private_dict::parse_subr_offset(private_dict_data)
            {
                font_dict.subrs_offset = Some(subrs_offset);
                font_dict.local_subrs = {
                    let start = private_dict_range.start.checked_add(subrs_offset)?;
                    let mut r = Reader::new_at(table_data, start);
                    parse_index(&mut r)?;
                    Some(table_data.get(start..r.offset())?)
                };
            }
        }
    }

    Some(font_dict)
}

/// The size of the re-emitted font dictionary entry, with the private
/// dictionary reference at its forced width.
pub fn serialized_size(font_dict: &FontDict) -> usize {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(font_dict.data, &mut operands_buffer);

    let mut size = 0;
    while let Some(operator) = dict_parser.parse_next() {
        size += if operator == operators::PRIVATE {
            PRIVATE_ENTRY_SIZE
        } else {
            dict_parser.entry_span().len()
        };
    }

    size
}

/// Re-emit a font dictionary entry, patching the private dictionary
/// reference with its planned position.
pub fn write_font_dict(
    font_dict: &FontDict,
    private_dict_info: &TableInfo,
    w: &mut Writer,
) -> Result<()> {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(font_dict.data, &mut operands_buffer);

    while let Some(operator) = dict_parser.parse_next() {
        if operator == operators::PRIVATE {
            let size = i32::try_from(private_dict_info.size).map_err(|_| SizeOverflow)?;
            let offset = i32::try_from(private_dict_info.offset).map_err(|_| SizeOverflow)?;
            if size > i32::from(i16::MAX) {
                return Err(SizeOverflow);
            }

            IntegerNumber(size).write_as_3_bytes(w);
            IntegerNumber(offset).write_as_5_bytes(w);
            w.extend(operators::PRIVATE.as_bytes());
        } else {
            w.extend(dict_parser.entry_span());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cff2::plan::TableInfo;

    #[test]
    fn private_reference_is_forced_wide() {
        // Private 2 10 inside a 12 byte table.
        let table = [141u8, 149, 18, 0, 0, 0, 0, 0, 0, 0, 199, 10];
        let font_dict = parse_font_dict(&table, &table[0..3]).unwrap();
        assert_eq!(font_dict.private_dict, &[199, 10]);
        assert_eq!(font_dict.subrs_offset, None);
        assert_eq!(serialized_size(&font_dict), PRIVATE_ENTRY_SIZE);

        let mut w = Writer::new();
        write_font_dict(&font_dict, &TableInfo { offset: 49, size: 2 }, &mut w).unwrap();
        assert_eq!(w.finish(), vec![28, 0, 2, 29, 0, 0, 0, 49, 18]);
    }
}
