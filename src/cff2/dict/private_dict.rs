use crate::cff2::dict::{operators, DictionaryParser, MAX_OPERANDS};
use crate::cff2::number::{IntegerNumber, Number};
use crate::write::Writer;
use crate::Error::SizeOverflow;
use crate::Result;
use std::array;

/// The forced encoding of the local subroutine reference: a 3 byte offset
/// and the operator itself.
const SUBRS_ENTRY_SIZE: usize = 3 + 1;

pub fn parse_subr_offset(data: &[u8]) -> Option<usize> {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(data, &mut operands_buffer);

    while let Some(operator) = dict_parser.parse_next() {
        if operator == operators::SUBRS {
            return dict_parser.parse_offset();
        }
    }

    None
}

/// The size of the re-emitted private dictionary, with the local subroutine
/// reference at its forced width.
pub fn serialized_size(private_dict_data: &[u8]) -> usize {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(private_dict_data, &mut operands_buffer);

    let mut size = 0;
    while let Some(operator) = dict_parser.parse_next() {
        size += if operator == operators::SUBRS {
            SUBRS_ENTRY_SIZE
        } else {
            dict_parser.entry_span().len()
        };
    }

    size
}

/// Re-emit a private dictionary. The local subroutine index always follows
/// the dictionary directly, so its offset is the dictionary's own size.
pub fn write_private_dict(
    private_dict_data: &[u8],
    own_size: usize,
    w: &mut Writer,
) -> Result<()> {
    let mut operands_buffer: [Number; MAX_OPERANDS] = array::from_fn(|_| Number::zero());
    let mut dict_parser = DictionaryParser::new(private_dict_data, &mut operands_buffer);

    while let Some(operator) = dict_parser.parse_next() {
        if operator == operators::SUBRS {
            let subrs_offset = i16::try_from(own_size).map_err(|_| SizeOverflow)?;
            IntegerNumber(i32::from(subrs_offset)).write_as_3_bytes(w);
            w.extend(operators::SUBRS.as_bytes());
        } else {
            w.extend(dict_parser.entry_span());
        }
    }

    Ok(())
}
