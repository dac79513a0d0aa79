pub(crate) mod font_dict;
pub(crate) mod private_dict;
pub(crate) mod top_dict;

use crate::cff2::number::Number;
use crate::cff2::operator::{Operator, TWO_BYTE_OPERATOR_MARK};
use crate::read::Reader;
use std::ops::Range;

/// The number of operand slots we keep around. CFF2 dictionaries may carry
/// more operands (blended values), but we only ever interpret offsets and
/// ranges; longer runs are copied verbatim through their entry span.
pub const MAX_OPERANDS: usize = 48;

pub struct DictionaryParser<'a> {
    data: &'a [u8],
    // The current offset.
    offset: usize,
    // Offset to the last operands start.
    operands_offset: usize,
    // Actual operands.
    operands: &'a mut [Number],
    // An amount of operands in the `operands` array.
    operands_len: u16,
}

impl<'a> DictionaryParser<'a> {
    #[inline]
    pub fn new(data: &'a [u8], operands_buffer: &'a mut [Number]) -> Self {
        DictionaryParser {
            data,
            offset: 0,
            operands_offset: 0,
            operands: operands_buffer,
            operands_len: 0,
        }
    }

    #[inline(never)]
    pub fn parse_next(&mut self) -> Option<Operator> {
        let mut r = Reader::new_at(self.data, self.offset);
        self.operands_offset = self.offset;
        while !r.at_end() {
            // 0..=21 bytes are operators.
            if is_dict_one_byte_op(r.peak::<u8>()?) {
                let b = r.read::<u8>()?;
                let mut operator = Operator::from_one_byte(b);

                // Check that operator is two byte long.
                if b == TWO_BYTE_OPERATOR_MARK {
                    operator = Operator::from_two_byte(r.read::<u8>()?);
                }

                self.offset = r.offset();
                return Some(operator);
            } else {
                let _ = Number::parse_dict_number(&mut r)?;
            }
        }

        None
    }

    /// The operands and operator of the current entry, as they appear in the
    /// source dictionary.
    #[inline]
    pub fn entry_span(&self) -> &'a [u8] {
        self.data.get(self.operands_offset..self.offset).unwrap_or(&[])
    }

    /// Parses operands of the current operator.
    ///
    /// In the DICT structure, operands are defined before an operator.
    /// So we are trying to find an operator first and then we can actually
    /// parse the operands.
    ///
    /// Since this method is pretty expensive and we do not care about most of
    /// the operators, we can speed up parsing by parsing operands only for
    /// required operators.
    pub fn parse_operands(&mut self) -> Option<()> {
        let mut r = Reader::new_at(self.data, self.operands_offset);
        self.operands_len = 0;
        while !r.at_end() {
            let b = r.peak::<u8>()?;
            // 0..=21 bytes are operators.
            if is_dict_one_byte_op(b) {
                r.read::<u8>()?;
                break;
            } else {
                let op = Number::parse_dict_number(&mut r)?;
                self.operands[usize::from(self.operands_len)] = op;
                self.operands_len += 1;

                if usize::from(self.operands_len) >= self.operands.len() {
                    break;
                }
            }
        }

        Some(())
    }

    #[inline]
    pub fn operands(&self) -> &[Number] {
        &self.operands[..usize::from(self.operands_len)]
    }

    #[inline]
    pub fn parse_offset(&mut self) -> Option<usize> {
        self.parse_operands()?;
        let operands = self.operands();
        if operands.len() == 1 {
            usize::try_from(operands[0].as_u32()?).ok()
        } else {
            None
        }
    }

    #[inline]
    pub fn parse_range(&mut self) -> Option<Range<usize>> {
        self.parse_operands()?;
        let operands = self.operands();
        if operands.len() == 2 {
            let len = usize::try_from(operands[0].as_u32()?).ok()?;
            let start = usize::try_from(operands[1].as_u32()?).ok()?;
            let end = start.checked_add(len)?;
            Some(start..end)
        } else {
            None
        }
    }
}

// One-byte CFF DICT Operators according to the
// Adobe Technical Note #5176, Appendix H CFF DICT Encoding.
fn is_dict_one_byte_op(b: u8) -> bool {
    match b {
        0..=27 => true,
        28..=30 => false,  // numbers
        31 => true,        // Reserved
        32..=254 => false, // numbers
        255 => true,       // Reserved
    }
}

#[allow(dead_code)]
pub(crate) mod operators {
    use crate::cff2::operator::{Operator, OperatorType, TWO_BYTE_OPERATOR_MARK};

    // TOP DICT OPERATORS
    pub const FONT_MATRIX: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 7]));
    pub const CHAR_STRINGS: Operator = Operator(OperatorType::OneByteOperator([17]));
    pub const VSTORE: Operator = Operator(OperatorType::OneByteOperator([24]));
    pub const FD_ARRAY: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 36]));
    pub const FD_SELECT: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 37]));

    // FONT DICT OPERATORS
    pub const PRIVATE: Operator = Operator(OperatorType::OneByteOperator([18]));

    // PRIVATE DICT OPERATORS
    pub const BLUE_VALUES: Operator = Operator(OperatorType::OneByteOperator([6]));
    pub const OTHER_BLUES: Operator = Operator(OperatorType::OneByteOperator([7]));
    pub const FAMILY_BLUES: Operator = Operator(OperatorType::OneByteOperator([8]));
    pub const FAMILY_OTHER_BLUES: Operator = Operator(OperatorType::OneByteOperator([9]));
    pub const BLUE_SCALE: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 9]));
    pub const BLUE_SHIFT: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 10]));
    pub const BLUE_FUZZ: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 11]));
    pub const STD_HW: Operator = Operator(OperatorType::OneByteOperator([10]));
    pub const STD_VW: Operator = Operator(OperatorType::OneByteOperator([11]));
    pub const STEM_SNAP_H: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 12]));
    pub const STEM_SNAP_V: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 13]));
    pub const LANGUAGE_GROUP: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 17]));
    pub const EXPANSION_FACTOR: Operator =
        Operator(OperatorType::TwoByteOperator([TWO_BYTE_OPERATOR_MARK, 18]));
    pub const SUBRS: Operator = Operator(OperatorType::OneByteOperator([19]));
    pub const VS_INDEX: Operator = Operator(OperatorType::OneByteOperator([22]));
    pub const BLEND: Operator = Operator(OperatorType::OneByteOperator([23]));
}
