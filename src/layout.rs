//! Bit-field layout of a packed node.
//!
//! A node word holds five fields, head to tail:
//!
//! ```text
//!  high                                                            low
//! [ chunk_pos | value | children_start | children_amount | chunk_len ]
//! ```
//!
//! Each field gets exactly the width its largest value needs:
//!
//! - `chunk_pos`: enough for the crammed buffer length.
//! - `value`: enough for `max_value + 1`; 0 means "no value" and a real
//!   value `v` is stored as `v + 1`.
//! - `children_start`: enough for `max_child_delta - 1`; the first child is
//!   stored as `first_child - index - 1`, which is never negative because
//!   children always come after their parent.
//! - `children_amount`: enough for `max_children`.
//! - `chunk_len`: enough for `max_chunk_len`.
//!
//! Fields are packed contiguously from bit 0 upwards; any bits above the head
//! field are left zero.

use tracing::debug;

use crate::analysis::{Analysis, NodeRecord, Stats};
use crate::bits::{bits_for, body, head, place, tail};
use crate::error::{Error, Result};

/// Position of one field inside a node word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Field {
    /// Bit offset of the field's least significant bit.
    pub shift: u32,
    /// Field width in bits.
    pub width: u32,
}

/// Widths of the five fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Widths {
    /// Offset into the crammed buffer.
    pub chunk_pos: u32,
    /// Value plus one, or zero.
    pub value: u32,
    /// First child minus index minus one.
    pub children_start: u32,
    /// Number of children.
    pub children_amount: u32,
    /// Stored chunk length.
    pub chunk_len: u32,
}

impl Widths {
    /// Minimal widths for a crammed buffer of `crammed_len` bytes and `stats`.
    pub fn from_stats(crammed_len: usize, stats: &Stats) -> Self {
        Self {
            chunk_pos: bits_for(crammed_len as u64),
            value: match stats.max_value.checked_add(1) {
                Some(v) => bits_for(v),
                None => 65,
            },
            children_start: if stats.max_child_delta > 0 {
                bits_for(stats.max_child_delta as u64 - 1)
            } else {
                0
            },
            children_amount: bits_for(stats.max_children as u64),
            chunk_len: bits_for(stats.max_chunk_len as u64),
        }
    }

    /// Sum of all widths.
    pub fn total(&self) -> u32 {
        self.chunk_pos + self.value + self.children_start + self.children_amount + self.chunk_len
    }

    /// Widths in head-to-tail order.
    pub fn to_array(self) -> [u32; 5] {
        [
            self.chunk_pos,
            self.value,
            self.children_start,
            self.children_amount,
            self.chunk_len,
        ]
    }

    /// Inverse of [`Widths::to_array`].
    pub fn from_array(w: [u32; 5]) -> Self {
        Self {
            chunk_pos: w[0],
            value: w[1],
            children_start: w[2],
            children_amount: w[3],
            chunk_len: w[4],
        }
    }
}

/// Raw field contents of one packed node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedFields {
    /// Offset of the stored chunk in the crammed buffer.
    pub chunk_pos: u64,
    /// 0 for no value, otherwise value + 1.
    pub value: u64,
    /// `first_child - index - 1`, or 0 without children.
    pub children_start: u64,
    /// Number of children.
    pub children_amount: u64,
    /// Stored chunk length.
    pub chunk_len: u64,
}

/// Shift table for a fixed bit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftLayout {
    budget: u32,
    chunk_pos: Field,
    value: Field,
    children_start: Field,
    children_amount: Field,
    chunk_len: Field,
}

impl ShiftLayout {
    /// Layout for `analysis` within `budget` bits of a node that holds at most
    /// `capacity` bits.
    pub fn compute(budget: u32, capacity: u32, analysis: &Analysis) -> Result<Self> {
        let widths = Widths::from_stats(analysis.crammed().len(), analysis.stats());
        Self::from_widths(budget, capacity, widths)
    }

    /// Layout from explicit widths.
    ///
    /// Fails with [`Error::InvalidNodeWidth`] if `budget` exceeds `capacity`
    /// (or 64), and with [`Error::Overflow`] if the widths do not fit.
    pub fn from_widths(budget: u32, capacity: u32, widths: Widths) -> Result<Self> {
        if budget > capacity || budget > 64 {
            return Err(Error::InvalidNodeWidth {
                requested: budget,
                capacity: capacity.min(64),
            });
        }
        let required = widths.total();
        if required > budget {
            debug!(required, budget, ?widths, "layout overflow");
            return Err(Error::Overflow { required, budget });
        }

        let chunk_len = Field { shift: 0, width: widths.chunk_len };
        let children_amount = Field {
            shift: chunk_len.shift + chunk_len.width,
            width: widths.children_amount,
        };
        let children_start = Field {
            shift: children_amount.shift + children_amount.width,
            width: widths.children_start,
        };
        let value = Field {
            shift: children_start.shift + children_start.width,
            width: widths.value,
        };
        let chunk_pos = Field {
            shift: value.shift + value.width,
            width: widths.chunk_pos,
        };

        let layout = Self {
            budget,
            chunk_pos,
            value,
            children_start,
            children_amount,
            chunk_len,
        };
        debug!(budget, used = required, ?widths, "computed layout");
        Ok(layout)
    }

    /// Bits per node.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Bits actually occupied by fields.
    pub fn used_bits(&self) -> u32 {
        self.chunk_pos.shift + self.chunk_pos.width
    }

    /// Field widths.
    pub fn widths(&self) -> Widths {
        Widths {
            chunk_pos: self.chunk_pos.width,
            value: self.value.width,
            children_start: self.children_start.width,
            children_amount: self.children_amount.width,
            chunk_len: self.chunk_len.width,
        }
    }

    /// Field positions in head-to-tail order.
    pub fn fields(&self) -> [Field; 5] {
        [
            self.chunk_pos,
            self.value,
            self.children_start,
            self.children_amount,
            self.chunk_len,
        ]
    }

    /// Field contents for the record at breadth-first `index`.
    pub fn fields_of(&self, index: usize, record: &NodeRecord) -> PackedFields {
        let (children_start, children_amount) = if record.children.is_empty() {
            (0, 0)
        } else {
            debug_assert!(record.children.start > index);
            (
                (record.children.start - index - 1) as u64,
                record.children.len() as u64,
            )
        };
        PackedFields {
            chunk_pos: record.chunk_pos as u64,
            value: record.value.map_or(0, |v| v + 1),
            children_start,
            children_amount,
            chunk_len: record.chunk.len() as u64,
        }
    }

    /// ORs field contents together at their shifts.
    #[inline]
    pub fn pack(&self, f: &PackedFields) -> u64 {
        place(f.chunk_pos, self.chunk_pos.shift, self.chunk_pos.width)
            | place(f.value, self.value.shift, self.value.width)
            | place(f.children_start, self.children_start.shift, self.children_start.width)
            | place(f.children_amount, self.children_amount.shift, self.children_amount.width)
            | place(f.chunk_len, self.chunk_len.shift, self.chunk_len.width)
    }

    /// Packed word for the record at breadth-first `index`.
    pub fn encode(&self, index: usize, record: &NodeRecord) -> u64 {
        self.pack(&self.fields_of(index, record))
    }

    /// Splits a packed word back into its fields.
    #[inline]
    pub fn decode(&self, word: u64) -> PackedFields {
        PackedFields {
            chunk_pos: head(word, self.used_bits(), self.chunk_pos.width),
            value: body(word, self.value.shift, self.value.width),
            children_start: body(word, self.children_start.shift, self.children_start.width),
            children_amount: body(word, self.children_amount.shift, self.children_amount.width),
            chunk_len: tail(word, self.chunk_len.width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Analyzer, RadixBuilder};

    fn analysis_with_max_value(v: u64) -> Analysis {
        let b: RadixBuilder = [("ab", 0u64), ("ac", v)].into_iter().collect();
        Analyzer::default().analyze(&b)
    }

    #[test]
    fn test_widths_from_stats() {
        let stats = Stats {
            max_chunk_len: 5,
            max_children: 3,
            max_child_delta: 1,
            max_value: 6,
        };
        let w = Widths::from_stats(100, &stats);
        assert_eq!(w.chunk_pos, 7);
        assert_eq!(w.value, 3);
        assert_eq!(w.children_start, 0);
        assert_eq!(w.children_amount, 2);
        assert_eq!(w.chunk_len, 3);
        assert_eq!(w.total(), 15);
        assert_eq!(Widths::from_array(w.to_array()), w);
    }

    #[test]
    fn test_widths_empty() {
        let w = Widths::from_stats(0, &Stats::default());
        assert_eq!(w.to_array(), [0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_max_value_needs_65_bits() {
        let stats = Stats {
            max_value: u64::MAX,
            ..Stats::default()
        };
        let w = Widths::from_stats(0, &stats);
        assert_eq!(w.value, 65);
        assert!(matches!(
            ShiftLayout::from_widths(64, 64, w),
            Err(Error::Overflow { required: 65, budget: 64 })
        ));
    }

    #[test]
    fn test_fields_contiguous() {
        let w = Widths::from_array([3, 4, 5, 6, 7]);
        let l = ShiftLayout::from_widths(32, 32, w).unwrap();
        let f = l.fields();
        assert_eq!(f[4], Field { shift: 0, width: 7 });
        assert_eq!(f[3], Field { shift: 7, width: 6 });
        assert_eq!(f[2], Field { shift: 13, width: 5 });
        assert_eq!(f[1], Field { shift: 18, width: 4 });
        assert_eq!(f[0], Field { shift: 22, width: 3 });
        assert_eq!(l.used_bits(), 25);
        assert_eq!(l.widths(), w);
    }

    #[test]
    fn test_invalid_node_width() {
        let a = analysis_with_max_value(1);
        assert_eq!(
            ShiftLayout::compute(40, 32, &a),
            Err(Error::InvalidNodeWidth { requested: 40, capacity: 32 })
        );
        assert!(matches!(
            ShiftLayout::compute(72, 72, &a),
            Err(Error::InvalidNodeWidth { requested: 72, .. })
        ));
    }

    #[test]
    fn test_overflow_boundary() {
        for k in 2..20u32 {
            let fits = analysis_with_max_value((1u64 << k) - 2);
            let spills = analysis_with_max_value((1u64 << k) - 1);
            let layout = ShiftLayout::compute(64, 64, &fits).unwrap();
            assert_eq!(layout.widths().value, k);

            let budget = layout.widths().total();
            assert!(ShiftLayout::compute(budget, 64, &fits).is_ok());
            assert_eq!(
                ShiftLayout::compute(budget, 64, &spills),
                Err(Error::Overflow {
                    required: budget + 1,
                    budget
                })
            );
        }
    }

    #[test]
    fn test_round_trip_records() {
        let b: RadixBuilder = [
            ("content-type", 5u64),
            ("content-length", 6),
            ("content-disposition", 7),
            ("auth", 4),
        ]
        .into_iter()
        .collect();
        let a = Analyzer::default().analyze(&b);
        let l = ShiftLayout::compute(64, 64, &a).unwrap();
        for (i, r) in a.records().iter().enumerate() {
            let fields = l.fields_of(i, r);
            assert_eq!(l.decode(l.encode(i, r)), fields);
            assert_eq!(fields.value, r.value.map_or(0, |v| v + 1));
            assert_eq!(fields.chunk_len as usize, r.chunk.len());
            if fields.children_amount > 0 {
                assert_eq!(
                    fields.children_start as usize + i + 1,
                    r.children.start
                );
            }
        }
    }

    #[test]
    fn test_full_width_fields() {
        let l = ShiftLayout::from_widths(64, 64, Widths::from_array([0, 64, 0, 0, 0])).unwrap();
        let f = PackedFields {
            value: u64::MAX,
            ..PackedFields::default()
        };
        assert_eq!(l.decode(l.pack(&f)), f);
    }
}
