//! Per-field metadata for flag-gated optional fields.
//!
//! A TL object that has any optional fields writes a 32-bit flags word right
//! after its constructor tag. Each optional field owns one bit of that word:
//!
//! * [`FlagKind::Value`]: the field's bytes follow inline when the bit is set.
//! * [`FlagKind::BoolOnly`]: the bit *is* the value (`true` iff set) and
//!   nothing else is written.
//!
//! Fields without metadata are always present.

/// How a flagged field is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagKind {
    /// Present iff the bit is set; value stored inline.
    Value,
    /// Boolean held entirely in the flags word.
    BoolOnly,
}

/// Bit index and storage kind for one optional field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    pub index: u8,
    pub kind: FlagKind,
}

impl FieldMeta {
    pub const fn value(index: u8) -> Self {
        Self { index, kind: FlagKind::Value }
    }

    pub const fn bool_only(index: u8) -> Self {
        Self { index, kind: FlagKind::BoolOnly }
    }

    /// The mask this field owns in the flags word.
    pub const fn mask(self) -> u32 {
        1 << self.index
    }

    /// Whether this field is present according to `flags`.
    pub const fn is_set(self, flags: u32) -> bool {
        flags & self.mask() != 0
    }
}

/// One entry of an object's field table, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    pub meta: Option<FieldMeta>,
}

/// Mask of every bit claimed by `fields`.
pub fn claimed_bits(fields: &[FieldInfo]) -> u32 {
    fields.iter().filter_map(|f| f.meta).fold(0, |acc, m| acc | m.mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_membership() {
        let m = FieldMeta::value(5);
        assert_eq!(m.mask(), 0b10_0000);
        assert!(m.is_set(0b10_0001));
        assert!(!m.is_set(0b01_1111));
    }

    #[test]
    fn claimed_bits_ignores_plain_fields() {
        let fields = [
            FieldInfo { name: "id", meta: None },
            FieldInfo { name: "title", meta: Some(FieldMeta::value(0)) },
            FieldInfo { name: "pinned", meta: Some(FieldMeta::bool_only(3)) },
        ];
        assert_eq!(claimed_bits(&fields), 0b1001);
    }
}
