use super::LirType;

#[derive(Debug, Clone)]
pub struct StructLayout {
    pub size: u64,
    pub align: u32,
    pub field_offsets: Vec<u64>,
}

/// Target facts the layout depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    pub pointer_bytes: u64,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_bytes: 8 }
    }
}

impl DataLayout {
    pub fn from_pointer_bits(bits: u64) -> Self {
        Self {
            pointer_bytes: bits / 8,
        }
    }

    pub fn size_of(&self, ty: &LirType) -> u64 {
        match ty {
            LirType::I1 | LirType::I8 => 1,
            LirType::I16 | LirType::F16 | LirType::BF16 => 2,
            LirType::I32 | LirType::F32 => 4,
            LirType::I64 | LirType::F64 => 8,
            LirType::I128 | LirType::F128 => 16,
            LirType::Ptr(_) | LirType::Function { .. } => self.pointer_bytes,
            LirType::Array(elem, len) => self.size_of(elem).saturating_mul(*len),
            LirType::Struct { .. } => self.struct_layout(ty).map(|layout| layout.size).unwrap_or(0),
            LirType::Vector(elem, count) => self.size_of(elem).saturating_mul(*count as u64),
            LirType::Void => 0,
        }
    }

    pub fn align_of(&self, ty: &LirType) -> u32 {
        match ty {
            LirType::I1 | LirType::I8 => 1,
            LirType::I16 | LirType::F16 | LirType::BF16 => 2,
            LirType::I32 | LirType::F32 => 4,
            LirType::I64 | LirType::F64 => 8,
            LirType::I128 | LirType::F128 => 16,
            LirType::Ptr(_) | LirType::Function { .. } => self.pointer_bytes as u32,
            LirType::Array(elem, _) => self.align_of(elem),
            LirType::Struct { .. } => self.struct_layout(ty).map(|layout| layout.align).unwrap_or(1),
            LirType::Vector(elem, count) => (self.align_of(elem) * count).min(16),
            LirType::Void => 1,
        }
    }

    pub fn struct_layout(&self, ty: &LirType) -> Option<StructLayout> {
        let LirType::Struct { fields, packed, .. } = ty else {
            return None;
        };
        if fields.is_empty() {
            return Some(StructLayout {
                size: 0,
                align: 1,
                field_offsets: Vec::new(),
            });
        }

        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0u64;
        let mut max_align = 1u32;

        for field in fields {
            let field_align = if *packed { 1 } else { self.align_of(field) };
            max_align = max_align.max(field_align);
            if !*packed && field_align > 1 {
                offset = align_to(offset, field_align as u64);
            }
            offsets.push(offset);
            offset = offset.saturating_add(self.size_of(field));
        }

        let align = if *packed { 1 } else { max_align.max(1) };
        let size = if *packed {
            offset
        } else {
            align_to(offset, align as u64)
        };

        Some(StructLayout {
            size,
            align,
            field_offsets: offsets,
        })
    }

    /// Byte offset of element `index` inside `ty`.
    pub fn element_offset(&self, ty: &LirType, index: u64) -> Option<u64> {
        match ty {
            LirType::Array(elem, _) | LirType::Vector(elem, _) => {
                self.size_of(elem).checked_mul(index)
            }
            LirType::Struct { .. } => self
                .struct_layout(ty)?
                .field_offsets
                .get(index as usize)
                .copied(),
            _ => None,
        }
    }
}

pub fn align_to(value: u64, alignment: u64) -> u64 {
    checked_align_to(value, alignment).unwrap_or(u64::MAX)
}

/// `None` when rounding up leaves the `u64` range.
pub fn checked_align_to(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }
    match value % alignment {
        0 => Some(value),
        rem => value.checked_add(alignment - rem),
    }
}
