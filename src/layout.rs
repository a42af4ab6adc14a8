// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Block layout: bit offsets, word placement and field arithmetic.
//!
//! Fields are laid out from the top of the block downward in declaration
//! order, so the last declared field occupies the least-significant bits of
//! the first word. A resolved [`Block`] is immutable; every emitter derives
//! its output from the [`FieldAccess`] descriptors it hands out.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::ast::RawBlock;
use crate::error::{Error, Result};
use crate::word::{Base, BaseSpec, Shift, low_mask};

/// A field or a stretch of padding, at its resolved position.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Field {
    /// `None` for padding.
    pub name: Option<String>,
    /// Absolute offset of the least-significant bit within the block.
    pub offset: u32,
    pub size: u32,
    pub high: bool,
}

impl Field {
    /// The half-open bit interval occupied by the field.
    #[must_use]
    pub const fn bits(&self) -> std::ops::Range<u32> {
        self.offset..self.offset + self.size
    }
}

/// A fully resolved block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub name: String,
    pub base: BaseSpec,
    /// Total size in bits.
    pub size: u32,
    /// Number of words.
    pub multiple: usize,
    /// Every field and padding in declaration order.
    pub segments: Vec<Field>,
    /// Constructor parameter order.
    pub visible_order: Vec<String>,
}

impl Block {
    pub fn resolve(raw: &RawBlock, base: BaseSpec) -> Result<Self> {
        let block_name = || raw.name.clone();
        if raw.fields.is_empty() {
            return Err(Error::EmptyBlock {
                block: block_name(),
            });
        }

        let mut size = 0u32;
        let mut names = BTreeSet::new();
        for field in &raw.fields {
            let display = field.name.as_deref().unwrap_or("padding");
            if field.size == 0 {
                return Err(Error::ZeroSizedField {
                    block: block_name(),
                    field: display.to_string(),
                });
            }
            if let Some(name) = &field.name
                && !names.insert(name.as_str())
            {
                return Err(Error::DuplicateField {
                    block: block_name(),
                    field: name.clone(),
                });
            }
            if field.high && field.size > base.base_bits {
                return Err(Error::HighFieldTooWide {
                    block: block_name(),
                    field: display.to_string(),
                    base_bits: base.base_bits,
                });
            }
            size = size
                .checked_add(field.size)
                .ok_or_else(|| Error::SizeMismatch {
                    block: block_name(),
                    size: u32::MAX,
                    base: base.base.bits(),
                })?;
        }

        let bits = base.base.bits();
        if size % bits != 0 {
            return Err(Error::SizeMismatch {
                block: block_name(),
                size,
                base: bits,
            });
        }

        let mut offset = size;
        let segments = raw
            .fields
            .iter()
            .map(|field| {
                offset -= field.size;
                Field {
                    name: field.name.clone(),
                    offset,
                    size: field.size,
                    high: field.high,
                }
            })
            .collect::<Vec<_>>();

        for field in &segments {
            if let Some(name) = &field.name
                && field.offset / bits != (field.offset + field.size - 1) / bits
            {
                return Err(Error::CrossesWordBoundary {
                    block: block_name(),
                    field: name.clone(),
                });
            }
        }

        let visible_order = match &raw.visible_order {
            None => segments.iter().filter_map(|f| f.name.clone()).collect(),
            Some(order) => {
                let mut seen = BTreeSet::new();
                for name in order {
                    if !names.contains(name.as_str()) {
                        return Err(Error::UnknownVisibleField {
                            block: block_name(),
                            field: name.clone(),
                        });
                    }
                    if !seen.insert(name.as_str()) {
                        return Err(Error::DuplicateVisibleField {
                            block: block_name(),
                            field: name.clone(),
                        });
                    }
                }
                let missing = names
                    .difference(&seen)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                if !missing.is_empty() {
                    return Err(Error::MissingVisibleFields {
                        block: block_name(),
                        fields: missing,
                    });
                }
                order.clone()
            }
        };

        let block = Self {
            name: raw.name.clone(),
            base,
            size,
            multiple: (size / bits) as usize,
            segments,
            visible_order,
        };
        log::debug!(
            "resolved block {} ({} bits over {} x u{})",
            block.name,
            block.size,
            block.multiple,
            bits
        );
        Ok(block)
    }

    /// The named fields, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.segments.iter().filter(|f| f.name.is_some())
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name.as_deref() == Some(name))
    }

    /// The arithmetic for reading and writing `field`.
    #[must_use]
    pub fn access(&self, field: &Field) -> FieldAccess {
        FieldAccess::new(self.base, field)
    }

    pub fn access_of(&self, name: &str) -> Result<FieldAccess> {
        self.field(name)
            .map(|field| self.access(field))
            .ok_or_else(|| Error::UnknownField {
                block: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Builds the words of a new value from `(field, value)` pairs, mirroring
    /// the generated constructor. Omitted fields are zero.
    pub fn construct(&self, values: &[(&str, u64)]) -> Result<Vec<u64>> {
        let mut words = vec![0; self.multiple];
        for &(name, value) in values {
            self.set(&mut words, name, value)?;
        }
        Ok(words)
    }

    /// Reads `name` from `words`, mirroring the generated getter.
    pub fn get(&self, words: &[u64], name: &str) -> Result<u64> {
        Ok(self.access_of(name)?.read(words))
    }

    /// Writes `value` into `name`, failing where the generated setter would
    /// assert.
    pub fn set(&self, words: &mut [u64], name: &str, value: u64) -> Result<()> {
        let access = self.access_of(name)?;
        if !access.accepts(value) {
            return Err(Error::InvalidFieldValue {
                block: self.name.clone(),
                field: name.to_string(),
                value,
            });
        }
        access.write(words, value);
        Ok(())
    }
}

/// Sign extension applied to reads of a high-aligned field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SignExtension {
    /// The bit whose value is replicated upward.
    pub extend_bit: u32,
    /// Bits ORed into the value when `extend_bit` is set.
    pub high_bits: u64,
}

/// Where a field lives and how values move in and out of it.
///
/// Reads compute `(word & word_mask) <read_shift>`, then sign-extend;
/// writes compute `(value <inverse shift>) & word_mask`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct FieldAccess {
    #[serde(skip)]
    pub base: Base,
    pub index: usize,
    pub word_mask: u64,
    pub read_shift: Shift,
    /// The bits a value may occupy once read out of the word.
    pub value_mask: u64,
    pub sign_extend: Option<SignExtension>,
}

impl FieldAccess {
    #[must_use]
    pub fn new(base: BaseSpec, field: &Field) -> Self {
        let bits = base.base.bits();
        let bit = field.offset % bits;
        let word_mask = low_mask(field.size) << bit;
        let read_shift = if field.high {
            Shift::left(i64::from(base.base_bits) - i64::from(field.size) - i64::from(bit))
        } else {
            Shift::Right(bit)
        };
        let sign_extend = (field.high && base.sign_extend).then(|| SignExtension {
            extend_bit: base.base_bits - 1,
            high_bits: base.high_bits(),
        });
        Self {
            base: base.base,
            index: (field.offset / bits) as usize,
            word_mask,
            read_shift,
            value_mask: read_shift.apply(word_mask, base.base),
            sign_extend,
        }
    }

    #[must_use]
    pub const fn write_shift(&self) -> Shift {
        self.read_shift.inverse()
    }

    /// Whether the field occupies the whole word, making masking redundant.
    #[must_use]
    pub const fn is_full_word(&self) -> bool {
        self.word_mask == self.base.max()
    }

    /// The bits outside the field a valid value must carry: the sign
    /// extension pattern when the sign bit is set, otherwise none.
    #[must_use]
    pub const fn expected_excess(&self, value: u64) -> u64 {
        match self.sign_extend {
            Some(ext) if value & (1 << ext.extend_bit) != 0 => ext.high_bits,
            _ => 0,
        }
    }

    /// Whether `value` can be written without losing bits.
    #[must_use]
    pub const fn accepts(&self, value: u64) -> bool {
        value & !self.base.max() == 0
            && value & !self.value_mask == self.expected_excess(value)
    }

    #[must_use]
    pub fn read(&self, words: &[u64]) -> u64 {
        let value = self
            .read_shift
            .apply(words[self.index] & self.word_mask, self.base);
        match self.sign_extend {
            Some(ext) if value & (1 << ext.extend_bit) != 0 => value | ext.high_bits,
            _ => value,
        }
    }

    /// Stores `value`, silently dropping any bits the field cannot hold.
    pub fn write(&self, words: &mut [u64], value: u64) {
        let word = &mut words[self.index];
        *word &= !self.word_mask;
        *word |= self.write_shift().apply(value, self.base) & self.word_mask;
    }
}
