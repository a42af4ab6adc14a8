// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tagged union resolution.
//!
//! A union's discriminator takes one of two forms. A *sliced* tag is spread
//! over several fields that sit at the same place in every variant; the
//! slices are concatenated, first slice lowest, into one compressed value. A
//! *classed* tag is a single field whose width varies by variant. Values of a
//! narrow class must avoid that class's mask pattern, and a stored word whose
//! tag bits do match the pattern "escapes" to the next wider class:
//!
//! ```text
//!                   * * _ _     (** != 11)
//!         0 _ _ _   1 1 _ _
//! _ _ _ _ 1 _ _ _   1 1 _ _
//! ```
//!
//! Here the 4-bit class has mask `0b1100`, and the 8- and 12-bit classes both
//! have mask `0b1000_1100`. Masks are declared relative to their own field
//! but compared relative to the lowest tag offset of any class.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::Serialize;

use crate::ast::RawUnion;
use crate::error::{Error, Result};
use crate::layout::{Block, Field};
use crate::word::{Base, BaseSpec, Shift, low_mask};

/// One element of a union: a tag value and the block it selects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variant {
    pub name: String,
    /// The tag value; compressed for sliced tags.
    pub value: u64,
    pub block: Rc<Block>,
    /// The check that a value holds this variant.
    pub check: TagCheck,
}

/// A slice of a sliced tag.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TagSlice {
    pub name: String,
    pub size: u32,
    /// Absolute bit offset within the block.
    pub offset: u32,
    /// Bit offset within the tag word.
    pub shift: u32,
    /// Bit position within the compressed value.
    pub position: u32,
}

impl TagSlice {
    /// Moves the slice from its word position to its compressed position.
    #[must_use]
    pub fn compress_shift(&self) -> Shift {
        Shift::left(i64::from(self.position) - i64::from(self.shift))
    }

    #[must_use]
    pub const fn word_mask(&self) -> u64 {
        low_mask(self.size) << self.shift
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SlicedTag {
    /// The word holding every slice.
    pub index: usize,
    pub slices: Vec<TagSlice>,
    /// Union of the slices' word masks.
    pub mask: u64,
}

impl SlicedTag {
    /// Spreads a compressed value over the tag word.
    #[must_use]
    pub fn expand(&self, compressed: u64) -> u64 {
        self.slices.iter().fold(0, |word, slice| {
            let part = compressed.checked_shr(slice.position).unwrap_or(0) & low_mask(slice.size);
            word | (part << slice.shift)
        })
    }

    /// Gathers the slices of `word` into a compressed value.
    #[must_use]
    pub fn compress(&self, word: u64) -> u64 {
        self.slices.iter().fold(0, |value, slice| {
            value | slice.compress_shift().apply(word & slice.word_mask(), Base::U64)
        })
    }

    /// The number of bits in a compressed value.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.slices.iter().map(|slice| slice.size).sum()
    }
}

/// A width class of a classed tag.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TagClass {
    pub width: u32,
    /// Absolute bit offset of the tag field for this width.
    pub offset: u32,
    /// Bit offset of the tag field within the tag word.
    pub shift: u32,
    /// The mask as declared, relative to the field.
    pub declared: u64,
    /// The mask relative to the lowest offset of any class.
    pub classmask: u64,
    /// The mask positioned within the tag word.
    pub word_classmask: u64,
}

impl TagClass {
    #[must_use]
    pub const fn value_mask(&self) -> u64 {
        low_mask(self.width)
    }

    /// Whether a stored tag word does not escape to a wider class.
    #[must_use]
    pub const fn claims(&self, word: u64) -> bool {
        word & self.word_classmask != self.word_classmask
    }

    #[must_use]
    pub const fn extract(&self, word: u64) -> u64 {
        (word >> self.shift) & self.value_mask()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClassedTag {
    pub index: usize,
    /// The lowest tag offset across classes.
    pub class_offset: u32,
    /// Ordered by ascending width.
    pub classes: Vec<TagClass>,
}

impl ClassedTag {
    /// Reads the tag from its word, trying the narrowest class first. The
    /// widest class is the fallback.
    #[must_use]
    pub fn read(&self, word: u64) -> u64 {
        let Some((widest, narrower)) = self.classes.split_last() else {
            return 0;
        };
        narrower
            .iter()
            .find(|class| class.claims(word))
            .unwrap_or(widest)
            .extract(word)
    }

    #[must_use]
    pub fn class(&self, width: u32) -> Option<&TagClass> {
        self.classes.iter().find(|class| class.width == width)
    }

    fn span(&self) -> u32 {
        self.classes
            .iter()
            .map(|class| class.width + class.offset - self.class_offset)
            .max()
            .unwrap_or(0)
    }

    /// A bit diagram of a class mask, e.g. `---11-- (0xc)`.
    #[must_use]
    pub fn diagram(&self, class: &TagClass) -> String {
        let span = self.span() as usize;
        let bits = format!("{:0span$b}", class.classmask).replace('0', "-");
        format!("{bits} ({:#x})", class.classmask)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagEncoding {
    Sliced(SlicedTag),
    Classed(ClassedTag),
}

impl TagEncoding {
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Sliced(tag) => tag.index,
            Self::Classed(tag) => tag.index,
        }
    }
}

/// The assertion guarding a variant's accessors:
/// `((words[index] >> shift) & mask) == value`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TagCheck {
    pub index: usize,
    pub shift: u32,
    pub mask: u64,
    pub value: u64,
}

impl TagCheck {
    #[must_use]
    pub const fn holds(&self, words: &[u64]) -> bool {
        (words[self.index] >> self.shift) & self.mask == self.value
    }
}

/// A fully resolved tagged union.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaggedUnion {
    pub name: String,
    pub tag_name: String,
    /// The tag fields; `[tag_name]` unless the tag is sliced.
    pub tag_slices: Vec<String>,
    pub base: BaseSpec,
    pub size: u32,
    pub multiple: usize,
    pub encoding: TagEncoding,
    pub variants: Vec<Variant>,
}

impl TaggedUnion {
    /// Resolves `raw`, looking up each variant's block with `lookup`.
    pub fn resolve(
        raw: &RawUnion,
        base: BaseSpec,
        lookup: impl Fn(&str) -> Option<Rc<Block>>,
    ) -> Result<Self> {
        let union_name = || raw.name.clone();
        if raw.tags.is_empty() {
            return Err(Error::EmptyUnion {
                union: union_name(),
            });
        }

        let blocks = raw
            .tags
            .iter()
            .map(|tag| {
                lookup(&tag.name).ok_or_else(|| Error::UnknownBlock {
                    union: union_name(),
                    block: tag.name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tag_slices = raw.slices();
        let sliced = tag_slices.len() > 1;
        if sliced && !raw.masks.is_empty() {
            return Err(Error::SlicedWithClasses {
                union: union_name(),
            });
        }

        let tag_field = |block: &Block, name: &str| -> Result<Field> {
            block.field(name).cloned().ok_or_else(|| Error::MissingTagField {
                union: union_name(),
                block: block.name.clone(),
                field: name.to_string(),
            })
        };

        let bits = base.base.bits();
        let encoding = if sliced {
            // Slice placement is read off the first variant and checked
            // against the rest below.
            let mut position = 0;
            let mut slices: Vec<TagSlice> = Vec::new();
            for name in &tag_slices {
                if slices.iter().any(|slice| slice.name == *name) {
                    return Err(Error::DuplicateTagSlice {
                        union: union_name(),
                        slice: name.clone(),
                    });
                }
                let field = tag_field(blocks[0].as_ref(), name)?;
                slices.push(TagSlice {
                    name: name.clone(),
                    size: field.size,
                    offset: field.offset,
                    shift: field.offset % bits,
                    position,
                });
                position += field.size;
            }
            let index = tag_word(&raw.name, slices.iter().map(|s| s.offset), bits)?;
            let mask = slices.iter().fold(0, |mask, s| mask | s.word_mask());
            TagEncoding::Sliced(SlicedTag {
                index,
                slices,
                mask,
            })
        } else {
            let mut offsets = BTreeMap::new();
            for block in &blocks {
                let field = tag_field(block.as_ref(), &raw.tag_name)?;
                offsets.entry(field.size).or_insert(field.offset);
            }
            let index = tag_word(&raw.name, offsets.values().copied(), bits)?;
            TagEncoding::Classed(make_classes(raw, &offsets, index, bits)?)
        };

        let mut variants = Vec::with_capacity(raw.tags.len());
        let mut names = BTreeSet::new();
        let mut values = BTreeSet::new();
        for (tag, block) in raw.tags.iter().zip(blocks) {
            let value = match &encoding {
                TagEncoding::Sliced(sliced) => compress_value(raw, &tag.name, &tag.values, sliced)?,
                TagEncoding::Classed(_) => match tag.values.as_slice() {
                    [value] => *value,
                    values => {
                        return Err(Error::TagArity {
                            union: union_name(),
                            variant: tag.name.clone(),
                            expected: 1,
                            found: values.len(),
                        });
                    }
                },
            };
            if !names.insert(tag.name.clone()) {
                return Err(Error::DuplicateTagName {
                    union: union_name(),
                    name: tag.name.clone(),
                });
            }
            if !values.insert(value) {
                return Err(Error::DuplicateTagValue {
                    union: union_name(),
                    value,
                });
            }
            let check = match &encoding {
                TagEncoding::Sliced(sliced) => TagCheck {
                    index: sliced.index,
                    shift: 0,
                    mask: sliced.mask,
                    value: sliced.expand(value),
                },
                TagEncoding::Classed(classed) => {
                    let field = tag_field(block.as_ref(), &raw.tag_name)?;
                    let class = classed.class(field.size).ok_or_else(|| {
                        Error::UndeclaredClass {
                            context: format!("masks for {}.{}", raw.name, raw.tag_name),
                            width: field.size,
                        }
                    })?;
                    TagCheck {
                        index: classed.index,
                        shift: class.shift,
                        mask: class.value_mask(),
                        value,
                    }
                }
            };
            variants.push(Variant {
                name: tag.name.clone(),
                value,
                block,
                check,
            });
        }

        let size = variants[0].block.size;
        for variant in &variants {
            let mismatch = |what| Error::VariantMismatch {
                union: union_name(),
                variant: variant.name.clone(),
                what,
            };
            let block = &variant.block;
            if block.base != base {
                return Err(mismatch("base"));
            }
            if block.size != size {
                return Err(mismatch("size"));
            }
            let high = match &encoding {
                TagEncoding::Sliced(sliced) => {
                    let mut high = false;
                    for slice in &sliced.slices {
                        let field = tag_field(block.as_ref(), &slice.name)?;
                        if field.offset != slice.offset {
                            return Err(mismatch("tag offset"));
                        }
                        if field.size != slice.size {
                            return Err(mismatch("tag size"));
                        }
                        high |= field.high;
                    }
                    high
                }
                TagEncoding::Classed(classed) => {
                    let field = tag_field(block.as_ref(), &raw.tag_name)?;
                    let offset = classed.class(field.size).map(|class| class.offset);
                    if offset != Some(field.offset) {
                        return Err(mismatch("tag offset"));
                    }
                    check_value_in_class(raw, variant, classed, field.size)?;
                    field.high
                }
            };
            if high {
                return Err(Error::HighAlignedTag {
                    union: union_name(),
                    variant: variant.name.clone(),
                });
            }
        }

        let union = Self {
            name: raw.name.clone(),
            tag_name: raw.tag_name.clone(),
            tag_slices,
            base,
            size,
            multiple: (size / bits) as usize,
            encoding,
            variants,
        };
        log::debug!(
            "resolved tagged union {} ({} variants, {} tag)",
            union.name,
            union.variants.len(),
            if sliced { "sliced" } else { "classed" }
        );
        Ok(union)
    }

    pub fn variant(&self, name: &str) -> Result<&Variant> {
        self.variants
            .iter()
            .find(|variant| variant.name == name)
            .ok_or_else(|| Error::UnknownVariant {
                union: self.name.clone(),
                variant: name.to_string(),
            })
    }

    #[must_use]
    pub fn is_tag_field(&self, name: &str) -> bool {
        self.tag_slices.iter().any(|slice| slice == name)
    }

    /// The constructor parameters of `variant`, tag fields excluded.
    pub fn params<'a>(&'a self, variant: &'a Variant) -> impl Iterator<Item = &'a str> {
        variant
            .block
            .visible_order
            .iter()
            .map(String::as_str)
            .filter(|name| !self.is_tag_field(name))
    }

    /// The accessible fields of `variant`, tag fields excluded.
    pub fn fields<'a>(&'a self, variant: &'a Variant) -> impl Iterator<Item = &'a Field> {
        variant.block.fields().filter(|field| {
            field
                .name
                .as_deref()
                .is_some_and(|name| !self.is_tag_field(name))
        })
    }

    /// Reads the tag, mirroring the generated `get_<tag>`.
    #[must_use]
    pub fn read_tag(&self, words: &[u64]) -> u64 {
        let word = words[self.encoding.index()];
        match &self.encoding {
            TagEncoding::Sliced(sliced) => sliced.compress(word),
            TagEncoding::Classed(classed) => classed.read(word),
        }
    }

    #[must_use]
    pub fn tag_equals(&self, words: &[u64], value: u64) -> bool {
        self.read_tag(words) == value
    }

    /// Builds a value of `variant`, mirroring the generated constructor.
    pub fn construct(&self, variant: &str, values: &[(&str, u64)]) -> Result<Vec<u64>> {
        let variant = self.variant(variant)?;
        let block = &variant.block;
        let mut words = vec![0; self.multiple];
        for &(name, value) in values {
            self.check_accessible(block, name)?;
            block.set(&mut words, name, value)?;
        }
        match &self.encoding {
            TagEncoding::Sliced(sliced) => words[sliced.index] |= sliced.expand(variant.value),
            TagEncoding::Classed(_) => block
                .access_of(&self.tag_name)?
                .write(&mut words, variant.value),
        }
        Ok(words)
    }

    pub fn get(&self, words: &[u64], variant: &str, field: &str) -> Result<u64> {
        let variant = self.checked_variant(words, variant)?;
        self.check_accessible(&variant.block, field)?;
        variant.block.get(words, field)
    }

    pub fn set(&self, words: &mut [u64], variant: &str, field: &str, value: u64) -> Result<()> {
        let variant = self.checked_variant(words, variant)?;
        self.check_accessible(&variant.block, field)?;
        variant.block.set(words, field, value)
    }

    /// Whether `words` hold `variant`, by the check guarding its accessors.
    pub fn variant_matches(&self, words: &[u64], variant: &str) -> Result<bool> {
        Ok(self.variant(variant)?.check.holds(words))
    }

    fn checked_variant(&self, words: &[u64], name: &str) -> Result<&Variant> {
        let variant = self.variant(name)?;
        if variant.check.holds(words) {
            Ok(variant)
        } else {
            Err(Error::WrongVariant {
                union: self.name.clone(),
                variant: name.to_string(),
            })
        }
    }

    fn check_accessible(&self, block: &Block, field: &str) -> Result<()> {
        if self.is_tag_field(field) {
            Err(Error::UnknownField {
                block: block.name.clone(),
                field: field.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// The word index shared by every tag offset.
fn tag_word(union: &str, mut offsets: impl Iterator<Item = u32>, bits: u32) -> Result<usize> {
    let first = offsets.next().map_or(0, |offset| offset / bits);
    if offsets.any(|offset| offset / bits != first) {
        return Err(Error::TagWordMismatch {
            union: union.to_string(),
        });
    }
    Ok(first as usize)
}

fn compress_value(raw: &RawUnion, variant: &str, values: &[u64], tag: &SlicedTag) -> Result<u64> {
    let too_large = |value| Error::TagValueTooLarge {
        union: raw.name.clone(),
        variant: variant.to_string(),
        value,
    };
    match values {
        [compressed] => {
            if *compressed & !low_mask(tag.width()) != 0 {
                return Err(too_large(*compressed));
            }
            Ok(*compressed)
        }
        parts if parts.len() == tag.slices.len() => {
            let mut compressed = 0;
            for (&part, slice) in parts.iter().zip(&tag.slices) {
                if part > low_mask(slice.size) {
                    return Err(too_large(part));
                }
                compressed |= part.checked_shl(slice.position).ok_or_else(|| too_large(part))?;
            }
            Ok(compressed)
        }
        parts => Err(Error::TagArity {
            union: raw.name.clone(),
            variant: variant.to_string(),
            expected: tag.slices.len(),
            found: parts.len(),
        }),
    }
}

/// Computes and validates the class table of a classed tag. `offsets` maps
/// each used width to its field's absolute offset.
fn make_classes(
    raw: &RawUnion,
    offsets: &BTreeMap<u32, u32>,
    index: usize,
    bits: u32,
) -> Result<ClassedTag> {
    let context = format!("masks for {}.{}", raw.name, raw.tag_name);

    let mut declared = BTreeMap::new();
    for &(width, mask) in &raw.masks {
        if declared.insert(width, mask).is_some() {
            return Err(Error::DuplicateMask {
                context,
                width,
            });
        }
    }
    if declared.is_empty()
        && let Some(&smallest) = offsets.keys().next()
    {
        declared.insert(smallest, 0);
    }

    if let Some(&width) = offsets.keys().find(|w| !declared.contains_key(w)) {
        return Err(Error::UndeclaredClass { context, width });
    }
    if let Some(&width) = declared.keys().find(|w| !offsets.contains_key(w)) {
        return Err(Error::UnusedClass { context, width });
    }

    let class_offset = offsets.values().copied().min().unwrap_or(0);
    let mut classes = Vec::with_capacity(declared.len());
    for (&width, &mask) in &declared {
        if mask & !low_mask(width) != 0 {
            return Err(Error::ClassMaskOutOfBounds {
                context,
                width,
                mask,
            });
        }
        let offset = offsets[&width];
        let classmask = mask << (offset - class_offset);
        classes.push(TagClass {
            width,
            offset,
            shift: offset % bits,
            declared: mask,
            classmask,
            word_classmask: classmask << (class_offset % bits),
        });
    }

    if classes.len() > 1 && classes[0].classmask == 0 {
        return Err(Error::ZeroFirstClass {
            context,
            width: classes[0].width,
        });
    }

    // Only the final pair of classes may share a mask.
    let non_final = classes.len().saturating_sub(2);
    if classes
        .windows(2)
        .take(non_final)
        .any(|pair| pair[0].classmask == pair[1].classmask)
    {
        return Err(Error::DuplicateClass { context });
    }

    for pair in classes.windows(2) {
        let (smaller, larger) = (&pair[0], &pair[1]);
        if larger.classmask & smaller.classmask != smaller.classmask {
            return Err(Error::ClassNotNested {
                context,
                width: larger.width,
                mask: larger.classmask,
                smaller: smaller.width,
                smaller_mask: smaller.classmask,
            });
        }
    }

    let tag = ClassedTag {
        index,
        class_offset,
        classes,
    };
    log::info!("-----{}.{}", raw.name, raw.tag_name);
    for class in &tag.classes {
        log::info!("{:2} = {}", class.width, tag.diagram(class));
    }
    Ok(tag)
}

/// Checks that a variant's tag value lies in its own class: it fits the
/// field, carries every narrower class's escape pattern and, unless its class
/// is the widest, does not itself escape.
fn check_value_in_class(
    raw: &RawUnion,
    variant: &Variant,
    tag: &ClassedTag,
    width: u32,
) -> Result<()> {
    let value = variant.value;
    let Some(class) = tag.class(width) else {
        return Err(Error::UndeclaredClass {
            context: format!("masks for {}.{}", raw.name, raw.tag_name),
            width,
        });
    };
    if value & !class.value_mask() != 0 {
        return Err(Error::TagValueOutOfField {
            union: raw.name.clone(),
            variant: variant.name.clone(),
            value,
            width,
        });
    }

    let relative = value << (class.offset - tag.class_offset);
    for narrower in tag.classes.iter().take_while(|c| c.width < width) {
        if relative & narrower.classmask != narrower.classmask {
            return Err(Error::TagValueMissesClass {
                union: raw.name.clone(),
                variant: variant.name.clone(),
                value,
                width,
                class_width: narrower.width,
            });
        }
    }

    let widest = tag.classes.last().is_some_and(|c| c.width == width);
    if !widest && relative & class.classmask == class.classmask {
        return Err(Error::TagValueEscapes {
            union: raw.name.clone(),
            variant: variant.name.clone(),
            value,
            width,
        });
    }
    Ok(())
}
