// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::path::PathBuf;

/// Every way a compilation can fail.
///
/// None of these are recoverable: a malformed specification never yields
/// output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Lexical and syntactic errors.
    //
    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedCharacter { line: usize, found: char },

    #[error("line {line}: invalid integer literal '{literal}'")]
    InvalidInteger { line: usize, literal: String },

    #[error("line {line}: syntax error at token '{found}' (expected {expected})")]
    Syntax {
        line: usize,
        found: String,
        expected: &'static str,
    },

    //
    // Base declarations.
    //
    #[error("invalid base size: {base}")]
    InvalidBase { base: u64 },

    #[error("invalid base bits {base_bits} for base {base}")]
    InvalidBaseBits { base: u64, base_bits: u64 },

    #[error("invalid sign-extension flag {flag} for base {base} (expected 0 or 1)")]
    InvalidSignExtend { base: u64, flag: u64 },

    #[error("{object} is declared before any base")]
    NoBase { object: String },

    #[error("duplicate definition of {name}")]
    DuplicateSymbol { name: String },

    //
    // Block layout errors.
    //
    #[error("field {field} of block {block} has zero size")]
    ZeroSizedField { block: String, field: String },

    #[error("duplicate field {field} in block {block}")]
    DuplicateField { block: String, field: String },

    #[error("block {block} has no fields")]
    EmptyBlock { block: String },

    #[error("size of block {block} ({size} bits) not a multiple of base {base}")]
    SizeMismatch { block: String, size: u32, base: u32 },

    #[error("field {field} of block {block} crosses a word boundary")]
    CrossesWordBoundary { block: String, field: String },

    #[error(
        "high-aligned field {field} of block {block} is wider than the \
         {base_bits} base bits"
    )]
    HighFieldTooWide {
        block: String,
        field: String,
        base_bits: u32,
    },

    #[error("nonexistent field '{field}' in visible order of block {block}")]
    UnknownVisibleField { block: String, field: String },

    #[error("field '{field}' appears twice in visible order of block {block}")]
    DuplicateVisibleField { block: String, field: String },

    #[error("fields {fields:?} missing from visible order of block {block}")]
    MissingVisibleFields { block: String, fields: Vec<String> },

    #[error("field {field} of block {block} cannot hold {value:#x}")]
    InvalidFieldValue {
        block: String,
        field: String,
        value: u64,
    },

    #[error("block {block} has no accessible field {field}")]
    UnknownField { block: String, field: String },

    //
    // Tagged union errors.
    //
    #[error("tagged union {union} has no tags")]
    EmptyUnion { union: String },

    #[error("tagged union {union} refers to unknown block {block}")]
    UnknownBlock { union: String, block: String },

    #[error("block {block} of tagged union {union} has no tag field {field}")]
    MissingTagField {
        union: String,
        block: String,
        field: String,
    },

    #[error("tag slice {slice} appears twice in tagged union {union}")]
    DuplicateTagSlice { union: String, slice: String },

    #[error("tagged union {union} has both sliced tags and class masks")]
    SlicedWithClasses { union: String },

    #[error(
        "tag value for element {variant} of tagged union {union} has \
         {found} parts (expected {expected})"
    )]
    TagArity {
        union: String,
        variant: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "tag value {value:#x} for element {variant} of tagged union {union} \
         is too large for its field size"
    )]
    TagValueTooLarge {
        union: String,
        variant: String,
        value: u64,
    },

    #[error("duplicate tag name {name} in tagged union {union}")]
    DuplicateTagName { union: String, name: String },

    #[error("duplicate tag value {value} in tagged union {union}")]
    DuplicateTagValue { union: String, value: u64 },

    #[error("{context}: duplicate mask for a field of {width} bits")]
    DuplicateMask { context: String, width: u32 },

    #[error("{context}: none defined for a field of {width} bits")]
    UndeclaredClass { context: String, width: u32 },

    #[error("{context}: there is a mask with {width} bits but no corresponding fields")]
    UnusedClass { context: String, width: u32 },

    #[error("{context}: the mask for {width} bits {mask:#x} exceeds the field bounds")]
    ClassMaskOutOfBounds {
        context: String,
        width: u32,
        mask: u64,
    },

    #[error("{context}: the first mask (width {width}) is zero")]
    ZeroFirstClass { context: String, width: u32 },

    #[error("{context}: there is a non-final duplicate mask")]
    DuplicateClass { context: String },

    #[error(
        "{context}: the mask {mask:#b} for width {width} does not include the \
         mask {smaller_mask:#b} for width {smaller}"
    )]
    ClassNotNested {
        context: String,
        width: u32,
        mask: u64,
        smaller: u32,
        smaller_mask: u64,
    },

    #[error(
        "the value {value:#x} for element {variant} of tagged union {union} \
         exceeds the bounds of its {width}-bit field"
    )]
    TagValueOutOfField {
        union: String,
        variant: String,
        value: u64,
        width: u32,
    },

    #[error(
        "the value {value:#x} for element {variant} of tagged union {union} \
         has {width} bits but fails to match the earlier mask at {class_width} bits"
    )]
    TagValueMissesClass {
        union: String,
        variant: String,
        value: u64,
        width: u32,
        class_width: u32,
    },

    #[error(
        "the value {value:#x} for element {variant} of tagged union {union} \
         must not match the mask for {width} bits"
    )]
    TagValueEscapes {
        union: String,
        variant: String,
        value: u64,
        width: u32,
    },

    #[error("{what} mismatch for element {variant} of tagged union {union}")]
    VariantMismatch {
        union: String,
        variant: String,
        what: &'static str,
    },

    #[error("tag field is high-aligned for element {variant} of tagged union {union}")]
    HighAlignedTag { union: String, variant: String },

    #[error("the tag field of tagged union {union} spans more than one word")]
    TagWordMismatch { union: String },

    #[error("tagged union {union} has no element {variant}")]
    UnknownVariant { union: String, variant: String },

    #[error("value of tagged union {union} does not hold element {variant}")]
    WrongVariant { union: String, variant: String },

    //
    // Verification topology errors.
    //
    #[error("line {line} of type map: {message}")]
    Topology { line: usize, message: String },

    #[error("type {ty} has multiple parents")]
    MultipleParents { ty: String },

    //
    // Driver errors.
    //
    #[error("{0}")]
    MissingArgument(&'static str),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("generated Rust failed to parse: {0}")]
    Render(#[from] syn::Error),

    #[error("failed to serialize verification artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
