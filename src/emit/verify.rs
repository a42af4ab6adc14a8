// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Verification descriptors.
//!
//! Rather than proof-assistant text, the verification targets describe the
//! same facts as plain data, serialized as JSON:
//!
//! * definitions: a logical record per block and per union variant, the lift
//!   from packed words to those records, the tag reader of each union and the
//!   mask facts a classed tag needs;
//! * proofs: one obligation per emitted function relating it to the lift,
//!   plus pointer-guard facts per struct and, for pointer functions, the
//!   frame locating the value in the heap.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::Emit;
use crate::error::Result;
use crate::layout::{Block, Field};
use crate::topology::Frame;
use crate::union::{TagEncoding, TaggedUnion};
use crate::word::{Base, BaseSpec, Shift, low_mask};

/// The C parser's name for the return value of a function returning a word.
fn return_name(base: Base) -> &'static str {
    match base {
        Base::U8 => "ret__unsigned_char",
        Base::U16 => "ret__unsigned_short",
        Base::U32 => "ret__unsigned",
        Base::U64 => "ret__unsigned_longlong",
    }
}

/// The mask applied to a field after shifting it out of its word, as a word
/// expression. Full-word fields need none.
fn field_mask(base: BaseSpec, field: &Field) -> Option<String> {
    if field.size == base.base.bits() {
        return None;
    }
    Some(if !field.high {
        format!("mask {}", field.size)
    } else if base.base_bits == base.base.bits() || base.sign_extend {
        format!("NOT (mask {})", base.base_bits - field.size)
    } else {
        format!("(mask {} << {})", field.size, base.base_bits - field.size)
    })
}

/// Upper-cases the first character, for datatype constructors.
fn capitalise(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LiftField {
    pub field: String,
    /// The field of the logical record.
    pub record_field: String,
    pub index: usize,
    pub shift: Shift,
    /// Applied after the shift.
    pub mask: Option<String>,
    pub value_mask: u64,
    /// The bit sign-extended from, if any.
    pub sign_extend: Option<u32>,
}

impl LiftField {
    fn new(block: &Block, field: &Field) -> Option<Self> {
        let name = field.name.clone()?;
        let access = block.access(field);
        Some(Self {
            record_field: format!("{name}_CL"),
            field: name,
            index: access.index,
            shift: access.read_shift,
            mask: field_mask(block.base, field),
            value_mask: access.value_mask,
            sign_extend: access.sign_extend.map(|ext| ext.extend_bit),
        })
    }
}

fn lift_fields<'a>(block: &Block, fields: impl Iterator<Item = &'a str>) -> Vec<LiftField> {
    fields
        .filter_map(|name| block.field(name))
        .filter_map(|field| LiftField::new(block, field))
        .collect()
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BlockDefs {
    pub name: String,
    pub record: String,
    pub lift: String,
    pub base: u32,
    pub words: usize,
    /// In constructor order.
    pub fields: Vec<LiftField>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SlicePart {
    pub size: u32,
    /// Bit offset within the tag word.
    pub offset: u32,
    /// Moves the slice to its place in the compressed tag.
    pub shift: Shift,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClassTest {
    pub width: u32,
    pub shift: u32,
    /// The escape pattern; `None` for the final, unconditional class.
    pub classmask: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TagReader {
    /// The OR of every slice, each masked and shifted into place.
    Compressed { index: usize, parts: Vec<SlicePart> },
    /// The first class whose escape pattern is absent, narrowest first.
    Cascade { index: usize, classes: Vec<ClassTest> },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MaskPart {
    pub mask: u64,
    pub value: u64,
}

/// For a tag value of a wide class: `w & full_mask == full_value` implies
/// `w & part.mask == part.value` for every narrower class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MaskHelpers {
    pub variant: String,
    pub lemma: String,
    pub full_mask: u64,
    pub full_value: u64,
    pub parts: Vec<MaskPart>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VariantDefs {
    pub name: String,
    pub constructor: String,
    /// `None` when the variant has no fields besides its tag.
    pub record: Option<String>,
    pub tag_value: u64,
    pub fields: Vec<LiftField>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UnionDefs {
    pub name: String,
    pub datatype: String,
    /// Partial: undeclared tag values lift to nothing.
    pub lift: String,
    pub base: u32,
    pub words: usize,
    pub get_tag: String,
    pub tag_reader: TagReader,
    pub mask_helpers: Vec<MaskHelpers>,
    pub variants: Vec<VariantDefs>,
}

#[derive(Debug, Default, Serialize)]
struct DefinitionsDocument {
    theory: Option<String>,
    blocks: Vec<BlockDefs>,
    unions: Vec<UnionDefs>,
}

/// The definitions target.
pub struct Definitions {
    document: DefinitionsDocument,
}

impl Definitions {
    #[must_use]
    pub fn new(module: Option<String>) -> Self {
        Self {
            document: DefinitionsDocument {
                theory: module.map(|module| format!("{module}_defs")),
                ..DefinitionsDocument::default()
            },
        }
    }
}

fn tag_reader(union: &TaggedUnion) -> TagReader {
    match &union.encoding {
        TagEncoding::Sliced(sliced) => TagReader::Compressed {
            index: sliced.index,
            parts: sliced
                .slices
                .iter()
                .map(|slice| SlicePart {
                    size: slice.size,
                    offset: slice.shift,
                    shift: slice.compress_shift(),
                })
                .collect(),
        },
        TagEncoding::Classed(classed) => {
            let last = classed.classes.len().saturating_sub(1);
            TagReader::Cascade {
                index: classed.index,
                classes: classed
                    .classes
                    .iter()
                    .enumerate()
                    .map(|(i, class)| ClassTest {
                        width: class.width,
                        shift: class.shift,
                        classmask: (i < last).then_some(class.word_classmask),
                    })
                    .collect(),
            }
        }
    }
}

fn mask_helpers(union: &TaggedUnion) -> Vec<MaskHelpers> {
    let TagEncoding::Classed(classed) = &union.encoding else {
        return Vec::new();
    };
    let mut helpers = Vec::new();
    for variant in &union.variants {
        let Some(width) = variant.block.field(&union.tag_name).map(|f| f.size) else {
            continue;
        };
        let parts = classed
            .classes
            .iter()
            .filter(|class| class.width < width)
            .map(|class| MaskPart {
                mask: low_mask(class.width),
                value: variant.value & low_mask(class.width),
            })
            .collect::<Vec<_>>();
        if !parts.is_empty() {
            helpers.push(MaskHelpers {
                variant: variant.name.clone(),
                lemma: format!("{}_{}_tag_mask_helpers", union.name, variant.name),
                full_mask: low_mask(width),
                full_value: variant.value,
                parts,
            });
        }
    }
    helpers
}

impl Emit for Definitions {
    fn block(&mut self, block: &Block, _names: &BTreeSet<String>) -> Result<()> {
        self.document.blocks.push(BlockDefs {
            name: block.name.clone(),
            record: format!("{}_CL", block.name),
            lift: format!("{}_lift", block.name),
            base: block.base.base.bits(),
            words: block.multiple,
            fields: lift_fields(block, block.visible_order.iter().map(String::as_str)),
        });
        Ok(())
    }

    fn union(&mut self, union: &TaggedUnion, _names: &BTreeSet<String>) -> Result<()> {
        let variants = union
            .variants
            .iter()
            .map(|variant| {
                let fields = lift_fields(&variant.block, union.params(variant));
                let prefix = format!("{}_{}", union.name, variant.name);
                VariantDefs {
                    name: variant.name.clone(),
                    constructor: format!("{}_{}", capitalise(&union.name), variant.name),
                    record: (!fields.is_empty()).then(|| format!("{prefix}_CL")),
                    tag_value: variant.value,
                    fields,
                }
            })
            .collect();
        self.document.unions.push(UnionDefs {
            name: union.name.clone(),
            datatype: format!("{}_CL", union.name),
            lift: format!("{}_lift", union.name),
            base: union.base.base.bits(),
            words: union.multiple,
            get_tag: format!("{}_get_tag", union.name),
            tag_reader: tag_reader(union),
            mask_helpers: mask_helpers(union),
            variants,
        });
        Ok(())
    }

    fn finish(self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }
}

/// What the proofs target needs beyond the objects themselves.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProofConfig {
    /// Names the theory, `<module>_proofs`.
    pub module: String,
    /// The frame of every type reachable from a toplevel heap type.
    pub frames: BTreeMap<String, Frame>,
    pub skip_modifies: bool,
    pub sorry: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Proved,
    Sorry,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    ConstModifies,
    PtrSetModifies,
    NewSpec,
    PtrNewSpec,
    GetSpec,
    SetSpec,
    PtrGetSpec,
    PtrSetSpec,
    GetTagSpec,
    TagEqualsSpec,
    PtrGetTagSpec,
    UnionNewSpec,
    EmptyUnionNewSpec,
    PtrUnionNewSpec,
    PtrEmptyUnionNewSpec,
    UnionGetSpec,
    UnionSetSpec,
    PtrUnionGetSpec,
    PtrUnionSetSpec,
}

impl Kind {
    /// Whether the obligation is about a value reached through a pointer.
    const fn needs_frame(self) -> bool {
        matches!(
            self,
            Self::PtrNewSpec
                | Self::PtrGetSpec
                | Self::PtrSetSpec
                | Self::PtrGetTagSpec
                | Self::PtrUnionNewSpec
                | Self::PtrEmptyUnionNewSpec
                | Self::PtrUnionGetSpec
                | Self::PtrUnionSetSpec
        )
    }
}

/// Facts about the field an accessor obligation concerns.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldFacts {
    pub field: String,
    pub mask: Option<String>,
    pub sign_extend: Option<u32>,
    pub return_name: &'static str,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Obligation {
    pub function: String,
    pub kind: Kind,
    /// Variables a `modifies` obligation quantifies over.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldFacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
    pub status: Status,
}

/// Pointer-guard facts for a struct's word array.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StructFacts {
    pub name: String,
    pub words: usize,
    pub base: u32,
    pub lemmas: Vec<String>,
    pub status: Status,
}

#[derive(Debug, Default, Serialize)]
struct ProofsDocument {
    theory: String,
    imports: Vec<String>,
    structs: Vec<StructFacts>,
    obligations: Vec<Obligation>,
}

/// The proofs target.
pub struct Proofs {
    config: ProofConfig,
    document: ProofsDocument,
}

/// Collects the obligations of one object, dropping those for functions
/// pruned away and pointer obligations for types without a frame.
struct Collector<'a> {
    config: &'a ProofConfig,
    names: &'a BTreeSet<String>,
    frame: Option<&'a Frame>,
    obligations: Vec<Obligation>,
}

impl Collector<'_> {
    fn status(&self) -> Status {
        if self.config.sorry {
            Status::Sorry
        } else {
            Status::Proved
        }
    }

    fn add(&mut self, function: &str, kind: Kind, field: Option<FieldFacts>) {
        if !self.names.contains(function) {
            return;
        }
        let frame = if kind.needs_frame() {
            let Some(frame) = self.frame else {
                return;
            };
            Some(frame.clone())
        } else {
            None
        };
        self.obligations.push(Obligation {
            function: function.to_string(),
            kind,
            args: Vec::new(),
            field,
            frame,
            status: self.status(),
        });
    }

    fn modifies(&mut self, function: &str, kind: Kind, args: Vec<String>) {
        if self.config.skip_modifies || !self.names.contains(function) {
            return;
        }
        self.obligations.push(Obligation {
            function: function.to_string(),
            kind,
            args,
            field: None,
            frame: None,
            status: self.status(),
        });
    }
}

fn field_facts(block: &Block, field: &Field, name: &str) -> FieldFacts {
    FieldFacts {
        field: name.to_string(),
        mask: field_mask(block.base, field),
        sign_extend: block.access(field).sign_extend.map(|ext| ext.extend_bit),
        return_name: return_name(block.base.base),
    }
}

impl Proofs {
    #[must_use]
    pub fn new(config: ProofConfig) -> Self {
        let document = ProofsDocument {
            theory: format!("{}_proofs", config.module),
            imports: vec![format!("{}_defs", config.module)],
            ..ProofsDocument::default()
        };
        Self { config, document }
    }

    fn struct_facts(&mut self, name: &str, words: usize, base: Base) {
        let status = if self.config.sorry {
            Status::Sorry
        } else {
            Status::Proved
        };
        self.document.structs.push(StructFacts {
            name: name.to_string(),
            words,
            base: base.bits(),
            lemmas: ["words_NULL", "words_aligned", "words_ptr_safe"]
                .iter()
                .map(|lemma| format!("{name}_ptr_{lemma}"))
                .chain(std::iter::once(format!("{name}_ptr_guards")))
                .collect(),
            status,
        });
    }

    fn collector<'a>(&'a self, name: &str, names: &'a BTreeSet<String>) -> Collector<'a> {
        Collector {
            config: &self.config,
            names,
            frame: self.config.frames.get(name),
            obligations: Vec::new(),
        }
    }
}

impl Emit for Proofs {
    fn block(&mut self, block: &Block, names: &BTreeSet<String>) -> Result<()> {
        self.struct_facts(&block.name, block.multiple, block.base.base);

        let b = &block.name;
        let word = block.base.base.bits();
        let ret = return_name(block.base.base).to_string();
        let mut collector = self.collector(b, names);

        let new = format!("{b}_new");
        collector.modifies(
            &new,
            Kind::ConstModifies,
            std::iter::once(format!("ret__struct_{b}_C"))
                .chain(block.visible_order.iter().cloned())
                .collect(),
        );
        collector.add(&new, Kind::NewSpec, None);
        collector.add(&format!("{b}_ptr_new"), Kind::PtrNewSpec, None);

        for field in block.fields() {
            let Some(name) = field.name.as_deref() else { continue };
            let facts = field_facts(block, field, name);
            let get = format!("{b}_get_{name}");
            let set = format!("{b}_set_{name}");
            let ptr_get = format!("{b}_ptr_get_{name}");
            let ptr_set = format!("{b}_ptr_set_{name}");

            collector.modifies(&get, Kind::ConstModifies, vec![ret.clone(), b.clone()]);
            collector.modifies(&ptr_get, Kind::ConstModifies, vec![ret.clone(), format!("{b}_ptr")]);
            collector.add(&get, Kind::GetSpec, Some(facts.clone()));
            collector.modifies(
                &set,
                Kind::ConstModifies,
                vec![format!("ret__struct_{b}_C"), b.clone(), format!("v{word}")],
            );
            collector.modifies(
                &ptr_set,
                Kind::PtrSetModifies,
                vec![format!("{b}_ptr"), format!("v{word}")],
            );
            collector.add(&set, Kind::SetSpec, Some(facts.clone()));
            collector.add(&ptr_get, Kind::PtrGetSpec, Some(facts.clone()));
            collector.add(&ptr_set, Kind::PtrSetSpec, Some(facts));
        }

        let obligations = collector.obligations;
        self.document.obligations.extend(obligations);
        Ok(())
    }

    fn union(&mut self, union: &TaggedUnion, names: &BTreeSet<String>) -> Result<()> {
        self.struct_facts(&union.name, union.multiple, union.base.base);

        let u = &union.name;
        let tag = &union.tag_name;
        let word = union.base.base.bits();
        let ret = return_name(union.base.base).to_string();
        let mut collector = self.collector(u, names);

        let get_tag = format!("{u}_get_{tag}");
        let ptr_get_tag = format!("{u}_ptr_get_{tag}");
        collector.modifies(&get_tag, Kind::ConstModifies, vec![ret.clone(), u.clone()]);
        collector.modifies(&ptr_get_tag, Kind::ConstModifies, vec![ret.clone(), format!("{u}_ptr")]);
        collector.add(&get_tag, Kind::GetTagSpec, None);
        collector.add(&format!("{u}_{tag}_equals"), Kind::TagEqualsSpec, None);
        collector.add(&ptr_get_tag, Kind::PtrGetTagSpec, None);

        for variant in &union.variants {
            let prefix = format!("{u}_{}", variant.name);
            let params = union.params(variant).map(ToString::to_string).collect::<Vec<_>>();
            let new = format!("{prefix}_new");
            let ptr_new = format!("{prefix}_ptr_new");
            collector.modifies(
                &new,
                Kind::ConstModifies,
                std::iter::once(format!("ret__struct_{u}_C"))
                    .chain(params.iter().cloned())
                    .collect(),
            );
            collector.modifies(
                &ptr_new,
                Kind::PtrSetModifies,
                std::iter::once(format!("{u}_ptr"))
                    .chain(params.iter().cloned())
                    .collect(),
            );
            if params.is_empty() {
                collector.add(&new, Kind::EmptyUnionNewSpec, None);
                collector.add(&ptr_new, Kind::PtrEmptyUnionNewSpec, None);
            } else {
                collector.add(&new, Kind::UnionNewSpec, None);
                collector.add(&ptr_new, Kind::PtrUnionNewSpec, None);
            }

            let block = &variant.block;
            for field in union.fields(variant) {
                let Some(name) = field.name.as_deref() else { continue };
                let facts = field_facts(block, field, name);
                let get = format!("{prefix}_get_{name}");
                let set = format!("{prefix}_set_{name}");
                let ptr_get = format!("{prefix}_ptr_get_{name}");
                let ptr_set = format!("{prefix}_ptr_set_{name}");

                collector.modifies(&get, Kind::ConstModifies, vec![ret.clone(), u.clone()]);
                collector.modifies(&ptr_get, Kind::ConstModifies, vec![ret.clone(), format!("{u}_ptr")]);
                collector.add(&get, Kind::UnionGetSpec, Some(facts.clone()));
                collector.modifies(
                    &set,
                    Kind::ConstModifies,
                    vec![format!("ret__struct_{u}_C"), u.clone(), format!("v{word}")],
                );
                collector.modifies(
                    &ptr_set,
                    Kind::PtrSetModifies,
                    vec![format!("{u}_ptr"), format!("v{word}")],
                );
                collector.add(&set, Kind::UnionSetSpec, Some(facts.clone()));
                collector.add(&ptr_get, Kind::PtrUnionGetSpec, Some(facts.clone()));
                collector.add(&ptr_set, Kind::PtrUnionSetSpec, Some(facts));
            }
        }

        let obligations = collector.obligations;
        self.document.obligations.extend(obligations);
        Ok(())
    }

    fn finish(self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_masks() {
        let field = |size, high| Field {
            name: Some("f".to_string()),
            offset: 0,
            size,
            high,
        };
        let plain = BaseSpec::plain(Base::U64);
        let narrow = BaseSpec::new(64, 48, 0).unwrap();
        let extended = BaseSpec::new(64, 48, 1).unwrap();

        assert_eq!(field_mask(plain, &field(4, false)).as_deref(), Some("mask 4"));
        assert_eq!(field_mask(plain, &field(64, false)), None);
        assert_eq!(field_mask(plain, &field(40, true)).as_deref(), Some("NOT (mask 24)"));
        assert_eq!(field_mask(extended, &field(40, true)).as_deref(), Some("NOT (mask 8)"));
        assert_eq!(
            field_mask(narrow, &field(40, true)).as_deref(),
            Some("(mask 40 << 8)")
        );
    }

    #[test]
    fn names() {
        assert_eq!(capitalise("cap"), "Cap");
        assert_eq!(capitalise(""), "");
        assert_eq!(return_name(Base::U16), "ret__unsigned_short");
    }
}
