// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The C header target.
//!
//! Each function is assembled from typed fragments: constants know their
//! word width, field code is derived from a [`FieldAccess`] and storage
//! knows whether it is reached by value or through a pointer. The text is
//! only ever produced from those, never from hand-formatted arithmetic.

use std::collections::BTreeSet;
use std::fmt;

use super::Emit;
use crate::env::Environment;
use crate::error::Result;
use crate::layout::{Block, FieldAccess};
use crate::union::{TagClass, TagEncoding, TaggedUnion, Variant};
use crate::word::{Base, low_mask};

/// A constant carrying the literal suffix of its word.
#[derive(Clone, Copy, Debug)]
struct Const {
    value: u64,
    base: Base,
}

impl Const {
    const fn new(value: u64, base: Base) -> Self {
        Self { value, base }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}{}", self.value, self.base.c_suffix())
    }
}

/// Where a function finds its words.
#[derive(Clone, Copy, Debug)]
enum Storage<'a> {
    /// A struct passed and returned by value, named after its type.
    Value(&'a str),
    /// A pointer named `<type>_ptr`.
    Pointer(&'a str),
}

impl Storage<'_> {
    fn word(self, index: usize) -> String {
        match self {
            Self::Value(name) => format!("{name}.words[{index}]"),
            Self::Pointer(name) => format!("{name}_ptr->words[{index}]"),
        }
    }
}

/// The code moving one field in and out of its word.
struct FieldCode {
    access: FieldAccess,
}

impl FieldCode {
    fn word_mask(&self) -> Const {
        Const::new(self.access.word_mask, self.access.base)
    }

    fn value_mask(&self) -> Const {
        Const::new(self.access.value_mask, self.access.base)
    }

    /// Body lines of a getter, ending in `return ret;`.
    fn read(&self, storage: Storage<'_>, word_type: &str) -> Vec<String> {
        let mut lines = vec![
            format!("{word_type} ret;"),
            format!(
                "ret = ({} & {}) {};",
                storage.word(self.access.index),
                self.word_mask(),
                self.access.read_shift
            ),
        ];
        if let Some(ext) = self.access.sign_extend {
            let base = self.access.base;
            lines.push("/* Possibly sign extend */".to_string());
            lines.push(format!(
                "if (__builtin_expect(!!(ret & ({} << {})), 1)) {{",
                Const::new(1, base),
                ext.extend_bit
            ));
            lines.push(format!("    ret |= {};", Const::new(ext.high_bits, base)));
            lines.push("}".to_string());
        }
        lines.push("return ret;".to_string());
        lines
    }

    /// The assertion that `value` loses no bits, if one is needed.
    fn check(&self, assert: &str, value: &str) -> Option<String> {
        if self.access.is_full_word() {
            return None;
        }
        let expected = match self.access.sign_extend {
            Some(ext) => format!(
                "(({value} & ({} << {})) ? {} : 0)",
                Const::new(1, self.access.base),
                ext.extend_bit,
                Const::new(ext.high_bits, self.access.base)
            ),
            None => "0".to_string(),
        };
        Some(format!(
            "{assert}(({value} & ~{}) == {expected});",
            self.value_mask()
        ))
    }

    fn write(&self, storage: Storage<'_>, value: &str) -> Vec<String> {
        let word = storage.word(self.access.index);
        vec![
            format!("{word} &= ~{};", self.word_mask()),
            format!(
                "{word} |= ({value} {}) & {};",
                self.access.write_shift(),
                self.word_mask()
            ),
        ]
    }

    /// A constructor term ORed into the field's word.
    fn init(&self, value: &str) -> String {
        if self.access.is_full_word() {
            format!("{value} {}", self.access.write_shift())
        } else {
            format!("({value} & {}) {}", self.value_mask(), self.access.write_shift())
        }
    }
}

/// The assertion that a union value holds a given variant.
struct Guard {
    index: usize,
    shift: u32,
    mask: Const,
    value: String,
}

impl Guard {
    fn line(&self, assert: &str, storage: Storage<'_>) -> String {
        format!(
            "{assert}((({} >> {}) & {}) == {});",
            storage.word(self.index),
            self.shift,
            self.mask,
            self.value
        )
    }
}

/// One family of accessors: a standalone block, or one variant of a union.
struct Family<'a> {
    env: Environment,
    word_type: String,
    /// The C struct, also the name of its by-value variable.
    ty: &'a str,
    /// Prefix of every function name.
    prefix: String,
    multiple: usize,
    guard: Option<Guard>,
}

/// A constructor parameter or fixed value, and the field it lands in.
struct Init {
    index: usize,
    term: String,
    check: Option<String>,
}

impl Family<'_> {
    fn function(&self, qualifiers: &str, name: &str, params: &str, body: &[String]) -> String {
        let mut out = format!("{} {qualifiers}\n{name}({params}) {{\n", self.env.inline());
        for line in body {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('}');
        out
    }

    fn value_param(&self) -> String {
        format!("{ty}_t {ty}", ty = self.ty)
    }

    fn pointer_param(&self) -> String {
        format!("{ty}_t *{ty}_ptr", ty = self.ty)
    }

    fn guard_line(&self, storage: Storage<'_>) -> Option<String> {
        self.guard
            .as_ref()
            .map(|guard| guard.line(self.env.assert(), storage))
    }

    fn constructors(&self, params: &[&str], inits: &[Init], names: &BTreeSet<String>, out: &mut Vec<String>) {
        let param_list = params
            .iter()
            .map(|param| format!("{} {param}", self.word_type))
            .collect::<Vec<_>>();
        let checks = inits
            .iter()
            .filter_map(|init| init.check.clone())
            .collect::<Vec<_>>();
        let mut asserts = Vec::new();
        if !checks.is_empty() {
            asserts.push("/* fail if user has passed bits that we will override */".to_string());
            asserts.extend(checks);
            asserts.push(String::new());
        }
        let word_inits = |storage: Storage<'_>| {
            (0..self.multiple)
                .map(|index| {
                    let mut line = format!("{} = 0", storage.word(index));
                    for init in inits.iter().filter(|init| init.index == index) {
                        line.push_str("\n        | ");
                        line.push_str(&init.term);
                    }
                    line.push(';');
                    line
                })
                .collect::<Vec<_>>()
        };

        let name = format!("{}_new", self.prefix);
        if names.contains(&name) {
            let mut body = vec![format!("{ty}_t {ty};", ty = self.ty), String::new()];
            body.extend(asserts.iter().cloned());
            body.extend(word_inits(Storage::Value(self.ty)));
            body.push(String::new());
            body.push(format!("return {};", self.ty));
            let params = if param_list.is_empty() {
                "void".to_string()
            } else {
                param_list.join(", ")
            };
            out.push(self.function(&format!("{}_t CONST", self.ty), &name, &params, &body));
        }

        let name = format!("{}_ptr_new", self.prefix);
        if names.contains(&name) {
            let mut body = asserts.clone();
            body.extend(word_inits(Storage::Pointer(self.ty)));
            let params = std::iter::once(self.pointer_param())
                .chain(param_list.iter().cloned())
                .collect::<Vec<_>>()
                .join(", ");
            out.push(self.function("void", &name, &params, &body));
        }
    }

    fn accessors(&self, field: &str, code: &FieldCode, names: &BTreeSet<String>, out: &mut Vec<String>) {
        let assert = self.env.assert();
        let value = format!("v{}", code.access.base);
        let value_param = format!("{} {value}", self.word_type);

        let reader = |storage: Storage<'_>| {
            let mut body = Vec::new();
            if let Some(guard) = self.guard_line(storage) {
                body.push(guard);
                body.push(String::new());
            }
            body.extend(code.read(storage, &self.word_type));
            body
        };
        let writer = |storage: Storage<'_>| {
            let mut body = Vec::new();
            body.extend(self.guard_line(storage));
            if let Some(check) = code.check(assert, &value) {
                body.push("/* fail if user has passed bits that we will override */".to_string());
                body.push(check);
            }
            body.push(String::new());
            body.extend(code.write(storage, &value));
            body
        };

        let name = format!("{}_get_{field}", self.prefix);
        if names.contains(&name) {
            let body = reader(Storage::Value(self.ty));
            out.push(self.function(
                &format!("{} CONST", self.word_type),
                &name,
                &self.value_param(),
                &body,
            ));
        }

        let name = format!("{}_set_{field}", self.prefix);
        if names.contains(&name) {
            let mut body = writer(Storage::Value(self.ty));
            body.push(format!("return {};", self.ty));
            out.push(self.function(
                &format!("{}_t CONST", self.ty),
                &name,
                &format!("{}, {value_param}", self.value_param()),
                &body,
            ));
        }

        let name = format!("{}_ptr_get_{field}", self.prefix);
        if names.contains(&name) {
            let body = reader(Storage::Pointer(self.ty));
            out.push(self.function(
                &format!("{} PURE", self.word_type),
                &name,
                &self.pointer_param(),
                &body,
            ));
        }

        let name = format!("{}_ptr_set_{field}", self.prefix);
        if names.contains(&name) {
            let body = writer(Storage::Pointer(self.ty));
            out.push(self.function(
                "void",
                &name,
                &format!("{}, {value_param}", self.pointer_param()),
                &body,
            ));
        }
    }
}

/// Builds a C header, one object at a time.
pub struct Header {
    env: Environment,
    out: String,
}

impl Header {
    #[must_use]
    pub fn new(env: Environment, from_file: Option<&str>) -> Self {
        let mut out = String::new();
        if let Some(file) = from_file {
            out.push_str(&format!("/* generated from {file} */\n\n"));
        }
        out.push_str("#pragma once\n\n");
        let includes = env.includes();
        for include in includes {
            out.push_str(&format!("#include <{include}>\n"));
        }
        if !includes.is_empty() {
            out.push('\n');
        }
        Self { env, out }
    }

    fn typedef(&mut self, name: &str, word_type: &str, multiple: usize) {
        self.out.push_str(&format!(
            "struct {name} {{\n    {word_type} words[{multiple}];\n}};\n\
             typedef struct {name} {name}_t;\n\n"
        ));
    }

    fn functions(&mut self, functions: Vec<String>) {
        for function in functions {
            self.out.push_str(&function);
            self.out.push_str("\n\n");
        }
    }
}

impl Emit for Header {
    fn block(&mut self, block: &Block, names: &BTreeSet<String>) -> Result<()> {
        let word_type = self.env.word_type(block.base.base);
        self.typedef(&block.name, &word_type, block.multiple);

        let family = Family {
            env: self.env,
            word_type,
            ty: &block.name,
            prefix: block.name.clone(),
            multiple: block.multiple,
            guard: None,
        };

        let assert = self.env.assert();
        let mut inits = Vec::new();
        for name in &block.visible_order {
            let code = FieldCode {
                access: block.access_of(name)?,
            };
            inits.push(Init {
                index: code.access.index,
                term: code.init(name),
                check: code.check(assert, name),
            });
        }

        let mut functions = Vec::new();
        let params = block.visible_order.iter().map(String::as_str).collect::<Vec<_>>();
        family.constructors(&params, &inits, names, &mut functions);
        for field in block.fields() {
            let Some(name) = &field.name else { continue };
            let code = FieldCode {
                access: block.access(field),
            };
            family.accessors(name, &code, names, &mut functions);
        }
        self.functions(functions);
        Ok(())
    }

    fn union(&mut self, union: &TaggedUnion, names: &BTreeSet<String>) -> Result<()> {
        let base = union.base.base;
        let word_type = self.env.word_type(base);
        self.typedef(&union.name, &word_type, union.multiple);
        self.tag_enum(union);

        let mut functions = Vec::new();
        self.tag_functions(union, &word_type, names, &mut functions);
        for variant in &union.variants {
            self.variant(union, variant, &word_type, names, &mut functions)?;
        }
        self.functions(functions);
        Ok(())
    }

    fn finish(self) -> Result<String> {
        Ok(self.out)
    }
}

impl Header {
    fn tag_enum(&mut self, union: &TaggedUnion) {
        let entries = union
            .variants
            .iter()
            .map(|variant| format!("    {}_{} = {}", union.name, variant.name, variant.value))
            .collect::<Vec<_>>();
        self.out.push_str(&format!(
            "enum {name}_tag {{\n{}\n}};\ntypedef enum {name}_tag {name}_tag_t;\n\n",
            entries.join(",\n"),
            name = union.name
        ));
    }

    /// `return` statements computing the tag from `storage`, each passed
    /// through `finish`.
    fn tag_cascade(union: &TaggedUnion, storage: Storage<'_>, finish: impl Fn(String) -> String) -> Vec<String> {
        let base = union.base.base;
        match &union.encoding {
            TagEncoding::Sliced(sliced) => {
                let word = storage.word(sliced.index);
                let parts = sliced
                    .slices
                    .iter()
                    .map(|slice| {
                        format!(
                            "(({word} & ({} << {})) {})",
                            Const::new(low_mask(slice.size), base),
                            slice.shift,
                            slice.compress_shift()
                        )
                    })
                    .collect::<Vec<_>>();
                vec![format!("return {};", finish(parts.join("\n        | ")))]
            }
            TagEncoding::Classed(classed) => {
                let word = storage.word(classed.index);
                let extract = |class: &TagClass| {
                    format!(
                        "({word} >> {}) & {}",
                        class.shift,
                        Const::new(class.value_mask(), base)
                    )
                };
                let mut lines = Vec::new();
                if let Some((widest, narrower)) = classed.classes.split_last() {
                    for class in narrower {
                        let classmask = Const::new(class.word_classmask, base);
                        lines.push(format!("if (({word} & {classmask}) != {classmask})"));
                        lines.push(format!("    return {};", finish(extract(class))));
                    }
                    lines.push(format!("return {};", finish(extract(widest))));
                }
                lines
            }
        }
    }

    fn tag_functions(&self, union: &TaggedUnion, word_type: &str, names: &BTreeSet<String>, out: &mut Vec<String>) {
        let family = Family {
            env: self.env,
            word_type: word_type.to_string(),
            ty: &union.name,
            prefix: union.name.clone(),
            multiple: union.multiple,
            guard: None,
        };
        let tag = &union.tag_name;
        let value = Storage::Value(&union.name);
        let pointer = Storage::Pointer(&union.name);

        let name = format!("{}_get_{tag}", union.name);
        if names.contains(&name) {
            let body = Self::tag_cascade(union, value, |expr| expr);
            out.push(family.function(&format!("{word_type} CONST"), &name, &family.value_param(), &body));
        }

        let name = format!("{}_{tag}_equals", union.name);
        if names.contains(&name) {
            let argument = format!("{}_type_tag", union.name);
            let body = Self::tag_cascade(union, value, |expr| format!("({expr}) == {argument}"));
            out.push(family.function(
                "int CONST",
                &name,
                &format!("{}, {word_type} {argument}", family.value_param()),
                &body,
            ));
        }

        let name = format!("{}_ptr_get_{tag}", union.name);
        if names.contains(&name) {
            let body = Self::tag_cascade(union, pointer, |expr| expr);
            out.push(family.function(&format!("{word_type} PURE"), &name, &family.pointer_param(), &body));
        }
    }

    fn variant(
        &self,
        union: &TaggedUnion,
        variant: &Variant,
        word_type: &str,
        names: &BTreeSet<String>,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let base = union.base.base;
        let block = &variant.block;
        let tag_constant = format!("{}_{}", union.name, variant.name);
        let check = variant.check;
        let guard_value = match &union.encoding {
            TagEncoding::Sliced(_) => Const::new(check.value, base).to_string(),
            TagEncoding::Classed(_) => tag_constant.clone(),
        };
        let family = Family {
            env: self.env,
            word_type: word_type.to_string(),
            ty: &union.name,
            prefix: tag_constant.clone(),
            multiple: union.multiple,
            guard: Some(Guard {
                index: check.index,
                shift: check.shift,
                mask: Const::new(check.mask, base),
                value: guard_value,
            }),
        };

        let assert = self.env.assert();
        let mut inits = Vec::new();
        for name in &block.visible_order {
            let code = FieldCode {
                access: block.access_of(name)?,
            };
            if *name == union.tag_name && !matches!(union.encoding, TagEncoding::Sliced(_)) {
                inits.push(Init {
                    index: code.access.index,
                    term: code.init(&format!("({word_type}){tag_constant}")),
                    check: None,
                });
            } else if !union.is_tag_field(name) {
                inits.push(Init {
                    index: code.access.index,
                    term: code.init(name),
                    check: code.check(assert, name),
                });
            }
        }
        if let TagEncoding::Sliced(sliced) = &union.encoding {
            inits.push(Init {
                index: sliced.index,
                term: Const::new(sliced.expand(variant.value), base).to_string(),
                check: None,
            });
        }

        let params = union.params(variant).collect::<Vec<_>>();
        family.constructors(&params, &inits, names, out);
        for field in union.fields(variant) {
            let Some(name) = &field.name else { continue };
            let code = FieldCode {
                access: block.access(field),
            };
            family.accessors(name, &code, names, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_carry_suffixes() {
        assert_eq!(Const::new(0xf0, Base::U32).to_string(), "0xf0u");
        assert_eq!(Const::new(0, Base::U64).to_string(), "0x0ull");
        assert_eq!(Storage::Pointer("cap").word(1), "cap_ptr->words[1]");
    }
}
