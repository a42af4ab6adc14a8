// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use bitfield_gen::{Block, SymbolTable, TagEncoding, parse};
use proptest::prelude::*;

/// Base declarations with their word width and base bits.
const BASES: [(&str, u32, u32); 6] = [
    ("base 8", 8, 8),
    ("base 16", 16, 16),
    ("base 32", 32, 32),
    ("base 64", 64, 64),
    ("base 32(24,0)", 32, 24),
    ("base 64(48,1)", 64, 48),
];

/// Cuts a word of `bits` bits into segments of the given sizes, the last one
/// taking what remains.
fn partition(bits: u32, sizes: &[(u32, bool)]) -> Vec<(u32, bool)> {
    let mut left = bits;
    let mut out = Vec::new();
    for &(size, high) in sizes {
        if left == 0 {
            break;
        }
        let size = size.min(left);
        out.push((size, high));
        left -= size;
    }
    if left > 0 {
        out.push((left, false));
    }
    out
}

/// A block of one partition per word under any base, every third segment
/// padding. High-aligned fields are kept within the base bits.
fn layout() -> impl Strategy<Value = String> {
    let words = prop::collection::vec((1u32..=64, any::<bool>()), 1..6);
    (0..BASES.len(), prop::collection::vec(words, 1..4)).prop_map(|(base, words)| {
        let (header, bits, base_bits) = BASES[base];
        let mut body = String::new();
        let mut n = 0;
        for sizes in words {
            for (size, high) in partition(bits, &sizes) {
                if n % 3 == 2 {
                    body.push_str(&format!("padding {size}\n"));
                } else if high && size <= base_bits {
                    body.push_str(&format!("field_high f{n} {size}\n"));
                } else {
                    body.push_str(&format!("field f{n} {size}\n"));
                }
                n += 1;
            }
        }
        format!("{header}\nblock b {{\n{body}}}")
    })
}

fn resolve(source: &str) -> Block {
    let table = SymbolTable::build(&parse(source).unwrap()).unwrap();
    table.block("b").unwrap().clone()
}

/// A value `field` accepts, made from arbitrary bits.
fn fit(block: &Block, field: &str, raw: u64) -> u64 {
    let access = block.access_of(field).unwrap();
    let value = raw & access.value_mask;
    value | access.expected_excess(value)
}

fn mask(size: u32) -> u64 {
    u64::MAX >> (64 - size)
}

proptest! {
    #[test]
    fn segments_tile_the_block(source in layout()) {
        let block = resolve(&source);
        let mut next = 0;
        for segment in block.segments.iter().rev() {
            prop_assert_eq!(segment.offset, next);
            next += segment.size;
        }
        prop_assert_eq!(next, block.size);
        prop_assert_eq!(block.size, block.base.base.bits() * u32::try_from(block.multiple).unwrap());
    }

    #[test]
    fn set_then_get(source in layout(), pick in any::<prop::sample::Index>(), raw in any::<u64>()) {
        let block = resolve(&source);
        let fields = block.fields().cloned().collect::<Vec<_>>();
        let target = pick.get(&fields);
        let name = target.name.as_deref().unwrap();
        let value = fit(&block, name, raw);

        let initial = fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let field = f.name.as_deref().unwrap();
                (field, fit(&block, field, (i as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)))
            })
            .collect::<Vec<_>>();
        let mut words = block.construct(&initial).unwrap();
        block.set(&mut words, name, value).unwrap();

        prop_assert_eq!(block.get(&words, name).unwrap(), value);
        for &(other, expected) in initial.iter().filter(|(other, _)| *other != name) {
            prop_assert_eq!(block.get(&words, other).unwrap(), expected);
        }
    }

    #[test]
    fn high_fields_sign_extend(size in 1u32..=48, raw in any::<u64>()) {
        let source = format!(
            "base 64(48,1)\nblock b {{ field_high ptr {size} padding {} }}",
            64 - size
        );
        let block = resolve(&source);

        let mut value = (raw & mask(size)) << (48 - size);
        let negative = value & (1 << 47) != 0;
        if negative {
            value |= 0xffff_0000_0000_0000;
        }
        let mut words = vec![0; block.multiple];
        block.set(&mut words, "ptr", value).unwrap();
        let read = block.get(&words, "ptr").unwrap();
        prop_assert_eq!(read, value);
        prop_assert_eq!(read >> 48 == 0xffff, negative);
        prop_assert_eq!(read >> 48 == 0, !negative);
    }

    #[test]
    fn classed_tags_discriminate(priority in 0u64..(1 << 30), object in 0u64..(1 << 28)) {
        let table = SymbolTable::build(&parse(include_str!("../demos/structures.bf")).unwrap()).unwrap();
        let union = table.union("thread_state").unwrap();
        let running = union.construct("state_running", &[("priority", priority)]).unwrap();
        let blocked = union.construct("state_blocked", &[("object", object)]).unwrap();

        prop_assert_eq!(union.read_tag(&running), 0b01);
        prop_assert_eq!(union.read_tag(&blocked), 0b0111);
        prop_assert!(union.variant_matches(&running, "state_running").unwrap());
        prop_assert!(!union.variant_matches(&running, "state_blocked").unwrap());
        prop_assert!(!union.variant_matches(&blocked, "state_running").unwrap());
        prop_assert_eq!(union.get(&running, "state_running", "priority").unwrap(), priority);
        prop_assert_eq!(union.get(&blocked, "state_blocked", "object").unwrap(), object);
    }
}

#[test]
fn class_masks_nest() {
    let table = SymbolTable::build(&parse(include_str!("../demos/structures.bf")).unwrap()).unwrap();
    let TagEncoding::Classed(classed) = &table.union("thread_state").unwrap().encoding else {
        panic!("expected a classed tag");
    };
    for (i, narrow) in classed.classes.iter().enumerate() {
        for wide in &classed.classes[i + 1..] {
            assert_eq!(narrow.classmask & wide.classmask, narrow.classmask);
        }
    }
}
