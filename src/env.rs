// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Target environments for the C header: what to include, how to assert and
//! inline, and what each word type is called.

use std::fmt;

use crate::word::Base;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum Environment {
    /// The kernel proper.
    #[default]
    Sel4,
    /// The user-level library.
    Libsel4,
}

impl Environment {
    #[must_use]
    pub const fn includes(self) -> &'static [&'static str] {
        match self {
            Self::Sel4 => &["config.h", "assert.h", "stdint.h", "util.h"],
            Self::Libsel4 => &[
                "sel4/config.h",
                "sel4/simple_types.h",
                "sel4/debug_assert.h",
            ],
        }
    }

    #[must_use]
    pub const fn assert(self) -> &'static str {
        match self {
            Self::Sel4 => "assert",
            Self::Libsel4 => "seL4_DebugAssert",
        }
    }

    #[must_use]
    pub const fn inline(self) -> &'static str {
        match self {
            Self::Sel4 => "static inline",
            Self::Libsel4 => "LIBSEL4_INLINE_FUNC",
        }
    }

    #[must_use]
    pub fn word_type(self, base: Base) -> String {
        match self {
            Self::Sel4 => format!("uint{base}_t"),
            Self::Libsel4 => format!("seL4_Uint{base}"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sel4 => "sel4",
            Self::Libsel4 => "libsel4",
        })
    }
}
