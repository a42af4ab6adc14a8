// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Word widths and the primitive bit operations shared by every emitter.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// The storage word of a block or union.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Base {
    U8,
    U16,
    U32,
    U64,
}

impl Base {
    pub fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            8 => Ok(Self::U8),
            16 => Ok(Self::U16),
            32 => Ok(Self::U32),
            64 => Ok(Self::U64),
            base => Err(Error::InvalidBase { base }),
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::U32 => 32,
            Self::U64 => 64,
        }
    }

    /// All-ones value of the word.
    #[must_use]
    pub const fn max(self) -> u64 {
        u64::MAX >> (64 - self.bits())
    }

    /// The C literal suffix for constants of this width. `unsigned int` is
    /// assumed to be at least 32 bits wide.
    #[must_use]
    pub const fn c_suffix(self) -> &'static str {
        match self {
            Self::U8 | Self::U16 | Self::U32 => "u",
            Self::U64 => "ull",
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// A base declaration: the storage width, the "natural" width used for
/// high-aligned fields, and whether such fields sign-extend into the bits
/// above it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BaseSpec {
    pub base: Base,
    pub base_bits: u32,
    pub sign_extend: bool,
}

impl BaseSpec {
    pub fn new(base: u64, base_bits: u64, sign_extend: u64) -> Result<Self> {
        let word = Base::from_bits(base)?;
        let invalid_bits = || Error::InvalidBaseBits { base, base_bits };
        if base_bits == 0 || base_bits > base {
            return Err(invalid_bits());
        }
        let sign_extend = match sign_extend {
            0 => false,
            1 => true,
            flag => return Err(Error::InvalidSignExtend { base, flag }),
        };
        Ok(Self {
            base: word,
            base_bits: u32::try_from(base_bits).map_err(|_| invalid_bits())?,
            sign_extend,
        })
    }

    #[must_use]
    pub fn plain(base: Base) -> Self {
        Self {
            base,
            base_bits: base.bits(),
            sign_extend: false,
        }
    }

    /// Every storage bit above `base_bits`, when sign extension is enabled.
    #[must_use]
    pub fn high_bits(&self) -> u64 {
        if self.sign_extend {
            self.base.max() & !low_mask(self.base_bits)
        } else {
            0
        }
    }
}

/// A mask of the `width` least-significant bits.
#[must_use]
pub const fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// A shift by a fixed amount in a fixed direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "direction", content = "amount")]
pub enum Shift {
    Left(u32),
    Right(u32),
}

impl Shift {
    /// A left shift by `amount`, flipping direction when negative.
    #[must_use]
    pub fn left(amount: i64) -> Self {
        let magnitude = u32::try_from(amount.unsigned_abs()).unwrap_or(u32::MAX);
        if amount >= 0 {
            Self::Left(magnitude)
        } else {
            Self::Right(magnitude)
        }
    }

    #[must_use]
    pub const fn amount(self) -> u32 {
        match self {
            Self::Left(n) | Self::Right(n) => n,
        }
    }

    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Left(n) => Self::Right(n),
            Self::Right(n) => Self::Left(n),
        }
    }

    /// Applies the shift within a `base`-bit word.
    #[must_use]
    pub fn apply(self, value: u64, base: Base) -> u64 {
        let shifted = match self {
            Self::Left(n) => value.checked_shl(n).unwrap_or(0),
            Self::Right(n) => value.checked_shr(n).unwrap_or(0),
        };
        shifted & base.max()
    }

    /// The C/Rust operator spelling.
    #[must_use]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Left(_) => "<<",
            Self::Right(_) => ">>",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator(), self.amount())
    }
}
