//! Core data types for wirecast
//!
//! # Main Types
//!
//! - [`Topic`] - Name of a single-assignment value slot (a wire, a bot, a register)
//! - [`Signal`] - The payload carried on a topic; implemented for `u8`, `u16`,
//!   `u32` and `u64`
//!
//! The broker and the node runtime are generic over [`Signal`], so the gate
//! circuits (16-bit) and the boolean adder circuits (8-bit) share the exact
//! same coordination code.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

/// Unique name identifying a value slot.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the topic name begins with `prefix` (e.g. the `z` wires of an adder).
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A value that can travel over the broker and be combined by gates.
///
/// Shifts by an amount at or beyond the bit width yield zero instead of
/// panicking, matching what a hardware shifter of that width would produce.
pub trait Signal:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Width of the value in bits.
    const BITS: u32;

    /// Parse a decimal literal. Returns `None` when `text` is not a literal
    /// of this width, which callers treat as a topic reference.
    fn parse_literal(text: &str) -> Option<Self>;

    fn and(self, rhs: Self) -> Self;
    fn or(self, rhs: Self) -> Self;
    fn xor(self, rhs: Self) -> Self;
    fn not(self) -> Self;
    fn shl(self, rhs: Self) -> Self;
    fn shr(self, rhs: Self) -> Self;

    /// Widen to `u64` (lossless for every implementor).
    fn to_u64(self) -> u64;
}

macro_rules! impl_signal {
    ($($t:ty),* $(,)?) => {
        $(
            impl Signal for $t {
                const BITS: u32 = <$t>::BITS;

                fn parse_literal(text: &str) -> Option<Self> {
                    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                        return None;
                    }
                    text.parse::<$t>().ok()
                }

                #[inline]
                fn and(self, rhs: Self) -> Self {
                    self & rhs
                }

                #[inline]
                fn or(self, rhs: Self) -> Self {
                    self | rhs
                }

                #[inline]
                fn xor(self, rhs: Self) -> Self {
                    self ^ rhs
                }

                #[inline]
                fn not(self) -> Self {
                    !self
                }

                #[inline]
                fn shl(self, rhs: Self) -> Self {
                    u32::try_from(rhs)
                        .ok()
                        .and_then(|n| self.checked_shl(n))
                        .unwrap_or(0)
                }

                #[inline]
                fn shr(self, rhs: Self) -> Self {
                    u32::try_from(rhs)
                        .ok()
                        .and_then(|n| self.checked_shr(n))
                        .unwrap_or(0)
                }

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_signal!(u8, u16, u32, u64);
