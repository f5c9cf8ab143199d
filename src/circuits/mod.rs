//! Textual circuit forms.
//!
//! Three line-oriented formats all reduce to a list of [`Instruction`]s:
//!
//! - [`gates`]: `x AND y -> d`, `NOT x -> h`, `123 -> x`
//! - [`transfer`]: `value 5 goes to bot 2`, `bot 2 gives low to bot 1 and high to output 0`
//! - [`adder`]: `x00: 1` initialisers followed by `AND`/`OR`/`XOR` gates
//!
//! Each module also carries the helpers that read an answer back out of an
//! [`Evaluation`](crate::pipeline::Evaluation).
//!
//! [`Instruction`]: crate::pipeline::Instruction

pub mod adder;
pub mod gates;
pub mod transfer;

use crate::error::{Result, WireError};
use crate::pipeline::Operand;
use crate::types::Signal;

/// Non-blank lines with their 1-based line numbers, trimmed.
pub(crate) fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Read one operand token, reporting a bad literal against `number`.
pub(crate) fn operand<V: Signal>(number: usize, token: &str) -> Result<Operand<V>> {
    Operand::parse(token).map_err(|e| match e {
        WireError::Instruction(message) => WireError::parse(number, message),
        other => other,
    })
}
