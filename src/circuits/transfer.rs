//! Chip transfer networks.
//!
//! ```text
//! value 5 goes to bot 2
//! bot 2 gives low to bot 1 and high to bot 0
//! value 3 goes to bot 1
//! bot 1 gives low to output 1 and high to bot 0
//! bot 0 gives low to output 2 and high to output 0
//! value 2 goes to bot 2
//! ```
//!
//! Every bot and every output bin is a topic (`bot2`, `output0`). A `value`
//! line is a constant published to a bot; a `gives` line is a sort node that
//! reads two chips from the bot's own topic and publishes the smaller one to
//! the low target and the larger one to the high target.

use crate::circuits::numbered_lines;
use crate::error::{Result, WireError};
use crate::pipeline::{Evaluator, Instruction, NodeId, Operand, Operation};
use crate::types::{Signal, Topic};
use std::collections::{BTreeMap, HashMap};

const BOT_PREFIX: &str = "bot";
const OUTPUT_PREFIX: &str = "output";

pub fn bot_topic(bot: u32) -> Topic {
    Topic::new(format!("{}{}", BOT_PREFIX, bot))
}

pub fn output_topic(bin: u32) -> Topic {
    Topic::new(format!("{}{}", OUTPUT_PREFIX, bin))
}

fn numbered(topic: &Topic, prefix: &str) -> Option<u32> {
    topic.as_str().strip_prefix(prefix)?.parse().ok()
}

/// Parse a whole transfer network. Blank lines are ignored.
pub fn parse<V: Signal>(text: &str) -> Result<Vec<Instruction<V>>> {
    numbered_lines(text)
        .map(|(number, line)| parse_line(number, line))
        .collect()
}

pub fn parse_line<V: Signal>(number: usize, line: &str) -> Result<Instruction<V>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let id = |text: &str| {
        text.parse::<u32>()
            .map_err(|_| WireError::parse(number, format!("'{}' is not a number", text)))
    };
    let target = |kind: &str, n: &str| -> Result<Topic> {
        match kind {
            "bot" => Ok(bot_topic(id(n)?)),
            "output" => Ok(output_topic(id(n)?)),
            other => Err(WireError::parse(
                number,
                format!("unknown target '{}', expected bot or output", other),
            )),
        }
    };

    match tokens.as_slice() {
        ["value", chip, "goes", "to", "bot", bot] => {
            let value = V::parse_literal(chip).ok_or_else(|| {
                WireError::parse(number, format!("'{}' is not a chip value", chip))
            })?;
            Ok(Instruction::set(value, bot_topic(id(*bot)?)))
        }
        ["bot", bot, "gives", "low", "to", low_kind, low, "and", "high", "to", high_kind, high] => {
            let source = bot_topic(id(*bot)?);
            Ok(Instruction::sort(
                vec![Operand::Topic(source.clone()), Operand::Topic(source)],
                vec![target(*low_kind, *low)?, target(*high_kind, *high)?],
            ))
        }
        _ => Err(WireError::parse(
            number,
            format!("unrecognised transfer instruction '{}'", line),
        )),
    }
}

/// What a transfer network did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome<V> {
    /// Chip that ended up in each output bin
    pub outputs: BTreeMap<u32, V>,
    /// `(low, high)` pair each bot compared
    pub comparisons: BTreeMap<u32, (V, V)>,
}

impl<V: Signal> TransferOutcome<V> {
    /// The bot that compared chips `a` and `b`, in either order.
    pub fn comparator(&self, a: V, b: V) -> Option<u32> {
        let pair = (a.min(b), a.max(b));
        self.comparisons
            .iter()
            .find(|(_, compared)| **compared == pair)
            .map(|(bot, _)| *bot)
    }

    /// Product of the chips in `bins`, or `None` if a bin stayed empty.
    pub fn product(&self, bins: &[u32]) -> Option<u64> {
        bins.iter()
            .map(|bin| self.outputs.get(bin).map(|chip| chip.to_u64()))
            .try_fold(1u64, |acc, chip| Some(acc.wrapping_mul(chip?)))
    }
}

/// Run the network to completion and record every bin and every comparison.
pub fn run<V: Signal>(
    evaluator: &Evaluator,
    instructions: Vec<Instruction<V>>,
) -> Result<TransferOutcome<V>> {
    let mut bins: Vec<Topic> = Vec::new();
    let mut sorters: HashMap<NodeId, u32> = HashMap::new();

    for (index, instruction) in instructions.iter().enumerate() {
        for output in &instruction.outputs {
            if numbered(output, OUTPUT_PREFIX).is_some() && !bins.contains(output) {
                bins.push(output.clone());
            }
        }
        if instruction.operation == Operation::Sort {
            let bot = instruction
                .dependencies()
                .first()
                .and_then(|topic| numbered(topic, BOT_PREFIX));
            if let Some(bot) = bot {
                sorters.insert(NodeId::from_index(index), bot);
            }
        }
    }

    let evaluation = evaluator.evaluate_all(instructions, bins)?;

    let outputs = evaluation
        .values
        .iter()
        .filter_map(|(topic, chip)| Some((numbered(topic, OUTPUT_PREFIX)?, *chip)))
        .collect();

    let comparisons = evaluation
        .reports
        .iter()
        .filter_map(|report| {
            let bot = *sorters.get(&report.id)?;
            let low = report.inputs.iter().min()?;
            let high = report.inputs.iter().max()?;
            Some((bot, (*low, *high)))
        })
        .collect();

    Ok(TransferOutcome {
        outputs,
        comparisons,
    })
}
