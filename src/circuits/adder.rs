//! Boolean adder circuits.
//!
//! ```text
//! x00: 1
//! x01: 0
//! y00: 0
//! y01: 1
//!
//! x00 XOR y00 -> z00
//! x01 OR y01 -> z01
//! ```
//!
//! Wires carry single bits. A number is read off a family of wires (`z00`,
//! `z01`, ...) by treating the highest-numbered wire as the most significant
//! bit.

use crate::circuits::{numbered_lines, operand};
use crate::error::{Result, WireError};
use crate::pipeline::{Evaluator, Instruction, Operation};
use crate::types::{Signal, Topic};

/// Parse initialisers and gates. Blank lines are ignored.
pub fn parse<V: Signal>(text: &str) -> Result<Vec<Instruction<V>>> {
    numbered_lines(text)
        .map(|(number, line)| parse_line(number, line))
        .collect()
}

pub fn parse_line<V: Signal>(number: usize, line: &str) -> Result<Instruction<V>> {
    if let Some((wire, bit)) = line.split_once(':') {
        let wire = wire.trim();
        let bit = bit.trim();
        if wire.is_empty() || wire.contains(char::is_whitespace) {
            return Err(WireError::parse(number, format!("bad wire name '{}'", wire)));
        }
        let value = match bit {
            "0" | "1" => V::parse_literal(bit),
            _ => None,
        }
        .ok_or_else(|| WireError::parse(number, format!("'{}' is not a bit", bit)))?;
        return Ok(Instruction::set(value, wire));
    }

    let (expr, output) = line
        .split_once("->")
        .ok_or_else(|| WireError::parse(number, format!("missing '->' in '{}'", line)))?;
    let output = output.trim();

    match expr.split_whitespace().collect::<Vec<_>>().as_slice() {
        [lhs, keyword, rhs] if !output.is_empty() => {
            let op = match Operation::from_keyword(keyword) {
                Some(op @ (Operation::And | Operation::Or | Operation::Xor)) => op,
                _ => {
                    return Err(WireError::parse(
                        number,
                        format!("'{}' is not AND, OR or XOR", keyword),
                    ))
                }
            };
            Ok(Instruction::binary(
                op,
                operand(number, lhs)?,
                operand(number, rhs)?,
                output,
            ))
        }
        _ => Err(WireError::parse(
            number,
            format!("expected '<wire> <GATE> <wire> -> <wire>', got '{}'", line),
        )),
    }
}

/// Every wire written by `instructions` whose name starts with `prefix`,
/// most significant first.
pub fn wires_with_prefix<V: Signal>(instructions: &[Instruction<V>], prefix: &str) -> Vec<Topic> {
    let mut wires: Vec<Topic> = instructions
        .iter()
        .flat_map(|inst| inst.outputs.iter())
        .filter(|topic| topic.has_prefix(prefix))
        .cloned()
        .collect();
    wires.sort_unstable_by(|a, b| b.cmp(a));
    wires.dedup();
    wires
}

/// Evaluate the circuit and read the number on the `prefix` wires.
pub fn number_on<V: Signal>(
    evaluator: &Evaluator,
    instructions: Vec<Instruction<V>>,
    prefix: &str,
) -> Result<u64> {
    let wires = wires_with_prefix(&instructions, prefix);
    if wires.len() > 64 {
        return Err(WireError::Instruction(format!(
            "{} '{}' wires do not fit in 64 bits",
            wires.len(),
            prefix
        )));
    }

    let evaluation = evaluator.evaluate(instructions, wires.iter().cloned())?;
    wires.iter().try_fold(0u64, |acc, wire| {
        let bit = evaluation
            .value(wire.as_str())
            .ok_or_else(|| WireError::Unpublished(wire.to_string()))?;
        Ok((acc << 1) | (bit.to_u64() & 1))
    })
}

/// The number on the `z` wires.
pub fn z_number<V: Signal>(
    evaluator: &Evaluator,
    instructions: Vec<Instruction<V>>,
) -> Result<u64> {
    number_on(evaluator, instructions, "z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pipeline::Operand;

    const SMALL: &str = "\
x00: 1
x01: 1
x02: 1
y00: 0
y01: 1
y02: 0

x00 AND y00 -> z00
x01 XOR y01 -> z01
x02 OR y02 -> z02
";

    #[test]
    fn test_parse_initialisers_and_gates() {
        let instructions = parse::<u8>(SMALL).unwrap();
        assert_eq!(instructions.len(), 9);
        assert_eq!(instructions[0], Instruction::set(1u8, "x00"));
        assert_eq!(
            instructions[7],
            Instruction::binary(Operation::Xor, Operand::topic("x01"), Operand::topic("y01"), "z01")
        );
    }

    #[test]
    fn test_parse_rejects_non_boolean_gates() {
        let err = parse::<u8>("x00 LSHIFT y00 -> z00").unwrap_err();
        assert!(err.to_string().contains("LSHIFT"));

        let err = parse::<u8>("x00: 2").unwrap_err();
        assert!(matches!(err, WireError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_small_circuit_number() {
        let evaluator = Evaluator::new(&EngineConfig::default());
        let instructions = parse::<u8>(SMALL).unwrap();
        // z02 z01 z00 = 1 0 0
        assert_eq!(z_number(&evaluator, instructions).unwrap(), 4);
    }

    #[test]
    fn test_single_xor() {
        let evaluator = Evaluator::new(&EngineConfig::default());
        let instructions = parse::<u8>("x00: 1\ny00: 0\n\nx00 XOR y00 -> z00\n").unwrap();
        assert_eq!(z_number(&evaluator, instructions).unwrap(), 1);
    }

    #[test]
    fn test_wires_with_prefix_order() {
        let instructions = parse::<u8>(SMALL).unwrap();
        let wires = wires_with_prefix(&instructions, "x");
        assert_eq!(wires, vec![Topic::from("x02"), Topic::from("x01"), Topic::from("x00")]);
    }
}
