//! Gate circuits: `<operand> <OP> <operand> -> <wire>`.
//!
//! ```text
//! 123 -> x
//! 456 -> y
//! x AND y -> d
//! x LSHIFT 2 -> f
//! NOT x -> h
//! ```

use crate::circuits::{numbered_lines, operand};
use crate::error::{Result, WireError};
use crate::pipeline::{Evaluator, Instruction, Operation};
use crate::types::{Signal, Topic};

/// Parse a whole circuit. Blank lines are ignored.
pub fn parse<V: Signal>(text: &str) -> Result<Vec<Instruction<V>>> {
    numbered_lines(text)
        .map(|(number, line)| parse_line(number, line))
        .collect()
}

/// Parse one gate line. `number` is the 1-based line number used in errors.
pub fn parse_line<V: Signal>(number: usize, line: &str) -> Result<Instruction<V>> {
    let (expr, output) = line
        .split_once("->")
        .ok_or_else(|| WireError::parse(number, format!("missing '->' in '{}'", line)))?;

    let output = output.trim();
    if output.is_empty() || output.contains(char::is_whitespace) {
        return Err(WireError::parse(
            number,
            format!("expected a single output wire, got '{}'", output),
        ));
    }

    let tokens: Vec<&str> = expr.split_whitespace().collect();
    let instruction = match tokens.as_slice() {
        [source] => Instruction::set(operand(number, source)?, output),
        [keyword, source] => match Operation::from_keyword(keyword) {
            Some(op @ (Operation::Not | Operation::Set)) => Instruction::new(
                op,
                vec![operand(number, source)?],
                vec![Topic::from(output)],
            ),
            _ => {
                return Err(WireError::parse(
                    number,
                    format!("'{}' is not a unary gate", keyword),
                ))
            }
        },
        [lhs, keyword, rhs] => match Operation::from_keyword(keyword) {
            Some(op) if op.arity() == Some(2) => {
                Instruction::binary(op, operand(number, lhs)?, operand(number, rhs)?, output)
            }
            _ => {
                return Err(WireError::parse(
                    number,
                    format!("'{}' is not a binary gate", keyword),
                ))
            }
        },
        _ => {
            return Err(WireError::parse(
                number,
                format!("cannot read gate expression '{}'", expr.trim()),
            ))
        }
    };
    Ok(instruction)
}

/// Replace whatever drives `wire` with the constant `value`.
pub fn override_wire<V: Signal>(
    instructions: &mut [Instruction<V>],
    wire: &str,
    value: V,
) -> Result<()> {
    let topic = Topic::from(wire);
    let slot = instructions
        .iter_mut()
        .find(|inst| inst.writes(&topic))
        .ok_or_else(|| WireError::Instruction(format!("no instruction drives wire '{}'", wire)))?;

    tracing::debug!("Overriding '{}' ({}) with {}", wire, slot, value);
    *slot = Instruction::set(value, topic);
    Ok(())
}

/// Evaluate the circuit and return the signal on `wire`.
pub fn signal_on<V: Signal>(
    evaluator: &Evaluator,
    instructions: Vec<Instruction<V>>,
    wire: &str,
) -> Result<V> {
    let evaluation = evaluator.evaluate(instructions, [wire])?;
    evaluation
        .value(wire)
        .ok_or_else(|| WireError::Unpublished(wire.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pipeline::Operand;

    const SAMPLE: &str = "\
123 -> x
456 -> y
x AND y -> d
x OR y -> e
x LSHIFT 2 -> f
y RSHIFT 2 -> g
NOT x -> h
NOT y -> i
";

    #[test]
    fn test_parse_forms() {
        let instructions = parse::<u16>(SAMPLE).unwrap();
        assert_eq!(instructions.len(), 8);
        assert_eq!(instructions[0], Instruction::set(123u16, "x"));
        assert_eq!(
            instructions[4],
            Instruction::binary(Operation::LShift, Operand::topic("x"), 2u16, "f")
        );
        assert_eq!(instructions[6], Instruction::not(Operand::topic("x"), "h"));
    }

    #[test]
    fn test_parse_errors_carry_line_number() {
        let err = parse::<u16>("123 -> x\n\nx NAND y -> z\n").unwrap_err();
        assert!(matches!(err, WireError::Parse { line: 3, .. }), "{err}");

        let err = parse::<u16>("x AND y\n").unwrap_err();
        assert!(matches!(err, WireError::Parse { line: 1, .. }));

        let err = parse::<u16>("AND x -> y\n").unwrap_err();
        assert!(err.to_string().contains("not a unary gate"));
    }

    #[test]
    fn test_parse_rejects_literal_wider_than_signal() {
        let err = parse::<u16>("70000 -> x\n").unwrap_err();
        assert!(matches!(err, WireError::Parse { line: 1, .. }), "{err}");
        assert!(err.to_string().contains("'70000' does not fit in 16 bits"), "{err}");

        let err = parse::<u16>("1 -> x\nx LSHIFT 65536 -> y\n").unwrap_err();
        assert!(matches!(err, WireError::Parse { line: 2, .. }), "{err}");

        assert!(parse::<u32>("70000 -> x\n").is_ok());
    }

    #[test]
    fn test_sample_circuit_values() {
        let evaluator = Evaluator::new(&EngineConfig::default());
        let expected = [
            ("d", 72u16),
            ("e", 507),
            ("f", 492),
            ("g", 114),
            ("h", 65412),
            ("i", 65079),
            ("x", 123),
            ("y", 456),
        ];

        for (wire, value) in expected {
            let instructions = parse::<u16>(SAMPLE).unwrap();
            assert_eq!(signal_on(&evaluator, instructions, wire).unwrap(), value, "wire {wire}");
        }
    }

    #[test]
    fn test_override_wire_replaces_driver() {
        let mut instructions = parse::<u16>("123 -> x\nx -> b\nb OR 1 -> a\n").unwrap();
        override_wire(&mut instructions, "b", 6).unwrap();
        assert_eq!(instructions[1], Instruction::set(6u16, "b"));

        let evaluator = Evaluator::new(&EngineConfig::default());
        assert_eq!(signal_on(&evaluator, instructions, "a").unwrap(), 7);
    }

    #[test]
    fn test_override_unknown_wire_fails() {
        let mut instructions = parse::<u16>("1 -> x\n").unwrap();
        assert!(override_wire(&mut instructions, "q", 1).is_err());
    }
}
