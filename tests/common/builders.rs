//! Test data builders for creating circuits, plus a sequential reference
//! evaluator to check concurrent runs against.

use std::collections::BTreeMap;
use wirecast::{Instruction, Operand, Operation, Signal, Topic};

/// Builder for creating test circuits
pub struct CircuitBuilder<V> {
    instructions: Vec<Instruction<V>>,
}

impl<V: Signal> CircuitBuilder<V> {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
        }
    }

    /// `<value> -> <wire>`
    pub fn constant(mut self, value: V, wire: &str) -> Self {
        self.instructions.push(Instruction::set(value, wire));
        self
    }

    /// `<source> -> <wire>`, where `source` may be a literal or a wire
    pub fn wire(mut self, source: &str, wire: &str) -> Self {
        self.instructions
            .push(Instruction::set(Operand::parse(source).unwrap(), wire));
        self
    }

    /// `NOT <operand> -> <wire>`
    pub fn not(mut self, operand: &str, wire: &str) -> Self {
        self.instructions
            .push(Instruction::not(Operand::parse(operand).unwrap(), wire));
        self
    }

    /// `<lhs> <op> <rhs> -> <wire>`
    pub fn gate(mut self, lhs: &str, op: Operation, rhs: &str, wire: &str) -> Self {
        self.instructions.push(Instruction::binary(
            op,
            Operand::parse(lhs).unwrap(),
            Operand::parse(rhs).unwrap(),
            wire,
        ));
        self
    }

    /// A bot-style sorter reading `count` values from `source`
    pub fn sorter(mut self, source: &str, outputs: &[&str]) -> Self {
        let operands = outputs.iter().map(|_| Operand::topic(source)).collect();
        let outputs = outputs.iter().map(|o| Topic::from(*o)).collect();
        self.instructions.push(Instruction::sort(operands, outputs));
        self
    }

    /// Reverse the instruction order so nothing arrives pre-sorted
    pub fn reversed(mut self) -> Self {
        self.instructions.reverse();
        self
    }

    pub fn build(self) -> Vec<Instruction<V>> {
        self.instructions
    }
}

impl<V: Signal> Default for CircuitBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate single-output instructions one at a time in dependency order.
///
/// Panics if the circuit has a cycle, a missing driver or a sort node.
pub fn reference_eval<V: Signal>(instructions: &[Instruction<V>]) -> BTreeMap<Topic, V> {
    let mut known: BTreeMap<Topic, V> = BTreeMap::new();
    let mut remaining: Vec<&Instruction<V>> = instructions.iter().collect();

    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|inst| {
            assert_ne!(inst.operation, Operation::Sort, "reference_eval has no sort support");
            let values: Option<Vec<V>> = inst
                .operands
                .iter()
                .map(|operand| match operand {
                    Operand::Literal(value) => Some(*value),
                    Operand::Topic(topic) => known.get(topic).copied(),
                })
                .collect();

            match values {
                Some(values) => {
                    let result = inst.operation.apply(&values).expect("valid instruction");
                    known.insert(inst.outputs[0].clone(), result[0]);
                    false
                }
                None => true,
            }
        });
        assert!(remaining.len() < before, "circuit has a cycle or an undriven wire");
    }

    known
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_eval_out_of_order() {
        let circuit = CircuitBuilder::<u16>::new()
            .gate("x", Operation::And, "y", "d")
            .constant(123, "x")
            .constant(456, "y")
            .build();

        let values = reference_eval(&circuit);
        assert_eq!(values.get("d"), Some(&72));
    }
}
