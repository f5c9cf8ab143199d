//! Instruction model and the per-node evaluation state machine.
//!
//! An [`Instruction`] names the topics it reads (or literal values), the
//! [`Operation`] it applies and the topic(s) it writes. A [`Node`] evaluates
//! one instruction for one run:
//!
//! ```text
//! Created → ResolvingOperands → AwaitingBarrier → AwaitingValues
//!         → Computed → Published → Terminated
//! ```
//!
//! Subscriptions are only ever issued in `ResolvingOperands`, before the node
//! arrives at the run's [`Barrier`]. Values are only ever received in
//! `AwaitingValues`, after the barrier has opened.

use crate::broker::{BrokerHandle, Mailbox};
use crate::error::{Result, ResultExt, WireError};
use crate::pipeline::barrier::Barrier;
use crate::pipeline::id::NodeId;
use crate::types::{Signal, Topic};
use std::fmt;
use std::time::Instant;

// ── Operands ──

/// One input of an instruction: a value known up front or a topic to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand<V> {
    Literal(V),
    Topic(Topic),
}

impl<V: Signal> Operand<V> {
    /// Classify a token: a decimal number is a literal of width `V`,
    /// anything else names a topic. A number too wide for `V` is an error.
    pub fn parse(token: &str) -> Result<Self> {
        if let Some(value) = V::parse_literal(token) {
            return Ok(Operand::Literal(value));
        }
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WireError::Instruction(format!(
                "'{}' does not fit in {} bits",
                token,
                V::BITS
            )));
        }
        Ok(Operand::Topic(Topic::from(token)))
    }

    pub fn topic(name: impl Into<Topic>) -> Self {
        Operand::Topic(name.into())
    }

    pub fn as_topic(&self) -> Option<&Topic> {
        match self {
            Operand::Topic(topic) => Some(topic),
            Operand::Literal(_) => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Operand::Literal(_))
    }
}

impl<V: Signal> From<V> for Operand<V> {
    fn from(value: V) -> Self {
        Operand::Literal(value)
    }
}

impl<V: Signal> fmt::Display for Operand<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Topic(topic) => write!(f, "{}", topic),
        }
    }
}

// ── Operations ──

/// What a node does with its operand values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Pass the single operand through unchanged
    Set,
    Not,
    And,
    Or,
    Xor,
    LShift,
    RShift,
    /// Sort every operand value ascending; the i-th smallest goes to the
    /// i-th output
    Sort,
}

impl Operation {
    /// Look up a gate keyword as written in circuit files.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "SET" | "SIGNAL" => Some(Operation::Set),
            "NOT" => Some(Operation::Not),
            "AND" => Some(Operation::And),
            "OR" => Some(Operation::Or),
            "XOR" => Some(Operation::Xor),
            "LSHIFT" => Some(Operation::LShift),
            "RSHIFT" => Some(Operation::RShift),
            "SORT" => Some(Operation::Sort),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Operation::Set => "SET",
            Operation::Not => "NOT",
            Operation::And => "AND",
            Operation::Or => "OR",
            Operation::Xor => "XOR",
            Operation::LShift => "LSHIFT",
            Operation::RShift => "RSHIFT",
            Operation::Sort => "SORT",
        }
    }

    /// Required operand count. `None` for [`Operation::Sort`], whose operand
    /// count is tied to its output count instead.
    pub fn arity(self) -> Option<usize> {
        match self {
            Operation::Set | Operation::Not => Some(1),
            Operation::And
            | Operation::Or
            | Operation::Xor
            | Operation::LShift
            | Operation::RShift => Some(2),
            Operation::Sort => None,
        }
    }

    /// Whether every occurrence of a topic operand consumes its own delivery.
    /// Value operations read a repeated topic once and reuse the value.
    pub fn consumes_per_occurrence(self) -> bool {
        matches!(self, Operation::Sort)
    }

    /// Combine `values`, producing one value per output.
    pub fn apply<V: Signal>(self, values: &[V]) -> Result<Vec<V>> {
        if let Some(arity) = self.arity() {
            if values.len() != arity {
                return Err(WireError::Instruction(format!(
                    "{} takes {} operand(s), got {}",
                    self,
                    arity,
                    values.len()
                )));
            }
        }

        let result = match self {
            Operation::Set => values[0],
            Operation::Not => values[0].not(),
            Operation::And => values[0].and(values[1]),
            Operation::Or => values[0].or(values[1]),
            Operation::Xor => values[0].xor(values[1]),
            Operation::LShift => values[0].shl(values[1]),
            Operation::RShift => values[0].shr(values[1]),
            Operation::Sort => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable();
                return Ok(sorted);
            }
        };
        Ok(vec![result])
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ── Instructions ──

/// One unit of computation: read `operands`, apply `operation`, publish to
/// `outputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction<V> {
    pub operation: Operation,
    pub operands: Vec<Operand<V>>,
    pub outputs: Vec<Topic>,
}

impl<V: Signal> Instruction<V> {
    pub fn new(operation: Operation, operands: Vec<Operand<V>>, outputs: Vec<Topic>) -> Self {
        Self {
            operation,
            operands,
            outputs,
        }
    }

    /// `<operand> -> <output>`
    pub fn set(operand: impl Into<Operand<V>>, output: impl Into<Topic>) -> Self {
        Self::new(Operation::Set, vec![operand.into()], vec![output.into()])
    }

    /// `NOT <operand> -> <output>`
    pub fn not(operand: impl Into<Operand<V>>, output: impl Into<Topic>) -> Self {
        Self::new(Operation::Not, vec![operand.into()], vec![output.into()])
    }

    /// `<lhs> <OP> <rhs> -> <output>`
    pub fn binary(
        operation: Operation,
        lhs: impl Into<Operand<V>>,
        rhs: impl Into<Operand<V>>,
        output: impl Into<Topic>,
    ) -> Self {
        Self::new(operation, vec![lhs.into(), rhs.into()], vec![output.into()])
    }

    /// Gather `operands`, publish them in ascending order to `outputs`.
    pub fn sort(operands: Vec<Operand<V>>, outputs: Vec<Topic>) -> Self {
        Self::new(Operation::Sort, operands, outputs)
    }

    /// The first (for non-sort instructions, the only) output topic.
    pub fn output(&self) -> Option<&Topic> {
        self.outputs.first()
    }

    pub fn writes(&self, topic: &Topic) -> bool {
        self.outputs.contains(topic)
    }

    /// Distinct topics this instruction reads, in first-occurrence order.
    pub fn dependencies(&self) -> Vec<&Topic> {
        let mut topics: Vec<&Topic> = Vec::new();
        for topic in self.operands.iter().filter_map(Operand::as_topic) {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        topics
    }

    /// The topic this instruction reads most often and how many deliveries it
    /// needs from it. Only [`Operation::Sort`] needs more than one.
    pub fn peak_deliveries(&self) -> Option<(&Topic, usize)> {
        let topics = self.dependencies();
        if !self.operation.consumes_per_occurrence() {
            return topics.first().map(|topic| (*topic, 1));
        }
        topics
            .into_iter()
            .map(|topic| {
                let count = self
                    .operands
                    .iter()
                    .filter(|operand| operand.as_topic() == Some(topic))
                    .count();
                (topic, count)
            })
            .max_by_key(|(_, count)| *count)
    }

    /// Check operand and output counts against the operation.
    pub fn validate(&self) -> Result<()> {
        match self.operation.arity() {
            Some(arity) => {
                if self.operands.len() != arity {
                    return Err(WireError::Instruction(format!(
                        "'{}': {} takes {} operand(s), got {}",
                        self,
                        self.operation,
                        arity,
                        self.operands.len()
                    )));
                }
                if self.outputs.len() != 1 {
                    return Err(WireError::Instruction(format!(
                        "'{}': {} writes exactly one output, got {}",
                        self,
                        self.operation,
                        self.outputs.len()
                    )));
                }
            }
            None => {
                if self.operands.is_empty() || self.operands.len() != self.outputs.len() {
                    return Err(WireError::Instruction(format!(
                        "'{}': SORT needs as many operands as outputs ({} vs {})",
                        self,
                        self.operands.len(),
                        self.outputs.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl<V: Signal> fmt::Display for Instruction<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: Vec<String>| items.join(", ");
        let outputs = join(self.outputs.iter().map(ToString::to_string).collect());

        match (self.operation, self.operands.as_slice()) {
            (Operation::Set, [operand]) => write!(f, "{} -> {}", operand, outputs),
            (Operation::Not, [operand]) => write!(f, "NOT {} -> {}", operand, outputs),
            (op, [lhs, rhs]) if op != Operation::Sort => {
                write!(f, "{} {} {} -> {}", lhs, op, rhs, outputs)
            }
            (op, operands) => write!(
                f,
                "{} {} -> {}",
                op,
                join(operands.iter().map(ToString::to_string).collect()),
                outputs
            ),
        }
    }
}

// ── Node runtime ──

/// Lifecycle of one node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    Created,
    ResolvingOperands,
    AwaitingBarrier,
    AwaitingValues,
    Computed,
    Published,
    Terminated,
}

/// What a node did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport<V> {
    pub id: NodeId,
    /// Operand values in operand order
    pub inputs: Vec<V>,
    /// Published `(topic, value)` pairs in output order
    pub outputs: Vec<(Topic, V)>,
    /// Mailboxes this node registered
    pub subscriptions: usize,
    /// When the node finished registering and arrived at the barrier
    pub registered_at: Instant,
    /// When the barrier let the node through
    pub released_at: Instant,
}

/// Where an operand's value comes from once the barrier opens.
enum Slot<V> {
    Ready(V),
    Mailbox(usize),
}

/// Evaluates one instruction against a shared broker and barrier.
pub struct Node<'run, V: Signal> {
    id: NodeId,
    instruction: Instruction<V>,
    broker: BrokerHandle<V>,
    barrier: &'run Barrier,
    state: NodeState,
}

impl<'run, V: Signal> Node<'run, V> {
    pub fn new(
        id: NodeId,
        instruction: Instruction<V>,
        broker: BrokerHandle<V>,
        barrier: &'run Barrier,
    ) -> Self {
        Self {
            id,
            instruction,
            broker,
            barrier,
            state: NodeState::Created,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Drive the node to completion.
    ///
    /// The node arrives at the barrier exactly once even when resolving its
    /// operands fails, so a bad node never holds the rest of the run hostage.
    pub fn run(mut self) -> Result<NodeReport<V>> {
        self.transition(NodeState::ResolvingOperands);
        let resolved = self.resolve();

        self.transition(NodeState::AwaitingBarrier);
        let barrier = self.barrier;
        let registered_at = Instant::now();
        let arrival = barrier.arrive();

        let (slots, mailboxes) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                self.transition(NodeState::Terminated);
                return Err(self.fail(e));
            }
        };

        if let Err(e) = arrival.and_then(|arrival| arrival.wait()) {
            self.release(&mailboxes);
            self.transition(NodeState::Terminated);
            return Err(self.fail(e));
        }
        let released_at = Instant::now();

        self.transition(NodeState::AwaitingValues);
        let inputs = match self.collect(&slots, &mailboxes) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.release(&mailboxes);
                self.transition(NodeState::Terminated);
                return Err(self.fail(e));
            }
        };
        self.release(&mailboxes);

        let results = match self.instruction.operation.apply(&inputs) {
            Ok(results) => results,
            Err(e) => {
                self.transition(NodeState::Terminated);
                return Err(self.fail(e));
            }
        };
        self.transition(NodeState::Computed);

        let mut outputs = Vec::with_capacity(results.len());
        for (topic, value) in self.instruction.outputs.iter().zip(results) {
            if let Err(e) = self
                .broker
                .publish(topic.clone(), value)
                .with_context(|| format!("publishing '{}'", topic))
            {
                self.transition(NodeState::Terminated);
                return Err(self.fail(e));
            }
            outputs.push((topic.clone(), value));
        }
        self.transition(NodeState::Published);

        tracing::trace!("Node {} '{}' published {:?}", self.id, self.instruction, outputs);
        self.transition(NodeState::Terminated);

        Ok(NodeReport {
            id: self.id,
            inputs,
            outputs,
            subscriptions: mailboxes.len(),
            registered_at,
            released_at,
        })
    }

    /// Validate the instruction and subscribe to each distinct topic operand.
    fn resolve(&self) -> Result<(Vec<Slot<V>>, Vec<Mailbox<V>>)> {
        self.instruction.validate()?;

        let mut mailboxes: Vec<Mailbox<V>> = Vec::new();
        let mut slots = Vec::with_capacity(self.instruction.operands.len());

        for operand in &self.instruction.operands {
            let slot = match operand {
                Operand::Literal(value) => Slot::Ready(*value),
                Operand::Topic(topic) => {
                    match mailboxes.iter().position(|m| m.topic() == topic) {
                        Some(index) => Slot::Mailbox(index),
                        None => {
                            let mailbox = match self.broker.subscribe(topic.clone()) {
                                Ok(mailbox) => mailbox,
                                Err(e) => {
                                    self.release(&mailboxes);
                                    return Err(e.with_context(format!("subscribing '{}'", topic)));
                                }
                            };
                            mailboxes.push(mailbox);
                            Slot::Mailbox(mailboxes.len() - 1)
                        }
                    }
                }
            };
            slots.push(slot);
        }

        Ok((slots, mailboxes))
    }

    /// Receive operand values in operand order.
    fn collect(&self, slots: &[Slot<V>], mailboxes: &[Mailbox<V>]) -> Result<Vec<V>> {
        let per_occurrence = self.instruction.operation.consumes_per_occurrence();
        let mut received: Vec<Option<V>> = vec![None; mailboxes.len()];
        let mut values = Vec::with_capacity(slots.len());

        for slot in slots {
            let value = match *slot {
                Slot::Ready(value) => value,
                Slot::Mailbox(index) => match received[index] {
                    Some(value) if !per_occurrence => value,
                    _ => {
                        let value = mailboxes[index].recv()?;
                        received[index] = Some(value);
                        value
                    }
                },
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Unsubscribe every mailbox this node owns. A stopped broker has already
    /// dropped them, so failures are ignored.
    fn release(&self, mailboxes: &[Mailbox<V>]) {
        for mailbox in mailboxes {
            let _ = self.broker.unsubscribe(mailbox);
        }
    }

    fn transition(&mut self, next: NodeState) {
        debug_assert!(next >= self.state, "{:?} -> {:?}", self.state, next);
        tracing::trace!("Node {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&self, error: WireError) -> WireError {
        if error.is_cancellation() {
            tracing::debug!("Node {} cancelled: {}", self.id, error);
        } else {
            tracing::warn!("Node {} '{}' failed: {}", self.id, self.instruction, error);
        }
        error.with_context(format!("node {}", self.id))
    }
}
