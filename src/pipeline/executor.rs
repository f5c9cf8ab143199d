//! Evaluator: one run of an instruction set.
//!
//! Each run:
//! 1. Spawns a fresh broker and subscribes the watched topics.
//! 2. Sizes a barrier to the instruction count and spawns one named thread
//!    per instruction, each driving a [`Node`].
//! 3. Waits for every watched value (and, for [`Evaluator::evaluate_all`],
//!    every node) or for the first failure or the configured deadline.
//! 4. Stops the broker, which closes every mailbox and cancels any node that
//!    is still waiting, then joins all node threads.
//!
//! The dependency graph is never built: readiness falls out of message
//! delivery alone.

use crate::broker::{Broker, BrokerHandle, BrokerStats, Mailbox};
use crate::config::{BrokerConfig, DeliveryPolicy, EngineConfig, EvaluationConfig};
use crate::error::{Result, ResultExt, WireError};
use crate::pipeline::barrier::Barrier;
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{Instruction, Node, NodeReport};
use crate::types::{Signal, Topic};
use crossbeam_channel::{unbounded, Receiver, Select};
use std::collections::BTreeMap;
use std::time::Instant;

/// Completion notice sent by each node thread
enum NodeEvent {
    Finished(NodeId),
    Failed { id: NodeId, message: String },
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Evaluation<V> {
    /// Value delivered on each watched topic
    pub values: BTreeMap<Topic, V>,
    /// Reports of every node that ran to completion, in node order
    pub reports: Vec<NodeReport<V>>,
    /// Nodes torn down before they could publish
    pub cancelled: Vec<NodeId>,
    /// Final broker counters
    pub broker: BrokerStats,
}

impl<V: Signal> Evaluation<V> {
    pub fn value(&self, topic: &str) -> Option<V> {
        self.values.get(topic).copied()
    }

    pub fn report(&self, id: NodeId) -> Option<&NodeReport<V>> {
        self.reports.iter().find(|r| r.id == id)
    }
}

/// Runs instruction sets against a fresh broker per run.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    broker: BrokerConfig,
    evaluation: EvaluationConfig,
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            broker: config.broker.clone(),
            evaluation: config.evaluation.clone(),
        }
    }

    pub fn broker_config(&self) -> &BrokerConfig {
        &self.broker
    }

    pub fn evaluation_config(&self) -> &EvaluationConfig {
        &self.evaluation
    }

    /// Evaluate `instructions` and return as soon as every watched topic has
    /// a value. Nodes whose outputs were not needed by then are cancelled.
    pub fn evaluate<V, I>(
        &self,
        instructions: Vec<Instruction<V>>,
        watch: I,
    ) -> Result<Evaluation<V>>
    where
        V: Signal,
        I: IntoIterator,
        I::Item: Into<Topic>,
    {
        self.run(instructions, watch, false)
    }

    /// Like [`evaluate`](Self::evaluate), but also wait for every node to
    /// publish before tearing the run down.
    pub fn evaluate_all<V, I>(
        &self,
        instructions: Vec<Instruction<V>>,
        watch: I,
    ) -> Result<Evaluation<V>>
    where
        V: Signal,
        I: IntoIterator,
        I::Item: Into<Topic>,
    {
        self.run(instructions, watch, true)
    }

    /// Nodes that need more deliveries from one topic than a best-effort
    /// mailbox can buffer. Such a node can never complete.
    fn mailbox_overflows<'a, V: Signal>(
        &self,
        instructions: &'a [Instruction<V>],
    ) -> Vec<(NodeId, &'a Topic, usize)> {
        if self.broker.delivery != DeliveryPolicy::BestEffort {
            return Vec::new();
        }
        instructions
            .iter()
            .enumerate()
            .filter_map(|(index, instruction)| {
                instruction
                    .peak_deliveries()
                    .filter(|(_, deliveries)| *deliveries > self.broker.mailbox_capacity)
                    .map(|(topic, deliveries)| (NodeId::from_index(index), topic, deliveries))
            })
            .collect()
    }

    fn run<V, I>(
        &self,
        instructions: Vec<Instruction<V>>,
        watch: I,
        drain: bool,
    ) -> Result<Evaluation<V>>
    where
        V: Signal,
        I: IntoIterator,
        I::Item: Into<Topic>,
    {
        for (index, instruction) in instructions.iter().enumerate() {
            instruction
                .validate()
                .with_context(|| format!("instruction {}", index))?;
        }

        for (id, topic, deliveries) in self.mailbox_overflows(&instructions) {
            tracing::warn!(
                "Node {} needs {} deliveries from '{}' but best-effort mailboxes hold {}; \
                 the extra values will be dropped",
                id,
                deliveries,
                topic,
                self.broker.mailbox_capacity
            );
        }

        let started = Instant::now();
        let node_count = instructions.len();
        let broker = Broker::<V>::spawn(&self.broker)?;

        let mut probes: Vec<Mailbox<V>> = Vec::new();
        for topic in watch.into_iter().map(Into::into) {
            if probes.iter().all(|p| *p.topic() != topic) {
                probes.push(broker.subscribe(topic)?);
            }
        }

        tracing::info!(
            "Evaluating {} instructions, watching {} topics ({} delivery)",
            node_count,
            probes.len(),
            self.broker.delivery
        );

        let barrier = Barrier::new(node_count);
        let deadline = self.evaluation.timeout().map(|t| started + t);

        let (outcome, results) = std::thread::scope(|scope| {
            let (event_tx, event_rx) = unbounded();
            let mut threads = Vec::with_capacity(node_count);
            let mut spawn_error = None;

            for (index, instruction) in instructions.into_iter().enumerate() {
                let id = NodeId::from_index(index);
                let node = Node::new(id, instruction, broker.handle().clone(), &barrier);
                let events = event_tx.clone();

                let spawned = std::thread::Builder::new()
                    .name(format!("wirecast-node-{}", index))
                    .stack_size(self.evaluation.thread_stack_bytes())
                    .spawn_scoped(scope, move || {
                        let result = node.run();
                        let event = match &result {
                            Ok(_) => NodeEvent::Finished(id),
                            Err(e) => NodeEvent::Failed {
                                id,
                                message: e.to_string(),
                            },
                        };
                        let _ = events.send(event);
                        result
                    });

                match spawned {
                    Ok(thread) => threads.push((id, thread)),
                    Err(e) => {
                        spawn_error = Some(WireError::Thread(format!(
                            "failed to spawn node {}: {}",
                            id, e
                        )));
                        break;
                    }
                }
            }
            drop(event_tx);

            let outcome = match spawn_error {
                Some(e) => Err(e),
                None => collect(broker.handle(), &probes, &event_rx, node_count, drain, deadline),
            };

            if outcome.is_err() {
                barrier.abort();
            }
            broker.request_stop();

            let results: Vec<(NodeId, Result<NodeReport<V>>)> = threads
                .into_iter()
                .map(|(id, thread)| {
                    let result = thread.join().unwrap_or_else(|_| {
                        Err(WireError::Thread(format!("node {} panicked", id)))
                    });
                    (id, result)
                })
                .collect();

            (outcome, results)
        });

        let broker_stats = broker.stop()?;
        let values = outcome?;

        let mut reports = Vec::with_capacity(results.len());
        let mut cancelled = Vec::new();
        for (id, result) in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) if e.is_cancellation() => cancelled.push(id),
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            "Evaluation finished in {:?}: {} nodes published, {} cancelled, {} values dropped",
            started.elapsed(),
            reports.len(),
            cancelled.len(),
            broker_stats.dropped
        );

        Ok(Evaluation {
            values: probes.iter().map(|p| p.topic().clone()).zip(values).collect(),
            reports,
            cancelled,
            broker: broker_stats,
        })
    }
}

/// Wait for every probe to receive a value, returning them in probe order.
fn collect<V: Signal>(
    broker: &BrokerHandle<V>,
    probes: &[Mailbox<V>],
    events: &Receiver<NodeEvent>,
    node_count: usize,
    drain: bool,
    deadline: Option<Instant>,
) -> Result<Vec<V>> {
    let mut values: Vec<Option<V>> = vec![None; probes.len()];
    let mut finished = 0;

    loop {
        let satisfied = values.iter().all(Option::is_some);
        if satisfied && (!drain || finished == node_count) {
            break;
        }

        if finished == node_count {
            // Every publish was queued before its node reported; one stats
            // round trip guarantees the broker has routed them all.
            broker.stats()?;
            for (slot, probe) in values.iter_mut().zip(probes) {
                if slot.is_none() {
                    *slot = probe.try_recv();
                }
            }
            if let Some(missing) = values.iter().position(Option::is_none) {
                return Err(WireError::Unpublished(probes[missing].topic().to_string()));
            }
            break;
        }

        let pending: Vec<usize> = (0..probes.len()).filter(|&i| values[i].is_none()).collect();
        let mut sel = Select::new();
        for &i in &pending {
            sel.recv(probes[i].receiver());
        }
        let events_index = sel.recv(events);

        let op = match deadline {
            Some(deadline) => sel.select_deadline(deadline).map_err(|_| {
                WireError::Timeout(format!(
                    "{} watched topic(s) and {} node(s) still pending",
                    pending.len(),
                    node_count - finished
                ))
            })?,
            None => sel.select(),
        };

        let index = op.index();
        if index == events_index {
            match op.recv(events) {
                Ok(NodeEvent::Finished(id)) => {
                    finished += 1;
                    tracing::trace!("Node {} finished ({} of {})", id, finished, node_count);
                }
                Ok(NodeEvent::Failed { id, message }) => {
                    return Err(WireError::Node { node: id, message });
                }
                Err(_) => {
                    return Err(WireError::Thread(
                        "a node thread exited without reporting".to_string(),
                    ));
                }
            }
        } else {
            let probe = &probes[pending[index]];
            let value = op
                .recv(probe.receiver())
                .map_err(|_| WireError::MailboxClosed(probe.topic().to_string()))?;
            tracing::debug!("Watched topic '{}' = {}", probe.topic(), value);
            values[pending[index]] = Some(value);
        }
    }

    Ok(values.into_iter().flatten().collect())
}
