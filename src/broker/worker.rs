//! Broker Worker Thread Implementation
//!
//! The worker owns the topic → mailbox routing table and is the only code that
//! ever touches it. Every subscribe, unsubscribe, publish, stats query and stop
//! arrives on a single FIFO command channel and is handled to completion before
//! the next one is looked at, so the table needs no lock.
//!
//! # Delivery
//!
//! Publishing never blocks the loop: each registered mailbox gets a
//! `try_send`. A full mailbox loses the value for that subscriber, and a mailbox
//! whose receiver was dropped is pruned from the table.
//!
//! # Shutdown
//!
//! When the loop exits (on `Stop`, or when every handle has been dropped) the
//! routing table is dropped with it. That drops every mailbox sender, so any
//! subscriber still blocked in `recv` wakes up with a closed-mailbox error
//! instead of waiting forever.

use crate::broker::BrokerStats;
use crate::pipeline::id::SubscriptionId;
use crate::types::{Signal, Topic};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::collections::HashMap;

/// Messages sent from handles to the broker loop
pub(crate) enum BrokerCommand<V> {
    /// Register `mailbox` under `topic` and reply with its id
    Subscribe {
        topic: Topic,
        mailbox: Sender<V>,
        reply: Sender<SubscriptionId>,
    },
    /// Remove a mailbox from every topic it is registered under
    Unsubscribe(SubscriptionId),
    /// Hand `value` to every mailbox registered under `topic`
    Publish { topic: Topic, value: V },
    /// Report current counters
    Stats(Sender<BrokerStats>),
    /// Exit the loop
    Stop,
}

/// The sequential event loop behind a [`Broker`](crate::broker::Broker)
pub(crate) struct BrokerWorker<V> {
    /// Command receiver shared by every handle
    command_rx: Receiver<BrokerCommand<V>>,
    /// Routing table: topic → (subscription → mailbox sender)
    subs: HashMap<Topic, HashMap<SubscriptionId, Sender<V>>>,
    /// Next subscription id to hand out
    next_id: u64,
    /// Counters
    stats: BrokerStats,
}

impl<V: Signal> BrokerWorker<V> {
    pub(crate) fn new(command_rx: Receiver<BrokerCommand<V>>) -> Self {
        Self {
            command_rx,
            subs: HashMap::new(),
            next_id: 0,
            stats: BrokerStats::default(),
        }
    }

    /// Run until `Stop` is received or every handle is gone. Returns the
    /// final counters.
    pub(crate) fn run(mut self) -> BrokerStats {
        tracing::info!("Broker thread started");

        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                BrokerCommand::Subscribe {
                    topic,
                    mailbox,
                    reply,
                } => {
                    let id = self.handle_subscribe(topic, mailbox);
                    // The caller may have given up waiting; the registration stands.
                    let _ = reply.send(id);
                }
                BrokerCommand::Unsubscribe(id) => {
                    self.handle_unsubscribe(id);
                }
                BrokerCommand::Publish { topic, value } => {
                    self.handle_publish(&topic, value);
                }
                BrokerCommand::Stats(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                BrokerCommand::Stop => {
                    tracing::debug!("Broker received stop");
                    break;
                }
            }
        }

        let stats = self.snapshot();
        tracing::info!(
            "Broker thread exiting: {} published, {} delivered, {} dropped, {} still subscribed",
            stats.published,
            stats.delivered,
            stats.dropped,
            stats.active_subscriptions,
        );
        stats
    }

    fn handle_subscribe(&mut self, topic: Topic, mailbox: Sender<V>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        tracing::trace!("Subscribe {} to '{}'", id, topic);
        self.subs.entry(topic).or_default().insert(id, mailbox);
        self.stats.subscribed += 1;
        id
    }

    fn handle_unsubscribe(&mut self, id: SubscriptionId) {
        let mut removed = false;
        for mailboxes in self.subs.values_mut() {
            removed |= mailboxes.remove(&id).is_some();
        }
        self.subs.retain(|_, mailboxes| !mailboxes.is_empty());

        if removed {
            tracing::trace!("Unsubscribed {}", id);
            self.stats.unsubscribed += 1;
        }
    }

    fn handle_publish(&mut self, topic: &Topic, value: V) {
        self.stats.published += 1;

        let Some(mailboxes) = self.subs.get_mut(topic) else {
            tracing::trace!("Publish {} on '{}' with no subscribers", value, topic);
            self.stats.unheard += 1;
            return;
        };

        let stats = &mut self.stats;
        mailboxes.retain(|id, mailbox| match mailbox.try_send(value) {
            Ok(()) => {
                stats.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Mailbox {} on '{}' is full, dropping value {}",
                    id,
                    topic,
                    value
                );
                stats.dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("Pruning abandoned mailbox {} on '{}'", id, topic);
                stats.pruned += 1;
                false
            }
        });

        if mailboxes.is_empty() {
            self.subs.remove(topic);
        }
    }

    fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            active_subscriptions: self.subs.values().map(HashMap::len).sum(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn worker() -> (Sender<BrokerCommand<u16>>, BrokerWorker<u16>) {
        let (tx, rx) = bounded(16);
        (tx, BrokerWorker::new(rx))
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let (_tx, mut worker) = worker();
        let (a_tx, a_rx) = bounded(3);
        let (b_tx, b_rx) = bounded(3);
        worker.handle_subscribe(Topic::from("x"), a_tx);
        worker.handle_subscribe(Topic::from("x"), b_tx);

        worker.handle_publish(&Topic::from("x"), 123);

        assert_eq!(a_rx.try_recv().unwrap(), 123);
        assert_eq!(b_rx.try_recv().unwrap(), 123);
        assert_eq!(worker.stats.delivered, 2);
    }

    #[test]
    fn test_full_mailbox_drops_value() {
        let (_tx, mut worker) = worker();
        let (m_tx, m_rx) = bounded(1);
        worker.handle_subscribe(Topic::from("x"), m_tx);

        worker.handle_publish(&Topic::from("x"), 1);
        worker.handle_publish(&Topic::from("x"), 2);

        assert_eq!(m_rx.try_recv().unwrap(), 1);
        assert!(m_rx.try_recv().is_err());
        assert_eq!(worker.stats.dropped, 1);
        assert_eq!(worker.snapshot().active_subscriptions, 1);
    }

    #[test]
    fn test_abandoned_mailbox_is_pruned() {
        let (_tx, mut worker) = worker();
        let (m_tx, m_rx) = bounded(3);
        worker.handle_subscribe(Topic::from("x"), m_tx);
        drop(m_rx);

        worker.handle_publish(&Topic::from("x"), 9);

        assert_eq!(worker.stats.pruned, 1);
        assert!(worker.subs.is_empty());
    }

    #[test]
    fn test_unsubscribe_twice_counts_once() {
        let (_tx, mut worker) = worker();
        let (m_tx, _m_rx) = bounded(3);
        let id = worker.handle_subscribe(Topic::from("x"), m_tx);

        worker.handle_unsubscribe(id);
        worker.handle_unsubscribe(id);

        assert_eq!(worker.stats.unsubscribed, 1);
        assert_eq!(worker.snapshot().active_subscriptions, 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_unheard() {
        let (_tx, mut worker) = worker();
        worker.handle_publish(&Topic::from("nobody"), 5);
        assert_eq!(worker.stats.published, 1);
        assert_eq!(worker.stats.unheard, 1);
    }

    #[test]
    fn test_run_exits_on_stop_and_closes_mailboxes() {
        let (tx, worker) = worker();
        let (m_tx, m_rx) = bounded::<u16>(3);
        let (reply_tx, reply_rx) = bounded(1);
        tx.send(BrokerCommand::Subscribe {
            topic: Topic::from("x"),
            mailbox: m_tx,
            reply: reply_tx,
        })
        .unwrap();
        tx.send(BrokerCommand::Stop).unwrap();

        let stats = worker.run();

        assert_eq!(reply_rx.recv().unwrap(), SubscriptionId(0));
        assert_eq!(stats.active_subscriptions, 1);
        assert!(m_rx.recv().is_err());
    }
}
