//! Topic broker
//!
//! Decouples publishers from subscribers by topic name. The broker runs its
//! own event loop on a dedicated thread and owns all routing state; callers
//! only ever hold a [`BrokerHandle`], which turns every operation into a message
//! on the broker's command channel.
//!
//! # Architecture
//!
//! ```text
//! [Node] ──Subscribe/Publish/Unsubscribe──► command channel ──► [BrokerWorker]
//!    ▲                                                              │
//!    └───────────────────── Mailbox (bounded/unbounded) ◄───────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use wirecast::broker::Broker;
//! use wirecast::config::BrokerConfig;
//!
//! let broker = Broker::<u16>::spawn(&BrokerConfig::default())?;
//! let mailbox = broker.subscribe("x")?;
//! broker.publish("x", 123)?;
//! assert_eq!(mailbox.recv()?, 123);
//! broker.unsubscribe(&mailbox)?;
//! let stats = broker.stop()?;
//! assert_eq!(stats.delivered, 1);
//! # Ok::<(), wirecast::WireError>(())
//! ```

mod worker;

pub use crate::config::DeliveryPolicy;

use crate::config::BrokerConfig;
use crate::error::{Result, WireError};
use crate::pipeline::id::SubscriptionId;
use crate::types::{Signal, Topic};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::ops::Deref;
use std::thread::JoinHandle;
use std::time::Duration;
use worker::{BrokerCommand, BrokerWorker};

/// Counters kept by the broker loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Subscriptions registered
    pub subscribed: u64,
    /// Subscriptions removed by an explicit unsubscribe
    pub unsubscribed: u64,
    /// Publish commands handled
    pub published: u64,
    /// Values placed into a mailbox
    pub delivered: u64,
    /// Values lost to a full mailbox
    pub dropped: u64,
    /// Registrations removed because the subscriber dropped its mailbox
    pub pruned: u64,
    /// Publishes on a topic nobody was subscribed to
    pub unheard: u64,
    /// Registrations still in the table when the snapshot was taken
    pub active_subscriptions: usize,
}

/// Receiving end of one subscription.
///
/// Owned by the subscriber. Dropping it is allowed at any time; the broker
/// prunes the registration on the next publish to its topic.
pub struct Mailbox<V> {
    id: SubscriptionId,
    topic: Topic,
    rx: Receiver<V>,
}

impl<V: Signal> Mailbox<V> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Block until a value arrives.
    ///
    /// Fails with [`WireError::MailboxClosed`] once the mailbox is empty and
    /// the broker no longer holds its sender.
    pub fn recv(&self) -> Result<V> {
        self.rx
            .recv()
            .map_err(|_| WireError::MailboxClosed(self.topic.to_string()))
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<V> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WireError::Timeout(format!(
                "no value on '{}' within {:?}",
                self.topic, timeout
            )),
            RecvTimeoutError::Disconnected => WireError::MailboxClosed(self.topic.to_string()),
        })
    }

    /// Take a value if one is already waiting.
    pub fn try_recv(&self) -> Option<V> {
        self.rx.try_recv().ok()
    }

    /// Number of values waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn receiver(&self) -> &Receiver<V> {
        &self.rx
    }
}

impl<V> std::fmt::Debug for Mailbox<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("pending", &self.rx.len())
            .finish()
    }
}

/// Cloneable handle for talking to a running broker.
pub struct BrokerHandle<V> {
    command_tx: Sender<BrokerCommand<V>>,
    delivery: DeliveryPolicy,
    mailbox_capacity: usize,
}

impl<V> Clone for BrokerHandle<V> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            delivery: self.delivery,
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}

impl<V: Signal> BrokerHandle<V> {
    /// Allocate a mailbox, register it under `topic` and return it.
    ///
    /// Returns only after the broker loop has recorded the registration, so
    /// any publish issued after this call returns will see the mailbox.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> Result<Mailbox<V>> {
        let topic = topic.into();
        let (mailbox_tx, mailbox_rx) = match self.delivery {
            DeliveryPolicy::BestEffort => bounded(self.mailbox_capacity),
            DeliveryPolicy::Reliable => unbounded(),
        };
        let (reply_tx, reply_rx) = bounded(1);

        self.send(BrokerCommand::Subscribe {
            topic: topic.clone(),
            mailbox: mailbox_tx,
            reply: reply_tx,
        })?;
        let id = reply_rx.recv().map_err(|_| WireError::BrokerStopped)?;

        Ok(Mailbox {
            id,
            topic,
            rx: mailbox_rx,
        })
    }

    /// Remove `mailbox` from every topic. Unsubscribing twice is a no-op.
    pub fn unsubscribe(&self, mailbox: &Mailbox<V>) -> Result<()> {
        self.send(BrokerCommand::Unsubscribe(mailbox.id))
    }

    /// Queue `value` for every mailbox currently registered under `topic`.
    pub fn publish(&self, topic: impl Into<Topic>, value: V) -> Result<()> {
        self.send(BrokerCommand::Publish {
            topic: topic.into(),
            value,
        })
    }

    /// Counters as of the moment the broker handles this request. Every
    /// command sent earlier from this thread has been handled by then.
    pub fn stats(&self) -> Result<BrokerStats> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(BrokerCommand::Stats(reply_tx))?;
        reply_rx.recv().map_err(|_| WireError::BrokerStopped)
    }

    /// Ask the loop to exit without waiting for it. Safe to call repeatedly.
    pub fn request_stop(&self) {
        let _ = self.command_tx.send(BrokerCommand::Stop);
    }

    pub fn delivery(&self) -> DeliveryPolicy {
        self.delivery
    }

    fn send(&self, cmd: BrokerCommand<V>) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| WireError::BrokerStopped)
    }
}

/// A running broker: its loop thread plus a handle.
///
/// Derefs to [`BrokerHandle`]. Dropping the broker stops the loop and joins it.
pub struct Broker<V: Signal> {
    handle: BrokerHandle<V>,
    thread: Option<JoinHandle<BrokerStats>>,
}

impl<V: Signal> Broker<V> {
    /// Start the broker loop on its own thread.
    pub fn spawn(config: &BrokerConfig) -> Result<Self> {
        if config.mailbox_capacity == 0 || config.command_buffer == 0 {
            return Err(WireError::Config(
                "broker capacities must be at least 1".to_string(),
            ));
        }

        let (command_tx, command_rx) = bounded(config.command_buffer);
        let worker = BrokerWorker::new(command_rx);
        let thread = std::thread::Builder::new()
            .name("wirecast-broker".to_string())
            .spawn(move || worker.run())?;

        tracing::debug!(
            "Broker spawned ({} delivery, mailbox capacity {})",
            config.delivery,
            config.mailbox_capacity
        );

        Ok(Self {
            handle: BrokerHandle {
                command_tx,
                delivery: config.delivery,
                mailbox_capacity: config.mailbox_capacity,
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &BrokerHandle<V> {
        &self.handle
    }

    /// Stop the loop, wait for it to exit and return its final counters.
    ///
    /// Any mailbox still registered is closed, which wakes its subscriber.
    pub fn stop(mut self) -> Result<BrokerStats> {
        self.handle.request_stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| WireError::Thread("broker thread panicked".to_string())),
            None => Err(WireError::BrokerStopped),
        }
    }
}

impl<V: Signal> Deref for Broker<V> {
    type Target = BrokerHandle<V>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<V: Signal> Drop for Broker<V> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.request_stop();
            let _ = thread.join();
        }
    }
}
