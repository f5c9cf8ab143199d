//! # wirecast: dependency evaluation over a topic broker
//!
//! Evaluates sets of instructions over named single-assignment values
//! ("wires") without ever building the dependency graph. Each instruction runs
//! as an independent node that subscribes to the wires it reads, waits at a
//! one-shot barrier until every node has subscribed, then receives its inputs,
//! computes and publishes its output.
//!
//! ## Architecture
//!
//! - **Broker**: single-owner actor routing published values to subscriber
//!   mailboxes by topic, on its own thread
//! - **Pipeline**: the barrier, the per-node state machine and the evaluator
//!   that drives one run
//! - **Circuits**: parsers and answer helpers for gate circuits, chip transfer
//!   networks and boolean adders
//! - **Communication**: crossbeam channels for every cross-thread hand-off
//!
//! ## Configuration
//!
//! Engine settings (mailbox sizing, delivery policy, deadlines, logging) are
//! stored as TOML under the platform config directory in `wirecast/`:
//!
//! - **Linux**: `~/.config/wirecast/wirecast.toml`
//! - **macOS**: `~/Library/Application Support/wirecast/wirecast.toml`
//! - **Windows**: `%APPDATA%\wirecast\wirecast.toml`
//!
//! ## Example
//!
//! ```
//! use wirecast::{EngineConfig, Evaluator, Instruction, Operand, Operation};
//!
//! let instructions = vec![
//!     Instruction::set(123u16, "x"),
//!     Instruction::set(456u16, "y"),
//!     Instruction::binary(Operation::And, Operand::topic("x"), Operand::topic("y"), "d"),
//! ];
//!
//! let evaluation = Evaluator::new(&EngineConfig::default()).evaluate(instructions, ["d"])?;
//! assert_eq!(evaluation.value("d"), Some(72));
//! # Ok::<(), wirecast::WireError>(())
//! ```

pub mod broker;
pub mod circuits;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use broker::{Broker, BrokerHandle, BrokerStats, Mailbox};
pub use config::{DeliveryPolicy, EngineConfig};
pub use error::{Result, ResultExt, WireError};
pub use pipeline::{Barrier, Evaluation, Evaluator, Instruction, NodeId, Operand, Operation};
pub use types::{Signal, Topic};
