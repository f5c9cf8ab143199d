//! Graph evaluation without a graph.
//!
//! Every instruction becomes a node running on its own thread. A node
//! subscribes to the topics it reads, arrives at a shared barrier, receives
//! its operand values, computes and publishes its output. Nobody ever
//! materialises the dependency graph: the order of evaluation falls out of
//! which values have been published.
//!
//! # Architecture
//!
//! ```text
//! [Evaluator] ──spawn──► [Node 0] [Node 1] … [Node n-1]
//!      │                    │ subscribe │          │
//!      │                    ▼           ▼          ▼
//!      │                 ════════════ Barrier ════════════
//!      │                    │ recv      │ publish  │
//!      └──watch──► [Broker] ◄───────────┴──────────┘
//! ```
//!
//! # Design
//!
//! - **Subscribe before release**: no node consumes a value until every node
//!   has registered, so no publish can reach an empty room.
//! - **Token barrier**: waiting requires the `Arrival` from `arrive()`.
//! - **Teardown cancels**: stopping the broker closes every mailbox, so a
//!   node waiting on a value that will never come is woken up.

pub mod barrier;
pub mod executor;
pub mod id;
pub mod node;

pub use barrier::{Arrival, Barrier};
pub use executor::{Evaluation, Evaluator};
pub use id::{NodeId, SubscriptionId};
pub use node::{Instruction, Node, NodeReport, NodeState, Operand, Operation};
