//! Control protocol between the coordinator and its workers.
//!
//! Two point-to-point channels per worker carry [`ControlMsg`] down and
//! [`ReplyMsg`] back; one bounded queue shared by all workers carries
//! [`QueueEntry`] block deliveries.
//!
//! ```text
//!                 ┌─────────────────┐
//!                 │   Coordinator   │
//!                 └────┬───────▲────┘
//!        ControlMsg    │       │    ReplyMsg
//!                 ┌────▼───────┴────┐
//!                 │    Worker i     │
//!                 └────────┬────────┘
//!                          │  QueueEntry
//!                 ┌────────▼────────┐
//!                 │  shared queue   │──→ coordinator pop
//!                 └─────────────────┘
//! ```
//!
//! Both directions are closed sum types matched exhaustively, so an
//! unrecognized tag cannot exist at runtime; the only protocol failure left
//! is a coordinator observing a reply of the wrong kind.

pub mod control;
pub mod queue;
pub mod reply;

pub use control::ControlMsg;
pub use queue::QueueEntry;
pub use reply::ReplyMsg;
