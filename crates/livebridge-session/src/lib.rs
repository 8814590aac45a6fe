//! Session layer: everything between the client socket and the upstream link.
//!
//! | Module         | Responsibility                                          |
//! |----------------|---------------------------------------------------------|
//! | [`aggregator`] | Reduce streamed chunks into whole client events         |
//! | [`channel`]    | Transport-agnostic client send/receive traits           |
//! | [`orchestrator`] | Session lifecycle and the concurrent relay pumps      |

pub mod aggregator;
pub mod channel;
pub mod orchestrator;

pub use aggregator::ResponseAggregator;
pub use channel::{ChannelError, ClientReceiver, ClientSender};
pub use orchestrator::SessionOrchestrator;
