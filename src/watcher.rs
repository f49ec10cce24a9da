//! Change detection over a [`Storage`](crate::shelf::storage::Storage).
//!
//! - [`tracker::ChangeTracker`]: the wrapper that diffs and dispatches
//! - [`snapshot::Snapshot`]: last-known token per entry
//! - [`guard::Guard`]: top-level vs. nested operation switch
//! - [`event::Event`]: what subscribers receive
//! - [`dispatch`]: dispatcher and subscriber seams, plus the stock [`dispatch::EventBus`]
//! - [`service::PollService`]: periodic listings

pub mod dispatch;
pub mod event;
pub mod guard;
pub mod service;
pub mod snapshot;
pub mod tracker;

pub use dispatch::{Dispatcher, EventBus, EventLog, Subscriber, SubscriptionId};
pub use event::{Event, EventKind};
pub use service::PollService;
pub use tracker::ChangeTracker;
