//! Publish/subscribe plumbing that keeps independently mounted fragments in
//! sync with the shared backing store.
//!
//! [`Topic`] is the underlying ordered subscriber list. [`DataChangeBus`]
//! partitions topics by [`Category`] and carries authoritative snapshots;
//! [`LoadingBus`] carries operation start/finish signals per entity.

mod data;
mod loading;
mod topic;

pub use data::{ActivityStats, Category, DataChange, DataChangeBus, NotificationSummary};
pub use loading::{LoadingBus, LoadingEvent};
pub use topic::{Subscription, Topic};
