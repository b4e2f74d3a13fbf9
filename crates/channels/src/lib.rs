//! Channel-facing contracts.
//!
//! A channel (WhatsApp today) implements [`ChannelOutbound`] to deliver text
//! and [`OperatorNotifier`] to alert the business owner. The [`Deduplicator`]
//! absorbs webhook redeliveries before anything reaches the pipeline.

pub mod dedup;
pub mod error;
pub mod plugin;

pub use {
    dedup::Deduplicator,
    error::{Error, Result},
    plugin::{ChannelOutbound, EscalationNotice, OperatorNotifier},
};
