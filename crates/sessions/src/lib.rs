//! In-memory conversation sessions keyed by sender.
//!
//! Each sender owns one [`Session`] behind its own async mutex; the
//! [`SessionStore`] hands out [`SessionHandle`]s so callers can hold a
//! sender's lock for the whole processing of one inbound event. Nothing is
//! persisted: sessions live for the lifetime of the process.

pub mod session;
pub mod store;

pub use {
    session::{Role, Session, SessionLimits, Turn},
    store::{SessionHandle, SessionStore},
};
