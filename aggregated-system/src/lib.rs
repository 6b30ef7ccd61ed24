//! Foundational system components for aggregated's services.
//!
//! Listeners and the aggregation engine communicate through the bounded channels created by
//! [`channel`]. Every long running component implements [`Service`] and is started onto the
//! runtime returned by [`create_runtime`].
#![warn(missing_docs)]

mod channel;
mod runtime;
mod service;

pub use self::channel::*;
pub use self::runtime::*;
pub use self::service::*;
