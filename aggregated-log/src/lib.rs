//! Logging facade for aggregated.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it is read straight from the `logging` section of the
//! configuration file.
//!
//! ```ignore
//! let config = aggregated_log::LogConfig {
//!     enable_backtraces: true,
//!     ..Default::default()
//! };
//!
//! aggregated_log::init(&config);
//! ```
//!
//! # Logging
//!
//! Use the five logging macros [`error!`], [`warn!`], [`info!`], [`debug!`] and [`trace!`].
//! They accept format strings like [`println!`] as well as structured fields.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior, such as discarded snapshots.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging, such as dropped records.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log an error together with its causes, either pass it as a structured field or use the
//! [`LogError`] wrapper:
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use aggregated_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! aggregated_log::error!(error = &custom_error as &dyn std::error::Error, "operation failed");
//! aggregated_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, call [`init_test!`] at the beginning of the test. It installs a subscriber
//! that writes to the test harness and captures logs of the calling crate.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     aggregated_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
