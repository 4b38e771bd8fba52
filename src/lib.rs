//! # keylens
//!
//! The backend-abstraction and key-semantics engine of an
//! operator-facing inspector for Redis-compatible key-value stores.
//!
//! ## What it does
//!
//! - **One contract, several clients:** the [`client::StoreClient`]
//!   trait normalizes structurally different client libraries (the
//!   `redis` crate, `deadpool-redis`, and an in-process memory store)
//!   behind one capability set, including each library's error model.
//! - **Type-correct key semantics:** scalar strings, lists, sets,
//!   sorted sets, and hashes each get the right read/mutate/paginate/
//!   export logic, dispatched through the [`types::KeyType`] registry.
//! - **Safe destructive operations:** batch and single-key deletes,
//!   database flushes scoped to the current database, and byte-exact
//!   dump/restore export/import with an explicit overwrite pre-check.
//!
//! Rendering, HTTP parsing, and configuration loading are external
//! collaborators: the engine consumes parsed parameters and returns
//! serde-serializable payloads, never markup.
//!
//! ## Quick start
//!
//! ```no_run
//! use keylens::{client, Inspector, ServerConfig, ValueCodec};
//! use keylens::paginate::DEFAULT_PER_PAGE;
//!
//! # async fn example() -> keylens::Result<()> {
//! let server = ServerConfig::default();
//!
//! // Picks the first client library enabled by cargo features.
//! let conn = client::connect(&server).await?;
//! let mut inspector = Inspector::new(conn, ValueCodec::default());
//!
//! let listing = inspector.list_keys("*", 1, DEFAULT_PER_PAGE).await?;
//! for descriptor in &listing.keys.items {
//!     println!("{} ({})", descriptor.name, descriptor.key_type);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Display vs round-tripping
//!
//! The [`ValueCodec`] display chain is best-effort and lossy: it
//! exists to make values readable, never to round-trip them. Only
//! export/import round-trips exactly, via the store's native
//! dump/restore, bypassing the codec entirely.

#[macro_use]
extern crate log;

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod ops;
pub mod paginate;
pub mod types;

// Re-exports for convenience
pub use client::StoreClient;
pub use codec::{EncodedValue, ValueCodec};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use ops::{Inspector, KeyDescriptor, KeyView, SaveRequest, SubKey};
pub use paginate::{paginate, Page};
pub use types::KeyType;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
