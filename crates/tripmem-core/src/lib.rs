//! tripmem Core Library
//!
//! Fundamental types shared by the tripmem memory subsystem: the error
//! hierarchy, timestamps with a monotonic clock, and validated identifiers
//! for users and memory entries.
//!
//! # Modules
//!
//! - `error` - Error types and result aliases
//! - `id` - User and memory entry identifiers
//! - `temporal` - Timestamps and the monotonic store clock

pub mod error;
pub mod id;
pub mod temporal;

pub use error::{Error, Result};
pub use id::{EntryId, UserId};
pub use temporal::{MonotonicClock, Timestamp};
