//! The parsed-message cache (L1) and waiting-for-input analysis.
//!
//! [`ParsedCache`] sits between the HTTP response-byte cache (L0, in
//! `shelleyfs-client`) and the filesystem's per-query snapshot caches (L2/L3,
//! in `shelleyfs-fs`): it memoises the JSON parse of a conversation's raw
//! bytes so repeated Readdir/Getattr calls don't re-parse on every lookup.

mod error;
mod parsed;
mod waiting;

pub use error::CacheError;
pub use parsed::ParsedCache;
pub use waiting::{WaitingStatus, waiting_for_input};
