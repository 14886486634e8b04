//! Connection Management
//!
//! Section resolution and the per-section connection cache.

pub mod router;

pub use router::*;
