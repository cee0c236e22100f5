//! Nondeterministic merge primitives for pull-based streams.
//!
//! This library provides the two concurrent merge combinators at the core
//! of a pull-based streaming model:
//!
//! - [`wye`][wye::wye] merges exactly two sources, driven by a reusable,
//!   pure [merge program][wye::Wye] that decides at each step which side(s)
//!   to read from and what to emit;
//! - [`njoin`][njoin::njoin] merges a dynamic, potentially unbounded outer
//!   source of inner sources, bounded by caller-specified limits on open
//!   inners and on buffered output.
//!
//! Both honor one termination protocol: every stream halts with a
//! [`Cause`][cause::Cause] (normal end, forced cancellation, or error)
//! which propagates through the whole tree of producers and consumers so
//! that every finalizer runs exactly once and no producer outlives its
//! consumer.
//!
//! # Examples
//!
//! Merge two sources, first-come first-served:
//!
//! ```rust
//! use stream_confluence::wye::{programs, wye};
//!
//! futures_lite::future::block_on(async {
//!     let out = wye(vec![1, 2, 3], vec![10, 20, 30], programs::merge());
//!     let (items, cause) = out.run_collect().await;
//!     assert_eq!(items.len(), 6);
//!     assert!(cause.is_end());
//! });
//! ```
//!
//! Flatten a source of sources, at most two at a time:
//!
//! ```rust
//! use stream_confluence::njoin::njoin;
//! use stream_confluence::source::Source;
//!
//! futures_lite::future::block_on(async {
//!     let outer = Source::from_iter(vec![
//!         Source::from_iter(vec![1, 2]),
//!         Source::from_iter(vec![3, 4]),
//!         Source::from_iter(vec![5, 6]),
//!     ]);
//!     let (items, cause) = njoin(2, 8, outer).run_collect().await;
//!     assert_eq!(items.len(), 6);
//!     assert!(cause.is_end());
//! });
//! ```

#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

mod utils;

/// The stream-confluence prelude.
pub mod prelude {
    pub use super::source::IntoSource as _;
}

pub mod cause;
pub mod njoin;
pub mod source;
pub mod wye;
