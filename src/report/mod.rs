//! Report renderers.
//!
//! - [`terminal`]: colored table with one row per repository and one column per
//!   tracked package, followed by the per-repository errors.
//!
//! JSON output is the serialized [`Report`](crate::models::Report) itself.

pub mod terminal;
