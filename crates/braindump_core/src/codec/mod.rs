//! Persisted document codec.
//!
//! # Responsibility
//! - `metadata`: invisible per-line bookkeeping tokens.
//! - `markdown`: section grammar parse/serialize built on top of `metadata`.
//!
//! # Invariants
//! - Visible grammar and hidden tokens are encoded independently.

pub mod markdown;
pub mod metadata;
