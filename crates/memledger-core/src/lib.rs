//! Core types for the memledger allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! identifiers stamped into block headers (ledger indices, generations,
//! type tags) and the error types reported by the allocator and its
//! checked handles.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;

pub use error::{AccessError, ConfigError, HeaderError, IntegrityError};
pub use id::{Generation, NodeIndex, TypeTag};
