//! memledger: a fixed-arena allocator with checked pointer handles.
//!
//! This is the top-level facade crate. It re-exports the allocator and
//! handle types from the sub-crates and adds the typed layer on top:
//! element construction and destruction, bulk copy/fill, and an inline
//! fixed-capacity array with a handle view.
//!
//! # Quick start
//!
//! ```rust
//! use memledger::prelude::*;
//!
//! let mgr = MemoryManager::new(1 << 20);
//! let v: Ptr<f64> = aligned_new(16, &mgr);
//! let w: Ptr<f64> = aligned_new(16, &mgr);
//!
//! // SAFETY: both blocks are live on `mgr`, every index is in range, and
//! // each handle is released exactly once.
//! unsafe {
//!     for i in 0..16 {
//!         v.write(i, i as f64);
//!     }
//!     memcopy(w, v, 16);
//!     assert_eq!(w.read(15), 15.0);
//!     aligned_delete(v, &mgr);
//!     aligned_delete(w, &mgr);
//! }
//! assert_eq!(mgr.outstanding(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `memledger-arena` | Allocator, block ledger, headers, handles |
//! | [`types`] | `memledger-core` | Identifiers and error types |
//! | [`typed`] | this crate | `aligned_new`, `aligned_delete`, `memcopy`, `memset` |
//! | [`static_array`] | this crate | [`StaticArray`] |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Allocator, block ledger, headers and handles (`memledger-arena`).
pub use memledger_arena as arena;

/// Identifiers and error types (`memledger-core`).
pub use memledger_core as types;

pub mod static_array;
pub mod typed;

pub use static_array::{StaticArray, StaticArrayView};

/// Common imports for typical memledger usage.
///
/// ```rust
/// use memledger::prelude::*;
/// ```
pub mod prelude {
    // Allocator
    pub use memledger_arena::{glb_mem_mgr, MemConfig, MemStats, MemoryManager};

    // Handles
    pub use memledger_arena::{CheckedPtr, ConstPtr, ElemPtr, Pod, Ptr, RawPtr};

    // Identifiers and errors
    pub use memledger_core::{AccessError, HeaderError, IntegrityError, TypeTag};

    // Typed layer
    pub use crate::static_array::{StaticArray, StaticArrayView};
    pub use crate::typed::{
        aligned_delete, aligned_delete_default, aligned_new, aligned_new_default, memcopy,
        memset, try_aligned_new_with, try_aligned_new_with_default,
    };
}
