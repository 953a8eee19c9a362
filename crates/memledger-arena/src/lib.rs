//! Fixed-arena block allocator with checked handles.
//!
//! One contiguous buffer is reserved up front and carved into blocks on
//! demand. Every payload is preceded by a checksummed header naming its
//! owning block descriptor, element count and size, allocation generation
//! and element type. Requests the arena cannot hold go to the platform
//! allocator.
//!
//! # Architecture
//!
//! ```text
//! MemoryManager
//! ├── ArenaBuffer (one aligned buffer, fixed size)
//! └── Mutex<LedgerState>
//!     ├── BlockLedger (address-ordered descriptor list, O(1) split/merge)
//!     ├── FreeIndex (size-ordered free blocks, best fit)
//!     └── ForeignSet (live platform-allocator blocks)
//! ```
//!
//! # Handles
//!
//! [`MemoryManager::malloc`] returns a [`Ptr<u8>`]: a [`CheckedPtr`] in debug
//! builds or with the `checked` feature, otherwise a [`RawPtr`]. Both
//! implement [`ElemPtr`]; the checked one validates bounds, alignment and
//! staleness on every access. [`ConstPtr`] is the read-only counterpart.
//! Accesses are `unsafe fn`: the caller keeps the memory behind a handle
//! live.
//!
//! # Verification mode
//!
//! With [`MemConfig::verify`] (on by default in debug builds) freed blocks
//! are overwritten with [`MemConfig::fill_byte`]. A reused block that no
//! longer holds the fill value, or a failing [`MemoryManager::check`],
//! reports a write after free.
//!
//! Unsafe code is confined to `raw`, `header`, `ptr` and `manager`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod config;
pub mod foreign;
pub mod free_index;
pub mod global;
pub mod header;
pub mod ledger;
pub mod manager;
pub mod ptr;
mod raw;

// Public re-exports for the primary API surface.
pub use config::MemConfig;
pub use global::glb_mem_mgr;
pub use header::BlockHeader;
pub use manager::{BlockInfo, MemStats, MemoryManager};
pub use ptr::{CheckedPtr, ConstPtr, ElemPtr, Pod, Ptr, RawPtr};
