//! Process-wide allocator instance.

use std::sync::OnceLock;

use crate::config::MemConfig;
use crate::manager::MemoryManager;

static GLOBAL: OnceLock<MemoryManager> = OnceLock::new();

/// The process-wide allocator, created on first use with
/// [`MemConfig::global`] (a [`MemConfig::DEFAULT_GLOBAL_MB`] MiB arena).
///
/// The instance lives for the rest of the process and is never dropped, so
/// blocks still outstanding at exit are not reported.
pub fn glb_mem_mgr() -> &'static MemoryManager {
    GLOBAL.get_or_init(|| MemoryManager::new(MemConfig::global().total_bytes))
}
