mod operations;
mod service;
mod thread_safe;
mod unified;

pub use operations::{drop_index, index_after_removal, TabOperationsManager};
pub use service::{DetachedTab, SharedTabManager, TabError, TabManager, TabManagerService, TabPolicy};
pub use thread_safe::{OperationError, PendingOperation, ThreadSafeTabOperations};
pub use unified::{LegacyTabItem, TabModelAdapter, UnifiedTabService};
