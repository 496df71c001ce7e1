pub mod file_operations;

pub use file_operations::{FileOperationError, FileOperations, LocalFileOperations};
