pub mod batch;
pub mod stability;
pub mod summary;
pub mod task;

pub use batch::{BatchOptions, BatchRunner, TransferJob};
pub use stability::StabilityDetector;
pub use summary::{format_size, write_summary};
pub use task::{TaskState, TaskStatus, TaskStore};
