pub mod lifecycle;
pub mod process_table;

pub use lifecycle::ProcessLifecycleMonitor;
pub use process_table::{ProcessTableReader, ProcessTableSource, SysinfoSource};
