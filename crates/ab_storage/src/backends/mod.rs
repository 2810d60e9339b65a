pub mod file;
pub mod memory;
pub mod posts;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileLedger;
pub use memory::MemoryLedger;
pub use posts::PostScanLedger;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
