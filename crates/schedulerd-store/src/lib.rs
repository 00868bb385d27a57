//! Job Store Gateway: read/write access to the `schedule_jobs` table.

pub mod gateway;
pub mod job;
pub mod memory;
pub mod testing;

pub use gateway::{JobStore, MySqlJobStore};
pub use job::Job;
pub use memory::MemoryJobStore;
