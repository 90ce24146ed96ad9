//! Usage infrastructure - repositories and the usage accountant

mod accountant;
mod in_memory;
mod postgres;

pub use accountant::{RecordOutcome, UsageAccountant};
pub use in_memory::InMemoryUsageRepository;
pub use postgres::PostgresUsageRepository;
