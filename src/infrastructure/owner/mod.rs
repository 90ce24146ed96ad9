//! Owner repository implementations

mod in_memory;
mod postgres;

pub use in_memory::InMemoryOwnerRepository;
pub use postgres::PostgresOwnerRepository;
