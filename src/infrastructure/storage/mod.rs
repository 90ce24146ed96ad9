//! Storage infrastructure - PostgreSQL pool and schema

mod postgres;

pub use postgres::{connect, ensure_schema, PostgresConfig};
