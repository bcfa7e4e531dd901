//! Postgres implementations of the passgate_core port traits.

mod rows;
mod store;

pub use store::{run_migrations, PgPassStore};
