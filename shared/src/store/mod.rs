pub mod postgres;

pub use postgres::{PostgresDriverStore, PostgresOrderStore};
