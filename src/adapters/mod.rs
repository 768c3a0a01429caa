pub mod postgres;

pub use postgres::{count_sql, sum_sql, PostgresStore};
