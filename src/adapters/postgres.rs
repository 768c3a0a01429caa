use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use crate::error::{KpiError, Result};
use crate::sources::{CountQuery, Filter, StoreReader, SumExpr, SumQuery};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreReader for PostgresStore {
    #[instrument(skip(self), fields(table = query.table.as_str()))]
    async fn count(&self, query: &CountQuery) -> Result<i64> {
        let mut builder = count_sql(query)?;
        debug!(sql = builder.sql(), "count");
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(table = query.table.as_str()))]
    async fn sum(&self, query: &SumQuery) -> Result<Decimal> {
        let mut builder = sum_sql(query)?;
        debug!(sql = builder.sql(), "sum");
        let total = builder
            .build_query_scalar::<Decimal>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

// ==================== SQL builders ====================

/// `SELECT COUNT(*)` for a resolved count query
///
/// With a recent limit the filters apply to the newest `n` rows only.
pub fn count_sql(query: &CountQuery) -> Result<QueryBuilder<'static, Postgres>> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*)::BIGINT FROM ");
    match query.recent_limit {
        Some(limit) => {
            builder
                .push("(SELECT * FROM ")
                .push(query.table.as_str())
                .push(" ORDER BY created_at DESC LIMIT ")
                .push_bind(i64::from(limit))
                .push(") AS sample");
        }
        None => {
            builder.push(query.table.as_str());
        }
    }
    push_filters(&mut builder, &query.filters)?;
    Ok(builder)
}

/// `SELECT SUM(..)` for a resolved sum query, zero when no row matches
pub fn sum_sql(query: &SumQuery) -> Result<QueryBuilder<'static, Postgres>> {
    let mut builder = QueryBuilder::new("SELECT COALESCE(SUM(");
    match query.expr {
        SumExpr::Column(column) => {
            builder.push(column);
        }
        SumExpr::HoursBetween { start, end } => {
            builder
                .push("EXTRACT(EPOCH FROM (")
                .push(end)
                .push(" - ")
                .push(start)
                .push(")) / 3600");
        }
    }
    builder
        .push("), 0)::NUMERIC FROM ")
        .push(query.table.as_str());
    push_filters(&mut builder, &query.filters)?;
    Ok(builder)
}

fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) -> Result<()> {
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq { column, value } => {
                builder.push(*column).push(" = ").push_bind(*value);
            }
            Filter::Flag { column, value } => {
                builder.push(*column).push(" = ").push_bind(*value);
            }
            Filter::NotNull { column } => {
                builder.push(*column).push(" IS NOT NULL");
            }
            Filter::Between { column, from, to } => {
                builder
                    .push(*column)
                    .push(" >= ")
                    .push_bind(*from)
                    .push(" AND ")
                    .push(*column)
                    .push(" < ")
                    .push_bind(*to);
            }
            Filter::InMonth { column, .. } => {
                return Err(KpiError::UnresolvedQuery(format!(
                    "month window on {} must be resolved before querying",
                    column
                )));
            }
        }
    }
    Ok(())
}
