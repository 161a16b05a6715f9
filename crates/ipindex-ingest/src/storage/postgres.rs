//! PostgreSQL load sink and record search
//!
//! Records land in `network_records`, keyed by their deterministic id. Inserts
//! use `ON CONFLICT (id) DO NOTHING RETURNING id`: the returned ids are the
//! rows actually written, every other id of the batch is a conflict.

use std::collections::HashSet;

use async_trait::async_trait;
use ipindex_common::types::{NetworkRecord, Registry};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::error::SinkError;
use crate::framework::sink::{LoadSink, SinkConnector, WriteOutcome};

/// Bind parameters per inserted row
const COLUMNS_PER_ROW: usize = 9;

/// Rows per INSERT, kept under PostgreSQL's 65535 bind parameter limit
const MAX_ROWS_PER_STATEMENT: usize = 65_535 / COLUMNS_PER_ROW;

/// Hands each worker task its own pooled connection
#[derive(Debug, Clone)]
pub struct PgConnector {
    pool: PgPool,
}

impl PgConnector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SinkConnector for PgConnector {
    type Sink = PgSink;

    async fn open_connection(&self) -> Result<PgSink, SinkError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;
        Ok(PgSink { conn })
    }
}

/// A pooled connection, returned to the pool on drop
pub struct PgSink {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl LoadSink for PgSink {
    async fn bulk_write(&mut self, batch: &[NetworkRecord]) -> Result<WriteOutcome, SinkError> {
        let mut outcome = WriteOutcome::default();

        for rows in batch.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO network_records (\
                 id, network, name, description, country, maintainer, created, last_modified, source) ",
            );
            query_builder.push_values(rows.iter(), |mut b, record| {
                b.push_bind(record.id)
                    .push_bind(record.network.as_deref())
                    .push_bind(record.name.as_deref())
                    .push_bind(record.description.as_deref())
                    .push_bind(record.country.as_deref())
                    .push_bind(record.maintainer.as_deref())
                    .push_bind(record.created.as_deref())
                    .push_bind(record.last_modified.as_deref())
                    .push_bind(record.source.as_str());
            });
            query_builder.push(" ON CONFLICT (id) DO NOTHING RETURNING id");

            let inserted: Vec<Uuid> = query_builder
                .build_query_scalar::<Uuid>()
                .fetch_all(&mut *self.conn)
                .await?;

            outcome.merge(split_conflicts(rows, inserted));
        }

        debug!(
            batch = batch.len(),
            inserted = outcome.inserted,
            conflicts = outcome.conflicts.len(),
            "Flushed batch"
        );

        Ok(outcome)
    }
}

/// Ids of `rows` not in `inserted` are conflicts. A repeated id counts as
/// inserted at most once.
fn split_conflicts(rows: &[NetworkRecord], inserted: Vec<Uuid>) -> WriteOutcome {
    let mut fresh: HashSet<Uuid> = inserted.into_iter().collect();
    let mut outcome = WriteOutcome::default();

    for record in rows {
        if fresh.remove(&record.id) {
            outcome.inserted += 1;
        } else {
            outcome.conflicts.push(record.id);
        }
    }

    outcome
}

/// Text column a search pattern is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Description,
    Name,
    Maintainer,
    Country,
}

impl SearchField {
    fn column(&self) -> &'static str {
        match self {
            SearchField::Description => "description",
            SearchField::Name => "name",
            SearchField::Maintainer => "maintainer",
            SearchField::Country => "country",
        }
    }
}

impl std::str::FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "description" | "descr" => Ok(SearchField::Description),
            "name" | "netname" => Ok(SearchField::Name),
            "maintainer" | "mnt-by" => Ok(SearchField::Maintainer),
            "country" => Ok(SearchField::Country),
            other => Err(format!("unknown search field '{other}'")),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    network: Option<String>,
    name: Option<String>,
    description: Option<String>,
    country: Option<String>,
    maintainer: Option<String>,
    created: Option<String>,
    last_modified: Option<String>,
    source: String,
}

impl TryFrom<RecordRow> for NetworkRecord {
    type Error = SinkError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let source: Registry = row
            .source
            .parse()
            .map_err(|e: ipindex_common::IpIndexError| SinkError::Backend(e.to_string()))?;

        Ok(NetworkRecord {
            id: row.id,
            network: row.network,
            name: row.name,
            description: row.description,
            country: row.country,
            maintainer: row.maintainer,
            created: row.created,
            last_modified: row.last_modified,
            source,
        })
    }
}

/// Regular-expression lookups over stored records
#[derive(Debug, Clone)]
pub struct RecordSearch {
    pool: PgPool,
}

impl RecordSearch {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records whose `field` matches the POSIX regex `pattern`
    pub async fn search(
        &self,
        field: SearchField,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<NetworkRecord>, SinkError> {
        let sql = format!(
            "SELECT id, network, name, description, country, maintainer, created, last_modified, source \
             FROM network_records WHERE {} ~ $1 ORDER BY network LIMIT $2",
            field.column()
        );

        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(NetworkRecord::try_from).collect()
    }
}
