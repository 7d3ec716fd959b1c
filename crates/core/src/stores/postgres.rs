use crate::error::RagError;
use crate::models::{Chunk, DistanceMetric, IndexKind, RetrievalResult, ScoredItem, StoredItem};
use crate::traits::{check_dimensions, VectorStore};
use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, warn};

pub const DEFAULT_TABLE: &str = "items";

/// Items table in Postgres with the pgvector extension. Every insert is a
/// standalone autocommitted statement.
pub struct PgVectorStore {
    client: Client,
    table: String,
    dimensions: usize,
    metric: DistanceMetric,
}

impl PgVectorStore {
    pub async fn connect(
        database_url: &str,
        table: impl Into<String>,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|error| RagError::StoreUnavailable(error.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection closed");
            }
        });

        Self::from_client(client, table, dimensions, metric)
    }

    pub fn from_client(
        client: Client,
        table: impl Into<String>,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(RagError::Configuration("table name is required".to_string()));
        }
        if dimensions == 0 {
            return Err(RagError::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }

        Ok(Self {
            client,
            table,
            dimensions,
            metric,
        })
    }

    fn qualified(&self) -> String {
        quote_ident(&self.table)
    }

    fn index_name(&self, method: &str) -> String {
        format!(
            "{}_embedding_{}_{}_idx",
            sanitize_ident(&self.table),
            method,
            self.metric.operator_class()
        )
    }

    async fn stored_dimensions(&self) -> Result<Option<usize>, RagError> {
        let row = self
            .client
            .query_opt(
                "SELECT a.atttypmod FROM pg_attribute a \
                 JOIN pg_class c ON c.oid = a.attrelid \
                 WHERE c.relname = $1 AND c.relkind = 'r' \
                 AND a.attname = 'embedding' AND NOT a.attisdropped \
                 LIMIT 1",
                &[&self.table],
            )
            .await?;

        Ok(row
            .map(|row| row.get::<_, i32>(0))
            .filter(|typmod| *typmod > 0)
            .map(|typmod| typmod as usize))
    }

    async fn existing_vector_indexes(&self) -> Result<Vec<(String, String)>, RagError> {
        let rows = self
            .client
            .query(
                "SELECT indexname, indexdef FROM pg_indexes \
                 WHERE tablename = $1 AND (indexdef ILIKE '%USING hnsw%' OR indexdef ILIKE '%USING ivfflat%')",
                &[&self.table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    /// An ANN index built for one metric cannot serve another.
    async fn check_index_metric(&self) -> Result<(), RagError> {
        let indexes = self.existing_vector_indexes().await?;
        match foreign_metric_indexes(self.metric, &indexes).first() {
            Some(name) => Err(RagError::Configuration(format!(
                "index {name} on {} was built for a different distance metric than {:?}; \
                 rebuild with the exact index kind first",
                self.table, self.metric
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn ensure_schema(&self) -> Result<(), RagError> {
        self.client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                chunk_text TEXT NOT NULL,
                source_file TEXT NOT NULL,
                sequence_index BIGINT NOT NULL,
                embedding VECTOR({}) NOT NULL,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.qualified(),
            self.dimensions
        );
        self.client.execute(&ddl, &[]).await?;

        if let Some(stored) = self.stored_dimensions().await? {
            if stored != self.dimensions {
                return Err(RagError::Configuration(format!(
                    "table {} holds {stored}-dimensional vectors but the embedder produces {}; re-embed the store",
                    self.table, self.dimensions
                )));
            }
        }

        let indexes = self.existing_vector_indexes().await?;
        for name in foreign_metric_indexes(self.metric, &indexes) {
            warn!(
                table = %self.table,
                index = %name,
                metric = ?self.metric,
                "index serves a different distance metric and will not be used"
            );
        }
        info!(table = %self.table, dimensions = self.dimensions, "schema ready");
        Ok(())
    }

    async fn insert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<i64, RagError> {
        check_dimensions(self.dimensions, embedding.len())?;

        let sql = format!(
            "INSERT INTO {} (chunk_text, source_file, sequence_index, embedding) \
             VALUES ($1, $2, $3, $4) RETURNING id",
            self.qualified()
        );
        let sequence_index = i64::try_from(chunk.sequence_index).map_err(|_| {
            RagError::InvalidArgument(format!(
                "sequence index {} exceeds i64 range",
                chunk.sequence_index
            ))
        })?;
        let vector = Vector::from(embedding.to_vec());

        let row = self
            .client
            .query_one(
                &sql,
                &[&chunk.text, &chunk.source_id, &sequence_index, &vector],
            )
            .await?;
        let id: i64 = row.get(0);
        debug!(id, source = %chunk.source_id, index = chunk.sequence_index, "chunk stored");
        Ok(id)
    }

    async fn build_index(&self, kind: IndexKind) -> Result<(), RagError> {
        if kind.is_approximate() {
            self.check_index_metric().await?;
        }
        let opclass = self.metric.operator_class();

        let sql = match kind {
            IndexKind::Hnsw => format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (embedding {opclass})",
                quote_ident(&self.index_name("hnsw")),
                self.qualified()
            ),
            IndexKind::IvfFlat { lists } => format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} USING ivfflat (embedding {opclass}) WITH (lists = {})",
                quote_ident(&self.index_name("ivfflat")),
                self.qualified(),
                lists.max(1)
            ),
            IndexKind::Exact => {
                for (name, _) in self.existing_vector_indexes().await? {
                    self.client
                        .execute(&format!("DROP INDEX IF EXISTS {}", quote_ident(&name)), &[])
                        .await?;
                }
                info!(table = %self.table, "approximate indexes dropped, searches use exact scan");
                return Ok(());
            }
        };

        self.client.execute(&sql, &[]).await?;
        info!(table = %self.table, kind = ?kind, metric = ?self.metric, "vector index ready");
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult, RagError> {
        check_dimensions(self.dimensions, query_vector.len())?;
        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let sql = format!(
            "SELECT id, chunk_text, source_file, sequence_index, embedding, \
                embedding {op} $1 AS distance \
             FROM {table} \
             ORDER BY embedding {op} $1 ASC, id ASC \
             LIMIT $2",
            op = self.metric.operator(),
            table = self.qualified()
        );
        let vector = Vector::from(query_vector.to_vec());
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        let rows = self.client.query(&sql, &[&vector, &limit]).await?;
        let hits = rows.iter().map(scored_item_from_row).collect::<Vec<_>>();
        debug!(k, returned = hits.len(), "vector search finished");
        Ok(RetrievalResult::new(hits))
    }

    async fn count(&self) -> Result<u64, RagError> {
        let row = self
            .client
            .query_one(&format!("SELECT COUNT(*) FROM {}", self.qualified()), &[])
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}

fn scored_item_from_row(row: &Row) -> ScoredItem {
    let embedding: Vector = row.get("embedding");
    let sequence_index: i64 = row.get("sequence_index");
    ScoredItem {
        item: StoredItem {
            id: row.get("id"),
            text: row.get("chunk_text"),
            source_id: row.get("source_file"),
            sequence_index: sequence_index.max(0) as u64,
            embedding: embedding.to_vec(),
        },
        distance: row.get("distance"),
    }
}

/// Names of the indexes whose definition lacks the metric's operator class.
fn foreign_metric_indexes(metric: DistanceMetric, indexes: &[(String, String)]) -> Vec<String> {
    let opclass = metric.operator_class();
    indexes
        .iter()
        .filter(|(_, definition)| !definition.contains(opclass))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Quotes Postgres identifiers, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}
