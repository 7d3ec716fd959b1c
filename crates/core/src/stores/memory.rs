use crate::error::RagError;
use crate::models::{Chunk, DistanceMetric, IndexKind, RetrievalResult, ScoredItem, StoredItem};
use crate::traits::{check_dimensions, VectorStore};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Process-local store that always answers by exact scan.
pub struct MemoryStore {
    dimensions: usize,
    metric: DistanceMetric,
    items: RwLock<Vec<StoredItem>>,
    index: RwLock<Option<IndexKind>>,
}

impl MemoryStore {
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            items: RwLock::new(Vec::new()),
            index: RwLock::new(None),
        }
    }

    pub async fn index_kind(&self) -> Option<IndexKind> {
        *self.index.read().await
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn ensure_schema(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn insert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<i64, RagError> {
        check_dimensions(self.dimensions, embedding.len())?;

        let mut items = self.items.write().await;
        let id = items.len() as i64 + 1;
        items.push(StoredItem {
            id,
            text: chunk.text.clone(),
            source_id: chunk.source_id.clone(),
            sequence_index: chunk.sequence_index,
            embedding: embedding.to_vec(),
        });
        Ok(id)
    }

    async fn build_index(&self, kind: IndexKind) -> Result<(), RagError> {
        *self.index.write().await = Some(kind);
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult, RagError> {
        check_dimensions(self.dimensions, query_vector.len())?;

        let items = self.items.read().await;
        let mut scored: Vec<ScoredItem> = items
            .iter()
            .map(|item| ScoredItem {
                distance: self.metric.distance(query_vector, &item.embedding),
                item: item.clone(),
            })
            .collect();

        scored.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then(left.item.id.cmp(&right.item.id))
        });
        scored.truncate(k);

        Ok(RetrievalResult::new(scored))
    }

    async fn count(&self) -> Result<u64, RagError> {
        Ok(self.items.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, index: u64) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_id: "pathways.md".to_string(),
            sequence_index: index,
        }
    }

    #[tokio::test]
    async fn exact_match_is_returned_at_distance_zero() -> Result<(), RagError> {
        let store = MemoryStore::new(3, DistanceMetric::L2);
        store.insert(&chunk("one", 0), &[1.0, 0.0, 0.0]).await?;
        let second = store.insert(&chunk("two", 1), &[0.0, 1.0, 0.0]).await?;
        store.insert(&chunk("three", 2), &[0.0, 0.0, 1.0]).await?;

        let result = store.search(&[0.0, 1.0, 0.0], 1).await?;
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].item.id, second);
        assert_eq!(result.hits[0].item.text, "two");
        assert!(result.hits[0].distance.abs() < 1e-6);
        Ok(())
    }

    #[tokio::test]
    async fn results_are_bounded_and_ordered() -> Result<(), RagError> {
        let store = MemoryStore::new(2, DistanceMetric::L2);
        for (index, x) in [5.0f32, 1.0, 3.0, 2.0, 4.0].iter().enumerate() {
            store.insert(&chunk(&format!("p{index}"), index as u64), &[*x, 0.0]).await?;
        }

        let result = store.search(&[0.0, 0.0], 3).await?;
        let distances: Vec<f64> = result.iter().map(|hit| hit.distance).collect();
        assert_eq!(distances.len(), 3);
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(distances.iter().all(|d| *d <= 3.0 + 1e-9));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_text_is_kept() -> Result<(), RagError> {
        let store = MemoryStore::new(1, DistanceMetric::L2);
        let first = store.insert(&chunk("same", 0), &[1.0]).await?;
        let second = store.insert(&chunk("same", 0), &[1.0]).await?;
        assert_ne!(first, second);
        assert_eq!(store.count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn empty_store_searches_to_nothing() -> Result<(), RagError> {
        let store = MemoryStore::new(2, DistanceMetric::Cosine);
        assert!(store.search(&[1.0, 0.0], 5).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let store = MemoryStore::new(3, DistanceMetric::L2);
        let result = store.insert(&chunk("x", 0), &[1.0]).await;
        assert!(matches!(result, Err(RagError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn build_index_is_recorded_and_repeatable() -> Result<(), RagError> {
        let store = MemoryStore::new(2, DistanceMetric::L2);
        store.build_index(IndexKind::Hnsw).await?;
        store.build_index(IndexKind::Hnsw).await?;
        assert_eq!(store.index_kind().await, Some(IndexKind::Hnsw));
        Ok(())
    }
}
