//! In-Memory Repository Implementations
//!
//! Thread-safe, process-local implementation of `ExportGuardRepository`.
//!
//! # Uses
//!
//! - **Dry runs**: guards events without writing to the store
//! - **Testing**: deterministic dedup without a database
//!
//! # Limitations
//!
//! - Guard records are lost on restart
//! - No dedup across multiple daemon instances

use crate::domain::repositories::ExportGuardRepository;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory implementation of ExportGuardRepository
pub struct InMemoryExportGuard {
    exported: Arc<Mutex<HashSet<i64>>>,
}

impl InMemoryExportGuard {
    pub fn new() -> Self {
        Self {
            exported: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of guarded entities
    pub async fn len(&self) -> usize {
        self.exported.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.exported.lock().await.is_empty()
    }
}

impl Default for InMemoryExportGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExportGuardRepository for InMemoryExportGuard {
    async fn try_mark_exported(&self, entity_id: i64) -> Result<bool> {
        Ok(self.exported.lock().await.insert(entity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_mark_loses() {
        let guard = InMemoryExportGuard::new();
        assert!(guard.try_mark_exported(7).await.unwrap());
        assert!(!guard.try_mark_exported(7).await.unwrap());
        assert!(guard.try_mark_exported(8).await.unwrap());
        assert_eq!(guard.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_racers_have_one_winner() {
        let guard = Arc::new(InMemoryExportGuard::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.try_mark_exported(42).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
