use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Source;
use crate::types::{ColumnDescriptor, ConsistencyPoint, TableName};

#[derive(Debug)]
struct Inner {
    next_point: ConsistencyPoint,
    columns: Vec<ColumnDescriptor>,
    issued: Vec<ConsistencyPoint>,
}

/// Source returning increasing consistency points and a fixed column set.
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    /// The first consistency point handed out is `first_point`, later calls add one.
    pub fn new(first_point: ConsistencyPoint, columns: Vec<ColumnDescriptor>) -> MemorySource {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_point: first_point,
                columns,
                issued: Vec::new(),
            })),
        }
    }

    /// Consistency points handed out so far.
    pub async fn issued_points(&self) -> Vec<ConsistencyPoint> {
        self.inner.lock().await.issued.clone()
    }
}

impl Source for MemorySource {
    async fn current_consistency_point(&self) -> EtlResult<ConsistencyPoint> {
        let mut inner = self.inner.lock().await;
        let point = inner.next_point;
        inner.next_point += 1;
        inner.issued.push(point);

        Ok(point)
    }

    async fn table_columns_at(
        &self,
        table: &TableName,
        _consistency_point: ConsistencyPoint,
    ) -> EtlResult<Vec<ColumnDescriptor>> {
        let inner = self.inner.lock().await;
        if inner.columns.is_empty() {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Table does not exist",
                format!("`{table}` has no columns")
            );
        }

        Ok(inner.columns.clone())
    }
}
