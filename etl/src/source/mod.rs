//! Access to the source database.

use std::future::Future;

use sqlx::MySqlPool;
use tidb::connection::connect_source;
use tidb::schema::{current_consistency_point, table_columns_at};
use tracing::{debug, info};

use config::shared::TidbConnectionConfig;

use crate::error::EtlResult;
use crate::types::{ColumnDescriptor, ConsistencyPoint, TableName};

/// Read access to the source of a replication.
pub trait Source {
    /// Returns the current consistency point of the source.
    fn current_consistency_point(&self) -> impl Future<Output = EtlResult<ConsistencyPoint>> + Send;

    /// Returns the columns of `table` as they were at `consistency_point`.
    fn table_columns_at(
        &self,
        table: &TableName,
        consistency_point: ConsistencyPoint,
    ) -> impl Future<Output = EtlResult<Vec<ColumnDescriptor>>> + Send;

    /// Releases the connections held by the source.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// A TiDB cluster reached over a small connection pool.
#[derive(Debug, Clone)]
pub struct TidbSource {
    pool: MySqlPool,
}

impl TidbSource {
    /// Connects to the cluster and checks that it answers queries.
    pub async fn connect(config: &TidbConnectionConfig) -> EtlResult<TidbSource> {
        let pool = connect_source(config).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(host = %config.host, port = config.port, "connected to source");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> TidbSource {
        Self { pool }
    }
}

impl Source for TidbSource {
    async fn current_consistency_point(&self) -> EtlResult<ConsistencyPoint> {
        Ok(current_consistency_point(&self.pool).await?)
    }

    async fn table_columns_at(
        &self,
        table: &TableName,
        consistency_point: ConsistencyPoint,
    ) -> EtlResult<Vec<ColumnDescriptor>> {
        Ok(table_columns_at(&self.pool, table, consistency_point).await?)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("closed source connections");
    }
}
