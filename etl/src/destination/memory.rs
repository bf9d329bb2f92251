use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::destination::{QueryResult, Warehouse};
use crate::error::{EtlError, EtlResult};

#[derive(Debug, Clone)]
enum Reply {
    Rows(QueryResult),
    Fail(EtlError),
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    statements: Vec<String>,
    rules: Vec<Rule>,
}

/// In-memory warehouse for tests and dry runs.
///
/// [`MemoryWarehouse`] records every statement it receives and answers from scripted rules: the
/// most recently added rule whose needle is contained in the statement decides the reply.
/// Statements that match no rule succeed with an empty result.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers statements containing `needle` with `result`.
    pub async fn respond(&self, needle: impl Into<String>, result: QueryResult) {
        self.add_rule(needle.into(), Reply::Rows(result), None).await;
    }

    /// Answers statements containing `needle` with `result` after `delay`.
    pub async fn respond_after(
        &self,
        needle: impl Into<String>,
        result: QueryResult,
        delay: Duration,
    ) {
        self.add_rule(needle.into(), Reply::Rows(result), Some(delay))
            .await;
    }

    /// Fails statements containing `needle` with `error`.
    pub async fn fail_on(&self, needle: impl Into<String>, error: EtlError) {
        self.add_rule(needle.into(), Reply::Fail(error), None).await;
    }

    async fn add_rule(&self, needle: String, reply: Reply, delay: Option<Duration>) {
        let mut inner = self.inner.lock().await;
        inner.rules.push(Rule {
            needle,
            reply,
            delay,
        });
    }

    /// Returns every statement received so far, in order.
    pub async fn statements(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.statements.clone()
    }

    /// Returns the received statements that contain `needle`.
    pub async fn statements_containing(&self, needle: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .statements
            .iter()
            .filter(|statement| statement.contains(needle))
            .cloned()
            .collect()
    }

    /// Forgets the received statements. Rules are kept.
    pub async fn clear_statements(&self) {
        let mut inner = self.inner.lock().await;
        inner.statements.clear();
    }
}

impl Warehouse for MemoryWarehouse {
    fn name() -> &'static str {
        "memory"
    }

    async fn execute(&self, sql: &str) -> EtlResult<QueryResult> {
        let rule = {
            let mut inner = self.inner.lock().await;
            info!(statement = sql, "executing statement");
            inner.statements.push(sql.to_owned());
            inner
                .rules
                .iter()
                .rev()
                .find(|rule| sql.contains(&rule.needle))
                .cloned()
        };

        let Some(rule) = rule else {
            return Ok(QueryResult::default());
        };

        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }

        match rule.reply {
            Reply::Rows(result) => Ok(result),
            Reply::Fail(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::etl_error;

    #[tokio::test]
    async fn latest_matching_rule_wins() {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .respond("SELECT", QueryResult::new(vec!["A".into()], vec![vec![Some("1".into())]]))
            .await;
        warehouse
            .respond("SELECT 2", QueryResult::new(vec!["A".into()], vec![vec![Some("2".into())]]))
            .await;
        warehouse
            .fail_on("DROP", etl_error!(ErrorKind::DestinationQueryFailed, "boom"))
            .await;

        let first = warehouse.execute("SELECT 1").await.unwrap();
        let second = warehouse.execute("SELECT 2").await.unwrap();
        let other = warehouse.execute("CREATE TABLE t (a INT)").await.unwrap();
        let err = warehouse.execute("DROP TABLE t").await.unwrap_err();

        assert_eq!(first.scalar(), Some("1"));
        assert_eq!(second.scalar(), Some("2"));
        assert!(other.is_empty());
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
        assert_eq!(warehouse.statements().await.len(), 4);
    }
}
