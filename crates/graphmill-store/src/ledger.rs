//! Progress ledger implementations. One entry per
//! `(identifier, id_value, stage)`; re-marking a stage replaces it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::trace;

use graphmill_core::{JobProgress, ProgressLedger, Result, StageRecord};

type JobKey = (String, String);

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct InMemoryProgressLedger {
    jobs: RwLock<HashMap<JobKey, Vec<StageRecord>>>,
}

impl InMemoryProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressLedger for InMemoryProgressLedger {
    async fn mark_stage_completed(
        &self,
        identifier: &str,
        id_value: &str,
        stage_name: &str,
        payload: JsonValue,
    ) -> Result<()> {
        let record = StageRecord {
            step_name: stage_name.to_string(),
            completed_at: Utc::now(),
            stage_results: payload,
        };
        let mut jobs = self.jobs.write().await;
        let steps = jobs
            .entry((identifier.to_string(), id_value.to_string()))
            .or_default();
        match steps.iter_mut().find(|s| s.step_name == stage_name) {
            Some(existing) => *existing = record,
            None => steps.push(record),
        }
        trace!(identifier, id_value, stage = stage_name, "Marked stage completed");
        Ok(())
    }

    async fn get_progress(&self, identifier: &str, id_value: &str) -> Result<Option<JobProgress>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(&(identifier.to_string(), id_value.to_string()))
            .map(|steps| JobProgress {
                identifier: identifier.to_string(),
                id_value: id_value.to_string(),
                steps: steps.clone(),
            }))
    }
}

/// Ledger backed by the `progress_ledger` table.
pub struct PgProgressLedger {
    pool: PgPool,
}

impl PgProgressLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressLedger for PgProgressLedger {
    async fn mark_stage_completed(
        &self,
        identifier: &str,
        id_value: &str,
        stage_name: &str,
        payload: JsonValue,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO progress_ledger (identifier, id_value, step_name, stage_results, completed_at)
            VALUES ($1, $2, $3, $4, clock_timestamp())
            ON CONFLICT (identifier, id_value, step_name)
            DO UPDATE SET stage_results = EXCLUDED.stage_results,
                          completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(identifier)
        .bind(id_value)
        .bind(stage_name)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        trace!(identifier, id_value, stage = stage_name, "Marked stage completed");
        Ok(())
    }

    async fn get_progress(&self, identifier: &str, id_value: &str) -> Result<Option<JobProgress>> {
        let rows = sqlx::query(
            r#"
            SELECT step_name, stage_results, completed_at
            FROM progress_ledger
            WHERE identifier = $1 AND id_value = $2
            ORDER BY completed_at
            "#,
        )
        .bind(identifier)
        .bind(id_value)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let steps = rows
            .into_iter()
            .map(|row| {
                Ok(StageRecord {
                    step_name: row.try_get("step_name")?,
                    stage_results: row.try_get("stage_results")?,
                    completed_at: row.try_get::<DateTime<Utc>, _>("completed_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(JobProgress {
            identifier: identifier.to_string(),
            id_value: id_value.to_string(),
            steps,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_remark_replaces_stage() {
        let ledger = InMemoryProgressLedger::new();
        ledger
            .mark_stage_completed("#vertex#Patient#", "1001", "leech", json!({"n": 1}))
            .await
            .unwrap();
        let first = ledger.get_progress("#vertex#Patient#", "1001").await.unwrap().unwrap();
        let first_at = first.step("leech").unwrap().completed_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        ledger
            .mark_stage_completed("#vertex#Patient#", "1001", "leech", json!({"n": 2}))
            .await
            .unwrap();
        let progress = ledger.get_progress("#vertex#Patient#", "1001").await.unwrap().unwrap();

        assert_eq!(progress.steps.len(), 1);
        let step = progress.step("leech").unwrap();
        assert_eq!(step.stage_results, json!({"n": 2}));
        assert!(step.completed_at > first_at);
    }

    #[tokio::test]
    async fn test_jobs_are_isolated() {
        let ledger = InMemoryProgressLedger::new();
        ledger
            .mark_stage_completed("#vertex#Patient#", "1", "generate_source_vertex", json!({}))
            .await
            .unwrap();
        assert!(ledger.get_progress("#vertex#Patient#", "2").await.unwrap().is_none());
        let progress = ledger.get_progress("#vertex#Patient#", "1").await.unwrap().unwrap();
        assert!(progress.has_completed_step("generate_source_vertex"));
        assert_eq!(
            progress.most_recent_step().unwrap().step_name,
            "generate_source_vertex"
        );
    }
}
