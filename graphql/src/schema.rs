use crate::models::{Batch, Chunk, ProverTask, StatusCount, StatusSummary};
use async_graphql::{Context, Object, Schema};
use batch_pipeline_common::status::{ProofType, ProverTaskStatus, RollupStatus};
use sqlx::SqlitePool;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Returns the batch with the given hash\
    /// `hash`: Batch hash
    async fn batch_by_hash(
        &self,
        ctx: &Context<'_>,
        hash: String,
    ) -> async_graphql::Result<Option<Batch>> {
        let pool = ctx.data::<SqlitePool>()?;
        let batch = sqlx::query_as::<_, Batch>("SELECT * FROM batch WHERE hash = ?")
            .bind(hash)
            .fetch_optional(pool)
            .await?;
        Ok(batch)
    }

    /// Returns batches in the given status ordered by index\
    /// `status`: Lifecycle status name, e.g. `proved`\
    /// `limit`: Maximum number of batches, 100 by default\
    /// `offset`: Number of batches to skip
    async fn batches_by_status(
        &self,
        ctx: &Context<'_>,
        status: String,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> async_graphql::Result<Vec<Batch>> {
        let pool = ctx.data::<SqlitePool>()?;
        let status = parse_status(&status)?;
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(async_graphql::Error::new(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        let batches = sqlx::query_as::<_, Batch>(
            "SELECT * FROM batch WHERE status = ? ORDER BY batch_index ASC LIMIT ? OFFSET ?",
        )
        .bind(status)
        .bind(limit)
        .bind(offset.unwrap_or(0).max(0))
        .fetch_all(pool)
        .await?;
        Ok(batches)
    }

    /// Returns the chunks of a batch in order\
    /// `batch_hash`: Batch hash
    async fn chunks_by_batch(
        &self,
        ctx: &Context<'_>,
        batch_hash: String,
    ) -> async_graphql::Result<Vec<Chunk>> {
        let pool = ctx.data::<SqlitePool>()?;
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"
            SELECT hash, batch_hash, chunk_index, start_block_number, end_block_number,
                   state_root, withdraw_root, status, proof IS NOT NULL AS has_proof
            FROM chunk WHERE batch_hash = ? ORDER BY chunk_index ASC
            "#,
        )
        .bind(batch_hash)
        .fetch_all(pool)
        .await?;
        Ok(chunks)
    }

    /// Returns every assignment of a chunk or batch, oldest first\
    /// `task_id`: Chunk or batch hash\
    /// `task_type`: `chunk` or `batch`; both when omitted
    async fn prover_tasks(
        &self,
        ctx: &Context<'_>,
        task_id: String,
        task_type: Option<String>,
    ) -> async_graphql::Result<Vec<ProverTask>> {
        let pool = ctx.data::<SqlitePool>()?;

        let tasks = match task_type {
            Some(task_type) => {
                let proof_type = match task_type.as_str() {
                    "chunk" => ProofType::Chunk,
                    "batch" => ProofType::Batch,
                    other => {
                        return Err(async_graphql::Error::new(format!(
                            "unknown task type {other}"
                        )));
                    }
                };
                sqlx::query_as::<_, ProverTask>(
                    "SELECT * FROM prover_task WHERE task_id = ? AND task_type = ? ORDER BY id ASC",
                )
                .bind(task_id)
                .bind(proof_type)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ProverTask>(
                    "SELECT * FROM prover_task WHERE task_id = ? ORDER BY id ASC",
                )
                .bind(task_id)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(tasks)
    }

    /// Returns the number of batches and chunks in each lifecycle status
    async fn status_summary(&self, ctx: &Context<'_>) -> async_graphql::Result<StatusSummary> {
        let pool = ctx.data::<SqlitePool>()?;

        let open_prover_tasks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM prover_task WHERE proving_status = ?")
                .bind(ProverTaskStatus::Assigned)
                .fetch_one(pool)
                .await?;

        Ok(StatusSummary {
            batches: count_by_status(pool, "batch").await?,
            chunks: count_by_status(pool, "chunk").await?,
            open_prover_tasks,
        })
    }
}

fn parse_status(name: &str) -> async_graphql::Result<RollupStatus> {
    RollupStatus::ALL
        .into_iter()
        .find(|status| status.to_string() == name)
        .ok_or_else(|| async_graphql::Error::new(format!("unknown status {name}")))
}

async fn count_by_status(
    pool: &SqlitePool,
    table: &str,
) -> async_graphql::Result<Vec<StatusCount>> {
    let rows: Vec<(RollupStatus, i64)> = sqlx::query_as(&format!(
        "SELECT status, COUNT(*) FROM {table} GROUP BY status ORDER BY status ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect())
}

pub type AppSchema =
    Schema<QueryRoot, async_graphql::EmptyMutation, async_graphql::EmptySubscription>;

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;
    use async_graphql::{EmptyMutation, EmptySubscription};
    use batch_pipeline_common::{
        DataBase,
        test_utils::{batch_hash, chunk_hash, force_proved, force_status, seed_batch},
    };
    use serde_json::{Value, json};

    use super::*;

    async fn schema() -> (DataBase, AppSchema) {
        let db = DataBase::new_in_memory().await.unwrap();
        let parent = seed_batch(&db, 1, B256::ZERO, 1..=2).await;
        seed_batch(&db, 2, parent, 3..=4).await;
        force_proved(&db, ProofType::Chunk, &chunk_hash(1, 0), b"{}").await;
        force_status(&db, ProofType::Batch, &batch_hash(1), RollupStatus::Proved).await;

        let schema = AppSchema::build(QueryRoot, EmptyMutation, EmptySubscription)
            .data(db.pool().clone())
            .finish();
        (db, schema)
    }

    async fn query(schema: &AppSchema, query: &str) -> Value {
        let response = schema.execute(query).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data.into_json().unwrap()
    }

    #[tokio::test]
    async fn batch_by_hash_reports_status_name() {
        let (_db, schema) = schema().await;
        let data = query(
            &schema,
            &format!(r#"{{ batchByHash(hash: "{}") {{ batchIndex status }} }}"#, batch_hash(1)),
        )
        .await;
        assert_eq!(data, json!({ "batchByHash": { "batchIndex": 1, "status": "proved" } }));
    }

    #[tokio::test]
    async fn batches_are_filtered_by_status() {
        let (_db, schema) = schema().await;
        let data = query(&schema, r#"{ batchesByStatus(status: "unassigned") { hash } }"#).await;
        assert_eq!(data, json!({ "batchesByStatus": [{ "hash": batch_hash(2) }] }));

        let response = schema
            .execute(r#"{ batchesByStatus(status: "lost") { hash } }"#)
            .await;
        assert_eq!(response.errors.len(), 1);
    }

    #[tokio::test]
    async fn chunks_show_whether_they_are_proved() {
        let (_db, schema) = schema().await;
        let request = format!(
            r#"{{ chunksByBatch(batchHash: "{}") {{ chunkIndex status hasProof }} }}"#,
            batch_hash(1)
        );
        let data = query(&schema, &request).await;
        assert_eq!(
            data,
            json!({ "chunksByBatch": [{ "chunkIndex": 0, "status": "proved", "hasProof": true }] })
        );
    }

    #[tokio::test]
    async fn summary_counts_units_per_status() {
        let (_db, schema) = schema().await;
        let data = query(
            &schema,
            "{ statusSummary { batches { status count } chunks { status count } \
             openProverTasks } }",
        )
        .await;
        assert_eq!(
            data,
            json!({ "statusSummary": {
                "batches": [
                    { "status": "unassigned", "count": 1 },
                    { "status": "proved", "count": 1 }
                ],
                "chunks": [
                    { "status": "unassigned", "count": 1 },
                    { "status": "proved", "count": 1 }
                ],
                "openProverTasks": 0
            } })
        );
    }

    #[tokio::test]
    async fn unknown_task_type_is_rejected() {
        let (_db, schema) = schema().await;
        let response = schema
            .execute(r#"{ proverTasks(taskId: "0x01", taskType: "block") { id } }"#)
            .await;
        assert_eq!(response.errors.len(), 1);

        let data = query(&schema, r#"{ proverTasks(taskId: "0x01") { id } }"#).await;
        assert_eq!(data, json!({ "proverTasks": [] }));
    }
}
