use async_graphql::{ComplexObject, SimpleObject};
use batch_pipeline_common::status::{FailureType, ProofType, ProverTaskStatus};

/// One assignment of a unit to a prover.
#[derive(Debug, sqlx::FromRow, SimpleObject)]
#[graphql(complex)]
pub struct ProverTask {
    pub id: i64,
    /// Hash of the chunk or batch
    pub task_id: String,
    #[sqlx(rename = "task_type")]
    #[graphql(skip)]
    pub proof_type: ProofType,
    pub prover_public_key: String,
    pub prover_name: String,
    #[sqlx(rename = "proving_status")]
    #[graphql(skip)]
    pub task_status: ProverTaskStatus,
    #[sqlx(rename = "failure_type")]
    #[graphql(skip)]
    pub failure: FailureType,
    /// Assignment time (UTC)
    pub assigned_at: String,
}

#[ComplexObject]
impl ProverTask {
    /// `chunk` or `batch`
    async fn task_type(&self) -> String {
        self.proof_type.to_string()
    }

    async fn proving_status(&self) -> &'static str {
        match self.task_status {
            ProverTaskStatus::Assigned => "assigned",
            ProverTaskStatus::Proved => "proved",
            ProverTaskStatus::Failed => "failed",
        }
    }

    async fn failure_type(&self) -> Option<&'static str> {
        match self.failure {
            FailureType::Undefined => None,
            FailureType::Timeout => Some("timeout"),
            FailureType::ProverReported => Some("prover_reported"),
        }
    }
}
