use async_graphql::SimpleObject;

#[derive(Debug, SimpleObject)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, SimpleObject)]
pub struct StatusSummary {
    /// Number of batches per lifecycle status
    pub batches: Vec<StatusCount>,
    /// Number of chunks per lifecycle status
    pub chunks: Vec<StatusCount>,
    /// Assignments still waiting for a prover answer
    pub open_prover_tasks: i64,
}
