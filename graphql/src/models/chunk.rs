use async_graphql::{ComplexObject, SimpleObject};
use batch_pipeline_common::status::RollupStatus;

#[derive(Debug, sqlx::FromRow, SimpleObject)]
#[graphql(complex)]
pub struct Chunk {
    pub hash: String,
    pub batch_hash: String,
    /// Position of the chunk within its batch
    pub chunk_index: i64,
    pub start_block_number: i64,
    pub end_block_number: i64,
    pub state_root: String,
    pub withdraw_root: String,
    #[sqlx(rename = "status")]
    #[graphql(skip)]
    pub rollup_status: RollupStatus,
    /// Whether a proof has been stored for the chunk
    pub has_proof: bool,
}

#[ComplexObject]
impl Chunk {
    async fn status(&self) -> String {
        self.rollup_status.to_string()
    }
}
