use async_graphql::{ComplexObject, SimpleObject};
use batch_pipeline_common::status::RollupStatus;

#[derive(Debug, sqlx::FromRow, SimpleObject)]
#[graphql(complex)]
pub struct Batch {
    pub hash: String,
    /// Position of the batch in the L2 chain
    pub batch_index: i64,
    /// Hash of the block preceding the batch
    pub parent_hash: String,
    #[sqlx(rename = "status")]
    #[graphql(skip)]
    pub rollup_status: RollupStatus,
    /// commitBatch transaction hash on L1
    pub commit_tx_hash: Option<String>,
    /// finalizeBatch transaction hash on L1
    pub finalize_tx_hash: Option<String>,
}

#[ComplexObject]
impl Batch {
    /// Lifecycle status, e.g. `proved` or `committing`
    async fn status(&self) -> String {
        self.rollup_status.to_string()
    }
}
