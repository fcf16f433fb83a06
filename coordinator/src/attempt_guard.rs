use batch_pipeline_common::{
    DataBase, StoreError,
    status::{ProofType, StatusEvent},
};
use sqlx::SqliteConnection;

/// Bounded-retry policy shared by all collectors.
#[derive(Debug, Clone, Copy)]
pub struct AttemptGuard {
    max_attempts: u32,
}

impl AttemptGuard {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Returns `true` while the unit may still be assigned.
    ///
    /// Once the unit has used up its attempts it is moved to `Failed` on the
    /// same connection, so callers holding a transaction flip the status
    /// atomically with the check.
    pub async fn check_attempts_exceeded(
        &self,
        conn: &mut SqliteConnection,
        unit_id: &str,
        task_type: ProofType,
    ) -> Result<bool, StoreError> {
        let attempts = DataBase::count_attempts(conn, unit_id, task_type).await?;
        if attempts < i64::from(self.max_attempts) {
            return Ok(true);
        }

        if DataBase::transition_status(conn, task_type, unit_id, StatusEvent::AttemptsExhausted)
            .await?
        {
            tracing::warn!(
                "{} {} marked failed after {} attempts",
                task_type,
                unit_id,
                attempts
            );
        }
        Ok(false)
    }
}
