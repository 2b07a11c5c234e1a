use clap::Args;

use object_store::StorageError;

#[derive(Args, Debug, Clone)]
pub struct Teardown {
    /// Required; teardown deletes every object in the bucket
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("refusing to remove the bucket without --yes")]
    NotConfirmed,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Teardown {
    type Error = TeardownError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        if !self.yes {
            return Err(TeardownError::NotConfirmed);
        }

        let mut adapter = ctx.uninitialized_adapter().await?;
        let removed = adapter.teardown_bucket().await?;
        Ok(format!(
            "Removed {} objects and bucket '{}'",
            removed,
            adapter.client().bucket()
        ))
    }
}
