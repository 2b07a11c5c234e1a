use clap::Args;

use object_store::{BucketStatus, StorageError};

#[derive(Args, Debug, Clone)]
pub struct Init;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut adapter = ctx.uninitialized_adapter().await?;
        let status = match adapter.init().await? {
            BucketStatus::Created => "created",
            BucketStatus::Existing => "found existing",
        };
        Ok(format!("Bucket '{}': {}", adapter.client().bucket(), status))
    }
}
