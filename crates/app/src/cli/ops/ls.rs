use clap::Args;
use futures::TryStreamExt;

use object_store::StorageError;

#[derive(Args, Debug, Clone)]
pub struct Ls;

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let adapter = ctx.adapter().await?;
        let keys: Vec<String> = adapter
            .list_keys()
            .map_ok(|key| key.to_string())
            .try_collect()
            .await?;

        if keys.is_empty() {
            Ok("No objects found".to_string())
        } else {
            Ok(keys.join("\n"))
        }
    }
}
