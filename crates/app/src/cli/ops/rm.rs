use clap::Args;

use object_store::{sanitize_filename, StorageError};

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Container (bin) the file is stored in
    pub container: String,

    /// Name the file was stored under
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rm {
    type Error = RmError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let name = sanitize_filename(&self.name)?;
        let adapter = ctx.adapter().await?;
        adapter.delete(&self.container, &name).await?;
        Ok(format!("Removed {}/{}", self.container, name))
    }
}
