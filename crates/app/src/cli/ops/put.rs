use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use clap::Args;
use futures::Stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use object_store::{sanitize_filename, StorageError};

/// Read buffer for streaming a local file into an upload
const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Container (bin) to store the file in
    pub container: String,

    /// Local file to upload
    pub file: PathBuf,

    /// Name to store the file under (defaults to the file's own name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no name given and {0} has no file name")]
    NoName(PathBuf),
    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stream a local file in fixed-size reads without loading it into memory.
pub fn file_stream(file: File) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let n = file.read_buf(&mut buf).await?;
        let next = if n == 0 {
            None
        } else {
            Some((buf.freeze(), file))
        };
        Ok::<_, std::io::Error>(next)
    })
}

fn default_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => default_name(&self.file).ok_or_else(|| PutError::NoName(self.file.clone()))?,
        };
        let name = sanitize_filename(&name)?;

        let read_err = |source| PutError::Read {
            path: self.file.clone(),
            source,
        };
        let file = File::open(&self.file).await.map_err(read_err)?;
        let size = file.metadata().await.map_err(read_err)?.len();

        let adapter = ctx.adapter().await?;
        let record = adapter
            .put_record(&self.container, &name, file_stream(file), size)
            .await?;

        Ok(serde_json::to_string_pretty(&record)?)
    }
}
