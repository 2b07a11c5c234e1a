use std::path::PathBuf;

use clap::Args;
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use object_store::{sanitize_filename, ByteStream, Nonce, StorageError};

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Container (bin) the file is stored in
    pub container: String,

    /// Name the file was stored under
    pub name: String,

    /// Hex nonce returned when the file was stored
    #[arg(long)]
    pub nonce: String,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),
}

/// Copy a decrypted stream to `writer`, returning the number of bytes written.
pub async fn copy_stream<W>(mut stream: ByteStream, writer: &mut W) -> Result<u64, GetError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(frame) = stream.try_next().await? {
        writer.write_all(&frame).await?;
        written += frame.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let name = sanitize_filename(&self.name)?;
        let nonce = Nonce::from_hex(&self.nonce)?;
        let adapter = ctx.adapter().await?;
        let stream = adapter.get(&self.container, &name, &nonce).await?;

        match &self.output {
            Some(path) => {
                let mut file = tokio::fs::File::create(path).await?;
                match copy_stream(stream, &mut file).await {
                    Ok(written) => Ok(format!("Wrote {} bytes to {}", written, path.display())),
                    Err(e) => {
                        // Never leave partially verified plaintext behind
                        drop(file);
                        if let Err(remove) = tokio::fs::remove_file(path).await {
                            tracing::warn!(error = %remove, "failed to remove partial output");
                        }
                        Err(e)
                    }
                }
            }
            None => {
                copy_stream(stream, &mut tokio::io::stdout()).await?;
                Ok(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};
    use crate::cli::ops::{Init, Put, Rm};
    use bytes::Bytes;
    use futures::StreamExt;
    use object_store::{ObjectRecord, MIN_MASTER_SECRET_SIZE};

    fn local_context(dir: &std::path::Path) -> OpContext {
        let config_path = dir.join("sealbin.toml");
        let config = format!(
            "master_secret = '{}'\n\n[backend]\ntype = 'local'\npath = '{}'\n",
            "s".repeat(MIN_MASTER_SECRET_SIZE),
            dir.join("store").display()
        );
        std::fs::write(&config_path, config).unwrap();
        OpContext::new(config_path)
    }

    #[tokio::test]
    async fn test_get_and_rm_resolve_names_like_put() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = local_context(dir.path());
        Init.execute(&ctx).await.unwrap();

        let input = dir.path().join("input.txt");
        tokio::fs::write(&input, b"spaced out").await.unwrap();
        let put = Put {
            container: "bin".to_string(),
            file: input,
            name: Some("a b.txt".to_string()),
        };
        let record: ObjectRecord =
            serde_json::from_str(&put.execute(&ctx).await.unwrap()).unwrap();
        assert_eq!(record.filename, "a_b.txt");

        let output = dir.path().join("output.txt");
        let get = Get {
            container: "bin".to_string(),
            name: "a b.txt".to_string(),
            nonce: record.nonce.to_hex(),
            output: Some(output.clone()),
        };
        get.execute(&ctx).await.unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"spaced out");

        let rm = Rm {
            container: "bin".to_string(),
            name: "a b.txt".to_string(),
        };
        rm.execute(&ctx).await.unwrap();

        let err = get.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, GetError::Storage(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_get_rejects_malformed_nonce() {
        let get = Get {
            container: "bin".to_string(),
            name: "f".to_string(),
            nonce: "not hex".to_string(),
            output: None,
        };
        // Fails before the config file is ever read
        let ctx = OpContext::new("/nonexistent/sealbin.toml".into());
        let err = get.execute(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            GetError::Storage(StorageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_stream_stops_at_first_error() {
        let frames = vec![
            Ok(Bytes::from_static(b"good ")),
            Err(StorageError::Integrity("bad chunk".to_string())),
            Ok(Bytes::from_static(b"never")),
        ];
        let stream: ByteStream = futures::stream::iter(frames).boxed();

        let mut out = Vec::new();
        let err = copy_stream(stream, &mut out).await.unwrap_err();
        assert!(matches!(err, GetError::Storage(StorageError::Integrity(_))));
        assert_eq!(out, b"good ");
    }
}
