use std::error::Error;
use std::path::PathBuf;

use object_store::{storage, StorageAdapter, StorageConfig, StorageError};

#[derive(Clone)]
pub struct OpContext {
    /// Path to the storage config file, read on first use
    pub config_path: PathBuf,
}

impl OpContext {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config(&self) -> Result<StorageConfig, StorageError> {
        StorageConfig::load(&self.config_path)
    }

    /// Connect to the configured store and make sure the bucket exists.
    pub async fn adapter(&self) -> Result<StorageAdapter, StorageError> {
        StorageAdapter::connect(&self.config()?).await
    }

    /// Connect without touching the bucket.
    pub async fn uninitialized_adapter(&self) -> Result<StorageAdapter, StorageError> {
        let config = self.config()?;
        let secret = config.master_secret()?;
        let client = storage::connect(&config.backend).await?;
        Ok(StorageAdapter::new(client, secret))
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
