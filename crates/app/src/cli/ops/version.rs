use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Version;

/// Build metadata captured by build.rs
pub fn build_info() -> String {
    format!(
        "sealbin {}\n\
         - version:   {}\n\
         - profile:   {}\n\
         - target:    {}\n\
         - built:     {}\n\
         - rustc:     {}",
        env!("CARGO_PKG_VERSION"),
        env!("REPO_VERSION"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TARGET"),
        env!("BUILD_TIMESTAMP"),
        env!("RUST_VERSION"),
    )
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(build_info())
    }
}
