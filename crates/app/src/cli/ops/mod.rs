pub mod get;
pub mod init;
pub mod ls;
pub mod put;
pub mod rm;
pub mod teardown;
pub mod version;

pub use get::Get;
pub use init::Init;
pub use ls::Ls;
pub use put::Put;
pub use rm::Rm;
pub use teardown::Teardown;
pub use version::Version;
