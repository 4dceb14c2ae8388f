pub mod init;
pub mod key;
pub mod ping;
pub mod serve;
pub mod version;

pub use init::Init;
pub use key::Key;
pub use ping::Ping;
pub use serve::Serve;
pub use version::Version;
