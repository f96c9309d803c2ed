pub mod chat;
pub mod get;
pub mod init;
pub mod listen;
pub mod send;
pub mod version;

pub use chat::Chat;
pub use get::Get;
pub use init::Init;
pub use listen::Listen;
pub use send::SendMessage;
pub use version::Version;
