pub mod connection;
pub mod redact;
pub mod resolver;
pub mod secret;
pub mod sigv4;
pub mod ssm;
pub mod vault;

pub use connection::{assemble, AssembledConnection};
pub use redact::redact_uri;
pub use resolver::{CredentialResolver, Resolve, Scope};
