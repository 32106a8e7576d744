pub mod credentials;
pub mod project;

pub use credentials::CredentialStore;
pub use project::{sanitize_name, ProjectDirectory};
