pub mod config;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod mask;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod resolver;
pub mod storage;
pub mod workbench;

pub use config::{ApiKeys, ModelSettings, Provider};
pub use dispatch::{PreparedDispatch, Router};
pub use error::{Result, WorkbenchError};
pub use models::*;
pub use providers::{
    GeminiProvider, ImageProvider, OpenAiProvider, ProviderCapabilities, ProviderRegistry,
    ReplicateProvider,
};
pub use resolver::resolve;
pub use storage::{CredentialStore, ProjectDirectory};
pub use workbench::{PaintSession, Workbench};
