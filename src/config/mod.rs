pub mod types;
pub mod entities;
pub mod loader;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use entities::default_config;
pub use loader::*;
pub use validator::*;
pub use resolved::*;
