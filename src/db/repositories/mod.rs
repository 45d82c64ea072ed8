//! Database repositories
//!
//! One repository per entity, each a trait plus an SQLx implementation that
//! dispatches on the configured driver.

pub mod api_key;
pub mod article;
pub mod session;
pub mod user;

pub use api_key::{ApiKeyRepository, SqlxApiKeyRepository};
pub use article::{ArticleRepository, SqlxArticleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
