//! Data models
//!
//! Database entities (User, Session, Article, ApiKey) and the small
//! value types that travel with them.

mod api_key;
mod article;
mod session;
mod user;

pub use api_key::{ApiKey, ApiKeySummary};
pub use article::{Article, ArticleStatus, StatusView, MAX_TITLE_LENGTH};
pub use session::Session;
pub use user::User;
