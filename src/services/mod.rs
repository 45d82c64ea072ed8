//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, authorization decisions and the article generation flow.

pub mod api_key;
pub mod article;
pub mod generator;
pub mod password;
pub mod user;

pub use api_key::{ApiKeyService, ApiKeyServiceError};
pub use article::{parse_titles, ArticleService, ArticleServiceError, GeneratedArticle};
pub use generator::{ContentGenerator, FallbackGenerator, GenerationError};
pub use password::{hash_password, verify_password};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
