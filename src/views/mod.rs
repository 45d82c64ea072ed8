//! Server-rendered pages
//!
//! Templates live in `templates/` and are compiled into the binary.
//! Every page receives `current_user` (when logged in) and `flash` (when a
//! message is pending) in addition to its own context.

use anyhow::Result;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::api::cookies::Flash;
use crate::models::User;

mod error;

pub use error::ViewError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

/// Identity exposed to templates
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// Template renderer
pub struct Views {
    tera: Tera,
}

impl Views {
    /// Load the embedded templates
    pub fn new() -> Result<Self> {
        let mut templates = Vec::new();
        for name in TemplateAssets::iter() {
            let file = TemplateAssets::get(&name)
                .ok_or_else(|| ViewError::TemplateError(format!("Missing template {}", name)))?;
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| ViewError::TemplateError(format!("Template {} is not UTF-8", name)))?;
            templates.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ViewError::TemplateError(describe(&e)))?;

        tracing::debug!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    /// Render `template` with the standard page variables added
    pub fn render(
        &self,
        template: &str,
        context: &TeraContext,
        current_user: Option<&User>,
        flash: Option<&Flash>,
    ) -> Result<String, ViewError> {
        let mut full_context = context.clone();
        if let Some(user) = current_user {
            full_context.insert("current_user", &CurrentUser::from(user));
        }
        if let Some(flash) = flash {
            full_context.insert("flash", flash);
        }

        self.tera
            .render(template, &full_context)
            .map_err(|e| ViewError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e))))
    }
}

/// Flatten a Tera error and its causes into one line
fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!(": {}", s));
        source = s.source();
    }
    message
}
