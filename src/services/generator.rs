//! Content generation providers
//!
//! A [`ContentGenerator`] turns an article title into article text. The
//! concrete providers call the OpenAI chat completions API and the Anthropic
//! messages API over `reqwest`; [`FallbackGenerator`] tries them in the
//! configured order and reports every failure if none succeeds.
//!
//! Provider API keys are read from the store on each call, so a key saved on
//! the settings page takes effect without a restart.

use crate::config::{GenerationConfig, ProviderKind};
use crate::db::repositories::ApiKeyRepository;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a professional article writer.";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Errors raised while generating article content
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// No key stored for the provider's service
    #[error("No API key configured for {0}")]
    MissingKey(String),

    /// Transport failure (connect, timeout, TLS)
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    /// Provider answered with a non-success status
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// Response parsed but carried no text
    #[error("{0} returned no content")]
    EmptyResponse(String),

    /// Every configured provider failed
    #[error("All providers failed. {0}")]
    AllFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Produces article text for a title
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Short provider name used in logs and error messages
    fn name(&self) -> &str;

    /// Generate the full article body for `title`
    async fn generate(&self, title: &str) -> Result<String, GenerationError>;
}

/// Prompt sent to every provider
pub fn build_prompt(title: &str) -> String {
    format!(
        "Write a comprehensive article about the following topic:\n{}\n\n\
         The article should be well-structured, informative, and engaging.\n\
         Include an introduction, main body with key points, and a conclusion.",
        title
    )
}

/// Settings shared by the HTTP providers
#[derive(Clone)]
struct ProviderSettings {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    keys: Arc<dyn ApiKeyRepository>,
}

impl ProviderSettings {
    async fn api_key(&self, service: &str) -> Result<String, GenerationError> {
        match self.keys.get_by_service(service).await? {
            Some(key) if !key.key.trim().is_empty() => Ok(key.key),
            _ => Err(GenerationError::MissingKey(service.to_string())),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Send a prepared request and return the JSON body of a 2xx answer
async fn send_json(provider: &str, request: reqwest::RequestBuilder) -> Result<Value, GenerationError> {
    let response = request.send().await.map_err(|e| GenerationError::Request {
        provider: provider.to_string(),
        message: describe_reqwest_error(&e),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 300),
        });
    }

    response.json::<Value>().await.map_err(|e| GenerationError::Request {
        provider: provider.to_string(),
        message: format!("invalid response body: {}", e),
    })
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("could not connect: {}", e)
    } else {
        e.to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// OpenAI chat completions provider
pub struct OpenAiGenerator {
    settings: ProviderSettings,
}

impl OpenAiGenerator {
    fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

/// Text of the first choice in a chat completions response
fn extract_openai_content(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, title: &str) -> Result<String, GenerationError> {
        let key = self.settings.api_key(self.name()).await?;
        let payload = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(title)},
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        let request = self
            .settings
            .client
            .post(self.settings.endpoint("/v1/chat/completions"))
            .bearer_auth(key)
            .json(&payload);

        let body = send_json(self.name(), request).await?;
        extract_openai_content(&body).ok_or_else(|| GenerationError::EmptyResponse(self.name().to_string()))
    }
}

/// Anthropic messages provider
pub struct AnthropicGenerator {
    settings: ProviderSettings,
}

impl AnthropicGenerator {
    fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

/// Concatenated text blocks of a messages response
fn extract_anthropic_content(body: &Value) -> Option<String> {
    let text: String = body
        .get("content")?
        .as_array()?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl ContentGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, title: &str) -> Result<String, GenerationError> {
        let key = self.settings.api_key(self.name()).await?;
        let payload = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": build_prompt(title)},
            ],
        });

        let request = self
            .settings
            .client
            .post(self.settings.endpoint("/v1/messages"))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);

        let body = send_json(self.name(), request).await?;
        extract_anthropic_content(&body)
            .ok_or_else(|| GenerationError::EmptyResponse(self.name().to_string()))
    }
}

/// Tries each provider in order and returns the first success
pub struct FallbackGenerator {
    providers: Vec<Arc<dyn ContentGenerator>>,
}

impl FallbackGenerator {
    pub fn new(providers: Vec<Arc<dyn ContentGenerator>>) -> Self {
        Self { providers }
    }

    /// Build the provider chain described by the `generation` config section
    pub fn from_config(
        config: &GenerationConfig,
        keys: Arc<dyn ApiKeyRepository>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let providers = config
            .providers
            .iter()
            .map(|kind| -> Arc<dyn ContentGenerator> {
                let (base_url, model) = match kind {
                    ProviderKind::Openai => (&config.openai_base_url, &config.openai_model),
                    ProviderKind::Anthropic => (&config.anthropic_base_url, &config.anthropic_model),
                };
                let settings = ProviderSettings {
                    client: client.clone(),
                    base_url: base_url.clone(),
                    model: model.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    keys: keys.clone(),
                };
                match kind {
                    ProviderKind::Openai => Arc::new(OpenAiGenerator::new(settings)),
                    ProviderKind::Anthropic => Arc::new(AnthropicGenerator::new(settings)),
                }
            })
            .collect();

        Ok(Self::new(providers))
    }
}

#[async_trait]
impl ContentGenerator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, title: &str) -> Result<String, GenerationError> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.generate(title).await {
                Ok(content) => {
                    tracing::info!(provider = provider.name(), "Generated article content");
                    return Ok(content);
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), "Provider failed: {}", e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        if failures.is_empty() {
            return Err(GenerationError::AllFailed("No providers configured".to_string()));
        }
        Err(GenerationError::AllFailed(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxApiKeyRepository;
    use crate::db::{create_test_pool, migrations};
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::sync::Mutex;

    struct Scripted {
        name: &'static str,
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl ContentGenerator for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _title: &str) -> Result<String, GenerationError> {
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(msg) => Err(GenerationError::EmptyResponse(msg.to_string())),
            }
        }
    }

    async fn key_repo() -> Arc<dyn ApiKeyRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxApiKeyRepository::boxed(pool)
    }

    fn config_for(base_url: &str, providers: Vec<ProviderKind>) -> GenerationConfig {
        GenerationConfig {
            providers,
            openai_base_url: base_url.to_string(),
            anthropic_base_url: base_url.to_string(),
            timeout_seconds: 5,
            ..GenerationConfig::default()
        }
    }

    /// Serve `app` on an ephemeral port and return its base URL
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_prompt_mentions_title_and_structure() {
        let prompt = build_prompt("Borrow checking");
        assert!(prompt.contains("Borrow checking"));
        assert!(prompt.contains("introduction"));
        assert!(prompt.contains("conclusion"));
    }

    #[test]
    fn test_extract_openai_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  Hello  "}}]});
        assert_eq!(extract_openai_content(&body).as_deref(), Some("Hello"));
        assert!(extract_openai_content(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_extract_anthropic_content() {
        let body = json!({"content": [
            {"type": "text", "text": "Part one. "},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "Part two."}
        ]});
        assert_eq!(
            extract_anthropic_content(&body).as_deref(),
            Some("Part one. Part two.")
        );
        assert!(extract_anthropic_content(&json!({"content": []})).is_none());
    }

    #[tokio::test]
    async fn test_fallback_uses_first_success() {
        let generator = FallbackGenerator::new(vec![
            Arc::new(Scripted { name: "a", reply: Err("down") }),
            Arc::new(Scripted { name: "b", reply: Ok("from b") }),
        ]);

        assert_eq!(generator.generate("t").await.unwrap(), "from b");
    }

    #[tokio::test]
    async fn test_fallback_reports_every_failure() {
        let generator = FallbackGenerator::new(vec![
            Arc::new(Scripted { name: "a", reply: Err("first") }),
            Arc::new(Scripted { name: "b", reply: Err("second") }),
        ]);

        let message = generator.generate("t").await.unwrap_err().to_string();
        assert!(message.contains("a: first returned no content"));
        assert!(message.contains("b: second returned no content"));
    }

    #[tokio::test]
    async fn test_missing_keys_fail_every_provider() {
        let config = config_for("http://127.0.0.1:9", GenerationConfig::default().providers);
        let generator = FallbackGenerator::from_config(&config, key_repo().await).unwrap();

        let message = generator.generate("t").await.unwrap_err().to_string();
        assert!(message.contains("No API key configured for openai"));
        assert!(message.contains("No API key configured for anthropic"));
    }

    #[tokio::test]
    async fn test_openai_request_shape_and_response() {
        let seen: Arc<Mutex<Option<(String, Value)>>> = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    |State(seen): State<Arc<Mutex<Option<(String, Value)>>>>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() = Some((auth, body));
                        Json(json!({"choices": [{"message": {"content": "Generated body"}}]}))
                    },
                ),
            )
            .with_state(seen.clone());
        let base = serve(app).await;

        let keys = key_repo().await;
        keys.upsert("openai", "sk-test").await.unwrap();
        let generator =
            FallbackGenerator::from_config(&config_for(&base, vec![ProviderKind::Openai]), keys)
                .unwrap();

        let content = generator.generate("Lifetimes").await.unwrap();
        assert_eq!(content, "Generated body");

        let (auth, body) = seen.lock().unwrap().clone().expect("request not received");
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("Lifetimes"));
    }

    #[tokio::test]
    async fn test_anthropic_fallback_after_openai_error_status() {
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
            )
            .route(
                "/v1/messages",
                post(|headers: HeaderMap| async move {
                    let versioned = headers.get("anthropic-version").is_some();
                    let keyed = headers.get("x-api-key").map(|v| v == "ak-test").unwrap_or(false);
                    if versioned && keyed {
                        Json(json!({"content": [{"type": "text", "text": "Claude body"}]}))
                    } else {
                        Json(json!({"content": []}))
                    }
                }),
            );
        let base = serve(app).await;

        let keys = key_repo().await;
        keys.upsert("openai", "sk-test").await.unwrap();
        keys.upsert("anthropic", "ak-test").await.unwrap();
        let generator = FallbackGenerator::from_config(
            &config_for(&base, vec![ProviderKind::Openai, ProviderKind::Anthropic]),
            keys,
        )
        .unwrap();

        assert_eq!(generator.generate("Traits").await.unwrap(), "Claude body");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;

        let keys = key_repo().await;
        keys.upsert("openai", "sk-test").await.unwrap();
        let generator =
            FallbackGenerator::from_config(&config_for(&base, vec![ProviderKind::Openai]), keys)
                .unwrap();

        let message = generator.generate("t").await.unwrap_err().to_string();
        assert!(message.contains("openai returned HTTP 500: boom"));
    }
}
