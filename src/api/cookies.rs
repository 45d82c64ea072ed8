//! Cookie helpers
//!
//! The session cookie carries `<token>.<hex hmac-sha256(token)>`, so a cookie
//! that was not issued by this server (or was issued under another secret)
//! is treated as absent. Flash messages ride in a short-lived `flash` cookie
//! that the next rendered page consumes.

use axum::http::{header, HeaderMap, HeaderValue};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";

/// Signs and verifies cookie values with the server's session secret
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;
        Ok(Self { mac })
    }

    /// `value.signature`
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        format!("{}.{}", value, HEXLOWER.encode(&mac.finalize().into_bytes()))
    }

    /// Original value when the signature checks out
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (value, signature) = signed.rsplit_once('.')?;
        let signature = HEXLOWER.decode(signature.as_bytes()).ok()?;

        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }
}

/// Value of cookie `name` across all `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Verified session token from the request cookies
pub fn session_token(headers: &HeaderMap, signer: &CookieSigner) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE).and_then(|raw| signer.verify(&raw))
}

/// `Set-Cookie` value establishing a session
pub fn session_cookie(signer: &CookieSigner, token: &str, max_age_days: i64) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        signer.sign(token),
        max_age_days * 24 * 60 * 60
    );
    // Signed tokens are ASCII (uuid + hex)
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| expired_cookie(SESSION_COOKIE))
}

/// `Set-Cookie` value that removes cookie `name`
pub fn expired_cookie(name: &'static str) -> HeaderValue {
    match name {
        FLASH_COOKIE => HeaderValue::from_static("flash=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
        _ => HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    }
}

/// Flash message category, used as the Bootstrap alert class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Error,
}

impl FlashLevel {
    fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashLevel::Success),
            "info" => Some(FlashLevel::Info),
            "error" => Some(FlashLevel::Error),
            _ => None,
        }
    }
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Error, message)
    }

    /// `Set-Cookie` value carrying this message
    pub fn to_cookie(&self) -> HeaderValue {
        let payload = format!("{}:{}", self.level.as_str(), self.message);
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=60",
            FLASH_COOKIE,
            urlencoding::encode(&payload)
        );
        // urlencoding output is always a valid header value
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| expired_cookie(FLASH_COOKIE))
    }

    /// Decode the flash cookie from a request, if any
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = read_cookie(headers, FLASH_COOKIE)?;
        let decoded = urlencoding::decode(&raw).ok()?;
        let (level, message) = decoded.split_once(':')?;
        Some(Self::new(FlashLevel::parse(level)?, message))
    }
}
