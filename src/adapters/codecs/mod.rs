//! Vendor codecs - one per wire format.
//!
//! - `openai` - OpenAI chat completions, also spoken by Azure, DeepSeek and Moonshot
//! - `anthropic` - Claude messages API
//! - `gemini` - Gemini generateContent API
//!
//! Also home to the status mapping shared by every vendor.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicCodec;
pub use gemini::GeminiCodec;
pub use openai::OpenAiCodec;

use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::domain::provider::{ConfigError, ProviderError};
use crate::ports::ProviderCodec;

const REDACTED: &str = "[REDACTED]";
const MAX_ERROR_BODY: usize = 500;

/// Builds the codec for a provider configuration.
pub fn codec_for(
    config: &ProviderConfig,
    api_key: Secret<String>,
) -> Result<Box<dyn ProviderCodec>, ConfigError> {
    let kind = config.kind();
    let endpoint = match config.http_endpoint() {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => {
            return Err(ConfigError::InvalidEndpoint {
                provider: kind,
                endpoint: config.endpoint().unwrap_or_default().to_string(),
            })
        }
    };
    let model = config.model().to_string();

    let codec: Box<dyn ProviderCodec> = match config {
        ProviderConfig::OpenAi(_) => Box::new(OpenAiCodec::openai(&endpoint, api_key, model)),
        ProviderConfig::DeepSeek(_) => Box::new(OpenAiCodec::deepseek(&endpoint, api_key, model)),
        ProviderConfig::Moonshot(_) => Box::new(OpenAiCodec::moonshot(&endpoint, api_key, model)),
        ProviderConfig::Azure(azure) => Box::new(OpenAiCodec::azure(
            &endpoint,
            &azure.deployment,
            &azure.api_version,
            api_key,
            model,
        )),
        ProviderConfig::Claude(_) => Box::new(AnthropicCodec::new(&endpoint, api_key, model)),
        ProviderConfig::Gemini(_) => Box::new(GeminiCodec::new(&endpoint, api_key, model)),
    };

    debug_assert_eq!(kind.wire_format(), codec.wire_format());
    Ok(codec)
}

/// Maps a non-2xx vendor reply onto the error taxonomy.
///
/// The API key is scrubbed from the message before it is stored.
pub fn error_for_status(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
    api_key: &Secret<String>,
) -> ProviderError {
    let message = redact(&extract_message(body), api_key);

    match status {
        401 | 403 => ProviderError::auth(message),
        404 => ProviderError::NotFound(message),
        429 => ProviderError::rate_limited(retry_after.or_else(|| parse_retry_after(&message))),
        500..=599 => ProviderError::server(status, message),
        400..=499 => ProviderError::InvalidRequest(message),
        _ => ProviderError::invalid_response(format!("unexpected status {status}: {message}")),
    }
}

/// Replaces every occurrence of the key in `text`.
pub fn redact(text: &str, api_key: &Secret<String>) -> String {
    let key = api_key.expose_secret();
    if key.is_empty() {
        text.to_string()
    } else {
        text.replace(key.as_str(), REDACTED)
    }
}

/// Pulls `error.message` out of a vendor error body, else the raw body.
fn extract_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .and_then(|message| message.as_str())
            .map(str::to_string)
    });

    let message = message.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_BODY {
        message.chars().take(MAX_ERROR_BODY).collect()
    } else {
        message
    }
}

/// Parses hints like "Please try again in 20s" or "try again in 450ms".
pub(crate) fn parse_retry_after(message: &str) -> Option<Duration> {
    let idx = message.find("try again in ")?;
    let rest = &message[idx + "try again in ".len()..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..end].parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let secs = if rest[end..].starts_with("ms") {
        value / 1000.0
    } else {
        value
    };
    Duration::try_from_secs_f64(secs).ok()
}

/// Parses a `Retry-After` header value given in seconds.
pub(crate) fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
