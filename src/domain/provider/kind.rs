//! Provider kinds, their known model sets, and per-model capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ProviderId;

/// The closed set of backends this layer can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions.
    OpenAi,
    /// Anthropic Claude messages API.
    Claude,
    /// Google Gemini generateContent API.
    Gemini,
    /// Azure-hosted OpenAI deployments.
    Azure,
    /// DeepSeek (OpenAI-compatible wire format).
    DeepSeek,
    /// Moonshot (OpenAI-compatible wire format).
    Moonshot,
}

/// How a provider's requests and responses look on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `choices[].message` / `choices[].delta` shaped payloads.
    OpenAiChat,
    /// Content blocks with typed SSE events.
    AnthropicMessages,
    /// `candidates[].content.parts` payloads.
    GeminiContent,
}

/// Optional features a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Function / tool calling.
    FunctionCalling,
    /// Image input alongside the prompt.
    Vision,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::FunctionCalling => write!(f, "function calling"),
            Capability::Vision => write!(f, "vision"),
        }
    }
}

/// Capabilities resolved for one configured model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether function calling is supported.
    pub function_calling: bool,
    /// Whether image input is supported.
    pub vision: bool,
}

impl Capabilities {
    /// Returns true if the capability is available.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::FunctionCalling => self.function_calling,
            Capability::Vision => self.vision,
        }
    }
}

// Entries ending in '*' match by prefix, others must match exactly.
const OPENAI_MODELS: &[&str] = &[
    "gpt-3.5-turbo*",
    "gpt-4",
    "gpt-4-0613",
    "gpt-4-turbo*",
    "gpt-4o*",
    "gpt-4.1*",
    "gpt-5*",
    "o1*",
    "o3*",
    "o4-mini*",
];

const CLAUDE_MODELS: &[&str] = &[
    "claude-3-opus*",
    "claude-3-sonnet*",
    "claude-3-haiku*",
    "claude-3-5-*",
    "claude-3-7-*",
    "claude-sonnet-4*",
    "claude-opus-4*",
];

const GEMINI_MODELS: &[&str] = &[
    "gemini-pro",
    "gemini-pro-vision",
    "gemini-1.5-*",
    "gemini-2.0-*",
    "gemini-2.5-*",
];

const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-reasoner"];

const MOONSHOT_MODELS: &[&str] = &["moonshot-v1-8k", "moonshot-v1-32k", "moonshot-v1-128k"];

fn matches_catalog(catalog: &[&str], model: &str) -> bool {
    catalog.iter().any(|entry| match entry.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => model == *entry,
    })
}

impl ProviderKind {
    /// Every supported kind, in declaration order.
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::Azure,
        ProviderKind::DeepSeek,
        ProviderKind::Moonshot,
    ];

    /// Returns the lowercase name used in configuration and as provider id.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Azure => "azure",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Moonshot => "moonshot",
        }
    }

    /// Returns the default provider id for this kind.
    pub fn provider_id(&self) -> ProviderId {
        ProviderId::new(self.as_str())
    }

    /// Returns the wire format spoken by this kind.
    pub fn wire_format(&self) -> WireFormat {
        match self {
            ProviderKind::OpenAi
            | ProviderKind::Azure
            | ProviderKind::DeepSeek
            | ProviderKind::Moonshot => WireFormat::OpenAiChat,
            ProviderKind::Claude => WireFormat::AnthropicMessages,
            ProviderKind::Gemini => WireFormat::GeminiContent,
        }
    }

    /// Returns the default API base URL, if the kind has one.
    ///
    /// Azure has no default: every resource has its own endpoint.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("https://api.openai.com"),
            ProviderKind::Claude => Some("https://api.anthropic.com"),
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com"),
            ProviderKind::Azure => None,
            ProviderKind::DeepSeek => Some("https://api.deepseek.com"),
            ProviderKind::Moonshot => Some("https://api.moonshot.cn"),
        }
    }

    fn catalog(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi | ProviderKind::Azure => OPENAI_MODELS,
            ProviderKind::Claude => CLAUDE_MODELS,
            ProviderKind::Gemini => GEMINI_MODELS,
            ProviderKind::DeepSeek => DEEPSEEK_MODELS,
            ProviderKind::Moonshot => MOONSHOT_MODELS,
        }
    }

    /// Returns true if the model belongs to this provider's known model set.
    pub fn supports_model(&self, model: &str) -> bool {
        !model.is_empty() && matches_catalog(self.catalog(), model)
    }

    /// Resolves the capabilities of a model served by this provider.
    pub fn capabilities(&self, model: &str) -> Capabilities {
        match self {
            ProviderKind::OpenAi | ProviderKind::Azure => Capabilities {
                function_calling: true,
                vision: ["gpt-4-turbo", "gpt-4o", "gpt-4.1", "gpt-5"]
                    .iter()
                    .any(|p| model.starts_with(p)),
            },
            ProviderKind::Claude => Capabilities {
                function_calling: true,
                vision: true,
            },
            ProviderKind::Gemini => Capabilities {
                function_calling: model != "gemini-pro-vision",
                vision: model != "gemini-pro",
            },
            ProviderKind::DeepSeek => Capabilities {
                function_calling: model == "deepseek-chat",
                vision: false,
            },
            ProviderKind::Moonshot => Capabilities::default(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
