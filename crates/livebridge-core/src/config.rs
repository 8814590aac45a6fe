//! Session configuration and upstream endpoint settings.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_VOICE;

/// Response content type, fixed per session configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    /// Streamed text responses.
    #[default]
    #[serde(rename = "TEXT")]
    Text,
    /// Streamed PCM audio responses.
    #[serde(rename = "AUDIO")]
    Audio,
}

impl Modality {
    /// Wire name as used in setup messages (`"TEXT"` / `"AUDIO"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Audio => "AUDIO",
        }
    }

    /// Parse a client-supplied modality string. Anything other than
    /// `"AUDIO"` falls back to text, matching the upstream default.
    pub fn from_client(value: Option<&str>) -> Self {
        match value {
            Some("AUDIO") => Self::Audio,
            _ => Self::Text,
        }
    }
}

/// Immutable-per-session configuration bound to an upstream connection at
/// connect time. Changing it invalidates the existing connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Full publisher model path (`projects/.../models/...`).
    pub model: String,
    /// System instruction text sent in the setup frame.
    pub system_instruction: String,
    /// Response modality for this session.
    pub modality: Modality,
    /// Prebuilt voice name, used only for [`Modality::Audio`].
    pub voice: String,
}

impl SessionConfig {
    /// Build a session configuration with the default voice.
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>, modality: Modality) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            modality,
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// Where and what to connect to upstream.
#[derive(Clone, Debug)]
pub struct UpstreamSettings {
    /// Google Cloud project id.
    pub project_id: String,
    /// Vertex AI region, e.g. `us-central1`.
    pub location: String,
    /// Bare model id, e.g. `gemini-2.0-flash-live-preview`.
    pub model_id: String,
    /// Full replacement for the service URL. Used by tests and local
    /// emulators; the production URL is derived from `location`.
    pub endpoint_override: Option<String>,
}

impl UpstreamSettings {
    /// Full publisher model path for setup frames.
    pub fn model_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.project_id, self.location, self.model_id
        )
    }

    /// The `BidiGenerateContent` WebSocket URL.
    pub fn endpoint(&self) -> String {
        self.endpoint_override.clone().unwrap_or_else(|| {
            format!(
                "wss://{}-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent",
                self.location
            )
        })
    }

    /// Session configuration for a given instruction and modality.
    pub fn session_config(&self, system_instruction: impl Into<String>, modality: Modality) -> SessionConfig {
        SessionConfig::new(self.model_path(), system_instruction, modality)
    }
}
