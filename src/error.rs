use serde::Serialize;
use serde_json::Value;

/// Result type used by the rasterization core.
pub type GlyphResult<T> = Result<T, GlyphError>;

/// Failure kinds surfaced by geometry, sampling, rendering and text export.
///
/// The core never retries; every variant is handed back to the caller, which owns messaging.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GlyphError {
    /// Zero-dimension image or unusable options.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Pixel readback was refused by the image source.
    #[error("security error: {0}")]
    Security(String),

    /// Cancellation was observed. Not an algorithm failure.
    #[error("render aborted")]
    Aborted,

    /// Anything else that went wrong while painting.
    #[error("render error: {0}")]
    Render(String),
}

impl GlyphError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Security(_) => "SECURITY_ERROR",
            Self::Aborted => "ABORTED",
            Self::Render(_) => "RENDER_ERROR",
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Actionable follow-up for the user, when there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Security(_) => Some("the image pixels cannot be read; use a local image"),
            Self::Render(_) => Some("retry with a lower column count"),
            Self::InvalidInput(_) | Self::Aborted => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = self.hint().map(|hint| serde_json::json!({ "hint": hint }));
        ErrorEnvelope::new(self.code(), self.to_string(), details)
    }
}

/// JSON shape printed by the CLI on failure when `--json` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            ok: false,
            error: ErrorEnvelopeBody {
                code: code.to_owned(),
                message: message.into(),
                details,
            },
        }
    }

    /// Build an envelope for any application error, preferring a core error found in the chain.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        match find_glyph_error(error) {
            Some(glyph) => {
                let mut envelope = glyph.envelope();
                envelope.error.message = format!("{error:#}");
                envelope
            }
            None => Self::new("INTERNAL", format!("{error:#}"), None),
        }
    }
}

pub fn find_glyph_error(error: &anyhow::Error) -> Option<&GlyphError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<GlyphError>())
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GlyphError::invalid_input("x").code(), "INVALID_INPUT");
        assert_eq!(GlyphError::security("x").code(), "SECURITY_ERROR");
        assert_eq!(GlyphError::Aborted.code(), "ABORTED");
        assert_eq!(GlyphError::render("x").code(), "RENDER_ERROR");
    }

    #[test]
    fn only_aborted_reports_aborted() {
        assert!(GlyphError::Aborted.is_aborted());
        assert!(!GlyphError::render("boom").is_aborted());
    }

    #[test]
    fn security_envelope_carries_local_image_hint() {
        let envelope = GlyphError::security("readback denied").envelope();
        let value = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "SECURITY_ERROR");
        assert!(value["error"]["details"]["hint"]
            .as_str()
            .expect("hint should be a string")
            .contains("local image"));
    }

    #[test]
    fn anyhow_chain_finds_core_error() {
        let result: anyhow::Result<()> =
            Err(GlyphError::Aborted).context("while rendering photo.png");
        let error = result.expect_err("should fail");
        let envelope = ErrorEnvelope::from_anyhow(&error);
        assert_eq!(envelope.error.code, "ABORTED");
        assert!(envelope.error.message.contains("photo.png"));
        assert!(envelope.error.details.is_none());
    }
}
