//! `data:image/...;base64,` URLs

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::errors::{OptimizerError, OptimizerResult};

/// True for inline base64 images
pub fn is_base64_image(value: &str) -> bool {
    value.starts_with("data:image/") && value.contains("base64,")
}

/// Decoded data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl DataUrl {
    pub fn parse(value: &str) -> OptimizerResult<Self> {
        let rest = value
            .strip_prefix("data:")
            .ok_or_else(|| OptimizerError::invalid_data_url("missing 'data:' prefix"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| OptimizerError::invalid_data_url("missing ',' separator"))?;

        let mut parts = header.split(';');
        let mime_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(OptimizerError::invalid_data_url(format!(
                "unsupported media type '{mime_type}'"
            )));
        }
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(OptimizerError::invalid_data_url("payload is not base64"));
        }

        let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let data = STANDARD.decode(payload.as_bytes())?;
        Ok(Self { mime_type, data })
    }

    pub fn new<S: Into<String>>(mime_type: S, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decoded payload size, or 0 when the value does not parse
pub fn decoded_len(value: &str) -> usize {
    DataUrl::parse(value).map(|d| d.len()).unwrap_or(0)
}
