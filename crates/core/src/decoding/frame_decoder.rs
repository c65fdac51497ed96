//! Data-URI frame decoding.
//!
//! Turns `data:image/<subtype>;base64,<payload>` text into an RGB [`Frame`].
//! Every failure is returned as a [`DecodeError`]; nothing here panics on
//! client input.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::shared::constants::MAX_PAYLOAD_BYTES;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty frame payload")]
    Empty,
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("malformed data URI: {0}")]
    Envelope(&'static str),
    #[error("unsupported media type {0:?}")]
    MediaType(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("corrupt image bytes: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded image has zero size")]
    ZeroSized,
}

/// Decodes data-URI envelopes into RGB frames.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    max_payload_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Decodes a data-URI envelope into a frame.
    pub fn decode(&self, envelope: &str) -> Result<Frame, DecodeError> {
        let bytes = self.decode_payload(envelope)?;
        decode_image(&bytes)
    }

    /// Validates the envelope and returns the raw encoded image bytes.
    pub fn decode_payload(&self, envelope: &str) -> Result<Vec<u8>, DecodeError> {
        let envelope = envelope.trim();
        if envelope.is_empty() {
            return Err(DecodeError::Empty);
        }
        if envelope.len() > self.max_payload_bytes {
            return Err(DecodeError::TooLarge {
                len: envelope.len(),
                max: self.max_payload_bytes,
            });
        }

        let rest = envelope
            .strip_prefix("data:")
            .ok_or(DecodeError::Envelope("missing data: prefix"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(DecodeError::Envelope("missing ',' separator"))?;

        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default();
        if !media_type.to_ascii_lowercase().starts_with("image/") {
            return Err(DecodeError::MediaType(media_type.to_string()));
        }
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(DecodeError::Envelope("payload is not base64"));
        }
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(STANDARD.decode(payload)?)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_BYTES)
    }
}

/// Decodes encoded image bytes (JPEG, PNG, ...) into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSized);
    }
    Ok(Frame::new(rgb.into_raw(), width, height, 3))
}
