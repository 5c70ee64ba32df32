//! Still frames captured from the camera and their JPEG data URI form.

use base64::Engine;
use image::ImageEncoder;

use crate::error::CaptureError;

/// Prefix of every photo data URI this crate produces.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// An RGBA8 snapshot of one video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl FrameBuffer {
    /// Wrap raw RGBA pixels.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidFrameData`] if `rgba` is not exactly
    /// `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(CaptureError::InvalidFrameData {
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A uniformly filled frame. Handy for hosts without a real camera.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba: pixels,
        }
    }

    /// Frame width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    /// Whether the frame has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rgba.is_empty()
    }

    /// Encode as a `data:image/jpeg;base64,` URI.
    ///
    /// Alpha is dropped; camera frames are always opaque.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Encode`] if the frame is empty or the encoder fails.
    pub fn to_jpeg_data_uri(&self, quality: u8) -> Result<String, CaptureError> {
        if self.is_empty() {
            return Err(CaptureError::Encode("frame has no pixels".to_string()));
        }

        let rgb: Vec<u8> = self
            .rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut buf = std::io::Cursor::new(Vec::new());
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
            .write_image(&rgb, self.width, self.height, image::ColorType::Rgb8.into())
            .map_err(|e| CaptureError::Encode(e.to_string()))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
        Ok(format!("{JPEG_DATA_URI_PREFIX}{encoded}"))
    }
}

/// Decode a base64 data URI into its MIME type and bytes.
///
/// # Errors
///
/// Returns [`CaptureError::DataUri`] if the URI is not a base64 data URI.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), CaptureError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CaptureError::DataUri("not a data URI".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| CaptureError::DataUri("missing comma".to_string()))?;
    let mime = metadata
        .strip_suffix(";base64")
        .ok_or_else(|| CaptureError::DataUri("only base64 payloads are supported".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| CaptureError::DataUri(format!("bad base64: {e}")))?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = FrameBuffer::new(2, 2, vec![0; 15]).expect_err("short buffer");
        assert!(matches!(
            err,
            CaptureError::InvalidFrameData {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn jpeg_data_uri_decodes_back_to_jpeg() {
        let frame = FrameBuffer::solid(16, 8, [200, 40, 40, 255]);
        let uri = frame.to_jpeg_data_uri(90).expect("encode");
        assert!(uri.starts_with(JPEG_DATA_URI_PREFIX));

        let (mime, bytes) = decode_data_uri(&uri).expect("decode");
        assert_eq!(mime, "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn empty_frame_cannot_be_encoded() {
        let frame = FrameBuffer::new(0, 0, Vec::new()).expect("empty is valid");
        assert!(frame.is_empty());
        assert!(frame.to_jpeg_data_uri(90).is_err());
    }

    #[test]
    fn malformed_data_uris() {
        assert!(decode_data_uri("image/jpeg;base64,AAAA").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64").is_err());
        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64,@@@").is_err());
    }
}
