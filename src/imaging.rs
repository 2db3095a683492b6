//! Encoded image payloads and the photo preprocessor.
//!
//! Photos are shrunk and re-encoded as JPEG before they are fanned out to the
//! image backend, so that five concurrent requests stay small.

use std::fmt;
use std::io::Cursor;

use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::DecodeError;

pub const MAX_WIDTH: u32 = 1280;
pub const MAX_HEIGHT: u32 = 720;
pub const JPEG_QUALITY: u8 = 80;

/// An encoded image (PNG, JPEG, ...) plus its MIME type.
///
/// Serialized as a `data:` URI, which is what browsers can render directly.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    data: Bytes,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }

    pub fn from_base64(mime_type: impl Into<String>, payload: &str) -> Result<Self, DecodeError> {
        let data = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime_type, data))
    }

    /// Accepts either `data:<mime>;base64,<payload>` or bare base64. For bare
    /// base64 the MIME type is sniffed from the decoded bytes.
    pub fn parse(input: &str) -> Result<Self, DecodeError> {
        let input = input.trim();
        let declared = input
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .map(|(meta, _)| meta.split(';').next().unwrap_or_default().to_string())
            .filter(|mime| !mime.is_empty());
        let data = base64::engine::general_purpose::STANDARD.decode(strip_data_uri_prefix(input).trim())?;
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mime_type = declared.unwrap_or_else(|| sniff_mime_type(&data).to_string());
        Ok(Self::new(mime_type, data))
    }

    pub fn mime_type(&self) -> &str { &self.mime_type }

    pub fn bytes(&self) -> &Bytes { &self.data }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// File extension matching the MIME type, for downloads.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedImage({}, {} bytes)", self.mime_type, self.data.len())
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EncodedImage::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Drops a `data:...,` prefix if there is one.
pub fn strip_data_uri_prefix(value: &str) -> &str {
    value.split_once(',').map(|(_, payload)| payload).unwrap_or(value)
}

fn sniff_mime_type(data: &[u8]) -> &'static str {
    image::guess_format(data).map(|f| f.to_mime_type()).unwrap_or("application/octet-stream")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self { max_width: MAX_WIDTH, max_height: MAX_HEIGHT, quality: JPEG_QUALITY }
    }
}

/// Target size for a `width` x `height` image. Landscape images are capped on
/// width, everything else on height.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = |value: u32, num: u32, den: u32| -> u32 {
        ((value as f64 * num as f64 / den as f64).round() as u32).max(1)
    };
    if width > height {
        if width > max_width {
            return (max_width, scale(height, max_width, width));
        }
    } else if height > max_height {
        return (scale(width, max_height, height), max_height);
    }
    (width, height)
}

/// Decode, shrink to fit and re-encode as JPEG.
pub fn preprocess(input: &EncodedImage, options: PreprocessOptions) -> Result<EncodedImage, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }
    let decoded = image::load_from_memory(input.bytes())?;
    let (width, height) = (decoded.width(), decoded.height());
    let (target_w, target_h) = fit_within(width, height, options.max_width, options.max_height);

    let resized = if (target_w, target_h) != (width, height) {
        debug!("Resizing photo {}x{} -> {}x{}", width, height, target_w, target_h);
        decoded.resize_exact(target_w, target_h, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = flatten_onto_white(&resized);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, options.quality).encode_image(&rgb)?;
    info!("📐 Preprocessed photo {}x{} ({} bytes) -> {}x{} ({} bytes)", width, height, input.len(), target_w, target_h, out.len());
    Ok(EncodedImage::new("image/jpeg", out))
}

/// Runs [`preprocess`] on the blocking pool.
pub async fn preprocess_async(input: EncodedImage, options: PreprocessOptions) -> Result<EncodedImage, DecodeError> {
    tokio::task::spawn_blocking(move || preprocess(&input, options))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

const PLACEHOLDER_COLORS: [[u8; 3]; 5] = [
    [0x3B, 0x82, 0xF6], // blue
    [0xEF, 0x44, 0x44], // red
    [0x10, 0xB9, 0x81], // green
    [0xF5, 0x9E, 0x0B], // amber
    [0x8B, 0x5C, 0xF6], // purple
];

/// Gradient PNG standing in for a generated design when no API key is set.
pub fn placeholder_image(label: &str) -> Result<EncodedImage, image::ImageError> {
    let [r, g, b] = PLACEHOLDER_COLORS[label.len() % PLACEHOLDER_COLORS.len()];
    let (width, height) = (640u32, 360u32);
    let img = RgbImage::from_fn(width, height, |x, y| {
        // 100% colour at the top-left fading towards 60% at the bottom-right
        let t = (x + y) as f32 / (width + height) as f32;
        let shade = |c: u8| (c as f32 * (1.0 - 0.4 * t)) as u8;
        Rgb([shade(r), shade(g), shade(b)])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png)?;
    Ok(EncodedImage::new("image/png", buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_photo;
    use pretty_assertions::assert_eq;

    fn dimensions(img: &EncodedImage) -> (u32, u32) {
        let decoded = image::load_from_memory(img.bytes()).unwrap();
        (decoded.width(), decoded.height())
    }

    #[test]
    fn fit_within_caps_the_dominant_axis() {
        assert_eq!(fit_within(2560, 1440, 1280, 720), (1280, 720));
        assert_eq!(fit_within(4000, 1000, 1280, 720), (1280, 320));
        assert_eq!(fit_within(1000, 2000, 1280, 720), (360, 720));
        assert_eq!(fit_within(1000, 1000, 1280, 720), (720, 720));
        assert_eq!(fit_within(800, 600, 1280, 720), (800, 600));
        assert_eq!(fit_within(5000, 1, 1280, 720), (1280, 1));
    }

    #[test]
    fn large_landscape_photo_is_shrunk_to_jpeg() {
        let photo = sample_photo(2000, 1000);
        let out = preprocess(&photo, PreprocessOptions::default()).unwrap();
        assert_eq!(out.mime_type(), "image/jpeg");
        assert_eq!(dimensions(&out), (1280, 640));
    }

    #[test]
    fn small_photo_keeps_dimensions_but_is_reencoded() {
        let photo = sample_photo(320, 200);
        let out = preprocess(&photo, PreprocessOptions::default()).unwrap();
        assert_eq!(photo.mime_type(), "image/png");
        assert_eq!(out.mime_type(), "image/jpeg");
        assert_eq!(dimensions(&out), (320, 200));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let junk = EncodedImage::new("image/png", b"definitely not a png".to_vec());
        assert!(matches!(preprocess(&junk, PreprocessOptions::default()), Err(DecodeError::Image(_))));
        assert!(matches!(EncodedImage::parse("data:image/png;base64,@@@"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn parse_accepts_data_uris_and_bare_base64() {
        let photo = sample_photo(8, 8);
        let from_uri = EncodedImage::parse(&photo.to_data_uri()).unwrap();
        assert_eq!(from_uri, photo);

        let bare = EncodedImage::parse(&photo.to_base64()).unwrap();
        assert_eq!(bare.mime_type(), "image/png");

        assert_eq!(strip_data_uri_prefix("data:image/png;base64,abc123"), "abc123");
        assert_eq!(strip_data_uri_prefix("abc123"), "abc123");
    }

    #[test]
    fn placeholder_is_a_decodable_png() {
        let img = placeholder_image("Modern Farmhouse").unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(dimensions(&img), (640, 360));
    }
}
