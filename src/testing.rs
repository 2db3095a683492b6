//! Fakes shared by the unit tests.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{TransformError, UploadError};
use crate::github::{RepositoryUploader, UploadReceipt, UploadRequest};
use crate::imaging::EncodedImage;
use crate::models::{DesignIntensity, StyleOption};
use crate::transform::ImageTransformer;

/// A real PNG of the given size.
pub fn sample_photo(width: u32, height: u32) -> EncodedImage {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
    EncodedImage::new("image/png", buf.into_inner())
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_fake_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Image backend with scripted per-style failures. Styles listed in `holding`
/// (and every edit, when `hold_edits` is set) wait for [`ScriptedTransformer::release`].
pub struct ScriptedTransformer {
    failing: HashSet<String>,
    holding: HashSet<String>,
    hold_edits: bool,
    fail_edits: bool,
    gate: Arc<Semaphore>,
    pub generate_calls: AtomicUsize,
    pub edit_calls: AtomicUsize,
    pub last_edit: Mutex<Option<(EncodedImage, String)>>,
}

impl ScriptedTransformer {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            holding: HashSet::new(),
            hold_edits: false,
            fail_edits: false,
            gate: Arc::new(Semaphore::new(0)),
            generate_calls: AtomicUsize::new(0),
            edit_calls: AtomicUsize::new(0),
            last_edit: Mutex::new(None),
        }
    }

    pub fn failing(mut self, styles: &[&str]) -> Self {
        self.failing.extend(styles.iter().map(|s| s.to_string()));
        self
    }

    pub fn holding(mut self, styles: &[&str]) -> Self {
        self.holding.extend(styles.iter().map(|s| s.to_string()));
        self
    }

    pub fn holding_edits(mut self) -> Self {
        self.hold_edits = true;
        self
    }

    pub fn failing_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    async fn wait_for_release(&self) {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }

    pub fn generated_image(style: &str, intensity: DesignIntensity) -> EncodedImage {
        EncodedImage::new("image/png", format!("{style}|{intensity}").into_bytes())
    }
}

#[async_trait]
impl ImageTransformer for ScriptedTransformer {
    async fn generate(&self, _image: &EncodedImage, style: &StyleOption, intensity: DesignIntensity) -> Result<EncodedImage, TransformError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.holding.contains(style.name()) {
            self.wait_for_release().await;
        }
        if self.failing.contains(style.name()) {
            return Err(TransformError::Status { status: 500, body: format!("{style} unavailable") });
        }
        Ok(Self::generated_image(style.name(), intensity))
    }

    async fn edit(&self, image: &EncodedImage, instruction: &str) -> Result<EncodedImage, TransformError> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_edit.lock() = Some((image.clone(), instruction.to_string()));
        if self.hold_edits {
            self.wait_for_release().await;
        }
        if self.fail_edits {
            return Err(TransformError::EmptyResponse);
        }
        let mut bytes = image.bytes().to_vec();
        bytes.extend_from_slice(format!("+{instruction}").as_bytes());
        Ok(EncodedImage::new(image.mime_type().to_string(), bytes))
    }
}

/// Uploader that records requests and optionally rejects them.
#[derive(Default)]
pub struct RecordingUploader {
    pub rejection: Option<String>,
    pub requests: Mutex<Vec<UploadRequest>>,
}

impl RecordingUploader {
    pub fn rejecting(message: &str) -> Self {
        Self { rejection: Some(message.to_string()), ..Default::default() }
    }
}

#[async_trait]
impl RepositoryUploader for RecordingUploader {
    async fn put_file(&self, request: &UploadRequest) -> Result<UploadReceipt, UploadError> {
        self.requests.lock().push(request.clone());
        if let Some(message) = &self.rejection {
            return Err(UploadError::Rejected { status: 422, message: message.clone() });
        }
        Ok(UploadReceipt {
            repository: request.credentials.repository.clone(),
            path: request.path.clone(),
            message: request.message.clone(),
            html_url: None,
        })
    }
}
