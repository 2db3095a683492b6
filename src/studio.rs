//! Session registry and the async flows around [`DesignSession`].
//!
//! The registry lock is only ever held for synchronous state-machine calls;
//! network and image work happens with it released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BatchFailure, DecodeError, SessionError, StudioError, UploadError};
use crate::github::{RepoCredentials, RepoIdentifier, RepositoryUploader, UploadReceipt, UploadRequest};
use crate::imaging::{preprocess_async, EncodedImage, PreprocessOptions};
use crate::models::{DesignId, DesignIntensity, DesignResult, SessionSnapshot, StyleOption, UploadDesignRequest};
use crate::orchestrator::{BatchSummary, BatchToken, GenerationOrchestrator};
use crate::session::{DesignSession, EditOutcome, PHOTO_PROCESSING_FAILED};
use crate::transform::ImageTransformer;

/// One user's state. Credentials live only as long as this entry, which is
/// dropped on `DELETE` or once it has been idle past the configured TTL.
#[derive(Debug)]
pub struct StudioSession {
    pub machine: DesignSession,
    pub credentials: Option<RepoCredentials>,
    last_seen: DateTime<Utc>,
}

impl StudioSession {
    fn new() -> Self {
        Self { machine: DesignSession::new(), credentials: None, last_seen: Utc::now() }
    }

    fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_seen).to_std().unwrap_or_default()
    }
}

/// A design's bytes plus the filename it should be saved under.
#[derive(Debug, Clone)]
pub struct DesignDownload {
    pub filename: String,
    pub image: EncodedImage,
}

/// Handle on a running generation batch.
pub struct BatchHandle {
    pub token: BatchToken,
    task: JoinHandle<Result<BatchSummary, BatchFailure>>,
}

impl BatchHandle {
    /// Wait until every style has settled and all results have been merged.
    pub async fn settled(self) -> Result<BatchSummary, BatchFailure> {
        let token = self.token;
        self.task.await.unwrap_or_else(|e| {
            error!("❌ Batch {} driver task failed: {}", token, e);
            Err(BatchFailure { token, attempted: 0 })
        })
    }
}

pub struct Studio {
    sessions: RwLock<HashMap<Uuid, StudioSession>>,
    orchestrator: GenerationOrchestrator,
    transformer: Arc<dyn ImageTransformer>,
    uploader: Arc<dyn RepositoryUploader>,
    preprocess: PreprocessOptions,
}

impl Studio {
    pub fn new(
        transformer: Arc<dyn ImageTransformer>,
        uploader: Arc<dyn RepositoryUploader>,
        styles: Vec<StyleOption>,
        preprocess: PreprocessOptions,
    ) -> Self {
        Self {
            sessions: RwLock::default(),
            orchestrator: GenerationOrchestrator::new(Arc::clone(&transformer), styles),
            transformer,
            uploader,
            preprocess,
        }
    }

    pub fn styles(&self) -> &[StyleOption] { self.orchestrator.styles() }

    pub fn create_session(&self) -> SessionSnapshot {
        let id = Uuid::new_v4();
        let session = StudioSession::new();
        let snapshot = self.snapshot_of(id, &session);
        self.sessions.write().insert(id, session);
        info!("🆕 Session {} created", id);
        snapshot
    }

    /// Drop the session along with its cached credentials.
    pub fn end_session(&self, id: Uuid) -> Result<(), StudioError> {
        self.sessions.write().remove(&id).ok_or(SessionError::NotFound(id))?;
        info!("👋 Session {} ended", id);
        Ok(())
    }

    /// Polling counts as activity.
    pub fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, StudioError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(self.snapshot_of(id, session))
    }

    pub fn session_count(&self) -> usize { self.sessions.read().len() }

    /// Drop every session idle for at least `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let mut guard = self.sessions.write();
        let before = guard.len();
        guard.retain(|_, session| session.idle_for(now) < max_idle);
        let evicted = before - guard.len();
        if evicted > 0 {
            info!("🧹 Evicted {} idle sessions ({} left)", evicted, guard.len());
        }
        evicted
    }

    /// Background sweep calling [`Studio::evict_idle`] every `every`. Stops once
    /// the studio itself is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let studio = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(studio) = studio.upgrade() else { break };
                studio.evict_idle(max_idle, Utc::now());
            }
        })
    }

    /// Start a batch for `photo`. Returns once the photo is preprocessed; the
    /// batch keeps running in the background and fills the session as results land.
    pub async fn submit_photo(self: &Arc<Self>, id: Uuid, photo: EncodedImage, intensity: DesignIntensity) -> Result<BatchHandle, StudioError> {
        let token = self.with_session(id, |s| Ok(s.machine.submit(intensity)))?;
        self.start_batch(id, token, Ok(photo), intensity).await
    }

    /// Like [`Studio::submit_photo`] but for a raw data URI or base64 string.
    /// A payload that does not decode still moves the session out of `Idle`
    /// with the processing-failed banner.
    pub async fn submit_photo_payload(self: &Arc<Self>, id: Uuid, payload: &str, intensity: DesignIntensity) -> Result<BatchHandle, StudioError> {
        let token = self.with_session(id, |s| Ok(s.machine.submit(intensity)))?;
        self.start_batch(id, token, EncodedImage::parse(payload), intensity).await
    }

    async fn start_batch(
        self: &Arc<Self>,
        id: Uuid,
        token: BatchToken,
        photo: Result<EncodedImage, DecodeError>,
        intensity: DesignIntensity,
    ) -> Result<BatchHandle, StudioError> {
        let prepared = match photo {
            Ok(photo) => preprocess_async(photo, self.preprocess).await,
            Err(e) => Err(e),
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("❌ Session {}: photo rejected: {}", id, e);
                let _ = self.with_session(id, |s| Ok(s.machine.abandon_batch(token, PHOTO_PROCESSING_FAILED)));
                return Err(e.into());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = self.orchestrator.clone();
        let studio = Arc::clone(self);
        let task = tokio::spawn(async move {
            let run = orchestrator.run(token, prepared, intensity, tx);
            let merge = async {
                while let Some(event) = rx.recv().await {
                    let mut guard = studio.sessions.write();
                    match guard.get_mut(&id) {
                        Some(session) => { session.machine.apply(event); }
                        None => warn!("Session {} is gone; dropping batch {} event", id, token),
                    }
                }
            };
            let (outcome, ()) = tokio::join!(run, merge);
            outcome
        });
        Ok(BatchHandle { token, task })
    }

    pub fn select(&self, id: Uuid, design_id: &DesignId) -> Result<SessionSnapshot, StudioError> {
        self.with_session(id, |s| s.machine.select(design_id).map(|_| ()))?;
        self.snapshot(id)
    }

    pub fn back(&self, id: Uuid) -> Result<SessionSnapshot, StudioError> {
        self.with_session(id, |s| s.machine.back())?;
        self.snapshot(id)
    }

    pub fn reset(&self, id: Uuid) -> Result<SessionSnapshot, StudioError> {
        self.with_session(id, |s| {
            s.machine.reset();
            Ok(())
        })?;
        info!("🔄 Session {} reset", id);
        self.snapshot(id)
    }

    /// Apply a free-text edit to the selected design. Waits for the backend.
    pub async fn submit_edit(&self, id: Uuid, instruction: &str) -> Result<EditOutcome, StudioError> {
        let Some(ticket) = self.with_session(id, |s| s.machine.begin_edit(instruction))? else {
            return Ok(EditOutcome::Ignored);
        };
        let result = self.transformer.edit(&ticket.image, &ticket.instruction).await;
        let outcome = self.with_session(id, |s| Ok(s.machine.finish_edit(ticket, result)))?;
        Ok(outcome)
    }

    /// Current image of a design.
    pub fn design(&self, id: Uuid, design_id: &DesignId) -> Result<DesignResult, StudioError> {
        self.with_session(id, |s| s.machine.design(design_id).cloned().ok_or_else(|| SessionError::UnknownDesign(design_id.clone())))
    }

    /// The active design in the editor downloads as `Lumina-Edit-<Style>`,
    /// anything else as `Lumina-<Style>`.
    pub fn download(&self, id: Uuid, design_id: &DesignId) -> Result<DesignDownload, StudioError> {
        self.with_session(id, |s| {
            let design = s.machine.design(design_id).ok_or_else(|| SessionError::UnknownDesign(design_id.clone()))?;
            let stem = if s.machine.is_editing(design_id) {
                design.style.edit_download_stem()
            } else {
                design.style.download_stem()
            };
            Ok(DesignDownload { filename: format!("{}.{}", stem, design.image.extension()), image: design.image.clone() })
        })
    }

    /// Publish a design's current image. Session state is left as it was,
    /// apart from caching whatever credentials were supplied.
    pub async fn upload_design(&self, id: Uuid, design_id: &DesignId, request: UploadDesignRequest) -> Result<UploadReceipt, StudioError> {
        let (design, credentials) = self.with_session(id, |s| {
            let design = s.machine.design_for_upload(design_id)?;
            Ok((design, s.credentials.clone()))
        })?;

        let credentials = merge_credentials(credentials, &request)?;
        self.with_session(id, |s| {
            s.credentials = Some(credentials.clone());
            Ok(())
        })?;

        let path = request.path.map(|p| p.trim().to_string()).unwrap_or_else(|| default_upload_path(&design.style, Utc::now()));
        if path.is_empty() {
            return Err(UploadError::EmptyPath.into());
        }
        let message = request
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Add interior design: {}", design.style));

        let upload = UploadRequest { credentials, path, message, image: design.image };
        Ok(self.uploader.put_file(&upload).await?)
    }

    fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut StudioSession) -> Result<T, SessionError>) -> Result<T, StudioError> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(f(session)?)
    }

    fn snapshot_of(&self, id: Uuid, session: &StudioSession) -> SessionSnapshot {
        session.machine.snapshot(id, self.styles().len(), session.credentials.is_some())
    }
}

/// Request values win over cached ones.
fn merge_credentials(cached: Option<RepoCredentials>, request: &UploadDesignRequest) -> Result<RepoCredentials, UploadError> {
    let non_blank = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let token = non_blank(&request.token)
        .or_else(|| cached.as_ref().map(|c| c.token.clone()))
        .ok_or(UploadError::MissingCredentials("token"))?;
    let repository = match non_blank(&request.repository) {
        Some(raw) => RepoIdentifier::parse(&raw)?,
        None => cached.map(|c| c.repository).ok_or(UploadError::MissingCredentials("repository"))?,
    };
    Ok(RepoCredentials { token, repository })
}

pub fn default_upload_path(style: &StyleOption, now: DateTime<Utc>) -> String {
    format!("designs/{}-{}.png", style.slug(), now.timestamp_millis())
}
