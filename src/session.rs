//! The per-user design flow.
//!
//! `DesignSession` is the only thing that mutates a session's designs and
//! selection. Async work (generation batches, edits) happens elsewhere and is
//! folded back in through [`DesignSession::apply`] and
//! [`DesignSession::finish_edit`], both of which drop anything tagged with an
//! outdated batch token.

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SessionError, TransformError};
use crate::imaging::EncodedImage;
use crate::models::{AppPhase, DesignId, DesignIntensity, DesignResult, SessionSnapshot};
use crate::orchestrator::{BatchEvent, BatchToken};

pub const CONNECTION_ISSUE: &str = "Connection issue. Please try a different photo.";
pub const PHOTO_PROCESSING_FAILED: &str = "Photo processing failed. Try another image.";
pub const EDIT_FAILED: &str = "AI couldn't apply that specific change. Try a simpler request!";

/// Everything needed to run one edit call outside the session lock.
#[derive(Debug, Clone)]
pub struct EditTicket {
    pub batch: BatchToken,
    pub design_id: DesignId,
    pub image: EncodedImage,
    pub instruction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    /// Blank instruction, nothing was sent.
    Ignored,
    Applied,
    Failed,
    /// The session was reset while the edit was in flight.
    Stale,
}

impl EditOutcome {
    pub fn notice(self) -> Option<&'static str> {
        match self {
            EditOutcome::Failed => Some(EDIT_FAILED),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DesignSession {
    phase: AppPhase,
    designs: Vec<DesignResult>,
    active: Option<DesignId>,
    error: Option<String>,
    intensity: Option<DesignIntensity>,
    batch: BatchToken,
}

impl DesignSession {
    pub fn new() -> Self { Self::default() }

    pub fn phase(&self) -> AppPhase { self.phase }

    pub fn designs(&self) -> &[DesignResult] { &self.designs }

    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    pub fn intensity(&self) -> Option<DesignIntensity> { self.intensity }

    pub fn current_batch(&self) -> BatchToken { self.batch }

    pub fn design(&self, id: &DesignId) -> Option<&DesignResult> {
        self.designs.iter().find(|d| &d.id == id)
    }

    pub fn active_design(&self) -> Option<&DesignResult> {
        self.active.as_ref().and_then(|id| self.design(id))
    }

    /// Whether `id` is the design open in the editor.
    pub fn is_editing(&self, id: &DesignId) -> bool {
        matches!(self.phase, AppPhase::EditingDesign | AppPhase::UpdatingDesign) && self.active.as_ref() == Some(id)
    }

    /// Start a new batch. Accepted from any phase; whatever was there before is discarded.
    pub fn submit(&mut self, intensity: DesignIntensity) -> BatchToken {
        self.clear();
        self.batch = self.batch.next();
        self.phase = AppPhase::GeneratingInitial;
        self.intensity = Some(intensity);
        info!("🚀 Batch {} started ({})", self.batch, intensity);
        self.batch
    }

    /// Merge one orchestrator event. Returns whether anything changed.
    pub fn apply(&mut self, event: BatchEvent) -> bool {
        if event.token() != self.batch || self.phase != AppPhase::GeneratingInitial {
            debug!("Dropping stale event for batch {} (current {}, {:?})", event.token(), self.batch, self.phase);
            return false;
        }
        match event {
            BatchEvent::Produced { result, .. } => {
                if self.designs.iter().any(|d| d.style == result.style) {
                    debug!("Ignoring duplicate '{}' result", result.style);
                    return false;
                }
                info!("🖼️ Design '{}' arrived ({} of batch {})", result.style, self.designs.len() + 1, self.batch);
                self.designs.push(result);
                true
            }
            BatchEvent::Settled { produced, .. } => {
                self.phase = AppPhase::SelectingDesign;
                if produced == 0 {
                    warn!("❌ Batch {} produced no designs", self.batch);
                    self.error = Some(CONNECTION_ISSUE.to_string());
                } else {
                    self.error = None;
                }
                true
            }
        }
    }

    /// The photo never made it to the orchestrator.
    pub fn abandon_batch(&mut self, token: BatchToken, message: &str) -> bool {
        if token != self.batch || self.phase != AppPhase::GeneratingInitial {
            return false;
        }
        self.phase = AppPhase::SelectingDesign;
        self.error = Some(message.to_string());
        true
    }

    pub fn select(&mut self, id: &DesignId) -> Result<&DesignResult, SessionError> {
        self.expect_phase(AppPhase::SelectingDesign, "select a design")?;
        if self.design(id).is_none() {
            return Err(SessionError::UnknownDesign(id.clone()));
        }
        self.active = Some(id.clone());
        self.phase = AppPhase::EditingDesign;
        self.active_design().ok_or_else(|| SessionError::UnknownDesign(id.clone()))
    }

    pub fn back(&mut self) -> Result<(), SessionError> {
        self.expect_phase(AppPhase::EditingDesign, "go back to the grid")?;
        self.active = None;
        self.phase = AppPhase::SelectingDesign;
        Ok(())
    }

    /// `Ok(None)` for a blank instruction: nothing to send, nothing changes.
    pub fn begin_edit(&mut self, instruction: &str) -> Result<Option<EditTicket>, SessionError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Ok(None);
        }
        if self.phase == AppPhase::UpdatingDesign {
            return Err(SessionError::EditInFlight);
        }
        self.expect_phase(AppPhase::EditingDesign, "edit")?;
        let active = self.active_design().ok_or(SessionError::InvalidTransition { from: self.phase, action: "edit" })?;
        let ticket = EditTicket {
            batch: self.batch,
            design_id: active.id.clone(),
            image: active.image.clone(),
            instruction: instruction.to_string(),
        };
        self.phase = AppPhase::UpdatingDesign;
        Ok(Some(ticket))
    }

    pub fn finish_edit(&mut self, ticket: EditTicket, outcome: Result<EncodedImage, TransformError>) -> EditOutcome {
        let current = self.phase == AppPhase::UpdatingDesign
            && ticket.batch == self.batch
            && self.active.as_ref() == Some(&ticket.design_id);
        if !current {
            debug!("Dropping stale edit for {}", ticket.design_id);
            return EditOutcome::Stale;
        }
        self.phase = AppPhase::EditingDesign;
        match outcome {
            Ok(image) => match self.designs.iter_mut().find(|d| d.id == ticket.design_id) {
                Some(design) => {
                    design.image = image;
                    design.updated_at = chrono::Utc::now();
                    info!("✅ Applied edit to {}", design.id);
                    EditOutcome::Applied
                }
                None => EditOutcome::Stale,
            },
            Err(e) => {
                warn!("❌ Edit of {} failed: {}", ticket.design_id, e);
                EditOutcome::Failed
            }
        }
    }

    /// Back to `Idle`. In-flight work from before the reset is ignored when it lands.
    pub fn reset(&mut self) {
        self.clear();
        self.batch = self.batch.next();
        self.phase = AppPhase::Idle;
    }

    /// Copy of a design for uploading or downloading.
    pub fn design_for_upload(&self, id: &DesignId) -> Result<DesignResult, SessionError> {
        if !matches!(self.phase, AppPhase::SelectingDesign | AppPhase::EditingDesign) {
            return Err(SessionError::InvalidTransition { from: self.phase, action: "upload a design" });
        }
        self.design(id).cloned().ok_or_else(|| SessionError::UnknownDesign(id.clone()))
    }

    pub fn snapshot(&self, id: Uuid, styles_total: usize, has_credentials: bool) -> SessionSnapshot {
        SessionSnapshot {
            id,
            phase: self.phase,
            intensity: self.intensity,
            designs: self.designs.clone(),
            active_design_id: self.active.clone(),
            error: self.error.clone(),
            styles_total,
            has_credentials,
            generating: self.phase == AppPhase::GeneratingInitial,
        }
    }

    fn clear(&mut self) {
        self.designs.clear();
        self.active = None;
        self.error = None;
        self.intensity = None;
    }

    fn expect_phase(&self, expected: AppPhase, action: &'static str) -> Result<(), SessionError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition { from: self.phase, action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StyleOption;
    use pretty_assertions::assert_eq;

    fn produced(token: BatchToken, index: usize, style: &str) -> BatchEvent {
        BatchEvent::Produced {
            token,
            result: DesignResult::new(
                DesignId::new(token.value(), index),
                StyleOption::new(style),
                EncodedImage::new("image/png", style.as_bytes().to_vec()),
            ),
        }
    }

    fn selecting(styles: &[&str]) -> (DesignSession, BatchToken) {
        let mut session = DesignSession::new();
        let token = session.submit(DesignIntensity::Balanced);
        for (i, style) in styles.iter().enumerate() {
            session.apply(produced(token, i, style));
        }
        session.apply(BatchEvent::Settled { token, produced: styles.len() });
        (session, token)
    }

    #[test]
    fn submit_clears_previous_state_and_advances_token() {
        let (mut session, first) = selecting(&["Luxury Art Deco"]);
        let second = session.submit(DesignIntensity::Bold);
        assert!(second > first);
        assert_eq!(session.phase(), AppPhase::GeneratingInitial);
        assert!(session.designs().is_empty());
        assert_eq!(session.intensity(), Some(DesignIntensity::Bold));
    }

    #[test]
    fn partial_results_append_without_leaving_generation() {
        let mut session = DesignSession::new();
        let token = session.submit(DesignIntensity::Balanced);
        assert!(session.apply(produced(token, 0, "Modern Farmhouse")));
        assert_eq!(session.phase(), AppPhase::GeneratingInitial);
        assert_eq!(session.designs().len(), 1);
    }

    #[test]
    fn duplicate_style_is_not_appended() {
        let mut session = DesignSession::new();
        let token = session.submit(DesignIntensity::Balanced);
        assert!(session.apply(produced(token, 0, "Modern Farmhouse")));
        assert!(!session.apply(produced(token, 3, "Modern Farmhouse")));
        assert_eq!(session.designs().len(), 1);
        assert_eq!(session.designs()[0].id, DesignId::new(token.value(), 0));
    }

    #[test]
    fn settling_with_nothing_sets_connection_issue() {
        let (session, _) = selecting(&[]);
        assert_eq!(session.phase(), AppPhase::SelectingDesign);
        assert_eq!(session.error(), Some(CONNECTION_ISSUE));
    }

    #[test]
    fn settling_with_some_results_is_not_an_error() {
        let (session, _) = selecting(&["Luxury Art Deco", "European Classic"]);
        assert_eq!(session.phase(), AppPhase::SelectingDesign);
        assert_eq!(session.error(), None);
        assert_eq!(session.designs().len(), 2);
    }

    #[test]
    fn events_after_reset_are_dropped() {
        let mut session = DesignSession::new();
        let token = session.submit(DesignIntensity::Subtle);
        session.reset();
        assert!(!session.apply(produced(token, 0, "Modern Farmhouse")));
        assert!(!session.apply(BatchEvent::Settled { token, produced: 1 }));
        assert_eq!(session.phase(), AppPhase::Idle);
        assert!(session.designs().is_empty());
    }

    #[test]
    fn events_from_an_older_batch_do_not_leak_into_a_newer_one() {
        let mut session = DesignSession::new();
        let old = session.submit(DesignIntensity::Balanced);
        let new = session.submit(DesignIntensity::Balanced);
        assert!(!session.apply(produced(old, 0, "Modern Farmhouse")));
        assert!(session.apply(produced(new, 0, "European Classic")));
        assert_eq!(session.designs().len(), 1);
    }

    #[test]
    fn abandon_batch_surfaces_processing_error() {
        let mut session = DesignSession::new();
        let token = session.submit(DesignIntensity::Balanced);
        assert!(session.abandon_batch(token, PHOTO_PROCESSING_FAILED));
        assert_eq!(session.phase(), AppPhase::SelectingDesign);
        assert_eq!(session.error(), Some(PHOTO_PROCESSING_FAILED));
    }

    #[test]
    fn select_and_back() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        let id = DesignId::new(token.value(), 0);
        assert_eq!(session.select(&id).unwrap().style.name(), "Luxury Art Deco");
        assert_eq!(session.phase(), AppPhase::EditingDesign);

        assert!(session.is_editing(&id));

        session.back().unwrap();
        assert!(!session.is_editing(&id));
        assert_eq!(session.phase(), AppPhase::SelectingDesign);
        assert!(session.active_design().is_none());
        assert_eq!(session.designs().len(), 1);
    }

    #[test]
    fn select_rejects_unknown_ids_and_wrong_phase() {
        let (mut session, _) = selecting(&["Luxury Art Deco"]);
        let missing = DesignId::from("design-99-0".to_string());
        assert_eq!(session.select(&missing).unwrap_err(), SessionError::UnknownDesign(missing.clone()));

        let mut idle = DesignSession::new();
        assert!(matches!(idle.select(&missing), Err(SessionError::InvalidTransition { from: AppPhase::Idle, .. })));
    }

    #[test]
    fn blank_instruction_is_a_no_op() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        session.select(&DesignId::new(token.value(), 0)).unwrap();
        assert!(session.begin_edit("   \n\t").unwrap().is_none());
        assert_eq!(session.phase(), AppPhase::EditingDesign);
    }

    #[test]
    fn second_edit_while_updating_is_rejected() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        session.select(&DesignId::new(token.value(), 0)).unwrap();
        let ticket = session.begin_edit(" make walls blue ").unwrap().unwrap();
        assert_eq!(ticket.instruction, "make walls blue");
        assert_eq!(session.phase(), AppPhase::UpdatingDesign);
        assert_eq!(session.begin_edit("add a lamp").unwrap_err(), SessionError::EditInFlight);
        assert!(session.back().is_err());
    }

    #[test]
    fn successful_edit_replaces_image_in_place() {
        let (mut session, token) = selecting(&["Luxury Art Deco", "Modern Farmhouse"]);
        let id = DesignId::new(token.value(), 1);
        session.select(&id).unwrap();
        let ticket = session.begin_edit("make walls blue").unwrap().unwrap();

        let edited = EncodedImage::new("image/png", b"blue walls".to_vec());
        assert_eq!(session.finish_edit(ticket, Ok(edited.clone())), EditOutcome::Applied);
        assert_eq!(session.phase(), AppPhase::EditingDesign);
        assert_eq!(session.active_design().unwrap().id, id);
        assert_eq!(session.active_design().unwrap().image, edited);
        assert_eq!(session.design(&id).unwrap().image, edited);
        assert_eq!(session.designs().len(), 2);
    }

    #[test]
    fn failed_edit_leaves_design_untouched() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        let id = DesignId::new(token.value(), 0);
        session.select(&id).unwrap();
        let before = session.active_design().unwrap().image.clone();
        let ticket = session.begin_edit("make walls blue").unwrap().unwrap();

        let outcome = session.finish_edit(ticket, Err(TransformError::EmptyResponse));
        assert_eq!(outcome, EditOutcome::Failed);
        assert_eq!(outcome.notice(), Some(EDIT_FAILED));
        assert_eq!(session.phase(), AppPhase::EditingDesign);
        assert_eq!(session.active_design().unwrap().image, before);
    }

    #[test]
    fn edit_landing_after_reset_is_stale() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        session.select(&DesignId::new(token.value(), 0)).unwrap();
        let ticket = session.begin_edit("make walls blue").unwrap().unwrap();
        session.reset();
        let outcome = session.finish_edit(ticket, Ok(EncodedImage::new("image/png", b"late".to_vec())));
        assert_eq!(outcome, EditOutcome::Stale);
        assert_eq!(session.phase(), AppPhase::Idle);
        assert!(session.designs().is_empty());
    }

    #[test]
    fn uploads_are_allowed_from_grid_and_editor_only() {
        let (mut session, token) = selecting(&["Luxury Art Deco"]);
        let id = DesignId::new(token.value(), 0);
        assert!(session.design_for_upload(&id).is_ok());
        session.select(&id).unwrap();
        assert!(session.design_for_upload(&id).is_ok());
        session.begin_edit("add a lamp").unwrap();
        assert!(session.design_for_upload(&id).is_err());
    }
}
