//! Fan-out of one generation request per configured style.
//!
//! Every style runs as its own task. Successes are forwarded to the subscriber
//! as soon as they land; failures are logged and counted. Once the last task
//! settles a single `Settled` event closes the batch.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::BatchFailure;
use crate::imaging::EncodedImage;
use crate::models::{DesignId, DesignIntensity, DesignResult, StyleOption};
use crate::transform::ImageTransformer;

/// Monotonic per-session batch counter. Anything tagged with an older token is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BatchToken(u64);

impl BatchToken {
    pub fn value(self) -> u64 { self.0 }

    pub fn next(self) -> Self { Self(self.0 + 1) }
}

impl fmt::Display for BatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Produced { token: BatchToken, result: DesignResult },
    Settled { token: BatchToken, produced: usize },
}

impl BatchEvent {
    pub fn token(&self) -> BatchToken {
        match self {
            BatchEvent::Produced { token, .. } | BatchEvent::Settled { token, .. } => *token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub token: BatchToken,
    pub produced: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    transformer: Arc<dyn ImageTransformer>,
    styles: Arc<[StyleOption]>,
}

impl GenerationOrchestrator {
    pub fn new(transformer: Arc<dyn ImageTransformer>, styles: Vec<StyleOption>) -> Self {
        Self { transformer, styles: styles.into() }
    }

    pub fn styles(&self) -> &[StyleOption] { &self.styles }

    /// Run one batch to completion. `events` receives every accepted result and
    /// then exactly one `Settled`; a closed receiver is not an error.
    pub async fn run(
        &self,
        token: BatchToken,
        image: EncodedImage,
        intensity: DesignIntensity,
        events: UnboundedSender<BatchEvent>,
    ) -> Result<BatchSummary, BatchFailure> {
        info!("🎨 Batch {}: requesting {} styles ({})", token, self.styles.len(), intensity);

        let mut tasks = JoinSet::new();
        for (index, style) in self.styles.iter().cloned().enumerate() {
            let transformer = Arc::clone(&self.transformer);
            let image = image.clone();
            tasks.spawn(async move {
                let outcome = transformer.generate(&image, &style, intensity).await;
                (index, style, outcome)
            });
        }

        let mut seen = HashSet::new();
        let (mut produced, mut failed) = (0usize, 0usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, style, Ok(image))) => {
                    if !seen.insert(style.clone()) {
                        debug!("Batch {}: discarding duplicate '{}'", token, style);
                        continue;
                    }
                    produced += 1;
                    info!("✅ Batch {}: '{}' ready ({} bytes)", token, style, image.len());
                    let result = DesignResult::new(DesignId::new(token.value(), index), style, image);
                    let _ = events.send(BatchEvent::Produced { token, result });
                }
                Ok((_, style, Err(e))) => {
                    failed += 1;
                    warn!("❌ Batch {}: '{}' failed: {}", token, style, e);
                }
                Err(e) => {
                    failed += 1;
                    error!("❌ Batch {}: generation task died: {}", token, e);
                }
            }
        }

        let _ = events.send(BatchEvent::Settled { token, produced });
        if produced == 0 {
            warn!("Batch {} settled with no designs", token);
            return Err(BatchFailure { token, attempted: self.styles.len() });
        }
        info!("🏁 Batch {} settled: {} produced, {} failed", token, produced, failed);
        Ok(BatchSummary { token, produced, failed })
    }
}
