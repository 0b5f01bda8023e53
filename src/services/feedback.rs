//! FeedbackCollector - corrections for a previously analyzed image
//!
//! An interaction is opened against one [`ImageSource`] and the label being disputed.
//! The draft is edited in place, validated locally, and posted once to `/feedback`.

use crate::models::{FeedbackDraft, FeedbackRecord, ImageSource};
use crate::services::inference::InferenceClient;
use crate::{Result, VisionError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackPhase {
    #[default]
    Closed,
    Open,
    Submitting,
}

impl fmt::Display for FeedbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackPhase::Closed => f.write_str("no feedback is open"),
            FeedbackPhase::Open => f.write_str("feedback is open"),
            FeedbackPhase::Submitting => f.write_str("feedback is being submitted"),
        }
    }
}

#[derive(Debug, Default)]
struct Interaction {
    phase: FeedbackPhase,
    draft: FeedbackDraft,
    image: Option<ImageSource>,
    /// Bumped by every open and close; a submit outcome from an older interaction is discarded
    generation: u64,
}

impl Interaction {
    /// Drop the draft and start a new generation
    fn reset(&mut self) {
        *self = Interaction {
            generation: self.generation + 1,
            ..Interaction::default()
        };
    }
}

/// Collects and submits one correction at a time. Clones share the interaction.
#[derive(Debug, Clone)]
pub struct FeedbackCollector {
    client: InferenceClient,
    interaction: Arc<Mutex<Interaction>>,
}

impl FeedbackCollector {
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            interaction: Arc::new(Mutex::new(Interaction::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Interaction> {
        self.interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> FeedbackPhase {
        self.lock().phase
    }

    pub fn is_open(&self) -> bool {
        self.phase() != FeedbackPhase::Closed
    }

    /// Begin an interaction. The corrected label and comments always start empty.
    pub fn open(&self, disputed_label: impl Into<String>, image: ImageSource) {
        let mut interaction = self.lock();
        interaction.reset();
        interaction.draft = FeedbackDraft::new(disputed_label);
        interaction.image = Some(image);
        interaction.phase = FeedbackPhase::Open;

        tracing::debug!(
            "Feedback opened for {:?}",
            interaction.draft.incorrect_label
        );
    }

    pub fn set_correct_label(&self, label: impl Into<String>) {
        self.lock().draft.correct_label = label.into();
    }

    pub fn set_comments(&self, comments: impl Into<String>) {
        self.lock().draft.comments = comments.into();
    }

    /// Copy of the current draft, `None` when no interaction is open
    pub fn draft(&self) -> Option<FeedbackDraft> {
        let interaction = self.lock();
        (interaction.phase != FeedbackPhase::Closed).then(|| interaction.draft.clone())
    }

    /// Build a record from the open draft
    pub fn record(&self) -> Result<FeedbackRecord> {
        let interaction = self.lock();
        match (&interaction.phase, &interaction.image) {
            (FeedbackPhase::Open, Some(image)) => {
                Ok(interaction.draft.clone().into_record(image.clone()))
            }
            _ => Err(VisionError::invalid_state(
                "build a feedback record",
                interaction.phase,
            )),
        }
    }

    /// Submit a correction.
    ///
    /// Validation failures never reach the network. A failed request leaves the
    /// interaction open so the user can try again; success closes it. When the
    /// interaction was closed or reopened while the request was in flight, the outcome
    /// is discarded and the call fails with `StaleResponse`.
    pub async fn submit(&self, record: FeedbackRecord) -> Result<()> {
        let generation = {
            let mut interaction = self.lock();
            if interaction.phase != FeedbackPhase::Open {
                let err = VisionError::invalid_state("submit feedback", interaction.phase);
                tracing::error!("{}", err);
                return Err(err);
            }
            record.validate()?;
            interaction.phase = FeedbackPhase::Submitting;
            interaction.generation
        };

        let guard = SubmittingGuard {
            interaction: &self.interaction,
            generation,
            armed: true,
        };
        let outcome = self.client.submit_feedback(&record).await;
        guard.disarm();

        let mut interaction = self.lock();
        if interaction.generation != generation {
            tracing::info!(
                "Discarding feedback response from interaction {} (current {})",
                generation,
                interaction.generation
            );
            return Err(VisionError::StaleResponse);
        }

        match outcome {
            Ok(()) => {
                interaction.reset();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Feedback submission failed: {}", e);
                interaction.phase = FeedbackPhase::Open;
                Err(e)
            }
        }
    }

    /// Validate and submit the open draft
    pub async fn submit_draft(&self) -> Result<()> {
        let record = self.record()?;
        self.submit(record).await
    }

    /// Dismiss the interaction without submitting
    pub fn close(&self) {
        let mut interaction = self.lock();
        if interaction.phase != FeedbackPhase::Closed {
            tracing::debug!("Feedback closed without submitting");
        }
        interaction.reset();
    }
}

/// Returns a `Submitting` interaction to `Open` when a submit future is dropped early
struct SubmittingGuard<'a> {
    interaction: &'a Mutex<Interaction>,
    generation: u64,
    armed: bool,
}

impl SubmittingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut interaction = self
            .interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if interaction.generation == self.generation
            && interaction.phase == FeedbackPhase::Submitting
        {
            interaction.phase = FeedbackPhase::Open;
        }
    }
}
