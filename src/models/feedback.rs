use crate::VisionError;
use crate::models::ImageSource;

/// A correction to submit for a previously analyzed image
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    /// Disputed label(s), comma-joined when several were detected
    pub incorrect_label: String,
    /// What the image actually shows (required)
    pub correct_label: String,
    /// Optional free text; empty when not provided
    pub comments: String,
    /// The original image, not the annotated one
    pub image: ImageSource,
}

impl FeedbackRecord {
    /// Check the one mandatory field
    pub fn validate(&self) -> crate::Result<()> {
        if self.correct_label.trim().is_empty() {
            return Err(VisionError::Validation(
                "Please provide the correct label.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Editable state of an open feedback interaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackDraft {
    pub incorrect_label: String,
    pub correct_label: String,
    pub comments: String,
}

impl FeedbackDraft {
    pub fn new(incorrect_label: impl Into<String>) -> Self {
        Self {
            incorrect_label: incorrect_label.into(),
            ..Self::default()
        }
    }

    pub fn into_record(self, image: ImageSource) -> FeedbackRecord {
        FeedbackRecord {
            incorrect_label: self.incorrect_label,
            correct_label: self.correct_label,
            comments: self.comments,
            image,
        }
    }
}
