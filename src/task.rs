use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reference to non-text material attached to a task, carried alongside
/// the transcript without being inlined as raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MediaRef {
    Image { bytes: Vec<u8>, mime: String },
    DocumentRef { uri: String, mime: String },
}

/// Immutable description of the user's request. Created once per session
/// and never mutated afterwards; re-planning and replies all refer back to
/// `description`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            media: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media: Vec<MediaRef>) -> Self {
        self.media = media;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_no_media_by_default() {
        let task = Task::new("paraphrase this sentence");
        assert!(task.media.is_empty());
        assert_eq!(task.description, "paraphrase this sentence");
    }

    #[test]
    fn with_media_attaches_refs() {
        let task = Task::new("summarize this pdf").with_media(vec![MediaRef::DocumentRef {
            uri: "file:///tmp/report.pdf".into(),
            mime: "application/pdf".into(),
        }]);
        assert_eq!(task.media.len(), 1);
    }
}
