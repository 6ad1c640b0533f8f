use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A question as seen by the grouping engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Option<Vec<f64>>,
}

impl TextRecord {
    pub fn new(id: i64, course_id: i64, title: &str, body: &str, created_at: DateTime<Utc>) -> Self {
        TextRecord {
            id,
            course_id,
            title: title.to_string(),
            body: body.to_string(),
            anonymous: false,
            created_at,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Title, followed by the body when there is one.
    pub fn combined_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }

    /// The embedding if one has been computed and is non-empty.
    pub fn usable_embedding(&self) -> Option<&[f64]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }

    pub fn needs_embedding(&self) -> bool {
        self.usable_embedding().is_none()
    }
}

/// Newest first, ties broken by ascending id.
pub fn grouping_order(a: &TextRecord, b: &TextRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_for_grouping(records: &mut [TextRecord]) {
    records.sort_by(grouping_order);
}
