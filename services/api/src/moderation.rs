//! Image moderation gate backed by AWS Rekognition
//!
//! The classifier is a pass/fail gate: a photo record is only ever created
//! for approved images.

use anyhow::Result;
use aws_sdk_rekognition::Client;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::Image;

use crate::models::photo::{ModerationLabel, ModerationOutcome};

/// Minimum label confidence considered actionable (0-100)
const CONFIDENCE_THRESHOLD: f32 = 70.0;

/// Label categories that block an upload
const REJECTED_CATEGORIES: &[&str] = &[
    "Explicit Nudity",
    "Violence",
    "Visually Disturbing",
    "Hate Symbols",
    "Drugs & Tobacco",
    "Alcohol",
];

/// Moderation client wrapping the Rekognition API
#[derive(Clone)]
pub struct ModerationClient {
    client: Client,
}

impl ModerationClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Classify image bytes and return the approval outcome
    pub async fn classify(&self, image_bytes: &[u8]) -> Result<ModerationOutcome> {
        let image = Image::builder().bytes(Blob::new(image_bytes)).build();

        let response = self
            .client
            .detect_moderation_labels()
            .image(image)
            .min_confidence(CONFIDENCE_THRESHOLD)
            .send()
            .await?;

        let labels: Vec<ModerationLabel> = response
            .moderation_labels()
            .iter()
            .map(|label| ModerationLabel {
                name: label.name().unwrap_or("Unknown").to_string(),
                confidence: label.confidence().unwrap_or(0.0),
            })
            .collect();

        Ok(evaluate_labels(labels))
    }
}

/// Decide approval from detected labels. Rejection names the first label
/// that matched a blocked category at or above the confidence threshold.
pub fn evaluate_labels(labels: Vec<ModerationLabel>) -> ModerationOutcome {
    let rejected_label = labels
        .iter()
        .find(|label| {
            REJECTED_CATEGORIES.iter().any(|category| {
                label.name.contains(category) && label.confidence >= CONFIDENCE_THRESHOLD
            })
        })
        .map(|label| label.name.clone());

    match rejected_label {
        Some(name) => ModerationOutcome {
            approved: false,
            labels,
            rejection_reason: Some(format!("Image contains inappropriate content ({})", name)),
        },
        None => ModerationOutcome {
            approved: true,
            labels,
            rejection_reason: None,
        },
    }
}
