use serde::{Deserialize, Serialize};

/// Training unit stored in the "training_exercises" collection.
///
/// Managed by administrators; learners only read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// How many full play-throughs the learner must complete (>= 1)
    #[serde(default = "default_required_viewing_count")]
    pub required_viewing_count: u32,
    #[serde(default)]
    pub is_required: bool,
}

fn default_required_viewing_count() -> u32 {
    1
}

impl Exercise {
    /// Required viewing count with the lower bound enforced.
    pub fn required_count(&self) -> u32 {
        self.required_viewing_count.max(1)
    }

    pub fn has_video(&self) -> bool {
        self.video_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_count_never_below_one() {
        let exercise = Exercise {
            id: "ex-1".into(),
            title: "Chụp ảnh sản phẩm".into(),
            order_index: 1,
            video_url: None,
            required_viewing_count: 0,
            is_required: true,
        };
        assert_eq!(exercise.required_count(), 1);
        assert!(!exercise.has_video());
    }

    #[test]
    fn deserializes_with_defaults() {
        let exercise: Exercise = serde_json::from_value(serde_json::json!({
            "_id": "ex-2",
            "title": "Banner TikTok",
            "video_url": "videos/banner.mp4"
        }))
        .unwrap();

        assert_eq!(exercise.required_viewing_count, 1);
        assert_eq!(exercise.order_index, 0);
        assert!(exercise.has_video());
    }
}
