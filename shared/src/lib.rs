use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

/// Classification outcomes, in the order of the model's output vector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    EnumIter,
    EnumCount,
)]
pub enum Label {
    #[strum(serialize = "Bacterial Leaf Blight")]
    #[serde(rename = "Bacterial Leaf Blight")]
    BacterialLeafBlight,
    #[strum(serialize = "Brown_Spot")]
    #[serde(rename = "Brown_Spot")]
    BrownSpot,
    #[strum(serialize = "Healthy Rice Leaf")]
    #[serde(rename = "Healthy Rice Leaf")]
    Healthy,
    #[strum(serialize = "Rice Blast")]
    #[serde(rename = "Rice Blast")]
    RiceBlast,
    #[strum(serialize = "Rice Tungro")]
    #[serde(rename = "Rice Tungro")]
    RiceTungro,
    #[strum(serialize = "Not Rice Leaf")]
    #[serde(rename = "Not Rice Leaf")]
    NotRiceLeaf,
}

impl Label {
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    pub fn count() -> usize {
        <Self as EnumCount>::COUNT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Maximum class probability as a percentage in [0, 100].
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Display)]
#[serde(transparent)]
pub struct RecordId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Display)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionEntry {
    pub id: RecordId,
    pub image_url: String,
    pub result: String,
    pub confidence: f64,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiseaseInfoView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionOutcome {
    pub record_id: RecordId,
    pub result: ClassificationResult,
    pub image_url: String,
    pub disease: Option<DiseaseInfoView>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryPage {
    pub items: Vec<DetectionEntry>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl HistoryPage {
    pub fn pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum History {
    /// The caller's own detections, one page at a time.
    Paginated(HistoryPage),
    /// The most recent detections of everyone, for anonymous callers.
    Recent { items: Vec<DetectionEntry> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectView {
    pub outcome: Option<DetectionOutcome>,
    pub error: Option<String>,
    pub history: History,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DashboardStats {
    pub users: i64,
    pub diseases: i64,
    pub detections: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DashboardView {
    pub role: String,
    pub stats: Option<DashboardStats>,
    pub diseases: Vec<DiseaseInfoView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn label_order_matches_model_outputs() {
        let names: Vec<String> = Label::iter().map(|l| l.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "Bacterial Leaf Blight",
                "Brown_Spot",
                "Healthy Rice Leaf",
                "Rice Blast",
                "Rice Tungro",
                "Not Rice Leaf",
            ]
        );
        assert_eq!(Label::count(), 6);
        assert_eq!(Label::from_index(3), Some(Label::RiceBlast));
        assert_eq!(Label::from_index(6), None);
    }

    #[test]
    fn label_parses_canonical_name() {
        assert_eq!(Label::from_str("Brown_Spot").unwrap(), Label::BrownSpot);
        assert!(Label::from_str("brown spot").is_err());
        let json = serde_json::to_string(&Label::RiceTungro).unwrap();
        assert_eq!(json, "\"Rice Tungro\"");
    }

    #[test]
    fn history_page_counts_pages() {
        let page = HistoryPage {
            items: vec![],
            page: 2,
            per_page: 5,
            total: 11,
        };
        assert_eq!(page.pages(), 3);
        assert!(page.has_next());

        let empty = HistoryPage {
            items: vec![],
            page: 1,
            per_page: 5,
            total: 0,
        };
        assert_eq!(empty.pages(), 0);
        assert!(!empty.has_next());
    }
}
