use chrono::{DateTime, SecondsFormat, Utc};
use leafscan_shared::{DetectionEntry, DiseaseInfoView, RecordId, UserId};
use serde::Deserialize;

use super::RepositoryError;
use crate::auth::models::Role;
use crate::storage::upload_service::media_url;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: RecordId,
    pub image_path: String,
    pub result: String,
    pub confidence: f64,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub image_path: String,
    pub result: String,
    pub confidence: f64,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DetectionRow {
    pub id: i64,
    pub image_path: String,
    pub result: String,
    pub confidence: f64,
    pub user_id: Option<i64>,
    pub created_at: String,
}

impl TryFrom<DetectionRow> for DetectionRecord {
    type Error = RepositoryError;

    fn try_from(row: DetectionRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| {
                RepositoryError::InvalidData(format!(
                    "detection {} has bad created_at {:?}: {}",
                    row.id, row.created_at, e
                ))
            })?
            .with_timezone(&Utc);
        Ok(Self {
            id: RecordId(row.id),
            image_path: row.image_path,
            result: row.result,
            confidence: row.confidence,
            user_id: row.user_id.map(UserId),
            created_at,
        })
    }
}

/// Fixed-width UTC timestamp, so text order is chronological order.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl DetectionRecord {
    pub fn to_entry(&self) -> DetectionEntry {
        DetectionEntry {
            id: self.id,
            image_url: media_url(&self.image_path),
            result: self.result.clone(),
            confidence: self.confidence,
            user_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DiseaseInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
}

impl DiseaseInfo {
    pub fn to_view(&self) -> DiseaseInfoView {
        DiseaseInfoView {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            image_url: self.image_path.as_deref().map(media_url),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiseaseSeed {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub role: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            email: row.email,
            role: Role::parse(&row.role),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}
