use leafscan_shared::Label;
use sqlx::SqlitePool;
use std::path::Path;

use super::RepositoryError;
use super::models::{DiseaseInfo, DiseaseSeed};

#[derive(Clone)]
pub struct DiseaseRepository {
    pool: SqlitePool,
}

impl DiseaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Exact, case-sensitive match on the canonical name.
    pub async fn find_by_label(&self, label: &str) -> Result<Option<DiseaseInfo>, RepositoryError> {
        let disease = sqlx::query_as::<_, DiseaseInfo>(
            "SELECT id, name, description, image_path FROM diseases WHERE name = ?",
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        Ok(disease)
    }

    pub async fn list_all(&self) -> Result<Vec<DiseaseInfo>, RepositoryError> {
        let diseases = sqlx::query_as::<_, DiseaseInfo>(
            "SELECT id, name, description, image_path FROM diseases ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(diseases)
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM diseases")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn seed(&self, entries: &[DiseaseSeed]) -> Result<u64, RepositoryError> {
        let mut inserted = 0;
        for entry in entries {
            if entry.name.parse::<Label>().is_err() {
                log::warn!(
                    "Catalog entry {:?} does not match any classifier label and will never be looked up",
                    entry.name
                );
            }
            let result = sqlx::query(
                "INSERT OR IGNORE INTO diseases (name, description, image_path) VALUES (?, ?, ?)",
            )
            .bind(&entry.name)
            .bind(&entry.description)
            .bind(entry.image.as_deref())
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn seed_from_file(&self, path: &Path) -> Result<u64, RepositoryError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RepositoryError::Seed(format!("{}: {}", path.display(), e)))?;
        let entries: Vec<DiseaseSeed> = serde_yaml::from_str(&contents)
            .map_err(|e| RepositoryError::Seed(format!("{}: {}", path.display(), e)))?;
        self.seed(&entries).await
    }
}
