use leafscan_shared::{RecordId, UserId};
use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::{format_timestamp, DetectionRecord, DetectionRow, NewDetection, Page};

#[derive(Clone)]
pub struct DetectionRepository {
    pool: SqlitePool,
}

impl DetectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &NewDetection) -> Result<RecordId, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO detection_logs (image_path, result, confidence, user_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.image_path)
        .bind(&record.result)
        .bind(record.confidence)
        .bind(record.user_id.map(|id| id.0))
        .bind(format_timestamp(&record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Most recent first. Pages past the end are empty, and page 0 is page 1.
    pub async fn list_by_user(
        &self,
        user_id: UserId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<DetectionRecord>, RepositoryError> {
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let rows = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT id, image_path, result, confidence, user_id, created_at
            FROM detection_logs
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id.0)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM detection_logs WHERE user_id = ?")
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(DetectionRecord::try_from)
                .collect::<Result<_, _>>()?,
            page,
            per_page,
            total,
        })
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<DetectionRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT id, image_path, result, confidence, user_id, created_at
            FROM detection_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DetectionRecord::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM detection_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn detection(user_id: Option<i64>, minutes: i64, result: &str) -> NewDetection {
        NewDetection {
            image_path: format!("detections/leaf-{minutes}.jpg"),
            result: result.to_string(),
            confidence: 80.0,
            user_id: user_id.map(UserId),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[actix_web::test]
    async fn append_returns_increasing_ids_and_round_trips() {
        let repo = DetectionRepository::new(test_pool().await);
        let first = repo.append(&detection(Some(1), 0, "Rice Blast")).await.unwrap();
        let second = repo.append(&detection(None, 1, "Rice Tungro")).await.unwrap();
        assert!(second > first);

        let recent = repo.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second);
        assert_eq!(recent[0].user_id, None);
        assert_eq!(recent[1].result, "Rice Blast");
        assert_eq!(recent[1].user_id, Some(UserId(1)));
        assert_eq!(recent[1].created_at, detection(Some(1), 0, "").created_at);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn pages_cover_every_record_once_newest_first() {
        let repo = DetectionRepository::new(test_pool().await);
        // Inserted out of order; two records share a timestamp.
        for minutes in [5, 1, 9, 3, 3, 7, 0, 12, 8, 2, 11] {
            repo.append(&detection(Some(7), minutes, "Brown_Spot")).await.unwrap();
        }
        repo.append(&detection(Some(8), 4, "Brown_Spot")).await.unwrap();
        repo.append(&detection(None, 6, "Brown_Spot")).await.unwrap();

        let per_page = 4;
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut page = 1;
        loop {
            let result = repo.list_by_user(UserId(7), page, per_page).await.unwrap();
            assert_eq!(result.total, 11);
            if result.items.is_empty() {
                break;
            }
            assert!(result.items.len() <= per_page as usize);
            for record in result.items {
                assert_eq!(record.user_id, Some(UserId(7)));
                assert!(seen.insert(record.id), "duplicate {:?}", record.id);
                ordered.push(record.created_at);
            }
            page += 1;
        }
        assert_eq!(page, 4);
        assert_eq!(seen.len(), 11);
        assert!(ordered.windows(2).all(|w| w[0] >= w[1]));

        let beyond = repo.list_by_user(UserId(7), 99, per_page).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.page, 99);
    }

    #[actix_web::test]
    async fn page_zero_is_treated_as_first_page() {
        let repo = DetectionRepository::new(test_pool().await);
        for minutes in 0..3 {
            repo.append(&detection(Some(2), minutes, "Healthy Rice Leaf")).await.unwrap();
        }
        let page = repo.list_by_user(UserId(2), 0, 2).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].image_path, "detections/leaf-2.jpg");
    }

    #[actix_web::test]
    async fn recent_ignores_ownership_and_respects_limit() {
        let repo = DetectionRepository::new(test_pool().await);
        repo.append(&detection(Some(1), 0, "Rice Blast")).await.unwrap();
        repo.append(&detection(Some(2), 1, "Rice Blast")).await.unwrap();
        repo.append(&detection(None, 2, "Rice Blast")).await.unwrap();

        let recent = repo.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_id, None);
        assert_eq!(recent[1].user_id, Some(UserId(2)));
    }
}
