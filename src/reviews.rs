// ReviewDesk - requests to have an indicator looked at again.
//
// A review is only a note for the administrators; it never changes the
// indicator itself.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::Review;
use crate::db::Database;
use crate::error::{NodeError, Result};

pub struct ReviewDesk {
    db: Arc<dyn Database>,
}

impl ReviewDesk {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// File a review request for the indicator with digest `hashed`.
    pub async fn request(&self, hashed: &str, requested_by: Option<&str>) -> Result<Review> {
        let hashed = hashed.trim().to_lowercase();
        if self.db.get_indicator(&hashed).await?.is_none() {
            return Err(NodeError::NotFound(format!("indicator {hashed}")));
        }

        let review = Review {
            id: Uuid::new_v4().to_string(),
            indicator: hashed,
            requested_by: requested_by.map(str::to_string),
            created_at: Utc::now(),
        };
        self.db.insert_review(&review).await?;
        info!(id = %review.id, indicator = %review.indicator, "Review requested");
        Ok(review)
    }

    pub async fn list(&self) -> Result<Vec<Review>> {
        Ok(self.db.list_reviews().await?)
    }

    /// Requests filed against one indicator, newest first.
    pub async fn for_indicator(&self, hashed: &str) -> Result<Vec<Review>> {
        Ok(self.db.list_reviews_for(&hashed.trim().to_lowercase()).await?)
    }
}
