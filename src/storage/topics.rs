use anyhow::Result;

use super::schema::Database;
use super::types::Topic;

impl Database {
    // ========================================================================
    // Topic Operations
    // ========================================================================

    /// Create a topic, returns its id
    pub async fn create_topic(&self, name: &str, component: Option<&str>) -> Result<i64> {
        let id: (i64,) =
            sqlx::query_as("INSERT INTO topics (name, component) VALUES (?, ?) RETURNING id")
                .bind(name)
                .bind(component)
                .fetch_one(&self.pool)
                .await?;
        Ok(id.0)
    }

    pub async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>("SELECT id, name, component FROM topics WHERE id = ?")
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(topic)
    }

    pub async fn get_topics(&self) -> Result<Vec<Topic>> {
        let topics =
            sqlx::query_as::<_, Topic>("SELECT id, name, component FROM topics ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(topics)
    }
}
