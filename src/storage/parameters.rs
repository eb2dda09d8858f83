use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Parameter Operations
    // ========================================================================

    /// Get a single parameter of a record.
    ///
    /// Parameters are free-form metadata keyed by the owning record's guid,
    /// a domain (e.g. `feed`, `enclosure`) and a name.
    pub async fn get_parameter(
        &self,
        parent_guid: &str,
        domain: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM parameters WHERE parent_guid = ? AND domain = ? AND name = ?",
        )
        .bind(parent_guid)
        .bind(domain)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a parameter value (UPSERT)
    pub async fn set_parameter(
        &self,
        parent_guid: &str,
        domain: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO parameters (parent_guid, domain, name, value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(parent_guid, domain, name) DO UPDATE SET value = excluded.value
        "#,
        )
        .bind(parent_guid)
        .bind(domain)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a parameter, returns whether it existed
    pub async fn delete_parameter(&self, parent_guid: &str, domain: &str, name: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM parameters WHERE parent_guid = ? AND domain = ? AND name = ?")
                .bind(parent_guid)
                .bind(domain)
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All (name, value) pairs of a record within one domain, ordered by name
    pub async fn list_parameters(
        &self,
        parent_guid: &str,
        domain: &str,
    ) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, value FROM parameters WHERE parent_guid = ? AND domain = ? ORDER BY name",
        )
        .bind(parent_guid)
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_parameter_missing() {
        let db = test_db().await;
        let value = db.get_parameter("guid-1", "feed", "etag").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_parameter_upsert() {
        let db = test_db().await;
        db.set_parameter("guid-1", "feed", "etag", "\"v1\"").await.unwrap();
        db.set_parameter("guid-1", "feed", "etag", "\"v2\"").await.unwrap();

        let value = db.get_parameter("guid-1", "feed", "etag").await.unwrap();
        assert_eq!(value.as_deref(), Some("\"v2\""));
    }

    #[tokio::test]
    async fn test_parameters_scoped_by_domain_and_parent() {
        let db = test_db().await;
        db.set_parameter("guid-1", "enclosure", "url", "https://a.example/x.mp3")
            .await
            .unwrap();
        db.set_parameter("guid-1", "enclosure", "mimetype", "audio/mpeg")
            .await
            .unwrap();
        db.set_parameter("guid-1", "feed", "replies_url", "https://a.example/c")
            .await
            .unwrap();
        db.set_parameter("guid-2", "enclosure", "url", "https://b.example/y.mp3")
            .await
            .unwrap();

        let enclosure = db.list_parameters("guid-1", "enclosure").await.unwrap();
        assert_eq!(
            enclosure,
            vec![
                ("mimetype".to_string(), "audio/mpeg".to_string()),
                ("url".to_string(), "https://a.example/x.mp3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_parameter() {
        let db = test_db().await;
        db.set_parameter("guid-1", "enclosure", "duration", "60")
            .await
            .unwrap();

        assert!(db.delete_parameter("guid-1", "enclosure", "duration").await.unwrap());
        assert!(!db.delete_parameter("guid-1", "enclosure", "duration").await.unwrap());
        assert_eq!(
            db.get_parameter("guid-1", "enclosure", "duration").await.unwrap(),
            None
        );
    }
}
