use anyhow::Result;

use super::schema::Database;
use super::types::{NewPerson, Person};

const PERSON_COLUMNS: &str = "id, guid, username, email, firstname, lastname";

impl Database {
    // ========================================================================
    // Person Operations
    // ========================================================================

    /// Create a person with a fresh guid
    pub async fn create_person(&self, person: &NewPerson) -> Result<Person> {
        let guid = uuid::Uuid::new_v4().to_string();
        let created = sqlx::query_as::<_, Person>(&format!(
            "INSERT INTO persons (guid, username, email, firstname, lastname) VALUES (?, ?, ?, ?, ?) RETURNING {PERSON_COLUMNS}"
        ))
        .bind(&guid)
        .bind(&person.username)
        .bind(&person.email)
        .bind(&person.firstname)
        .bind(&person.lastname)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn get_person(&self, person_id: i64) -> Result<Option<Person>> {
        let person = sqlx::query_as::<_, Person>(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?"
        ))
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(person)
    }

    /// First person (lowest id) with this exact email
    pub async fn find_person_by_email(&self, email: &str) -> Result<Option<Person>> {
        let person = sqlx::query_as::<_, Person>(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE email = ? ORDER BY id LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(person)
    }

    pub async fn find_person_by_username(&self, username: &str) -> Result<Option<Person>> {
        let person = sqlx::query_as::<_, Person>(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(person)
    }

    /// First person (lowest id) with this exact first and last name
    pub async fn find_person_by_name(
        &self,
        firstname: &str,
        lastname: &str,
    ) -> Result<Option<Person>> {
        let person = sqlx::query_as::<_, Person>(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE firstname = ? AND lastname = ? ORDER BY id LIMIT 1"
        ))
        .bind(firstname)
        .bind(lastname)
        .fetch_optional(&self.pool)
        .await?;
        Ok(person)
    }
}
