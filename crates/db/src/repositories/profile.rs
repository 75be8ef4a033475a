use async_trait::async_trait;
use chrono::Utc;

use routetracker_core::directory::{DirectoryError, ProfileDirectory};
use routetracker_core::domain::profile::Profile;
use routetracker_core::domain::voucher::PrincipalId;

use super::{decode_column, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlProfileDirectory {
    pool: DbPool,
}

impl SqlProfileDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, profile: &Profile) -> Result<(), RepositoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO profiles (user_id, email, full_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 email = excluded.email,
                 full_name = excluded.full_name,
                 updated_at = excluded.updated_at",
        )
        .bind(&profile.user_id.0)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for SqlProfileDirectory {
    async fn profile(&self, user_id: &PrincipalId) -> Result<Option<Profile>, DirectoryError> {
        let row = sqlx::query("SELECT user_id, email, full_name FROM profiles WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: String = decode_column(&row, "user_id")?;
        let email: String = decode_column(&row, "email")?;
        let full_name: Option<String> = decode_column(&row, "full_name")?;

        Ok(Some(Profile { user_id: PrincipalId(user_id), email, full_name }))
    }

    async fn record_contact(
        &self,
        user_id: &PrincipalId,
        email: &str,
    ) -> Result<(), DirectoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO profiles (user_id, email, full_name, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 email = excluded.email,
                 updated_at = excluded.updated_at
             WHERE profiles.email <> excluded.email",
        )
        .bind(&user_id.0)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use routetracker_core::directory::ProfileDirectory;
    use routetracker_core::domain::profile::Profile;
    use routetracker_core::domain::voucher::PrincipalId;

    use super::SqlProfileDirectory;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn upsert_replaces_contact_details() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let directory = SqlProfileDirectory::new(pool);
        let user_id = PrincipalId("emp-1".to_string());

        assert_eq!(directory.profile(&user_id).await.expect("lookup"), None);

        let mut profile = Profile {
            user_id: user_id.clone(),
            email: "dana@example.com".to_string(),
            full_name: None,
        };
        directory.upsert(&profile).await.expect("insert");
        profile.full_name = Some("Dana Reyes".to_string());
        directory.upsert(&profile).await.expect("update");

        let found = directory.profile(&user_id).await.expect("lookup").expect("present");
        assert_eq!(found, profile);
        assert_eq!(found.display_name(), "Dana Reyes");
    }

    #[tokio::test]
    async fn recorded_contacts_update_email_and_keep_the_name() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let directory = SqlProfileDirectory::new(pool);
        let user_id = PrincipalId("emp-1".to_string());

        directory.record_contact(&user_id, "dana@example.com").await.expect("record");
        let recorded = directory.profile(&user_id).await.expect("lookup").expect("present");
        assert_eq!(recorded.email, "dana@example.com");
        assert_eq!(recorded.full_name, None);

        directory
            .upsert(&Profile {
                user_id: user_id.clone(),
                email: "dana@example.com".to_string(),
                full_name: Some("Dana Reyes".to_string()),
            })
            .await
            .expect("name");
        directory.record_contact(&user_id, "dana.reyes@example.com").await.expect("re-record");

        let found = directory.profile(&user_id).await.expect("lookup").expect("present");
        assert_eq!(found.email, "dana.reyes@example.com");
        assert_eq!(found.full_name.as_deref(), Some("Dana Reyes"));
    }
}
