//! C10 — Suppression List (§4.10): a denylist of recipients that must
//! never be sent to again, populated automatically on permanent provider
//! failures and consulted synchronously by the enqueue API.

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

use crate::error::EngineError;

pub struct SuppressionList<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SuppressionList<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn is_suppressed(&self, email: &str) -> Result<bool, EngineError> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "SELECT 1 as present FROM email_suppression WHERE email = $1",
                [email.into()],
            ))
            .await?;
        Ok(row.is_some())
    }

    pub async fn suppress(&self, email: &str, reason: &str) -> Result<(), EngineError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                r#"INSERT INTO email_suppression (email, reason, created_at)
                   VALUES ($1, $2, now())
                   ON CONFLICT (email) DO NOTHING"#,
                [email.into(), reason.into()],
            ))
            .await?;
        Ok(())
    }

    pub async fn unsuppress(&self, email: &str) -> Result<(), EngineError> {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "DELETE FROM email_suppression WHERE email = $1",
                [email.into()],
            ))
            .await?;
        Ok(())
    }
}
