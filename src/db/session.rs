use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::middleware::AuthenticatedUser;

/// Caller identity as row-level security policies see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    Anonymous,
    User { user_id: String, email: String },
}

impl SessionIdentity {
    pub fn claims_json(&self) -> String {
        match self {
            SessionIdentity::Anonymous => serde_json::json!({ "role": "anon" }).to_string(),
            SessionIdentity::User { user_id, email } => serde_json::json!({
                "sub": user_id,
                "email": email,
                "role": "authenticated",
            })
            .to_string(),
        }
    }
}

impl From<&AuthenticatedUser> for SessionIdentity {
    fn from(user: &AuthenticatedUser) -> Self {
        SessionIdentity::User {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
        }
    }
}

/// Sets `request.jwt.claims` for the current transaction only.
pub async fn set_request_claims(
    conn: &mut PgConnection,
    identity: &SessionIdentity,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
        .bind(identity.claims_json())
        .execute(conn)
        .await?;
    Ok(())
}

/// Opens a transaction that carries the caller's claims.
/// The setting ends with the transaction, so pooled connections never leak it.
pub async fn begin_as(
    pool: &PgPool,
    identity: &SessionIdentity,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    set_request_claims(&mut tx, identity).await?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_json() {
        let anon: serde_json::Value =
            serde_json::from_str(&SessionIdentity::Anonymous.claims_json()).unwrap();
        assert_eq!(anon["role"], "anon");

        let user = SessionIdentity::User {
            user_id: "0b0e".into(),
            email: "ana@chipindo.gov.ao".into(),
        };
        let claims: serde_json::Value = serde_json::from_str(&user.claims_json()).unwrap();
        assert_eq!(claims["sub"], "0b0e");
        assert_eq!(claims["role"], "authenticated");
    }
}
