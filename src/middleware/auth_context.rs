use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::booking::Caller;
use crate::error::ApiError;
use crate::models::{role_is_staff, AppState};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: i16,
    pub session_token_id: Uuid,
    pub clinic_group_id: Option<Uuid>,
}

impl AuthContext {
    pub fn is_staff(&self) -> bool {
        role_is_staff(self.role)
    }

    pub fn caller(&self) -> Caller {
        Caller {
            is_staff: self.is_staff(),
            user_id: Some(self.user_id),
            clinic_group_id: self.clinic_group_id,
        }
    }

    /// Caller for staff-only endpoints.
    pub fn require_staff(&self) -> Result<Caller, ApiError> {
        if self.is_staff() {
            Ok(self.caller())
        } else {
            Err(ApiError::staff_only())
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    roles: i16,
    clinic_group_id: Option<Uuid>,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                <TypedHeader<Authorization<Bearer>> as FromRequestParts<AppState>>::from_request_parts(
                    parts, state,
                )
                .await
                .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
                r#"
                SELECT st.session_token_id, st.user_id, u.roles, u.clinic_group_id
                FROM session_token st
                JOIN app_user u ON u.user_id = st.user_id
                WHERE st.session_token_hash = $1
                  AND st.revoked_at IS NULL
                  AND st.expires_at > now()
                  AND u.is_active = true
                "#,
            )
            .bind(&token_hash)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
            .ok_or_else(ApiError::session_expired)?;

            // Touch last_seen_at (best-effort)
            let _ = sqlx::query(
                r#"
                UPDATE session_token
                SET last_seen_at = now()
                WHERE session_token_id = $1
                "#,
            )
            .bind(row.session_token_id)
            .execute(&state.db)
            .await;

            Ok(AuthContext {
                user_id: row.user_id,
                role: row.roles,
                session_token_id: row.session_token_id,
                clinic_group_id: row.clinic_group_id,
            })
        }
    }
}

/// Public endpoints take `Option<AuthContext>`: no header means anonymous,
/// a bad or expired token is still rejected.
impl OptionalFromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Option<Self>, Self::Rejection>> + Send {
        async move {
            if !parts.headers.contains_key(axum::http::header::AUTHORIZATION) {
                return Ok(None);
            }
            <AuthContext as FromRequestParts<AppState>>::from_request_parts(parts, state)
                .await
                .map(Some)
        }
    }
}

pub fn caller_of(auth: Option<&AuthContext>) -> Caller {
    auth.map(AuthContext::caller).unwrap_or_else(Caller::public)
}
