use crate::auth::auth::AuthUser;
use crate::utils::revoked_tokens;
use actix_web::{HttpResponse, Responder};

/// Revokes the presented access token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(auth: AuthUser) -> impl Responder {
    // idempotent
    revoked_tokens::revoke(&auth.jti).await;
    tracing::info!(user = %auth.username, "Logged out");
    HttpResponse::NoContent().finish()
}
