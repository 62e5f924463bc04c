use crate::auth::auth::AuthUser;
use crate::db::RecordBook;
use crate::model::teaching::TeachingAssignment;
use actix_web::{HttpResponse, Responder, web};

/// Classes the caller teaches
#[utoipa::path(
    get,
    path = "/api/user/teaching-details",
    responses(
        (status = 200, description = "Teaching assignments of the caller", body = [TeachingAssignment]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "User"
)]
pub async fn teaching_details(
    auth: AuthUser,
    book: web::Data<RecordBook>,
) -> actix_web::Result<impl Responder> {
    let details = book.teaching_details(&auth.username).await;
    Ok(HttpResponse::Ok().json(details))
}
