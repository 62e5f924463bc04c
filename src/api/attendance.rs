use crate::auth::auth::AuthUser;
use crate::db::RecordBook;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceRecord, RecordFilter};
use crate::model::role::Role;
use crate::store::{
    CreateRecord, CreateRecordResponse, DeleteItems, DeleteItemsResponse, MarkPresence,
    ResetAttendance, ResetAttendanceResponse, UndoAction,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;

/// Maps a record book refusal onto its HTTP answer.
fn refusal(e: StoreError) -> HttpResponse {
    match e {
        StoreError::RecordNotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
            "message": e.to_string()
        })),
        StoreError::Rejected(message) => HttpResponse::BadRequest().json(serde_json::json!({
            "message": message
        })),
        StoreError::Auth(message) => HttpResponse::Forbidden().json(serde_json::json!({
            "message": message
        })),
        StoreError::Network(message) => {
            tracing::error!(error = %message, "Record book failure");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "message": "Internal Server Error"
            }))
        }
    }
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/api/attendance/records",
    params(RecordFilter),
    responses(
        (status = 200, description = "Records matching the filter", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn records(
    _auth: AuthUser,
    book: web::Data<RecordBook>,
    query: web::Query<RecordFilter>,
) -> actix_web::Result<impl Responder> {
    let records = book.records(&query.into_inner()).await;
    Ok(HttpResponse::Ok().json(records))
}

/// Create a record for the key or append today's date column to it,
/// opening the scan window when one is given
#[utoipa::path(
    post,
    path = "/api/attendance/create-record",
    request_body = CreateRecord,
    responses(
        (status = 200, description = "Record created or updated", body = CreateRecordResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a teacher of this class", body = Object, example = json!({
            "message": "You do not teach this class"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[tracing::instrument(skip_all, fields(user = %auth.username))]
pub async fn create_record(
    auth: AuthUser,
    book: web::Data<RecordBook>,
    payload: web::Json<CreateRecord>,
) -> actix_web::Result<impl Responder> {
    auth.require_teacher()?;

    // admins may open any class
    if auth.role == Role::Teacher {
        let assigned = book.teaching_details(&auth.username).await;
        if !assigned.iter().any(|a| a.covers(&payload.key)) {
            tracing::warn!(user = %auth.username, subject = %payload.key.subject, "Class not assigned");
            return Ok(HttpResponse::Forbidden().json(serde_json::json!({
                "message": "You do not teach this class"
            })));
        }
    }

    let record = book
        .create_or_append(&payload, Utc::now().date_naive())
        .await;

    tracing::info!(user = %auth.username, record_id = %record.id, "Attendance record created/updated");
    Ok(HttpResponse::Ok().json(CreateRecordResponse { record }))
}

/// Delete date columns from a record
#[utoipa::path(
    put,
    path = "/api/attendance/delete-items",
    request_body = DeleteItems,
    responses(
        (status = 200, description = "Columns removed", body = DeleteItemsResponse),
        (status = 400, description = "Nothing selected", body = Object, example = json!({
            "message": "No date columns selected"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[tracing::instrument(skip_all, fields(user = %auth.username))]
pub async fn delete_items(
    auth: AuthUser,
    book: web::Data<RecordBook>,
    payload: web::Json<DeleteItems>,
) -> actix_web::Result<impl Responder> {
    auth.require_teacher()?;

    match book
        .delete_date_columns(payload.record_id, &payload.date_keys)
        .await
    {
        Ok(removed) => Ok(HttpResponse::Ok().json(DeleteItemsResponse {
            message: "Selected items deleted".to_string(),
            removed,
        })),
        Err(e) => Ok(refusal(e)),
    }
}

/// Clear every status of a record, keeping its columns and roster
#[utoipa::path(
    put,
    path = "/api/attendance/reset-attendance",
    request_body = ResetAttendance,
    responses(
        (status = 200, description = "Record reset", body = ResetAttendanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[tracing::instrument(skip_all, fields(user = %auth.username))]
pub async fn reset_attendance(
    auth: AuthUser,
    book: web::Data<RecordBook>,
    payload: web::Json<ResetAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_teacher()?;

    match book.reset(payload.record_id).await {
        Ok(original_data) => Ok(HttpResponse::Ok().json(ResetAttendanceResponse {
            message: "Attendance sheet reset".to_string(),
            original_data,
        })),
        Err(e) => Ok(refusal(e)),
    }
}

/// Re-apply the pre-image captured by a delete or reset
#[utoipa::path(
    post,
    path = "/api/attendance/undo-action",
    request_body(content = Object, example = json!({
        "recordId": "5f1c0a4e-8d43-4d6a-9c51-0c2a6f1d2b11",
        "actionType": "delete",
        "originalData": { "dates": ["2024-01-01"], "statuses": {} }
    })),
    responses(
        (status = 200, description = "Action undone", body = Object, example = json!({
            "message": "Action undone successfully"
        })),
        (status = 400, description = "Malformed pre-image"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[tracing::instrument(skip_all, fields(user = %auth.username))]
pub async fn undo_action(
    auth: AuthUser,
    book: web::Data<RecordBook>,
    payload: web::Json<UndoAction>,
) -> actix_web::Result<impl Responder> {
    auth.require_teacher()?;

    match book.restore(payload.record_id, &payload.pre_image).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Action undone successfully"
        }))),
        Err(e) => Ok(refusal(e)),
    }
}

/// Student scan of a displayed session token
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body = MarkPresence,
    responses(
        (status = 200, description = "Presence marked", body = Object, example = json!({
            "message": "Attendance marked",
            "date": "2024-01-01"
        })),
        (status = 400, description = "No open session, superseded or expired token", body = Object, example = json!({
            "message": "Session token expired"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark(
    auth: AuthUser,
    book: web::Data<RecordBook>,
    payload: web::Json<MarkPresence>,
) -> actix_web::Result<impl Responder> {
    match book.mark_presence(&payload, Utc::now()).await {
        Ok(date) => {
            tracing::info!(user = %auth.username, roll_no = %payload.roll_no, %date, "Attendance marked");
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Attendance marked",
                "date": date
            })))
        }
        Err(e) => Ok(refusal(e)),
    }
}
