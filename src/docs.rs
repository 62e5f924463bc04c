use crate::model::attendance::{AttendanceRecord, RecordFilter, RecordKey, Status, Student};
use crate::model::teaching::TeachingAssignment;
use crate::store::{
    CreateRecord, CreateRecordResponse, DeleteItems, DeleteItemsResponse, MarkPresence,
    ResetAttendance, ResetAttendanceResponse,
};
use crate::token::SessionWindow;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "QR Attendance API",
        version = "1.0.0",
        description = r#"
## QR Attendance Authority

Reference authority for QR-code based class attendance.

### 🔹 Key Features
- **Sessions**
  - Open a time-boxed scan window per class and append the day's column
- **Scans**
  - Students mark presence while the window is open
- **Sheets**
  - List, delete date columns, reset, and undo the last destructive edit

### 🔐 Security
Every endpoint expects a **JWT Bearer** access token.
Opening sessions and editing sheets require the **Teacher** or **Admin** role.

---
Built with **Rust**, **Actix Web**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::records,
        crate::api::attendance::create_record,
        crate::api::attendance::delete_items,
        crate::api::attendance::reset_attendance,
        crate::api::attendance::undo_action,
        crate::api::attendance::mark,

        crate::api::teaching::teaching_details,

        crate::auth::handlers::logout
    ),
    components(
        schemas(
            AttendanceRecord,
            RecordKey,
            RecordFilter,
            Status,
            Student,
            TeachingAssignment,
            SessionWindow,
            CreateRecord,
            CreateRecordResponse,
            DeleteItems,
            DeleteItemsResponse,
            ResetAttendance,
            ResetAttendanceResponse,
            MarkPresence
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance session and sheet APIs"),
        (name = "User", description = "Instructor profile APIs"),
        (name = "Auth", description = "Token lifecycle APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
