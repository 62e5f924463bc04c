//! The attendance record store contract and its adapters.

mod http;
mod local;

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::attendance::{
    AttendanceRecord, PreImage, RecordFilter, RecordKey, RecordSnapshot, RemovedColumns,
};
use crate::model::teaching::TeachingAssignment;
use crate::session::SessionContext;
use crate::token::SessionWindow;

pub use http::HttpStore;
pub use local::InProcessStore;

/// Operations the client core needs from the attendance authority.
///
/// Every call takes the caller's [`SessionContext`] explicitly.
pub trait RecordStore: Send + Sync {
    /// Idempotent per (key, date): a repeated date never adds a second column.
    fn create_or_append_record(
        &self,
        session: &SessionContext,
        request: &CreateRecord,
    ) -> impl Future<Output = Result<AttendanceRecord, StoreError>> + Send;

    fn get_records(
        &self,
        session: &SessionContext,
        filter: &RecordFilter,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, StoreError>> + Send;

    /// Returns the removed slice so it can be restored later.
    fn delete_date_columns(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> impl Future<Output = Result<RemovedColumns, StoreError>> + Send;

    /// Returns the snapshot taken before clearing.
    fn reset_record(
        &self,
        session: &SessionContext,
        record_id: Uuid,
    ) -> impl Future<Output = Result<RecordSnapshot, StoreError>> + Send;

    fn restore(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        pre_image: &PreImage,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn teaching_details(
        &self,
        session: &SessionContext,
    ) -> impl Future<Output = Result<Vec<TeachingAssignment>, StoreError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecord {
    #[serde(flatten)]
    pub key: RecordKey,
    /// Date column to append; the authority's current date when absent.
    #[schema(example = "2024-01-01", value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    /// Scan window to open for this key.
    pub session: Option<SessionWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRecordResponse {
    pub record: AttendanceRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItems {
    #[schema(value_type = String)]
    pub record_id: Uuid,
    #[schema(value_type = Vec<String>, example = json!(["2024-01-01"]))]
    pub date_keys: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteItemsResponse {
    pub message: String,
    #[schema(value_type = Object)]
    pub removed: RemovedColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetAttendance {
    #[schema(value_type = String)]
    pub record_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetAttendanceResponse {
    pub message: String,
    #[schema(value_type = Object)]
    pub original_data: RecordSnapshot,
}

/// `{recordId, actionType, originalData}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoAction {
    pub record_id: Uuid,
    #[serde(flatten)]
    pub pre_image: PreImage,
}

/// A student's scan of a displayed session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkPresence {
    #[schema(value_type = String)]
    pub token_id: Uuid,
    #[serde(flatten)]
    pub key: RecordKey,
    #[schema(example = "CS-A-07")]
    pub roll_no: String,
    #[schema(example = "Meera Joshi")]
    pub name: String,
}
