use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    CreateRecord, CreateRecordResponse, DeleteItems, DeleteItemsResponse, RecordStore,
    ResetAttendance, ResetAttendanceResponse, UndoAction,
};
use crate::config::Config;
use crate::error::StoreError;
use crate::model::attendance::{
    AttendanceRecord, PreImage, RecordFilter, RecordSnapshot, RemovedColumns,
};
use crate::model::teaching::TeachingAssignment;
use crate::session::SessionContext;

/// Store that talks to the remote authority over HTTP.
///
/// Each call is bounded by the client timeout and never retried; a failed
/// call is reported to the caller, who decides whether to try again.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(config.authority_url.clone(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        session: &SessionContext,
        request: RequestBuilder,
        record_id: Option<Uuid>,
    ) -> Result<T, StoreError> {
        let bearer = session.credential()?;
        let response = request.bearer_auth(bearer).send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Network(format!("malformed response: {e}")));
        }

        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("message")
                    .or_else(|| body.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| status.to_string());

        warn!(%status, %message, "Authority call failed");
        Err(classify(status, message, record_id))
    }
}

/// Maps a non-success status onto the error taxonomy.
fn classify(status: StatusCode, message: String, record_id: Option<Uuid>) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth(message),
        StatusCode::NOT_FOUND => match record_id {
            Some(id) => StoreError::RecordNotFound(id),
            None => StoreError::Rejected(message),
        },
        s if s.is_client_error() && s != StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Rejected(message)
        }
        s => StoreError::Network(format!("{s}: {message}")),
    }
}

impl RecordStore for HttpStore {
    async fn create_or_append_record(
        &self,
        session: &SessionContext,
        request: &CreateRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        debug!(subject = %request.key.subject, "POST create-record");
        let req = self
            .client
            .post(self.url("/attendance/create-record"))
            .json(request);
        let response: CreateRecordResponse = self.send(session, req, None).await?;
        Ok(response.record)
    }

    async fn get_records(
        &self,
        session: &SessionContext,
        filter: &RecordFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let req = self
            .client
            .get(self.url("/attendance/records"))
            .query(filter);
        self.send(session, req, None).await
    }

    async fn delete_date_columns(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<RemovedColumns, StoreError> {
        let body = DeleteItems {
            record_id,
            date_keys: dates.to_vec(),
        };
        let req = self
            .client
            .put(self.url("/attendance/delete-items"))
            .json(&body);
        let response: DeleteItemsResponse = self.send(session, req, Some(record_id)).await?;
        Ok(response.removed)
    }

    async fn reset_record(
        &self,
        session: &SessionContext,
        record_id: Uuid,
    ) -> Result<RecordSnapshot, StoreError> {
        let req = self
            .client
            .put(self.url("/attendance/reset-attendance"))
            .json(&ResetAttendance { record_id });
        let response: ResetAttendanceResponse = self.send(session, req, Some(record_id)).await?;
        Ok(response.original_data)
    }

    async fn restore(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        pre_image: &PreImage,
    ) -> Result<(), StoreError> {
        let body = UndoAction {
            record_id,
            pre_image: pre_image.clone(),
        };
        let req = self
            .client
            .post(self.url("/attendance/undo-action"))
            .json(&body);
        let _ack: serde_json::Value = self.send(session, req, Some(record_id)).await?;
        Ok(())
    }

    async fn teaching_details(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<TeachingAssignment>, StoreError> {
        let req = self.client.get(self.url("/user/teaching-details"));
        self.send(session, req, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_taxonomy() {
        let id = Uuid::new_v4();
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "x".into(), None),
            StoreError::Auth(_)
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, "x".into(), Some(id)),
            StoreError::Auth(_)
        ));
        assert_eq!(
            classify(StatusCode::NOT_FOUND, "x".into(), Some(id)),
            StoreError::RecordNotFound(id)
        );
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "x".into(), Some(id)),
            StoreError::Rejected(_)
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, "x".into(), None),
            StoreError::Network(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "x".into(), None),
            StoreError::Network(_)
        ));
    }

    #[tokio::test]
    async fn invalidated_session_never_reaches_the_network() {
        // nothing listens here; an attempted request would be a Network error
        let store = HttpStore::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let session = SessionContext::new("token", "teacher");
        session.invalidate();

        let err = store
            .get_records(&session, &RecordFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = HttpStore::new("http://localhost:4200/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.url("/attendance/records"),
            "http://localhost:4200/api/attendance/records"
        );
    }
}
