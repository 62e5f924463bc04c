use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{CreateRecord, RecordStore};
use crate::db::RecordBook;
use crate::error::StoreError;
use crate::model::attendance::{
    AttendanceRecord, PreImage, RecordFilter, RecordSnapshot, RemovedColumns,
};
use crate::model::teaching::TeachingAssignment;
use crate::session::SessionContext;

/// Store backed by a [`RecordBook`] living in the same process.
#[derive(Clone)]
pub struct InProcessStore {
    book: Arc<RecordBook>,
}

impl InProcessStore {
    pub fn new(book: Arc<RecordBook>) -> Self {
        Self { book }
    }
}

impl RecordStore for InProcessStore {
    async fn create_or_append_record(
        &self,
        session: &SessionContext,
        request: &CreateRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        session.credential()?;
        Ok(self
            .book
            .create_or_append(request, Utc::now().date_naive())
            .await)
    }

    async fn get_records(
        &self,
        session: &SessionContext,
        filter: &RecordFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        session.credential()?;
        Ok(self.book.records(filter).await)
    }

    async fn delete_date_columns(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<RemovedColumns, StoreError> {
        session.credential()?;
        self.book.delete_date_columns(record_id, dates).await
    }

    async fn reset_record(
        &self,
        session: &SessionContext,
        record_id: Uuid,
    ) -> Result<RecordSnapshot, StoreError> {
        session.credential()?;
        self.book.reset(record_id).await
    }

    async fn restore(
        &self,
        session: &SessionContext,
        record_id: Uuid,
        pre_image: &PreImage,
    ) -> Result<(), StoreError> {
        session.credential()?;
        self.book.restore(record_id, pre_image).await
    }

    async fn teaching_details(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<TeachingAssignment>, StoreError> {
        session.credential()?;
        Ok(self.book.teaching_details(session.username()).await)
    }
}
