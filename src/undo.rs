//! Single-slot undo for destructive record edits.

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::attendance::{ActionType, PreImage};
use crate::session::SessionContext;
use crate::store::RecordStore;

/// The one restorable action held while Armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub record_id: Uuid,
    pub pre_image: PreImage,
}

impl PendingAction {
    pub fn action_type(&self) -> ActionType {
        self.pre_image.action_type()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UndoState {
    #[default]
    Empty,
    Armed(PendingAction),
}

/// Result of a destructive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The store applied the edit and the undo slot now holds its pre-image.
    Applied(ActionType),
    /// Empty selection; nothing was sent to the store.
    NothingSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored(ActionType),
    NothingToUndo,
}

/// Empty/Armed state machine over the store's destructive operations.
///
/// Every operation takes `&mut self`, so a client can only have one of them
/// in flight at a time. A failed call leaves the state untouched.
#[derive(Debug, Default)]
pub struct UndoController {
    state: UndoState,
}

impl UndoController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UndoState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, UndoState::Armed(_))
    }

    fn arm(&mut self, record_id: Uuid, pre_image: PreImage) {
        if let UndoState::Armed(previous) = &self.state {
            debug!(record_id = %previous.record_id, "Overwriting pending undo");
        }
        self.state = UndoState::Armed(PendingAction {
            record_id,
            pre_image,
        });
    }

    /// Deletes date columns and arms undo with the removed slice. A delete
    /// that removed nothing is a rejection and keeps the armed action.
    pub async fn delete_columns<S: RecordStore>(
        &mut self,
        store: &S,
        session: &SessionContext,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<EditOutcome, StoreError> {
        if dates.is_empty() {
            return Ok(EditOutcome::NothingSelected);
        }

        let removed = store.delete_date_columns(session, record_id, dates).await?;
        if removed.dates.is_empty() {
            return Err(StoreError::Rejected(
                "None of the selected dates are columns of this record".into(),
            ));
        }
        info!(%record_id, columns = removed.dates.len(), "Date columns deleted");
        self.arm(record_id, PreImage::Delete(removed));
        Ok(EditOutcome::Applied(ActionType::Delete))
    }

    /// Resets the record and arms undo with its prior snapshot.
    pub async fn reset<S: RecordStore>(
        &mut self,
        store: &S,
        session: &SessionContext,
        record_id: Uuid,
    ) -> Result<EditOutcome, StoreError> {
        let snapshot = store.reset_record(session, record_id).await?;
        info!(%record_id, "Attendance reset");
        self.arm(record_id, PreImage::Reset(snapshot));
        Ok(EditOutcome::Applied(ActionType::Reset))
    }

    /// Replays the armed pre-image. While Empty this reports
    /// [`UndoOutcome::NothingToUndo`] without touching the store. If the
    /// restore fails the action stays armed.
    pub async fn undo<S: RecordStore>(
        &mut self,
        store: &S,
        session: &SessionContext,
    ) -> Result<UndoOutcome, StoreError> {
        let UndoState::Armed(pending) = &self.state else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        store
            .restore(session, pending.record_id, &pending.pre_image)
            .await?;

        let action = pending.action_type();
        info!(record_id = %pending.record_id, ?action, "Action undone");
        self.state = UndoState::Empty;
        Ok(UndoOutcome::Restored(action))
    }
}
