//! Mutation intents and their speculative application.
//!
//! An intent is the pure description of one edit; applying it to a snapshot
//! yields the speculative snapshot the UI shows while the gateway call is in
//! flight. Application never touches the input snapshot.

use std::sync::Arc;

use crate::itinerary::types::{CollectionSnapshot, RecordFields, RecordId, TempId};

/// One user edit, from creation at the call site to resolution (commit or
/// rollback). Never persisted.
#[derive(Debug, Clone)]
pub enum MutationIntent {
  /// New record, displayed under a temporary id until the gateway assigns
  /// the real one.
  Create { fields: RecordFields, temp_id: TempId },
  Update { id: RecordId, fields: RecordFields },
  Delete { id: RecordId },
}

impl MutationIntent {
  /// Compute the speculative snapshot. Updating or deleting an id that is
  /// not in the snapshot leaves the items unchanged; the gateway call that
  /// follows decides whether the id was real.
  pub fn apply_to(&self, snapshot: &CollectionSnapshot) -> CollectionSnapshot {
    let mut next = snapshot.clone();
    match self {
      MutationIntent::Create { fields, temp_id } => {
        next
          .items
          .push(fields.to_record(RecordId::Pending(*temp_id)));
      }
      MutationIntent::Update { id, fields } => {
        if let Some(record) = next.items.iter_mut().find(|r| &r.id == id) {
          fields.apply_to(record);
        }
      }
      MutationIntent::Delete { id } => {
        next.items.retain(|r| &r.id != id);
      }
    }
    next
  }
}

/// Book-keeping for one in-flight mutation: the pre-mutation snapshot for
/// rollback and, for creates, the placeholder id to swap once the gateway
/// answers. Dropped at resolution.
pub struct PendingMutation {
  pub previous: Arc<CollectionSnapshot>,
  pub temp_id: Option<TempId>,
}
