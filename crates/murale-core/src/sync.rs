//! Optimistic mutation pipeline and remote-change intake.
//!
//! Local edits land in the store immediately, persistence runs as
//! host-driven commands, and the same logical change arriving back over
//! the row feed or the peer channel is absorbed idempotently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{
    Element, ElementId, ElementPatch, ElementRow, TimestampMs, UserId, now_ms,
};
use crate::repo::StoreError;
use crate::store::BoardStore;

/// Peer-channel payloads. Creates and updates carry the full row so a
/// late joiner's first sight of an element is complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardMessage {
    /// A freshly persisted element.
    ElementAdded { element: ElementRow },
    /// An element after a persisted mutation.
    ElementUpdated { element: ElementRow },
    /// An element removed from the board.
    ElementDeleted { id: ElementId },
    /// Pointer position in world coordinates.
    Cursor { x: f64, y: f64 },
}

/// A board message with its sender and send time, as it travels the wire.
/// The timestamp feeds peer latency sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: UserId,
    pub sent_at_ms: TimestampMs,
    #[serde(flatten)]
    pub body: BoardMessage,
}

/// Authoritative row-feed events, already filtered to this board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowChange {
    Inserted { row: ElementRow },
    Updated { row: ElementRow },
    Deleted { id: ElementId },
}

/// One logical remote change, whichever transport delivered it.
#[derive(Debug, Clone)]
enum RemoteChange {
    Added(ElementRow),
    Updated(ElementRow),
    Deleted(ElementId),
}

/// A persistence call for the host to run against its [`ElementRepo`],
/// correlated back through `seq`.
///
/// [`ElementRepo`]: crate::repo::ElementRepo
#[derive(Debug, Clone)]
pub struct StoreCommand {
    pub seq: u64,
    pub op: StoreOp,
}

#[derive(Debug, Clone)]
pub enum StoreOp {
    Insert(ElementRow),
    Update { id: ElementId, patch: ElementPatch },
    Delete { id: ElementId },
}

/// Completion of a [`StoreCommand`], fed back by the host.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Insert succeeded; carries the server-assigned row.
    Inserted { seq: u64, row: ElementRow },
    /// Update or delete succeeded.
    Completed { seq: u64 },
    Failed { seq: u64, error: StoreError },
}

/// What applying an outcome did, for the caller to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    None,
    /// A temporary id was swapped for its server id.
    CreateConfirmed { temp_id: ElementId, id: ElementId },
    /// A failed create was removed again.
    CreateRolledBack { temp_id: ElementId },
    /// An update or delete failed to persist; the board needs a reload.
    ReloadRequired,
}

/// What a peer-channel envelope turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastIntake {
    /// An element change was applied (or deduplicated away).
    Applied { changed: bool },
    /// A peer cursor moved.
    Cursor {
        user: UserId,
        x: f64,
        y: f64,
        sent_at_ms: TimestampMs,
    },
    /// Our own message echoed back; ignored.
    OwnEcho,
}

#[derive(Debug, Clone, Copy)]
enum PendingOp {
    Create { temp_id: ElementId },
    Update { id: ElementId },
    Delete { id: ElementId },
}

/// Reconciles local optimistic mutations with persistence outcomes and
/// remote deliveries.
///
/// The flow per local mutation: apply to the store, queue a
/// [`StoreCommand`], and once the host reports success, queue the peer
/// broadcast. A failed create rolls back; a failed update or delete
/// latches [`reload_required`](Self::reload_required) because the local
/// state can no longer be trusted against the store of record.
pub struct SyncReconciler {
    user_id: UserId,
    next_seq: u64,
    pending: HashMap<u64, PendingOp>,
    /// Updates against ids still waiting on their insert; sent under the
    /// server id once the create confirms.
    deferred_updates: HashMap<ElementId, ElementPatch>,
    commands: Vec<StoreCommand>,
    broadcasts: Vec<Envelope>,
    reload_required: bool,
}

impl SyncReconciler {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            next_seq: 0,
            pending: HashMap::new(),
            deferred_updates: HashMap::new(),
            commands: Vec::new(),
            broadcasts: Vec::new(),
            reload_required: false,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Apply a local create optimistically and queue its insert. The
    /// element keeps its temporary id until the outcome arrives.
    pub fn created_local(&mut self, store: &mut BoardStore, element: Element) {
        let row = ElementRow::from_element(&element);
        let temp_id = element.id;
        store.insert(element);
        let seq = self.push_command(StoreOp::Insert(row));
        self.pending.insert(seq, PendingOp::Create { temp_id });
    }

    /// Apply a local update optimistically and queue its persist call.
    /// Returns false when the patch is empty or the id is unknown. Updates
    /// to an element whose create is still in flight are applied locally
    /// and held back until the server id is known.
    pub fn updated_local(
        &mut self,
        store: &mut BoardStore,
        id: ElementId,
        patch: ElementPatch,
    ) -> bool {
        if patch.is_empty() || !store.merge_patch(id, &patch) {
            return false;
        }
        if self.is_unconfirmed_temp(id) {
            self.deferred_updates.entry(id).or_default().merge(patch);
            return true;
        }
        let seq = self.push_command(StoreOp::Update { id, patch });
        self.pending.insert(seq, PendingOp::Update { id });
        true
    }

    /// Apply a local delete optimistically and queue its persist call.
    /// Deleting an element still waiting on its create queues nothing:
    /// the server never learned the temporary id, and the eventual
    /// insert response is dropped on arrival.
    pub fn deleted_local(&mut self, store: &mut BoardStore, id: ElementId) -> bool {
        if store.remove(id).is_none() {
            return false;
        }
        if self.is_unconfirmed_temp(id) {
            log::debug!("deleted element {id} before its create confirmed");
            self.deferred_updates.remove(&id);
            return true;
        }
        let seq = self.push_command(StoreOp::Delete { id });
        self.pending.insert(seq, PendingOp::Delete { id });
        true
    }

    /// Queue a cursor broadcast. Throttling is the caller's business.
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.broadcast(BoardMessage::Cursor { x, y });
    }

    /// Fold a persistence outcome back into the store.
    pub fn apply_outcome(&mut self, store: &mut BoardStore, outcome: CommandOutcome) -> SyncEffect {
        match outcome {
            CommandOutcome::Inserted { seq, row } => match self.pending.remove(&seq) {
                Some(PendingOp::Create { temp_id }) => {
                    let confirmed = row.clone().into_element();
                    let id = confirmed.id;
                    if store.replace_id(temp_id, confirmed) {
                        self.broadcast(BoardMessage::ElementAdded { element: row });
                        if let Some(patch) = self.deferred_updates.remove(&temp_id) {
                            let seq = self.push_command(StoreOp::Update { id, patch });
                            self.pending.insert(seq, PendingOp::Update { id });
                        }
                        SyncEffect::CreateConfirmed { temp_id, id }
                    } else {
                        // Deleted locally before the insert confirmed.
                        log::debug!("ignoring insert confirmation for vanished {temp_id}");
                        self.deferred_updates.remove(&temp_id);
                        SyncEffect::None
                    }
                }
                other => self.unexpected_outcome(seq, other),
            },
            CommandOutcome::Completed { seq } => match self.pending.remove(&seq) {
                Some(PendingOp::Update { id }) => {
                    if let Some(element) = store.get(id) {
                        let element = ElementRow::from_element(element);
                        self.broadcast(BoardMessage::ElementUpdated { element });
                    }
                    SyncEffect::None
                }
                Some(PendingOp::Delete { id }) => {
                    self.broadcast(BoardMessage::ElementDeleted { id });
                    SyncEffect::None
                }
                other => self.unexpected_outcome(seq, other),
            },
            CommandOutcome::Failed { seq, error } => match self.pending.remove(&seq) {
                Some(PendingOp::Create { temp_id }) => {
                    log::error!("create failed, rolling back {temp_id}: {error}");
                    store.remove(temp_id);
                    self.deferred_updates.remove(&temp_id);
                    SyncEffect::CreateRolledBack { temp_id }
                }
                Some(PendingOp::Update { id }) | Some(PendingOp::Delete { id }) => {
                    log::error!("persist failed for {id}, board reload required: {error}");
                    self.reload_required = true;
                    SyncEffect::ReloadRequired
                }
                None => {
                    log::warn!("outcome for unknown seq {seq}: {error}");
                    SyncEffect::None
                }
            },
        }
    }

    /// Absorb a peer-channel envelope.
    pub fn ingest_broadcast(
        &mut self,
        store: &mut BoardStore,
        envelope: Envelope,
    ) -> BroadcastIntake {
        if envelope.sender == self.user_id {
            return BroadcastIntake::OwnEcho;
        }
        let change = match envelope.body {
            BoardMessage::ElementAdded { element } => RemoteChange::Added(element),
            BoardMessage::ElementUpdated { element } => RemoteChange::Updated(element),
            BoardMessage::ElementDeleted { id } => RemoteChange::Deleted(id),
            BoardMessage::Cursor { x, y } => {
                return BroadcastIntake::Cursor {
                    user: envelope.sender,
                    x,
                    y,
                    sent_at_ms: envelope.sent_at_ms,
                };
            }
        };
        BroadcastIntake::Applied {
            changed: self.apply_remote(store, change),
        }
    }

    /// Absorb an authoritative row-feed event. Returns whether the store
    /// changed.
    pub fn ingest_row_change(&mut self, store: &mut BoardStore, change: RowChange) -> bool {
        let change = match change {
            RowChange::Inserted { row } => RemoteChange::Added(row),
            RowChange::Updated { row } => RemoteChange::Updated(row),
            RowChange::Deleted { id } => RemoteChange::Deleted(id),
        };
        self.apply_remote(store, change)
    }

    /// Single intake path for both transports. Every arm is a no-op on a
    /// second delivery of the same logical state.
    fn apply_remote(&mut self, store: &mut BoardStore, change: RemoteChange) -> bool {
        match change {
            RemoteChange::Added(row) => store.insert(row.into_element()),
            RemoteChange::Updated(row) => store.replace_element(row.into_element()),
            RemoteChange::Deleted(id) => store.remove(id).is_some(),
        }
    }

    /// Drain queued persistence commands for the host to execute.
    pub fn take_commands(&mut self) -> Vec<StoreCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Drain queued peer broadcasts for the host to send.
    pub fn take_broadcasts(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.broadcasts)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Set once an update or delete fails to persist; cleared by
    /// [`acknowledge_reload`](Self::acknowledge_reload) after the host
    /// refetches the board.
    pub fn reload_required(&self) -> bool {
        self.reload_required
    }

    pub fn acknowledge_reload(&mut self) {
        self.reload_required = false;
    }

    fn push_command(&mut self, op: StoreOp) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.commands.push(StoreCommand { seq, op });
        seq
    }

    fn broadcast(&mut self, body: BoardMessage) {
        self.broadcasts.push(Envelope {
            sender: self.user_id,
            sent_at_ms: now_ms(),
            body,
        });
    }

    fn is_unconfirmed_temp(&self, id: ElementId) -> bool {
        self.pending
            .values()
            .any(|op| matches!(op, PendingOp::Create { temp_id } if *temp_id == id))
    }

    fn unexpected_outcome(&mut self, seq: u64, pending: Option<PendingOp>) -> SyncEffect {
        match pending {
            None => {
                log::debug!("ignoring outcome for unknown seq {seq}");
            }
            Some(op) => {
                log::warn!("outcome kind mismatch for seq {seq}: {op:?}");
            }
        }
        SyncEffect::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementType;
    use uuid::Uuid;

    fn setup() -> (BoardStore, SyncReconciler, UserId) {
        let board = Uuid::new_v4();
        let user = Uuid::new_v4();
        (BoardStore::new(board), SyncReconciler::new(user), user)
    }

    fn sticky(store: &BoardStore, user: UserId) -> Element {
        Element::new(
            ElementType::Sticky,
            store.board_id(),
            10.0,
            20.0,
            160.0,
            120.0,
            user,
        )
    }

    fn confirmed_row(commands: &[StoreCommand]) -> (u64, ElementRow) {
        let StoreCommand { seq, op } = commands.last().expect("one command");
        let StoreOp::Insert(row) = op else {
            panic!("expected insert, got {op:?}");
        };
        let mut confirmed = row.clone();
        confirmed.id = Uuid::new_v4();
        (*seq, confirmed)
    }

    #[test]
    fn test_create_confirm_swaps_temp_id_and_broadcasts() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        assert!(store.contains(temp_id));
        assert!(sync.take_broadcasts().is_empty());

        let commands = sync.take_commands();
        let (seq, confirmed) = confirmed_row(&commands);
        let effect = sync.apply_outcome(
            &mut store,
            CommandOutcome::Inserted {
                seq,
                row: confirmed.clone(),
            },
        );
        assert_eq!(
            effect,
            SyncEffect::CreateConfirmed {
                temp_id,
                id: confirmed.id
            }
        );
        assert!(!store.contains(temp_id));
        assert!(store.contains(confirmed.id));

        let broadcasts = sync.take_broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].sender, user);
        assert!(matches!(
            &broadcasts[0].body,
            BoardMessage::ElementAdded { element } if element.id == confirmed.id
        ));
    }

    #[test]
    fn test_create_failure_rolls_back_without_broadcast() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        let seq = sync.take_commands()[0].seq;

        let effect = sync.apply_outcome(
            &mut store,
            CommandOutcome::Failed { seq, error: StoreError::Backend("down".into()) },
        );
        assert_eq!(effect, SyncEffect::CreateRolledBack { temp_id });
        assert!(store.is_empty());
        assert!(sync.take_broadcasts().is_empty());
        assert!(!sync.reload_required());
    }

    #[test]
    fn test_update_broadcasts_only_after_confirm() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let id = element.id;
        store.insert(element);

        assert!(sync.updated_local(&mut store, id, ElementPatch::move_to(99.0, 10.0)));
        assert_eq!(store.get(id).map(|e| e.x), Some(99.0));
        assert!(sync.take_broadcasts().is_empty());

        let seq = sync.take_commands()[0].seq;
        sync.apply_outcome(&mut store, CommandOutcome::Completed { seq });
        let broadcasts = sync.take_broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert!(matches!(
            &broadcasts[0].body,
            BoardMessage::ElementUpdated { element } if element.x == 99.0
        ));
    }

    #[test]
    fn test_empty_or_unknown_update_queues_nothing() {
        let (mut store, mut sync, _) = setup();
        assert!(!sync.updated_local(&mut store, Uuid::new_v4(), ElementPatch::move_to(1.0, 2.0)));
        let element = sticky(&store, sync.user_id());
        let id = element.id;
        store.insert(element);
        assert!(!sync.updated_local(&mut store, id, ElementPatch::default()));
        assert!(sync.take_commands().is_empty());
    }

    #[test]
    fn test_update_failure_latches_reload() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let id = element.id;
        store.insert(element);
        sync.updated_local(&mut store, id, ElementPatch::move_to(1.0, 1.0));
        let seq = sync.take_commands()[0].seq;

        let effect = sync.apply_outcome(
            &mut store,
            CommandOutcome::Failed { seq, error: StoreError::Backend("down".into()) },
        );
        assert_eq!(effect, SyncEffect::ReloadRequired);
        assert!(sync.reload_required());
        sync.acknowledge_reload();
        assert!(!sync.reload_required());
    }

    #[test]
    fn test_delete_broadcasts_after_confirm() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let id = element.id;
        store.insert(element);

        assert!(sync.deleted_local(&mut store, id));
        assert!(store.is_empty());
        let seq = sync.take_commands()[0].seq;
        sync.apply_outcome(&mut store, CommandOutcome::Completed { seq });
        assert!(matches!(
            &sync.take_broadcasts()[0].body,
            BoardMessage::ElementDeleted { id: deleted } if *deleted == id
        ));
    }

    #[test]
    fn test_update_of_unconfirmed_temp_defers_until_server_id() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        let commands = sync.take_commands();

        // Dragged before the insert confirms: local apply, no command yet.
        assert!(sync.updated_local(&mut store, temp_id, ElementPatch::move_to(50.0, 60.0)));
        assert!(sync.updated_local(&mut store, temp_id, ElementPatch::move_to(75.0, 60.0)));
        assert_eq!(store.get(temp_id).map(|e| e.x), Some(75.0));
        assert!(sync.take_commands().is_empty());

        let (seq, confirmed) = confirmed_row(&commands);
        sync.apply_outcome(&mut store, CommandOutcome::Inserted { seq, row: confirmed.clone() });
        let held = sync.take_commands();
        assert_eq!(held.len(), 1);
        let StoreOp::Update { id, patch } = &held[0].op else {
            panic!("expected deferred update, got {:?}", held[0].op);
        };
        assert_eq!(*id, confirmed.id);
        assert_eq!(patch.x, Some(75.0));
    }

    #[test]
    fn test_delete_of_unconfirmed_temp_queues_nothing() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        sync.take_commands();

        assert!(sync.deleted_local(&mut store, temp_id));
        assert!(sync.take_commands().is_empty());
        assert!(sync.take_broadcasts().is_empty());
    }

    #[test]
    fn test_late_insert_confirmation_for_deleted_temp_is_dropped() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        let commands = sync.take_commands();
        sync.deleted_local(&mut store, temp_id);

        let (seq, confirmed) = confirmed_row(&commands);
        let effect = sync.apply_outcome(
            &mut store,
            CommandOutcome::Inserted {
                seq,
                row: confirmed,
            },
        );
        assert_eq!(effect, SyncEffect::None);
        assert!(store.is_empty());
        assert!(sync.take_broadcasts().is_empty());
    }

    #[test]
    fn test_remote_add_is_deduped_by_id() {
        let (mut store, mut sync, _) = setup();
        let peer = Uuid::new_v4();
        let row = ElementRow::from_element(&sticky(&store, peer));
        let envelope = Envelope {
            sender: peer,
            sent_at_ms: now_ms(),
            body: BoardMessage::ElementAdded { element: row.clone() },
        };
        assert_eq!(
            sync.ingest_broadcast(&mut store, envelope.clone()),
            BroadcastIntake::Applied { changed: true }
        );
        // Same logical event again over the other channel.
        assert!(!sync.ingest_row_change(&mut store, RowChange::Inserted { row }));
        assert_eq!(
            sync.ingest_broadcast(&mut store, envelope),
            BroadcastIntake::Applied { changed: false }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remote_update_and_delete_are_idempotent() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let id = element.id;
        store.insert(element);

        let mut row = ElementRow::from_element(store.get(id).unwrap());
        row.x = 300.0;
        assert!(sync.ingest_row_change(&mut store, RowChange::Updated { row: row.clone() }));
        assert_eq!(store.get(id).map(|e| e.x), Some(300.0));

        assert!(sync.ingest_row_change(&mut store, RowChange::Deleted { id }));
        assert!(!sync.ingest_row_change(&mut store, RowChange::Deleted { id }));
        // Update for a now-missing id falls through.
        assert!(!sync.ingest_row_change(&mut store, RowChange::Updated { row }));
    }

    #[test]
    fn test_own_create_echo_beats_confirmation() {
        let (mut store, mut sync, user) = setup();
        let element = sticky(&store, user);
        let temp_id = element.id;
        sync.created_local(&mut store, element);
        let commands = sync.take_commands();
        let (seq, confirmed) = confirmed_row(&commands);

        // Row feed delivers the authoritative insert before our own
        // outcome does.
        assert!(sync.ingest_row_change(&mut store, RowChange::Inserted { row: confirmed.clone() }));
        assert_eq!(store.len(), 2);

        sync.apply_outcome(&mut store, CommandOutcome::Inserted { seq, row: confirmed.clone() });
        assert_eq!(store.len(), 1);
        assert!(store.contains(confirmed.id));
        assert!(!store.contains(temp_id));
    }

    #[test]
    fn test_cursor_intake_and_own_echo() {
        let (mut store, mut sync, user) = setup();
        let peer = Uuid::new_v4();
        let intake = sync.ingest_broadcast(
            &mut store,
            Envelope {
                sender: peer,
                sent_at_ms: 123,
                body: BoardMessage::Cursor { x: 4.0, y: 5.0 },
            },
        );
        assert_eq!(
            intake,
            BroadcastIntake::Cursor { user: peer, x: 4.0, y: 5.0, sent_at_ms: 123 }
        );

        let own = sync.ingest_broadcast(
            &mut store,
            Envelope {
                sender: user,
                sent_at_ms: 456,
                body: BoardMessage::Cursor { x: 0.0, y: 0.0 },
            },
        );
        assert_eq!(own, BroadcastIntake::OwnEcho);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let sender = Uuid::new_v4();
        let envelope = Envelope {
            sender,
            sent_at_ms: 1_000,
            body: BoardMessage::Cursor { x: 1.5, y: -2.0 },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "cursor");
        assert_eq!(json["sender"], sender.to_string());
        assert_eq!(json["sent_at_ms"], 1_000);

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert!(matches!(back.body, BoardMessage::Cursor { x, .. } if x == 1.5));
    }
}
