// Change notifications published by the store so other views of a squad can
// refresh.

use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging.
pub(crate) const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Squad,
    FixedGroups,
    DivisionSaved { division_id: String },
    DivisionDeleted { division_id: String },
    PairHistory,
    HistoryCleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub squad_id: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(squad_id: &str, kind: ChangeKind) -> Self {
        ChangeEvent {
            squad_id: squad_id.to_string(),
            kind,
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<ChangeEvent> {
    broadcast::channel(CHANNEL_CAPACITY).0
}
