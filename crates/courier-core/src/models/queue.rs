use std::cmp::Ordering;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct QueueRecordId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CreateIdentity,
    DisseminatePubkey,
    SendMessage,
    ProcessOutgoingMessage,
    DisseminateMessage,
    ProcessIncomingMsgsAndSendAcks,
    SendAcks,
    ReDisseminatePubkeys,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        TaskType::CreateIdentity,
        TaskType::DisseminatePubkey,
        TaskType::SendMessage,
        TaskType::ProcessOutgoingMessage,
        TaskType::DisseminateMessage,
        TaskType::ProcessIncomingMsgsAndSendAcks,
        TaskType::SendAcks,
        TaskType::ReDisseminatePubkeys,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateIdentity => "create_identity",
            Self::DisseminatePubkey => "disseminate_pubkey",
            Self::SendMessage => "send_message",
            Self::ProcessOutgoingMessage => "process_outgoing_message",
            Self::DisseminateMessage => "disseminate_message",
            Self::ProcessIncomingMsgsAndSendAcks => "process_incoming_msgs_and_send_acks",
            Self::SendAcks => "send_acks",
            Self::ReDisseminatePubkeys => "re_disseminate_pubkeys",
        }
    }

    /// Local work (key generation, proof of work, decryption) runs offline.
    pub fn requires_network(self) -> bool {
        match self {
            Self::SendMessage
            | Self::DisseminateMessage
            | Self::DisseminatePubkey
            | Self::SendAcks
            | Self::ReDisseminatePubkeys => true,
            Self::CreateIdentity
            | Self::ProcessOutgoingMessage
            | Self::ProcessIncomingMsgsAndSendAcks => false,
        }
    }

    /// How many entity references a record of this type carries, filled in
    /// `primary_ref` then `secondary_ref` order.
    pub fn entity_refs(self) -> usize {
        match self {
            Self::ProcessOutgoingMessage | Self::DisseminateMessage => 2,
            Self::SendMessage | Self::DisseminatePubkey | Self::CreateIdentity => 1,
            Self::ProcessIncomingMsgsAndSendAcks | Self::SendAcks | Self::ReDisseminatePubkeys => 0,
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task| task.as_str() == value)
            .ok_or(())
    }
}

/// The task column of a persisted record. Rows written by a build that knew
/// more task types than this one surface as `Unrecognized`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTask {
    Known(TaskType),
    Unrecognized(String),
}

impl RecordTask {
    pub fn known(&self) -> Option<TaskType> {
        match self {
            Self::Known(task) => Some(*task),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(task) => task.as_str(),
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }
}

impl From<TaskType> for RecordTask {
    fn from(task: TaskType) -> Self {
        Self::Known(task)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: QueueRecordId,
    pub task: RecordTask,
    pub primary_ref: Option<u64>,
    pub secondary_ref: Option<u64>,
    pub attempts: u32,
    pub last_attempt_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

impl QueueRecord {
    pub fn task_type(&self) -> Option<TaskType> {
        self.task.known()
    }

    /// Sweep order: never-attempted records first, then oldest attempt first.
    /// Ties fall back to the record id so the order is total.
    pub fn sweep_order(&self, other: &Self) -> Ordering {
        self.last_attempt_at
            .cmp(&other.last_attempt_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewQueueRecord {
    pub task_type: TaskType,
    pub primary_ref: Option<u64>,
    pub secondary_ref: Option<u64>,
    pub created_at: SystemTime,
}

impl NewQueueRecord {
    pub fn new(task_type: TaskType, created_at: SystemTime) -> Self {
        Self {
            task_type,
            primary_ref: None,
            secondary_ref: None,
            created_at,
        }
    }

    pub fn primary(mut self, id: u64) -> Self {
        self.primary_ref = Some(id);
        self
    }

    pub fn secondary(mut self, id: u64) -> Self {
        self.secondary_ref = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn record(id: u64, last_attempt_secs: Option<u64>) -> QueueRecord {
        QueueRecord {
            id: QueueRecordId(id),
            task: TaskType::SendAcks.into(),
            primary_ref: None,
            secondary_ref: None,
            attempts: 0,
            last_attempt_at: last_attempt_secs.map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            created_at: UNIX_EPOCH,
        }
    }

    #[test]
    fn task_type_strings_parse_back() {
        for task in TaskType::ALL {
            assert_eq!(task.as_str().parse::<TaskType>(), Ok(task));
        }
        assert!("check_server_for_messages".parse::<TaskType>().is_err());
    }

    #[test]
    fn never_attempted_records_sort_before_attempted_ones() {
        let mut records = [record(1, Some(30)), record(2, None), record(3, Some(10))];
        records.sort_by(QueueRecord::sweep_order);

        let order: Vec<u64> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn two_entity_tasks_carry_both_references() {
        assert_eq!(TaskType::ProcessOutgoingMessage.entity_refs(), 2);
        assert_eq!(TaskType::DisseminateMessage.entity_refs(), 2);
        assert_eq!(TaskType::CreateIdentity.entity_refs(), 1);
        assert_eq!(TaskType::SendAcks.entity_refs(), 0);
    }

    #[test]
    fn local_tasks_do_not_require_network() {
        assert!(!TaskType::CreateIdentity.requires_network());
        assert!(!TaskType::ProcessOutgoingMessage.requires_network());
        assert!(TaskType::SendMessage.requires_network());
        assert!(TaskType::ReDisseminatePubkeys.requires_network());
    }
}
