use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AddressId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PubkeyId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PayloadId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sending,
    Sent,
    SendingFailed,
    Received,
    Read,
}

impl MessageStatus {
    /// Statuses a send attempt moves to `Sending`.
    pub fn awaits_sending(self) -> bool {
        matches!(self, Self::Queued | Self::SendingFailed)
    }

    /// Transitions the queue dispatcher is allowed to make. Terminal
    /// outcomes only replace an in-flight status.
    pub fn can_become(self, next: Self) -> bool {
        match next {
            Self::Sending => self.awaits_sending(),
            Self::Sent | Self::SendingFailed => matches!(self, Self::Queued | Self::Sending),
            Self::Queued | Self::Received | Self::Read => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub to_address: String,
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
}

/// A local identity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub address: String,
    pub label: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pubkey {
    pub id: PubkeyId,
    pub address: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: PayloadId,
    pub payload: Vec<u8>,
    pub pow_done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_messages_keep_their_status() {
        assert!(!MessageStatus::Sent.can_become(MessageStatus::SendingFailed));
        assert!(!MessageStatus::SendingFailed.can_become(MessageStatus::Sent));
        assert!(!MessageStatus::Read.can_become(MessageStatus::Sending));
    }

    #[test]
    fn in_flight_messages_reach_a_terminal_status() {
        assert!(MessageStatus::Queued.can_become(MessageStatus::Sending));
        assert!(MessageStatus::SendingFailed.can_become(MessageStatus::Sending));
        assert!(MessageStatus::Sending.can_become(MessageStatus::Sent));
        assert!(MessageStatus::Sending.can_become(MessageStatus::SendingFailed));
        assert!(MessageStatus::Queued.can_become(MessageStatus::SendingFailed));
    }
}
