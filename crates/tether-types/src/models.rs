use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two-member pairwise chat or a named multi-member group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown conversation type '{0}'")]
pub struct UnknownConversationKind(pub String);

impl FromStr for ConversationKind {
    type Err = UnknownConversationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            other => Err(UnknownConversationKind(other.to_string())),
        }
    }
}

/// Delivery glyph shown next to a message.
///
/// `Read` only once every recipient (member count minus the sender) has
/// a read receipt with `readAt` set; anything less is `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "✓")]
    Sent,
    #[serde(rename = "✓✓")]
    Read,
}

impl DeliveryStatus {
    pub fn from_counts(recipients: i64, read: i64) -> Self {
        if recipients > 0 && read >= recipients {
            Self::Read
        } else {
            Self::Sent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_stored_values() {
        assert_eq!("direct".parse::<ConversationKind>().unwrap(), ConversationKind::Direct);
        assert_eq!("group".parse::<ConversationKind>().unwrap(), ConversationKind::Group);
        let err = "channel".parse::<ConversationKind>().unwrap_err();
        assert_eq!(err, UnknownConversationKind("channel".into()));
        assert_eq!(err.to_string(), "unknown conversation type 'channel'");
    }

    #[test]
    fn status_needs_every_recipient() {
        assert_eq!(DeliveryStatus::from_counts(2, 1), DeliveryStatus::Sent);
        assert_eq!(DeliveryStatus::from_counts(2, 2), DeliveryStatus::Read);
        // Nobody left to read it (sender alone in the conversation)
        assert_eq!(DeliveryStatus::from_counts(0, 0), DeliveryStatus::Sent);
    }

    #[test]
    fn status_serializes_as_glyph() {
        assert_eq!(serde_json::to_string(&DeliveryStatus::Sent).unwrap(), "\"✓\"");
        assert_eq!(serde_json::to_string(&DeliveryStatus::Read).unwrap(), "\"✓✓\"");
    }
}
