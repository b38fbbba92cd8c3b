//! Change notifications pushed by the remote service

use serde::{Deserialize, Serialize};

use super::RemoteKey;

/// Kind of remote mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Payload of one change-stream event
///
/// Clients only use it as a trigger; the content is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub id: RemoteKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_notice_wire_format() {
        let notice = ChangeNotice {
            kind: ChangeKind::Deleted,
            id: RemoteKey::from("3"),
        };
        assert_eq!(
            serde_json::to_string(&notice).unwrap(),
            r#"{"kind":"deleted","id":"3"}"#
        );
    }
}
