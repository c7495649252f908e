use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of client a session belongs to; one active session is allowed per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Web,
    App,
    Admin,
}

impl ClientType {
    pub const ALL: [ClientType; 3] = [ClientType::Web, ClientType::App, ClientType::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Web => "web",
            ClientType::App => "app",
            ClientType::Admin => "admin",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
