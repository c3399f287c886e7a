/// Content shown in place of a soft-deleted message.
pub const DELETED_PLACEHOLDER: &str = "This message has been deleted.";

/// Sender name used when the payload carries none.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Kind of chat message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
    System,
}

impl MessageKind {
    /// Parses the wire name, falling back to `Text` for anything unrecognised.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "FILE" => Self::File,
            "IMAGE" => Self::Image,
            "SYSTEM" => Self::System,
            _ => Self::Text,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::File => "FILE",
            Self::Image => "IMAGE",
            Self::System => "SYSTEM",
        }
    }

    /// Returns a display label for attachment kinds.
    pub fn display_label(self) -> Option<&'static str> {
        match self {
            Self::File => Some("[File]"),
            Self::Image => Some("[Image]"),
            Self::Text | Self::System => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileMeta {
    pub name: Option<String>,
    pub size: Option<u64>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Server-assigned id; `0` until the server has assigned one.
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_active: bool,
    pub kind: MessageKind,
    pub content: String,
    pub created_at_ms: i64,
    pub is_edited: bool,
    pub edited_at_ms: Option<i64>,
    pub is_deleted: bool,
    /// Derived locally from the viewer's id, never taken from the wire.
    pub is_mine: bool,
    pub file: Option<FileMeta>,
}

impl ChatMessage {
    pub fn has_server_id(&self) -> bool {
        self.id != 0
    }

    /// Recomputes ownership against the viewer. System messages never belong to anyone.
    pub fn resolve_ownership(&mut self, viewer_id: i64) {
        self.is_mine = self.kind != MessageKind::System && self.sender_id == viewer_id;
    }

    /// Marks the message as deleted while keeping its id and position.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content = DELETED_PLACEHOLDER.to_owned();
    }

    /// Returns the display content: attachment label + file name, or the text.
    pub fn display_content(&self) -> String {
        if self.is_deleted {
            return DELETED_PLACEHOLDER.to_owned();
        }

        match self.kind.display_label() {
            Some(label) => {
                let name = self
                    .file
                    .as_ref()
                    .and_then(|file| file.name.as_deref())
                    .unwrap_or(self.content.as_str());
                format!("{label} {name}")
            }
            None => self.content.clone(),
        }
    }
}
