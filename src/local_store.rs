use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chat::{derive_title, ChatSettings, Conversation, Message, Role};
use crate::store::unix_ms;

const CONVERSATIONS_FILE: &str = "conversations.json";
const CURRENT_CONVERSATION_FILE: &str = "current_conversation.json";
const SETTINGS_FILE: &str = "settings.json";
const ADMIN_SESSION_FILE: &str = "admin_session.json";

const ADMIN_SESSION_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Stored token caps below this predate unlimited mode and are lifted to -1.
const MAX_TOKENS_FLOOR: i64 = 100_000;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminSession {
    authenticated: bool,
    expires_unix_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
}

/// Client-held persistent state, one JSON file per storage key. Every
/// operation re-reads the relevant blob, mutates it, and writes the whole
/// blob back; malformed or missing files read as empty state, never an
/// error.
#[derive(Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let _ = std::fs::create_dir_all(&dir);
        Self { dir }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> Option<T> {
        let txt = std::fs::read_to_string(self.dir.join(file)).ok()?;
        serde_json::from_str(&txt).ok()
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) {
        if let Ok(txt) = serde_json::to_string_pretty(value) {
            let _ = std::fs::write(self.dir.join(file), txt);
        }
    }

    // conversations

    /// Most-recently-created first.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.read_json(CONVERSATIONS_FILE).unwrap_or_default()
    }

    fn save_conversations(&self, conversations: &[Conversation]) {
        self.write_json(CONVERSATIONS_FILE, &conversations)
    }

    pub fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations().into_iter().find(|c| c.id == id)
    }

    /// Inserts at the front of the list and makes it the current selection.
    pub fn create_conversation(&self, title: &str) -> Conversation {
        let conversation = Conversation::new(title);
        let mut conversations = self.conversations();
        conversations.insert(0, conversation.clone());
        self.save_conversations(&conversations);
        self.set_current_conversation_id(&conversation.id);
        conversation
    }

    /// Partial merge; refreshes `updatedAt`. Unknown ids are a silent no-op.
    pub fn update_conversation(&self, id: &str, patch: ConversationPatch) {
        let mut conversations = self.conversations();
        let Some(conversation) = conversations.iter_mut().find(|c| c.id == id) else {
            return;
        };
        if let Some(title) = patch.title {
            conversation.title = title;
        }
        if let Some(messages) = patch.messages {
            conversation.messages = messages;
        }
        conversation.updated_at = unix_ms();
        self.save_conversations(&conversations);
    }

    /// Appends and refreshes `updatedAt`. The first user message fixes the
    /// title; later appends never change it. Unknown ids are a silent no-op.
    pub fn add_message(&self, conversation_id: &str, message: Message) {
        let mut conversations = self.conversations();
        let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id)
        else {
            return;
        };
        conversation.messages.push(message);
        conversation.updated_at = unix_ms();
        if conversation.messages.len() == 1 && conversation.messages[0].role == Role::User {
            conversation.title = derive_title(&conversation.messages[0].content);
        }
        self.save_conversations(&conversations);
    }

    /// Removing the current selection falls back to the new first
    /// conversation, or clears the selection when none remain.
    pub fn delete_conversation(&self, id: &str) {
        let mut conversations = self.conversations();
        conversations.retain(|c| c.id != id);
        self.save_conversations(&conversations);

        if self.current_conversation_id().as_deref() == Some(id) {
            match conversations.first() {
                Some(first) => self.set_current_conversation_id(&first.id),
                None => self.set_current_conversation_id(""),
            }
        }
    }

    pub fn current_conversation_id(&self) -> Option<String> {
        self.read_json::<String>(CURRENT_CONVERSATION_FILE)
            .filter(|s| !s.is_empty())
    }

    pub fn set_current_conversation_id(&self, id: &str) {
        self.write_json(CURRENT_CONVERSATION_FILE, &id)
    }

    // settings

    pub fn settings(&self) -> ChatSettings {
        let mut settings: ChatSettings = self.read_json(SETTINGS_FILE).unwrap_or_default();
        if settings.max_tokens != 0 && settings.max_tokens < MAX_TOKENS_FLOOR {
            settings.max_tokens = -1;
        }
        settings
    }

    pub fn save_settings(&self, settings: &ChatSettings) {
        self.write_json(SETTINGS_FILE, settings)
    }

    // admin session

    pub fn admin_session(&self) -> bool {
        self.read_json::<AdminSession>(ADMIN_SESSION_FILE)
            .map(|s| s.authenticated && s.expires_unix_ms > unix_ms())
            .unwrap_or(false)
    }

    pub fn set_admin_session(&self, authenticated: bool) {
        self.write_json(
            ADMIN_SESSION_FILE,
            &AdminSession {
                authenticated,
                expires_unix_ms: unix_ms() + ADMIN_SESSION_TTL_MS,
            },
        );
    }

    pub fn clear_admin_session(&self) {
        let _ = std::fs::remove_file(self.dir.join(ADMIN_SESSION_FILE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn create_conversation_front_inserts_and_selects() {
        let (_tmp, store) = store();
        let first = store.create_conversation("New Chat");
        let second = store.create_conversation("New Chat");

        let conversations = store.conversations();
        assert_eq!(conversations[0].id, second.id);
        assert_eq!(conversations[1].id, first.id);
        assert_eq!(store.current_conversation_id(), Some(second.id));
    }

    #[test]
    fn first_user_message_sets_title_once() {
        let (_tmp, store) = store();
        let conversation = store.create_conversation("New Chat");

        let long = "a".repeat(60);
        store.add_message(&conversation.id, Message::user(&long));
        let got = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(got.title, format!("{}...", "a".repeat(50)));

        store.add_message(&conversation.id, Message::user("something else"));
        let got = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(got.title, format!("{}...", "a".repeat(50)));
        assert_eq!(got.messages.len(), 2);
    }

    #[test]
    fn first_assistant_message_does_not_set_title() {
        let (_tmp, store) = store();
        let conversation = store.create_conversation("New Chat");
        store.add_message(&conversation.id, Message::assistant("hi there", None));
        let got = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(got.title, "New Chat");
    }

    #[test]
    fn add_message_refreshes_updated_at() {
        let (_tmp, store) = store();
        let conversation = store.create_conversation("New Chat");
        let before = conversation.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_message(&conversation.id, Message::user("hi"));
        let got = store.get_conversation(&conversation.id).unwrap();
        assert!(got.updated_at > before);
    }

    #[test]
    fn add_message_to_unknown_conversation_is_a_no_op() {
        let (_tmp, store) = store();
        store.add_message("conv_nope", Message::user("hi"));
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn update_conversation_merges_fields() {
        let (_tmp, store) = store();
        let conversation = store.create_conversation("New Chat");
        store.update_conversation(
            &conversation.id,
            ConversationPatch {
                title: Some("Renamed".to_string()),
                messages: None,
            },
        );
        let got = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(got.title, "Renamed");
        assert!(got.messages.is_empty());

        // Unknown id: silent no-op.
        store.update_conversation(
            "conv_nope",
            ConversationPatch {
                title: Some("x".to_string()),
                messages: None,
            },
        );
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn deleting_current_falls_back_to_first_remaining() {
        let (_tmp, store) = store();
        let older = store.create_conversation("older");
        let current = store.create_conversation("current");
        assert_eq!(store.current_conversation_id(), Some(current.id.clone()));

        store.delete_conversation(&current.id);
        assert_eq!(store.current_conversation_id(), Some(older.id.clone()));

        store.delete_conversation(&older.id);
        assert_eq!(store.current_conversation_id(), None);
    }

    #[test]
    fn deleting_non_current_keeps_selection() {
        let (_tmp, store) = store();
        let older = store.create_conversation("older");
        let current = store.create_conversation("current");

        store.delete_conversation(&older.id);
        assert_eq!(store.current_conversation_id(), Some(current.id));
    }

    #[test]
    fn malformed_conversations_file_reads_as_empty() {
        let (tmp, store) = store();
        std::fs::write(tmp.path().join(CONVERSATIONS_FILE), "{not json").unwrap();
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn settings_default_and_floor_coercion() {
        let (_tmp, store) = store();
        let settings = store.settings();
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.max_tokens, -1);

        store.save_settings(&ChatSettings {
            model: "gpt-4o".to_string(),
            temperature: 0.5,
            max_tokens: 4096,
        });
        let settings = store.settings();
        assert_eq!(settings.model, "gpt-4o");
        // Sub-floor caps read back as unlimited.
        assert_eq!(settings.max_tokens, -1);

        store.save_settings(&ChatSettings {
            model: "gpt-4o".to_string(),
            temperature: 0.5,
            max_tokens: 200_000,
        });
        assert_eq!(store.settings().max_tokens, 200_000);
    }

    #[test]
    fn admin_session_expires_and_clears() {
        let (tmp, store) = store();
        assert!(!store.admin_session());

        store.set_admin_session(true);
        assert!(store.admin_session());

        store.clear_admin_session();
        assert!(!store.admin_session());

        // An expired stamp is as good as no session.
        std::fs::write(
            tmp.path().join(ADMIN_SESSION_FILE),
            serde_json::json!({"authenticated": true, "expiresUnixMs": 1000}).to_string(),
        )
        .unwrap();
        assert!(!store.admin_session());
    }
}
