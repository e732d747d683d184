//! Conversation storage and per-conversation turn serialization
//!
//! A store supplies the profile and prior messages a turn starts from and
//! records each finished turn (answer plus structured trace). Two stores are
//! provided: [`MemorySessionStore`] and [`JsonFileStore`], which keeps one
//! JSON document per conversation under the configured directory.

use crate::activity_logger::ActivityLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use counsel_core::{
    Blackboard, CounselError, HistoryMessage, Profile, Result, TurnResult, WorkflowStep,
};
use counsel_planning::PlanRationale;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Structured trace of one turn, kept for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTrace {
    pub blackboard: Blackboard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<PlanRationale>,
    #[serde(default)]
    pub activity: ActivityLog,
}

/// One finished turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub query: String,
    pub result: TurnResult,
    pub trace: TurnTrace,
}

impl TurnRecord {
    pub fn new(query: impl Into<String>, result: TurnResult, trace: TurnTrace) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            query: query.into(),
            result,
            trace,
        }
    }
}

/// Everything stored for one conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// The last `window` messages
    pub fn recent_history(&self, window: usize) -> Vec<HistoryMessage> {
        let start = self.messages.len().saturating_sub(window);
        self.messages[start..].to_vec()
    }

    /// Append the exchange and its record
    ///
    /// Escalated turns store the open questions as the assistant message.
    fn push_turn(&mut self, record: TurnRecord) {
        self.messages.push(HistoryMessage::user(record.query.clone()));
        let reply = if record.result.step == WorkflowStep::Escalated
            && !record.result.open_questions.is_empty()
        {
            record.result.open_questions.join("\n")
        } else {
            record.result.answer.clone()
        };
        self.messages.push(HistoryMessage::assistant(reply));
        self.turns.push(record);
        self.updated_at = Some(Utc::now());
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a conversation; unknown ids yield an empty conversation
    async fn load(&self, conversation_id: &str) -> Result<Conversation>;

    /// Merge `profile` into the stored profile
    async fn update_profile(&self, conversation_id: &str, profile: &Profile) -> Result<()>;

    /// Record a finished turn
    async fn append_turn(&self, conversation_id: &str, record: TurnRecord) -> Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, conversation_id: &str) -> Result<Conversation> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| Conversation::new(conversation_id)))
    }

    async fn update_profile(&self, conversation_id: &str, profile: &Profile) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id));
        merge_profile(&mut conversation.profile, profile);
        Ok(())
    }

    async fn append_turn(&self, conversation_id: &str, record: TurnRecord) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id))
            .push_turn(record);
        Ok(())
    }
}

/// One `<id>.json` document per conversation
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Conversation ids are hex encoded so distinct ids never share a file
    fn path_for(&self, conversation_id: &str) -> PathBuf {
        let name = if conversation_id.is_empty() {
            "default".to_string()
        } else {
            hex::encode(conversation_id)
        };
        self.dir.join(format!("{}.json", name))
    }

    async fn read(&self, conversation_id: &str) -> Result<Conversation> {
        let path = self.path_for(conversation_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                CounselError::Session(format!("Corrupt session file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Conversation::new(conversation_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, conversation: &Conversation) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&conversation.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(conversation)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("Saved conversation {} to {}", conversation.id, path.display());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self, conversation_id: &str) -> Result<Conversation> {
        self.read(conversation_id).await
    }

    async fn update_profile(&self, conversation_id: &str, profile: &Profile) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self.read(conversation_id).await?;
        merge_profile(&mut conversation.profile, profile);
        self.write(&conversation).await
    }

    async fn append_turn(&self, conversation_id: &str, record: TurnRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self.read(conversation_id).await?;
        conversation.push_turn(record);
        self.write(&conversation).await
    }
}

fn merge_profile(target: &mut Profile, update: &Profile) {
    for (key, value) in update {
        target.insert(key.clone(), value.clone());
    }
}

/// Per-conversation turn serialization
///
/// Turns of one conversation run strictly one after another; different
/// conversations never wait on each other.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the conversation's previous turn to finish
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counsel_core::ExecutorId;
    use serde_json::json;
    use std::time::Duration;

    fn record(query: &str, answer: &str) -> TurnRecord {
        let result = TurnResult {
            answer: answer.to_string(),
            executors_used: vec![ExecutorId::from("policy_compliance")],
            conflicts: Vec::new(),
            open_questions: Vec::new(),
            failed_executors: Vec::new(),
            goal: None,
            step: WorkflowStep::Complete,
        };
        let trace = TurnTrace {
            blackboard: Blackboard::new(query, Profile::new(), Vec::new()),
            rationale: None,
            activity: ActivityLog::new(),
        };
        TurnRecord::new(query, result, trace)
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        let mut profile = Profile::new();
        profile.insert("major".to_string(), json!("CS"));
        store.update_profile("c1", &profile).await.unwrap();
        store.append_turn("c1", record("q1", "a1")).await.unwrap();

        let conversation = store.load("c1").await.unwrap();
        assert_eq!(conversation.profile.get("major"), Some(&json!("CS")));
        assert_eq!(
            conversation.messages,
            vec![HistoryMessage::user("q1"), HistoryMessage::assistant("a1")]
        );
        assert!(store.load("other").await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));
        store.append_turn("student/42", record("q1", "a1")).await.unwrap();
        store.append_turn("student/42", record("q2", "a2")).await.unwrap();

        let reopened = JsonFileStore::new(dir.path().join("sessions"));
        let conversation = reopened.load("student/42").await.unwrap();
        assert_eq!(conversation.turns.len(), 2);
        assert_eq!(conversation.recent_history(2)[0], HistoryMessage::user("q2"));
        assert!(dir.path().join("sessions/73747564656e742f3432.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.append_turn("student/42", record("q1", "a1")).await.unwrap();
        store.append_turn("student_42", record("q2", "a2")).await.unwrap();

        let slash = store.load("student/42").await.unwrap();
        let underscore = store.load("student_42").await.unwrap();
        assert_eq!(slash.turns.len(), 1);
        assert_eq!(underscore.turns.len(), 1);
        assert_eq!(slash.turns[0].query, "q1");
        assert_eq!(underscore.turns[0].query, "q2");
        assert_ne!(store.path_for("student/42"), store.path_for("student_42"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("broken"), "{not json").unwrap();
        let result = store.load("broken").await;
        assert!(matches!(result, Err(CounselError::Session(_))));
    }

    #[test]
    fn test_escalated_turn_stores_open_questions() {
        let mut conversation = Conversation::new("c");
        let mut escalated = record("q", "notice");
        escalated.result.step = WorkflowStep::Escalated;
        escalated.result.open_questions = vec!["Adjust the plan?".to_string()];
        conversation.push_turn(escalated);
        assert_eq!(conversation.messages[1], HistoryMessage::assistant("Adjust the plan?"));
    }

    #[tokio::test]
    async fn test_same_conversation_is_serialized() {
        let locks = Arc::new(ConversationLocks::new());
        let first = locks.acquire("c1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("c1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // other conversations are unaffected
        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire("c2")).await;
        assert!(other.is_ok());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
