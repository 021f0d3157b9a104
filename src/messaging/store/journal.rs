use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use fs2::FileExt;

use crate::{
    domain::{
        conversation::ConversationKey,
        message::{DeliveryState, Message, MessageDraft, MessageId},
    },
    messaging::error::{ChatError, ChatResult},
};

use super::{log::ConversationLogs, materialize, HistoryPage, MessageStore};

const JOURNAL_EXTENSION: &str = "jsonl";
const LOCK_FILE_NAME: &str = "journal.lock";
const JOURNAL_REPLAYED: &str = "STORE_JOURNAL_REPLAYED";
const JOURNAL_TORN_TAIL_DROPPED: &str = "STORE_JOURNAL_TORN_TAIL_DROPPED";

/// Durable message store: one JSON-lines journal per conversation.
///
/// A message is flushed to its journal before it becomes visible to readers.
/// The directory is held under an exclusive lock for the store's lifetime.
#[derive(Debug)]
pub struct JournalMessageStore {
    dir: PathBuf,
    logs: Mutex<ConversationLogs>,
    _lock: File,
}

impl JournalMessageStore {
    pub fn open(dir: impl AsRef<Path>) -> ChatResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| storage_error(&dir, source))?;

        let lock_path = dir.join(LOCK_FILE_NAME);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| storage_error(&lock_path, source))?;
        lock.try_lock_exclusive()
            .map_err(|_| ChatError::StoreLocked { path: dir.clone() })?;

        let mut logs = ConversationLogs::default();
        let mut journals = 0usize;
        let mut messages = 0usize;
        for entry in fs::read_dir(&dir).map_err(|source| storage_error(&dir, source))? {
            let path = entry.map_err(|source| storage_error(&dir, source))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(JOURNAL_EXTENSION) {
                continue;
            }

            messages += replay(&path, &mut logs)?;
            journals += 1;
        }

        tracing::info!(
            code = JOURNAL_REPLAYED,
            dir = %dir.display(),
            journals,
            messages,
            "message journal opened"
        );

        Ok(Self {
            dir,
            logs: Mutex::new(logs),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn journal_path(&self, key: &ConversationKey) -> PathBuf {
        self.dir
            .join(format!("{}.{JOURNAL_EXTENSION}", key.file_stem()))
    }

    fn logs(&self) -> MutexGuard<'_, ConversationLogs> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rewrite(&self, key: &ConversationKey, logs: &ConversationLogs) -> ChatResult<()> {
        let path = self.journal_path(key);
        let messages = logs.messages(key);
        if messages.is_empty() {
            return remove_journal(&path);
        }

        let tmp = path.with_extension(format!("{JOURNAL_EXTENSION}.tmp"));
        {
            let mut file = File::create(&tmp).map_err(|source| storage_error(&tmp, source))?;
            for message in messages {
                write_line(&mut file, message).map_err(|source| storage_error(&tmp, source))?;
            }
            file.sync_data()
                .map_err(|source| storage_error(&tmp, source))?;
        }
        fs::rename(&tmp, &path).map_err(|source| storage_error(&path, source))
    }
}

impl MessageStore for JournalMessageStore {
    fn append(&self, key: &ConversationKey, draft: MessageDraft) -> ChatResult<Message> {
        let message = materialize(key, draft)?;
        let mut logs = self.logs();
        if logs.contains(key, &message.id) {
            return Err(ChatError::InvalidMessage {
                reason: format!("message id {} already exists", message.id),
            });
        }

        let path = self.journal_path(key);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| storage_error(&path, source))?;
        let committed_len = file
            .metadata()
            .map_err(|source| storage_error(&path, source))?
            .len();
        if let Err(source) = write_line(&mut file, &message).and_then(|()| file.flush()) {
            // A partial line would make every later replay fail.
            let _ = file.set_len(committed_len);
            return Err(storage_error(&path, source));
        }

        logs.insert(message.clone())?;
        tracing::debug!(
            conversation = %key,
            message_id = %message.id,
            state = message.delivery_state.as_label(),
            "message journaled"
        );
        Ok(message)
    }

    fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> ChatResult<HistoryPage> {
        let before = before.unwrap_or_else(Utc::now);
        Ok(self.logs().page(key, limit, before))
    }

    fn get(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        self.logs().get(key, id)
    }

    fn delete_conversation(&self, key: &ConversationKey) -> ChatResult<usize> {
        let mut logs = self.logs();
        remove_journal(&self.journal_path(key))?;
        let removed = logs.remove_conversation(key);

        tracing::debug!(conversation = %key, removed, "conversation journal deleted");
        Ok(removed)
    }

    fn update_delivery(
        &self,
        key: &ConversationKey,
        id: &MessageId,
        state: DeliveryState,
    ) -> ChatResult<Message> {
        let mut logs = self.logs();
        let previous = logs.snapshot(key);
        let updated = logs.set_failed_state(key, id, state)?;
        if let Err(error) = self.rewrite(key, &logs) {
            logs.restore(key, previous);
            return Err(error);
        }
        Ok(updated)
    }

    fn discard(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        let mut logs = self.logs();
        let previous = logs.snapshot(key);
        let removed = logs.remove_failed(key, id)?;
        if let Err(error) = self.rewrite(key, &logs) {
            logs.restore(key, previous);
            return Err(error);
        }
        Ok(removed)
    }
}

fn replay(path: &Path, logs: &mut ConversationLogs) -> ChatResult<usize> {
    let contents = fs::read_to_string(path).map_err(|source| storage_error(path, source))?;
    let mut count = 0;
    let mut offset = 0usize;

    for (index, raw) in contents.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw.len();
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(_) if !raw.ends_with('\n') => {
                drop_torn_tail(path, line_start as u64)?;
                break;
            }
            Err(source) => {
                return Err(ChatError::JournalDecode {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                })
            }
        };
        logs.insert(message)?;
        count += 1;
    }

    Ok(count)
}

/// Cuts an unterminated last line left behind by an interrupted append.
fn drop_torn_tail(path: &Path, committed_len: u64) -> ChatResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| storage_error(path, source))?;
    file.set_len(committed_len)
        .map_err(|source| storage_error(path, source))?;

    tracing::warn!(
        code = JOURNAL_TORN_TAIL_DROPPED,
        path = %path.display(),
        committed_len,
        "unterminated journal line dropped"
    );
    Ok(())
}

fn write_line(file: &mut File, message: &Message) -> io::Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    file.write_all(line.as_bytes())
}

fn remove_journal(path: &Path) -> ChatResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(storage_error(path, source)),
    }
}

fn storage_error(path: &Path, source: io::Error) -> ChatError {
    ChatError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn key() -> ConversationKey {
        ConversationKey::between("alice", "bob")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn replays_history_after_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let store = JournalMessageStore::open(dir.path()).expect("open");
            store
                .append(&key(), MessageDraft::new("bob", "second").with_sent_at(at(2)))
                .expect("append");
            store
                .append(&key(), MessageDraft::new("alice", "first").with_sent_at(at(1)))
                .expect("append");
        }

        let store = JournalMessageStore::open(dir.path()).expect("reopen");
        let page = store.history(&key(), 10, None).expect("history");

        assert_eq!(
            page.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            ["first", "second"]
        );
    }

    #[test]
    fn second_open_of_locked_directory_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let _store = JournalMessageStore::open(dir.path()).expect("open");

        let err = JournalMessageStore::open(dir.path()).expect_err("must be locked");

        assert!(matches!(err, ChatError::StoreLocked { .. }));
    }

    #[test]
    fn delete_removes_journal_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JournalMessageStore::open(dir.path()).expect("open");
        store
            .append(&key(), MessageDraft::new("alice", "bye"))
            .expect("append");
        let path = store.journal_path(&key());
        assert!(path.exists());

        assert_eq!(store.delete_conversation(&key()).expect("delete"), 1);

        assert!(!path.exists());
        assert!(store.history(&key(), 10, None).expect("history").is_empty());
        assert_eq!(store.delete_conversation(&key()).expect("delete"), 0);
    }

    #[test]
    fn retried_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let id = {
            let store = JournalMessageStore::open(dir.path()).expect("open");
            let failed = store
                .append(
                    &key(),
                    MessageDraft::new("alice", "again").with_state(DeliveryState::Failed),
                )
                .expect("append");
            store
                .update_delivery(&key(), &failed.id, DeliveryState::Sent)
                .expect("update");
            failed.id
        };

        let store = JournalMessageStore::open(dir.path()).expect("reopen");
        let page = store.history(&key(), 10, None).expect("history");

        assert_eq!(page.len(), 1);
        assert_eq!(page.newest().map(|m| &m.id), Some(&id));
        assert_eq!(
            page.newest().map(|m| m.delivery_state),
            Some(DeliveryState::Sent)
        );
    }

    #[test]
    fn discarding_last_message_removes_journal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JournalMessageStore::open(dir.path()).expect("open");
        let failed = store
            .append(
                &key(),
                MessageDraft::new("alice", "drop me").with_state(DeliveryState::Failed),
            )
            .expect("append");

        store.discard(&key(), &failed.id).expect("discard");

        assert!(!store.journal_path(&key()).exists());
    }

    #[test]
    fn corrupt_journal_line_is_reported_with_position() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir
            .path()
            .join(format!("{}.{JOURNAL_EXTENSION}", key().file_stem()));
        fs::write(&path, "\n{not json}\n").expect("write fixture");

        let err = JournalMessageStore::open(dir.path()).expect_err("must fail");

        assert!(matches!(err, ChatError::JournalDecode { line: 2, .. }));
    }

    #[test]
    fn failed_rewrite_keeps_memory_in_line_with_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let failed_id = {
            let store = JournalMessageStore::open(dir.path()).expect("open");
            store
                .append(&key(), MessageDraft::new("bob", "delivered").with_sent_at(at(1)))
                .expect("append");
            let failed = store
                .append(
                    &key(),
                    MessageDraft::new("alice", "stuck")
                        .with_sent_at(at(2))
                        .with_state(DeliveryState::Failed),
                )
                .expect("append");
            let blocker = store
                .journal_path(&key())
                .with_extension(format!("{JOURNAL_EXTENSION}.tmp"));
            fs::create_dir(&blocker).expect("block temp path");

            store
                .update_delivery(&key(), &failed.id, DeliveryState::Sent)
                .expect_err("rewrite must fail");
            store
                .discard(&key(), &failed.id)
                .expect_err("rewrite must fail");

            let current = store.get(&key(), &failed.id).expect("still stored");
            assert_eq!(current.delivery_state, DeliveryState::Failed);
            assert_eq!(store.history(&key(), 10, None).expect("history").len(), 2);
            fs::remove_dir(&blocker).expect("unblock temp path");
            failed.id
        };

        let store = JournalMessageStore::open(dir.path()).expect("reopen");
        let reopened = store.get(&key(), &failed_id).expect("replayed");

        assert_eq!(reopened.delivery_state, DeliveryState::Failed);
    }

    #[test]
    fn unterminated_last_line_is_dropped_on_replay() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = {
            let store = JournalMessageStore::open(dir.path()).expect("open");
            store
                .append(&key(), MessageDraft::new("alice", "kept").with_sent_at(at(1)))
                .expect("append");
            store.journal_path(&key())
        };
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open journal");
        file.write_all(b"{\"id\":\"half").expect("write torn tail");
        drop(file);

        {
            let store = JournalMessageStore::open(dir.path()).expect("torn tail is tolerated");
            assert_eq!(store.history(&key(), 10, None).expect("history").len(), 1);
            store
                .append(&key(), MessageDraft::new("bob", "after").with_sent_at(at(2)))
                .expect("append after repair");
        }

        let store = JournalMessageStore::open(dir.path()).expect("reopen");
        let page = store.history(&key(), 10, None).expect("history");
        assert_eq!(
            page.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            ["kept", "after"]
        );
    }
}
