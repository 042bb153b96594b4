use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::auth::principal::{NewPrincipal, PrincipalId, PrincipalRecord, PrincipalUpdate};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

/// In-process credential store used by tests and local tooling.
///
/// Records live in a `DashMap`, so the refresh-token compare-and-swap holds
/// only the lock of the shard that owns the record. Handle and email indexes
/// are only mutated under `index_lock`, which keeps uniqueness checks and
/// inserts atomic without serialising session traffic.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: DashMap<PrincipalId, PrincipalRecord>,
    handles: DashMap<String, PrincipalId>,
    emails: DashMap<String, PrincipalId>,
    index_lock: Mutex<()>,
    offline: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as a storage outage until `bring_online`.
    pub fn take_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn bring_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Remove a record, as an out-of-band account deletion would.
    pub fn remove(&self, id: PrincipalId) -> Option<PrincipalRecord> {
        let _guard = self.index_lock.lock();
        let (_, record) = self.records.remove(&id)?;
        self.handles.remove(&record.handle);
        self.emails.remove(&record.email);
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_online(&self) -> AuthResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::BackendUnavailable(
                "in-memory credential store is offline".into(),
            ));
        }
        Ok(())
    }

    fn lookup(&self, index: &DashMap<String, PrincipalId>, key: &str) -> Option<PrincipalRecord> {
        let id = *index.get(&key.to_lowercase())?;
        self.records.get(&id).map(|record| record.value().clone())
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Option<PrincipalRecord>> {
        self.ensure_online()?;
        let by_handle = handle.and_then(|h| self.lookup(&self.handles, h));
        Ok(by_handle.or_else(|| email.and_then(|e| self.lookup(&self.emails, e))))
    }

    async fn find_by_id(&self, id: PrincipalId) -> AuthResult<Option<PrincipalRecord>> {
        self.ensure_online()?;
        Ok(self.records.get(&id).map(|record| record.value().clone()))
    }

    async fn create(&self, principal: NewPrincipal) -> AuthResult<PrincipalRecord> {
        self.ensure_online()?;
        let _guard = self.index_lock.lock();

        if self.handles.contains_key(&principal.handle) {
            return Err(AuthError::Conflict("userName already registered".into()));
        }
        if self.emails.contains_key(&principal.email) {
            return Err(AuthError::Conflict("email already registered".into()));
        }

        let now = Utc::now();
        let record = PrincipalRecord {
            id: PrincipalId::new(),
            handle: principal.handle,
            email: principal.email,
            display_name: principal.display_name,
            password_hash: principal.password_hash,
            refresh_token_fingerprint: None,
            created_at: now,
            updated_at: now,
        };

        self.handles.insert(record.handle.clone(), record.id);
        self.emails.insert(record.email.clone(), record.id);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_fields(
        &self,
        id: PrincipalId,
        update: PrincipalUpdate,
    ) -> AuthResult<Option<PrincipalRecord>> {
        self.ensure_online()?;
        let _guard = self.index_lock.lock();

        if let Some(email) = &update.email {
            if let Some(owner) = self.emails.get(email) {
                if *owner != id {
                    return Err(AuthError::Conflict("email already registered".into()));
                }
            }
        }

        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(email) = update.email {
            if email != record.email {
                self.emails.remove(&record.email);
                self.emails.insert(email.clone(), id);
                record.email = email;
            }
        }
        if let Some(display_name) = update.display_name {
            record.display_name = display_name;
        }
        if let Some(password_hash) = update.password_hash {
            record.password_hash = password_hash;
        }
        record.updated_at = Utc::now();

        Ok(Some(record.clone()))
    }

    async fn set_refresh_token(
        &self,
        id: PrincipalId,
        fingerprint: Option<&str>,
    ) -> AuthResult<bool> {
        self.ensure_online()?;
        match self.records.get_mut(&id) {
            Some(mut record) => {
                record.refresh_token_fingerprint = fingerprint.map(str::to_string);
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_refresh_token(
        &self,
        id: PrincipalId,
        expected: &str,
        replacement: &str,
    ) -> AuthResult<bool> {
        self.ensure_online()?;
        // The entry guard spans the compare and the write.
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.refresh_token_fingerprint.as_deref() != Some(expected) {
            return Ok(false);
        }
        record.refresh_token_fingerprint = Some(replacement.to_string());
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn ping(&self) -> AuthResult<()> {
        self.ensure_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_principal(handle: &str, email: &str) -> NewPrincipal {
        NewPrincipal {
            handle: handle.into(),
            email: email.into(),
            display_name: handle.to_uppercase(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_handles_and_emails() {
        let store = MemoryCredentialStore::new();
        store
            .create(new_principal("alice", "alice@x.com"))
            .await
            .expect("first insert");

        let dup_handle = store.create(new_principal("alice", "other@x.com")).await;
        assert!(matches!(dup_handle, Err(AuthError::Conflict(_))));

        let dup_email = store.create(new_principal("bob", "alice@x.com")).await;
        assert!(matches!(dup_email, Err(AuthError::Conflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn finds_by_handle_before_email() {
        let store = MemoryCredentialStore::new();
        let alice = store
            .create(new_principal("alice", "alice@x.com"))
            .await
            .expect("insert alice");
        let bob = store
            .create(new_principal("bob", "bob@x.com"))
            .await
            .expect("insert bob");

        let found = store
            .find_by_handle_or_email(Some("ALICE"), Some("bob@x.com"))
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(found.id, alice.id);

        let found = store
            .find_by_handle_or_email(Some("nobody"), Some("bob@x.com"))
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(found.id, bob.id);

        assert!(
            store
                .find_by_handle_or_email(None, None)
                .await
                .expect("lookup")
                .is_none()
        );
    }

    #[tokio::test]
    async fn swap_only_succeeds_against_the_live_value() {
        let store = MemoryCredentialStore::new();
        let record = store
            .create(new_principal("alice", "alice@x.com"))
            .await
            .expect("insert");

        assert!(!store.swap_refresh_token(record.id, "a", "b").await.expect("swap"));

        store
            .set_refresh_token(record.id, Some("a"))
            .await
            .expect("set");
        assert!(store.swap_refresh_token(record.id, "a", "b").await.expect("swap"));
        assert!(!store.swap_refresh_token(record.id, "a", "c").await.expect("swap"));

        let stored = store.find_by_id(record.id).await.expect("find").expect("record");
        assert_eq!(stored.refresh_token_fingerprint.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn email_change_moves_the_unique_index() {
        let store = MemoryCredentialStore::new();
        let alice = store
            .create(new_principal("alice", "alice@x.com"))
            .await
            .expect("insert alice");
        store
            .create(new_principal("bob", "bob@x.com"))
            .await
            .expect("insert bob");

        let taken = store
            .update_fields(
                alice.id,
                PrincipalUpdate {
                    email: Some("bob@x.com".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(AuthError::Conflict(_))));

        store
            .update_fields(
                alice.id,
                PrincipalUpdate {
                    email: Some("alice@y.com".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("record");

        assert!(
            store
                .find_by_handle_or_email(None, Some("alice@x.com"))
                .await
                .expect("lookup")
                .is_none()
        );
        let moved = store
            .find_by_handle_or_email(None, Some("alice@y.com"))
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(moved.id, alice.id);
    }

    #[tokio::test]
    async fn offline_store_reports_backend_unavailable() {
        let store = MemoryCredentialStore::new();
        store.take_offline();
        assert!(matches!(
            store.find_by_id(PrincipalId::new()).await,
            Err(AuthError::BackendUnavailable(_))
        ));
        store.bring_online();
        assert!(store.ping().await.is_ok());
    }
}
