use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{AccountStore, StorageError};
use crate::model::account::{
    username::USERNAME_MAX_LENGTH, Account, AccountField, AccountId,
};

/// An [`AccountStore`] that keeps accounts in memory, with the same constraints as the database.
///
/// Clones share the same accounts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStore {
    state: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    last_id: AccountId,
    accounts: BTreeMap<AccountId, Account>,
    writes: u64,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of successful inserts and updates so far.
    pub fn write_count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.writes)
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, StorageError> {
        self.state.lock().map_err(|error| StorageError::Database {
            source: error.to_string().into(),
        })
    }
}

impl InMemoryState {
    fn check_constraints(
        &self,
        account: &Account,
        own_id: Option<AccountId>,
    ) -> Result<(), StorageError> {
        let username = account.username.as_ref();
        let length = account.username.len_chars();
        if length > USERNAME_MAX_LENGTH {
            return Err(StorageError::DataError {
                field: AccountField::Username,
                message: format!(
                    "value too long for a maximum length of {USERNAME_MAX_LENGTH} characters (got {length})"
                ),
            });
        }

        if self
            .accounts
            .iter()
            .any(|(id, stored)| Some(*id) != own_id && stored.username.as_ref() == username)
        {
            return Err(StorageError::UniqueViolation {
                field: AccountField::Username,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: &Account) -> Result<AccountId, StorageError> {
        let mut state = self.lock()?;
        state.check_constraints(account, None)?;

        state.last_id += 1;
        let id = state.last_id;
        let mut stored = account.clone();
        stored.id = Some(id);
        state.accounts.insert(id, stored);
        state.writes += 1;

        Ok(id)
    }

    async fn update(&self, id: AccountId, account: &Account) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(&id) {
            return Err(StorageError::NotFound { id });
        }
        state.check_constraints(account, Some(id))?;

        let mut stored = account.clone();
        stored.id = Some(id);
        state.accounts.insert(id, stored);
        state.writes += 1;

        Ok(())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StorageError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|account| account.username.as_ref() == username)
            .cloned())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.accounts.len() as u64)
    }

    async fn list(&self) -> Result<Vec<Account>, StorageError> {
        Ok(self.lock()?.accounts.values().cloned().collect())
    }
}
