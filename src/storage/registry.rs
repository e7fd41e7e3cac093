// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity registry backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: canonical email → serialized [`Account`]
//! - `referral_codes`: referral code → canonical email (uniqueness index)
//! - `wallet_owners`: normalized wallet address → canonical email (uniqueness index)
//!
//! Every mutation runs inside a single write transaction. redb admits one
//! writer at a time, so each check-then-write below is atomic with respect to
//! every other mutation, across all handler tasks.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::models::WalletAddress;
use crate::validation::canonical_email;

// =============================================================================
// Table Definitions
// =============================================================================

const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

const REFERRAL_CODES: TableDefinition<&str, &str> = TableDefinition::new("referral_codes");

const WALLET_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("wallet_owners");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("registry directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("account already exists: {0}")]
    DuplicateEmail(String),

    #[error("referral code already assigned: {0}")]
    DuplicateReferralCode(String),

    #[error("wallet is linked to another account")]
    WalletTaken,

    #[error("account not found or not verified: {0}")]
    NotEligible(String),

    #[error("account not found: {0}")]
    NotFound(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// Records
// =============================================================================

/// One waitlist account, keyed by canonical email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub referral_code: String,
    #[serde(default)]
    pub referred_by: Option<String>,
    pub is_verified: bool,
    /// Authenticated principal that completed verification. Set once.
    #[serde(default)]
    pub verified_identity_id: Option<String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when an account is first created.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

/// Lifecycle position of an email in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Absent,
    Unverified(Account),
    Verified(Account),
}

impl From<Option<Account>> for AccountState {
    fn from(account: Option<Account>) -> Self {
        match account {
            None => AccountState::Absent,
            Some(a) if a.is_verified => AccountState::Verified(a),
            Some(a) => AccountState::Unverified(a),
        }
    }
}

/// Result of a verification write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The account flipped from unverified to verified.
    Applied(Account),
    /// The account was already verified; nothing changed.
    Unchanged(Account),
}

impl Verification {
    pub fn account(&self) -> &Account {
        match self {
            Verification::Applied(a) | Verification::Unchanged(a) => a,
        }
    }
}

// =============================================================================
// AccountRegistry
// =============================================================================

/// Persistent store of waitlist accounts.
pub struct AccountRegistry {
    db: Database,
}

impl AccountRegistry {
    /// Open (or create) the registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(REFERRAL_CODES)?;
            let _ = write_txn.open_table(WALLET_OWNERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Confirm the database can serve a read transaction.
    pub fn health_check(&self) -> RegistryResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ACCOUNTS)?;
        Ok(())
    }

    /// Look up an account by email.
    pub fn get(&self, email: &str) -> RegistryResult<Option<Account>> {
        let key = canonical_email(email);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Current lifecycle state for an email.
    pub fn state(&self, email: &str) -> RegistryResult<AccountState> {
        Ok(self.get(email)?.into())
    }

    /// Insert a new unverified account.
    ///
    /// Fails with [`RegistryError::DuplicateEmail`] if the email is taken and
    /// [`RegistryError::DuplicateReferralCode`] if the code is; nothing is
    /// written in either case.
    pub fn create(&self, new: NewAccount, now: DateTime<Utc>) -> RegistryResult<Account> {
        let account = Account {
            email: canonical_email(&new.email),
            referral_code: new.referral_code,
            referred_by: new.referred_by,
            is_verified: false,
            verified_identity_id: None,
            verified_at: None,
            wallet_address: None,
            created_at: now,
        };
        let json = serde_json::to_vec(&account)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut accounts = write_txn.open_table(ACCOUNTS)?;
            if accounts.get(account.email.as_str())?.is_some() {
                return Err(RegistryError::DuplicateEmail(account.email));
            }

            let mut codes = write_txn.open_table(REFERRAL_CODES)?;
            if codes.get(account.referral_code.as_str())?.is_some() {
                return Err(RegistryError::DuplicateReferralCode(account.referral_code));
            }

            codes.insert(account.referral_code.as_str(), account.email.as_str())?;
            accounts.insert(account.email.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(account)
    }

    /// Mark an account verified by `identity_id`.
    ///
    /// Matched by email only. The first call sets the identity and timestamp;
    /// later calls leave the record untouched and report
    /// [`Verification::Unchanged`].
    pub fn mark_verified(
        &self,
        email: &str,
        identity_id: &str,
        now: DateTime<Utc>,
    ) -> RegistryResult<Verification> {
        let key = canonical_email(email);

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut accounts = write_txn.open_table(ACCOUNTS)?;

            let existing_bytes = accounts
                .get(key.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
            let mut account: Account = serde_json::from_slice(&existing_bytes)?;

            if account.is_verified {
                Verification::Unchanged(account)
            } else {
                account.is_verified = true;
                account.verified_identity_id = Some(identity_id.to_string());
                account.verified_at = Some(now);
                let json = serde_json::to_vec(&account)?;
                accounts.insert(key.as_str(), json.as_slice())?;
                Verification::Applied(account)
            }
        };

        match outcome {
            Verification::Applied(_) => write_txn.commit()?,
            Verification::Unchanged(_) => write_txn.abort()?,
        }
        Ok(outcome)
    }

    /// Bind `wallet` to the verified account at `email`.
    ///
    /// Checks run in order inside one write transaction:
    /// 1. the wallet must not belong to any other account ([`RegistryError::WalletTaken`]);
    /// 2. the account must exist and be verified ([`RegistryError::NotEligible`]).
    ///
    /// Re-linking replaces the account's previous wallet and frees it.
    pub fn link_wallet(&self, email: &str, wallet: &WalletAddress) -> RegistryResult<Account> {
        let key = canonical_email(email);

        let write_txn = self.db.begin_write()?;
        let account = {
            let mut owners = write_txn.open_table(WALLET_OWNERS)?;
            let current_owner = owners.get(wallet.as_str())?.map(|v| v.value().to_string());
            if current_owner.as_deref().is_some_and(|owner| owner != key) {
                return Err(RegistryError::WalletTaken);
            }

            let mut accounts = write_txn.open_table(ACCOUNTS)?;
            let existing_bytes = accounts.get(key.as_str())?.map(|v| v.value().to_vec());
            let mut account: Account = match existing_bytes {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => return Err(RegistryError::NotEligible(key)),
            };
            if !account.is_verified {
                return Err(RegistryError::NotEligible(key));
            }

            if let Some(previous) = account.wallet_address.as_deref() {
                if previous != wallet.as_str() {
                    owners.remove(previous)?;
                }
            }
            owners.insert(wallet.as_str(), key.as_str())?;

            account.wallet_address = Some(wallet.as_str().to_string());
            let json = serde_json::to_vec(&account)?;
            accounts.insert(key.as_str(), json.as_slice())?;
            account
        };
        write_txn.commit()?;
        Ok(account)
    }

    /// Wallet linked to the account at `email`, if any.
    pub fn wallet_of(&self, email: &str) -> RegistryResult<Option<String>> {
        Ok(self.get(email)?.and_then(|a| a.wallet_address))
    }

    #[cfg(test)]
    fn wallet_owner(&self, wallet: &str) -> RegistryResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLET_OWNERS)?;
        Ok(table.get(wallet)?.map(|v| v.value().to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
