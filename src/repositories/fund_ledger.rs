//! Fund ledger: per-account, per-asset balances plus an append-only flow history.
//!
//! Every account has its own book behind a mutex, so different accounts move
//! in parallel while operations on one account are serialized. Each mutation
//! checks, updates the free/locked counters and appends its flow record while
//! holding the book, so the history never disagrees with the counters.

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{AccountBalance, AccountId, AssetId, FlowKind, FlowRecord};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error};

#[derive(Debug, Default)]
struct AccountBook {
    balances: HashMap<AssetId, AccountBalance>,
    flow_records: Vec<FlowRecord>,
    /// Set when an invariant breaks; the book refuses all further mutation
    frozen: Option<String>,
}

impl AccountBook {
    fn balance(&self, asset: &AssetId) -> AccountBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    fn ensure_writable(&self, account: &AccountId) -> AppResult<()> {
        match &self.frozen {
            Some(reason) => Err(AppError::LedgerInvariantViolation(format!(
                "Account {} is frozen: {}",
                account, reason
            ))),
            None => Ok(()),
        }
    }

    fn freeze(&mut self, account: &AccountId, reason: String) -> AppError {
        error!("Ledger invariant violated for account {}: {}", account, reason);
        self.frozen = Some(reason.clone());
        AppError::LedgerInvariantViolation(format!("Account {}: {}", account, reason))
    }

    fn commit(&mut self, asset: &AssetId, next: AccountBalance, kind: FlowKind, amount: u64, timestamp: i64) {
        self.balances.insert(asset.clone(), next);
        self.flow_records.push(FlowRecord {
            kind,
            asset: asset.clone(),
            amount,
            resulting_balance: next.free,
            resulting_locked: next.locked,
            timestamp,
        });
    }
}

/// Outcome of applying one flow to a balance, before it is committed
fn apply_flow(current: AccountBalance, kind: FlowKind, amount: u64) -> Result<AccountBalance, FlowFailure> {
    let overflow = || FlowFailure::Invariant(format!("{} of {} overflows balance", kind.as_str(), amount));
    let mut next = current;
    match kind {
        FlowKind::Deposit | FlowKind::Payout => {
            next.free = current.free.checked_add(amount).ok_or_else(overflow)?;
        }
        FlowKind::Withdraw => {
            next.free = current.free.checked_sub(amount).ok_or(FlowFailure::Insufficient {
                available: current.free,
                required: amount,
            })?;
        }
        FlowKind::Lock => {
            next.free = current.free.checked_sub(amount).ok_or(FlowFailure::Insufficient {
                available: current.free,
                required: amount,
            })?;
            next.locked = current.locked.checked_add(amount).ok_or_else(overflow)?;
        }
        FlowKind::Release | FlowKind::Forfeit => {
            next.locked = current.locked.checked_sub(amount).ok_or_else(|| {
                FlowFailure::Invariant(format!(
                    "{} of {} exceeds locked balance {}",
                    kind.as_str(),
                    amount,
                    current.locked
                ))
            })?;
            if kind == FlowKind::Release {
                next.free = current.free.checked_add(amount).ok_or_else(overflow)?;
            }
        }
    }
    Ok(next)
}

enum FlowFailure {
    Insufficient { available: u64, required: u64 },
    Invariant(String),
}

/// One leg of a settlement batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementLeg {
    pub account: AccountId,
    pub kind: FlowKind,
    pub amount: u64,
}

pub struct FundLedger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountBook>>>>,
    clock: Arc<dyn Clock>,
}

impl FundLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            clock,
        }
    }

    async fn book(&self, account: &AccountId) -> Arc<Mutex<AccountBook>> {
        if let Some(book) = self.accounts.read().await.get(account) {
            return book.clone();
        }
        self.accounts
            .write()
            .await
            .entry(account.clone())
            .or_default()
            .clone()
    }

    async fn existing_book(&self, account: &AccountId) -> Option<Arc<Mutex<AccountBook>>> {
        self.accounts.read().await.get(account).cloned()
    }

    /// Apply a single flow to one account under its lock
    async fn apply(
        &self,
        account: &AccountId,
        asset: &AssetId,
        kind: FlowKind,
        amount: u64,
    ) -> AppResult<AccountBalance> {
        if amount == 0 {
            return Err(AppError::Validation(format!(
                "{} amount must be greater than zero",
                kind.as_str()
            )));
        }

        let book = self.book(account).await;
        let mut book = book.lock().await;
        book.ensure_writable(account)?;

        let current = book.balance(asset);
        let next = match apply_flow(current, kind, amount) {
            Ok(next) => next,
            Err(FlowFailure::Insufficient { available, required }) => {
                return Err(AppError::InsufficientFunds { available, required })
            }
            Err(FlowFailure::Invariant(reason)) => return Err(book.freeze(account, reason)),
        };

        book.commit(asset, next, kind, amount, self.clock.now());
        debug!(
            "{} {} {} for {}: free {} locked {}",
            kind.as_str(),
            amount,
            asset,
            account,
            next.free,
            next.locked
        );
        Ok(next)
    }

    // =========================================================================
    // User-facing operations
    // =========================================================================

    /// Credit free balance from outside the venue
    pub async fn deposit(&self, account: &AccountId, asset: &AssetId, amount: u64) -> AppResult<AccountBalance> {
        self.apply(account, asset, FlowKind::Deposit, amount).await
    }

    /// Debit free balance; locked stake is never withdrawable
    pub async fn withdraw(&self, account: &AccountId, asset: &AssetId, amount: u64) -> AppResult<AccountBalance> {
        self.apply(account, asset, FlowKind::Withdraw, amount).await
    }

    /// Free balance
    pub async fn get_user_token_balance(&self, account: &AccountId, asset: &AssetId) -> u64 {
        self.get_balance(account, asset).await.free
    }

    pub async fn get_locked_balance(&self, account: &AccountId, asset: &AssetId) -> u64 {
        self.get_balance(account, asset).await.locked
    }

    pub async fn get_balance(&self, account: &AccountId, asset: &AssetId) -> AccountBalance {
        match self.existing_book(account).await {
            Some(book) => book.lock().await.balance(asset),
            None => AccountBalance::default(),
        }
    }

    /// Snapshot of the account's full ordered history
    pub async fn get_user_token_fund_flow_records(&self, account: &AccountId) -> Vec<FlowRecord> {
        match self.existing_book(account).await {
            Some(book) => book.lock().await.flow_records.clone(),
            None => Vec::new(),
        }
    }

    /// Sum of locked stake across all accounts for one asset
    pub async fn total_locked(&self, asset: &AssetId) -> u64 {
        let books: Vec<_> = self.accounts.read().await.values().cloned().collect();
        let mut total = 0;
        for book in books {
            total += book.lock().await.balance(asset).locked;
        }
        total
    }

    /// Replay the account history and compare with its counters.
    /// A mismatch freezes the account.
    pub async fn verify_account(&self, account: &AccountId) -> AppResult<()> {
        let Some(book) = self.existing_book(account).await else {
            return Ok(());
        };
        let mut book = book.lock().await;

        let assets: Vec<AssetId> = book.balances.keys().cloned().collect();
        for asset in assets {
            let replayed = replay_balances(&book.flow_records, &asset);
            let expected = book.balance(&asset);
            if replayed.as_ref().ok() != Some(&expected) {
                return Err(book.freeze(
                    account,
                    format!("History of {} does not reproduce balance {:?}", asset, expected),
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Room registry operations
    // =========================================================================

    /// Move stake from free to locked standing
    pub async fn lock(&self, account: &AccountId, asset: &AssetId, amount: u64) -> AppResult<AccountBalance> {
        self.apply(account, asset, FlowKind::Lock, amount).await
    }

    /// Move previously locked stake back to free standing
    pub async fn release(&self, account: &AccountId, asset: &AssetId, amount: u64) -> AppResult<AccountBalance> {
        self.apply(account, asset, FlowKind::Release, amount).await
    }

    /// Credit a winner from a settling room's pool
    pub async fn payout(&self, account: &AccountId, asset: &AssetId, amount: u64) -> AppResult<AccountBalance> {
        self.apply(account, asset, FlowKind::Payout, amount).await
    }

    /// Apply every leg of a room settlement, or none of them.
    ///
    /// Books are locked in account order so concurrent batches cannot
    /// deadlock. All legs are validated against a scratch copy first.
    pub async fn settle_batch(&self, asset: &AssetId, legs: &[SettlementLeg]) -> AppResult<()> {
        let accounts: BTreeSet<AccountId> = legs.iter().map(|l| l.account.clone()).collect();

        let mut guards: HashMap<AccountId, OwnedMutexGuard<AccountBook>> = HashMap::new();
        for account in &accounts {
            let book = self.book(account).await;
            let guard = book.lock_owned().await;
            guard.ensure_writable(account)?;
            guards.insert(account.clone(), guard);
        }

        let mut scratch: HashMap<AccountId, AccountBalance> = guards
            .iter()
            .map(|(account, book)| (account.clone(), book.balance(asset)))
            .collect();

        for leg in legs {
            if leg.amount == 0 {
                continue;
            }
            let current = scratch[&leg.account];
            let reason = match apply_flow(current, leg.kind, leg.amount) {
                Ok(next) => {
                    scratch.insert(leg.account.clone(), next);
                    continue;
                }
                Err(FlowFailure::Insufficient { available, required }) => format!(
                    "settlement {} of {} with only {} available",
                    leg.kind.as_str(),
                    required,
                    available
                ),
                Err(FlowFailure::Invariant(reason)) => reason,
            };
            return Err(match guards.get_mut(&leg.account) {
                Some(book) => book.freeze(&leg.account, reason),
                None => AppError::LedgerInvariantViolation(reason),
            });
        }

        let timestamp = self.clock.now();
        for leg in legs {
            if leg.amount == 0 {
                continue;
            }
            if let Some(book) = guards.get_mut(&leg.account) {
                let current = book.balance(asset);
                if let Ok(next) = apply_flow(current, leg.kind, leg.amount) {
                    book.commit(asset, next, leg.kind, leg.amount, timestamp);
                }
            }
        }

        Ok(())
    }
}

/// Rebuild free and locked balances of one asset from a flow history
pub fn replay_balances<'a>(
    records: impl IntoIterator<Item = &'a FlowRecord>,
    asset: &AssetId,
) -> AppResult<AccountBalance> {
    let mut free: i128 = 0;
    let mut locked: i128 = 0;
    for record in records.into_iter().filter(|r| &r.asset == asset) {
        free += record.kind.free_delta(record.amount);
        locked += record.kind.locked_delta(record.amount);
        if free < 0 || locked < 0 {
            return Err(AppError::LedgerInvariantViolation(format!(
                "Replay of {} went negative at {} record",
                asset,
                record.kind.as_str()
            )));
        }
    }
    Ok(AccountBalance {
        free: free as u64,
        locked: locked as u64,
    })
}
