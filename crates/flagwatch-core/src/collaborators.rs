// EXTERNAL COLLABORATORS
// Value movement and role checks are owned by the host. The engine only
// talks to them through these traits.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::TransferError;
use crate::types::{Amount, Principal};

/// Moves value between accounts.
pub trait TokenLedger: Send + Sync {
    fn transfer(&self, amount: Amount, from: &Principal, to: &Principal) -> Result<(), TransferError>;

    fn balance(&self, account: &Principal) -> Amount;
}

/// Identity / role checks.
pub trait RoleRegistry: Send + Sync {
    fn is_authorized_oracle(&self, identity: &Principal) -> bool;

    fn is_authorized_authority(&self, identity: &Principal) -> bool;
}

/// A completed transfer, recorded by [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub amount: Amount,
    pub from: Principal,
    pub to: Principal,
}

/// Balance table kept in memory. Records every successful transfer.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: RwLock<BTreeMap<Principal, Amount>>,
    transfers: RwLock<Vec<TransferRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `account` out of thin air (genesis / test funding).
    pub fn mint(&self, account: &Principal, amount: Amount) {
        let mut balances = self.balances.write();
        let balance = balances.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.transfers.read().clone()
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer(&self, amount: Amount, from: &Principal, to: &Principal) -> Result<(), TransferError> {
        if amount == 0 {
            return Err(TransferError::ZeroAmount);
        }
        if from == to {
            return Err(TransferError::SameAccount);
        }

        let mut balances = self.balances.write();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        let credited = balances
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| TransferError::BalanceOverflow(to.clone()))?;

        balances.insert(from.clone(), available - amount);
        balances.insert(to.clone(), credited);
        drop(balances);

        self.transfers.write().push(TransferRecord {
            amount,
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    fn balance(&self, account: &Principal) -> Amount {
        self.balances.read().get(account).copied().unwrap_or(0)
    }
}

/// Fixed oracle and authority sets, mutable for tests and scenario setup.
#[derive(Debug, Default)]
pub struct StaticRoles {
    oracles: RwLock<BTreeSet<Principal>>,
    authorities: RwLock<BTreeSet<Principal>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members<I, J>(oracles: I, authorities: J) -> Self
    where
        I: IntoIterator<Item = Principal>,
        J: IntoIterator<Item = Principal>,
    {
        StaticRoles {
            oracles: RwLock::new(oracles.into_iter().collect()),
            authorities: RwLock::new(authorities.into_iter().collect()),
        }
    }

    pub fn grant_oracle(&self, identity: Principal) {
        self.oracles.write().insert(identity);
    }

    pub fn revoke_oracle(&self, identity: &Principal) {
        self.oracles.write().remove(identity);
    }

    pub fn grant_authority(&self, identity: Principal) {
        self.authorities.write().insert(identity);
    }
}

impl RoleRegistry for StaticRoles {
    fn is_authorized_oracle(&self, identity: &Principal) -> bool {
        self.oracles.read().contains(identity)
    }

    fn is_authorized_authority(&self, identity: &Principal) -> bool {
        self.authorities.read().contains(identity)
    }
}
