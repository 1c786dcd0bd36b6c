// FLAG STORE
// Flag table keyed by id, update audit records, and the unique
// transaction-id index.
//
// INVARIANTS:
// 1. Ids are allocated sequentially and never reused
// 2. At most one flag per external transaction id
// 3. Flags are never deleted
// 4. Each mutator validates all arithmetic before writing

use std::collections::{BTreeMap, HashMap};

use crate::error::DetectorError;
use crate::types::{Amount, Flag, FlagId, FlagStatus, FlagUpdate};

#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    flags: BTreeMap<FlagId, Flag>,
    updates: BTreeMap<FlagId, FlagUpdate>,
    by_tx_id: HashMap<String, FlagId>,
    next_flag_id: FlagId,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted flag will receive. Equals the number of flags.
    pub fn next_id(&self) -> FlagId {
        self.next_flag_id
    }

    pub fn count(&self) -> u64 {
        self.next_flag_id
    }

    pub fn contains_tx_id(&self, tx_id: &str) -> bool {
        self.by_tx_id.contains_key(tx_id)
    }

    pub fn get(&self, id: FlagId) -> Option<&Flag> {
        self.flags.get(&id)
    }

    pub fn get_by_tx_id(&self, tx_id: &str) -> Option<&Flag> {
        self.by_tx_id.get(tx_id).and_then(|id| self.flags.get(id))
    }

    pub fn update_record(&self, id: FlagId) -> Option<&FlagUpdate> {
        self.updates.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.values()
    }

    /// Store a new flag under the next id, which overrides `flag.id`.
    pub fn insert(&mut self, mut flag: Flag) -> Result<FlagId, DetectorError> {
        if self.by_tx_id.contains_key(&flag.tx_id) {
            return Err(DetectorError::FlagAlreadyExists(flag.tx_id));
        }
        let id = self.next_flag_id;
        let next = id.checked_add(1).ok_or(DetectorError::ArithmeticOverflow)?;

        flag.id = id;
        self.by_tx_id.insert(flag.tx_id.clone(), id);
        self.flags.insert(id, flag);
        self.next_flag_id = next;
        Ok(id)
    }

    /// Overwrite the submitter-mutable fields and the audit record.
    pub fn apply_update(&mut self, id: FlagId, update: FlagUpdate) -> Result<(), DetectorError> {
        let flag = self.flags.get_mut(&id).ok_or(DetectorError::FlagNotFound(id))?;
        flag.score = update.update_score;
        flag.flagged = update.update_flagged;
        flag.reason = update.update_reason.clone();
        flag.timestamp = update.update_timestamp;
        self.updates.insert(id, update);
        Ok(())
    }

    /// Add `amount` to one side of the tally and to `total_staked` together.
    pub fn add_to_tally(&mut self, id: FlagId, approve: bool, amount: Amount) -> Result<(), DetectorError> {
        let flag = self.flags.get_mut(&id).ok_or(DetectorError::FlagNotFound(id))?;
        if flag.status.is_terminal() {
            return Err(DetectorError::AlreadyFinalized(id));
        }

        let (yes, no) = if approve {
            (flag.yes_votes.checked_add(amount), Some(flag.no_votes))
        } else {
            (Some(flag.yes_votes), flag.no_votes.checked_add(amount))
        };
        let total = flag.total_staked.checked_add(amount);

        match (yes, no, total) {
            (Some(yes), Some(no), Some(total)) => {
                flag.yes_votes = yes;
                flag.no_votes = no;
                flag.total_staked = total;
                Ok(())
            }
            _ => Err(DetectorError::ArithmeticOverflow),
        }
    }

    /// Terminal status write. Fails if the flag already left `Pending`.
    pub fn close(&mut self, id: FlagId, status: FlagStatus) -> Result<(), DetectorError> {
        let flag = self.flags.get_mut(&id).ok_or(DetectorError::FlagNotFound(id))?;
        if flag.status.is_terminal() || !status.is_terminal() {
            return Err(DetectorError::AlreadyFinalized(id));
        }
        flag.status = status;
        flag.active = false;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{AnomalyType, Category, Principal};

    pub(crate) fn sample_flag(tx_id: &str) -> Flag {
        Flag {
            id: 0,
            tx_id: tx_id.to_string(),
            score: 85,
            flagged: true,
            anomaly_type: AnomalyType::Fraud,
            reason: "Suspicious pattern".to_string(),
            confidence: 90,
            timestamp: 0,
            submitter: Principal::from("ST1TEST"),
            active: true,
            location: "DeFi pool".to_string(),
            category: Category::Defi,
            priority: 8,
            expiry: 100,
            config_version: 0,
            created_at: 0,
            expires_at: 144,
            status: FlagStatus::Pending,
            yes_votes: 0,
            no_votes: 0,
            total_staked: 0,
        }
    }

    #[test]
    fn test_sequential_ids_and_index() {
        let mut store = FlagStore::new();
        assert_eq!(store.insert(sample_flag("tx1")).unwrap(), 0);
        assert_eq!(store.insert(sample_flag("tx2")).unwrap(), 1);

        assert_eq!(store.count(), 2);
        assert_eq!(store.get_by_tx_id("tx2").unwrap().id, 1);
        assert!(store.contains_tx_id("tx1"));
        assert!(!store.contains_tx_id("tx3"));
    }

    #[test]
    fn test_duplicate_tx_id_rejected_without_consuming_id() {
        let mut store = FlagStore::new();
        store.insert(sample_flag("tx1")).unwrap();
        assert_eq!(
            store.insert(sample_flag("tx1")),
            Err(DetectorError::FlagAlreadyExists("tx1".to_string()))
        );
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_tally_keeps_total_equal_to_sides() {
        let mut store = FlagStore::new();
        let id = store.insert(sample_flag("tx1")).unwrap();
        store.add_to_tally(id, true, 4_000_000).unwrap();
        store.add_to_tally(id, false, 2_000_000).unwrap();

        let flag = store.get(id).unwrap();
        assert_eq!(flag.yes_votes, 4_000_000);
        assert_eq!(flag.no_votes, 2_000_000);
        assert_eq!(flag.total_staked, flag.yes_votes + flag.no_votes);
    }

    #[test]
    fn test_tally_overflow_leaves_flag_untouched() {
        let mut store = FlagStore::new();
        let id = store.insert(sample_flag("tx1")).unwrap();
        store.add_to_tally(id, true, Amount::MAX).unwrap();
        assert_eq!(store.add_to_tally(id, false, 1), Err(DetectorError::ArithmeticOverflow));

        let flag = store.get(id).unwrap();
        assert_eq!(flag.no_votes, 0);
        assert_eq!(flag.total_staked, Amount::MAX);
    }

    #[test]
    fn test_close_is_terminal() {
        let mut store = FlagStore::new();
        let id = store.insert(sample_flag("tx1")).unwrap();
        store.close(id, FlagStatus::Confirmed).unwrap();
        assert!(!store.get(id).unwrap().active);
        assert_eq!(store.close(id, FlagStatus::Dismissed), Err(DetectorError::AlreadyFinalized(id)));
        assert_eq!(store.add_to_tally(id, true, 1), Err(DetectorError::AlreadyFinalized(id)));
    }
}
