//! The transaction state manager: the single entry point for every mutation
//! of the transaction list.
//!
//! Reads and writes go through an injected [`TxStore`] as whole-list
//! operations. Every mutation validates, appends an audit history entry,
//! persists, and only then notifies subscribers, so a listener calling back
//! into the manager always observes committed state.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::events::{StatusBus, StatusEvent};
use crate::history::{self, HistoryEntry};
use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::network::{NetworkProvider, NetworkState};
use crate::store::TxStore;
use crate::transaction::validation::{self, DEFAULT_STATUSES};
use crate::transaction::{ErrInfo, Status, TxId, TxParams, TxRecord};

/// What committing a status tag additionally does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Plain,
    CommitAndRemove,
    AttachErrThenCommit,
}

/// Ordered set of equality conditions over records.
///
/// Each key resolves against `txParams` first when present there, then the
/// record's top level. `absent` matches records where the key appears in
/// neither place, which is how callers search for transactions without an
/// error attached.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    conditions: Vec<(String, Option<Value>)>,
}

impl TxFilter {
    pub fn new() -> Self {
        TxFilter::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), Some(value.into())));
        self
    }

    pub fn absent(mut self, key: impl Into<String>) -> Self {
        self.conditions.push((key.into(), None));
        self
    }

    pub fn matches(&self, record_value: &Value) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            let resolved = resolve_key(record_value, key);
            match expected {
                Some(value) => resolved == Some(value),
                None => resolved.is_none(),
            }
        })
    }
}

fn resolve_key<'a>(record_value: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(params) = record_value.get("txParams").and_then(Value::as_object) {
        if let Some(value) = params.get(key) {
            return Some(value);
        }
    }
    record_value.get(key)
}

/// Authoritative owner of the transaction list and its lifecycle rules
pub struct TxStateManager {
    store: Arc<dyn TxStore>,
    network: Arc<dyn NetworkProvider>,
    ids: Box<dyn IdGenerator>,
    bus: StatusBus,
    history_limit: usize,
    transitions: HashMap<String, TransitionKind>,
    // serializes every read-modify-write of the list
    write_lock: Mutex<()>,
}

impl TxStateManager {
    /// Build a manager over the given container and network provider.
    ///
    /// A non-empty `initial_records` seed replaces the container's contents;
    /// seeds arriving without a history get one initialized so later updates
    /// can replay them. Every record present afterwards gets its notification
    /// channel opened, so reloaded state is subscribable right away.
    pub fn new(
        config: StoreConfig,
        store: Arc<dyn TxStore>,
        network: Arc<dyn NetworkProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = TxStateManager {
            store,
            network,
            ids: Box::new(RandomIdGenerator::new()),
            bus: StatusBus::new(),
            history_limit: config.history_limit,
            transitions: build_transition_table(&config),
            write_lock: Mutex::new(()),
        };
        if !config.initial_records.is_empty() {
            let mut seeds = config.initial_records;
            for record in &mut seeds {
                if record.history.is_empty() {
                    let snap = history::snapshot(record)?;
                    record.history.push(HistoryEntry::Snapshot(snap));
                }
            }
            manager.store.write(seeds)?;
        }
        let records = manager.store.read();
        for record in &records {
            manager.bus.open_channel(record.id);
        }
        info!(
            "Transaction state store ready ({} records, history limit {})",
            records.len(),
            manager.history_limit
        );
        Ok(manager)
    }

    /// Swap the id source, mainly for deterministic tests
    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Fresh unsaved record on the current network: generated id, creation
    /// time, `unapproved` status, defaults still loading. Fails fast while
    /// the network provider is still resolving. Callers layer their own
    /// fields on top through the record's `with_` methods.
    pub fn generate_tx_meta(&self) -> Result<TxRecord> {
        let network_id = match self.network.current_network() {
            NetworkState::Online(id) => id,
            NetworkState::Loading => return Err(StoreError::NetworkUnavailable),
        };
        Ok(TxRecord::new(self.ids.new_id(), network_id))
    }

    /// Add a record to the list, initializing its audit history with a full
    /// snapshot. When the list is already at the history limit the earliest
    /// record in a final status is evicted first; unfinished records are
    /// never evicted, so the list may exceed the limit. Returns the record
    /// as stored.
    pub fn add_tx(&self, record: TxRecord) -> Result<TxRecord> {
        let mut record = record;
        // whatever history the caller carried is not ours to trust
        record.history.clear();
        let snap = history::snapshot(&record)?;
        record.history.push(HistoryEntry::Snapshot(snap));

        let stored = {
            let _guard = self.write_lock.lock();
            let mut records = self.store.read();
            if records.len() >= self.history_limit {
                if let Some(index) = records.iter().position(|r| r.status.is_final()) {
                    let evicted = records.remove(index);
                    debug!("Evicting finished tx {} ({})", evicted.id, evicted.status);
                }
            }
            records.push(record.clone());
            self.store.write(records)?;
            record
        };

        self.bus.open_channel(stored.id);
        self.bus.publish_global(stored.id, &stored.status);
        info!(
            "Added tx {} on network {} ({})",
            stored.id, stored.network_id, stored.status
        );
        Ok(stored)
    }

    /// Defensive copy of the record with the given id, from any network
    pub fn get_tx(&self, id: TxId) -> Option<TxRecord> {
        self.store.read().into_iter().find(|record| record.id == id)
    }

    /// Every record, across all networks, in insertion order
    pub fn get_full_tx_list(&self) -> Vec<TxRecord> {
        self.store.read()
    }

    /// Records belonging to the current network. Empty while the network
    /// provider is still resolving.
    pub fn get_tx_list(&self) -> Vec<TxRecord> {
        match self.network.current_network() {
            NetworkState::Online(network) => self
                .store
                .read()
                .into_iter()
                .filter(|record| record.network_id == network)
                .collect(),
            NetworkState::Loading => Vec::new(),
        }
    }

    /// Current-network records still awaiting user approval, keyed by id
    pub fn get_unapproved_tx_list(&self) -> HashMap<TxId, TxRecord> {
        let filter = TxFilter::new().field("status", Status::UNAPPROVED);
        self.get_filtered_tx_list(&filter, None)
            .into_iter()
            .map(|record| (record.id, record))
            .collect()
    }

    pub fn get_approved_transactions(&self, address: Option<&str>) -> Vec<TxRecord> {
        self.status_scoped(Status::APPROVED, address)
    }

    /// Submitted but not yet confirmed
    pub fn get_pending_transactions(&self, address: Option<&str>) -> Vec<TxRecord> {
        self.status_scoped(Status::SUBMITTED, address)
    }

    pub fn get_confirmed_transactions(&self, address: Option<&str>) -> Vec<TxRecord> {
        self.status_scoped(Status::CONFIRMED, address)
    }

    fn status_scoped(&self, status: &str, address: Option<&str>) -> Vec<TxRecord> {
        let mut filter = TxFilter::new().field("status", status);
        if let Some(address) = address {
            filter = filter.field("from", address);
        }
        self.get_filtered_tx_list(&filter, None)
    }

    /// Records matching every filter condition. The candidate list defaults
    /// to the current-network list.
    pub fn get_filtered_tx_list(
        &self,
        filter: &TxFilter,
        initial_list: Option<Vec<TxRecord>>,
    ) -> Vec<TxRecord> {
        let candidates = initial_list.unwrap_or_else(|| self.get_tx_list());
        candidates
            .into_iter()
            .filter(|record| {
                serde_json::to_value(record)
                    .map(|value| filter.matches(&value))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Replace the stored record and append a history entry describing the
    /// change.
    ///
    /// Params are validated first and a violation aborts the whole update.
    /// The pre-edit state is reconstructed by replaying the passed record's
    /// own history, so the diff captures exactly what this caller changed.
    /// An update that changes nothing still appends an empty entry.
    /// Subscribers are notified only when the status differs from the
    /// previously stored one, and only after the new list is persisted.
    pub fn update_tx(&self, record: TxRecord, note: Option<&str>) -> Result<()> {
        let mut record = record;
        if let Some(params) = record.tx_params.as_mut() {
            validation::validate_tx_params(params)?;
        }

        let current_state = history::snapshot(&record)?;
        let previous_state = history::replay(&record.history)?;
        let entry = history::generate_entry(&previous_state, &current_state, note);
        record.history.push(HistoryEntry::Diff(entry));

        let id = record.id;
        let new_status = record.status.clone();

        let previous_status = {
            let _guard = self.write_lock.lock();
            let mut records = self.store.read();
            let index = records
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::UnknownTransaction(id))?;
            let previous_status = records[index].status.clone();
            records[index] = record;
            self.store.write(records)?;
            previous_status
        };

        if previous_status != new_status {
            debug!("tx {} status {} -> {}", id, previous_status, new_status);
            self.bus.publish(id, &new_status);
        }
        Ok(())
    }

    /// Shallow-merge new params onto the stored record's params and commit
    /// the result as a regular update
    pub fn update_tx_params(&self, id: TxId, params: TxParams) -> Result<()> {
        let mut record = self.get_tx(id).ok_or(StoreError::UnknownTransaction(id))?;
        match record.tx_params.as_mut() {
            Some(existing) => existing.merge(params),
            None => record.tx_params = Some(params),
        }
        self.update_tx(record, Some("tx_state_manager::update_tx_params"))
    }

    pub fn get_tx_status(&self, id: TxId) -> Option<Status> {
        self.get_tx(id).map(|record| record.status)
    }

    /// Transition a record to `status`, dispatching through the transition
    /// table built at construction. Tags outside the configured set are
    /// rejected; a missing id is a silent no-op.
    pub fn set_status(&self, id: TxId, status: Status) -> Result<()> {
        match self.transitions.get(status.as_str()) {
            Some(TransitionKind::Plain) => self.commit_status(id, status),
            Some(TransitionKind::CommitAndRemove) => {
                self.commit_status(id, status)?;
                self.remove_tx(id)
            }
            Some(TransitionKind::AttachErrThenCommit) => self.fail_tx(id, None),
            None => Err(StoreError::UnknownStatus(status.as_str().to_string())),
        }
    }

    pub fn set_status_unapproved(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::unapproved())
    }

    pub fn set_status_approved(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::approved())
    }

    pub fn set_status_signed(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::signed())
    }

    pub fn set_status_submitted(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::submitted())
    }

    pub fn set_status_confirmed(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::confirmed())
    }

    pub fn set_status_dropped(&self, id: TxId) -> Result<()> {
        self.set_status(id, Status::dropped())
    }

    /// Commit the `rejected` transition so listeners observe it, then
    /// permanently remove the record and tear down its channel
    pub fn set_status_rejected(&self, id: TxId) -> Result<()> {
        self.commit_status(id, Status::rejected())?;
        self.remove_tx(id)
    }

    /// Attach failure details to the record, then transition it to `failed`.
    /// Without explicit details a generic internal-failure placeholder is
    /// attached.
    pub fn set_status_failed(&self, id: TxId, err: Option<ErrInfo>) -> Result<()> {
        self.fail_tx(id, err)
    }

    /// Remove every current-network record originating from `address`.
    /// Bulk cleanup: no notifications fire, channels are closed silently.
    pub fn wipe_transactions(&self, address: &str) -> Result<()> {
        let network = match self.network.current_network() {
            NetworkState::Online(id) => id,
            NetworkState::Loading => return Ok(()),
        };
        let wiped: Vec<TxId> = {
            let _guard = self.write_lock.lock();
            let records = self.store.read();
            let (wiped, kept): (Vec<TxRecord>, Vec<TxRecord>) =
                records.into_iter().partition(|record| {
                    record.network_id == network && record.from_address() == Some(address)
                });
            if wiped.is_empty() {
                return Ok(());
            }
            self.store.write(kept)?;
            wiped.into_iter().map(|record| record.id).collect()
        };
        for id in &wiped {
            self.bus.close_channel(*id);
        }
        info!(
            "Wiped {} transactions for {} on network {}",
            wiped.len(),
            address,
            network
        );
        Ok(())
    }

    /// Listen for status transitions of one transaction, optionally only for
    /// a specific status. Returns false when the id has no channel.
    pub fn subscribe<F>(&self, id: TxId, status: Option<Status>, listener: F) -> bool
    where
        F: Fn(TxId, &Status) + Send + Sync + 'static,
    {
        self.bus.subscribe(id, status, listener)
    }

    /// Listen for every status transition of every transaction
    pub fn subscribe_all<F>(&self, listener: F)
    where
        F: Fn(TxId, &Status) + Send + Sync + 'static,
    {
        self.bus.subscribe_all(listener)
    }

    /// Receiver-based mirror of the wildcard stream
    pub fn status_events(&self) -> Receiver<StatusEvent> {
        self.bus.event_feed()
    }

    fn commit_status(&self, id: TxId, status: Status) -> Result<()> {
        let record = match self.get_tx(id) {
            Some(record) => record,
            None => return Ok(()),
        };
        let note = format!("tx_state_manager: setting status to {}", status);
        self.update_tx(record.with_status(status), Some(&note))
    }

    fn fail_tx(&self, id: TxId, err: Option<ErrInfo>) -> Result<()> {
        let mut record = match self.get_tx(id) {
            Some(record) => record,
            None => return Ok(()),
        };
        record.err = Some(err.unwrap_or_else(ErrInfo::internal_failure));
        self.update_tx(record, Some("tx_state_manager::fail - attach error"))?;
        self.commit_status(id, Status::failed())
    }

    fn remove_tx(&self, id: TxId) -> Result<()> {
        self.bus.close_channel(id);
        let _guard = self.write_lock.lock();
        let mut records = self.store.read();
        records.retain(|record| record.id != id);
        self.store.write(records)
    }
}

fn build_transition_table(config: &StoreConfig) -> HashMap<String, TransitionKind> {
    let mut table = HashMap::new();
    match &config.custom_status_list {
        Some(statuses) => {
            for tag in statuses {
                table.insert(tag.clone(), TransitionKind::Plain);
            }
        }
        None => {
            for tag in DEFAULT_STATUSES {
                table.insert((*tag).to_string(), TransitionKind::Plain);
            }
        }
    }
    // rejected and failed keep their side effects even when a custom list
    // names them
    table.insert(Status::REJECTED.to_string(), TransitionKind::CommitAndRemove);
    table.insert(Status::FAILED.to_string(), TransitionKind::AttachErrThenCommit);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use crate::network::FixedNetwork;
    use crate::store::InMemoryStore;
    use parking_lot::Mutex as PlainMutex;
    use serde_json::json;

    const FROM: &str = "0x1eab9f224d45b618a5dd797c1ab394b4d3b5f0b4";
    const OTHER_FROM: &str = "0x5c21ed6b1e4a1a33ab82b77e81d2914cbd58cdcb";

    fn manager_on(network: &str, limit: usize) -> TxStateManager {
        TxStateManager::new(
            StoreConfig::new().with_history_limit(limit),
            Arc::new(InMemoryStore::new()),
            Arc::new(FixedNetwork::new(network)),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()))
    }

    fn params() -> TxParams {
        TxParams::new().with_from(FROM).with_gas_price("0x4a817c800")
    }

    fn unapproved_tx(manager: &TxStateManager) -> TxRecord {
        manager.generate_tx_meta().unwrap().with_params(params())
    }

    #[test]
    fn test_generate_tx_meta_defaults() {
        let manager = manager_on("42", 40);
        let record = manager.generate_tx_meta().unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.network_id, "42");
        assert_eq!(record.status, Status::unapproved());
        assert!(record.loading_defaults);
        assert!(record.history.is_empty());
    }

    #[test]
    fn test_generate_tx_meta_fails_while_loading() {
        let manager = TxStateManager::new(
            StoreConfig::new(),
            Arc::new(InMemoryStore::new()),
            Arc::new(|| NetworkState::Loading),
        )
        .unwrap();
        match manager.generate_tx_meta() {
            Err(StoreError::NetworkUnavailable) => {}
            other => panic!("Expected NetworkUnavailable, got {:?}", other.map(|r| r.id)),
        }
    }

    #[test]
    fn test_add_tx_initializes_history_snapshot() {
        let manager = manager_on("42", 40);
        let mut record = unapproved_tx(&manager);
        // caller-supplied history must be discarded
        record
            .history
            .push(HistoryEntry::Snapshot(json!({"bogus": true})));

        let stored = manager.add_tx(record).unwrap();
        assert_eq!(stored.history.len(), 1);
        let snap = match &stored.history[0] {
            HistoryEntry::Snapshot(value) => value,
            HistoryEntry::Diff(_) => panic!("history must start with a snapshot"),
        };
        assert_eq!(snap["id"], 1);
        assert!(snap.get("history").is_none());
        assert!(snap.get("bogus").is_none());
    }

    #[test]
    fn test_add_and_get_tx() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let fetched = manager.get_tx(stored.id).unwrap();
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.status, Status::unapproved());
        assert!(manager.get_tx(999).is_none());
    }

    #[test]
    fn test_update_tx_appends_diff_and_history_replays() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();

        let mut edited = stored.clone();
        if let Some(p) = edited.tx_params.as_mut() {
            p.gas_price = Some("0x77359400".to_string());
        }
        manager.update_tx(edited, Some("gas bump")).unwrap();

        let latest = manager.get_tx(stored.id).unwrap();
        assert_eq!(latest.history.len(), 2);
        let entry = latest.history[1].as_diff().unwrap();
        assert_eq!(entry.note.as_deref(), Some("gas bump"));
        assert_eq!(entry.ops.len(), 1);
        assert_eq!(entry.ops[0].path, "txParams.gasPrice");

        let replayed = history::replay(&latest.history).unwrap();
        assert_eq!(replayed, history::snapshot(&latest).unwrap());
    }

    #[test]
    fn test_update_tx_unknown_id_errors() {
        let manager = manager_on("42", 40);
        let mut record = unapproved_tx(&manager);
        record
            .history
            .push(HistoryEntry::Snapshot(history::snapshot(&record).unwrap()));
        match manager.update_tx(record, None) {
            Err(StoreError::UnknownTransaction(1)) => {}
            other => panic!("Expected UnknownTransaction, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_update_tx_rejects_invalid_params() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let mut edited = manager.get_tx(stored.id).unwrap();
        if let Some(p) = edited.tx_params.as_mut() {
            p.gas = Some("5208".to_string());
        }
        assert!(manager.update_tx(edited, None).is_err());
        // the stored record is untouched
        let unchanged = manager.get_tx(stored.id).unwrap();
        assert_eq!(unchanged.history.len(), 1);
    }

    #[test]
    fn test_update_tx_params_merges_onto_stored() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();

        manager
            .update_tx_params(stored.id, TxParams::new().with_nonce("0x1"))
            .unwrap();

        let latest = manager.get_tx(stored.id).unwrap();
        let latest_params = latest.tx_params.unwrap();
        assert_eq!(latest_params.nonce.as_deref(), Some("0x1"));
        assert_eq!(latest_params.from.as_deref(), Some(FROM));
        let note = latest.history[1].as_diff().unwrap().note.clone();
        assert_eq!(note.as_deref(), Some("tx_state_manager::update_tx_params"));
    }

    #[test]
    fn test_eviction_removes_earliest_final_record() {
        let manager = manager_on("42", 2);
        let first = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let second = manager.add_tx(unapproved_tx(&manager)).unwrap();
        manager.set_status_confirmed(first.id).unwrap();
        manager.set_status_confirmed(second.id).unwrap();

        let third = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let ids: Vec<TxId> = manager.get_full_tx_list().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, third.id]);
    }

    #[test]
    fn test_eviction_never_discards_unfinished_work() {
        let manager = manager_on("42", 2);
        for _ in 0..4 {
            manager.add_tx(unapproved_tx(&manager)).unwrap();
        }
        // nothing was in a final status, so the list outgrows the limit
        assert_eq!(manager.get_full_tx_list().len(), 4);
    }

    #[test]
    fn test_eviction_evicts_at_most_one_per_add() {
        let manager = manager_on("42", 2);
        let first = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let second = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let third = manager.add_tx(unapproved_tx(&manager)).unwrap();
        manager.set_status_dropped(first.id).unwrap();
        manager.set_status_dropped(second.id).unwrap();
        manager.set_status_dropped(third.id).unwrap();

        manager.add_tx(unapproved_tx(&manager)).unwrap();
        // one finished record was reclaimed, the other two remain
        assert_eq!(manager.get_full_tx_list().len(), 3);
    }

    #[test]
    fn test_network_scoping() {
        let store = Arc::new(InMemoryStore::new());
        let current = TxStateManager::new(
            StoreConfig::new(),
            store.clone(),
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()));
        let other = TxStateManager::new(
            StoreConfig::new(),
            store,
            Arc::new(FixedNetwork::new("2")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::starting_at(100)));

        current.add_tx(unapproved_tx(&current)).unwrap();
        other.add_tx(unapproved_tx(&other)).unwrap();

        assert_eq!(current.get_full_tx_list().len(), 2);
        assert_eq!(current.get_tx_list().len(), 1);
        assert_eq!(current.get_tx_list()[0].network_id, "42");
        assert_eq!(other.get_tx_list().len(), 1);
        assert_eq!(other.get_tx_list()[0].network_id, "2");
    }

    #[test]
    fn test_tx_list_is_empty_while_loading() {
        let store = Arc::new(InMemoryStore::new());
        let online = TxStateManager::new(
            StoreConfig::new(),
            store.clone(),
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()));
        online.add_tx(unapproved_tx(&online)).unwrap();

        let loading =
            TxStateManager::new(StoreConfig::new(), store, Arc::new(|| NetworkState::Loading))
                .unwrap();
        assert!(loading.get_tx_list().is_empty());
        assert_eq!(loading.get_full_tx_list().len(), 1);
    }

    #[test]
    fn test_status_setters_publish_once_per_transition() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();

        let seen: Arc<PlainMutex<Vec<String>>> = Arc::new(PlainMutex::new(Vec::new()));
        let sink = seen.clone();
        assert!(manager.subscribe(stored.id, None, move |id, status: &Status| {
            sink.lock().push(format!("{}:{}", id, status));
        }));

        manager.set_status_approved(stored.id).unwrap();
        manager.set_status_approved(stored.id).unwrap();
        manager.set_status_submitted(stored.id).unwrap();

        let log = seen.lock().clone();
        assert_eq!(
            log,
            vec![
                format!("{}:approved", stored.id),
                format!("{}:submitted", stored.id)
            ]
        );
    }

    #[test]
    fn test_rejected_removes_record_and_channel() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();

        let seen: Arc<PlainMutex<Vec<String>>> = Arc::new(PlainMutex::new(Vec::new()));
        let sink = seen.clone();
        manager.subscribe(stored.id, None, move |_, status: &Status| {
            sink.lock().push(status.to_string());
        });

        manager.set_status_rejected(stored.id).unwrap();

        // the rejection itself was observable, then everything is gone
        assert_eq!(seen.lock().clone(), vec!["rejected"]);
        assert!(manager.get_tx(stored.id).is_none());
        assert!(!manager.subscribe(stored.id, None, |_, _| {}));
    }

    #[test]
    fn test_failed_attaches_error_details() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();

        manager
            .set_status_failed(stored.id, Some(ErrInfo::new("nonce too low")))
            .unwrap();

        let failed = manager.get_tx(stored.id).unwrap();
        assert_eq!(failed.status, Status::failed());
        assert_eq!(failed.err.as_ref().unwrap().message, "nonce too low");
        // attach-error update plus the status commit
        assert_eq!(failed.history.len(), 3);
    }

    #[test]
    fn test_failed_without_details_uses_placeholder() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();
        manager.set_status_failed(stored.id, None).unwrap();
        let failed = manager.get_tx(stored.id).unwrap();
        assert_eq!(
            failed.err.as_ref().unwrap().message,
            "Internal transaction failure"
        );
    }

    #[test]
    fn test_setters_are_noops_for_unknown_ids() {
        let manager = manager_on("42", 40);
        assert!(manager.set_status_approved(404).is_ok());
        assert!(manager.set_status_rejected(404).is_ok());
        assert!(manager.set_status_failed(404, None).is_ok());
        assert!(manager.get_full_tx_list().is_empty());
    }

    #[test]
    fn test_set_status_rejects_unknown_tag() {
        let manager = manager_on("42", 40);
        let stored = manager.add_tx(unapproved_tx(&manager)).unwrap();
        match manager.set_status(stored.id, Status::new("teleported")) {
            Err(StoreError::UnknownStatus(tag)) => assert_eq!(tag, "teleported"),
            other => panic!("Expected UnknownStatus, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_custom_status_list_drives_the_table() {
        let manager = TxStateManager::new(
            StoreConfig::new().with_status_list(vec!["queued".into(), "sent".into()]),
            Arc::new(InMemoryStore::new()),
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()));

        let stored = manager
            .add_tx(manager.generate_tx_meta().unwrap().with_params(params()))
            .unwrap();
        manager.set_status(stored.id, Status::new("queued")).unwrap();
        assert_eq!(
            manager.get_tx_status(stored.id),
            Some(Status::new("queued"))
        );

        // the default tags are gone, the implicit pair is not
        assert!(manager.set_status(stored.id, Status::approved()).is_err());
        manager.set_status(stored.id, Status::failed()).unwrap();
        assert_eq!(manager.get_tx_status(stored.id), Some(Status::failed()));
    }

    #[test]
    fn test_wipe_scopes_by_address_and_network() {
        let store = Arc::new(InMemoryStore::new());
        let current = TxStateManager::new(
            StoreConfig::new(),
            store.clone(),
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()));
        let other = TxStateManager::new(
            StoreConfig::new(),
            store,
            Arc::new(FixedNetwork::new("2")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::starting_at(100)));

        let mine = current.add_tx(unapproved_tx(&current)).unwrap();
        let theirs = current
            .add_tx(
                current
                    .generate_tx_meta()
                    .unwrap()
                    .with_params(TxParams::new().with_from(OTHER_FROM)),
            )
            .unwrap();
        let elsewhere = other.add_tx(unapproved_tx(&other)).unwrap();

        current.wipe_transactions(FROM).unwrap();

        let remaining: Vec<TxId> = current.get_full_tx_list().iter().map(|r| r.id).collect();
        assert!(!remaining.contains(&mine.id));
        assert!(remaining.contains(&theirs.id));
        assert!(remaining.contains(&elsewhere.id));
        // wiped channels are gone, surviving ones are not
        assert!(!current.subscribe(mine.id, None, |_, _| {}));
        assert!(current.subscribe(theirs.id, None, |_, _| {}));
    }

    #[test]
    fn test_unapproved_map_is_keyed_by_id() {
        let manager = manager_on("42", 40);
        let first = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let second = manager.add_tx(unapproved_tx(&manager)).unwrap();
        manager.set_status_approved(second.id).unwrap();

        let unapproved = manager.get_unapproved_tx_list();
        assert_eq!(unapproved.len(), 1);
        assert!(unapproved.contains_key(&first.id));
    }

    #[test]
    fn test_filters_resolve_params_before_top_level() {
        let manager = manager_on("42", 40);
        manager.add_tx(unapproved_tx(&manager)).unwrap();
        let second = manager
            .add_tx(
                manager
                    .generate_tx_meta()
                    .unwrap()
                    .with_params(TxParams::new().with_from(OTHER_FROM)),
            )
            .unwrap();
        manager.set_status_submitted(second.id).unwrap();

        let by_from = manager.get_filtered_tx_list(&TxFilter::new().field("from", FROM), None);
        assert_eq!(by_from.len(), 1);

        let pending = manager.get_pending_transactions(Some(OTHER_FROM));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert!(manager.get_pending_transactions(Some(FROM)).is_empty());
    }

    #[test]
    fn test_filter_absent_matches_records_without_the_key() {
        let manager = manager_on("42", 40);
        let healthy = manager.add_tx(unapproved_tx(&manager)).unwrap();
        let failing = manager.add_tx(unapproved_tx(&manager)).unwrap();
        manager
            .set_status_failed(failing.id, Some(ErrInfo::new("boom")))
            .unwrap();

        let unscathed = manager.get_filtered_tx_list(&TxFilter::new().absent("err"), None);
        let ids: Vec<TxId> = unscathed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![healthy.id]);
    }

    #[test]
    fn test_seeded_records_are_live() {
        let seeded = TxRecord::new(7, "42").with_params(params());
        let manager = TxStateManager::new(
            StoreConfig::new().with_initial_records(vec![seeded]),
            Arc::new(InMemoryStore::new()),
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap();

        assert_eq!(manager.get_full_tx_list().len(), 1);
        assert!(manager.subscribe(7, None, |_, _| {}));

        // the seed got a history, so transitions on it replay cleanly
        manager.set_status_approved(7).unwrap();
        let stored = manager.get_tx(7).unwrap();
        assert_eq!(stored.status, Status::approved());
        assert_eq!(stored.history.len(), 2);
    }

    #[test]
    fn test_get_tx_searches_across_networks() {
        let store = Arc::new(InMemoryStore::new());
        let other = TxStateManager::new(
            StoreConfig::new(),
            store.clone(),
            Arc::new(FixedNetwork::new("2")),
        )
        .unwrap()
        .with_id_generator(Box::new(SequentialIdGenerator::new()));
        let elsewhere = other.add_tx(unapproved_tx(&other)).unwrap();

        let current = TxStateManager::new(
            StoreConfig::new(),
            store,
            Arc::new(FixedNetwork::new("42")),
        )
        .unwrap();
        assert!(current.get_tx(elsewhere.id).is_some());
        assert_eq!(current.get_tx_status(elsewhere.id), Some(Status::unapproved()));
    }
}
