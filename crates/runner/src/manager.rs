//! Keyword distribution manager
//!
//! Spreads tracked keywords over the streaming-enabled connections, at most
//! [`MAX_TRACKING_KEYWORD_COUNT`] per connection. Keywords that fit nowhere
//! are kept as dangling and placed by the next rebalance.
//!
//! All pool mutations happen under one lock. Connection I/O (connect,
//! disconnect, reconnect) is started after the lock is released.
//!
//! A connection that gives up (see [`ConnectionEvent::Failed`]) is taken
//! out of the pool and its keywords go to the others until it is
//! reconnected through [`KeywordManager::reconnect`].

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use userstream_gateway::{ConnectionConfig, ConnectionEvent, StreamHandler, UserStreamConnection};
use userstream_ports::{
    Identity, IdentityId, MAX_TRACKING_KEYWORD_BYTES, MAX_TRACKING_KEYWORD_COUNT, RequestProducer,
};

use crate::error::ManagerError;

/// Outcome of [`KeywordManager::add_keyword`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordAdded {
    /// Already tracked; only the reference count changed
    AlreadyTracked,
    Assigned(IdentityId),
    /// No connection had room
    Dangling,
}

/// Outcome of [`KeywordManager::remove_keyword`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordRemoved {
    NotTracked,
    /// Other references remain
    StillReferenced(usize),
    Untracked,
}

/// Keywords needing attention after a rebalance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordReport {
    /// Tracked but assigned to no connection
    pub dangling: Vec<String>,
    /// Longer than [`MAX_TRACKING_KEYWORD_BYTES`]; tracked anyway
    pub oversized: Vec<String>,
    /// Connections that gave up and hold no keywords until reconnected
    pub failed: Vec<IdentityId>,
}

impl KeywordReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.oversized.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    enabled: bool,
    /// Gave up after a terminal stream failure
    failed: bool,
    keywords: Vec<String>,
}

impl Slot {
    fn available(&self) -> bool {
        self.enabled && !self.failed
    }
}

/// Keyword bookkeeping, free of any I/O
#[derive(Debug, Default)]
struct Pool {
    slots: BTreeMap<IdentityId, Slot>,
    refcounts: HashMap<String, usize>,
    assignments: HashMap<String, IdentityId>,
    dangling: VecDeque<String>,
    /// Enabled since the last rebalance; filled first
    fresh: Vec<IdentityId>,
}

impl Pool {
    fn insert(&mut self, id: IdentityId, enabled: bool) {
        self.slots.insert(
            id,
            Slot {
                enabled,
                failed: false,
                keywords: Vec::new(),
            },
        );
        if enabled {
            self.fresh.push(id);
        }
    }

    /// Enabled connection with the fewest keywords and room for one more
    fn least_loaded(&self) -> Option<IdentityId> {
        self.slots
            .iter()
            .filter(|(_, slot)| {
                slot.available() && slot.keywords.len() < MAX_TRACKING_KEYWORD_COUNT
            })
            .min_by_key(|(id, slot)| (slot.keywords.len(), **id))
            .map(|(id, _)| *id)
    }

    fn assign(&mut self, keyword: String, id: IdentityId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.keywords.push(keyword.clone());
            self.assignments.insert(keyword, id);
        } else {
            self.dangling.push_back(keyword);
        }
    }

    fn add_keyword(&mut self, keyword: &str) -> KeywordAdded {
        if let Some(count) = self.refcounts.get_mut(keyword) {
            *count += 1;
            return KeywordAdded::AlreadyTracked;
        }
        self.refcounts.insert(keyword.to_string(), 1);

        match self.least_loaded() {
            Some(id) => {
                self.assign(keyword.to_string(), id);
                KeywordAdded::Assigned(id)
            }
            None => {
                self.dangling.push_back(keyword.to_string());
                KeywordAdded::Dangling
            }
        }
    }

    fn remove_keyword(&mut self, keyword: &str) -> (KeywordRemoved, Option<IdentityId>) {
        let Some(count) = self.refcounts.get_mut(keyword) else {
            return (KeywordRemoved::NotTracked, None);
        };
        *count -= 1;
        if *count > 0 {
            return (KeywordRemoved::StillReferenced(*count), None);
        }
        self.refcounts.remove(keyword);

        match self.assignments.remove(keyword) {
            Some(id) => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.keywords.retain(|k| k != keyword);
                }
                (KeywordRemoved::Untracked, Some(id))
            }
            None => {
                self.dangling.retain(|k| k != keyword);
                (KeywordRemoved::Untracked, None)
            }
        }
    }

    /// Move every keyword of `id` to the dangling pool
    fn release(&mut self, id: IdentityId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        for keyword in std::mem::take(&mut slot.keywords) {
            self.assignments.remove(&keyword);
            self.dangling.push_back(keyword);
        }
    }

    fn remove(&mut self, id: IdentityId) {
        self.release(id);
        self.fresh.retain(|f| *f != id);
        self.slots.remove(&id);
    }

    fn set_enabled(&mut self, id: IdentityId, enabled: bool) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if slot.enabled == enabled {
            return;
        }
        slot.enabled = enabled;
        if slot.available() {
            self.fresh.push(id);
        } else {
            self.fresh.retain(|f| *f != id);
            self.release(id);
        }
    }

    /// Take a failed connection out of the pool, or put it back
    fn set_failed(&mut self, id: IdentityId, failed: bool) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if slot.failed == failed {
            return;
        }
        slot.failed = failed;
        if slot.available() {
            self.fresh.push(id);
        } else {
            self.fresh.retain(|f| *f != id);
            self.release(id);
        }
    }

    /// Place dangling keywords; returns the connections whose set changed
    fn rebalance(&mut self) -> BTreeSet<IdentityId> {
        let mut changed = BTreeSet::new();

        // Newly available connections first, up to the cap
        for id in std::mem::take(&mut self.fresh) {
            let room = match self.slots.get(&id) {
                Some(slot) if slot.available() => {
                    MAX_TRACKING_KEYWORD_COUNT.saturating_sub(slot.keywords.len())
                }
                _ => continue,
            };
            for _ in 0..room {
                let Some(keyword) = self.dangling.pop_front() else {
                    break;
                };
                self.assign(keyword, id);
                changed.insert(id);
            }
        }

        // Then the least loaded, one keyword at a time
        while !self.dangling.is_empty() {
            let Some(id) = self.least_loaded() else {
                break;
            };
            if let Some(keyword) = self.dangling.pop_front() {
                self.assign(keyword, id);
                changed.insert(id);
            }
        }

        changed
    }

    fn report(&self) -> KeywordReport {
        let mut oversized: Vec<String> = self
            .refcounts
            .keys()
            .filter(|k| k.len() > MAX_TRACKING_KEYWORD_BYTES)
            .cloned()
            .collect();
        oversized.sort();

        KeywordReport {
            dangling: self.dangling.iter().cloned().collect(),
            oversized,
            failed: self
                .slots
                .iter()
                .filter(|(_, slot)| slot.failed)
                .map(|(id, _)| *id)
                .collect(),
        }
    }
}

struct State {
    pool: Pool,
    connections: BTreeMap<IdentityId, UserStreamConnection>,
}

impl State {
    /// Push the pool's keyword sets to the changed connections
    fn sync(&self, changed: &BTreeSet<IdentityId>) -> Vec<UserStreamConnection> {
        changed
            .iter()
            .filter_map(|id| {
                let connection = self.connections.get(id)?;
                let keywords = self
                    .pool
                    .slots
                    .get(id)
                    .map(|slot| slot.keywords.clone())
                    .unwrap_or_default();
                connection.set_tracked_keywords(keywords);
                Some(connection.clone())
            })
            .collect()
    }
}

/// Owns the stream connections and the keywords they track
pub struct KeywordManager {
    producer: Arc<dyn RequestProducer>,
    handler: Arc<dyn StreamHandler>,
    config: ConnectionConfig,
    state: Arc<Mutex<State>>,
}

impl KeywordManager {
    pub fn new(
        producer: Arc<dyn RequestProducer>,
        handler: Arc<dyn StreamHandler>,
        config: ConnectionConfig,
    ) -> Self {
        KeywordManager {
            producer,
            handler,
            config,
            state: Arc::new(Mutex::new(State {
                pool: Pool::default(),
                connections: BTreeMap::new(),
            })),
        }
    }

    /// Track `keyword`, or add a reference if it is already tracked
    pub fn add_keyword(&self, keyword: &str) -> Result<KeywordAdded, ManagerError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ManagerError::EmptyKeyword);
        }
        if keyword.len() > MAX_TRACKING_KEYWORD_BYTES {
            warn!(
                "Keyword {:?} is {} bytes, over the {} byte limit",
                keyword,
                keyword.len(),
                MAX_TRACKING_KEYWORD_BYTES
            );
        }

        let (added, reconnect) = {
            let mut state = self.state.lock();
            let added = state.pool.add_keyword(keyword);
            let reconnect = match added {
                KeywordAdded::Assigned(id) => state.sync(&BTreeSet::from([id])),
                _ => Vec::new(),
            };
            (added, reconnect)
        };

        match added {
            KeywordAdded::Assigned(id) => debug!("Keyword {:?} assigned to {}", keyword, id),
            KeywordAdded::Dangling => {
                warn!("Keyword {:?} dangling: no connection has room", keyword)
            }
            KeywordAdded::AlreadyTracked => {}
        }
        request_reconnects(&reconnect);
        Ok(added)
    }

    /// Drop one reference to `keyword`; untracked when none remain
    pub fn remove_keyword(&self, keyword: &str) -> KeywordRemoved {
        let keyword = keyword.trim();
        let (removed, reconnect) = {
            let mut state = self.state.lock();
            let (removed, freed) = state.pool.remove_keyword(keyword);
            let mut changed: BTreeSet<IdentityId> = freed.into_iter().collect();
            if freed.is_some() && !state.pool.dangling.is_empty() {
                changed.extend(state.pool.rebalance());
            }
            (removed, state.sync(&changed))
        };

        if removed == KeywordRemoved::Untracked {
            debug!("Keyword {:?} untracked", keyword);
        }
        request_reconnects(&reconnect);
        removed
    }

    /// Place dangling keywords on connections with room
    pub fn rebalance(&self) -> KeywordReport {
        let (report, reconnect) = {
            let mut state = self.state.lock();
            let changed = state.pool.rebalance();
            (state.pool.report(), state.sync(&changed))
        };
        log_report(&report);
        request_reconnects(&reconnect);
        report
    }

    /// Create a connection for `identity`, rebalance, and connect it if enabled
    pub async fn add_connection(
        &self,
        identity: Identity,
    ) -> Result<UserStreamConnection, ManagerError> {
        let id = identity.id;
        let enabled = identity.streaming_enabled;
        let connection = UserStreamConnection::new(
            identity,
            self.producer.clone(),
            self.handler.clone(),
            self.config.clone(),
        );

        let (report, reconnect) = {
            let mut state = self.state.lock();
            if state.connections.contains_key(&id) {
                return Err(ManagerError::DuplicateIdentity(id));
            }
            state.connections.insert(id, connection.clone());
            state.pool.insert(id, enabled);
            let changed = state.pool.rebalance();
            let reconnect = state.sync(&changed);
            (
                state.pool.report(),
                reconnect.into_iter().filter(|c| c.identity().id != id).collect::<Vec<_>>(),
            )
        };

        info!(
            "Added connection {} ({} keywords)",
            connection.identity(),
            connection.keywords().len()
        );
        log_report(&report);
        request_reconnects(&reconnect);
        tokio::spawn(watch_failures(
            id,
            connection.subscribe(),
            Arc::downgrade(&self.state),
        ));
        if enabled {
            connection.connect().await;
        }
        Ok(connection)
    }

    /// Disconnect and forget `id`; its keywords move to other connections
    pub async fn remove_connection(&self, id: IdentityId) -> Result<KeywordReport, ManagerError> {
        let (connection, report, reconnect) = {
            let mut state = self.state.lock();
            let connection = state
                .connections
                .remove(&id)
                .ok_or(ManagerError::UnknownIdentity(id))?;
            state.pool.remove(id);
            let changed = state.pool.rebalance();
            (connection, state.pool.report(), state.sync(&changed))
        };

        connection.disconnect().await;
        info!("Removed connection {}", connection.identity());
        log_report(&report);
        request_reconnects(&reconnect);
        Ok(report)
    }

    /// Enable or disable streaming for `id`
    ///
    /// Disabling releases the connection's keywords to the others.
    pub async fn set_streaming_enabled(
        &self,
        id: IdentityId,
        enabled: bool,
    ) -> Result<KeywordReport, ManagerError> {
        let (connection, report, reconnect) = {
            let mut state = self.state.lock();
            let connection = state
                .connections
                .get(&id)
                .cloned()
                .ok_or(ManagerError::UnknownIdentity(id))?;
            state.pool.set_enabled(id, enabled);
            if enabled {
                state.pool.set_failed(id, false);
            }
            let mut changed = state.pool.rebalance();
            changed.insert(id);
            let reconnect = state.sync(&changed);
            (
                connection,
                state.pool.report(),
                reconnect.into_iter().filter(|c| c.identity().id != id).collect::<Vec<_>>(),
            )
        };

        if enabled {
            connection.connect().await;
        } else {
            connection.disconnect().await;
        }
        info!(
            "Streaming {} for {}",
            if enabled { "enabled" } else { "disabled" },
            connection.identity()
        );
        log_report(&report);
        request_reconnects(&reconnect);
        Ok(report)
    }

    /// Reconnect `id` with its current keywords
    ///
    /// A connection that had given up rejoins the pool and is offered
    /// dangling keywords first.
    pub async fn reconnect(&self, id: IdentityId) -> Result<(), ManagerError> {
        let (connection, reconnect) = {
            let mut state = self.state.lock();
            let connection = state
                .connections
                .get(&id)
                .cloned()
                .ok_or(ManagerError::UnknownIdentity(id))?;
            state.pool.set_failed(id, false);
            let mut changed = state.pool.rebalance();
            changed.insert(id);
            let reconnect = state.sync(&changed);
            (
                connection,
                reconnect.into_iter().filter(|c| c.identity().id != id).collect::<Vec<_>>(),
            )
        };
        request_reconnects(&reconnect);
        connection.connect().await;
        Ok(())
    }

    /// Disconnect every connection and cancel pending reconnects
    pub async fn shutdown(&self) {
        let connections: Vec<UserStreamConnection> =
            self.state.lock().connections.values().cloned().collect();
        for connection in connections {
            connection.disconnect().await;
        }
        info!("Keyword manager shut down");
    }

    pub fn connection(&self, id: IdentityId) -> Option<UserStreamConnection> {
        self.state.lock().connections.get(&id).cloned()
    }

    pub fn connections(&self) -> Vec<UserStreamConnection> {
        self.state.lock().connections.values().cloned().collect()
    }

    /// Keywords currently assigned to `id`
    pub fn keywords_of(&self, id: IdentityId) -> Vec<String> {
        self.state
            .lock()
            .pool
            .slots
            .get(&id)
            .map(|slot| slot.keywords.clone())
            .unwrap_or_default()
    }

    /// Connection tracking `keyword`, if assigned
    pub fn assignment(&self, keyword: &str) -> Option<IdentityId> {
        self.state.lock().pool.assignments.get(keyword.trim()).copied()
    }

    pub fn dangling(&self) -> Vec<String> {
        self.state.lock().pool.dangling.iter().cloned().collect()
    }

    /// Number of distinct tracked keywords
    pub fn tracked_count(&self) -> usize {
        self.state.lock().pool.refcounts.len()
    }

    pub fn report(&self) -> KeywordReport {
        self.state.lock().pool.report()
    }
}

/// Release the keywords of `id` once its connection gives up
///
/// Ends when the connection or the manager is dropped.
async fn watch_failures(
    id: IdentityId,
    mut events: broadcast::Receiver<ConnectionEvent>,
    state: Weak<Mutex<State>>,
) {
    loop {
        let failure = match events.recv().await {
            Ok(ConnectionEvent::Failed(failure)) => failure,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("{}: missed {} connection events", id, skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let Some(shared) = state.upgrade() else {
            return;
        };

        let (report, reconnect) = {
            let mut state = shared.lock();
            if !state.connections.contains_key(&id) {
                continue;
            }
            state.pool.set_failed(id, true);
            let changed = state.pool.rebalance();
            (state.pool.report(), state.sync(&changed))
        };
        error!("Connection {} gave up, releasing its keywords: {}", id, failure);
        log_report(&report);
        request_reconnects(&reconnect);
    }
}

fn request_reconnects(connections: &[UserStreamConnection]) {
    for connection in connections {
        connection.request_reconnect();
    }
}

fn log_report(report: &KeywordReport) {
    if !report.dangling.is_empty() {
        warn!(
            "{} keywords dangling after rebalance: no streaming connection has room",
            report.dangling.len()
        );
    }
    if !report.oversized.is_empty() {
        warn!("Keywords over {} bytes: {:?}", MAX_TRACKING_KEYWORD_BYTES, report.oversized);
    }
    if !report.failed.is_empty() {
        warn!("Connections down until reconnected: {:?}", report.failed);
    }
}
