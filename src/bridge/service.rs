//! Channel-based bridge service
//!
//! Three threads:
//!
//! - **owner**: the only thread that dispatches bridge actions into the
//!   store. Builds snapshots on a ticker and after each applied action.
//! - **network worker**: pushes snapshots and sends acks.
//! - **poller**: fetches pending actions and save triggers.
//!
//! Snapshots travel through a capacity-1 channel filled with `try_send`; if
//! the worker is still busy the snapshot is dropped and the next tick carries
//! a fresher one. Inbound actions use a bounded channel with blocking sends,
//! so a slow owner stalls the poller instead of growing a queue.

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::actions::{parse_action, whitelist};
use super::client::{ActionCompleted, ActionFeedback, BridgeTransport, HealthStatus, PendingAction};
use super::snapshot::{build_snapshot, BridgeSnapshot, DEFAULT_PROTOTYPE_LIMIT};
use super::{BridgeError, BridgeResult, ReconnectPolicy};
use crate::graph::store::Outcome;
use crate::graph::GraphStore;
use crate::persistence::{save_all, SavedSession, SlotStore};
use crate::universe::SlotType;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub push_interval: Duration,
    pub poll_interval: Duration,
    pub prototype_limit: usize,
    /// Pending actions buffered between poller and owner
    pub inbound_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            prototype_limit: DEFAULT_PROTOTYPE_LIMIT,
            inbound_capacity: 32,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Where to persist when the bridge asks for a save
pub struct SaveTarget {
    pub source_of_truth: SlotType,
    pub slots: Vec<Box<dyn SlotStore>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub snapshots_sent: u64,
    pub snapshots_unchanged: u64,
    pub snapshots_dropped: u64,
    pub actions_applied: u64,
    pub actions_failed: u64,
    pub saves: u64,
}

enum Inbound {
    Action(PendingAction),
    SaveRequested,
    Failed(BridgeError),
}

enum Outbound {
    Completed(ActionCompleted),
    Feedback(ActionFeedback),
}

pub struct BridgeService<T: BridgeTransport + 'static> {
    store: Arc<GraphStore>,
    transport: Arc<T>,
    settings: BridgeSettings,
    save_target: Option<SaveTarget>,
    last_sent_hash: Option<String>,
    stats: BridgeStats,
}

impl<T: BridgeTransport + 'static> BridgeService<T> {
    pub fn new(store: Arc<GraphStore>, transport: Arc<T>, settings: BridgeSettings) -> Self {
        Self {
            store,
            transport,
            settings,
            save_target: None,
            last_sent_hash: None,
            stats: BridgeStats::default(),
        }
    }

    pub fn with_save_target(mut self, target: SaveTarget) -> Self {
        self.save_target = Some(target);
        self
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Check health and advertise the action whitelist
    pub fn connect(&self) -> BridgeResult<HealthStatus> {
        let policy = self.settings.reconnect;
        let health = policy.run("health check", || self.transport.health())?;
        policy.run("store registration", || self.transport.register_store(whitelist()))?;
        tracing::info!(
            "Bridge connected (status: {}), {} actions registered",
            health.status,
            whitelist().len()
        );
        Ok(health)
    }

    /// Replay one queued action against the store
    pub fn handle_action(&mut self, pending: &PendingAction) -> ActionCompleted {
        let result = parse_action(pending)
            .and_then(|action| self.store.dispatch(action).map_err(BridgeError::from));
        match result {
            Ok(outcome) => {
                self.stats.actions_applied += 1;
                tracing::debug!("Bridge action {} ({}) applied", pending.id, pending.action);
                ActionCompleted {
                    action_id: pending.id.clone(),
                    success: true,
                    result: serde_json::to_value(&outcome).ok(),
                    error: None,
                }
            }
            Err(e) => {
                self.stats.actions_failed += 1;
                tracing::warn!("Bridge action {} ({}) failed: {}", pending.id, pending.action, e);
                ActionCompleted {
                    action_id: pending.id.clone(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Build a snapshot and hand it to the network worker if it changed.
    /// Returns true if a snapshot was queued.
    fn offer_snapshot(&mut self, tx: &Sender<BridgeSnapshot>) -> bool {
        let snapshot = build_snapshot(&self.store.snapshot(), self.settings.prototype_limit);
        let hash = snapshot.content_hash();
        if self.last_sent_hash.as_deref() == Some(hash.as_str()) {
            self.stats.snapshots_unchanged += 1;
            return false;
        }
        match tx.try_send(snapshot) {
            Ok(()) => {
                self.last_sent_hash = Some(hash);
                self.stats.snapshots_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.snapshots_dropped += 1;
                tracing::trace!("Snapshot channel full; waiting for next tick");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Persist the current state through the save target, if any
    pub fn save_now(&mut self) -> BridgeResult<()> {
        let Some(target) = &self.save_target else {
            tracing::debug!("Bridge requested a save but no save target is configured");
            return Ok(());
        };
        let session = SavedSession::from_state(&self.store.snapshot())?;
        let written = save_all(target.source_of_truth, &target.slots, &session)?;
        self.stats.saves += 1;
        tracing::info!("Saved session to {} slot(s) on bridge request", written.len());
        Ok(())
    }

    /// Connect, then run the owner loop and both workers on their own threads
    pub fn spawn(self) -> BridgeResult<BridgeHandle> {
        self.connect()?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (snapshot_tx, snapshot_rx) = bounded::<BridgeSnapshot>(1);
        let (outbound_tx, outbound_rx) = bounded::<Outbound>(64);
        let (inbound_tx, inbound_rx) = bounded::<Inbound>(self.settings.inbound_capacity.max(1));

        let network = {
            let transport = Arc::clone(&self.transport);
            let policy = self.settings.reconnect;
            let shutdown = shutdown_rx.clone();
            let failures = inbound_tx.clone();
            std::thread::Builder::new()
                .name("bridge-network".into())
                .spawn(move || network_worker(transport, policy, snapshot_rx, outbound_rx, failures, shutdown))
                .map_err(|e| BridgeError::Transport(format!("failed to spawn network worker: {}", e)))?
        };

        let poller = {
            let transport = Arc::clone(&self.transport);
            let policy = self.settings.reconnect;
            let interval = self.settings.poll_interval;
            let shutdown = shutdown_rx.clone();
            std::thread::Builder::new()
                .name("bridge-poller".into())
                .spawn(move || poller(transport, policy, interval, inbound_tx, shutdown))
                .map_err(|e| BridgeError::Transport(format!("failed to spawn poller: {}", e)))?
        };

        let owner = std::thread::Builder::new()
            .name("bridge-owner".into())
            .spawn(move || self.run_owner(snapshot_tx, outbound_tx, inbound_rx, shutdown_rx))
            .map_err(|e| BridgeError::Transport(format!("failed to spawn owner: {}", e)))?;

        Ok(BridgeHandle {
            shutdown: Some(shutdown_tx),
            owner: Some(owner),
            workers: vec![network, poller],
        })
    }

    fn run_owner(
        mut self,
        snapshot_tx: Sender<BridgeSnapshot>,
        outbound_tx: Sender<Outbound>,
        inbound_rx: Receiver<Inbound>,
        shutdown: Receiver<()>,
    ) -> BridgeResult<BridgeStats> {
        let ticker = tick(self.settings.push_interval);
        self.offer_snapshot(&snapshot_tx);

        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => {
                    self.offer_snapshot(&snapshot_tx);
                }
                recv(inbound_rx) -> msg => match msg {
                    Ok(Inbound::Action(pending)) => {
                        let ack = self.handle_action(&pending);
                        let summary = ack.success.then(|| ActionFeedback {
                            action_id: ack.action_id.clone(),
                            message: describe_outcome(&pending.action, ack.result.as_ref()),
                        });
                        if outbound_tx.send(Outbound::Completed(ack)).is_err() {
                            break;
                        }
                        if let Some(feedback) = summary {
                            let _ = outbound_tx.send(Outbound::Feedback(feedback));
                        }
                        self.offer_snapshot(&snapshot_tx);
                    }
                    Ok(Inbound::SaveRequested) => {
                        if let Err(e) = self.save_now() {
                            tracing::error!("{}", e);
                        }
                    }
                    Ok(Inbound::Failed(e)) => {
                        tracing::error!("Bridge stopped: {}", e);
                        return Err(e);
                    }
                    Err(_) => break,
                },
            }
        }
        tracing::info!("Bridge owner loop stopped");
        Ok(self.stats)
    }
}

fn describe_outcome(action: &str, result: Option<&serde_json::Value>) -> String {
    let outcome = result.and_then(|v| serde_json::from_value::<Outcome>(v.clone()).ok());
    match outcome {
        Some(Outcome::Created { id }) => format!("{}: created {}", action, id),
        Some(Outcome::CreatedGraph { graph_id, .. }) => format!("{}: created graph {}", action, graph_id),
        Some(Outcome::Removed { edge_ids }) if !edge_ids.is_empty() => {
            format!("{}: removed {} connected edge(s)", action, edge_ids.len())
        }
        Some(Outcome::Toggled { on }) => format!("{}: {}", action, if on { "on" } else { "off" }),
        _ => format!("{}: done", action),
    }
}

fn network_worker<T: BridgeTransport>(
    transport: Arc<T>,
    policy: ReconnectPolicy,
    snapshots: Receiver<BridgeSnapshot>,
    outbound: Receiver<Outbound>,
    failures: Sender<Inbound>,
    shutdown: Receiver<()>,
) {
    loop {
        let result = select! {
            recv(shutdown) -> _ => return,
            recv(snapshots) -> msg => match msg {
                Ok(snapshot) => policy.run("state push", || transport.push_state(&snapshot)),
                Err(_) => return,
            },
            recv(outbound) -> msg => match msg {
                Ok(Outbound::Completed(ack)) => policy.run("action ack", || transport.action_completed(&ack)),
                Ok(Outbound::Feedback(feedback)) => {
                    // Feedback is informational; a failure here is not worth a reconnect
                    if let Err(e) = transport.action_feedback(&feedback) {
                        tracing::debug!("Action feedback not delivered: {}", e);
                    }
                    Ok(())
                }
                Err(_) => return,
            },
        };
        if let Err(e) = result {
            let _ = failures.send(Inbound::Failed(e));
            return;
        }
    }
}

fn poller<T: BridgeTransport>(
    transport: Arc<T>,
    policy: ReconnectPolicy,
    interval: Duration,
    inbound: Sender<Inbound>,
    shutdown: Receiver<()>,
) {
    loop {
        select! {
            recv(shutdown) -> _ => return,
            default(interval) => {}
        }

        let actions = match policy.run("action poll", || transport.pending_actions()) {
            Ok(actions) => actions,
            Err(e) => {
                let _ = inbound.send(Inbound::Failed(e));
                return;
            }
        };
        if !actions.is_empty() {
            tracing::debug!("Received {} pending bridge action(s)", actions.len());
        }
        for action in actions {
            // Blocks while the owner is behind
            if inbound.send(Inbound::Action(action)).is_err() {
                return;
            }
        }

        match policy.run("save trigger check", || transport.check_save_trigger()) {
            Ok(true) => {
                if inbound.send(Inbound::SaveRequested).is_err() {
                    return;
                }
            }
            Ok(false) => {}
            Err(e) => {
                let _ = inbound.send(Inbound::Failed(e));
                return;
            }
        }
    }
}

/// Running bridge threads
pub struct BridgeHandle {
    shutdown: Option<Sender<()>>,
    owner: Option<JoinHandle<BridgeResult<BridgeStats>>>,
    workers: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Block until the bridge stops on its own (it only does so on failure)
    pub fn wait(mut self) -> BridgeResult<BridgeStats> {
        let result = self.join_owner();
        self.stop_workers();
        result
    }

    /// Stop all threads and return the owner's statistics
    pub fn shutdown(mut self) -> BridgeResult<BridgeStats> {
        self.shutdown.take();
        let result = self.join_owner();
        self.stop_workers();
        result
    }

    fn join_owner(&mut self) -> BridgeResult<BridgeStats> {
        match self.owner.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(BridgeError::Transport("bridge owner thread panicked".into())),
            None => Ok(BridgeStats::default()),
        }
    }

    fn stop_workers(&mut self) {
        // Dropping the shutdown sender disconnects every worker's select
        self.shutdown.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Bridge worker thread panicked");
            }
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shutdown.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ActionSpec;
    use crate::graph::NewGraph;
    use crate::persistence::LocalFileSlot;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct FakeTransport {
        queued: Mutex<VecDeque<PendingAction>>,
        pushed: Mutex<Vec<BridgeSnapshot>>,
        acks: Mutex<Vec<ActionCompleted>>,
        registered: Mutex<Vec<String>>,
        save_requested: AtomicBool,
        down: AtomicBool,
    }

    impl FakeTransport {
        fn guard(&self) -> BridgeResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(BridgeError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }

        fn queue(&self, id: &str, action: &str, params: serde_json::Value) {
            self.queued.lock().unwrap().push_back(PendingAction {
                id: id.to_string(),
                action: action.to_string(),
                params,
            });
        }
    }

    impl BridgeTransport for FakeTransport {
        fn health(&self) -> BridgeResult<HealthStatus> {
            self.guard()?;
            Ok(HealthStatus {
                status: "ok".into(),
                has_store: true,
            })
        }

        fn register_store(&self, actions: &[ActionSpec]) -> BridgeResult<()> {
            self.guard()?;
            *self.registered.lock().unwrap() = actions.iter().map(|a| a.name.to_string()).collect();
            Ok(())
        }

        fn push_state(&self, snapshot: &BridgeSnapshot) -> BridgeResult<()> {
            self.guard()?;
            self.pushed.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        fn pending_actions(&self) -> BridgeResult<Vec<PendingAction>> {
            self.guard()?;
            Ok(self.queued.lock().unwrap().drain(..).collect())
        }

        fn action_completed(&self, ack: &ActionCompleted) -> BridgeResult<()> {
            self.guard()?;
            self.acks.lock().unwrap().push(ack.clone());
            Ok(())
        }

        fn action_feedback(&self, _feedback: &ActionFeedback) -> BridgeResult<()> {
            self.guard()
        }

        fn check_save_trigger(&self) -> BridgeResult<bool> {
            self.guard()?;
            Ok(self.save_requested.swap(false, Ordering::SeqCst))
        }
    }

    fn fast_settings() -> BridgeSettings {
        BridgeSettings {
            push_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
            reconnect: ReconnectPolicy {
                max_attempts: 2,
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_handle_action_acks_success_and_failure() {
        let store = Arc::new(GraphStore::new());
        let mut service = BridgeService::new(store.clone(), Arc::new(FakeTransport::default()), fast_settings());

        let ok = service.handle_action(&PendingAction {
            id: "1".into(),
            action: "createNewGraph".into(),
            params: json!({"graphId": "g", "name": "Ocean"}),
        });
        assert!(ok.success);
        assert_eq!(ok.result.unwrap()["graphId"], "g");
        assert!(store.snapshot().graphs().contains_key("g"));

        let bad = service.handle_action(&PendingAction {
            id: "2".into(),
            action: "removeEdge".into(),
            params: json!({"edgeId": "nope"}),
        });
        assert!(!bad.success);
        assert!(bad.error.unwrap().contains("nope"));

        let unknown = service.handle_action(&PendingAction {
            id: "3".into(),
            action: "eval".into(),
            params: json!({}),
        });
        assert!(!unknown.success);
        assert_eq!(service.stats().actions_failed, 2);
    }

    #[test]
    fn test_unchanged_snapshot_not_resent() {
        let store = Arc::new(GraphStore::new());
        let mut service = BridgeService::new(store.clone(), Arc::new(FakeTransport::default()), fast_settings());
        let (tx, rx) = bounded(1);

        assert!(service.offer_snapshot(&tx));
        rx.recv().unwrap();
        assert!(!service.offer_snapshot(&tx));
        assert_eq!(service.stats().snapshots_unchanged, 1);

        store.create_new_graph(NewGraph::named("Changed")).unwrap();
        assert!(service.offer_snapshot(&tx));
    }

    #[test]
    fn test_full_snapshot_channel_drops_instead_of_blocking() {
        let store = Arc::new(GraphStore::new());
        let mut service = BridgeService::new(store.clone(), Arc::new(FakeTransport::default()), fast_settings());
        let (tx, _rx) = bounded(1);

        assert!(service.offer_snapshot(&tx));
        store.create_new_graph(NewGraph::named("Newer")).unwrap();
        assert!(!service.offer_snapshot(&tx));
        assert_eq!(service.stats().snapshots_dropped, 1);

        // Still full: later snapshots are dropped too
        store.create_new_graph(NewGraph::named("Newest")).unwrap();
        assert!(!service.offer_snapshot(&tx));
        assert_eq!(service.stats().snapshots_sent, 1);
    }

    #[test]
    fn test_spawned_bridge_replays_actions() {
        let store = Arc::new(GraphStore::new());
        let transport = Arc::new(FakeTransport::default());
        transport.queue("a1", "createNewGraph", json!({"graphId": "g", "name": "Forest"}));
        transport.queue("a2", "addNodePrototype", json!({"id": "tree", "name": "Tree"}));

        let handle = BridgeService::new(store.clone(), transport.clone(), fast_settings())
            .spawn()
            .unwrap();
        wait_for(|| transport.acks.lock().unwrap().len() == 2);
        wait_for(|| {
            transport
                .pushed
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.total_prototypes == 2)
        });
        let stats = handle.shutdown().unwrap();

        assert_eq!(stats.actions_applied, 2);
        assert!(transport.registered.lock().unwrap().contains(&"addNode".to_string()));
        assert!(store.snapshot().prototypes().contains_key("tree"));
    }

    #[test]
    fn test_spawn_fails_when_unreachable() {
        let transport = Arc::new(FakeTransport::default());
        transport.down.store(true, Ordering::SeqCst);
        let result = BridgeService::new(Arc::new(GraphStore::new()), transport, fast_settings()).spawn();
        assert!(matches!(result, Err(BridgeError::Unreachable { attempts: 2, .. })));
    }

    #[test]
    fn test_bridge_stops_after_losing_connection() {
        let transport = Arc::new(FakeTransport::default());
        let handle = BridgeService::new(Arc::new(GraphStore::new()), transport.clone(), fast_settings())
            .spawn()
            .unwrap();
        transport.down.store(true, Ordering::SeqCst);
        assert!(matches!(handle.wait(), Err(BridgeError::Unreachable { .. })));
    }

    #[test]
    fn test_save_trigger_writes_slots() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bridge.redstring");
        let store = Arc::new(GraphStore::new());
        store.create_new_graph(NewGraph::named("Saved")).unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.save_requested.store(true, Ordering::SeqCst);
        let handle = BridgeService::new(store, transport, fast_settings())
            .with_save_target(SaveTarget {
                source_of_truth: SlotType::Local,
                slots: vec![Box::new(LocalFileSlot::new(&path))],
            })
            .spawn()
            .unwrap();

        wait_for(|| path.exists());
        let stats = handle.shutdown().unwrap();
        assert_eq!(stats.saves, 1);
    }
}
