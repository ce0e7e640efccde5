//! The SWIM membership engine (§4.1): a single `MembershipEngine` value
//! owning the membership list, the dissemination queue, and the
//! periodic-probe tick, shared across however many RPC-context "slots"
//! it is enabled on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cluster_types::{
    DisseminationQueue, Error, Hlc, HlcClock, Member, MemberStatus, MembershipList, Rank, Result, UpdateRecord,
};
use cluster_rpc::{FaultInjector, ProbeError, SwimReply, SwimRequest, SwimTransport};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MembershipConfig;
use crate::delay::{accommodate, is_network_outage, net_glitch_excess};
use crate::events::EventSubscribers;
use crate::protocol::{merge_update_record, suspend_all};

/// An RPC-context slot the tick callback is attached to or detached from
/// (§4.1.4 `enable`/`disable`). The RPC context itself is out of scope;
/// this is just the handle the caller uses to address one.
pub type CtxIdx = u32;

struct EngineState {
    list: MembershipList,
    dissemination: DisseminationQueue,
    /// `(source, target)` pairs for which an IREQ relay is currently
    /// in flight on this node, so a duplicate is answered `ALREADY`
    /// rather than re-pinged (§4.1.1).
    relaying: HashSet<(Rank, Rank)>,
    /// HLC at which each currently-`Suspect` member entered that state,
    /// used to drive the `Suspect -> Dead` expiry timer (§4.1.5).
    suspected_since: HashMap<Rank, Hlc>,
    ping_timeout_ms: u64,
    last_probe_success_hlc: Hlc,
    outage: bool,
}

/// The SWIM-style membership engine.
pub struct MembershipEngine {
    self_id: Rank,
    transport: Arc<dyn SwimTransport>,
    fault: RwLock<Option<Arc<dyn FaultInjector>>>,
    clock: HlcClock,
    config: MembershipConfig,
    events: EventSubscribers,
    state: RwLock<EngineState>,
    contexts: std::sync::Mutex<HashMap<CtxIdx, JoinHandle<()>>>,
}

impl MembershipEngine {
    /// Creates a ready engine with self seeded `Alive` at a fresh
    /// incarnation (§4.1.4 `init`). Rust's ownership model makes a
    /// second `init` on the same value unreachable, so the `ALREADY`
    /// failure mode from §4.1.4 is structurally prevented rather than
    /// runtime-checked here (see `DESIGN.md`).
    pub fn init(self_id: Rank, transport: Arc<dyn SwimTransport>, config: MembershipConfig) -> Arc<Self> {
        let clock = HlcClock::new();
        let incarnation = clock.now().as_raw();
        let mut list = MembershipList::new();
        list.insert(Member::myself(self_id, incarnation, Hlc::from_raw(incarnation)));

        Arc::new(MembershipEngine {
            self_id,
            transport,
            fault: RwLock::new(None),
            clock,
            config,
            events: EventSubscribers::new(),
            state: RwLock::new(EngineState {
                list,
                dissemination: DisseminationQueue::new(config.piggyback_retransmit_k),
                relaying: HashSet::new(),
                suspected_since: HashMap::new(),
                ping_timeout_ms: config.default_ping_timeout_ms,
                last_probe_success_hlc: Hlc::from_raw(incarnation),
                outage: false,
            }),
            contexts: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Installs or replaces the fault injector (§4.1.6, §6.4).
    pub async fn set_fault_injector(&self, fault: Arc<dyn FaultInjector>) {
        *self.fault.write().await = Some(fault);
    }

    /// Registers an event subscriber (§6.3).
    pub fn subscribe(&self, callback: impl Fn(cluster_types::MembershipEvent) + Send + Sync + 'static) {
        self.events.subscribe(callback);
    }

    /// Current self incarnation (§4.1.4 `self_incarnation_get`).
    pub async fn self_incarnation_get(&self) -> Result<u64> {
        let state = self.state.read().await;
        state.list.get(self.self_id).map(|m| m.incarnation).ok_or(Error::Uninit)
    }

    /// Snapshot of one member's state (§4.1.4 `state_get`).
    pub async fn state_get(&self, rank: Rank) -> Result<Member> {
        let state = self.state.read().await;
        state.list.get(rank).cloned().ok_or(Error::NonExistent)
    }

    /// A snapshot of every known member, for diagnostics/listing.
    pub async fn members(&self) -> Vec<Member> {
        self.state.read().await.list.iter().cloned().collect()
    }

    /// Inserts a newly known peer, `Inactive` unless it is self
    /// (§4.1.4 `rank_add`).
    pub async fn rank_add(&self, rank: Rank) -> Result<()> {
        let mut state = self.state.write().await;
        let member = if rank == self.self_id {
            Member::myself(rank, self.clock.now().as_raw(), self.clock.now())
        } else {
            Member::joined(rank)
        };
        if state.list.insert(member) {
            Ok(())
        } else {
            Err(Error::Already)
        }
    }

    /// Removes a known peer (§4.1.4 `rank_del`).
    pub async fn rank_del(&self, rank: Rank) -> Result<()> {
        let mut state = self.state.write().await;
        state.suspected_since.remove(&rank);
        state.list.remove(rank).map(|_| ()).ok_or(Error::NonExistent)
    }

    /// Forces every non-self member `Inactive`, used directly by callers
    /// and internally on outage detection (§4.1.4 `suspend_all`).
    pub async fn suspend_all(&self) {
        let mut state = self.state.write().await;
        suspend_all(&mut state.list, self.self_id);
    }

    /// Attaches the periodic tick to a context slot (§4.1.4 `enable`).
    pub fn enable(self: &Arc<Self>, ctx: CtxIdx) -> Result<()> {
        let mut contexts = self.contexts.lock().unwrap();
        if contexts.contains_key(&ctx) {
            return Err(Error::Invalid(format!("context {ctx} already enabled")));
        }
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let interval = engine.current_ping_timeout().await;
                tokio::time::sleep(Duration::from_millis(interval)).await;
                engine.tick().await;
            }
        });
        contexts.insert(ctx, handle);
        Ok(())
    }

    /// Detaches the periodic tick from a context slot (§4.1.4 `disable`).
    pub fn disable(&self, ctx: CtxIdx) -> Result<()> {
        let mut contexts = self.contexts.lock().unwrap();
        match contexts.remove(&ctx) {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Err(Error::Invalid(format!("context {ctx} not enabled"))),
        }
    }

    async fn current_ping_timeout(&self) -> u64 {
        self.state.read().await.ping_timeout_ms
    }

    /// One iteration of the protocol: expire suspects, detect outage,
    /// otherwise probe the next cyclic target (§4.1.1, §4.1.3, §4.1.5).
    async fn tick(&self) {
        self.expire_suspects().await;

        let now = self.clock.now();
        let since_success_ms = {
            let state = self.state.read().await;
            now.saturating_delay_ms(state.last_probe_success_hlc)
        };

        let entering_outage = {
            let mut state = self.state.write().await;
            let outage = is_network_outage(since_success_ms, self.config.suspect_timeout_ms);
            let transitioned = outage && !state.outage;
            state.outage = outage;
            transitioned
        };
        if entering_outage {
            warn!(self_id = self.self_id, "network outage detected, suspending all non-self members");
            self.suspend_all().await;
            return;
        }

        self.probe_once().await;
        self.recompute_ping_timeout().await;
    }

    async fn expire_suspects(&self) {
        let now = self.clock.now();
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            let expired: Vec<Rank> = state
                .suspected_since
                .iter()
                .filter(|(_, &since)| now.saturating_delay_ms(since) > self.config.suspect_timeout_ms)
                .map(|(&rank, _)| rank)
                .collect();

            for rank in expired {
                let incarnation = state.list.get(rank).map(|m| m.incarnation).unwrap_or(0);
                let outcome = merge_update_record(
                    &mut state.list,
                    self.self_id,
                    UpdateRecord {
                        id: rank,
                        incarnation,
                        status: MemberStatus::Dead,
                        delay_ms: 0,
                    },
                    &self.clock,
                );
                state.suspected_since.remove(&rank);
                if let Some(event) = outcome.event {
                    events.push(event);
                }
            }
        }
        for event in events {
            self.events.notify(event);
        }
    }

    async fn recompute_ping_timeout(&self) {
        let mut state = self.state.write().await;
        state.ping_timeout_ms = accommodate(&state.list, &self.config);
    }

    /// Picks the next cyclic probe target and runs the direct/indirect
    /// ping sequence (§4.1.1).
    async fn probe_once(&self) {
        let (target, ping_timeout, piggyback) = {
            let mut state = self.state.write().await;
            let Some(target) = state.list.next_alive_after(self.self_id) else {
                return;
            };
            let batch = state.dissemination.drain_for_piggyback(self.config.piggyback_batch_size, state.list.len());
            (target, state.ping_timeout_ms, batch)
        };

        if let Some(fault) = self.fault.read().await.as_ref() {
            if let Some(delay) = fault.should_drop(target) {
                debug!(peer = target, ?delay, "fault injector dropping probe");
                self.declare_suspect(target).await;
                return;
            }
        }

        let req = SwimRequest {
            swim_id: target,
            updates: piggyback,
        };
        let timeout = Duration::from_millis(ping_timeout);
        match self.transport.ping(target, req, timeout).await {
            Ok(reply) => {
                self.on_probe_success(target, reply).await;
            }
            Err(_) => {
                if self.try_indirect_probe(target, ping_timeout).await {
                    return;
                }
                self.declare_suspect(target).await;
            }
        }
    }

    async fn try_indirect_probe(&self, target: Rank, ping_timeout_ms: u64) -> bool {
        let relays = {
            let state = self.state.read().await;
            state.list.pick_alive_excluding(self.config.indirect_probe_fanout, self.self_id, target)
        };
        if relays.is_empty() {
            return false;
        }

        let timeout = Duration::from_millis(ping_timeout_ms * 2);
        let mut attempts = Vec::new();
        for relay in relays {
            let req = SwimRequest {
                swim_id: target,
                updates: Vec::new(),
            };
            attempts.push(self.transport.ireq(relay, req, timeout));
        }
        for attempt in attempts {
            if let Ok(reply) = attempt.await {
                self.on_probe_success(target, reply).await;
                return true;
            }
        }
        false
    }

    async fn on_probe_success(&self, target: Rank, reply: SwimReply) {
        let now = self.clock.now();
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            state.last_probe_success_hlc = now;
            state.outage = false;
            state.suspected_since.remove(&target);
            for record in reply.updates {
                // §4.1.3 "else" branch: fold every non-self, non-sender
                // id's reported delay into our own estimate for that id,
                // using the value it carries rather than a local RTT
                // measurement (we have none for a relayed/replied id).
                if record.id != self.self_id && record.id != target {
                    crate::protocol::update_delay(&mut state.list, record.id, record.delay_ms);
                }
                let outcome = merge_update_record(&mut state.list, self.self_id, record, &self.clock);
                if let Some(event) = outcome.event {
                    events.push(event);
                }
                if let Some(new_inc) = outcome.self_reincarnation {
                    state.dissemination.push(UpdateRecord {
                        id: self.self_id,
                        incarnation: new_inc,
                        status: MemberStatus::Alive,
                        delay_ms: 0,
                    });
                }
            }
        }
        for event in events {
            self.events.notify(event);
        }
    }

    async fn declare_suspect(&self, target: Rank) {
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            let Some(incarnation) = state.list.get(target).map(|m| m.incarnation) else {
                return;
            };
            let outcome = merge_update_record(
                &mut state.list,
                self.self_id,
                UpdateRecord {
                    id: target,
                    incarnation,
                    status: MemberStatus::Suspect,
                    delay_ms: 0,
                },
                &self.clock,
            );
            if state.list.get(target).map(|m| m.status) == Some(MemberStatus::Suspect) {
                state.suspected_since.entry(target).or_insert_with(|| self.clock.now());
            }
            if let Some(event) = outcome.event {
                events.push(event);
            }
        }
        for event in events {
            self.events.notify(event);
        }
        info!(peer = target, "marked suspect after probe failure");
    }

    /// Handles an inbound PING: merges the piggyback set, updates delay
    /// tracking, and replies with our own piggyback set (§4.1.1, §4.1.3).
    pub async fn handle_ping(&self, from: Rank, sender_hlc: Hlc, req: SwimRequest) -> SwimReply {
        self.clock.observe(sender_hlc);
        let one_way_delay = self.clock.now().saturating_delay_ms(sender_hlc);
        self.apply_net_glitch_if_needed(from, one_way_delay).await;

        let mut events = Vec::new();
        let reply_updates = {
            let mut state = self.state.write().await;
            for record in req.updates {
                // §4.1.3 "else" branch, mirroring `on_probe_success`.
                if record.id != self.self_id && record.id != from {
                    crate::protocol::update_delay(&mut state.list, record.id, record.delay_ms);
                }
                let outcome = merge_update_record(&mut state.list, self.self_id, record, &self.clock);
                if let Some(event) = outcome.event {
                    events.push(event);
                }
                if let Some(new_inc) = outcome.self_reincarnation {
                    state.dissemination.push(UpdateRecord {
                        id: self.self_id,
                        incarnation: new_inc,
                        status: MemberStatus::Alive,
                        delay_ms: 0,
                    });
                }
            }
            // §4.1.3 "if id == sender" branch: fold the measured one-way
            // delay into the sender's own entry; the resulting value is
            // what our reply echoes back via the piggyback set below.
            crate::protocol::update_delay(&mut state.list, from, one_way_delay as u32);
            state.last_probe_success_hlc = self.clock.now();
            state.outage = false;
            state.dissemination.drain_for_piggyback(self.config.piggyback_batch_size, state.list.len())
        };
        for event in events {
            self.events.notify(event);
        }
        self.recompute_ping_timeout().await;
        SwimReply::ok(reply_updates)
    }

    /// Handles an inbound IREQ for `req.swim_id`: dispatches a PING to
    /// the real target and relays its reply, absorbing duplicate
    /// concurrent requests for the same `(from, target)` pair with
    /// `ALREADY` (§4.1.1).
    pub async fn handle_ireq(&self, from: Rank, sender_hlc: Hlc, req: SwimRequest) -> SwimReply {
        self.clock.observe(sender_hlc);
        let target = req.swim_id;
        let key = (from, target);
        {
            let mut state = self.state.write().await;
            if !state.relaying.insert(key) {
                return SwimReply::already();
            }
        }

        let timeout = Duration::from_millis(self.current_ping_timeout().await);
        let inner_req = SwimRequest {
            swim_id: target,
            updates: Vec::new(),
        };
        let result = self.transport.ping(target, inner_req, timeout).await;

        {
            let mut state = self.state.write().await;
            state.relaying.remove(&key);
        }

        match result {
            Ok(reply) => {
                self.on_probe_success(target, reply.clone()).await;
                reply
            }
            Err(ProbeError::TimedOut | ProbeError::SendFailed | ProbeError::Injected) => {
                self.declare_suspect(target).await;
                SwimReply { rc: -1, pad: 0, updates: Vec::new() }
            }
        }
    }

    async fn apply_net_glitch_if_needed(&self, peer: Rank, one_way_delay_ms: u64) {
        let ping_timeout = self.current_ping_timeout().await;
        let excess = net_glitch_excess(one_way_delay_ms, ping_timeout);
        if excess == 0 {
            return;
        }
        let mut state = self.state.write().await;
        if let Some(since) = state.suspected_since.get_mut(&peer) {
            *since = crate::protocol::apply_net_glitch(*since, excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_rpc::mock::MockNetwork;

    #[tokio::test]
    async fn init_seeds_self_as_alive() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        let me = engine.state_get(1).await.unwrap();
        assert_eq!(me.status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn rank_add_then_del_is_a_noop_on_other_members() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        engine.rank_add(2).await.unwrap();
        assert!(engine.state_get(2).await.is_ok());
        engine.rank_del(2).await.unwrap();
        assert!(matches!(engine.state_get(2).await, Err(Error::NonExistent)));
        // self is unaffected
        assert_eq!(engine.state_get(1).await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn rank_add_twice_is_already() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        engine.rank_add(2).await.unwrap();
        assert!(matches!(engine.rank_add(2).await, Err(Error::Already)));
    }

    #[tokio::test]
    async fn rank_del_unknown_is_nonexistent() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        assert!(matches!(engine.rank_del(42).await, Err(Error::NonExistent)));
    }

    #[tokio::test]
    async fn suspend_all_forces_peers_inactive_but_not_self() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        engine.rank_add(2).await.unwrap();
        engine.suspend_all().await;
        assert_eq!(engine.state_get(2).await.unwrap().status, MemberStatus::Inactive);
        assert_eq!(engine.state_get(1).await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn handle_ping_merges_piggyback_and_replies() {
        let net = MockNetwork::new();
        let node = net.register(1);
        let engine = MembershipEngine::init(1, node, MembershipConfig::default());
        engine.rank_add(2).await.unwrap();

        let reply = engine
            .handle_ping(
                2,
                Hlc::from_raw(1),
                SwimRequest {
                    swim_id: 1,
                    updates: vec![UpdateRecord {
                        id: 2,
                        incarnation: 5,
                        status: MemberStatus::Alive,
                        delay_ms: 10,
                    }],
                },
            )
            .await;
        assert_eq!(reply.rc, 0);
        assert_eq!(engine.state_get(2).await.unwrap().incarnation, 5);
    }

    #[tokio::test]
    async fn duplicate_concurrent_ireq_is_absorbed() {
        let net = MockNetwork::new();
        let node1 = net.register(1);
        let _node2 = net.register(2);
        let _node3 = net.register(3);
        let engine = MembershipEngine::init(1, node1, MembershipConfig::default());
        engine.rank_add(2).await.unwrap();
        engine.rank_add(3).await.unwrap();

        // Manually occupy the relaying slot to simulate an in-flight IREQ.
        {
            let mut state = engine.state.write().await;
            state.relaying.insert((2, 3));
        }
        let reply = engine
            .handle_ireq(
                2,
                Hlc::from_raw(1),
                SwimRequest {
                    swim_id: 3,
                    updates: Vec::new(),
                },
            )
            .await;
        assert_eq!(reply, SwimReply::already());
    }
}
