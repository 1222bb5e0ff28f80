//! Autonomous conversation scheduler
//!
//! On a jittered interval the scheduler takes the cross-process lease, picks
//! two available residents, asks the generator for a conversation, evaluates
//! it and persists the result. One tick runs at a time per process and the
//! lease keeps other processes on the device from running a tick at once.
//!
//! An unauthenticated generator stops the scheduler for good; any other
//! failure releases the lease and waits for the next tick.

mod candidates;
mod generator;
mod persist;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::evaluation::{evaluate, EvaluationInput, Impression, WeightTable};
use crate::lease::{LeaseLock, SCHEDULER_LEASE};
use crate::models::{
    Belief, EntityId, Event, EventPayload, Feeling, Relation, Resident, ThreadStatus, TopicThread,
};
use crate::retry::{with_retry, RetryOptions};
use crate::services::LocalStore;
use crate::Result;

pub use candidates::{
    select_target, ConversationTarget, ResidentAvailability, SleepScheduleAvailability,
};
pub use generator::{
    ConversationGenerator, GeneratedConversation, GenerationRequest, GeneratorError,
    HttpConversationGenerator, ThreadContext,
};
pub use persist::{
    persist_conversation, system_line, PersistContext, PersistedConversation, SNIPPET_LIMIT,
};

/// Timing and lease settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SchedulerOptions {
    /// Whether hosts should start the background loop
    pub enabled: bool,
    pub base_interval_ms: u64,
    /// Relative jitter in percent, applied in both directions
    pub jitter_percent: u8,
    pub min_delay_ms: u64,
    pub lease_name: String,
    pub lease_ttl_ms: u64,
    /// Offset for reading sleep profiles; the host time zone when unset
    pub utc_offset_minutes: Option<i32>,
    pub retry: RetryOptions,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            base_interval_ms: 900_000,
            jitter_percent: 20,
            min_delay_ms: 10_000,
            lease_name: SCHEDULER_LEASE.to_string(),
            lease_ttl_ms: 60_000,
            utc_offset_minutes: None,
            retry: RetryOptions::default(),
        }
    }
}

impl SchedulerOptions {
    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    /// Sleep-profile availability in the configured time zone.
    pub fn availability(&self) -> SleepScheduleAvailability {
        self.utc_offset_minutes
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
            .map_or_else(SleepScheduleAvailability::default, |offset| {
                SleepScheduleAvailability::with_offset(offset)
            })
    }

    /// Delay before the next tick for a uniform `sample` in `[-1, 1]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn jittered_delay(&self, sample: f64) -> Duration {
        let spread = f64::from(self.jitter_percent) / 100.0 * sample.clamp(-1.0, 1.0);
        let delay = (self.base_interval_ms as f64 * (1.0 + spread)).floor();
        let delay = if delay.is_finite() && delay > 0.0 {
            delay as u64
        } else {
            0
        };
        Duration::from_millis(delay.max(self.min_delay_ms))
    }

    fn next_delay(&self) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.jittered_delay(sample)
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stopped, or halted by an authentication failure
    Stopped,
    /// Another process holds the lease
    LeaseHeld,
    /// Fewer than two residents are available, or no pair may talk
    NoCandidates,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Completed(PersistedConversation),
    /// The tick failed; the next one will try again
    Failed(String),
    /// The generator rejected our credentials; the scheduler is stopped
    Halted(String),
}

struct SchedulerInner {
    store: LocalStore,
    lease: Arc<dyn LeaseLock>,
    generator: Arc<dyn ConversationGenerator>,
    availability: Arc<dyn ResidentAvailability>,
    weights: WeightTable,
    options: SchedulerOptions,
    stopped: AtomicBool,
    halted: AtomicBool,
    holds_lease: AtomicBool,
    wake: Notify,
    tick_gate: tokio::sync::Mutex<()>,
}

/// Handle to the scheduler. Cheap to share behind an `Arc`.
pub struct ConversationScheduler {
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    visibility_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationScheduler {
    pub fn new(
        store: LocalStore,
        lease: Arc<dyn LeaseLock>,
        generator: Arc<dyn ConversationGenerator>,
        options: SchedulerOptions,
    ) -> Self {
        Self::with_parts(
            store,
            lease,
            generator,
            Arc::new(options.availability()),
            WeightTable::default(),
            options,
        )
    }

    pub fn with_parts(
        store: LocalStore,
        lease: Arc<dyn LeaseLock>,
        generator: Arc<dyn ConversationGenerator>,
        availability: Arc<dyn ResidentAvailability>,
        weights: WeightTable,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                lease,
                generator,
                availability,
                weights,
                options,
                stopped: AtomicBool::new(true),
                halted: AtomicBool::new(false),
                holds_lease: AtomicBool::new(false),
                wake: Notify::new(),
                tick_gate: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
            visibility_task: Mutex::new(None),
        }
    }

    /// Start ticking in the background. Returns `false` if already running
    /// or halted by an authentication failure.
    pub fn start(&self) -> bool {
        if self.inner.halted.load(Ordering::SeqCst) {
            tracing::warn!("Conversation scheduler is halted; not starting");
            return false;
        }
        let Ok(mut task) = self.task.lock() else {
            return false;
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        self.inner.stopped.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run_loop(inner)));
        tracing::info!(
            "Conversation scheduler started (every ~{} ms)",
            self.inner.options.base_interval_ms
        );
        true
    }

    /// Stop ticking. An in-flight tick finishes first; afterwards the lease is
    /// released and no further refresh happens.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);

        if let Some(handle) = self.visibility_task.lock().ok().and_then(|mut t| t.take()) {
            handle.abort();
        }
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            self.inner.wake.notify_one();
            if let Err(error) = handle.await {
                tracing::warn!("Scheduler task ended abnormally: {}", error);
            }
        }

        self.inner.release_lease().await;
        tracing::info!("Conversation scheduler stopped");
    }

    /// Run one tick now, regardless of the background timer.
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick(true).await
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Refresh a lease this scheduler holds when the host becomes visible.
    pub async fn on_visibility_change(&self, visible: bool) {
        self.inner.on_visibility_change(visible).await;
    }

    /// Follow a host visibility signal until `stop`.
    pub fn watch_visibility(&self, mut visibility: watch::Receiver<bool>) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            while visibility.changed().await.is_ok() {
                let visible = *visibility.borrow_and_update();
                inner.on_visibility_change(visible).await;
            }
        });
        if let Ok(mut task) = self.visibility_task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>) {
    loop {
        let delay = inner.options.next_delay();
        tracing::debug!("Next conversation tick in {:?}", delay);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = inner.wake.notified() => {}
        }
        if inner.stopped.load(Ordering::SeqCst) {
            break;
        }

        match inner.tick(false).await {
            TickOutcome::Completed(persisted) => {
                tracing::debug!("Tick produced event {}", persisted.event_id);
            }
            TickOutcome::Skipped(reason) => tracing::debug!("Tick skipped: {:?}", reason),
            TickOutcome::Failed(_) => {}
            TickOutcome::Halted(_) => break,
        }
        if inner.stopped.load(Ordering::SeqCst) {
            break;
        }
    }
}

impl SchedulerInner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.halted.load(Ordering::SeqCst)
    }

    async fn tick(&self, manual: bool) -> TickOutcome {
        let _gate = self.tick_gate.lock().await;
        if self.halted.load(Ordering::SeqCst) || (!manual && self.is_stopped()) {
            return TickOutcome::Skipped(SkipReason::Stopped);
        }

        let name = &self.options.lease_name;
        match self.lease.try_acquire(name, self.options.lease_ttl()).await {
            Ok(true) => self.holds_lease.store(true, Ordering::SeqCst),
            Ok(false) => return TickOutcome::Skipped(SkipReason::LeaseHeld),
            Err(error) => {
                tracing::warn!("Could not take scheduler lease: {}", error);
                return TickOutcome::Failed(error.to_string());
            }
        }
        self.refresh_lease().await;

        match self.run_cycle().await {
            Ok(outcome) => {
                self.refresh_lease().await;
                if manual {
                    self.release_lease().await;
                }
                outcome
            }
            Err(error) => {
                self.release_lease().await;
                if error.is_unauthenticated() {
                    self.halted.store(true, Ordering::SeqCst);
                    self.stopped.store(true, Ordering::SeqCst);
                    tracing::error!("Conversation scheduler halted: {}", error);
                    TickOutcome::Halted(error.to_string())
                } else {
                    tracing::warn!("Conversation tick failed: {}", error);
                    TickOutcome::Failed(error.to_string())
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<TickOutcome> {
        let residents: Vec<Resident> = self.store.list().await?;
        let now = DateTime::<Utc>::from_timestamp_millis(self.store.now_millis()).unwrap_or_default();
        let eligible: Vec<Resident> = residents
            .into_iter()
            .filter(|resident| self.availability.is_available(resident, now))
            .collect();
        if eligible.len() < 2 {
            tracing::debug!("Only {} resident(s) available", eligible.len());
            return Ok(TickOutcome::Skipped(SkipReason::NoCandidates));
        }

        let relations: Vec<Relation> = self.store.list().await?;
        let threads: Vec<TopicThread> = self.store.list().await?;
        let target = {
            let mut rng = rand::thread_rng();
            select_target(&eligible, &relations, &threads, &mut rng)
        };
        let Some(target) = target else {
            return Ok(TickOutcome::Skipped(SkipReason::NoCandidates));
        };

        let request = self.build_request(&target).await?;
        let conversation = with_retry(
            || self.generator.generate(&request),
            self.options.retry,
            GeneratorError::is_transient,
        )
        .await?;
        conversation.validate(&request)?;

        let [a, b] = &target.participants;
        let feelings: Vec<Feeling> = self.store.list().await?;
        let impression = |from: &EntityId, to: &EntityId| {
            feelings
                .iter()
                .find(|feeling| &feeling.from_id == from && &feeling.to_id == to)
                .map_or(Impression::None, |feeling| feeling.label)
        };
        let evaluation = evaluate(
            &EvaluationInput {
                participants: [&a.meta.id, &b.meta.id],
                lines: &conversation.lines,
                meta: &conversation.meta,
                a_to_b: impression(&a.meta.id, &b.meta.id),
                b_to_a: impression(&b.meta.id, &a.meta.id),
            },
            &self.weights,
        );

        let persisted = persist_conversation(
            &self.store,
            PersistContext {
                participants: &target.participants,
                thread: target.thread.as_ref(),
                feelings: &feelings,
                beliefs: &request.beliefs,
            },
            &conversation,
            &evaluation,
        )
        .await?;

        tracing::info!(
            "Conversation {} between {} and {}: {}",
            persisted.event_id,
            a.name,
            b.name,
            evaluation.summary
        );
        Ok(TickOutcome::Completed(persisted))
    }

    async fn build_request(&self, target: &ConversationTarget) -> Result<GenerationRequest> {
        let [a, b] = &target.participants;
        let beliefs: BTreeMap<EntityId, Belief> = self
            .store
            .list::<Belief>()
            .await?
            .into_iter()
            .filter(|belief| belief.resident_id == a.meta.id || belief.resident_id == b.meta.id)
            .map(|belief| (belief.resident_id.clone(), belief))
            .collect();

        let (thread_id, status, topic) = match &target.thread {
            Some(thread) => (thread.meta.id.clone(), thread.status, thread.topic.clone()),
            None => (EntityId::new(), ThreadStatus::Ongoing, None),
        };
        let last_summary = match target.thread.as_ref().and_then(|t| t.last_event_id.as_ref()) {
            Some(event_id) => self
                .store
                .get::<Event>(event_id)
                .await?
                .and_then(|event| match event.payload {
                    EventPayload::Conversation(payload) => Some(payload.system_line),
                    _ => None,
                }),
            None => None,
        };

        Ok(GenerationRequest {
            thread_context: ThreadContext {
                thread_id,
                participants: target.participants.clone(),
                relation: target.relation,
                status,
                topic: topic.clone(),
            },
            beliefs,
            topic_hint: topic,
            last_summary,
        })
    }

    async fn refresh_lease(&self) {
        if self.stopped.load(Ordering::SeqCst) || !self.holds_lease.load(Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.lease.refresh(&self.options.lease_name).await {
            tracing::warn!("Could not refresh scheduler lease: {}", error);
        }
    }

    async fn release_lease(&self) {
        if !self.holds_lease.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.lease.release(&self.options.lease_name).await {
            tracing::warn!("Could not release scheduler lease: {}", error);
        }
    }

    async fn on_visibility_change(&self, visible: bool) {
        if visible && !self.is_stopped() {
            self.refresh_lease().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{ConversationMeta, DialogueLine};
    use crate::lease::KvLeaseLock;
    use crate::models::Notification;
    use crate::util::ManualClock;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicU32;

    struct AlwaysAvailable;

    impl ResidentAvailability for AlwaysAvailable {
        fn is_available(&self, _resident: &Resident, _now: DateTime<Utc>) -> bool {
            true
        }
    }

    enum Behavior {
        Echo,
        Malformed,
        Unauthenticated,
        FlakyThenEcho,
    }

    struct FakeGenerator {
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl FakeGenerator {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversationGenerator for FakeGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<GeneratedConversation, GeneratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let [a, b] = request.participant_ids();
            let echo = GeneratedConversation {
                thread_id: request.thread_context.thread_id.clone(),
                participants: [a.clone(), b.clone()],
                topic: Some("天気".to_string()),
                lines: vec![
                    DialogueLine {
                        speaker: a.clone(),
                        text: "いい天気だね。".to_string(),
                    },
                    DialogueLine {
                        speaker: b.clone(),
                        text: "散歩日和だね、ありがとう。".to_string(),
                    },
                ],
                meta: ConversationMeta {
                    tags: vec!["共感".to_string()],
                    signals: vec!["continue".to_string()],
                    ..ConversationMeta::default()
                },
            };
            match self.behavior {
                Behavior::Echo => Ok(echo),
                Behavior::Malformed => {
                    let mut bad = echo;
                    bad.lines[0].speaker = EntityId::from("stranger");
                    Ok(bad)
                }
                Behavior::Unauthenticated => {
                    Err(GeneratorError::Unauthenticated("token expired".to_string()))
                }
                Behavior::FlakyThenEcho if call == 0 => {
                    Err(GeneratorError::Transport("connection reset".to_string()))
                }
                Behavior::FlakyThenEcho => Ok(echo),
            }
        }
    }

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            retry: RetryOptions {
                retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ms: 0,
            },
            ..SchedulerOptions::default()
        }
    }

    async fn setup(
        residents: usize,
        generator: Arc<FakeGenerator>,
    ) -> (LocalStore, KvLeaseLock, ConversationScheduler) {
        let store = LocalStore::open_in_memory()
            .await
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
        for name in ["Aoi", "Ren", "Mio"].into_iter().take(residents) {
            store.put(&Resident::new(name, 1)).await.unwrap();
        }
        let lease = KvLeaseLock::new(store.clone());
        let scheduler = ConversationScheduler::with_parts(
            store.clone(),
            Arc::new(lease.clone()),
            generator,
            Arc::new(AlwaysAvailable),
            WeightTable::default(),
            options(),
        );
        (store, lease, scheduler)
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let options = SchedulerOptions::default();
        assert_eq!(options.jittered_delay(0.0), Duration::from_millis(900_000));
        assert_eq!(options.jittered_delay(-1.0), Duration::from_millis(720_000));
        assert_eq!(options.jittered_delay(1.0), Duration::from_millis(1_080_000));
        assert_eq!(options.jittered_delay(5.0), Duration::from_millis(1_080_000));

        let short = SchedulerOptions {
            base_interval_ms: 5_000,
            ..SchedulerOptions::default()
        };
        assert_eq!(short.jittered_delay(-1.0), Duration::from_millis(10_000));
        for _ in 0..100 {
            let delay = options.next_delay();
            assert!(delay >= Duration::from_millis(720_000));
            assert!(delay <= Duration::from_millis(1_080_000));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tick_persists_conversation() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (store, _lease, scheduler) = setup(2, Arc::clone(&generator)).await;

        let outcome = scheduler.tick().await;

        let TickOutcome::Completed(persisted) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        let thread: TopicThread = store.get(&persisted.thread_id).await.unwrap().unwrap();
        assert_eq!(thread.status, ThreadStatus::Ongoing);
        assert_eq!(store.list::<Notification>().await.unwrap().len(), 1);
        assert_eq!(store.list::<Feeling>().await.unwrap().len(), 2);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_tick_continues_ongoing_thread() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (store, _lease, scheduler) = setup(3, generator).await;

        let TickOutcome::Completed(first) = scheduler.tick().await else {
            panic!("first tick failed");
        };
        let TickOutcome::Completed(second) = scheduler.tick().await else {
            panic!("second tick failed");
        };

        assert_eq!(first.thread_id, second.thread_id);
        assert_eq!(store.list::<TopicThread>().await.unwrap().len(), 1);
        assert_eq!(store.list::<Event>().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fewer_than_two_residents_skips_without_calling_generator() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (store, _lease, scheduler) = setup(1, Arc::clone(&generator)).await;

        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Skipped(SkipReason::NoCandidates)
        );
        assert_eq!(generator.calls(), 0);
        assert!(store.list::<Event>().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_loop_tick_without_candidates_keeps_lease() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (store, lease, scheduler) = setup(1, Arc::clone(&generator)).await;
        scheduler.inner.stopped.store(false, Ordering::SeqCst);

        assert_eq!(
            scheduler.inner.tick(false).await,
            TickOutcome::Skipped(SkipReason::NoCandidates)
        );
        assert_eq!(
            store
                .kv_get(&format!("lease:{SCHEDULER_LEASE}"))
                .await
                .unwrap()
                .as_deref(),
            Some("1700000000000")
        );
        assert!(!lease
            .try_acquire(SCHEDULER_LEASE, Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_held_lease_skips_tick() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (_store, lease, scheduler) = setup(2, Arc::clone(&generator)).await;
        assert!(lease
            .try_acquire(SCHEDULER_LEASE, Duration::from_secs(60))
            .await
            .unwrap());

        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Skipped(SkipReason::LeaseHeld)
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_output_persists_nothing_and_releases_lease() {
        let generator = FakeGenerator::new(Behavior::Malformed);
        let (store, lease, scheduler) = setup(2, generator).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Failed(_)));
        assert!(store.list::<Event>().await.unwrap().is_empty());
        assert!(store.list::<Notification>().await.unwrap().is_empty());
        assert!(lease
            .try_acquire(SCHEDULER_LEASE, Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!scheduler.is_halted());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unauthenticated_halts_permanently() {
        let generator = FakeGenerator::new(Behavior::Unauthenticated);
        let (_store, lease, scheduler) = setup(2, Arc::clone(&generator)).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Halted(_)));
        assert!(scheduler.is_halted());
        assert!(!scheduler.start());
        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Skipped(SkipReason::Stopped)
        );
        assert_eq!(generator.calls(), 1);
        assert!(lease
            .try_acquire(SCHEDULER_LEASE, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_failure_is_retried() {
        let generator = FakeGenerator::new(Behavior::FlakyThenEcho);
        let (_store, _lease, scheduler) = setup(2, Arc::clone(&generator)).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Completed(_)));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_releases_lease_and_ends_loop() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (_store, lease, scheduler) = setup(2, generator).await;

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert!(lease
            .try_acquire(SCHEDULER_LEASE, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_visibility_does_not_take_a_lease_it_does_not_hold() {
        let generator = FakeGenerator::new(Behavior::Echo);
        let (store, _lease, scheduler) = setup(2, generator).await;
        assert!(scheduler.start());

        scheduler.on_visibility_change(true).await;

        assert_eq!(
            store
                .kv_get(&format!("lease:{SCHEDULER_LEASE}"))
                .await
                .unwrap(),
            None
        );
        scheduler.stop().await;
    }
}
