//! ==============================================================================
//! controller.rs - acquisition state machine
//! ==============================================================================
//!
//! purpose:
//!     owns the single active acquisition window. `start` tears down whatever
//!     was running, resets the window and spawns one sampling task; the task
//!     feeds readings into the window once per tick (or per pushed update),
//!     finalizes the measurement and asks the advisor for advice.
//!
//! states:
//!
//! ```text
//!     idle ──start──> measuring ──window complete──> done
//!      ^                  │                            │
//!      └──cancel / grain──┘<───────────start───────────┘
//! ```
//!
//! cancellation:
//!     every window gets a CancellationToken and a generation number. the
//!     token stops the task (including an in-flight advisor call); the
//!     generation check under the session lock guarantees a cancelled
//!     window never writes to the session after a newer one started.
//!
//! relationships:
//!     - uses: window.rs (tick bookkeeping), source.rs (readings)
//!     - uses: advisor.rs (advice on completion), thresholds.rs (local verdict)
//!     - used by: server.rs (http control), main.rs (construction)
//!
//! ==============================================================================

use super::source::{PolledSource, SimulatedSource, SubscriptionSource};
use super::window::{AcquisitionWindow, Offer, SourceKind, WindowPolicy};
use crate::advisor::{get_advice, Advisor};
use crate::config::HostConfig;
use crate::domain::{
    now_ms, AcquisitionState, AdviceResult, AdvisorStatus, GrainType, Measurement, MoistureSample,
    MoistureStatus, Notice, RawReading,
};
use crate::store::ReadingStore;
use crate::thresholds::classify;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// knobs for the acquisition task, resolved from host.toml
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub source: SourceKind,
    pub tick: Duration,
    pub stale_after_ms: i64,
    pub device_id: String,
    pub poll_url: String,
    pub max_window: Option<Duration>,
    pub seed: Option<u64>,
}

impl AcquisitionSettings {
    pub fn from_config(config: &HostConfig) -> Self {
        let acq = &config.acquisition;
        Self {
            source: acq.source,
            tick: Duration::from_millis(acq.tick_millis.max(1)),
            stale_after_ms: i64::try_from(acq.stale_after_seconds.saturating_mul(1000))
                .unwrap_or(i64::MAX),
            device_id: config.device.id.clone(),
            poll_url: config.poll_url(),
            max_window: acq.max_window_seconds.map(Duration::from_secs),
            seed: acq.seed,
        }
    }

    fn policy(&self) -> WindowPolicy {
        WindowPolicy::for_source(self.source, self.stale_after_ms)
    }
}

/// everything the dashboard needs to render the measurement panel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionSnapshot {
    pub state: AcquisitionState,
    pub grain: GrainType,
    pub source: SourceKind,
    pub current_moisture: Option<f64>,
    pub ticks: u32,
    pub target_ticks: u32,
    pub readings: Vec<MoistureSample>,
    /// most recent first
    pub history: Vec<Measurement>,
    pub advisor: AdvisorStatus,
    pub advice: AdviceResult,
    /// threshold verdict for the latest measurement, independent of the advisor
    pub local_status: Option<MoistureStatus>,
    pub notice: Option<Notice>,
}

struct Session {
    state: AcquisitionState,
    grain: GrainType,
    window: AcquisitionWindow,
    history: Vec<Measurement>,
    advisor: AdvisorStatus,
    advice: AdviceResult,
    local_status: Option<MoistureStatus>,
    notice: Option<Notice>,
    generation: u64,
}

impl Session {
    /// drop the live window and any pending advice; history is kept
    fn clear_live(&mut self, policy: WindowPolicy) {
        self.generation += 1;
        self.window.reset(policy);
        self.advisor = AdvisorStatus::Idle;
        self.advice = AdviceResult::awaiting();
        self.local_status = None;
        self.notice = None;
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

enum Feed {
    Simulated(SimulatedSource),
    Polled(PolledSource),
    Subscription(SubscriptionSource),
}

enum Tick {
    Moisture(f64),
    Raw(RawReading),
    /// nothing usable this tick (transport error)
    Skip,
    /// the source can never produce again
    Exhausted,
}

pub struct AcquisitionController<A: Advisor> {
    session: Arc<Mutex<Session>>,
    worker: Arc<Mutex<Option<Worker>>>,
    settings: Arc<AcquisitionSettings>,
    store: Arc<ReadingStore>,
    advisor: Arc<A>,
    client: reqwest::Client,
}

impl<A: Advisor> Clone for AcquisitionController<A> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            worker: self.worker.clone(),
            settings: self.settings.clone(),
            store: self.store.clone(),
            advisor: self.advisor.clone(),
            client: self.client.clone(),
        }
    }
}

impl<A: Advisor> AcquisitionController<A> {
    pub fn new(
        settings: AcquisitionSettings,
        store: Arc<ReadingStore>,
        advisor: Arc<A>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.tick.max(Duration::from_secs(1)))
            .build()
            .context("failed to build polling http client")?;

        let session = Session {
            state: AcquisitionState::Idle,
            grain: GrainType::default(),
            window: AcquisitionWindow::new(settings.policy()),
            history: Vec::new(),
            advisor: AdvisorStatus::Idle,
            advice: AdviceResult::awaiting(),
            local_status: None,
            notice: None,
            generation: 0,
        };

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            worker: Arc::new(Mutex::new(None)),
            settings: Arc::new(settings),
            store,
            advisor,
            client,
        })
    }

    pub async fn snapshot(&self) -> AcquisitionSnapshot {
        let s = self.session.lock().await;
        AcquisitionSnapshot {
            state: s.state,
            grain: s.grain,
            source: self.settings.source,
            current_moisture: s.window.current(),
            ticks: s.window.ticks(),
            target_ticks: s.window.policy().ticks,
            readings: s.window.samples(),
            history: s.history.clone(),
            advisor: s.advisor,
            advice: s.advice.clone(),
            local_status: s.local_status,
            notice: s.notice.clone(),
        }
    }

    /// begin a new window, cancelling any running one first
    pub async fn start(&self, grain: Option<GrainType>) -> AcquisitionSnapshot {
        let mut worker = self.worker.lock().await;
        if let Some(old) = worker.take() {
            stop_worker(old).await;
        }

        let (generation, grain) = {
            let mut s = self.session.lock().await;
            if let Some(grain) = grain {
                s.grain = grain;
            }
            s.clear_live(self.settings.policy());
            s.state = AcquisitionState::Measuring;
            (s.generation, s.grain)
        };

        // subscribe before spawning so no push between now and the first poll is lost
        let feed = match self.settings.source {
            SourceKind::Simulated => {
                let rng = match self.settings.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                Feed::Simulated(SimulatedSource::new(grain, rng))
            }
            SourceKind::Polled => {
                Feed::Polled(PolledSource::new(self.client.clone(), self.settings.poll_url.clone()))
            }
            SourceKind::Subscription => Feed::Subscription(SubscriptionSource::new(
                self.store.subscribe(),
                self.settings.device_id.clone(),
            )),
        };

        tracing::info!(
            "[ACQUIRE] Measuring {} via {:?} (window #{})",
            grain,
            self.settings.source,
            generation
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_window(
            self.session.clone(),
            self.advisor.clone(),
            self.settings.clone(),
            feed,
            token.clone(),
            generation,
        ));
        *worker = Some(Worker { token, handle });
        drop(worker);

        self.snapshot().await
    }

    /// stop the running window (if any) and go back to idle
    pub async fn cancel(&self) -> AcquisitionSnapshot {
        self.halt(None).await;
        self.snapshot().await
    }

    /// switch grain type; any running window is cancelled
    pub async fn select_grain(&self, grain: GrainType) -> AcquisitionSnapshot {
        self.halt(Some(grain)).await;
        self.snapshot().await
    }

    async fn halt(&self, grain: Option<GrainType>) {
        let mut worker = self.worker.lock().await;
        if let Some(old) = worker.take() {
            stop_worker(old).await;
        }

        let mut s = self.session.lock().await;
        if let Some(grain) = grain {
            s.grain = grain;
        }
        s.clear_live(self.settings.policy());
        s.state = AcquisitionState::Idle;
    }
}

async fn stop_worker(worker: Worker) {
    worker.token.cancel();
    if let Err(e) = worker.handle.await {
        if !e.is_cancelled() {
            tracing::error!("[ACQUIRE] Window task failed: {}", e);
        }
    }
}

// ==============================================================================
// sampling task
// ==============================================================================

async fn run_window<A: Advisor>(
    session: Arc<Mutex<Session>>,
    advisor: Arc<A>,
    settings: Arc<AcquisitionSettings>,
    mut feed: Feed,
    token: CancellationToken,
    generation: u64,
) {
    let mut ticker = time::interval_at(Instant::now() + settings.tick, settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = settings.max_window.map(|d| Instant::now() + d);

    let (grain, moisture) = loop {
        let tick = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = wait_for(deadline) => {
                abandon(&session, generation, &settings).await;
                return;
            }
            tick = next_tick(&mut feed, &mut ticker) => tick,
        };

        let mut s = session.lock().await;
        if s.generation != generation {
            return;
        }

        let offer = match tick {
            Tick::Moisture(value) => s.window.offer(value),
            Tick::Raw(reading) => s.window.offer_raw(&reading, now_ms()),
            Tick::Skip => continue,
            Tick::Exhausted => {
                tracing::warn!("[ACQUIRE] Reading source closed before the window completed");
                s.clear_live(settings.policy());
                s.state = AcquisitionState::Idle;
                return;
            }
        };

        match offer {
            Offer::Recorded(sample) => {
                let (index, value) = (sample.sequence_index, sample.moisture_percent);
                tracing::debug!("[ACQUIRE] #{} {:.1}%", index, value);
            }
            Offer::Stale => tracing::debug!("[ACQUIRE] Discarded stale reading"),
            Offer::Closed => return,
            Offer::Complete(value) => {
                let measurement = Measurement {
                    grain_type: s.grain,
                    moisture_percent: value,
                    taken_at: Utc::now(),
                };
                tracing::info!("[ACQUIRE] ✓ {} finalized at {:.1}%", measurement.grain_type, value);

                s.state = AcquisitionState::Done;
                s.local_status = Some(classify(measurement.grain_type, value));
                s.advisor = AdvisorStatus::Loading;
                s.history.insert(0, measurement);
                break (s.grain, value);
            }
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        outcome = get_advice(advisor.as_ref(), grain, moisture) => outcome,
    };

    let mut s = session.lock().await;
    if s.generation != generation {
        return;
    }
    s.advice = outcome.advice;
    s.notice = outcome.notice;
    s.advisor = AdvisorStatus::Done;
}

async fn next_tick(feed: &mut Feed, ticker: &mut Interval) -> Tick {
    match feed {
        Feed::Simulated(source) => {
            ticker.tick().await;
            Tick::Moisture(source.next_moisture())
        }
        Feed::Polled(source) => {
            ticker.tick().await;
            match source.fetch().await {
                // the endpoint answers {0, start} until the device has reported
                Ok(reading) if reading.raw_value == 0.0 || !reading.raw_value.is_finite() => {
                    tracing::debug!("[ACQUIRE] No device reading yet");
                    Tick::Skip
                }
                Ok(reading) => Tick::Raw(reading),
                Err(e) => {
                    tracing::warn!("[ACQUIRE] ⚠ Poll failed: {:#}", e);
                    Tick::Skip
                }
            }
        }
        Feed::Subscription(source) => match source.next_reading().await {
            Some(reading) => Tick::Raw(reading),
            None => Tick::Exhausted,
        },
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn abandon(session: &Mutex<Session>, generation: u64, settings: &AcquisitionSettings) {
    let mut s = session.lock().await;
    if s.generation != generation {
        return;
    }
    tracing::warn!("[ACQUIRE] ⚠ Window #{} timed out after {} ticks", generation, s.window.ticks());
    s.clear_live(settings.policy());
    s.state = AcquisitionState::Idle;
    s.notice = Some(Notice {
        title: "Measurement timed out".to_string(),
        description: "No usable sensor readings arrived in time. Check the device and try again."
            .to_string(),
    });
}
