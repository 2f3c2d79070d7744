// src/monitor.rs
// The monitor session: start/stop/status state machine plus the periodic
// fetch → normalize → diff → dispatch cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::diff::diff;
use crate::fetch::ListingSource;
use crate::listing::Listing;
use crate::notify::{ChatId, Notifier};
use crate::seen::SeenStore;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Fetch-diff-dispatch cycles run.");
        describe_counter!("monitor_fetch_errors_total", "Cycles lost to fetch errors.");
        describe_counter!("monitor_listings_found_total", "Listings extracted across cycles.");
        describe_counter!("monitor_listings_new_total", "Listings that passed the diff.");
        describe_counter!(
            "monitor_notifications_sent_total",
            "Listings delivered and committed."
        );
        describe_counter!(
            "monitor_delivery_errors_total",
            "Deliveries that failed and stayed uncommitted."
        );
        describe_gauge!("monitor_running", "1 while the monitor loop is running.");
        describe_gauge!("monitor_last_cycle_ts", "Unix ts of the last cycle start.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorCfg {
    pub poll_interval: Duration,
    pub seen_cap: usize,
    /// Pause between consecutive item deliveries within one cycle.
    pub send_pause: Duration,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(600),
            seen_cap: 50,
            send_pause: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

/// What happened in the most recent cycle; read back by `/status`.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub at: Option<DateTime<Utc>>,
    pub found: usize,
    pub fresh: usize,
    pub dispatched: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state: MonitorState,
    pub destination: Option<ChatId>,
    pub sent_total: u64,
    pub cycles: u64,
    pub seen: usize,
    pub seen_cap: usize,
    pub last_cycle: CycleSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// This chat is now the destination.
    Bound,
    /// Same chat asked again; nothing changed.
    AlreadyBound,
    /// A different chat is already bound; refused.
    OtherChat,
}

struct Control {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    cfg: MonitorCfg,
    source: Arc<dyn ListingSource>,
    notifier: Arc<dyn Notifier>,
    destination: Mutex<Option<ChatId>>,
    seen: Mutex<SeenStore>,
    summary: Mutex<CycleSummary>,
    sent_total: AtomicU64,
    cycles: AtomicU64,
    control: Mutex<Control>,
}

/// Cloneable handle to the single monitor session. All command handlers and
/// the cycle task share one `Shared` behind it; there is no ambient global
/// state.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    pub fn new(cfg: MonitorCfg, source: Arc<dyn ListingSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            shared: Arc::new(Shared {
                seen: Mutex::new(SeenStore::with_cap(cfg.seen_cap)),
                cfg,
                source,
                notifier,
                destination: Mutex::new(None),
                summary: Mutex::new(CycleSummary::default()),
                sent_total: AtomicU64::new(0),
                cycles: AtomicU64::new(0),
                control: Mutex::new(Control {
                    stop_tx: None,
                    task: None,
                }),
            }),
        }
    }

    /// Set-once destination binding. The first chat to `/start` wins; later
    /// attempts from another chat are refused rather than silently rebound.
    pub fn bind_destination(&self, chat: ChatId) -> BindOutcome {
        let mut dest = self
            .shared
            .destination
            .lock()
            .expect("destination mutex poisoned");
        match *dest {
            None => {
                *dest = Some(chat);
                BindOutcome::Bound
            }
            Some(bound) if bound == chat => BindOutcome::AlreadyBound,
            Some(_) => BindOutcome::OtherChat,
        }
    }

    pub fn destination(&self) -> Option<ChatId> {
        *self
            .shared
            .destination
            .lock()
            .expect("destination mutex poisoned")
    }

    /// Stopped → Running. Idempotent: starting a running monitor is a no-op
    /// signalled through the outcome, not an error.
    pub fn start(&self) -> StartOutcome {
        let mut ctl = self.shared.control.lock().expect("control mutex poisoned");
        if task_alive(&ctl) {
            return StartOutcome::AlreadyRunning;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        ctl.task = Some(tokio::spawn(run_loop(shared, stop_rx)));
        ctl.stop_tx = Some(stop_tx);
        tracing::info!("monitor started");
        StartOutcome::Started
    }

    /// Request a stop. Takes effect at the next checkpoint (between item
    /// deliveries, or before the next fetch), never mid-dispatch.
    pub fn stop(&self) -> StopOutcome {
        let ctl = self.shared.control.lock().expect("control mutex poisoned");
        if !task_alive(&ctl) {
            return StopOutcome::NotRunning;
        }
        if let Some(tx) = &ctl.stop_tx {
            let _ = tx.send(true);
        }
        tracing::info!("monitor stop requested");
        StopOutcome::Stopping
    }

    pub fn state(&self) -> MonitorState {
        let ctl = self.shared.control.lock().expect("control mutex poisoned");
        if task_alive(&ctl) {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    /// Pure read; never transitions state.
    pub fn status(&self) -> StatusReport {
        let (seen, seen_cap) = {
            let seen = self.shared.seen.lock().expect("seen mutex poisoned");
            (seen.len(), seen.cap())
        };
        StatusReport {
            state: self.state(),
            destination: self.destination(),
            sent_total: self.shared.sent_total.load(Ordering::Relaxed),
            cycles: self.shared.cycles.load(Ordering::Relaxed),
            seen,
            seen_cap,
            last_cycle: self
                .shared
                .summary
                .lock()
                .expect("summary mutex poisoned")
                .clone(),
        }
    }
}

fn task_alive(ctl: &Control) -> bool {
    ctl.task.as_ref().is_some_and(|t| !t.is_finished())
}

async fn run_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    ensure_metrics_described();
    gauge!("monitor_running").set(1.0);

    loop {
        if *stop.borrow() {
            break;
        }
        run_cycle(&shared, &stop).await;

        let sleep = tokio::time::sleep(shared.cfg.poll_interval);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            _ = stop.changed() => {}
        }
    }

    gauge!("monitor_running").set(0.0);
    tracing::info!("monitor loop stopped");
}

/// One fetch-diff-dispatch pass. Every failure in here is cycle-local:
/// logged, surfaced through the summary, never thrown out of the loop.
async fn run_cycle(shared: &Arc<Shared>, stop: &watch::Receiver<bool>) {
    let cycle_started = Utc::now();
    shared.cycles.fetch_add(1, Ordering::Relaxed);
    counter!("monitor_cycles_total").increment(1);
    gauge!("monitor_last_cycle_ts").set(cycle_started.timestamp() as f64);

    let raw = match shared.source.fetch().await {
        Ok(raw) => raw,
        Err(e) => {
            counter!("monitor_fetch_errors_total").increment(1);
            tracing::warn!(error = %e, "fetch failed, cycle yields nothing");
            *shared.summary.lock().expect("summary mutex poisoned") = CycleSummary {
                at: Some(cycle_started),
                last_error: Some(e.to_string()),
                ..CycleSummary::default()
            };
            return;
        }
    };

    let found = raw.len();
    if found == 0 {
        // Possibly a layout change or an empty page; not an error, no
        // notifications this cycle.
        tracing::warn!("fetch extracted zero listings");
    }
    counter!("monitor_listings_found_total").increment(found as u64);

    let batch: Vec<Listing> = raw.into_iter().map(Listing::from_raw).collect();
    let fresh = {
        let seen = shared.seen.lock().expect("seen mutex poisoned");
        diff(&batch, &seen)
    };
    let fresh_count = fresh.len();
    counter!("monitor_listings_new_total").increment(fresh_count as u64);

    let destination = *shared
        .destination
        .lock()
        .expect("destination mutex poisoned");
    let mut dispatched = 0usize;
    let mut last_error: Option<String> = None;

    if let Some(destination) = destination {
        for (i, item) in fresh.iter().enumerate() {
            // Stop checkpoint: never tear down mid-dispatch, but do not
            // begin the next item either.
            if *stop.borrow() {
                tracing::info!(remaining = fresh_count - i, "stop requested, cycle cut short");
                break;
            }
            if i > 0 {
                tokio::time::sleep(shared.cfg.send_pause).await;
            }

            match shared.notifier.dispatch(item, destination).await {
                Ok(()) => {
                    // Commit only after the message went out: a crash in
                    // between re-delivers, it never silently drops.
                    shared
                        .seen
                        .lock()
                        .expect("seen mutex poisoned")
                        .commit(&item.identity);
                    shared.sent_total.fetch_add(1, Ordering::Relaxed);
                    counter!("monitor_notifications_sent_total").increment(1);
                    dispatched += 1;
                }
                Err(e) => {
                    counter!("monitor_delivery_errors_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        identity = %item.identity,
                        "delivery failed, item stays eligible for the next cycle"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }
    } else if fresh_count > 0 {
        tracing::warn!(fresh = fresh_count, "no destination bound, nothing dispatched");
        last_error = Some("no destination bound".to_string());
    }

    tracing::info!(
        target: "monitor",
        found,
        fresh = fresh_count,
        dispatched,
        "cycle finished"
    );

    *shared.summary.lock().expect("summary mutex poisoned") = CycleSummary {
        at: Some(cycle_started),
        found,
        fresh: fresh_count,
        dispatched,
        last_error,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::listing::RawListing;

    struct EmptySource;

    #[async_trait::async_trait]
    impl ListingSource for EmptySource {
        async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
            Ok(Vec::new())
        }
    }

    struct NullNotifier;

    #[async_trait::async_trait]
    impl Notifier for NullNotifier {
        async fn dispatch(
            &self,
            _item: &Listing,
            _destination: ChatId,
        ) -> Result<(), crate::notify::DeliveryError> {
            Ok(())
        }
    }

    fn handle() -> MonitorHandle {
        MonitorHandle::new(
            MonitorCfg::default(),
            Arc::new(EmptySource),
            Arc::new(NullNotifier),
        )
    }

    #[test]
    fn destination_binding_is_set_once() {
        let m = handle();
        assert_eq!(m.bind_destination(1), BindOutcome::Bound);
        assert_eq!(m.bind_destination(1), BindOutcome::AlreadyBound);
        assert_eq!(m.bind_destination(2), BindOutcome::OtherChat);
        assert_eq!(m.destination(), Some(1));
    }

    #[tokio::test]
    async fn stop_while_stopped_is_a_noop() {
        let m = handle();
        assert_eq!(m.stop(), StopOutcome::NotRunning);
        assert_eq!(m.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn status_is_a_pure_read() {
        let m = handle();
        let before = m.state();
        let report = m.status();
        assert_eq!(report.state, before);
        assert_eq!(report.sent_total, 0);
        assert_eq!(m.state(), before);
    }
}
