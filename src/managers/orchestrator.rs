//! Backup orchestrator
//!
//! Drives a [`BackupStrategy`] through its lifecycle:
//!
//! 1. Startup: load configuration, parse the schedule, build storage, inject
//!    it and probe readiness. Any failure here is a [`StartupError`] and
//!    nothing gets scheduled.
//! 2. Optional run on startup, then one run per schedule tick. Every run gets
//!    its own deadline token; a failing run is logged and the loop carries on.
//! 3. When the shutdown token fires, ticking stops and in-flight runs are
//!    awaited. Shutdown never cancels a run.
//!
//! All logging happens under the [`Dispatch`] given at construction, including
//! inside spawned run tasks.

use crate::config::{Config, NotifyEvent};
use crate::managers::notification::{NotificationManager, RunOutcome};
use crate::managers::scheduler::{schedule_from_expression, Schedule, Scheduler, SchedulerClock};
use crate::storage::{new_storage, Storage, StorageError};
use crate::strategies::BackupStrategy;
use crate::utils::{CronParseError, RunDeadline};
use chrono::Local;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Dispatch};

/// Lifecycle state, observable through [`Orchestrator::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scheduled,
    Running,
    Draining,
    Stopped,
}

/// Failures that abort the process before anything is scheduled
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("invalid schedule '{expression}': {source}")]
    Schedule {
        expression: String,
        #[source]
        source: CronParseError,
    },

    #[error("schedule '{0}' never fires")]
    ScheduleNeverFires(String),

    #[error("failed to initialize storage: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to set storage: {0:#}")]
    SetStorage(anyhow::Error),

    #[error("connection test for {name} failed: {error:#}")]
    Connection { name: String, error: anyhow::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Startup,
    Scheduled,
    Manual,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Trigger::Startup => "Initial backup",
            Trigger::Scheduled | Trigger::Manual => "Backup",
        }
    }
}

/// Everything a run needs, shared by all runs
struct RunContext {
    strategy: Arc<dyn BackupStrategy>,
    storage_type: &'static str,
    timeout: Duration,
    notifier: Option<NotificationManager>,
}

impl RunContext {
    async fn execute(&self, trigger: Trigger) -> anyhow::Result<()> {
        let deadline = RunDeadline::after(self.timeout);
        let started = Instant::now();

        let result = self.strategy.run(deadline.token()).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => info!("{} completed in {:.1?}", trigger.label(), elapsed),
            Err(e) if deadline.expired() => error!(
                "{} timed out after {} minutes: {:#}",
                trigger.label(),
                self.timeout.as_secs() / 60,
                e
            ),
            Err(e) => error!("{} failed: {:#}", trigger.label(), e),
        }

        if let Some(notifier) = &self.notifier {
            let outcome = RunOutcome {
                event: if result.is_ok() {
                    NotifyEvent::Success
                } else {
                    NotifyEvent::Failure
                },
                strategy: self.strategy.name().to_string(),
                storage: self.storage_type.to_string(),
                trigger: trigger.as_str(),
                error: result.as_ref().err().map(|e| format!("{:#}", e)),
                duration_secs: elapsed.as_secs(),
            };
            if let Err(e) = notifier.notify(&outcome).await {
                warn!("Failed to send notification: {:#}", e);
            }
        }

        result
    }
}

/// Decrements the in-flight counter when a run task ends, even on panic
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Prepared {
    config: Config,
    schedule: Box<dyn Schedule>,
    context: Arc<RunContext>,
}

/// Replacements for what startup would otherwise build from configuration
#[derive(Default)]
struct Overrides {
    schedule: Option<Box<dyn Schedule>>,
    storage: Option<Arc<dyn Storage>>,
}

pub struct Orchestrator {
    strategy: Box<dyn BackupStrategy>,
    dispatch: Dispatch,
    shutdown: CancellationToken,
    overrides: Overrides,
    clock: SchedulerClock,
    state: watch::Sender<RunState>,
}

impl Orchestrator {
    /// Orchestrate `strategy`, logging to `dispatch` until `shutdown` is cancelled
    pub fn new(strategy: Box<dyn BackupStrategy>, dispatch: Dispatch, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            strategy,
            dispatch,
            shutdown,
            overrides: Overrides::default(),
            clock: SchedulerClock::System,
            state,
        }
    }

    /// Use `schedule` instead of the configured cron expression
    pub fn with_schedule(mut self, schedule: Box<dyn Schedule>) -> Self {
        self.overrides.schedule = Some(schedule);
        self
    }

    /// Use `storage` instead of building one from configuration
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.overrides.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: SchedulerClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run until shutdown; only startup failures are returned
    pub async fn run(self) -> Result<(), StartupError> {
        let dispatch = self.dispatch.clone();
        self.run_scheduled().with_subscriber(dispatch).await
    }

    /// Validate startup, perform one run and return its result
    pub async fn run_single(self) -> anyhow::Result<()> {
        let dispatch = self.dispatch.clone();
        self.run_once().with_subscriber(dispatch).await
    }

    async fn run_once(self) -> anyhow::Result<()> {
        let Self {
            strategy,
            overrides,
            clock,
            state,
            ..
        } = self;

        let prepared = match startup(strategy, overrides, clock).await {
            Ok(prepared) => prepared,
            Err(e) => {
                set_state(&state, RunState::Stopped);
                return Err(e.into());
            }
        };

        set_state(&state, RunState::Running);
        let result = prepared.context.execute(Trigger::Manual).await;
        set_state(&state, RunState::Stopped);
        result
    }

    async fn run_scheduled(self) -> Result<(), StartupError> {
        let Self {
            strategy,
            dispatch,
            shutdown,
            overrides,
            clock,
            state,
        } = self;

        let Prepared {
            config,
            schedule,
            context,
        } = match startup(strategy, overrides, clock).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Startup failed: {}", e);
                set_state(&state, RunState::Stopped);
                return Err(e);
            }
        };

        if config.backup.run_on_startup {
            info!("Running initial backup on startup...");
            set_state(&state, RunState::Running);
            // Failure is logged by execute; the scheduler still starts
            let _ = context.execute(Trigger::Startup).await;
        }

        if shutdown.is_cancelled() {
            info!("Shutdown requested before the scheduler started");
            set_state(&state, RunState::Stopped);
            info!("Shutdown complete");
            return Ok(());
        }

        let mut scheduler = Scheduler::with_clock(schedule, clock);
        info!("Scheduler started ({}), waiting for scheduled jobs...", scheduler.describe());
        log_next_fire(&scheduler);
        set_state(&state, RunState::Scheduled);

        let single_flight = config.backup.single_flight;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut runs = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                fired = scheduler.tick() => {
                    info!(
                        "Cron triggered backup job (scheduled for {})",
                        fired.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                    );

                    let admitted = if single_flight {
                        in_flight
                            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    } else {
                        let previous = in_flight.fetch_add(1, Ordering::SeqCst);
                        if previous > 0 {
                            warn!("{} previous backup(s) still running, starting an overlapping run", previous);
                        }
                        true
                    };

                    if admitted {
                        let guard = InFlight(Arc::clone(&in_flight));
                        let context = Arc::clone(&context);
                        runs.spawn(
                            async move {
                                let _guard = guard;
                                let _ = context.execute(Trigger::Scheduled).await;
                            }
                            .with_subscriber(dispatch.clone()),
                        );
                        set_state(&state, RunState::Running);
                    } else {
                        warn!("Previous backup still running, skipping this run");
                    }

                    log_next_fire(&scheduler);
                }
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = joined {
                        error!("Backup task aborted: {}", e);
                    }
                    if runs.is_empty() {
                        set_state(&state, RunState::Scheduled);
                    }
                }
            }
        }

        info!("Stopping scheduler...");
        set_state(&state, RunState::Draining);
        if !runs.is_empty() {
            info!("Waiting for {} in-flight backup(s) to finish...", runs.len());
        }
        while let Some(joined) = runs.join_next().await {
            if let Err(e) = joined {
                error!("Backup task aborted: {}", e);
            }
        }

        set_state(&state, RunState::Stopped);
        info!("Shutdown complete");
        Ok(())
    }
}

fn set_state(sender: &watch::Sender<RunState>, state: RunState) {
    let previous = sender.send_replace(state);
    if previous != state {
        debug!("Orchestrator state: {:?} -> {:?}", previous, state);
    }
}

async fn startup(
    mut strategy: Box<dyn BackupStrategy>,
    overrides: Overrides,
    clock: SchedulerClock,
) -> Result<Prepared, StartupError> {
    info!("Starting {} backup service...", strategy.name());

    let config = strategy.config().map_err(StartupError::Config)?;

    info!("Configuration loaded:");
    for line in strategy.extra_config_log_info() {
        info!("  {}", line);
    }
    info!("  Backup schedule: {}", config.backup.schedule);
    info!("  Storage type: {}", config.storage.storage_type);
    info!("  Retention count: {}", config.backup.retention_count);
    info!("  Run timeout: {} minutes", config.backup.timeout_minutes);

    let schedule: Box<dyn Schedule> = match overrides.schedule {
        Some(schedule) => schedule,
        None => schedule_from_expression(&config.backup.schedule, config.backup.utc).map_err(|source| {
            StartupError::Schedule {
                expression: config.backup.schedule.clone(),
                source,
            }
        })?,
    };
    if schedule.next_after(clock.now()).is_none() {
        return Err(StartupError::ScheduleNeverFires(schedule.describe()));
    }

    let storage = match overrides.storage {
        Some(storage) => storage,
        None => new_storage(&config.storage, &config.artifacts).await?,
    };
    info!("Storage initialized: {}", storage.storage_type());

    strategy
        .set_storage(Arc::clone(&storage))
        .map_err(StartupError::SetStorage)?;

    let probe = RunDeadline::after(config.backup.timeout());
    strategy
        .test_connection(probe.token())
        .await
        .map_err(|error| StartupError::Connection {
            name: strategy.name().to_string(),
            error,
        })?;
    info!("Connection verified");

    let notifier = if config.notifications.discord_webhook_url.is_empty() {
        None
    } else {
        match NotificationManager::new(config.notifications.clone()) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                warn!("Notifications disabled: {:#}", e);
                None
            }
        }
    };

    let context = Arc::new(RunContext {
        strategy: Arc::from(strategy),
        storage_type: storage.storage_type(),
        timeout: config.backup.timeout(),
        notifier,
    });

    Ok(Prepared {
        config,
        schedule,
        context,
    })
}

fn log_next_fire(scheduler: &Scheduler) {
    match scheduler.next_fire() {
        Some(next) => info!(
            "Next backup scheduled at: {}",
            next.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => warn!("Schedule has no further fire times"),
    }
}
