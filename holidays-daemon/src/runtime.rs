use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use holidays_core::{settings, DATE_FORMAT};
use holidays_sync::{daily, Engine, SortOrder};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::LogFile;
use crate::paths::{
    holidays_root, logs_dir, socket_path, stderr_log_path, stdout_log_path, DEBOUNCE_WINDOW,
    SETTINGS_FILE,
};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::schedule::{delay_until_next, WatchSchedule};
use crate::summary::{phase_label, LastSyncSummary, SyncSummary};

/// Everything the tasks share.
struct DaemonState {
    home: PathBuf,
    engine: Arc<Engine>,
    schedule: Arc<WatchSchedule>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
///
/// With `log_to_file`, logs go to `~/.holidays/logs/daemon.log` (warnings
/// also to `daemon-err.log`) instead of stdout.
pub fn start_blocking(home: &Path, log_to_file: bool) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(home, log_to_file);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let (schedule, schedule_rx) = WatchSchedule::new();
    let schedule = Arc::new(schedule);
    let engine = {
        let home = home.clone();
        let schedule = Arc::clone(&schedule);
        tokio::task::spawn_blocking(move || Engine::open_at(&home, schedule))
            .await
            .map_err(|err| DaemonError::Protocol(format!("engine open join error: {err}")))??
    };
    let state = Arc::new(DaemonState {
        home: home.clone(),
        engine: Arc::new(engine),
        schedule,
        started_at_unix: unix_seconds_now(),
    });
    tracing::info!(home = %home.display(), "holidays daemon starting");

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let startup_handle = {
        let engine = Arc::clone(&state.engine);
        tokio::spawn(async move {
            startup_sync(engine).await;
            Ok(())
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let result = watcher_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let timer_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = Arc::clone(&state.engine);
        tokio::spawn(async move {
            let fire = move || run_daily_check(Arc::clone(&engine));
            let result = daily_timer_task(
                schedule_rx,
                Local::now,
                fire,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (startup_result, watcher_result, timer_result, socket_result, rotation_result, signal_result) =
        tokio::join!(
            startup_handle,
            watcher_handle,
            timer_handle,
            socket_handle,
            rotation_handle,
            signal_handle
        );

    handle_join("startup_sync", startup_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("daily_timer", timer_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("holidays daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync + daily check on the blocking pool
// ---------------------------------------------------------------------------

async fn startup_sync(engine: Arc<Engine>) {
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || engine.orchestrator().sync_if_empty()).await;
    match joined {
        Ok(Some(outcome)) => {
            log_summary(&SyncSummary::from_outcome(
                &outcome,
                "startup",
                started.elapsed(),
            ));
        }
        Ok(None) => tracing::info!("cache present; startup sync skipped"),
        Err(err) => tracing::error!(error = %err, "startup sync task panicked"),
    }
}

async fn run_sync(engine: Arc<Engine>, source: &'static str) -> Result<SyncSummary, DaemonError> {
    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || engine.sync())
        .await
        .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;
    let summary = SyncSummary::from_outcome(&outcome, source, started.elapsed());
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &SyncSummary) {
    if summary.is_failed() {
        tracing::warn!(
            source = %summary.source,
            message = summary.message.as_deref().unwrap_or_default(),
            detail = summary.detail.as_deref().unwrap_or_default(),
            "sync failed",
        );
    } else {
        tracing::info!(
            source = %summary.source,
            outcome = %summary.outcome,
            records = summary.records.unwrap_or_default(),
            changed = summary.changed.unwrap_or_default(),
            duration_ms = summary.duration_ms as u64,
            "sync finished",
        );
    }
}

async fn run_daily_check(engine: Arc<Engine>) {
    let joined = tokio::task::spawn_blocking(move || engine.run_daily_check(None)).await;
    match joined {
        Ok(Ok(notices)) => tracing::info!(matches = notices.len(), "daily check ran"),
        Ok(Err(err)) => tracing::warn!(error = %err, "daily check skipped"),
        Err(err) => tracing::error!(error = %err, "daily check task panicked"),
    }
}

// ---------------------------------------------------------------------------
// Settings watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = holidays_root(&state.home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    // FSEvents reports real paths (/private/var/... on macOS).
    let root = fs::canonicalize(&root).unwrap_or(root);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %root.display(), "watching settings directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let touched_settings = event.paths.iter().any(|path| {
                    is_settings_file(path) && should_process_event(&mut debounce, path, Instant::now())
                });
                if !touched_settings {
                    continue;
                }

                tracing::info!("settings changed; forcing sync");
                if let Err(err) = run_sync(Arc::clone(&state.engine), "watcher").await {
                    tracing::error!(error = %err, "watcher-triggered sync failed");
                }
            }
        }
    }

    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_settings_file(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()) == Some(SETTINGS_FILE)
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Daily timer
// ---------------------------------------------------------------------------

/// Sleep until the armed time, call `fire`, repeat. Re-plans whenever the
/// schedule changes; idles while nothing is armed.
async fn daily_timer_task<Tz, C, F, Fut>(
    mut schedule_rx: watch::Receiver<Option<NaiveTime>>,
    clock: C,
    mut fire: F,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    Tz: TimeZone,
    C: Fn() -> DateTime<Tz>,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let armed = *schedule_rx.borrow_and_update();
        let wait = armed.map(|at| delay_until_next(&clock(), at));
        if let (Some(at), Some(wait)) = (armed, wait) {
            tracing::debug!(at = %at, wait_secs = wait.as_secs(), "daily check armed");
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            changed = schedule_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep_or_idle(wait) => fire().await,
        }
    }
    Ok(())
}

async fn sleep_or_idle(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = Arc::clone(&state);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&state)),
            "sync" => match run_sync(Arc::clone(&state.engine), "socket").await {
                Ok(summary) => DaemonResponse::ok(serde_json::to_value(summary)?),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "list" => {
                let records = state.engine.store().query_all(SortOrder::DateAscending);
                DaemonResponse::ok(serde_json::to_value(records)?)
            }
            "today" => today_response(&state, request.date.as_deref()).await,
            "show" => match request.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => match state.engine.store().query_by_name(name) {
                    Some(record) => DaemonResponse::ok(serde_json::to_value(record)?),
                    None => DaemonResponse::error(format!("no holiday named '{name}'")),
                },
                _ => DaemonResponse::error("`show` needs a `name`"),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

/// Holidays for today (or `date`), without sending notifications.
async fn today_response(state: &DaemonState, date: Option<&str>) -> DaemonResponse {
    let today = match date {
        Some(raw) => match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => date,
            Err(_) => return DaemonResponse::error(format!("invalid date '{raw}'; expected YYYY-MM-DD")),
        },
        None => Local::now().date_naive(),
    };

    let home = state.home.clone();
    let pinned = match tokio::task::spawn_blocking(move || settings::load_at(&home)).await {
        Ok(Ok(settings)) => settings.year,
        Ok(Err(err)) => return DaemonResponse::error(err.to_string()),
        Err(err) => return DaemonResponse::error(format!("settings task join error: {err}")),
    };

    let Some(check) = daily::check_date(today, pinned) else {
        return DaemonResponse::ok(json!({ "date": null, "holidays": [] }));
    };
    let key = daily::date_key(check);
    let holidays = state.engine.store().query_by_date(&key);
    DaemonResponse::ok(json!({ "date": key, "holidays": holidays }))
}

fn build_status_payload(state: &DaemonState) -> Value {
    let orchestrator = state.engine.orchestrator();
    let snapshot = state.engine.store().snapshot();
    json!({
        "running": true,
        "label": crate::paths::DAEMON_LABEL,
        "pid": std::process::id(),
        "started_at_unix": state.started_at_unix,
        "phase": phase_label(orchestrator.phase()),
        "fresh": orchestrator.is_fresh(),
        "last_sync": LastSyncSummary::from(&orchestrator.last_sync()),
        "records": snapshot.len(),
        "synced_at": snapshot.synced_at,
        "daily_check_at": state.schedule.armed().map(|t| t.format("%H:%M").to_string()),
        "socket": socket_path(&state.home).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [holidays_root(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing(home: &Path, log_to_file: bool) {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if !log_to_file {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
        return;
    }

    let all = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(LogFile::new(stdout_log_path(home)));
    let errors = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(LogFile::new(stderr_log_path(home)).with_max_level(tracing::Level::WARN));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(all)
        .with(errors)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
