/*!
 * hostwatchd - Agent Entry Point
 *
 * One binary, two roles. Invoked normally it becomes the supervisor: it
 * spawns a worker from its own image and watches it together with any
 * managed extensions. Spawned with the worker environment contract (or run
 * with --disable_watchdog) it takes the worker code path instead.
 */

use clap::Parser;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

use hostwatch::config::read_autoload_paths;
use hostwatch::core::types::{WatchdogResult, EXIT_FAILURE};
use hostwatch::platform::{is_worker_environment, launcher_from_env, EXTENSIONS_ENV};
use hostwatch::shutdown::install_signal_handlers;
use hostwatch::{
    init_logging, Config, LivenessRunner, ProcPidQuery, ShutdownController, StatusRelay, Watcher,
    WatcherRunner,
};

fn main() {
    let options = hostwatch::WatchdogOptions::parse();
    init_logging(options.verbose);

    let shutdown = Arc::new(ShutdownController::new());
    install_signal_handlers(&shutdown);

    let role = if is_worker_environment() {
        run_worker(&options, &shutdown)
    } else if options.disable_watchdog {
        info!("Watchdog disabled; running the worker in-process");
        run_worker_service(&shutdown);
        Ok(())
    } else {
        run_supervisor(&options, &shutdown)
    };

    if let Err(err) = role {
        error!("Agent failed: {}", err);
        std::process::exit(EXIT_FAILURE);
    }
    std::process::exit(shutdown.exit_code());
}

/// Supervisor role: register autoloaded extensions and enter the watch loop.
fn run_supervisor(
    options: &hostwatch::WatchdogOptions,
    shutdown: &Arc<ShutdownController>,
) -> WatchdogResult<()> {
    info!(
        "Watchdog ({}) starting at level {}",
        std::process::id(),
        options.watchdog_level
    );

    let watcher = Arc::new(Watcher::new(Arc::clone(shutdown)));
    let config = Arc::new(Config::from_options(options));
    let relay = Arc::new(StatusRelay::new());

    if let Some(ref autoload) = options.extensions_autoload {
        for path in read_autoload_paths(autoload) {
            info!(path = %path, "Managing extension");
            watcher.add_extension(&path);
        }
    }

    let runner = WatcherRunner::new(
        Arc::clone(&watcher),
        Arc::new(ProcPidQuery::new()),
        Arc::clone(shutdown),
        config,
    )
    .with_level(options.watchdog_level)
    .with_status_relay(relay);

    let supervisor = thread::Builder::new()
        .name("watcher".to_string())
        .spawn(move || runner.run())?;

    if supervisor.join().is_err() {
        error!("Watcher thread panicked");
    }
    info!("Watchdog exiting with code {}", shutdown.exit_code());
    Ok(())
}

/// Worker role: guard against an orphaned supervisor, then serve.
fn run_worker(
    options: &hostwatch::WatchdogOptions,
    shutdown: &Arc<ShutdownController>,
) -> WatchdogResult<()> {
    info!("Worker ({}) starting", std::process::id());
    if std::env::var_os(EXTENSIONS_ENV).is_some() {
        info!("Managed extensions expected; plugins will be awaited before serving");
    }

    if let Some(launcher) = launcher_from_env() {
        let liveness =
            LivenessRunner::new(launcher, Arc::clone(shutdown), options.watchdog_level);
        thread::Builder::new()
            .name("liveness".to_string())
            .spawn(move || liveness.run())?;
    }

    run_worker_service(shutdown);
    Ok(())
}

/// The collection duties live in the agent's table and logger plugins; the
/// watchdog core only keeps the process alive until shutdown.
fn run_worker_service(shutdown: &Arc<ShutdownController>) {
    shutdown.wait_for_shutdown();
    info!("Worker exiting with code {}", shutdown.exit_code());
}
