//! # KYK Wi-Fi Login Tool
//!
//! This application logs in to the KYK/GSB dormitory Wi-Fi captive portal,
//! keeps the session alive by polling the remaining quota, and logs out on
//! exit or Ctrl+C.

mod args;
mod credentials;
mod progress;

use anyhow::{anyhow, Context};
use args::{Args, Mode};
use clap::Parser;
use console::Style;
use credentials::{format_duration, CliRecovery};
use dialoguer::Select;
use kykwifi::logger::LOG_FILE_NAME;
use kykwifi::outcome::LogoutOutcome;
use kykwifi::{
    ensure_single_instance, get_data_dir, init_logger, CancellationToken, CredentialStore,
    Endpoints, EnvFileStore, ExitMode, KeepAliveExit, KeepAliveMode, KeepAliveScheduler, Portal,
    PortalClient, Quota, SessionController, SessionMarker, Termination,
};
use log::{debug, error, info, warn};
use progress::Spinner;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

type Controller = SessionController<PortalClient>;

/// The main entry point of the application.
fn main() -> ExitCode {
    let args = Args::parse();

    let data_dir = match resolve_data_dir(&args) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Could not prepare the data directory: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let log_file = (!args.no_log_file).then(|| data_dir.join(LOG_FILE_NAME));
    init_logger(args.level.into(), log_file.as_deref());

    // Ensure only one instance is running
    if let Err(e) = ensure_single_instance(&data_dir) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            // Second Ctrl+C: give up on the graceful logout.
            std::process::exit(130);
        }
        handler_token.cancel();
    }) {
        warn!("Could not install the Ctrl+C handler: {}", e);
    }

    let config = args.session_config();
    let portal = PortalClient::new(
        Endpoints::default(),
        config.request_timeout,
        config.logout_timeout,
    );
    let marker = SessionMarker::in_dir(&data_dir);

    if args.mode == Mode::Logout {
        return logout_recorded_session(&portal, &marker);
    }

    let store = EnvFileStore::new(data_dir.join(".env"));
    let spinner = Arc::new(Spinner::default());
    let recovery = CliRecovery::new(Arc::clone(&spinner), store.clone(), cancel.clone());

    let stored = store.load().unwrap_or_else(|e| {
        warn!("Could not read stored credentials: {:#}", e);
        None
    });
    let (credentials, unvalidated) = match stored {
        Some(credentials) => {
            info!("Using stored credentials for {}.", credentials.username());
            (credentials, false)
        }
        None => {
            info!("No stored credentials in {}.", store.path().display());
            match recovery.ask_for_credentials() {
                Some(credentials) => (credentials, true),
                None => {
                    info!("Cancelled.");
                    return exit_code(Termination::Cancelled);
                }
            }
        }
    };

    let mut controller = SessionController::new(portal, config, credentials, marker, cancel);
    if unvalidated {
        controller = controller.with_unvalidated_credentials();
    }

    let termination = run(&mut controller, &recovery, &spinner, args.mode);
    spinner.stop();

    let exit_mode = match termination {
        Termination::LeftOpen => ExitMode::LeaveOpen,
        _ => ExitMode::Logout,
    };
    controller.shutdown(exit_mode);
    report(termination);
    exit_code(termination)
}

fn resolve_data_dir(args: &Args) -> anyhow::Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            Ok(dir.clone())
        }
        None => get_data_dir().map_err(|e| anyhow!("locating the data directory: {}", e)),
    }
}

fn run(controller: &mut Controller, recovery: &CliRecovery, spinner: &Spinner, mode: Mode) -> Termination {
    if let Err(termination) = login(controller, recovery, spinner) {
        return termination;
    }
    match mode {
        Mode::Menu => menu(controller, recovery, spinner),
        Mode::Quota => match controller.check_quota(recovery) {
            Ok(quota) => {
                print_quota(quota.as_ref());
                Termination::Clean
            }
            Err(termination) => termination,
        },
        Mode::KeepAlive => keep_alive(controller, recovery, spinner, KeepAliveMode::Normal),
        Mode::Fast => keep_alive(controller, recovery, spinner, KeepAliveMode::Fast),
        Mode::Logout => Termination::Clean,
    }
}

fn login(controller: &mut Controller, recovery: &CliRecovery, spinner: &Spinner) -> Result<(), Termination> {
    spinner.start(format!("Logging in as {}...", controller.credentials().username()));
    let result = controller.ensure_logged_in(recovery);
    spinner.stop();
    if result.is_ok() {
        let ok = Style::new().green().bold();
        eprintln!("{} Connected to the KYK Wi-Fi portal.", ok.apply_to(">>"));
    }
    result
}

/// Runs the keep-alive loop, logging in again whenever the session is lost.
/// Only returns once the run has to end.
fn keep_alive(
    controller: &mut Controller,
    recovery: &CliRecovery,
    spinner: &Spinner,
    mode: KeepAliveMode,
) -> Termination {
    let scheduler = KeepAliveScheduler::for_controller(mode, controller);
    let started = Instant::now();
    info!(
        "Keeping the session alive every {}. Press Ctrl+C to log out and exit.",
        format_duration(scheduler.interval())
    );
    loop {
        let result = scheduler.run(controller, |report| {
            let Some(quota) = &report.quota else {
                return;
            };
            match mode {
                KeepAliveMode::Normal => info!(
                    "Remaining quota: {} (up {})",
                    quota,
                    format_duration(started.elapsed())
                ),
                KeepAliveMode::Fast => debug!("Remaining quota: {}", quota),
            }
        });
        match result {
            Ok(KeepAliveExit::SessionLost) => {
                if let Err(termination) = login(controller, recovery, spinner) {
                    return termination;
                }
            }
            Err(termination) => return termination,
        }
    }
}

fn menu(controller: &mut Controller, recovery: &CliRecovery, spinner: &Spinner) -> Termination {
    let config = controller.config().clone();
    let items = [
        "Show remaining quota".to_string(),
        format!(
            "Keep alive (every {})",
            format_duration(config.keep_alive_interval)
        ),
        format!(
            "Keep alive, fast (every {})",
            format_duration(config.fast_keep_alive_interval)
        ),
        "Change credentials".to_string(),
        "Log out and exit".to_string(),
        "Exit and leave the session open".to_string(),
    ];

    loop {
        let choice = Select::new()
            .with_prompt("KYK Wi-Fi")
            .items(&items)
            .default(0)
            .interact_opt();
        if controller.cancel_token().is_cancelled() {
            return Termination::Cancelled;
        }

        match choice {
            Ok(Some(0)) => match controller.check_quota(recovery) {
                Ok(quota) => print_quota(quota.as_ref()),
                Err(termination) => return termination,
            },
            Ok(Some(1)) => return keep_alive(controller, recovery, spinner, KeepAliveMode::Normal),
            Ok(Some(2)) => return keep_alive(controller, recovery, spinner, KeepAliveMode::Fast),
            Ok(Some(3)) => {
                let Some(credentials) = recovery.ask_for_credentials() else {
                    return Termination::Cancelled;
                };
                controller.change_credentials(credentials);
                if let Err(termination) = login(controller, recovery, spinner) {
                    return termination;
                }
            }
            Ok(Some(4)) => return Termination::Clean,
            Ok(Some(5)) => return Termination::LeftOpen,
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => return Termination::Cancelled,
        }
    }
}

fn print_quota(quota: Option<&Quota>) {
    let bold = Style::new().bold();
    let cyan = Style::new().cyan().bold();
    match quota {
        Some(quota) => println!(
            "{} Remaining quota: {}",
            bold.apply_to(">>"),
            cyan.apply_to(quota)
        ),
        None => warn!("The remaining quota could not be read right now."),
    }
}

/// `--mode logout`: ends the session a previous run left open.
fn logout_recorded_session(portal: &PortalClient, marker: &SessionMarker) -> ExitCode {
    let session_id = match marker.read() {
        Ok(Some(id)) => id,
        Ok(None) => {
            info!("No recorded session in {}.", marker.path().display());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Could not read {}: {}", marker.path().display(), e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = portal.logout(&session_id);
    if let Err(e) = marker.remove() {
        warn!("Could not remove {}: {}", marker.path().display(), e);
    }
    match outcome {
        LogoutOutcome::Success { confirmed } => {
            if confirmed {
                info!("Logged out.");
            }
            ExitCode::SUCCESS
        }
        LogoutOutcome::TransientError(_) => ExitCode::FAILURE,
    }
}

fn report(termination: Termination) {
    match termination {
        Termination::Clean => info!("Done."),
        Termination::LeftOpen => info!("Exited. The portal session is still active."),
        Termination::Cancelled => info!("Interrupted, session closed."),
        Termination::TransientBudgetExhausted => {
            error!("Gave up after repeated network failures.")
        }
        Termination::CredentialBudgetExhausted => {
            error!("Gave up after repeated credential rejections.")
        }
        Termination::Abandoned => warn!("Exited without logging in."),
    }
}

fn exit_code(termination: Termination) -> ExitCode {
    match termination {
        Termination::Cancelled => ExitCode::from(130),
        t if t.is_failure() => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
