//! Main application entry point and high-level flow coordination.
//!
//! The flow is:
//! 1. Argument parsing and early exit for help/version/copying
//! 2. Process title and signal handler setup
//! 3. Mode selection: ad-hoc settings from the command line, or a
//!    configuration file found through the search path
//! 4. Backend detection and CRTC selection
//! 5. The transition scheduler (or a single ad-hoc application)
//! 6. Identity restoration and cleanup on shutdown

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use blueshift::args::{self, CliAction, Options, ParsedArgs};
use blueshift::backend::BackendType;
use blueshift::config::{self, Config, RcScript};
use blueshift::constants::EXIT_FAILURE;
use blueshift::curve::RampEngine;
use blueshift::logger::Log;
use blueshift::output::{Display, MonitorController};
use blueshift::process::{InstanceLock, set_process_title};
use blueshift::signals::setup_signal_handler;
use blueshift::transition::{Scheduler, SchedulerFlags, SchedulerSettings};
use blueshift::Interpolation;

fn main() {
    let parsed = ParsedArgs::from_env();
    let code = match parsed.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            0
        }
        CliAction::ShowHelp => {
            args::display_help();
            0
        }
        CliAction::ShowCopying => {
            args::display_copying();
            0
        }
        CliAction::ShowWarranty => {
            args::display_warranty();
            0
        }
        CliAction::UsageError => EXIT_FAILURE,
        CliAction::Run(options) => match run(*options) {
            Ok(()) => {
                Log::log_end();
                0
            }
            Err(error) => {
                Log::log_pipe();
                Log::log_error(&format!("{:#}", error));
                Log::log_end();
                EXIT_FAILURE
            }
        },
    };
    std::process::exit(code);
}

/// Application logic after argument parsing is complete.
fn run(options: Options) -> Result<()> {
    if let Some(argv0) = std::env::args().next() {
        set_process_title(&argv0);
    }
    Log::log_version();

    let flags = SchedulerFlags::new(options.panicgate);
    setup_signal_handler(flags.clone())?;

    if options.config_file.is_none() && options.used_adhoc() {
        run_adhoc(options, flags)
    } else {
        run_configured(options, flags)
    }
}

/// Open the display and bind the CRTC selection.
fn open_controller(
    method: Option<BackendType>,
    display: Option<&str>,
    screen: usize,
    crtcs: &[usize],
) -> Result<MonitorController> {
    let display = Display::open(method, display).context("cannot initialize the backend")?;
    let controller = MonitorController::new(display, screen, crtcs, Interpolation::Linear)?;
    controller.log_monitors();
    Ok(controller)
}

/// Ad-hoc mode: settings straight from the command line.
fn run_adhoc(options: Options, flags: std::sync::Arc<SchedulerFlags>) -> Result<()> {
    let mut settings = options.to_adhoc_settings()?;
    let outputs = options.output_indices()?;
    let mut controller = open_controller(None, None, 0, &outputs)?;
    let mut engine = RampEngine::new();

    if settings.continuous && !settings.reset {
        let _lock = InstanceLock::acquire()?;
        Log::log_block_start("Starting continuous adjustments");
        let mut scheduler = Scheduler::new(flags, SchedulerSettings::default());
        scheduler.run(&mut engine, &mut controller, &mut settings)
    } else {
        settings.run_once(&mut engine, &mut controller, &flags)
    }
}

/// Configuration-file mode.
fn run_configured(options: Options, flags: std::sync::Arc<SchedulerFlags>) -> Result<()> {
    if options.used_adhoc() {
        Log::log_pipe();
        Log::log_warning("--configurations can only be combined with --panicgate");
    }

    let path = match &options.config_file {
        Some(file) => PathBuf::from(file),
        None => match config::find_config_file() {
            Some(path) => path,
            None => bail!("No configuration file found"),
        },
    };
    let config = Config::load(&path)?;
    config.log_config(&path);

    let output = config.output.clone().unwrap_or_default();
    let method = output
        .method
        .as_deref()
        .map(BackendType::from_name)
        .transpose()?;
    let mut controller = open_controller(
        method,
        output.display.as_deref(),
        output.screen.unwrap_or(0),
        &output.crtcs.unwrap_or_default(),
    )?;

    let _lock = InstanceLock::acquire()?;
    let mut script = RcScript::from_config(path, &config)?;
    let mut engine = RampEngine::new();
    let mut scheduler = Scheduler::new(flags, config.scheduler_settings());
    scheduler.run(&mut engine, &mut controller, &mut script)
}
