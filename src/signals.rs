//! Signal handling.
//!
//! A dedicated signal-hook thread translates process signals into the
//! scheduler's atomic flags and a condition-variable notification,
//! nothing more; all decoding, I/O and configuration reloading happen
//! on the scheduler thread.
//!
//! Dispositions:
//! - `SIGTERM`, `SIGINT`, `SIGHUP`: stop running; when already fading
//!   out, promote to panic (skip the remaining fade).
//! - `SIGUSR1`: reload the configuration.
//! - `SIGUSR2`: fade out, or reverse the fade in flight; clears the
//!   panicgate so re-enabling fades back in.
//! - `SIGALRM`: wake any interruptable sleep.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGALRM, SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2},
    iterator::Signals,
};
use std::sync::Arc;
use std::thread;

use crate::logger::Log;
use crate::transition::SchedulerFlags;

/// Install the signal thread. The returned handle may be dropped; the
/// thread runs for the process lifetime.
pub fn setup_signal_handler(flags: Arc<SchedulerFlags>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2, SIGALRM])
        .context("failed to register signal handlers")?;

    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGUSR1 => {
                    Log::log_pipe();
                    Log::log_decorated("Received configuration reload signal");
                    flags.request_reload();
                }
                SIGUSR2 => {
                    Log::log_pipe();
                    Log::log_decorated("Received disable/enable toggle signal");
                    flags.toggle();
                }
                SIGALRM => {
                    flags.notify();
                }
                _ => {
                    let message = match signal {
                        SIGINT => "Received interrupt signal, fading out...",
                        SIGTERM => "Received termination request, fading out...",
                        _ => "Received hangup signal, fading out...",
                    };
                    Log::log_pipe();
                    Log::log_decorated(message);
                    flags.terminate();
                }
            }
        }
    });

    Ok(())
}
