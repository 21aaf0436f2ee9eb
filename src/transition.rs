//! The transition scheduler.
//!
//! A single-threaded, signal-driven state machine: fade into the
//! adjustments on start, refresh them periodically, fade out and back
//! in on the disable toggle, reload on request, and fade cleanly out
//! on termination.
//!
//! The state is `trans_alpha` in [0, 1] (0 = fully adjusted, 1 =
//! fully clean) plus a direction `trans_delta` in {−1, 0, +1}. The
//! `fade` value handed to the configuration is `None` in the steady
//! state, `1 − trans_alpha` while fading in and `trans_alpha − 1`
//! while fading out, so its magnitude is the share of the adjustments
//! currently applied.

use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Local, Timelike};

use crate::constants::{
    DEFAULT_FADEIN_STEPS, DEFAULT_FADEIN_TIME, DEFAULT_FADEOUT_STEPS, DEFAULT_FADEOUT_TIME,
    DEFAULT_WAIT_PERIOD,
};
use crate::curve::RampEngine;
use crate::logger::Log;
use crate::output::MonitorController;

/// A local wall-clock moment, as handed to `periodically`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Moment {
    pub year: i32,
    /// 1 = January, 12 = December.
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// ISO numbering: 1 = Monday, 7 = Sunday.
    pub weekday: u32,
}

impl Moment {
    pub fn now() -> Moment {
        let now = Local::now();
        Moment {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            weekday: now.weekday().number_from_monday(),
        }
    }
}

/// What `periodically` gets to work with.
pub struct AdjustmentContext<'a> {
    pub engine: &'a mut RampEngine,
    pub controller: &'a mut MonitorController,
}

/// The capability handed to the configuration collaborator: refresh
/// the adjustments, and rebuild yourself on reload requests.
pub trait ConfigScript {
    /// Refresh the adjustments for the given moment.
    ///
    /// `fade` is `None` in the steady state; during transitions its
    /// magnitude grows towards 1 (fading in positive, fading out
    /// negative) and tells how much of the adjustments to apply.
    fn periodically(
        &mut self,
        ctx: &mut AdjustmentContext<'_>,
        moment: &Moment,
        fade: Option<f64>,
    ) -> Result<()>;

    /// Re-read the configuration source (SIGUSR1).
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fade timing and error policy.
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    /// Seconds between `periodically` calls in the steady state.
    pub wait_period: f64,
    /// Seconds a fade-in takes; `None` disables fading in.
    pub fadein_time: Option<f64>,
    /// Seconds a fade-out takes; `None` disables fading out.
    pub fadeout_time: Option<f64>,
    pub fadein_steps: u32,
    pub fadeout_steps: u32,
    /// Whether to restore identity curves when the configuration
    /// fails; restoring on clean exit always happens.
    pub reset_on_error: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            wait_period: DEFAULT_WAIT_PERIOD,
            fadein_time: Some(DEFAULT_FADEIN_TIME),
            fadeout_time: Some(DEFAULT_FADEOUT_TIME),
            fadein_steps: DEFAULT_FADEIN_STEPS,
            fadeout_steps: DEFAULT_FADEOUT_STEPS,
            reset_on_error: true,
        }
    }
}

/// The flags shared between the scheduler and the signal thread.
///
/// Signal dispositions touch only these atomics and the condition
/// variable.
pub struct SchedulerFlags {
    running: AtomicBool,
    panic: AtomicBool,
    panicgate: AtomicBool,
    trans_delta: AtomicI8,
    reload_pending: AtomicBool,
    generation: Mutex<u64>,
    wake: Condvar,
}

impl SchedulerFlags {
    pub fn new(panicgate: bool) -> Arc<SchedulerFlags> {
        Arc::new(SchedulerFlags {
            running: AtomicBool::new(true),
            panic: AtomicBool::new(false),
            panicgate: AtomicBool::new(panicgate),
            trans_delta: AtomicI8::new(-1),
            reload_pending: AtomicBool::new(false),
            generation: Mutex::new(0),
            wake: Condvar::new(),
        })
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn panic(&self) -> bool {
        self.panic.load(Ordering::SeqCst)
    }

    pub fn panicgate(&self) -> bool {
        self.panicgate.load(Ordering::SeqCst)
    }

    pub fn delta(&self) -> i8 {
        self.trans_delta.load(Ordering::SeqCst)
    }

    fn set_delta(&self, delta: i8) {
        self.trans_delta.store(delta, Ordering::SeqCst);
    }

    /// TERM/INT/HUP: stop; a second request while already fading out
    /// skips the rest of the fade.
    pub fn terminate(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.delta() > 0 {
            self.panic.store(true, Ordering::SeqCst);
        }
        self.set_delta(1);
        self.notify();
    }

    /// USR2: begin fading out, or reverse the fade in flight. Clears
    /// the panicgate so fading back in is not skipped.
    pub fn toggle(&self) {
        self.panicgate.store(false, Ordering::SeqCst);
        let delta = self.delta();
        self.set_delta(if delta == 0 { 1 } else { -delta });
        self.notify();
    }

    /// USR1: ask the scheduler thread to reload the configuration.
    pub fn request_reload(&self) {
        self.reload_pending.store(true, Ordering::SeqCst);
        self.notify();
    }

    fn take_reload(&self) -> bool {
        self.reload_pending.swap(false, Ordering::SeqCst)
    }

    /// Wake any interruptable sleep.
    pub fn notify(&self) {
        let mut generation = self.generation.lock().expect("scheduler flags poisoned");
        *generation += 1;
        self.wake.notify_all();
    }

    /// Sleep for `seconds`, returning early on any notification.
    pub fn sleep(&self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        let deadline = std::time::Instant::now() + Duration::from_secs_f64(seconds);
        let mut generation = self.generation.lock().expect("scheduler flags poisoned");
        let seen = *generation;
        while *generation == seen {
            let now = std::time::Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _timeout) = self
                .wake
                .wait_timeout(generation, deadline - now)
                .expect("scheduler flags poisoned");
            generation = guard;
        }
    }

    /// Block until the next notification.
    pub fn wait(&self) {
        let mut generation = self.generation.lock().expect("scheduler flags poisoned");
        let seen = *generation;
        while *generation == seen {
            generation = self
                .wake
                .wait(generation)
                .expect("scheduler flags poisoned");
        }
    }
}

/// The signal-driven fade/run/reload loop.
pub struct Scheduler {
    pub flags: Arc<SchedulerFlags>,
    pub settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(flags: Arc<SchedulerFlags>, settings: SchedulerSettings) -> Scheduler {
        Scheduler { flags, settings }
    }

    fn with_fadein(&self) -> bool {
        self.settings.fadein_steps > 0
            && self.settings.fadein_time.is_some()
            && !self.flags.panicgate()
    }

    fn with_fadeout(&self) -> bool {
        self.settings.fadeout_steps > 0 && self.settings.fadeout_time.is_some()
    }

    fn fadein_step_time(&self) -> f64 {
        self.settings.fadein_time.unwrap_or(0.0) / self.settings.fadein_steps.max(1) as f64
    }

    fn fadeout_step_time(&self) -> f64 {
        self.settings.fadeout_time.unwrap_or(0.0) / self.settings.fadeout_steps.max(1) as f64
    }

    /// Refresh the adjustments; a failing configuration is treated as
    /// a termination request.
    fn refresh(
        &self,
        script: &mut dyn ConfigScript,
        engine: &mut RampEngine,
        controller: &mut MonitorController,
        fade: Option<f64>,
    ) {
        let mut ctx = AdjustmentContext { engine, controller };
        if let Err(error) = script.periodically(&mut ctx, &Moment::now(), fade) {
            Log::log_pipe();
            Log::log_error(&format!("Configuration failed: {:#}", error));
            Log::log_decorated("Shutting down...");
            self.flags.terminate();
        }
    }

    /// Run until termination. Restores identity curves on the way out
    /// (on errors only when `reset_on_error` is set).
    pub fn run(
        &mut self,
        engine: &mut RampEngine,
        controller: &mut MonitorController,
        script: &mut dyn ConfigScript,
    ) -> Result<()> {
        let result = self.run_loop(engine, controller, script);
        if result.is_ok() || self.settings.reset_on_error {
            engine.start_over();
            if let Err(error) = controller.apply(engine) {
                Log::log_warning(&format!("Failed to restore identity ramps: {}", error));
            }
        }
        result
    }

    fn run_loop(
        &mut self,
        engine: &mut RampEngine,
        controller: &mut MonitorController,
        script: &mut dyn ConfigScript,
    ) -> Result<()> {
        let flags = self.flags.clone();
        let mut trans_alpha: f64 = 1.0;

        while flags.running() {
            if flags.take_reload() {
                match script.reload() {
                    Ok(()) => Log::log_decorated("Configuration reloaded"),
                    Err(error) => {
                        Log::log_warning(&format!("Failed to reload configuration: {:#}", error))
                    }
                }
            }

            let delta = flags.delta();
            if delta == 0 {
                // Steady state
                self.refresh(script, engine, controller, None);
                if flags.running() {
                    flags.sleep(self.settings.wait_period);
                }
            } else if delta < 0 {
                // Fade in
                if self.with_fadein() {
                    trans_alpha -= 1.0 / self.settings.fadein_steps as f64;
                }
                if !self.with_fadein() || trans_alpha <= 0.0 {
                    trans_alpha = 0.0;
                    flags.set_delta(0);
                }
                self.refresh(script, engine, controller, Some(1.0 - trans_alpha));
                if self.with_fadein() && flags.delta() < 0 {
                    flags.sleep(self.fadein_step_time());
                }
            } else {
                // Fade out
                if self.with_fadeout() {
                    trans_alpha += 1.0 / self.settings.fadeout_steps as f64;
                }
                if trans_alpha >= 1.0 || !self.with_fadeout() {
                    trans_alpha = 1.0;
                }
                self.refresh(script, engine, controller, Some(-1.0 + trans_alpha));
                if trans_alpha == 1.0 {
                    // Fully clean: wait for re-enable or termination
                    if flags.running() {
                        flags.wait();
                    }
                } else if self.with_fadeout() {
                    flags.sleep(self.fadeout_step_time());
                }
            }
        }

        // Final fade-out, skipped when a second termination request
        // has already promoted to panic
        if self.with_fadeout() {
            while !flags.panic() {
                trans_alpha += 1.0 / self.settings.fadeout_steps as f64;
                if trans_alpha >= 1.0 {
                    trans_alpha = 1.0;
                    // Last step: apply the clean state and stop
                    self.refresh(script, engine, controller, Some(-1.0 + trans_alpha));
                    break;
                }
                self.refresh(script, engine, controller, Some(-1.0 + trans_alpha));
                if !self.with_fadeout() {
                    break;
                }
                flags.sleep(self.fadeout_step_time());
            }
        }

        Ok(())
    }
}
