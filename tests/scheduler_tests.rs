//! Integration tests for the transition scheduler, driven through the
//! same flag interface the signal thread uses.

use std::sync::Arc;

use anyhow::Result;

use blueshift::backend::dummy::DummyBackend;
use blueshift::curve::RampEngine;
use blueshift::logger::Log;
use blueshift::output::{Display, MonitorController};
use blueshift::transition::{
    AdjustmentContext, ConfigScript, Moment, Scheduler, SchedulerFlags, SchedulerSettings,
};
use blueshift::Interpolation;

/// Records every `fade` value it sees and fires flag changes at
/// scripted call counts, standing in for external signals.
struct ScriptedConfig {
    flags: Arc<SchedulerFlags>,
    fades: Vec<Option<f64>>,
    /// (call index, action) pairs; actions run after recording.
    actions: Vec<(usize, Action)>,
}

enum Action {
    Toggle,
    Terminate,
    TerminatePanic,
}

impl ConfigScript for ScriptedConfig {
    fn periodically(
        &mut self,
        _ctx: &mut AdjustmentContext<'_>,
        _moment: &Moment,
        fade: Option<f64>,
    ) -> Result<()> {
        let call = self.fades.len();
        self.fades.push(fade);
        for (at, action) in &self.actions {
            if *at == call {
                match action {
                    Action::Toggle => self.flags.toggle(),
                    Action::Terminate => self.flags.terminate(),
                    Action::TerminatePanic => {
                        self.flags.terminate();
                        self.flags.terminate();
                    }
                }
            }
        }
        Ok(())
    }
}

fn quick_settings() -> SchedulerSettings {
    SchedulerSettings {
        wait_period: 0.02,
        fadein_time: Some(0.04),
        fadeout_time: Some(0.04),
        fadein_steps: 4,
        fadeout_steps: 4,
        reset_on_error: true,
    }
}

fn controller() -> MonitorController {
    let display = Display::with_backend(Box::new(DummyBackend::new())).unwrap();
    MonitorController::new(display, 0, &[], Interpolation::Linear).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn fade_in_then_steady() {
    Log::set_enabled(false);
    let flags = SchedulerFlags::new(false);
    let mut script = ScriptedConfig {
        flags: flags.clone(),
        fades: Vec::new(),
        // Terminate with panic right after the first steady call so
        // the exit fade-out is skipped
        actions: vec![(4, Action::TerminatePanic)],
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    let mut scheduler = Scheduler::new(flags, quick_settings());
    scheduler.run(&mut engine, &mut controller, &mut script).unwrap();

    // Four fade-in steps, then the steady state
    assert_eq!(script.fades.len(), 5, "fades: {:?}", script.fades);
    for (fade, expected) in script.fades.iter().zip([0.25, 0.5, 0.75, 1.0]) {
        assert!(approx(fade.unwrap(), expected), "fades: {:?}", script.fades);
    }
    assert_eq!(script.fades[4], None);
}

#[test]
fn panicgate_skips_fade_in() {
    Log::set_enabled(false);
    let flags = SchedulerFlags::new(true);
    let mut script = ScriptedConfig {
        flags: flags.clone(),
        fades: Vec::new(),
        actions: vec![(1, Action::TerminatePanic)],
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    let mut scheduler = Scheduler::new(flags, quick_settings());
    scheduler.run(&mut engine, &mut controller, &mut script).unwrap();

    // Snaps straight to the adjusted state, then steady
    assert!(approx(script.fades[0].unwrap(), 1.0), "fades: {:?}", script.fades);
    assert_eq!(script.fades[1], None);
}

#[test]
fn usr2_reverses_with_alpha_continuity() {
    Log::set_enabled(false);
    let flags = SchedulerFlags::new(false);
    let mut script = ScriptedConfig {
        flags: flags.clone(),
        fades: Vec::new(),
        actions: vec![
            // After the first steady call, disable (fade out)
            (4, Action::Toggle),
            // One fade-out step later, re-enable (reverse to fade in)
            (5, Action::Toggle),
            // Once steady again, shut down hard
            (7, Action::TerminatePanic),
        ],
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    let mut scheduler = Scheduler::new(flags, quick_settings());
    scheduler.run(&mut engine, &mut controller, &mut script).unwrap();

    let fades = &script.fades;
    assert_eq!(fades[4], None, "fades: {:?}", fades);
    // One fade-out step from alpha 0 to 0.25: fade = -0.75
    assert!(approx(fades[5].unwrap(), -0.75), "fades: {:?}", fades);
    // Reversal continues from the same alpha: one fade-in step back
    // to alpha 0, fade = 1.0
    assert!(approx(fades[6].unwrap(), 1.0), "fades: {:?}", fades);
    assert_eq!(fades[7], None, "fades: {:?}", fades);
}

#[test]
fn termination_fades_out_completely() {
    Log::set_enabled(false);
    let flags = SchedulerFlags::new(false);
    let mut script = ScriptedConfig {
        flags: flags.clone(),
        fades: Vec::new(),
        // A single termination request after the steady call: the
        // exit fade-out must run to completion
        actions: vec![(4, Action::Terminate)],
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    let mut scheduler = Scheduler::new(flags, quick_settings());
    scheduler.run(&mut engine, &mut controller, &mut script).unwrap();

    // The last fade value is 0 (fully clean) and the tail is the
    // exit fade-out: -0.75, -0.5, -0.25, 0
    let fades = &script.fades;
    assert!(fades.len() >= 8, "fades: {:?}", fades);
    let tail: Vec<f64> = fades[fades.len() - 4..].iter().map(|f| f.unwrap()).collect();
    for (value, expected) in tail.iter().zip([-0.75, -0.5, -0.25, 0.0]) {
        assert!(approx(*value, expected), "fades: {:?}", fades);
    }
}

#[test]
fn failing_config_triggers_shutdown_and_reset() {
    Log::set_enabled(false);
    struct FailingConfig;
    impl ConfigScript for FailingConfig {
        fn periodically(
            &mut self,
            ctx: &mut AdjustmentContext<'_>,
            _moment: &Moment,
            _fade: Option<f64>,
        ) -> Result<()> {
            // Leave a visible adjustment behind, then fail
            ctx.engine.rgb_brightness(blueshift::Channels::uniform(0.5));
            ctx.controller.apply(ctx.engine)?;
            anyhow::bail!("deliberate failure")
        }
    }
    let flags = SchedulerFlags::new(true);
    let mut engine = RampEngine::new();
    let mut controller = controller();
    let mut scheduler = Scheduler::new(flags, quick_settings());
    scheduler
        .run(&mut engine, &mut controller, &mut FailingConfig)
        .unwrap();

    // reset_on_error restored the identity curves on the way out
    let ramps = controller.display.get_gamma(0, 0).unwrap();
    assert_eq!(ramps.red[0], 0.0);
    assert_eq!(ramps.red[255], 65535.0);
}
