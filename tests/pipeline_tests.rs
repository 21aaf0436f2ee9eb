//! End-to-end scenarios: ad-hoc settings through the full ramp
//! pipeline into the dummy backend.

use std::io::Write;

use serial_test::serial;
use tempfile::TempDir;

use blueshift::adhoc::{AdhocSettings, DayNight};
use blueshift::backend::dummy::DummyBackend;
use blueshift::constants::DATADIR_ENV;
use blueshift::curve::{Channels, RampEngine};
use blueshift::logger::Log;
use blueshift::output::{Display, MonitorController};
use blueshift::transition::SchedulerFlags;
use blueshift::Interpolation;

/// A warm-ish colour matching fixture so temperatures below neutral
/// suppress blue.
fn install_cmf_fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut file = std::fs::File::create(dir.path().join("10deg")).unwrap();
    let rows = (40000 - 1000) / 100 + 1;
    for i in 0..rows {
        let t = i as f64 / (rows - 1) as f64;
        writeln!(file, "{} {}", 0.60 - 0.30 * t, 0.38 - 0.04 * t).unwrap();
    }
    std::env::set_var(DATADIR_ENV, dir.path());
    dir
}

fn controller() -> MonitorController {
    let display = Display::with_backend(Box::new(DummyBackend::new())).unwrap();
    MonitorController::new(display, 0, &[], Interpolation::Linear).unwrap()
}

#[test]
#[serial]
fn adhoc_day_temperature_warms_output() {
    Log::set_enabled(false);
    let _dir = install_cmf_fixture();
    // blueshift --temperature 5500 --location 0:0, at full day
    let settings = AdhocSettings {
        location: Some((0.0, 0.0)),
        rgb_temperatures: DayNight::uniform(5500.0),
        continuous: true,
        ..AdhocSettings::default()
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    settings.apply(&mut engine, &mut controller, 1.0, 0.0).unwrap();

    // The red ramp ends at full intensity and increases strictly
    let red = engine.red();
    assert!((red[255] - 1.0).abs() < 1e-9);
    for w in red.windows(2) {
        assert!(w[1] > w[0]);
    }
    // The blue ramp sits below identity at the top stop
    assert!(engine.blue()[255] < 1.0);
    // And the backend saw the same shape
    let written = controller.display.get_gamma(0, 0).unwrap();
    assert_eq!(written.red[255], 65535.0);
    assert!(written.blue[255] < 65535.0);
}

#[test]
#[serial]
fn adhoc_neutral_temperature_is_identity() {
    Log::set_enabled(false);
    let _dir = install_cmf_fixture();
    let settings = AdhocSettings {
        rgb_temperatures: DayNight::uniform(6500.0),
        ..AdhocSettings::default()
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();
    settings.apply(&mut engine, &mut controller, 1.0, 0.0).unwrap();
    for (i, &stop) in engine.red().iter().enumerate() {
        let expected = i as f64 / 255.0;
        assert!((stop - expected).abs() < 1e-9);
    }
}

#[test]
#[serial]
fn adhoc_reset_pushes_identity_everywhere() {
    Log::set_enabled(false);
    let _dir = install_cmf_fixture();
    let mut controller = controller();
    let mut engine = RampEngine::new();

    // Leave a visible adjustment on the CRTC first
    engine.rgb_brightness(Channels::uniform(0.5));
    controller.apply(&engine).unwrap();
    assert!(controller.display.get_gamma(0, 0).unwrap().red[255] < 40000.0);

    // blueshift --reset
    let settings = AdhocSettings {
        reset: true,
        ..AdhocSettings::default()
    };
    let flags = SchedulerFlags::new(true); // panicgate: no fade
    settings.run_once(&mut engine, &mut controller, &flags).unwrap();

    // Working curves are identity again
    for (i, &stop) in engine.red().iter().enumerate() {
        assert!((stop - i as f64 / 255.0).abs() < 1e-9);
    }
    // Every listed CRTC received the identity ramp
    let written = controller.display.get_gamma(0, 0).unwrap();
    assert_eq!(written.red[0], 0.0);
    assert_eq!(written.red[255], 65535.0);
}

#[test]
#[serial]
fn adhoc_fade_pureness_interpolates_towards_clean() {
    Log::set_enabled(false);
    let _dir = install_cmf_fixture();
    let settings = AdhocSettings {
        rgb_brightnesses: DayNight { day: vec![0.5], night: vec![0.5] },
        rgb_temperatures: DayNight::uniform(6500.0),
        ..AdhocSettings::default()
    };
    let mut engine = RampEngine::new();
    let mut controller = controller();

    // Fully adjusted: top stop at half brightness
    settings.apply(&mut engine, &mut controller, 1.0, 0.0).unwrap();
    assert!((engine.red()[255] - 0.5).abs() < 1e-9);
    // Halfway through a fade: brightness interpolates to 0.75
    settings.apply(&mut engine, &mut controller, 1.0, 0.5).unwrap();
    assert!((engine.red()[255] - 0.75).abs() < 1e-9);
    // Fully clean: identity
    settings.apply(&mut engine, &mut controller, 1.0, 1.0).unwrap();
    assert!((engine.red()[255] - 1.0).abs() < 1e-9);
}

#[test]
#[serial]
fn icc_parametric_profile_equals_plain_gamma() {
    Log::set_enabled(false);
    // VCGT type 1 with gamma (2.2, 2.2, 2.2), min 0, max 1 behaves
    // exactly like the gamma operator alone
    let profile = {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&0x7663_6774u32.to_be_bytes()); // 'vcgt'
        bytes.extend_from_slice(&144u32.to_be_bytes());
        bytes.extend_from_slice(&48u32.to_be_bytes());
        bytes.extend_from_slice(&0x7663_6774u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes()); // parametric
        for _ in 0..3 {
            bytes.extend_from_slice(&((2.2f64 * 65535.0) as u32).to_be_bytes());
            bytes.extend_from_slice(&0u32.to_be_bytes());
            bytes.extend_from_slice(&65535u32.to_be_bytes());
        }
        bytes
    };
    let adjustment = blueshift::icc::parse_icc(&profile).unwrap();

    let mut via_icc = RampEngine::new();
    adjustment.apply(&mut via_icc);
    let mut via_gamma = RampEngine::new();
    via_gamma.gamma(Channels::uniform((2.2f64 * 65535.0).floor() / 65535.0));
    for (a, b) in via_icc.red().iter().zip(via_gamma.red()) {
        assert!((a - b).abs() < 1e-9);
    }
}
