//! Integration tests for the output abstraction over the dummy
//! backend: coercion, readback, grouping, cooperative gamma rules.

use anyhow::Result;

use blueshift::backend::dummy::DummyBackend;
use blueshift::backend::{Backend, BackendCapabilities, BackendType};
use blueshift::curve::{Channels, RampEngine};
use blueshift::output::{
    CrtcInfo, Depth, Display, GammaSupport, Lifespan, MonitorController, MultiCrtc, Ramps,
    SubpixelOrder,
};
use blueshift::Interpolation;

fn heterogeneous_display() -> Display {
    let backend = DummyBackend::with_layout(&[&[
        ((256, 256, 256), Depth::Uint16),
        ((1024, 1024, 1024), Depth::Uint16),
        ((256, 256, 256), Depth::Uint8),
    ]]);
    Display::with_backend(Box::new(backend)).unwrap()
}

#[test]
fn coercion_round_trips_known_ramp() {
    let mut display = Display::with_backend(Box::new(DummyBackend::new())).unwrap();
    // A gamma-like ramp at working resolution and float depth
    let mut engine = RampEngine::new();
    engine.gamma(Channels::uniform(2.2));
    let working = Ramps::from_engine(&engine);
    display
        .set_gamma_coerced(0, 0, &working, Interpolation::Linear)
        .unwrap();
    let read_back = display.get_gamma(0, 0).unwrap();
    assert_eq!(read_back.depth, Depth::Uint16);
    for (written, original) in read_back.red.iter().zip(engine.red()) {
        let expected = original * 65535.0;
        assert!(
            (written - expected).abs() <= 1.0,
            "{} vs {}",
            written,
            expected
        );
    }
}

#[test]
fn coercion_resizes_and_rescales() {
    let mut display = heterogeneous_display();
    let engine = RampEngine::new();
    let working = Ramps::from_engine(&engine);
    for crtc in 0..3 {
        display
            .set_gamma_coerced(0, crtc, &working, Interpolation::Linear)
            .unwrap();
    }
    // 1024-stop CRTC got a 1024-stop identity
    let large = display.get_gamma(0, 1).unwrap();
    assert_eq!(large.red.len(), 1024);
    assert_eq!(large.red[1023], 65535.0);
    // 8-bit CRTC got 8-bit values
    let shallow = display.get_gamma(0, 2).unwrap();
    assert_eq!(shallow.depth, Depth::Uint8);
    assert_eq!(shallow.red[255], 255.0);
}

#[test]
fn multi_crtc_writes_all_with_shared_coercions() {
    let mut display = heterogeneous_display();
    let multi = MultiCrtc::new(
        display.screens[0].crtcs.iter(),
        Interpolation::Linear,
    );
    assert_eq!(multi.bucket_count(), 3);
    let ramps = multi.make_ramps(Depth::Float64);
    assert_eq!(ramps.sizes(), (1024, 1024, 1024));
    multi
        .set_gamma(&mut display, &ramps, None, None, Lifespan::UntilRemoval)
        .unwrap();
    for crtc in 0..3 {
        let read_back = display.get_gamma(0, crtc).unwrap();
        let max = read_back.depth.maximum();
        assert_eq!(*read_back.red.last().unwrap(), max);
        assert_eq!(read_back.red[0], 0.0);
    }
}

#[test]
fn cooperative_gamma_layers_and_bands() {
    let mut display = Display::with_backend(Box::new(DummyBackend::new())).unwrap();
    let inverted = {
        let mut ramps = Ramps::identity((256, 256, 256), Depth::Uint16);
        ramps.red.reverse();
        ramps.green.reverse();
        ramps.blue.reverse();
        ramps
    };
    display
        .set_gamma_with(0, 0, Some(&inverted), Some(100), Some("negative"), Lifespan::UntilDeath)
        .unwrap();
    let identity = Ramps::identity((256, 256, 256), Depth::Uint16);
    display
        .set_gamma_with(0, 0, Some(&identity), Some(10), Some("calibration"), Lifespan::UntilRemoval)
        .unwrap();

    let all = display.get_gamma_filtered(0, 0, i64::MIN, i64::MAX).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].rule, "negative"); // higher priority first
    let band = display.get_gamma_filtered(0, 0, 0, 50).unwrap();
    assert_eq!(band.len(), 1);
    assert_eq!(band[0].rule, "calibration");

    // Removal by (class, rule)
    display
        .set_gamma_with(0, 0, None, Some(100), Some("negative"), Lifespan::Remove)
        .unwrap();
    let all = display.get_gamma_filtered(0, 0, i64::MIN, i64::MAX).unwrap();
    assert_eq!(all.len(), 1);
}

/// A minimal non-cooperative backend for exercising the validation
/// rules.
struct PlainBackend {
    inner: DummyBackend,
}

impl Backend for PlainBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Dummy
    }
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            crtc_restore: true,
            partition_restore: false,
            site_restore: false,
            cooperative: false,
        }
    }
    fn partition_count(&mut self) -> Result<usize> {
        self.inner.partition_count()
    }
    fn crtc_count(&mut self, partition: usize) -> Result<usize> {
        self.inner.crtc_count(partition)
    }
    fn crtc_info(&mut self, partition: usize, crtc: usize) -> Result<CrtcInfo> {
        let mut info = self.inner.crtc_info(partition, crtc)?;
        info.cooperative = false;
        Ok(info)
    }
    fn get_gamma(&mut self, partition: usize, crtc: usize) -> Result<Ramps> {
        self.inner.get_gamma(partition, crtc)
    }
    fn set_gamma(&mut self, partition: usize, crtc: usize, ramps: &Ramps) -> Result<()> {
        self.inner.set_gamma(partition, crtc, ramps)
    }
}

#[test]
fn cooperative_arguments_rejected_without_support() {
    let backend = PlainBackend { inner: DummyBackend::new() };
    let mut display = Display::with_backend(Box::new(backend)).unwrap();
    let ramps = Ramps::identity((256, 256, 256), Depth::Uint16);

    // Defaults are fine
    display.set_gamma(0, 0, &ramps).unwrap();
    // Remove is tolerated as a no-op
    display
        .set_gamma_with(0, 0, None, None, None, Lifespan::Remove)
        .unwrap();
    // Anything else must fail
    assert!(display
        .set_gamma_with(0, 0, Some(&ramps), Some(5), None, Lifespan::UntilRemoval)
        .is_err());
    assert!(display
        .set_gamma_with(0, 0, Some(&ramps), None, Some("rule"), Lifespan::UntilRemoval)
        .is_err());
    assert!(display
        .set_gamma_with(0, 0, Some(&ramps), None, None, Lifespan::UntilDeath)
        .is_err());
    assert!(display.get_gamma_filtered(0, 0, 0, 100).is_err());
}

#[test]
fn controller_reset_restores_identity() {
    let display = Display::with_backend(Box::new(DummyBackend::new())).unwrap();
    let mut controller = MonitorController::new(display, 0, &[], Interpolation::Linear).unwrap();
    let mut engine = RampEngine::new();
    engine.rgb_invert(Channels::uniform(true));
    controller.apply(&engine).unwrap();
    let inverted = controller.display.get_gamma(0, 0).unwrap();
    assert_eq!(inverted.red[0], 65535.0);

    controller.reset().unwrap();
    let restored = controller.display.get_gamma(0, 0).unwrap();
    assert_eq!(restored.red[0], 0.0);
    assert_eq!(restored.red[255], 65535.0);
}

#[test]
fn crtc_info_exposes_model() {
    let display = heterogeneous_display();
    assert_eq!(display.crtc_count(), 3);
    let crtc = &display.screens[0].crtcs[0];
    assert_eq!(crtc.backend, BackendType::Dummy);
    assert_eq!(crtc.info.gamma_support, GammaSupport::Yes);
    assert_eq!(crtc.info.subpixel_order, SubpixelOrder::HorizontalRgb);
    assert!(crtc.info.active);
    assert_eq!(crtc.info.connector_name.as_deref(), Some("DUMMY-0-0"));
    let ramps = crtc.make_ramps(None);
    assert_eq!(ramps.sizes(), (256, 256, 256));
    assert_eq!(ramps.depth, Depth::Uint16);
}
