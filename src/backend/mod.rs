//! Adjustment-method backends.
//!
//! A backend talks to one display system (X RandR, X VidMode, Linux
//! DRM, Windows GDI, Quartz Core Graphics, or the in-memory dummy) and
//! exposes the uniform partition/CRTC surface the output layer builds
//! its graph from. All six method names are always recognised; methods
//! this build does not carry fail with a backend-unavailable
//! diagnostic when opened.

use anyhow::{Result, bail};

use crate::output::{CrtcInfo, GammaFilter, Lifespan, Ramps};

pub mod dummy;
#[cfg(target_os = "linux")]
pub mod drm;
#[cfg(feature = "randr")]
pub mod randr;

/// Enumeration of the adjustment methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// The X11 RandR extension.
    Randr,
    /// The X11 VidMode extension.
    Vidmode,
    /// Direct Rendering Manager (Linux TTY).
    Drm,
    /// Windows Graphics Device Interface.
    W32Gdi,
    /// Quartz Core Graphics (macOS).
    Quartz,
    /// The in-memory test backend.
    Dummy,
}

impl BackendType {
    /// The method's configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Randr => "randr",
            BackendType::Vidmode => "vidmode",
            BackendType::Drm => "drm",
            BackendType::W32Gdi => "w32gdi",
            BackendType::Quartz => "quartz",
            BackendType::Dummy => "dummy",
        }
    }

    /// Parse a method name.
    pub fn from_name(name: &str) -> Result<BackendType> {
        Ok(match name {
            "randr" => BackendType::Randr,
            "vidmode" => BackendType::Vidmode,
            "drm" => BackendType::Drm,
            "w32gdi" => BackendType::W32Gdi,
            "quartz" => BackendType::Quartz,
            "dummy" => BackendType::Dummy,
            _ => bail!("unrecognised adjustment method: {}", name),
        })
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which restore operations a backend supports natively, and whether
/// its CRTCs take cooperative gamma filters.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackendCapabilities {
    pub crtc_restore: bool,
    pub partition_restore: bool,
    pub site_restore: bool,
    pub cooperative: bool,
}

/// One open connection to a display system.
///
/// Partition indices address X screens or graphics cards, CRTC indices
/// address controllers within a partition. Connections close when the
/// value is dropped.
pub trait Backend {
    fn backend_type(&self) -> BackendType;

    fn capabilities(&self) -> BackendCapabilities;

    /// The number of partitions (X screens, graphics cards) on the
    /// site.
    fn partition_count(&mut self) -> Result<usize>;

    /// The number of CRTCs in a partition.
    fn crtc_count(&mut self, partition: usize) -> Result<usize>;

    /// Read the static information of a CRTC.
    fn crtc_info(&mut self, partition: usize, crtc: usize) -> Result<CrtcInfo>;

    /// Read the CRTC's current gamma ramp triple, in its native size
    /// and depth.
    fn get_gamma(&mut self, partition: usize, crtc: usize) -> Result<Ramps>;

    /// Write a gamma ramp triple already coerced to the CRTC's native
    /// size and depth.
    fn set_gamma(&mut self, partition: usize, crtc: usize, ramps: &Ramps) -> Result<()>;

    /// Restore a single CRTC's CLUTs to the system defaults.
    fn restore_crtc(&mut self, _partition: usize, _crtc: usize) -> Result<()> {
        bail!(
            "the {} backend cannot restore CRTC defaults",
            self.backend_type()
        );
    }

    /// Restore a whole partition's CLUTs to the system defaults.
    fn restore_partition(&mut self, _partition: usize) -> Result<()> {
        bail!(
            "the {} backend cannot restore partition defaults",
            self.backend_type()
        );
    }

    /// Restore the whole site's CLUTs to the system defaults.
    fn restore_site(&mut self) -> Result<()> {
        bail!(
            "the {} backend cannot restore site defaults",
            self.backend_type()
        );
    }

    /// Register, replace or remove a cooperative gamma filter.
    /// `ramps` is ignored when `lifespan` is [`Lifespan::Remove`].
    fn set_gamma_filter(
        &mut self,
        _partition: usize,
        _crtc: usize,
        _ramps: Option<&Ramps>,
        _priority: i64,
        _rule: &str,
        _lifespan: Lifespan,
    ) -> Result<()> {
        bail!(
            "the {} backend does not support cooperative gamma",
            self.backend_type()
        );
    }

    /// Read the full cooperative filter table of a CRTC, restricted to
    /// a priority band.
    fn get_gamma_filtered(
        &mut self,
        _partition: usize,
        _crtc: usize,
        _low_priority: i64,
        _high_priority: i64,
    ) -> Result<Vec<GammaFilter>> {
        bail!(
            "the {} backend does not support cooperative gamma",
            self.backend_type()
        );
    }
}

/// List the adjustment methods this build can actually open, in
/// preference order.
pub fn available_methods() -> Vec<BackendType> {
    let mut methods = Vec::new();
    #[cfg(feature = "randr")]
    methods.push(BackendType::Randr);
    #[cfg(target_os = "linux")]
    methods.push(BackendType::Drm);
    methods.push(BackendType::Dummy);
    methods
}

/// Select the adjustment method for the current environment: RandR
/// when `DISPLAY` names an X display, DRM on a TTY.
pub fn detect_method() -> BackendType {
    match std::env::var("DISPLAY") {
        Ok(display) if display.contains(':') => BackendType::Randr,
        _ => BackendType::Drm,
    }
}

/// Open a connection with the chosen method, or the detected one when
/// `method` is `None`. `display` is the display string for methods
/// that take one (RandR, VidMode), `None` for the current display.
pub fn open(method: Option<BackendType>, display: Option<&str>) -> Result<Box<dyn Backend>> {
    let method = method.unwrap_or_else(detect_method);
    match method {
        #[cfg(feature = "randr")]
        BackendType::Randr => Ok(Box::new(randr::RandrBackend::open(display)?)),
        #[cfg(target_os = "linux")]
        BackendType::Drm => Ok(Box::new(drm::DrmBackend::open()?)),
        BackendType::Dummy => Ok(Box::new(dummy::DummyBackend::new())),
        other => bail!(
            "the {} backend is not available in this build on this platform",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for name in ["randr", "vidmode", "drm", "w32gdi", "quartz", "dummy"] {
            assert_eq!(BackendType::from_name(name).unwrap().name(), name);
        }
        assert!(BackendType::from_name("wayland").is_err());
    }

    #[test]
    fn test_dummy_always_available() {
        assert!(available_methods().contains(&BackendType::Dummy));
    }
}
