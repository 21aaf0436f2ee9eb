//! The CRTC/Screen/Display model and gamma-ramp plumbing.
//!
//! A `Display` owns one backend connection and an eagerly built graph
//! of `Screen`s (output partitions) and `Crtc`s. Writing the working
//! curves to a CRTC goes through the coercion pipeline: resize to the
//! CRTC's native ramp sizes with the configured interpolation, rescale
//! to its native depth, then push through the backend.

use anyhow::{Result, bail};

use crate::backend::{self, Backend, BackendCapabilities, BackendType};
use crate::constants::{DEFAULT_COOPERATIVE_PRIORITY, DEFAULT_COOPERATIVE_RULE};
use crate::curve::RampEngine;
use crate::edid::Edid;
use crate::interpolation::Interpolation;
use crate::logger::Log;

/// The lifespan of a cooperative gamma adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifespan {
    /// Remove the adjustment when the connection to the server closes
    /// or when explicitly removed.
    UntilDeath,
    /// Only remove the adjustment once requested explicitly.
    UntilRemoval,
    /// Request that the adjustment be removed now.
    Remove,
}

/// Whether a CRTC supports gamma adjustments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GammaSupport {
    No,
    Maybe,
    Yes,
}

/// The subpixel order of a monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubpixelOrder {
    /// No subpixel order, e.g. on most old to semi-old CRTs.
    None,
    /// Red at left, green in centre, blue at right.
    HorizontalRgb,
    /// Red at right, green in centre, blue at left.
    HorizontalBgr,
    /// Red at top, green in middle, blue at bottom.
    VerticalRgb,
    /// Red at bottom, green in middle, blue at top.
    VerticalBgr,
}

/// The encoding of gamma-ramp stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl Depth {
    /// The value the brightest stop takes: `2^depth − 1` for integer
    /// encodings, 1 for floating-point encodings.
    pub fn maximum(self) -> f64 {
        match self {
            Depth::Uint8 => u8::MAX as f64,
            Depth::Uint16 => u16::MAX as f64,
            Depth::Uint32 => u32::MAX as f64,
            Depth::Uint64 => u64::MAX as f64,
            Depth::Float32 | Depth::Float64 => 1.0,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Depth::Float32 | Depth::Float64)
    }

    /// The numeric tag used in configuration: the bit width for
    /// integer encodings, −1 for single precision, −2 for double
    /// precision.
    pub fn tag(self) -> i32 {
        match self {
            Depth::Uint8 => 8,
            Depth::Uint16 => 16,
            Depth::Uint32 => 32,
            Depth::Uint64 => 64,
            Depth::Float32 => -1,
            Depth::Float64 => -2,
        }
    }

    pub fn from_tag(tag: i32) -> Result<Depth> {
        Ok(match tag {
            8 => Depth::Uint8,
            16 => Depth::Uint16,
            32 => Depth::Uint32,
            64 => Depth::Uint64,
            -1 => Depth::Float32,
            -2 => Depth::Float64,
            _ => bail!("invalid gamma depth tag: {}", tag),
        })
    }
}

/// A gamma-ramp triple. Stops are held as `f64` regardless of depth;
/// integer-depth ramps hold integral values in `[0, maximum]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Ramps {
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
    pub depth: Depth,
}

impl Ramps {
    /// Identity ramps: stop `i` of a ramp with `n` stops maps to
    /// `i · maximum / (n − 1)`, rounded for integer depths.
    pub fn identity(sizes: (usize, usize, usize), depth: Depth) -> Ramps {
        let make = |size: usize| -> Vec<f64> {
            let max = depth.maximum();
            (0..size)
                .map(|i| {
                    let v = i as f64 * max / (size - 1) as f64;
                    if depth.is_integer() { (v + 0.5).floor() } else { v }
                })
                .collect()
        };
        Ramps {
            red: make(sizes.0),
            green: make(sizes.1),
            blue: make(sizes.2),
            depth,
        }
    }

    /// The working curves of an engine as a float-depth ramp triple.
    pub fn from_engine(engine: &RampEngine) -> Ramps {
        Ramps {
            red: engine.red().to_vec(),
            green: engine.green().to_vec(),
            blue: engine.blue().to_vec(),
            depth: Depth::Float64,
        }
    }

    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.red.len(), self.green.len(), self.blue.len())
    }

    /// Copy into a new size and depth.
    ///
    /// Channels whose size differs are resized with `interpolation`;
    /// stops are then rescaled linearly between the depth maxima, with
    /// rounding when the target depth is integer.
    pub fn copy_to(&self, depth: Depth, sizes: (usize, usize, usize), interpolation: Interpolation) -> Ramps {
        let (red, green, blue) = interpolation.resize_triple(&self.red, &self.green, &self.blue, sizes);
        let mut copy = Ramps { red, green, blue, depth };
        let old_max = self.depth.maximum();
        let new_max = depth.maximum();
        if old_max != new_max || depth.is_integer() {
            for ramp in [&mut copy.red, &mut copy.green, &mut copy.blue] {
                for stop in ramp.iter_mut() {
                    let v = *stop * new_max / old_max;
                    *stop = if depth.is_integer() { (v + 0.5).floor() } else { v };
                }
            }
        }
        copy
    }
}

/// One entry of a CRTC's cooperative filter table.
#[derive(Clone, Debug)]
pub struct GammaFilter {
    /// The filter class, usually the owning program's name.
    pub class: String,
    /// Higher priorities are applied earlier.
    pub priority: i64,
    /// The user-visible sub-identifier within the class.
    pub rule: String,
    pub ramps: Ramps,
}

/// Static information about a CRTC as reported by its backend.
#[derive(Clone, Debug)]
pub struct CrtcInfo {
    pub red_gamma_size: usize,
    pub green_gamma_size: usize,
    pub blue_gamma_size: usize,
    pub gamma_depth: Depth,
    pub gamma_support: GammaSupport,
    pub subpixel_order: SubpixelOrder,
    pub active: bool,
    pub connector_name: Option<String>,
    pub connector_type: Option<String>,
    /// The EDID in upper-case hexadecimal representation.
    pub edid: Option<String>,
    /// Whether this CRTC takes cooperative gamma filters.
    pub cooperative: bool,
}

impl CrtcInfo {
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.red_gamma_size, self.green_gamma_size, self.blue_gamma_size)
    }

    /// Parse the EDID, if the backend reported one.
    pub fn edid_data(&self) -> Option<Result<Edid>> {
        self.edid.as_deref().map(Edid::parse)
    }
}

/// A logical controller of one monitor.
#[derive(Clone, Debug)]
pub struct Crtc {
    pub backend: BackendType,
    pub partition: usize,
    pub index: usize,
    pub info: CrtcInfo,
    /// Default priority for cooperative gamma filters.
    pub default_priority: i64,
    /// Default rule label for cooperative gamma filters.
    pub default_rule: String,
}

impl Crtc {
    /// Fresh identity ramps matching the CRTC's native size, at its
    /// native depth or an explicit one.
    pub fn make_ramps(&self, depth: Option<Depth>) -> Ramps {
        Ramps::identity(self.info.sizes(), depth.unwrap_or(self.info.gamma_depth))
    }
}

/// An ordered collection of the CRTCs of one output partition.
#[derive(Clone, Debug)]
pub struct Screen {
    pub index: usize,
    pub crtcs: Vec<Crtc>,
}

/// One open display site: the backend connection plus its screens.
///
/// Dropping the display closes the backend connection.
pub struct Display {
    backend: Box<dyn Backend>,
    pub screens: Vec<Screen>,
}

impl Display {
    /// Open a display with the chosen adjustment method (`None` for
    /// auto-detection) and display string, and eagerly enumerate its
    /// partitions and CRTCs.
    pub fn open(method: Option<BackendType>, display: Option<&str>) -> Result<Display> {
        let backend = backend::open(method, display)?;
        Self::with_backend(backend)
    }

    /// Build the partition/CRTC graph over an already open backend.
    pub fn with_backend(mut backend: Box<dyn Backend>) -> Result<Display> {
        let backend_type = backend.backend_type();
        let cooperative = backend.capabilities().cooperative;
        let mut screens = Vec::new();
        for partition in 0..backend.partition_count()? {
            let mut crtcs = Vec::new();
            for index in 0..backend.crtc_count(partition)? {
                let mut info = backend.crtc_info(partition, index)?;
                info.cooperative = cooperative;
                crtcs.push(Crtc {
                    backend: backend_type,
                    partition,
                    index,
                    info,
                    default_priority: DEFAULT_COOPERATIVE_PRIORITY,
                    default_rule: DEFAULT_COOPERATIVE_RULE.to_string(),
                });
            }
            screens.push(Screen { index: partition, crtcs });
        }
        Ok(Display { backend, screens })
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    pub fn crtc_count(&self) -> usize {
        self.screens.iter().map(|screen| screen.crtcs.len()).sum()
    }

    fn crtc(&self, partition: usize, index: usize) -> Result<&Crtc> {
        self.screens
            .get(partition)
            .and_then(|screen| screen.crtcs.get(index))
            .ok_or_else(|| anyhow::anyhow!("no CRTC {} on partition {}", index, partition))
    }

    /// Read a CRTC's current (coalesced) gamma ramps.
    pub fn get_gamma(&mut self, partition: usize, index: usize) -> Result<Ramps> {
        self.crtc(partition, index)?;
        self.backend.get_gamma(partition, index)
    }

    /// Read a CRTC's cooperative filter table, restricted to the
    /// priority band `[low, high]`.
    pub fn get_gamma_filtered(
        &mut self,
        partition: usize,
        index: usize,
        low_priority: i64,
        high_priority: i64,
    ) -> Result<Vec<GammaFilter>> {
        let crtc = self.crtc(partition, index)?;
        if !crtc.info.cooperative {
            bail!(
                "the {} backend does not support cooperative gamma",
                self.backend.backend_type()
            );
        }
        self.backend
            .get_gamma_filtered(partition, index, low_priority, high_priority)
    }

    /// Write ramps already matching a CRTC's native size and depth.
    pub fn set_gamma(&mut self, partition: usize, index: usize, ramps: &Ramps) -> Result<()> {
        self.set_gamma_with(partition, index, Some(ramps), None, None, Lifespan::UntilRemoval)
    }

    /// Write ramps with explicit cooperative-gamma arguments.
    ///
    /// On a backend without cooperative gamma, `priority` and `rule`
    /// must be `None`, and `lifespan` must be the default
    /// (`UntilRemoval`) or `Remove` (which is then a no-op).
    pub fn set_gamma_with(
        &mut self,
        partition: usize,
        index: usize,
        ramps: Option<&Ramps>,
        priority: Option<i64>,
        rule: Option<&str>,
        lifespan: Lifespan,
    ) -> Result<()> {
        let crtc = self.crtc(partition, index)?;
        if !crtc.info.cooperative {
            if priority.is_some() || rule.is_some() || lifespan == Lifespan::UntilDeath {
                bail!(
                    "the {} backend does not support cooperative gamma",
                    self.backend.backend_type()
                );
            }
            if lifespan == Lifespan::Remove {
                return Ok(());
            }
            let ramps = ramps.ok_or_else(|| anyhow::anyhow!("no ramps to apply"))?;
            return self.backend.set_gamma(partition, index, ramps);
        }
        let priority = priority.unwrap_or(crtc.default_priority);
        let rule = rule.unwrap_or(&crtc.default_rule).to_string();
        self.backend
            .set_gamma_filter(partition, index, ramps, priority, &rule, lifespan)
    }

    /// Coerce ramps to a CRTC's native size and depth and write them.
    pub fn set_gamma_coerced(
        &mut self,
        partition: usize,
        index: usize,
        ramps: &Ramps,
        interpolation: Interpolation,
    ) -> Result<()> {
        let crtc = self.crtc(partition, index)?;
        let native = if ramps.sizes() == crtc.info.sizes() && ramps.depth == crtc.info.gamma_depth {
            None
        } else {
            Some(ramps.copy_to(crtc.info.gamma_depth, crtc.info.sizes(), interpolation))
        };
        self.set_gamma(partition, index, native.as_ref().unwrap_or(ramps))
    }

    /// Restore one CRTC's CLUTs to the system defaults.
    pub fn restore_crtc(&mut self, partition: usize, index: usize) -> Result<()> {
        self.backend.restore_crtc(partition, index)
    }

    /// Restore one partition's CLUTs to the system defaults.
    pub fn restore_partition(&mut self, partition: usize) -> Result<()> {
        self.backend.restore_partition(partition)
    }

    /// Restore the whole site's CLUTs to the system defaults.
    pub fn restore(&mut self) -> Result<()> {
        self.backend.restore_site()
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("backend", &self.backend.backend_type())
            .field("screens", &self.screens)
            .finish()
    }
}

// ═══ MultiCRTC Grouping ═══

#[derive(Debug)]
struct BackendLayer {
    backend: BackendType,
    members: Vec<(usize, usize)>,
}

#[derive(Debug)]
struct DepthLayer {
    depth: Depth,
    backends: Vec<BackendLayer>,
}

#[derive(Debug)]
struct SizeLayer {
    sizes: (usize, usize, usize),
    depths: Vec<DepthLayer>,
}

/// A group of CRTCs organised for efficient gamma adjustments: the
/// same source ramps are coerced only once per distinct (ramp sizes,
/// depth) combination, bucketed in size → depth → backend order.
#[derive(Debug, Default)]
pub struct MultiCrtc {
    layers: Vec<SizeLayer>,
    pub interpolation: Interpolation,
}

impl MultiCrtc {
    pub fn new<'a>(crtcs: impl IntoIterator<Item = &'a Crtc>, interpolation: Interpolation) -> MultiCrtc {
        let mut multi = MultiCrtc { interpolation, ..MultiCrtc::default() };
        for crtc in crtcs {
            multi.add(crtc);
        }
        multi
    }

    /// Add a CRTC to the group.
    pub fn add(&mut self, crtc: &Crtc) {
        let sizes = crtc.info.sizes();
        let layer = match self.layers.iter_mut().position(|l| l.sizes == sizes) {
            Some(i) => &mut self.layers[i],
            None => {
                self.layers.push(SizeLayer { sizes, depths: Vec::new() });
                self.layers.last_mut().unwrap()
            }
        };
        let depth_layer = match layer.depths.iter_mut().position(|l| l.depth == crtc.info.gamma_depth) {
            Some(i) => &mut layer.depths[i],
            None => {
                layer.depths.push(DepthLayer { depth: crtc.info.gamma_depth, backends: Vec::new() });
                layer.depths.last_mut().unwrap()
            }
        };
        let backend_layer = match depth_layer.backends.iter_mut().position(|l| l.backend == crtc.backend) {
            Some(i) => &mut depth_layer.backends[i],
            None => {
                depth_layer.backends.push(BackendLayer { backend: crtc.backend, members: Vec::new() });
                depth_layer.backends.last_mut().unwrap()
            }
        };
        backend_layer.members.push((crtc.partition, crtc.index));
    }

    /// The number of distinct coercion targets in the group.
    pub fn bucket_count(&self) -> usize {
        self.layers.iter().map(|l| l.depths.len()).sum()
    }

    /// Create a ramp triple where each channel is as large as the
    /// largest ramp of that channel among the grouped CRTCs.
    pub fn make_ramps(&self, depth: Depth) -> Ramps {
        let mut sizes = (1, 1, 1);
        for layer in &self.layers {
            sizes.0 = sizes.0.max(layer.sizes.0);
            sizes.1 = sizes.1.max(layer.sizes.1);
            sizes.2 = sizes.2.max(layer.sizes.2);
        }
        Ramps::identity(sizes, depth)
    }

    /// Write the same ramps to every CRTC in the group, coercing once
    /// per bucket.
    pub fn set_gamma(
        &self,
        display: &mut Display,
        ramps: &Ramps,
        priority: Option<i64>,
        rule: Option<&str>,
        lifespan: Lifespan,
    ) -> Result<()> {
        if lifespan == Lifespan::Remove {
            for (partition, index) in self.members() {
                display.set_gamma_with(partition, index, None, priority, rule, lifespan)?;
            }
            return Ok(());
        }
        for layer in &self.layers {
            let resized = if layer.sizes == ramps.sizes() {
                None
            } else {
                Some(ramps.copy_to(ramps.depth, layer.sizes, self.interpolation))
            };
            let resized_ref = resized.as_ref().unwrap_or(ramps);
            for depth_layer in &layer.depths {
                let deepened = if depth_layer.depth == resized_ref.depth {
                    None
                } else {
                    Some(resized_ref.copy_to(depth_layer.depth, layer.sizes, self.interpolation))
                };
                let deepened_ref = deepened.as_ref().unwrap_or(resized_ref);
                for backend_layer in &depth_layer.backends {
                    for &(partition, index) in &backend_layer.members {
                        display.set_gamma_with(
                            partition,
                            index,
                            Some(deepened_ref),
                            priority,
                            rule,
                            lifespan,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn members(&self) -> Vec<(usize, usize)> {
        self.layers
            .iter()
            .flat_map(|l| l.depths.iter())
            .flat_map(|d| d.backends.iter())
            .flat_map(|b| b.members.iter().copied())
            .collect()
    }
}

// ═══ Monitor Controller ═══

/// Pushes the working curves of a `RampEngine` to a selection of
/// CRTCs, coercing per CRTC.
pub struct MonitorController {
    pub display: Display,
    /// `(partition, crtc)` targets, in write order.
    selection: Vec<(usize, usize)>,
    pub interpolation: Interpolation,
}

impl MonitorController {
    /// Select CRTCs by index within one partition; an empty list
    /// selects every CRTC of that partition.
    pub fn new(display: Display, partition: usize, crtcs: &[usize], interpolation: Interpolation) -> Result<MonitorController> {
        let screen = display
            .screens
            .get(partition)
            .ok_or_else(|| anyhow::anyhow!("no partition {} on this display", partition))?;
        let selection: Vec<(usize, usize)> = if crtcs.is_empty() {
            screen.crtcs.iter().map(|c| (partition, c.index)).collect()
        } else {
            for &index in crtcs {
                if index >= screen.crtcs.len() {
                    bail!("no CRTC {} on partition {}", index, partition);
                }
            }
            crtcs.iter().map(|&index| (partition, index)).collect()
        };
        Ok(MonitorController { display, selection, interpolation })
    }

    /// The CRTCs the controller writes to.
    pub fn selection(&self) -> &[(usize, usize)] {
        &self.selection
    }

    /// Push the engine's working curves to every selected CRTC.
    pub fn apply(&mut self, engine: &RampEngine) -> Result<()> {
        let mut ramps = Ramps::from_engine(engine);
        if engine.clip_result {
            for ramp in [&mut ramps.red, &mut ramps.green, &mut ramps.blue] {
                for stop in ramp.iter_mut() {
                    *stop = stop.clamp(0.0, 1.0);
                }
            }
        }
        let interpolation = self.interpolation;
        for &(partition, index) in &self.selection {
            self.display
                .set_gamma_coerced(partition, index, &ramps, interpolation)?;
        }
        Ok(())
    }

    /// Reset every selected CRTC to identity ramps.
    pub fn reset(&mut self) -> Result<()> {
        for &(partition, index) in &self.selection {
            let identity = {
                let crtc = self
                    .display
                    .screens
                    .get(partition)
                    .and_then(|screen| screen.crtcs.get(index))
                    .ok_or_else(|| anyhow::anyhow!("no CRTC {} on partition {}", index, partition))?;
                crtc.make_ramps(None)
            };
            self.display.set_gamma(partition, index, &identity)?;
        }
        Ok(())
    }

    /// Log the controller's view of its monitors.
    pub fn log_monitors(&self) {
        Log::log_block_start(&format!(
            "Using the {} backend on {} CRTC(s)",
            self.display.backend_type(),
            self.selection.len()
        ));
        for &(partition, index) in &self.selection {
            if let Some(crtc) = self
                .display
                .screens
                .get(partition)
                .and_then(|screen| screen.crtcs.get(index))
            {
                let name = crtc.info.connector_name.as_deref().unwrap_or("unknown connector");
                Log::log_indented(&format!(
                    "screen {} CRTC {}: {} ({}x{}x{} stops, depth {})",
                    partition,
                    index,
                    name,
                    crtc.info.red_gamma_size,
                    crtc.info.green_gamma_size,
                    crtc.info.blue_gamma_size,
                    crtc.info.gamma_depth.tag(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crtc_with(sizes: (usize, usize, usize), depth: Depth, backend: BackendType) -> Crtc {
        Crtc {
            backend,
            partition: 0,
            index: 0,
            info: CrtcInfo {
                red_gamma_size: sizes.0,
                green_gamma_size: sizes.1,
                blue_gamma_size: sizes.2,
                gamma_depth: depth,
                gamma_support: GammaSupport::Yes,
                subpixel_order: SubpixelOrder::HorizontalRgb,
                active: true,
                connector_name: None,
                connector_type: None,
                edid: None,
                cooperative: false,
            },
            default_priority: DEFAULT_COOPERATIVE_PRIORITY,
            default_rule: DEFAULT_COOPERATIVE_RULE.to_string(),
        }
    }

    #[test]
    fn test_depth_maximum() {
        assert_eq!(Depth::Uint8.maximum(), 255.0);
        assert_eq!(Depth::Uint16.maximum(), 65535.0);
        assert_eq!(Depth::Float32.maximum(), 1.0);
        assert_eq!(Depth::from_tag(-2).unwrap(), Depth::Float64);
        assert!(Depth::from_tag(12).is_err());
    }

    #[test]
    fn test_identity_ramps() {
        let ramps = Ramps::identity((256, 256, 256), Depth::Uint16);
        assert_eq!(ramps.red[0], 0.0);
        assert_eq!(ramps.red[255], 65535.0);
        assert_eq!(ramps.red[128], (128.0_f64 * 65535.0 / 255.0 + 0.5).floor());
    }

    #[test]
    fn test_copy_to_resize_and_depth() {
        let ramps = Ramps::identity((256, 256, 256), Depth::Float64);
        let copy = ramps.copy_to(Depth::Uint16, (1024, 1024, 1024), Interpolation::Linear);
        assert_eq!(copy.red.len(), 1024);
        assert_eq!(copy.red[0], 0.0);
        assert_eq!(copy.red[1023], 65535.0);
        // Identity is preserved through coercion, within rounding
        let expected = Ramps::identity((1024, 1024, 1024), Depth::Uint16);
        for (a, b) in copy.red.iter().zip(&expected.red) {
            assert!((a - b).abs() <= 1.0, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_multi_crtc_bucketing() {
        let mut multi = MultiCrtc::default();
        multi.add(&crtc_with((256, 256, 256), Depth::Uint16, BackendType::Dummy));
        multi.add(&crtc_with((256, 256, 256), Depth::Uint16, BackendType::Dummy));
        multi.add(&crtc_with((1024, 1024, 1024), Depth::Uint16, BackendType::Dummy));
        multi.add(&crtc_with((256, 256, 256), Depth::Uint8, BackendType::Dummy));
        // Three coercion targets: (256, u16), (1024, u16), (256, u8)
        assert_eq!(multi.bucket_count(), 3);
        let ramps = multi.make_ramps(Depth::Float64);
        assert_eq!(ramps.sizes(), (1024, 1024, 1024));
    }
}
