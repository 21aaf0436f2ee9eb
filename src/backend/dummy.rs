//! The in-memory adjustment method.
//!
//! Behaves like a real display system: it remembers the ramps written
//! to each CRTC, supports every restore level, and stacks cooperative
//! gamma filters that it composes into the coalesced ramps a plain
//! `get_gamma` returns. Used by the test suites and as a safe target
//! for dry runs.

use anyhow::{Result, bail};

use crate::output::{
    CrtcInfo, Depth, GammaFilter, GammaSupport, Lifespan, Ramps, SubpixelOrder,
};

use super::{Backend, BackendCapabilities, BackendType};

/// The filter class the dummy backend files cooperative filters
/// under.
const FILTER_CLASS: &str = "blueshift";

struct DummyCrtc {
    info: CrtcInfo,
    current: Ramps,
    filters: Vec<GammaFilter>,
}

struct DummyPartition {
    crtcs: Vec<DummyCrtc>,
}

/// An adjustment method that adjusts nothing.
pub struct DummyBackend {
    partitions: Vec<DummyPartition>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// One partition with one 256-stop 16-bit CRTC.
    pub fn new() -> DummyBackend {
        Self::with_layout(&[&[((256, 256, 256), Depth::Uint16)]])
    }

    /// An arbitrary layout: one slice per partition, one
    /// (sizes, depth) entry per CRTC.
    pub fn with_layout(layout: &[&[((usize, usize, usize), Depth)]]) -> DummyBackend {
        let partitions = layout
            .iter()
            .enumerate()
            .map(|(partition, crtcs)| DummyPartition {
                crtcs: crtcs
                    .iter()
                    .enumerate()
                    .map(|(index, &(sizes, depth))| DummyCrtc {
                        info: CrtcInfo {
                            red_gamma_size: sizes.0,
                            green_gamma_size: sizes.1,
                            blue_gamma_size: sizes.2,
                            gamma_depth: depth,
                            gamma_support: GammaSupport::Yes,
                            subpixel_order: SubpixelOrder::HorizontalRgb,
                            active: true,
                            connector_name: Some(format!("DUMMY-{}-{}", partition, index)),
                            connector_type: Some("Unknown".to_string()),
                            edid: None,
                            cooperative: true,
                        },
                        current: Ramps::identity(sizes, depth),
                        filters: Vec::new(),
                    })
                    .collect(),
            })
            .collect();
        DummyBackend { partitions }
    }

    fn crtc_mut(&mut self, partition: usize, crtc: usize) -> Result<&mut DummyCrtc> {
        self.partitions
            .get_mut(partition)
            .and_then(|p| p.crtcs.get_mut(crtc))
            .ok_or_else(|| anyhow::anyhow!("dummy: no CRTC {} on partition {}", crtc, partition))
    }

    /// Compose the filter stack into the coalesced ramps. Filters are
    /// applied in priority order, higher first, each remapping the
    /// result of the previous one by nearest neighbour.
    fn coalesce(crtc: &DummyCrtc) -> Ramps {
        let sizes = crtc.info.sizes();
        let depth = crtc.info.gamma_depth;
        let mut result = Ramps::identity(sizes, depth);
        let max = depth.maximum();
        let mut stack: Vec<&GammaFilter> = crtc.filters.iter().collect();
        stack.sort_by_key(|filter| std::cmp::Reverse(filter.priority));
        for filter in stack {
            for (ramp, lut) in [
                (&mut result.red, &filter.ramps.red),
                (&mut result.green, &filter.ramps.green),
                (&mut result.blue, &filter.ramps.blue),
            ] {
                let last = lut.len() - 1;
                for stop in ramp.iter_mut() {
                    let position = (*stop / max * last as f64 + 0.5).floor();
                    let position = (position.max(0.0) as usize).min(last);
                    *stop = lut[position];
                }
            }
        }
        result
    }
}

impl Backend for DummyBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Dummy
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            crtc_restore: true,
            partition_restore: true,
            site_restore: true,
            cooperative: true,
        }
    }

    fn partition_count(&mut self) -> Result<usize> {
        Ok(self.partitions.len())
    }

    fn crtc_count(&mut self, partition: usize) -> Result<usize> {
        self.partitions
            .get(partition)
            .map(|p| p.crtcs.len())
            .ok_or_else(|| anyhow::anyhow!("dummy: no partition {}", partition))
    }

    fn crtc_info(&mut self, partition: usize, crtc: usize) -> Result<CrtcInfo> {
        Ok(self.crtc_mut(partition, crtc)?.info.clone())
    }

    fn get_gamma(&mut self, partition: usize, crtc: usize) -> Result<Ramps> {
        let crtc = self.crtc_mut(partition, crtc)?;
        if crtc.filters.is_empty() {
            Ok(crtc.current.clone())
        } else {
            Ok(Self::coalesce(crtc))
        }
    }

    fn set_gamma(&mut self, partition: usize, crtc: usize, ramps: &Ramps) -> Result<()> {
        let crtc = self.crtc_mut(partition, crtc)?;
        if ramps.sizes() != crtc.info.sizes() {
            bail!(
                "dummy: ramp sizes {:?} do not match CRTC sizes {:?}",
                ramps.sizes(),
                crtc.info.sizes()
            );
        }
        if ramps.depth != crtc.info.gamma_depth {
            bail!(
                "dummy: ramp depth {:?} does not match CRTC depth {:?}",
                ramps.depth,
                crtc.info.gamma_depth
            );
        }
        crtc.current = ramps.clone();
        Ok(())
    }

    fn restore_crtc(&mut self, partition: usize, crtc: usize) -> Result<()> {
        let crtc = self.crtc_mut(partition, crtc)?;
        crtc.current = Ramps::identity(crtc.info.sizes(), crtc.info.gamma_depth);
        crtc.filters.clear();
        Ok(())
    }

    fn restore_partition(&mut self, partition: usize) -> Result<()> {
        let count = self.crtc_count(partition)?;
        for crtc in 0..count {
            self.restore_crtc(partition, crtc)?;
        }
        Ok(())
    }

    fn restore_site(&mut self) -> Result<()> {
        for partition in 0..self.partitions.len() {
            self.restore_partition(partition)?;
        }
        Ok(())
    }

    fn set_gamma_filter(
        &mut self,
        partition: usize,
        crtc: usize,
        ramps: Option<&Ramps>,
        priority: i64,
        rule: &str,
        lifespan: Lifespan,
    ) -> Result<()> {
        let crtc = self.crtc_mut(partition, crtc)?;
        // Filter identity is (class, rule); lifespans beyond process
        // death are indistinguishable in memory
        crtc.filters
            .retain(|filter| !(filter.class == FILTER_CLASS && filter.rule == rule));
        if lifespan == Lifespan::Remove {
            return Ok(());
        }
        let ramps = ramps.ok_or_else(|| anyhow::anyhow!("dummy: no ramps for filter"))?;
        crtc.filters.push(GammaFilter {
            class: FILTER_CLASS.to_string(),
            priority,
            rule: rule.to_string(),
            ramps: ramps.clone(),
        });
        Ok(())
    }

    fn get_gamma_filtered(
        &mut self,
        partition: usize,
        crtc: usize,
        low_priority: i64,
        high_priority: i64,
    ) -> Result<Vec<GammaFilter>> {
        let crtc = self.crtc_mut(partition, crtc)?;
        let mut filters: Vec<GammaFilter> = crtc
            .filters
            .iter()
            .filter(|f| (low_priority..=high_priority).contains(&f.priority))
            .cloned()
            .collect();
        filters.sort_by_key(|filter| std::cmp::Reverse(filter.priority));
        Ok(filters)
    }
}
