//! The X RandR adjustment method.
//!
//! Talks to the X server through the RandR extension (protocol 1.3):
//! one partition per X screen, one CRTC per RandR CRTC. Gamma ramps
//! are 16-bit. The EDID is fetched from the output's `EDID` property
//! when the server exposes it.

use anyhow::{Context, Result, anyhow, bail};
use xcb::randr;

use crate::output::{CrtcInfo, Depth, GammaSupport, Ramps, SubpixelOrder};

use super::{Backend, BackendCapabilities, BackendType};

const RANDR_MAJOR_VERSION: u32 = 1;
const RANDR_MINOR_VERSION: u32 = 3;

/// Subpixel order codes from the Render/RandR protocol.
const SUBPIXEL_HORIZONTAL_RGB: u8 = 1;
const SUBPIXEL_HORIZONTAL_BGR: u8 = 2;
const SUBPIXEL_VERTICAL_RGB: u8 = 3;
const SUBPIXEL_VERTICAL_BGR: u8 = 4;

struct RandrCrtc {
    id: u32,
    ramp_size: usize,
    info: CrtcInfo,
    /// The ramps found on the CRTC when we connected, written back on
    /// restore.
    saved_ramps: Ramps,
}

struct RandrScreen {
    crtcs: Vec<RandrCrtc>,
}

/// Wrapping struct for RandR state.
pub struct RandrBackend {
    conn: xcb::Connection,
    screens: Vec<RandrScreen>,
}

fn check<T>(reply: Result<T, xcb::GenericError>, what: &str) -> Result<T> {
    reply.map_err(|e| anyhow!("RandR {} request failed (error code {})", what, e.error_code()))
}

fn subpixel_order(code: u8) -> SubpixelOrder {
    match code {
        SUBPIXEL_HORIZONTAL_RGB => SubpixelOrder::HorizontalRgb,
        SUBPIXEL_HORIZONTAL_BGR => SubpixelOrder::HorizontalBgr,
        SUBPIXEL_VERTICAL_RGB => SubpixelOrder::VerticalRgb,
        SUBPIXEL_VERTICAL_BGR => SubpixelOrder::VerticalBgr,
        _ => SubpixelOrder::None,
    }
}

/// "DVI-I-1" → "DVI-I"; "HDMI1" → "HDMI".
fn connector_type_of(name: &str) -> Option<String> {
    let prefix: String = name
        .chars()
        .take_while(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim_end_matches('-')
        .to_string();
    if prefix.is_empty() { None } else { Some(prefix) }
}

impl RandrBackend {
    /// Connect to the X display (`None` for `$DISPLAY`) and snapshot
    /// every screen's CRTCs.
    pub fn open(display: Option<&str>) -> Result<RandrBackend> {
        let (conn, _preferred) = xcb::Connection::connect(display)
            .map_err(|e| anyhow!("cannot connect to X display: {:?}", e))?;

        {
            let version = check(
                randr::query_version(&conn, RANDR_MAJOR_VERSION, RANDR_MINOR_VERSION).get_reply(),
                "query version",
            )?;
            if version.major_version() < RANDR_MAJOR_VERSION {
                bail!(
                    "RandR {}.{} is too old",
                    version.major_version(),
                    version.minor_version()
                );
            }
        }

        let roots: Vec<u32> = conn.get_setup().roots().map(|screen| screen.root()).collect();
        let mut screens = Vec::with_capacity(roots.len());
        for root in roots {
            screens.push(Self::snapshot_screen(&conn, root)?);
        }
        Ok(RandrBackend { conn, screens })
    }

    fn snapshot_screen(conn: &xcb::Connection, root: u32) -> Result<RandrScreen> {
        let resources = check(
            randr::get_screen_resources(conn, root).get_reply(),
            "get screen resources",
        )?;
        let timestamp = resources.config_timestamp();

        // Gather per-output details first, keyed by the CRTC driving
        // the output
        struct OutputDetails {
            crtc: u32,
            name: String,
            subpixel: SubpixelOrder,
            edid: Option<String>,
        }
        let mut outputs: Vec<OutputDetails> = Vec::new();
        let edid_atom = xcb::intern_atom(conn, true, "EDID")
            .get_reply()
            .map(|reply| reply.atom())
            .unwrap_or(xcb::ATOM_NONE);
        for &output in resources.outputs() {
            let info = match randr::get_output_info(conn, output, timestamp).get_reply() {
                Ok(info) => info,
                Err(_) => continue,
            };
            if info.crtc() == 0 {
                continue;
            }
            let name = String::from_utf8_lossy(info.name()).into_owned();
            let edid = if edid_atom == xcb::ATOM_NONE {
                None
            } else {
                randr::get_output_property(conn, output, edid_atom, xcb::ATOM_NONE, 0, 128, false, false)
                    .get_reply()
                    .ok()
                    .and_then(|prop| {
                        let data = prop.data();
                        if data.len() >= 128 {
                            Some(data.iter().map(|byte| format!("{:02X}", byte)).collect::<String>())
                        } else {
                            None
                        }
                    })
            };
            outputs.push(OutputDetails {
                crtc: info.crtc(),
                name,
                subpixel: subpixel_order(info.subpixel_order() as u8),
                edid,
            });
        }

        let mut crtcs = Vec::new();
        for &crtc in resources.crtcs() {
            // A CRTC without gamma support answers this with an error;
            // keep it in the graph but mark it unadjustable
            let gamma = randr::get_crtc_gamma(conn, crtc).get_reply().ok();
            let ramp_size = gamma.as_ref().map(|g| g.red().len()).unwrap_or(0);
            let crtc_info = check(
                randr::get_crtc_info(conn, crtc, timestamp).get_reply(),
                "get CRTC info",
            )?;
            let active = crtc_info.mode() != 0;
            let output = outputs.iter().find(|o| o.crtc == crtc);
            let saved_ramps = match &gamma {
                Some(gamma) => Ramps {
                    red: gamma.red().iter().map(|&v| v as f64).collect(),
                    green: gamma.green().iter().map(|&v| v as f64).collect(),
                    blue: gamma.blue().iter().map(|&v| v as f64).collect(),
                    depth: Depth::Uint16,
                },
                None => Ramps::identity((2, 2, 2), Depth::Uint16),
            };
            let info = CrtcInfo {
                red_gamma_size: ramp_size,
                green_gamma_size: ramp_size,
                blue_gamma_size: ramp_size,
                gamma_depth: Depth::Uint16,
                gamma_support: if ramp_size > 1 { GammaSupport::Yes } else { GammaSupport::No },
                subpixel_order: output.map(|o| o.subpixel).unwrap_or(SubpixelOrder::None),
                active,
                connector_name: output.map(|o| o.name.clone()),
                connector_type: output.and_then(|o| connector_type_of(&o.name)),
                edid: output.and_then(|o| o.edid.clone()),
                cooperative: false,
            };
            crtcs.push(RandrCrtc { id: crtc, ramp_size, info, saved_ramps });
        }
        Ok(RandrScreen { crtcs })
    }

    fn crtc(&self, partition: usize, crtc: usize) -> Result<&RandrCrtc> {
        self.screens
            .get(partition)
            .and_then(|screen| screen.crtcs.get(crtc))
            .ok_or_else(|| anyhow!("RandR: no CRTC {} on screen {}", crtc, partition))
    }

    fn write_ramps(&self, id: u32, ramps: &Ramps) -> Result<()> {
        let quantize = |ramp: &[f64]| -> Vec<u16> {
            ramp.iter().map(|&v| v.clamp(0.0, 65535.0) as u16).collect()
        };
        let red = quantize(&ramps.red);
        let green = quantize(&ramps.green);
        let blue = quantize(&ramps.blue);
        randr::set_crtc_gamma_checked(&self.conn, id, &red, &green, &blue)
            .request_check()
            .map_err(|e| anyhow!("RandR set CRTC gamma failed (error code {})", e.error_code()))
    }
}

impl Backend for RandrBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Randr
    }

    fn capabilities(&self) -> BackendCapabilities {
        // Restoring writes back the ramps saved at connection time
        BackendCapabilities {
            crtc_restore: true,
            partition_restore: true,
            site_restore: true,
            cooperative: false,
        }
    }

    fn partition_count(&mut self) -> Result<usize> {
        Ok(self.screens.len())
    }

    fn crtc_count(&mut self, partition: usize) -> Result<usize> {
        self.screens
            .get(partition)
            .map(|screen| screen.crtcs.len())
            .ok_or_else(|| anyhow!("RandR: no screen {}", partition))
    }

    fn crtc_info(&mut self, partition: usize, crtc: usize) -> Result<CrtcInfo> {
        Ok(self.crtc(partition, crtc)?.info.clone())
    }

    fn get_gamma(&mut self, partition: usize, crtc: usize) -> Result<Ramps> {
        let id = self.crtc(partition, crtc)?.id;
        let gamma = check(
            randr::get_crtc_gamma(&self.conn, id).get_reply(),
            "get CRTC gamma",
        )?;
        Ok(Ramps {
            red: gamma.red().iter().map(|&v| v as f64).collect(),
            green: gamma.green().iter().map(|&v| v as f64).collect(),
            blue: gamma.blue().iter().map(|&v| v as f64).collect(),
            depth: Depth::Uint16,
        })
    }

    fn set_gamma(&mut self, partition: usize, crtc: usize, ramps: &Ramps) -> Result<()> {
        let crtc = self.crtc(partition, crtc)?;
        if ramps.red.len() != crtc.ramp_size {
            bail!(
                "RandR: ramp size {} does not match CRTC gamma size {}",
                ramps.red.len(),
                crtc.ramp_size
            );
        }
        self.write_ramps(crtc.id, ramps)
            .context("cannot write gamma ramps")
    }

    fn restore_crtc(&mut self, partition: usize, crtc: usize) -> Result<()> {
        let crtc = self.crtc(partition, crtc)?;
        if crtc.info.gamma_support == GammaSupport::No {
            return Ok(());
        }
        self.write_ramps(crtc.id, &crtc.saved_ramps)
            .context("cannot restore gamma ramps")
    }

    fn restore_partition(&mut self, partition: usize) -> Result<()> {
        let count = self.crtc_count(partition)?;
        for crtc in 0..count {
            self.restore_crtc(partition, crtc)?;
        }
        Ok(())
    }

    fn restore_site(&mut self) -> Result<()> {
        for partition in 0..self.screens.len() {
            self.restore_partition(partition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_type_of() {
        assert_eq!(connector_type_of("DVI-I-1").as_deref(), Some("DVI-I"));
        assert_eq!(connector_type_of("HDMI1").as_deref(), Some("HDMI"));
        assert_eq!(connector_type_of("eDP-1").as_deref(), Some("eDP"));
        assert_eq!(connector_type_of("1"), None);
    }

    #[test]
    fn test_subpixel_order_mapping() {
        assert_eq!(subpixel_order(1), SubpixelOrder::HorizontalRgb);
        assert_eq!(subpixel_order(4), SubpixelOrder::VerticalBgr);
        assert_eq!(subpixel_order(0), SubpixelOrder::None);
        assert_eq!(subpixel_order(9), SubpixelOrder::None);
    }
}
