//! The DRM/KMS adjustment method, for TTY mode.
//!
//! Each graphics card under `/dev/dri` is one partition; the card's
//! CRTCs are enumerated through the legacy KMS mode-setting ioctls and
//! their 16-bit gamma LUTs are read and written with
//! `DRM_IOCTL_MODE_GETGAMMA`/`SETGAMMA`. The EDID is pulled out of the
//! connector's property blob when the driver exposes one.

use std::os::unix::io::RawFd;

use anyhow::{Result, anyhow, bail};

use crate::output::{CrtcInfo, Depth, GammaSupport, Ramps, SubpixelOrder};

use super::{Backend, BackendCapabilities, BackendType};

const DRM_IOCTL_BASE: u64 = 0x64; // 'd'

const fn iowr(nr: u64, size: usize) -> u64 {
    (3 << 30) | ((size as u64) << 16) | (DRM_IOCTL_BASE << 8) | nr
}

#[repr(C)]
#[derive(Default)]
struct DrmModeCardRes {
    fb_id_ptr: u64,
    crtc_id_ptr: u64,
    connector_id_ptr: u64,
    encoder_id_ptr: u64,
    count_fbs: u32,
    count_crtcs: u32,
    count_connectors: u32,
    count_encoders: u32,
    min_width: u32,
    max_width: u32,
    min_height: u32,
    max_height: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct DrmModeModeinfo {
    clock: u32,
    hdisplay: u16,
    hsync_start: u16,
    hsync_end: u16,
    htotal: u16,
    hskew: u16,
    vdisplay: u16,
    vsync_start: u16,
    vsync_end: u16,
    vtotal: u16,
    vscan: u16,
    vrefresh: u32,
    flags: u32,
    type_: u32,
    name: [u8; 32],
}

impl Default for DrmModeModeinfo {
    fn default() -> Self {
        // [u8; 32] has no Default past 32 elements on old compilers;
        // zeroed is what the ioctls expect anyway
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Default)]
struct DrmModeCrtc {
    set_connectors_ptr: u64,
    count_connectors: u32,
    crtc_id: u32,
    fb_id: u32,
    x: u32,
    y: u32,
    gamma_size: u32,
    mode_valid: u32,
    mode: DrmModeModeinfo,
}

#[repr(C)]
#[derive(Default)]
struct DrmModeCrtcLut {
    crtc_id: u32,
    gamma_size: u32,
    red: u64,
    green: u64,
    blue: u64,
}

#[repr(C)]
#[derive(Default)]
struct DrmModeGetConnector {
    encoders_ptr: u64,
    modes_ptr: u64,
    props_ptr: u64,
    prop_values_ptr: u64,
    count_modes: u32,
    count_props: u32,
    count_encoders: u32,
    encoder_id: u32,
    connector_id: u32,
    connector_type: u32,
    connector_type_id: u32,
    connection: u32,
    mm_width: u32,
    mm_height: u32,
    subpixel: u32,
    pad: u32,
}

#[repr(C)]
#[derive(Default)]
struct DrmModeGetEncoder {
    encoder_id: u32,
    encoder_type: u32,
    crtc_id: u32,
    possible_crtcs: u32,
    possible_clones: u32,
}

#[repr(C)]
struct DrmModeGetProperty {
    values_ptr: u64,
    enum_blob_ptr: u64,
    prop_id: u32,
    flags: u32,
    name: [u8; 32],
    count_values: u32,
    count_enum_blobs: u32,
}

impl Default for DrmModeGetProperty {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Default)]
struct DrmModeGetBlob {
    blob_id: u32,
    length: u32,
    data: u64,
}

const DRM_IOCTL_MODE_GETRESOURCES: u64 = iowr(0xA0, std::mem::size_of::<DrmModeCardRes>());
const DRM_IOCTL_MODE_GETCRTC: u64 = iowr(0xA1, std::mem::size_of::<DrmModeCrtc>());
const DRM_IOCTL_MODE_GETGAMMA: u64 = iowr(0xA4, std::mem::size_of::<DrmModeCrtcLut>());
const DRM_IOCTL_MODE_SETGAMMA: u64 = iowr(0xA5, std::mem::size_of::<DrmModeCrtcLut>());
const DRM_IOCTL_MODE_GETENCODER: u64 = iowr(0xA6, std::mem::size_of::<DrmModeGetEncoder>());
const DRM_IOCTL_MODE_GETCONNECTOR: u64 = iowr(0xA7, std::mem::size_of::<DrmModeGetConnector>());
const DRM_IOCTL_MODE_GETPROPERTY: u64 = iowr(0xAA, std::mem::size_of::<DrmModeGetProperty>());
const DRM_IOCTL_MODE_GETPROPBLOB: u64 = iowr(0xAC, std::mem::size_of::<DrmModeGetBlob>());

const DRM_MODE_CONNECTED: u32 = 1;

/// Connector type names, indexed by the kernel's connector type code.
const CONNECTOR_TYPES: [&str; 21] = [
    "Unknown", "VGA", "DVI-I", "DVI-D", "DVI-A", "Composite", "SVIDEO", "LVDS", "Component",
    "DIN", "DP", "HDMI-A", "HDMI-B", "TV", "eDP", "Virtual", "DSI", "DPI", "Writeback", "SPI",
    "USB",
];

fn drm_ioctl<T>(fd: RawFd, request: u64, arg: &mut T, what: &str) -> Result<()> {
    loop {
        let rc = unsafe { libc::ioctl(fd, request as libc::c_ulong, arg as *mut T) };
        if rc == 0 {
            return Ok(());
        }
        let errno = std::io::Error::last_os_error();
        match errno.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(anyhow!("DRM {} ioctl failed: {}", what, errno)),
        }
    }
}

fn drm_subpixel(code: u32) -> SubpixelOrder {
    match code {
        2 => SubpixelOrder::HorizontalRgb,
        3 => SubpixelOrder::HorizontalBgr,
        4 => SubpixelOrder::VerticalRgb,
        5 => SubpixelOrder::VerticalBgr,
        _ => SubpixelOrder::None,
    }
}

struct DrmCrtc {
    id: u32,
    gamma_size: usize,
    info: CrtcInfo,
    saved_ramps: Option<Ramps>,
}

struct DrmCard {
    fd: RawFd,
    crtcs: Vec<DrmCrtc>,
}

/// A connection to the KMS layer: every card under `/dev/dri`.
pub struct DrmBackend {
    cards: Vec<DrmCard>,
}

impl DrmBackend {
    pub fn open() -> Result<DrmBackend> {
        let mut cards = Vec::new();
        for index in 0.. {
            let path = format!("/dev/dri/card{}\0", index);
            let fd = unsafe {
                libc::open(path.as_ptr() as *const libc::c_char, libc::O_RDWR | libc::O_CLOEXEC)
            };
            if fd < 0 {
                break;
            }
            match Self::snapshot_card(fd) {
                Ok(crtcs) => cards.push(DrmCard { fd, crtcs }),
                Err(error) => {
                    unsafe { libc::close(fd) };
                    // A render-only node; skip it unless nothing opened
                    if index == 0 && cards.is_empty() {
                        return Err(error);
                    }
                }
            }
        }
        if cards.is_empty() {
            bail!("no DRM cards found under /dev/dri");
        }
        Ok(DrmBackend { cards })
    }

    fn snapshot_card(fd: RawFd) -> Result<Vec<DrmCrtc>> {
        // Two-call pattern: sizes first, then the id arrays
        let mut res = DrmModeCardRes::default();
        drm_ioctl(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res, "get resources")?;
        let mut crtc_ids = vec![0u32; res.count_crtcs as usize];
        let mut connector_ids = vec![0u32; res.count_connectors as usize];
        let mut res2 = DrmModeCardRes {
            crtc_id_ptr: crtc_ids.as_mut_ptr() as u64,
            connector_id_ptr: connector_ids.as_mut_ptr() as u64,
            count_crtcs: res.count_crtcs,
            count_connectors: res.count_connectors,
            ..DrmModeCardRes::default()
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res2, "get resources")?;
        crtc_ids.truncate(res2.count_crtcs as usize);
        connector_ids.truncate(res2.count_connectors as usize);

        struct ConnectorDetails {
            crtc_id: u32,
            name: String,
            type_name: String,
            connected: bool,
            subpixel: SubpixelOrder,
            edid: Option<String>,
        }
        let mut connectors = Vec::new();
        for &connector_id in &connector_ids {
            match Self::read_connector(fd, connector_id) {
                Ok(Some((crtc_id, type_code, type_id, connected, subpixel, edid))) => {
                    let type_name = CONNECTOR_TYPES
                        .get(type_code as usize)
                        .copied()
                        .unwrap_or("Unknown")
                        .to_string();
                    connectors.push(ConnectorDetails {
                        crtc_id,
                        name: format!("{}-{}", type_name, type_id),
                        type_name,
                        connected,
                        subpixel,
                        edid,
                    });
                }
                Ok(None) => {}
                Err(_) => {}
            }
        }

        let mut crtcs = Vec::new();
        for &crtc_id in &crtc_ids {
            let mut crtc = DrmModeCrtc {
                crtc_id,
                ..DrmModeCrtc::default()
            };
            drm_ioctl(fd, DRM_IOCTL_MODE_GETCRTC, &mut crtc, "get CRTC")?;
            let gamma_size = crtc.gamma_size as usize;
            let connector = connectors.iter().find(|c| c.crtc_id == crtc_id);
            let saved_ramps = if gamma_size > 1 {
                Self::read_gamma(fd, crtc_id, gamma_size).ok()
            } else {
                None
            };
            let info = CrtcInfo {
                red_gamma_size: gamma_size,
                green_gamma_size: gamma_size,
                blue_gamma_size: gamma_size,
                gamma_depth: Depth::Uint16,
                gamma_support: if gamma_size > 1 { GammaSupport::Yes } else { GammaSupport::No },
                subpixel_order: connector.map(|c| c.subpixel).unwrap_or(SubpixelOrder::None),
                active: crtc.mode_valid != 0 && connector.map(|c| c.connected).unwrap_or(false),
                connector_name: connector.map(|c| c.name.clone()),
                connector_type: connector.map(|c| c.type_name.clone()),
                edid: connector.and_then(|c| c.edid.clone()),
                cooperative: false,
            };
            crtcs.push(DrmCrtc { id: crtc_id, gamma_size, info, saved_ramps });
        }
        Ok(crtcs)
    }

    /// Returns the connector's driving CRTC id (via its encoder),
    /// type code and per-type index, connection state, subpixel order
    /// and EDID; `None` for connectors without an encoder.
    #[allow(clippy::type_complexity)]
    fn read_connector(
        fd: RawFd,
        connector_id: u32,
    ) -> Result<Option<(u32, u32, u32, bool, SubpixelOrder, Option<String>)>> {
        let mut conn = DrmModeGetConnector {
            connector_id,
            ..DrmModeGetConnector::default()
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETCONNECTOR, &mut conn, "get connector")?;
        let mut modes = vec![DrmModeModeinfo::default(); conn.count_modes.max(1) as usize];
        let mut props = vec![0u32; conn.count_props as usize];
        let mut prop_values = vec![0u64; conn.count_props as usize];
        let mut encoders = vec![0u32; conn.count_encoders as usize];
        let mut conn2 = DrmModeGetConnector {
            connector_id,
            modes_ptr: modes.as_mut_ptr() as u64,
            count_modes: conn.count_modes,
            props_ptr: props.as_mut_ptr() as u64,
            prop_values_ptr: prop_values.as_mut_ptr() as u64,
            count_props: conn.count_props,
            encoders_ptr: encoders.as_mut_ptr() as u64,
            count_encoders: conn.count_encoders,
            ..DrmModeGetConnector::default()
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETCONNECTOR, &mut conn2, "get connector")?;

        let crtc_id = if conn2.encoder_id != 0 {
            let mut encoder = DrmModeGetEncoder {
                encoder_id: conn2.encoder_id,
                ..DrmModeGetEncoder::default()
            };
            drm_ioctl(fd, DRM_IOCTL_MODE_GETENCODER, &mut encoder, "get encoder")?;
            encoder.crtc_id
        } else {
            0
        };
        if crtc_id == 0 {
            return Ok(None);
        }

        let mut edid = None;
        let count = conn2.count_props.min(props.len() as u32) as usize;
        for (&prop_id, &value) in props.iter().take(count).zip(prop_values.iter()) {
            let mut property = DrmModeGetProperty {
                prop_id,
                ..DrmModeGetProperty::default()
            };
            if drm_ioctl(fd, DRM_IOCTL_MODE_GETPROPERTY, &mut property, "get property").is_err() {
                continue;
            }
            let name_len = property.name.iter().position(|&b| b == 0).unwrap_or(32);
            if &property.name[..name_len] == b"EDID" && value != 0 {
                edid = Self::read_blob(fd, value as u32)
                    .ok()
                    .map(|bytes| bytes.iter().map(|b| format!("{:02X}", b)).collect::<String>());
            }
        }

        Ok(Some((
            crtc_id,
            conn2.connector_type,
            conn2.connector_type_id,
            conn2.connection == DRM_MODE_CONNECTED,
            drm_subpixel(conn2.subpixel),
            edid,
        )))
    }

    fn read_blob(fd: RawFd, blob_id: u32) -> Result<Vec<u8>> {
        let mut blob = DrmModeGetBlob {
            blob_id,
            ..DrmModeGetBlob::default()
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETPROPBLOB, &mut blob, "get blob")?;
        let mut data = vec![0u8; blob.length as usize];
        let mut blob2 = DrmModeGetBlob {
            blob_id,
            length: blob.length,
            data: data.as_mut_ptr() as u64,
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETPROPBLOB, &mut blob2, "get blob")?;
        Ok(data)
    }

    fn read_gamma(fd: RawFd, crtc_id: u32, gamma_size: usize) -> Result<Ramps> {
        let mut red = vec![0u16; gamma_size];
        let mut green = vec![0u16; gamma_size];
        let mut blue = vec![0u16; gamma_size];
        let mut lut = DrmModeCrtcLut {
            crtc_id,
            gamma_size: gamma_size as u32,
            red: red.as_mut_ptr() as u64,
            green: green.as_mut_ptr() as u64,
            blue: blue.as_mut_ptr() as u64,
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETGAMMA, &mut lut, "get gamma")?;
        Ok(Ramps {
            red: red.iter().map(|&v| v as f64).collect(),
            green: green.iter().map(|&v| v as f64).collect(),
            blue: blue.iter().map(|&v| v as f64).collect(),
            depth: Depth::Uint16,
        })
    }

    fn write_gamma(fd: RawFd, crtc_id: u32, ramps: &Ramps) -> Result<()> {
        let quantize = |ramp: &[f64]| -> Vec<u16> {
            ramp.iter().map(|&v| v.clamp(0.0, 65535.0) as u16).collect()
        };
        let red = quantize(&ramps.red);
        let green = quantize(&ramps.green);
        let blue = quantize(&ramps.blue);
        let mut lut = DrmModeCrtcLut {
            crtc_id,
            gamma_size: red.len() as u32,
            red: red.as_ptr() as u64,
            green: green.as_ptr() as u64,
            blue: blue.as_ptr() as u64,
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_SETGAMMA, &mut lut, "set gamma")
    }

    fn crtc(&self, partition: usize, crtc: usize) -> Result<(&DrmCard, &DrmCrtc)> {
        let card = self
            .cards
            .get(partition)
            .ok_or_else(|| anyhow!("DRM: no card {}", partition))?;
        let crtc = card
            .crtcs
            .get(crtc)
            .ok_or_else(|| anyhow!("DRM: no CRTC {} on card {}", crtc, partition))?;
        Ok((card, crtc))
    }
}

impl Drop for DrmBackend {
    fn drop(&mut self) {
        for card in &self.cards {
            unsafe { libc::close(card.fd) };
        }
    }
}

impl Backend for DrmBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Drm
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            crtc_restore: true,
            partition_restore: true,
            site_restore: true,
            cooperative: false,
        }
    }

    fn partition_count(&mut self) -> Result<usize> {
        Ok(self.cards.len())
    }

    fn crtc_count(&mut self, partition: usize) -> Result<usize> {
        self.cards
            .get(partition)
            .map(|card| card.crtcs.len())
            .ok_or_else(|| anyhow!("DRM: no card {}", partition))
    }

    fn crtc_info(&mut self, partition: usize, crtc: usize) -> Result<CrtcInfo> {
        Ok(self.crtc(partition, crtc)?.1.info.clone())
    }

    fn get_gamma(&mut self, partition: usize, crtc: usize) -> Result<Ramps> {
        let (card, crtc) = self.crtc(partition, crtc)?;
        if crtc.gamma_size <= 1 {
            bail!("DRM: CRTC {} has no gamma LUT", crtc.id);
        }
        Self::read_gamma(card.fd, crtc.id, crtc.gamma_size)
    }

    fn set_gamma(&mut self, partition: usize, crtc: usize, ramps: &Ramps) -> Result<()> {
        let (card, crtc) = self.crtc(partition, crtc)?;
        if ramps.red.len() != crtc.gamma_size {
            bail!(
                "DRM: ramp size {} does not match CRTC gamma size {}",
                ramps.red.len(),
                crtc.gamma_size
            );
        }
        Self::write_gamma(card.fd, crtc.id, ramps)
    }

    fn restore_crtc(&mut self, partition: usize, crtc: usize) -> Result<()> {
        let (card, crtc) = self.crtc(partition, crtc)?;
        match &crtc.saved_ramps {
            Some(saved) => Self::write_gamma(card.fd, crtc.id, saved),
            None => Ok(()),
        }
    }

    fn restore_partition(&mut self, partition: usize) -> Result<()> {
        let count = self.crtc_count(partition)?;
        for crtc in 0..count {
            self.restore_crtc(partition, crtc)?;
        }
        Ok(())
    }

    fn restore_site(&mut self) -> Result<()> {
        for partition in 0..self.cards.len() {
            self.restore_partition(partition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_codes_match_kernel_headers() {
        // Spot checks against the values in <drm/drm.h>
        assert_eq!(DRM_IOCTL_MODE_GETRESOURCES, 0xC040_64A0);
        assert_eq!(DRM_IOCTL_MODE_GETGAMMA, 0xC020_64A4);
        assert_eq!(DRM_IOCTL_MODE_SETGAMMA, 0xC020_64A5);
    }

    #[test]
    fn test_struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<DrmModeCardRes>(), 64);
        assert_eq!(std::mem::size_of::<DrmModeModeinfo>(), 68);
        assert_eq!(std::mem::size_of::<DrmModeCrtc>(), 104);
        assert_eq!(std::mem::size_of::<DrmModeCrtcLut>(), 32);
        assert_eq!(std::mem::size_of::<DrmModeGetConnector>(), 80);
        assert_eq!(std::mem::size_of::<DrmModeGetEncoder>(), 20);
        assert_eq!(std::mem::size_of::<DrmModeGetProperty>(), 64);
        assert_eq!(std::mem::size_of::<DrmModeGetBlob>(), 16);
    }

    #[test]
    fn test_connector_type_names() {
        assert_eq!(CONNECTOR_TYPES[11], "HDMI-A");
        assert_eq!(CONNECTOR_TYPES[14], "eDP");
    }
}
