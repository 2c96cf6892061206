// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Parameter structures exchanged through `get_parameter` / `set_parameter`.
//!
//! Every structure starts with a [`ParamHeader`] carrying its size and the
//! interface version it was built against. [`check_header`] rejects a size
//! mismatch with `BadParameter` and a version mismatch with `VersionMismatch`.

use serde::{Deserialize, Serialize};

use super::error::{ComponentError, Result};
use super::port::PortDirection;

/// Interface version every parameter structure is stamped with.
pub const INTERFACE_VERSION: Version = Version {
    major: 1,
    minor: 1,
    revision: 2,
    step: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub step: u8,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.step
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamHeader {
    pub size: u32,
    pub version: Version,
}

impl ParamHeader {
    /// Header for a structure of type `T` at the current interface version.
    pub fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>() as u32,
            version: INTERFACE_VERSION,
        }
    }
}

/// Validate a header against the structure type it claims to prefix.
pub fn check_header<T>(header: &ParamHeader) -> Result<()> {
    let expected = std::mem::size_of::<T>() as u32;
    if header.size != expected {
        return Err(ComponentError::BadParameter(format!(
            "structure size {} does not match expected {}",
            header.size, expected
        )));
    }
    if header.version.major != INTERFACE_VERSION.major
        || header.version.minor != INTERFACE_VERSION.minor
    {
        return Err(ComponentError::VersionMismatch {
            expected: INTERFACE_VERSION.to_string(),
            actual: header.version.to_string(),
        });
    }
    Ok(())
}

/// Media domain a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDomain {
    Audio,
    Video,
    Image,
    Other,
}

impl PortDomain {
    pub const ALL: [PortDomain; 4] = [Self::Audio, Self::Video, Self::Image, Self::Other];
}

impl std::fmt::Display for PortDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Domain-specific encoding of the data a port carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum PortFormat {
    Audio { encoding: String },
    Video { compression: String, color: String },
    Image { compression: String, color: String },
    Other { format: String },
}

impl Default for PortFormat {
    fn default() -> Self {
        Self::Other {
            format: String::new(),
        }
    }
}

impl PortFormat {
    pub fn audio(encoding: impl Into<String>) -> Self {
        Self::Audio {
            encoding: encoding.into(),
        }
    }

    pub fn video(compression: impl Into<String>, color: impl Into<String>) -> Self {
        Self::Video {
            compression: compression.into(),
            color: color.into(),
        }
    }

    pub fn image(compression: impl Into<String>, color: impl Into<String>) -> Self {
        Self::Image {
            compression: compression.into(),
            color: color.into(),
        }
    }

    pub fn other(format: impl Into<String>) -> Self {
        Self::Other {
            format: format.into(),
        }
    }

    pub fn domain(&self) -> PortDomain {
        match self {
            Self::Audio { .. } => PortDomain::Audio,
            Self::Video { .. } => PortDomain::Video,
            Self::Image { .. } => PortDomain::Image,
            Self::Other { .. } => PortDomain::Other,
        }
    }

    /// Why two formats cannot be tunneled, if they cannot.
    pub fn incompatibility(&self, other: &PortFormat) -> Option<String> {
        if self.domain() != other.domain() {
            return Some(format!("domain {} vs {}", self.domain(), other.domain()));
        }
        if self != other {
            return Some(format!("encoding {:?} vs {:?}", self, other));
        }
        None
    }
}

/// Which side of a tunnel supplies the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSupplier {
    #[default]
    Unspecified,
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    pub header: ParamHeader,
    pub port_index: u32,
    pub direction: PortDirection,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: usize,
    pub enabled: bool,
    pub populated: bool,
    pub format: PortFormat,
}

impl PortDefinition {
    /// A query for `get_parameter`; every field but the index is filled in.
    pub fn query(port_index: u32) -> Self {
        Self {
            header: ParamHeader::of::<Self>(),
            port_index,
            direction: PortDirection::Input,
            buffer_count_actual: 0,
            buffer_count_min: 0,
            buffer_size: 0,
            enabled: false,
            populated: false,
            format: PortFormat::default(),
        }
    }

    pub fn domain(&self) -> PortDomain {
        self.format.domain()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSupplierParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub supplier: BufferSupplier,
}

impl BufferSupplierParam {
    pub fn new(port_index: u32, supplier: BufferSupplier) -> Self {
        Self {
            header: ParamHeader::of::<Self>(),
            port_index,
            supplier,
        }
    }

    pub fn query(port_index: u32) -> Self {
        Self::new(port_index, BufferSupplier::Unspecified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityParam {
    pub header: ParamHeader,
    pub group_priority: u32,
    pub group_id: u32,
}

impl PriorityParam {
    pub fn new(group_priority: u32, group_id: u32) -> Self {
        Self {
            header: ParamHeader::of::<Self>(),
            group_priority,
            group_id,
        }
    }
}

impl Default for PriorityParam {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Contiguous range of port indices belonging to one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDomainsParam {
    pub header: ParamHeader,
    pub domain: PortDomain,
    pub start_port: u32,
    pub port_count: u32,
}

impl PortDomainsParam {
    pub fn query(domain: PortDomain) -> Self {
        Self {
            header: ParamHeader::of::<Self>(),
            domain,
            start_port: 0,
            port_count: 0,
        }
    }
}

/// Parameter index + structure, as passed to `get_parameter` / `set_parameter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    PortDefinition(PortDefinition),
    BufferSupplier(BufferSupplierParam),
    Priority(PriorityParam),
    PortDomains(PortDomainsParam),
}

impl Param {
    pub fn header(&self) -> &ParamHeader {
        match self {
            Self::PortDefinition(p) => &p.header,
            Self::BufferSupplier(p) => &p.header,
            Self::Priority(p) => &p.header,
            Self::PortDomains(p) => &p.header,
        }
    }

    pub fn check_header(&self) -> Result<()> {
        match self {
            Self::PortDefinition(p) => check_header::<PortDefinition>(&p.header),
            Self::BufferSupplier(p) => check_header::<BufferSupplierParam>(&p.header),
            Self::Priority(p) => check_header::<PriorityParam>(&p.header),
            Self::PortDomains(p) => check_header::<PortDomainsParam>(&p.header),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PortDefinition(_) => "PortDefinition",
            Self::BufferSupplier(_) => "BufferSupplier",
            Self::Priority(_) => "Priority",
            Self::PortDomains(_) => "PortDomains",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_header_accepts_matching() {
        let header = ParamHeader::of::<PriorityParam>();
        assert!(check_header::<PriorityParam>(&header).is_ok());
    }

    #[test]
    fn test_check_header_size_mismatch() {
        let header = ParamHeader::of::<PriorityParam>();
        let result = check_header::<PortDefinition>(&header);
        assert!(matches!(result, Err(ComponentError::BadParameter(_))));
    }

    #[test]
    fn test_check_header_version_mismatch() {
        let mut header = ParamHeader::of::<PriorityParam>();
        header.version.major = 2;
        let result = check_header::<PriorityParam>(&header);
        assert!(matches!(result, Err(ComponentError::VersionMismatch { .. })));

        // Revision and step are not part of the contract
        let mut header = ParamHeader::of::<PriorityParam>();
        header.version.step = 9;
        assert!(check_header::<PriorityParam>(&header).is_ok());
    }

    #[test]
    fn test_param_dispatches_header_check() {
        let mut param = Param::BufferSupplier(BufferSupplierParam::query(0));
        assert!(param.check_header().is_ok());

        if let Param::BufferSupplier(p) = &mut param {
            p.header.size += 1;
        }
        assert!(matches!(
            param.check_header(),
            Err(ComponentError::BadParameter(_))
        ));
    }

    #[test]
    fn test_format_compatibility() {
        let pcm = PortFormat::audio("pcm");
        assert!(pcm.incompatibility(&PortFormat::audio("pcm")).is_none());
        assert!(pcm.incompatibility(&PortFormat::audio("mp3")).is_some());
        assert!(pcm.incompatibility(&PortFormat::video("h264", "yuv420")).is_some());
    }

    #[test]
    fn test_format_serde_tagging() {
        let format = PortFormat::video("h264", "yuv420");
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["domain"], "video");
        assert_eq!(json["compression"], "h264");
        let back: PortFormat = serde_json::from_value(json).unwrap();
        assert_eq!(back, format);
    }
}
