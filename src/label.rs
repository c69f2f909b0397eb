use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Dots per millimeter at the printer's fixed 300 dpi print resolution.
const DOTS_PER_MM: f64 = 11.8074;

/// Leading margin required by the raster protocol, in dots.
const MARGIN_DOTS: u16 = 35;

/// Geometry of one continuous-length tape width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSpec {
    id: &'static str,
    width_mm: u8,
    offset_px: u32,
}

/// Every tape width the driver knows about, keyed by its width in millimeters.
pub static LABELS: [LabelSpec; 6] = [
    LabelSpec::new("12", 12, 29),
    LabelSpec::new("29", 29, 6),
    LabelSpec::new("38", 38, 12),
    LabelSpec::new("50", 50, 12),
    LabelSpec::new("54", 54, 0),
    LabelSpec::new("62", 62, 12),
];

impl LabelSpec {
    const fn new(id: &'static str, width_mm: u8, offset_px: u32) -> Self {
        LabelSpec {
            id,
            width_mm,
            offset_px,
        }
    }

    /// Find a catalog entry by its exact identifier, e.g. `"62"`.
    pub fn lookup(id: &str) -> Option<&'static LabelSpec> {
        LABELS.iter().find(|label| label.id == id)
    }

    /// Identifiers of all catalog entries, in catalog order.
    pub fn ids() -> impl Iterator<Item = &'static str> {
        LABELS.iter().map(|label| label.id)
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn width_mm(&self) -> u8 {
        self.width_mm
    }

    /// Right margin compensation, in dots.
    pub fn offset_px(&self) -> u32 {
        self.offset_px
    }

    pub fn margin_px(&self) -> u16 {
        MARGIN_DOTS
    }

    /// Full tape width in dots.
    pub fn total_px(&self) -> u32 {
        (f64::from(self.width_mm) * DOTS_PER_MM).round() as u32
    }

    /// Width the source image is scaled to before placement.
    pub fn printable_px(&self) -> u32 {
        self.total_px() - u32::from(MARGIN_DOTS) - 1
    }
}

impl FromStr for LabelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
            .copied()
            .ok_or_else(|| Error::UnknownLabel(s.to_string()))
    }
}

impl fmt::Display for LabelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mm endless", self.width_mm)
    }
}
