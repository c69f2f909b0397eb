use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, GrayImage};
use log::debug;

use crate::{
    convert::{prepare, Conversion, ConvertOptions},
    encoder::CommandFrame,
    error::Error,
    label::LabelSpec,
};

/// Anything that turns images into print jobs for one print head.
pub trait Device {
    /// Dots across the print head.
    fn pixel_width(&self) -> u32;

    /// Convert `source` into a bitmap, or a preview image, for this head.
    fn convert(
        &self,
        source: &DynamicImage,
        label: &LabelSpec,
        options: &ConvertOptions,
    ) -> Result<Conversion, Error> {
        prepare(source, label, options, self.pixel_width())
    }

    /// Convert `source` and frame it as a complete print job.
    fn feed(
        &self,
        source: &DynamicImage,
        label: &LabelSpec,
        options: &ConvertOptions,
    ) -> Result<Feed, Error> {
        match self.convert(source, label, options)? {
            Conversion::Preview(preview) => Ok(Feed::Preview(preview)),
            Conversion::Bitmap(bitmap) => {
                let frame = CommandFrame::encode(&bitmap, label)?;
                debug!("framed {} bytes for {}", frame.len(), label);
                Ok(Feed::Job(frame))
            }
        }
    }
}

/// Output of [`Device::feed`].
#[derive(Debug, Clone)]
pub enum Feed {
    Preview(GrayImage),
    Job(CommandFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    QL500,
    QL550,
    QL560,
    QL570,
    QL580N,
    QL600,
    QL650TD,
    QL700,
    QL710W,
    QL720NW,
    QL800,
    QL810W,
    QL820NWB,
    QL1050,
    QL1060N,
    QL1100,
    QL1110NWB,
    QL1115NWB,
}

impl Model {
    pub const ALL: [Model; 18] = [
        Self::QL500,
        Self::QL550,
        Self::QL560,
        Self::QL570,
        Self::QL580N,
        Self::QL600,
        Self::QL650TD,
        Self::QL700,
        Self::QL710W,
        Self::QL720NW,
        Self::QL800,
        Self::QL810W,
        Self::QL820NWB,
        Self::QL1050,
        Self::QL1060N,
        Self::QL1100,
        Self::QL1110NWB,
        Self::QL1115NWB,
    ];

    /// Model from the code at position 4 of a status report.
    ///
    /// QL-500 and QL-550 share a code; it resolves to QL-500.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x4F => Some(Self::QL500),
            0x31 => Some(Self::QL560),
            0x32 => Some(Self::QL570),
            0x33 => Some(Self::QL580N),
            0x47 => Some(Self::QL600),
            0x51 => Some(Self::QL650TD),
            0x35 => Some(Self::QL700),
            0x36 => Some(Self::QL710W),
            0x37 => Some(Self::QL720NW),
            0x38 => Some(Self::QL800),
            0x39 => Some(Self::QL810W),
            0x41 => Some(Self::QL820NWB),
            0x50 => Some(Self::QL1050),
            0x34 => Some(Self::QL1060N),
            0x43 => Some(Self::QL1100),
            0x44 => Some(Self::QL1110NWB),
            0x45 => Some(Self::QL1115NWB),
            _ => None,
        }
    }

    /// USB product id; the vendor is always Brother (0x04F9).
    pub fn pid(&self) -> u16 {
        match self {
            Self::QL500 => 0x2015,
            Self::QL550 => 0x2016,
            Self::QL560 => 0x2027,
            Self::QL570 => 0x2028,
            Self::QL580N => 0x2029,
            Self::QL600 => 0x20C0,
            Self::QL650TD => 0x201B,
            Self::QL700 => 0x2042,
            Self::QL710W => 0x2043,
            Self::QL720NW => 0x2044,
            Self::QL800 => 0x209B,
            Self::QL810W => 0x209C,
            Self::QL820NWB => 0x209D,
            Self::QL1050 => 0x2020,
            Self::QL1060N => 0x202A,
            Self::QL1100 => 0x20A7,
            Self::QL1110NWB => 0x20A8,
            Self::QL1115NWB => 0x20AB,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::QL500 => "ql500",
            Self::QL550 => "ql550",
            Self::QL560 => "ql560",
            Self::QL570 => "ql570",
            Self::QL580N => "ql580n",
            Self::QL600 => "ql600",
            Self::QL650TD => "ql650td",
            Self::QL700 => "ql700",
            Self::QL710W => "ql710w",
            Self::QL720NW => "ql720nw",
            Self::QL800 => "ql800",
            Self::QL810W => "ql810w",
            Self::QL820NWB => "ql820nwb",
            Self::QL1050 => "ql1050",
            Self::QL1060N => "ql1060n",
            Self::QL1100 => "ql1100",
            Self::QL1110NWB => "ql1110nwb",
            Self::QL1115NWB => "ql1115nwb",
        }
    }
}

impl Device for Model {
    fn pixel_width(&self) -> u32 {
        match self {
            Self::QL1050 | Self::QL1060N | Self::QL1100 | Self::QL1110NWB | Self::QL1115NWB => {
                crate::WIDE_PRINTER_WIDTH
            }
            _ => crate::NORMAL_PRINTER_WIDTH,
        }
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase().replace('-', "");
        Self::ALL
            .iter()
            .find(|model| model.name() == wanted)
            .copied()
            .ok_or_else(|| format!("unknown model {:?}", s))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
