//! Error types for raster conversion, status decoding and device transport.
//!
//! Per-field status mismatches are not errors: they are reported in the
//! [`StatusTrace`](crate::StatusTrace) and folded into its overall result.

use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The source image (or its rescaled form) has no pixels on one axis.
    ///
    /// Raised before any conversion output is produced.
    #[error("Invalid image geometry {width}x{height}")]
    Geometry { width: u32, height: u32 },

    /// No catalog entry exists for the requested label width.
    #[error("Unknown label width: {0:?}")]
    UnknownLabel(String),

    /// A bitmap row longer than the one-byte length of a raster statement.
    #[error("Raster row of {0} bytes does not fit a row statement")]
    RowTooWide(usize),

    /// Status bytes were absent (`None`) or not exactly 32 bytes long.
    #[error("Malformed status report (length {0:?})")]
    StatusFormat(Option<usize>),

    /// Failure while reading or writing an image file.
    #[error(transparent)]
    ImageError(#[from] image::ImageError),

    /// USB communication error.
    ///
    /// Wraps underlying rusb errors for device communication issues,
    /// timeouts, or permission problems.
    #[error(transparent)]
    UsbError(#[from] rusb::Error),

    /// Printer device is not connected or not responding.
    #[error("Device is offline")]
    DeviceOffline,

    #[error("Can't read device list, permission issue ?")]
    DeviceListNotReadable,

    #[error("Device is missing endpoint")]
    MissingEndpoint,

    #[error("Short write to printer: {0} bytes transferred")]
    InvalidResponse(usize),

    #[error("Status request return no response")]
    ReadStatusTimeout,

    /// Hardware-level printer error reported in a status report.
    #[error(transparent)]
    PrinterError(PrinterError),
}

/// Hardware-specific errors reported by the printer.
///
/// These are read from the two error bytes (positions 8 and 9) of a status
/// report and indicate physical problems that need user intervention.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterError {
    #[error("No media is installed")]
    NoMedia,

    #[error("End of media")]
    EndOfMedia,

    #[error("Cutter jam")]
    CutterJam,

    #[error("Printer is in use")]
    PrinterInUse,

    #[error("Printer is turned off")]
    PrinterOffline,

    #[error("High-voltage adapter")]
    HighVoltageAdapter,

    #[error("Fan motor error")]
    FanMotor,

    #[error("Installed media is not match")]
    InvalidMedia,

    #[error("Expansion buffer is full")]
    BufferFull,

    #[error("Communication error")]
    CommunicationError,

    #[error("Communication buffer is full")]
    CommunicationBufferFull,

    #[error("Cover is open")]
    CoverOpen,

    #[error("Cancel key pressed")]
    CancelKey,

    #[error("Media can not be fed")]
    FeedMediaFail,

    #[error("System error")]
    SystemError,

    #[error("Unknown error {0:#04x} {1:#04x}")]
    UnknownError(u8, u8),
}

impl PrinterError {
    /// Parse the printer error from a 32-byte status buffer.
    ///
    /// Error byte 1 takes precedence over error byte 2. Returns
    /// `UnknownError(0, 0)` when neither byte reports anything.
    pub fn from_buf(buf: [u8; 32]) -> Self {
        let err_1 = buf[8];
        let err_2 = buf[9];

        match err_1 {
            0b0000_0001 => Self::NoMedia,
            0b0000_0010 => Self::EndOfMedia,
            0b0000_0100 => Self::CutterJam,
            0b0001_0000 => Self::PrinterInUse,
            0b0010_0000 => Self::PrinterOffline,
            0b0100_0000 => Self::HighVoltageAdapter,
            0b1000_0000 => Self::FanMotor,
            _ => match err_2 {
                0b0000_0001 => Self::InvalidMedia,
                0b0000_0010 => Self::BufferFull,
                0b0000_0100 => Self::CommunicationError,
                0b0000_1000 => Self::CommunicationBufferFull,
                0b0001_0000 => Self::CoverOpen,
                0b0010_0000 => Self::CancelKey,
                0b0100_0000 => Self::FeedMediaFail,
                0b1000_0000 => Self::SystemError,
                _ => Self::UnknownError(err_1, err_2),
            },
        }
    }

    /// `true` if the printer is reporting no error condition.
    pub fn is_no_error(&self) -> bool {
        matches!(self, Self::UnknownError(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_with(err_1: u8, err_2: u8) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[8] = err_1;
        buf[9] = err_2;
        buf
    }

    #[test]
    fn clean_status_has_no_error() {
        assert!(PrinterError::from_buf(buf_with(0, 0)).is_no_error());
    }

    #[test]
    fn first_error_byte_wins() {
        assert_eq!(
            PrinterError::from_buf(buf_with(0x02, 0x10)),
            PrinterError::EndOfMedia
        );
        assert_eq!(
            PrinterError::from_buf(buf_with(0x00, 0x10)),
            PrinterError::CoverOpen
        );
    }

    #[test]
    fn combined_bits_are_unknown() {
        let err = PrinterError::from_buf(buf_with(0x03, 0x00));
        assert_eq!(err, PrinterError::UnknownError(0x03, 0x00));
        assert!(!err.is_no_error());
    }
}
