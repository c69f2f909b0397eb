//! Brother QL raster codec
//!
//! This crate turns images into raster print jobs for Brother QL series label
//! printers, and decodes the 32-byte status reports they send back.
//!
//! # Example
//!
//! ```rust,no_run
//! use ql_raster::{submit, ConvertOptions, Device, Feed, LabelSpec, Model, UsbTransport};
//!
//! let label = LabelSpec::lookup("62").unwrap();
//! let image = image::open("label.png").unwrap();
//! let options = ConvertOptions::new().threshold(70.0);
//!
//! if let Feed::Job(frame) = Model::QL500.feed(&image, label, &options).unwrap() {
//!     let transport = UsbTransport::open(Model::QL500, None).unwrap();
//!     let trace = submit(&transport, &frame).unwrap();
//!     println!("{:?}", trace.map(|trace| trace.is_valid()));
//! }
//! ```

mod convert;
mod encoder;
mod error;
mod label;
mod model;
mod status;
mod transport;

pub use crate::{
    convert::{prepare, Conversion, ConvertOptions, PreparedImage, Threshold},
    encoder::CommandFrame,
    error::{Error, PrinterError},
    label::{LabelSpec, LABELS},
    model::{Device, Feed, Model},
    status::{
        check_status, Check, Entry, Field, FieldSpec, FieldTrace, MediaType, Notification, Phase,
        Status, StatusTrace, StatusType, STATUS_FIELDS, STATUS_LEN,
    },
    transport::{submit, Transport, UsbTransport, VENDOR_ID},
};

/// Width in pixels for normal QL printers (QL-500 to QL-820NWB).
///
/// Rows are 90 bytes when packed (720 / 8).
pub const NORMAL_PRINTER_WIDTH: u32 = 720;

/// Width in pixels for wide QL printers (QL-1050 and QL-1100 series).
///
/// Rows are 162 bytes when packed (1296 / 8).
pub const WIDE_PRINTER_WIDTH: u32 = 1296;
