//! Decoding of the 32-byte status report sent back by the printer.
//!
//! Two views are offered. [`StatusTrace`] validates every byte against a
//! fixed field table and keeps a line of diagnostics per position.
//! [`Status`] maps the interesting bytes to Rust friendly types.

use std::fmt;

use log::{debug, info};

use crate::{
    error::{Error, PrinterError},
    label::LabelSpec,
    model::Model,
};

/// Length of every status report.
pub const STATUS_LEN: usize = 32;

/// Constraint placed on one byte of a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// The byte must equal this constant.
    Exact(u8),
    /// The byte must match one of these entries.
    Enumerated(&'static [Entry]),
    /// Any value is accepted.
    Free,
}

/// One labelled alternative of an enumerated field.
///
/// An entry matches when its own spec does, so a nested table splits a
/// value range into finer meanings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub label: &'static str,
    pub spec: FieldSpec,
}

impl Entry {
    pub const fn value(value: u8, label: &'static str) -> Self {
        Entry {
            label,
            spec: FieldSpec::Exact(value),
        }
    }

    pub const fn table(label: &'static str, entries: &'static [Entry]) -> Self {
        Entry {
            label,
            spec: FieldSpec::Enumerated(entries),
        }
    }
}

/// Result of checking one byte against a [`FieldSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Exact value compared; `true` if equal.
    Compared { expected: u8, ok: bool },
    /// Enumerated value matched; labels from outer to inner table.
    Described(Vec<&'static str>),
    /// Enumerated value matched no entry.
    Unknown,
    Free,
}

impl Check {
    pub fn is_ok(&self) -> bool {
        match self {
            Check::Compared { ok, .. } => *ok,
            Check::Described(_) | Check::Free => true,
            Check::Unknown => false,
        }
    }
}

impl FieldSpec {
    pub fn check(&self, value: u8) -> Check {
        match *self {
            FieldSpec::Exact(expected) => Check::Compared {
                expected,
                ok: value == expected,
            },
            FieldSpec::Enumerated(entries) => match resolve(entries, value) {
                Some(labels) => Check::Described(labels),
                None => Check::Unknown,
            },
            FieldSpec::Free => Check::Free,
        }
    }
}

fn resolve(entries: &[Entry], value: u8) -> Option<Vec<&'static str>> {
    entries.iter().find_map(|entry| match entry.spec {
        FieldSpec::Exact(expected) => {
            if expected == value {
                Some(vec![entry.label])
            } else {
                None
            }
        }
        FieldSpec::Enumerated(nested) => resolve(nested, value).map(|mut labels| {
            labels.insert(0, entry.label);
            labels
        }),
        FieldSpec::Free => Some(vec![entry.label]),
    })
}

/// Named position in the status report.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub ident: &'static str,
    pub spec: FieldSpec,
}

const fn field(ident: &'static str, spec: FieldSpec) -> Field {
    Field { ident, spec }
}

const FIXED: &[Entry] = &[Entry::value(0x00, "null"), Entry::value(0x30, "zero")];

const ERROR_1_CODES: &[Entry] = &[
    Entry::value(0x00, "no media"),
    Entry::value(0x01, "end of media"),
    Entry::value(0x02, "tape cutter jam"),
    Entry::value(0x03, "not used"),
    Entry::value(0x04, "main unit in use"),
    Entry::value(0x05, "printer turned off"),
    Entry::value(0x06, "high-voltage adapter"),
    Entry::value(0x07, "fan issue"),
];

const ERROR_2_CODES: &[Entry] = &[
    Entry::value(0x00, "replace media"),
    Entry::value(0x01, "expansion buffer exhausted"),
    Entry::value(0x02, "communication error"),
    Entry::value(0x03, "communication buffer exhausted"),
    Entry::value(0x04, "cover open"),
    Entry::value(0x05, "cancel key"),
    Entry::value(0x06, "media feed"),
    Entry::value(0x07, "system error"),
];

// The trace accepts codes 0..=7; `PrinterError` reads the same bytes as bit flags
const ERROR_1: &[Entry] = &[Entry::table("error", ERROR_1_CODES)];

const ERROR_2: &[Entry] = &[Entry::table("error", ERROR_2_CODES)];

// Documents give 0x4A/0x4B but printers seem to send 0x0A/0x0B
const MEDIA_TYPE: &[Entry] = &[
    Entry::value(0x00, "no media"),
    Entry::value(0x0A, "continuous length tape"),
    Entry::value(0x0B, "die-cut labels"),
];

const STATUS_TYPE: &[Entry] = &[
    Entry::value(0x00, "reply to status request"),
    Entry::value(0x01, "printing completed"),
    Entry::value(0x02, "error occurred"),
    Entry::value(0x05, "notification"),
    Entry::value(0x06, "phase change"),
];

const PHASE_TYPE: &[Entry] = &[
    Entry::value(0x00, "waiting to receive"),
    Entry::value(0x01, "printing state"),
];

/// Field table of the status report, indexed by byte position.
pub const STATUS_FIELDS: [Field; STATUS_LEN] = [
    field("head", FieldSpec::Exact(0x80)),
    field("size", FieldSpec::Exact(0x20)),
    field("fixed", FieldSpec::Exact(0x42)),
    field("device dependent", FieldSpec::Free),
    field("device dependent", FieldSpec::Free),
    field("fixed", FieldSpec::Exact(0x30)),
    field("fixed", FieldSpec::Enumerated(FIXED)),
    field("fixed", FieldSpec::Exact(0x00)),
    field("error bit 1", FieldSpec::Enumerated(ERROR_1)),
    field("error bit 2", FieldSpec::Enumerated(ERROR_2)),
    field("media width", FieldSpec::Free),
    field("media type", FieldSpec::Enumerated(MEDIA_TYPE)),
    field("fixed", FieldSpec::Exact(0x00)),
    field("fixed", FieldSpec::Exact(0x00)),
    field("reserved", FieldSpec::Free),
    field("mode", FieldSpec::Free),
    field("fixed", FieldSpec::Exact(0x00)),
    field("media length", FieldSpec::Free),
    field("status type", FieldSpec::Enumerated(STATUS_TYPE)),
    field("phase type", FieldSpec::Enumerated(PHASE_TYPE)),
    field("phase number high", FieldSpec::Free),
    field("phase number low", FieldSpec::Free),
    field("notification number", FieldSpec::Free),
    field("reserved", FieldSpec::Free),
    field("reserved", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
    field("padding", FieldSpec::Free),
];

/// Diagnostic line for one byte of a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTrace {
    pub position: usize,
    pub ident: &'static str,
    pub value: u8,
    pub check: Check,
}

impl FieldTrace {
    pub fn is_ok(&self) -> bool {
        self.check.is_ok()
    }
}

impl fmt::Display for FieldTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ", self.value)?;
        match &self.check {
            Check::Compared { expected, ok } => write!(
                f,
                "{:#04x} #{:02} {}{}",
                expected,
                self.position,
                self.ident,
                if *ok { "" } else { " (mismatch)" }
            ),
            Check::Described(labels) => write!(
                f,
                "---- #{:02} {} - {}",
                self.position,
                self.ident,
                labels.join(" - ")
            ),
            Check::Unknown => write!(
                f,
                "???? #{:02} {} - unknown value",
                self.position, self.ident
            ),
            Check::Free => write!(f, "---- #{:02} {}", self.position, self.ident),
        }
    }
}

/// Field-by-field validation of a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTrace {
    fields: Vec<FieldTrace>,
}

impl StatusTrace {
    /// Check `data` against [`STATUS_FIELDS`].
    ///
    /// Absent data or a length other than 32 fails without any trace. Every
    /// field is evaluated and logged even after a mismatch.
    pub fn decode(data: Option<&[u8]>) -> Result<Self, Error> {
        let data = match data {
            Some(data) if data.len() == STATUS_LEN => data,
            Some(data) => return Err(Error::StatusFormat(Some(data.len()))),
            None => return Err(Error::StatusFormat(None)),
        };

        let fields: Vec<FieldTrace> = STATUS_FIELDS
            .iter()
            .zip(data.iter())
            .enumerate()
            .map(|(position, (field, value))| {
                let trace = FieldTrace {
                    position,
                    ident: field.ident,
                    value: *value,
                    check: field.spec.check(*value),
                };
                info!("{}", trace);
                trace
            })
            .collect();

        Ok(StatusTrace { fields })
    }

    /// `true` only if every field passed.
    pub fn is_valid(&self) -> bool {
        self.fields.iter().all(FieldTrace::is_ok)
    }

    pub fn fields(&self) -> &[FieldTrace] {
        &self.fields
    }

    /// Typed view of the decoded report.
    pub fn status(&self) -> Status {
        let mut buf = [0u8; STATUS_LEN];
        for field in &self.fields {
            buf[field.position] = field.value;
        }
        Status::from_buf(buf)
    }
}

impl fmt::Display for StatusTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}", field)?;
        }
        Ok(())
    }
}

/// Validate a status report, collapsing the trace to a single answer.
pub fn check_status(data: Option<&[u8]>) -> bool {
    match StatusTrace::decode(data) {
        Ok(trace) => trace.is_valid(),
        Err(err) => {
            debug!("{}", err);
            false
        }
    }
}

///
/// Status received from the printer encoded to Rust friendly type.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub model: Option<Model>,
    pub error: PrinterError,
    pub media_width: u8,
    pub media_type: MediaType,
    pub media_length: u8,
    pub mode: u8,
    pub status_type: StatusType,
    pub phase: Phase,
    pub phase_number: u16,
    pub notification: Notification,
}

impl Status {
    pub fn from_buf(buf: [u8; STATUS_LEN]) -> Self {
        Status {
            model: Model::from_code(buf[4]),
            error: PrinterError::from_buf(buf),
            media_width: buf[10],
            media_type: MediaType::from_code(buf[11]),
            media_length: buf[17],
            mode: buf[15],
            status_type: StatusType::from_code(buf[18]),
            phase: Phase::from_code(buf[19]),
            phase_number: u16::from_be_bytes([buf[20], buf[21]]),
            notification: Notification::from_code(buf[22]),
        }
    }

    /// Build from a received slice, which must be exactly 32 bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let mut buf = [0u8; STATUS_LEN];
        if data.len() != STATUS_LEN {
            return Err(Error::StatusFormat(Some(data.len())));
        }
        buf.copy_from_slice(data);
        Ok(Self::from_buf(buf))
    }

    /// Fail with the reported hardware error, if any.
    pub fn check_error(&self) -> Result<(), Error> {
        if self.error.is_no_error() {
            Ok(())
        } else {
            Err(Error::PrinterError(self.error))
        }
    }

    /// `true` if the installed tape is continuous and as wide as `label`.
    pub fn matches_label(&self, label: &LabelSpec) -> bool {
        self.media_type == MediaType::Continuous && self.media_width == label.width_mm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    NoMedia,
    Continuous,
    DieCut,
    Unknown(u8),
}

impl MediaType {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::NoMedia,
            0x0A | 0x4A => Self::Continuous,
            0x0B | 0x4B => Self::DieCut,
            _ => Self::Unknown(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    ReplyToRequest,
    Completed,
    Error,
    Offline,
    Notification,
    PhaseChange,
    Unknown(u8),
}

impl StatusType {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::ReplyToRequest,
            0x01 => Self::Completed,
            0x02 => Self::Error,
            0x04 => Self::Offline,
            0x05 => Self::Notification,
            0x06 => Self::PhaseChange,
            _ => Self::Unknown(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Receiving,
    Printing,
    Unknown(u8),
}

impl Phase {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Receiving,
            0x01 => Self::Printing,
            _ => Self::Unknown(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    NotAvailable,
    CoolingStarted,
    CoolingFinished,
}

impl Notification {
    fn from_code(code: u8) -> Self {
        match code {
            0x03 => Self::CoolingStarted,
            0x04 => Self::CoolingFinished,
            _ => Self::NotAvailable,
        }
    }
}
