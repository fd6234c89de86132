use thiserror::Error;

/// Failures of the key/value blob backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage write failed: {0}")]
    WriteFailed(String),
}

/// Reasons a stored blob or a provisioning submission cannot become a record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("blob is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("unknown layout version {0}")]
    UnknownVersion(u16),

    #[error("checksum mismatch")]
    Checksum,

    #[error("field `{0}` is not valid UTF-8")]
    NotUtf8(&'static str),

    #[error("field `{0}` is too long")]
    TooLong(&'static str),

    #[error("field `{0}` is missing")]
    Missing(&'static str),

    #[error("field `{field}` has invalid value `{value}`")]
    Invalid { field: &'static str, value: String },

    #[error("broker host `{0}` must not carry a scheme prefix")]
    SchemePrefix(String),

    #[error("battery range {min:.2}..{max:.2} V is not a valid calibration")]
    BatteryRange { min: f32, max: f32 },
}

/// A single acquisition that could not produce a usable sample.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("ADC unavailable")]
    Unavailable,

    #[error("ADC read failed (code {0})")]
    ReadFailed(i32),

    #[error("sample {0} outside 0..=4095")]
    OutOfRange(i32),

    #[error("sensor power rail could not be switched")]
    PowerRail,
}

/// Why an inbound command was dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("payload is not UTF-8")]
    NotUtf8,

    #[error("cannot parse `{payload}` for {command}")]
    Unparsable {
        command: &'static str,
        payload: String,
    },

    #[error("{command} value {value} outside accepted range")]
    OutOfRange { command: &'static str, value: String },

    #[error("{command} value {value:.2} would cross the other bound ({other:.2})")]
    CrossesBound {
        command: &'static str,
        value: f32,
        other: f32,
    },

    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
