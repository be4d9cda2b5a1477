use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated")]
    Truncated,

    #[error("unknown opcode {0:#010x}")]
    UnknownOpcode(u32),

    #[error("opcode {expected:#010x} does not match requested variant {actual:#010x}")]
    WrongOpcode { expected: u32, actual: u32 },

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    #[error("unknown status value {0}")]
    UnknownStatus(u8),

    #[error("could not determine request variant from JSON shape")]
    IndeterminateVariant,

    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(e.to_string())
    }
}
