//! Result and Error types for all locust code.
use bincode;
use std::fmt;
use std::io;
use std::str;

#[allow(missing_docs)]
pub type LocustResult<T> = Result<T, LocustError>;

#[allow(missing_docs)]
#[derive(Debug)]
pub enum LocustError {
    Io(io::Error),
    MissingFile(String),
    IndexMissing(String),
    IndexIncompatible(String),
    InvalidScoring(String),
    InvalidOption(String),
    Translation(String),
    Serialize(bincode::Error),
    Utf8(str::Utf8Error),
    Internal(String),
}

impl LocustError {
    /// Process exit code for this error kind: 1 missing/unreadable input,
    /// 2 invalid option, 3 missing/incompatible index, 4 internal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LocustError::Io(_) | LocustError::MissingFile(_) | LocustError::Utf8(_) => 1,
            LocustError::Translation(_) => 1,
            LocustError::InvalidOption(_) | LocustError::InvalidScoring(_) => 2,
            LocustError::IndexMissing(_) | LocustError::IndexIncompatible(_) => 3,
            LocustError::Serialize(_) => 3,
            LocustError::Internal(_) => 4,
        }
    }
}

impl fmt::Display for LocustError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            &LocustError::Io(ref e) => write!(f, "I/O problem: {}", e),
            &LocustError::MissingFile(ref p) => write!(f, "Unable to find file {}", p),
            &LocustError::IndexMissing(ref p) => {
                write!(f, "Required index artifact missing: {}", p)
            },
            &LocustError::IndexIncompatible(ref why) => {
                write!(f, "Index incompatible with this configuration: {}", why)
            },
            &LocustError::InvalidScoring(ref why) => {
                write!(f, "Scoring scheme rejected: {}", why)
            },
            &LocustError::InvalidOption(ref why) => write!(f, "Invalid option: {}", why),
            &LocustError::Translation(ref why) => write!(f, "Translation failed: {}", why),
            &LocustError::Serialize(ref e) => {
                write!(f, "Unable to serialize/deserialize item: {}", e)
            },
            &LocustError::Utf8(ref e) => write!(f, "Found invalid UTF8 input ({})", e),
            &LocustError::Internal(ref why) => write!(f, "Internal alignment failure: {}", why),
        }
    }
}

impl From<io::Error> for LocustError {
    fn from(e: io::Error) -> Self {
        LocustError::Io(e)
    }
}

impl From<bincode::Error> for LocustError {
    fn from(e: bincode::Error) -> Self {
        LocustError::Serialize(e)
    }
}

impl From<str::Utf8Error> for LocustError {
    fn from(e: str::Utf8Error) -> Self {
        LocustError::Utf8(e)
    }
}

impl From<anyhow::Error> for LocustError {
    fn from(e: anyhow::Error) -> Self {
        LocustError::Internal(e.to_string())
    }
}
