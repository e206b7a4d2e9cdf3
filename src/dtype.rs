//! Data-type tags for tensor buffers. F32 carries the full kernel surface;
//! I32 carries scatter indices and pool index maps; U8 is storage-only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of element types a buffer can hold.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DataType {
    F32,
    I32,
    U8,
}

impl DataType {
    /// Element size in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::I32 => 4,
            DataType::U8 => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::F32 => write!(f, "f32"),
            DataType::I32 => write!(f, "i32"),
            DataType::U8 => write!(f, "u8"),
        }
    }
}
