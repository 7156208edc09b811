//! Error Types
//!
//! Layout computation either produces a complete layout or fails with one of
//! these errors; partially computed layouts are never returned.

use thiserror::Error;

use crate::surface::{MicroTileType, TilingMode};

// =============================================================================
// Address Library Return Codes
// =============================================================================

pub const ADDR_OK: u32 = 0;
pub const ADDR_ERROR: u32 = 1;
pub const ADDR_OUTOFMEMORY: u32 = 2;
pub const ADDR_INVALIDPARAMS: u32 = 3;
pub const ADDR_NOTSUPPORTED: u32 = 4;
pub const ADDR_NOTIMPLEMENTED: u32 = 5;
pub const ADDR_PARAMSIZEMISMATCH: u32 = 6;
pub const ADDR_INVALIDGBREGVALUES: u32 = 7;

/// Failure reported by a tiling backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilingError {
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("no tile mode entry for {mode:?} with {tile_type:?} micro tiles")]
    NoTileModeEntry {
        mode: TilingMode,
        tile_type: MicroTileType,
    },

    #[error("tile index {0} is out of range or unused")]
    InvalidTileIndex(u32),

    #[error("tile mode register {index} holds an invalid value 0x{value:08X}")]
    InvalidRegisterValue { index: u32, value: u32 },

    /// Raw return code from an external address library.
    #[error("address library returned code {0}")]
    Code(u32),
}

impl TilingError {
    /// Address-library style numeric return code.
    pub fn code(&self) -> u32 {
        match self {
            TilingError::InvalidParams(_) => ADDR_INVALIDPARAMS,
            TilingError::NotSupported(_) => ADDR_NOTSUPPORTED,
            TilingError::NoTileModeEntry { .. } | TilingError::InvalidTileIndex(_) => {
                ADDR_INVALIDPARAMS
            }
            TilingError::InvalidRegisterValue { .. } => ADDR_INVALIDGBREGVALUES,
            TilingError::Code(code) => *code,
        }
    }
}

/// Why a surface layout could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unsupported sample count {0}")]
    UnsupportedSampleCount(u32),

    #[error("invalid dimensions {width}x{height}x{depth} with {array_size} layers")]
    InvalidDimensions {
        width: u32,
        height: u32,
        depth: u32,
        array_size: u32,
    },

    #[error("dimensions do not fit the surface type: {0}")]
    InconsistentDimensions(&'static str),

    #[error("invalid mip level count {0}")]
    InvalidMipLevelCount(u32),

    #[error(
        "unsupported format: {bytes_per_element} bytes per {block_width}x{block_height} block"
    )]
    UnsupportedFormat {
        bytes_per_element: u32,
        block_width: u32,
        block_height: u32,
    },

    #[error("unknown hardware generation {generation} family {family}")]
    UnknownHardwareFamily { generation: u32, family: u32 },

    #[error("tiling mode {0:?} has no tile mode table entry on this hardware")]
    UnsupportedTilingMode(TilingMode),

    #[error("tiling backend failure (code {}): {0}", .0.code())]
    TilingBackendFailure(#[from] TilingError),

    #[error("incompatible flag combination: {0}")]
    IncompatibleFlagCombination(&'static str),
}
