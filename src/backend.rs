//! Tiling Backend Interface
//!
//! The per-generation address computations (tile index selection, pipe/bank
//! swizzles, metadata footprints) live behind [`TilingBackend`]. The layout
//! engine threads inputs and outputs through this interface and never
//! decodes tile indices itself.

use bitflags::bitflags;

use crate::error::TilingError;
use crate::surface::{MicroTileType, TilingMode};

bitflags! {
    /// Surface properties the backend uses to pick and degrade tile modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceInfoFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
        const FMASK = 1 << 3;
        const CUBE = 1 << 4;
        const DISPLAY = 1 << 5;
        /// Pad mip levels to powers of two
        const POW2_PAD = 1 << 6;
        const TC_COMPATIBLE = 1 << 7;
        /// Allow falling back to 1D when 2D would waste memory
        const DEGRADE_FOR_SPACE = 1 << 8;
        const OPT_FOR_SPACE = 1 << 9;
        const DCC_COMPATIBLE = 1 << 10;
    }
}

/// Element encoding as seen by the backend.
///
/// Block-compressed formats must be named so the backend works in 4x4
/// blocks; for everything else the element size is sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    /// Uncompressed element of the given size in bits
    Bits(u32),
    /// 4x4 block, 8 bytes
    Bc1,
    /// 4x4 block, 16 bytes
    Bc3,
}

impl ElementFormat {
    /// Bytes per element (per block for compressed formats).
    pub fn bytes_per_element(&self) -> u32 {
        match self {
            ElementFormat::Bits(bits) => bits / 8,
            ElementFormat::Bc1 => 8,
            ElementFormat::Bc3 => 16,
        }
    }

    /// Pixel footprint of one element.
    pub fn block_dims(&self) -> (u32, u32) {
        match self {
            ElementFormat::Bits(_) => (1, 1),
            ElementFormat::Bc1 | ElementFormat::Bc3 => (4, 4),
        }
    }
}

/// Bank and pipe distribution of a tiled surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileInfo {
    pub banks: u32,
    pub bank_width: u32,
    pub bank_height: u32,
    pub macro_aspect_ratio: u32,
    pub tile_split_bytes: u32,
    /// `PIPE_CONFIG` register encoding
    pub pipe_config: u32,
}

// =============================================================================
// Level Geometry
// =============================================================================

/// Description of one mip level handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInputs {
    pub tile_mode: TilingMode,
    pub tile_type: MicroTileType,
    pub format: ElementFormat,
    pub num_samples: u32,
    pub mip_level: u32,
    /// Level width in pixels
    pub width: u32,
    /// Level height in pixels
    pub height: u32,
    pub num_slices: u32,
    /// Pitch of the base level in pixels, 0 for the base level itself
    pub base_pitch: u32,
    pub flags: SurfaceInfoFlags,
    /// Tile-mode table entry to use instead of searching the table
    pub tile_index: Option<u32>,
    /// Tile parameters to use instead of the table's
    pub tile_info: Option<TileInfo>,
    /// Macro-tile table entry to use instead of deriving one
    pub macro_mode_index: Option<u32>,
}

/// Geometry of one mip level as computed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBackendOutput {
    /// Pitch in elements
    pub pitch: u32,
    /// Height in elements
    pub height: u32,
    pub depth: u32,
    pub surface_size: u64,
    pub slice_size: u64,
    pub base_align: u64,
    /// Tile mode actually used, possibly degraded from the requested one
    pub tile_mode: TilingMode,
    pub tile_index: u32,
    pub macro_mode_index: u32,
    pub tile_info: TileInfo,
}

// =============================================================================
// Metadata
// =============================================================================

/// Colour compression query for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionInputs {
    pub color_surface_size: u64,
    pub bits_per_pixel: u32,
    pub num_samples: u32,
    pub tile_mode: TilingMode,
    pub tile_info: TileInfo,
    pub tile_index: u32,
    pub macro_mode_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionBackendOutput {
    pub fast_clear_size: u64,
    pub ram_size: u64,
    pub ram_base_align: u64,
    /// Whether the next mip level may be compressed as well
    pub sub_level_compressible: bool,
}

/// Hierarchical depth query for the base level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtileInputs {
    pub pitch: u32,
    pub height: u32,
    pub num_slices: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub tc_compatible: bool,
    pub tile_mode: TilingMode,
    pub tile_info: TileInfo,
    pub tile_index: u32,
    pub macro_mode_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxBackendOutput {
    pub htile_bytes: u64,
    pub slice_size: u64,
    pub base_align: u64,
}

/// Per-generation address computations.
///
/// Implementations hold only read-only hardware tables, so one backend can
/// serve any number of concurrent layout computations.
pub trait TilingBackend: Send + Sync {
    fn compute_level_geometry(
        &self,
        inputs: &LevelInputs,
    ) -> Result<LevelBackendOutput, TilingError>;

    fn compute_compression_info(
        &self,
        inputs: &CompressionInputs,
    ) -> Result<CompressionBackendOutput, TilingError>;

    fn compute_hierarchical_metadata_info(
        &self,
        inputs: &HtileInputs,
    ) -> Result<AuxBackendOutput, TilingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_format_sizes() {
        assert_eq!(ElementFormat::Bits(32).bytes_per_element(), 4);
        assert_eq!(ElementFormat::Bc1.bytes_per_element(), 8);
        assert_eq!(ElementFormat::Bc3.block_dims(), (4, 4));
        assert_eq!(ElementFormat::Bits(8).block_dims(), (1, 1));
    }
}
