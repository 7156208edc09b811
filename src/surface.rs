//! Surface Data Model
//!
//! Resource descriptions handed to the layout engine and the immutable
//! layouts it produces. Sizes and offsets are in bytes from the start of the
//! surface's memory allocation; pitches and heights are in elements (blocks
//! for block-compressed formats).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::capabilities::HardwareId;

/// Deepest mip chain the hardware can address (a 16K texture).
pub const SURF_MAX_MIP_LEVELS: u32 = 15;

/// Largest width, height or depth of a surface.
pub const SURF_MAX_DIMENSION: u32 = 1 << (SURF_MAX_MIP_LEVELS - 1);

/// Largest number of array layers.
pub const SURF_MAX_ARRAY_SIZE: u32 = 2048;

/// Number of faces in a cube map.
pub const CUBE_FACE_COUNT: u32 = 6;

/// Hierarchical depth metadata covers the depth buffer in 8x8 pixel blocks.
pub const HTILE_BLOCK_SIZE: u32 = 8;

/// One compression metadata byte covers 256 bytes of colour data.
pub const DCC_BLOCK_SHIFT: u32 = 8;

// =============================================================================
// Tiling Modes
// =============================================================================

/// Memory arrangement of a surface or of a single mip level.
///
/// The ordering is meaningful: policy rules compare modes ("at least 1D").
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TilingMode {
    #[serde(rename = "linear")]
    Linear = 0,
    #[serde(rename = "linear_aligned")]
    LinearAligned = 1,
    #[serde(rename = "1d")]
    Tiled1D = 2,
    #[serde(rename = "2d")]
    Tiled2D = 3,
}

/// Ordering of pixels inside an 8x8 micro tile.
///
/// Discriminants match the hardware `MICRO_TILE_MODE` field encoding.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroTileType {
    Displayable = 0,
    NonDisplayable = 1,
    DepthSampleOrder = 2,
    Rotated = 3,
}

impl MicroTileType {
    /// Decode a `MICRO_TILE_MODE` register field.
    pub fn from_field(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Displayable),
            1 => Some(Self::NonDisplayable),
            2 => Some(Self::DepthSampleOrder),
            3 => Some(Self::Rotated),
            _ => None,
        }
    }
}

bitflags! {
    /// Usage intent of a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SurfaceFlags: u32 {
        const ZBUFFER = 1 << 0;
        const STENCIL = 1 << 1;
        const COLOR = 1 << 2;
        const SCANOUT = 1 << 3;
        const FMASK = 1 << 4;
        const TC_COMPATIBLE_HTILE = 1 << 5;
        const DISABLE_COMPRESSION = 1 << 6;
        const OPTIMIZE_FOR_SPACE = 1 << 7;

        const Z_OR_STENCIL = Self::ZBUFFER.bits() | Self::STENCIL.bits();
    }
}

// =============================================================================
// Request
// =============================================================================

/// Macro-tile parameters a caller wants to reuse, typically because the
/// surface is shared with another process that already fixed its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferredMacroTile {
    pub num_banks: u32,
    pub bank_width: u32,
    pub bank_height: u32,
    pub macro_aspect_ratio: u32,
    pub tile_split_bytes: u32,
    /// Tile split used for the stencil plane of a depth/stencil surface
    pub stencil_tile_split: u32,
    /// `PIPE_CONFIG` register encoding
    pub pipe_config: u32,
}

/// Abstract description of a texture resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRequest {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_one")]
    pub depth: u32,
    #[serde(default = "default_one")]
    pub array_size: u32,
    #[serde(default = "default_one")]
    pub sample_count: u32,
    #[serde(default = "default_one")]
    pub mip_level_count: u32,
    #[serde(default)]
    pub is_cube: bool,
    #[serde(default)]
    pub is_3d: bool,
    pub bytes_per_element: u32,
    #[serde(default = "default_one")]
    pub block_width: u32,
    #[serde(default = "default_one")]
    pub block_height: u32,
    pub requested_tiling: TilingMode,
    #[serde(default)]
    pub flags: SurfaceFlags,
    pub hardware: HardwareId,
    #[serde(default)]
    pub preferred_macro_tile: Option<PreferredMacroTile>,
}

fn default_one() -> u32 {
    1
}

impl SurfaceRequest {
    /// Single-sampled, single-level 2D colour surface with uncompressed
    /// elements and 2D tiling requested.
    pub fn new(hardware: HardwareId, width: u32, height: u32, bytes_per_element: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
            array_size: 1,
            sample_count: 1,
            mip_level_count: 1,
            is_cube: false,
            is_3d: false,
            bytes_per_element,
            block_width: 1,
            block_height: 1,
            requested_tiling: TilingMode::Tiled2D,
            flags: SurfaceFlags::COLOR,
            hardware,
            preferred_macro_tile: None,
        }
    }

    /// Whether the format uses 4x4 compressed blocks (BC1-BC7 style).
    pub fn is_block_compressed(&self) -> bool {
        self.block_width == 4 && self.block_height == 4
    }

    /// Whether the surface is a colour surface (neither depth nor stencil).
    pub fn is_color(&self) -> bool {
        !self.flags.intersects(SurfaceFlags::Z_OR_STENCIL)
    }

    /// Sample count with the "0 means single-sampled" convention folded in.
    pub fn samples(&self) -> u32 {
        self.sample_count.max(1)
    }

    /// Number of 2D slices at mip `level`.
    pub fn slices_at_level(&self, level: u32) -> u32 {
        if self.is_3d {
            minify(self.depth, level)
        } else if self.is_cube {
            CUBE_FACE_COUNT
        } else {
            self.array_size
        }
    }

    /// Number of array layers, counting cube faces.
    pub fn layer_count(&self) -> u32 {
        if self.is_cube {
            CUBE_FACE_COUNT
        } else {
            self.array_size
        }
    }
}

// =============================================================================
// Layout
// =============================================================================

/// Placement of one mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelLayout {
    /// Byte offset from the start of the plane
    pub offset: u64,
    /// Bytes covered by all slices of this level
    pub size: u64,
    pub slice_size: u64,
    /// Base alignment the level's offset was rounded to
    pub alignment: u64,
    /// Pitch in elements
    pub width_in_blocks: u32,
    pub height_in_blocks: u32,
    pub num_slices: u32,
    pub tiling_mode: TilingMode,
    /// Index into the hardware tile-mode table
    pub tile_index: u32,
    pub compression_offset: Option<u64>,
    pub compression_fast_clear_size: Option<u64>,
}

impl LevelLayout {
    /// First byte past this level.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Bank/pipe distribution of a 2D tiled surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroTileParams {
    pub num_banks: u32,
    pub bank_width: u32,
    pub bank_height: u32,
    pub macro_aspect_ratio: u32,
    pub tile_split_bytes: u32,
    pub macro_tile_index: u32,
}

/// Tiling-mode specific parameters of the base level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileConfig {
    /// Linear or 1D tiled: no macro-tile distribution
    MicroTiled,
    MacroTiled(MacroTileParams),
}

impl TileConfig {
    /// Macro-tile table index; 0 for surfaces that are not 2D tiled.
    pub fn macro_tile_index(&self) -> u32 {
        match self {
            TileConfig::MicroTiled => 0,
            TileConfig::MacroTiled(params) => params.macro_tile_index,
        }
    }

    pub fn macro_params(&self) -> Option<&MacroTileParams> {
        match self {
            TileConfig::MicroTiled => None,
            TileConfig::MacroTiled(params) => Some(params),
        }
    }
}

/// Fast-clear colour compression metadata of the whole miptree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressionMetadata {
    pub size: u64,
    pub alignment: u64,
    /// Levels `0..levels_enabled_count` are compressed
    pub levels_enabled_count: u32,
}

/// Hierarchical depth metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuxMetadata {
    pub size: u64,
    pub alignment: u64,
    pub slice_size: u64,
}

/// Separately placed stencil plane of a depth/stencil surface.
///
/// Offsets are relative to the start of the stencil plane; the caller decides
/// where the plane lives relative to the depth plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StencilPlane {
    pub levels: Vec<LevelLayout>,
    pub size: u64,
    pub alignment: u64,
    /// Tile split chosen for the base level, 2D tiling only
    pub tile_split_bytes: Option<u32>,
}

/// Complete memory layout of a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceLayout {
    pub(crate) effective_tiling: TilingMode,
    pub(crate) micro_tile_type: MicroTileType,
    pub(crate) micro_tile_mode: u32,
    pub(crate) pipe_config: u32,
    pub(crate) tile_config: TileConfig,
    pub(crate) levels: Vec<LevelLayout>,
    pub(crate) stencil: Option<StencilPlane>,
    pub(crate) stencil_adjusted: bool,
    pub(crate) total_size: u64,
    pub(crate) base_alignment: u64,
    pub(crate) compression: Option<CompressionMetadata>,
    pub(crate) aux: Option<AuxMetadata>,
    pub(crate) is_purely_linear: bool,
}

impl SurfaceLayout {
    /// Tiling mode after policy overrides, before per-level degradation.
    pub fn effective_tiling(&self) -> TilingMode {
        self.effective_tiling
    }

    pub fn micro_tile_type(&self) -> MicroTileType {
        self.micro_tile_type
    }

    /// `MICRO_TILE_MODE` field of the base level's tile-mode register.
    pub fn micro_tile_mode(&self) -> u32 {
        self.micro_tile_mode
    }

    /// `PIPE_CONFIG` register encoding of the base level.
    pub fn pipe_config(&self) -> u32 {
        self.pipe_config
    }

    pub fn tile_config(&self) -> &TileConfig {
        &self.tile_config
    }

    pub fn levels(&self) -> &[LevelLayout] {
        &self.levels
    }

    pub fn stencil(&self) -> Option<&StencilPlane> {
        self.stencil.as_ref()
    }

    pub fn stencil_levels(&self) -> Option<&[LevelLayout]> {
        self.stencil.as_ref().map(|plane| plane.levels.as_slice())
    }

    /// Set when stencil and depth pitches differ; the depth block then has
    /// to program the depth pitch for both planes.
    pub fn stencil_adjusted(&self) -> bool {
        self.stencil_adjusted
    }

    /// Size of the primary (colour or depth) plane.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn base_alignment(&self) -> u64 {
        self.base_alignment
    }

    pub fn compression_metadata(&self) -> Option<&CompressionMetadata> {
        self.compression.as_ref()
    }

    pub fn aux_metadata(&self) -> Option<&AuxMetadata> {
        self.aux.as_ref()
    }

    pub fn is_purely_linear(&self) -> bool {
        self.is_purely_linear
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Round `value` up to a multiple of `alignment` (0 and 1 leave it as is).
pub const fn align64(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// 32-bit variant of [`align64`].
pub const fn align32(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Extent of a dimension at mip `level`, never below 1.
pub const fn minify(value: u32, level: u32) -> u32 {
    if level >= 32 {
        return 1;
    }
    let shifted = value >> level;
    if shifted == 0 {
        1
    } else {
        shifted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiling_mode_ordering() {
        assert!(TilingMode::Linear < TilingMode::Tiled1D);
        assert!(TilingMode::LinearAligned < TilingMode::Tiled1D);
        assert!(TilingMode::Tiled2D > TilingMode::Tiled1D);
    }

    #[test]
    fn test_align() {
        assert_eq!(align64(0, 256), 0);
        assert_eq!(align64(1, 256), 256);
        assert_eq!(align64(4096, 4096), 4096);
        assert_eq!(align64(300, 0), 300);
        assert_eq!(align64(10, 6), 12);
        assert_eq!(align32(17, 8), 24);
    }

    #[test]
    fn test_minify() {
        assert_eq!(minify(256, 0), 256);
        assert_eq!(minify(256, 3), 32);
        assert_eq!(minify(5, 4), 1);
        assert_eq!(minify(1, 40), 1);
    }

    #[test]
    fn test_slices_per_level() {
        let hw = HardwareId::new(8, 130);
        let mut req = SurfaceRequest::new(hw, 64, 64, 4);
        req.is_3d = true;
        req.depth = 16;
        assert_eq!(req.slices_at_level(0), 16);
        assert_eq!(req.slices_at_level(2), 4);
        assert_eq!(req.slices_at_level(9), 1);

        let mut cube = SurfaceRequest::new(hw, 64, 64, 4);
        cube.is_cube = true;
        assert_eq!(cube.slices_at_level(3), CUBE_FACE_COUNT);

        let mut array = SurfaceRequest::new(hw, 64, 64, 4);
        array.array_size = 5;
        assert_eq!(array.slices_at_level(4), 5);
    }

    #[test]
    fn test_color_classification() {
        let hw = HardwareId::new(8, 130);
        let mut req = SurfaceRequest::new(hw, 16, 16, 4);
        assert!(req.is_color());
        req.flags = SurfaceFlags::STENCIL;
        assert!(!req.is_color());
    }

    #[test]
    fn test_micro_tile_field_decode() {
        assert_eq!(
            MicroTileType::from_field(2),
            Some(MicroTileType::DepthSampleOrder)
        );
        assert_eq!(MicroTileType::from_field(4), None);
    }
}
