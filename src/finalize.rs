//! Aggregate Finalizer
//!
//! Turns the computed planes and metadata into the immutable
//! [`SurfaceLayout`], applying the miptree-wide metadata corrections.

use crate::capabilities::HardwareCaps;
use crate::error::{LayoutError, TilingError};
use crate::level::ComputedPlane;
use crate::surface::{
    align64, AuxMetadata, CompressionMetadata, MacroTileParams, MicroTileType, StencilPlane,
    SurfaceLayout, TileConfig, TilingMode, DCC_BLOCK_SHIFT,
};

/// Inputs of the final stage.
#[derive(Debug)]
pub struct FinalizeInputs {
    pub effective_tiling: TilingMode,
    pub micro_tile_type: MicroTileType,
    pub mip_level_count: u32,
    pub primary: ComputedPlane,
    pub stencil: Option<ComputedPlane>,
    pub compression: Option<CompressionMetadata>,
    pub aux: Option<AuxMetadata>,
}

/// Size of the whole compression miptree, derived from the plane size
/// alone the way the hardware expects it.
pub fn miptree_compression_size(total_size: u64, caps: &HardwareCaps) -> u64 {
    let alignment = u64::from(caps.pipe_interleave_bytes) * u64::from(caps.num_tile_pipes);
    align64(total_size >> DCC_BLOCK_SHIFT, alignment)
}

pub fn finalize(caps: &HardwareCaps, inputs: FinalizeInputs) -> Result<SurfaceLayout, LayoutError> {
    let FinalizeInputs {
        effective_tiling,
        micro_tile_type,
        mip_level_count,
        primary,
        stencil,
        mut compression,
        mut aux,
    } = inputs;

    let base = *primary
        .outputs
        .first()
        .ok_or(LayoutError::InvalidMipLevelCount(mip_level_count))?;

    if mip_level_count > 1 {
        if let Some(metadata) = compression.as_mut() {
            metadata.size = miptree_compression_size(primary.total_size, caps);
        }
        // The TC-compatible read path addresses every level at full size.
        if let Some(metadata) = aux.as_mut() {
            metadata.size *= 2;
        }
    }

    let tile_config = if base.tile_mode == TilingMode::Tiled2D {
        TileConfig::MacroTiled(MacroTileParams {
            num_banks: base.tile_info.banks,
            bank_width: base.tile_info.bank_width,
            bank_height: base.tile_info.bank_height,
            macro_aspect_ratio: base.tile_info.macro_aspect_ratio,
            tile_split_bytes: base.tile_info.tile_split_bytes,
            macro_tile_index: base.macro_mode_index,
        })
    } else {
        TileConfig::MicroTiled
    };

    let micro_tile_mode = caps
        .micro_tile_mode(base.tile_index)
        .ok_or(TilingError::InvalidTileIndex(base.tile_index))?;

    let (stencil, stencil_adjusted) = match stencil {
        Some(plane) => {
            let adjusted = plane
                .levels
                .iter()
                .zip(&primary.levels)
                .any(|(stencil, depth)| stencil.width_in_blocks != depth.width_in_blocks);
            let tile_split_bytes = plane
                .outputs
                .first()
                .filter(|out| out.tile_mode == TilingMode::Tiled2D)
                .map(|out| out.tile_info.tile_split_bytes);
            let plane = StencilPlane {
                levels: plane.levels,
                size: plane.total_size,
                alignment: plane.base_alignment,
                tile_split_bytes,
            };
            (Some(plane), adjusted)
        }
        None => (None, false),
    };

    let is_purely_linear = primary
        .levels
        .first()
        .is_some_and(|level| level.tiling_mode == TilingMode::LinearAligned);

    Ok(SurfaceLayout {
        effective_tiling,
        micro_tile_type,
        micro_tile_mode,
        pipe_config: base.tile_info.pipe_config,
        tile_config,
        levels: primary.levels,
        stencil,
        stencil_adjusted,
        total_size: primary.total_size,
        base_alignment: primary.base_alignment,
        compression,
        aux,
        is_purely_linear,
    })
}
