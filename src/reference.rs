//! Reference Tiling Backend
//!
//! Deterministic model of the GCN (SI/CIK/VI) address library, driven only
//! by the tile-mode registers in [`HardwareCaps`]. It reproduces the pitch,
//! alignment and metadata rules the layout engine relies on; exact swizzle
//! equations are out of its reach.

use tracing::trace;

use crate::backend::{
    AuxBackendOutput, CompressionBackendOutput, CompressionInputs, HtileInputs, LevelBackendOutput,
    LevelInputs, SurfaceInfoFlags, TileInfo, TilingBackend,
};
use crate::capabilities::{
    cik_macro_tile_index, pipe_count, ChipClass, HardwareCaps, TileModeEntry,
};
use crate::error::TilingError;
use crate::surface::{
    align32, align64, MicroTileType, TilingMode, DCC_BLOCK_SHIFT, SURF_MAX_DIMENSION,
};

/// Micro tiles are 8x8 elements.
const MICRO_TILE_DIM: u32 = 8;

/// Smallest pitch alignment of a linear surface, in bytes.
const LINEAR_PITCH_ALIGN_BYTES: u32 = 256;

/// Base alignment of linear and 1D surfaces.
const MIN_BASE_ALIGN: u64 = 256;

/// Hierarchical depth stores 4 bytes per 8x8 block.
const HTILE_BYTES_PER_BLOCK: u64 = 4;

/// Element extents of one level after block conversion and padding.
#[derive(Debug, Clone, Copy)]
struct LevelExtent {
    width: u32,
    height: u32,
    bpe: u32,
    samples: u32,
    slices: u32,
}

/// Backend computing layouts from a capability entry's register tables.
#[derive(Debug, Clone)]
pub struct ReferenceBackend {
    caps: HardwareCaps,
}

impl ReferenceBackend {
    pub fn new(caps: HardwareCaps) -> Self {
        Self { caps }
    }

    pub fn caps(&self) -> &HardwareCaps {
        &self.caps
    }

    /// Pick the tile-mode table entry for `mode`.
    ///
    /// A forced index wins as long as it implements `mode`; otherwise the
    /// entries matching the micro tile type are ranked by element size.
    fn select_entry(
        &self,
        mode: TilingMode,
        tile_type: MicroTileType,
        forced: Option<u32>,
        bpe: u32,
    ) -> Result<(u32, TileModeEntry), TilingError> {
        if let Some(index) = forced {
            let entry = self
                .caps
                .tile_mode(index)
                .ok_or(TilingError::InvalidTileIndex(index))?;
            if entry.tile_mode == mode {
                return Ok((index, entry));
            }
        }

        let candidates = self.caps.tile_mode_candidates(mode, tile_type);
        let last = candidates.len().saturating_sub(1);
        let rank = (bpe.trailing_zeros() as usize).min(last);
        let index = *candidates
            .get(rank)
            .ok_or(TilingError::NoTileModeEntry { mode, tile_type })?;
        let entry = self
            .caps
            .tile_mode(index)
            .ok_or(TilingError::InvalidTileIndex(index))?;
        Ok((index, entry))
    }

    /// Bank parameters for a 2D entry from the register tables.
    fn table_tile_info(
        &self,
        entry: &TileModeEntry,
        tile_split: u32,
        bpe: u32,
        macro_index: Option<u32>,
    ) -> Result<(u32, TileInfo), TilingError> {
        if let Some(banks) = entry.banks {
            return Ok((0, banks.with_split(tile_split, entry.pipe_config)));
        }
        let index = match macro_index {
            Some(index) => index,
            None => cik_macro_tile_index(tile_split, bpe),
        };
        let banks = self
            .caps
            .macro_tile_mode(index)
            .ok_or(TilingError::InvalidTileIndex(index))?;
        Ok((index, banks.with_split(tile_split, entry.pipe_config)))
    }

    fn linear_level(
        &self,
        inputs: &LevelInputs,
        extent: &LevelExtent,
    ) -> Result<LevelBackendOutput, TilingError> {
        let (index, entry) = self.select_entry(
            TilingMode::LinearAligned,
            inputs.tile_type,
            inputs.tile_index,
            extent.bpe,
        )?;

        let (block_width, _) = inputs.format.block_dims();
        let base_pitch = (inputs.base_pitch / block_width)
            .checked_shr(inputs.mip_level)
            .unwrap_or(0);
        let pitch_align = (LINEAR_PITCH_ALIGN_BYTES / extent.bpe).max(64);
        let pitch = align32(extent.width.max(base_pitch), pitch_align);

        let tile_info = TileInfo {
            tile_split_bytes: entry.tile_split_bytes,
            pipe_config: entry.pipe_config,
            ..TileInfo::default()
        };
        Ok(finish_level(
            extent,
            pitch,
            extent.height,
            MIN_BASE_ALIGN,
            TilingMode::LinearAligned,
            index,
            0,
            tile_info,
        ))
    }

    fn micro_tiled_level(
        &self,
        inputs: &LevelInputs,
        extent: &LevelExtent,
        forced: Option<u32>,
    ) -> Result<LevelBackendOutput, TilingError> {
        let (index, entry) =
            self.select_entry(TilingMode::Tiled1D, inputs.tile_type, forced, extent.bpe)?;

        let pitch = align32(extent.width, MICRO_TILE_DIM);
        let height = align32(extent.height, MICRO_TILE_DIM);
        let tile_elements = MICRO_TILE_DIM * MICRO_TILE_DIM * extent.samples;
        let micro_tile_bytes = u64::from(tile_elements * extent.bpe);

        let tile_info = TileInfo {
            tile_split_bytes: entry.tile_split_bytes,
            pipe_config: entry.pipe_config,
            ..TileInfo::default()
        };
        Ok(finish_level(
            extent,
            pitch,
            height,
            micro_tile_bytes.max(MIN_BASE_ALIGN),
            TilingMode::Tiled1D,
            index,
            0,
            tile_info,
        ))
    }

    fn macro_tiled_level(
        &self,
        inputs: &LevelInputs,
        extent: &LevelExtent,
    ) -> Result<LevelBackendOutput, TilingError> {
        let bpe = extent.bpe;
        let (index, entry) = self.select_entry(
            TilingMode::Tiled2D,
            inputs.tile_type,
            inputs.tile_index,
            bpe,
        )?;

        let tile_split = if entry.tile_type == MicroTileType::DepthSampleOrder {
            entry.tile_split_bytes
        } else {
            (64 * bpe * entry.sample_split).clamp(64, 4096)
        };

        let (macro_index, tile_info) = match inputs.tile_info {
            Some(info) if self.caps.chip_class == ChipClass::Si => (0, info),
            Some(info) => (
                inputs
                    .macro_mode_index
                    .unwrap_or_else(|| cik_macro_tile_index(info.tile_split_bytes, bpe)),
                info,
            ),
            None => self.table_tile_info(&entry, tile_split, bpe, inputs.macro_mode_index)?,
        };
        check_tile_info(&tile_info)?;

        let pipes = pipe_count(tile_info.pipe_config);
        let macro_width =
            MICRO_TILE_DIM * tile_info.bank_width * pipes * tile_info.macro_aspect_ratio;
        let bank_rows = MICRO_TILE_DIM * tile_info.bank_height * tile_info.banks;
        let macro_height = (bank_rows / tile_info.macro_aspect_ratio).max(MICRO_TILE_DIM);

        if extent.width < macro_width || extent.height < macro_height {
            trace!(
                "Level {} ({}x{}) is smaller than a {}x{} macro tile, using 1D",
                inputs.mip_level,
                extent.width,
                extent.height,
                macro_width,
                macro_height
            );
            return self.micro_tiled_level(inputs, extent, None);
        }

        let pitch = align32(extent.width, macro_width);
        let height = align32(extent.height, macro_height);

        let space_flags = SurfaceInfoFlags::DEGRADE_FOR_SPACE | SurfaceInfoFlags::OPT_FOR_SPACE;
        if inputs.flags.intersects(space_flags) {
            let size_2d = u64::from(pitch) * u64::from(height);
            let size_1d = u64::from(align32(extent.width, MICRO_TILE_DIM))
                * u64::from(align32(extent.height, MICRO_TILE_DIM));
            if size_2d * 2 > size_1d * 3 {
                trace!(
                    "Level {} wastes too much space in 2D, using 1D",
                    inputs.mip_level
                );
                return self.micro_tiled_level(inputs, extent, None);
            }
        }

        let tile_bytes = MICRO_TILE_DIM * MICRO_TILE_DIM * bpe * extent.samples;
        let base_align = u64::from(pipes)
            * u64::from(tile_info.bank_width)
            * u64::from(tile_info.banks)
            * u64::from(tile_info.bank_height)
            * u64::from(tile_bytes.min(tile_info.tile_split_bytes));

        Ok(finish_level(
            extent,
            pitch,
            height,
            base_align,
            TilingMode::Tiled2D,
            index,
            macro_index,
            tile_info,
        ))
    }
}

impl TilingBackend for ReferenceBackend {
    fn compute_level_geometry(
        &self,
        inputs: &LevelInputs,
    ) -> Result<LevelBackendOutput, TilingError> {
        if inputs.width == 0 || inputs.height == 0 || inputs.num_slices == 0 {
            return Err(TilingError::InvalidParams("zero level extent"));
        }
        if inputs.width > SURF_MAX_DIMENSION || inputs.height > SURF_MAX_DIMENSION {
            return Err(TilingError::InvalidParams("level extent too large"));
        }
        let bpe = inputs.format.bytes_per_element();
        if bpe == 0 || !bpe.is_power_of_two() {
            return Err(TilingError::InvalidParams("non-power-of-two element size"));
        }

        let (block_width, block_height) = inputs.format.block_dims();
        let mut width = inputs.width.div_ceil(block_width);
        let mut height = inputs.height.div_ceil(block_height);
        if inputs.mip_level > 0 && inputs.flags.contains(SurfaceInfoFlags::POW2_PAD) {
            width = width.next_power_of_two();
            height = height.next_power_of_two();
        }

        let extent = LevelExtent {
            width,
            height,
            bpe,
            samples: inputs.num_samples.max(1),
            slices: inputs.num_slices,
        };

        match inputs.tile_mode {
            TilingMode::Linear | TilingMode::LinearAligned => self.linear_level(inputs, &extent),
            TilingMode::Tiled1D => self.micro_tiled_level(inputs, &extent, inputs.tile_index),
            TilingMode::Tiled2D => self.macro_tiled_level(inputs, &extent),
        }
    }

    fn compute_compression_info(
        &self,
        inputs: &CompressionInputs,
    ) -> Result<CompressionBackendOutput, TilingError> {
        if inputs.tile_mode < TilingMode::Tiled1D {
            return Err(TilingError::NotSupported("compression of a linear surface"));
        }
        if inputs.num_samples > 1 {
            return Err(TilingError::NotSupported("multisampled compression"));
        }

        let ram_base_align =
            u64::from(self.caps.pipe_interleave_bytes) * u64::from(self.caps.num_tile_pipes);
        let ram = inputs.color_surface_size >> DCC_BLOCK_SHIFT;
        let sub_level_compressible = ram % ram_base_align == 0;

        Ok(CompressionBackendOutput {
            fast_clear_size: if sub_level_compressible { ram } else { 0 },
            ram_size: align64(ram, ram_base_align),
            ram_base_align,
            sub_level_compressible,
        })
    }

    fn compute_hierarchical_metadata_info(
        &self,
        inputs: &HtileInputs,
    ) -> Result<AuxBackendOutput, TilingError> {
        if inputs.tile_mode != TilingMode::Tiled2D {
            return Err(TilingError::NotSupported("HTILE without 2D tiling"));
        }
        if inputs.block_width == 0 || inputs.block_height == 0 {
            return Err(TilingError::InvalidParams("zero hierarchical depth block"));
        }

        let pipes = self.caps.num_tile_pipes;
        let pitch = align32(inputs.pitch, 64 * pipes);
        let height = align32(inputs.height, 64);
        let slice_size = u64::from(pitch / inputs.block_width)
            * u64::from(height / inputs.block_height)
            * HTILE_BYTES_PER_BLOCK;
        let base_align = u64::from(self.caps.pipe_interleave_bytes) * u64::from(pipes);
        let slices = u64::from(inputs.num_slices.max(1));

        Ok(AuxBackendOutput {
            htile_bytes: align64(slice_size * slices, base_align),
            slice_size,
            base_align,
        })
    }
}

fn in_range(value: u32, min: u32, max: u32) -> bool {
    value.is_power_of_two() && (min..=max).contains(&value)
}

fn check_tile_info(info: &TileInfo) -> Result<(), TilingError> {
    if in_range(info.banks, 2, 16)
        && in_range(info.bank_width, 1, 8)
        && in_range(info.bank_height, 1, 8)
        && in_range(info.macro_aspect_ratio, 1, 8)
        && in_range(info.tile_split_bytes, 64, 4096)
    {
        Ok(())
    } else {
        Err(TilingError::InvalidParams("tile info out of range"))
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_level(
    extent: &LevelExtent,
    pitch: u32,
    height: u32,
    base_align: u64,
    tile_mode: TilingMode,
    tile_index: u32,
    macro_mode_index: u32,
    tile_info: TileInfo,
) -> LevelBackendOutput {
    let slice_size =
        u64::from(pitch) * u64::from(height) * u64::from(extent.bpe) * u64::from(extent.samples);
    LevelBackendOutput {
        pitch,
        height,
        depth: extent.slices,
        surface_size: slice_size * u64::from(extent.slices),
        slice_size,
        base_align,
        tile_mode,
        tile_index,
        macro_mode_index,
        tile_info,
    }
}
