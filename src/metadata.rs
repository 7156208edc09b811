//! Auxiliary Metadata Sizer
//!
//! Attaches fast-clear colour compression (DCC) to the leading levels of a
//! colour surface and sizes hierarchical depth (HTILE) metadata from the
//! base level of a depth surface. Both are optional: a backend failure
//! leaves the metadata absent instead of failing the layout.

use tracing::{debug, warn};

use crate::backend::{CompressionInputs, HtileInputs, LevelBackendOutput, TilingBackend};
use crate::surface::{
    AuxMetadata, CompressionMetadata, LevelLayout, SurfaceFlags, SurfaceRequest, TilingMode,
    HTILE_BLOCK_SIZE,
};

/// Running state of the per-level compression chain.
#[derive(Debug, Clone)]
pub struct CompressionTracker {
    enabled: bool,
    /// The next level may join the chain
    next_eligible: bool,
    running_size: u64,
    alignment: u64,
    levels_enabled_count: u32,
}

impl CompressionTracker {
    pub fn new(dcc_compatible: bool) -> Self {
        Self {
            enabled: dcc_compatible,
            next_eligible: true,
            running_size: 0,
            alignment: 1,
            levels_enabled_count: 0,
        }
    }

    /// Query compression for one freshly placed level and record it in
    /// `layout` when the level joins the chain.
    pub fn annotate(
        &mut self,
        backend: &dyn TilingBackend,
        request: &SurfaceRequest,
        level: u32,
        output: &LevelBackendOutput,
        layout: &mut LevelLayout,
    ) {
        if !self.enabled || !self.next_eligible {
            return;
        }
        // Levels join only as a contiguous run from the base level.
        self.next_eligible = false;

        let inputs = CompressionInputs {
            color_surface_size: output.surface_size,
            bits_per_pixel: request.bytes_per_element * 8,
            num_samples: request.samples(),
            tile_mode: output.tile_mode,
            tile_info: output.tile_info,
            tile_index: output.tile_index,
            macro_mode_index: output.macro_mode_index,
        };

        match backend.compute_compression_info(&inputs) {
            Ok(info) => {
                layout.compression_offset = Some(self.running_size);
                layout.compression_fast_clear_size = Some(info.fast_clear_size);
                self.running_size += info.ram_size;
                self.alignment = self.alignment.max(info.ram_base_align);
                self.levels_enabled_count = level + 1;
                self.next_eligible = info.sub_level_compressible;
                debug!(
                    "Level {} compressed: ram {:#x}, fast clear {:#x}",
                    level, info.ram_size, info.fast_clear_size
                );
            }
            Err(err) => {
                debug!("Compression unavailable from level {}: {}", level, err);
            }
        }
    }

    pub fn levels_enabled_count(&self) -> u32 {
        self.levels_enabled_count
    }

    /// Compression metadata summed over the enabled levels, if any.
    pub fn finish(self) -> Option<CompressionMetadata> {
        (self.levels_enabled_count > 0).then_some(CompressionMetadata {
            size: self.running_size,
            alignment: self.alignment,
            levels_enabled_count: self.levels_enabled_count,
        })
    }
}

/// Whether hierarchical depth metadata applies to a base level.
pub fn htile_eligible(request: &SurfaceRequest, base: &LevelBackendOutput) -> bool {
    request
        .flags
        .contains(SurfaceFlags::ZBUFFER | SurfaceFlags::TC_COMPATIBLE_HTILE)
        && base.tile_mode == TilingMode::Tiled2D
}

/// Size hierarchical depth metadata from the base level of the depth plane.
pub fn size_hierarchical_metadata(
    backend: &dyn TilingBackend,
    request: &SurfaceRequest,
    base: &LevelBackendOutput,
) -> Option<AuxMetadata> {
    if !htile_eligible(request, base) {
        return None;
    }

    let inputs = HtileInputs {
        pitch: base.pitch,
        height: base.height,
        num_slices: base.depth,
        block_width: HTILE_BLOCK_SIZE,
        block_height: HTILE_BLOCK_SIZE,
        tc_compatible: true,
        tile_mode: base.tile_mode,
        tile_info: base.tile_info,
        tile_index: base.tile_index,
        macro_mode_index: base.macro_mode_index,
    };

    match backend.compute_hierarchical_metadata_info(&inputs) {
        Ok(info) if info.htile_bytes > 0 => Some(AuxMetadata {
            size: info.htile_bytes,
            alignment: info.base_align,
            slice_size: info.slice_size,
        }),
        Ok(_) => None,
        Err(err) => {
            warn!("Hierarchical depth metadata disabled: {}", err);
            None
        }
    }
}
