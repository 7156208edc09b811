//! Level Geometry Calculator
//!
//! Walks the mip chain of one plane, asks the backend for each level's
//! geometry and places the level after the previous one at the alignment
//! the backend requires.

use tracing::debug;

use crate::backend::{
    ElementFormat, LevelBackendOutput, LevelInputs, SurfaceInfoFlags, TileInfo, TilingBackend,
};
use crate::error::LayoutError;
use crate::surface::{align64, minify, LevelLayout, MicroTileType, SurfaceRequest, TilingMode};
use crate::tiling::TilingSelection;

/// Which plane of a surface is being laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    /// Colour or depth data
    Primary,
    /// Separate 8-bit stencil plane of a depth/stencil surface
    Stencil,
}

/// Geometry of one level before it is committed to the plane.
#[derive(Debug, Clone, Copy)]
pub struct PendingLevel {
    pub level: u32,
    pub layout: LevelLayout,
    pub output: LevelBackendOutput,
}

/// Finished plane: levels in mip order plus the backend outputs they came from.
#[derive(Debug, Clone)]
pub struct ComputedPlane {
    pub kind: PlaneKind,
    pub levels: Vec<LevelLayout>,
    pub outputs: Vec<LevelBackendOutput>,
    pub total_size: u64,
    pub base_alignment: u64,
}

/// Accumulates the levels of one plane.
#[derive(Debug)]
pub struct PlaneBuilder<'a> {
    request: &'a SurfaceRequest,
    kind: PlaneKind,
    tiling: TilingMode,
    tile_type: MicroTileType,
    format: ElementFormat,
    flags: SurfaceInfoFlags,
    tile_index: Option<u32>,
    macro_mode_index: Option<u32>,
    tile_info: Option<TileInfo>,
    levels: Vec<LevelLayout>,
    outputs: Vec<LevelBackendOutput>,
    total_size: u64,
    base_alignment: u64,
}

impl<'a> PlaneBuilder<'a> {
    pub fn new(request: &'a SurfaceRequest, selection: &TilingSelection, kind: PlaneKind) -> Self {
        let capacity = request.mip_level_count as usize;
        let (format, flags, tile_index, macro_mode_index, tile_info) = match kind {
            PlaneKind::Primary => (
                element_format(request),
                selection.info_flags,
                selection.forced_tile_index,
                selection.macro_mode_index,
                selection.tile_info,
            ),
            PlaneKind::Stencil => {
                let mut flags = selection.info_flags;
                flags.remove(
                    SurfaceInfoFlags::DEPTH
                        | SurfaceInfoFlags::TC_COMPATIBLE
                        | SurfaceInfoFlags::DCC_COMPATIBLE,
                );
                flags.insert(SurfaceInfoFlags::STENCIL);
                (
                    ElementFormat::Bits(8),
                    flags,
                    None,
                    None,
                    selection.stencil_tile_info,
                )
            }
        };

        Self {
            request,
            kind,
            tiling: selection.tiling,
            tile_type: selection.micro_tile_type,
            format,
            flags,
            tile_index,
            macro_mode_index,
            tile_info,
            levels: Vec::with_capacity(capacity),
            outputs: Vec::with_capacity(capacity),
            total_size: 0,
            base_alignment: 0,
        }
    }

    pub fn kind(&self) -> PlaneKind {
        self.kind
    }

    /// Backend inputs for mip `level`.
    pub fn level_inputs(&self, level: u32) -> LevelInputs {
        let request = self.request;
        // Later levels continue from the base pitch, converted back to pixels.
        let (block_width, _) = self.format.block_dims();
        let base_pitch = match self.levels.first() {
            Some(base) if level > 0 => base.width_in_blocks.saturating_mul(block_width),
            _ => 0,
        };

        LevelInputs {
            tile_mode: self.tiling,
            tile_type: self.tile_type,
            format: self.format,
            num_samples: request.samples(),
            mip_level: level,
            width: minify(request.width, level),
            height: minify(request.height, level),
            num_slices: request.slices_at_level(level),
            base_pitch,
            flags: self.flags,
            tile_index: self.tile_index,
            tile_info: self.tile_info,
            macro_mode_index: self.macro_mode_index,
        }
    }

    /// Compute and place the next level. The level is not part of the plane
    /// until it is passed to [`PlaneBuilder::push`].
    pub fn compute_level(
        &mut self,
        backend: &dyn TilingBackend,
    ) -> Result<PendingLevel, LayoutError> {
        let level = self.levels.len() as u32;
        let inputs = self.level_inputs(level);
        let output = backend.compute_level_geometry(&inputs)?;

        let offset = align64(self.total_size, output.base_align);
        self.total_size = offset + output.surface_size;
        self.base_alignment = self.base_alignment.max(output.base_align);

        debug!(
            "{:?} level {}: {}x{} blocks x{}, {:?} tile {}, offset {:#x} size {:#x}",
            self.kind,
            level,
            output.pitch,
            output.height,
            output.depth,
            output.tile_mode,
            output.tile_index,
            offset,
            output.surface_size
        );

        Ok(PendingLevel {
            level,
            layout: LevelLayout {
                offset,
                size: output.surface_size,
                slice_size: output.slice_size,
                alignment: output.base_align,
                width_in_blocks: output.pitch,
                height_in_blocks: output.height,
                num_slices: output.depth,
                tiling_mode: output.tile_mode,
                tile_index: output.tile_index,
                compression_offset: None,
                compression_fast_clear_size: None,
            },
            output,
        })
    }

    pub fn push(&mut self, pending: PendingLevel) {
        self.levels.push(pending.layout);
        self.outputs.push(pending.output);
    }

    pub fn is_complete(&self) -> bool {
        self.levels.len() as u32 >= self.request.mip_level_count
    }

    pub fn finish(self) -> ComputedPlane {
        ComputedPlane {
            kind: self.kind,
            levels: self.levels,
            outputs: self.outputs,
            total_size: self.total_size,
            base_alignment: self.base_alignment,
        }
    }
}

/// Backend element format of the request's primary plane.
pub fn element_format(request: &SurfaceRequest) -> ElementFormat {
    match (request.is_block_compressed(), request.bytes_per_element) {
        (true, 8) => ElementFormat::Bc1,
        (true, _) => ElementFormat::Bc3,
        (false, bpe) => ElementFormat::Bits(bpe * 8),
    }
}

/// Lay out every level of a plane with no metadata attached.
pub fn compute_plane(
    backend: &dyn TilingBackend,
    request: &SurfaceRequest,
    selection: &TilingSelection,
    kind: PlaneKind,
) -> Result<ComputedPlane, LayoutError> {
    let mut builder = PlaneBuilder::new(request, selection, kind);
    while !builder.is_complete() {
        let pending = builder.compute_level(backend)?;
        builder.push(pending);
    }
    Ok(builder.finish())
}
