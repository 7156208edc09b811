//! Layout Engine
//!
//! Runs the pipeline: capability lookup, tiling selection, the level loop
//! of the primary plane with its metadata, the stencil plane, and the final
//! aggregate pass. Every call is independent; the engine only reads its
//! provider.

use tracing::debug;

use crate::capabilities::CapabilityProvider;
use crate::error::LayoutError;
use crate::finalize::{finalize, FinalizeInputs};
use crate::level::{compute_plane, PlaneBuilder, PlaneKind};
use crate::metadata::{size_hierarchical_metadata, CompressionTracker};
use crate::surface::{SurfaceFlags, SurfaceLayout, SurfaceRequest};
use crate::tiling::{select_tiling, validate_request};

/// Layout engine bound to a capability provider.
///
/// The engine is `Sync` whenever its provider is, so one instance can be
/// shared by any number of threads.
#[derive(Debug, Clone)]
pub struct SurfaceEngine<P> {
    provider: P,
}

impl<P: CapabilityProvider> SurfaceEngine<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Compute the complete memory layout of `request`.
    pub fn compute_layout(&self, request: &SurfaceRequest) -> Result<SurfaceLayout, LayoutError> {
        compute_layout(&self.provider, request)
    }
}

/// Compute the complete memory layout of `request` using `provider`.
pub fn compute_layout<P: CapabilityProvider + ?Sized>(
    provider: &P,
    request: &SurfaceRequest,
) -> Result<SurfaceLayout, LayoutError> {
    validate_request(request)?;

    let unknown = LayoutError::UnknownHardwareFamily {
        generation: request.hardware.generation,
        family: request.hardware.family,
    };
    let hardware = provider.resolve(request.hardware).ok_or(unknown)?;
    let caps = hardware.caps;
    let backend = hardware.backend;

    let selection = select_tiling(request, caps)?;
    debug!(
        "Laying out {}x{}x{} surface ({} layers, {} levels, {} samples) on {} as {:?}",
        request.width,
        request.height,
        request.depth,
        request.layer_count(),
        request.mip_level_count,
        request.samples(),
        caps.name,
        selection.tiling
    );

    // Primary plane, with metadata attached level by level.
    let mut plane = PlaneBuilder::new(request, &selection, PlaneKind::Primary);
    let mut compression = CompressionTracker::new(selection.dcc_compatible);
    let mut aux = None;
    while !plane.is_complete() {
        let mut pending = plane.compute_level(backend)?;
        let level = pending.level;
        compression.annotate(
            backend,
            request,
            level,
            &pending.output,
            &mut pending.layout,
        );
        if level == 0 {
            aux = size_hierarchical_metadata(backend, request, &pending.output);
        }
        plane.push(pending);
    }
    let primary = plane.finish();

    let stencil = if request.flags.contains(SurfaceFlags::STENCIL) {
        let plane = compute_plane(backend, request, &selection, PlaneKind::Stencil)?;
        Some(plane)
    } else {
        None
    };

    let layout = finalize(
        caps,
        FinalizeInputs {
            effective_tiling: selection.tiling,
            micro_tile_type: selection.micro_tile_type,
            mip_level_count: request.mip_level_count,
            primary,
            stencil,
            compression: compression.finish(),
            aux,
        },
    )?;

    debug!(
        "Surface layout: {:#x} bytes, alignment {:#x}, compression {:?}, htile {:?}",
        layout.total_size(),
        layout.base_alignment(),
        layout.compression_metadata().map(|c| c.size),
        layout.aux_metadata().map(|a| a.size)
    );

    Ok(layout)
}
