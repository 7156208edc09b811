//! Tiling Mode Selector
//!
//! Validates a request and resolves the tiling mode, micro tile type and
//! backend flags every later stage works from.

use tracing::trace;

use crate::backend::{SurfaceInfoFlags, TileInfo};
use crate::capabilities::{cik_macro_tile_index, ChipClass, HardwareCaps};
use crate::error::LayoutError;
use crate::surface::{
    MicroTileType, SurfaceFlags, SurfaceRequest, TilingMode, CUBE_FACE_COUNT, SURF_MAX_ARRAY_SIZE,
    SURF_MAX_DIMENSION, SURF_MAX_MIP_LEVELS,
};

/// Result of tiling selection for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingSelection {
    pub tiling: TilingMode,
    pub micro_tile_type: MicroTileType,
    /// Colour compression metadata may be attached to this surface
    pub dcc_compatible: bool,
    /// Backend flags for the primary plane
    pub info_flags: SurfaceInfoFlags,
    pub forced_tile_index: Option<u32>,
    pub macro_mode_index: Option<u32>,
    pub tile_info: Option<TileInfo>,
    /// Tile parameters for the stencil plane, from the preferred stencil split
    pub stencil_tile_info: Option<TileInfo>,
}

/// Reject requests no hardware can lay out.
pub fn validate_request(request: &SurfaceRequest) -> Result<(), LayoutError> {
    if !matches!(request.samples(), 1 | 2 | 4 | 8) {
        return Err(LayoutError::UnsupportedSampleCount(request.sample_count));
    }

    let extents = [request.width, request.height, request.depth];
    let in_bounds = |extent: u32| (1..=SURF_MAX_DIMENSION).contains(&extent);
    let extents_ok = extents.into_iter().all(in_bounds);
    if !extents_ok || !(1..=SURF_MAX_ARRAY_SIZE).contains(&request.array_size) {
        return Err(LayoutError::InvalidDimensions {
            width: request.width,
            height: request.height,
            depth: request.depth,
            array_size: request.array_size,
        });
    }

    if request.mip_level_count == 0 || request.mip_level_count > SURF_MAX_MIP_LEVELS {
        return Err(LayoutError::InvalidMipLevelCount(request.mip_level_count));
    }

    let bpe = request.bytes_per_element;
    let format_ok = match (request.block_width, request.block_height) {
        (1, 1) => bpe.is_power_of_two() && bpe <= 16,
        (4, 4) => matches!(bpe, 8 | 16),
        _ => false,
    };
    if !format_ok {
        return Err(LayoutError::UnsupportedFormat {
            bytes_per_element: request.bytes_per_element,
            block_width: request.block_width,
            block_height: request.block_height,
        });
    }

    let cube_layers_ok = request.array_size == 1 || request.array_size == CUBE_FACE_COUNT;
    let inconsistent = if request.depth > 1 && !request.is_3d {
        Some("depth greater than 1 on a non-3D surface")
    } else if request.is_3d && (request.array_size > 1 || request.is_cube) {
        Some("3D surfaces cannot be arrays or cubes")
    } else if request.is_cube && !cube_layers_ok {
        Some("cube maps take 1 or 6 layers")
    } else {
        None
    };
    if let Some(reason) = inconsistent {
        return Err(LayoutError::InconsistentDimensions(reason));
    }

    let flags = request.flags;
    let fmask = flags.contains(SurfaceFlags::FMASK);
    let depth_or_stencil = flags.intersects(SurfaceFlags::Z_OR_STENCIL);
    let conflict = if fmask && depth_or_stencil {
        Some("fmask with depth or stencil")
    } else if flags.contains(SurfaceFlags::COLOR) && depth_or_stencil {
        Some("colour with depth or stencil")
    } else if fmask && request.preferred_macro_tile.is_some() {
        Some("fmask with preferred macro tile parameters")
    } else {
        None
    };
    if let Some(reason) = conflict {
        return Err(LayoutError::IncompatibleFlagCombination(reason));
    }

    Ok(())
}

/// Tiling mode after hardware policy overrides.
pub fn effective_tiling(request: &SurfaceRequest) -> TilingMode {
    let flags = request.flags;
    let mode = if request.samples() > 1 || flags.contains(SurfaceFlags::FMASK) {
        TilingMode::Tiled2D
    } else if flags.intersects(SurfaceFlags::Z_OR_STENCIL)
        && request.requested_tiling < TilingMode::Tiled1D
    {
        TilingMode::Tiled1D
    } else {
        request.requested_tiling
    };

    // Unaligned linear layouts are not addressable by the tiling hardware.
    if mode == TilingMode::Linear {
        TilingMode::LinearAligned
    } else {
        mode
    }
}

pub fn micro_tile_type(flags: SurfaceFlags) -> MicroTileType {
    if flags.contains(SurfaceFlags::SCANOUT) {
        MicroTileType::Displayable
    } else if flags.intersects(SurfaceFlags::Z_OR_STENCIL | SurfaceFlags::FMASK) {
        MicroTileType::DepthSampleOrder
    } else {
        MicroTileType::NonDisplayable
    }
}

/// Whether colour compression metadata may be attached.
pub fn is_dcc_compatible(request: &SurfaceRequest, caps: &HardwareCaps) -> bool {
    caps.supports_compression()
        && request.is_color()
        && !request.flags.contains(SurfaceFlags::DISABLE_COMPRESSION)
        && !request.is_block_compressed()
        && request.samples() <= 1
        && ((request.layer_count() == 1 && request.depth == 1) || request.mip_level_count == 1)
}

/// Tile-mode index a shared colour surface must use so that every process
/// agrees on its layout.
fn forced_colour_tile_index(chip_class: ChipClass, tile_type: MicroTileType, bpe: u32) -> u32 {
    match (chip_class, tile_type) {
        (ChipClass::Si, MicroTileType::Displayable) if bpe == 2 => 11,
        (ChipClass::Si, MicroTileType::Displayable) => 12,
        (ChipClass::Si, _) => 14 + bpe.trailing_zeros().min(3),
        (_, MicroTileType::Displayable) => 10,
        _ => 14,
    }
}

/// Resolve the tiling of `request` on `caps`.
pub fn select_tiling(
    request: &SurfaceRequest,
    caps: &HardwareCaps,
) -> Result<TilingSelection, LayoutError> {
    let flags = request.flags;
    let tiling = effective_tiling(request);
    let tile_type = micro_tile_type(flags);

    if !caps.supports_tiling(tiling) {
        return Err(LayoutError::UnsupportedTilingMode(tiling));
    }

    let dcc_compatible = is_dcc_compatible(request, caps);
    let preferred = request
        .preferred_macro_tile
        .filter(|_| tiling == TilingMode::Tiled2D);

    let fmask = flags.contains(SurfaceFlags::FMASK);
    let depth_or_stencil = flags.intersects(SurfaceFlags::Z_OR_STENCIL);
    let scanout = flags.contains(SurfaceFlags::SCANOUT);
    let tc_compatible = flags.contains(SurfaceFlags::ZBUFFER | SurfaceFlags::TC_COMPATIBLE_HTILE);

    let mut info_flags = SurfaceInfoFlags::empty();
    info_flags.set(SurfaceInfoFlags::COLOR, request.is_color() && !fmask);
    info_flags.set(SurfaceInfoFlags::DEPTH, depth_or_stencil);
    info_flags.set(SurfaceInfoFlags::FMASK, fmask);
    info_flags.set(SurfaceInfoFlags::CUBE, request.is_cube);
    info_flags.set(SurfaceInfoFlags::DISPLAY, scanout);
    info_flags.set(SurfaceInfoFlags::POW2_PAD, request.mip_level_count > 1);
    info_flags.set(SurfaceInfoFlags::TC_COMPATIBLE, tc_compatible);
    info_flags.set(SurfaceInfoFlags::DCC_COMPATIBLE, dcc_compatible);

    let degrade_for_space = flags.contains(SurfaceFlags::OPTIMIZE_FOR_SPACE)
        && !flags.intersects(SurfaceFlags::TC_COMPATIBLE_HTILE | SurfaceFlags::FMASK)
        && request.samples() <= 1
        && preferred.is_none();
    info_flags.set(
        SurfaceInfoFlags::DEGRADE_FOR_SPACE | SurfaceInfoFlags::OPT_FOR_SPACE,
        degrade_for_space,
    );

    let mut selection = TilingSelection {
        tiling,
        micro_tile_type: tile_type,
        dcc_compatible,
        info_flags,
        forced_tile_index: None,
        macro_mode_index: None,
        tile_info: None,
        stencil_tile_info: None,
    };

    if let Some(preferred) = preferred {
        let tile_info = TileInfo {
            banks: preferred.num_banks,
            bank_width: preferred.bank_width,
            bank_height: preferred.bank_height,
            macro_aspect_ratio: preferred.macro_aspect_ratio,
            tile_split_bytes: preferred.tile_split_bytes,
            pipe_config: preferred.pipe_config,
        };
        selection.tile_info = Some(tile_info);
        selection.stencil_tile_info = Some(TileInfo {
            tile_split_bytes: preferred.stencil_tile_split,
            ..tile_info
        });

        if request.is_color() {
            let bpe = request.bytes_per_element;
            selection.forced_tile_index =
                Some(forced_colour_tile_index(caps.chip_class, tile_type, bpe));
            if caps.chip_class >= ChipClass::Cik {
                selection.macro_mode_index =
                    Some(cik_macro_tile_index(preferred.tile_split_bytes, bpe));
            }
        }
    }

    trace!(
        "Selected {:?} tiling with {:?} micro tiles (dcc compatible: {})",
        selection.tiling,
        selection.micro_tile_type,
        selection.dcc_compatible
    );

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HardwareId, FAMILY_VI, GFX8};
    use crate::surface::PreferredMacroTile;

    fn request() -> SurfaceRequest {
        SurfaceRequest::new(HardwareId::new(GFX8, FAMILY_VI), 256, 256, 4)
    }

    #[test]
    fn test_multisample_forces_2d() {
        let mut req = request();
        req.requested_tiling = TilingMode::Linear;
        req.sample_count = 4;
        assert_eq!(effective_tiling(&req), TilingMode::Tiled2D);
    }

    #[test]
    fn test_depth_rejects_linear() {
        let mut req = request();
        req.flags = SurfaceFlags::ZBUFFER;
        req.requested_tiling = TilingMode::LinearAligned;
        assert_eq!(effective_tiling(&req), TilingMode::Tiled1D);
        assert_eq!(micro_tile_type(req.flags), MicroTileType::DepthSampleOrder);
    }

    #[test]
    fn test_linear_resolves_to_aligned() {
        let mut req = request();
        req.requested_tiling = TilingMode::Linear;
        assert_eq!(effective_tiling(&req), TilingMode::LinearAligned);
    }

    #[test]
    fn test_micro_tile_type_priority() {
        assert_eq!(
            micro_tile_type(SurfaceFlags::SCANOUT | SurfaceFlags::COLOR),
            MicroTileType::Displayable
        );
        let fmask = micro_tile_type(SurfaceFlags::FMASK);
        assert_eq!(fmask, MicroTileType::DepthSampleOrder);
        let colour = micro_tile_type(SurfaceFlags::COLOR);
        assert_eq!(colour, MicroTileType::NonDisplayable);
    }

    #[test]
    fn test_dcc_compatibility() {
        let caps = HardwareCaps::polaris10();
        let mut req = request();
        assert!(is_dcc_compatible(&req, &caps));

        req.array_size = 2;
        assert!(is_dcc_compatible(&req, &caps));
        req.mip_level_count = 4;
        assert!(!is_dcc_compatible(&req, &caps));

        let mut req = request();
        req.flags |= SurfaceFlags::DISABLE_COMPRESSION;
        assert!(!is_dcc_compatible(&req, &caps));

        let mut req = request();
        req.block_width = 4;
        req.block_height = 4;
        req.bytes_per_element = 16;
        assert!(!is_dcc_compatible(&req, &caps));

        assert!(!is_dcc_compatible(&request(), &HardwareCaps::bonaire()));
    }

    #[test]
    fn test_validation_errors() {
        let mut req = request();
        req.sample_count = 3;
        assert_eq!(
            validate_request(&req),
            Err(LayoutError::UnsupportedSampleCount(3))
        );

        let mut req = request();
        req.sample_count = 0;
        assert_eq!(validate_request(&req), Ok(()));

        let mut req = request();
        req.height = 0;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InvalidDimensions { height: 0, .. })
        ));

        let mut req = request();
        req.mip_level_count = 16;
        assert_eq!(
            validate_request(&req),
            Err(LayoutError::InvalidMipLevelCount(16))
        );

        let mut req = request();
        req.bytes_per_element = 3;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::UnsupportedFormat { .. })
        ));

        let mut req = request();
        req.depth = 4;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InconsistentDimensions(_))
        ));

        let mut req = request();
        req.flags = SurfaceFlags::FMASK | SurfaceFlags::ZBUFFER;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::IncompatibleFlagCombination(_))
        ));
    }

    #[test]
    fn test_dimension_limits() {
        let mut req = request();
        req.width = SURF_MAX_DIMENSION;
        req.height = SURF_MAX_DIMENSION;
        assert_eq!(validate_request(&req), Ok(()));

        req.width = SURF_MAX_DIMENSION + 1;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InvalidDimensions { width: 16385, .. })
        ));

        let mut req = request();
        req.height = u32::MAX;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InvalidDimensions { .. })
        ));

        let mut req = request();
        req.is_3d = true;
        req.depth = SURF_MAX_DIMENSION + 1;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InvalidDimensions { .. })
        ));

        let mut req = request();
        req.array_size = SURF_MAX_ARRAY_SIZE;
        assert_eq!(validate_request(&req), Ok(()));
        req.array_size = SURF_MAX_ARRAY_SIZE + 1;
        assert!(matches!(
            validate_request(&req),
            Err(LayoutError::InvalidDimensions { array_size: 2049, .. })
        ));
    }

    #[test]
    fn test_missing_tile_mode_entry() {
        let mut caps = HardwareCaps::polaris10();
        for reg in caps.tile_mode_array.iter_mut().filter(|reg| (**reg >> 2) & 0xF == 2) {
            *reg = 0;
        }
        let mut req = request();
        req.requested_tiling = TilingMode::Tiled1D;
        assert_eq!(
            select_tiling(&req, &caps),
            Err(LayoutError::UnsupportedTilingMode(TilingMode::Tiled1D))
        );
    }

    #[test]
    fn test_preferred_colour_forces_tile_index() {
        let preferred = PreferredMacroTile {
            num_banks: 16,
            bank_width: 1,
            bank_height: 1,
            macro_aspect_ratio: 2,
            tile_split_bytes: 512,
            stencil_tile_split: 64,
            pipe_config: 12,
        };
        let mut req = request();
        req.preferred_macro_tile = Some(preferred);
        req.flags |= SurfaceFlags::OPTIMIZE_FOR_SPACE;
        let selection = select_tiling(&req, &HardwareCaps::polaris10()).unwrap();
        assert_eq!(selection.forced_tile_index, Some(14));
        assert_eq!(selection.macro_mode_index, Some(2));
        let flags = selection.info_flags;
        assert!(!flags.contains(SurfaceInfoFlags::DEGRADE_FOR_SPACE));
        assert_eq!(selection.stencil_tile_info.unwrap().tile_split_bytes, 64);

        let mut scanout = req.clone();
        scanout.hardware = HardwareId::new(6, 110);
        scanout.flags |= SurfaceFlags::SCANOUT;
        let selection = select_tiling(&scanout, &HardwareCaps::tahiti()).unwrap();
        assert_eq!(selection.forced_tile_index, Some(12));
        assert_eq!(selection.macro_mode_index, None);
    }

    #[test]
    fn test_preferred_ignored_below_2d() {
        let mut req = request();
        req.requested_tiling = TilingMode::Tiled1D;
        req.preferred_macro_tile = Some(PreferredMacroTile {
            num_banks: 16,
            bank_width: 1,
            bank_height: 1,
            macro_aspect_ratio: 2,
            tile_split_bytes: 512,
            stencil_tile_split: 64,
            pipe_config: 12,
        });
        let selection = select_tiling(&req, &HardwareCaps::polaris10()).unwrap();
        assert!(selection.tile_info.is_none());
        assert!(selection.forced_tile_index.is_none());
    }
}
