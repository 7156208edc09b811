//! Invariants checked over a sweep of requests on every preset.

mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use pvgpu_surface::{
    CapabilityTable, LevelLayout, SurfaceEngine, SurfaceFlags, SurfaceLayout, SurfaceRequest,
    TilingMode,
};

const SIZES: [(u32, u32); 6] = [
    (1, 1),
    (17, 9),
    (64, 64),
    (300, 200),
    (1024, 768),
    (4096, 16),
];
const ELEMENT_SIZES: [u32; 5] = [1, 2, 4, 8, 16];
const TILINGS: [TilingMode; 4] = [
    TilingMode::Linear,
    TilingMode::LinearAligned,
    TilingMode::Tiled1D,
    TilingMode::Tiled2D,
];

fn colour_sweep() -> Vec<SurfaceRequest> {
    let mut requests = Vec::new();
    for hardware in ALL_HARDWARE {
        for (width, height) in SIZES {
            for bpe in ELEMENT_SIZES {
                for tiling in TILINGS {
                    for mips in [1, full_chain(width, height)] {
                        for flags in [
                            SurfaceFlags::COLOR,
                            SurfaceFlags::COLOR | SurfaceFlags::SCANOUT,
                            SurfaceFlags::COLOR | SurfaceFlags::OPTIMIZE_FOR_SPACE,
                        ] {
                            let mut request = colour(hardware, width, height, bpe);
                            request.requested_tiling = tiling;
                            request.mip_level_count = mips;
                            request.flags = flags;
                            requests.push(request);
                        }
                    }
                }
            }
        }
    }
    requests
}

fn depth_sweep() -> Vec<SurfaceRequest> {
    let mut requests = Vec::new();
    for hardware in ALL_HARDWARE {
        for (width, height) in SIZES {
            for tiling in TILINGS {
                for mips in [1, full_chain(width, height)] {
                    let mut request = depth_stencil(hardware, width, height);
                    request.requested_tiling = tiling;
                    request.mip_level_count = mips;
                    request.flags |= SurfaceFlags::TC_COMPATIBLE_HTILE;
                    requests.push(request);
                }
            }
        }
    }
    requests
}

fn check_plane(levels: &[LevelLayout]) {
    for level in levels {
        assert_eq!(level.offset % level.alignment, 0, "{level:?}");
        assert!(level.size >= level.slice_size);
    }
    for pair in levels.windows(2) {
        assert!(pair[0].offset + pair[0].size <= pair[1].offset);
    }
}

fn check_layout(request: &SurfaceRequest, layout: &SurfaceLayout) {
    let levels = layout.levels();
    assert_eq!(levels.len() as u32, request.mip_level_count);
    check_plane(levels);

    let last = levels.last().unwrap();
    assert_eq!(layout.total_size(), last.offset + last.size);

    let max_alignment = levels.iter().map(|level| level.alignment).max().unwrap();
    assert_eq!(layout.base_alignment(), max_alignment);

    assert_eq!(
        layout.is_purely_linear(),
        levels[0].tiling_mode == TilingMode::LinearAligned
    );
    assert!(levels
        .iter()
        .all(|level| level.tiling_mode <= layout.effective_tiling()));

    let enabled = layout
        .compression_metadata()
        .map_or(0, |metadata| metadata.levels_enabled_count as usize);
    for (index, level) in levels.iter().enumerate() {
        assert_eq!(level.compression_offset.is_some(), index < enabled);
    }

    match layout.stencil_levels() {
        Some(stencil) => {
            assert!(request.flags.contains(SurfaceFlags::STENCIL));
            assert_eq!(stencil.len(), levels.len());
            check_plane(stencil);
        }
        None => assert!(!request.flags.contains(SurfaceFlags::STENCIL)),
    }
}

#[test]
fn colour_layouts_hold_invariants() {
    let engine = engine();
    for request in colour_sweep() {
        let layout = engine
            .compute_layout(&request)
            .unwrap_or_else(|err| panic!("{request:?}: {err}"));
        check_layout(&request, &layout);
    }
}

#[test]
fn depth_layouts_hold_invariants() {
    let engine = engine();
    for request in depth_sweep() {
        let layout = engine
            .compute_layout(&request)
            .unwrap_or_else(|err| panic!("{request:?}: {err}"));
        check_layout(&request, &layout);
        assert!(layout.effective_tiling() >= TilingMode::Tiled1D);
        if layout.aux_metadata().is_some() {
            assert_eq!(layout.levels()[0].tiling_mode, TilingMode::Tiled2D);
        }
    }
}

#[test]
fn layouts_are_idempotent() {
    let engine = engine();
    for request in depth_sweep().iter().chain(colour_sweep().iter().step_by(7)) {
        let first = engine.compute_layout(request).unwrap();
        let second = engine.compute_layout(request).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn depth_plane_ignores_stencil() {
    let engine = engine();
    for request in depth_sweep() {
        let with_stencil = engine.compute_layout(&request).unwrap();

        let mut depth_only = request.clone();
        depth_only.flags.remove(SurfaceFlags::STENCIL);
        let without_stencil = engine.compute_layout(&depth_only).unwrap();

        assert_eq!(with_stencil.levels(), without_stencil.levels());
        assert_eq!(with_stencil.total_size(), without_stencil.total_size());
        assert!(without_stencil.stencil().is_none());
        assert!(!without_stencil.stencil_adjusted());
    }
}

#[test]
fn stencil_adjusted_tracks_pitch_mismatch() {
    let engine = engine();
    for request in depth_sweep() {
        let layout = engine.compute_layout(&request).unwrap();
        let stencil = layout.stencil_levels().unwrap();
        let mismatch = layout
            .levels()
            .iter()
            .zip(stencil)
            .any(|(depth, stencil)| depth.width_in_blocks != stencil.width_in_blocks);
        assert_eq!(layout.stencil_adjusted(), mismatch);
    }
}

#[test]
fn multisampled_surfaces_are_2d() {
    let engine = engine();
    for hardware in ALL_HARDWARE {
        for samples in [2, 4, 8] {
            for tiling in TILINGS {
                let mut request = colour(hardware, 256, 256, 4);
                request.sample_count = samples;
                request.requested_tiling = tiling;
                let layout = engine.compute_layout(&request).unwrap();
                assert_eq!(layout.effective_tiling(), TilingMode::Tiled2D);
                assert!(layout.compression_metadata().is_none());
            }
        }
    }
}

#[test]
fn engine_is_shared_across_threads() {
    let engine = Arc::new(engine());
    let requests = depth_sweep();
    let expected: Vec<_> = requests
        .iter()
        .map(|request| engine.compute_layout(request).unwrap())
        .collect();

    thread::scope(|scope| {
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            let requests = &requests;
            let expected = &expected;
            scope.spawn(move || {
                for (request, expected) in requests.iter().zip(expected) {
                    assert_eq!(&engine.compute_layout(request).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn shared_table_serves_several_engines() {
    init_tracing();
    let table = Arc::new(CapabilityTable::with_presets());
    let first = SurfaceEngine::new(Arc::clone(&table));
    let second = SurfaceEngine::new(Arc::clone(&table));

    let request = colour(POLARIS10, 640, 480, 4);
    assert_eq!(
        first.compute_layout(&request).unwrap(),
        second.compute_layout(&request).unwrap()
    );
    assert_eq!(first.provider().len(), 3);
}
