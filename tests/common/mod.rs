//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use pvgpu_surface::backend::{
    AuxBackendOutput, CompressionBackendOutput, CompressionInputs, HtileInputs, LevelBackendOutput,
    LevelInputs,
};
use pvgpu_surface::capabilities::{FAMILY_CI, FAMILY_SI, FAMILY_VI, GFX6, GFX7, GFX8};
use pvgpu_surface::error::ADDR_ERROR;
use pvgpu_surface::{
    CapabilityTable, HardwareCaps, HardwareId, ReferenceBackend, SurfaceEngine, SurfaceFlags,
    SurfaceRequest, TilingBackend, TilingError,
};

static INIT: Once = Once::new();

/// Route engine logs to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const TAHITI: HardwareId = HardwareId::new(GFX6, FAMILY_SI);
pub const BONAIRE: HardwareId = HardwareId::new(GFX7, FAMILY_CI);
pub const POLARIS10: HardwareId = HardwareId::new(GFX8, FAMILY_VI);

pub const ALL_HARDWARE: [HardwareId; 3] = [TAHITI, BONAIRE, POLARIS10];

pub fn engine() -> SurfaceEngine<CapabilityTable> {
    init_tracing();
    SurfaceEngine::new(CapabilityTable::with_presets())
}

/// Engine whose polaris10 entry is served by `backend`.
pub fn engine_with_backend(
    backend: impl TilingBackend + 'static,
) -> SurfaceEngine<CapabilityTable> {
    init_tracing();
    let mut table = CapabilityTable::new();
    table.insert_with_backend(HardwareCaps::polaris10(), Box::new(backend));
    SurfaceEngine::new(table)
}

pub fn colour(hardware: HardwareId, width: u32, height: u32, bpe: u32) -> SurfaceRequest {
    SurfaceRequest::new(hardware, width, height, bpe)
}

pub fn depth_stencil(hardware: HardwareId, width: u32, height: u32) -> SurfaceRequest {
    let mut request = SurfaceRequest::new(hardware, width, height, 4);
    request.flags = SurfaceFlags::ZBUFFER | SurfaceFlags::STENCIL;
    request
}

/// Number of levels in a full mip chain.
pub fn full_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).leading_zeros()
}

/// Reference backend with injectable failures.
pub struct FailingBackend {
    inner: ReferenceBackend,
    pub fail_geometry_at_level: Option<u32>,
    pub fail_compression: bool,
    pub fail_htile: bool,
}

impl FailingBackend {
    pub fn polaris10() -> Self {
        Self {
            inner: ReferenceBackend::new(HardwareCaps::polaris10()),
            fail_geometry_at_level: None,
            fail_compression: false,
            fail_htile: false,
        }
    }
}

impl TilingBackend for FailingBackend {
    fn compute_level_geometry(
        &self,
        inputs: &LevelInputs,
    ) -> Result<LevelBackendOutput, TilingError> {
        if self.fail_geometry_at_level == Some(inputs.mip_level) {
            return Err(TilingError::Code(ADDR_ERROR));
        }
        self.inner.compute_level_geometry(inputs)
    }

    fn compute_compression_info(
        &self,
        inputs: &CompressionInputs,
    ) -> Result<CompressionBackendOutput, TilingError> {
        if self.fail_compression {
            return Err(TilingError::Code(ADDR_ERROR));
        }
        self.inner.compute_compression_info(inputs)
    }

    fn compute_hierarchical_metadata_info(
        &self,
        inputs: &HtileInputs,
    ) -> Result<AuxBackendOutput, TilingError> {
        if self.fail_htile {
            return Err(TilingError::NotSupported("htile disabled for test"));
        }
        self.inner.compute_hierarchical_metadata_info(inputs)
    }
}
