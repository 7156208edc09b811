//! PVGPU Surface Layout Engine
//!
//! Computes the memory layout of GPU texture resources for GCN class
//! hardware:
//! 1. Resolves the hardware's tiling capabilities
//! 2. Selects the effective tiling mode and micro tile type
//! 3. Places every mip level (and the stencil plane, if any)
//! 4. Sizes colour compression and hierarchical depth metadata
//! 5. Applies the miptree-wide metadata corrections
//!
//! ```
//! use pvgpu_surface::{CapabilityTable, HardwareId, SurfaceEngine, SurfaceRequest};
//!
//! let engine = SurfaceEngine::new(CapabilityTable::with_presets());
//! let request = SurfaceRequest::new(HardwareId::new(8, 130), 256, 256, 4);
//! let layout = engine.compute_layout(&request).unwrap();
//! assert_eq!(layout.levels().len(), 1);
//! ```

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod level;
pub mod metadata;
pub mod reference;
pub mod surface;
pub mod tiling;

pub use backend::{ElementFormat, SurfaceInfoFlags, TileInfo, TilingBackend};
pub use capabilities::{
    CapabilityProvider, CapabilityTable, ChipClass, HardwareCaps, HardwareId, ResolvedHardware,
};
pub use config::Config;
pub use engine::{compute_layout, SurfaceEngine};
pub use error::{LayoutError, TilingError};
pub use reference::ReferenceBackend;
pub use surface::{
    AuxMetadata, CompressionMetadata, LevelLayout, MacroTileParams, MicroTileType,
    PreferredMacroTile, StencilPlane, SurfaceFlags, SurfaceLayout, SurfaceRequest, TileConfig,
    TilingMode,
};
