//! Capability Resolver
//!
//! Maps a hardware identifier to its fixed tiling parameters: the
//! `GB_TILE_MODE` / `GB_MACROTILE_MODE` register tables programmed by the
//! kernel, the pipe count and the pipe interleave. Tables are read-only once
//! built and can be shared across threads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{TileInfo, TilingBackend};
use crate::reference::ReferenceBackend;
use crate::surface::{MicroTileType, TilingMode};

// =============================================================================
// Hardware Identification
// =============================================================================

pub const GFX6: u32 = 6;
pub const GFX7: u32 = 7;
pub const GFX8: u32 = 8;

pub const FAMILY_SI: u32 = 110;
pub const FAMILY_CI: u32 = 120;
pub const FAMILY_KV: u32 = 125;
pub const FAMILY_VI: u32 = 130;
pub const FAMILY_CZ: u32 = 135;

/// Opaque key of a hardware capability entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareId {
    pub generation: u32,
    pub family: u32,
}

impl HardwareId {
    pub const fn new(generation: u32, family: u32) -> Self {
        Self { generation, family }
    }
}

/// Register layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipClass {
    Si,
    Cik,
    Vi,
}

// =============================================================================
// Register Fields
// =============================================================================

pub const NUM_TILE_MODE_STATES: usize = 32;
pub const NUM_MACRO_TILE_MODE_STATES: usize = 16;

// GB_TILE_MODEn
const MICRO_TILE_MODE_SHIFT: u32 = 0;
const ARRAY_MODE_SHIFT: u32 = 2;
const PIPE_CONFIG_SHIFT: u32 = 6;
const TILE_SPLIT_SHIFT: u32 = 11;
const BANK_WIDTH_SHIFT: u32 = 14;
const BANK_HEIGHT_SHIFT: u32 = 16;
const MACRO_TILE_ASPECT_SHIFT: u32 = 18;
const NUM_BANKS_SHIFT: u32 = 20;
const MICRO_TILE_MODE_NEW_SHIFT: u32 = 22;
const SAMPLE_SPLIT_SHIFT: u32 = 25;

// GB_MACROTILE_MODEn
const MACRO_BANK_WIDTH_SHIFT: u32 = 0;
const MACRO_BANK_HEIGHT_SHIFT: u32 = 2;
const MACRO_MACRO_TILE_ASPECT_SHIFT: u32 = 4;
const MACRO_NUM_BANKS_SHIFT: u32 = 6;

pub const ARRAY_LINEAR_GENERAL: u32 = 0;
pub const ARRAY_LINEAR_ALIGNED: u32 = 1;
pub const ARRAY_1D_TILED_THIN1: u32 = 2;
pub const ARRAY_2D_TILED_THIN1: u32 = 4;

pub const ADDR_SURF_P2: u32 = 0;
pub const ADDR_SURF_P4_16X16: u32 = 5;
pub const ADDR_SURF_P8_32X32_8X16: u32 = 10;
pub const ADDR_SURF_P8_32X32_16X16: u32 = 12;
pub const ADDR_SURF_P16_32X32_8X16: u32 = 16;

const fn field(reg: u32, shift: u32, mask: u32) -> u32 {
    (reg >> shift) & mask
}

/// Number of pipes encoded by a `PIPE_CONFIG` value.
pub const fn pipe_count(pipe_config: u32) -> u32 {
    match pipe_config {
        0..=3 => 2,
        4..=7 => 4,
        8..=15 => 8,
        _ => 16,
    }
}

/// Macro-tile table index for a tile split: log2 of the bytes one tile
/// occupies after splitting, counted from 64.
pub fn cik_macro_tile_index(tile_split_bytes: u32, bytes_per_element: u32) -> u32 {
    let mut tile_bytes = tile_split_bytes.min(64 * bytes_per_element);
    let mut index = 0;
    while tile_bytes > 64 {
        tile_bytes >>= 1;
        index += 1;
    }
    index
}

fn array_mode_to_tiling(array_mode: u32) -> Option<TilingMode> {
    match array_mode {
        ARRAY_LINEAR_ALIGNED => Some(TilingMode::LinearAligned),
        ARRAY_1D_TILED_THIN1 => Some(TilingMode::Tiled1D),
        ARRAY_2D_TILED_THIN1 => Some(TilingMode::Tiled2D),
        _ => None,
    }
}

/// Encode an SI `GB_TILE_MODE` register. All arguments are field encodings.
#[allow(clippy::too_many_arguments)]
pub const fn si_tile_mode(
    array_mode: u32,
    micro_tile_mode: u32,
    pipe_config: u32,
    tile_split: u32,
    bank_width: u32,
    bank_height: u32,
    macro_aspect: u32,
    num_banks: u32,
) -> u32 {
    (micro_tile_mode << MICRO_TILE_MODE_SHIFT)
        | (array_mode << ARRAY_MODE_SHIFT)
        | (pipe_config << PIPE_CONFIG_SHIFT)
        | (tile_split << TILE_SPLIT_SHIFT)
        | (bank_width << BANK_WIDTH_SHIFT)
        | (bank_height << BANK_HEIGHT_SHIFT)
        | (macro_aspect << MACRO_TILE_ASPECT_SHIFT)
        | (num_banks << NUM_BANKS_SHIFT)
}

/// Encode a CIK+ `GB_TILE_MODE` register. All arguments are field encodings.
pub const fn cik_tile_mode(
    array_mode: u32,
    micro_tile_mode: u32,
    pipe_config: u32,
    tile_split: u32,
    sample_split: u32,
) -> u32 {
    (array_mode << ARRAY_MODE_SHIFT)
        | (pipe_config << PIPE_CONFIG_SHIFT)
        | (tile_split << TILE_SPLIT_SHIFT)
        | (micro_tile_mode << MICRO_TILE_MODE_NEW_SHIFT)
        | (sample_split << SAMPLE_SPLIT_SHIFT)
}

/// Encode a CIK+ `GB_MACROTILE_MODE` register. All arguments are field encodings.
pub const fn cik_macro_tile_mode(
    bank_width: u32,
    bank_height: u32,
    macro_aspect: u32,
    num_banks: u32,
) -> u32 {
    (bank_width << MACRO_BANK_WIDTH_SHIFT)
        | (bank_height << MACRO_BANK_HEIGHT_SHIFT)
        | (macro_aspect << MACRO_MACRO_TILE_ASPECT_SHIFT)
        | (num_banks << MACRO_NUM_BANKS_SHIFT)
}

/// Decoded `GB_TILE_MODE` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileModeEntry {
    pub tile_mode: TilingMode,
    pub tile_type: MicroTileType,
    pub pipe_config: u32,
    pub tile_split_bytes: u32,
    /// Samples kept together before a colour tile is split (CIK+)
    pub sample_split: u32,
    /// Bank parameters carried by the tile mode itself (SI only)
    pub banks: Option<BankParams>,
}

/// Bank layout part of a tile configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BankParams {
    pub banks: u32,
    pub bank_width: u32,
    pub bank_height: u32,
    pub macro_aspect_ratio: u32,
}

impl BankParams {
    fn decode(reg: u32, width: u32, height: u32, aspect: u32, banks: u32) -> Self {
        Self {
            banks: 2 << field(reg, banks, 0x3),
            bank_width: 1 << field(reg, width, 0x3),
            bank_height: 1 << field(reg, height, 0x3),
            macro_aspect_ratio: 1 << field(reg, aspect, 0x3),
        }
    }

    /// Combine with a tile split and pipe config into a full tile description.
    pub fn with_split(self, tile_split_bytes: u32, pipe_config: u32) -> TileInfo {
        TileInfo {
            banks: self.banks,
            bank_width: self.bank_width,
            bank_height: self.bank_height,
            macro_aspect_ratio: self.macro_aspect_ratio,
            tile_split_bytes,
            pipe_config,
        }
    }
}

// =============================================================================
// Hardware Capabilities
// =============================================================================

/// Fixed tiling parameters of one GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCaps {
    pub name: String,
    pub generation: u32,
    pub family: u32,
    pub chip_class: ChipClass,
    pub num_tile_pipes: u32,
    pub pipe_interleave_bytes: u32,
    pub tile_mode_array: Vec<u32>,
    #[serde(default)]
    pub macro_tile_mode_array: Vec<u32>,
}

impl HardwareCaps {
    pub fn id(&self) -> HardwareId {
        HardwareId::new(self.generation, self.family)
    }

    /// Check table sizes and power-of-two parameters.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.tile_mode_array.len() != NUM_TILE_MODE_STATES {
            return Err("Tile mode array must have 32 entries");
        }
        match self.chip_class {
            ChipClass::Si if !self.macro_tile_mode_array.is_empty() => {
                return Err("SI has no macro tile mode array");
            }
            ChipClass::Cik | ChipClass::Vi
                if self.macro_tile_mode_array.len() != NUM_MACRO_TILE_MODE_STATES =>
            {
                return Err("Macro tile mode array must have 16 entries");
            }
            _ => {}
        }
        if !self.num_tile_pipes.is_power_of_two() {
            return Err("Pipe count must be a power of two");
        }
        if !self.pipe_interleave_bytes.is_power_of_two() {
            return Err("Pipe interleave must be a power of two");
        }
        Ok(())
    }

    /// Whether colour surfaces on this hardware can carry compression metadata.
    pub fn supports_compression(&self) -> bool {
        self.chip_class >= ChipClass::Vi
    }

    /// `MICRO_TILE_MODE` field of tile-mode register `tile_index`.
    pub fn micro_tile_mode(&self, tile_index: u32) -> Option<u32> {
        let reg = *self.tile_mode_array.get(tile_index as usize)?;
        Some(match self.chip_class {
            ChipClass::Si => field(reg, MICRO_TILE_MODE_SHIFT, 0x3),
            ChipClass::Cik | ChipClass::Vi => field(reg, MICRO_TILE_MODE_NEW_SHIFT, 0x7),
        })
    }

    /// Decode tile-mode register `index`; `None` for unused or unsupported
    /// array modes.
    pub fn tile_mode(&self, index: u32) -> Option<TileModeEntry> {
        let reg = *self.tile_mode_array.get(index as usize)?;
        let tile_mode = array_mode_to_tiling(field(reg, ARRAY_MODE_SHIFT, 0xF))?;
        let tile_type = MicroTileType::from_field(self.micro_tile_mode(index)?)?;

        let (sample_split, banks) = match self.chip_class {
            ChipClass::Si => (
                1,
                Some(BankParams::decode(
                    reg,
                    BANK_WIDTH_SHIFT,
                    BANK_HEIGHT_SHIFT,
                    MACRO_TILE_ASPECT_SHIFT,
                    NUM_BANKS_SHIFT,
                )),
            ),
            ChipClass::Cik | ChipClass::Vi => (1 << field(reg, SAMPLE_SPLIT_SHIFT, 0x3), None),
        };

        Some(TileModeEntry {
            tile_mode,
            tile_type,
            pipe_config: field(reg, PIPE_CONFIG_SHIFT, 0x1F),
            tile_split_bytes: 64 << field(reg, TILE_SPLIT_SHIFT, 0x7),
            sample_split,
            banks,
        })
    }

    /// Decode macro-tile register `index` (CIK+).
    pub fn macro_tile_mode(&self, index: u32) -> Option<BankParams> {
        let reg = *self.macro_tile_mode_array.get(index as usize)?;
        Some(BankParams::decode(
            reg,
            MACRO_BANK_WIDTH_SHIFT,
            MACRO_BANK_HEIGHT_SHIFT,
            MACRO_MACRO_TILE_ASPECT_SHIFT,
            MACRO_NUM_BANKS_SHIFT,
        ))
    }

    /// Table indices whose decoded mode is `mode` (and, for tiled modes,
    /// whose micro tile type is `tile_type`), in table order.
    pub fn tile_mode_candidates(&self, mode: TilingMode, tile_type: MicroTileType) -> Vec<u32> {
        (0..self.tile_mode_array.len() as u32)
            .filter(|&index| match self.tile_mode(index) {
                Some(entry) if entry.tile_mode == mode => {
                    mode == TilingMode::LinearAligned || entry.tile_type == tile_type
                }
                _ => false,
            })
            .collect()
    }

    /// Whether any table entry implements `mode`.
    pub fn supports_tiling(&self, mode: TilingMode) -> bool {
        (0..self.tile_mode_array.len() as u32)
            .filter_map(|index| self.tile_mode(index))
            .any(|entry| entry.tile_mode == mode)
    }

    // -------------------------------------------------------------------------
    // Presets
    // -------------------------------------------------------------------------

    /// Tahiti (SI), 8 pipes.
    pub fn tahiti() -> Self {
        const P: u32 = ADDR_SURF_P8_32X32_8X16;
        const DEPTH: u32 = MicroTileType::DepthSampleOrder as u32;
        const DISPLAY: u32 = MicroTileType::Displayable as u32;
        const THIN: u32 = MicroTileType::NonDisplayable as u32;

        let mut table = vec![0u32; NUM_TILE_MODE_STATES];
        table[0] = si_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, P, 0, 0, 2, 1, 3);
        table[1] = si_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, P, 1, 0, 1, 1, 3);
        table[2] = si_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, P, 2, 0, 0, 1, 3);
        table[3] = si_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, P, 3, 0, 0, 0, 2);
        table[4] = si_tile_mode(ARRAY_1D_TILED_THIN1, DEPTH, P, 0, 0, 0, 0, 0);
        table[8] = si_tile_mode(ARRAY_LINEAR_ALIGNED, DISPLAY, P, 0, 0, 0, 0, 0);
        table[9] = si_tile_mode(ARRAY_1D_TILED_THIN1, DISPLAY, P, 0, 0, 0, 0, 0);
        table[10] = si_tile_mode(ARRAY_2D_TILED_THIN1, DISPLAY, P, 4, 0, 2, 1, 3);
        table[11] = si_tile_mode(ARRAY_2D_TILED_THIN1, DISPLAY, P, 4, 0, 1, 1, 3);
        table[12] = si_tile_mode(ARRAY_2D_TILED_THIN1, DISPLAY, P, 4, 0, 0, 1, 3);
        table[13] = si_tile_mode(ARRAY_1D_TILED_THIN1, THIN, P, 0, 0, 0, 0, 0);
        table[14] = si_tile_mode(ARRAY_2D_TILED_THIN1, THIN, P, 4, 0, 2, 1, 3);
        table[15] = si_tile_mode(ARRAY_2D_TILED_THIN1, THIN, P, 4, 0, 1, 1, 3);
        table[16] = si_tile_mode(ARRAY_2D_TILED_THIN1, THIN, P, 4, 0, 0, 1, 3);
        table[17] = si_tile_mode(ARRAY_2D_TILED_THIN1, THIN, P, 4, 0, 0, 0, 2);

        Self {
            name: "tahiti".to_string(),
            generation: GFX6,
            family: FAMILY_SI,
            chip_class: ChipClass::Si,
            num_tile_pipes: pipe_count(P),
            pipe_interleave_bytes: 256,
            tile_mode_array: table,
            macro_tile_mode_array: Vec::new(),
        }
    }

    /// Bonaire (CIK), 4 pipes.
    pub fn bonaire() -> Self {
        Self::cik_layout(
            "bonaire",
            GFX7,
            FAMILY_CI,
            ChipClass::Cik,
            ADDR_SURF_P4_16X16,
        )
    }

    /// Polaris 10 (VI), 8 pipes.
    pub fn polaris10() -> Self {
        Self::cik_layout(
            "polaris10",
            GFX8,
            FAMILY_VI,
            ChipClass::Vi,
            ADDR_SURF_P8_32X32_16X16,
        )
    }

    fn cik_layout(
        name: &str,
        generation: u32,
        family: u32,
        chip_class: ChipClass,
        pipe_config: u32,
    ) -> Self {
        const DEPTH: u32 = MicroTileType::DepthSampleOrder as u32;
        const DISPLAY: u32 = MicroTileType::Displayable as u32;
        const THIN: u32 = MicroTileType::NonDisplayable as u32;
        let p = pipe_config;

        let mut table = vec![0u32; NUM_TILE_MODE_STATES];
        table[0] = cik_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, p, 0, 0);
        table[1] = cik_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, p, 1, 0);
        table[2] = cik_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, p, 2, 0);
        table[3] = cik_tile_mode(ARRAY_2D_TILED_THIN1, DEPTH, p, 3, 0);
        table[4] = cik_tile_mode(ARRAY_1D_TILED_THIN1, DEPTH, p, 0, 0);
        table[8] = cik_tile_mode(ARRAY_LINEAR_ALIGNED, DISPLAY, p, 0, 0);
        table[9] = cik_tile_mode(ARRAY_1D_TILED_THIN1, DISPLAY, p, 0, 0);
        table[10] = cik_tile_mode(ARRAY_2D_TILED_THIN1, DISPLAY, p, 0, 1);
        table[13] = cik_tile_mode(ARRAY_1D_TILED_THIN1, THIN, p, 0, 0);
        table[14] = cik_tile_mode(ARRAY_2D_TILED_THIN1, THIN, p, 0, 1);

        // Indexed by log2(tile bytes / 64); the upper half mirrors the lower
        // half for partially resident textures.
        let mut macro_table = vec![0u32; NUM_MACRO_TILE_MODE_STATES];
        for (index, reg) in macro_table.iter_mut().enumerate() {
            *reg = match index % 8 {
                0 => cik_macro_tile_mode(0, 2, 2, 3),
                1 => cik_macro_tile_mode(0, 1, 1, 3),
                2 => cik_macro_tile_mode(0, 0, 1, 3),
                3 => cik_macro_tile_mode(0, 0, 0, 2),
                _ => cik_macro_tile_mode(0, 0, 0, 1),
            };
        }

        Self {
            name: name.to_string(),
            generation,
            family,
            chip_class,
            num_tile_pipes: pipe_count(pipe_config),
            pipe_interleave_bytes: 256,
            tile_mode_array: table,
            macro_tile_mode_array: macro_table,
        }
    }

    /// All built-in presets.
    pub fn presets() -> Vec<Self> {
        vec![Self::tahiti(), Self::bonaire(), Self::polaris10()]
    }
}

// =============================================================================
// Providers
// =============================================================================

/// Capabilities and backend resolved for one hardware identifier.
#[derive(Clone, Copy)]
pub struct ResolvedHardware<'a> {
    pub caps: &'a HardwareCaps,
    pub backend: &'a dyn TilingBackend,
}

/// Source of hardware capabilities, injected into the layout engine.
pub trait CapabilityProvider: Send + Sync {
    /// Look up a hardware entry; `None` for unknown hardware.
    fn resolve(&self, id: HardwareId) -> Option<ResolvedHardware<'_>>;
}

impl<T: CapabilityProvider + ?Sized> CapabilityProvider for &T {
    fn resolve(&self, id: HardwareId) -> Option<ResolvedHardware<'_>> {
        (**self).resolve(id)
    }
}

impl<T: CapabilityProvider + ?Sized> CapabilityProvider for Arc<T> {
    fn resolve(&self, id: HardwareId) -> Option<ResolvedHardware<'_>> {
        (**self).resolve(id)
    }
}

struct TableEntry {
    caps: HardwareCaps,
    backend: Box<dyn TilingBackend>,
}

/// Hardware capability table keyed by [`HardwareId`].
#[derive(Default)]
pub struct CapabilityTable {
    entries: HashMap<HardwareId, TableEntry>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the built-in presets.
    pub fn with_presets() -> Self {
        let mut table = Self::new();
        for caps in HardwareCaps::presets() {
            table.insert(caps);
        }
        table
    }

    /// Register hardware served by the [`ReferenceBackend`]. Replaces any
    /// previous entry with the same identifier.
    pub fn insert(&mut self, caps: HardwareCaps) {
        let backend = ReferenceBackend::new(caps.clone());
        self.insert_with_backend(caps, Box::new(backend));
    }

    /// Register hardware served by a caller-supplied backend.
    pub fn insert_with_backend(&mut self, caps: HardwareCaps, backend: Box<dyn TilingBackend>) {
        debug!(
            "Registering hardware {} (generation {}, family {})",
            caps.name, caps.generation, caps.family
        );
        self.entries.insert(caps.id(), TableEntry { caps, backend });
    }

    pub fn get(&self, id: HardwareId) -> Option<&HardwareCaps> {
        self.entries.get(&id).map(|entry| &entry.caps)
    }

    pub fn contains(&self, id: HardwareId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CapabilityProvider for CapabilityTable {
    fn resolve(&self, id: HardwareId) -> Option<ResolvedHardware<'_>> {
        self.entries.get(&id).map(|entry| ResolvedHardware {
            caps: &entry.caps,
            backend: entry.backend.as_ref(),
        })
    }
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self
            .entries
            .values()
            .map(|entry| entry.caps.name.as_str())
            .collect();
        names.sort_unstable();
        f.debug_struct("CapabilityTable")
            .field("hardware", &names)
            .finish()
    }
}
