//! Engine version and game profile detection
//!
//! Every conditional layout decision in this crate reads an
//! [`ArchiveContext`]: the format version pair taken from the package header
//! plus a resolved [`GameProfile`]. Contexts are built once, either by
//! [`probe_package`] or by hand, and are never mutated while decoding.
//!
//! Per-title layout differences are collected in one table,
//! [`LayoutQuirks`], which serializers consult at fixed extension points
//! instead of branching on titles themselves.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::{Archive, SerializeExt};
use crate::config::ArchiveConfig;
use crate::containers::FString;
use crate::error::{ArchiveError, Result};
use crate::math::Guid;

/// Package file magic in native byte order
pub const PACKAGE_FILE_TAG: u32 = 0x9E2A_83C1;

/// Package file magic as seen when the file has the opposite byte order
pub const PACKAGE_FILE_TAG_REV: u32 = 0xC183_2A9E;

/// First format version of the UE2 package layout
pub const PACKAGE_V2: i32 = 100;

/// First format version of the UE3 package layout
pub const PACKAGE_V3: i32 = 180;

/// Format version assumed before any header has been read
pub const DEFAULT_VERSION: i32 = 100_000;

/// Mask selecting the engine family part of a [`Game`] code
pub const GAME_ENGINE_MASK: u32 = 0xFFF00;

/// UE4 file versions referenced by the layout rules
pub mod ue4 {
    /// Strip flags serialized in front of cooked objects
    pub const VER_UE4_REMOVED_STRIP_DATA: i32 = 130;
    /// Bulk data offsets widened to 64 bits
    pub const VER_UE4_BULKDATA_AT_LARGE_OFFSETS: i32 = 198;
    /// Package summary records the bulk data start offset
    pub const VER_UE4_SUMMARY_HAS_BULKDATA_OFFSET: i32 = 212;
    /// Engine version object in the package summary
    pub const VER_UE4_ENGINE_VERSION_OBJECT: i32 = 336;
    /// UE 4.0 release
    pub const VER_UE4_0: i32 = 342;
    /// UE 4.1 release
    pub const VER_UE4_1: i32 = 352;
    /// UE 4.2 release
    pub const VER_UE4_2: i32 = 363;
    /// UE 4.3 release
    pub const VER_UE4_3: i32 = 382;
    /// UE 4.4 release
    pub const VER_UE4_4: i32 = 385;
    /// UE 4.5 release
    pub const VER_UE4_5: i32 = 401;
}

/// Engine family and title identifier
///
/// Family markers carry round codes; titles follow their family so that
/// `game.code() & GAME_ENGINE_MASK` yields the family code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum Game {
    #[default]
    Unknown = 0,

    Ue1 = 0x01000,
    Undying,

    Ue2 = 0x02000,
    Ut2,
    Pariah,
    SplinterCell,
    SplinterCellConv,
    Lineage2,
    Exteel,
    Ragnarok2,
    RepCommando,
    Loco,
    BattleTerr,
    Uc1,
    Xiii,
    Vanguard,
    Aa2,

    Vengeance = 0x02100,
    Tribes3,
    Swat4,
    Bioshock,

    Lead = 0x02200,

    Ue2x = 0x04000,
    Uc2,

    Ue3 = 0x08000,
    EndWar,
    MassEffect,
    MassEffect2,
    MassEffect3,
    R6Vegas2,
    MirrorEdge,
    Tlr,
    Huxley,
    Turok,
    Fury,
    XMen,
    MagnaCarta,
    ArmyOf2,
    CrimeCraft,
    FiftyCent,
    Ava,
    Frontlines,
    Batman,
    Batman2,
    Batman3,
    Borderlands,
    Aa3,
    DarkVoid,
    Legendary,
    Tera,
    BladeNSoul,
    Apb,
    AlphaProtocol,
    Transformers,
    MortalOnline,
    Enslaved,
    Moha,
    Moh2010,
    Berkanix,
    Doh,
    DcUniverse,
    Bulletstorm,
    Undertow,
    Singularity,
    Tron,
    Hunted,
    Dnd,
    ShadowsDamned,
    Argonauts,
    SpecialForce2,
    GunLegend,
    TaoYuan,
    Tribes4,
    Dishonored,
    Hawken,
    Fable,
    DmC,
    Pla,
    AliensCm,
    GoWJ,
    Bioshock3,
    RememberMe,
    MarvelHeroes,
    LostPlanet3,
    XcomB,
    Thief4,
    Murdered,
    Sov,
    Vec,
    Dust514,

    Midway3 = 0x08100,
    A51,
    Wheelman,
    Mk,
    Strangle,
    Tna,

    Ue4 = 0x10000,
    #[allow(non_camel_case_types)]
    Ue4_0,
    #[allow(non_camel_case_types)]
    Ue4_1,
    #[allow(non_camel_case_types)]
    Ue4_2,
    #[allow(non_camel_case_types)]
    Ue4_3,
    #[allow(non_camel_case_types)]
    Ue4_4,
    #[allow(non_camel_case_types)]
    Ue4_5,
}

impl Game {
    /// Numeric code (family bits OR'd with the title number)
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Engine family this title belongs to
    pub const fn engine(self) -> Self {
        match self.code() & GAME_ENGINE_MASK {
            0x01000 => Self::Ue1,
            0x02000 => Self::Ue2,
            0x02100 => Self::Vengeance,
            0x02200 => Self::Lead,
            0x04000 => Self::Ue2x,
            0x08000 => Self::Ue3,
            0x08100 => Self::Midway3,
            0x10000 => Self::Ue4,
            _ => Self::Unknown,
        }
    }

    /// Ordered code comparison, e.g. `game.at_least(Game::Ue3)`
    pub const fn at_least(self, other: Self) -> bool {
        self.code() >= other.code()
    }

    /// Whether this game uses the legacy (pre-UE3) package layout with
    /// compact indices
    ///
    /// An undetected game is treated as the current layout.
    pub const fn is_legacy(self) -> bool {
        !matches!(self, Self::Unknown) && !self.at_least(Self::Ue3)
    }
}

/// Target platform of the cooked data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Not determined
    Unknown,
    /// Windows / little-endian
    #[default]
    Pc,
    /// Xbox 360 / big-endian
    Xbox360,
    /// PlayStation 3 / big-endian
    Ps3,
    /// iOS / little-endian
    Ios,
}

impl Platform {
    /// Whether cooked data for this platform is big-endian
    pub const fn is_big_endian(self) -> bool {
        matches!(self, Self::Xbox360 | Self::Ps3)
    }
}

/// Resolved (game, platform) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameProfile {
    /// Game or engine family
    pub game: Game,
    /// Target platform
    pub platform: Platform,
}

impl GameProfile {
    /// Create a profile
    pub const fn new(game: Game, platform: Platform) -> Self {
        Self { game, platform }
    }

    /// Engine family of the game
    pub const fn engine(&self) -> Game {
        self.game.engine()
    }
}

/// Suffix style used when a name carries a numeric instance index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSuffixStyle {
    /// `Name_3`
    Underscore,
    /// `Name3`
    Concatenated,
}

/// Per-profile layout deviations
///
/// This is the single place that knows which title deviates where. Each
/// field corresponds to one extension point in a serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutQuirks {
    /// Padding bytes after every vector (EndWar stores a W component)
    pub vector_padding: u32,
    /// Rotators are stored pre-scaled (WWE All Stars)
    pub rotator_rescale: bool,
    /// Guids are followed by an extra 4-byte field (Fury)
    pub guid_trailing_field: bool,
    /// Boxes carry the validity byte
    pub box_validity_byte: bool,
    /// Spheres carry the radius
    pub sphere_radius: bool,
    /// Names carry an instance number next to the table index (UE3 on,
    /// and Bioshock)
    pub name_instance_number: bool,
    /// Style of generated name suffixes
    pub name_suffix: NameSuffixStyle,
    /// Objects start with a Vengeance header
    pub vengeance_header: bool,
}

impl LayoutQuirks {
    /// Resolve the quirks for a version pair and profile
    pub fn resolve(version: i32, licensee_version: i32, profile: GameProfile) -> Self {
        let game = profile.game;
        let engine = game.engine();
        Self {
            vector_padding: if game == Game::EndWar { 4 } else { 0 },
            rotator_rescale: game == Game::Tna && version >= 395,
            guid_trailing_field: game == Game::Fury && licensee_version >= 24,
            box_validity_byte: !(engine == Game::Ue2x && version >= 146),
            sphere_radius: version >= 61,
            name_instance_number: !game.is_legacy() || game == Game::Bioshock,
            name_suffix: if game == Game::Bioshock {
                NameSuffixStyle::Concatenated
            } else {
                NameSuffixStyle::Underscore
            },
            vengeance_header: engine == Game::Vengeance,
        }
    }
}

/// Version and profile context of an archive
///
/// Fields are private: a context is created once and read everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveContext {
    version: i32,
    licensee_version: i32,
    profile: GameProfile,
    host_version: Option<i32>,
    quirks: LayoutQuirks,
}

impl Default for ArchiveContext {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION, 0, GameProfile::default())
    }
}

impl ArchiveContext {
    /// Create a context from a version pair and a resolved profile
    pub fn new(version: i32, licensee_version: i32, profile: GameProfile) -> Self {
        Self {
            version,
            licensee_version,
            profile,
            host_version: None,
            quirks: LayoutQuirks::resolve(version, licensee_version, profile),
        }
    }

    /// Detect the profile from a version pair, honouring config overrides
    pub fn detect(
        version: i32,
        licensee_version: i32,
        reverse_bytes: bool,
        config: &ArchiveConfig,
    ) -> Self {
        let game = detect_game(version, licensee_version, config.game_override);
        let platform = detect_platform(reverse_bytes, config.platform_override);
        Self::new(version, licensee_version, GameProfile::new(game, platform))
            .with_host_version(config.host_version)
    }

    /// Set the version whose layout matches the in-memory layout
    #[must_use]
    pub fn with_host_version(mut self, host_version: Option<i32>) -> Self {
        self.host_version = host_version;
        self
    }

    /// Format version
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Licensee version
    pub const fn licensee_version(&self) -> i32 {
        self.licensee_version
    }

    /// Resolved profile
    pub const fn profile(&self) -> GameProfile {
        self.profile
    }

    /// Resolved game
    pub const fn game(&self) -> Game {
        self.profile.game
    }

    /// Engine family of the resolved game
    pub const fn engine(&self) -> Game {
        self.profile.game.engine()
    }

    /// Resolved platform
    pub const fn platform(&self) -> Platform {
        self.profile.platform
    }

    /// Version whose layout matches the in-memory layout, if known
    pub const fn host_version(&self) -> Option<i32> {
        self.host_version
    }

    /// Layout deviations for this profile
    pub const fn quirks(&self) -> &LayoutQuirks {
        &self.quirks
    }

    /// Whether counts and indices use the compact index codec
    pub const fn uses_compact_indices(&self) -> bool {
        self.profile.game.is_legacy()
    }

    /// Whether compressed chunk sizes are 64-bit on disk
    pub const fn uses_wide_chunk_sizes(&self) -> bool {
        self.profile.game.at_least(Game::Ue4)
    }

    /// Whether bulk data offsets are 64-bit on disk
    pub const fn uses_wide_bulk_offsets(&self) -> bool {
        self.profile.game.at_least(Game::Ue4)
            && self.version >= ue4::VER_UE4_BULKDATA_AT_LARGE_OFFSETS
    }
}

/// Heuristic rule mapping a version pair to a title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRule {
    /// Title selected by this rule
    pub game: Game,
    /// Inclusive format version range
    pub versions: (i32, i32),
    /// Inclusive licensee version range
    pub licensees: (i32, i32),
}

impl DetectionRule {
    const fn new(game: Game, versions: (i32, i32), licensees: (i32, i32)) -> Self {
        Self {
            game,
            versions,
            licensees,
        }
    }

    /// Whether the rule accepts this version pair
    pub const fn matches(&self, version: i32, licensee_version: i32) -> bool {
        version >= self.versions.0
            && version <= self.versions.1
            && licensee_version >= self.licensees.0
            && licensee_version <= self.licensees.1
    }
}

/// Known version signatures. Titles that overlap another title's signature
/// (Swat 4, EndWar) are only reachable through an explicit override.
pub const DETECTION_RULES: &[DetectionRule] = &[
    DetectionRule::new(Game::SplinterCell, (100, 100), (9, 17)),
    DetectionRule::new(Game::Ut2, (117, 120), (25, 28)),
    DetectionRule::new(Game::Ut2, (128, 128), (28, 29)),
    DetectionRule::new(Game::Lineage2, (123, 128), (16, 37)),
    DetectionRule::new(Game::Tribes3, (123, 123), (3, 15)),
    DetectionRule::new(Game::Tribes3, (126, 126), (18, 23)),
    DetectionRule::new(Game::Tribes3, (129, 130), (23, 27)),
    DetectionRule::new(Game::Bioshock, (141, 143), (56, 58)),
    DetectionRule::new(Game::Uc2, (151, 151), (0, 1)),
    DetectionRule::new(Game::MassEffect, (491, 491), (1008, 1008)),
    DetectionRule::new(Game::MassEffect2, (512, 512), (130, 130)),
    DetectionRule::new(Game::MassEffect3, (684, 685), (185, 194)),
    DetectionRule::new(Game::MirrorEdge, (536, 536), (43, 43)),
    DetectionRule::new(Game::Batman, (576, 576), (21, 21)),
    DetectionRule::new(Game::Borderlands, (584, 584), (57, 58)),
    DetectionRule::new(Game::BladeNSoul, (584, 584), (126, 126)),
    DetectionRule::new(Game::Bulletstorm, (742, 742), (29, 29)),
    DetectionRule::new(Game::Dishonored, (801, 801), (30, 30)),
    DetectionRule::new(Game::Batman2, (805, 805), (101, 101)),
];

/// Detect the game from a version pair using [`DETECTION_RULES`]
///
/// An explicit override wins. Without one, a unique rule match selects the
/// title; no match or several conflicting matches fall back to the engine
/// family implied by the version.
pub fn detect_game(version: i32, licensee_version: i32, game_override: Option<Game>) -> Game {
    detect_game_with(DETECTION_RULES, version, licensee_version, game_override)
}

/// [`detect_game`] over a caller-supplied rule table
pub fn detect_game_with(
    rules: &[DetectionRule],
    version: i32,
    licensee_version: i32,
    game_override: Option<Game>,
) -> Game {
    if let Some(game) = game_override {
        debug!("Using game override {:?}", game);
        return game;
    }

    let mut found: Option<Game> = None;
    let mut ambiguous = false;
    for rule in rules.iter().filter(|r| r.matches(version, licensee_version)) {
        match found {
            None => found = Some(rule.game),
            Some(game) if game != rule.game => ambiguous = true,
            Some(_) => {}
        }
    }

    let fallback = family_for_version(version);
    match found {
        Some(game) if !ambiguous => {
            debug!(
                "Detected {:?} from version {}/{}",
                game, version, licensee_version
            );
            game
        }
        Some(_) => {
            warn!(
                "Version {}/{} matches several games, using {:?}",
                version, licensee_version, fallback
            );
            fallback
        }
        None => {
            debug!(
                "No game signature for version {}/{}, using {:?}",
                version, licensee_version, fallback
            );
            fallback
        }
    }
}

/// Engine family implied by a legacy (pre-UE4) format version
pub const fn family_for_version(version: i32) -> Game {
    if version < PACKAGE_V2 {
        Game::Ue1
    } else if version < PACKAGE_V3 {
        Game::Ue2
    } else {
        Game::Ue3
    }
}

/// UE4 engine release implied by a UE4 file version
pub const fn ue4_game_for_version(file_version: i32) -> Game {
    if file_version >= ue4::VER_UE4_5 {
        Game::Ue4_5
    } else if file_version >= ue4::VER_UE4_4 {
        Game::Ue4_4
    } else if file_version >= ue4::VER_UE4_3 {
        Game::Ue4_3
    } else if file_version >= ue4::VER_UE4_2 {
        Game::Ue4_2
    } else if file_version >= ue4::VER_UE4_1 {
        Game::Ue4_1
    } else if file_version >= ue4::VER_UE4_0 {
        Game::Ue4_0
    } else {
        Game::Ue4
    }
}

/// Detect the platform from the byte order of the package
pub fn detect_platform(reverse_bytes: bool, platform_override: Option<Platform>) -> Platform {
    match platform_override {
        Some(platform) => platform,
        None if reverse_bytes => Platform::Xbox360,
        None => Platform::Pc,
    }
}

/// Whether a package tag signals reversed byte order
pub fn tag_byte_order(tag: u32) -> Result<bool> {
    match tag {
        PACKAGE_FILE_TAG => Ok(false),
        PACKAGE_FILE_TAG_REV => Ok(true),
        other => Err(ArchiveError::InvalidTag(other)),
    }
}

/// Custom version entry of a UE4 package header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomVersion {
    /// Key (enum tag for the oldest layout, guid otherwise)
    pub key: Guid,
    /// Version number
    pub version: i32,
    /// Friendly name, present in the guid layout only
    pub friendly_name: Option<String>,
}

/// Result of probing a package header
#[derive(Debug, Clone)]
pub struct PackageProbe {
    /// Detected context, already installed into the archive
    pub context: ArchiveContext,
    /// UE4 legacy version, `None` for UE1-UE3 packages
    pub legacy_version: Option<i32>,
    /// UE4 custom version table
    pub custom_versions: Vec<CustomVersion>,
}

/// Read the package tag and version header and install the detected context
///
/// The archive byte order follows the tag, the context is detected from the
/// version pair and the config, then locked on the archive.
pub fn probe_package<A: Archive + ?Sized>(ar: &mut A, config: &ArchiveConfig) -> Result<PackageProbe> {
    let start = ar.tell();
    probe_package_inner(ar, config).map_err(|e| e.in_operation("package header", start))
}

fn probe_package_inner<A: Archive + ?Sized>(ar: &mut A, config: &ArchiveConfig) -> Result<PackageProbe> {
    if !ar.is_loading() {
        return Err(ArchiveError::NotLoading);
    }

    let mut raw = [0u8; 4];
    ar.serialize_bytes(&mut raw)?;
    let reverse = tag_byte_order(u32::from_le_bytes(raw))?;
    if reverse {
        debug!("Package tag is byte-swapped, reversing scalar byte order");
    }
    ar.state_mut().set_reverse_bytes(reverse);

    let packed: i32 = ar.load()?;
    let (context, legacy_version, custom_versions) = if packed < 0 {
        let legacy = packed;
        if legacy != -4 {
            let _legacy_ue3_version: i32 = ar.load()?;
        }
        let file_version: i32 = ar.load()?;
        let licensee_version: i32 = ar.load()?;
        let custom_versions = if legacy <= -2 {
            read_custom_versions(ar, legacy)?
        } else {
            Vec::new()
        };

        let game = config
            .game_override
            .unwrap_or_else(|| ue4_game_for_version(file_version));
        let platform = detect_platform(reverse, config.platform_override);
        debug!(
            "UE4 package: legacy {}, file version {}/{}, {:?}",
            legacy, file_version, licensee_version, game
        );
        let context = ArchiveContext::new(
            file_version,
            licensee_version,
            GameProfile::new(game, platform),
        )
        .with_host_version(config.host_version);
        (context, Some(legacy), custom_versions)
    } else {
        let version = packed & 0xFFFF;
        let licensee_version = (packed >> 16) & 0xFFFF;
        let context = ArchiveContext::detect(version, licensee_version, reverse, config);
        (context, None, Vec::new())
    };

    ar.state_mut().set_context(context)?;
    ar.state_mut().lock_context();

    Ok(PackageProbe {
        context,
        legacy_version,
        custom_versions,
    })
}

fn read_custom_versions<A: Archive + ?Sized>(ar: &mut A, legacy: i32) -> Result<Vec<CustomVersion>> {
    let count: i32 = ar.load()?;
    if count < 0 {
        return Err(ArchiveError::NegativeCount(i64::from(count)));
    }

    let mut versions = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let entry = if legacy == -2 {
            let tag: i32 = ar.load()?;
            let version: i32 = ar.load()?;
            CustomVersion {
                key: Guid::new(tag as u32, 0, 0, 0),
                version,
                friendly_name: None,
            }
        } else if legacy >= -5 {
            let key: Guid = ar.load()?;
            let version: i32 = ar.load()?;
            let name: FString = ar.load()?;
            CustomVersion {
                key,
                version,
                friendly_name: Some(name.to_string_lossy().into_owned()),
            }
        } else {
            let key: Guid = ar.load()?;
            let version: i32 = ar.load()?;
            CustomVersion {
                key,
                version,
                friendly_name: None,
            }
        };
        versions.push(entry);
    }
    Ok(versions)
}

/// Editor/server strip flags written in front of cooked UE4 objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripDataFlags {
    global: u8,
    class: u8,
}

impl StripDataFlags {
    /// Serialize strip flags when the archive version carries them
    pub fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        self.serialize_since(ar, ue4::VER_UE4_REMOVED_STRIP_DATA)
    }

    /// Serialize strip flags introduced at `min_version`
    pub fn serialize_since<A: Archive + ?Sized>(&mut self, ar: &mut A, min_version: i32) -> Result<()> {
        if ar.context().version() >= min_version {
            ar.transfer(&mut self.global)?;
            ar.transfer(&mut self.class)?;
        } else if ar.is_loading() {
            *self = Self::default();
        }
        Ok(())
    }

    /// Editor-only data was removed
    pub const fn is_editor_data_stripped(&self) -> bool {
        self.global & 1 != 0
    }

    /// Server-only data was removed
    pub const fn is_server_data_stripped(&self) -> bool {
        self.global & 2 != 0
    }

    /// Class-specific data selected by `flag` was removed
    pub const fn is_class_data_stripped(&self, flag: u8) -> bool {
        self.class & flag != 0
    }
}

/// Read a Vengeance-family object header when the licensee version
/// carries one
pub fn read_vengeance_header<A: Archive + ?Sized>(ar: &mut A, min_licensee: i32) -> Result<()> {
    let context = *ar.context();
    if !context.quirks().vengeance_header || context.licensee_version() < min_licensee {
        return Ok(());
    }

    let position = ar.tell();
    let check: i32 = ar.load()?;
    match check {
        3 => {
            let _version: i32 = ar.load()?;
            let _sub_version: i32 = ar.load()?;
        }
        4 => {
            let _sub_version: i32 = ar.load()?;
        }
        check => return Err(ArchiveError::VengeanceHeader { check, position }),
    }
    Ok(())
}
