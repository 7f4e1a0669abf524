//! Math, colour and guid primitives
//!
//! Profile-specific layout patches are applied after the core fields, using
//! the flags in [`crate::profile::LayoutQuirks`].

use std::fmt;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::error::Result;
use crate::{raw_type, simple_type};

/// 3D vector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Vector {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vector {
    /// Create a vector
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

simple_type!(Vector { x: f32, y: f32, z: f32 } applies |ctx| ctx.quirks().vector_padding == 0);

impl Serializable for Vector {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.x)?;
        ar.transfer(&mut self.y)?;
        ar.transfer(&mut self.z)?;
        let padding = ar.context().quirks().vector_padding;
        if padding > 0 {
            ar.skip_bytes(u64::from(padding))?;
        }
        Ok(())
    }
}

/// Rotation in 16.16 fixed-point angle units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Rotator {
    /// Pitch
    pub pitch: i32,
    /// Yaw
    pub yaw: i32,
    /// Roll
    pub roll: i32,
}

impl Rotator {
    /// Create a rotator
    pub const fn new(pitch: i32, yaw: i32, roll: i32) -> Self {
        Self { pitch, yaw, roll }
    }
}

simple_type!(Rotator { pitch: i32, yaw: i32, roll: i32 } applies |ctx| !ctx.quirks().rotator_rescale);

impl Serializable for Rotator {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.pitch)?;
        ar.transfer(&mut self.yaw)?;
        ar.transfer(&mut self.roll)?;
        if ar.is_loading() && ar.context().quirks().rotator_rescale {
            self.pitch /= 65536;
            self.yaw = self.yaw / 65536 - 692;
            self.roll = self.roll / 65536 - 692;
        }
        Ok(())
    }
}

/// Quaternion
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Quat {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

simple_type!(Quat { x: f32, y: f32, z: f32, w: f32 });

impl Serializable for Quat {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.x)?;
        ar.transfer(&mut self.y)?;
        ar.transfer(&mut self.z)?;
        ar.transfer(&mut self.w)
    }
}

/// Coordinate system: origin and three axes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Coords {
    /// Origin
    pub origin: Vector,
    /// X axis
    pub x_axis: Vector,
    /// Y axis
    pub y_axis: Vector,
    /// Z axis
    pub z_axis: Vector,
}

simple_type!(
    Coords { origin: Vector, x_axis: Vector, y_axis: Vector, z_axis: Vector }
    applies |ctx| ctx.quirks().vector_padding == 0
);

impl Serializable for Coords {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.origin)?;
        ar.transfer(&mut self.x_axis)?;
        ar.transfer(&mut self.y_axis)?;
        ar.transfer(&mut self.z_axis)
    }
}

/// Plane `x*X + y*Y + z*Z = w`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Plane {
    /// X coefficient
    pub x: f32,
    /// Y coefficient
    pub y: f32,
    /// Z coefficient
    pub z: f32,
    /// Distance
    pub w: f32,
}

simple_type!(Plane { x: f32, y: f32, z: f32, w: f32 });

impl Serializable for Plane {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.x)?;
        ar.transfer(&mut self.y)?;
        ar.transfer(&mut self.z)?;
        ar.transfer(&mut self.w)
    }
}

/// 4x4 matrix stored as four planes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Matrix {
    /// First row
    pub x_plane: Plane,
    /// Second row
    pub y_plane: Plane,
    /// Third row
    pub z_plane: Plane,
    /// Fourth row
    pub w_plane: Plane,
}

simple_type!(Matrix { x_plane: Plane, y_plane: Plane, z_plane: Plane, w_plane: Plane });

impl Serializable for Matrix {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.x_plane)?;
        ar.transfer(&mut self.y_plane)?;
        ar.transfer(&mut self.z_plane)?;
        ar.transfer(&mut self.w_plane)
    }
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoxBounds {
    /// Minimum corner
    pub min: Vector,
    /// Maximum corner
    pub max: Vector,
    /// Non-zero when the box is valid
    pub is_valid: u8,
}

impl Serializable for BoxBounds {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.min)?;
        ar.transfer(&mut self.max)?;
        if ar.context().quirks().box_validity_byte {
            ar.transfer(&mut self.is_valid)?;
        } else if ar.is_loading() {
            self.is_valid = 1;
        }
        Ok(())
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sphere {
    /// Centre
    pub center: Vector,
    /// Radius
    pub radius: f32,
}

impl Serializable for Sphere {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.center)?;
        if ar.context().quirks().sphere_radius {
            ar.transfer(&mut self.radius)?;
        }
        Ok(())
    }
}

/// Scale with shear
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scale {
    /// Per-axis scale
    pub scale: Vector,
    /// Shear amount
    pub sheer_rate: f32,
    /// Shear axis selector
    pub sheer_axis: u8,
}

impl Serializable for Scale {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.scale)?;
        ar.transfer(&mut self.sheer_rate)?;
        ar.transfer(&mut self.sheer_axis)
    }
}

raw_type!(BoxBounds, Sphere, Scale);

/// 8-bit RGBA colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Color {
    /// Create a colour
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

simple_type!(Color { r: u8, g: u8, b: u8, a: u8 });

impl Serializable for Color {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.r)?;
        ar.transfer(&mut self.g)?;
        ar.transfer(&mut self.b)?;
        ar.transfer(&mut self.a)
    }
}

/// Floating-point RGBA colour
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct LinearColor {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

simple_type!(LinearColor { r: f32, g: f32, b: f32, a: f32 });

impl Serializable for LinearColor {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.r)?;
        ar.transfer(&mut self.g)?;
        ar.transfer(&mut self.b)?;
        ar.transfer(&mut self.a)
    }
}

/// 128-bit identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Guid {
    /// First word
    pub a: u32,
    /// Second word
    pub b: u32,
    /// Third word
    pub c: u32,
    /// Fourth word
    pub d: u32,
}

impl Guid {
    /// Create a guid from its four words
    pub const fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}{:08X}{:08X}", self.a, self.b, self.c, self.d)
    }
}

simple_type!(Guid { a: u32, b: u32, c: u32, d: u32 } applies |ctx| !ctx.quirks().guid_trailing_field);

impl Serializable for Guid {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.a)?;
        ar.transfer(&mut self.b)?;
        ar.transfer(&mut self.c)?;
        ar.transfer(&mut self.d)?;
        if ar.context().quirks().guid_trailing_field {
            ar.skip_bytes(4)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::{MemReader, MemWriter};
    use crate::containers::TArray;
    use crate::profile::{ArchiveContext, Game, GameProfile, Platform};
    use crate::type_info::{Layout, TypeInfo};

    fn context(game: Game, version: i32, licensee: i32) -> ArchiveContext {
        ArchiveContext::new(version, licensee, GameProfile::new(game, Platform::Pc))
    }

    #[test]
    fn test_layouts() {
        assert_eq!(Vector::LAYOUT.simple_size(), Some(12));
        assert_eq!(Coords::LAYOUT.simple_size(), Some(48));
        assert_eq!(Matrix::LAYOUT.simple_size(), Some(64));
        assert_eq!(Color::LAYOUT.simple_size(), Some(4));
        assert_eq!(Sphere::LAYOUT, Layout::Raw);
        let plain = ArchiveContext::default();
        assert!(Vector::simple_layout_applies(&plain));
        assert!(!Vector::simple_layout_applies(&context(Game::EndWar, 300, 0)));
    }

    #[test]
    fn test_endwar_vector_padding() {
        let ctx = context(Game::EndWar, 300, 0);
        let mut writer = MemWriter::new().with_context(ctx);
        writer.store(&Vector::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(writer.as_bytes().len(), 16);

        let bytes = writer.into_inner();
        let mut reader = MemReader::new(&bytes).with_context(ctx);
        assert_eq!(reader.load::<Vector>().unwrap(), Vector::new(1.0, 2.0, 3.0));
        assert!(reader.is_eof());
    }

    #[test]
    fn test_tna_rotator_rescale() {
        let mut data = Vec::new();
        for value in [3 * 65536i32, 700 * 65536, 692 * 65536] {
            data.extend_from_slice(&value.to_le_bytes());
        }

        let mut reader = MemReader::new(&data).with_context(context(Game::Tna, 395, 0));
        assert_eq!(reader.load::<Rotator>().unwrap(), Rotator::new(3, 8, 0));

        let mut reader = MemReader::new(&data).with_context(context(Game::Tna, 390, 0));
        assert_eq!(
            reader.load::<Rotator>().unwrap(),
            Rotator::new(3 * 65536, 700 * 65536, 692 * 65536)
        );
    }

    #[test]
    fn test_rotator_array_honours_rescale() {
        let mut data = 2i32.to_le_bytes().to_vec();
        for _ in 0..2 {
            for value in [65536i32, 693 * 65536, 692 * 65536] {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        let mut reader = MemReader::new(&data).with_context(context(Game::Tna, 400, 0));
        let rotators: TArray<Rotator> = reader.load().unwrap();
        assert_eq!(rotators[1], Rotator::new(1, 1, 0));
    }

    #[test]
    fn test_fury_guid_trailing_field() {
        let data: Vec<u8> = (1u8..=20).collect();
        let mut reader = MemReader::new(&data).with_context(context(Game::Fury, 500, 24));
        let guid: Guid = reader.load().unwrap();
        assert_eq!(guid.a, 0x0403_0201);
        assert_eq!(reader.tell(), 20);

        let mut reader = MemReader::new(&data).with_context(context(Game::Fury, 500, 23));
        reader.load::<Guid>().unwrap();
        assert_eq!(reader.tell(), 16);
    }

    #[test]
    fn test_box_validity_byte() {
        let ue2x = context(Game::Uc2, 151, 0);
        let data = [0u8; 24];
        let mut reader = MemReader::new(&data).with_context(ue2x);
        let bounds: BoxBounds = reader.load().unwrap();
        assert_eq!(bounds.is_valid, 1);
        assert!(reader.is_eof());

        let mut writer = MemWriter::new().with_context(context(Game::Ue3, 500, 0));
        writer.store(&bounds).unwrap();
        assert_eq!(writer.as_bytes().len(), 25);
    }

    #[test]
    fn test_sphere_radius_version() {
        let mut writer = MemWriter::new().with_context(context(Game::Ue1, 60, 0));
        writer
            .store(&Sphere {
                center: Vector::new(0.0, 0.0, 1.0),
                radius: 5.0,
            })
            .unwrap();
        assert_eq!(writer.as_bytes().len(), 12);

        let mut writer = MemWriter::new().with_context(context(Game::Ue1, 61, 0));
        writer.store(&Sphere::default()).unwrap();
        assert_eq!(writer.as_bytes().len(), 16);
    }

    #[test]
    fn test_color_byte_order() {
        let mut writer = MemWriter::new().with_reverse_bytes(true);
        writer
            .transfer(&mut TArray::from(vec![Color::new(1, 2, 3, 4)]))
            .unwrap();
        assert_eq!(&writer.as_bytes()[4..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_guid_display() {
        let guid = Guid::new(0xDEAD_BEEF, 1, 0x10, 0xFFFF_FFFF);
        assert_eq!(guid.to_string(), "DEADBEEF0000000100000010FFFFFFFF");
    }
}
