//! Per-type layout descriptors
//!
//! Containers pick their serialization strategy from [`TypeInfo::LAYOUT`]:
//!
//! - [`Layout::Simple`]: the type is a run of identical scalar fields, so an
//!   array of it is transferred as one block followed by one byte-order pass.
//! - [`Layout::Raw`]: elements are serialized one at a time into slots that
//!   are reused rather than rebuilt.
//! - [`Layout::Generic`]: existing elements are dropped and every element is
//!   default-constructed before its own serializer runs.

use crate::profile::ArchiveContext;

/// On-disk shape of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Per-element serialization with fresh elements
    Generic,
    /// Per-element serialization into reused slots
    Raw,
    /// Homogeneous scalar run
    Simple {
        /// Number of scalar fields
        field_count: usize,
        /// Width of one field in bytes
        field_width: usize,
    },
}

impl Layout {
    /// Disk size of one simple element
    pub const fn simple_size(self) -> Option<usize> {
        match self {
            Self::Simple {
                field_count,
                field_width,
            } => Some(field_count * field_width),
            _ => None,
        }
    }
}

/// Bulk conversion between a simple type and its little-endian field bytes
pub struct SimpleCodec<T> {
    /// Decode one element from `field_count * field_width` bytes
    pub decode: fn(&[u8]) -> T,
    /// Encode one element into `field_count * field_width` bytes
    pub encode: fn(&T, &mut [u8]),
}

/// Layout descriptor of a serializable type
pub trait TypeInfo: Sized {
    /// Static shape
    const LAYOUT: Layout = Layout::Generic;

    /// Whether the simple fast path is valid under this context
    ///
    /// A profile quirk that pads or rescales a simple type disables it.
    fn simple_layout_applies(_context: &ArchiveContext) -> bool {
        matches!(Self::LAYOUT, Layout::Simple { .. })
    }

    /// Field codec of a simple type
    fn simple_codec() -> Option<SimpleCodec<Self>> {
        None
    }
}

/// Scalar or aggregate that maps onto a run of equally sized fields
pub trait SimpleField: Sized + Copy {
    /// Width of one scalar field
    const FIELD_WIDTH: usize;
    /// Number of scalar fields
    const FIELD_COUNT: usize;

    /// Decode from little-endian bytes
    fn decode_le(bytes: &[u8]) -> Self;

    /// Encode to little-endian bytes
    fn encode_le(&self, out: &mut [u8]);
}

macro_rules! scalar_fields {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SimpleField for $ty {
                const FIELD_WIDTH: usize = std::mem::size_of::<$ty>();
                const FIELD_COUNT: usize = 1;

                fn decode_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }

                fn encode_le(&self, out: &mut [u8]) {
                    out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }
            }

            impl TypeInfo for $ty {
                const LAYOUT: Layout = Layout::Simple {
                    field_count: 1,
                    field_width: std::mem::size_of::<$ty>(),
                };

                fn simple_codec() -> Option<SimpleCodec<Self>> {
                    Some(SimpleCodec {
                        decode: <$ty as SimpleField>::decode_le,
                        encode: <$ty as SimpleField>::encode_le,
                    })
                }
            }
        )*
    };
}

scalar_fields!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Declare a struct as a simple type made of equally wide fields
///
/// Fields are listed in disk order. The field widths and the struct size
/// are checked at compile time. An optional `applies` clause disables the
/// fast path for contexts that change the type's disk form.
///
/// ```ignore
/// simple_type!(Vector { x: f32, y: f32, z: f32 } applies |ctx| ctx.quirks().vector_padding == 0);
/// ```
#[macro_export]
macro_rules! simple_type {
    (@first_width $first:ty $(, $rest:ty)*) => {
        <$first as $crate::type_info::SimpleField>::FIELD_WIDTH
    };
    ($ty:ident { $($field:ident : $fty:ty),+ $(,)? } $(applies |$ctx:ident| $cond:expr)?) => {
        impl $crate::type_info::SimpleField for $ty {
            const FIELD_WIDTH: usize = $crate::simple_type!(@first_width $($fty),+);
            const FIELD_COUNT: usize = 0 $(+ <$fty as $crate::type_info::SimpleField>::FIELD_COUNT)+;

            fn decode_le(bytes: &[u8]) -> Self {
                let mut offset = 0usize;
                $(
                    let $field = <$fty as $crate::type_info::SimpleField>::decode_le(&bytes[offset..]);
                    offset += <$fty as $crate::type_info::SimpleField>::FIELD_COUNT
                        * <$fty as $crate::type_info::SimpleField>::FIELD_WIDTH;
                )+
                let _ = offset;
                Self { $($field),+ }
            }

            fn encode_le(&self, out: &mut [u8]) {
                let mut offset = 0usize;
                $(
                    <$fty as $crate::type_info::SimpleField>::encode_le(&self.$field, &mut out[offset..]);
                    offset += <$fty as $crate::type_info::SimpleField>::FIELD_COUNT
                        * <$fty as $crate::type_info::SimpleField>::FIELD_WIDTH;
                )+
                let _ = offset;
            }
        }

        const _: () = {
            let width = <$ty as $crate::type_info::SimpleField>::FIELD_WIDTH;
            $(
                assert!(
                    <$fty as $crate::type_info::SimpleField>::FIELD_WIDTH == width,
                    "simple type fields must share one width"
                );
            )+
            assert!(
                std::mem::size_of::<$ty>()
                    == <$ty as $crate::type_info::SimpleField>::FIELD_COUNT * width,
                "simple type size must equal field_count * field_width"
            );
        };

        impl $crate::type_info::TypeInfo for $ty {
            const LAYOUT: $crate::type_info::Layout = $crate::type_info::Layout::Simple {
                field_count: <$ty as $crate::type_info::SimpleField>::FIELD_COUNT,
                field_width: <$ty as $crate::type_info::SimpleField>::FIELD_WIDTH,
            };

            $(
                fn simple_layout_applies($ctx: &$crate::profile::ArchiveContext) -> bool {
                    $cond
                }
            )?

            fn simple_codec() -> Option<$crate::type_info::SimpleCodec<Self>> {
                Some($crate::type_info::SimpleCodec {
                    decode: <$ty as $crate::type_info::SimpleField>::decode_le,
                    encode: <$ty as $crate::type_info::SimpleField>::encode_le,
                })
            }
        }
    };
}

/// Declare types whose elements are serialized into reused slots
#[macro_export]
macro_rules! raw_type {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::type_info::TypeInfo for $ty {
                const LAYOUT: $crate::type_info::Layout = $crate::type_info::Layout::Raw;
            }
        )+
    };
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    #[repr(C)]
    struct Triple {
        a: f32,
        b: f32,
        c: f32,
    }

    crate::simple_type!(Triple { a: f32, b: f32, c: f32 });

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    #[repr(C)]
    struct Pair {
        first: Triple,
        second: Triple,
    }

    crate::simple_type!(Pair { first: Triple, second: Triple } applies |ctx| ctx.version() > 100);

    #[test]
    fn test_scalar_layout() {
        assert_eq!(
            <u16 as TypeInfo>::LAYOUT,
            Layout::Simple {
                field_count: 1,
                field_width: 2
            }
        );
        assert_eq!(<f64 as TypeInfo>::LAYOUT.simple_size(), Some(8));
    }

    #[test]
    fn test_nested_simple_layout() {
        assert_eq!(
            Pair::LAYOUT,
            Layout::Simple {
                field_count: 6,
                field_width: 4
            }
        );
        let value = Pair {
            first: Triple {
                a: 1.0,
                b: 2.0,
                c: 3.0,
            },
            second: Triple {
                a: 4.0,
                b: 5.0,
                c: 6.0,
            },
        };
        let codec = Pair::simple_codec().unwrap();
        let mut bytes = [0u8; 24];
        (codec.encode)(&value, &mut bytes);
        assert_eq!(&bytes[12..16], &4.0f32.to_le_bytes());
        assert_eq!((codec.decode)(&bytes), value);
    }

    #[test]
    fn test_applies_clause() {
        let old = ArchiveContext::new(
            90,
            0,
            crate::profile::GameProfile::default(),
        );
        assert!(!Pair::simple_layout_applies(&old));
        assert!(Triple::simple_layout_applies(&old));
    }
}
