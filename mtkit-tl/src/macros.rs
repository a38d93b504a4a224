//! Declarative schema macros.
//!
//! [`tl_object!`](crate::tl_object) declares a constructor: the struct, its
//! tag, its field table and the codec impls, all from one field list.
//! Optional fields carry a `[flag N]` (value stored inline, field must be an
//! `Option`) or `[flag N bool]` (field is a `bool` living only in the flags
//! word) marker:
//!
//! ```
//! mtkit_tl::tl_object! {
//!     pub struct Channel = 0x1a2b3c4d {
//!         pub id: i64,
//!         pub title: Option<String> [flag 0],
//!         pub verified: bool [flag 2 bool],
//!     }
//! }
//! ```
//!
//! [`tl_enum!`](crate::tl_enum) groups constructors into a boxed type that
//! dispatches on the leading tag.

/// Declare a TL constructor. See the [module docs](crate::macros).
#[macro_export]
macro_rules! tl_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident = $id:literal {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $( [flag $bit:literal $($kind:ident)?] )?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $fty, )*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Object for $name {
            const FIELDS: &'static [$crate::FieldInfo] = &[
                $( $crate::FieldInfo {
                    name: stringify!($field),
                    meta: $crate::__tl_field_meta!($(flag $bit $($kind)?)?),
                }, )*
            ];

            const HAS_FLAGS: bool = false $( || $crate::__tl_is_flagged!($($bit)?) )*;

            fn flags(&self) -> u32 {
                0u32 $( | $crate::__tl_flag_bit!(self.$field $(, flag $bit $($kind)?)?) )*
            }

            fn serialize_bare(&self, buf: &mut impl Extend<u8>) {
                if <Self as $crate::Object>::HAS_FLAGS {
                    $crate::Serializable::serialize(&$crate::Object::flags(self), buf);
                }
                $( $crate::__tl_ser_field!(self.$field, buf $(, flag $bit $($kind)?)?); )*
            }

            fn deserialize_bare(
                buf: $crate::deserialize::Buffer,
            ) -> $crate::deserialize::Result<Self> {
                let flags: u32 = if <Self as $crate::Object>::HAS_FLAGS {
                    $crate::Deserializable::deserialize(buf)?
                } else {
                    0
                };
                let unclaimed = flags & !$crate::flags::claimed_bits(<Self as $crate::Object>::FIELDS);
                if unclaimed != 0 {
                    return Err($crate::Error::UnclaimedFlags { flags, unclaimed });
                }
                $( let $field: $fty = $crate::__tl_de_field!(buf, flags $(, flag $bit $($kind)?)?); )*
                Ok(Self { $($field),* })
            }
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $crate::Serializable::serialize(
                    &<Self as $crate::Identifiable>::CONSTRUCTOR_ID,
                    buf,
                );
                $crate::Object::serialize_bare(self, buf);
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(
                buf: $crate::deserialize::Buffer,
            ) -> $crate::deserialize::Result<Self> {
                buf.expect_tag(<Self as $crate::Identifiable>::CONSTRUCTOR_ID)?;
                <Self as $crate::Object>::deserialize_bare(buf)
            }
        }
    };
}

/// Declare a boxed type over several constructors declared with [`tl_object!`].
#[macro_export]
macro_rules! tl_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident($inner:ty) ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant($inner), )*
        }

        impl $name {
            /// Tag of the wrapped constructor.
            pub fn constructor_id(&self) -> u32 {
                match self {
                    $( Self::$variant(_) => <$inner as $crate::Identifiable>::CONSTRUCTOR_ID, )*
                }
            }
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $( Self::$variant(x) => $crate::Serializable::serialize(x, buf), )*
                }
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(
                buf: $crate::deserialize::Buffer,
            ) -> $crate::deserialize::Result<Self> {
                let tag = buf.peek_u32()?;
                $(
                    if tag == <$inner as $crate::Identifiable>::CONSTRUCTOR_ID {
                        buf.expect_tag(tag)?;
                        return <$inner as $crate::Object>::deserialize_bare(buf).map(Self::$variant);
                    }
                )*
                Err(buf.unknown_constructor(tag))
            }
        }

        $(
            impl From<$inner> for $name {
                fn from(x: $inner) -> Self { Self::$variant(x) }
            }
        )*
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tl_field_meta {
    () => { None };
    (flag $bit:literal) => { Some($crate::FieldMeta::value($bit)) };
    (flag $bit:literal bool) => { Some($crate::FieldMeta::bool_only($bit)) };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tl_is_flagged {
    () => { false };
    ($bit:literal) => { true };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tl_flag_bit {
    ($v:expr) => { 0u32 };
    ($v:expr, flag $bit:literal) => {
        (if $v.is_some() { 1u32 << $bit } else { 0 })
    };
    ($v:expr, flag $bit:literal bool) => {
        (if $v { 1u32 << $bit } else { 0 })
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tl_ser_field {
    ($v:expr, $buf:ident) => { $crate::Serializable::serialize(&$v, $buf) };
    // `Option<T>` writes nothing when `None`.
    ($v:expr, $buf:ident, flag $bit:literal) => { $crate::Serializable::serialize(&$v, $buf) };
    ($v:expr, $buf:ident, flag $bit:literal bool) => { () };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tl_de_field {
    ($buf:ident, $flags:ident) => { $crate::Deserializable::deserialize($buf)? };
    ($buf:ident, $flags:ident, flag $bit:literal) => {
        if $flags & (1u32 << $bit) != 0 {
            Some($crate::Deserializable::deserialize($buf)?)
        } else {
            None
        }
    };
    ($buf:ident, $flags:ident, flag $bit:literal bool) => {
        $flags & (1u32 << $bit) != 0
    };
}
