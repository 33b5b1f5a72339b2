#![allow(unused_macros)]

/// Helper macro for locking items, propagating poisoning as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Declares a fixed-layout, pointer-free record together with its [`crate::lwm::Packable`]
/// implementation. Fields are packed in declaration order.
///
/// ```rust, ignore
/// agnostic! {
///     /// Key of a two-handle query
///     DLDL { a: u64, b: u64 }
/// }
/// ```
macro_rules! agnostic {
    ($(
        $(#[$meta:meta])*
        $name:ident { $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)? }
    )*) => {$(
        $(#[$meta])*
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl crate::lwm::Packable for $name {
            fn pack(&self, writer: &mut crate::file::Writer) -> crate::Result<()> {
                $( crate::lwm::Packable::pack(&self.$field, writer)?; )*
                Ok(())
            }

            fn unpack(parser: &mut crate::file::Parser<'_>) -> crate::Result<Self> {
                Ok($name {
                    $( $field: <$ty as crate::lwm::Packable>::unpack(parser)?, )*
                })
            }
        }
    )*};
}

/// Declares a packet id enum and the matching table of optional maps.
///
/// Every entry becomes one enum variant with the given wire id and one `Option<map>` field.
/// Entries must be listed in ascending id order; that is the order packets are written in.
macro_rules! packet_table {
    (
        $(#[$emeta:meta])* enum $enum:ident;
        $(#[$smeta:meta])* struct $table:ident;
        $( $(#[$vmeta:meta])* $variant:ident = $id:literal => $field:ident : $ty:ty ),* $(,)?
    ) => {
        $(#[$emeta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::strum::EnumIter,
            ::strum::EnumCount,
            ::strum::FromRepr,
            ::strum::IntoStaticStr,
        )]
        #[repr(u16)]
        pub enum $enum {
            $( $(#[$vmeta])* $variant = $id, )*
        }

        $(#[$smeta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $table {
            $( pub(crate) $field: Option<$ty>, )*
        }

        impl $table {
            pub(crate) fn write_to(&self, writer: &mut crate::file::Writer) -> crate::Result<()> {
                $(
                    if let Some(map) = &self.$field {
                        crate::lwm::write_packet(writer, $enum::$variant as u16, map)?;
                    }
                )*
                Ok(())
            }

            pub(crate) fn read_packet(&mut self, packet: $enum, body: &[u8]) -> crate::Result<()> {
                match packet {
                    $(
                        $enum::$variant => {
                            if self.$field.is_some() {
                                return Err(malformed_error!("Duplicate packet {:?}", packet));
                            }
                            self.$field = Some(crate::lwm::read_packet_body::<$ty>(body)?);
                        }
                    )*
                }
                Ok(())
            }

            /// Number of records held by every present packet, in id order.
            #[must_use]
            pub fn counts(&self) -> Vec<($enum, usize)> {
                let mut counts = Vec::new();
                $(
                    if let Some(map) = &self.$field {
                        counts.push(($enum::$variant, crate::lwm::PacketMap::count(map)));
                    }
                )*
                counts
            }

            /// True if no packet is present.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }
        }
    };
}
