//! The JIT-EE data model.
//!
//! These are the *live* shapes exchanged between a JIT and an execution engine during one
//! compilation: opaque handles, tokens, signatures and the various info structures. They own
//! their variable-length data (`Vec<u8>`) and use native-width handles. The method context
//! converts them into pointer-free agnostic records when recording and back when replaying.
//!
//! # Key Components
//!
//! - Handle newtypes: [`MethodHandle`], [`ClassHandle`], [`ModuleHandle`], [`ContextHandle`],
//!   [`FieldHandle`], [`ArgListHandle`]
//! - [`Token`], [`CorInfoTokenKind`], [`CorInfoType`], [`CorJitResult`], [`CorInfoInline`],
//!   [`CorInfoInitClassResult`]
//! - Query results: [`ResolvedToken`], [`SigInfo`], [`MethodInfo`], [`CallInfo`], [`FieldInfo`]
//! - [`JitEeInterface`] / [`JitCompiler`] - the two sides of the boundary

mod helpers;
mod interface;
mod token;

pub use helpers::{helper_id, helper_name, HELPER_COUNT};
pub use interface::{JitCompiler, JitEeInterface};
pub use token::Token;

use std::fmt;

use bitflags::bitflags;
use strum::{EnumIter, FromRepr, IntoStaticStr};

use crate::Result;

macro_rules! handle_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub usize);

        impl $name {
            /// The null handle
            pub const NULL: $name = $name(0);

            /// True for the null handle
            #[must_use]
            pub fn is_null(&self) -> bool {
                self.0 == 0
            }

            /// Widens to the fixed 64-bit agnostic representation.
            #[must_use]
            pub fn cast(&self) -> u64 {
                self.0 as u64
            }

            /// Narrows an agnostic value back to a native handle.
            ///
            /// # Errors
            /// Returns [`crate::Error::Malformed`] if the value does not fit the native width,
            /// which happens when a 64-bit capture is replayed in a 32-bit process.
            pub fn uncast(value: u64) -> Result<Self> {
                match usize::try_from(value) {
                    Ok(handle) => Ok($name(handle)),
                    Err(_) => Err(malformed_error!(
                        "{} 0x{:x} does not fit a native handle",
                        stringify!($name),
                        value
                    )),
                }
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                $name(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:x}", self.0)
            }
        }
    )*};
}

handle_type!(
    /// Opaque EE handle of a method
    MethodHandle,
    /// Opaque EE handle of a class or type
    ClassHandle,
    /// Opaque EE handle of a module (token scope)
    ModuleHandle,
    /// Opaque EE handle of a generic context (method or class, tagged)
    ContextHandle,
    /// Opaque EE handle of a field
    FieldHandle,
    /// Opaque EE cursor into a signature's argument list
    ArgListHandle,
);

bitflags! {
    /// What a token is being resolved for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CorInfoTokenKind: u32 {
        /// Resolves to a class
        const CLASS = 0x01;
        /// Resolves to a method
        const METHOD = 0x02;
        /// Resolves to a field
        const FIELD = 0x04;
        /// Mask of the three base kinds
        const MASK = 0x07;
        /// `ldtoken`
        const LDTOKEN = 0x10 | 0x01 | 0x02 | 0x04;
        /// `castclass` / `isinst`
        const CASTING = 0x20 | 0x01;
        /// `newarr`
        const NEWARR = 0x40 | 0x01;
        /// `box`
        const BOX = 0x80 | 0x01;
        /// `constrained.` prefix
        const CONSTRAINED = 0x100 | 0x01;
        /// `newobj`
        const NEWOBJ = 0x200 | 0x02;
    }
}

impl Default for CorInfoTokenKind {
    fn default() -> Self {
        CorInfoTokenKind::empty()
    }
}

bitflags! {
    /// Answer to `initClass`. The empty set means no initialization is required.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CorInfoInitClassResult: u32 {
        /// The class is already initialized
        const INITIALIZED = 0x01;
        /// The JIT must call the class initialization helper
        const USE_HELPER = 0x02;
        /// The requesting method must not be inlined
        const DONT_INLINE = 0x04;
    }
}

impl Default for CorInfoInitClassResult {
    fn default() -> Self {
        CorInfoInitClassResult::empty()
    }
}

/// Primitive classification of a type, as reported by the EE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum CorInfoType {
    #[default]
    Undef = 0x0,
    Void = 0x1,
    Bool = 0x2,
    Char = 0x3,
    Byte = 0x4,
    UByte = 0x5,
    Short = 0x6,
    UShort = 0x7,
    Int = 0x8,
    UInt = 0x9,
    Long = 0xa,
    ULong = 0xb,
    NativeInt = 0xc,
    NativeUInt = 0xd,
    Float = 0xe,
    Double = 0xf,
    String = 0x10,
    Ptr = 0x11,
    Byref = 0x12,
    ValueClass = 0x13,
    Class = 0x14,
    RefAny = 0x15,
    Var = 0x16,
}

impl CorInfoType {
    /// Decodes an agnostic value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for values outside the enumeration.
    pub fn from_u32(value: u32) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(CorInfoType::from_repr)
            .ok_or_else(|| malformed_error!("Invalid CorInfoType {}", value))
    }

    /// Short type name used in method display names.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            CorInfoType::Undef => "undef",
            CorInfoType::Void => "void",
            CorInfoType::Bool => "bool",
            CorInfoType::Char => "char",
            CorInfoType::Byte => "byte",
            CorInfoType::UByte => "ubyte",
            CorInfoType::Short => "short",
            CorInfoType::UShort => "ushort",
            CorInfoType::Int => "int",
            CorInfoType::UInt => "uint",
            CorInfoType::Long => "long",
            CorInfoType::ULong => "ulong",
            CorInfoType::NativeInt => "nativeint",
            CorInfoType::NativeUInt => "nativeuint",
            CorInfoType::Float => "float",
            CorInfoType::Double => "double",
            CorInfoType::String => "string",
            CorInfoType::Ptr => "ptr",
            CorInfoType::Byref => "byref",
            CorInfoType::ValueClass => "valueclass",
            CorInfoType::Class => "class",
            CorInfoType::RefAny => "refany",
            CorInfoType::Var => "var",
        }
    }

    /// True for types whose display name comes from their class handle.
    #[must_use]
    pub fn is_class_like(&self) -> bool {
        matches!(self, CorInfoType::Class | CorInfoType::ValueClass)
    }
}

/// Outcome of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum CorJitResult {
    #[default]
    Ok = 0,
    BadCode = 0x8000_0001,
    OutOfMem = 0x8000_0002,
    InternalError = 0x8000_0003,
    Skipped = 0x8000_0004,
    RecoverableError = 0x8000_0005,
    ImplLimitation = 0x8000_0006,
}

impl CorJitResult {
    /// Decodes an agnostic value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for values outside the enumeration.
    pub fn from_u32(value: u32) -> Result<Self> {
        CorJitResult::from_repr(value).ok_or_else(|| malformed_error!("Invalid CorJitResult 0x{:x}", value))
    }
}

/// Answer to an inlining query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromRepr, IntoStaticStr)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum CorInfoInline {
    #[default]
    Pass = 0,
    PrejitSuccess = 1,
    CheckCanInlineSuccess = 2,
    CheckCanInlineVmFail = 3,
    Fail = -1,
    Never = -2,
}

impl CorInfoInline {
    /// Decodes an agnostic value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for values outside the enumeration.
    pub fn from_i32(value: i32) -> Result<Self> {
        CorInfoInline::from_repr(value).ok_or_else(|| malformed_error!("Invalid CorInfoInline {}", value))
    }
}

/// Calling-convention bit marking an instance method.
pub const CALLCONV_HASTHIS: u8 = 0x20;

/// A token resolution request and its answer.
///
/// The first four fields are the input, the rest are filled in by the EE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct ResolvedToken {
    pub token_context: ContextHandle,
    pub token_scope: ModuleHandle,
    pub token: Token,
    pub token_type: CorInfoTokenKind,
    pub h_class: ClassHandle,
    pub h_method: MethodHandle,
    pub h_field: FieldHandle,
    pub type_spec: Vec<u8>,
    pub method_spec: Vec<u8>,
}

impl ResolvedToken {
    /// A request with empty outputs
    #[must_use]
    pub fn new(
        token_context: ContextHandle,
        token_scope: ModuleHandle,
        token: Token,
        token_type: CorInfoTokenKind,
    ) -> Self {
        ResolvedToken {
            token_context,
            token_scope,
            token,
            token_type,
            ..ResolvedToken::default()
        }
    }
}

/// A method or local-variable signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct SigInfo {
    pub call_conv: u8,
    pub ret_type: CorInfoType,
    pub ret_type_class: ClassHandle,
    pub num_args: u16,
    pub args: ArgListHandle,
    pub class_inst: Vec<ClassHandle>,
    pub method_inst: Vec<ClassHandle>,
    pub sig: Vec<u8>,
    pub scope: ModuleHandle,
    pub token: Token,
}

impl SigInfo {
    /// True if the signature has an implicit `this` argument
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.call_conv & CALLCONV_HASTHIS != 0
    }
}

/// Everything the JIT needs to start compiling a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct MethodInfo {
    pub ftn: MethodHandle,
    pub scope: ModuleHandle,
    pub il_code: Vec<u8>,
    pub max_stack: u32,
    pub eh_count: u32,
    pub options: u32,
    pub reg_alloc_hint: u32,
    pub args: SigInfo,
    pub locals: SigInfo,
}

/// One exception-handling clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct EhClause {
    pub flags: u32,
    pub try_offset: u32,
    pub try_length: u32,
    pub handler_offset: u32,
    pub handler_length: u32,
    pub class_token_or_offset: u32,
}

/// How a call site should be emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct CallInfo {
    pub h_method: MethodHandle,
    pub method_flags: u32,
    pub class_flags: u32,
    pub sig: SigInfo,
    pub access_allowed: u32,
    pub kind: u32,
    pub this_transform: u32,
    pub context_handle: ContextHandle,
    pub exact_context_needs_runtime_lookup: bool,
    pub entry_point: u64,
    pub null_instance_check: bool,
}

/// How a field access should be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct FieldInfo {
    pub field_accessor: u32,
    pub field_flags: u32,
    pub helper: u32,
    pub offset: u32,
    pub field_type: CorInfoType,
    pub struct_type: ClassHandle,
    pub access_allowed: u32,
}

/// An address plus the indirection needed to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct ConstLookup {
    pub addr: u64,
    pub access_type: u32,
}

/// Where a virtual method's slot lives: the chunk pointer offset within the method table, then
/// the slot offset within the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct VTableOffset {
    pub offset_of_indirection: u32,
    pub offset_after_indirection: u32,
    pub is_relative: bool,
}

/// The GS security cookie value and its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct GsCookie {
    pub value: u64,
    pub addr: u64,
}

/// Profile data collected for a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct PgoResults {
    pub schema: Vec<u8>,
    pub data: Vec<u8>,
    pub source: u32,
}

/// Code memory requested by the JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct AllocMemRequest {
    pub hot_size: u32,
    pub cold_size: u32,
    pub ro_data_size: u32,
    pub flags: u32,
}

/// Addresses of the blocks handed out for an [`AllocMemRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct AllocMemBlocks {
    pub hot: u64,
    pub cold: u64,
    pub ro_data: u64,
}

/// A relocation reported by the JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct Relocation {
    pub location: u64,
    pub target: u64,
    pub reloc_type: u16,
    pub addl_delta: i32,
}

/// One IL to native offset mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct BoundaryEntry {
    pub native_offset: u32,
    pub il_offset: u32,
    pub source: u32,
}

/// Unwind data for one function or funclet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct UnwindInfo {
    pub hot_code: u64,
    pub cold_code: u64,
    pub start_offset: u32,
    pub end_offset: u32,
    pub unwind: Vec<u8>,
    pub func_kind: u32,
}

/// What a JIT hands back after compiling a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct CompiledMethod {
    pub result: CorJitResult,
    pub native_size: u32,
    pub hot_code: Vec<u8>,
    pub cold_code: Vec<u8>,
    pub ro_data: Vec<u8>,
    pub gc_info: Vec<u8>,
}

impl CompiledMethod {
    /// A failed compilation with no output
    #[must_use]
    pub fn failed(result: CorJitResult) -> Self {
        CompiledMethod {
            result,
            ..CompiledMethod::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_cast_roundtrip() {
        let handle = MethodHandle(0x3000);
        assert_eq!(handle.cast(), 0x3000);
        assert_eq!(MethodHandle::uncast(0x3000).unwrap(), handle);
        assert!(MethodHandle::NULL.is_null());
        assert_eq!(format!("{:?}", ClassHandle(0x10)), "ClassHandle(0x10)");
    }

    #[test]
    fn enum_decoding() {
        assert_eq!(CorInfoType::from_u32(8).unwrap(), CorInfoType::Int);
        assert!(CorInfoType::from_u32(0x17).is_err());
        assert!(CorInfoType::from_u32(0x1_0008).is_err());
        assert_eq!(
            CorJitResult::from_u32(0x8000_0004).unwrap(),
            CorJitResult::Skipped
        );
        assert!(CorJitResult::from_u32(7).is_err());
        assert_eq!(CorInfoInline::from_i32(-2).unwrap(), CorInfoInline::Never);
    }

    #[test]
    fn token_kinds() {
        assert_eq!(CorInfoTokenKind::LDTOKEN.bits(), 0x17);
        assert_eq!(CorInfoTokenKind::NEWOBJ.bits(), 0x202);
        assert!(CorInfoTokenKind::NEWOBJ.contains(CorInfoTokenKind::METHOD));
        assert_eq!(
            CorInfoTokenKind::CONSTRAINED & CorInfoTokenKind::MASK,
            CorInfoTokenKind::CLASS
        );
    }

    #[test]
    fn sig_has_this() {
        let sig = SigInfo {
            call_conv: CALLCONV_HASTHIS,
            ..SigInfo::default()
        };
        assert!(sig.has_this());
        assert!(!SigInfo::default().has_this());
    }
}
