//! # superpmi Prelude
//!
//! This module re-exports the types and traits most code touching method contexts needs:
//! recording and replaying queries, driving a JIT, and working with archives.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all superpmi operations
pub use crate::Error;

/// Coarse classification of errors
pub use crate::ErrorKind;

/// The result type used throughout superpmi
pub use crate::Result;

/// Low-level cursors over serialized data
pub use crate::{Parser, Writer};

// ================================================================================================
// Method Contexts
// ================================================================================================

/// Recorded compilations, their compile results and identity hashes
pub use crate::methodcontext::{
    CompileResult, CrPacket, MethodContext, MethodContextHash, Packet, MC_MAGIC,
};

/// Name and call-target helpers built on recorded data
pub use crate::methodcontext::{get_method_full_name, resolve_call_target, CallTarget};

// ================================================================================================
// JIT-EE Data Model
// ================================================================================================

/// Opaque handles handed out by the execution engine
pub use crate::corinfo::{
    ArgListHandle, ClassHandle, ContextHandle, FieldHandle, MethodHandle, ModuleHandle,
};

/// Query and answer structures
pub use crate::corinfo::{
    CallInfo, CompiledMethod, CorInfoInitClassResult, CorInfoInline, CorInfoTokenKind,
    CorInfoType, CorJitResult, FieldInfo, MethodInfo, ResolvedToken, SigInfo, Token,
    VTableOffset,
};

/// The two sides of the JIT-EE boundary
pub use crate::corinfo::{JitCompiler, JitEeInterface};

// ================================================================================================
// Capture and Replay
// ================================================================================================

/// Recording shim and replay driver
pub use crate::shim::{replay, CaptureCompiler, CaptureConfig, CaptureSession, ReplayInterface};

// ================================================================================================
// Archives
// ================================================================================================

/// `.mch` archives, `.mct` indexes and `.mcl` lists
pub use crate::archive::{Archive, MclList, MergeOptions, TableOfContents};
