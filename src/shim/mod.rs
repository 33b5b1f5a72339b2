//! Capture and replay at the JIT-EE boundary.
//!
//! # Key Components
//!
//! - [`Interceptor`] - recording shim around a live [`crate::corinfo::JitEeInterface`]
//! - [`ReplayInterface`] / [`replay`] - a fake EE answering from a recorded context
//! - [`CaptureCompiler`] - a [`crate::corinfo::JitCompiler`] that captures every compilation
//! - [`CaptureSession`] - output file and thread registry for captured contexts
//! - [`CaptureConfig`] - output directory and paths, usually from the environment
//!
//! # Capturing
//!
//! A host that owns its sessions wraps the real JIT with [`CaptureCompiler::new`]. A host that
//! can only swap in a JIT object installs the real one with [`install_real_jit`] and hands out
//! [`get_jit`]; each compilation then records into the session the compiling thread has
//! entered, or into [`global_session`] configured from the environment.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use superpmi::shim::{CaptureCompiler, CaptureConfig, CaptureSession};
//! # fn real_jit() -> Arc<dyn superpmi::corinfo::JitCompiler> { unimplemented!() }
//!
//! let session = Arc::new(CaptureSession::new(CaptureConfig::from_env()?));
//! let jit = CaptureCompiler::new(real_jit(), session);
//! // hand `jit` to the runtime in place of the real one
//! # Ok::<(), superpmi::Error>(())
//! ```

mod compiler;
mod config;
mod interceptor;
mod replay;
mod session;

pub use compiler::CaptureCompiler;
pub use config::{CaptureConfig, ENV_JIT_PATH, ENV_LOG_FILE, ENV_OUTPUT_DIR};
pub use interceptor::Interceptor;
pub use replay::{replay, ReplayInterface};
pub use session::{get_jit, global_session, install_real_jit, CaptureSession, SessionGuard};
