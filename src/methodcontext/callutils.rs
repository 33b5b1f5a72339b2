//! Call targets and method display names.
//!
//! Method handles passed around the JIT-EE boundary are sometimes tagged in their two low bits:
//!
//! | bits | meaning                                      |
//! |------|----------------------------------------------|
//! | `01` | JIT helper, id in the bits above bit 1       |
//! | `10` | native (unmanaged) method, handle = `h & !3` |
//! | `00` | managed method                               |
//!
//! [`CallTarget`] decodes this once; [`CallTarget::encode`] reproduces the tagged form exactly.

use std::fmt::Write as _;

use crate::{
    corinfo::{helper_name, ClassHandle, CorInfoType, JitEeInterface, MethodHandle, SigInfo},
    methodcontext::{CompileResult, MethodContext},
};

/// Placeholder used where the EE supplied no name.
pub const UNKNOWN_NAME: &str = "<unknown>";

const HELPER_TAG: usize = 0x1;
const NATIVE_TAG: usize = 0x2;
const TAG_MASK: usize = 0x3;

/// A decoded, possibly tagged, method handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// A JIT helper, by helper id
    Helper(u32),
    /// A native method, with tag bits removed
    Native(MethodHandle),
    /// A managed method
    Managed(MethodHandle),
}

impl CallTarget {
    /// Classifies `handle` by its tag bits.
    ///
    /// ```rust
    /// use superpmi::corinfo::MethodHandle;
    /// use superpmi::methodcontext::CallTarget;
    ///
    /// assert_eq!(CallTarget::decode(MethodHandle((30 << 2) | 1)), CallTarget::Helper(30));
    /// assert_eq!(CallTarget::decode(MethodHandle(0x1002)), CallTarget::Native(MethodHandle(0x1000)));
    /// assert_eq!(CallTarget::decode(MethodHandle(0x1000)), CallTarget::Managed(MethodHandle(0x1000)));
    /// ```
    #[must_use]
    pub fn decode(handle: MethodHandle) -> Self {
        if handle.0 & HELPER_TAG != 0 {
            #[allow(clippy::cast_possible_truncation)]
            let id = (handle.0 >> 2) as u32;
            CallTarget::Helper(id)
        } else if handle.0 & NATIVE_TAG != 0 {
            CallTarget::Native(MethodHandle(handle.0 & !TAG_MASK))
        } else {
            CallTarget::Managed(handle)
        }
    }

    /// The tagged handle form.
    #[must_use]
    pub fn encode(&self) -> MethodHandle {
        match self {
            CallTarget::Helper(id) => MethodHandle(((*id as usize) << 2) | HELPER_TAG),
            CallTarget::Native(handle) => MethodHandle((handle.0 & !TAG_MASK) | NATIVE_TAG),
            CallTarget::Managed(handle) => *handle,
        }
    }
}

/// Helper id encoded in `handle`, if it is a helper handle.
#[must_use]
pub fn get_helper_num(handle: MethodHandle) -> Option<u32> {
    match CallTarget::decode(handle) {
        CallTarget::Helper(id) => Some(id),
        _ => None,
    }
}

/// True if `handle` is tagged as a native method.
#[must_use]
pub fn is_native_method(handle: MethodHandle) -> bool {
    matches!(CallTarget::decode(handle), CallTarget::Native(_))
}

/// Untagged handle of a native method handle.
#[must_use]
pub fn get_method_handle_for_native(handle: MethodHandle) -> Option<MethodHandle> {
    match CallTarget::decode(handle) {
        CallTarget::Native(method) => Some(method),
        _ => None,
    }
}

fn class_display_name(ee: &mut dyn JitEeInterface, cls: ClassHandle) -> String {
    match ee.get_class_name(cls) {
        Ok(Some(name)) => name,
        Ok(None) => UNKNOWN_NAME.to_string(),
        Err(error) => {
            log::debug!("No class name for {}: {}", cls, error);
            UNKNOWN_NAME.to_string()
        }
    }
}

fn type_display_name(ee: &mut dyn JitEeInterface, ty: CorInfoType, cls: ClassHandle) -> String {
    if ty.is_class_like() {
        class_display_name(ee, cls)
    } else {
        ty.type_name().to_string()
    }
}

fn argument_names(ee: &mut dyn JitEeInterface, sig: &SigInfo) -> Vec<String> {
    let mut names = Vec::with_capacity(usize::from(sig.num_args));
    let mut cursor = sig.args;
    for position in 0..sig.num_args {
        match ee.get_arg_type(sig, cursor) {
            Ok((ty, cls)) => names.push(type_display_name(ee, ty, cls)),
            Err(error) => {
                log::debug!("Argument {} unavailable: {}", position, error);
                names.push(UNKNOWN_NAME.to_string());
                break;
            }
        }
        if position + 1 < sig.num_args {
            match ee.get_arg_next(cursor) {
                Ok(next) => cursor = next,
                Err(_) => break,
            }
        }
    }
    names
}

/// Display name of a method: `Class:Method(Arg,Arg):Ret`, with `:this` for instance methods.
///
/// Names come from `ee`, which may be a live EE or a replay interface. Anything the EE cannot
/// supply is shown as [`UNKNOWN_NAME`]. The format is for humans only.
pub fn get_method_full_name(ee: &mut dyn JitEeInterface, method: MethodHandle) -> String {
    let class_name = match ee.get_method_class(method) {
        Ok(cls) => class_display_name(ee, cls),
        Err(_) => UNKNOWN_NAME.to_string(),
    };
    let method_name = ee
        .get_method_name(method)
        .unwrap_or_else(|_| UNKNOWN_NAME.to_string());

    let mut name = format!("{class_name}:{method_name}(");
    let Ok(sig) = ee.get_method_sig(method, ClassHandle::NULL) else {
        name.push_str("):");
        name.push_str(UNKNOWN_NAME);
        return name;
    };

    name.push_str(&argument_names(ee, &sig).join(","));
    let ret = type_display_name(ee, sig.ret_type, sig.ret_type_class);
    let _ = write!(name, "):{ret}");
    if sig.has_this() {
        name.push_str(":this");
    }
    name
}

/// What a call instruction in generated code targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTargetResolution {
    /// A managed method, with its signature when known
    UserMethod {
        /// Target method
        handle: MethodHandle,
        /// Call signature
        sig: Option<SigInfo>,
    },
    /// A JIT helper
    Helper {
        /// Helper id
        id: u32,
        /// Helper name, `None` for ids outside the helper table
        name: Option<&'static str>,
    },
    /// Nothing recorded explains the call
    Unresolved,
}

fn helper(id: u32) -> CallTargetResolution {
    CallTargetResolution::Helper {
        id,
        name: helper_name(id),
    }
}

/// Works out what the call at `native_offset` with target `target` refers to.
///
/// Call sites the JIT registered in `cr` are authoritative. Otherwise the target address is
/// matched against recorded entry points and helper addresses in `mc`, which is only sound for
/// direct calls: a call through a jump stub is left unresolved.
pub fn resolve_call_target(
    mc: &MethodContext,
    cr: &CompileResult,
    native_offset: u32,
    target: u64,
    through_jump_stub: bool,
) -> CallTargetResolution {
    if let Some(handle) = cr.find_call_site_method_handle(native_offset) {
        return match CallTarget::decode(handle) {
            CallTarget::Helper(id) => helper(id),
            CallTarget::Native(handle) | CallTarget::Managed(handle) => {
                let sig = cr.find_call_site_sig(native_offset).unwrap_or_else(|error| {
                    log::warn!("Bad call site signature at 0x{:x}: {}", native_offset, error);
                    None
                });
                CallTargetResolution::UserMethod { handle, sig }
            }
        };
    }

    if through_jump_stub {
        log::warn!(
            "Call at 0x{:x} goes through a jump stub, target 0x{:x} left unresolved",
            native_offset,
            target
        );
        return CallTargetResolution::Unresolved;
    }

    if let Some(handle) = mc.find_function_entry_point_by_address(target) {
        let sig = mc.rep_get_method_sig(handle, ClassHandle::NULL).ok();
        return CallTargetResolution::UserMethod { handle, sig };
    }

    if let Some(id) = mc.find_helper_by_address(target) {
        return helper(id);
    }

    log::warn!(
        "Unable to resolve call at 0x{:x} to 0x{:x}",
        native_offset,
        target
    );
    CallTargetResolution::Unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corinfo::{ConstLookup, CorInfoType, ModuleHandle};

    #[test]
    fn tags_are_exclusive() {
        for raw in [0_usize, 1, 2, 3, 0x1000, 0x1001, 0x1002, 0x1003, 0x7D] {
            let handle = MethodHandle(raw);
            let kinds = [
                get_helper_num(handle).is_some(),
                is_native_method(handle),
                matches!(CallTarget::decode(handle), CallTarget::Managed(_)),
            ];
            assert_eq!(kinds.iter().filter(|&&kind| kind).count(), 1, "{raw:#x}");
            assert_eq!(
                is_native_method(handle),
                get_method_handle_for_native(handle).is_some()
            );
        }
    }

    #[test]
    fn encode_matches_decode() {
        assert_eq!(CallTarget::Helper(30).encode(), MethodHandle(0x79));
        assert_eq!(get_helper_num(MethodHandle(0x79)), Some(30));
        let native = CallTarget::Native(MethodHandle(0x2000));
        assert_eq!(CallTarget::decode(native.encode()), native);
        assert_eq!(
            get_method_handle_for_native(MethodHandle(0x2002)),
            Some(MethodHandle(0x2000))
        );
    }

    #[test]
    fn resolution_order() {
        let mut mc = MethodContext::new();
        mc.rec_get_function_entry_point(
            MethodHandle(0x3100),
            0,
            &ConstLookup {
                addr: 0x7000,
                access_type: 0,
            },
        );
        mc.rec_get_helper_ftn(30, 0x9000);
        let sig = SigInfo {
            ret_type: CorInfoType::Void,
            scope: ModuleHandle(0x2000),
            ..SigInfo::default()
        };
        mc.rec_get_method_sig(MethodHandle(0x3100), ClassHandle::NULL, &sig);

        let mut cr = CompileResult::new();
        cr.rec_record_call_site(0x10, None, MethodHandle(0x3200));
        cr.rec_record_call_site(0x20, None, CallTarget::Helper(41).encode());

        assert_eq!(
            resolve_call_target(&mc, &cr, 0x10, 0x7000, false),
            CallTargetResolution::UserMethod {
                handle: MethodHandle(0x3200),
                sig: None
            }
        );
        assert_eq!(
            resolve_call_target(&mc, &cr, 0x20, 0, false),
            CallTargetResolution::Helper {
                id: 41,
                name: Some("CORINFO_HELP_INITCLASS")
            }
        );
        assert_eq!(
            resolve_call_target(&mc, &cr, 0x30, 0x7000, true),
            CallTargetResolution::Unresolved
        );
        assert_eq!(
            resolve_call_target(&mc, &cr, 0x30, 0x7000, false),
            CallTargetResolution::UserMethod {
                handle: MethodHandle(0x3100),
                sig: Some(sig)
            }
        );
        assert_eq!(
            resolve_call_target(&mc, &cr, 0x30, 0x9000, false),
            CallTargetResolution::Helper {
                id: 30,
                name: Some("CORINFO_HELP_NEWSFAST")
            }
        );
        assert_eq!(
            resolve_call_target(&mc, &cr, 0x30, 0x1234, false),
            CallTargetResolution::Unresolved
        );
    }
}
