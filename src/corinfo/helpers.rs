//! JIT helper function ids and their names.
//!
//! Helpers are runtime-provided routines the JIT calls instead of generating code inline. They
//! are identified by position in this fixed table.

const HELPER_NAMES: &[&str] = &[
    "CORINFO_HELP_UNDEF",
    "CORINFO_HELP_DIV",
    "CORINFO_HELP_MOD",
    "CORINFO_HELP_UDIV",
    "CORINFO_HELP_UMOD",
    "CORINFO_HELP_LLSH",
    "CORINFO_HELP_LRSH",
    "CORINFO_HELP_LRSZ",
    "CORINFO_HELP_LMUL",
    "CORINFO_HELP_LMUL_OVF",
    "CORINFO_HELP_ULMUL_OVF",
    "CORINFO_HELP_LDIV",
    "CORINFO_HELP_LMOD",
    "CORINFO_HELP_ULDIV",
    "CORINFO_HELP_ULMOD",
    "CORINFO_HELP_LNG2DBL",
    "CORINFO_HELP_ULNG2DBL",
    "CORINFO_HELP_DBL2INT",
    "CORINFO_HELP_DBL2INT_OVF",
    "CORINFO_HELP_DBL2LNG",
    "CORINFO_HELP_DBL2LNG_OVF",
    "CORINFO_HELP_DBL2UINT",
    "CORINFO_HELP_DBL2UINT_OVF",
    "CORINFO_HELP_DBL2ULNG",
    "CORINFO_HELP_DBL2ULNG_OVF",
    "CORINFO_HELP_FLTREM",
    "CORINFO_HELP_DBLREM",
    "CORINFO_HELP_FLTROUND",
    "CORINFO_HELP_DBLROUND",
    "CORINFO_HELP_NEWFAST",
    "CORINFO_HELP_NEWSFAST",
    "CORINFO_HELP_NEWSFAST_FINALIZE",
    "CORINFO_HELP_NEWSFAST_ALIGN8",
    "CORINFO_HELP_NEWSFAST_ALIGN8_VC",
    "CORINFO_HELP_NEWSFAST_ALIGN8_FINALIZE",
    "CORINFO_HELP_NEW_MDARR",
    "CORINFO_HELP_NEWARR_1_DIRECT",
    "CORINFO_HELP_NEWARR_1_OBJ",
    "CORINFO_HELP_NEWARR_1_VC",
    "CORINFO_HELP_NEWARR_1_ALIGN8",
    "CORINFO_HELP_STRCNS",
    "CORINFO_HELP_INITCLASS",
    "CORINFO_HELP_INITINSTCLASS",
    "CORINFO_HELP_ISINSTANCEOFINTERFACE",
    "CORINFO_HELP_ISINSTANCEOFARRAY",
    "CORINFO_HELP_ISINSTANCEOFCLASS",
    "CORINFO_HELP_ISINSTANCEOFANY",
    "CORINFO_HELP_CHKCASTINTERFACE",
    "CORINFO_HELP_CHKCASTARRAY",
    "CORINFO_HELP_CHKCASTCLASS",
    "CORINFO_HELP_CHKCASTANY",
    "CORINFO_HELP_CHKCASTCLASS_SPECIAL",
    "CORINFO_HELP_BOX",
    "CORINFO_HELP_BOX_NULLABLE",
    "CORINFO_HELP_UNBOX",
    "CORINFO_HELP_UNBOX_NULLABLE",
    "CORINFO_HELP_GETREFANY",
    "CORINFO_HELP_ARRADDR_ST",
    "CORINFO_HELP_LDELEMA_REF",
    "CORINFO_HELP_THROW",
    "CORINFO_HELP_RETHROW",
    "CORINFO_HELP_USER_BREAKPOINT",
    "CORINFO_HELP_RNGCHKFAIL",
    "CORINFO_HELP_OVERFLOW",
    "CORINFO_HELP_THROWDIVZERO",
    "CORINFO_HELP_THROWNULLREF",
    "CORINFO_HELP_VERIFICATION",
    "CORINFO_HELP_FAIL_FAST",
    "CORINFO_HELP_METHOD_ACCESS_EXCEPTION",
    "CORINFO_HELP_FIELD_ACCESS_EXCEPTION",
    "CORINFO_HELP_CLASS_ACCESS_EXCEPTION",
    "CORINFO_HELP_ENDCATCH",
    "CORINFO_HELP_MON_ENTER",
    "CORINFO_HELP_MON_EXIT",
    "CORINFO_HELP_MON_ENTER_STATIC",
    "CORINFO_HELP_MON_EXIT_STATIC",
    "CORINFO_HELP_GETCLASSFROMMETHODPARAM",
    "CORINFO_HELP_GETSYNCFROMCLASSHANDLE",
    "CORINFO_HELP_STOP_FOR_GC",
    "CORINFO_HELP_POLL_GC",
    "CORINFO_HELP_STRESS_GC",
    "CORINFO_HELP_CHECK_OBJ",
    "CORINFO_HELP_ASSIGN_REF",
    "CORINFO_HELP_CHECKED_ASSIGN_REF",
    "CORINFO_HELP_ASSIGN_REF_ENSURE_NONHEAP",
    "CORINFO_HELP_ASSIGN_BYREF",
    "CORINFO_HELP_ASSIGN_STRUCT",
    "CORINFO_HELP_GETFIELD8",
    "CORINFO_HELP_SETFIELD8",
    "CORINFO_HELP_GETFIELD16",
    "CORINFO_HELP_SETFIELD16",
    "CORINFO_HELP_GETFIELD32",
    "CORINFO_HELP_SETFIELD32",
    "CORINFO_HELP_GETFIELD64",
    "CORINFO_HELP_SETFIELD64",
    "CORINFO_HELP_GETFIELDOBJ",
    "CORINFO_HELP_SETFIELDOBJ",
    "CORINFO_HELP_GETFIELDSTRUCT",
    "CORINFO_HELP_SETFIELDSTRUCT",
    "CORINFO_HELP_GETFIELDFLOAT",
    "CORINFO_HELP_SETFIELDFLOAT",
    "CORINFO_HELP_GETFIELDDOUBLE",
    "CORINFO_HELP_SETFIELDDOUBLE",
    "CORINFO_HELP_GETFIELDADDR",
    "CORINFO_HELP_GETSTATICFIELDADDR_TLS",
    "CORINFO_HELP_GETGENERICS_GCSTATIC_BASE",
    "CORINFO_HELP_GETGENERICS_NONGCSTATIC_BASE",
    "CORINFO_HELP_GETSHARED_GCSTATIC_BASE",
    "CORINFO_HELP_GETSHARED_NONGCSTATIC_BASE",
    "CORINFO_HELP_GETSHARED_GCSTATIC_BASE_NOCTOR",
    "CORINFO_HELP_GETSHARED_NONGCSTATIC_BASE_NOCTOR",
    "CORINFO_HELP_GETSHARED_GCSTATIC_BASE_DYNAMICCLASS",
    "CORINFO_HELP_GETSHARED_NONGCSTATIC_BASE_DYNAMICCLASS",
    "CORINFO_HELP_CLASSINIT_SHARED_DYNAMICCLASS",
    "CORINFO_HELP_PINVOKE_CALLI",
    "CORINFO_HELP_TAILCALL",
    "CORINFO_HELP_GETCURRENTMANAGEDTHREADID",
    "CORINFO_HELP_INIT_PINVOKE_FRAME",
    "CORINFO_HELP_MEMSET",
    "CORINFO_HELP_MEMCPY",
    "CORINFO_HELP_RUNTIMEHANDLE_METHOD",
    "CORINFO_HELP_RUNTIMEHANDLE_CLASS",
    "CORINFO_HELP_TYPEHANDLE_TO_RUNTIMETYPE",
    "CORINFO_HELP_METHODDESC_TO_STUBRUNTIMEMETHOD",
    "CORINFO_HELP_FIELDDESC_TO_STUBRUNTIMEFIELD",
    "CORINFO_HELP_VIRTUAL_FUNC_PTR",
    "CORINFO_HELP_READYTORUN_NEW",
    "CORINFO_HELP_READYTORUN_NEWARR_1",
    "CORINFO_HELP_READYTORUN_ISINSTANCEOF",
    "CORINFO_HELP_READYTORUN_CHKCAST",
    "CORINFO_HELP_READYTORUN_STATIC_BASE",
    "CORINFO_HELP_READYTORUN_VIRTUAL_FUNC_PTR",
    "CORINFO_HELP_READYTORUN_GENERIC_HANDLE",
    "CORINFO_HELP_READYTORUN_DELEGATE_CTOR",
    "CORINFO_HELP_EE_PERSONALITY_ROUTINE",
    "CORINFO_HELP_EE_PERSONALITY_ROUTINE_FILTER_FUNCLET",
    "CORINFO_HELP_STACK_PROBE",
    "CORINFO_HELP_PATCHPOINT",
    "CORINFO_HELP_CLASSPROFILE32",
    "CORINFO_HELP_CLASSPROFILE64",
    "CORINFO_HELP_PARTIAL_COMPILATION_PATCHPOINT",
    "CORINFO_HELP_VALIDATE_INDIRECT_CALL",
    "CORINFO_HELP_DISPATCH_INDIRECT_CALL",
];

/// Number of known helpers; ids at or above this are unknown.
pub const HELPER_COUNT: u32 = HELPER_NAMES.len() as u32;

/// Name of helper `id`, or `None` for ids outside the table.
///
/// ```rust
/// use superpmi::corinfo::helper_name;
///
/// assert_eq!(helper_name(1), Some("CORINFO_HELP_DIV"));
/// assert_eq!(helper_name(100_000), None);
/// ```
#[must_use]
pub fn helper_name(id: u32) -> Option<&'static str> {
    HELPER_NAMES.get(id as usize).copied()
}

/// Id of the helper called `name`.
#[must_use]
pub fn helper_id(name: &str) -> Option<u32> {
    HELPER_NAMES
        .iter()
        .position(|&candidate| candidate == name)
        .and_then(|position| u32::try_from(position).ok())
}
