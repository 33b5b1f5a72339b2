//! The packet table of a method context: one map per recorded JIT-EE query.

use crate::{
    lwm::{DenseLightWeightMap, LightWeightMap},
    methodcontext::agnostic::{
        AgnosticCallInfo, AgnosticConstLookup, AgnosticEhClause, AgnosticFieldInfo,
        AgnosticResolvedTokenIn, AgnosticSigInfo, ArgTypeKey, ArgTypeValue, CallInfoKey,
        CanTailCallKey, CompileMethodValue, FieldInfoKey, FindSigKey, GetMethodInfoValue,
        InitClassKey, NewHelperKey, PgoValue, ResolveTokenValue, ResolveVirtualMethodKey,
    },
};

/// Wire id of the nested compile-result section.
pub const COMPILE_RESULT_PACKET: u16 = 0xFFFF;

packet_table! {
    /// Identifies one recorded JIT-EE query and the map that stores it.
    enum Packet;

    /// The maps of a method context, one optional map per [`Packet`].
    struct Packets;

    /// `getMethodAttribs`: method -> attributes
    GetMethodAttribs = 1 => get_method_attribs: LightWeightMap<u64, u32>,
    /// `getMethodSig`: (method, member parent) -> signature
    GetMethodSig = 2 => get_method_sig: LightWeightMap<(u64, u64), AgnosticSigInfo>,
    /// `getMethodInfo`: method -> info
    GetMethodInfo = 3 => get_method_info: LightWeightMap<u64, GetMethodInfoValue>,
    /// `canInline`: (caller, callee) -> (result, exception), every answer kept
    CanInline = 4 => can_inline: LightWeightMap<(u64, u64), (i32, u32)>,
    /// `resolveToken`: token request -> resolved handles
    ResolveToken = 5 => resolve_token: LightWeightMap<AgnosticResolvedTokenIn, ResolveTokenValue>,
    /// `getMethodClass`: method -> class
    GetMethodClass = 6 => get_method_class: LightWeightMap<u64, u64>,
    /// `getMethodName`: method -> name buffer
    GetMethodName = 7 => get_method_name: LightWeightMap<u64, u32>,
    /// `getClassName`: class -> name buffer
    GetClassName = 8 => get_class_name: LightWeightMap<u64, u32>,
    /// `getClassAttribs`: class -> attributes, every answer kept
    GetClassAttribs = 9 => get_class_attribs: LightWeightMap<u64, u32>,
    /// `getClassSize`: class -> size
    GetClassSize = 10 => get_class_size: LightWeightMap<u64, u32>,
    /// `isValueClass`: class -> bool
    IsValueClass = 11 => is_value_class: LightWeightMap<u64, bool>,
    /// `getHelperFtn`: helper id -> address
    GetHelperFtn = 12 => get_helper_ftn: LightWeightMap<u32, u64>,
    /// `getFunctionEntryPoint`: (method, access flags) -> lookup
    GetFunctionEntryPoint = 13 => get_function_entry_point: LightWeightMap<(u64, u32), AgnosticConstLookup>,
    /// `getCallInfo`
    GetCallInfo = 14 => get_call_info: LightWeightMap<CallInfoKey, AgnosticCallInfo>,
    /// `getFieldInfo`
    GetFieldInfo = 15 => get_field_info: LightWeightMap<FieldInfoKey, AgnosticFieldInfo>,
    /// `isIntrinsic`: method -> bool
    IsIntrinsic = 16 => is_intrinsic: LightWeightMap<u64, bool>,
    /// `getEHinfo`: (method, clause number) -> clause
    GetEhInfo = 17 => get_eh_info: LightWeightMap<(u64, u32), AgnosticEhClause>,
    /// `canTailCall`
    CanTailCall = 18 => can_tail_call: LightWeightMap<CanTailCallKey, bool>,
    /// `getArgType`
    GetArgType = 19 => get_arg_type: LightWeightMap<ArgTypeKey, ArgTypeValue>,
    /// `getArgNext`: arg cursor -> next cursor
    GetArgNext = 20 => get_arg_next: LightWeightMap<u64, u64>,
    /// `getTypeForPrimitiveValueClass`: class -> type
    GetTypeForPrimitiveValueClass = 21 => get_type_for_primitive_value_class: LightWeightMap<u64, u32>,
    /// `getExpectedTargetArchitecture`
    GetExpectedTargetArchitecture = 22 => get_expected_target_architecture: LightWeightMap<u32, u32>,
    /// `getJitFlags`
    GetJitFlags = 23 => get_jit_flags: LightWeightMap<u32, u64>,
    /// `getIntConfigValue`: (name buffer, default) -> value
    GetIntConfigValue = 24 => get_int_config_value: LightWeightMap<(u32, i32), i32>,
    /// `getStringConfigValue`: name buffer -> value buffer
    GetStringConfigValue = 25 => get_string_config_value: LightWeightMap<u32, u32>,
    /// `embedClassHandle`: class -> embedded value
    EmbedClassHandle = 26 => embed_class_handle: LightWeightMap<u64, u64>,
    /// `getUnboxedEntry`: method -> (entry, requires instantiation arg, found)
    GetUnboxedEntry = 27 => get_unboxed_entry: LightWeightMap<u64, (u64, bool, bool)>,
    /// `getDefaultComparerClass`: class -> class
    GetDefaultComparerClass = 28 => get_default_comparer_class: LightWeightMap<u64, u64>,
    /// `getGSCookie`: (value, address)
    GetGsCookie = 29 => get_gs_cookie: LightWeightMap<u32, (u64, u64)>,
    /// `getMethodDefFromMethod`: method -> token
    GetMethodDefFromMethod = 30 => get_method_def_from_method: LightWeightMap<u64, u32>,
    /// `getClassModule`: class -> module
    GetClassModule = 31 => get_class_module: LightWeightMap<u64, u64>,
    /// `getStringLiteral`: (module, token) -> UTF-16 buffer
    GetStringLiteral = 32 => get_string_literal: LightWeightMap<(u64, u32), u32>,
    /// `getRelocTypeHint`: target -> relocation type
    GetRelocTypeHint = 33 => get_reloc_type_hint: LightWeightMap<u64, u16>,
    /// `getPgoInstrumentationResults`
    GetPgoInstrumentationResults = 34 => get_pgo_instrumentation_results: LightWeightMap<u64, PgoValue>,
    /// The `compileMethod` call the context was captured for
    CompileMethod = 35 => compile_method: LightWeightMap<u32, CompileMethodValue>,
    /// Generic instantiation handles referenced by signatures
    SigInstHandles = 36 => sig_inst_handles: DenseLightWeightMap<u64>,
    /// `findSig`: (module, token, context) -> signature
    FindSig = 37 => find_sig: LightWeightMap<FindSigKey, AgnosticSigInfo>,
    /// `findCallSiteSig`: (module, token, context) -> call-site signature
    FindCallSiteSig = 38 => find_call_site_sig: LightWeightMap<FindSigKey, AgnosticSigInfo>,
    /// `resolveVirtualMethod`: -> devirtualized method, 0 when not possible
    ResolveVirtualMethod = 39 => resolve_virtual_method: LightWeightMap<ResolveVirtualMethodKey, u64>,
    /// `initClass`
    InitClass = 40 => init_class: LightWeightMap<InitClassKey, u32>,
    /// `getNewHelper`: -> (helper id, exception)
    GetNewHelper = 41 => get_new_helper: LightWeightMap<NewHelperKey, (u32, u32)>,
    /// `getMethodVTableOffset`: method -> (offset of indirection, offset after, relative)
    GetMethodVTableOffset = 42 => get_method_vtable_offset: LightWeightMap<u64, (u32, u32, bool)>,
}

impl Packet {
    /// Name used in reports
    #[must_use]
    pub fn name(&self) -> &'static str {
        (*self).into()
    }
}
