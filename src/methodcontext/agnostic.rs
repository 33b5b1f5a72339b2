//! Pointer-free record layouts and their conversion from and to the live data model.
//!
//! Handles and pointers are widened to `u64`, enums are stored as their integer values and
//! variable-length data lives in the owning map's buffer pool, referenced by index. A record
//! captured by a 32-bit process is therefore byte-identical to one captured by a 64-bit process.

use std::hash::Hash;

use crate::{
    corinfo::{
        ArgListHandle, ClassHandle, ContextHandle, CorInfoType, MethodHandle, MethodInfo,
        ModuleHandle, ResolvedToken, SigInfo, Token,
    },
    lwm::{BufferPool, DenseLightWeightMap, LightWeightMap, NO_BUFFER},
    Result,
};

agnostic! {
    /// A [`SigInfo`] with instantiation handles moved to the `SigInstHandles` packet
    AgnosticSigInfo {
        call_conv: u32,
        ret_type: u32,
        ret_type_class: u64,
        num_args: u32,
        args: u64,
        class_inst_count: u32,
        class_inst_index: u32,
        method_inst_count: u32,
        method_inst_index: u32,
        sig_index: u32,
        scope: u64,
        token: u32,
    }

    /// Input half of a [`ResolvedToken`]
    AgnosticResolvedTokenIn {
        token_context: u64,
        token_scope: u64,
        token: u32,
        token_type: u32,
    }

    /// Output half of a [`ResolvedToken`]
    AgnosticResolvedTokenOut {
        h_class: u64,
        h_method: u64,
        h_field: u64,
        type_spec_index: u32,
        method_spec_index: u32,
    }

    /// Recorded answer to `resolveToken`
    ResolveTokenValue {
        out: AgnosticResolvedTokenOut,
        exception: u32,
    }

    /// A [`MethodInfo`]
    AgnosticMethodInfo {
        ftn: u64,
        scope: u64,
        il_code_index: u32,
        max_stack: u32,
        eh_count: u32,
        options: u32,
        reg_alloc_hint: u32,
        args: AgnosticSigInfo,
        locals: AgnosticSigInfo,
    }

    /// Recorded answer to `getMethodInfo`
    GetMethodInfoValue {
        info: AgnosticMethodInfo,
        result: bool,
        exception: u32,
    }

    /// The method a context was captured for
    CompileMethodValue {
        info: AgnosticMethodInfo,
        flags: u32,
    }

    /// An exception clause
    AgnosticEhClause {
        flags: u32,
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        class_token_or_offset: u32,
    }

    /// An address with its access kind
    AgnosticConstLookup {
        addr: u64,
        access_type: u32,
    }

    /// Key of `getCallInfo`
    CallInfoKey {
        token: AgnosticResolvedTokenIn,
        h_class: u64,
        h_method: u64,
        caller: u64,
        flags: u32,
    }

    /// Recorded answer to `getCallInfo`
    AgnosticCallInfo {
        h_method: u64,
        method_flags: u32,
        class_flags: u32,
        sig: AgnosticSigInfo,
        access_allowed: u32,
        kind: u32,
        this_transform: u32,
        context_handle: u64,
        exact_context_needs_runtime_lookup: bool,
        entry_point: u64,
        null_instance_check: bool,
        exception: u32,
    }

    /// Key of `getFieldInfo`
    FieldInfoKey {
        token: AgnosticResolvedTokenIn,
        h_class: u64,
        h_field: u64,
        caller: u64,
        flags: u32,
    }

    /// Recorded answer to `getFieldInfo`
    AgnosticFieldInfo {
        field_accessor: u32,
        field_flags: u32,
        helper: u32,
        offset: u32,
        field_type: u32,
        struct_type: u64,
        access_allowed: u32,
        exception: u32,
    }

    /// Key of `getArgType`
    ArgTypeKey {
        args: u64,
        scope: u64,
        token: u32,
        class_inst_count: u32,
        method_inst_count: u32,
    }

    /// Recorded answer to `getArgType`
    ArgTypeValue {
        cor_type: u32,
        class: u64,
        exception: u32,
    }

    /// Key of `canTailCall`
    CanTailCallKey {
        caller: u64,
        declared_callee: u64,
        exact_callee: u64,
        explicit_tail_call: bool,
    }

    /// Recorded answer to `getPgoInstrumentationResults`
    PgoValue {
        schema_index: u32,
        data_index: u32,
        source: u32,
        result: bool,
    }

    /// Key of `findSig` and `findCallSiteSig`
    FindSigKey {
        module: u64,
        token: u32,
        context: u64,
    }

    /// Key of `resolveVirtualMethod`
    ResolveVirtualMethodKey {
        virtual_method: u64,
        implementing_class: u64,
        owner_type: u64,
    }

    /// Key of `initClass`
    InitClassKey {
        field: u64,
        method: u64,
        context: u64,
        speculative: bool,
    }

    /// Key of `getNewHelper`
    NewHelperKey {
        token: AgnosticResolvedTokenIn,
        h_class: u64,
        caller: u64,
    }
}

impl AgnosticResolvedTokenIn {
    /// Input half of `token`
    #[must_use]
    pub fn from_live(token: &ResolvedToken) -> Self {
        AgnosticResolvedTokenIn {
            token_context: token.token_context.cast(),
            token_scope: token.token_scope.cast(),
            token: token.token.value(),
            token_type: token.token_type.bits(),
        }
    }
}

impl FindSigKey {
    /// Key of a signature lookup by token
    #[must_use]
    pub fn new(module: ModuleHandle, token: Token, context: ContextHandle) -> Self {
        FindSigKey {
            module: module.cast(),
            token: token.value(),
            context: context.cast(),
        }
    }
}

impl ArgTypeKey {
    /// Key of a `getArgType` query
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(sig: &SigInfo, args: ArgListHandle) -> Self {
        ArgTypeKey {
            args: args.cast(),
            scope: sig.scope.cast(),
            token: sig.token.value(),
            class_inst_count: sig.class_inst.len() as u32,
            method_inst_count: sig.method_inst.len() as u32,
        }
    }
}

/// Stores a non-empty buffer in `map`'s pool, reusing an identical one; empty data is `NO_BUFFER`.
pub(crate) fn store_buffer<K: Eq + Hash + Clone, V>(
    map: &mut LightWeightMap<K, V>,
    bytes: &[u8],
) -> u32 {
    if bytes.is_empty() {
        NO_BUFFER
    } else {
        map.add_buffer_dedup(bytes)
    }
}

/// Copies a buffer out of `pool`; `NO_BUFFER` reads as empty.
pub(crate) fn read_buffer(pool: &BufferPool, index: u32) -> Result<Vec<u8>> {
    if index == NO_BUFFER {
        return Ok(Vec::new());
    }
    pool.get_buffer(index)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| malformed_error!("Buffer index {} out of range", index))
}

#[allow(clippy::cast_possible_truncation)]
fn append_handles(inst: &mut DenseLightWeightMap<u64>, handles: &[ClassHandle]) -> (u32, u32) {
    let start = inst.count() as u32;
    for handle in handles {
        inst.append(handle.cast());
    }
    (handles.len() as u32, start)
}

fn read_handles(
    inst: Option<&DenseLightWeightMap<u64>>,
    index: u32,
    count: u32,
) -> Result<Vec<ClassHandle>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let Some(inst) = inst else {
        return Err(malformed_error!("Signature references missing instantiation handles"));
    };
    let Some(end) = index.checked_add(count) else {
        return Err(malformed_error!("Instantiation range {}+{} overflows", index, count));
    };
    (index..end)
        .map(|position| ClassHandle::uncast(*inst.get(position)?))
        .collect()
}

/// Converts a live signature; the signature blob must already be stored at `sig_index`.
pub(crate) fn pack_sig(
    sig: &SigInfo,
    sig_index: u32,
    inst: &mut DenseLightWeightMap<u64>,
) -> AgnosticSigInfo {
    let (class_inst_count, class_inst_index) = append_handles(inst, &sig.class_inst);
    let (method_inst_count, method_inst_index) = append_handles(inst, &sig.method_inst);

    AgnosticSigInfo {
        call_conv: u32::from(sig.call_conv),
        ret_type: sig.ret_type as u32,
        ret_type_class: sig.ret_type_class.cast(),
        num_args: u32::from(sig.num_args),
        args: sig.args.cast(),
        class_inst_count,
        class_inst_index,
        method_inst_count,
        method_inst_index,
        sig_index,
        scope: sig.scope.cast(),
        token: sig.token.value(),
    }
}

/// Like [`pack_sig`], creating the instantiation map only when `sig` has instantiation handles.
pub(crate) fn pack_sig_into(
    sig: &SigInfo,
    sig_index: u32,
    inst: &mut Option<DenseLightWeightMap<u64>>,
) -> AgnosticSigInfo {
    if sig.class_inst.is_empty() && sig.method_inst.is_empty() {
        pack_sig(sig, sig_index, &mut DenseLightWeightMap::new())
    } else {
        pack_sig(sig, sig_index, inst.get_or_insert_with(DenseLightWeightMap::new))
    }
}

/// Rebuilds a live signature.
pub(crate) fn unpack_sig(
    sig: &AgnosticSigInfo,
    buffers: &BufferPool,
    inst: Option<&DenseLightWeightMap<u64>>,
) -> Result<SigInfo> {
    let Ok(call_conv) = u8::try_from(sig.call_conv) else {
        return Err(malformed_error!("Invalid calling convention {}", sig.call_conv));
    };
    let Ok(num_args) = u16::try_from(sig.num_args) else {
        return Err(malformed_error!("Invalid argument count {}", sig.num_args));
    };

    Ok(SigInfo {
        call_conv,
        ret_type: CorInfoType::from_u32(sig.ret_type)?,
        ret_type_class: ClassHandle::uncast(sig.ret_type_class)?,
        num_args,
        args: ArgListHandle::uncast(sig.args)?,
        class_inst: read_handles(inst, sig.class_inst_index, sig.class_inst_count)?,
        method_inst: read_handles(inst, sig.method_inst_index, sig.method_inst_count)?,
        sig: read_buffer(buffers, sig.sig_index)?,
        scope: ModuleHandle::uncast(sig.scope)?,
        token: Token(sig.token),
    })
}

/// Converts a live method info, storing its buffers in `map`.
pub(crate) fn pack_method_info<K: Eq + Hash + Clone, V>(
    info: &MethodInfo,
    map: &mut LightWeightMap<K, V>,
    inst: &mut Option<DenseLightWeightMap<u64>>,
) -> AgnosticMethodInfo {
    let il_code_index = store_buffer(map, &info.il_code);
    let args_index = store_buffer(map, &info.args.sig);
    let locals_index = store_buffer(map, &info.locals.sig);

    AgnosticMethodInfo {
        ftn: info.ftn.cast(),
        scope: info.scope.cast(),
        il_code_index,
        max_stack: info.max_stack,
        eh_count: info.eh_count,
        options: info.options,
        reg_alloc_hint: info.reg_alloc_hint,
        args: pack_sig_into(&info.args, args_index, inst),
        locals: pack_sig_into(&info.locals, locals_index, inst),
    }
}

/// Rebuilds a live method info.
pub(crate) fn unpack_method_info(
    info: &AgnosticMethodInfo,
    buffers: &BufferPool,
    inst: Option<&DenseLightWeightMap<u64>>,
) -> Result<MethodInfo> {
    Ok(MethodInfo {
        ftn: MethodHandle::uncast(info.ftn)?,
        scope: ModuleHandle::uncast(info.scope)?,
        il_code: read_buffer(buffers, info.il_code_index)?,
        max_stack: info.max_stack,
        eh_count: info.eh_count,
        options: info.options,
        reg_alloc_hint: info.reg_alloc_hint,
        args: unpack_sig(&info.args, buffers, inst)?,
        locals: unpack_sig(&info.locals, buffers, inst)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::{Parser, Writer},
        lwm::Packable,
    };

    fn sample_sig() -> SigInfo {
        SigInfo {
            call_conv: 0x20,
            ret_type: CorInfoType::Int,
            ret_type_class: ClassHandle::NULL,
            num_args: 2,
            args: ArgListHandle(0x7000),
            class_inst: vec![ClassHandle(0x10), ClassHandle(0x20)],
            method_inst: vec![ClassHandle(0x30)],
            sig: vec![0x20, 0x02, 0x08, 0x08, 0x08],
            scope: ModuleHandle(0x2000),
            token: Token(0x0600_0002),
        }
    }

    #[test]
    fn sig_roundtrip() {
        let sig = sample_sig();
        let mut map: LightWeightMap<u64, AgnosticSigInfo> = LightWeightMap::new();
        let mut inst = DenseLightWeightMap::new();
        let index = store_buffer(&mut map, &sig.sig);
        let packed = pack_sig(&sig, index, &mut inst);

        assert_eq!(packed.class_inst_index, 0);
        assert_eq!(packed.method_inst_index, 2);
        assert_eq!(inst.count(), 3);

        let live = unpack_sig(&packed, map.buffers(), Some(&inst)).unwrap();
        assert_eq!(live, sig);
    }

    #[test]
    fn sig_without_inst_map() {
        let mut sig = sample_sig();
        let mut inst = DenseLightWeightMap::new();
        let packed = pack_sig(&sig, NO_BUFFER, &mut inst);
        assert!(unpack_sig(&packed, &BufferPool::new(), None).is_err());

        sig.class_inst.clear();
        sig.method_inst.clear();
        sig.sig.clear();
        let packed = pack_sig(&sig, NO_BUFFER, &mut DenseLightWeightMap::new());
        assert_eq!(unpack_sig(&packed, &BufferPool::new(), None).unwrap(), sig);
    }

    #[test]
    fn agnostic_layout_is_fixed() {
        let key = AgnosticResolvedTokenIn {
            token_context: 0x1000,
            token_scope: 0x2000,
            token: 0x0600_0001,
            token_type: 2,
        };
        let mut writer = Writer::new();
        key.pack(&mut writer).unwrap();
        assert_eq!(writer.len(), 8 + 8 + 4 + 4);

        let bytes = writer.into_inner();
        let copy = AgnosticResolvedTokenIn::unpack(&mut Parser::new(&bytes)).unwrap();
        assert_eq!(copy, key);
    }

    #[test]
    fn bad_buffer_index() {
        let pool = BufferPool::new();
        assert!(read_buffer(&pool, 0).is_err());
        assert!(read_buffer(&pool, NO_BUFFER).unwrap().is_empty());
    }
}
