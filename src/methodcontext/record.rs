//! Capture side of the method context: one `rec_*` operation per JIT-EE query.
//!
//! Recording never fails. Values that cannot be represented are logged and skipped so that the
//! JIT being observed behaves exactly as it would without the shim.

use std::{fmt::Debug, hash::Hash};

use widestring::U16String;

use crate::{
    corinfo::{
        ArgListHandle, CallInfo, ClassHandle, ConstLookup, ContextHandle, CorInfoInitClassResult,
        CorInfoInline, CorInfoType, EhClause, FieldHandle, FieldInfo, GsCookie, MethodHandle,
        MethodInfo, ModuleHandle, PgoResults, ResolvedToken, SigInfo, Token, VTableOffset,
    },
    lwm::{DenseLightWeightMap, LightWeightMap, NO_BUFFER},
    methodcontext::{
        agnostic::{
            pack_method_info, pack_sig_into, store_buffer, AgnosticCallInfo, AgnosticConstLookup,
            AgnosticEhClause, AgnosticFieldInfo, AgnosticMethodInfo, AgnosticResolvedTokenIn,
            AgnosticResolvedTokenOut, AgnosticSigInfo, ArgTypeKey, ArgTypeValue, CallInfoKey,
            CanTailCallKey, CompileMethodValue, FieldInfoKey, FindSigKey, GetMethodInfoValue,
            InitClassKey, NewHelperKey, PgoValue, ResolveTokenValue, ResolveVirtualMethodKey,
        },
        MethodContext, Packet,
    },
    Error, Result,
};

/// Exception code to record for the outcome of an EE call.
///
/// `Ok` records as `0`, an [`Error::EeException`] as its code. Any other error is a failure of
/// the EE plumbing rather than a runtime exception and yields `None`: nothing is recorded.
#[must_use]
pub fn captured_exception<T>(result: &Result<T>) -> Option<u32> {
    match result {
        Ok(_) => Some(0),
        Err(Error::EeException(code)) => Some(*code),
        Err(_) => None,
    }
}

/// Adds `key -> value` unless `key` is already recorded. A differing second answer is logged.
fn record_once<K, V>(map: &mut Option<LightWeightMap<K, V>>, packet: Packet, key: K, value: V)
where
    K: Eq + Hash + Clone + Debug,
    V: PartialEq + Debug,
{
    let map = map.get_or_insert_with(LightWeightMap::new);
    match map.get(&key) {
        Some(existing) if *existing == value => {}
        Some(existing) => log::warn!(
            "{}: conflicting answer {:?} for {:?}, keeping {:?}",
            packet.name(),
            value,
            key,
            existing
        ),
        None => {
            map.add(key, value);
        }
    }
}

/// Adds `key -> value` even if `key` is already recorded.
fn record_every<K, V>(map: &mut Option<LightWeightMap<K, V>>, key: K, value: V)
where
    K: Eq + Hash + Clone,
{
    map.get_or_insert_with(LightWeightMap::new).add(key, value);
}

/// Stores an optional byte string; `None` is [`NO_BUFFER`], `Some` always gets a real buffer.
fn store_optional<K: Eq + Hash + Clone, V>(
    map: &mut LightWeightMap<K, V>,
    bytes: Option<&[u8]>,
) -> u32 {
    match bytes {
        Some(bytes) => map.add_buffer_dedup(bytes),
        None => NO_BUFFER,
    }
}

/// Stores a signature under `key` unless one is already recorded.
fn record_sig<K>(
    map: &mut Option<LightWeightMap<K, AgnosticSigInfo>>,
    inst: &mut Option<DenseLightWeightMap<u64>>,
    key: K,
    sig: &SigInfo,
) where
    K: Eq + Hash + Clone,
{
    let map = map.get_or_insert_with(LightWeightMap::new);
    if map.contains_key(&key) {
        return;
    }
    let sig_index = store_buffer(map, &sig.sig);
    let value = pack_sig_into(sig, sig_index, inst);
    map.add(key, value);
}

fn utf16_bytes(text: &U16String) -> Vec<u8> {
    text.as_slice()
        .iter()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

fn pack_eh_clause(clause: &EhClause) -> AgnosticEhClause {
    AgnosticEhClause {
        flags: clause.flags,
        try_offset: clause.try_offset,
        try_length: clause.try_length,
        handler_offset: clause.handler_offset,
        handler_length: clause.handler_length,
        class_token_or_offset: clause.class_token_or_offset,
    }
}

impl MethodContext {
    // Methods

    /// Records `getMethodAttribs`.
    pub fn rec_get_method_attribs(&mut self, ftn: MethodHandle, attribs: u32) {
        record_once(
            &mut self.packets.get_method_attribs,
            Packet::GetMethodAttribs,
            ftn.cast(),
            attribs,
        );
    }

    /// Records `getMethodSig`.
    pub fn rec_get_method_sig(
        &mut self,
        ftn: MethodHandle,
        member_parent: ClassHandle,
        sig: &SigInfo,
    ) {
        record_sig(
            &mut self.packets.get_method_sig,
            &mut self.packets.sig_inst_handles,
            (ftn.cast(), member_parent.cast()),
            sig,
        );
    }

    /// Records `getMethodInfo`; `info` is `None` when the method has no IL.
    pub fn rec_get_method_info(
        &mut self,
        ftn: MethodHandle,
        info: Option<&MethodInfo>,
        exception: u32,
    ) {
        let key = ftn.cast();
        let map = self
            .packets
            .get_method_info
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&key) {
            return;
        }
        let value = match info {
            Some(info) => GetMethodInfoValue {
                info: pack_method_info(info, map, &mut self.packets.sig_inst_handles),
                result: true,
                exception,
            },
            None => GetMethodInfoValue {
                info: AgnosticMethodInfo::default(),
                result: false,
                exception,
            },
        };
        map.add(key, value);
    }

    /// Records one `canInline` answer. Every answer is kept.
    pub fn rec_can_inline(
        &mut self,
        caller: MethodHandle,
        callee: MethodHandle,
        result: CorInfoInline,
        exception: u32,
    ) {
        record_every(
            &mut self.packets.can_inline,
            (caller.cast(), callee.cast()),
            (result as i32, exception),
        );
    }

    /// Records `getMethodClass`.
    pub fn rec_get_method_class(&mut self, ftn: MethodHandle, cls: ClassHandle) {
        record_once(
            &mut self.packets.get_method_class,
            Packet::GetMethodClass,
            ftn.cast(),
            cls.cast(),
        );
    }

    /// Records `getMethodName`.
    pub fn rec_get_method_name(&mut self, ftn: MethodHandle, name: &str) {
        let map = self
            .packets
            .get_method_name
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&ftn.cast()) {
            return;
        }
        let index = map.add_buffer_dedup(name.as_bytes());
        map.add(ftn.cast(), index);
    }

    /// Records `isIntrinsic`.
    pub fn rec_is_intrinsic(&mut self, ftn: MethodHandle, intrinsic: bool) {
        record_once(
            &mut self.packets.is_intrinsic,
            Packet::IsIntrinsic,
            ftn.cast(),
            intrinsic,
        );
    }

    /// Records `getEHinfo`.
    pub fn rec_get_eh_info(&mut self, ftn: MethodHandle, eh_number: u32, clause: &EhClause) {
        record_once(
            &mut self.packets.get_eh_info,
            Packet::GetEhInfo,
            (ftn.cast(), eh_number),
            pack_eh_clause(clause),
        );
    }

    /// Records `canTailCall`.
    pub fn rec_can_tail_call(
        &mut self,
        caller: MethodHandle,
        declared_callee: MethodHandle,
        exact_callee: MethodHandle,
        explicit_tail_call: bool,
        result: bool,
    ) {
        let key = CanTailCallKey {
            caller: caller.cast(),
            declared_callee: declared_callee.cast(),
            exact_callee: exact_callee.cast(),
            explicit_tail_call,
        };
        record_once(
            &mut self.packets.can_tail_call,
            Packet::CanTailCall,
            key,
            result,
        );
    }

    /// Records `getUnboxedEntry`.
    pub fn rec_get_unboxed_entry(
        &mut self,
        ftn: MethodHandle,
        entry: Option<(MethodHandle, bool)>,
    ) {
        let value = match entry {
            Some((method, requires_inst_arg)) => (method.cast(), requires_inst_arg, true),
            None => (0, false, false),
        };
        record_once(
            &mut self.packets.get_unboxed_entry,
            Packet::GetUnboxedEntry,
            ftn.cast(),
            value,
        );
    }

    /// Records `getMethodDefFromMethod`.
    pub fn rec_get_method_def_from_method(&mut self, ftn: MethodHandle, token: Token) {
        record_once(
            &mut self.packets.get_method_def_from_method,
            Packet::GetMethodDefFromMethod,
            ftn.cast(),
            token.value(),
        );
    }

    /// Records `getFunctionEntryPoint`.
    pub fn rec_get_function_entry_point(
        &mut self,
        ftn: MethodHandle,
        access_flags: u32,
        lookup: &ConstLookup,
    ) {
        record_once(
            &mut self.packets.get_function_entry_point,
            Packet::GetFunctionEntryPoint,
            (ftn.cast(), access_flags),
            AgnosticConstLookup {
                addr: lookup.addr,
                access_type: lookup.access_type,
            },
        );
    }

    /// Records `getPgoInstrumentationResults`.
    pub fn rec_get_pgo_instrumentation_results(
        &mut self,
        ftn: MethodHandle,
        results: Option<&PgoResults>,
    ) {
        let map = self
            .packets
            .get_pgo_instrumentation_results
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&ftn.cast()) {
            return;
        }
        let value = match results {
            Some(results) => PgoValue {
                schema_index: store_buffer(map, &results.schema),
                data_index: store_buffer(map, &results.data),
                source: results.source,
                result: true,
            },
            None => PgoValue {
                schema_index: NO_BUFFER,
                data_index: NO_BUFFER,
                source: 0,
                result: false,
            },
        };
        map.add(ftn.cast(), value);
    }

    /// Records `resolveVirtualMethod`; `None` when devirtualization is not possible.
    pub fn rec_resolve_virtual_method(
        &mut self,
        virtual_method: MethodHandle,
        implementing_class: ClassHandle,
        owner_type: ContextHandle,
        result: Option<MethodHandle>,
    ) {
        let key = ResolveVirtualMethodKey {
            virtual_method: virtual_method.cast(),
            implementing_class: implementing_class.cast(),
            owner_type: owner_type.cast(),
        };
        record_once(
            &mut self.packets.resolve_virtual_method,
            Packet::ResolveVirtualMethod,
            key,
            result.map_or(0, |method| method.cast()),
        );
    }

    /// Records `getMethodVTableOffset`.
    pub fn rec_get_method_vtable_offset(&mut self, ftn: MethodHandle, offset: &VTableOffset) {
        record_once(
            &mut self.packets.get_method_vtable_offset,
            Packet::GetMethodVTableOffset,
            ftn.cast(),
            (
                offset.offset_of_indirection,
                offset.offset_after_indirection,
                offset.is_relative,
            ),
        );
    }

    // Tokens

    /// Records `resolveToken`. `token` carries both the request and the EE's answer.
    pub fn rec_resolve_token(&mut self, token: &ResolvedToken, exception: u32) {
        let key = AgnosticResolvedTokenIn::from_live(token);
        let map = self
            .packets
            .resolve_token
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&key) {
            return;
        }

        let out = if exception == 0 {
            AgnosticResolvedTokenOut {
                h_class: token.h_class.cast(),
                h_method: token.h_method.cast(),
                h_field: token.h_field.cast(),
                type_spec_index: store_buffer(map, &token.type_spec),
                method_spec_index: store_buffer(map, &token.method_spec),
            }
        } else {
            AgnosticResolvedTokenOut {
                type_spec_index: NO_BUFFER,
                method_spec_index: NO_BUFFER,
                ..AgnosticResolvedTokenOut::default()
            }
        };
        map.add(key, ResolveTokenValue { out, exception });
    }

    /// Records `getCallInfo`.
    pub fn rec_get_call_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
        info: &CallInfo,
        exception: u32,
    ) {
        let key = CallInfoKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            h_method: token.h_method.cast(),
            caller: caller.cast(),
            flags,
        };
        let map = self
            .packets
            .get_call_info
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&key) {
            return;
        }

        let sig_index = store_buffer(map, &info.sig.sig);
        let value = AgnosticCallInfo {
            h_method: info.h_method.cast(),
            method_flags: info.method_flags,
            class_flags: info.class_flags,
            sig: pack_sig_into(&info.sig, sig_index, &mut self.packets.sig_inst_handles),
            access_allowed: info.access_allowed,
            kind: info.kind,
            this_transform: info.this_transform,
            context_handle: info.context_handle.cast(),
            exact_context_needs_runtime_lookup: info.exact_context_needs_runtime_lookup,
            entry_point: info.entry_point,
            null_instance_check: info.null_instance_check,
            exception,
        };
        map.add(key, value);
    }

    /// Records `getFieldInfo`.
    pub fn rec_get_field_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
        info: &FieldInfo,
        exception: u32,
    ) {
        let key = FieldInfoKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            h_field: token.h_field.cast(),
            caller: caller.cast(),
            flags,
        };
        let value = AgnosticFieldInfo {
            field_accessor: info.field_accessor,
            field_flags: info.field_flags,
            helper: info.helper,
            offset: info.offset,
            field_type: info.field_type as u32,
            struct_type: info.struct_type.cast(),
            access_allowed: info.access_allowed,
            exception,
        };
        record_once(
            &mut self.packets.get_field_info,
            Packet::GetFieldInfo,
            key,
            value,
        );
    }

    /// Records `getStringLiteral`; `None` when the token names no string.
    pub fn rec_get_string_literal(
        &mut self,
        module: ModuleHandle,
        token: Token,
        literal: Option<&U16String>,
    ) {
        let key = (module.cast(), token.value());
        let map = self
            .packets
            .get_string_literal
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&key) {
            return;
        }
        let bytes = literal.map(utf16_bytes);
        let index = store_optional(map, bytes.as_deref());
        map.add(key, index);
    }

    /// Records `getNewHelper`.
    pub fn rec_get_new_helper(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        helper: u32,
        exception: u32,
    ) {
        let key = NewHelperKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            caller: caller.cast(),
        };
        record_once(
            &mut self.packets.get_new_helper,
            Packet::GetNewHelper,
            key,
            (helper, exception),
        );
    }

    // Classes

    /// Records `getClassName`; `None` when the EE could not name the class.
    pub fn rec_get_class_name(&mut self, cls: ClassHandle, name: Option<&str>) {
        let map = self
            .packets
            .get_class_name
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&cls.cast()) {
            return;
        }
        let index = store_optional(map, name.map(str::as_bytes));
        map.add(cls.cast(), index);
    }

    /// Records one `getClassAttribs` answer. Every answer is kept.
    pub fn rec_get_class_attribs(&mut self, cls: ClassHandle, attribs: u32) {
        record_every(&mut self.packets.get_class_attribs, cls.cast(), attribs);
    }

    /// Records `getClassSize`.
    pub fn rec_get_class_size(&mut self, cls: ClassHandle, size: u32) {
        record_once(
            &mut self.packets.get_class_size,
            Packet::GetClassSize,
            cls.cast(),
            size,
        );
    }

    /// Records `isValueClass`.
    pub fn rec_is_value_class(&mut self, cls: ClassHandle, value_class: bool) {
        record_once(
            &mut self.packets.is_value_class,
            Packet::IsValueClass,
            cls.cast(),
            value_class,
        );
    }

    /// Records `getTypeForPrimitiveValueClass`.
    pub fn rec_get_type_for_primitive_value_class(&mut self, cls: ClassHandle, ty: CorInfoType) {
        record_once(
            &mut self.packets.get_type_for_primitive_value_class,
            Packet::GetTypeForPrimitiveValueClass,
            cls.cast(),
            ty as u32,
        );
    }

    /// Records `getDefaultComparerClass`.
    pub fn rec_get_default_comparer_class(&mut self, cls: ClassHandle, comparer: ClassHandle) {
        record_once(
            &mut self.packets.get_default_comparer_class,
            Packet::GetDefaultComparerClass,
            cls.cast(),
            comparer.cast(),
        );
    }

    /// Records `getClassModule`.
    pub fn rec_get_class_module(&mut self, cls: ClassHandle, module: ModuleHandle) {
        record_once(
            &mut self.packets.get_class_module,
            Packet::GetClassModule,
            cls.cast(),
            module.cast(),
        );
    }

    /// Records `embedClassHandle`.
    pub fn rec_embed_class_handle(&mut self, cls: ClassHandle, embedded: u64) {
        record_once(
            &mut self.packets.embed_class_handle,
            Packet::EmbedClassHandle,
            cls.cast(),
            embedded,
        );
    }

    /// Records `initClass`. `field` is null when asking about the method prolog.
    pub fn rec_init_class(
        &mut self,
        field: FieldHandle,
        method: MethodHandle,
        context: ContextHandle,
        speculative: bool,
        result: CorInfoInitClassResult,
    ) {
        let key = InitClassKey {
            field: field.cast(),
            method: method.cast(),
            context: context.cast(),
            speculative,
        };
        record_once(
            &mut self.packets.init_class,
            Packet::InitClass,
            key,
            result.bits(),
        );
    }

    // Signatures

    /// Records `findSig`: the signature a standalone signature token names.
    pub fn rec_find_sig(
        &mut self,
        module: ModuleHandle,
        sig_token: Token,
        context: ContextHandle,
        sig: &SigInfo,
    ) {
        record_sig(
            &mut self.packets.find_sig,
            &mut self.packets.sig_inst_handles,
            FindSigKey::new(module, sig_token, context),
            sig,
        );
    }

    /// Records `findCallSiteSig`: the signature at a call site, which differs from the
    /// definition for varargs calls.
    pub fn rec_find_call_site_sig(
        &mut self,
        module: ModuleHandle,
        method_token: Token,
        context: ContextHandle,
        sig: &SigInfo,
    ) {
        record_sig(
            &mut self.packets.find_call_site_sig,
            &mut self.packets.sig_inst_handles,
            FindSigKey::new(module, method_token, context),
            sig,
        );
    }

    /// Records `getArgType`.
    pub fn rec_get_arg_type(
        &mut self,
        sig: &SigInfo,
        args: ArgListHandle,
        result: (CorInfoType, ClassHandle),
        exception: u32,
    ) {
        let (cor_type, class) = result;
        record_once(
            &mut self.packets.get_arg_type,
            Packet::GetArgType,
            ArgTypeKey::new(sig, args),
            ArgTypeValue {
                cor_type: cor_type as u32,
                class: class.cast(),
                exception,
            },
        );
    }

    /// Records `getArgNext`.
    pub fn rec_get_arg_next(&mut self, args: ArgListHandle, next: ArgListHandle) {
        record_once(
            &mut self.packets.get_arg_next,
            Packet::GetArgNext,
            args.cast(),
            next.cast(),
        );
    }

    // Environment

    /// Records `getHelperFtn`.
    pub fn rec_get_helper_ftn(&mut self, helper: u32, addr: u64) {
        record_once(
            &mut self.packets.get_helper_ftn,
            Packet::GetHelperFtn,
            helper,
            addr,
        );
    }

    /// Records `getExpectedTargetArchitecture`.
    pub fn rec_get_expected_target_architecture(&mut self, machine: u32) {
        record_once(
            &mut self.packets.get_expected_target_architecture,
            Packet::GetExpectedTargetArchitecture,
            0,
            machine,
        );
    }

    /// Records `getJitFlags`.
    pub fn rec_get_jit_flags(&mut self, flags: u64) {
        record_once(
            &mut self.packets.get_jit_flags,
            Packet::GetJitFlags,
            0,
            flags,
        );
    }

    /// Records `getIntConfigValue`.
    pub fn rec_get_int_config_value(&mut self, name: &str, default_value: i32, value: i32) {
        let map = self
            .packets
            .get_int_config_value
            .get_or_insert_with(LightWeightMap::new);
        let name_index = map.add_buffer_dedup(name.as_bytes());
        record_once(
            &mut self.packets.get_int_config_value,
            Packet::GetIntConfigValue,
            (name_index, default_value),
            value,
        );
    }

    /// Records `getStringConfigValue`.
    pub fn rec_get_string_config_value(&mut self, name: &str, value: Option<&str>) {
        let map = self
            .packets
            .get_string_config_value
            .get_or_insert_with(LightWeightMap::new);
        let name_index = map.add_buffer_dedup(name.as_bytes());
        if map.contains_key(&name_index) {
            return;
        }
        let value_index = store_optional(map, value.map(str::as_bytes));
        map.add(name_index, value_index);
    }

    /// Records `getGSCookie`.
    pub fn rec_get_gs_cookie(&mut self, cookie: &GsCookie) {
        record_once(
            &mut self.packets.get_gs_cookie,
            Packet::GetGsCookie,
            0,
            (cookie.value, cookie.addr),
        );
    }

    /// Records `getRelocTypeHint`.
    pub fn rec_get_reloc_type_hint(&mut self, target: u64, reloc_type: u16) {
        record_once(
            &mut self.packets.get_reloc_type_hint,
            Packet::GetRelocTypeHint,
            target,
            reloc_type,
        );
    }

    // Compilation

    /// Records the method this context is captured for. Only the first call is kept.
    pub fn rec_compile_method(&mut self, info: &MethodInfo, flags: u32) {
        let map = self
            .packets
            .compile_method
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&0) {
            log::warn!("compileMethod recorded twice in one context, keeping the first");
            return;
        }
        let info = pack_method_info(info, map, &mut self.packets.sig_inst_handles);
        map.add(0, CompileMethodValue { info, flags });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_capture() {
        assert_eq!(captured_exception(&Ok::<u32, Error>(5)), Some(0));
        assert_eq!(
            captured_exception(&Err::<u32, Error>(Error::EeException(0xE043_4352))),
            Some(0xE043_4352)
        );
        assert_eq!(
            captured_exception(&Err::<u32, Error>(Error::LockError)),
            None
        );
    }

    #[test]
    fn once_keeps_first_answer() {
        let mut mc = MethodContext::new();
        mc.rec_get_method_attribs(MethodHandle(1), 10);
        mc.rec_get_method_attribs(MethodHandle(1), 10);
        mc.rec_get_method_attribs(MethodHandle(1), 20);
        let map = mc.packets.get_method_attribs.as_ref().unwrap();
        assert_eq!(map.count(), 1);
        assert_eq!(map.get(&1), Some(&10));
    }

    #[test]
    fn every_keeps_all_answers() {
        let mut mc = MethodContext::new();
        mc.rec_get_class_attribs(ClassHandle(7), 1);
        mc.rec_get_class_attribs(ClassHandle(7), 1);
        mc.rec_get_class_attribs(ClassHandle(7), 3);
        let map = mc.packets.get_class_attribs.as_ref().unwrap();
        assert_eq!(map.occurrences(&7), 3);
        assert_eq!(map.get_nth(&7, 2), Some(&3));
    }

    #[test]
    fn optional_strings_keep_empty_distinct() {
        let mut mc = MethodContext::new();
        mc.rec_get_class_name(ClassHandle(1), None);
        mc.rec_get_class_name(ClassHandle(2), Some(""));
        let map = mc.packets.get_class_name.as_ref().unwrap();
        assert_eq!(map.get(&1), Some(&NO_BUFFER));
        assert_ne!(map.get(&2), Some(&NO_BUFFER));
    }

    #[test]
    fn shared_buffers_are_deduplicated() {
        let mut mc = MethodContext::new();
        mc.rec_get_method_name(MethodHandle(1), "Invoke");
        mc.rec_get_method_name(MethodHandle(2), "Invoke");
        let map = mc.packets.get_method_name.as_ref().unwrap();
        assert_eq!(map.get(&1), map.get(&2));
        assert_eq!(map.buffers().count(), 1);
    }

    #[test]
    fn instantiations_only_when_needed() {
        let mut mc = MethodContext::new();
        mc.rec_get_method_sig(MethodHandle(1), ClassHandle::NULL, &SigInfo::default());
        assert!(mc.packets.sig_inst_handles.is_none());

        let generic = SigInfo {
            method_inst: vec![ClassHandle(0x50)],
            ..SigInfo::default()
        };
        mc.rec_get_method_sig(MethodHandle(2), ClassHandle::NULL, &generic);
        assert_eq!(mc.packets.sig_inst_handles.as_ref().unwrap().count(), 1);
    }
}
