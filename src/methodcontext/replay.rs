//! Replay side of the method context: one `rep_*` operation per JIT-EE query.
//!
//! A key that was never recorded is [`crate::Error::NotRecorded`]. A recorded EE exception is
//! raised again as [`crate::Error::EeException`] with the captured code. Legitimately empty
//! answers (no IL, unnamed class, missing config value) come back as `None`.

use widestring::U16String;

use crate::{
    corinfo::{
        ArgListHandle, CallInfo, ClassHandle, ConstLookup, ContextHandle, CorInfoInitClassResult,
        CorInfoInline, CorInfoType, EhClause, FieldHandle, FieldInfo, GsCookie, MethodHandle,
        MethodInfo, ModuleHandle, PgoResults, ResolvedToken, SigInfo, Token, VTableOffset,
    },
    lwm::{BufferPool, NO_BUFFER},
    methodcontext::{
        agnostic::{
            read_buffer, unpack_method_info, unpack_sig, AgnosticResolvedTokenIn, ArgTypeKey,
            CallInfoKey, CanTailCallKey, FieldInfoKey, FindSigKey, InitClassKey, NewHelperKey,
            ResolveVirtualMethodKey,
        },
        MethodContext, Packet,
    },
    Error, Result,
};

fn raise(exception: u32) -> Result<()> {
    if exception == 0 {
        Ok(())
    } else {
        Err(Error::EeException(exception))
    }
}

fn read_optional(pool: &BufferPool, index: u32) -> Result<Option<Vec<u8>>> {
    if index == NO_BUFFER {
        return Ok(None);
    }
    read_buffer(pool, index).map(Some)
}

fn utf8(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| malformed_error!("Recorded {} is not UTF-8", what))
}

impl MethodContext {
    // Methods

    /// Replays `getMethodAttribs`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_method_attribs(&self, ftn: MethodHandle) -> Result<u32> {
        self.packets
            .get_method_attribs
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetMethodAttribs, ftn))
    }

    /// Replays `getMethodSig`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] for an unknown key, [`crate::Error::Malformed`] for a
    /// damaged record.
    pub fn rep_get_method_sig(
        &self,
        ftn: MethodHandle,
        member_parent: ClassHandle,
    ) -> Result<SigInfo> {
        let key = (ftn.cast(), member_parent.cast());
        let Some((map, sig)) = self
            .packets
            .get_method_sig
            .as_ref()
            .and_then(|map| map.get(&key).map(|sig| (map, sig)))
        else {
            return Err(not_recorded!(Packet::GetMethodSig, (ftn, member_parent)));
        };
        unpack_sig(sig, map.buffers(), self.packets.sig_inst_handles.as_ref())
    }

    /// Replays `getMethodInfo`; `Ok(None)` if the method had no IL.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_get_method_info(&self, ftn: MethodHandle) -> Result<Option<MethodInfo>> {
        let Some((map, value)) = self
            .packets
            .get_method_info
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()).map(|value| (map, value)))
        else {
            return Err(not_recorded!(Packet::GetMethodInfo, ftn));
        };
        raise(value.exception)?;
        if !value.result {
            return Ok(None);
        }
        unpack_method_info(
            &value.info,
            map.buffers(),
            self.packets.sig_inst_handles.as_ref(),
        )
        .map(Some)
    }

    /// Replays the `occurrence`-th (0-based) `canInline` query for a pair. Queries beyond the
    /// recorded ones repeat the last answer.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_can_inline(
        &self,
        caller: MethodHandle,
        callee: MethodHandle,
        occurrence: usize,
    ) -> Result<CorInfoInline> {
        let key = (caller.cast(), callee.cast());
        let value = self.packets.can_inline.as_ref().and_then(|map| {
            let recorded = map.occurrences(&key);
            if recorded == 0 {
                return None;
            }
            map.get_nth(&key, occurrence.min(recorded - 1))
        });
        let Some(&(result, exception)) = value else {
            return Err(not_recorded!(Packet::CanInline, (caller, callee)));
        };
        raise(exception)?;
        CorInfoInline::from_i32(result)
    }

    /// Replays `getMethodClass`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_method_class(&self, ftn: MethodHandle) -> Result<ClassHandle> {
        let Some(cls) = self
            .packets
            .get_method_class
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
        else {
            return Err(not_recorded!(Packet::GetMethodClass, ftn));
        };
        ClassHandle::uncast(*cls)
    }

    /// Replays `getMethodName`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_method_name(&self, ftn: MethodHandle) -> Result<String> {
        let Some((map, index)) = self
            .packets
            .get_method_name
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()).map(|index| (map, *index)))
        else {
            return Err(not_recorded!(Packet::GetMethodName, ftn));
        };
        utf8(read_buffer(map.buffers(), index)?, "method name")
    }

    /// Replays `isIntrinsic`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_is_intrinsic(&self, ftn: MethodHandle) -> Result<bool> {
        self.packets
            .is_intrinsic
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::IsIntrinsic, ftn))
    }

    /// Replays `getEHinfo`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the clause was never queried.
    pub fn rep_get_eh_info(&self, ftn: MethodHandle, eh_number: u32) -> Result<EhClause> {
        let Some(clause) = self
            .packets
            .get_eh_info
            .as_ref()
            .and_then(|map| map.get(&(ftn.cast(), eh_number)))
        else {
            return Err(not_recorded!(Packet::GetEhInfo, (ftn, eh_number)));
        };
        Ok(EhClause {
            flags: clause.flags,
            try_offset: clause.try_offset,
            try_length: clause.try_length,
            handler_offset: clause.handler_offset,
            handler_length: clause.handler_length,
            class_token_or_offset: clause.class_token_or_offset,
        })
    }

    /// Replays `canTailCall`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the call was never queried.
    pub fn rep_can_tail_call(
        &self,
        caller: MethodHandle,
        declared_callee: MethodHandle,
        exact_callee: MethodHandle,
        explicit_tail_call: bool,
    ) -> Result<bool> {
        let key = CanTailCallKey {
            caller: caller.cast(),
            declared_callee: declared_callee.cast(),
            exact_callee: exact_callee.cast(),
            explicit_tail_call,
        };
        self.packets
            .can_tail_call
            .as_ref()
            .and_then(|map| map.get(&key))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::CanTailCall, key))
    }

    /// Replays `getUnboxedEntry`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_unboxed_entry(
        &self,
        ftn: MethodHandle,
    ) -> Result<Option<(MethodHandle, bool)>> {
        let Some(&(entry, requires_inst_arg, found)) = self
            .packets
            .get_unboxed_entry
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
        else {
            return Err(not_recorded!(Packet::GetUnboxedEntry, ftn));
        };
        if !found {
            return Ok(None);
        }
        Ok(Some((MethodHandle::uncast(entry)?, requires_inst_arg)))
    }

    /// Replays `getMethodDefFromMethod`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_method_def_from_method(&self, ftn: MethodHandle) -> Result<Token> {
        self.packets
            .get_method_def_from_method
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
            .map(|token| Token(*token))
            .ok_or_else(|| not_recorded!(Packet::GetMethodDefFromMethod, ftn))
    }

    /// Replays `getFunctionEntryPoint`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried with these flags.
    pub fn rep_get_function_entry_point(
        &self,
        ftn: MethodHandle,
        access_flags: u32,
    ) -> Result<ConstLookup> {
        self.packets
            .get_function_entry_point
            .as_ref()
            .and_then(|map| map.get(&(ftn.cast(), access_flags)))
            .map(|lookup| ConstLookup {
                addr: lookup.addr,
                access_type: lookup.access_type,
            })
            .ok_or_else(|| not_recorded!(Packet::GetFunctionEntryPoint, (ftn, access_flags)))
    }

    /// Replays `getPgoInstrumentationResults`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_pgo_instrumentation_results(
        &self,
        ftn: MethodHandle,
    ) -> Result<Option<PgoResults>> {
        let Some((map, value)) = self
            .packets
            .get_pgo_instrumentation_results
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()).map(|value| (map, value)))
        else {
            return Err(not_recorded!(Packet::GetPgoInstrumentationResults, ftn));
        };
        if !value.result {
            return Ok(None);
        }
        Ok(Some(PgoResults {
            schema: read_buffer(map.buffers(), value.schema_index)?,
            data: read_buffer(map.buffers(), value.data_index)?,
            source: value.source,
        }))
    }

    /// Replays `resolveVirtualMethod`; `Ok(None)` if the call could not be devirtualized.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the triple was never queried.
    pub fn rep_resolve_virtual_method(
        &self,
        virtual_method: MethodHandle,
        implementing_class: ClassHandle,
        owner_type: ContextHandle,
    ) -> Result<Option<MethodHandle>> {
        let key = ResolveVirtualMethodKey {
            virtual_method: virtual_method.cast(),
            implementing_class: implementing_class.cast(),
            owner_type: owner_type.cast(),
        };
        let Some(&method) = self
            .packets
            .resolve_virtual_method
            .as_ref()
            .and_then(|map| map.get(&key))
        else {
            return Err(not_recorded!(Packet::ResolveVirtualMethod, key));
        };
        let method = MethodHandle::uncast(method)?;
        Ok((!method.is_null()).then_some(method))
    }

    /// Replays `getMethodVTableOffset`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the method was never queried.
    pub fn rep_get_method_vtable_offset(&self, ftn: MethodHandle) -> Result<VTableOffset> {
        self.packets
            .get_method_vtable_offset
            .as_ref()
            .and_then(|map| map.get(&ftn.cast()))
            .map(
                |&(offset_of_indirection, offset_after_indirection, is_relative)| VTableOffset {
                    offset_of_indirection,
                    offset_after_indirection,
                    is_relative,
                },
            )
            .ok_or_else(|| not_recorded!(Packet::GetMethodVTableOffset, ftn))
    }

    // Tokens

    /// Replays `resolveToken`, filling in the output half of `token`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] for an unknown request, or the recorded
    /// [`crate::Error::EeException`].
    pub fn rep_resolve_token(&self, token: &mut ResolvedToken) -> Result<()> {
        let key = AgnosticResolvedTokenIn::from_live(token);
        let Some((map, value)) = self
            .packets
            .resolve_token
            .as_ref()
            .and_then(|map| map.get(&key).map(|value| (map, value)))
        else {
            return Err(not_recorded!(Packet::ResolveToken, key));
        };
        raise(value.exception)?;

        token.h_class = ClassHandle::uncast(value.out.h_class)?;
        token.h_method = MethodHandle::uncast(value.out.h_method)?;
        token.h_field = FieldHandle::uncast(value.out.h_field)?;
        token.type_spec = read_buffer(map.buffers(), value.out.type_spec_index)?;
        token.method_spec = read_buffer(map.buffers(), value.out.method_spec_index)?;
        Ok(())
    }

    /// Replays `getCallInfo`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_get_call_info(
        &self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<CallInfo> {
        let key = CallInfoKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            h_method: token.h_method.cast(),
            caller: caller.cast(),
            flags,
        };
        let Some((map, info)) = self
            .packets
            .get_call_info
            .as_ref()
            .and_then(|map| map.get(&key).map(|info| (map, info)))
        else {
            return Err(not_recorded!(Packet::GetCallInfo, key));
        };
        raise(info.exception)?;

        Ok(CallInfo {
            h_method: MethodHandle::uncast(info.h_method)?,
            method_flags: info.method_flags,
            class_flags: info.class_flags,
            sig: unpack_sig(&info.sig, map.buffers(), self.packets.sig_inst_handles.as_ref())?,
            access_allowed: info.access_allowed,
            kind: info.kind,
            this_transform: info.this_transform,
            context_handle: ContextHandle::uncast(info.context_handle)?,
            exact_context_needs_runtime_lookup: info.exact_context_needs_runtime_lookup,
            entry_point: info.entry_point,
            null_instance_check: info.null_instance_check,
        })
    }

    /// Replays `getFieldInfo`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_get_field_info(
        &self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<FieldInfo> {
        let key = FieldInfoKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            h_field: token.h_field.cast(),
            caller: caller.cast(),
            flags,
        };
        let Some(info) = self
            .packets
            .get_field_info
            .as_ref()
            .and_then(|map| map.get(&key))
        else {
            return Err(not_recorded!(Packet::GetFieldInfo, key));
        };
        raise(info.exception)?;

        Ok(FieldInfo {
            field_accessor: info.field_accessor,
            field_flags: info.field_flags,
            helper: info.helper,
            offset: info.offset,
            field_type: CorInfoType::from_u32(info.field_type)?,
            struct_type: ClassHandle::uncast(info.struct_type)?,
            access_allowed: info.access_allowed,
        })
    }

    /// Replays `getStringLiteral`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the token was never queried.
    pub fn rep_get_string_literal(
        &self,
        module: ModuleHandle,
        token: Token,
    ) -> Result<Option<U16String>> {
        let key = (module.cast(), token.value());
        let Some((map, index)) = self
            .packets
            .get_string_literal
            .as_ref()
            .and_then(|map| map.get(&key).map(|index| (map, *index)))
        else {
            return Err(not_recorded!(Packet::GetStringLiteral, (module, token)));
        };
        let Some(bytes) = read_optional(map.buffers(), index)? else {
            return Ok(None);
        };
        if bytes.len() % 2 != 0 {
            return Err(malformed_error!("String literal of odd length {}", bytes.len()));
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Some(U16String::from_vec(units)))
    }

    /// Replays `getNewHelper`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_get_new_helper(&self, token: &ResolvedToken, caller: MethodHandle) -> Result<u32> {
        let key = NewHelperKey {
            token: AgnosticResolvedTokenIn::from_live(token),
            h_class: token.h_class.cast(),
            caller: caller.cast(),
        };
        let Some(&(helper, exception)) = self
            .packets
            .get_new_helper
            .as_ref()
            .and_then(|map| map.get(&key))
        else {
            return Err(not_recorded!(Packet::GetNewHelper, key));
        };
        raise(exception)?;
        Ok(helper)
    }

    // Classes

    /// Replays `getClassName`; `Ok(None)` if the EE could not name the class.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_class_name(&self, cls: ClassHandle) -> Result<Option<String>> {
        let Some((map, index)) = self
            .packets
            .get_class_name
            .as_ref()
            .and_then(|map| map.get(&cls.cast()).map(|index| (map, *index)))
        else {
            return Err(not_recorded!(Packet::GetClassName, cls));
        };
        read_optional(map.buffers(), index)?
            .map(|bytes| utf8(bytes, "class name"))
            .transpose()
    }

    /// Replays the `occurrence`-th (0-based) `getClassAttribs` query for a class. Queries
    /// beyond the recorded ones repeat the last answer.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_class_attribs(&self, cls: ClassHandle, occurrence: usize) -> Result<u32> {
        let key = cls.cast();
        self.packets
            .get_class_attribs
            .as_ref()
            .and_then(|map| {
                let recorded = map.occurrences(&key);
                if recorded == 0 {
                    return None;
                }
                map.get_nth(&key, occurrence.min(recorded - 1))
            })
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetClassAttribs, cls))
    }

    /// Replays `getClassSize`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_class_size(&self, cls: ClassHandle) -> Result<u32> {
        self.packets
            .get_class_size
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetClassSize, cls))
    }

    /// Replays `isValueClass`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_is_value_class(&self, cls: ClassHandle) -> Result<bool> {
        self.packets
            .is_value_class
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::IsValueClass, cls))
    }

    /// Replays `getTypeForPrimitiveValueClass`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_type_for_primitive_value_class(&self, cls: ClassHandle) -> Result<CorInfoType> {
        let Some(ty) = self
            .packets
            .get_type_for_primitive_value_class
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
        else {
            return Err(not_recorded!(Packet::GetTypeForPrimitiveValueClass, cls));
        };
        CorInfoType::from_u32(*ty)
    }

    /// Replays `getDefaultComparerClass`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_default_comparer_class(&self, cls: ClassHandle) -> Result<ClassHandle> {
        let Some(comparer) = self
            .packets
            .get_default_comparer_class
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
        else {
            return Err(not_recorded!(Packet::GetDefaultComparerClass, cls));
        };
        ClassHandle::uncast(*comparer)
    }

    /// Replays `getClassModule`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_get_class_module(&self, cls: ClassHandle) -> Result<ModuleHandle> {
        let Some(module) = self
            .packets
            .get_class_module
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
        else {
            return Err(not_recorded!(Packet::GetClassModule, cls));
        };
        ModuleHandle::uncast(*module)
    }

    /// Replays `embedClassHandle`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class was never queried.
    pub fn rep_embed_class_handle(&self, cls: ClassHandle) -> Result<u64> {
        self.packets
            .embed_class_handle
            .as_ref()
            .and_then(|map| map.get(&cls.cast()))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::EmbedClassHandle, cls))
    }

    /// Replays `initClass`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the class initialization was never queried.
    pub fn rep_init_class(
        &self,
        field: FieldHandle,
        method: MethodHandle,
        context: ContextHandle,
        speculative: bool,
    ) -> Result<CorInfoInitClassResult> {
        let key = InitClassKey {
            field: field.cast(),
            method: method.cast(),
            context: context.cast(),
            speculative,
        };
        let Some(&bits) = self.packets.init_class.as_ref().and_then(|map| map.get(&key)) else {
            return Err(not_recorded!(Packet::InitClass, key));
        };
        CorInfoInitClassResult::from_bits(bits)
            .ok_or_else(|| malformed_error!("Invalid initClass result 0x{:x}", bits))
    }

    // Signatures

    /// Replays `findSig`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the token was never looked up in this context.
    pub fn rep_find_sig(
        &self,
        module: ModuleHandle,
        sig_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        let key = FindSigKey::new(module, sig_token, context);
        let Some((map, sig)) = self
            .packets
            .find_sig
            .as_ref()
            .and_then(|map| map.get(&key).map(|sig| (map, sig)))
        else {
            return Err(not_recorded!(Packet::FindSig, key));
        };
        unpack_sig(sig, map.buffers(), self.packets.sig_inst_handles.as_ref())
    }

    /// Replays `findCallSiteSig`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the call site was never looked up in this context.
    pub fn rep_find_call_site_sig(
        &self,
        module: ModuleHandle,
        method_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        let key = FindSigKey::new(module, method_token, context);
        let Some((map, sig)) = self
            .packets
            .find_call_site_sig
            .as_ref()
            .and_then(|map| map.get(&key).map(|sig| (map, sig)))
        else {
            return Err(not_recorded!(Packet::FindCallSiteSig, key));
        };
        unpack_sig(sig, map.buffers(), self.packets.sig_inst_handles.as_ref())
    }

    /// Replays `getArgType`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`], or the recorded [`crate::Error::EeException`].
    pub fn rep_get_arg_type(
        &self,
        sig: &SigInfo,
        args: ArgListHandle,
    ) -> Result<(CorInfoType, ClassHandle)> {
        let key = ArgTypeKey::new(sig, args);
        let Some(value) = self
            .packets
            .get_arg_type
            .as_ref()
            .and_then(|map| map.get(&key))
        else {
            return Err(not_recorded!(Packet::GetArgType, key));
        };
        raise(value.exception)?;
        Ok((
            CorInfoType::from_u32(value.cor_type)?,
            ClassHandle::uncast(value.class)?,
        ))
    }

    /// Replays `getArgNext`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the cursor was never advanced.
    pub fn rep_get_arg_next(&self, args: ArgListHandle) -> Result<ArgListHandle> {
        let Some(next) = self
            .packets
            .get_arg_next
            .as_ref()
            .and_then(|map| map.get(&args.cast()))
        else {
            return Err(not_recorded!(Packet::GetArgNext, args));
        };
        ArgListHandle::uncast(*next)
    }

    // Environment

    /// Replays `getHelperFtn`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the helper was never queried.
    pub fn rep_get_helper_ftn(&self, helper: u32) -> Result<u64> {
        self.packets
            .get_helper_ftn
            .as_ref()
            .and_then(|map| map.get(&helper))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetHelperFtn, helper))
    }

    /// Replays `getExpectedTargetArchitecture`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if it was never queried.
    pub fn rep_get_expected_target_architecture(&self) -> Result<u32> {
        self.packets
            .get_expected_target_architecture
            .as_ref()
            .and_then(|map| map.get(&0))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetExpectedTargetArchitecture, 0))
    }

    /// Replays `getJitFlags`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if it was never queried.
    pub fn rep_get_jit_flags(&self) -> Result<u64> {
        self.packets
            .get_jit_flags
            .as_ref()
            .and_then(|map| map.get(&0))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetJitFlags, 0))
    }

    /// Replays `getIntConfigValue`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the setting was never queried with this default.
    pub fn rep_get_int_config_value(&self, name: &str, default_value: i32) -> Result<i32> {
        self.packets
            .get_int_config_value
            .as_ref()
            .and_then(|map| {
                let name_index = map.contains(name.as_bytes())?;
                map.get(&(name_index, default_value))
            })
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetIntConfigValue, (name, default_value)))
    }

    /// Replays `getStringConfigValue`; `Ok(None)` if the setting is unset.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the setting was never queried.
    pub fn rep_get_string_config_value(&self, name: &str) -> Result<Option<String>> {
        let Some((map, index)) = self.packets.get_string_config_value.as_ref().and_then(|map| {
            let name_index = map.contains(name.as_bytes())?;
            map.get(&name_index).map(|index| (map, *index))
        }) else {
            return Err(not_recorded!(Packet::GetStringConfigValue, name));
        };
        read_optional(map.buffers(), index)?
            .map(|bytes| utf8(bytes, "config value"))
            .transpose()
    }

    /// Replays `getGSCookie`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if it was never queried.
    pub fn rep_get_gs_cookie(&self) -> Result<GsCookie> {
        self.packets
            .get_gs_cookie
            .as_ref()
            .and_then(|map| map.get(&0))
            .map(|&(value, addr)| GsCookie { value, addr })
            .ok_or_else(|| not_recorded!(Packet::GetGsCookie, 0))
    }

    /// Replays `getRelocTypeHint`.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the target was never queried.
    pub fn rep_get_reloc_type_hint(&self, target: u64) -> Result<u16> {
        self.packets
            .get_reloc_type_hint
            .as_ref()
            .and_then(|map| map.get(&target))
            .copied()
            .ok_or_else(|| not_recorded!(Packet::GetRelocTypeHint, target))
    }

    // Compilation

    /// The method and flags this context was captured for.
    ///
    /// # Errors
    /// [`crate::Error::NotRecorded`] if the context has no `compileMethod` record.
    pub fn rep_compile_method(&self) -> Result<(MethodInfo, u32)> {
        let Some((map, value)) = self
            .packets
            .compile_method
            .as_ref()
            .and_then(|map| map.get(&0).map(|value| (map, value)))
        else {
            return Err(not_recorded!(Packet::CompileMethod, 0));
        };
        let info = unpack_method_info(
            &value.info,
            map.buffers(),
            self.packets.sig_inst_handles.as_ref(),
        )?;
        Ok((info, value.flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{corinfo::CorInfoTokenKind, ErrorKind};

    fn through_bytes(mc: &MethodContext) -> MethodContext {
        MethodContext::from_bytes(&mc.to_bytes().unwrap()).unwrap()
    }

    fn request(token: u32) -> ResolvedToken {
        ResolvedToken::new(
            ContextHandle(0x1000),
            ModuleHandle(0x2000),
            Token::new(token),
            CorInfoTokenKind::METHOD,
        )
    }

    #[test]
    fn resolve_token() {
        let mut answered = request(0x0600_0001);
        answered.h_method = MethodHandle(0x3000);
        answered.h_class = ClassHandle(0x4000);

        let mut mc = MethodContext::new();
        mc.rec_resolve_token(&answered, 0);
        let mc = through_bytes(&mc);

        let mut query = request(0x0600_0001);
        mc.rep_resolve_token(&mut query).unwrap();
        assert_eq!(query, answered);
        assert!(query.method_spec.is_empty());

        let mut other = request(0x0600_0002);
        let err = mc.rep_resolve_token(&mut other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotRecorded);
        assert!(other.h_method.is_null());
    }

    #[test]
    fn exceptions_are_reraised() {
        let mut mc = MethodContext::new();
        mc.rec_resolve_token(&request(0x0A00_0001), 0xE043_4352);
        mc.rec_get_method_info(MethodHandle(0x3000), None, 0xC000_0005);
        mc.rec_can_inline(
            MethodHandle(1),
            MethodHandle(2),
            CorInfoInline::Fail,
            0xE043_4352,
        );
        let mc = through_bytes(&mc);

        let err = mc.rep_resolve_token(&mut request(0x0A00_0001)).unwrap_err();
        assert!(matches!(err, Error::EeException(0xE043_4352)));
        assert!(matches!(
            mc.rep_get_method_info(MethodHandle(0x3000)),
            Err(Error::EeException(0xC000_0005))
        ));
        assert!(matches!(
            mc.rep_can_inline(MethodHandle(1), MethodHandle(2), 0),
            Err(Error::EeException(0xE043_4352))
        ));
    }

    #[test]
    fn method_info() {
        let info = MethodInfo {
            ftn: MethodHandle(0x3000),
            scope: ModuleHandle(0x2000),
            il_code: vec![0x02, 0x28, 0x01, 0x00, 0x00, 0x06, 0x2A],
            max_stack: 8,
            eh_count: 1,
            args: SigInfo {
                call_conv: 0x20,
                num_args: 1,
                ret_type: CorInfoType::Void,
                sig: vec![0x20, 0x01, 0x01, 0x08],
                class_inst: vec![ClassHandle(0x77)],
                ..SigInfo::default()
            },
            ..MethodInfo::default()
        };

        let mut mc = MethodContext::new();
        mc.rec_get_method_info(MethodHandle(0x3000), Some(&info), 0);
        mc.rec_get_method_info(MethodHandle(0x3100), None, 0);
        mc.rec_compile_method(&info, 0x40);
        let mc = through_bytes(&mc);

        assert_eq!(mc.rep_get_method_info(MethodHandle(0x3000)).unwrap(), Some(info.clone()));
        assert_eq!(mc.rep_get_method_info(MethodHandle(0x3100)).unwrap(), None);
        assert!(mc
            .rep_get_method_info(MethodHandle(0x3200))
            .unwrap_err()
            .is_not_recorded());
        assert_eq!(mc.rep_compile_method().unwrap(), (info, 0x40));
    }

    #[test]
    fn occurrences_replay_in_order() {
        let mut mc = MethodContext::new();
        mc.rec_can_inline(MethodHandle(1), MethodHandle(2), CorInfoInline::Pass, 0);
        mc.rec_can_inline(MethodHandle(1), MethodHandle(2), CorInfoInline::Never, 0);
        mc.rec_get_class_attribs(ClassHandle(5), 0x1);
        mc.rec_get_class_attribs(ClassHandle(5), 0x3);
        let mc = through_bytes(&mc);

        let pair = (MethodHandle(1), MethodHandle(2));
        assert_eq!(mc.rep_can_inline(pair.0, pair.1, 0).unwrap(), CorInfoInline::Pass);
        assert_eq!(mc.rep_can_inline(pair.0, pair.1, 1).unwrap(), CorInfoInline::Never);
        assert_eq!(mc.rep_can_inline(pair.0, pair.1, 7).unwrap(), CorInfoInline::Never);
        assert_eq!(mc.rep_get_class_attribs(ClassHandle(5), 0).unwrap(), 0x1);
        assert_eq!(mc.rep_get_class_attribs(ClassHandle(5), 1).unwrap(), 0x3);
        assert!(mc.rep_get_class_attribs(ClassHandle(6), 0).is_err());
    }

    #[test]
    fn strings() {
        let literal = U16String::from_str("hello");
        let mut mc = MethodContext::new();
        mc.rec_get_class_name(ClassHandle(1), Some("System.Object"));
        mc.rec_get_class_name(ClassHandle(2), None);
        mc.rec_get_method_name(MethodHandle(3), "ToString");
        mc.rec_get_string_literal(ModuleHandle(4), Token(0x7000_0001), Some(&literal));
        mc.rec_get_string_literal(ModuleHandle(4), Token(0x7000_0002), None);
        mc.rec_get_string_config_value("JitDisasm", Some(""));
        mc.rec_get_string_config_value("JitStdOutFile", None);
        mc.rec_get_int_config_value("JitStress", 0, 2);
        let mc = through_bytes(&mc);

        assert_eq!(
            mc.rep_get_class_name(ClassHandle(1)).unwrap().as_deref(),
            Some("System.Object")
        );
        assert_eq!(mc.rep_get_class_name(ClassHandle(2)).unwrap(), None);
        assert_eq!(mc.rep_get_method_name(MethodHandle(3)).unwrap(), "ToString");
        assert_eq!(
            mc.rep_get_string_literal(ModuleHandle(4), Token(0x7000_0001))
                .unwrap(),
            Some(literal)
        );
        assert_eq!(
            mc.rep_get_string_literal(ModuleHandle(4), Token(0x7000_0002))
                .unwrap(),
            None
        );
        assert_eq!(
            mc.rep_get_string_config_value("JitDisasm").unwrap().as_deref(),
            Some("")
        );
        assert_eq!(mc.rep_get_string_config_value("JitStdOutFile").unwrap(), None);
        assert!(mc.rep_get_string_config_value("JitDump").is_err());
        assert_eq!(mc.rep_get_int_config_value("JitStress", 0).unwrap(), 2);
        assert!(mc.rep_get_int_config_value("JitStress", 1).is_err());
    }

    #[test]
    fn call_and_field_info() {
        let mut token = request(0x0A00_0010);
        token.h_method = MethodHandle(0x3300);
        token.h_class = ClassHandle(0x4400);
        let call = CallInfo {
            h_method: MethodHandle(0x3300),
            method_flags: 0x10,
            sig: SigInfo {
                ret_type: CorInfoType::Int,
                sig: vec![0x00, 0x00, 0x08],
                ..SigInfo::default()
            },
            entry_point: 0x7FF0_0000,
            ..CallInfo::default()
        };
        let field = FieldInfo {
            offset: 8,
            field_type: CorInfoType::Long,
            ..FieldInfo::default()
        };

        let mut mc = MethodContext::new();
        mc.rec_get_call_info(&token, MethodHandle(0x3000), 1, &call, 0);
        mc.rec_get_field_info(&token, MethodHandle(0x3000), 2, &field, 0);
        let mc = through_bytes(&mc);

        assert_eq!(
            mc.rep_get_call_info(&token, MethodHandle(0x3000), 1).unwrap(),
            call
        );
        assert!(mc.rep_get_call_info(&token, MethodHandle(0x3000), 2).is_err());
        assert_eq!(
            mc.rep_get_field_info(&token, MethodHandle(0x3000), 2).unwrap(),
            field
        );
    }

    #[test]
    fn arg_walk() {
        let sig = SigInfo {
            num_args: 2,
            args: ArgListHandle(0x100),
            scope: ModuleHandle(0x2000),
            ..SigInfo::default()
        };
        let mut mc = MethodContext::new();
        mc.rec_get_arg_type(&sig, ArgListHandle(0x100), (CorInfoType::Int, ClassHandle::NULL), 0);
        mc.rec_get_arg_next(ArgListHandle(0x100), ArgListHandle(0x104));
        mc.rec_get_arg_type(&sig, ArgListHandle(0x104), (CorInfoType::Class, ClassHandle(0x55)), 0);
        let mc = through_bytes(&mc);

        assert_eq!(
            mc.rep_get_arg_type(&sig, ArgListHandle(0x100)).unwrap(),
            (CorInfoType::Int, ClassHandle::NULL)
        );
        let next = mc.rep_get_arg_next(ArgListHandle(0x100)).unwrap();
        assert_eq!(
            mc.rep_get_arg_type(&sig, next).unwrap(),
            (CorInfoType::Class, ClassHandle(0x55))
        );
        assert!(mc.rep_get_arg_next(next).is_err());
    }

    #[test]
    fn environment() {
        let mut mc = MethodContext::new();
        mc.rec_get_jit_flags(0x8000);
        mc.rec_get_expected_target_architecture(0x8664);
        mc.rec_get_gs_cookie(&GsCookie {
            value: 0x2B99_2DDF_A232,
            addr: 0x7FF0_1000,
        });
        mc.rec_get_unboxed_entry(MethodHandle(9), Some((MethodHandle(10), true)));
        mc.rec_get_unboxed_entry(MethodHandle(11), None);
        mc.rec_get_pgo_instrumentation_results(MethodHandle(9), None);
        let mc = through_bytes(&mc);

        assert_eq!(mc.rep_get_jit_flags().unwrap(), 0x8000);
        assert_eq!(mc.rep_get_expected_target_architecture().unwrap(), 0x8664);
        assert_eq!(mc.rep_get_gs_cookie().unwrap().addr, 0x7FF0_1000);
        assert_eq!(
            mc.rep_get_unboxed_entry(MethodHandle(9)).unwrap(),
            Some((MethodHandle(10), true))
        );
        assert_eq!(mc.rep_get_unboxed_entry(MethodHandle(11)).unwrap(), None);
        assert_eq!(
            mc.rep_get_pgo_instrumentation_results(MethodHandle(9)).unwrap(),
            None
        );
        assert!(mc.rep_get_reloc_type_hint(0).is_err());
    }

    #[test]
    fn find_sig() {
        let module = ModuleHandle(0x2000);
        let context = ContextHandle(0x1000);
        let vararg = SigInfo {
            call_conv: 0x05,
            ret_type: CorInfoType::Void,
            num_args: 2,
            sig: vec![0x05, 0x02, 0x01, 0x08, 0x41, 0x08],
            class_inst: vec![ClassHandle(0x77)],
            scope: module,
            token: Token(0x0A00_0003),
            ..SigInfo::default()
        };

        let mut mc = MethodContext::new();
        mc.rec_find_sig(module, Token(0x1100_0001), context, &SigInfo::default());
        mc.rec_find_call_site_sig(module, Token(0x0A00_0003), context, &vararg);
        let mc = through_bytes(&mc);

        // A recorded empty signature is an answer, not a miss
        assert_eq!(
            mc.rep_find_sig(module, Token(0x1100_0001), context).unwrap(),
            SigInfo::default()
        );
        let err = mc
            .rep_find_sig(module, Token(0x1100_0002), context)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotRecorded);
        assert!(mc
            .rep_find_sig(module, Token(0x1100_0001), ContextHandle(0x1001))
            .unwrap_err()
            .is_not_recorded());

        assert_eq!(
            mc.rep_find_call_site_sig(module, Token(0x0A00_0003), context)
                .unwrap(),
            vararg
        );
        assert!(mc
            .rep_find_sig(module, Token(0x0A00_0003), context)
            .unwrap_err()
            .is_not_recorded());
    }

    #[test]
    fn devirtualization_and_class_init() {
        let owner = ContextHandle(0x4401);
        let caller = MethodHandle(0x3000);
        let slot = VTableOffset {
            offset_of_indirection: 0x40,
            offset_after_indirection: 0x10,
            is_relative: false,
        };
        let mut allocated = request(0x0200_0004);
        allocated.h_class = ClassHandle(0x4400);
        let abstract_class = request(0x0200_0005);

        let mut mc = MethodContext::new();
        mc.rec_resolve_virtual_method(
            caller,
            ClassHandle(0x4400),
            owner,
            Some(MethodHandle(0x3500)),
        );
        mc.rec_resolve_virtual_method(caller, ClassHandle(0x4500), owner, None);
        mc.rec_get_method_vtable_offset(caller, &slot);
        mc.rec_init_class(
            FieldHandle::NULL,
            caller,
            owner,
            true,
            CorInfoInitClassResult::USE_HELPER | CorInfoInitClassResult::DONT_INLINE,
        );
        mc.rec_init_class(
            FieldHandle(0x5000),
            caller,
            owner,
            false,
            CorInfoInitClassResult::empty(),
        );
        mc.rec_get_new_helper(&allocated, caller, 0x1E, 0);
        mc.rec_get_new_helper(&abstract_class, caller, 0, 0xE043_4352);
        let mc = through_bytes(&mc);

        assert_eq!(
            mc.rep_resolve_virtual_method(caller, ClassHandle(0x4400), owner)
                .unwrap(),
            Some(MethodHandle(0x3500))
        );
        assert_eq!(
            mc.rep_resolve_virtual_method(caller, ClassHandle(0x4500), owner)
                .unwrap(),
            None
        );
        assert!(mc
            .rep_resolve_virtual_method(caller, ClassHandle(0x4600), owner)
            .unwrap_err()
            .is_not_recorded());
        assert_eq!(mc.rep_get_method_vtable_offset(caller).unwrap(), slot);

        assert_eq!(
            mc.rep_init_class(FieldHandle::NULL, caller, owner, true)
                .unwrap(),
            CorInfoInitClassResult::USE_HELPER | CorInfoInitClassResult::DONT_INLINE
        );
        assert!(mc
            .rep_init_class(FieldHandle::NULL, caller, owner, false)
            .is_err());
        assert!(mc
            .rep_init_class(FieldHandle(0x5000), caller, owner, false)
            .unwrap()
            .is_empty());

        assert_eq!(mc.rep_get_new_helper(&allocated, caller).unwrap(), 0x1E);
        assert!(matches!(
            mc.rep_get_new_helper(&abstract_class, caller),
            Err(Error::EeException(0xE043_4352))
        ));
    }
}
