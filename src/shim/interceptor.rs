//! The recording shim.
//!
//! [`Interceptor`] implements [`JitEeInterface`] by forwarding every call to the real EE and
//! recording the exchange into a [`MethodContext`]. The real answer is returned unchanged,
//! whether or not it could be recorded: a query that fails for any reason other than an EE
//! exception is simply not captured.

use widestring::U16String;

use crate::{
    corinfo::{
        AllocMemBlocks, AllocMemRequest, ArgListHandle, BoundaryEntry, CallInfo, ClassHandle,
        ConstLookup, ContextHandle, CorInfoInitClassResult, CorInfoInline, CorInfoType,
        CorJitResult, EhClause, FieldHandle, FieldInfo, GsCookie, JitEeInterface, MethodHandle,
        MethodInfo, ModuleHandle, PgoResults, Relocation, ResolvedToken, SigInfo, Token,
        UnwindInfo, VTableOffset,
    },
    methodcontext::{captured_exception, MethodContext},
    Result,
};

/// Forwards to a real EE and records every call.
pub struct Interceptor<'a> {
    original: &'a mut dyn JitEeInterface,
    mc: &'a mut MethodContext,
}

impl<'a> Interceptor<'a> {
    /// Wraps `original`, recording into `mc`.
    pub fn new(original: &'a mut dyn JitEeInterface, mc: &'a mut MethodContext) -> Self {
        Interceptor { original, mc }
    }

    /// The context being recorded into
    #[must_use]
    pub fn method_context(&self) -> &MethodContext {
        &*self.mc
    }

    fn count(&mut self, name: &str) {
        self.mc.compile_result_mut().add_call(name);
    }
}

impl JitEeInterface for Interceptor<'_> {
    fn get_method_attribs(&mut self, ftn: MethodHandle) -> Result<u32> {
        self.count("getMethodAttribs");
        let result = self.original.get_method_attribs(ftn);
        if let Ok(attribs) = &result {
            self.mc.rec_get_method_attribs(ftn, *attribs);
        }
        result
    }

    fn get_method_sig(
        &mut self,
        ftn: MethodHandle,
        member_parent: ClassHandle,
    ) -> Result<SigInfo> {
        self.count("getMethodSig");
        let result = self.original.get_method_sig(ftn, member_parent);
        if let Ok(sig) = &result {
            self.mc.rec_get_method_sig(ftn, member_parent, sig);
        }
        result
    }

    fn get_method_info(&mut self, ftn: MethodHandle) -> Result<Option<MethodInfo>> {
        self.count("getMethodInfo");
        let result = self.original.get_method_info(ftn);
        if let Some(exception) = captured_exception(&result) {
            let info = result.as_ref().ok().and_then(Option::as_ref);
            self.mc.rec_get_method_info(ftn, info, exception);
        }
        result
    }

    fn can_inline(&mut self, caller: MethodHandle, callee: MethodHandle) -> Result<CorInfoInline> {
        self.count("canInline");
        let result = self.original.can_inline(caller, callee);
        if let Some(exception) = captured_exception(&result) {
            let answer = result.as_ref().copied().unwrap_or(CorInfoInline::Fail);
            self.mc.rec_can_inline(caller, callee, answer, exception);
        }
        result
    }

    fn get_method_class(&mut self, ftn: MethodHandle) -> Result<ClassHandle> {
        self.count("getMethodClass");
        let result = self.original.get_method_class(ftn);
        if let Ok(cls) = &result {
            self.mc.rec_get_method_class(ftn, *cls);
        }
        result
    }

    fn get_method_name(&mut self, ftn: MethodHandle) -> Result<String> {
        self.count("getMethodName");
        let result = self.original.get_method_name(ftn);
        if let Ok(name) = &result {
            self.mc.rec_get_method_name(ftn, name);
        }
        result
    }

    fn is_intrinsic(&mut self, ftn: MethodHandle) -> Result<bool> {
        self.count("isIntrinsic");
        let result = self.original.is_intrinsic(ftn);
        if let Ok(intrinsic) = &result {
            self.mc.rec_is_intrinsic(ftn, *intrinsic);
        }
        result
    }

    fn get_eh_info(&mut self, ftn: MethodHandle, eh_number: u32) -> Result<EhClause> {
        self.count("getEHinfo");
        let result = self.original.get_eh_info(ftn, eh_number);
        if let Ok(clause) = &result {
            self.mc.rec_get_eh_info(ftn, eh_number, clause);
        }
        result
    }

    fn can_tail_call(
        &mut self,
        caller: MethodHandle,
        declared_callee: MethodHandle,
        exact_callee: MethodHandle,
        explicit_tail_call: bool,
    ) -> Result<bool> {
        self.count("canTailCall");
        let result =
            self.original
                .can_tail_call(caller, declared_callee, exact_callee, explicit_tail_call);
        if let Ok(allowed) = &result {
            self.mc.rec_can_tail_call(
                caller,
                declared_callee,
                exact_callee,
                explicit_tail_call,
                *allowed,
            );
        }
        result
    }

    fn get_unboxed_entry(&mut self, ftn: MethodHandle) -> Result<Option<(MethodHandle, bool)>> {
        self.count("getUnboxedEntry");
        let result = self.original.get_unboxed_entry(ftn);
        if let Ok(entry) = &result {
            self.mc.rec_get_unboxed_entry(ftn, *entry);
        }
        result
    }

    fn get_method_def_from_method(&mut self, ftn: MethodHandle) -> Result<Token> {
        self.count("getMethodDefFromMethod");
        let result = self.original.get_method_def_from_method(ftn);
        if let Ok(token) = &result {
            self.mc.rec_get_method_def_from_method(ftn, *token);
        }
        result
    }

    fn get_function_entry_point(
        &mut self,
        ftn: MethodHandle,
        access_flags: u32,
    ) -> Result<ConstLookup> {
        self.count("getFunctionEntryPoint");
        let result = self.original.get_function_entry_point(ftn, access_flags);
        if let Ok(lookup) = &result {
            self.mc.rec_get_function_entry_point(ftn, access_flags, lookup);
        }
        result
    }

    fn get_pgo_instrumentation_results(
        &mut self,
        ftn: MethodHandle,
    ) -> Result<Option<PgoResults>> {
        self.count("getPgoInstrumentationResults");
        let result = self.original.get_pgo_instrumentation_results(ftn);
        if let Ok(results) = &result {
            self.mc
                .rec_get_pgo_instrumentation_results(ftn, results.as_ref());
        }
        result
    }

    fn resolve_virtual_method(
        &mut self,
        virtual_method: MethodHandle,
        implementing_class: ClassHandle,
        owner_type: ContextHandle,
    ) -> Result<Option<MethodHandle>> {
        self.count("resolveVirtualMethod");
        let result =
            self.original
                .resolve_virtual_method(virtual_method, implementing_class, owner_type);
        if let Ok(method) = &result {
            self.mc.rec_resolve_virtual_method(
                virtual_method,
                implementing_class,
                owner_type,
                *method,
            );
        }
        result
    }

    fn get_method_vtable_offset(&mut self, ftn: MethodHandle) -> Result<VTableOffset> {
        self.count("getMethodVTableOffset");
        let result = self.original.get_method_vtable_offset(ftn);
        if let Ok(offset) = &result {
            self.mc.rec_get_method_vtable_offset(ftn, offset);
        }
        result
    }

    fn resolve_token(&mut self, token: &mut ResolvedToken) -> Result<()> {
        self.count("resolveToken");
        let result = self.original.resolve_token(token);
        if let Some(exception) = captured_exception(&result) {
            self.mc.rec_resolve_token(token, exception);
        }
        result
    }

    fn get_call_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<CallInfo> {
        self.count("getCallInfo");
        let result = self.original.get_call_info(token, caller, flags);
        if let Some(exception) = captured_exception(&result) {
            let fallback = CallInfo::default();
            let info = result.as_ref().unwrap_or(&fallback);
            self.mc
                .rec_get_call_info(token, caller, flags, info, exception);
        }
        result
    }

    fn get_field_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<FieldInfo> {
        self.count("getFieldInfo");
        let result = self.original.get_field_info(token, caller, flags);
        if let Some(exception) = captured_exception(&result) {
            let fallback = FieldInfo::default();
            let info = result.as_ref().unwrap_or(&fallback);
            self.mc
                .rec_get_field_info(token, caller, flags, info, exception);
        }
        result
    }

    fn get_string_literal(
        &mut self,
        module: ModuleHandle,
        token: Token,
    ) -> Result<Option<U16String>> {
        self.count("getStringLiteral");
        let result = self.original.get_string_literal(module, token);
        if let Ok(literal) = &result {
            self.mc
                .rec_get_string_literal(module, token, literal.as_ref());
        }
        result
    }

    fn get_new_helper(&mut self, token: &ResolvedToken, caller: MethodHandle) -> Result<u32> {
        self.count("getNewHelper");
        let result = self.original.get_new_helper(token, caller);
        if let Some(exception) = captured_exception(&result) {
            let helper = result.as_ref().copied().unwrap_or_default();
            self.mc.rec_get_new_helper(token, caller, helper, exception);
        }
        result
    }

    fn get_class_name(&mut self, cls: ClassHandle) -> Result<Option<String>> {
        self.count("getClassName");
        let result = self.original.get_class_name(cls);
        if let Ok(name) = &result {
            self.mc.rec_get_class_name(cls, name.as_deref());
        }
        result
    }

    fn get_class_attribs(&mut self, cls: ClassHandle) -> Result<u32> {
        self.count("getClassAttribs");
        let result = self.original.get_class_attribs(cls);
        if let Ok(attribs) = &result {
            self.mc.rec_get_class_attribs(cls, *attribs);
        }
        result
    }

    fn get_class_size(&mut self, cls: ClassHandle) -> Result<u32> {
        self.count("getClassSize");
        let result = self.original.get_class_size(cls);
        if let Ok(size) = &result {
            self.mc.rec_get_class_size(cls, *size);
        }
        result
    }

    fn is_value_class(&mut self, cls: ClassHandle) -> Result<bool> {
        self.count("isValueClass");
        let result = self.original.is_value_class(cls);
        if let Ok(value_class) = &result {
            self.mc.rec_is_value_class(cls, *value_class);
        }
        result
    }

    fn get_type_for_primitive_value_class(&mut self, cls: ClassHandle) -> Result<CorInfoType> {
        self.count("getTypeForPrimitiveValueClass");
        let result = self.original.get_type_for_primitive_value_class(cls);
        if let Ok(ty) = &result {
            self.mc.rec_get_type_for_primitive_value_class(cls, *ty);
        }
        result
    }

    fn get_default_comparer_class(&mut self, cls: ClassHandle) -> Result<ClassHandle> {
        self.count("getDefaultComparerClass");
        let result = self.original.get_default_comparer_class(cls);
        if let Ok(comparer) = &result {
            self.mc.rec_get_default_comparer_class(cls, *comparer);
        }
        result
    }

    fn get_class_module(&mut self, cls: ClassHandle) -> Result<ModuleHandle> {
        self.count("getClassModule");
        let result = self.original.get_class_module(cls);
        if let Ok(module) = &result {
            self.mc.rec_get_class_module(cls, *module);
        }
        result
    }

    fn embed_class_handle(&mut self, cls: ClassHandle) -> Result<u64> {
        self.count("embedClassHandle");
        let result = self.original.embed_class_handle(cls);
        if let Ok(embedded) = &result {
            self.mc.rec_embed_class_handle(cls, *embedded);
        }
        result
    }

    fn init_class(
        &mut self,
        field: FieldHandle,
        method: MethodHandle,
        context: ContextHandle,
        speculative: bool,
    ) -> Result<CorInfoInitClassResult> {
        self.count("initClass");
        let result = self.original.init_class(field, method, context, speculative);
        if let Ok(answer) = &result {
            self.mc
                .rec_init_class(field, method, context, speculative, *answer);
        }
        result
    }

    fn find_sig(
        &mut self,
        module: ModuleHandle,
        sig_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        self.count("findSig");
        let result = self.original.find_sig(module, sig_token, context);
        if let Ok(sig) = &result {
            self.mc.rec_find_sig(module, sig_token, context, sig);
        }
        result
    }

    fn find_call_site_sig(
        &mut self,
        module: ModuleHandle,
        method_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        self.count("findCallSiteSig");
        let result = self.original.find_call_site_sig(module, method_token, context);
        if let Ok(sig) = &result {
            self.mc
                .rec_find_call_site_sig(module, method_token, context, sig);
        }
        result
    }

    fn get_arg_type(
        &mut self,
        sig: &SigInfo,
        args: ArgListHandle,
    ) -> Result<(CorInfoType, ClassHandle)> {
        self.count("getArgType");
        let result = self.original.get_arg_type(sig, args);
        if let Some(exception) = captured_exception(&result) {
            let answer = result
                .as_ref()
                .copied()
                .unwrap_or((CorInfoType::Undef, ClassHandle::NULL));
            self.mc.rec_get_arg_type(sig, args, answer, exception);
        }
        result
    }

    fn get_arg_next(&mut self, args: ArgListHandle) -> Result<ArgListHandle> {
        self.count("getArgNext");
        let result = self.original.get_arg_next(args);
        if let Ok(next) = &result {
            self.mc.rec_get_arg_next(args, *next);
        }
        result
    }

    fn get_helper_ftn(&mut self, helper: u32) -> Result<u64> {
        self.count("getHelperFtn");
        let result = self.original.get_helper_ftn(helper);
        if let Ok(addr) = &result {
            self.mc.rec_get_helper_ftn(helper, *addr);
        }
        result
    }

    fn get_expected_target_architecture(&mut self) -> Result<u32> {
        self.count("getExpectedTargetArchitecture");
        let result = self.original.get_expected_target_architecture();
        if let Ok(machine) = &result {
            self.mc.rec_get_expected_target_architecture(*machine);
        }
        result
    }

    fn get_jit_flags(&mut self) -> Result<u64> {
        self.count("getJitFlags");
        let result = self.original.get_jit_flags();
        if let Ok(flags) = &result {
            self.mc.rec_get_jit_flags(*flags);
        }
        result
    }

    fn get_int_config_value(&mut self, name: &str, default_value: i32) -> Result<i32> {
        self.count("getIntConfigValue");
        let result = self.original.get_int_config_value(name, default_value);
        if let Ok(value) = &result {
            self.mc.rec_get_int_config_value(name, default_value, *value);
        }
        result
    }

    fn get_string_config_value(&mut self, name: &str) -> Result<Option<String>> {
        self.count("getStringConfigValue");
        let result = self.original.get_string_config_value(name);
        if let Ok(value) = &result {
            self.mc.rec_get_string_config_value(name, value.as_deref());
        }
        result
    }

    fn get_gs_cookie(&mut self) -> Result<GsCookie> {
        self.count("getGSCookie");
        let result = self.original.get_gs_cookie();
        if let Ok(cookie) = &result {
            self.mc.rec_get_gs_cookie(cookie);
        }
        result
    }

    fn get_reloc_type_hint(&mut self, target: u64) -> Result<u16> {
        self.count("getRelocTypeHint");
        let result = self.original.get_reloc_type_hint(target);
        if let Ok(reloc_type) = &result {
            self.mc.rec_get_reloc_type_hint(target, *reloc_type);
        }
        result
    }

    fn alloc_mem(&mut self, request: &AllocMemRequest) -> Result<AllocMemBlocks> {
        self.count("allocMem");
        let result = self.original.alloc_mem(request);
        if let Ok(blocks) = &result {
            self.mc.compile_result_mut().rec_alloc_mem(request, blocks);
        }
        result
    }

    fn record_call_site(&mut self, native_offset: u32, sig: Option<&SigInfo>, method: MethodHandle) {
        self.count("recordCallSite");
        self.original.record_call_site(native_offset, sig, method);
        self.mc
            .compile_result_mut()
            .rec_record_call_site(native_offset, sig, method);
    }

    fn record_relocation(&mut self, reloc: &Relocation) {
        self.count("recordRelocation");
        self.original.record_relocation(reloc);
        self.mc.compile_result_mut().rec_record_relocation(reloc);
    }

    fn set_eh_count(&mut self, count: u32) {
        self.count("setEHcount");
        self.original.set_eh_count(count);
        self.mc.compile_result_mut().rec_set_eh_count(count);
    }

    fn set_eh_info(&mut self, index: u32, clause: &EhClause) {
        self.count("setEHinfo");
        self.original.set_eh_info(index, clause);
        self.mc.compile_result_mut().rec_set_eh_info(index, clause);
    }

    fn alloc_gc_info(&mut self, size: u32) -> Result<u64> {
        self.count("allocGCInfo");
        let result = self.original.alloc_gc_info(size);
        if let Ok(addr) = &result {
            self.mc.compile_result_mut().rec_alloc_gc_info(size, *addr);
        }
        result
    }

    fn reserve_unwind_info(&mut self, is_funclet: bool, is_cold: bool, size: u32) {
        self.count("reserveUnwindInfo");
        self.original.reserve_unwind_info(is_funclet, is_cold, size);
        self.mc
            .compile_result_mut()
            .rec_reserve_unwind_info(is_funclet, is_cold, size);
    }

    fn alloc_unwind_info(&mut self, info: &UnwindInfo) {
        self.count("allocUnwindInfo");
        self.original.alloc_unwind_info(info);
        self.mc.compile_result_mut().rec_alloc_unwind_info(info);
    }

    fn set_boundaries(&mut self, ftn: MethodHandle, map: &[BoundaryEntry]) {
        self.count("setBoundaries");
        self.original.set_boundaries(ftn, map);
        self.mc.compile_result_mut().rec_set_boundaries(ftn, map);
    }

    fn report_inlining_decision(
        &mut self,
        inliner: MethodHandle,
        inlinee: MethodHandle,
        result: CorInfoInline,
        reason: &str,
    ) {
        self.count("reportInliningDecision");
        self.original
            .report_inlining_decision(inliner, inlinee, result, reason);
        self.mc
            .compile_result_mut()
            .rec_report_inlining_decision(inliner, inlinee, result, reason);
    }

    fn report_tail_call_decision(
        &mut self,
        caller: MethodHandle,
        callee: MethodHandle,
        tail_prefix: bool,
        result: u32,
        reason: &str,
    ) {
        self.count("reportTailCallDecision");
        self.original
            .report_tail_call_decision(caller, callee, tail_prefix, result, reason);
        self.mc
            .compile_result_mut()
            .rec_report_tail_call_decision(caller, callee, tail_prefix, result, reason);
    }

    fn set_method_attribs(&mut self, ftn: MethodHandle, attribs: u32) {
        self.count("setMethodAttribs");
        self.original.set_method_attribs(ftn, attribs);
        self.mc.compile_result_mut().rec_set_method_attribs(ftn, attribs);
    }

    fn report_fatal_error(&mut self, result: CorJitResult) {
        self.count("reportFatalError");
        self.original.report_fatal_error(result);
        self.mc.compile_result_mut().rec_report_fatal_error(result);
    }

    fn method_must_be_loaded_before_code_is_run(&mut self, ftn: MethodHandle) {
        self.count("methodMustBeLoadedBeforeCodeIsRun");
        self.original.method_must_be_loaded_before_code_is_run(ftn);
        self.mc.compile_result_mut().rec_method_must_be_loaded(ftn);
    }

    fn class_must_be_loaded_before_code_is_run(&mut self, cls: ClassHandle) {
        self.count("classMustBeLoadedBeforeCodeIsRun");
        self.original.class_must_be_loaded_before_code_is_run(cls);
        self.mc.compile_result_mut().rec_class_must_be_loaded(cls);
    }
}
