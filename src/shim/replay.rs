//! A fake execution engine answering from a recorded method context.

use rustc_hash::FxHashMap;
use widestring::U16String;

use crate::{
    corinfo::{
        AllocMemBlocks, AllocMemRequest, ArgListHandle, BoundaryEntry, CallInfo, ClassHandle,
        CompiledMethod, ConstLookup, ContextHandle, CorInfoInitClassResult, CorInfoInline,
        CorInfoType, CorJitResult, EhClause, FieldHandle, FieldInfo, GsCookie, JitCompiler,
        JitEeInterface, MethodHandle, MethodInfo, ModuleHandle, PgoResults, Relocation,
        ResolvedToken, SigInfo, Token, UnwindInfo, VTableOffset,
    },
    methodcontext::{CompileResult, MethodContext},
    Result,
};

const SYNTHETIC_CODE_BASE: u64 = 0x1000_0000;
const SYNTHETIC_CODE_STRIDE: u64 = 0x10_0000;
const SYNTHETIC_GC_INFO_BASE: u64 = 0x7000_0000;
const SYNTHETIC_GC_INFO_STRIDE: u64 = 0x1_0000;

/// Implements [`JitEeInterface`] from a [`MethodContext`].
///
/// Queries are answered with [`MethodContext`]'s `rep_*` operations, so a query that was never
/// captured fails with [`crate::Error::NotRecorded`]. Everything the JIT reports back is
/// collected into a fresh [`CompileResult`] that can be compared against the recorded one.
pub struct ReplayInterface<'a> {
    mc: &'a MethodContext,
    cr: CompileResult,
    can_inline_seen: FxHashMap<(MethodHandle, MethodHandle), usize>,
    class_attribs_seen: FxHashMap<ClassHandle, usize>,
    alloc_mem_count: u32,
    gc_info_count: u64,
}

impl<'a> ReplayInterface<'a> {
    /// Replays from `mc`.
    #[must_use]
    pub fn new(mc: &'a MethodContext) -> Self {
        ReplayInterface {
            mc,
            cr: CompileResult::new(),
            can_inline_seen: FxHashMap::default(),
            class_attribs_seen: FxHashMap::default(),
            alloc_mem_count: 0,
            gc_info_count: 0,
        }
    }

    /// The context being replayed
    #[must_use]
    pub fn method_context(&self) -> &'a MethodContext {
        self.mc
    }

    /// What the JIT reported during replay so far
    #[must_use]
    pub fn compile_result(&self) -> &CompileResult {
        &self.cr
    }

    /// Consumes the interface, returning what the JIT reported.
    #[must_use]
    pub fn into_compile_result(self) -> CompileResult {
        self.cr
    }
}

impl JitEeInterface for ReplayInterface<'_> {
    fn get_method_attribs(&mut self, ftn: MethodHandle) -> Result<u32> {
        self.cr.add_call("getMethodAttribs");
        self.mc.rep_get_method_attribs(ftn)
    }

    fn get_method_sig(
        &mut self,
        ftn: MethodHandle,
        member_parent: ClassHandle,
    ) -> Result<SigInfo> {
        self.cr.add_call("getMethodSig");
        self.mc.rep_get_method_sig(ftn, member_parent)
    }

    fn get_method_info(&mut self, ftn: MethodHandle) -> Result<Option<MethodInfo>> {
        self.cr.add_call("getMethodInfo");
        self.mc.rep_get_method_info(ftn)
    }

    fn can_inline(&mut self, caller: MethodHandle, callee: MethodHandle) -> Result<CorInfoInline> {
        self.cr.add_call("canInline");
        let seen = self.can_inline_seen.entry((caller, callee)).or_insert(0);
        let occurrence = *seen;
        *seen += 1;
        self.mc.rep_can_inline(caller, callee, occurrence)
    }

    fn get_method_class(&mut self, ftn: MethodHandle) -> Result<ClassHandle> {
        self.cr.add_call("getMethodClass");
        self.mc.rep_get_method_class(ftn)
    }

    fn get_method_name(&mut self, ftn: MethodHandle) -> Result<String> {
        self.cr.add_call("getMethodName");
        self.mc.rep_get_method_name(ftn)
    }

    fn is_intrinsic(&mut self, ftn: MethodHandle) -> Result<bool> {
        self.cr.add_call("isIntrinsic");
        self.mc.rep_is_intrinsic(ftn)
    }

    fn get_eh_info(&mut self, ftn: MethodHandle, eh_number: u32) -> Result<EhClause> {
        self.cr.add_call("getEHinfo");
        self.mc.rep_get_eh_info(ftn, eh_number)
    }

    fn can_tail_call(
        &mut self,
        caller: MethodHandle,
        declared_callee: MethodHandle,
        exact_callee: MethodHandle,
        explicit_tail_call: bool,
    ) -> Result<bool> {
        self.cr.add_call("canTailCall");
        self.mc
            .rep_can_tail_call(caller, declared_callee, exact_callee, explicit_tail_call)
    }

    fn get_unboxed_entry(&mut self, ftn: MethodHandle) -> Result<Option<(MethodHandle, bool)>> {
        self.cr.add_call("getUnboxedEntry");
        self.mc.rep_get_unboxed_entry(ftn)
    }

    fn get_method_def_from_method(&mut self, ftn: MethodHandle) -> Result<Token> {
        self.cr.add_call("getMethodDefFromMethod");
        self.mc.rep_get_method_def_from_method(ftn)
    }

    fn get_function_entry_point(
        &mut self,
        ftn: MethodHandle,
        access_flags: u32,
    ) -> Result<ConstLookup> {
        self.cr.add_call("getFunctionEntryPoint");
        self.mc.rep_get_function_entry_point(ftn, access_flags)
    }

    fn get_pgo_instrumentation_results(
        &mut self,
        ftn: MethodHandle,
    ) -> Result<Option<PgoResults>> {
        self.cr.add_call("getPgoInstrumentationResults");
        self.mc.rep_get_pgo_instrumentation_results(ftn)
    }

    fn resolve_virtual_method(
        &mut self,
        virtual_method: MethodHandle,
        implementing_class: ClassHandle,
        owner_type: ContextHandle,
    ) -> Result<Option<MethodHandle>> {
        self.cr.add_call("resolveVirtualMethod");
        self.mc
            .rep_resolve_virtual_method(virtual_method, implementing_class, owner_type)
    }

    fn get_method_vtable_offset(&mut self, ftn: MethodHandle) -> Result<VTableOffset> {
        self.cr.add_call("getMethodVTableOffset");
        self.mc.rep_get_method_vtable_offset(ftn)
    }

    fn resolve_token(&mut self, token: &mut ResolvedToken) -> Result<()> {
        self.cr.add_call("resolveToken");
        self.mc.rep_resolve_token(token)
    }

    fn get_call_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<CallInfo> {
        self.cr.add_call("getCallInfo");
        self.mc.rep_get_call_info(token, caller, flags)
    }

    fn get_field_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<FieldInfo> {
        self.cr.add_call("getFieldInfo");
        self.mc.rep_get_field_info(token, caller, flags)
    }

    fn get_string_literal(
        &mut self,
        module: ModuleHandle,
        token: Token,
    ) -> Result<Option<U16String>> {
        self.cr.add_call("getStringLiteral");
        self.mc.rep_get_string_literal(module, token)
    }

    fn get_new_helper(&mut self, token: &ResolvedToken, caller: MethodHandle) -> Result<u32> {
        self.cr.add_call("getNewHelper");
        self.mc.rep_get_new_helper(token, caller)
    }

    fn get_class_name(&mut self, cls: ClassHandle) -> Result<Option<String>> {
        self.cr.add_call("getClassName");
        self.mc.rep_get_class_name(cls)
    }

    fn get_class_attribs(&mut self, cls: ClassHandle) -> Result<u32> {
        self.cr.add_call("getClassAttribs");
        let seen = self.class_attribs_seen.entry(cls).or_insert(0);
        let occurrence = *seen;
        *seen += 1;
        self.mc.rep_get_class_attribs(cls, occurrence)
    }

    fn get_class_size(&mut self, cls: ClassHandle) -> Result<u32> {
        self.cr.add_call("getClassSize");
        self.mc.rep_get_class_size(cls)
    }

    fn is_value_class(&mut self, cls: ClassHandle) -> Result<bool> {
        self.cr.add_call("isValueClass");
        self.mc.rep_is_value_class(cls)
    }

    fn get_type_for_primitive_value_class(&mut self, cls: ClassHandle) -> Result<CorInfoType> {
        self.cr.add_call("getTypeForPrimitiveValueClass");
        self.mc.rep_get_type_for_primitive_value_class(cls)
    }

    fn get_default_comparer_class(&mut self, cls: ClassHandle) -> Result<ClassHandle> {
        self.cr.add_call("getDefaultComparerClass");
        self.mc.rep_get_default_comparer_class(cls)
    }

    fn get_class_module(&mut self, cls: ClassHandle) -> Result<ModuleHandle> {
        self.cr.add_call("getClassModule");
        self.mc.rep_get_class_module(cls)
    }

    fn embed_class_handle(&mut self, cls: ClassHandle) -> Result<u64> {
        self.cr.add_call("embedClassHandle");
        self.mc.rep_embed_class_handle(cls)
    }

    fn init_class(
        &mut self,
        field: FieldHandle,
        method: MethodHandle,
        context: ContextHandle,
        speculative: bool,
    ) -> Result<CorInfoInitClassResult> {
        self.cr.add_call("initClass");
        self.mc.rep_init_class(field, method, context, speculative)
    }

    fn find_sig(
        &mut self,
        module: ModuleHandle,
        sig_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        self.cr.add_call("findSig");
        self.mc.rep_find_sig(module, sig_token, context)
    }

    fn find_call_site_sig(
        &mut self,
        module: ModuleHandle,
        method_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo> {
        self.cr.add_call("findCallSiteSig");
        self.mc.rep_find_call_site_sig(module, method_token, context)
    }

    fn get_arg_type(
        &mut self,
        sig: &SigInfo,
        args: ArgListHandle,
    ) -> Result<(CorInfoType, ClassHandle)> {
        self.cr.add_call("getArgType");
        self.mc.rep_get_arg_type(sig, args)
    }

    fn get_arg_next(&mut self, args: ArgListHandle) -> Result<ArgListHandle> {
        self.cr.add_call("getArgNext");
        self.mc.rep_get_arg_next(args)
    }

    fn get_helper_ftn(&mut self, helper: u32) -> Result<u64> {
        self.cr.add_call("getHelperFtn");
        self.mc.rep_get_helper_ftn(helper)
    }

    fn get_expected_target_architecture(&mut self) -> Result<u32> {
        self.cr.add_call("getExpectedTargetArchitecture");
        self.mc.rep_get_expected_target_architecture()
    }

    fn get_jit_flags(&mut self) -> Result<u64> {
        self.cr.add_call("getJitFlags");
        self.mc.rep_get_jit_flags()
    }

    fn get_int_config_value(&mut self, name: &str, default_value: i32) -> Result<i32> {
        self.cr.add_call("getIntConfigValue");
        self.mc.rep_get_int_config_value(name, default_value)
    }

    fn get_string_config_value(&mut self, name: &str) -> Result<Option<String>> {
        self.cr.add_call("getStringConfigValue");
        self.mc.rep_get_string_config_value(name)
    }

    fn get_gs_cookie(&mut self) -> Result<GsCookie> {
        self.cr.add_call("getGSCookie");
        self.mc.rep_get_gs_cookie()
    }

    fn get_reloc_type_hint(&mut self, target: u64) -> Result<u16> {
        self.cr.add_call("getRelocTypeHint");
        self.mc.rep_get_reloc_type_hint(target)
    }

    fn alloc_mem(&mut self, request: &AllocMemRequest) -> Result<AllocMemBlocks> {
        self.cr.add_call("allocMem");
        let n = self.alloc_mem_count;
        self.alloc_mem_count += 1;

        // Hand out the captured addresses so relocations line up with the recording
        let blocks = self
            .mc
            .compile_result()
            .and_then(|recorded| recorded.alloc_mem_blocks(n))
            .unwrap_or_else(|| {
                let base = SYNTHETIC_CODE_BASE + u64::from(n) * SYNTHETIC_CODE_STRIDE;
                let cold = base + u64::from(request.hot_size);
                AllocMemBlocks {
                    hot: base,
                    cold: if request.cold_size == 0 { 0 } else { cold },
                    ro_data: if request.ro_data_size == 0 {
                        0
                    } else {
                        cold + u64::from(request.cold_size)
                    },
                }
            });
        self.cr.rec_alloc_mem(request, &blocks);
        Ok(blocks)
    }

    fn record_call_site(&mut self, native_offset: u32, sig: Option<&SigInfo>, method: MethodHandle) {
        self.cr.add_call("recordCallSite");
        self.cr.rec_record_call_site(native_offset, sig, method);
    }

    fn record_relocation(&mut self, reloc: &Relocation) {
        self.cr.add_call("recordRelocation");
        self.cr.rec_record_relocation(reloc);
    }

    fn set_eh_count(&mut self, count: u32) {
        self.cr.add_call("setEHcount");
        self.cr.rec_set_eh_count(count);
    }

    fn set_eh_info(&mut self, index: u32, clause: &EhClause) {
        self.cr.add_call("setEHinfo");
        self.cr.rec_set_eh_info(index, clause);
    }

    fn alloc_gc_info(&mut self, size: u32) -> Result<u64> {
        self.cr.add_call("allocGCInfo");
        let addr = SYNTHETIC_GC_INFO_BASE + self.gc_info_count * SYNTHETIC_GC_INFO_STRIDE;
        self.gc_info_count += 1;
        self.cr.rec_alloc_gc_info(size, addr);
        Ok(addr)
    }

    fn reserve_unwind_info(&mut self, is_funclet: bool, is_cold: bool, size: u32) {
        self.cr.add_call("reserveUnwindInfo");
        self.cr.rec_reserve_unwind_info(is_funclet, is_cold, size);
    }

    fn alloc_unwind_info(&mut self, info: &UnwindInfo) {
        self.cr.add_call("allocUnwindInfo");
        self.cr.rec_alloc_unwind_info(info);
    }

    fn set_boundaries(&mut self, ftn: MethodHandle, map: &[BoundaryEntry]) {
        self.cr.add_call("setBoundaries");
        self.cr.rec_set_boundaries(ftn, map);
    }

    fn report_inlining_decision(
        &mut self,
        inliner: MethodHandle,
        inlinee: MethodHandle,
        result: CorInfoInline,
        reason: &str,
    ) {
        self.cr.add_call("reportInliningDecision");
        self.cr
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
        self.cr.add_call("reportTailCallDecision");
        self.cr
            .rec_report_tail_call_decision(caller, callee, tail_prefix, result, reason);
    }

    fn set_method_attribs(&mut self, ftn: MethodHandle, attribs: u32) {
        self.cr.add_call("setMethodAttribs");
        self.cr.rec_set_method_attribs(ftn, attribs);
    }

    fn report_fatal_error(&mut self, result: CorJitResult) {
        self.cr.add_call("reportFatalError");
        self.cr.rec_report_fatal_error(result);
    }

    fn method_must_be_loaded_before_code_is_run(&mut self, ftn: MethodHandle) {
        self.cr.add_call("methodMustBeLoadedBeforeCodeIsRun");
        self.cr.rec_method_must_be_loaded(ftn);
    }

    fn class_must_be_loaded_before_code_is_run(&mut self, cls: ClassHandle) {
        self.cr.add_call("classMustBeLoadedBeforeCodeIsRun");
        self.cr.rec_class_must_be_loaded(cls);
    }
}

/// Compiles the method `mc` was captured for with `jit`, answering every EE query from `mc`.
///
/// Returns the JIT's output together with everything it reported during the replay.
///
/// # Errors
/// [`crate::Error::NotRecorded`] if `mc` has no `compileMethod` record or the JIT asks an
/// uncaptured question; otherwise whatever the JIT returns.
pub fn replay(jit: &dyn JitCompiler, mc: &MethodContext) -> Result<(CompiledMethod, CompileResult)> {
    let (info, flags) = mc.rep_compile_method()?;
    let mut ee = ReplayInterface::new(mc);

    let compiled = jit.compile_method(&mut ee, &info, flags)?;
    let mut cr = ee.into_compile_result();
    cr.rec_compile_outcome(&compiled);

    log::debug!(
        "Replayed {:?}: {:?}, {} bytes",
        info.ftn,
        compiled.result,
        compiled.native_size
    );
    Ok((compiled, cr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corinfo::{ContextHandle, CorInfoTokenKind, CALLCONV_HASTHIS},
        methodcontext::get_method_full_name,
        Error,
    };
    use uguid::{guid, Guid};

    const MAIN: MethodHandle = MethodHandle(0x3000);

    fn named_method() -> (MethodContext, SigInfo) {
        let mut mc = MethodContext::new();
        let sig = SigInfo {
            call_conv: CALLCONV_HASTHIS,
            ret_type: CorInfoType::Void,
            num_args: 2,
            args: ArgListHandle(0x700),
            scope: ModuleHandle(0x2000),
            ..SigInfo::default()
        };
        mc.rec_get_method_class(MAIN, ClassHandle(0x50));
        mc.rec_get_class_name(ClassHandle(0x50), Some("Program"));
        mc.rec_get_method_name(MAIN, "Main");
        mc.rec_get_method_sig(MAIN, ClassHandle::NULL, &sig);
        mc.rec_get_arg_type(&sig, ArgListHandle(0x700), (CorInfoType::Int, ClassHandle::NULL), 0);
        mc.rec_get_arg_next(ArgListHandle(0x700), ArgListHandle(0x708));
        mc.rec_get_arg_type(&sig, ArgListHandle(0x708), (CorInfoType::Class, ClassHandle(0x60)), 0);
        mc.rec_get_class_name(ClassHandle(0x60), Some("String"));
        (mc, sig)
    }

    #[test]
    fn full_name_from_recording() {
        let (mc, _) = named_method();
        let bytes = mc.to_bytes().unwrap();
        let replayed = MethodContext::from_bytes(&bytes).unwrap();

        let mut ee = ReplayInterface::new(&replayed);
        assert_eq!(
            get_method_full_name(&mut ee, MAIN),
            "Program:Main(int,String):void:this"
        );

        let counts = ee.compile_result().call_counts().unwrap();
        assert_eq!(counts.get("getArgType"), Some(&2));
        assert_eq!(counts.get("getClassName"), Some(&2));
    }

    #[test]
    fn full_name_with_missing_data() {
        let mc = MethodContext::new();
        let mut ee = ReplayInterface::new(&mc);
        assert_eq!(
            get_method_full_name(&mut ee, MethodHandle(0x10)),
            "<unknown>:<unknown>():<unknown>"
        );
    }

    #[test]
    fn occurrences_follow_query_order() {
        let mut mc = MethodContext::new();
        mc.rec_can_inline(MAIN, MethodHandle(0x3100), CorInfoInline::Pass, 0);
        mc.rec_can_inline(MAIN, MethodHandle(0x3100), CorInfoInline::Never, 0);
        mc.rec_get_class_attribs(ClassHandle(0x50), 1);
        mc.rec_get_class_attribs(ClassHandle(0x50), 2);

        let mut ee = ReplayInterface::new(&mc);
        let callee = MethodHandle(0x3100);
        assert_eq!(ee.can_inline(MAIN, callee).unwrap(), CorInfoInline::Pass);
        assert_eq!(ee.can_inline(MAIN, callee).unwrap(), CorInfoInline::Never);
        assert_eq!(ee.can_inline(MAIN, callee).unwrap(), CorInfoInline::Never);
        assert_eq!(ee.get_class_attribs(ClassHandle(0x50)).unwrap(), 1);
        assert_eq!(ee.get_class_attribs(ClassHandle(0x50)).unwrap(), 2);
    }

    #[test]
    fn synthetic_allocations() {
        let mc = MethodContext::new();
        let mut ee = ReplayInterface::new(&mc);
        let request = AllocMemRequest {
            hot_size: 0x40,
            cold_size: 0,
            ro_data_size: 0x10,
            flags: 0,
        };
        let first = ee.alloc_mem(&request).unwrap();
        let second = ee.alloc_mem(&request).unwrap();
        assert_eq!(first.hot, SYNTHETIC_CODE_BASE);
        assert_eq!(first.cold, 0);
        assert_eq!(first.ro_data, SYNTHETIC_CODE_BASE + 0x40);
        assert_ne!(first.hot, second.hot);
        assert_eq!(ee.compile_result().alloc_mem_blocks(1), Some(second));
    }

    struct TokenJit;

    impl JitCompiler for TokenJit {
        fn compile_method(
            &self,
            ee: &mut dyn JitEeInterface,
            info: &MethodInfo,
            _flags: u32,
        ) -> Result<CompiledMethod> {
            let mut token = ResolvedToken::new(
                ContextHandle(0x1000),
                info.scope,
                Token::new(0x0600_0001),
                CorInfoTokenKind::METHOD,
            );
            ee.resolve_token(&mut token)?;
            let blocks = ee.alloc_mem(&AllocMemRequest {
                hot_size: 4,
                ..AllocMemRequest::default()
            })?;
            ee.record_call_site(0, None, token.h_method);
            Ok(CompiledMethod {
                native_size: 4,
                hot_code: blocks.hot.to_le_bytes()[..4].to_vec(),
                ..CompiledMethod::default()
            })
        }

        fn version_identifier(&self) -> Guid {
            guid!("11111111-2222-3333-4444-555555555555")
        }
    }

    #[test]
    fn replay_drives_jit() {
        let mut mc = MethodContext::new();
        let info = MethodInfo {
            ftn: MAIN,
            scope: ModuleHandle(0x2000),
            il_code: vec![0x2A],
            ..MethodInfo::default()
        };
        mc.rec_compile_method(&info, 0);
        let mut token = ResolvedToken::new(
            ContextHandle(0x1000),
            ModuleHandle(0x2000),
            Token::new(0x0600_0001),
            CorInfoTokenKind::METHOD,
        );
        token.h_method = MethodHandle(0x3100);
        mc.rec_resolve_token(&token, 0);

        let (compiled, cr) = replay(&TokenJit, &mc).unwrap();
        assert_eq!(compiled.native_size, 4);
        assert_eq!(
            cr.find_call_site_method_handle(0),
            Some(MethodHandle(0x3100))
        );
        assert_eq!(cr.rep_compile_outcome().unwrap(), compiled);

        let empty = MethodContext::new();
        assert!(matches!(
            replay(&TokenJit, &empty),
            Err(Error::NotRecorded { .. })
        ));
    }
}
