//! The two sides of the JIT-EE boundary.
//!
//! [`JitEeInterface`] is what a JIT calls while compiling: queries answered by the execution
//! engine, and reports through which the JIT hands its output back. [`JitCompiler`] is the JIT
//! itself. The recording shim sits between the two by implementing [`JitEeInterface`] on top of
//! the real one, and the replay interface implements it from a recorded method context.
//!
//! EE queries that can raise a runtime exception report it as
//! [`crate::Error::EeException`] carrying the exception code.

use uguid::Guid;
use widestring::U16String;

use crate::{
    corinfo::{
        AllocMemBlocks, AllocMemRequest, ArgListHandle, BoundaryEntry, CallInfo, ClassHandle,
        CompiledMethod, ConstLookup, ContextHandle, CorInfoInitClassResult, CorInfoInline,
        CorInfoType, CorJitResult, EhClause, FieldHandle, FieldInfo, GsCookie, MethodHandle,
        MethodInfo, ModuleHandle, PgoResults, Relocation, ResolvedToken, SigInfo, Token,
        UnwindInfo, VTableOffset,
    },
    Result,
};

/// Services the execution engine provides to a JIT during one compilation.
pub trait JitEeInterface {
    // Methods

    /// `CORINFO_FLG_*` attributes of a method
    fn get_method_attribs(&mut self, ftn: MethodHandle) -> Result<u32>;

    /// Signature of a method, optionally as seen from `member_parent`
    fn get_method_sig(&mut self, ftn: MethodHandle, member_parent: ClassHandle)
        -> Result<SigInfo>;

    /// IL and signature information; `None` if the method has no IL
    fn get_method_info(&mut self, ftn: MethodHandle) -> Result<Option<MethodInfo>>;

    /// Whether `callee` may be inlined into `caller`
    fn can_inline(&mut self, caller: MethodHandle, callee: MethodHandle) -> Result<CorInfoInline>;

    /// Owning class of a method
    fn get_method_class(&mut self, ftn: MethodHandle) -> Result<ClassHandle>;

    /// Simple name of a method
    fn get_method_name(&mut self, ftn: MethodHandle) -> Result<String>;

    /// True for methods the JIT may expand as intrinsics
    fn is_intrinsic(&mut self, ftn: MethodHandle) -> Result<bool>;

    /// The `eh_number`-th exception clause of a method
    fn get_eh_info(&mut self, ftn: MethodHandle, eh_number: u32) -> Result<EhClause>;

    /// Whether a call may be dispatched as a tail call
    fn can_tail_call(
        &mut self,
        caller: MethodHandle,
        declared_callee: MethodHandle,
        exact_callee: MethodHandle,
        explicit_tail_call: bool,
    ) -> Result<bool>;

    /// Unboxed entry point of a value-type method and whether it needs an instantiation argument
    fn get_unboxed_entry(&mut self, ftn: MethodHandle) -> Result<Option<(MethodHandle, bool)>>;

    /// Metadata token defining a method
    fn get_method_def_from_method(&mut self, ftn: MethodHandle) -> Result<Token>;

    /// Entry point to call a method through
    fn get_function_entry_point(
        &mut self,
        ftn: MethodHandle,
        access_flags: u32,
    ) -> Result<ConstLookup>;

    /// Collected profile data, if any
    fn get_pgo_instrumentation_results(&mut self, ftn: MethodHandle)
        -> Result<Option<PgoResults>>;

    /// Override of `virtual_method` in `implementing_class`; `None` if the call cannot be
    /// devirtualized
    fn resolve_virtual_method(
        &mut self,
        virtual_method: MethodHandle,
        implementing_class: ClassHandle,
        owner_type: ContextHandle,
    ) -> Result<Option<MethodHandle>>;

    /// Location of a virtual method's slot
    fn get_method_vtable_offset(&mut self, ftn: MethodHandle) -> Result<VTableOffset>;

    // Tokens

    /// Fills in the output half of `token`
    fn resolve_token(&mut self, token: &mut ResolvedToken) -> Result<()>;

    /// Call-site information for a resolved method token
    fn get_call_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<CallInfo>;

    /// Access information for a resolved field token
    fn get_field_info(
        &mut self,
        token: &ResolvedToken,
        caller: MethodHandle,
        flags: u32,
    ) -> Result<FieldInfo>;

    /// Contents of a user string; `None` if the token does not name one
    fn get_string_literal(&mut self, module: ModuleHandle, token: Token)
        -> Result<Option<U16String>>;

    /// Allocation helper for `newobj` of a resolved class token
    fn get_new_helper(&mut self, token: &ResolvedToken, caller: MethodHandle) -> Result<u32>;

    // Classes

    /// Name of a class; `None` if the EE cannot name it
    fn get_class_name(&mut self, cls: ClassHandle) -> Result<Option<String>>;

    /// `CORINFO_FLG_*` attributes of a class
    fn get_class_attribs(&mut self, cls: ClassHandle) -> Result<u32>;

    /// Instance size of a class
    fn get_class_size(&mut self, cls: ClassHandle) -> Result<u32>;

    /// True for value types
    fn is_value_class(&mut self, cls: ClassHandle) -> Result<bool>;

    /// Primitive type of a primitive value class, `Undef` otherwise
    fn get_type_for_primitive_value_class(&mut self, cls: ClassHandle) -> Result<CorInfoType>;

    /// Devirtualization target for `EqualityComparer<T>.Default`
    fn get_default_comparer_class(&mut self, cls: ClassHandle) -> Result<ClassHandle>;

    /// Module a class is defined in
    fn get_class_module(&mut self, cls: ClassHandle) -> Result<ModuleHandle>;

    /// Value to embed in code to refer to a class
    fn embed_class_handle(&mut self, cls: ClassHandle) -> Result<u64>;

    /// Whether the class constructor must run before accessing `field`, or before the prolog
    /// of `method` when `field` is null. A `speculative` query does not trigger it.
    fn init_class(
        &mut self,
        field: FieldHandle,
        method: MethodHandle,
        context: ContextHandle,
        speculative: bool,
    ) -> Result<CorInfoInitClassResult>;

    // Signatures

    /// Signature named by a standalone signature token
    fn find_sig(
        &mut self,
        module: ModuleHandle,
        sig_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo>;

    /// Signature at a call site; differs from the definition for varargs calls
    fn find_call_site_sig(
        &mut self,
        module: ModuleHandle,
        method_token: Token,
        context: ContextHandle,
    ) -> Result<SigInfo>;

    /// Type of the argument at `args`
    fn get_arg_type(
        &mut self,
        sig: &SigInfo,
        args: ArgListHandle,
    ) -> Result<(CorInfoType, ClassHandle)>;

    /// Cursor to the argument after `args`
    fn get_arg_next(&mut self, args: ArgListHandle) -> Result<ArgListHandle>;

    // Environment

    /// Address of a JIT helper
    fn get_helper_ftn(&mut self, helper: u32) -> Result<u64>;

    /// `IMAGE_FILE_MACHINE_*` of the code being generated
    fn get_expected_target_architecture(&mut self) -> Result<u32>;

    /// `CORJIT_FLAG_*` bits for this compilation
    fn get_jit_flags(&mut self) -> Result<u64>;

    /// Integer JIT configuration value
    fn get_int_config_value(&mut self, name: &str, default_value: i32) -> Result<i32>;

    /// String JIT configuration value
    fn get_string_config_value(&mut self, name: &str) -> Result<Option<String>>;

    /// GS cookie value and address
    fn get_gs_cookie(&mut self) -> Result<GsCookie>;

    /// Preferred relocation type for a target address
    fn get_reloc_type_hint(&mut self, target: u64) -> Result<u16>;

    // Reports from the JIT

    /// Allocates code memory
    fn alloc_mem(&mut self, request: &AllocMemRequest) -> Result<AllocMemBlocks>;

    /// Signature and target of the call emitted at `native_offset`
    fn record_call_site(&mut self, native_offset: u32, sig: Option<&SigInfo>, method: MethodHandle);

    /// A relocation in the generated code
    fn record_relocation(&mut self, reloc: &Relocation);

    /// Number of EH clauses about to be reported
    fn set_eh_count(&mut self, count: u32);

    /// One EH clause of the generated code
    fn set_eh_info(&mut self, index: u32, clause: &EhClause);

    /// Allocates GC info memory
    fn alloc_gc_info(&mut self, size: u32) -> Result<u64>;

    /// Announces unwind data size
    fn reserve_unwind_info(&mut self, is_funclet: bool, is_cold: bool, size: u32);

    /// Unwind data for a code range
    fn alloc_unwind_info(&mut self, info: &UnwindInfo);

    /// IL to native offset map
    fn set_boundaries(&mut self, ftn: MethodHandle, map: &[BoundaryEntry]);

    /// Outcome of an inlining attempt
    fn report_inlining_decision(
        &mut self,
        inliner: MethodHandle,
        inlinee: MethodHandle,
        result: CorInfoInline,
        reason: &str,
    );

    /// Outcome of a tail-call attempt
    fn report_tail_call_decision(
        &mut self,
        caller: MethodHandle,
        callee: MethodHandle,
        tail_prefix: bool,
        result: u32,
        reason: &str,
    );

    /// Updates method attributes
    fn set_method_attribs(&mut self, ftn: MethodHandle, attribs: u32);

    /// A fatal JIT error
    fn report_fatal_error(&mut self, result: CorJitResult);

    /// A method that must be prepared before the generated code runs
    fn method_must_be_loaded_before_code_is_run(&mut self, ftn: MethodHandle);

    /// A class that must be loaded before the generated code runs
    fn class_must_be_loaded_before_code_is_run(&mut self, cls: ClassHandle);
}

/// A JIT compiler.
pub trait JitCompiler: Send + Sync {
    /// Compiles one method, querying `ee` for everything it needs.
    ///
    /// # Errors
    /// EE exceptions that escape the JIT propagate unchanged.
    fn compile_method(
        &self,
        ee: &mut dyn JitEeInterface,
        info: &MethodInfo,
        flags: u32,
    ) -> Result<CompiledMethod>;

    /// Identifies the JIT-EE interface version this JIT was built against
    fn version_identifier(&self) -> Guid;
}
