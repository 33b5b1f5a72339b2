//! The JIT's output for one compilation.
//!
//! A [`CompileResult`] is owned by its method context and serialized as the nested packet
//! `0xFFFF`. It holds everything the JIT reported back through the EE interface (code blocks,
//! relocations, EH clauses, unwind and GC info, call sites) together with the per-API call
//! counters collected while capturing. Dropping it yields a *thin* context.

use std::collections::BTreeMap;

use crate::{
    corinfo::{
        AllocMemBlocks, AllocMemRequest, BoundaryEntry, ClassHandle, CompiledMethod,
        CorInfoInline, CorJitResult, EhClause, MethodHandle, Relocation, SigInfo, UnwindInfo,
    },
    file::{Parser, Writer},
    lwm::{DenseLightWeightMap, LightWeightMap, Packable, PacketMap, NO_BUFFER},
    methodcontext::agnostic::{
        pack_sig_into, read_buffer, store_buffer, unpack_sig, AgnosticEhClause, AgnosticSigInfo,
    },
    Result,
};

agnostic! {
    /// Result code, size and output blocks of the compilation
    CompileOutcomeValue {
        result: u32,
        native_size: u32,
        hot_code_index: u32,
        cold_code_index: u32,
        ro_data_index: u32,
        gc_info_index: u32,
    }

    /// One `allocMem` request and the blocks handed out
    AllocMemRecord {
        hot_size: u32,
        cold_size: u32,
        ro_data_size: u32,
        flags: u32,
        hot: u64,
        cold: u64,
        ro_data: u64,
    }

    /// A call site registered during code generation
    CallSiteValue {
        sig: AgnosticSigInfo,
        has_sig: bool,
        method: u64,
    }

    /// A relocation
    AgnosticRelocation {
        location: u64,
        target: u64,
        reloc_type: u16,
        addl_delta: i32,
    }

    /// Unwind data for one code range
    AgnosticUnwindInfo {
        hot_code: u64,
        cold_code: u64,
        start_offset: u32,
        end_offset: u32,
        unwind_index: u32,
        func_kind: u32,
    }

    /// IL to native map of one method, entries packed as three `u32`s
    BoundariesRecord {
        ftn: u64,
        count: u32,
        map_index: u32,
    }

    /// An inlining decision
    InliningDecisionRecord {
        inliner: u64,
        inlinee: u64,
        result: i32,
        reason_index: u32,
    }

    /// A tail call decision
    TailCallDecisionRecord {
        caller: u64,
        callee: u64,
        tail_prefix: bool,
        result: u32,
        reason_index: u32,
    }
}

/// Number of intercepted calls per JIT-EE entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts(pub BTreeMap<String, u32>);

impl Packable for CallCounts {
    fn pack(&self, writer: &mut Writer) -> Result<()> {
        let Ok(count) = u32::try_from(self.0.len()) else {
            return Err(malformed_error!("Too many call counters: {}", self.0.len()));
        };
        writer.write_le(count);
        for (name, calls) in &self.0 {
            writer.write_prefixed_bytes(name.as_bytes())?;
            writer.write_le(*calls);
        }
        Ok(())
    }

    fn unpack(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_le::<u32>()?;
        let mut counts = BTreeMap::new();
        for _ in 0..count {
            let name = match std::str::from_utf8(parser.read_prefixed_bytes()?) {
                Ok(name) => name.to_string(),
                Err(_) => return Err(malformed_error!("Call counter name is not UTF-8")),
            };
            let calls = parser.read_le::<u32>()?;
            if counts.insert(name, calls).is_some() {
                return Err(malformed_error!("Duplicate call counter"));
            }
        }
        Ok(CallCounts(counts))
    }
}

impl PacketMap for CallCounts {
    fn count(&self) -> usize {
        self.0.len()
    }
}

packet_table! {
    /// Identifies one section of a [`CompileResult`].
    enum CrPacket;

    /// The maps of a compile result.
    struct CrPackets;

    /// Result code, native size and code blocks
    CompileOutcome = 1 => compile_outcome: LightWeightMap<u32, CompileOutcomeValue>,
    /// `allocMem`
    AllocMem = 2 => alloc_mem: DenseLightWeightMap<AllocMemRecord>,
    /// `recordCallSite`: native offset -> call site
    RecordCallSite = 3 => record_call_site: LightWeightMap<u32, CallSiteValue>,
    /// `recordRelocation`
    RecordRelocation = 4 => record_relocation: DenseLightWeightMap<AgnosticRelocation>,
    /// `setEHcount`
    SetEhCount = 5 => set_eh_count: DenseLightWeightMap<u32>,
    /// `setEHinfo`: clause index -> clause
    SetEhInfo = 6 => set_eh_info: LightWeightMap<u32, AgnosticEhClause>,
    /// `allocGCInfo`: (size, address)
    AllocGcInfo = 7 => alloc_gc_info: DenseLightWeightMap<(u32, u64)>,
    /// `reserveUnwindInfo`: (funclet, cold, size)
    ReserveUnwindInfo = 8 => reserve_unwind_info: DenseLightWeightMap<(bool, bool, u32)>,
    /// `allocUnwindInfo`
    AllocUnwindInfo = 9 => alloc_unwind_info: DenseLightWeightMap<AgnosticUnwindInfo>,
    /// `setBoundaries`
    SetBoundaries = 10 => set_boundaries: DenseLightWeightMap<BoundariesRecord>,
    /// `reportInliningDecision`
    ReportInliningDecision = 11 => report_inlining_decision: DenseLightWeightMap<InliningDecisionRecord>,
    /// `reportTailCallDecision`
    ReportTailCallDecision = 12 => report_tail_call_decision: DenseLightWeightMap<TailCallDecisionRecord>,
    /// `setMethodAttribs`
    SetMethodAttribs = 13 => set_method_attribs: LightWeightMap<u64, u32>,
    /// `reportFatalError`
    ReportFatalError = 14 => report_fatal_error: DenseLightWeightMap<u32>,
    /// `methodMustBeLoadedBeforeCodeIsRun`
    MethodMustBeLoaded = 15 => method_must_be_loaded: DenseLightWeightMap<u64>,
    /// Per-API call counters
    CallCounts = 16 => call_counts: CallCounts,
    /// Instantiation handles of call-site signatures
    SigInstHandles = 17 => sig_inst_handles: DenseLightWeightMap<u64>,
    /// `classMustBeLoadedBeforeCodeIsRun`
    ClassMustBeLoaded = 18 => class_must_be_loaded: DenseLightWeightMap<u64>,
}

/// An inlining decision reported by the JIT
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct InliningDecision {
    pub inliner: MethodHandle,
    pub inlinee: MethodHandle,
    pub result: CorInfoInline,
    pub reason: String,
}

fn dense_store<V>(map: &mut DenseLightWeightMap<V>, bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return NO_BUFFER;
    }
    match map.contains(bytes) {
        Some(index) => index,
        None => map.add_buffer(bytes),
    }
}

fn reason_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

/// What the JIT produced for one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileResult {
    packets: CrPackets,
}

impl CompileResult {
    /// Create an empty compile result
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Record counts per present section
    #[must_use]
    pub fn packet_counts(&self) -> Vec<(CrPacket, usize)> {
        self.packets.counts()
    }

    pub(crate) fn write_to(&self, writer: &mut Writer) -> Result<()> {
        self.packets.write_to(writer)
    }

    /// Parses the body of the compile-result packet.
    pub(crate) fn from_body(body: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(body);
        let mut packets = CrPackets::default();
        let mut previous: Option<u16> = None;

        while parser.has_more_data() {
            let id = parser.read_le::<u16>()?;
            let Some(packet) = CrPacket::from_repr(id) else {
                return Err(malformed_error!("Unknown compile result packet {}", id));
            };
            if previous.is_some_and(|last| last >= id) {
                return Err(malformed_error!(
                    "Compile result packet {} out of order after {:?}",
                    id,
                    previous
                ));
            }
            previous = Some(id);

            let length = parser.read_le::<u32>()? as usize;
            let packet_body = parser.read_bytes(length)?;
            packets.read_packet(packet, packet_body)?;
        }

        Ok(CompileResult { packets })
    }

    // Call counters

    /// Counts one intercepted call to `name`.
    pub fn add_call(&mut self, name: &str) {
        let counts = self
            .packets
            .call_counts
            .get_or_insert_with(CallCounts::default);
        *counts.0.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Intercepted call counts by entry point name
    #[must_use]
    pub fn call_counts(&self) -> Option<&BTreeMap<String, u32>> {
        self.packets.call_counts.as_ref().map(|counts| &counts.0)
    }

    // Compile outcome

    /// Records the result code and code blocks of the compilation.
    pub fn rec_compile_outcome(&mut self, compiled: &CompiledMethod) {
        let map = self
            .packets
            .compile_outcome
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&0) {
            log::warn!("Compile outcome recorded twice, keeping the first");
            return;
        }

        let value = CompileOutcomeValue {
            result: compiled.result as u32,
            native_size: compiled.native_size,
            hot_code_index: store_buffer(map, &compiled.hot_code),
            cold_code_index: store_buffer(map, &compiled.cold_code),
            ro_data_index: store_buffer(map, &compiled.ro_data),
            gc_info_index: store_buffer(map, &compiled.gc_info),
        };
        map.add(0, value);
    }

    /// The recorded outcome.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotRecorded`] if no outcome was captured.
    pub fn rep_compile_outcome(&self) -> Result<CompiledMethod> {
        let Some((map, value)) = self
            .packets
            .compile_outcome
            .as_ref()
            .and_then(|map| map.get(&0).map(|value| (map, value)))
        else {
            return Err(not_recorded!(CrPacket::CompileOutcome, 0));
        };

        Ok(CompiledMethod {
            result: CorJitResult::from_u32(value.result)?,
            native_size: value.native_size,
            hot_code: read_buffer(map.buffers(), value.hot_code_index)?,
            cold_code: read_buffer(map.buffers(), value.cold_code_index)?,
            ro_data: read_buffer(map.buffers(), value.ro_data_index)?,
            gc_info: read_buffer(map.buffers(), value.gc_info_index)?,
        })
    }

    // Code memory

    /// Records a code allocation.
    pub fn rec_alloc_mem(&mut self, request: &AllocMemRequest, blocks: &AllocMemBlocks) {
        self.packets
            .alloc_mem
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(AllocMemRecord {
                hot_size: request.hot_size,
                cold_size: request.cold_size,
                ro_data_size: request.ro_data_size,
                flags: request.flags,
                hot: blocks.hot,
                cold: blocks.cold,
                ro_data: blocks.ro_data,
            });
    }

    /// Blocks handed out by the `n`-th recorded allocation
    #[must_use]
    pub fn alloc_mem_blocks(&self, n: u32) -> Option<AllocMemBlocks> {
        let record = self.packets.alloc_mem.as_ref()?.get(n).ok()?;
        Some(AllocMemBlocks {
            hot: record.hot,
            cold: record.cold,
            ro_data: record.ro_data,
        })
    }

    // Call sites

    /// Records the call emitted at `native_offset`; the first registration of an offset wins.
    pub fn rec_record_call_site(
        &mut self,
        native_offset: u32,
        sig: Option<&SigInfo>,
        method: MethodHandle,
    ) {
        let map = self
            .packets
            .record_call_site
            .get_or_insert_with(LightWeightMap::new);
        if map.contains_key(&native_offset) {
            log::debug!("Call site at 0x{:x} already recorded", native_offset);
            return;
        }

        let value = match sig {
            Some(sig) => {
                let sig_index = store_buffer(map, &sig.sig);
                CallSiteValue {
                    sig: pack_sig_into(sig, sig_index, &mut self.packets.sig_inst_handles),
                    has_sig: true,
                    method: method.cast(),
                }
            }
            None => CallSiteValue {
                method: method.cast(),
                ..CallSiteValue::default()
            },
        };
        map.add(native_offset, value);
    }

    /// Signature of the call recorded at `native_offset`, if one was registered with a signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the recorded signature cannot be decoded.
    pub fn find_call_site_sig(&self, native_offset: u32) -> Result<Option<SigInfo>> {
        let Some(map) = &self.packets.record_call_site else {
            return Ok(None);
        };
        match map.get(&native_offset) {
            Some(value) if value.has_sig => Ok(Some(unpack_sig(
                &value.sig,
                map.buffers(),
                self.packets.sig_inst_handles.as_ref(),
            )?)),
            _ => Ok(None),
        }
    }

    /// Target of the call recorded at `native_offset`, unless it was registered without one.
    #[must_use]
    pub fn find_call_site_method_handle(&self, native_offset: u32) -> Option<MethodHandle> {
        let value = self.packets.record_call_site.as_ref()?.get(&native_offset)?;
        if value.method == 0 {
            return None;
        }
        MethodHandle::uncast(value.method).ok()
    }

    // Relocations

    /// Records a relocation.
    pub fn rec_record_relocation(&mut self, reloc: &Relocation) {
        self.packets
            .record_relocation
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(AgnosticRelocation {
                location: reloc.location,
                target: reloc.target,
                reloc_type: reloc.reloc_type,
                addl_delta: reloc.addl_delta,
            });
    }

    /// Recorded relocations in report order
    #[must_use]
    pub fn relocations(&self) -> Vec<Relocation> {
        self.packets
            .record_relocation
            .iter()
            .flat_map(DenseLightWeightMap::iter)
            .map(|reloc| Relocation {
                location: reloc.location,
                target: reloc.target,
                reloc_type: reloc.reloc_type,
                addl_delta: reloc.addl_delta,
            })
            .collect()
    }

    // Exception handling

    /// Records the announced EH clause count.
    pub fn rec_set_eh_count(&mut self, count: u32) {
        self.packets
            .set_eh_count
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(count);
    }

    /// Records one EH clause.
    pub fn rec_set_eh_info(&mut self, index: u32, clause: &EhClause) {
        self.packets
            .set_eh_info
            .get_or_insert_with(LightWeightMap::new)
            .add(
                index,
                AgnosticEhClause {
                    flags: clause.flags,
                    try_offset: clause.try_offset,
                    try_length: clause.try_length,
                    handler_offset: clause.handler_offset,
                    handler_length: clause.handler_length,
                    class_token_or_offset: clause.class_token_or_offset,
                },
            );
    }

    /// Recorded EH clauses with their indices
    #[must_use]
    pub fn eh_clauses(&self) -> Vec<(u32, EhClause)> {
        let Some(map) = &self.packets.set_eh_info else {
            return Vec::new();
        };
        map.iter()
            .map(|(index, clause)| {
                (
                    *index,
                    EhClause {
                        flags: clause.flags,
                        try_offset: clause.try_offset,
                        try_length: clause.try_length,
                        handler_offset: clause.handler_offset,
                        handler_length: clause.handler_length,
                        class_token_or_offset: clause.class_token_or_offset,
                    },
                )
            })
            .collect()
    }

    // GC and unwind info

    /// Records a GC info allocation.
    pub fn rec_alloc_gc_info(&mut self, size: u32, addr: u64) {
        self.packets
            .alloc_gc_info
            .get_or_insert_with(DenseLightWeightMap::new)
            .append((size, addr));
    }

    /// Records an unwind info reservation.
    pub fn rec_reserve_unwind_info(&mut self, is_funclet: bool, is_cold: bool, size: u32) {
        self.packets
            .reserve_unwind_info
            .get_or_insert_with(DenseLightWeightMap::new)
            .append((is_funclet, is_cold, size));
    }

    /// Records unwind data.
    pub fn rec_alloc_unwind_info(&mut self, info: &UnwindInfo) {
        let map = self
            .packets
            .alloc_unwind_info
            .get_or_insert_with(DenseLightWeightMap::new);
        let unwind_index = dense_store(map, &info.unwind);
        map.append(AgnosticUnwindInfo {
            hot_code: info.hot_code,
            cold_code: info.cold_code,
            start_offset: info.start_offset,
            end_offset: info.end_offset,
            unwind_index,
            func_kind: info.func_kind,
        });
    }

    /// Recorded unwind data in report order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a dangling buffer reference.
    pub fn unwind_infos(&self) -> Result<Vec<UnwindInfo>> {
        let Some(map) = &self.packets.alloc_unwind_info else {
            return Ok(Vec::new());
        };
        map.iter()
            .map(|info| {
                Ok(UnwindInfo {
                    hot_code: info.hot_code,
                    cold_code: info.cold_code,
                    start_offset: info.start_offset,
                    end_offset: info.end_offset,
                    unwind: read_buffer(map.buffers(), info.unwind_index)?,
                    func_kind: info.func_kind,
                })
            })
            .collect()
    }

    // Debug info

    /// Records the IL to native map of `ftn`.
    pub fn rec_set_boundaries(&mut self, ftn: MethodHandle, entries: &[BoundaryEntry]) {
        let Ok(count) = u32::try_from(entries.len()) else {
            log::warn!("Too many boundary entries for {}, skipping", ftn);
            return;
        };
        let mut writer = Writer::with_capacity(entries.len() * 12);
        for entry in entries {
            writer.write_le(entry.native_offset);
            writer.write_le(entry.il_offset);
            writer.write_le(entry.source);
        }

        let map = self
            .packets
            .set_boundaries
            .get_or_insert_with(DenseLightWeightMap::new);
        let map_index = dense_store(map, writer.as_slice());
        map.append(BoundariesRecord {
            ftn: ftn.cast(),
            count,
            map_index,
        });
    }

    /// Recorded IL to native maps.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a map does not hold `count` entries.
    pub fn boundaries(&self) -> Result<Vec<(MethodHandle, Vec<BoundaryEntry>)>> {
        let Some(map) = &self.packets.set_boundaries else {
            return Ok(Vec::new());
        };

        let mut result = Vec::with_capacity(map.count());
        for record in map.iter() {
            let bytes = read_buffer(map.buffers(), record.map_index)?;
            let mut parser = Parser::new(&bytes);
            let mut entries = Vec::with_capacity(record.count as usize);
            for _ in 0..record.count {
                entries.push(BoundaryEntry {
                    native_offset: parser.read_le::<u32>()?,
                    il_offset: parser.read_le::<u32>()?,
                    source: parser.read_le::<u32>()?,
                });
            }
            if parser.has_more_data() {
                return Err(malformed_error!("Boundary map longer than {} entries", record.count));
            }
            result.push((MethodHandle::uncast(record.ftn)?, entries));
        }
        Ok(result)
    }

    // Decisions

    /// Records an inlining decision.
    pub fn rec_report_inlining_decision(
        &mut self,
        inliner: MethodHandle,
        inlinee: MethodHandle,
        result: CorInfoInline,
        reason: &str,
    ) {
        let map = self
            .packets
            .report_inlining_decision
            .get_or_insert_with(DenseLightWeightMap::new);
        let reason_index = dense_store(map, reason.as_bytes());
        map.append(InliningDecisionRecord {
            inliner: inliner.cast(),
            inlinee: inlinee.cast(),
            result: result as i32,
            reason_index,
        });
    }

    /// Recorded inlining decisions.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for undecodable records.
    pub fn inlining_decisions(&self) -> Result<Vec<InliningDecision>> {
        let Some(map) = &self.packets.report_inlining_decision else {
            return Ok(Vec::new());
        };
        map.iter()
            .map(|record| {
                Ok(InliningDecision {
                    inliner: MethodHandle::uncast(record.inliner)?,
                    inlinee: MethodHandle::uncast(record.inlinee)?,
                    result: CorInfoInline::from_i32(record.result)?,
                    reason: reason_string(read_buffer(map.buffers(), record.reason_index)?),
                })
            })
            .collect()
    }

    /// Records a tail call decision.
    pub fn rec_report_tail_call_decision(
        &mut self,
        caller: MethodHandle,
        callee: MethodHandle,
        tail_prefix: bool,
        result: u32,
        reason: &str,
    ) {
        let map = self
            .packets
            .report_tail_call_decision
            .get_or_insert_with(DenseLightWeightMap::new);
        let reason_index = dense_store(map, reason.as_bytes());
        map.append(TailCallDecisionRecord {
            caller: caller.cast(),
            callee: callee.cast(),
            tail_prefix,
            result,
            reason_index,
        });
    }

    // Miscellaneous reports

    /// Records a method attribute update.
    pub fn rec_set_method_attribs(&mut self, ftn: MethodHandle, attribs: u32) {
        self.packets
            .set_method_attribs
            .get_or_insert_with(LightWeightMap::new)
            .add(ftn.cast(), attribs);
    }

    /// Records a fatal error report.
    pub fn rec_report_fatal_error(&mut self, result: CorJitResult) {
        self.packets
            .report_fatal_error
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(result as u32);
    }

    /// Fatal errors reported by the JIT.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown result codes.
    pub fn fatal_errors(&self) -> Result<Vec<CorJitResult>> {
        self.packets
            .report_fatal_error
            .iter()
            .flat_map(DenseLightWeightMap::iter)
            .map(|code| CorJitResult::from_u32(*code))
            .collect()
    }

    /// Records a method that must be loaded before the code runs.
    pub fn rec_method_must_be_loaded(&mut self, ftn: MethodHandle) {
        self.packets
            .method_must_be_loaded
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(ftn.cast());
    }

    /// Methods the JIT required to be loaded, in report order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for handles wider than the native pointer.
    pub fn methods_must_be_loaded(&self) -> Result<Vec<MethodHandle>> {
        self.packets
            .method_must_be_loaded
            .iter()
            .flat_map(DenseLightWeightMap::iter)
            .map(|ftn| MethodHandle::uncast(*ftn))
            .collect()
    }

    /// Records a class that must be loaded before the code runs.
    pub fn rec_class_must_be_loaded(&mut self, cls: ClassHandle) {
        self.packets
            .class_must_be_loaded
            .get_or_insert_with(DenseLightWeightMap::new)
            .append(cls.cast());
    }

    /// Classes the JIT required to be loaded, in report order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for handles wider than the native pointer.
    pub fn classes_must_be_loaded(&self) -> Result<Vec<ClassHandle>> {
        self.packets
            .class_must_be_loaded
            .iter()
            .flat_map(DenseLightWeightMap::iter)
            .map(|cls| ClassHandle::uncast(*cls))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corinfo::{CorInfoType, ModuleHandle};

    fn roundtrip(cr: &CompileResult) -> CompileResult {
        let mut writer = Writer::new();
        cr.write_to(&mut writer).unwrap();
        CompileResult::from_body(writer.as_slice()).unwrap()
    }

    #[test]
    fn outcome_roundtrip() {
        let compiled = CompiledMethod {
            result: CorJitResult::Ok,
            native_size: 4,
            hot_code: vec![0x55, 0x48, 0x8B, 0xEC],
            cold_code: Vec::new(),
            ro_data: vec![1, 2],
            gc_info: vec![9],
        };

        let mut cr = CompileResult::new();
        assert!(cr.rep_compile_outcome().unwrap_err().is_not_recorded());
        cr.rec_compile_outcome(&compiled);
        cr.rec_compile_outcome(&CompiledMethod::failed(CorJitResult::BadCode));

        let copy = roundtrip(&cr);
        assert_eq!(copy, cr);
        assert_eq!(copy.rep_compile_outcome().unwrap(), compiled);
    }

    #[test]
    fn call_sites() {
        let sig = SigInfo {
            ret_type: CorInfoType::Void,
            class_inst: vec![ClassHandle(0x44)],
            sig: vec![0, 0, 1],
            scope: ModuleHandle(0x2000),
            ..SigInfo::default()
        };

        let mut cr = CompileResult::new();
        cr.rec_record_call_site(0x10, Some(&sig), MethodHandle(0x3000));
        cr.rec_record_call_site(0x20, None, MethodHandle(0x3100));
        cr.rec_record_call_site(0x10, None, MethodHandle(0x9999));

        let copy = roundtrip(&cr);
        assert_eq!(copy.find_call_site_sig(0x10).unwrap(), Some(sig));
        assert_eq!(copy.find_call_site_sig(0x20).unwrap(), None);
        assert_eq!(copy.find_call_site_sig(0x30).unwrap(), None);
        assert_eq!(
            copy.find_call_site_method_handle(0x10),
            Some(MethodHandle(0x3000))
        );
        assert_eq!(
            copy.find_call_site_method_handle(0x20),
            Some(MethodHandle(0x3100))
        );
        assert_eq!(copy.find_call_site_method_handle(0x30), None);
    }

    #[test]
    fn reports_roundtrip() {
        let mut cr = CompileResult::new();
        cr.add_call("getMethodAttribs");
        cr.add_call("getMethodAttribs");
        cr.add_call("resolveToken");
        cr.rec_record_relocation(&Relocation {
            location: 0x100,
            target: 0x2000,
            reloc_type: 0x10,
            addl_delta: -4,
        });
        cr.rec_set_eh_count(1);
        cr.rec_set_eh_info(
            0,
            &EhClause {
                try_length: 10,
                handler_offset: 10,
                handler_length: 4,
                ..EhClause::default()
            },
        );
        cr.rec_set_boundaries(
            MethodHandle(0x3000),
            &[
                BoundaryEntry {
                    native_offset: 0,
                    il_offset: 0,
                    source: 1,
                },
                BoundaryEntry {
                    native_offset: 8,
                    il_offset: 3,
                    source: 0,
                },
            ],
        );
        cr.rec_report_inlining_decision(
            MethodHandle(0x3000),
            MethodHandle(0x3100),
            CorInfoInline::Fail,
            "too many IL bytes",
        );
        cr.rec_report_fatal_error(CorJitResult::InternalError);
        cr.rec_method_must_be_loaded(MethodHandle(0x3100));
        cr.rec_class_must_be_loaded(ClassHandle(0x4400));
        cr.rec_class_must_be_loaded(ClassHandle(0x4500));
        cr.rec_alloc_unwind_info(&UnwindInfo {
            end_offset: 0x20,
            unwind: vec![1, 2, 3],
            ..UnwindInfo::default()
        });

        let copy = roundtrip(&cr);
        assert_eq!(copy, cr);

        let counts = copy.call_counts().unwrap();
        assert_eq!(counts.get("getMethodAttribs"), Some(&2));
        assert_eq!(counts.get("resolveToken"), Some(&1));
        assert_eq!(copy.relocations()[0].addl_delta, -4);
        assert_eq!(copy.eh_clauses()[0].1.handler_length, 4);
        let boundaries = copy.boundaries().unwrap();
        assert_eq!(boundaries[0].1[1].il_offset, 3);
        let decisions = copy.inlining_decisions().unwrap();
        assert_eq!(decisions[0].reason, "too many IL bytes");
        assert_eq!(decisions[0].result, CorInfoInline::Fail);
        assert_eq!(copy.fatal_errors().unwrap(), vec![CorJitResult::InternalError]);
        assert_eq!(copy.unwind_infos().unwrap()[0].unwind, vec![1, 2, 3]);
        assert_eq!(copy.methods_must_be_loaded().unwrap(), vec![MethodHandle(0x3100)]);
        assert_eq!(
            copy.classes_must_be_loaded().unwrap(),
            vec![ClassHandle(0x4400), ClassHandle(0x4500)]
        );
    }

    #[test]
    fn rejects_unordered_sections() {
        let mut writer = Writer::new();
        crate::lwm::write_packet(&mut writer, CrPacket::SetEhCount as u16, &{
            let mut map = DenseLightWeightMap::new();
            map.append(1_u32);
            map
        })
        .unwrap();
        let mut twice = writer.as_slice().to_vec();
        twice.extend_from_slice(writer.as_slice());
        assert!(CompileResult::from_body(&twice).is_err());

        assert!(CompileResult::from_body(&[0x63, 0x00, 0, 0, 0, 0]).is_err());
    }
}
