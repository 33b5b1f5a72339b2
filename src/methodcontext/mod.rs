//! Method contexts: the recorded JIT-EE conversation of one method compilation.
//!
//! A [`MethodContext`] is a table of lightweight maps, one per JIT-EE query ([`Packet`]), plus an
//! optional [`CompileResult`] describing what the JIT produced. Contexts are filled through the
//! `rec_*` operations while capturing, serialized with [`MethodContext::to_bytes`], and answer
//! the same queries again through the `rep_*` operations when replaying.
//!
//! # Wire form
//!
//! ```text
//! "mc" | u32 payload_len | packet*
//! packet = u16 id | u32 body_len | body
//! ```
//!
//! Packets appear in strictly ascending id order and only maps that were created are written.
//! The compile result is the packet `0xFFFF` whose body is a nested packet sequence; a record
//! without it is *thin*.
//!
//! # Recording policy
//!
//! Most queries are pure functions of their key and are recorded once: a repeated call with the
//! same key is dropped, and a conflicting answer is logged and dropped. `canInline` and
//! `getClassAttribs` may legitimately change during one compilation, so every answer is kept
//! and replay hands them back in order.

mod agnostic;
mod callutils;
mod compileresult;
mod hash;
mod packets;
mod record;
mod replay;

pub use callutils::{
    get_helper_num, get_method_full_name, get_method_handle_for_native, is_native_method,
    resolve_call_target, CallTarget, CallTargetResolution, UNKNOWN_NAME,
};
pub use compileresult::{CallCounts, CompileResult, CrPacket, InliningDecision};
pub use hash::MethodContextHash;
pub use packets::{Packet, COMPILE_RESULT_PACKET};
pub use record::captured_exception;

use crate::{
    corinfo::MethodHandle,
    file::{Parser, Writer},
    methodcontext::packets::Packets,
    Error::OutOfBounds,
    Result,
};

/// Magic bytes opening every serialized method context.
pub const MC_MAGIC: [u8; 2] = *b"mc";

/// Size of the record header: magic plus payload length.
pub const MC_HEADER_SIZE: usize = 6;

/// The complete record of one method compilation.
#[derive(Debug, Clone, Default)]
pub struct MethodContext {
    packets: Packets,
    cr: Option<CompileResult>,
}

impl MethodContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses exactly one serialized context.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input,
    /// including trailing bytes after the record.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let mc = Self::read(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after method context",
                parser.remaining()
            ));
        }
        Ok(mc)
    }

    /// Parses the context at the parser's position and advances past it.
    ///
    /// The position is left unchanged if parsing fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
    pub fn read(parser: &mut Parser<'_>) -> Result<Self> {
        parser.transactional(|parser| {
            let magic = parser.read_bytes(MC_MAGIC.len())?;
            if magic != MC_MAGIC {
                return Err(malformed_error!("Bad method context magic {:02x?}", magic));
            }
            let length = parser.read_le::<u32>()? as usize;
            let payload = parser.read_bytes(length)?;
            Self::parse_payload(payload)
        })
    }

    /// Total size of the record starting at `data[0]`, without parsing its packets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad magic and [`crate::Error::OutOfBounds`] if
    /// `data` is shorter than the record claims.
    pub fn record_len(data: &[u8]) -> Result<usize> {
        let mut parser = Parser::new(data);
        let magic = parser.read_bytes(MC_MAGIC.len())?;
        if magic != MC_MAGIC {
            return Err(malformed_error!("Bad method context magic {:02x?}", magic));
        }
        let length = parser.read_le::<u32>()? as usize;
        let Some(total) = length.checked_add(MC_HEADER_SIZE) else {
            return Err(OutOfBounds);
        };
        if total > data.len() {
            return Err(OutOfBounds);
        }
        Ok(total)
    }

    fn parse_payload(payload: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(payload);
        let mut mc = MethodContext::new();
        let mut previous: Option<u16> = None;

        while parser.has_more_data() {
            let id = parser.read_le::<u16>()?;
            if previous.is_some_and(|last| last >= id) {
                return Err(malformed_error!(
                    "Packet {} out of order after {:?}",
                    id,
                    previous
                ));
            }
            previous = Some(id);

            let length = parser.read_le::<u32>()? as usize;
            let body = parser.read_bytes(length)?;

            if id == COMPILE_RESULT_PACKET {
                mc.cr = Some(CompileResult::from_body(body)?);
                continue;
            }
            let Some(packet) = Packet::from_repr(id) else {
                return Err(malformed_error!("Unknown packet id {}", id));
            };
            mc.packets.read_packet(packet, body)?;
        }

        Ok(mc)
    }

    fn write(&self, with_compile_result: bool) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(1024);
        writer.write_bytes(&MC_MAGIC);
        let payload = writer.reserve_u32();

        self.packets.write_to(&mut writer)?;
        if let (true, Some(cr)) = (with_compile_result, &self.cr) {
            writer.write_le(COMPILE_RESULT_PACKET);
            let body = writer.reserve_u32();
            cr.write_to(&mut writer)?;
            writer.patch_length_since(body)?;
        }

        writer.patch_length_since(payload)?;
        Ok(writer.into_inner())
    }

    /// Serializes the context, including its compile result.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a section exceeds the 4 GiB length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write(true)
    }

    /// Serializes the context without its compile result.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a section exceeds the 4 GiB length field.
    pub fn to_bytes_thin(&self) -> Result<Vec<u8>> {
        self.write(false)
    }

    /// The compile result, if one was captured
    #[must_use]
    pub fn compile_result(&self) -> Option<&CompileResult> {
        self.cr.as_ref()
    }

    /// The compile result, created empty if missing
    pub fn compile_result_mut(&mut self) -> &mut CompileResult {
        self.cr.get_or_insert_with(CompileResult::new)
    }

    /// Replaces the compile result
    pub fn set_compile_result(&mut self, cr: Option<CompileResult>) {
        self.cr = cr;
    }

    /// Removes and returns the compile result, making the context thin.
    pub fn strip_compile_result(&mut self) -> Option<CompileResult> {
        self.cr.take()
    }

    /// True if nothing was recorded: no query packets and no compile result
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.cr.is_none()
    }

    /// True if the context has no compile result
    #[must_use]
    pub fn is_thin(&self) -> bool {
        self.cr.is_none()
    }

    /// Identity fingerprint over the full serialized form.
    ///
    /// # Errors
    /// Fails only if the context cannot be serialized.
    pub fn hash(&self) -> Result<MethodContextHash> {
        Ok(MethodContextHash::of_bytes(&self.to_bytes()?))
    }

    /// Structural comparison of every map, record and buffer.
    #[must_use]
    pub fn equal(&self, other: &MethodContext) -> bool {
        self.packets == other.packets && self.cr == other.cr
    }

    /// Record counts of the present packets, in id order
    #[must_use]
    pub fn packet_counts(&self) -> Vec<(Packet, usize)> {
        self.packets.counts()
    }

    /// Handle of the method this context was captured for
    #[must_use]
    pub fn method_handle(&self) -> Option<MethodHandle> {
        let (_, value) = self.packets.compile_method.as_ref()?.get_by_index(0)?;
        MethodHandle::uncast(value.info.ftn).ok()
    }

    /// IL code of the method this context was captured for.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotRecorded`] if the context has no `compileMethod` record.
    pub fn il_code(&self) -> Result<Vec<u8>> {
        let Some(map) = &self.packets.compile_method else {
            return Err(not_recorded!(Packet::CompileMethod, 0));
        };
        let Some((_, value)) = map.get_by_index(0) else {
            return Err(not_recorded!(Packet::CompileMethod, 0));
        };
        agnostic::read_buffer(map.buffers(), value.info.il_code_index)
    }

    /// Method whose recorded entry point is `addr`
    #[must_use]
    pub fn find_function_entry_point_by_address(&self, addr: u64) -> Option<MethodHandle> {
        let map = self.packets.get_function_entry_point.as_ref()?;
        map.iter()
            .find(|(_, lookup)| lookup.addr == addr)
            .and_then(|((ftn, _), _)| MethodHandle::uncast(*ftn).ok())
    }

    /// Helper whose recorded address is `addr`
    #[must_use]
    pub fn find_helper_by_address(&self, addr: u64) -> Option<u32> {
        let map = self.packets.get_helper_ftn.as_ref()?;
        map.iter()
            .find(|(_, helper_addr)| **helper_addr == addr)
            .map(|(helper, _)| *helper)
    }
}

impl PartialEq for MethodContext {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corinfo::{ClassHandle, ConstLookup, MethodInfo, ModuleHandle},
        ErrorKind,
    };

    #[test]
    fn empty_contexts() {
        let mut mc = MethodContext::new();
        assert!(mc.is_empty());
        assert!(MethodContext::from_bytes(&mc.to_bytes().unwrap()).unwrap().is_empty());

        mc.compile_result_mut();
        assert!(!mc.is_empty());
        mc.set_compile_result(None);
        mc.rec_get_method_attribs(MethodHandle(0x3000), 0);
        assert!(!mc.is_empty());
    }

    fn sample() -> MethodContext {
        let mut mc = MethodContext::new();
        mc.rec_get_method_attribs(MethodHandle(0x3000), 0x10);
        mc.rec_get_class_name(ClassHandle(0x44), Some("System.String"));
        mc.rec_get_helper_ftn(30, 0xDEAD_0000);
        mc.rec_get_function_entry_point(
            MethodHandle(0x3100),
            0,
            &ConstLookup {
                addr: 0xBEEF_0000,
                access_type: 0,
            },
        );
        mc.rec_compile_method(
            &MethodInfo {
                ftn: MethodHandle(0x3000),
                scope: ModuleHandle(0x2000),
                il_code: vec![0x00, 0x2A],
                max_stack: 8,
                ..MethodInfo::default()
            },
            0,
        );
        mc.compile_result_mut().add_call("getMethodAttribs");
        mc
    }

    #[test]
    fn roundtrip() {
        let mc = sample();
        let bytes = mc.to_bytes().unwrap();
        assert_eq!(&bytes[..2], b"mc");
        assert_eq!(MethodContext::record_len(&bytes).unwrap(), bytes.len());

        let copy = MethodContext::from_bytes(&bytes).unwrap();
        assert!(copy.equal(&mc));
        assert_eq!(copy.to_bytes().unwrap(), bytes);
        assert_eq!(copy.hash().unwrap(), mc.hash().unwrap());
    }

    #[test]
    fn thin_records() {
        let mc = sample();
        let thin = MethodContext::from_bytes(&mc.to_bytes_thin().unwrap()).unwrap();
        assert!(thin.is_thin());
        assert!(!mc.is_thin());
        assert_ne!(thin.hash().unwrap(), mc.hash().unwrap());

        let mut stripped = mc.clone();
        assert!(stripped.strip_compile_result().is_some());
        assert!(stripped.equal(&thin));

        let mut empty_cr = MethodContext::new();
        empty_cr.set_compile_result(Some(CompileResult::new()));
        let copy = MethodContext::from_bytes(&empty_cr.to_bytes().unwrap()).unwrap();
        assert!(!copy.is_thin());
    }

    #[test]
    fn identity_helpers() {
        let mc = sample();
        assert_eq!(mc.method_handle(), Some(MethodHandle(0x3000)));
        assert_eq!(mc.il_code().unwrap(), vec![0x00, 0x2A]);
        assert_eq!(
            mc.find_function_entry_point_by_address(0xBEEF_0000),
            Some(MethodHandle(0x3100))
        );
        assert_eq!(mc.find_function_entry_point_by_address(1), None);
        assert_eq!(mc.find_helper_by_address(0xDEAD_0000), Some(30));
        assert!(MethodContext::new().il_code().unwrap_err().is_not_recorded());
    }

    #[test]
    fn packet_counts() {
        let counts = sample().packet_counts();
        assert_eq!(counts[0], (Packet::GetMethodAttribs, 1));
        assert!(counts.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn rejects_damage() {
        let bytes = sample().to_bytes().unwrap();

        let err = MethodContext::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatError);

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'x';
        assert!(MethodContext::from_bytes(&bad_magic).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(MethodContext::from_bytes(&trailing).is_err());

        // Unknown packet id 0x0100.
        let mut unknown = vec![b'm', b'c', 6, 0, 0, 0];
        unknown.extend_from_slice(&[0x00, 0x01, 0, 0, 0, 0]);
        assert!(MethodContext::from_bytes(&unknown).is_err());
    }

    #[test]
    fn rejects_unordered_packets() {
        let mut first = MethodContext::new();
        first.rec_get_method_attribs(MethodHandle(1), 1);
        let first = first.to_bytes().unwrap();
        let packet = &first[MC_HEADER_SIZE..];

        let mut doubled = vec![b'm', b'c'];
        doubled.extend_from_slice(&((packet.len() * 2) as u32).to_le_bytes());
        doubled.extend_from_slice(packet);
        doubled.extend_from_slice(packet);
        assert!(MethodContext::from_bytes(&doubled).is_err());
    }

    #[test]
    fn read_restores_position() {
        let bytes = sample().to_bytes().unwrap();
        let truncated = &bytes[..10];
        let mut parser = Parser::new(truncated);
        assert!(MethodContext::read(&mut parser).is_err());
        assert_eq!(parser.pos(), 0);
    }
}
