//! The capturing JIT.

use std::sync::Arc;

use uguid::Guid;

use crate::{
    corinfo::{CompiledMethod, JitCompiler, JitEeInterface, MethodInfo},
    methodcontext::MethodContext,
    shim::{global_session, CaptureSession, Interceptor},
    Result,
};

/// Wraps a real JIT so that every compilation is recorded into a [`CaptureSession`].
///
/// The real JIT sees an [`Interceptor`] instead of the EE it was given. Its result is returned
/// unchanged; failures to write the captured context are logged and never reach the caller.
pub struct CaptureCompiler {
    real: Arc<dyn JitCompiler>,
    session: Option<Arc<CaptureSession>>,
}

impl CaptureCompiler {
    /// Captures compilations of `real` into `session`.
    #[must_use]
    pub fn new(real: Arc<dyn JitCompiler>, session: Arc<CaptureSession>) -> Self {
        CaptureCompiler {
            real,
            session: Some(session),
        }
    }

    /// Captures compilations of `real` into whichever session is current for the compiling
    /// thread, falling back to [`global_session`].
    #[must_use]
    pub fn ambient(real: Arc<dyn JitCompiler>) -> Self {
        CaptureCompiler {
            real,
            session: None,
        }
    }

    /// The session contexts are committed to, `None` if it is chosen per compilation
    #[must_use]
    pub fn session(&self) -> Option<&Arc<CaptureSession>> {
        self.session.as_ref()
    }

    fn resolve_session(&self) -> Result<Arc<CaptureSession>> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }
        match CaptureSession::current() {
            Some(session) => Ok(session),
            None => global_session(),
        }
    }
}

impl JitCompiler for CaptureCompiler {
    fn compile_method(
        &self,
        ee: &mut dyn JitEeInterface,
        info: &MethodInfo,
        flags: u32,
    ) -> Result<CompiledMethod> {
        let session = match self.resolve_session() {
            Ok(session) => session,
            Err(error) => {
                log::error!("Compiling {:?} without capture: {}", info.ftn, error);
                return self.real.compile_method(ee, info, flags);
            }
        };
        let _guard = session.enter();

        let mut mc = MethodContext::new();
        mc.rec_compile_method(info, flags);

        let result = {
            let mut interceptor = Interceptor::new(ee, &mut mc);
            self.real.compile_method(&mut interceptor, info, flags)
        };

        match &result {
            Ok(compiled) => mc.compile_result_mut().rec_compile_outcome(compiled),
            Err(error) => log::debug!("Compilation of {:?} failed: {}", info.ftn, error),
        }

        if let Err(error) = session.commit(&mc) {
            log::error!(
                "Dropping captured method context for {:?}: {}",
                info.ftn,
                error
            );
        }
        result
    }

    fn version_identifier(&self) -> Guid {
        self.real.version_identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corinfo::{
            AllocMemRequest, ClassHandle, ContextHandle, CorInfoTokenKind, MethodHandle,
            ModuleHandle, ResolvedToken, Token,
        },
        file::Parser,
        shim::{replay, CaptureConfig, ReplayInterface},
        Error,
    };
    use tempfile::tempdir;
    use uguid::guid;

    /// Resolves one token, asks for class attributes twice and emits a call.
    struct SmallJit;

    impl JitCompiler for SmallJit {
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
            let first = ee.get_class_attribs(ClassHandle(0x50))?;
            let second = ee.get_class_attribs(ClassHandle(0x50))?;
            let blocks = ee.alloc_mem(&AllocMemRequest {
                hot_size: 8,
                ..AllocMemRequest::default()
            })?;
            ee.record_call_site(4, None, token.h_method);

            let mut code = blocks.hot.to_le_bytes().to_vec();
            code[0] ^= (first ^ second) as u8;
            Ok(CompiledMethod {
                native_size: 8,
                hot_code: code,
                ..CompiledMethod::default()
            })
        }

        fn version_identifier(&self) -> Guid {
            guid!("0b4c3c9f-2d1e-4b8a-9a6f-6c1d2e3f4a5b")
        }
    }

    fn source_context() -> (MethodContext, MethodInfo) {
        let info = MethodInfo {
            ftn: MethodHandle(0x3000),
            scope: ModuleHandle(0x2000),
            il_code: vec![0x28, 0x01, 0x00, 0x00, 0x06, 0x2A],
            ..MethodInfo::default()
        };
        let mut mc = MethodContext::new();
        mc.rec_compile_method(&info, 0);
        let mut token = ResolvedToken::new(
            ContextHandle(0x1000),
            ModuleHandle(0x2000),
            Token::new(0x0600_0001),
            CorInfoTokenKind::METHOD,
        );
        token.h_method = MethodHandle(0x3100);
        mc.rec_resolve_token(&token, 0);
        mc.rec_get_class_attribs(ClassHandle(0x50), 0x10);
        mc.rec_get_class_attribs(ClassHandle(0x50), 0x30);
        (mc, info)
    }

    #[test]
    fn capture_then_replay() {
        let temp_dir = tempdir().unwrap();
        let session = Arc::new(CaptureSession::new(CaptureConfig::new(temp_dir.path())));
        let capture = CaptureCompiler::new(Arc::new(SmallJit), Arc::clone(&session));
        assert_eq!(capture.version_identifier(), SmallJit.version_identifier());

        // The replay interface stands in for a live EE
        let (source, info) = source_context();
        let mut live = ReplayInterface::new(&source);
        let compiled = capture.compile_method(&mut live, &info, 0).unwrap();
        assert_eq!(session.committed(), 1);

        let data = std::fs::read(session.output_path().unwrap().unwrap()).unwrap();
        let captured = MethodContext::read(&mut Parser::new(&data)).unwrap();
        let counts = captured.compile_result().unwrap().call_counts().unwrap();
        assert_eq!(counts.get("getClassAttribs"), Some(&2));
        assert_eq!(counts.get("resolveToken"), Some(&1));
        assert_eq!(
            captured.compile_result().unwrap().rep_compile_outcome().unwrap(),
            compiled
        );

        let (replayed, cr) = replay(&SmallJit, &captured).unwrap();
        assert_eq!(replayed, compiled);
        assert_eq!(cr.find_call_site_method_handle(4), Some(MethodHandle(0x3100)));
    }

    #[test]
    fn failed_compilations_are_captured() {
        let temp_dir = tempdir().unwrap();
        let session = Arc::new(CaptureSession::new(CaptureConfig::new(temp_dir.path())));
        let capture = CaptureCompiler::new(Arc::new(SmallJit), Arc::clone(&session));

        let info = MethodInfo {
            ftn: MethodHandle(0x3000),
            scope: ModuleHandle(0x2000),
            ..MethodInfo::default()
        };
        let empty = MethodContext::new();
        let mut live = ReplayInterface::new(&empty);
        let err = capture.compile_method(&mut live, &info, 0).unwrap_err();
        assert!(matches!(err, Error::NotRecorded { .. }));
        assert_eq!(session.committed(), 1);

        let data = std::fs::read(session.output_path().unwrap().unwrap()).unwrap();
        let captured = MethodContext::from_bytes(&data).unwrap();
        assert_eq!(captured.method_handle(), Some(MethodHandle(0x3000)));
        assert!(captured
            .compile_result()
            .unwrap()
            .rep_compile_outcome()
            .is_err());
    }

    #[test]
    fn ambient_capture_follows_the_entered_session() {
        let temp_dir = tempdir().unwrap();
        let first = Arc::new(CaptureSession::new(CaptureConfig::new(temp_dir.path().join("a"))));
        let second = Arc::new(CaptureSession::new(CaptureConfig::new(temp_dir.path().join("b"))));
        let capture = CaptureCompiler::ambient(Arc::new(SmallJit));
        assert!(capture.session().is_none());

        let (source, info) = source_context();
        {
            let _guard = first.enter();
            let mut live = ReplayInterface::new(&source);
            capture.compile_method(&mut live, &info, 0).unwrap();
        }
        {
            let _guard = second.enter();
            for _ in 0..2 {
                let mut live = ReplayInterface::new(&source);
                capture.compile_method(&mut live, &info, 0).unwrap();
            }
            assert!(Arc::ptr_eq(&CaptureSession::current().unwrap(), &second));
        }

        assert_eq!(first.committed(), 1);
        assert_eq!(second.committed(), 2);
        assert!(first
            .output_path()
            .unwrap()
            .unwrap()
            .starts_with(temp_dir.path().join("a")));
    }
}
