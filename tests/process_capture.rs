//! The process-wide capture entry points. Kept in its own test binary because the installed
//! JIT and the global session can only be set once per process.

use std::{fs, sync::Arc};

use superpmi::{
    corinfo::MethodInfo,
    prelude::*,
    shim::{get_jit, global_session, install_real_jit, ENV_OUTPUT_DIR},
};
use tempfile::tempdir;
use uguid::{guid, Guid};

/// Asks for the method's attributes and name, then emits an empty body.
struct QuietJit;

impl JitCompiler for QuietJit {
    fn compile_method(
        &self,
        ee: &mut dyn JitEeInterface,
        info: &MethodInfo,
        _flags: u32,
    ) -> Result<CompiledMethod> {
        let attribs = ee.get_method_attribs(info.ftn)?;
        let name = ee.get_method_name(info.ftn)?;
        Ok(CompiledMethod {
            native_size: attribs + name.len() as u32,
            ..CompiledMethod::default()
        })
    }

    fn version_identifier(&self) -> Guid {
        guid!("9d2e7c41-0a6b-4f3e-8c5d-1e2f3a4b5c6d")
    }
}

fn live_answers() -> MethodContext {
    let mut mc = MethodContext::new();
    mc.rec_get_method_attribs(MethodHandle(0x3000), 0x10);
    mc.rec_get_method_name(MethodHandle(0x3000), "Main");
    mc
}

fn method() -> MethodInfo {
    MethodInfo {
        ftn: MethodHandle(0x3000),
        scope: ModuleHandle(0x2000),
        il_code: vec![0x2A],
        ..MethodInfo::default()
    }
}

// One test so the steps run in order against the process-wide state
#[test]
fn installed_jit_captures_into_the_right_session() {
    let temp_dir = tempdir().unwrap();
    let global_dir = temp_dir.path().join("global");
    std::env::set_var(ENV_OUTPUT_DIR, &global_dir);

    assert!(matches!(get_jit(), Err(Error::InvalidArgument(_))));

    install_real_jit(Arc::new(QuietJit)).unwrap();
    assert!(matches!(
        install_real_jit(Arc::new(QuietJit)),
        Err(Error::InvalidArgument(_))
    ));

    let jit = get_jit().unwrap();
    assert_eq!(jit.version_identifier(), QuietJit.version_identifier());
    let live = live_answers();

    // A session entered by the host takes the capture
    let scoped = Arc::new(CaptureSession::new(CaptureConfig::new(
        temp_dir.path().join("scoped"),
    )));
    let compiled = {
        let _guard = scoped.enter();
        let mut ee = ReplayInterface::new(&live);
        jit.compile_method(&mut ee, &method(), 0).unwrap()
    };
    assert_eq!(compiled.native_size, 0x10 + 4);
    assert_eq!(scoped.committed(), 1);
    assert!(!global_dir.exists());

    // Without one, the environment-configured global session does
    let mut ee = ReplayInterface::new(&live);
    jit.compile_method(&mut ee, &method(), 0).unwrap();
    let global = global_session().unwrap();
    assert!(Arc::ptr_eq(&global, &global_session().unwrap()));
    assert_eq!(global.config().output_dir, global_dir);
    assert_eq!(global.committed(), 1);

    let path = global.output_path().unwrap().unwrap();
    assert_eq!(fs::read_dir(&global_dir).unwrap().count(), 1);
    let archive = Archive::open(&path).unwrap();
    let captured = archive.iter().next().unwrap().unwrap().context().unwrap();
    assert_eq!(captured.method_handle(), Some(MethodHandle(0x3000)));

    let (replayed, _) = replay(&QuietJit, &captured).unwrap();
    assert_eq!(replayed, compiled);
}
