use crate::{HandleRegistry, NativeHandle, check};
use parking_lot::Mutex;
use sluice_core::{
    Context, Result,
    native::{Attribute, Handle, HandleKind, NativeApi},
};
use std::sync::Arc;

static GLOBAL: Mutex<Option<Arc<Environment>>> = Mutex::new(None);

/// The ODBC environment, parent of every connection.
#[derive(Debug)]
pub struct Environment {
    handle: Arc<NativeHandle>,
}

impl Environment {
    /// Allocate an environment declaring ODBC 3.80 behavior.
    pub fn new(api: Arc<dyn NativeApi>) -> Result<Arc<Environment>> {
        let handle = HandleRegistry::allocate(&api, HandleKind::Environment, Handle::NULL)
            .context("While allocating the ODBC environment")?;
        let raw = handle.raw();
        let ret = api.set_env_attr(raw, Attribute::ODBC_VERSION, Attribute::OV_ODBC3_80);
        check(
            api.as_ref(),
            ret,
            HandleKind::Environment,
            raw,
            "SQLSetEnvAttr",
        )
        .context("While declaring the ODBC version")?;
        Ok(Arc::new(Environment { handle }))
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        self.handle.api()
    }

    pub fn handle(&self) -> &Arc<NativeHandle> {
        &self.handle
    }

    /// Initialize the process wide environment, an existing one is kept and returned.
    pub fn init_global(api: Arc<dyn NativeApi>) -> Result<Arc<Environment>> {
        let mut global = GLOBAL.lock();
        if let Some(environment) = &*global {
            return Ok(environment.clone());
        }
        let environment = Environment::new(api).inspect_err(|e| log::error!("{:#}", e))?;
        *global = Some(environment.clone());
        Ok(environment)
    }

    pub fn global() -> Option<Arc<Environment>> {
        GLOBAL.lock().clone()
    }

    /// Drop the process wide environment, the native handle is freed once the last
    /// connection using it is gone. Returns false when none was initialized.
    pub fn teardown_global() -> bool {
        GLOBAL.lock().take().is_some()
    }
}
