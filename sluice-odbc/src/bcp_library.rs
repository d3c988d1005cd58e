use libloading::Library;
use parking_lot::Mutex;
use sluice_core::{
    Error, Failure, Result,
    native::{Bcp, BcpApi, Handle},
};
use std::{
    collections::BTreeMap,
    ffi::c_void,
    fmt::{self, Debug},
    ptr,
    sync::Arc,
};

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARIES: &[&str] = &["msodbcsql18.dll", "msodbcsql17.dll"];
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARIES: &[&str] = &["libmsodbcsql.18.dylib", "libmsodbcsql.17.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARIES: &[&str] = &["libmsodbcsql-18.so", "libmsodbcsql-17.so"];

static LOADED: Mutex<BTreeMap<String, Arc<BcpLibrary>>> = Mutex::new(BTreeMap::new());

type Init = unsafe extern "system" fn(Handle, *const u16, *const u16, *const u16, i32) -> i16;
type Bind = unsafe extern "system" fn(Handle, *const u8, i32, i32, *const u8, i32, i32, i32) -> i16;
type SendRow = unsafe extern "system" fn(Handle) -> i16;
type Count = unsafe extern "system" fn(Handle) -> i32;
type Control = unsafe extern "system" fn(Handle, i32, *mut c_void) -> i16;

struct Functions {
    init: Option<Init>,
    bind: Option<Bind>,
    send_row: Option<SendRow>,
    batch: Option<Count>,
    done: Option<Count>,
    control: Option<Control>,
}

/// The vendor bulk copy functions, resolved from the driver library at runtime.
///
/// Functions the library does not export are listed by [`BcpApi::missing`], calling one of
/// them fails without reaching the native layer.
pub struct BcpLibrary {
    name: String,
    functions: Functions,
    missing: Vec<&'static str>,
    _library: Library,
}

impl BcpLibrary {
    /// The library `name`, or the platform default when `None`. Loaded once per process.
    pub fn load(name: Option<&str>) -> Result<Arc<BcpLibrary>> {
        let candidates = match name {
            Some(name) => vec![name],
            None => DEFAULT_LIBRARIES.to_vec(),
        };
        let mut loaded = LOADED.lock();
        if let Some(library) = candidates.iter().find_map(|v| loaded.get(*v)) {
            return Ok(library.clone());
        }
        let mut reasons = Vec::new();
        for candidate in candidates {
            match Self::open(candidate) {
                Ok(library) => {
                    let library = Arc::new(library);
                    loaded.insert(candidate.to_string(), library.clone());
                    return Ok(library);
                }
                Err(e) => reasons.push(format!("{e:#}")),
            }
        }
        let error = Error::new(Failure::PluginLoad {
            reason: reasons.join("; "),
        });
        log::error!("{:#}", error);
        Err(error)
    }

    fn open(name: &str) -> Result<BcpLibrary> {
        // SAFETY: loading the driver library runs its initializers, nothing else is assumed
        let library = unsafe { Library::new(name) }
            .map_err(|e| Error::new(e).context(format!("While loading `{name}`")))?;
        let mut missing = Vec::new();
        // SAFETY: the signatures match the vendor bulk copy header
        let functions = unsafe {
            Functions {
                init: resolve(&library, "bcp_initW", &mut missing),
                bind: resolve(&library, "bcp_bind", &mut missing),
                send_row: resolve(&library, "bcp_sendrow", &mut missing),
                batch: resolve(&library, "bcp_batch", &mut missing),
                done: resolve(&library, "bcp_done", &mut missing),
                control: resolve(&library, "bcp_control", &mut missing),
            }
        };
        if missing.is_empty() {
            log::debug!("Loaded the bulk copy library `{name}`");
        } else {
            log::warn!(
                "The bulk copy library `{name}` does not export {}",
                missing.join(", ")
            );
        }
        Ok(BcpLibrary {
            name: name.to_string(),
            functions,
            missing,
            _library: library,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

unsafe fn resolve<T: Copy>(
    library: &Library,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<T> {
    let symbol = format!("{name}\0");
    // SAFETY: the caller guarantees `T` is the signature of `name`
    match unsafe { library.get::<T>(symbol.as_bytes()) } {
        Ok(v) => Some(*v),
        Err(..) => {
            missing.push(name);
            None
        }
    }
}

impl Debug for BcpLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BcpLibrary")
            .field("name", &self.name)
            .field("missing", &self.missing)
            .finish()
    }
}

impl BcpApi for BcpLibrary {
    fn init(&self, conn: Handle, table: &[u16], direction: i32) -> i16 {
        let Some(init) = self.functions.init else {
            return Bcp::FAIL;
        };
        let table = table.iter().copied().chain([0]).collect::<Vec<_>>();
        unsafe { init(conn, table.as_ptr(), ptr::null(), ptr::null(), direction) }
    }

    unsafe fn bind(
        &self,
        conn: Handle,
        data: *const u8,
        indicator_len: i32,
        data_len: i32,
        data_type: i32,
        column: i32,
    ) -> i16 {
        let Some(bind) = self.functions.bind else {
            return Bcp::FAIL;
        };
        unsafe {
            bind(
                conn,
                data,
                indicator_len,
                data_len,
                ptr::null(),
                0,
                data_type,
                column,
            )
        }
    }

    fn send_row(&self, conn: Handle) -> i16 {
        match self.functions.send_row {
            Some(f) => unsafe { f(conn) },
            None => Bcp::FAIL,
        }
    }

    fn batch(&self, conn: Handle) -> i32 {
        match self.functions.batch {
            Some(f) => unsafe { f(conn) },
            None => -1,
        }
    }

    fn done(&self, conn: Handle) -> i32 {
        match self.functions.done {
            Some(f) => unsafe { f(conn) },
            None => -1,
        }
    }

    fn control(&self, conn: Handle, option: i32, value: isize) -> i16 {
        match self.functions.control {
            Some(f) => unsafe { f(conn, option, value as *mut c_void) },
            None => Bcp::FAIL,
        }
    }

    fn missing(&self) -> &[&'static str] {
        &self.missing
    }
}

