use libloading::Library;
use sluice_core::{
    Diagnostic, Error, Result,
    native::{
        CDataType, ColumnDescription, CompletionType, DiagField, FreeStmtOption, Handle, HandleKind, Len,
        NativeApi, ParameterBinding, SqlReturn, ULen,
    },
};
use std::{
    ffi::c_void,
    fmt::{self, Debug},
    ptr,
};

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARIES: &[&str] = &["odbc32.dll"];
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARIES: &[&str] = &["libodbc.2.dylib", "libiodbc.2.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARIES: &[&str] = &["libodbc.so.2", "libodbc.so"];

const SQL_ATTR_APP_PARAM_DESC: i32 = 10011;
const SQL_ATTR_IMP_PARAM_DESC: i32 = 10013;
const SQL_DESC_TYPE: i16 = 1002;
const SQL_DESC_PRECISION: i16 = 1005;
const SQL_DESC_SCALE: i16 = 1006;
const SQL_DESC_DATA_PTR: i16 = 1010;
const SQL_IS_POINTER: i32 = -4;
const SQL_IS_INTEGER: i32 = -6;
const SQL_IS_SMALLINT: i32 = -8;
const SQL_DRIVER_NOPROMPT: u16 = 0;
const MAX_MESSAGE: usize = 1024;
const MAX_NAME: usize = 256;

type AllocHandle = unsafe extern "system" fn(i16, Handle, *mut Handle) -> i16;
type FreeHandle = unsafe extern "system" fn(i16, Handle) -> i16;
type SetAttr = unsafe extern "system" fn(Handle, i32, *mut c_void, i32) -> i16;
type GetAttr = unsafe extern "system" fn(Handle, i32, *mut c_void, i32, *mut i32) -> i16;
type DriverConnect = unsafe extern "system" fn(
    Handle,
    *mut c_void,
    *const u16,
    i16,
    *mut u16,
    i16,
    *mut i16,
    u16,
) -> i16;
type OnHandle = unsafe extern "system" fn(Handle) -> i16;
type EndTran = unsafe extern "system" fn(i16, Handle, i16) -> i16;
type WithText = unsafe extern "system" fn(Handle, *const u16, i32) -> i16;
type BindParameter = unsafe extern "system" fn(
    Handle,
    u16,
    i16,
    i16,
    i16,
    ULen,
    i16,
    *mut c_void,
    Len,
    *mut Len,
) -> i16;
type SetDescField = unsafe extern "system" fn(Handle, i16, i16, *mut c_void, i32) -> i16;
type NumResultCols = unsafe extern "system" fn(Handle, *mut i16) -> i16;
type DescribeCol = unsafe extern "system" fn(
    Handle,
    u16,
    *mut u16,
    i16,
    *mut i16,
    *mut i16,
    *mut ULen,
    *mut i16,
    *mut i16,
) -> i16;
type ColAttribute =
    unsafe extern "system" fn(Handle, u16, u16, *mut c_void, i16, *mut i16, *mut Len) -> i16;
type RowCount = unsafe extern "system" fn(Handle, *mut Len) -> i16;
type GetData = unsafe extern "system" fn(Handle, u16, i16, *mut c_void, Len, *mut Len) -> i16;
type FreeStmt = unsafe extern "system" fn(Handle, u16) -> i16;
type GetDiagRec = unsafe extern "system" fn(
    i16,
    Handle,
    i16,
    *mut u16,
    *mut i32,
    *mut u16,
    i16,
    *mut i16,
) -> i16;
type GetDiagField =
    unsafe extern "system" fn(i16, Handle, i16, i16, *mut c_void, i16, *mut i16) -> i16;

struct Functions {
    alloc_handle: AllocHandle,
    free_handle: FreeHandle,
    set_env_attr: SetAttr,
    set_connect_attr: SetAttr,
    set_stmt_attr: SetAttr,
    get_stmt_attr: GetAttr,
    driver_connect: DriverConnect,
    disconnect: OnHandle,
    end_tran: EndTran,
    prepare: WithText,
    exec_direct: WithText,
    execute: OnHandle,
    bind_parameter: BindParameter,
    set_desc_field: SetDescField,
    num_result_cols: NumResultCols,
    describe_col: DescribeCol,
    col_attribute: ColAttribute,
    row_count: RowCount,
    fetch: OnHandle,
    get_data: GetData,
    more_results: OnHandle,
    free_stmt: FreeStmt,
    cancel: OnHandle,
    get_diag_rec: GetDiagRec,
    get_diag_field: GetDiagField,
}

/// The system ODBC driver manager, resolved at runtime.
pub struct DriverManager {
    name: String,
    functions: Functions,
    _library: Library,
}

impl DriverManager {
    /// Load the platform default driver manager.
    pub fn load_default() -> Result<DriverManager> {
        let mut errors = Vec::new();
        for name in DEFAULT_LIBRARIES {
            match Self::load(name) {
                Ok(v) => return Ok(v),
                Err(e) => errors.push(format!("{e:#}")),
            }
        }
        let error = Error::msg(format!(
            "Could not load the ODBC driver manager: {}",
            errors.join("; ")
        ));
        log::error!("{:#}", error);
        Err(error)
    }

    /// Load the driver manager from `name` (a file name or a path).
    pub fn load(name: &str) -> Result<DriverManager> {
        // SAFETY: loading a driver manager runs its initializers, nothing else is assumed
        let library = unsafe { Library::new(name) }
            .map_err(|e| Error::new(e).context(format!("While loading `{name}`")))?;
        // SAFETY: the signatures match the ODBC 3.80 headers
        let functions = unsafe {
            Functions {
                alloc_handle: symbol(&library, name, b"SQLAllocHandle\0")?,
                free_handle: symbol(&library, name, b"SQLFreeHandle\0")?,
                set_env_attr: symbol(&library, name, b"SQLSetEnvAttr\0")?,
                set_connect_attr: symbol(&library, name, b"SQLSetConnectAttrW\0")?,
                set_stmt_attr: symbol(&library, name, b"SQLSetStmtAttrW\0")?,
                get_stmt_attr: symbol(&library, name, b"SQLGetStmtAttrW\0")?,
                driver_connect: symbol(&library, name, b"SQLDriverConnectW\0")?,
                disconnect: symbol(&library, name, b"SQLDisconnect\0")?,
                end_tran: symbol(&library, name, b"SQLEndTran\0")?,
                prepare: symbol(&library, name, b"SQLPrepareW\0")?,
                exec_direct: symbol(&library, name, b"SQLExecDirectW\0")?,
                execute: symbol(&library, name, b"SQLExecute\0")?,
                bind_parameter: symbol(&library, name, b"SQLBindParameter\0")?,
                set_desc_field: symbol(&library, name, b"SQLSetDescFieldW\0")?,
                num_result_cols: symbol(&library, name, b"SQLNumResultCols\0")?,
                describe_col: symbol(&library, name, b"SQLDescribeColW\0")?,
                col_attribute: symbol(&library, name, b"SQLColAttributeW\0")?,
                row_count: symbol(&library, name, b"SQLRowCount\0")?,
                fetch: symbol(&library, name, b"SQLFetch\0")?,
                get_data: symbol(&library, name, b"SQLGetData\0")?,
                more_results: symbol(&library, name, b"SQLMoreResults\0")?,
                free_stmt: symbol(&library, name, b"SQLFreeStmt\0")?,
                cancel: symbol(&library, name, b"SQLCancel\0")?,
                get_diag_rec: symbol(&library, name, b"SQLGetDiagRecW\0")?,
                get_diag_field: symbol(&library, name, b"SQLGetDiagFieldW\0")?,
            }
        };
        log::debug!("Loaded the ODBC driver manager `{name}`");
        Ok(DriverManager {
            name: name.to_string(),
            functions,
            _library: library,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor handle of the statement attribute `attribute`.
    fn descriptor(&self, stmt: Handle, attribute: i32) -> std::result::Result<Handle, SqlReturn> {
        let mut desc = Handle::NULL;
        // SAFETY: the attribute is a pointer sized descriptor handle
        let ret = unsafe {
            (self.functions.get_stmt_attr)(
                stmt,
                attribute,
                &mut desc as *mut Handle as *mut c_void,
                SQL_IS_POINTER,
                ptr::null_mut(),
            )
        };
        let ret = SqlReturn(ret);
        if !ret.is_success() {
            return Err(ret);
        }
        Ok(desc)
    }

    fn diag_text(&self, kind: HandleKind, handle: Handle, record: i16, field: i16) -> String {
        let mut buffer = [0u16; MAX_NAME];
        let mut length: i16 = 0;
        // SAFETY: the buffer length is passed in bytes
        let ret = unsafe {
            (self.functions.get_diag_field)(
                kind as i16,
                handle,
                record,
                field,
                buffer.as_mut_ptr() as *mut c_void,
                (buffer.len() * 2) as i16,
                &mut length,
            )
        };
        if !SqlReturn(ret).is_success() {
            return String::new();
        }
        let units = (length.max(0) as usize / 2).min(buffer.len());
        String::from_utf16_lossy(&buffer[..units])
    }

    fn diag_integer(&self, kind: HandleKind, handle: Handle, record: i16, field: i16) -> i32 {
        let mut value: i32 = 0;
        // SAFETY: integer diagnostic fields are written in place
        let ret = unsafe {
            (self.functions.get_diag_field)(
                kind as i16,
                handle,
                record,
                field,
                &mut value as *mut i32 as *mut c_void,
                SQL_IS_INTEGER as i16,
                ptr::null_mut(),
            )
        };
        if SqlReturn(ret).is_success() { value } else { 0 }
    }
}

impl Debug for DriverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("name", &self.name)
            .finish()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str, symbol: &[u8]) -> Result<T> {
    // SAFETY: the caller guarantees `T` is the signature of `symbol`
    unsafe { library.get::<T>(symbol) }
        .map(|v| *v)
        .map_err(|e| {
            let function = String::from_utf8_lossy(&symbol[..symbol.len().saturating_sub(1)]);
            Error::new(e).context(format!("While resolving `{function}` in `{name}`"))
        })
}

impl NativeApi for DriverManager {
    fn alloc_handle(&self, kind: HandleKind, parent: Handle, output: &mut Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.alloc_handle)(kind as i16, parent, output) })
    }

    fn free_handle(&self, kind: HandleKind, handle: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.free_handle)(kind as i16, handle) })
    }

    fn set_env_attr(&self, env: Handle, attribute: i32, value: usize) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.set_env_attr)(env, attribute, value as *mut c_void, 0) })
    }

    fn set_connect_attr(&self, conn: Handle, attribute: i32, value: usize) -> SqlReturn {
        SqlReturn(unsafe {
            (self.functions.set_connect_attr)(conn, attribute, value as *mut c_void, 0)
        })
    }

    fn driver_connect(&self, conn: Handle, connection_string: &[u16]) -> SqlReturn {
        let Ok(length) = i16::try_from(connection_string.len()) else {
            log::error!("The connection string is longer than {} characters", i16::MAX);
            return SqlReturn::ERROR;
        };
        SqlReturn(unsafe {
            (self.functions.driver_connect)(
                conn,
                ptr::null_mut(),
                connection_string.as_ptr(),
                length,
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                SQL_DRIVER_NOPROMPT,
            )
        })
    }

    fn disconnect(&self, conn: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.disconnect)(conn) })
    }

    fn end_tran(
        &self,
        kind: HandleKind,
        handle: Handle,
        completion: CompletionType,
    ) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.end_tran)(kind as i16, handle, completion as i16) })
    }

    fn set_stmt_attr(&self, stmt: Handle, attribute: i32, value: usize) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.set_stmt_attr)(stmt, attribute, value as *mut c_void, 0) })
    }

    fn prepare(&self, stmt: Handle, sql: &[u16]) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.prepare)(stmt, sql.as_ptr(), sql.len() as i32) })
    }

    fn exec_direct(&self, stmt: Handle, sql: &[u16]) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.exec_direct)(stmt, sql.as_ptr(), sql.len() as i32) })
    }

    fn execute(&self, stmt: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.execute)(stmt) })
    }

    unsafe fn bind_parameter(&self, stmt: Handle, binding: &ParameterBinding) -> SqlReturn {
        SqlReturn(unsafe {
            (self.functions.bind_parameter)(
                stmt,
                binding.index,
                binding.io as i16,
                binding.c_type,
                binding.sql_type,
                binding.column_size,
                binding.decimal_digits,
                binding.value,
                binding.buffer_length,
                binding.indicator,
            )
        })
    }

    fn set_param_descriptor_text(
        &self,
        stmt: Handle,
        record: i16,
        field: i16,
        value: &[u16],
    ) -> SqlReturn {
        let desc = match self.descriptor(stmt, SQL_ATTR_IMP_PARAM_DESC) {
            Ok(v) => v,
            Err(ret) => return ret,
        };
        SqlReturn(unsafe {
            (self.functions.set_desc_field)(
                desc,
                record,
                field,
                value.as_ptr() as *mut c_void,
                (value.len() * 2) as i32,
            )
        })
    }

    unsafe fn set_param_numeric(
        &self,
        stmt: Handle,
        record: u16,
        precision: i16,
        scale: i16,
        data: *mut c_void,
    ) -> SqlReturn {
        let desc = match self.descriptor(stmt, SQL_ATTR_APP_PARAM_DESC) {
            Ok(v) => v,
            Err(ret) => return ret,
        };
        let record = record as i16;
        let fields = [
            (SQL_DESC_TYPE, CDataType::NUMERIC as isize as *mut c_void),
            (SQL_DESC_PRECISION, precision as isize as *mut c_void),
            (SQL_DESC_SCALE, scale as isize as *mut c_void),
            (SQL_DESC_DATA_PTR, data),
        ];
        for (field, value) in fields {
            let length = if field == SQL_DESC_DATA_PTR {
                SQL_IS_POINTER
            } else {
                SQL_IS_SMALLINT
            };
            let ret = SqlReturn(unsafe {
                (self.functions.set_desc_field)(desc, record, field, value, length)
            });
            if !ret.is_success() {
                return ret;
            }
        }
        SqlReturn::SUCCESS
    }

    fn num_result_cols(&self, stmt: Handle, count: &mut i16) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.num_result_cols)(stmt, count) })
    }

    fn describe_col(
        &self,
        stmt: Handle,
        column: u16,
        description: &mut ColumnDescription,
    ) -> SqlReturn {
        let mut name = [0u16; MAX_NAME];
        let mut name_length: i16 = 0;
        let ret = SqlReturn(unsafe {
            (self.functions.describe_col)(
                stmt,
                column,
                name.as_mut_ptr(),
                name.len() as i16,
                &mut name_length,
                &mut description.data_type,
                &mut description.column_size,
                &mut description.decimal_digits,
                &mut description.nullable,
            )
        });
        if ret.is_success() {
            let units = (name_length.max(0) as usize).min(name.len() - 1);
            description.name = name[..units].to_vec();
        }
        ret
    }

    fn col_attribute_text(
        &self,
        stmt: Handle,
        column: u16,
        field: i16,
        output: &mut Vec<u16>,
    ) -> SqlReturn {
        let mut buffer = [0u16; MAX_NAME];
        let mut length: i16 = 0;
        let ret = SqlReturn(unsafe {
            (self.functions.col_attribute)(
                stmt,
                column,
                field as u16,
                buffer.as_mut_ptr() as *mut c_void,
                (buffer.len() * 2) as i16,
                &mut length,
                ptr::null_mut(),
            )
        });
        if ret.is_success() {
            let units = (length.max(0) as usize / 2).min(buffer.len() - 1);
            *output = buffer[..units].to_vec();
        }
        ret
    }

    fn row_count(&self, stmt: Handle, count: &mut Len) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.row_count)(stmt, count) })
    }

    fn fetch(&self, stmt: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.fetch)(stmt) })
    }

    unsafe fn get_data(
        &self,
        stmt: Handle,
        column: u16,
        c_type: i16,
        target: *mut c_void,
        buffer_length: Len,
        indicator: *mut Len,
    ) -> SqlReturn {
        SqlReturn(unsafe {
            (self.functions.get_data)(stmt, column, c_type, target, buffer_length, indicator)
        })
    }

    fn more_results(&self, stmt: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.more_results)(stmt) })
    }

    fn free_stmt(&self, stmt: Handle, option: FreeStmtOption) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.free_stmt)(stmt, option as u16) })
    }

    fn cancel(&self, stmt: Handle) -> SqlReturn {
        SqlReturn(unsafe { (self.functions.cancel)(stmt) })
    }

    fn diag_record(&self, kind: HandleKind, handle: Handle, record: i16) -> Option<Diagnostic> {
        let mut state = [0u16; 6];
        let mut native_code: i32 = 0;
        let mut message = vec![0u16; MAX_MESSAGE];
        let mut length: i16 = 0;
        let ret = SqlReturn(unsafe {
            (self.functions.get_diag_rec)(
                kind as i16,
                handle,
                record,
                state.as_mut_ptr(),
                &mut native_code,
                message.as_mut_ptr(),
                message.len() as i16,
                &mut length,
            )
        });
        if !ret.is_success() {
            return None;
        }
        let units = (length.max(0) as usize).min(message.len() - 1);
        Some(Diagnostic {
            sqlstate: String::from_utf16_lossy(&state[..5]),
            native_code,
            message: String::from_utf16_lossy(&message[..units]),
            severity: self.diag_integer(kind, handle, record, DiagField::SS_SEVERITY),
            server: self.diag_text(kind, handle, record, DiagField::SS_SRVNAME),
            procedure: self.diag_text(kind, handle, record, DiagField::SS_PROCNAME),
            line: self.diag_integer(kind, handle, record, DiagField::SS_LINE).max(0) as u32,
        })
    }
}

