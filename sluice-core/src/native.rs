//! Native ODBC interface.
//!
//! The engine never links against a driver manager directly. Everything it needs from
//! the native layer goes through [`NativeApi`] (and [`BcpApi`] for bulk copy), which the
//! driver crate implements on top of the runtime-loaded driver manager and the test crate
//! implements with a scripted fake. The ABI types below mirror the ODBC headers.

use crate::Diagnostic;
use std::{
    ffi::c_void,
    fmt::{self, Debug, Display},
    ptr,
};

/// Opaque native handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(pub *mut c_void);

impl Handle {
    pub const NULL: Handle = Handle(ptr::null_mut());

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Handle built from a plain integer id, used by fake drivers.
    pub fn from_id(id: usize) -> Handle {
        Handle(id as *mut c_void)
    }

    pub fn id(&self) -> usize {
        self.0 as usize
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::NULL
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.0)
    }
}

// Handles are opaque tokens, the driver manager synchronizes access to the resources behind them.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

pub type Len = isize;
pub type ULen = usize;

/// Return code of a native call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SqlReturn(pub i16);

impl SqlReturn {
    pub const SUCCESS: SqlReturn = SqlReturn(0);
    pub const SUCCESS_WITH_INFO: SqlReturn = SqlReturn(1);
    pub const STILL_EXECUTING: SqlReturn = SqlReturn(2);
    pub const NEED_DATA: SqlReturn = SqlReturn(99);
    pub const NO_DATA: SqlReturn = SqlReturn(100);
    pub const ERROR: SqlReturn = SqlReturn(-1);
    pub const INVALID_HANDLE: SqlReturn = SqlReturn(-2);

    pub fn is_success(&self) -> bool {
        *self == SqlReturn::SUCCESS || *self == SqlReturn::SUCCESS_WITH_INFO
    }

    pub fn is_no_data(&self) -> bool {
        *self == SqlReturn::NO_DATA
    }
}

impl Debug for SqlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for SqlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SqlReturn::SUCCESS => f.write_str("SQL_SUCCESS"),
            SqlReturn::SUCCESS_WITH_INFO => f.write_str("SQL_SUCCESS_WITH_INFO"),
            SqlReturn::STILL_EXECUTING => f.write_str("SQL_STILL_EXECUTING"),
            SqlReturn::NEED_DATA => f.write_str("SQL_NEED_DATA"),
            SqlReturn::NO_DATA => f.write_str("SQL_NO_DATA"),
            SqlReturn::ERROR => f.write_str("SQL_ERROR"),
            SqlReturn::INVALID_HANDLE => f.write_str("SQL_INVALID_HANDLE"),
            SqlReturn(v) => write!(f, "SQLRETURN({v})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum HandleKind {
    Environment = 1,
    Connection = 2,
    Statement = 3,
    Descriptor = 4,
}

impl Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Environment => "environment",
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
            HandleKind::Descriptor => "descriptor",
        })
    }
}

/// C data type codes (`SQL_C_*`).
pub struct CDataType;
impl CDataType {
    pub const CHAR: i16 = 1;
    pub const WCHAR: i16 = -8;
    pub const SSHORT: i16 = -15;
    pub const SLONG: i16 = -16;
    pub const ULONG: i16 = -18;
    pub const SBIGINT: i16 = -25;
    pub const STINYINT: i16 = -26;
    pub const BIT: i16 = -7;
    pub const FLOAT: i16 = 7;
    pub const DOUBLE: i16 = 8;
    pub const BINARY: i16 = -2;
    pub const NUMERIC: i16 = 2;
    pub const TYPE_DATE: i16 = 91;
    pub const TYPE_TIME: i16 = 92;
    pub const TYPE_TIMESTAMP: i16 = 93;
    pub const SS_TIME2: i16 = 0x4000;
    pub const SS_TIMESTAMPOFFSET: i16 = 0x4001;
    pub const GUID: i16 = -11;
    pub const DEFAULT: i16 = 99;
}

/// Attribute identifiers and values.
pub struct Attribute;
impl Attribute {
    pub const ODBC_VERSION: i32 = 200;
    pub const OV_ODBC3_80: usize = 380;
    pub const AUTOCOMMIT: i32 = 102;
    pub const AUTOCOMMIT_OFF: usize = 0;
    pub const AUTOCOMMIT_ON: usize = 1;
    pub const LOGIN_TIMEOUT: i32 = 103;
    pub const QUERY_TIMEOUT: i32 = 0;
    pub const PARAM_BIND_TYPE: i32 = 18;
    pub const PARAMSET_SIZE: i32 = 22;
    pub const ROW_ARRAY_SIZE: i32 = 27;
    pub const SS_PARAM_FOCUS: i32 = 1236;
    pub const SS_BCP: i32 = 1219;
    pub const SS_BCP_ON: usize = 1;
    pub const PARAM_BIND_BY_COLUMN: usize = 0;
}

/// Descriptor and column attribute field identifiers.
pub struct DescField;
impl DescField {
    pub const TYPE_NAME: i16 = 14;
    pub const SS_SCHEMA_NAME: i16 = 1226;
    pub const SS_TYPE_NAME: i16 = 1227;
}

/// SQL Server specific diagnostic fields.
pub struct DiagField;
impl DiagField {
    pub const SS_MSGSTATE: i16 = -1150;
    pub const SS_SEVERITY: i16 = -1151;
    pub const SS_SRVNAME: i16 = -1152;
    pub const SS_PROCNAME: i16 = -1153;
    pub const SS_LINE: i16 = -1154;
}

pub const NTS: Len = -3;
pub const NULL_DATA: Len = -1;
pub const NO_TOTAL: Len = -4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum CompletionType {
    Commit = 0,
    Rollback = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FreeStmtOption {
    Close = 0,
    Unbind = 2,
    ResetParams = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ParamIo {
    Input = 1,
    InputOutput = 2,
    Output = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Nullability {
    NoNulls = 0,
    Nullable = 1,
    Unknown = 2,
}

impl Nullability {
    pub fn from_code(code: i16) -> Nullability {
        match code {
            0 => Nullability::NoNulls,
            1 => Nullability::Nullable,
            _ => Nullability::Unknown,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlDate {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlTime2 {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlTimestamp {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlTimestampOffset {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
    pub timezone_hour: i16,
    pub timezone_minute: i16,
}

pub const MAX_NUMERIC_LEN: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlNumeric {
    pub precision: u8,
    pub scale: i8,
    /// 1 positive, 0 negative.
    pub sign: u8,
    /// Little endian magnitude.
    pub val: [u8; MAX_NUMERIC_LEN],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SqlGuid {
    pub d1: u32,
    pub d2: u16,
    pub d3: u16,
    pub d4: [u8; 8],
}

/// Arguments of a parameter bind call.
///
/// `value` and `indicator` point into storage owned by the bound parameter and must
/// stay valid until the statement's parameters are reset or the statement is freed.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinding {
    pub index: u16,
    pub io: ParamIo,
    pub c_type: i16,
    pub sql_type: i16,
    pub column_size: ULen,
    pub decimal_digits: i16,
    pub value: *mut c_void,
    pub buffer_length: Len,
    pub indicator: *mut Len,
}

/// Result of a describe column call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: Vec<u16>,
    pub data_type: i16,
    pub column_size: ULen,
    pub decimal_digits: i16,
    pub nullable: i16,
}

/// The ODBC functions used by the engine.
///
/// Mirrors the wide-character ODBC entry points: text goes in and out as UTF-16 code
/// units without terminator. Implementations must be callable from any thread.
pub trait NativeApi: Send + Sync + 'static {
    fn alloc_handle(&self, kind: HandleKind, parent: Handle, output: &mut Handle) -> SqlReturn;
    fn free_handle(&self, kind: HandleKind, handle: Handle) -> SqlReturn;
    fn set_env_attr(&self, env: Handle, attribute: i32, value: usize) -> SqlReturn;
    fn set_connect_attr(&self, conn: Handle, attribute: i32, value: usize) -> SqlReturn;
    fn driver_connect(&self, conn: Handle, connection_string: &[u16]) -> SqlReturn;
    fn disconnect(&self, conn: Handle) -> SqlReturn;
    fn end_tran(&self, kind: HandleKind, handle: Handle, completion: CompletionType)
    -> SqlReturn;
    fn set_stmt_attr(&self, stmt: Handle, attribute: i32, value: usize) -> SqlReturn;
    fn prepare(&self, stmt: Handle, sql: &[u16]) -> SqlReturn;
    fn exec_direct(&self, stmt: Handle, sql: &[u16]) -> SqlReturn;
    fn execute(&self, stmt: Handle) -> SqlReturn;
    /// # Safety
    /// The pointers in `binding` must stay valid until the parameters are reset.
    unsafe fn bind_parameter(&self, stmt: Handle, binding: &ParameterBinding) -> SqlReturn;
    /// Set a text field of the implementation parameter descriptor record.
    fn set_param_descriptor_text(
        &self,
        stmt: Handle,
        record: i16,
        field: i16,
        value: &[u16],
    ) -> SqlReturn;
    /// Set precision and scale of a `SQL_C_NUMERIC` application parameter record.
    ///
    /// # Safety
    /// `data` must be the value pointer passed to the bind call of the same record.
    unsafe fn set_param_numeric(
        &self,
        stmt: Handle,
        record: u16,
        precision: i16,
        scale: i16,
        data: *mut c_void,
    ) -> SqlReturn;
    fn num_result_cols(&self, stmt: Handle, count: &mut i16) -> SqlReturn;
    fn describe_col(
        &self,
        stmt: Handle,
        column: u16,
        description: &mut ColumnDescription,
    ) -> SqlReturn;
    fn col_attribute_text(
        &self,
        stmt: Handle,
        column: u16,
        field: i16,
        output: &mut Vec<u16>,
    ) -> SqlReturn;
    fn row_count(&self, stmt: Handle, count: &mut Len) -> SqlReturn;
    fn fetch(&self, stmt: Handle) -> SqlReturn;
    /// # Safety
    /// `target` must be valid for writes of `buffer_length` bytes (or of the fixed size of
    /// `c_type`) and `indicator` must be valid for one write.
    unsafe fn get_data(
        &self,
        stmt: Handle,
        column: u16,
        c_type: i16,
        target: *mut c_void,
        buffer_length: Len,
        indicator: *mut Len,
    ) -> SqlReturn;
    fn more_results(&self, stmt: Handle) -> SqlReturn;
    fn free_stmt(&self, stmt: Handle, option: FreeStmtOption) -> SqlReturn;
    fn cancel(&self, stmt: Handle) -> SqlReturn;
    /// Read diagnostic record `record` (1 based), `None` once the records are exhausted.
    fn diag_record(&self, kind: HandleKind, handle: Handle, record: i16) -> Option<Diagnostic>;
}

/// Bulk copy constants.
pub struct Bcp;
impl Bcp {
    pub const SUCCEED: i16 = 1;
    pub const FAIL: i16 = 0;
    pub const DB_IN: i32 = 1;
    pub const BATCH: i32 = 4;
    pub const KEEPNULLS: i32 = 5;
    pub const KEEPIDENTITY: i32 = 8;
    pub const VARLEN_DATA: i32 = -10;
    pub const SQLINT1: i32 = 0x30;
    pub const SQLBIT: i32 = 0x32;
    pub const SQLINT2: i32 = 0x34;
    pub const SQLINT4: i32 = 0x38;
    pub const SQLINT8: i32 = 0x7f;
    pub const SQLFLT8: i32 = 0x3e;
    pub const SQLVARCHAR: i32 = 0x27;
    pub const SQLBIGVARCHAR: i32 = 0xa7;
    pub const SQLNVARCHAR: i32 = 0xe7;
    pub const SQLVARBINARY: i32 = 0x25;
    pub const SQLBIGVARBINARY: i32 = 0xa5;
    pub const SQLDATEN: i32 = 0x28;
    pub const SQLTIMEN: i32 = 0x29;
    pub const SQLDATETIME2N: i32 = 0x2a;
    pub const SQLDATETIMEOFFSETN: i32 = 0x2b;
    pub const SQLDECIMALN: i32 = 0x6a;
    pub const SQLNUMERICN: i32 = 0x6c;
}

/// The bulk copy functions of the vendor driver.
pub trait BcpApi: Send + Sync + 'static {
    fn init(&self, conn: Handle, table: &[u16], direction: i32) -> i16;
    /// # Safety
    /// `data` must point to `indicator_len` indicator bytes followed by the value and stay
    /// valid until the bulk copy completes.
    unsafe fn bind(
        &self,
        conn: Handle,
        data: *const u8,
        indicator_len: i32,
        data_len: i32,
        data_type: i32,
        column: i32,
    ) -> i16;
    fn send_row(&self, conn: Handle) -> i16;
    /// Commit the rows sent so far, returns the count or -1.
    fn batch(&self, conn: Handle) -> i32;
    /// Finish the bulk copy, returns the count of rows not yet committed or -1.
    fn done(&self, conn: Handle) -> i32;
    fn control(&self, conn: Handle, option: i32, value: isize) -> i16;
    /// Functions the library failed to resolve.
    fn missing(&self) -> &[&'static str];
}

/// Encode text as UTF-16 code units without terminator.
pub fn to_wide(value: &str) -> Vec<u16> {
    value.encode_utf16().collect()
}
