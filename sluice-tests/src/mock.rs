use parking_lot::Mutex;
use sluice_core::{
    ColumnDefinition, Diagnostic,
    native::{
        Attribute, Bcp, BcpApi, CDataType, ColumnDescription, CompletionType, DescField,
        FreeStmtOption, Handle, HandleKind, Len, NULL_DATA, NativeApi, ParamIo, ParameterBinding,
        SqlDate, SqlGuid, SqlNumeric, SqlReturn, SqlTime2, SqlTimestamp, SqlTimestampOffset,
    },
};
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    ffi::c_void,
    mem, ptr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

/// A value as seen by the fake driver, both in result sets and in bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCell {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Numeric(SqlNumeric),
    Date(SqlDate),
    Time(SqlTime2),
    Timestamp(SqlTimestamp),
    Offset(SqlTimestampOffset),
    Guid(SqlGuid),
}

impl MockCell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MockCell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MockCell::Text(v) => Some(v),
            _ => None,
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            MockCell::Int(v) => Some(v.to_string()),
            MockCell::Double(v) => Some(v.to_string()),
            MockCell::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl From<i64> for MockCell {
    fn from(value: i64) -> Self {
        MockCell::Int(value)
    }
}

impl From<i32> for MockCell {
    fn from(value: i32) -> Self {
        MockCell::Int(value as i64)
    }
}

impl From<f64> for MockCell {
    fn from(value: f64) -> Self {
        MockCell::Double(value)
    }
}

impl From<&str> for MockCell {
    fn from(value: &str) -> Self {
        MockCell::Text(value.into())
    }
}

impl From<String> for MockCell {
    fn from(value: String) -> Self {
        MockCell::Text(value)
    }
}

impl From<Vec<u8>> for MockCell {
    fn from(value: Vec<u8>) -> Self {
        MockCell::Bytes(value)
    }
}

/// One result set (or row count) produced by a scripted statement.
#[derive(Debug, Clone, Default)]
pub struct MockResultSet {
    pub columns: Vec<ColumnDefinition>,
    pub rows: Vec<Vec<MockCell>>,
    pub affected: i64,
}

/// What the fake driver does when a given SQL text is executed.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub results: Vec<MockResultSet>,
    pub error: Option<Diagnostic>,
    pub outputs: Vec<(u16, MockCell)>,
    pub delay: Duration,
    pub fetch_delay: Duration,
}

impl Script {
    pub fn rows(columns: Vec<ColumnDefinition>, rows: Vec<Vec<MockCell>>) -> Self {
        Self::default().then_rows(columns, rows)
    }

    pub fn affected(count: i64) -> Self {
        Self::default().then_affected(count)
    }

    pub fn error(sqlstate: &str, native_code: i32, message: &str) -> Self {
        Self {
            error: Some(Diagnostic::new(sqlstate, native_code, message)),
            ..Default::default()
        }
    }

    pub fn then_rows(mut self, columns: Vec<ColumnDefinition>, rows: Vec<Vec<MockCell>>) -> Self {
        self.results.push(MockResultSet {
            columns,
            rows,
            affected: -1,
        });
        self
    }

    pub fn then_affected(mut self, count: i64) -> Self {
        self.results.push(MockResultSet {
            affected: count,
            ..Default::default()
        });
        self
    }

    /// Value written into output parameter `index` after a successful execute.
    pub fn with_output(mut self, index: u16, value: impl Into<MockCell>) -> Self {
        self.outputs.push((index, value.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

/// A bound parameter as read by the fake driver at execute time.
#[derive(Debug, Clone, PartialEq)]
pub struct MockParam {
    pub index: u16,
    pub io: ParamIo,
    pub c_type: i16,
    pub sql_type: i16,
    pub column_size: usize,
    pub decimal_digits: i16,
    /// One cell per row of the parameter set.
    pub values: Vec<MockCell>,
}

/// A table-valued parameter as read by the fake driver.
#[derive(Debug, Clone, PartialEq)]
pub struct MockTable {
    pub index: u16,
    pub type_name: String,
    pub schema: String,
    pub columns: Vec<MockParam>,
    pub rows: Vec<Vec<MockCell>>,
}

/// Record of one execute call.
#[derive(Debug, Clone)]
pub struct Execution {
    pub statement: Handle,
    pub sql: String,
    pub prepared: bool,
    pub paramset_size: usize,
    pub params: Vec<MockParam>,
    pub tables: Vec<MockTable>,
}

impl Execution {
    pub fn param(&self, index: u16) -> Option<&MockParam> {
        self.params.iter().find(|v| v.index == index)
    }
}

#[derive(Default)]
struct Cursor {
    pending: VecDeque<MockResultSet>,
    current: MockResultSet,
    row: Option<usize>,
    consumed: HashMap<u16, usize>,
    fetch_delay: Duration,
}

#[derive(Default)]
struct MockStatement {
    prepared: Option<String>,
    bindings: BTreeMap<u16, ParameterBinding>,
    focus: u16,
    table_columns: BTreeMap<u16, BTreeMap<u16, ParameterBinding>>,
    table_names: BTreeMap<(u16, i16), String>,
    attributes: HashMap<i32, usize>,
    cursor: Option<Cursor>,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct MockConnection {
    connected: bool,
    attributes: HashMap<i32, usize>,
}

#[derive(Default, Clone, Copy)]
struct BcpBinding {
    data: usize,
    indicator_len: i32,
    data_len: i32,
    data_type: i32,
}

#[derive(Default)]
struct BcpState {
    table: Option<String>,
    bindings: BTreeMap<i32, BcpBinding>,
    rows: Vec<Vec<MockCell>>,
    committed: usize,
    fail_row: Option<usize>,
    controls: Vec<(i32, isize)>,
    finished: bool,
}

#[derive(Default)]
struct MockState {
    next_id: usize,
    live: HashMap<usize, HandleKind>,
    free_calls: HashMap<usize, usize>,
    connections: HashMap<usize, MockConnection>,
    statements: HashMap<usize, MockStatement>,
    diagnostics: HashMap<usize, Vec<Diagnostic>>,
    scripts: HashMap<String, Script>,
    executions: Vec<Execution>,
    calls: HashMap<&'static str, usize>,
    failing_allocations: HashSet<HandleKind>,
    connect_error: Option<Diagnostic>,
    connection_strings: Vec<String>,
    env_attributes: Vec<(i32, usize)>,
    transactions: Vec<CompletionType>,
    numeric_descriptors: Vec<(u16, i16, i16)>,
    bcp: BcpState,
    /// Row failure armed for the next bulk copy only.
    bcp_pending_fail: Option<usize>,
}

// The raw pointers stored in the bindings are only dereferenced while the engine keeps the
// bound buffers alive, the state itself is always accessed under the mutex.
unsafe impl Send for MockState {}

/// Scripted in-memory ODBC driver.
///
/// Statements produce the result sets registered with [`MockDriver::script`] for their
/// (trimmed) SQL text; unscripted text fails with a syntax error. Every call is counted and
/// every execution recorded together with the parameter values read from the bound buffers.
#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
    bcp_missing: Vec<&'static str>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk copy functions reported as unresolved.
    pub fn with_bcp_missing(mut self, missing: &[&'static str]) -> Self {
        self.bcp_missing = missing.to_vec();
        self
    }

    pub fn script(&self, sql: &str, script: Script) {
        self.state.lock().scripts.insert(sql.trim().to_string(), script);
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.state.lock().executions.clone()
    }

    pub fn last_execution(&self) -> Option<Execution> {
        self.state.lock().executions.last().cloned()
    }

    /// How many times the native function `name` (for example `"SQLPrepare"`) was called.
    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    pub fn fail_allocation(&self, kind: HandleKind) {
        self.state.lock().failing_allocations.insert(kind);
    }

    pub fn fail_connect(&self, diagnostic: Diagnostic) {
        self.state.lock().connect_error = Some(diagnostic);
    }

    pub fn live_handles(&self, kind: HandleKind) -> usize {
        self.state.lock().live.values().filter(|v| **v == kind).count()
    }

    pub fn free_calls(&self, handle: Handle) -> usize {
        self.state.lock().free_calls.get(&handle.id()).copied().unwrap_or(0)
    }

    pub fn connection_strings(&self) -> Vec<String> {
        self.state.lock().connection_strings.clone()
    }

    pub fn env_attributes(&self) -> Vec<(i32, usize)> {
        self.state.lock().env_attributes.clone()
    }

    /// Connection attribute as last set on any connection.
    pub fn connect_attribute(&self, attribute: i32) -> Option<usize> {
        let state = self.state.lock();
        state
            .connections
            .values()
            .find_map(|v| v.attributes.get(&attribute).copied())
    }

    pub fn statement_attribute(&self, statement: Handle, attribute: i32) -> Option<usize> {
        let state = self.state.lock();
        state
            .statements
            .get(&statement.id())
            .and_then(|v| v.attributes.get(&attribute).copied())
    }

    pub fn transactions(&self) -> Vec<CompletionType> {
        self.state.lock().transactions.clone()
    }

    /// Precision and scale set on numeric parameter descriptors, by record.
    pub fn numeric_descriptors(&self) -> Vec<(u16, i16, i16)> {
        self.state.lock().numeric_descriptors.clone()
    }

    pub fn bcp_table(&self) -> Option<String> {
        self.state.lock().bcp.table.clone()
    }

    pub fn bcp_rows(&self) -> Vec<Vec<MockCell>> {
        self.state.lock().bcp.rows.clone()
    }

    pub fn bcp_committed(&self) -> usize {
        self.state.lock().bcp.committed
    }

    pub fn bcp_controls(&self) -> Vec<(i32, isize)> {
        self.state.lock().bcp.controls.clone()
    }

    /// Make the send of the `row`-th row (0 based) of the next bulk copy fail.
    pub fn fail_bcp_row(&self, row: usize) {
        self.state.lock().bcp_pending_fail = Some(row);
    }

    fn execute_sql(&self, stmt: Handle, sql: Option<&[u16]>) -> SqlReturn {
        let (script, cancel) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(statement) = state.statements.get_mut(&stmt.id()) else {
                return SqlReturn::INVALID_HANDLE;
            };
            let (sql, prepared) = match sql {
                Some(sql) => (String::from_utf16_lossy(sql), false),
                None => match &statement.prepared {
                    Some(sql) => (sql.clone(), true),
                    None => {
                        state.diagnostics.insert(
                            stmt.id(),
                            vec![Diagnostic::new("HY010", 0, "Function sequence error")],
                        );
                        return SqlReturn::ERROR;
                    }
                },
            };
            statement.cursor = None;
            statement.cancel.store(false, Ordering::Release);
            let paramset_size = statement
                .attributes
                .get(&Attribute::PARAMSET_SIZE)
                .copied()
                .unwrap_or(1)
                .max(1);
            // SAFETY: the engine keeps the bound buffers alive until the parameters are reset
            let (params, tables) = unsafe { read_parameters(statement, paramset_size) };
            state.executions.push(Execution {
                statement: stmt,
                sql: sql.clone(),
                prepared,
                paramset_size,
                params,
                tables,
            });
            let Some(script) = state.scripts.get(sql.trim()).cloned() else {
                state.diagnostics.insert(stmt.id(), vec![unscripted(&sql)]);
                return SqlReturn::ERROR;
            };
            (script, statement.cancel.clone())
        };
        if !wait(script.delay, &cancel) {
            self.state.lock().diagnostics.insert(
                stmt.id(),
                vec![Diagnostic::new("HY008", 0, "Operation canceled")],
            );
            return SqlReturn::ERROR;
        }
        let mut state = self.state.lock();
        let state = &mut *state;
        if let Some(error) = script.error {
            state.diagnostics.insert(stmt.id(), vec![error]);
            return SqlReturn::ERROR;
        }
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        for (index, value) in &script.outputs {
            if let Some(binding) = statement.bindings.get(index) {
                if binding.io != ParamIo::Input {
                    // SAFETY: the output buffers are bound and alive during execute
                    unsafe { write_output(binding, value) };
                }
            }
        }
        let mut pending = VecDeque::from(script.results);
        let current = pending.pop_front().unwrap_or(MockResultSet {
            affected: -1,
            ..Default::default()
        });
        statement.cursor = Some(Cursor {
            pending,
            current,
            row: None,
            consumed: HashMap::new(),
            fetch_delay: script.fetch_delay,
        });
        SqlReturn::SUCCESS
    }

    /// Columns of the current result set, or of the prepared text before execute.
    fn metadata(state: &MockState, stmt: Handle) -> Option<Vec<ColumnDefinition>> {
        let statement = state.statements.get(&stmt.id())?;
        if let Some(cursor) = &statement.cursor {
            return Some(cursor.current.columns.clone());
        }
        let sql = statement.prepared.as_ref()?;
        let script = state.scripts.get(sql.trim())?;
        Some(
            script
                .results
                .first()
                .map(|v| v.columns.clone())
                .unwrap_or_default(),
        )
    }

    fn begin(&self, name: &'static str, handle: Handle) -> parking_lot::MutexGuard<'_, MockState> {
        let mut state = self.state.lock();
        *state.calls.entry(name).or_default() += 1;
        state.diagnostics.remove(&handle.id());
        state
    }
}

fn unscripted(sql: &str) -> Diagnostic {
    Diagnostic {
        sqlstate: "42000".into(),
        native_code: 102,
        message: format!("Incorrect syntax near '{}'", sql.trim()),
        severity: 15,
        server: "mock".into(),
        line: 1,
        ..Default::default()
    }
}

fn fail(state: &mut MockState, handle: Handle, sqlstate: &str, message: &str) -> SqlReturn {
    state
        .diagnostics
        .entry(handle.id())
        .or_default()
        .push(Diagnostic::new(sqlstate, 0, message));
    SqlReturn::ERROR
}

/// Sleep up to `delay`, false when cancelled in the meantime.
fn wait(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(2)));
    }
}

fn fixed_size(c_type: i16) -> Option<usize> {
    Some(match c_type {
        CDataType::BIT | CDataType::STINYINT => 1,
        CDataType::SSHORT => 2,
        CDataType::SLONG | CDataType::ULONG => 4,
        CDataType::SBIGINT | CDataType::DOUBLE => 8,
        CDataType::NUMERIC => mem::size_of::<SqlNumeric>(),
        CDataType::TYPE_DATE => mem::size_of::<SqlDate>(),
        CDataType::SS_TIME2 => mem::size_of::<SqlTime2>(),
        CDataType::TYPE_TIMESTAMP => mem::size_of::<SqlTimestamp>(),
        CDataType::SS_TIMESTAMPOFFSET => mem::size_of::<SqlTimestampOffset>(),
        CDataType::GUID => mem::size_of::<SqlGuid>(),
        _ => return None,
    })
}

unsafe fn read<T: Copy>(base: *const u8, offset: usize) -> T {
    unsafe { ptr::read_unaligned(base.add(offset) as *const T) }
}

unsafe fn read_cells(binding: &ParameterBinding, rows: usize) -> Vec<MockCell> {
    let base = binding.value as *const u8;
    (0..rows)
        .map(|row| unsafe {
            let indicator = *binding.indicator.add(row);
            if indicator == NULL_DATA {
                return MockCell::Null;
            }
            let stride = fixed_size(binding.c_type).unwrap_or(binding.buffer_length.max(0) as usize);
            let offset = row * stride;
            match binding.c_type {
                CDataType::BIT | CDataType::STINYINT => MockCell::Int(read::<u8>(base, offset) as i64),
                CDataType::SSHORT => MockCell::Int(read::<i16>(base, offset) as i64),
                CDataType::SLONG => MockCell::Int(read::<i32>(base, offset) as i64),
                CDataType::ULONG => MockCell::Int(read::<u32>(base, offset) as i64),
                CDataType::SBIGINT => MockCell::Int(read::<i64>(base, offset)),
                CDataType::DOUBLE => MockCell::Double(read::<f64>(base, offset)),
                CDataType::NUMERIC => MockCell::Numeric(read(base, offset)),
                CDataType::TYPE_DATE => MockCell::Date(read(base, offset)),
                CDataType::SS_TIME2 => MockCell::Time(read(base, offset)),
                CDataType::TYPE_TIMESTAMP => MockCell::Timestamp(read(base, offset)),
                CDataType::SS_TIMESTAMPOFFSET => MockCell::Offset(read(base, offset)),
                CDataType::GUID => MockCell::Guid(read(base, offset)),
                CDataType::CHAR | CDataType::BINARY => {
                    let len = (indicator.max(0) as usize).min(stride);
                    let bytes = std::slice::from_raw_parts(base.add(offset), len).to_vec();
                    if binding.c_type == CDataType::CHAR {
                        MockCell::Text(String::from_utf8_lossy(&bytes).into_owned())
                    } else {
                        MockCell::Bytes(bytes)
                    }
                }
                CDataType::WCHAR => {
                    let len = (indicator.max(0) as usize).min(stride) / 2;
                    let units = (0..len)
                        .map(|i| read::<u16>(base, offset + i * 2))
                        .collect::<Vec<_>>();
                    MockCell::Text(String::from_utf16_lossy(&units))
                }
                _ => MockCell::Int(indicator as i64),
            }
        })
        .collect()
}

fn to_param(binding: &ParameterBinding, values: Vec<MockCell>) -> MockParam {
    MockParam {
        index: binding.index,
        io: binding.io,
        c_type: binding.c_type,
        sql_type: binding.sql_type,
        column_size: binding.column_size,
        decimal_digits: binding.decimal_digits,
        values,
    }
}

unsafe fn read_parameters(
    statement: &MockStatement,
    paramset_size: usize,
) -> (Vec<MockParam>, Vec<MockTable>) {
    let mut params = Vec::new();
    let mut tables = Vec::new();
    for binding in statement.bindings.values() {
        let values = unsafe { read_cells(binding, paramset_size) };
        if binding.c_type == CDataType::DEFAULT {
            let rows = values.first().and_then(MockCell::as_i64).unwrap_or(0).max(0) as usize;
            let columns = statement
                .table_columns
                .get(&binding.index)
                .map(|columns| {
                    columns
                        .values()
                        .map(|v| to_param(v, unsafe { read_cells(v, rows) }))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let rows = (0..rows)
                .map(|row| columns.iter().map(|c| c.values[row].clone()).collect())
                .collect();
            let name = |field| {
                statement
                    .table_names
                    .get(&(binding.index, field))
                    .cloned()
                    .unwrap_or_default()
            };
            tables.push(MockTable {
                index: binding.index,
                type_name: name(DescField::SS_TYPE_NAME),
                schema: name(DescField::SS_SCHEMA_NAME),
                columns,
                rows,
            });
        }
        params.push(to_param(binding, values));
    }
    (params, tables)
}

unsafe fn write_output(binding: &ParameterBinding, value: &MockCell) {
    unsafe {
        let base = binding.value as *mut u8;
        let length = binding.buffer_length.max(0) as usize;
        let written: Len = match (binding.c_type, value) {
            (_, MockCell::Null) => NULL_DATA,
            (CDataType::BIT, MockCell::Int(v)) => {
                ptr::write_unaligned(base, *v as u8);
                1
            }
            (CDataType::SSHORT, MockCell::Int(v)) => {
                ptr::write_unaligned(base as *mut i16, *v as i16);
                2
            }
            (CDataType::SLONG, MockCell::Int(v)) => {
                ptr::write_unaligned(base as *mut i32, *v as i32);
                4
            }
            (CDataType::ULONG, MockCell::Int(v)) => {
                ptr::write_unaligned(base as *mut u32, *v as u32);
                4
            }
            (CDataType::SBIGINT, MockCell::Int(v)) => {
                ptr::write_unaligned(base as *mut i64, *v);
                8
            }
            (CDataType::DOUBLE, MockCell::Double(v)) => {
                ptr::write_unaligned(base as *mut f64, *v);
                8
            }
            (CDataType::DOUBLE, MockCell::Int(v)) => {
                ptr::write_unaligned(base as *mut f64, *v as f64);
                8
            }
            (CDataType::WCHAR, v) => {
                let units = v.text().unwrap_or_default().encode_utf16().collect::<Vec<_>>();
                let n = units.len().min((length / 2).saturating_sub(1));
                let target = base as *mut u16;
                for (i, unit) in units[..n].iter().enumerate() {
                    ptr::write_unaligned(target.add(i), *unit);
                }
                ptr::write_unaligned(target.add(n), 0);
                (n * 2) as Len
            }
            (CDataType::CHAR, v) => {
                let bytes = v.text().unwrap_or_default().into_bytes();
                let n = bytes.len().min(length.saturating_sub(1));
                ptr::copy_nonoverlapping(bytes.as_ptr(), base, n);
                ptr::write_unaligned(base.add(n), 0);
                n as Len
            }
            (CDataType::BINARY, MockCell::Bytes(bytes)) => {
                let n = bytes.len().min(length);
                ptr::copy_nonoverlapping(bytes.as_ptr(), base, n);
                n as Len
            }
            (CDataType::TYPE_TIMESTAMP, MockCell::Timestamp(v)) => {
                ptr::write_unaligned(base as *mut SqlTimestamp, *v);
                mem::size_of::<SqlTimestamp>() as Len
            }
            (CDataType::TYPE_DATE, MockCell::Date(v)) => {
                ptr::write_unaligned(base as *mut SqlDate, *v);
                mem::size_of::<SqlDate>() as Len
            }
            (CDataType::NUMERIC, MockCell::Numeric(v)) => {
                ptr::write_unaligned(base as *mut SqlNumeric, *v);
                mem::size_of::<SqlNumeric>() as Len
            }
            _ => return,
        };
        *binding.indicator = written;
    }
}

/// Bytes the driver delivers for `cell` converted to the variable length `c_type`.
fn variable_bytes(cell: &MockCell, c_type: i16) -> Option<Vec<u8>> {
    match c_type {
        CDataType::CHAR => cell.text().map(String::into_bytes),
        CDataType::WCHAR => cell
            .text()
            .map(|v| v.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        CDataType::BINARY => match cell {
            MockCell::Bytes(v) => Some(v.clone()),
            MockCell::Text(v) => Some(v.clone().into_bytes()),
            _ => None,
        },
        _ => None,
    }
}

/// Writes a fixed width conversion of `cell`, `None` when the conversion is not supported.
unsafe fn write_fixed(cell: &MockCell, c_type: i16, target: *mut c_void) -> Option<usize> {
    unsafe {
        let target = target as *mut u8;
        match (c_type, cell) {
            (CDataType::BIT, MockCell::Int(v)) => ptr::write_unaligned(target, (*v != 0) as u8),
            (CDataType::SSHORT, MockCell::Int(v)) => {
                ptr::write_unaligned(target as *mut i16, i16::try_from(*v).ok()?)
            }
            (CDataType::SLONG, MockCell::Int(v)) => {
                ptr::write_unaligned(target as *mut i32, i32::try_from(*v).ok()?)
            }
            (CDataType::SBIGINT, MockCell::Int(v)) => ptr::write_unaligned(target as *mut i64, *v),
            (CDataType::DOUBLE, MockCell::Int(v)) => {
                ptr::write_unaligned(target as *mut f64, *v as f64)
            }
            (CDataType::DOUBLE, MockCell::Double(v)) => ptr::write_unaligned(target as *mut f64, *v),
            (CDataType::TYPE_DATE, MockCell::Date(v)) => {
                ptr::write_unaligned(target as *mut SqlDate, *v)
            }
            (CDataType::SS_TIME2, MockCell::Time(v)) => {
                ptr::write_unaligned(target as *mut SqlTime2, *v)
            }
            (CDataType::TYPE_TIMESTAMP, MockCell::Timestamp(v)) => {
                ptr::write_unaligned(target as *mut SqlTimestamp, *v)
            }
            (CDataType::SS_TIMESTAMPOFFSET, MockCell::Offset(v)) => {
                ptr::write_unaligned(target as *mut SqlTimestampOffset, *v)
            }
            (CDataType::GUID, MockCell::Guid(v)) => {
                ptr::write_unaligned(target as *mut SqlGuid, *v)
            }
            _ => return None,
        }
        fixed_size(c_type)
    }
}

impl NativeApi for MockDriver {
    fn alloc_handle(&self, kind: HandleKind, parent: Handle, output: &mut Handle) -> SqlReturn {
        let mut state = self.begin("SQLAllocHandle", parent);
        if state.failing_allocations.contains(&kind) {
            return fail(&mut state, parent, "HY013", "Memory management error");
        }
        match kind {
            HandleKind::Environment => {}
            HandleKind::Connection => {
                if state.live.get(&parent.id()) != Some(&HandleKind::Environment) {
                    return SqlReturn::INVALID_HANDLE;
                }
            }
            HandleKind::Statement => {
                if !state
                    .connections
                    .get(&parent.id())
                    .is_some_and(|v| v.connected)
                {
                    return fail(&mut state, parent, "08003", "Connection not open");
                }
            }
            HandleKind::Descriptor => return SqlReturn::ERROR,
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, kind);
        match kind {
            HandleKind::Connection => {
                state.connections.insert(id, MockConnection::default());
            }
            HandleKind::Statement => {
                state.statements.insert(id, MockStatement::default());
            }
            _ => {}
        }
        *output = Handle::from_id(id);
        SqlReturn::SUCCESS
    }

    fn free_handle(&self, kind: HandleKind, handle: Handle) -> SqlReturn {
        let mut state = self.begin("SQLFreeHandle", handle);
        *state.free_calls.entry(handle.id()).or_default() += 1;
        if state.live.get(&handle.id()) != Some(&kind) {
            return SqlReturn::INVALID_HANDLE;
        }
        if kind == HandleKind::Connection
            && state.connections.get(&handle.id()).is_some_and(|v| v.connected)
        {
            return fail(&mut state, handle, "HY010", "Function sequence error");
        }
        state.live.remove(&handle.id());
        state.connections.remove(&handle.id());
        state.statements.remove(&handle.id());
        SqlReturn::SUCCESS
    }

    fn set_env_attr(&self, env: Handle, attribute: i32, value: usize) -> SqlReturn {
        let mut state = self.begin("SQLSetEnvAttr", env);
        state.env_attributes.push((attribute, value));
        SqlReturn::SUCCESS
    }

    fn set_connect_attr(&self, conn: Handle, attribute: i32, value: usize) -> SqlReturn {
        let mut state = self.begin("SQLSetConnectAttr", conn);
        let Some(connection) = state.connections.get_mut(&conn.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        connection.attributes.insert(attribute, value);
        SqlReturn::SUCCESS
    }

    fn driver_connect(&self, conn: Handle, connection_string: &[u16]) -> SqlReturn {
        let mut state = self.begin("SQLDriverConnect", conn);
        let string = String::from_utf16_lossy(connection_string);
        state.connection_strings.push(string);
        if let Some(error) = state.connect_error.clone() {
            state.diagnostics.insert(conn.id(), vec![error]);
            return SqlReturn::ERROR;
        }
        let Some(connection) = state.connections.get_mut(&conn.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if connection.connected {
            return fail(&mut state, conn, "08002", "Connection name in use");
        }
        connection.connected = true;
        SqlReturn::SUCCESS
    }

    fn disconnect(&self, conn: Handle) -> SqlReturn {
        let mut state = self.begin("SQLDisconnect", conn);
        let Some(connection) = state.connections.get_mut(&conn.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if !connection.connected {
            return fail(&mut state, conn, "08003", "Connection not open");
        }
        connection.connected = false;
        SqlReturn::SUCCESS
    }

    fn end_tran(
        &self,
        kind: HandleKind,
        handle: Handle,
        completion: CompletionType,
    ) -> SqlReturn {
        let mut state = self.begin("SQLEndTran", handle);
        if kind != HandleKind::Connection
            || !state
                .connections
                .get(&handle.id())
                .is_some_and(|v| v.connected)
        {
            return fail(&mut state, handle, "08003", "Connection not open");
        }
        state.transactions.push(completion);
        SqlReturn::SUCCESS
    }

    fn set_stmt_attr(&self, stmt: Handle, attribute: i32, value: usize) -> SqlReturn {
        let mut state = self.begin("SQLSetStmtAttr", stmt);
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if attribute == Attribute::SS_PARAM_FOCUS {
            statement.focus = value as u16;
        }
        statement.attributes.insert(attribute, value);
        SqlReturn::SUCCESS
    }

    fn prepare(&self, stmt: Handle, sql: &[u16]) -> SqlReturn {
        let mut state = self.begin("SQLPrepare", stmt);
        let sql = String::from_utf16_lossy(sql);
        if !state.scripts.contains_key(sql.trim()) {
            let diagnostic = unscripted(&sql);
            state.diagnostics.insert(stmt.id(), vec![diagnostic]);
            return SqlReturn::ERROR;
        }
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        statement.prepared = Some(sql);
        statement.cursor = None;
        SqlReturn::SUCCESS
    }

    fn exec_direct(&self, stmt: Handle, sql: &[u16]) -> SqlReturn {
        drop(self.begin("SQLExecDirect", stmt));
        self.execute_sql(stmt, Some(sql))
    }

    fn execute(&self, stmt: Handle) -> SqlReturn {
        drop(self.begin("SQLExecute", stmt));
        self.execute_sql(stmt, None)
    }

    unsafe fn bind_parameter(&self, stmt: Handle, binding: &ParameterBinding) -> SqlReturn {
        let mut state = self.begin("SQLBindParameter", stmt);
        if binding.index == 0 {
            return fail(&mut state, stmt, "07009", "Invalid descriptor index");
        }
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        if statement.focus == 0 {
            statement.bindings.insert(binding.index, *binding);
        } else {
            statement
                .table_columns
                .entry(statement.focus)
                .or_default()
                .insert(binding.index, *binding);
        }
        SqlReturn::SUCCESS
    }

    fn set_param_descriptor_text(
        &self,
        stmt: Handle,
        record: i16,
        field: i16,
        value: &[u16],
    ) -> SqlReturn {
        let mut state = self.begin("SQLSetDescField", stmt);
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        statement
            .table_names
            .insert((record as u16, field), String::from_utf16_lossy(value));
        SqlReturn::SUCCESS
    }

    unsafe fn set_param_numeric(
        &self,
        stmt: Handle,
        record: u16,
        precision: i16,
        scale: i16,
        _data: *mut c_void,
    ) -> SqlReturn {
        let mut state = self.begin("SQLSetDescField", stmt);
        state.numeric_descriptors.push((record, precision, scale));
        SqlReturn::SUCCESS
    }

    fn num_result_cols(&self, stmt: Handle, count: &mut i16) -> SqlReturn {
        let mut state = self.begin("SQLNumResultCols", stmt);
        match Self::metadata(&state, stmt) {
            Some(columns) => {
                *count = columns.len() as i16;
                SqlReturn::SUCCESS
            }
            None => fail(&mut state, stmt, "HY010", "Function sequence error"),
        }
    }

    fn describe_col(
        &self,
        stmt: Handle,
        column: u16,
        description: &mut ColumnDescription,
    ) -> SqlReturn {
        let mut state = self.begin("SQLDescribeCol", stmt);
        let Some(definition) = Self::metadata(&state, stmt)
            .and_then(|v| v.get((column as usize).wrapping_sub(1)).cloned())
        else {
            return fail(&mut state, stmt, "07009", "Invalid descriptor index");
        };
        *description = ColumnDescription {
            name: definition.name.encode_utf16().collect(),
            data_type: definition.sql_type.code(),
            column_size: definition.size,
            decimal_digits: definition.decimal_digits,
            nullable: definition.nullable as i16,
        };
        SqlReturn::SUCCESS
    }

    fn col_attribute_text(
        &self,
        stmt: Handle,
        column: u16,
        field: i16,
        output: &mut Vec<u16>,
    ) -> SqlReturn {
        let mut state = self.begin("SQLColAttribute", stmt);
        let Some(definition) = Self::metadata(&state, stmt)
            .and_then(|v| v.get((column as usize).wrapping_sub(1)).cloned())
        else {
            return fail(&mut state, stmt, "07009", "Invalid descriptor index");
        };
        if field != DescField::TYPE_NAME {
            return fail(&mut state, stmt, "HY091", "Invalid descriptor field identifier");
        }
        let name = if definition.type_name.is_empty() {
            definition.sql_type.to_string()
        } else {
            definition.type_name
        };
        *output = name.encode_utf16().collect();
        SqlReturn::SUCCESS
    }

    fn row_count(&self, stmt: Handle, count: &mut Len) -> SqlReturn {
        let mut state = self.begin("SQLRowCount", stmt);
        let affected = state
            .statements
            .get(&stmt.id())
            .and_then(|v| v.cursor.as_ref())
            .map(|v| v.current.affected);
        match affected {
            Some(affected) => {
                *count = affected as Len;
                SqlReturn::SUCCESS
            }
            None => fail(&mut state, stmt, "HY010", "Function sequence error"),
        }
    }

    fn fetch(&self, stmt: Handle) -> SqlReturn {
        let (delay, cancel) = {
            let mut state = self.begin("SQLFetch", stmt);
            let Some(statement) = state.statements.get(&stmt.id()) else {
                return SqlReturn::INVALID_HANDLE;
            };
            let delay = statement.cursor.as_ref().map(|v| v.fetch_delay);
            let cancel = statement.cancel.clone();
            match delay {
                Some(delay) => (delay, cancel),
                None => return fail(&mut state, stmt, "24000", "Invalid cursor state"),
            }
        };
        if !wait(delay, &cancel) {
            let mut state = self.state.lock();
            return fail(&mut state, stmt, "HY008", "Operation canceled");
        }
        let mut state = self.state.lock();
        let Some(cursor) = state
            .statements
            .get_mut(&stmt.id())
            .and_then(|v| v.cursor.as_mut())
        else {
            return fail(&mut state, stmt, "24000", "Invalid cursor state");
        };
        if cursor.current.columns.is_empty() {
            return fail(&mut state, stmt, "24000", "Invalid cursor state");
        }
        let next = cursor.row.map_or(0, |v| v + 1);
        cursor.consumed.clear();
        if next >= cursor.current.rows.len() {
            cursor.row = Some(cursor.current.rows.len());
            return SqlReturn::NO_DATA;
        }
        cursor.row = Some(next);
        SqlReturn::SUCCESS
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
        let mut state = self.begin("SQLGetData", stmt);
        let Some(cursor) = state
            .statements
            .get_mut(&stmt.id())
            .and_then(|v| v.cursor.as_mut())
        else {
            return fail(&mut state, stmt, "24000", "Invalid cursor state");
        };
        let Some(cell) = cursor
            .row
            .and_then(|row| cursor.current.rows.get(row))
            .and_then(|row| row.get((column as usize).wrapping_sub(1)))
            .cloned()
        else {
            return fail(&mut state, stmt, "07009", "Invalid descriptor index");
        };
        unsafe {
            if cell == MockCell::Null {
                *indicator = NULL_DATA;
                return SqlReturn::SUCCESS;
            }
            if fixed_size(c_type).is_some() {
                return match write_fixed(&cell, c_type, target) {
                    Some(size) => {
                        *indicator = size as Len;
                        SqlReturn::SUCCESS
                    }
                    None => fail(
                        &mut state,
                        stmt,
                        "07006",
                        "Restricted data type attribute violation",
                    ),
                };
            }
            let Some(bytes) = variable_bytes(&cell, c_type) else {
                return fail(
                    &mut state,
                    stmt,
                    "07006",
                    "Restricted data type attribute violation",
                );
            };
            let offset = cursor.consumed.get(&column).copied();
            if offset.is_some_and(|v| v >= bytes.len()) {
                return SqlReturn::NO_DATA;
            }
            let offset = offset.unwrap_or(0);
            let terminator = match c_type {
                CDataType::CHAR => 1,
                CDataType::WCHAR => 2,
                _ => 0,
            };
            let remaining = bytes.len() - offset;
            let mut room = (buffer_length.max(0) as usize).saturating_sub(terminator);
            if c_type == CDataType::WCHAR {
                room -= room % 2;
            }
            let n = remaining.min(room);
            let target = target as *mut u8;
            ptr::copy_nonoverlapping(bytes[offset..].as_ptr(), target, n);
            for i in 0..terminator {
                *target.add(n + i) = 0;
            }
            *indicator = remaining as Len;
            cursor.consumed.insert(column, offset + n);
            if n < remaining {
                state
                    .diagnostics
                    .entry(stmt.id())
                    .or_default()
                    .push(Diagnostic::new("01004", 0, "String data, right truncated"));
                return SqlReturn::SUCCESS_WITH_INFO;
            }
        }
        SqlReturn::SUCCESS
    }

    fn more_results(&self, stmt: Handle) -> SqlReturn {
        let mut state = self.begin("SQLMoreResults", stmt);
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let Some(cursor) = statement.cursor.as_mut() else {
            return SqlReturn::NO_DATA;
        };
        match cursor.pending.pop_front() {
            Some(next) => {
                cursor.current = next;
                cursor.row = None;
                cursor.consumed.clear();
                SqlReturn::SUCCESS
            }
            None => {
                statement.cursor = None;
                SqlReturn::NO_DATA
            }
        }
    }

    fn free_stmt(&self, stmt: Handle, option: FreeStmtOption) -> SqlReturn {
        let mut state = self.begin("SQLFreeStmt", stmt);
        let Some(statement) = state.statements.get_mut(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        match option {
            FreeStmtOption::Close => statement.cursor = None,
            FreeStmtOption::ResetParams => {
                statement.bindings.clear();
                statement.table_columns.clear();
                statement.table_names.clear();
            }
            FreeStmtOption::Unbind => {}
        }
        SqlReturn::SUCCESS
    }

    fn cancel(&self, stmt: Handle) -> SqlReturn {
        let mut state = self.state.lock();
        *state.calls.entry("SQLCancel").or_default() += 1;
        let Some(statement) = state.statements.get(&stmt.id()) else {
            return SqlReturn::INVALID_HANDLE;
        };
        statement.cancel.store(true, Ordering::Release);
        SqlReturn::SUCCESS
    }

    fn diag_record(&self, _kind: HandleKind, handle: Handle, record: i16) -> Option<Diagnostic> {
        let state = self.state.lock();
        state
            .diagnostics
            .get(&handle.id())?
            .get((record as usize).checked_sub(1)?)
            .cloned()
    }
}

unsafe fn read_bcp_cell(binding: &BcpBinding) -> MockCell {
    unsafe {
        let base = binding.data as *const u8;
        let indicator = match binding.indicator_len {
            8 => read::<i64>(base, 0),
            4 => read::<i32>(base, 0) as i64,
            _ => binding.data_len as i64,
        };
        if indicator == NULL_DATA as i64 {
            return MockCell::Null;
        }
        let data = base.add(binding.indicator_len.max(0) as usize);
        let len = if binding.data_len == Bcp::VARLEN_DATA {
            indicator.max(0) as usize
        } else {
            binding.data_len.max(0) as usize
        };
        match binding.data_type {
            Bcp::SQLINT1 | Bcp::SQLBIT => MockCell::Int(read::<u8>(data, 0) as i64),
            Bcp::SQLINT2 => MockCell::Int(read::<i16>(data, 0) as i64),
            Bcp::SQLINT4 => MockCell::Int(read::<i32>(data, 0) as i64),
            Bcp::SQLINT8 => MockCell::Int(read::<i64>(data, 0)),
            Bcp::SQLFLT8 => MockCell::Double(read::<f64>(data, 0)),
            Bcp::SQLNUMERICN | Bcp::SQLDECIMALN => MockCell::Numeric(read(data, 0)),
            Bcp::SQLDATEN => MockCell::Date(read(data, 0)),
            Bcp::SQLTIMEN => MockCell::Time(read(data, 0)),
            Bcp::SQLDATETIME2N => MockCell::Timestamp(read(data, 0)),
            Bcp::SQLDATETIMEOFFSETN => MockCell::Offset(read(data, 0)),
            Bcp::SQLNVARCHAR => {
                let units = (0..len / 2)
                    .map(|i| read::<u16>(data, i * 2))
                    .collect::<Vec<_>>();
                MockCell::Text(String::from_utf16_lossy(&units))
            }
            Bcp::SQLVARCHAR | Bcp::SQLBIGVARCHAR => MockCell::Text(
                String::from_utf8_lossy(std::slice::from_raw_parts(data, len)).into_owned(),
            ),
            _ => MockCell::Bytes(std::slice::from_raw_parts(data, len).to_vec()),
        }
    }
}

impl BcpApi for MockDriver {
    fn init(&self, conn: Handle, table: &[u16], direction: i32) -> i16 {
        let mut state = self.begin("bcp_initW", conn);
        let enabled = state.connections.get(&conn.id()).is_some_and(|v| {
            v.connected && v.attributes.get(&Attribute::SS_BCP) == Some(&Attribute::SS_BCP_ON)
        });
        if !enabled || direction != Bcp::DB_IN {
            let message = "Bulk copy is not enabled on this connection";
            fail(&mut state, conn, "HY000", message);
            return Bcp::FAIL;
        }
        let fail_row = state.bcp_pending_fail.take();
        state.bcp = BcpState {
            table: Some(String::from_utf16_lossy(table)),
            fail_row,
            ..Default::default()
        };
        Bcp::SUCCEED
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
        let mut state = self.begin("bcp_bind", conn);
        if state.bcp.table.is_none() || column < 1 {
            fail(&mut state, conn, "HY010", "Function sequence error");
            return Bcp::FAIL;
        }
        state.bcp.bindings.insert(
            column,
            BcpBinding {
                data: data as usize,
                indicator_len,
                data_len,
                data_type,
            },
        );
        Bcp::SUCCEED
    }

    fn send_row(&self, conn: Handle) -> i16 {
        let mut state = self.begin("bcp_sendrow", conn);
        if state.bcp.finished || state.bcp.table.is_none() {
            fail(&mut state, conn, "HY010", "Function sequence error");
            return Bcp::FAIL;
        }
        if state.bcp.fail_row == Some(state.bcp.rows.len()) {
            fail(&mut state, conn, "22003", "Numeric value out of range");
            return Bcp::FAIL;
        }
        // SAFETY: the staging buffers stay bound until the bulk copy is done
        let row = state
            .bcp
            .bindings
            .values()
            .map(|v| unsafe { read_bcp_cell(v) })
            .collect();
        state.bcp.rows.push(row);
        Bcp::SUCCEED
    }

    fn batch(&self, conn: Handle) -> i32 {
        let mut state = self.begin("bcp_batch", conn);
        let pending = state.bcp.rows.len() - state.bcp.committed;
        state.bcp.committed = state.bcp.rows.len();
        pending as i32
    }

    fn done(&self, conn: Handle) -> i32 {
        let mut state = self.begin("bcp_done", conn);
        if state.bcp.finished {
            return -1;
        }
        let pending = state.bcp.rows.len() - state.bcp.committed;
        state.bcp.committed = state.bcp.rows.len();
        state.bcp.finished = true;
        pending as i32
    }

    fn control(&self, conn: Handle, option: i32, value: isize) -> i16 {
        let mut state = self.begin("bcp_control", conn);
        state.bcp.controls.push((option, value));
        Bcp::SUCCEED
    }

    fn missing(&self) -> &[&'static str] {
        &self.bcp_missing
    }
}

/// Shared handle to a fake driver, usable both as [`NativeApi`] and [`BcpApi`].
pub fn mock_driver() -> Arc<MockDriver> {
    Arc::new(MockDriver::new())
}
