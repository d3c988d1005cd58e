use crate::{
    BoundParameter, ColumnReader, NativeHandle, bind_parameters, bind_table, check,
    marshal::decode_utf16,
};
use sluice_core::{
    ColumnDefinition, Context, Error, Failure, ParamSpec, QueryOptions, QueryResult, Result,
    SqlType, StatementHandle, StatementState, TableSpec, Value, find_failure,
    native::{
        Attribute, CDataType, DescField, FreeStmtOption, Handle, HandleKind, Len, NativeApi,
        Nullability, SqlReturn, to_wide,
    },
    truncate_long,
};
use std::{
    fmt::{self, Debug},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

/// State and cancellation flag of a statement, shared with the threads that may cancel it.
pub struct StatementControl {
    state: AtomicU8,
    cancelled: AtomicBool,
    handle: Arc<NativeHandle>,
}

impl StatementControl {
    pub fn new(handle: Arc<NativeHandle>) -> Self {
        Self {
            state: AtomicU8::new(StatementState::Created as u8),
            cancelled: AtomicBool::new(false),
            handle,
        }
    }

    /// Current state, a pending cancellation is reported as [`StatementState::Cancelled`].
    pub fn state(&self) -> StatementState {
        let state = self.stored();
        if self.is_cancelled()
            && matches!(
                state,
                StatementState::Executing | StatementState::FetchingRows
            )
        {
            return StatementState::Cancelled;
        }
        state
    }

    fn stored(&self) -> StatementState {
        StatementState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: StatementState) {
        log::trace!("Statement {:?} -> {state}", self.handle.raw());
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request the cancellation of the running operation.
    ///
    /// Only an executing or fetching statement can be cancelled. The flag stops the statement
    /// at its next native call, the native cancel interrupts the call in progress. Never
    /// waits for the running operation.
    pub fn cancel(&self) -> bool {
        let state = self.stored();
        if !matches!(
            state,
            StatementState::Executing | StatementState::FetchingRows
        ) {
            log::debug!("Ignoring the cancellation of a statement in state {state}");
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        let raw = self.handle.raw();
        if !raw.is_null() {
            let api = self.handle.api();
            let ret = api.cancel(raw);
            if let Err(error) = check(api.as_ref(), ret, HandleKind::Statement, raw, "SQLCancel") {
                log::warn!("{:#}", error);
            }
        }
        true
    }
}

impl Debug for StatementControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementControl")
            .field("state", &self.stored())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The lifecycle shared by every statement variant.
pub struct StatementCore {
    id: StatementHandle,
    handle: Arc<NativeHandle>,
    api: Arc<dyn NativeApi>,
    control: Arc<StatementControl>,
    sql: Arc<str>,
    options: QueryOptions,
    params: Vec<BoundParameter>,
    paramset_size: usize,
    columns: Arc<[ColumnDefinition]>,
    executed: bool,
    end_of_results: bool,
    fetched: i64,
}

impl StatementCore {
    pub fn new(
        id: StatementHandle,
        handle: Arc<NativeHandle>,
        sql: impl Into<Arc<str>>,
        options: QueryOptions,
    ) -> Self {
        Self {
            id,
            api: handle.api().clone(),
            control: Arc::new(StatementControl::new(handle.clone())),
            handle,
            sql: sql.into(),
            options,
            params: Vec::new(),
            paramset_size: 0,
            columns: Arc::new([]),
            executed: false,
            end_of_results: false,
            fetched: 0,
        }
    }

    pub fn id(&self) -> StatementHandle {
        self.id
    }

    pub fn sql(&self) -> &Arc<str> {
        &self.sql
    }

    pub fn handle(&self) -> &Arc<NativeHandle> {
        &self.handle
    }

    pub fn control(&self) -> &Arc<StatementControl> {
        &self.control
    }

    pub fn state(&self) -> StatementState {
        self.control.state()
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: QueryOptions) {
        self.options = options;
    }

    pub fn columns(&self) -> &Arc<[ColumnDefinition]> {
        &self.columns
    }

    /// Parameters bound by the last execute.
    pub fn parameters(&self) -> &[BoundParameter] {
        &self.params
    }

    pub fn paramset_size(&self) -> usize {
        self.paramset_size
    }

    /// Run `f`, on failure the statement moves to Error (or Cancelled) and the error is logged.
    fn track<T>(
        &mut self,
        action: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        f(self).map_err(|error| {
            match find_failure(&error) {
                Some(Failure::Cancelled) => self.control.set(StatementState::Cancelled),
                Some(Failure::State { .. }) => {}
                _ => self.control.set(StatementState::Error),
            }
            let error = error.context(format!(
                "While {action} statement {}:\n{}",
                self.id,
                truncate_long!(self.sql)
            ));
            log::error!("{:#}", error);
            error
        })
    }

    /// The native handle if another native call is allowed.
    fn guard(&self, operation: &'static str) -> Result<Handle> {
        let state = self.control.stored();
        if state.is_terminal() {
            return Err(Failure::state(operation, state).into());
        }
        if self.control.is_cancelled() {
            self.control.set(StatementState::Cancelled);
            return Err(Failure::Cancelled.into());
        }
        let raw = self.handle.raw();
        if raw.is_null() {
            return Err(Failure::state(operation, "Released").into());
        }
        Ok(raw)
    }

    fn call(&self, raw: Handle, ret: SqlReturn, operation: &'static str) -> Result<SqlReturn> {
        check(self.api.as_ref(), ret, HandleKind::Statement, raw, operation)
    }

    fn apply_options(&self, raw: Handle) -> Result<()> {
        if self.options.query_timeout > 0 {
            let ret = self.api.set_stmt_attr(
                raw,
                Attribute::QUERY_TIMEOUT,
                self.options.query_timeout as usize,
            );
            self.call(raw, ret, "SQLSetStmtAttr")?;
        }
        Ok(())
    }

    /// Marshal `specs` and bind the buffers, the previous parameters are reset first.
    fn bind(&mut self, raw: Handle, specs: &[ParamSpec]) -> Result<()> {
        let ret = self.api.free_stmt(raw, FreeStmtOption::ResetParams);
        self.call(raw, ret, "SQLFreeStmt")?;
        self.params.clear();
        let (params, rows) = bind_parameters(specs)?;
        self.params = params;
        self.paramset_size = rows;
        let ret = self.api.set_stmt_attr(
            raw,
            Attribute::PARAM_BIND_TYPE,
            Attribute::PARAM_BIND_BY_COLUMN,
        );
        self.call(raw, ret, "SQLSetStmtAttr")?;
        let ret = self.api.set_stmt_attr(raw, Attribute::PARAMSET_SIZE, rows);
        self.call(raw, ret, "SQLSetStmtAttr")?;
        let api = self.api.clone();
        for parameter in self.params.iter_mut() {
            bind_native(api.as_ref(), raw, parameter)?;
        }
        Ok(())
    }

    fn run_native(&mut self, raw: Handle, direct: bool) -> Result<()> {
        self.control.set(StatementState::Executing);
        self.executed = false;
        self.end_of_results = false;
        self.fetched = 0;
        let (ret, operation) = if direct {
            (self.api.exec_direct(raw, &to_wide(&self.sql)), "SQLExecDirect")
        } else {
            (self.api.execute(raw), "SQLExecute")
        };
        self.call(raw, ret, operation)?;
        self.executed = true;
        Ok(())
    }

    fn describe_columns(&self, raw: Handle) -> Result<Arc<[ColumnDefinition]>> {
        let mut count: i16 = 0;
        let ret = self.api.num_result_cols(raw, &mut count);
        self.call(raw, ret, "SQLNumResultCols")?;
        (1..=count.max(0) as u16)
            .map(|column| {
                let mut description = Default::default();
                let ret = self.api.describe_col(raw, column, &mut description);
                self.call(raw, ret, "SQLDescribeCol")?;
                let name = decode_utf16(&description.name).map_err(|e| {
                    Error::from(Failure::decode(
                        column as usize,
                        format!("invalid column name: {e}"),
                    ))
                })?;
                let mut type_name = Vec::new();
                let ret =
                    self.api
                        .col_attribute_text(raw, column, DescField::TYPE_NAME, &mut type_name);
                let type_name = if ret.is_success() {
                    String::from_utf16_lossy(&type_name)
                } else {
                    String::new()
                };
                Ok(ColumnDefinition {
                    name,
                    sql_type: SqlType::from_code(description.data_type),
                    size: description.column_size,
                    decimal_digits: description.decimal_digits,
                    type_name,
                    ..Default::default()
                }
                .with_nullability(Nullability::from_code(description.nullable)))
            })
            .collect()
    }

    /// Describe the current result set, statements without columns report the affected rows.
    fn describe(&mut self, raw: Handle) -> Result<QueryResult> {
        self.columns = self.describe_columns(raw)?;
        if self.columns.is_empty() {
            let mut affected: Len = -1;
            let ret = self.api.row_count(raw, &mut affected);
            self.call(raw, ret, "SQLRowCount")?;
            self.control.set(StatementState::FetchComplete);
            return Ok(QueryResult::affected(affected as i64));
        }
        self.control.set(StatementState::FetchingRows);
        Ok(QueryResult {
            columns: self.columns.clone(),
            ..Default::default()
        })
    }

    /// Describe the current result set and fetch its first batch.
    fn open_result(&mut self) -> Result<QueryResult> {
        let raw = self.guard("describe")?;
        let result = self.describe(raw)?;
        if self.control.stored() == StatementState::FetchingRows {
            return self.read_batch(self.options.batch_size);
        }
        Ok(result)
    }

    fn read_batch(&mut self, max: usize) -> Result<QueryResult> {
        self.guard("fetch from")?;
        let state = self.control.stored();
        match state {
            StatementState::FetchingRows => {}
            StatementState::FetchComplete if self.executed => {
                return Ok(QueryResult {
                    columns: self.columns.clone(),
                    end_of_rows: true,
                    end_of_results: self.end_of_results,
                    row_count: self.fetched,
                    ..Default::default()
                });
            }
            _ => return Err(Failure::state("fetch from", state).into()),
        }
        let max = max.max(1);
        let mut rows = Vec::with_capacity(max.min(1024));
        let mut end_of_rows = false;
        while rows.len() < max {
            let raw = self.guard("fetch from")?;
            let ret = self.api.fetch(raw);
            if self.call(raw, ret, "SQLFetch")?.is_no_data() {
                end_of_rows = true;
                self.control.set(StatementState::FetchComplete);
                break;
            }
            let reader = ColumnReader::new(self.api.as_ref(), raw, self.options.chunk_size);
            rows.push(reader.read_row(&self.columns)?);
            self.fetched += 1;
        }
        Ok(QueryResult {
            columns: self.columns.clone(),
            rows,
            end_of_rows,
            end_of_results: self.end_of_results,
            row_count: self.fetched,
        })
    }

    fn close_cursor(&self, raw: Handle) -> Result<()> {
        let ret = self.api.free_stmt(raw, FreeStmtOption::Close);
        self.call(raw, ret, "SQLFreeStmt")?;
        Ok(())
    }

    /// Bind, execute and open the first result set.
    fn run(&mut self, specs: &[ParamSpec], direct: bool) -> Result<QueryResult> {
        let raw = self.guard("execute")?;
        self.apply_options(raw)?;
        self.bind(raw, specs)?;
        self.run_native(raw, direct)?;
        self.open_result()
    }

    pub fn fetch(&mut self, max: usize) -> Result<QueryResult> {
        self.track("fetching rows of", |core| core.read_batch(max))
    }

    /// Advance to the next result set and fetch its first batch.
    pub fn next_result(&mut self) -> Result<QueryResult> {
        self.track("advancing", |core| {
            let raw = core.guard("advance")?;
            if !core.executed {
                return Err(Failure::state("advance", core.control.stored()).into());
            }
            let ret = core.api.more_results(raw);
            if core.call(raw, ret, "SQLMoreResults")?.is_no_data() {
                core.end_of_results = true;
                core.columns = Arc::new([]);
                core.control.set(StatementState::FetchComplete);
                return Ok(QueryResult {
                    end_of_rows: true,
                    end_of_results: true,
                    row_count: -1,
                    ..Default::default()
                });
            }
            core.control.set(StatementState::Executing);
            core.fetched = 0;
            core.open_result()
        })
    }

    /// Values of the output parameters after a successful execute.
    pub fn unbind(&mut self) -> Result<Vec<Value>> {
        self.track("unbinding", |core| {
            let state = core.control.stored();
            if !core.executed || state.is_terminal() {
                return Err(Failure::state("unbind", state).into());
            }
            core.params
                .iter()
                .filter(|v| v.direction.is_output())
                .map(|v| v.decode_row(0))
                .collect()
        })
    }

    /// Close the cursor and release the parameters, the statement cannot be used anymore.
    pub fn close(&mut self) -> Result<()> {
        if self.control.stored() == StatementState::Closed {
            return Ok(());
        }
        let raw = self.handle.raw();
        let result = if raw.is_null() {
            Ok(())
        } else {
            self.close_cursor(raw).and_then(|_| {
                let ret = self.api.free_stmt(raw, FreeStmtOption::ResetParams);
                self.call(raw, ret, "SQLFreeStmt").map(|_| ())
            })
        };
        self.params.clear();
        self.columns = Arc::new([]);
        self.control.set(StatementState::Closed);
        result.map_err(|error| {
            let error = error.context(format!("While closing statement {}", self.id));
            log::error!("{:#}", error);
            error
        })
    }
}

impl Debug for StatementCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCore")
            .field("id", &self.id)
            .field("state", &self.control.state())
            .field("sql", &format_args!("{}", truncate_long!(self.sql)))
            .finish()
    }
}

/// Bind one marshaled parameter, table parameters bind their columns under the focus.
fn bind_native(api: &dyn NativeApi, raw: Handle, parameter: &mut BoundParameter) -> Result<()> {
    let index = parameter.index;
    let binding = parameter.binding();
    // SAFETY: the buffers are owned by the statement and outlive the binding
    let ret = unsafe { api.bind_parameter(raw, &binding) };
    check(api, ret, HandleKind::Statement, raw, "SQLBindParameter")?;
    if parameter.c_type == CDataType::NUMERIC {
        // SAFETY: same value pointer as the bind call above
        let ret = unsafe {
            api.set_param_numeric(
                raw,
                index,
                parameter.column_size as i16,
                parameter.decimal_digits,
                binding.value,
            )
        };
        check(api, ret, HandleKind::Statement, raw, "SQLSetDescField")?;
    }
    let Some(table) = parameter.table.as_mut() else {
        return Ok(());
    };
    let record = index as i16;
    let ret = api.set_param_descriptor_text(raw, record, DescField::SS_TYPE_NAME, &table.type_name);
    check(api, ret, HandleKind::Statement, raw, "SQLSetDescField")?;
    if !table.schema.is_empty() {
        let ret = api.set_param_descriptor_text(raw, record, DescField::SS_SCHEMA_NAME, &table.schema);
        check(api, ret, HandleKind::Statement, raw, "SQLSetDescField")?;
    }
    let ret = api.set_stmt_attr(raw, Attribute::SS_PARAM_FOCUS, index as usize);
    check(api, ret, HandleKind::Statement, raw, "SQLSetStmtAttr")?;
    for column in table.columns.iter_mut() {
        bind_native(api, raw, column)?;
    }
    let ret = api.set_stmt_attr(raw, Attribute::SS_PARAM_FOCUS, 0);
    check(api, ret, HandleKind::Statement, raw, "SQLSetStmtAttr")?;
    Ok(())
}

/// Capability variants of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Transient,
    Prepared,
    Table,
}

/// A statement the connection can drive.
///
/// Variants only decide how the statement is executed, the rest of the lifecycle is
/// provided on top of [`StatementCore`].
pub trait Execute: Send {
    fn kind(&self) -> StatementKind;

    fn core(&self) -> &StatementCore;

    fn core_mut(&mut self) -> &mut StatementCore;

    /// Bind `params`, execute and return the first batch of rows.
    fn execute(&mut self, params: &[ParamSpec]) -> Result<QueryResult>;

    /// Compile the statement and describe its result columns.
    fn prepare(&mut self) -> Result<Arc<[ColumnDefinition]>> {
        let state = self.state();
        Err(Failure::state("prepare", format!("{state} ({:?})", self.kind())).into())
    }

    /// Attach the table-valued parameter.
    fn bind_tvp_columns(&mut self, table: TableSpec) -> Result<()> {
        let _ = table;
        let state = self.state();
        Err(Failure::state("bind table columns of", format!("{state} ({:?})", self.kind())).into())
    }

    fn fetch(&mut self, max: usize) -> Result<QueryResult> {
        self.core_mut().fetch(max)
    }

    fn next_result(&mut self) -> Result<QueryResult> {
        self.core_mut().next_result()
    }

    fn unbind(&mut self) -> Result<Vec<Value>> {
        self.core_mut().unbind()
    }

    fn close(&mut self) -> Result<()> {
        self.core_mut().close()
    }

    fn state(&self) -> StatementState {
        self.core().state()
    }

    fn control(&self) -> Arc<StatementControl> {
        self.core().control().clone()
    }
}

/// Single use statement executed directly.
#[derive(Debug)]
pub struct Transient {
    core: StatementCore,
}

impl Transient {
    pub fn new(core: StatementCore) -> Self {
        Self { core }
    }
}

impl Execute for Transient {
    fn kind(&self) -> StatementKind {
        StatementKind::Transient
    }

    fn core(&self) -> &StatementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StatementCore {
        &mut self.core
    }

    fn execute(&mut self, params: &[ParamSpec]) -> Result<QueryResult> {
        self.core.track("executing", |core| {
            let state = core.control.stored();
            if state != StatementState::Created {
                return Err(Failure::state("execute", state).into());
            }
            core.run(params, true)
        })
    }
}

/// Statement compiled once and executed any number of times.
#[derive(Debug)]
pub struct Prepared {
    core: StatementCore,
    prepared: bool,
}

impl Prepared {
    pub fn new(core: StatementCore) -> Self {
        Self {
            core,
            prepared: false,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
}

impl Execute for Prepared {
    fn kind(&self) -> StatementKind {
        StatementKind::Prepared
    }

    fn core(&self) -> &StatementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StatementCore {
        &mut self.core
    }

    fn prepare(&mut self) -> Result<Arc<[ColumnDefinition]>> {
        if self.prepared && !self.core.control.stored().is_terminal() {
            log::debug!("Statement {} is already prepared", self.core.id);
            return Ok(self.core.columns.clone());
        }
        let columns = self.core.track("preparing", |core| {
            let raw = core.guard("prepare")?;
            let ret = core.api.prepare(raw, &to_wide(&core.sql));
            core.call(raw, ret, "SQLPrepare")?;
            core.columns = core.describe_columns(raw)?;
            core.control.set(StatementState::Prepared);
            Ok(core.columns.clone())
        })?;
        self.prepared = true;
        Ok(columns)
    }

    fn execute(&mut self, params: &[ParamSpec]) -> Result<QueryResult> {
        let prepared = self.prepared;
        self.core.track("executing", |core| {
            let state = core.control.stored();
            match state {
                StatementState::Prepared if prepared => {}
                StatementState::FetchingRows | StatementState::FetchComplete if prepared => {
                    let raw = core.guard("execute")?;
                    core.close_cursor(raw)?;
                }
                _ => return Err(Failure::state("execute", state).into()),
            }
            core.run(params, false)
        })
    }
}

/// Statement whose first parameter is a table-valued parameter.
#[derive(Debug)]
pub struct Tvp {
    core: StatementCore,
    table: Option<TableSpec>,
}

impl Tvp {
    pub fn new(core: StatementCore) -> Self {
        Self { core, table: None }
    }

    pub fn table(&self) -> Option<&TableSpec> {
        self.table.as_ref()
    }
}

impl Execute for Tvp {
    fn kind(&self) -> StatementKind {
        StatementKind::Table
    }

    fn core(&self) -> &StatementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StatementCore {
        &mut self.core
    }

    fn bind_tvp_columns(&mut self, table: TableSpec) -> Result<()> {
        let spec = ParamSpec::table(table);
        bind_table(1, &spec)
            .with_context(|| format!("While binding the table of statement {}", self.core.id))
            .inspect_err(|e| log::error!("{:#}", e))?;
        self.table = spec.table;
        Ok(())
    }

    fn execute(&mut self, params: &[ParamSpec]) -> Result<QueryResult> {
        let table = self.table.clone();
        self.core.track("executing", |core| {
            let state = core.control.stored();
            let Some(table) = table else {
                return Err(Failure::state("execute", "Created (table columns unbound)").into());
            };
            if state != StatementState::Created {
                return Err(Failure::state("execute", state).into());
            }
            let specs = std::iter::once(ParamSpec::table(table))
                .chain(params.iter().cloned())
                .collect::<Vec<_>>();
            core.run(&specs, true)
        })
    }
}
