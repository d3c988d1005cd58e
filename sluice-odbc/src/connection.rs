use crate::{
    BcpLibrary, BulkColumn, BulkCopy, BulkOptions, ConnectionConfig, Dispatcher, Environment,
    Execute, HandleRegistry, Lane, NativeHandle, Prepared, StatementControl, StatementCore,
    StatementKind, Transient, Tvp, check,
};
use async_stream::try_stream;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use sluice_core::{
    ColumnDefinition, Context, Error, Failure, ParamSpec, QueryOptions, QueryResult, Result,
    RowLabeled, StatementHandle, StatementState, TableSpec, Value,
    native::{Attribute, BcpApi, CompletionType, Handle, HandleKind, NativeApi, SqlReturn, to_wide},
    truncate_long,
};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

static CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

type SharedStatement = Arc<Mutex<Box<dyn Execute>>>;

struct StatementEntry {
    statement: SharedStatement,
    control: Arc<StatementControl>,
}

/// The session state shared with the dispatched jobs.
struct Session {
    id: u32,
    api: Arc<dyn NativeApi>,
    handle: Arc<NativeHandle>,
    registry: HandleRegistry,
    /// Held exclusively by session operations, shared by statement operations.
    lock: RwLock<()>,
    connected: AtomicBool,
    in_transaction: AtomicBool,
    statements: Mutex<HashMap<u32, StatementEntry>>,
    config: Mutex<ConnectionConfig>,
    bcp: Mutex<Option<Arc<dyn BcpApi>>>,
    _environment: Arc<Environment>,
}

impl Session {
    fn call(&self, raw: Handle, ret: SqlReturn, operation: &'static str) -> Result<SqlReturn> {
        check(self.api.as_ref(), ret, HandleKind::Connection, raw, operation)
    }

    fn require_connected(&self, operation: &'static str) -> Result<Handle> {
        if !self.connected.load(Ordering::Acquire) {
            let error = Error::msg(format!(
                "Cannot {operation} on connection {}, it is not open",
                self.id
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(self.handle.raw())
    }

    /// Run a session operation, failures get the connection context and are logged.
    fn track<T>(&self, action: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        f().map_err(|error| {
            let error = error.context(format!("While {action} connection {}", self.id));
            log::error!("{:#}", error);
            error
        })
    }

    fn open(&self, connection_string: &str, timeout: u32) -> Result<bool> {
        let _session = self.lock.write();
        if self.connected.load(Ordering::Acquire) {
            log::warn!("Connection {} is already open", self.id);
            return Ok(false);
        }
        let config = ConnectionConfig::parse(connection_string)?;
        let timeout = if timeout > 0 {
            timeout
        } else {
            config.login_timeout
        };
        self.track("opening", || {
            let raw = self.handle.raw();
            if timeout > 0 {
                let ret = self
                    .api
                    .set_connect_attr(raw, Attribute::LOGIN_TIMEOUT, timeout as usize);
                self.call(raw, ret, "SQLSetConnectAttr")?;
            }
            if config.bulk_copy {
                let ret = self
                    .api
                    .set_connect_attr(raw, Attribute::SS_BCP, Attribute::SS_BCP_ON);
                self.call(raw, ret, "SQLSetConnectAttr")?;
            }
            let ret = self
                .api
                .driver_connect(raw, &to_wide(&config.connection_string()));
            self.call(raw, ret, "SQLDriverConnect")
                .with_context(|| format!("While connecting to `{config}`"))?;
            Ok(())
        })?;
        log::debug!("Connection {} open", self.id);
        self.connected.store(true, Ordering::Release);
        *self.config.lock() = config;
        Ok(true)
    }

    fn close(&self) -> Result<bool> {
        let _session = self.lock.write();
        if !self.connected.load(Ordering::Acquire) {
            return Ok(false);
        }
        let raw = self.handle.raw();
        if self.in_transaction.swap(false, Ordering::AcqRel) {
            log::warn!(
                "Connection {} closed with a transaction in progress, rolling back",
                self.id
            );
            if let Err(error) = self.end_transaction(raw, CompletionType::Rollback) {
                log::warn!("{:#}", error);
            }
        }
        let released = self.release_all();
        log::trace!("Connection {} released {released} statements", self.id);
        self.track("closing", || {
            let ret = self.api.disconnect(raw);
            self.call(raw, ret, "SQLDisconnect")?;
            Ok(())
        })?;
        self.connected.store(false, Ordering::Release);
        log::debug!("Connection {} closed", self.id);
        Ok(true)
    }

    fn release_all(&self) -> usize {
        let statements = self.statements.lock().drain().collect::<Vec<_>>();
        for (_, entry) in &statements {
            let _ = entry.statement.lock().close();
        }
        self.registry.clear()
    }

    /// Register a new statement under `statement_id`, a previous one is closed first.
    fn create(
        &self,
        statement_id: u32,
        sql: &str,
        options: QueryOptions,
        kind: StatementKind,
    ) -> Result<SharedStatement> {
        let previous = self.statements.lock().remove(&statement_id);
        if let Some(previous) = previous {
            log::debug!(
                "Statement {}:{statement_id} replaced by `{}`",
                self.id,
                truncate_long!(sql)
            );
            let _ = previous.statement.lock().close();
        }
        let handle = self.registry.checkout(statement_id)?;
        let core = StatementCore::new(
            StatementHandle::new(self.id, statement_id),
            handle,
            sql,
            options,
        );
        let statement: Box<dyn Execute> = match kind {
            StatementKind::Transient => Box::new(Transient::new(core)),
            StatementKind::Prepared => Box::new(Prepared::new(core)),
            StatementKind::Table => Box::new(Tvp::new(core)),
        };
        let control = statement.control();
        let statement = Arc::new(Mutex::new(statement));
        self.statements.lock().insert(
            statement_id,
            StatementEntry {
                statement: statement.clone(),
                control,
            },
        );
        Ok(statement)
    }

    fn statement(&self, statement_id: u32, operation: &'static str) -> Result<SharedStatement> {
        self.statements
            .lock()
            .get(&statement_id)
            .map(|v| v.statement.clone())
            .ok_or_else(|| {
                let error = Error::new(Failure::state(operation, "Released")).context(format!(
                    "Statement {}:{statement_id} does not exist",
                    self.id
                ));
                log::error!("{:#}", error);
                error
            })
    }

    fn execute_query(
        &self,
        statement_id: u32,
        sql: &str,
        parameters: &[ParamSpec],
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let _session = self.lock.read();
        self.require_connected("execute a query")?;
        let statement = self.create(statement_id, sql, options, StatementKind::Transient)?;
        let mut statement = statement.lock();
        statement.execute(parameters)
    }

    fn fetch_rows(&self, statement_id: u32, rows: usize) -> Result<QueryResult> {
        let _session = self.lock.read();
        let statement = self.statement(statement_id, "fetch from")?;
        let mut statement = statement.lock();
        let rows = if rows == 0 {
            statement.core().options().batch_size
        } else {
            rows
        };
        statement.fetch(rows)
    }

    fn next_result(&self, statement_id: u32) -> Result<QueryResult> {
        let _session = self.lock.read();
        let statement = self.statement(statement_id, "advance")?;
        let mut statement = statement.lock();
        statement.next_result()
    }

    fn cancel(&self, statement_id: u32) -> bool {
        let control = self
            .statements
            .lock()
            .get(&statement_id)
            .map(|v| v.control.clone());
        match control {
            Some(control) => control.cancel(),
            None => {
                log::debug!(
                    "Ignoring the cancellation of unknown statement {}:{statement_id}",
                    self.id
                );
                false
            }
        }
    }

    fn release_statement(&self, statement_id: u32) -> Result<bool> {
        let _session = self.lock.read();
        let Some(entry) = self.statements.lock().remove(&statement_id) else {
            log::debug!("Statement {}:{statement_id} is not registered", self.id);
            return Ok(false);
        };
        let closed = entry.statement.lock().close();
        self.registry.checkin(statement_id);
        closed.map(|_| true)
    }

    fn unbind_output_parameters(&self, statement_id: u32) -> Result<Vec<Value>> {
        let _session = self.lock.read();
        let statement = self.statement(statement_id, "unbind")?;
        let mut statement = statement.lock();
        statement.unbind()
    }

    fn prepare(
        &self,
        statement_id: u32,
        sql: &str,
        options: QueryOptions,
    ) -> Result<Arc<[ColumnDefinition]>> {
        let _session = self.lock.read();
        self.require_connected("prepare a statement")?;
        let existing = self
            .statements
            .lock()
            .get(&statement_id)
            .map(|v| v.statement.clone())
            .filter(|v| {
                let statement = v.lock();
                statement.kind() == StatementKind::Prepared
                    && &**statement.core().sql() == sql
                    && !statement.state().is_terminal()
            });
        let statement = match existing {
            Some(v) => v,
            None => self.create(statement_id, sql, options, StatementKind::Prepared)?,
        };
        let mut statement = statement.lock();
        statement.core_mut().set_options(options);
        statement.prepare()
    }

    fn execute_prepared(
        &self,
        statement_id: u32,
        parameters: &[ParamSpec],
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let _session = self.lock.read();
        self.require_connected("execute a prepared statement")?;
        let statement = self.statement(statement_id, "execute")?;
        let mut statement = statement.lock();
        statement.core_mut().set_options(options);
        statement.execute(parameters)
    }

    fn execute_table(
        &self,
        statement_id: u32,
        sql: &str,
        table: TableSpec,
        parameters: &[ParamSpec],
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let _session = self.lock.read();
        self.require_connected("execute a table statement")?;
        let statement = self.create(statement_id, sql, options, StatementKind::Table)?;
        let mut statement = statement.lock();
        statement.bind_tvp_columns(table)?;
        statement.execute(parameters)
    }

    fn end_transaction(&self, raw: Handle, completion: CompletionType) -> Result<()> {
        let ret = self.api.end_tran(HandleKind::Connection, raw, completion);
        self.call(raw, ret, "SQLEndTran")?;
        let ret = self
            .api
            .set_connect_attr(raw, Attribute::AUTOCOMMIT, Attribute::AUTOCOMMIT_ON);
        self.call(raw, ret, "SQLSetConnectAttr")?;
        Ok(())
    }

    fn begin_transaction(&self) -> Result<bool> {
        let _session = self.lock.write();
        let raw = self.require_connected("begin a transaction")?;
        self.track("beginning a transaction on", || {
            if self.in_transaction.load(Ordering::Acquire) {
                log::warn!("Connection {} already has a transaction in progress", self.id);
                return Ok(false);
            }
            let ret = self
                .api
                .set_connect_attr(raw, Attribute::AUTOCOMMIT, Attribute::AUTOCOMMIT_OFF);
            self.call(raw, ret, "SQLSetConnectAttr")?;
            self.in_transaction.store(true, Ordering::Release);
            Ok(true)
        })
    }

    fn finish_transaction(&self, completion: CompletionType) -> Result<bool> {
        let _session = self.lock.write();
        let action = match completion {
            CompletionType::Commit => "committing the transaction of",
            CompletionType::Rollback => "rolling back the transaction of",
        };
        let raw = self.require_connected("end a transaction")?;
        self.track(action, || {
            if !self.in_transaction.load(Ordering::Acquire) {
                log::warn!("Connection {} has no transaction in progress", self.id);
                return Ok(false);
            }
            self.end_transaction(raw, completion)?;
            self.in_transaction.store(false, Ordering::Release);
            Ok(true)
        })
    }

    fn bulk_library(&self) -> Result<Arc<dyn BcpApi>> {
        let mut bcp = self.bcp.lock();
        if let Some(library) = &*bcp {
            return Ok(library.clone());
        }
        let name = self.config.lock().bcp_library.clone();
        let library: Arc<dyn BcpApi> = BcpLibrary::load(name.as_deref())?;
        *bcp = Some(library.clone());
        Ok(library)
    }

    fn bulk_insert(
        &self,
        table: &str,
        columns: &[BulkColumn],
        options: BulkOptions,
    ) -> Result<u64> {
        let _session = self.lock.write();
        let raw = self.require_connected("bulk copy")?;
        if !self.config.lock().bulk_copy {
            let error = Error::msg(format!(
                "Bulk copy is not enabled on connection {}, open it with `bulk_copy=true`",
                self.id
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        let bcp = self.bulk_library()?;
        BulkCopy::new(bcp.as_ref(), self.api.as_ref(), raw)
            .with_options(options)
            .insert(table, columns)
    }

    /// Serve a request submitted in callback form.
    fn serve(&self, request: Request) -> Result<Response> {
        Ok(match request {
            Request::Open {
                connection_string,
                timeout,
            } => Response::Done(self.open(&connection_string, timeout)?),
            Request::Close => Response::Done(self.close()?),
            Request::Execute {
                statement_id,
                sql,
                parameters,
                options,
            } => Response::Result(self.execute_query(statement_id, &sql, &parameters, options)?),
            Request::Fetch { statement_id, rows } => {
                Response::Result(self.fetch_rows(statement_id, rows)?)
            }
            Request::NextResult { statement_id } => {
                Response::Result(self.next_result(statement_id)?)
            }
            Request::Cancel { statement_id } => Response::Done(self.cancel(statement_id)),
            Request::Release { statement_id } => {
                Response::Done(self.release_statement(statement_id)?)
            }
            Request::Unbind { statement_id } => {
                Response::Values(self.unbind_output_parameters(statement_id)?)
            }
            Request::Begin => Response::Done(self.begin_transaction()?),
            Request::Commit => Response::Done(self.finish_transaction(CompletionType::Commit)?),
            Request::Rollback => {
                Response::Done(self.finish_transaction(CompletionType::Rollback)?)
            }
            Request::Prepare {
                statement_id,
                sql,
                options,
            } => Response::Columns(self.prepare(statement_id, &sql, options)?),
            Request::ExecutePrepared {
                statement_id,
                parameters,
                options,
            } => Response::Result(self.execute_prepared(statement_id, &parameters, options)?),
            Request::ExecuteTable {
                statement_id,
                sql,
                table,
                parameters,
                options,
            } => Response::Result(self.execute_table(
                statement_id,
                &sql,
                table,
                &parameters,
                options,
            )?),
            Request::BulkInsert {
                table,
                columns,
                options,
            } => Response::Rows(self.bulk_insert(&table, &columns, options)?),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.connected.load(Ordering::Acquire) {
            let _ = self.close();
        }
    }
}

/// An operation submitted with [`OdbcConnection::submit`].
#[derive(Debug, Clone)]
pub enum Request {
    Open {
        connection_string: String,
        timeout: u32,
    },
    Close,
    Execute {
        statement_id: u32,
        sql: String,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    },
    Fetch {
        statement_id: u32,
        rows: usize,
    },
    NextResult {
        statement_id: u32,
    },
    Cancel {
        statement_id: u32,
    },
    Release {
        statement_id: u32,
    },
    Unbind {
        statement_id: u32,
    },
    Begin,
    Commit,
    Rollback,
    Prepare {
        statement_id: u32,
        sql: String,
        options: QueryOptions,
    },
    ExecutePrepared {
        statement_id: u32,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    },
    ExecuteTable {
        statement_id: u32,
        sql: String,
        table: TableSpec,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    },
    BulkInsert {
        table: String,
        columns: Vec<BulkColumn>,
        options: BulkOptions,
    },
}

impl Request {
    /// The lane serializing this request on connection `connection_id`.
    pub fn lane(&self, connection_id: u32) -> Lane {
        match self {
            Request::Open { .. }
            | Request::Close
            | Request::Begin
            | Request::Commit
            | Request::Rollback
            | Request::BulkInsert { .. } => Lane::Connection(connection_id),
            Request::Cancel { .. } => Lane::Detached,
            Request::Execute { statement_id, .. }
            | Request::Fetch { statement_id, .. }
            | Request::NextResult { statement_id }
            | Request::Release { statement_id }
            | Request::Unbind { statement_id }
            | Request::Prepare { statement_id, .. }
            | Request::ExecutePrepared { statement_id, .. }
            | Request::ExecuteTable { statement_id, .. } => {
                Lane::Statement(connection_id, *statement_id)
            }
        }
    }
}

/// Payload of a completed [`Request`].
#[derive(Debug, Clone)]
pub enum Response {
    Done(bool),
    Result(QueryResult),
    Values(Vec<Value>),
    Columns(Arc<[ColumnDefinition]>),
    Rows(u64),
}

/// One database session.
///
/// Native calls never run on the caller's thread: every operation is dispatched to the
/// blocking pool, statement operations on the lane of their statement and session operations
/// (open, close, transactions, bulk copy) on the lane of the connection.
pub struct OdbcConnection {
    session: Arc<Session>,
    dispatcher: Arc<Dispatcher>,
}

impl OdbcConnection {
    /// Allocate a connection handle under `environment`, the connection starts closed.
    pub fn new(environment: Arc<Environment>, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let api = environment.api().clone();
        let handle = HandleRegistry::allocate(
            &api,
            HandleKind::Connection,
            environment.handle().raw(),
        )
        .context("While allocating a connection")
        .inspect_err(|e| log::error!("{:#}", e))?;
        let id = CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            session: Arc::new(Session {
                id,
                api,
                registry: HandleRegistry::new(handle.clone()),
                handle,
                lock: RwLock::new(()),
                connected: AtomicBool::new(false),
                in_transaction: AtomicBool::new(false),
                statements: Default::default(),
                config: Default::default(),
                bcp: Default::default(),
                _environment: environment,
            }),
            dispatcher,
        })
    }

    /// Use `bcp` for bulk copies instead of loading the vendor library.
    pub fn with_bulk_copy(self, bcp: Arc<dyn BcpApi>) -> Self {
        *self.session.bcp.lock() = Some(bcp);
        self
    }

    pub fn id(&self) -> u32 {
        self.session.id
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected.load(Ordering::Acquire)
    }

    pub fn in_transaction(&self) -> bool {
        self.session.in_transaction.load(Ordering::Acquire)
    }

    /// Current state of `statement_id`, `None` when not registered.
    pub fn statement_state(&self, statement_id: u32) -> Option<StatementState> {
        self.session
            .statements
            .lock()
            .get(&statement_id)
            .map(|v| v.control.state())
    }

    /// Statements currently registered.
    pub fn statements(&self) -> usize {
        self.session.statements.lock().len()
    }

    /// Enqueue `operation` immediately, the future resolves with its result.
    fn run<T, F>(&self, lane: Lane, operation: F) -> impl Future<Output = Result<T>> + use<T, F>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
    {
        let session = self.session.clone();
        self.dispatcher.run(lane, move || operation(&session))
    }

    fn lane(&self, statement_id: u32) -> Lane {
        Lane::Statement(self.session.id, statement_id)
    }

    // Every operation below is enqueued when called, the returned future only waits for its
    // completion. Calls on the same statement (or on the session) complete in call order.

    pub fn open(
        &self,
        connection_string: impl Into<String>,
        timeout: u32,
    ) -> impl Future<Output = Result<bool>> {
        let connection_string = connection_string.into();
        self.run(Lane::Connection(self.id()), move |session| {
            session.open(&connection_string, timeout)
        })
    }

    /// Roll back the transaction in progress, release every statement and disconnect.
    pub fn close(&self) -> impl Future<Output = Result<bool>> {
        let result = self.run(Lane::Connection(self.id()), |session| session.close());
        self.dispatcher.retire_connection(self.id());
        result
    }

    /// Execute `sql` directly on a new statement registered as `statement_id`, resolves with
    /// the first batch of the first result set.
    pub fn execute_query(
        &self,
        statement_id: u32,
        sql: impl Into<String>,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    ) -> impl Future<Output = Result<QueryResult>> {
        let sql = sql.into();
        self.run(self.lane(statement_id), move |session| {
            session.execute_query(statement_id, &sql, &parameters, options)
        })
    }

    /// Next batch of at most `rows` rows, 0 uses the statement batch size.
    pub fn fetch_rows(
        &self,
        statement_id: u32,
        rows: usize,
    ) -> impl Future<Output = Result<QueryResult>> {
        self.run(self.lane(statement_id), move |session| {
            session.fetch_rows(statement_id, rows)
        })
    }

    pub fn next_result(&self, statement_id: u32) -> impl Future<Output = Result<QueryResult>> {
        self.run(self.lane(statement_id), move |session| {
            session.next_result(statement_id)
        })
    }

    /// Request the cancellation of the operation running on `statement_id`.
    ///
    /// Does not wait for the operations queued on the statement. Resolves with true when the
    /// statement was executing or fetching.
    pub fn cancel(&self, statement_id: u32) -> impl Future<Output = Result<bool>> {
        self.run(Lane::Detached, move |session| Ok(session.cancel(statement_id)))
    }

    /// Close `statement_id` and free its handle, false when it was not registered.
    pub fn release_statement(&self, statement_id: u32) -> impl Future<Output = Result<bool>> {
        let lane = self.lane(statement_id);
        let result = self.run(lane, move |session| session.release_statement(statement_id));
        self.dispatcher.retire(lane);
        result
    }

    /// Values of the output parameters of the last execute of `statement_id`.
    pub fn unbind_output_parameters(
        &self,
        statement_id: u32,
    ) -> impl Future<Output = Result<Vec<Value>>> {
        self.run(self.lane(statement_id), move |session| {
            session.unbind_output_parameters(statement_id)
        })
    }

    pub fn begin_transaction(&self) -> impl Future<Output = Result<bool>> {
        self.run(Lane::Connection(self.id()), |session| {
            session.begin_transaction()
        })
    }

    pub fn commit(&self) -> impl Future<Output = Result<bool>> {
        self.run(Lane::Connection(self.id()), |session| {
            session.finish_transaction(CompletionType::Commit)
        })
    }

    pub fn rollback(&self) -> impl Future<Output = Result<bool>> {
        self.run(Lane::Connection(self.id()), |session| {
            session.finish_transaction(CompletionType::Rollback)
        })
    }

    /// Compile `sql` as the prepared statement `statement_id`.
    ///
    /// Preparing the same text again on a live prepared statement is a no-op.
    pub fn prepare(
        &self,
        statement_id: u32,
        sql: impl Into<String>,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Arc<[ColumnDefinition]>>> {
        let sql = sql.into();
        self.run(self.lane(statement_id), move |session| {
            session.prepare(statement_id, &sql, options)
        })
    }

    pub fn execute_prepared(
        &self,
        statement_id: u32,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    ) -> impl Future<Output = Result<QueryResult>> {
        self.run(self.lane(statement_id), move |session| {
            session.execute_prepared(statement_id, &parameters, options)
        })
    }

    /// Execute `sql` with `table` as its first parameter, `parameters` follow it.
    pub fn execute_table(
        &self,
        statement_id: u32,
        sql: impl Into<String>,
        table: TableSpec,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    ) -> impl Future<Output = Result<QueryResult>> {
        let sql = sql.into();
        self.run(self.lane(statement_id), move |session| {
            session.execute_table(statement_id, &sql, table, &parameters, options)
        })
    }

    /// Execute `sql` and stream the rows of its first result set, the statement is released
    /// once the rows are exhausted.
    pub fn stream(
        &self,
        statement_id: u32,
        sql: impl Into<String>,
        parameters: Vec<ParamSpec>,
        options: QueryOptions,
    ) -> impl Stream<Item = Result<RowLabeled>> + Send + '_ {
        let sql = sql.into();
        try_stream! {
            let mut result = self
                .execute_query(statement_id, sql, parameters, options)
                .await?;
            loop {
                for row in result.labeled_rows() {
                    yield row;
                }
                if result.end_of_rows {
                    break;
                }
                result = self.fetch_rows(statement_id, options.batch_size).await?;
            }
            self.release_statement(statement_id).await?;
        }
    }

    /// Insert `columns` into `table` through the bulk copy interface, resolves with the rows
    /// sent.
    pub fn bulk_insert(
        &self,
        table: impl Into<String>,
        columns: Vec<BulkColumn>,
    ) -> impl Future<Output = Result<u64>> {
        self.bulk_insert_with(table, columns, BulkOptions::default())
    }

    pub fn bulk_insert_with(
        &self,
        table: impl Into<String>,
        columns: Vec<BulkColumn>,
        options: BulkOptions,
    ) -> impl Future<Output = Result<u64>> {
        let table = table.into();
        self.run(Lane::Connection(self.id()), move |session| {
            session.bulk_insert(&table, &columns, options)
        })
    }

    /// Callback form of the operations: `on_complete` runs exactly once, on the dispatch
    /// context of the dispatcher.
    pub fn submit<C>(&self, request: Request, on_complete: C)
    where
        C: FnOnce(Result<Response>) + Send + 'static,
    {
        let lane = request.lane(self.id());
        let retire = match &request {
            Request::Release { .. } => Some(false),
            Request::Close => Some(true),
            _ => None,
        };
        let session = self.session.clone();
        self.dispatcher
            .schedule(lane, move || session.serve(request), on_complete);
        match retire {
            Some(false) => {
                self.dispatcher.retire(lane);
            }
            Some(true) => {
                self.dispatcher.retire_connection(self.id());
            }
            None => {}
        }
    }
}

impl Debug for OdbcConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdbcConnection")
            .field("id", &self.session.id)
            .field("connected", &self.is_connected())
            .field("in_transaction", &self.in_transaction())
            .field("statements", &self.statements())
            .finish()
    }
}
