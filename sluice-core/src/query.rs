use crate::{ColumnDefinition, HostValue, Value};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    sync::Arc,
};

/// Key of a statement inside a connection, independent of the native handle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementHandle {
    pub connection_id: u32,
    pub statement_id: u32,
}

impl StatementHandle {
    pub fn new(connection_id: u32, statement_id: u32) -> Self {
        Self {
            connection_id,
            statement_id,
        }
    }
}

impl Display for StatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.statement_id)
    }
}

/// Lifecycle state of a statement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatementState {
    #[default]
    Created = 0,
    Prepared = 1,
    Executing = 2,
    FetchingRows = 3,
    FetchComplete = 4,
    Cancelled = 5,
    Error = 6,
    Closed = 7,
}

impl StatementState {
    pub fn from_u8(value: u8) -> StatementState {
        match value {
            0 => StatementState::Created,
            1 => StatementState::Prepared,
            2 => StatementState::Executing,
            3 => StatementState::FetchingRows,
            4 => StatementState::FetchComplete,
            5 => StatementState::Cancelled,
            6 => StatementState::Error,
            _ => StatementState::Closed,
        }
    }

    /// No transition leaves these states except close.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatementState::Cancelled | StatementState::Error | StatementState::Closed
        )
    }
}

impl Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type RowNames = Arc<[String]>;
/// Owned row value slice matching the columns length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

impl From<RowLabeled> for Row {
    fn from(value: RowLabeled) -> Self {
        value.values
    }
}

/// A batch of rows from one result set plus the cursor state.
#[derive(Debug, Default, Clone)]
pub struct QueryResult {
    pub columns: Arc<[ColumnDefinition]>,
    pub rows: Vec<Row>,
    /// The current result set has no more rows.
    pub end_of_rows: bool,
    /// No result set follows the current one.
    pub end_of_results: bool,
    /// Rows affected for statements without a result set, -1 when unknown.
    pub row_count: i64,
}

impl QueryResult {
    /// The result of a statement that produced no columns.
    pub fn affected(row_count: i64) -> Self {
        Self {
            end_of_rows: true,
            row_count,
            ..Default::default()
        }
    }

    pub fn labels(&self) -> RowNames {
        self.columns.iter().map(|v| v.name.clone()).collect()
    }

    pub fn labeled_rows(&self) -> impl Iterator<Item = RowLabeled> + '_ {
        let labels = self.labels();
        self.rows
            .iter()
            .map(move |row| RowLabeled::new(labels.clone(), row.clone()))
    }

    /// Rows as host objects keyed by column name.
    pub fn to_host(&self) -> Vec<HostValue> {
        self.rows
            .iter()
            .map(|row| {
                HostValue::Object(
                    self.columns
                        .iter()
                        .zip(row.iter())
                        .map(|(column, value)| (column.name.clone(), value.clone().into()))
                        .collect::<BTreeMap<_, _>>(),
                )
            })
            .collect()
    }
}
