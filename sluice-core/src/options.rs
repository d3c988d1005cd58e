/// Per statement execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Seconds, 0 means no timeout.
    pub query_timeout: u32,
    /// Maximum rows fetched per call.
    pub batch_size: usize,
    /// Bytes read per chunk of a long text or binary column.
    pub chunk_size: usize,
}

impl QueryOptions {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_CHUNK_SIZE: usize = 8192;

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.query_timeout = seconds;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            query_timeout: 0,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }
}
