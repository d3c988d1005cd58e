use std::fmt::{self, Display};

/// A diagnostic record read from a native handle after a call.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Five characters SQLSTATE.
    pub sqlstate: String,
    pub native_code: i32,
    pub message: String,
    pub severity: i32,
    pub server: String,
    pub procedure: String,
    pub line: u32,
}

impl Diagnostic {
    pub fn new(sqlstate: impl Into<String>, native_code: i32, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            native_code,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Class `01` records are warnings.
    pub fn is_warning(&self) -> bool {
        self.sqlstate.starts_with("01")
    }

    /// `HY008`: operation canceled.
    pub fn is_cancel(&self) -> bool {
        self.sqlstate == "HY008"
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.sqlstate, self.native_code, self.message)?;
        if !self.server.is_empty() {
            write!(f, " (server: {}", self.server)?;
            if !self.procedure.is_empty() {
                write!(f, ", procedure: {}", self.procedure)?;
            }
            if self.line > 0 {
                write!(f, ", line: {}", self.line)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Formats a list of diagnostics on a single line.
pub struct Diagnostics<'a>(pub &'a [Diagnostic]);

impl Display for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no diagnostics");
        }
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}
