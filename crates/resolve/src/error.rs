use std::fmt;

#[derive(Debug)]
pub enum ResolveError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad weights, thresholds out of order, etc.).
    ConfigValidation(String),
    /// Alias map JSON parse error.
    AliasParse(String),
    /// Missing required column in input data.
    MissingColumn { table: String, column: String },
    /// A field in an input row failed to parse.
    FieldParse { table: String, record_id: String, column: String, value: String },
    /// Input referenced a record id that is not part of the run.
    UnknownRecord(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::AliasParse(msg) => write!(f, "alias map parse error: {msg}"),
            Self::MissingColumn { table, column } => {
                write!(f, "table '{table}': missing column '{column}'")
            }
            Self::FieldParse { table, record_id, column, value } => {
                write!(f, "table '{table}', record '{record_id}': cannot parse {column} '{value}'")
            }
            Self::UnknownRecord(id) => write!(f, "unknown record: {id}"),
        }
    }
}

impl std::error::Error for ResolveError {}
