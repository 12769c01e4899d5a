use snafu::Snafu;

/// Possible errors from parsing or editing a CFG tree.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Parse error on line {}: {}", line, msg))]
    Parse { line: usize, msg: String },

    #[snafu(display("Name '{}' is invalid: {}", name, msg))]
    InvalidName { name: String, msg: String },

    #[snafu(display("Value for '{}' is invalid: {}", path, msg))]
    InvalidValue { path: String, msg: String },

    #[snafu(display("Path '{}' crosses option '{}', which is not a section", path, option))]
    PathConflict { path: String, option: String },

    #[snafu(display("Path '{}' does not exist", path))]
    MissingPath { path: String },

    #[snafu(display("Path cannot be empty"))]
    EmptyPath,
}

pub type Result<T> = std::result::Result<T, Error>;
