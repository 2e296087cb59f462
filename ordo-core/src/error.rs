use itertools::Itertools;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a whole run before anything is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Occurs when `ordo.toml` fails to load.
    #[error("failed to load ordo.toml: {0}")]
    LoadError(String),
    /// Occurs when the specified key is not found in `ordo.toml`.
    #[error("the specified key \"{0}\" not found in ordo.toml")]
    ValueNotFound(String),
    #[error("invalid value: {0:#}")]
    ValueError(eyre::Error),
    #[error("base endpoint is empty")]
    EmptyEndpoint,
    #[error("base endpoint \"{0}\" is not a valid URL: {1}")]
    InvalidEndpoint(String, url::ParseError),
    /// A placeholder has neither a parameter nor an earlier extraction rule producing it.
    #[error("scenario \"{scenario}\" has no binding for {}", .names.iter().map(|n| format!("{{{n}}}")).join(", "))]
    MissingBinding { scenario: String, names: Vec<String> },
    #[error("scenarios \"{0}\" and \"{1}\" share the order {2}")]
    DuplicateOrder(String, String, crate::scenario::Order),
    #[error("parameter row {row} of \"{template}\" has {actual} values, expected {expected}")]
    ParameterArity {
        template: String,
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("parameter \"{0}\" is declared more than once")]
    DuplicateParameter(String),
    #[error("rows {first} and {second} of \"{template}\" both expand to \"{name}\"")]
    DuplicateExpansion {
        template: String,
        name: String,
        first: usize,
        second: usize,
    },
    #[error("\"{template}\" has more parameter rows than fit in an order index")]
    TooManyRows { template: String },
}
