use std::sync::Arc;

/// Errors that can occur while setting up the loader (reading manifests, starting IO). Individual
/// asset loads never produce one of these, a failed load just leaves the asset in the failed state.
#[derive(Debug, Clone)]
pub enum LoaderError {
    StringError(String),
    IoError(Arc<std::io::Error>),
    JsonError(Arc<serde_json::Error>),
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoaderError::StringError(_) => None,
            LoaderError::IoError(ref e) => Some(&**e),
            LoaderError::JsonError(ref e) => Some(&**e),
        }
    }
}

impl core::fmt::Display for LoaderError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            LoaderError::StringError(ref e) => e.fmt(fmt),
            LoaderError::IoError(ref e) => e.fmt(fmt),
            LoaderError::JsonError(ref e) => e.fmt(fmt),
        }
    }
}

impl From<&str> for LoaderError {
    fn from(str: &str) -> Self {
        LoaderError::StringError(str.to_string())
    }
}

impl From<String> for LoaderError {
    fn from(string: String) -> Self {
        LoaderError::StringError(string)
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(error: std::io::Error) -> Self {
        LoaderError::IoError(Arc::new(error))
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(error: serde_json::Error) -> Self {
        LoaderError::JsonError(Arc::new(error))
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;
