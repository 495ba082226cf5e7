//! Dispatcher start-up errors.

use thiserror::Error;
use tether_core::OperationNameError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    OperationName(#[from] OperationNameError),

    #[error("{method} {path} bound twice: {first} and {second}")]
    DuplicateRoute {
        method: &'static str,
        path: String,
        first: String,
        second: String,
    },

    #[error("invalid CORS pattern: {0}")]
    Cors(#[from] regex::Error),
}
