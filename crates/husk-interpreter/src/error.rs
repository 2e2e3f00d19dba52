//! Errors that stop a running script

use std::io;

use husk_ast::HuskError;

use crate::io::IoFault;

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    /// Writer arena invariant broken
    #[error(transparent)]
    Fault(#[from] IoFault),

    #[error(transparent)]
    Expansion(#[from] HuskError),

    /// The shell itself could not get an OS resource (pipe, poll)
    #[error("husk: {0}")]
    Io(#[from] io::Error),
}
