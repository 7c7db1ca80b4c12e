//! Error types for the runner crate

use thiserror::Error;
use userstream_gateway::DispatchError;
use userstream_ports::IdentityId;

use crate::config::ConfigError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("Keyword is empty")]
    EmptyKeyword,
    #[error("Identity {0} already has a connection")]
    DuplicateIdentity(IdentityId),
    #[error("No connection for identity {0}")]
    UnknownIdentity(IdentityId),
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
}
