use cosmwasm_std::StdError;
use thiserror::Error;

use crate::manifest::Phase;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("cannot connect to {chain_id}: {reason}")]
    Connection { chain_id: String, reason: String },
    #[error("broadcast to {chain_id} failed: {reason}")]
    Broadcast { chain_id: String, reason: String },
    /// The chain rejected the transaction, `log` is the raw chain error
    #[error("tx {hash} failed with code {code}: {log}")]
    Execution { hash: String, code: u32, log: String },
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },
    #[error("upload of {contract} rejected: {reason}")]
    Upload { contract: String, reason: String },
    #[error("instantiation of {label} rejected: {reason}")]
    Instantiation { label: String, reason: String },
    #[error("channel handshake {host_port} <> {remote_port} failed: {reason}")]
    ChannelHandshake {
        host_port: String,
        remote_port: String,
        reason: String,
    },
    #[error("proposal {proposal_id} has not passed, status: {status}")]
    ThresholdNotMet { proposal_id: u64, status: String },
    #[error("already voted on proposal {0}")]
    AlreadyVoted(u64),
    #[error("proposal {proposal_id} is closed, status: {status}")]
    ProposalClosed { proposal_id: u64, status: String },
    #[error("event {event_type} with attribute {key} not found")]
    EventNotFound { event_type: String, key: String },
    #[error("admin of {contract} already transferred to {current}")]
    AdminAlreadyTransferred { contract: String, current: String },
    #[error("admin of {contract} has been renounced")]
    AdminRenounced { contract: String },
    #[error("manifest {field}: expected {expected}, found {found}")]
    ManifestInconsistency {
        field: String,
        expected: String,
        found: String,
    },
    #[error("manifest field {0} not set")]
    MissingField(&'static str),
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("proposal module {0} already has a writer")]
    WriterTaken(String),
    #[error("query to {contract} failed: {reason}")]
    Query { contract: String, reason: String },
    #[error("config: {0}")]
    Config(String),
    #[error("relay: {0}")]
    Relay(String),
    #[error(transparent)]
    Store(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Std(#[from] StdError),
}

impl DeployError {
    /// Network class failures, the caller may retry the same phase
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeployError::Connection { .. }
                | DeployError::Broadcast { .. }
                | DeployError::Timeout { .. }
        )
    }

    /// Signals that a finalize step already ran on a previous attempt
    pub fn is_benign_on_resume(&self) -> bool {
        matches!(
            self,
            DeployError::AdminAlreadyTransferred { .. } | DeployError::AdminRenounced { .. }
        )
    }
}

/// A failed run, tagged with the phase that aborted it
#[derive(Error, Debug)]
#[error("phase {phase} failed: {source}")]
pub struct OrchestrationError {
    pub phase: Phase,
    #[source]
    pub source: DeployError,
}

impl OrchestrationError {
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }

    /// False when the failed phase may have left governance half applied,
    /// the chains should be inspected before the next run
    pub fn rerun_is_safe(&self) -> bool {
        self.phase.is_idempotent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(phase: Phase, source: DeployError) -> OrchestrationError {
        OrchestrationError { phase, source }
    }

    #[test]
    fn governance_phases_need_inspection() {
        let timeout = || DeployError::Timeout {
            what: "tx".to_string(),
            attempts: 3,
        };
        let err = failed(Phase::Finalize, timeout());
        assert!(err.is_transient());
        assert!(!err.rerun_is_safe());
        assert!(!failed(Phase::ApproveTunnel, timeout()).rerun_is_safe());
        assert!(failed(Phase::RemoteFactory, timeout()).rerun_is_safe());
        assert!(!failed(Phase::Upload, DeployError::MissingField("dao")).is_transient());
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
