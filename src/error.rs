use thiserror::Error;

use crate::blkpool::BlockTag;
use crate::config::{BlockId, Lpn, Ppn};

/// FTL specialized Result type.
pub type Result<T> = std::result::Result<T, FtlError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FtlError {
    /// No block left in the source tag when a write needed one.
    #[error("block pool exhausted: no {tag:?} block left")]
    PoolExhausted { tag: BlockTag },

    /// Mapping, cache and validity bitmap disagree.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("block {block} is tagged {actual:?}, expected {expected:?}")]
    TagMismatch {
        block: BlockId,
        expected: BlockTag,
        actual: BlockTag,
    },

    #[error("page {ppn} programmed without an erase")]
    ProgramWithoutErase { ppn: Ppn },

    #[error("lpn {lpn} out of range (max {max})")]
    LpnOutOfRange { lpn: Lpn, max: Lpn },

    /// Rejected at construction time.
    #[error("configuration error: {0}")]
    Config(&'static str),
}

impl FtlError {
    /// Errors that mean the simulation state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FtlError::LpnOutOfRange { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bad_addresses_are_recoverable() {
        assert!(!FtlError::LpnOutOfRange { lpn: 9, max: 7 }.is_fatal());
        assert!(FtlError::PoolExhausted { tag: BlockTag::Free }.is_fatal());
        assert!(FtlError::InvariantViolated("desync".into()).is_fatal());
    }
}
