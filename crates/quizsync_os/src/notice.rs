#![forbid(unsafe_code)]

use quizsync_kernel_contracts::ReasonCodeId;

use crate::ledger_client::LedgerError;

pub mod reason_codes {
    use quizsync_kernel_contracts::ReasonCodeId;

    // Client notice reason-code namespace.
    pub const NOTICE_LEDGER_UNREACHABLE: ReasonCodeId = ReasonCodeId(0x5153_0001);
    pub const NOTICE_LEDGER_TIMEOUT: ReasonCodeId = ReasonCodeId(0x5153_0002);
    pub const NOTICE_LEDGER_REJECTED: ReasonCodeId = ReasonCodeId(0x5153_0003);
    pub const NOTICE_LEDGER_MALFORMED: ReasonCodeId = ReasonCodeId(0x5153_0004);
    pub const NOTICE_LEDGER_NOT_FOUND: ReasonCodeId = ReasonCodeId(0x5153_0005);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Network,
    MalformedData,
    Rejected,
    /// The local wall clock, not the ledger, misbehaved.
    LocalClock,
}

/// Non-fatal condition surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNotice {
    pub kind: NoticeKind,
    pub reason_code: ReasonCodeId,
    pub message: String,
}

impl ClientNotice {
    pub fn new(kind: NoticeKind, reason_code: ReasonCodeId, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason_code,
            message: message.into(),
        }
    }

    pub fn malformed(reason_code: ReasonCodeId, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::MalformedData, reason_code, message)
    }

    pub fn from_ledger_error(err: &LedgerError) -> Self {
        let (kind, reason_code) = match err {
            LedgerError::Network(_) => (NoticeKind::Network, reason_codes::NOTICE_LEDGER_UNREACHABLE),
            LedgerError::Timeout { .. } => (NoticeKind::Network, reason_codes::NOTICE_LEDGER_TIMEOUT),
            LedgerError::Rejected { .. } => {
                (NoticeKind::Rejected, reason_codes::NOTICE_LEDGER_REJECTED)
            }
            LedgerError::MalformedData { .. } => (
                NoticeKind::MalformedData,
                reason_codes::NOTICE_LEDGER_MALFORMED,
            ),
            LedgerError::NotFound { .. } => (
                NoticeKind::MalformedData,
                reason_codes::NOTICE_LEDGER_NOT_FOUND,
            ),
        };
        Self::new(kind, reason_code, err.to_string())
    }
}
