//! Session coordinator - the authoritative presence state machine
//!
//! Owns the ledger and the mode. Each scan is decided and applied inside one
//! ledger transaction:
//!
//! ```text
//! (none) --checkin/toggle--> OPEN --checkout/toggle(>= threshold)--> CLOSED
//!                             |  ^
//!                             +--+ duplicate checkin, too-soon toggle
//! ```
//!
//! CLOSED sessions are never reopened; the next check-in appends a new row.

use crate::domain::types::{format_duration, Identity, Session};
use crate::domain::wire::{EnrollRequest, HistoryEntry, ScanReply, ScanRequest, UserEntry};
use crate::domain::{IdentityId, Mode, ScanAction, ScanStatus, Timestamp};
use crate::infra::Metrics;
use crate::services::error::{Conflict, CoordinatorError};
use crate::services::ledger::{Ledger, LedgerTx};
use crate::services::mode::ModeAuthority;
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Accepted scan, as applied to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Unseen token auto-created while in enroll mode
    Enrolled { name: String },
    CheckedIn { name: String, forced: bool },
    CheckedOut { name: String, duration: String, forced: bool },
}

impl ScanOutcome {
    pub fn status(&self) -> ScanStatus {
        match self {
            ScanOutcome::Enrolled { .. } => ScanStatus::Enrolled,
            ScanOutcome::CheckedIn { forced: true, .. }
            | ScanOutcome::CheckedOut { forced: true, .. } => ScanStatus::Success,
            ScanOutcome::CheckedIn { .. } => ScanStatus::Checkin,
            ScanOutcome::CheckedOut { .. } => ScanStatus::Checkout,
        }
    }
}

/// Status a scan result is reported under
pub fn scan_status(result: &Result<ScanOutcome, CoordinatorError>) -> ScanStatus {
    match result {
        Ok(outcome) => outcome.status(),
        Err(CoordinatorError::NotFound(_)) => ScanStatus::Unknown,
        Err(CoordinatorError::Conflict(Conflict::TooSoon { .. })) => ScanStatus::Warning,
        Err(_) => ScanStatus::Error,
    }
}

/// Render a scan result as the device-facing reply
pub fn scan_reply(result: &Result<ScanOutcome, CoordinatorError>) -> ScanReply {
    let status = scan_status(result);
    match result {
        Ok(ScanOutcome::Enrolled { name }) => {
            ScanReply::new(status, "Card Saved. Next!").with_name(name.as_str())
        }
        Ok(ScanOutcome::CheckedIn { name, .. }) => {
            ScanReply::new(status, format!("Welcome, {}!", name)).with_name(name.as_str())
        }
        Ok(ScanOutcome::CheckedOut { name, duration, .. }) => {
            let mut reply =
                ScanReply::new(status, format!("Goodbye, {}!", name)).with_name(name.as_str());
            reply.duration = Some(duration.clone());
            reply
        }
        Err(CoordinatorError::Conflict(conflict)) => {
            let mut reply = ScanReply::new(status, conflict.to_string());
            match conflict {
                Conflict::TooSoon { name, remaining } => {
                    reply.name = Some(name.clone());
                    reply.remaining_seconds = Some(remaining.num_seconds());
                }
                Conflict::AlreadyCheckedIn { name } | Conflict::NeverCheckedIn { name } => {
                    reply.name = Some(name.clone());
                }
                Conflict::AlreadyRegistered => {}
            }
            reply
        }
        Err(err) => ScanReply::new(status, err.to_string()),
    }
}

pub struct SessionCoordinator {
    ledger: Ledger,
    mode: ModeAuthority,
    min_checkout: TimeDelta,
    metrics: Arc<Metrics>,
}

impl SessionCoordinator {
    pub fn new(ledger: Ledger, min_checkout_minutes: u64, metrics: Arc<Metrics>) -> Self {
        let min_checkout = i64::try_from(min_checkout_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX);
        Self {
            ledger,
            mode: ModeAuthority::new(),
            min_checkout,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn set_mode(&self, raw: &str) -> Result<Mode, CoordinatorError> {
        let before = self.mode.get();
        let mode = self.mode.set(raw)?;
        if mode != before {
            self.metrics.record_mode_change();
        }
        Ok(mode)
    }

    /// Register a token under an operator-supplied name
    pub fn enroll(&self, req: &EnrollRequest) -> Result<Identity, CoordinatorError> {
        let name = req.name.trim();
        if req.identity_id.is_empty() {
            return Err(CoordinatorError::validation("identity_id is required"));
        }
        if name.is_empty() {
            return Err(CoordinatorError::validation("name is required"));
        }

        let result = self.ledger.transact(|tx| tx.insert_identity(&req.identity_id, name));
        match &result {
            Ok(()) => self.metrics.record_enrollment(true),
            Err(CoordinatorError::Conflict(Conflict::AlreadyRegistered)) => {
                self.metrics.record_enrollment(false)
            }
            Err(_) => {}
        }

        match result {
            Ok(()) => {
                info!(identity_id = %req.identity_id, name = %name, "identity_enrolled");
                Ok(Identity { id: req.identity_id.clone(), name: name.to_string() })
            }
            Err(e) => {
                self.log_failure("enroll", &req.identity_id, &e);
                Err(e)
            }
        }
    }

    /// Classify and apply one scan
    ///
    /// The caller-supplied timestamp drives all arithmetic; coordinator local
    /// time is used only when the device sent none.
    pub fn scan(&self, req: &ScanRequest) -> Result<ScanOutcome, CoordinatorError> {
        let started = Instant::now();
        let result = self.apply_scan(req);
        let status = scan_status(&result);
        self.metrics.record_scan(status, started.elapsed().as_micros() as u64);

        match &result {
            Ok(outcome) => info!(
                identity_id = %req.identity_id,
                status = status.as_str(),
                outcome = ?outcome,
                "scan_processed"
            ),
            Err(e) => self.log_failure("scan", &req.identity_id, e),
        }
        result
    }

    fn apply_scan(&self, req: &ScanRequest) -> Result<ScanOutcome, CoordinatorError> {
        let id = &req.identity_id;
        if id.is_empty() {
            return Err(CoordinatorError::validation("identity_id is required"));
        }

        let mode = self.mode.get();
        if let Some(device_mode) = req.device_mode.filter(|m| *m != mode) {
            warn!(
                identity_id = %id,
                device_mode = %device_mode,
                mode = %mode,
                "scan_mode_mismatch"
            );
        }
        let at = req.timestamp.unwrap_or_else(Timestamp::now_local);

        self.ledger.transact(|tx| {
            let name = match tx.identity_name(id)? {
                Some(name) => name,
                None if mode == Mode::Enroll => {
                    let name = id.placeholder_name();
                    tx.insert_identity(id, &name)?;
                    return Ok(ScanOutcome::Enrolled { name });
                }
                None => return Err(CoordinatorError::NotFound(id.clone())),
            };

            match req.action_type {
                Some(ScanAction::Checkin) => check_in(tx, id, name, at, true),
                Some(ScanAction::Checkout) => check_out(tx, id, name, at),
                // Enroll mode only registers; a known token is a duplicate
                None if mode == Mode::Enroll => Err(Conflict::AlreadyRegistered.into()),
                None => self.toggle(tx, id, name, at),
            }
        })
    }

    fn toggle(
        &self,
        tx: &LedgerTx<'_>,
        id: &IdentityId,
        name: String,
        at: Timestamp,
    ) -> Result<ScanOutcome, CoordinatorError> {
        let Some(open) = tx.open_session(id)? else {
            return check_in(tx, id, name, at, false);
        };

        let elapsed = at.since(open.check_in);
        if elapsed < self.min_checkout {
            return Err(Conflict::TooSoon { name, remaining: self.min_checkout - elapsed }.into());
        }

        let duration = format_duration(elapsed);
        tx.close_session(open.id, at, &duration)?;
        Ok(ScanOutcome::CheckedOut { name, duration, forced: false })
    }

    pub fn rename(&self, id: &IdentityId, name: &str) -> Result<(), CoordinatorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::validation("name is required"));
        }
        let renamed = self.ledger.transact(|tx| tx.rename_identity(id, name))?;
        if !renamed {
            return Err(CoordinatorError::NotFound(id.clone()));
        }
        info!(identity_id = %id, name = %name, "identity_renamed");
        Ok(())
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, CoordinatorError> {
        self.ledger.history()
    }

    pub fn users(&self) -> Result<Vec<UserEntry>, CoordinatorError> {
        self.ledger.users()
    }

    pub fn identity(&self, id: &IdentityId) -> Result<Option<Identity>, CoordinatorError> {
        self.ledger.identity(id)
    }

    pub fn sessions_for(&self, id: &IdentityId) -> Result<Vec<Session>, CoordinatorError> {
        self.ledger.sessions_for(id)
    }

    fn log_failure(&self, op: &'static str, id: &IdentityId, err: &CoordinatorError) {
        if err.is_internal() {
            self.metrics.record_storage_error();
            error!(op, identity_id = %id, error = %err, "ledger_failure");
        } else {
            debug!(op, identity_id = %id, reason = %err, "request_rejected");
        }
    }
}

fn check_in(
    tx: &LedgerTx<'_>,
    id: &IdentityId,
    name: String,
    at: Timestamp,
    forced: bool,
) -> Result<ScanOutcome, CoordinatorError> {
    if tx.open_session(id)?.is_some() {
        return Err(Conflict::AlreadyCheckedIn { name }.into());
    }
    tx.insert_session(id, at)?;
    Ok(ScanOutcome::CheckedIn { name, forced })
}

fn check_out(
    tx: &LedgerTx<'_>,
    id: &IdentityId,
    name: String,
    at: Timestamp,
) -> Result<ScanOutcome, CoordinatorError> {
    let Some(open) = tx.open_session(id)? else {
        return Err(Conflict::NeverCheckedIn { name }.into());
    };
    let duration = format_duration(at.since(open.check_in));
    tx.close_session(open.id, at, &duration)?;
    Ok(ScanOutcome::CheckedOut { name, duration, forced: true })
}
