use crate::accounts::AccountState;
use crate::types::{ActionOutcome, ValidatedAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Audit pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Bounded snapshot history; the oldest snapshot is evicted past this.
    pub snapshot_capacity: usize,
    /// Absolute per-balance tolerance for reconciliation.
    pub tolerance: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: 10,
            tolerance: 1e-6,
        }
    }
}

/// Point-in-time deep copy of account state plus the risk value, captured at
/// the start of an orchestrated cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub snapshot_id: String,
    pub captured_at: DateTime<Utc>,
    pub accounts: AccountState,
    pub risk_value: f64,
    /// Log length at capture time: the verification window starts here.
    pub log_index: usize,
}

/// Bounded ring of snapshots, oldest-first eviction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotHistory {
    capacity: usize,
    snapshots: VecDeque<AuditSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: VecDeque::new(),
        }
    }

    pub fn capture(
        &mut self,
        accounts: &AccountState,
        risk_value: f64,
        log_index: usize,
    ) -> String {
        let snapshot = AuditSnapshot {
            snapshot_id: Uuid::new_v4().to_string(),
            captured_at: Utc::now(),
            accounts: accounts.deep_copy(),
            risk_value,
            log_index,
        };
        let snapshot_id = snapshot.snapshot_id.clone();
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            if let Some(evicted) = self.snapshots.pop_front() {
                tracing::debug!(snapshot_id = %evicted.snapshot_id, "Snapshot evicted (capacity)");
            }
        }
        snapshot_id
    }

    pub fn get(&self, snapshot_id: &str) -> Option<&AuditSnapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }

    /// Remove a snapshot whose window has been verified.
    pub fn evict(&mut self, snapshot_id: &str) {
        self.snapshots
            .retain(|snapshot| snapshot.snapshot_id != snapshot_id);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Immutable record of one dispatched (or rejected) action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: String,
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub action: ValidatedAction,
    pub trail: Vec<String>,
    pub outcome: ActionOutcome,
    /// blake3 fingerprint of account state + risk value after dispatch.
    pub state_fingerprint: String,
    pub snapshot_ref: String,
    /// Dispatch-time conversion rate, persisted so exchange entries can be
    /// replayed exactly at verification time.
    pub exchange_rate: Option<f64>,
}

/// Append-only execution log with a verification cursor.
///
/// Entries are never edited or removed except through an explicit
/// administrative reset. The cursor tracks the verified prefix; retained
/// history for external audit use is unaffected by verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditLogEntry>,
    verified_to: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from persisted entries; the verification cursor restarts at
    /// the tail since unverified windows do not survive a process restart.
    pub fn from_entries(entries: Vec<AuditLogEntry>) -> Self {
        let verified_to = entries.len();
        Self {
            entries,
            verified_to,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        trace_id: &str,
        action: ValidatedAction,
        trail: Vec<String>,
        outcome: ActionOutcome,
        state_fingerprint: String,
        snapshot_ref: String,
        exchange_rate: Option<f64>,
    ) -> &AuditLogEntry {
        let entry = AuditLogEntry {
            entry_id: Uuid::new_v4().to_string(),
            index: self.entries.len() as u64,
            timestamp: Utc::now(),
            trace_id: trace_id.to_string(),
            action,
            trail,
            outcome,
            state_fingerprint,
            snapshot_ref,
            exchange_rate,
        };
        self.entries.push(entry);
        self.entries.last().expect("entry just pushed")
    }

    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn verified_to(&self) -> usize {
        self.verified_to
    }

    pub fn entries_since(&self, index: usize) -> &[AuditLogEntry] {
        &self.entries[index.min(self.entries.len())..]
    }

    /// Advance the verification cursor; never moves backwards.
    pub fn mark_verified_through(&mut self, index: usize) {
        self.verified_to = self.verified_to.max(index.min(self.entries.len()));
    }

    /// Administrative reset. Callers must reset account state and the risk
    /// ledger in the same operation.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.verified_to = 0;
    }
}

/// One account/currency balance that diverged during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    pub account: String,
    pub currency: String,
    pub expected: f64,
    pub actual: f64,
}

/// Result of replaying a log window against its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub ok: bool,
    pub checked_entries: usize,
    pub divergences: Vec<Divergence>,
    /// Entry ids whose recorded action failed structural checks.
    pub malformed: Vec<String>,
}

/// Replays logged actions onto a snapshot and compares against actual state.
#[derive(Debug, Clone)]
pub struct InvariantVerifier {
    tolerance: f64,
}

impl InvariantVerifier {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Replay each entry's expected effect onto a working copy of the
    /// snapshot's account state and compare component-wise with the actual
    /// state. Failed dispatches and no-ops leave no expected effect.
    pub fn verify(
        &self,
        snapshot: &AuditSnapshot,
        entries: &[AuditLogEntry],
        actual: &AccountState,
    ) -> VerificationReport {
        let mut expected = flatten(&snapshot.accounts);
        let mut malformed = Vec::new();

        for entry in entries {
            // Failed dispatches never executed, so their recorded shape is
            // not held against the window either.
            if !entry.outcome.is_success() {
                continue;
            }
            if !structurally_valid(&entry.action) {
                malformed.push(entry.entry_id.clone());
                continue;
            }
            match &entry.action {
                ValidatedAction::Mint {
                    user,
                    currency,
                    amount,
                } => {
                    adjust(&mut expected, user, currency, *amount);
                }
                ValidatedAction::Transfer {
                    sender,
                    recipient,
                    currency,
                    amount,
                } => {
                    adjust(&mut expected, sender, currency, -amount);
                    // External recipients absorb the debit without a credit.
                    if snapshot.accounts.contains_account(recipient) {
                        adjust(&mut expected, recipient, currency, *amount);
                    }
                }
                ValidatedAction::Exchange {
                    user,
                    from_currency,
                    to_currency,
                    from_amount,
                } => match entry.exchange_rate {
                    Some(rate) => {
                        adjust(&mut expected, user, from_currency, -from_amount);
                        adjust(&mut expected, user, to_currency, from_amount * rate);
                    }
                    // No recorded rate: the fill cannot be replayed, only
                    // checked structurally above.
                    None => continue,
                },
                ValidatedAction::NoOp { .. } => {}
            }
        }

        let actual_flat = flatten(actual);
        let mut divergences = Vec::new();
        let mut keys: Vec<(String, String)> = expected.keys().cloned().collect();
        for key in actual_flat.keys() {
            if !expected.contains_key(key) {
                keys.push(key.clone());
            }
        }

        for key in keys {
            let expected_balance = expected.get(&key).copied().unwrap_or(0.0);
            let actual_balance = actual_flat.get(&key).copied().unwrap_or(0.0);
            if (expected_balance - actual_balance).abs() > self.tolerance {
                divergences.push(Divergence {
                    account: key.0.clone(),
                    currency: key.1.clone(),
                    expected: expected_balance,
                    actual: actual_balance,
                });
            }
        }

        let ok = divergences.is_empty() && malformed.is_empty();
        if !ok {
            for divergence in &divergences {
                tracing::error!(
                    account = %divergence.account,
                    currency = %divergence.currency,
                    expected = divergence.expected,
                    actual = divergence.actual,
                    "Reconciliation divergence"
                );
            }
        }

        VerificationReport {
            ok,
            checked_entries: entries.len(),
            divergences,
            malformed,
        }
    }
}

/// Snapshot ring + append-only log + verifier, coordinated as one unit.
#[derive(Debug, Clone)]
pub struct AuditPipeline {
    config: AuditConfig,
    history: SnapshotHistory,
    log: AuditLog,
    verifier: InvariantVerifier,
}

impl AuditPipeline {
    pub fn new(config: AuditConfig) -> Self {
        let history = SnapshotHistory::new(config.snapshot_capacity);
        let verifier = InvariantVerifier::new(config.tolerance);
        Self {
            config,
            history,
            log: AuditLog::new(),
            verifier,
        }
    }

    pub fn with_log(config: AuditConfig, log: AuditLog) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.log = log;
        pipeline
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn snapshot_count(&self) -> usize {
        self.history.len()
    }

    pub fn capture_snapshot(&mut self, accounts: &AccountState, risk_value: f64) -> String {
        self.history.capture(accounts, risk_value, self.log.len())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_entry(
        &mut self,
        trace_id: &str,
        action: ValidatedAction,
        trail: Vec<String>,
        outcome: ActionOutcome,
        accounts: &AccountState,
        risk_value: f64,
        snapshot_ref: &str,
        exchange_rate: Option<f64>,
    ) -> String {
        let fingerprint = state_fingerprint(accounts, risk_value);
        let entry = self.log.append(
            trace_id,
            action,
            trail,
            outcome,
            fingerprint,
            snapshot_ref.to_string(),
            exchange_rate,
        );
        entry.entry_id.clone()
    }

    /// Verify the window covered by `snapshot_ref` against actual state.
    ///
    /// On a full match the consumed snapshot is evicted and the verification
    /// cursor advances past the window. On mismatch both are retained for
    /// investigation; nothing is rolled back.
    pub fn verify_window(&mut self, snapshot_ref: &str, actual: &AccountState) -> VerificationReport {
        let Some(snapshot) = self.history.get(snapshot_ref) else {
            // Capacity eviction can outrun verification under sustained
            // failure; report it rather than silently passing.
            tracing::error!(snapshot_ref, "Verification snapshot no longer retained");
            return VerificationReport {
                ok: false,
                checked_entries: 0,
                divergences: Vec::new(),
                malformed: Vec::new(),
            };
        };

        let window_start = snapshot.log_index;
        let entries = self.log.entries_since(window_start);
        let report = self.verifier.verify(snapshot, entries, actual);

        if report.ok {
            let window_end = self.log.len();
            self.log.mark_verified_through(window_end);
            self.history.evict(snapshot_ref);
        }

        report
    }

    /// Administrative reset of the full pipeline.
    pub fn reset(&mut self) {
        self.log.reset();
        self.history.clear();
    }
}

/// blake3 fingerprint over canonical JSON of balances plus the risk value.
pub fn state_fingerprint(accounts: &AccountState, risk_value: f64) -> String {
    let material = serde_json::json!({
        "accounts": accounts,
        "risk_value": risk_value,
    });
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

fn flatten(state: &AccountState) -> BTreeMap<(String, String), f64> {
    state
        .entries()
        .map(|(account, currency, balance)| ((account.to_string(), currency.to_string()), balance))
        .collect()
}

fn adjust(
    balances: &mut BTreeMap<(String, String), f64>,
    account: &str,
    currency: &str,
    delta: f64,
) {
    *balances
        .entry((account.to_string(), currency.to_string()))
        .or_insert(0.0) += delta;
}

fn structurally_valid(action: &ValidatedAction) -> bool {
    match action {
        ValidatedAction::Mint { amount, .. } => amount.is_finite() && *amount >= 0.0,
        ValidatedAction::Transfer { amount, .. } => amount.is_finite() && *amount >= 0.0,
        ValidatedAction::Exchange {
            from_currency,
            to_currency,
            from_amount,
            ..
        } => from_amount.is_finite() && *from_amount >= 0.0 && from_currency != to_currency,
        ValidatedAction::NoOp { .. } => true,
    }
}
