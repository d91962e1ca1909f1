//! Approval state for destructive tool calls.
//!
//! A destructive call is first parked as a pending request keyed by
//! conversation, tool name and an argument fingerprint. The user's next reply
//! is run through [`ConfirmationGate::resolve`]; once confirmed, the identical
//! call passes [`ConfirmationGate::check_before_call`] exactly once.
//!
//! Expiry is checked lazily against an injected [`Clock`] whenever an entry is
//! touched. There is no background sweeper.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use scale_mcp_client::ToolArguments;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{Settings, ToolRiskLevel, ToolRiskTable};

const CONFIRM_KEYWORDS: &[&str] = &["confirm", "yes", "proceed", "ok", "approve", "y"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "no", "abort", "stop", "n"];
const CONFIRMATION_CODE_LEN: usize = 6;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub arguments: ToolArguments,
    pub risk_level: ToolRiskLevel,
    pub status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmation_code: Option<String>,
}

impl ConfirmationRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn signal(&self) -> PendingConfirmation {
        PendingConfirmation {
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
            risk_level: self.risk_level,
            expires_at: self.expires_at,
            confirmation_code: self.confirmation_code.clone(),
        }
    }
}

/// What the caller needs to prompt the user for approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub tool_name: String,
    pub arguments: ToolArguments,
    pub risk_level: ToolRiskLevel,
    pub expires_at: DateTime<Utc>,
    pub confirmation_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allowed,
    Pending(PendingConfirmation),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// Outcome of feeding a user reply to the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    NoPending,
    Confirmed {
        tool_name: String,
        arguments: ToolArguments,
    },
    Cancelled {
        tool_name: String,
    },
    Expired {
        tool_name: String,
    },
    Unrecognized {
        tool_name: String,
        confirmation_code: Option<String>,
    },
}

impl Resolution {
    pub fn approved(&self) -> bool {
        matches!(self, Resolution::Confirmed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Resolution::NoPending => "No pending operation requires confirmation.".to_string(),
            Resolution::Confirmed { tool_name, .. } => {
                format!("Operation `{}` confirmed. Proceeding...", tool_name)
            }
            Resolution::Cancelled { tool_name } => format!("Operation `{}` cancelled.", tool_name),
            Resolution::Expired { .. } => {
                "The confirmation request has expired. Please retry the operation.".to_string()
            }
            Resolution::Unrecognized {
                confirmation_code: Some(code),
                ..
            } => format!(
                "Please reply 'confirm {}' to proceed or 'cancel' to abort.",
                code
            ),
            Resolution::Unrecognized { .. } => {
                "Please reply 'confirm' to proceed or 'cancel' to abort.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub require_confirmation: bool,
    pub ttl: Duration,
    pub confirmation_codes: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            ttl: Duration::minutes(5),
            confirmation_codes: false,
        }
    }
}

impl GatePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            require_confirmation: settings.require_confirmation,
            ttl: settings.confirmation_ttl(),
            confirmation_codes: settings.confirmation_codes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConfirmationKey {
    conversation_id: String,
    tool_name: String,
    fingerprint: String,
}

impl ConfirmationKey {
    fn new(conversation_id: &str, tool_name: &str, arguments: &ToolArguments) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            tool_name: tool_name.to_string(),
            fingerprint: fingerprint(arguments),
        }
    }
}

/// SHA-256 over the arguments serialized with keys sorted at every level, so
/// the same arguments in any order hash the same.
pub fn fingerprint(arguments: &ToolArguments) -> String {
    let canonical = canonicalize(&Value::Object(arguments.clone()));
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

fn new_confirmation_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONFIRMATION_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Per-process store of confirmation requests. One async mutex covers the
/// whole map so check, consume and cancel never interleave.
pub struct ConfirmationGate {
    policy: GatePolicy,
    risk_table: ToolRiskTable,
    clock: Arc<dyn Clock>,
    requests: Mutex<HashMap<ConfirmationKey, ConfirmationRequest>>,
}

impl ConfirmationGate {
    pub fn new(policy: GatePolicy, risk_table: ToolRiskTable) -> Self {
        Self::with_clock(policy, risk_table, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: GatePolicy, risk_table: ToolRiskTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            risk_table,
            clock,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(GatePolicy::from_settings(settings), settings.risk_table())
    }

    pub fn risk_level(&self, tool_name: &str) -> ToolRiskLevel {
        self.risk_table.risk_level(tool_name)
    }

    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        self.policy.require_confirmation && self.risk_table.is_destructive(tool_name)
    }

    pub async fn check_before_call(
        &self,
        tool_name: &str,
        arguments: &ToolArguments,
        conversation_id: &str,
    ) -> Verdict {
        if !self.requires_confirmation(tool_name) {
            return Verdict::Allowed;
        }

        let key = ConfirmationKey::new(conversation_id, tool_name, arguments);
        let now = self.clock.now();
        let mut requests = self.requests.lock().await;

        let existing = requests
            .get(&key)
            .map(|r| (r.is_expired(now), r.status, r.signal()));

        if let Some((expired, status, signal)) = existing {
            if expired {
                debug!(tool_name = %tool_name, conversation_id = %conversation_id, "Discarding expired confirmation");
                requests.remove(&key);
            } else {
                match status {
                    ConfirmationStatus::Confirmed => {
                        requests.remove(&key);
                        info!(tool_name = %tool_name, conversation_id = %conversation_id, "Operation confirmed");
                        return Verdict::Allowed;
                    }
                    ConfirmationStatus::Pending => {
                        debug!(tool_name = %tool_name, conversation_id = %conversation_id, "Confirmation still pending");
                        return Verdict::Pending(signal);
                    }
                    ConfirmationStatus::Cancelled | ConfirmationStatus::Expired => {
                        requests.remove(&key);
                    }
                }
            }
        }

        let risk_level = self.risk_table.risk_level(tool_name);
        let request = ConfirmationRequest {
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
            risk_level,
            status: ConfirmationStatus::Pending,
            created_at: now,
            expires_at: now
                .checked_add_signed(self.policy.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            confirmation_code: self.policy.confirmation_codes.then(new_confirmation_code),
        };
        let signal = request.signal();
        requests.insert(key, request);

        info!(
            tool_name = %tool_name,
            risk_level = %risk_level,
            conversation_id = %conversation_id,
            "Confirmation required"
        );
        Verdict::Pending(signal)
    }

    /// Apply a user reply to the oldest pending request of the conversation.
    pub async fn resolve(&self, conversation_id: &str, response_text: &str) -> Resolution {
        let now = self.clock.now();
        let mut requests = self.requests.lock().await;

        let Some(key) = oldest_pending(&requests, conversation_id) else {
            return Resolution::NoPending;
        };
        let Some(request) = requests.get_mut(&key) else {
            return Resolution::NoPending;
        };
        let tool_name = request.tool_name.clone();

        if request.is_expired(now) {
            request.status = ConfirmationStatus::Expired;
            requests.remove(&key);
            info!(tool_name = %tool_name, conversation_id = %conversation_id, "Confirmation expired");
            return Resolution::Expired { tool_name };
        }

        let reply = response_text.trim().to_lowercase();

        if contains_any(&reply, CONFIRM_KEYWORDS) {
            if let Some(code) = &request.confirmation_code {
                if !reply.contains(&code.to_lowercase()) {
                    return Resolution::Unrecognized {
                        tool_name,
                        confirmation_code: Some(code.clone()),
                    };
                }
            }
            request.status = ConfirmationStatus::Confirmed;
            info!(tool_name = %tool_name, conversation_id = %conversation_id, "User confirmed operation");
            return Resolution::Confirmed {
                tool_name,
                arguments: request.arguments.clone(),
            };
        }

        if contains_any(&reply, CANCEL_KEYWORDS) {
            request.status = ConfirmationStatus::Cancelled;
            requests.remove(&key);
            info!(tool_name = %tool_name, conversation_id = %conversation_id, "User cancelled operation");
            return Resolution::Cancelled { tool_name };
        }

        Resolution::Unrecognized {
            tool_name,
            confirmation_code: request.confirmation_code.clone(),
        }
    }

    /// The oldest pending request of the conversation, expired or not.
    pub async fn pending_for(&self, conversation_id: &str) -> Option<PendingConfirmation> {
        let requests = self.requests.lock().await;
        oldest_pending(&requests, conversation_id)
            .and_then(|key| requests.get(&key))
            .map(ConfirmationRequest::signal)
    }

    /// Forget every request of the conversation. Returns how many were dropped.
    pub async fn clear_all(&self, conversation_id: &str) -> usize {
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|key, _| key.conversation_id != conversation_id);
        before - requests.len()
    }

    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.lock().await.is_empty()
    }
}

fn oldest_pending(
    requests: &HashMap<ConfirmationKey, ConfirmationRequest>,
    conversation_id: &str,
) -> Option<ConfirmationKey> {
    requests
        .iter()
        .filter(|(key, request)| {
            key.conversation_id == conversation_id && request.status == ConfirmationStatus::Pending
        })
        .min_by_key(|(_, request)| request.created_at)
        .map(|(key, _)| key.clone())
}
