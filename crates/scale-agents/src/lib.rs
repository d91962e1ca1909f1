pub mod agents;
pub mod config;
pub mod confirmation;
pub mod errors;
pub mod executor;
pub mod formatter;
pub mod intent;
pub mod orchestrator;
pub mod router;

pub use agents::{
    AdminAgent, AgentRequest, HealthAgent, PerformanceAgent, QuotaAgent, ScaleAgent, StorageAgent,
};
pub use config::{AgentKind, Config, ConfigError, Settings, ToolRiskLevel, ToolRiskTable};
pub use confirmation::{
    Clock, ConfirmationGate, GatePolicy, ManualClock, PendingConfirmation, Resolution,
    SystemClock, Verdict,
};
pub use errors::{AgentError, RoutingError};
pub use executor::{ToolExecutor, ToolOutcome};
pub use formatter::{MarkdownFormatter, ResponseFormatter};
pub use intent::{Intent, IntentClassification, IntentClassifier, PatternClassifier};
pub use orchestrator::Orchestrator;
pub use router::{Route, Router};
