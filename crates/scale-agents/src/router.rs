use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agents::ScaleAgent;
use crate::config::AgentKind;
use crate::errors::RoutingError;
use crate::intent::{Intent, IntentClassification};

/// Where a classified request goes.
pub enum Route {
    Help,
    Clarify,
    Agent(Arc<dyn ScaleAgent>),
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Help => f.write_str("Help"),
            Route::Clarify => f.write_str("Clarify"),
            Route::Agent(agent) => f.debug_tuple("Agent").field(&agent.kind()).finish(),
        }
    }
}

/// Dispatch table from agent kind to the agents this deployment runs.
pub struct Router {
    agents: BTreeMap<AgentKind, Arc<dyn ScaleAgent>>,
    confidence_floor: f64,
}

impl Router {
    pub fn new(confidence_floor: f64) -> Self {
        Self {
            agents: BTreeMap::new(),
            confidence_floor,
        }
    }

    /// Replaces any agent already registered for the same kind.
    pub fn register(&mut self, agent: Arc<dyn ScaleAgent>) {
        self.agents.insert(agent.kind(), agent);
    }

    pub fn with_agent(mut self, agent: Arc<dyn ScaleAgent>) -> Self {
        self.register(agent);
        self
    }

    pub fn enabled(&self) -> Vec<AgentKind> {
        self.agents.keys().copied().collect()
    }

    pub fn agent(&self, kind: AgentKind) -> Option<&Arc<dyn ScaleAgent>> {
        self.agents.get(&kind)
    }

    /// Help goes to help. Anything under the confidence floor asks the user to
    /// rephrase, whatever its label; unknown at or above it falls back to the
    /// health agent. A classifier-supplied target agent wins over the default
    /// mapping for the intent.
    pub fn route(&self, classification: &IntentClassification) -> Result<Route, RoutingError> {
        if classification.intent == Intent::Help {
            return Ok(Route::Help);
        }
        if classification.confidence < self.confidence_floor {
            return Ok(Route::Clarify);
        }

        let intent = match classification.intent {
            Intent::Unknown => Intent::Health,
            other => other,
        };

        let Some(kind) = classification
            .target_agent
            .or_else(|| intent.target_agent())
        else {
            return Ok(Route::Clarify);
        };

        match self.agents.get(&kind) {
            Some(agent) => Ok(Route::Agent(agent.clone())),
            None => Err(RoutingError::AgentNotEnabled {
                agent: kind,
                intent,
                enabled: self.enabled(),
            }),
        }
    }

    pub fn help_text(&self) -> String {
        let mut lines = vec![
            "**IBM Storage Scale Agent System**".to_string(),
            String::new(),
            "I can help you with the following:".to_string(),
            String::new(),
        ];
        for kind in self.agents.keys() {
            let (heading, bullets) = capabilities(*kind);
            lines.push(format!("**{}**", heading));
            lines.extend(bullets.iter().map(|b| format!("• {}", b)));
            lines.push(String::new());
        }
        lines.push("**Example Queries:**".to_string());
        lines.extend(
            self.agents
                .keys()
                .map(|kind| format!("• '{}'", example(*kind))),
        );
        lines.join("\n")
    }

    pub fn clarification_text(&self) -> String {
        let mut lines = vec![
            "I wasn't sure what you'd like me to help with. Here are some things I can do:"
                .to_string(),
            String::new(),
        ];
        lines.extend(
            self.agents
                .keys()
                .map(|kind| format!("• **{}**: {}", title_case(kind.as_str()), summary(*kind))),
        );
        lines.push(String::new());
        lines.push(
            "Could you please rephrase your request or say 'help' for more details?".to_string(),
        );
        lines.join("\n")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capabilities(kind: AgentKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        AgentKind::Health => (
            "Health Monitoring (SREs, NOC)",
            &[
                "Check cluster and node health status",
                "View health events and alerts",
                "Monitor filesystem health",
            ],
        ),
        AgentKind::Storage => (
            "Storage Management (Storage Admins)",
            &[
                "List and manage filesystems",
                "Create, delete, link filesets",
                "Mount/unmount filesystems",
                "View storage pools",
            ],
        ),
        AgentKind::Quota => (
            "Quota Management (Storage Admins, Project Leads)",
            &["View and set quotas", "Monitor capacity usage", "Delete quotas"],
        ),
        AgentKind::Performance => (
            "Performance Analysis (Performance Engineers)",
            &[
                "Analyze performance bottlenecks",
                "Review node and filesystem metrics",
                "Investigate latency issues",
            ],
        ),
        AgentKind::Admin => (
            "Administration (Cluster Admins)",
            &[
                "Manage snapshots",
                "Start/stop nodes",
                "Configure cluster settings",
                "Manage remote clusters and NSDs",
            ],
        ),
    }
}

fn summary(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Health => "Check cluster health, node status, events",
        AgentKind::Storage => "Manage filesystems and filesets",
        AgentKind::Quota => "Set quotas and check usage",
        AgentKind::Performance => "Analyze bottlenecks and metrics",
        AgentKind::Admin => "Manage snapshots, nodes, clusters",
    }
}

fn example(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Health => "Are there any unhealthy nodes?",
        AgentKind::Storage => "List filesets in filesystem gpfs01",
        AgentKind::Quota => "Set 10TB quota on fileset project-data",
        AgentKind::Performance => "Analyze performance bottlenecks",
        AgentKind::Admin => "Create snapshot daily-backup in gpfs01",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRequest;
    use async_trait::async_trait;

    struct Stub(AgentKind);

    #[async_trait]
    impl ScaleAgent for Stub {
        fn kind(&self) -> AgentKind {
            self.0
        }

        fn description(&self) -> &str {
            "stub"
        }

        async fn process(&self, _request: &AgentRequest) -> String {
            self.0.to_string()
        }
    }

    fn router() -> Router {
        Router::new(0.3)
            .with_agent(Arc::new(Stub(AgentKind::Health)))
            .with_agent(Arc::new(Stub(AgentKind::Storage)))
    }

    #[test]
    fn help_intent_routes_to_help() {
        let route = router()
            .route(&IntentClassification::new(Intent::Help, 0.3))
            .unwrap();
        assert!(matches!(route, Route::Help));
    }

    #[test]
    fn low_confidence_unknown_asks_to_clarify() {
        let route = router().route(&IntentClassification::unknown()).unwrap();
        assert!(matches!(route, Route::Clarify));
    }

    #[test]
    fn low_confidence_label_asks_to_clarify() {
        let route = router()
            .route(&IntentClassification::new(Intent::Storage, 0.1))
            .unwrap();
        assert!(matches!(route, Route::Clarify));

        // help is never gated by confidence
        let route = router()
            .route(&IntentClassification::new(Intent::Help, 0.0))
            .unwrap();
        assert!(matches!(route, Route::Help));
    }

    #[test]
    fn label_at_the_floor_is_dispatched() {
        let route = router()
            .route(&IntentClassification::new(Intent::Storage, 0.3))
            .unwrap();
        match route {
            Route::Agent(agent) => assert_eq!(agent.kind(), AgentKind::Storage),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn classifier_target_agent_overrides_the_intent_mapping() {
        let mut classification = IntentClassification::new(Intent::Performance, 0.6);
        classification.target_agent = Some(AgentKind::Storage);
        match router().route(&classification).unwrap() {
            Route::Agent(agent) => assert_eq!(agent.kind(), AgentKind::Storage),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn confident_unknown_falls_back_to_health() {
        let route = router()
            .route(&IntentClassification::new(Intent::Unknown, 0.5))
            .unwrap();
        match route {
            Route::Agent(agent) => assert_eq!(agent.kind(), AgentKind::Health),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn mapped_but_disabled_agent_is_a_routing_error() {
        let err = router()
            .route(&IntentClassification::new(Intent::Quota, 0.6))
            .unwrap_err();
        let RoutingError::AgentNotEnabled {
            agent,
            intent,
            enabled,
        } = err;
        assert_eq!(agent, AgentKind::Quota);
        assert_eq!(intent, Intent::Quota);
        assert_eq!(enabled, vec![AgentKind::Health, AgentKind::Storage]);
    }

    #[test]
    fn help_lists_only_enabled_agents() {
        let text = router().help_text();
        assert!(text.contains("**Health Monitoring (SREs, NOC)**"));
        assert!(text.contains("• Mount/unmount filesystems"));
        assert!(!text.contains("Quota Management"));

        let clarify = router().clarification_text();
        assert!(clarify.contains("• **Storage**: Manage filesystems and filesets"));
        assert!(clarify.ends_with("say 'help' for more details?"));
    }
}
