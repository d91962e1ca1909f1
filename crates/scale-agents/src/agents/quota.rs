use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{AgentCore, AgentRequest, ScaleAgent, Step};
use crate::config::AgentKind;
use crate::executor::ToolExecutor;
use crate::formatter::{list_items, ResponseFormatter};

/// Fileset, user and group quotas plus capacity reports. Deleting a quota
/// is gated; setting one is not.
pub struct QuotaAgent {
    core: AgentCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Delete,
    Set,
    Usage,
    List,
}

impl Operation {
    fn detect(req: &AgentRequest) -> Self {
        if req.mentions_word(&["delete", "remove"]) {
            Operation::Delete
        } else if req.mentions_word(&["set", "limit"]) || req.param("limit").is_some() {
            Operation::Set
        } else if req.mentions(&["usage", "capacity", "space", "how much"]) {
            Operation::Usage
        } else {
            Operation::List
        }
    }
}

/// The object a quota applies to. Filesets win over users, users over groups.
fn quota_target(req: &AgentRequest) -> Option<(&'static str, &str)> {
    ["fileset", "user", "group"]
        .into_iter()
        .find_map(|kind| req.param(kind).map(|name| (kind, name)))
}

fn ask_for(what: &str, example: &str) -> String {
    format!("Please specify {}. Example: '{}'", what, example)
}

impl QuotaAgent {
    pub fn new(executor: Arc<ToolExecutor>, formatter: Arc<dyn ResponseFormatter>) -> Self {
        Self {
            core: AgentCore::new(AgentKind::Quota, executor, formatter),
        }
    }

    async fn handle(&self, req: &AgentRequest) -> Step<String> {
        let op = Operation::detect(req);
        let Some(filesystem) = req.param("filesystem") else {
            return Ok(ask_for(
                "a filesystem name",
                "Show quotas in filesystem gpfs01",
            ));
        };

        match op {
            Operation::Delete | Operation::Set => {
                let Some((quota_type, name)) = quota_target(req) else {
                    return Ok(ask_for(
                        "a fileset, user or group",
                        "Set 10TB quota on fileset project-data in gpfs01",
                    ));
                };
                let mut args = Map::new();
                args.insert("filesystem".into(), json!(filesystem));
                args.insert("quota_type".into(), json!(quota_type));
                args.insert("name".into(), json!(name));

                if op == Operation::Delete {
                    let title = format!("Quota Deleted: {} {}", quota_type, name);
                    return self.run(req, "delete_quota", Value::Object(args), &title).await;
                }

                let Some(limit) = req.param("limit") else {
                    return Ok(ask_for(
                        "a limit",
                        "Set 10TB quota on fileset project-data in gpfs01",
                    ));
                };
                args.insert("block_limit".into(), json!(limit));
                let title = format!("Quota Set: {} {} = {}", quota_type, name, limit);
                self.run(req, "set_quota", Value::Object(args), &title).await
            }

            Operation::Usage => match req.param("fileset") {
                Some(fileset) => {
                    self.run(
                        req,
                        "get_fileset_usage",
                        json!({"filesystem": filesystem, "fileset_name": fileset}),
                        &format!("Fileset Usage: {}", fileset),
                    )
                    .await
                }
                None => {
                    self.run(
                        req,
                        "get_filesystem",
                        json!({"filesystem": filesystem}),
                        &format!("Capacity: {}", filesystem),
                    )
                    .await
                }
            },

            Operation::List => {
                let mut args = Map::new();
                args.insert("filesystem".into(), json!(filesystem));
                if let Some(fileset) = req.param("fileset") {
                    args.insert("fileset".into(), json!(fileset));
                }
                let quotas = self
                    .core
                    .fetch(req, "list_quotas", Value::Object(args))
                    .await?;
                Ok(self
                    .core
                    .formatter()
                    .format_list(&list_items(&quotas), &format!("Quotas in {}", filesystem)))
            }
        }
    }

    async fn run(&self, req: &AgentRequest, tool: &str, args: Value, title: &str) -> Step<String> {
        let content = self.core.fetch(req, tool, args).await?;
        Ok(self.core.formatter().format(&content, Some(title)))
    }
}

#[async_trait]
impl ScaleAgent for QuotaAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Quota
    }

    fn description(&self) -> &str {
        "Views and sets fileset, user and group quotas and reports capacity usage. \
         Deleting a quota requires explicit confirmation."
    }

    async fn process(&self, request: &AgentRequest) -> String {
        let step = self.handle(request).await;
        self.core.finish(step, "quota operation")
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn agent(session: Arc<CannedSession>) -> QuotaAgent {
        QuotaAgent::new(executor_for(session), formatter())
    }

    #[test]
    fn delete_wins_over_set() {
        let req = request("remove the quota limit on fileset scratch", &[]);
        assert_eq!(Operation::detect(&req), Operation::Delete);
        let req = request("quota on fileset scratch", &[("limit", "5TB")]);
        assert_eq!(Operation::detect(&req), Operation::Set);
        let req = request("capacity usage of gpfs01", &[]);
        assert_eq!(Operation::detect(&req), Operation::Usage);
        let req = request("show quotas for fileset scratch", &[]);
        assert_eq!(Operation::detect(&req), Operation::List);
    }

    #[tokio::test]
    async fn set_quota_on_fileset() {
        let session = Arc::new(CannedSession::with(&[("set_quota", json!({"status": "ok"}))]));
        let reply = agent(session.clone())
            .process(&request(
                "Set 10TB quota on fileset project-data in gpfs01",
                &[
                    ("fileset", "project-data"),
                    ("filesystem", "gpfs01"),
                    ("limit", "10TB"),
                ],
            ))
            .await;

        assert!(reply.starts_with("**Quota Set: fileset project-data = 10TB**"));
        let args = session.args_of("set_quota").unwrap();
        assert_eq!(args["quota_type"], "fileset");
        assert_eq!(args["name"], "project-data");
        assert_eq!(args["block_limit"], "10TB");
    }

    #[tokio::test]
    async fn delete_quota_asks_for_confirmation() {
        let session = Arc::new(CannedSession::with(&[("delete_quota", json!({}))]));
        let reply = agent(session.clone())
            .process(&request(
                "delete quota for user alice in gpfs01",
                &[("user", "alice"), ("filesystem", "gpfs01")],
            ))
            .await;

        assert!(reply.starts_with("**⚠️ Confirmation Required**"));
        assert!(reply.contains("`delete_quota`"));
        assert!(session.tools_called().is_empty());
    }

    #[tokio::test]
    async fn capacity_without_fileset_reads_the_filesystem() {
        let session = Arc::new(CannedSession::with(&[(
            "get_filesystem",
            json!({"name": "gpfs01", "usedPercent": 71}),
        )]));
        let reply = agent(session.clone())
            .process(&request(
                "capacity usage of gpfs01",
                &[("filesystem", "gpfs01")],
            ))
            .await;

        assert!(reply.starts_with("**Capacity: gpfs01**"));
        assert_eq!(session.tools_called(), vec!["get_filesystem"]);
    }

    #[tokio::test]
    async fn list_and_missing_names() {
        let session = Arc::new(CannedSession::with(&[(
            "list_quotas",
            json!({"quotas": [{"name": "home"}, {"name": "scratch"}]}),
        )]));
        let reply = agent(session.clone())
            .process(&request("show quotas in gpfs01", &[("filesystem", "gpfs01")]))
            .await;
        assert!(reply.starts_with("**Quotas in gpfs01**"));
        assert!(reply.contains("2. `scratch`"));

        let reply = agent(session.clone())
            .process(&request("show quotas", &[]))
            .await;
        assert!(reply.starts_with("Please specify a filesystem name."));

        let reply = agent(session)
            .process(&request("set quota in gpfs01", &[("filesystem", "gpfs01")]))
            .await;
        assert!(reply.starts_with("Please specify a fileset, user or group."));
    }
}
