use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{AgentCore, AgentRequest, ScaleAgent, Step};
use crate::config::AgentKind;
use crate::executor::ToolExecutor;
use crate::formatter::{list_items, ResponseFormatter};

/// Filesystems, filesets and storage pools. Mount, unmount, create, delete,
/// link and unlink go through the confirmation gate like any other call.
pub struct StorageAgent {
    core: AgentCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Unmount,
    Mount,
    Unlink,
    Link,
    DeleteFileset,
    DeleteFilesystem,
    CreateFileset,
    Pools,
    FilesetDetails,
    ListFilesets,
    FilesystemDetails,
    ListFilesystems,
}

impl Operation {
    /// "unmount" contains "mount" and "unlink" contains "link", so the
    /// reversing verbs are tested first.
    fn detect(req: &AgentRequest) -> Self {
        let fileset = req.mentions(&["fileset"]);
        if req.mentions(&["unmount"]) {
            Operation::Unmount
        } else if req.mentions(&["mount"]) {
            Operation::Mount
        } else if req.mentions(&["unlink"]) {
            Operation::Unlink
        } else if req.mentions(&["link"]) {
            Operation::Link
        } else if fileset && req.mentions(&["delete", "remove"]) {
            Operation::DeleteFileset
        } else if req.mentions(&["delete", "remove"]) && req.mentions(&["filesystem"]) {
            Operation::DeleteFilesystem
        } else if fileset && req.mentions(&["create", "new"]) {
            Operation::CreateFileset
        } else if req.mentions(&["pool"]) {
            Operation::Pools
        } else if fileset && req.param("fileset").is_some() {
            Operation::FilesetDetails
        } else if fileset {
            Operation::ListFilesets
        } else if req.param("filesystem").is_some() {
            Operation::FilesystemDetails
        } else {
            Operation::ListFilesystems
        }
    }
}

fn ask_for(what: &str, example: &str) -> String {
    format!("Please specify {}. Example: '{}'", what, example)
}

impl StorageAgent {
    pub fn new(executor: Arc<ToolExecutor>, formatter: Arc<dyn ResponseFormatter>) -> Self {
        Self {
            core: AgentCore::new(AgentKind::Storage, executor, formatter),
        }
    }

    async fn handle(&self, req: &AgentRequest) -> Step<String> {
        let op = Operation::detect(req);
        let filesystem = req.param("filesystem");
        let fileset = req.param("fileset");

        match op {
            Operation::Unmount | Operation::Mount => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for(
                        "a filesystem name",
                        "Mount filesystem gpfs01 on all nodes",
                    ));
                };
                let (tool, verb) = if op == Operation::Unmount {
                    ("unmount_filesystem", "Unmounted")
                } else {
                    ("mount_filesystem", "Mounted")
                };
                let title = format!("Filesystem {}: {}", verb, filesystem);
                self.run(req, tool, json!({"filesystem": filesystem}), &title)
                    .await
            }

            Operation::DeleteFilesystem => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for("a filesystem name", "Delete filesystem scratch01"));
                };
                let title = format!("Filesystem Deleted: {}", filesystem);
                self.run(req, "delete_filesystem", json!({"filesystem": filesystem}), &title)
                    .await
            }

            Operation::Unlink
            | Operation::Link
            | Operation::DeleteFileset
            | Operation::CreateFileset => {
                let (Some(filesystem), Some(fileset)) = (filesystem, fileset) else {
                    return Ok(ask_for(
                        "both a filesystem and a fileset",
                        "Create fileset project-data in filesystem gpfs01",
                    ));
                };
                let mut args = Map::new();
                args.insert("filesystem".into(), json!(filesystem));
                args.insert("fileset".into(), json!(fileset));

                let (tool, verb) = match op {
                    Operation::Unlink => ("unlink_fileset", "Unlinked"),
                    Operation::Link => ("link_fileset", "Linked"),
                    Operation::DeleteFileset => ("delete_fileset", "Deleted"),
                    _ => ("create_fileset", "Created"),
                };
                if matches!(op, Operation::Link | Operation::CreateFileset) {
                    if let Some(path) = req.param("path") {
                        args.insert("junction_path".into(), json!(path));
                    }
                }
                let title = format!("Fileset {}: {}", verb, fileset);
                self.run(req, tool, Value::Object(args), &title).await
            }

            Operation::Pools => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for(
                        "a filesystem name",
                        "Show storage pools in filesystem gpfs01",
                    ));
                };
                let pools = self
                    .core
                    .fetch(req, "list_storage_pools", json!({"filesystem": filesystem}))
                    .await?;
                Ok(self
                    .core
                    .formatter()
                    .format_list(&list_items(&pools), &format!("Storage Pools: {}", filesystem)))
            }

            Operation::FilesetDetails => {
                let (Some(filesystem), Some(fileset)) = (filesystem, fileset) else {
                    return Ok(ask_for(
                        "the filesystem the fileset lives in",
                        "Show fileset project-data in filesystem gpfs01",
                    ));
                };
                self.run(
                    req,
                    "get_fileset",
                    json!({"filesystem": filesystem, "fileset": fileset}),
                    &format!("Fileset: {}", fileset),
                )
                .await
            }

            Operation::ListFilesets => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for(
                        "a filesystem name",
                        "List filesets in filesystem gpfs01",
                    ));
                };
                let filesets = self
                    .core
                    .fetch(req, "list_filesets", json!({"filesystem": filesystem}))
                    .await?;
                Ok(self
                    .core
                    .formatter()
                    .format_list(&list_items(&filesets), &format!("Filesets in {}", filesystem)))
            }

            Operation::FilesystemDetails => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for("a filesystem name", "Show filesystem gpfs01"));
                };
                self.run(
                    req,
                    "get_filesystem",
                    json!({"filesystem": filesystem}),
                    &format!("Filesystem: {}", filesystem),
                )
                .await
            }

            Operation::ListFilesystems => {
                let listing = self.core.fetch(req, "list_filesystems", json!({})).await?;
                Ok(self.core.formatter().format(&listing, Some("Filesystems")))
            }
        }
    }

    async fn run(&self, req: &AgentRequest, tool: &str, args: Value, title: &str) -> Step<String> {
        let content = self.core.fetch(req, tool, args).await?;
        Ok(self.core.formatter().format(&content, Some(title)))
    }
}

#[async_trait]
impl ScaleAgent for StorageAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Storage
    }

    fn description(&self) -> &str {
        "Manages filesystems, filesets and storage pools. \
         Destructive operations require explicit confirmation."
    }

    async fn process(&self, request: &AgentRequest) -> String {
        let step = self.handle(request).await;
        self.core.finish(step, "storage operation")
    }
}
