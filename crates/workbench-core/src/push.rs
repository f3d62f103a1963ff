//! Batched push of pending changes to the remote service.
//!
//! One pass drains the tracker in two phases:
//!
//! 1. Template-section changes, grouped per owning template. The API accepts
//!    only whole documents, so every pending section is folded into the
//!    template's last-synced document and one update call is issued per
//!    template.
//! 2. Tag/variable changes, one update call each, with any staged rename
//!    applied to the display name first.
//!
//! Failures are recorded per item and never interrupt the remaining work.
//! The tracker is cleared only when every operation succeeded; after any
//! failure all pending changes stay in place (succeeded ones included) and
//! the caller is expected to reload the workspace for a consistent view.

use crate::api::TagManagerApi;
use crate::changes::PendingChange;
use crate::entity::{EntityRef, FolderKind};
use crate::events::WorkbenchEvent;
use crate::store::Workbench;
use crate::template::replace_section;

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One failed push operation, identified well enough for the user to find
/// the entity that needs attention.
#[derive(Debug, Clone, Serialize)]
pub struct PushFailure {
    pub name: String,
    pub message: String,
}

/// Outcome of a push pass.
#[derive(Debug, Default, Serialize)]
pub struct PushReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<PushFailure>,
}

impl PushReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl<A: TagManagerApi> Workbench<A> {
    /// Push every pending change to the remote service.
    ///
    /// Each successful update overwrites the affected tree nodes' entity
    /// references with the server's response (fresh fingerprint). No call is
    /// retried; the caller decides whether to push again.
    pub async fn push_all(&mut self) -> PushReport {
        let mut report = PushReport::default();

        // Snapshot the tracker; the tree is reconciled as results arrive.
        let mut template_groups: HashMap<String, Vec<(String, PendingChange)>> = HashMap::new();
        let mut items: Vec<(String, PendingChange)> = Vec::new();
        for (address, change) in self.changes.iter() {
            match &change.entity {
                EntityRef::Template(template) => template_groups
                    .entry(template.path.clone())
                    .or_default()
                    .push((address.clone(), change.clone())),
                EntityRef::Item(_) => items.push((address.clone(), change.clone())),
            }
        }

        debug!(
            templates = template_groups.len(),
            items = items.len(),
            "pushing pending changes"
        );

        for group in template_groups.into_values() {
            self.push_template_group(&group, &mut report).await;
        }
        for (address, change) in &items {
            self.push_item(address, change, &mut report).await;
        }

        if report.failed == 0 {
            self.changes.clear();
            self.emit_modifications_changed();
        } else {
            warn!(
                failed = report.failed,
                succeeded = report.succeeded,
                "push finished with failures, pending changes retained"
            );
        }
        self.events.emit(WorkbenchEvent::PushCompleted {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        report
    }

    /// Push all pending sections of one template as a single update call.
    async fn push_template_group(
        &mut self,
        group: &[(String, PendingChange)],
        report: &mut PushReport,
    ) {
        let EntityRef::Template(template) = &group[0].1.entity else {
            return;
        };

        let mut document = template.template_data.clone();
        for (_, change) in group {
            if let Some(marker) = change.marker.as_deref() {
                document = replace_section(&document, marker, &change.new_code);
            }
        }
        let mut updated = template.clone();
        updated.template_data = document;

        match self.api.update_template(&updated).await {
            Ok(fresh) => {
                report.succeeded += 1;
                for (address, _) in group {
                    if let Ok(file) = self.root.file_at_mut(address) {
                        file.entity = EntityRef::Template(fresh.clone());
                    }
                }
                debug!(template = %fresh.name, sections = group.len(), "template updated");
            }
            Err(err) => {
                report.failed += 1;
                report.errors.push(PushFailure {
                    name: template.name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Push one tag/variable change, applying any staged rename.
    async fn push_item(&mut self, address: &str, change: &PendingChange, report: &mut PushReport) {
        let EntityRef::Item(item) = &change.entity else {
            return;
        };
        let Some(code_key) = change.folder.code_key() else {
            return;
        };

        let mut updated = item.with_code(code_key, &change.new_code);
        if let Some(new_name) = &change.new_name {
            updated.name = new_name.clone();
        }

        let result = match change.folder {
            FolderKind::Tags => self.api.update_tag(&updated).await,
            FolderKind::Variables => self.api.update_variable(&updated).await,
            FolderKind::Templates => return,
        };

        match result {
            Ok(fresh) => {
                report.succeeded += 1;
                if let Ok(file) = self.root.file_at_mut(address) {
                    file.entity = EntityRef::Item(fresh);
                }
                debug!(address, "item updated");
            }
            Err(err) => {
                report.failed += 1;
                report.errors.push(PushFailure {
                    name: change.file_name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::config::WorkbenchConfig;
    use crate::entity::{CodeItem, Parameter, Template};

    const WS: &str = "accounts/1/containers/2/workspaces/3";

    fn variable(name: &str, code: &str) -> CodeItem {
        let id = name.to_lowercase().replace(' ', "-");
        CodeItem {
            id: id.clone(),
            name: name.to_string(),
            item_type: "jsm".to_string(),
            parameter: vec![Parameter {
                param_type: "template".to_string(),
                key: "javascript".to_string(),
                value: code.to_string(),
            }],
            fingerprint: "1".to_string(),
            path: format!("{WS}/variables/{id}"),
        }
    }

    fn template(name: &str, document: &str) -> Template {
        let id = name.to_lowercase().replace(' ', "-");
        Template {
            id: id.clone(),
            name: name.to_string(),
            fingerprint: "1".to_string(),
            path: format!("{WS}/templates/{id}"),
            template_data: document.to_string(),
        }
    }

    fn seeded_api() -> InMemoryApi {
        let api = InMemoryApi::new();
        api.seed_variable(WS, variable("First", "function() { return 1; }"));
        api.seed_variable(WS, variable("Second", "function() { return 2; }"));
        api.seed_template(
            WS,
            template(
                "Consent",
                "___TEMPLATE_PARAMETERS___\n[]\n\n___SANDBOXED_JS_FOR_WEB_TEMPLATE___\nconst a = 1;\n",
            ),
        );
        api
    }

    async fn loaded_workbench(api: InMemoryApi) -> (Workbench<InMemoryApi>, String) {
        let mut workbench = Workbench::new(api, WorkbenchConfig::default());
        let key = workbench
            .load_unit("My Container", "GTM-ABC", WS, "Default")
            .await
            .unwrap();
        (workbench, key)
    }

    #[tokio::test]
    async fn push_with_no_changes_is_empty() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert!(workbench.api.update_calls().is_empty());
    }

    #[tokio::test]
    async fn successful_push_clears_the_tracker() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        workbench
            .write(
                "My Container/Default/variables/First.js",
                b"function() { return 10; }",
            )
            .unwrap();
        workbench
            .write(
                "My Container/Default/variables/Second.js",
                b"function() { return 20; }",
            )
            .unwrap();

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert!(report.errors.is_empty());
        assert!(workbench.list_modified().is_empty());

        // the remote now holds the edited code
        let remote = workbench.api.list_variables(WS).await.unwrap();
        let first = remote.iter().find(|v| v.name == "First").unwrap();
        assert_eq!(first.code("javascript"), Some("function() { return 10; }"));
    }

    #[tokio::test]
    async fn push_refreshes_entity_references() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/variables/First.js";
        workbench.write(address, b"function() { return 10; }").unwrap();
        workbench.push_all().await;

        // buffer now matches the refreshed canonical content, so a
        // re-write of the same body stays clean
        workbench.write(address, b"function() { return 10; }").unwrap();
        assert!(!workbench.is_modified(address));
    }

    #[tokio::test]
    async fn partial_failure_retains_every_pending_change() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        workbench
            .write(
                "My Container/Default/variables/First.js",
                b"function() { return 10; }",
            )
            .unwrap();
        workbench
            .write(
                "My Container/Default/variables/Second.js",
                b"function() { return 20; }",
            )
            .unwrap();
        workbench.api.fail_on("Second");

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "Second.js");
        assert!(report.errors[0].message.contains("injected failure"));

        // both entries retained, the succeeded one included
        let modified = workbench.list_modified();
        assert_eq!(modified.len(), 2);
    }

    #[tokio::test]
    async fn template_sections_push_as_one_call() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        workbench
            .write(
                "My Container/Default/templates/Consent/TEMPLATE_PARAMETERS.json",
                b"[{\"name\": \"gdpr\"}]",
            )
            .unwrap();
        workbench
            .write(
                "My Container/Default/templates/Consent/SANDBOXED_JS_FOR_WEB_TEMPLATE.js",
                b"const a = 2;",
            )
            .unwrap();

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(workbench.api.update_calls(), vec!["Consent".to_string()]);

        // both edits landed in the single merged document
        let remote = workbench.api.list_templates(WS).await.unwrap();
        let doc = &remote[0].template_data;
        assert!(doc.contains("[{\"name\": \"gdpr\"}]"));
        assert!(doc.contains("const a = 2;"));
    }

    #[tokio::test]
    async fn failing_template_does_not_abort_items() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        workbench
            .write(
                "My Container/Default/templates/Consent/TEMPLATE_PARAMETERS.json",
                b"[1]",
            )
            .unwrap();
        workbench
            .write(
                "My Container/Default/variables/First.js",
                b"function() { return 10; }",
            )
            .unwrap();
        workbench.api.fail_on("Consent");

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].name, "Consent");

        // everything still pending after the partial failure
        assert_eq!(workbench.list_modified().len(), 2);
    }

    #[tokio::test]
    async fn push_applies_staged_rename() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/variables/First.js";
        let renamed = workbench.rename_entity(address, "Primary").unwrap();

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 1);
        assert!(workbench.list_modified().is_empty());

        let remote = workbench.api.list_variables(WS).await.unwrap();
        assert!(remote.iter().any(|v| v.name == "Primary"));
        assert!(!remote.iter().any(|v| v.name == "First"));

        // the tree node keeps the renamed address with a fresh entity
        let file = workbench.root.file_at(&renamed).unwrap();
        assert_eq!(file.entity.name(), "Primary");
    }

    #[tokio::test]
    async fn create_then_push_issues_no_update_calls() {
        let (mut workbench, key) = loaded_workbench(seeded_api()).await;
        let address = workbench.create_variable(&key, "Test Var").await.unwrap();
        assert_eq!(address, "My Container/Default/variables/Test_Var.js");

        let report = workbench.push_all().await;
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert!(workbench.api.update_calls().is_empty());
    }
}
