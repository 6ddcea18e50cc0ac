use crate::engine::PolicyEngine;
use crate::model::{ChangeRequest, ChangeRequestStatus, Policy};
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use pipeguard_core::{fsutil, ids, PipeguardError, Result, Settings};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

static SEMVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("static pattern"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersionInfo {
    pub version: String,
    /// Archive timestamp (`%Y%m%d%H%M%S`), absent for the live version.
    pub archived_at: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub policy_id: String,
    pub from_version: String,
    pub to_version: String,
    pub unified_diff: String,
}

/// Filesystem-backed policy lifecycle store.
///
/// Live documents sit at `<policy_dir>/<id>.yaml`; every change
/// archives the outgoing version to
/// `<archive_dir>/<id>/<id>_v<ver>_<utc-ts>.yaml` first. The archive is
/// append-only. Change-request implementation serializes per policy id.
pub struct PolicyStore {
    settings: Settings,
    engine: PolicyEngine,
    apply_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PolicyStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            engine: PolicyEngine::new(),
            apply_locks: DashMap::new(),
        }
    }

    fn change_requests_dir(&self) -> PathBuf {
        self.settings.policy_dir.join("change_requests")
    }

    fn change_request_path(&self, id: &str) -> PathBuf {
        self.change_requests_dir().join(format!("{}.json", id))
    }

    pub async fn list_policies(&self) -> Result<Vec<Policy>> {
        let dir = &self.settings.policy_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut policies = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false);
            if !is_yaml || !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match self.engine.load_policy_from_yaml(&content) {
                Ok(policy) => policies.push(policy),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unparseable policy"),
            }
        }
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(policies)
    }

    pub async fn get_policy(&self, policy_id: &str) -> Result<Option<Policy>> {
        let path = self.settings.policy_path(policy_id);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(self.engine.load_policy_from_yaml(&content)?))
    }

    /// Create a new policy from a YAML document. Duplicate ids are
    /// rejected.
    pub async fn create_policy(&self, yaml: &str) -> Result<Policy> {
        let mut policy = self.engine.load_policy_from_yaml(yaml)?;
        if self.get_policy(&policy.id).await?.is_some() {
            return Err(PipeguardError::Conflict(format!(
                "policy '{}' already exists",
                policy.id
            )));
        }

        let now = Utc::now();
        policy.created_at = now;
        policy.updated_at = now;
        fsutil::write_yaml(&self.settings.policy_path(&policy.id), &policy).await?;
        info!(policy_id = %policy.id, version = %policy.version, "created policy");
        Ok(policy)
    }

    /// Replace a policy document: archive the outgoing version, bump
    /// the patch component, stamp `updated_at`.
    pub async fn update_policy(&self, policy_id: &str, yaml: &str) -> Result<Policy> {
        let current = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| PipeguardError::NotFound(format!("policy '{}'", policy_id)))?;

        self.archive_policy(&current).await?;

        let mut updated = self.engine.load_policy_from_yaml(yaml)?;
        updated.id = current.id.clone();
        updated.created_at = current.created_at;
        updated.version = increment_version(&current.version);
        updated.updated_at = Utc::now();

        fsutil::write_yaml(&self.settings.policy_path(policy_id), &updated).await?;
        info!(
            policy_id = %policy_id,
            from = %current.version,
            to = %updated.version,
            "updated policy"
        );
        Ok(updated)
    }

    /// Archive, then remove the live document.
    pub async fn delete_policy(&self, policy_id: &str) -> Result<Policy> {
        let current = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| PipeguardError::NotFound(format!("policy '{}'", policy_id)))?;

        self.archive_policy(&current).await?;
        fs::remove_file(self.settings.policy_path(policy_id)).await?;
        info!(policy_id = %policy_id, "deleted policy");
        Ok(current)
    }

    async fn archive_policy(&self, policy: &Policy) -> Result<()> {
        let dir = self.settings.policy_archive_dir_for(&policy.id);
        let filename = format!(
            "{}_v{}_{}.yaml",
            policy.id,
            policy.version,
            ids::archive_timestamp()
        );
        fsutil::write_yaml(&dir.join(filename), policy).await?;
        Ok(())
    }

    /// All known versions: archived ones plus the live document, sorted
    /// by `(major, minor, patch)`; invalid versions sort as `(0,0,0)`.
    pub async fn get_policy_versions(&self, policy_id: &str) -> Result<Vec<PolicyVersionInfo>> {
        let current = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| PipeguardError::NotFound(format!("policy '{}'", policy_id)))?;

        let mut versions = vec![PolicyVersionInfo {
            version: current.version.clone(),
            archived_at: None,
            is_current: true,
        }];

        for (version, timestamp, _) in self.archived_entries(policy_id).await? {
            versions.push(PolicyVersionInfo {
                version,
                archived_at: Some(timestamp),
                is_current: false,
            });
        }

        versions.sort_by(|a, b| {
            version_tuple(&a.version)
                .cmp(&version_tuple(&b.version))
                .then_with(|| a.archived_at.cmp(&b.archived_at))
        });
        Ok(versions)
    }

    /// Archive entries as `(version, timestamp, path)`.
    async fn archived_entries(&self, policy_id: &str) -> Result<Vec<(String, String, PathBuf)>> {
        let dir = self.settings.policy_archive_dir_for(policy_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}_v", policy_id);
        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(".yaml") else {
                continue;
            };
            let Some(rest) = stem.strip_prefix(&prefix) else {
                continue;
            };
            // `<version>_<timestamp>` with the timestamp after the last
            // underscore.
            let Some((version, timestamp)) = rest.rsplit_once('_') else {
                continue;
            };
            entries.push((version.to_string(), timestamp.to_string(), entry.path()));
        }
        Ok(entries)
    }

    pub async fn get_policy_version(&self, policy_id: &str, version: &str) -> Result<Policy> {
        let current = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| PipeguardError::NotFound(format!("policy '{}'", policy_id)))?;
        if current.version == version {
            return Ok(current);
        }

        let mut matches: Vec<(String, String, PathBuf)> = self
            .archived_entries(policy_id)
            .await?
            .into_iter()
            .filter(|(v, _, _)| v == version)
            .collect();
        matches.sort_by(|a, b| a.1.cmp(&b.1));

        let Some((_, _, path)) = matches.pop() else {
            return Err(PipeguardError::NotFound(format!(
                "policy '{}' version '{}'",
                policy_id, version
            )));
        };
        let content = fs::read_to_string(&path).await?;
        self.engine.load_policy_from_yaml(&content)
    }

    /// Bring an archived version back as the live document. Runs as an
    /// update, so the replaced version is archived and the restored
    /// content gets a fresh patch bump.
    pub async fn restore_policy_version(&self, policy_id: &str, version: &str) -> Result<Policy> {
        let restored = self.get_policy_version(policy_id, version).await?;
        let yaml = self.engine.policy_to_yaml(&restored)?;
        self.update_policy(policy_id, &yaml).await
    }

    /// Unified diff of the two versions' YAML serializations, taken
    /// verbatim (no whitespace normalization).
    pub async fn compare_policy_versions(
        &self,
        policy_id: &str,
        from_version: &str,
        to_version: &str,
    ) -> Result<VersionDiff> {
        let from = self.get_policy_version(policy_id, from_version).await?;
        let to = self.get_policy_version(policy_id, to_version).await?;

        let from_yaml = self.engine.policy_to_yaml(&from)?;
        let to_yaml = self.engine.policy_to_yaml(&to)?;

        let diff = TextDiff::from_lines(&from_yaml, &to_yaml);
        let unified = diff
            .unified_diff()
            .header(
                &format!("{}@{}", policy_id, from_version),
                &format!("{}@{}", policy_id, to_version),
            )
            .to_string();

        Ok(VersionDiff {
            policy_id: policy_id.to_string(),
            from_version: from_version.to_string(),
            to_version: to_version.to_string(),
            unified_diff: unified,
        })
    }

    pub async fn create_change_request(
        &self,
        policy_id: &str,
        requested_by: &str,
        changes: Value,
        reason: &str,
    ) -> Result<ChangeRequest> {
        if self.get_policy(policy_id).await?.is_none() {
            return Err(PipeguardError::NotFound(format!("policy '{}'", policy_id)));
        }

        let request = ChangeRequest {
            id: ids::uuid_id(),
            policy_id: policy_id.to_string(),
            requested_by: requested_by.to_string(),
            requested_at: Utc::now(),
            changes,
            reason: reason.to_string(),
            status: ChangeRequestStatus::Pending,
            approved_by: None,
            approved_at: None,
            implemented_at: None,
        };
        fsutil::write_json(&self.change_request_path(&request.id), &request).await?;
        Ok(request)
    }

    pub async fn get_change_request(&self, request_id: &str) -> Result<ChangeRequest> {
        let path = self.change_request_path(request_id);
        if !path.is_file() {
            return Err(PipeguardError::NotFound(format!(
                "change request '{}'",
                request_id
            )));
        }
        fsutil::read_json(&path).await
    }

    pub async fn approve_change_request(
        &self,
        request_id: &str,
        approver: &str,
    ) -> Result<ChangeRequest> {
        let mut request = self.get_change_request(request_id).await?;
        if request.status != ChangeRequestStatus::Pending {
            return Err(PipeguardError::state(
                "change_request_not_pending",
                format!("change request '{}' is {:?}", request_id, request.status),
            ));
        }
        request.status = ChangeRequestStatus::Approved;
        request.approved_by = Some(approver.to_string());
        request.approved_at = Some(Utc::now());
        fsutil::write_json(&self.change_request_path(request_id), &request).await?;
        Ok(request)
    }

    pub async fn reject_change_request(
        &self,
        request_id: &str,
        approver: &str,
    ) -> Result<ChangeRequest> {
        let mut request = self.get_change_request(request_id).await?;
        if request.status != ChangeRequestStatus::Pending {
            return Err(PipeguardError::state(
                "change_request_not_pending",
                format!("change request '{}' is {:?}", request_id, request.status),
            ));
        }
        request.status = ChangeRequestStatus::Rejected;
        request.approved_by = Some(approver.to_string());
        request.approved_at = Some(Utc::now());
        fsutil::write_json(&self.change_request_path(request_id), &request).await?;
        Ok(request)
    }

    /// Apply an approved change request to its policy. Applies are
    /// serialized per policy id; the diff (field replacements plus rule
    /// add/update/remove) lands through `update_policy`.
    pub async fn implement_change_request(
        &self,
        request_id: &str,
    ) -> Result<(Policy, ChangeRequest)> {
        let mut request = self.get_change_request(request_id).await?;
        if request.status != ChangeRequestStatus::Approved {
            return Err(PipeguardError::state(
                "change_request_not_approved",
                format!("change request '{}' is {:?}", request_id, request.status),
            ));
        }

        let lock = self
            .apply_locks
            .entry(request.policy_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let current = self
            .get_policy(&request.policy_id)
            .await?
            .ok_or_else(|| PipeguardError::NotFound(format!("policy '{}'", request.policy_id)))?;

        let mut document = serde_json::to_value(&current)?;
        apply_changes(&mut document, &request.changes);
        let yaml = serde_yaml::to_string(&document)?;
        let updated = self.update_policy(&request.policy_id, &yaml).await?;

        request.status = ChangeRequestStatus::Implemented;
        request.implemented_at = Some(Utc::now());
        fsutil::write_json(&self.change_request_path(request_id), &request).await?;

        Ok((updated, request))
    }
}

/// Apply a change-request diff: top-level field replacements, with the
/// `rules` entry interpreted as add/update/remove lists.
fn apply_changes(document: &mut Value, changes: &Value) {
    let Some(changes) = changes.as_object() else {
        return;
    };
    for (field, value) in changes {
        if field == "rules" {
            apply_rule_changes(document, value);
        } else if let Some(target) = document.as_object_mut() {
            target.insert(field.clone(), value.clone());
        }
    }
}

fn apply_rule_changes(document: &mut Value, rule_changes: &Value) {
    let Some(rule_changes) = rule_changes.as_object() else {
        return;
    };
    let Some(rules) = document
        .as_object_mut()
        .and_then(|d| d.get_mut("rules"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    if let Some(added) = rule_changes.get("add").and_then(Value::as_array) {
        for rule in added {
            let mut rule = rule.clone();
            if rule.get("id").is_none() {
                if let Some(object) = rule.as_object_mut() {
                    object.insert("id".to_string(), Value::String(ids::uuid_id()));
                }
            }
            rules.push(rule);
        }
    }

    if let Some(updated) = rule_changes.get("update").and_then(Value::as_array) {
        for replacement in updated {
            let Some(id) = replacement.get("id").and_then(Value::as_str) else {
                continue;
            };
            for rule in rules.iter_mut() {
                if rule.get("id").and_then(Value::as_str) == Some(id) {
                    *rule = replacement.clone();
                    break;
                }
            }
        }
    }

    if let Some(removed) = rule_changes.get("remove").and_then(Value::as_array) {
        let removed_ids: Vec<&str> = removed.iter().filter_map(Value::as_str).collect();
        rules.retain(|rule| {
            rule.get("id")
                .and_then(Value::as_str)
                .map(|id| !removed_ids.contains(&id))
                .unwrap_or(true)
        });
    }
}

pub fn version_tuple(version: &str) -> (u64, u64, u64) {
    let Some(capture) = SEMVER.captures(version) else {
        return (0, 0, 0);
    };
    let part = |i: usize| {
        capture
            .get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    (part(1), part(2), part(3))
}

/// Patch-only bump; anything unparseable resets to `1.0.0`.
pub fn increment_version(version: &str) -> String {
    let Some(capture) = SEMVER.captures(version) else {
        return "1.0.0".to_string();
    };
    let part = |i: usize| {
        capture
            .get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    format!("{}.{}.{}", part(1), part(2), part(3) + 1)
}
