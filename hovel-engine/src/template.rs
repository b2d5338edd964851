//! Workspace rendering from the app template.
//!
//! Rendering copies the template tree into the branch workspace, substitutes
//! `{{KEY}}` placeholders in the known text artifacts, renders `.gemini`
//! template files to their live names, and filters the multi-service compose
//! template down to the branch's requested services.
//!
//! Placeholders with no matching substitution are left intact and warned
//! about, never rejected: templates are allowed to carry keys rendered by
//! later stages.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml_ng::{Mapping, Value};
use tracing::warn;

use hovel_core::error::{HovelError, Result};
use hovel_core::fs::copy_tree;

/// Multi-service compose template shipped with the app template.
pub const COMPOSE_TEMPLATE_FILE: &str = "docker-compose.branch.template.yaml";

/// Rendered compose file name in the branch workspace.
pub const COMPOSE_OUTPUT_FILE: &str = "docker-compose.yaml";

/// Literal branch-name placeholder, also stripped from service names when it
/// survives as a suffix.
const BRANCH_NAME_PLACEHOLDER: &str = "{{BRANCH_NAME}}";

/// The substitution map every branch is rendered with.
pub fn branch_substitutions(
    branch_name: &str,
    port: u16,
    api_key: &str,
) -> BTreeMap<String, String> {
    let mut subs = BTreeMap::new();
    subs.insert("BRANCH_NAME".to_string(), branch_name.to_string());
    subs.insert("PORT".to_string(), port.to_string());
    subs.insert("PORT_TTYD".to_string(), (port + 1000).to_string());
    subs.insert("GEMINI_API_KEY".to_string(), api_key.to_string());
    subs
}

/// Strip the per-branch suffix from a compose service name: either the
/// literal `-{{BRANCH_NAME}}` placeholder or `-<branch_name>`
/// (case-insensitive).
pub fn strip_service_suffix<'a>(service: &'a str, branch_name: &str) -> &'a str {
    if let Some(base) = service.strip_suffix(&format!("-{}", BRANCH_NAME_PLACEHOLDER)) {
        return base;
    }
    let suffix = format!("-{}", branch_name);
    if service.len() > suffix.len()
        && service[service.len() - suffix.len()..].eq_ignore_ascii_case(&suffix)
    {
        return &service[..service.len() - suffix.len()];
    }
    service
}

/// The service names a template declares, with branch suffixes stripped.
pub fn declared_services(template_root: &Path) -> Result<Vec<String>> {
    let path = template_root.join(COMPOSE_TEMPLATE_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        HovelError::Template(format!(
            "cannot read compose template {}: {}",
            path.display(),
            e
        ))
    })?;
    let doc: Value = serde_yaml_ng::from_str(&content)?;
    let services = doc
        .get("services")
        .and_then(|s| s.as_mapping())
        .ok_or_else(|| {
            HovelError::Template(format!("no services mapping in {}", path.display()))
        })?;

    Ok(services
        .keys()
        .filter_map(|k| k.as_str())
        .map(|name| strip_service_suffix(name, "").to_string())
        .collect())
}

/// The compose service keys of an already-rendered workspace.
pub fn rendered_services(workspace_dir: &Path) -> Result<Vec<String>> {
    let path = workspace_dir.join(COMPOSE_OUTPUT_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        HovelError::Template(format!("cannot read {}: {}", path.display(), e))
    })?;
    let doc: Value = serde_yaml_ng::from_str(&content)?;
    let services = doc
        .get("services")
        .and_then(|s| s.as_mapping())
        .ok_or_else(|| {
            HovelError::Template(format!("no services mapping in {}", path.display()))
        })?;
    Ok(services
        .keys()
        .filter_map(|k| k.as_str().map(String::from))
        .collect())
}

/// Render the template into `target_dir` for one branch.
///
/// `services` is the requested service subset (already defaulted by the
/// caller, never empty). On error the caller owns cleanup of the partial
/// target directory.
pub fn render(
    template_root: &Path,
    target_dir: &Path,
    substitutions: &BTreeMap<String, String>,
    services: &[String],
) -> Result<()> {
    let branch_name = substitutions
        .get("BRANCH_NAME")
        .ok_or_else(|| HovelError::Template("missing BRANCH_NAME substitution".to_string()))?
        .clone();

    copy_tree(template_root, target_dir)?;

    // Placeholder pass over every text artifact in the copied tree.
    for file in collect_files(target_dir)? {
        let rel = file
            .strip_prefix(target_dir)
            .expect("walked file outside target dir");
        if !is_text_artifact(rel) {
            continue;
        }
        let content = fs::read_to_string(&file)?;
        let (rendered, unknown) = substitute(&content, substitutions);
        for key in unknown {
            warn!(
                artifact = %rel.display(),
                placeholder = %key,
                "placeholder left unsubstituted"
            );
        }
        fs::write(&file, rendered)?;
    }

    render_gemini_templates(target_dir)?;
    filter_compose_spec(target_dir, &branch_name, services)?;
    ensure_env_file(target_dir, substitutions)?;

    Ok(())
}

/// Apply `{{KEY}}` substitutions; returns the rendered text and the keys of
/// placeholders that had no substitution.
fn substitute(
    content: &str,
    substitutions: &BTreeMap<String, String>,
) -> (String, BTreeSet<String>) {
    let mut rendered = content.to_string();
    for (key, value) in substitutions {
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), value);
    }

    let mut unknown = BTreeSet::new();
    let mut rest = rendered.as_str();
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                if !key.is_empty()
                    && key
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    unknown.insert(key.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }

    (rendered, unknown)
}

/// Whether a relative path is one of the declared text artifacts that get
/// placeholder substitution.
fn is_text_artifact(rel: &Path) -> bool {
    if rel.starts_with(".gemini") {
        return true;
    }
    let name = match rel.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    if name == ".env" || name == "Dockerfile" {
        return true;
    }
    matches!(
        rel.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml") | Some("json") | Some("js") | Some("py")
    )
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Render `.gemini/*.template.*` files to their live sibling name
/// (`settings.template.json` becomes `settings.json`) and drop the template
/// copies. Substitution already ran over these files.
fn render_gemini_templates(target_dir: &Path) -> Result<()> {
    let gemini_dir = target_dir.join(".gemini");
    if !gemini_dir.is_dir() {
        return Ok(());
    }

    for file in collect_files(&gemini_dir)? {
        let name = match file.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if !name.contains(".template.") {
            continue;
        }
        let live_name = name.replacen(".template.", ".", 1);
        let live_path = file.with_file_name(live_name);
        fs::rename(&file, &live_path)?;
    }

    Ok(())
}

/// Filter the substituted compose template down to the requested services
/// and write it as the workspace compose file.
fn filter_compose_spec(target_dir: &Path, branch_name: &str, services: &[String]) -> Result<()> {
    let template_path = target_dir.join(COMPOSE_TEMPLATE_FILE);
    let content = fs::read_to_string(&template_path).map_err(|e| {
        HovelError::Template(format!(
            "cannot read compose template {}: {}",
            template_path.display(),
            e
        ))
    })?;

    let filtered = filter_compose(&content, branch_name, services)?;
    fs::write(target_dir.join(COMPOSE_OUTPUT_FILE), filtered)?;
    fs::remove_file(&template_path)?;

    Ok(())
}

/// Produce a compose document whose `services` mapping contains only the
/// requested service set. All other top-level stanzas pass through verbatim.
pub fn filter_compose(content: &str, branch_name: &str, services: &[String]) -> Result<String> {
    let mut doc: Value = serde_yaml_ng::from_str(content)?;
    let mapping = doc
        .as_mapping_mut()
        .ok_or_else(|| HovelError::Template("compose spec is not a mapping".to_string()))?;

    let services_key = Value::String("services".to_string());
    let declared = mapping
        .get_mut(&services_key)
        .and_then(|s| s.as_mapping_mut())
        .ok_or_else(|| HovelError::Template("compose spec has no services".to_string()))?;

    let mut kept = Mapping::new();
    let mut matched: BTreeSet<String> = BTreeSet::new();

    for (key, spec) in declared.iter() {
        let name = match key.as_str() {
            Some(n) => n,
            None => continue,
        };
        let base = strip_service_suffix(name, branch_name);
        if let Some(requested) = services.iter().find(|r| r.eq_ignore_ascii_case(base)) {
            matched.insert(requested.to_ascii_lowercase());
            kept.insert(key.clone(), spec.clone());
        }
    }

    for requested in services {
        if !matched.contains(&requested.to_ascii_lowercase()) {
            return Err(HovelError::UnknownService(requested.clone()));
        }
    }

    if kept.is_empty() {
        return Err(HovelError::NoServices);
    }

    mapping.insert(services_key, Value::Mapping(kept));
    Ok(serde_yaml_ng::to_string(&doc)?)
}

/// The original controller always wrote a branch env file; synthesize one
/// when the template does not carry its own.
fn ensure_env_file(target_dir: &Path, substitutions: &BTreeMap<String, String>) -> Result<()> {
    let env_path = target_dir.join(".env");
    if env_path.exists() {
        return Ok(());
    }

    let branch_name = substitutions.get("BRANCH_NAME").cloned().unwrap_or_default();
    let port = substitutions.get("PORT").cloned().unwrap_or_default();
    let content = format!(
        "# Environment variables for branch: {}\nPORT={}\nBRANCH_NAME={}\n",
        branch_name, port, branch_name
    );
    fs::write(&env_path, content)?;
    Ok(())
}
