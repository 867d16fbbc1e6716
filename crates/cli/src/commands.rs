//! Subcommand implementations over the JSON file store.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::info;

use supplysync_catalog::SupplierProfile;
use supplysync_infra::{
    CancellationToken, JsonFileStore, JsonLinesAuditLog, QuickStockUpdater, ReconciliationEngine,
    SyncConfig,
};

use crate::cli::RunArgs;

/// Environment configuration with command-line overrides applied.
pub fn resolve_config(args: &RunArgs, base: SyncConfig) -> SyncConfig {
    let mut config = base;
    if let Some(store) = &args.store {
        config.store_path = store.clone();
    }
    if let Some(dir) = &args.audit_dir {
        config.audit_dir = dir.clone();
    }
    if let Some(profile) = &args.profile {
        config.profile = profile.clone();
    }
    config
}

pub fn load_profile(args: &RunArgs, config: &SyncConfig) -> anyhow::Result<SupplierProfile> {
    match &args.profile_file {
        Some(path) => read_profile_file(path),
        None => match SupplierProfile::builtin(&config.profile) {
            Some(profile) => Ok(profile),
            None => bail!("unknown supplier profile {:?}", config.profile),
        },
    }
}

fn read_profile_file(path: &Path) -> anyhow::Result<SupplierProfile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading profile file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing profile file {}", path.display()))
}

struct Session {
    store: Arc<JsonFileStore>,
    audit: Arc<JsonLinesAuditLog>,
    profile: SupplierProfile,
}

fn open_session(args: &RunArgs, config: &SyncConfig) -> anyhow::Result<Session> {
    let profile = load_profile(args, config)?;
    let store = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let audit = JsonLinesAuditLog::create_for_run(&config.audit_dir, Utc::now())
        .with_context(|| format!("creating audit log in {}", config.audit_dir.display()))?;
    info!(
        profile = %profile.name,
        store = %config.store_path.display(),
        audit = %audit.path().display(),
        "session opened"
    );
    Ok(Session {
        store: Arc::new(store),
        audit: Arc::new(audit),
        profile,
    })
}

pub fn full_sync(
    args: &RunArgs,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let session = open_session(args, config)?;
    let engine = ReconciliationEngine::new(session.store.clone(), session.profile)
        .context("preparing reconciliation")?
        .with_audit(session.audit.clone())
        .with_cancellation(cancel.clone());

    let result = engine.full_sync_file(&args.feed);
    // Rows applied before a mid-stream failure are kept.
    session.store.flush().context("saving store")?;
    let summary = result.with_context(|| format!("full sync of {}", args.feed.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn quick_stock(
    args: &RunArgs,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let session = open_session(args, config)?;
    let updater = QuickStockUpdater::new(session.store.clone(), &session.profile)
        .context("preparing stock update")?
        .with_audit(session.audit.clone())
        .with_cancellation(cancel.clone());

    let summary = updater
        .update_from_file(&args.feed)
        .with_context(|| format!("stock update from {}", args.feed.display()))?;
    session.store.flush().context("saving store")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            feed: PathBuf::from("feed.csv"),
            profile: None,
            profile_file: None,
            store: None,
            audit_dir: None,
        }
    }

    #[test]
    fn flags_override_environment() {
        let mut args = args();
        args.store = Some(PathBuf::from("/tmp/store.json"));
        let config = resolve_config(&args, SyncConfig::default());
        assert_eq!(config.store_path, PathBuf::from("/tmp/store.json"));
        assert_eq!(config.audit_dir, SyncConfig::default().audit_dir);
    }

    #[test]
    fn unknown_builtin_profile_is_an_error() {
        let mut args = args();
        args.profile = Some("nope".to_string());
        let config = resolve_config(&args, SyncConfig::default());
        let err = load_profile(&args, &config).unwrap_err();
        assert!(err.to_string().contains("unknown supplier profile"));
    }

    fn store_statuses(path: &Path) -> Vec<String> {
        let store: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        store["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["status"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn cancelled_run_keeps_items_and_flushes_store() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("alltron.csv");
        let mut row = vec![String::new(); 20];
        row[0] = "1289".to_string();
        row[2] = "Transferrolle".to_string();
        row[7] = "12,50".to_string();
        fs::write(&feed, format!("Artikelnummer\n{}\n", row.join("\t"))).unwrap();

        let mut args = args();
        args.feed = feed.clone();
        args.store = Some(dir.path().join("store.json"));
        args.audit_dir = Some(dir.path().join("log"));
        let config = resolve_config(&args, SyncConfig::default());

        full_sync(&args, &config, &CancellationToken::new()).unwrap();
        assert_eq!(store_statuses(&config.store_path), vec!["active"]);

        // A header-only feed would delete everything; cancellation must not.
        fs::write(&feed, "Artikelnummer\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        full_sync(&args, &config, &cancel).unwrap();
        assert_eq!(store_statuses(&config.store_path), vec!["active"]);
    }

    #[test]
    fn profile_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.json");
        fs::write(
            &path,
            r#"{"name":"acme","supplier_name":"Acme GmbH","separator":";","columns":{"supplier_product_code":0,"name01":1}}"#,
        )
        .unwrap();

        let mut args = args();
        args.profile_file = Some(path);
        let profile = load_profile(&args, &SyncConfig::default()).unwrap();
        assert_eq!(profile.supplier_name, "Acme GmbH");
    }
}
