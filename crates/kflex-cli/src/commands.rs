//! Subcommand implementations.

use std::io::{self, Write};

use anyhow::Context as _;
use kflex_core::ControlPlaneIdentity;
use kflex_kubeconfig::{
    codec, AggregateStore, CancellationToken, CredentialDocument, KubeconfigConfig,
    KubeconfigLoader, SecretBundleStore, WaitOptions,
};
use serde::Serialize;

/// Flags of the `merge` subcommand.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub wait: bool,
    pub dry_run: bool,
}

async fn connect(
    config: &KubeconfigConfig,
) -> anyhow::Result<KubeconfigLoader<SecretBundleStore>> {
    let store = SecretBundleStore::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    Ok(KubeconfigLoader::new(store, AggregateStore::from_config(config)))
}

fn wait_options(config: &KubeconfigConfig, cancel: CancellationToken) -> WaitOptions {
    WaitOptions::with_timeout(config.wait_timeout).cancel_on(cancel)
}

pub async fn merge(
    config: &KubeconfigConfig,
    identity: &ControlPlaneIdentity,
    options: MergeOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let loader = connect(config).await?;

    if options.wait {
        loader
            .wait_for_bundle(identity, wait_options(config, cancel))
            .await
            .with_context(|| format!("Waiting for credentials of {identity}"))?;
    }

    if options.dry_run {
        let mut aggregate = loader.aggregate().load_or_default()?;
        loader
            .load_and_merge_no_write(identity, &mut aggregate)
            .await
            .with_context(|| format!("Loading credentials of {identity}"))?;
        io::stdout().write_all(&codec::encode(&aggregate)?)?;
        return Ok(());
    }

    let merged = loader
        .load_and_merge(identity)
        .await
        .with_context(|| format!("Merging credentials of {identity}"))?;
    eprintln!(
        "Switched to context \"{}\" in {}",
        merged.current_context,
        config.aggregate_path.display()
    );
    Ok(())
}

pub async fn wait(
    config: &KubeconfigConfig,
    identity: &ControlPlaneIdentity,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let loader = connect(config).await?;
    loader
        .wait_for_bundle(identity, wait_options(config, cancel))
        .await
        .with_context(|| format!("Waiting for credentials of {identity}"))?;
    eprintln!("Credentials for {identity} are available");
    Ok(())
}

/// One row of the `contexts` listing.
#[derive(Debug, PartialEq, Eq, Serialize)]
struct ContextRow<'a> {
    name: &'a str,
    cluster: &'a str,
    user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    current: bool,
}

fn context_rows(doc: &CredentialDocument) -> Vec<ContextRow<'_>> {
    doc.contexts
        .iter()
        .map(|(name, ctx)| ContextRow {
            name,
            cluster: &ctx.cluster,
            user: &ctx.auth_info,
            namespace: ctx.namespace.as_deref(),
            current: *name == doc.current_context,
        })
        .collect()
}

fn render_table(rows: &[ContextRow<'_>], out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "CURRENT\tNAME\tCLUSTER\tUSER\tNAMESPACE")?;
    for row in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            if row.current { "*" } else { "" },
            row.name,
            row.cluster,
            row.user,
            row.namespace.unwrap_or_default()
        )?;
    }
    Ok(())
}

pub fn contexts(config: &KubeconfigConfig, json: bool) -> anyhow::Result<()> {
    let doc = AggregateStore::from_config(config).load_or_default()?;
    let rows = context_rows(&doc);

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
    } else {
        render_table(&rows, &mut out)?;
    }
    Ok(())
}
