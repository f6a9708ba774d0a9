use crate::error::Result;
use crate::orchestrator::{Orchestrator, PresetSpec};
use crate::store::{MetadataStore, StoreStats, TypeFilter};
use crate::types::{Location, StyleMode};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a single preset generation from CLI flags.
pub async fn generate_single(
    orchestrator: &Orchestrator,
    spec: PresetSpec,
    force: bool,
) -> Result<()> {
    orchestrator
        .process_preset(&spec, force, CancellationToken::new())
        .await
}

/// Summary of a batch run over a preset CSV.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub processed: usize,
    pub skipped_rows: usize,
    pub errors: Vec<String>,
}

/// Processes a preset CSV (`id,name,city,category,context`) strictly
/// sequentially to bound load on the generative services. The header row is
/// always skipped; rows with fewer than 4 fields are skipped; row-level
/// failures are logged and the run continues.
pub async fn generate_batch(
    orchestrator: &Orchestrator,
    csv_path: &str,
    force: bool,
    style: StyleMode,
) -> Result<BatchResult> {
    info!("Running in batch mode from {} (force: {})", csv_path, force);
    let content = std::fs::read_to_string(csv_path)?;

    let mut result = BatchResult::default();
    let rows: Vec<&str> = content.lines().collect();

    for (i, row) in rows.iter().enumerate() {
        if i == 0 {
            continue; // header
        }
        let fields: Vec<&str> = row.split(',').map(|f| f.trim()).collect();
        if fields.len() < 4 {
            result.skipped_rows += 1;
            continue;
        }

        let spec = PresetSpec {
            id: fields[0].to_string(),
            name: fields[1].to_string(),
            city: fields[2].to_string(),
            category: fields[3].to_string(),
            context: fields.get(4).map(|s| s.to_string()).unwrap_or_default(),
            style,
        };

        info!("Processing [{}/{}]: {} ({})", i, rows.len() - 1, spec.name, spec.id);
        println!("🌦  Processing [{}/{}]: {} ({})", i, rows.len() - 1, spec.name, spec.id);
        match orchestrator
            .process_preset(&spec, force, CancellationToken::new())
            .await
        {
            Ok(()) => result.processed += 1,
            Err(e) => {
                error!("Error processing {}: {}", spec.id, e);
                result.errors.push(format!("{}: {}", spec.id, e));
            }
        }
    }

    Ok(result)
}

/// Prints aggregate statistics about the locations collection.
pub async fn run_stats(store: &dyn MetadataStore) -> Result<()> {
    let StoreStats {
        total,
        presets,
        user_generated,
        last_updated,
    } = store.stats().await?;

    println!("{:<18}{}", "Metric", "Value");
    println!("{:<18}{}", "------", "-----");
    println!("{:<18}{}", "Total Locations", total);
    println!("{:<18}{}", "Presets", presets);
    println!("{:<18}{}", "User Generated", user_generated);
    match last_updated {
        Some(ts) => {
            let ago = Utc::now().signed_duration_since(ts);
            println!("{:<18}{} ({}m ago)", "Last Activity", ts.to_rfc2822(), ago.num_minutes());
        }
        None => println!("{:<18}-", "Last Activity"),
    }
    Ok(())
}

/// Lists locations, most recently updated first.
pub async fn run_list(store: &dyn MetadataStore, limit: usize, filter: TypeFilter) -> Result<()> {
    let locs = store.list(limit, filter).await?;

    println!("{:<24}{:<24}{:<8}{:<32}{}", "ID", "Name", "Type", "City", "Updated");
    println!("{:<24}{:<24}{:<8}{:<32}{}", "--", "----", "----", "----", "-------");
    for l in locs {
        let kind = if l.is_preset { "Preset" } else { "User" };
        let mut city = l.city_query.clone();
        if city.len() > 30 {
            city.truncate(27);
            city.push_str("...");
        }
        println!(
            "{:<24}{:<24}{:<8}{:<32}{}",
            l.id,
            l.name,
            kind,
            city,
            l.last_updated.format("%d %b %H:%M")
        );
    }
    Ok(())
}

/// Forces media regeneration for one existing location.
pub async fn run_refresh(orchestrator: &Orchestrator, id: &str, style: StyleMode) -> Result<()> {
    info!("Refreshing location: {} ({:?})", id, style);
    orchestrator.refresh(id, style, CancellationToken::new()).await?;
    println!("✅ Refresh complete for {id}");
    Ok(())
}

/// Legacy flat-file preset entry, as written by the pre-database tooling.
#[derive(Debug, Deserialize)]
pub struct LegacyPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub video_url: String,
}

/// One-time bulk import of a legacy preset list into the metadata store.
pub async fn run_migrate(store: Arc<dyn MetadataStore>, path: &str) -> Result<usize> {
    info!("Reading legacy presets from {}...", path);
    let data = std::fs::read_to_string(path)?;
    let legacy: Vec<LegacyPreset> = serde_json::from_str(&data)?;

    info!("Migrating {} presets...", legacy.len());
    let mut migrated = 0;
    for p in legacy {
        if p.id.is_empty() {
            warn!("Skipping legacy preset with empty id (name: {})", p.name);
            continue;
        }
        let loc = Location {
            id: p.id.clone(),
            name: p.name.clone(),
            // Older presets predate categories
            category: if p.category.is_empty() { "General".to_string() } else { p.category },
            city_query: p.name,
            image_url: p.image_url,
            video_url: p.video_url,
            is_preset: true,
            last_updated: Utc::now(),
        };
        match store.upsert(&loc).await {
            Ok(()) => {
                info!("Migrated: {}", loc.id);
                migrated += 1;
            }
            Err(e) => error!("Error migrating {}: {}", loc.id, e),
        }
    }
    Ok(migrated)
}
