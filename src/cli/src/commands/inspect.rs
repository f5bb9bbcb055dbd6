//! `strata inspect` command: Show an image's digests and layer history.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use strata_image::{layout, Image};

use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// OCI layout directory holding the image
    pub layout: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Do not truncate digests or commands
    #[arg(long)]
    pub no_trunc: bool,
}

#[derive(Serialize)]
struct ImageSummary {
    digest: String,
    config_digest: String,
    media_type: String,
    architecture: String,
    os: String,
    layers: Vec<LayerSummary>,
}

#[derive(Serialize)]
struct LayerSummary {
    digest: String,
    diff_id: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

pub async fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let image = layout::image(&args.layout)?;
    let summary = summarize(image.as_ref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Digest:   {}", summary.digest);
    println!("Config:   {}", summary.config_digest);
    println!("Type:     {}", summary.media_type);
    println!("Platform: {}/{}", summary.os, summary.architecture);
    println!();

    let mut table = output::new_table(&["DIGEST", "DIFF ID", "SIZE", "CREATED BY"]);
    for layer in &summary.layers {
        let created_by = layer.created_by.clone().unwrap_or_default();
        let (digest, diff_id, created_by) = if args.no_trunc {
            (layer.digest.clone(), layer.diff_id.clone(), created_by)
        } else {
            (
                output::short_digest(&layer.digest),
                output::short_digest(&layer.diff_id),
                output::truncate_str(&created_by, 60),
            )
        };
        table.add_row([
            digest,
            diff_id,
            output::format_bytes(layer.size),
            created_by,
        ]);
    }
    println!("{table}");
    Ok(())
}

fn summarize(image: &dyn Image) -> Result<ImageSummary, Box<dyn std::error::Error>> {
    let manifest = image.manifest()?;
    let config = image.config_file()?;

    // History entries marked empty_layer have no layer of their own.
    let mut history = config
        .history
        .iter()
        .filter(|entry| !entry.empty_layer)
        .map(|entry| entry.created_by.clone());

    let layers = manifest
        .layers
        .iter()
        .zip(&config.rootfs.diff_ids)
        .map(|(descriptor, diff_id)| LayerSummary {
            digest: descriptor.digest.to_string(),
            diff_id: diff_id.to_string(),
            size: descriptor.size,
            created_by: history.next().flatten(),
        })
        .collect();

    Ok(ImageSummary {
        digest: image.digest()?.to_string(),
        config_digest: image.config_name()?.to_string(),
        media_type: image.media_type()?.to_string(),
        architecture: config.architecture,
        os: config.os,
        layers,
    })
}
