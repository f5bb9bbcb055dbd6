//! `strata append` command: Add tar layers on top of an image.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use strata_image::mutate::{self, Addendum};
use strata_image::{layout, History, Layer, TarballLayer};

#[derive(Args)]
pub struct AppendArgs {
    /// OCI layout directory holding the base image
    pub layout: PathBuf,

    /// Layer archives to append, oldest first (.tar or .tar.gz)
    #[arg(required = true)]
    pub layers: Vec<PathBuf>,

    /// Output layout directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// History text recorded for each appended layer
    #[arg(long)]
    pub created_by: Option<String>,

    /// Creation time for the image and its new history entries (RFC 3339)
    #[arg(long)]
    pub created: Option<DateTime<Utc>>,
}

pub async fn execute(args: AppendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = layout::image(&args.layout)?;
    let created = args.created.unwrap_or_else(Utc::now);

    let mut addenda = Vec::with_capacity(args.layers.len());
    for path in &args.layers {
        let layer: Arc<dyn Layer> = Arc::new(TarballLayer::from_path(path)?);
        let history = History {
            created: Some(created),
            created_by: Some(
                args.created_by
                    .clone()
                    .unwrap_or_else(|| format!("strata append {}", path.display())),
            ),
            ..Default::default()
        };
        addenda.push(Addendum::new(layer).with_history(history));
    }

    tracing::info!(layers = addenda.len(), "Appending layers");
    let image = mutate::append(base, addenda)?;
    let image = mutate::created_at(image, created)?;
    let digest = layout::write(image.as_ref(), &args.output)?;

    println!(
        "Appended {} layer(s): {} ({})",
        args.layers.len(),
        digest,
        args.output.display()
    );
    Ok(())
}
