//! `strata flatten` command: Write an image's merged filesystem as one tar.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Args;
use strata_core::{StrataConfig, StrataError};
use strata_image::{extract_with_config, layout};

use crate::output;

#[derive(Args)]
pub struct FlattenArgs {
    /// OCI layout directory holding the image
    pub layout: PathBuf,

    /// Output file path (e.g., "rootfs.tar")
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn execute(
    args: FlattenArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = layout::image(&args.layout)?;
    tracing::info!(
        layout = %args.layout.display(),
        output = %args.output.display(),
        "Flattening image"
    );
    let extract_config = config.extract.clone();
    let output_path = args.output.clone();

    let size = tokio::task::spawn_blocking(move || -> Result<u64, StrataError> {
        let mut extraction = extract_with_config(image, &extract_config)?;
        let file = std::fs::File::create(&output_path).map_err(|e| {
            StrataError::Other(format!("Failed to create {}: {e}", output_path.display()))
        })?;
        let mut writer = BufWriter::new(file);
        let size = std::io::copy(&mut extraction, &mut writer)?;
        writer.flush()?;
        extraction.close()?;
        Ok(size)
    })
    .await??;

    println!(
        "Flattened {} to {} ({})",
        args.layout.display(),
        args.output.display(),
        output::format_bytes(size)
    );
    Ok(())
}
