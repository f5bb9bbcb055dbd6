//! `strata config` command: Change an image's runtime configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use strata_image::mutate;
use strata_image::{layout, Config};

#[derive(Args)]
pub struct ConfigArgs {
    /// OCI layout directory holding the image
    pub layout: PathBuf,

    /// Output layout directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Entrypoint, one argument per flag
    #[arg(long = "entrypoint")]
    pub entrypoint: Vec<String>,

    /// Default command, one argument per flag
    #[arg(long = "cmd")]
    pub cmd: Vec<String>,

    /// Environment variables (KEY=VALUE), replacing any with the same key
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// Labels (KEY=VALUE)
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Working directory
    #[arg(short = 'w', long)]
    pub workdir: Option<String>,

    /// User to run as
    #[arg(short, long)]
    pub user: Option<String>,

    /// Image author
    #[arg(long)]
    pub author: Option<String>,
}

pub async fn execute(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = layout::image(&args.layout)?;
    let current = base.config_file()?.config;
    let updated = apply(current, &args)?;
    tracing::debug!(?updated, "Applying runtime config");

    let mut image = mutate::config(base, updated)?;
    if let Some(author) = &args.author {
        let mut document = image.config_file()?;
        document.author = Some(author.clone());
        image = mutate::config_file(image, document)?;
    }

    let digest = layout::write(image.as_ref(), &args.output)?;
    println!("Configured {} ({})", digest, args.output.display());
    Ok(())
}

/// Overlay the flags onto an existing runtime config.
fn apply(mut config: Config, args: &ConfigArgs) -> Result<Config, String> {
    if !args.entrypoint.is_empty() {
        config.entrypoint = Some(args.entrypoint.clone());
    }
    if !args.cmd.is_empty() {
        config.cmd = Some(args.cmd.clone());
    }
    if !args.env.is_empty() {
        let mut env = config.env.take().unwrap_or_default();
        for entry in &args.env {
            let (key, _) = parse_key_value(entry)?;
            env.retain(|existing| existing.split_once('=').map(|(k, _)| k) != Some(key));
            env.push(entry.clone());
        }
        config.env = Some(env);
    }
    if !args.labels.is_empty() {
        let mut labels = config.labels.take().unwrap_or_else(BTreeMap::new);
        for entry in &args.labels {
            let (key, value) = parse_key_value(entry)?;
            labels.insert(key.to_string(), value.to_string());
        }
        config.labels = Some(labels);
    }
    if let Some(workdir) = &args.workdir {
        config.working_dir = Some(workdir.clone());
    }
    if let Some(user) = &args.user {
        config.user = Some(user.clone());
    }
    Ok(config)
}

/// Split `KEY=VALUE`; the key must be non-empty.
fn parse_key_value(s: &str) -> Result<(&str, &str), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(format!("Invalid KEY=VALUE pair: {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConfigArgs {
        ConfigArgs {
            layout: PathBuf::from("in"),
            output: PathBuf::from("out"),
            entrypoint: Vec::new(),
            cmd: Vec::new(),
            env: Vec::new(),
            labels: Vec::new(),
            workdir: None,
            user: None,
            author: None,
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("A=1").unwrap(), ("A", "1"));
        assert_eq!(parse_key_value("A=").unwrap(), ("A", ""));
        assert_eq!(parse_key_value("A=b=c").unwrap(), ("A", "b=c"));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_apply_replaces_env_by_key() {
        let config = Config {
            env: Some(vec!["PATH=/bin".to_string(), "HOME=/root".to_string()]),
            ..Default::default()
        };
        let mut args = args();
        args.env = vec!["PATH=/usr/bin".to_string()];

        let updated = apply(config, &args).unwrap();
        assert_eq!(
            updated.env,
            Some(vec!["HOME=/root".to_string(), "PATH=/usr/bin".to_string()])
        );
    }

    #[test]
    fn test_apply_keeps_unset_fields() {
        let config = Config {
            cmd: Some(vec!["sh".to_string()]),
            user: Some("nobody".to_string()),
            ..Default::default()
        };
        let mut args = args();
        args.entrypoint = vec!["/init".to_string()];
        args.labels = vec!["tier=web".to_string()];

        let updated = apply(config, &args).unwrap();
        assert_eq!(updated.entrypoint, Some(vec!["/init".to_string()]));
        assert_eq!(updated.cmd, Some(vec!["sh".to_string()]));
        assert_eq!(updated.user.as_deref(), Some("nobody"));
        assert_eq!(
            updated.labels.unwrap().get("tier").map(String::as_str),
            Some("web")
        );
    }

    #[test]
    fn test_apply_rejects_bad_label() {
        let mut args = args();
        args.labels = vec!["oops".to_string()];
        assert!(apply(Config::default(), &args).is_err());
    }
}
