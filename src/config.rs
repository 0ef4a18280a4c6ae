use crate::{
    services::project_service::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_SIZE, UploadLimits},
    stores::{DEFAULT_CONTENT_NAMESPACE, DEFAULT_METADATA_NAMESPACE},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub content_namespace: String,
    pub metadata_namespace: String,
    pub limits: UploadLimits,
    pub in_memory: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Project upload and storage API")]
pub struct Args {
    /// Host to bind to (overrides PROJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PROJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file contents are stored (overrides PROJECT_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides PROJECT_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Content store namespace (overrides PROJECT_STORE_CONTENT_NAMESPACE)
    #[arg(long)]
    pub content_namespace: Option<String>,

    /// Metadata store namespace (overrides PROJECT_STORE_METADATA_NAMESPACE)
    #[arg(long)]
    pub metadata_namespace: Option<String>,

    /// Per-file upload limit in bytes (overrides PROJECT_STORE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Total upload limit in bytes (overrides PROJECT_STORE_MAX_TOTAL_SIZE)
    #[arg(long)]
    pub max_total_size: Option<u64>,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long)]
    pub in_memory: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// Merge CLI arguments over environment values.
    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env_or("PROJECT_STORE_HOST", "0.0.0.0");
        let env_port = env_parse("PROJECT_STORE_PORT", 3000u16)?;
        let env_storage = env_or("PROJECT_STORE_STORAGE_DIR", "./data/projects");
        let env_db = env_or(
            "PROJECT_STORE_DATABASE_URL",
            "sqlite://./data/meta/project_store.db",
        );
        let env_content_ns = env_or("PROJECT_STORE_CONTENT_NAMESPACE", DEFAULT_CONTENT_NAMESPACE);
        let env_metadata_ns =
            env_or("PROJECT_STORE_METADATA_NAMESPACE", DEFAULT_METADATA_NAMESPACE);
        let env_max_file = env_parse("PROJECT_STORE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let env_max_total = env_parse("PROJECT_STORE_MAX_TOTAL_SIZE", DEFAULT_MAX_TOTAL_SIZE)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            content_namespace: args.content_namespace.unwrap_or(env_content_ns),
            metadata_namespace: args.metadata_namespace.unwrap_or(env_metadata_ns),
            limits: UploadLimits {
                max_file_size: args.max_file_size.unwrap_or(env_max_file),
                max_total_size: args.max_total_size.unwrap_or(env_max_total),
            },
            in_memory: args.in_memory,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arguments_win_over_defaults() {
        let args = Args::parse_from([
            "project-store",
            "--port",
            "8088",
            "--max-file-size",
            "5242880",
            "--max-total-size",
            "20971520",
            "--in-memory",
        ]);
        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.port, 8088);
        assert_eq!(cfg.addr(), format!("{}:8088", cfg.host));
        assert_eq!(cfg.limits.max_file_size, 5 * 1024 * 1024);
        assert_eq!(cfg.limits.max_total_size, 20 * 1024 * 1024);
        assert!(cfg.in_memory);
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let port = env_parse("PROJECT_STORE_TEST_NEVER_SET_PORT", 3000u16).unwrap();
        assert_eq!(port, 3000);
        assert_eq!(env_or("PROJECT_STORE_TEST_NEVER_SET_HOST", "0.0.0.0"), "0.0.0.0");
    }
}
