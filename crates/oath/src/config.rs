//! Configuration loading and validation for the oath service.
//!
//! Values are layered, lowest precedence first: built-in defaults, `OATH_*`
//! environment variables, then `serve` command-line flags. The result is
//! validated once and never mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::ServeArgs;

/// Prefix shared by every environment variable the service reads.
pub const ENV_PREFIX: &str = "OATH";

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// AWS region used to reach the token bucket and handed to the API routes.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// S3 bucket that contains the key files.
    #[serde(default = "default_token_bucket")]
    pub token_bucket: String,

    /// Local directory the key files are downloaded into.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Object key (and local file name) of the private key.
    #[serde(default = "default_private_key_name")]
    pub private_key_name: String,

    /// Object key (and local file name) of the public key.
    #[serde(default = "default_public_key_name")]
    pub public_key_name: String,

    /// Endpoint override for S3-compatible stores (MinIO, LocalStack).
    #[serde(default)]
    pub s3_endpoint_url: Option<String>,

    /// Origins allowed by the CORS stage. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// How long (seconds) a restarting process waits for its successor.
    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Spans stay local when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_aws_region() -> String {
    "ap-northeast-1".into()
}
fn default_token_bucket() -> String {
    "oath-store".into()
}
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("jwt").join("rsa")
}
fn default_private_key_name() -> String {
    "private.key".into()
}
fn default_public_key_name() -> String {
    "public.key".into()
}
fn default_restart_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

impl ServiceConfig {
    /// Load and validate configuration from the environment and `serve` flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or fails validation.
    pub fn load(args: &ServeArgs) -> Result<Self> {
        Self::from_sources(environment(), args)
    }

    fn from_sources(env: config::Environment, args: &ServeArgs) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .set_override_option("port", args.port.clone())?
            .set_override_option("aws_region", args.aws_region.clone())?
            .set_override_option("token_bucket", args.token_bucket.clone())?
            .build()
            .context("failed to build configuration")?;

        let c: ServiceConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Object keys to download, private key first.
    pub fn key_names(&self) -> [&str; 2] {
        [&self.private_key_name, &self.public_key_name]
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.aws_region, "aws-region")?;
        ensure_non_empty(&self.token_bucket, "token-bucket")?;
        ensure_key_name(&self.private_key_name, "private_key_name")?;
        ensure_key_name(&self.public_key_name, "public_key_name")?;

        if self.private_key_name == self.public_key_name {
            anyhow::bail!("private and public key names must differ");
        }
        if self.restart_timeout_secs == 0 {
            anyhow::bail!("restart_timeout_secs must be > 0");
        }
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cors_origins")
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_key_name(value: &str, name: &str) -> Result<()> {
    ensure_non_empty(value, name)?;
    if value.contains('/') || value == "." || value == ".." {
        anyhow::bail!("{name} must be a plain file name, got {value:?}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        environment().source(Some(map))
    }

    /// Defaults, without consulting the process environment.
    pub(crate) fn valid() -> ServiceConfig {
        ServiceConfig {
            port: default_port(),
            aws_region: default_aws_region(),
            token_bucket: default_token_bucket(),
            scratch_dir: default_scratch_dir(),
            private_key_name: default_private_key_name(),
            public_key_name: default_public_key_name(),
            s3_endpoint_url: None,
            cors_origins: Vec::new(),
            restart_timeout_secs: default_restart_timeout(),
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_port(), 8080);
        assert_eq!(default_aws_region(), "ap-northeast-1");
        assert_eq!(default_token_bucket(), "oath-store");
        assert!(default_scratch_dir().ends_with("jwt/rsa"));
        assert_eq!(default_private_key_name(), "private.key");
        assert_eq!(default_public_key_name(), "public.key");
        assert_eq!(default_restart_timeout(), 30);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn loads_defaults_without_any_source() {
        let cfg = ServiceConfig::from_sources(env_from(&[]), &ServeArgs::default()).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.aws_region, "ap-northeast-1");
        assert_eq!(cfg.token_bucket, "oath-store");
        assert!(cfg.cors_origins.is_empty());
        assert!(cfg.s3_endpoint_url.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let env = env_from(&[
            ("OATH_PORT", "9000"),
            ("OATH_TOKEN_BUCKET", "keys-staging"),
            ("OATH_CORS_ORIGINS", "https://a.example,https://b.example"),
        ]);
        let cfg = ServiceConfig::from_sources(env, &ServeArgs::default()).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.token_bucket, "keys-staging");
        assert_eq!(
            cfg.cors_origins,
            vec!["https://a.example".to_owned(), "https://b.example".to_owned()]
        );
    }

    #[test]
    fn flags_override_environment() {
        let env = env_from(&[("OATH_PORT", "9000"), ("OATH_AWS_REGION", "us-east-1")]);
        let args = ServeArgs {
            port: Some("7070".into()),
            aws_region: Some("eu-west-1".into()),
            token_bucket: None,
        };
        let cfg = ServiceConfig::from_sources(env, &args).unwrap();
        assert_eq!(cfg.port, 7070);
        assert_eq!(cfg.aws_region, "eu-west-1");
        assert_eq!(cfg.token_bucket, "oath-store");
    }

    #[test]
    fn rejects_non_numeric_port() {
        let args = ServeArgs {
            port: Some("eighty".into()),
            ..ServeArgs::default()
        };
        assert!(ServiceConfig::from_sources(env_from(&[]), &args).is_err());
    }

    #[test]
    fn validate_rejects_empty_bucket() {
        let cfg = ServiceConfig {
            token_bucket: "  ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_identical_key_names() {
        let cfg = ServiceConfig {
            public_key_name: "private.key".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_nested_key_name() {
        let cfg = ServiceConfig {
            private_key_name: "../private.key".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_restart_timeout() {
        let cfg = ServiceConfig {
            restart_timeout_secs: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn key_names_are_private_then_public() {
        assert_eq!(valid().key_names(), ["private.key", "public.key"]);
    }
}
