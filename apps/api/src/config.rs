use anyhow::{bail, Context, Result};

/// Which backend set the platform client is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformMode {
    /// PostgreSQL identity, S3 blobs, Redis key-value.
    Hosted,
    /// In-process identity, blobs and key-value. Inference still goes to Anthropic.
    Memory,
}

/// Connection settings for the hosted backends. Only required in `PlatformMode::Hosted`.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform: PlatformMode,
    pub hosted: Option<HostedConfig>,
    pub anthropic_api_key: String,
    /// External id of the identity `signIn` establishes.
    pub platform_user: String,
    pub kv_namespace: String,
    pub pdftoppm_path: String,
    pub render_dpi: u32,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let platform = parse_platform_mode(&optional_env("PLATFORM", "hosted"))?;
        let hosted = match platform {
            PlatformMode::Hosted => Some(HostedConfig {
                database_url: require_env("DATABASE_URL")?,
                redis_url: require_env("REDIS_URL")?,
                s3_bucket: require_env("S3_BUCKET")?,
                s3_endpoint: require_env("S3_ENDPOINT")?,
                aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            PlatformMode::Memory => None,
        };

        Ok(Config {
            platform,
            hosted,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            platform_user: optional_env("PLATFORM_USER", "local-user"),
            kv_namespace: optional_env("KV_NAMESPACE", "resumind"),
            pdftoppm_path: optional_env("PDFTOPPM_PATH", "pdftoppm"),
            render_dpi: optional_env("RENDER_DPI", "288")
                .parse::<u32>()
                .context("RENDER_DPI must be a positive integer")?,
            max_upload_bytes: optional_env("MAX_UPLOAD_BYTES", "20971520")
                .parse::<usize>()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            port: optional_env("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
        })
    }
}

fn parse_platform_mode(value: &str) -> Result<PlatformMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "hosted" => Ok(PlatformMode::Hosted),
        "memory" => Ok(PlatformMode::Memory),
        other => bail!("PLATFORM must be 'hosted' or 'memory', got '{other}'"),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_mode_parses_case_insensitively() {
        assert_eq!(parse_platform_mode("Memory").unwrap(), PlatformMode::Memory);
        assert_eq!(parse_platform_mode(" hosted ").unwrap(), PlatformMode::Hosted);
    }

    #[test]
    fn test_unknown_platform_mode_is_rejected() {
        let err = parse_platform_mode("browser").unwrap_err();
        assert!(err.to_string().contains("browser"));
    }
}
