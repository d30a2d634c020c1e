//! Assembles the platform client from configuration and installs it into the slot.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::{Config, PlatformMode};
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::{LlmClient, MODEL};
use crate::models::user::Identity;
use crate::platform::anthropic::AnthropicInference;
use crate::platform::memory::{MemoryBlobStore, MemoryIdentity, MemoryKeyValue};
use crate::platform::pg_identity::PgIdentity;
use crate::platform::redis_kv::RedisKeyValue;
use crate::platform::s3_blob::{build_s3_client, S3BlobStore};
use crate::platform::{BlobStore, Platform, PlatformSlot};

/// Builds every backend named by `config`.
pub async fn build_platform(config: &Config) -> Result<Platform> {
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (default model: {MODEL})");

    match config.platform {
        PlatformMode::Memory => {
            let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
            info!("Using in-memory identity, blob and key-value backends");
            Ok(Platform {
                identity: Arc::new(MemoryIdentity::new(Identity::new(
                    config.platform_user.clone(),
                    config.platform_user.clone(),
                ))),
                ai: Arc::new(AnthropicInference::new(llm, blobs.clone())),
                blobs,
                kv: Arc::new(MemoryKeyValue::new()),
            })
        }
        PlatformMode::Hosted => {
            let hosted = config
                .hosted
                .as_ref()
                .context("hosted platform selected without hosted settings")?;

            let db = create_pool(&hosted.database_url).await?;
            ensure_schema(&db).await?;

            let redis = redis::Client::open(hosted.redis_url.clone())?;
            info!("Redis client initialized");

            let s3 = build_s3_client(hosted).await;
            info!("S3 client initialized");

            let blobs: Arc<dyn BlobStore> =
                Arc::new(S3BlobStore::new(s3, hosted.s3_bucket.clone()));
            Ok(Platform {
                identity: Arc::new(PgIdentity::new(db, config.platform_user.clone())),
                ai: Arc::new(AnthropicInference::new(llm, blobs.clone())),
                blobs,
                kv: Arc::new(RedisKeyValue::new(redis, &config.kv_namespace)),
            })
        }
    }
}

/// Connects in the background. On failure the slot stays empty and the
/// capability gate eventually reports the platform as unavailable.
pub fn spawn_connect(config: Config, slot: Arc<PlatformSlot>) {
    tokio::spawn(async move {
        match build_platform(&config).await {
            Ok(platform) => {
                slot.install(platform);
                info!("Platform client installed");
            }
            Err(e) => error!("Platform connection failed: {e:?}"),
        }
    });
}
