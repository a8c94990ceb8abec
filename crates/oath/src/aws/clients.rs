//! AWS SDK client initialisation for S3.

use aws_config::{BehaviorVersion, Region};

use crate::config::ServiceConfig;

/// Build an S3 client for the configured region.
///
/// Credentials are resolved via the standard AWS credential chain (env vars,
/// profile, instance role). When `s3_endpoint_url` is set the client targets
/// that endpoint with path-style addressing, which S3-compatible stores
/// expect.
pub async fn s3_client(cfg: &ServiceConfig) -> aws_sdk_s3::Client {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(cfg.aws_region.clone()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &cfg.s3_endpoint_url {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}
