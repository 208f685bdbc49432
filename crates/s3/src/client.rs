//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from xfer-core.
//! One client is bound to one bucket. SDK-level retries are disabled; the
//! core retry executor decides what to retry based on how errors are mapped
//! here.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use bytes::Bytes;
use jiff::Timestamp;
use xfer_core::{
    Error, ListPage, ObjectContent, ObjectDescriptor, ObjectStore, PutOptions, Result,
    StoreSettings,
};

/// Region in which buckets are created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// S3 client bound to a single bucket
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3Client {
    /// Create a client from store settings.
    ///
    /// Static credentials are used when both keys are set; otherwise the
    /// default AWS provider chain (environment, profile, instance metadata)
    /// is consulted.
    pub async fn new(settings: &StoreSettings) -> Result<Self> {
        if settings.bucket.is_empty() {
            return Err(Error::Config("bucket must not be empty".into()));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .retry_config(aws_config::retry::RetryConfig::disabled());

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "xfer-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.path_style)
            .build();

        tracing::debug!(
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = settings.endpoint.as_deref().unwrap_or("default"),
            path_style = settings.path_style,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    fn container(&self) -> String {
        self.bucket.clone()
    }

    async fn container_exists(&self) -> Result<bool> {
        match self.inner.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match map_sdk_error(&e, &self.bucket) {
                Error::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_container(&self) -> Result<()> {
        let mut request = self.inner.create_bucket().bucket(&self.bucket);

        if self.region != DEFAULT_REGION {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(configuration);
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &self.bucket))?;

        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<ObjectDescriptor> {
        let size = data.len() as u64;

        let mut request = self
            .inner
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(content_type) = options.content_type {
            request = request.content_type(content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, key))?;

        let descriptor = ObjectDescriptor::new(key, size, Timestamp::now());
        Ok(match response.e_tag() {
            Some(etag) => descriptor.with_etag(trim_etag(etag)),
            None => descriptor,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectContent> {
        let response = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("reading body of {key}: {e}")))?
            .into_bytes();

        Ok(ObjectContent::new(data))
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut request = self.inner.list_objects_v2().bucket(&self.bucket);

        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &self.bucket))?;

        let items = response
            .contents()
            .iter()
            .map(|object| {
                let key = object.key().unwrap_or_default();
                let size = object.size().unwrap_or(0).max(0) as u64;
                let modified = object
                    .last_modified()
                    .map(to_timestamp)
                    .unwrap_or(Timestamp::UNIX_EPOCH);

                let descriptor = ObjectDescriptor::new(key, size, modified);
                match object.e_tag() {
                    Some(etag) => descriptor.with_etag(trim_etag(etag)),
                    None => descriptor,
                }
            })
            .collect();

        let continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            items,
            continuation_token,
        })
    }
}

/// Translate an SDK failure into the core taxonomy.
///
/// `subject` names the bucket or key the request was about.
fn map_sdk_error<E>(error: &SdkError<E, HttpResponse>, subject: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match error {
        SdkError::TimeoutError(_) => Error::Timeout(format!("request for {subject} timed out")),
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                Error::Timeout(format!("request for {subject} timed out"))
            } else {
                Error::Network(format!("dispatch failed for {subject}: {failure:?}"))
            }
        }
        SdkError::ResponseError(_) => {
            Error::Network(format!("invalid response for {subject}: {error}"))
        }
        SdkError::ServiceError(service) => {
            let err = service.err();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            classify_response(
                Some(service.raw().status().as_u16()),
                err.code(),
                subject,
                message,
            )
        }
        SdkError::ConstructionFailure(_) => {
            Error::InvalidArgument(format!("could not build request for {subject}: {error}"))
        }
        _ => Error::General(format!("{subject}: {error}")),
    }
}

/// Map an HTTP status and S3 error code to an [`Error`]
fn classify_response(
    status: Option<u16>,
    code: Option<&str>,
    subject: &str,
    message: String,
) -> Error {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => {
            return Error::NotFound(subject.to_string());
        }
        Some("BucketAlreadyOwnedByYou" | "BucketAlreadyExists") => {
            return Error::Conflict(format!("bucket {subject} already exists"));
        }
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
            return Error::Auth(message);
        }
        Some("SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable") => {
            return Error::Network(message);
        }
        _ => {}
    }

    match status {
        Some(404) => Error::NotFound(subject.to_string()),
        Some(401 | 403) => Error::Auth(message),
        Some(409) => Error::Conflict(message),
        Some(408 | 429) => Error::Network(message),
        Some(status) if status >= 500 => Error::Network(format!("HTTP {status}: {message}")),
        Some(status) if status >= 400 => Error::InvalidArgument(message),
        _ => Error::General(message),
    }
}

fn to_timestamp(dt: &aws_smithy_types::DateTime) -> Timestamp {
    Timestamp::new(dt.secs(), dt.subsec_nanos() as i32)
        .or_else(|_| Timestamp::from_second(dt.secs()))
        .unwrap_or(Timestamp::UNIX_EPOCH)
}

fn trim_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}
