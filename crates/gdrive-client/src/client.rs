//! Typed HTTP client for the Google Drive v3 API.
//!
//! Wraps `reqwest::Client` with bearer-token authentication, endpoint
//! construction and mapping of API responses into the port-level types from
//! `gdrive-core`. Uploads use the resumable protocol: a session is created
//! first, then the body is sent in `chunk_size` parts with `Content-Range`
//! headers, honoring the caller's cancellation context between parts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::header::{CONTENT_RANGE, LOCATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gdrive_core::domain::FileId;
use gdrive_core::ports::remote_store::{
    About, Change, ChangePage, FileMeta, FilePage, FilePatch, Media, NewFile, Query, RemoteError,
    RemoteStore, StorageQuota,
};

const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

const FILE_FIELDS: &str = "id,name,mimeType,parents,md5Checksum,size,modifiedTime,appProperties";

/// HTTP client for Drive v3 calls.
pub struct DriveClient {
    http: Client,
    base_url: String,
    upload_base_url: String,
    access_token: String,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: DRIVE_BASE_URL.to_string(),
            upload_base_url: UPLOAD_BASE_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Custom base URLs, used by tests pointed at a local server.
    pub fn with_base_urls(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        upload_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            upload_base_url: upload_base_url.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.upload_base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    /// Creates a resumable upload session and returns the session URL.
    async fn start_upload_session(
        &self,
        request: reqwest::RequestBuilder,
        size: u64,
    ) -> Result<String, RemoteError> {
        let response = self
            .send(request.header("X-Upload-Content-Length", size))
            .await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::Invalid("upload session response carried no location".to_string())
            })
    }

    /// Sends the media body to a session URL in `chunk_size` parts.
    async fn upload_chunks(&self, session_url: &str, mut media: Media) -> Result<FileMeta, RemoteError> {
        let total = media.size;
        let chunk_size = media.chunk_size.clamp(1, u64::MAX) as usize;
        let mut offset: u64 = 0;

        // Zero-byte files complete the session with an empty body.
        if total == 0 {
            let request = self
                .http
                .put(session_url)
                .header(CONTENT_RANGE, "bytes */0")
                .body(Vec::new());
            let response = self.cancellable_send(request, &media.context).await?;
            return parse_file(response).await;
        }

        loop {
            let chunk = read_chunk(&mut media.reader, chunk_size, &media.context).await?;
            if chunk.is_empty() {
                return Err(RemoteError::Invalid(
                    "upload source ended before the declared size".to_string(),
                ));
            }

            let start = offset;
            let end = offset + chunk.len() as u64 - 1;
            offset = end + 1;

            debug!(start, end, total, "uploading chunk");
            let request = self
                .http
                .put(session_url)
                .header(CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .body(chunk);

            let response = self
                .cancellable_raw_send(request, &media.context)
                .await?;

            // 308 acknowledges the part and asks for the next one.
            if response.status() == StatusCode::PERMANENT_REDIRECT {
                continue;
            }
            let response = check_status(response).await?;
            return parse_file(response).await;
        }
    }

    async fn cancellable_send(
        &self,
        request: reqwest::RequestBuilder,
        context: &CancellationToken,
    ) -> Result<Response, RemoteError> {
        let response = self.cancellable_raw_send(request, context).await?;
        check_status(response).await
    }

    async fn cancellable_raw_send(
        &self,
        request: reqwest::RequestBuilder,
        context: &CancellationToken,
    ) -> Result<Response, RemoteError> {
        let send = request.bearer_auth(&self.access_token).send();
        tokio::select! {
            _ = context.cancelled() => Err(RemoteError::Cancelled),
            result = send => result.map_err(transport_error),
        }
    }
}

/// Reads up to `size` bytes, aborting as soon as the context fires.
async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: usize,
    context: &CancellationToken,
) -> Result<Vec<u8>, RemoteError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;

    while filled < size {
        let read = tokio::select! {
            _ = context.cancelled() => return Err(RemoteError::Cancelled),
            read = reader.read(&mut buf[filled..]) => read,
        };
        let n = read.map_err(|err| RemoteError::Transport(err.to_string()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    buf.truncate(filled);
    Ok(buf)
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Invalid(format!("malformed response: {err}"))
    } else {
        RemoteError::Transport(err.to_string())
    }
}

/// Maps non-success statuses into `RemoteError` kinds.
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(std::time::Duration::from_secs);

    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited { retry_after },
        // Drive reports per-user rate limiting as 403 with a reason in the
        // body.
        StatusCode::FORBIDDEN if body.contains("ateLimitExceeded") => {
            RemoteError::RateLimited { retry_after }
        }
        StatusCode::NOT_FOUND => RemoteError::Invalid(format!("not found: {body}")),
        status if status.is_server_error() => RemoteError::Backend {
            status: status.as_u16(),
            message: body,
        },
        status => RemoteError::Invalid(format!("{status}: {body}")),
    })
}

// ---------------------------------------------------------------------------
// Drive v3 DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    id: String,
    name: Option<String>,
    mime_type: Option<String>,
    parents: Option<Vec<String>>,
    md5_checksum: Option<String>,
    /// Drive serializes int64 fields as JSON strings.
    size: Option<String>,
    modified_time: Option<String>,
    app_properties: Option<HashMap<String, String>>,
}

impl ApiFile {
    fn into_meta(self) -> FileMeta {
        FileMeta {
            id: FileId::new(self.id),
            name: self.name.unwrap_or_default(),
            mime_type: self.mime_type.unwrap_or_default(),
            parents: self
                .parents
                .unwrap_or_default()
                .into_iter()
                .map(FileId::new)
                .collect(),
            size: self
                .size
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            modified: self
                .modified_time
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            md5: self.md5_checksum,
            app_properties: self.app_properties.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFileList {
    files: Vec<ApiFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiFileWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_properties: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAbout {
    user: Option<ApiUser>,
    storage_quota: Option<ApiQuota>,
    max_upload_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUser {
    display_name: Option<String>,
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiQuota {
    limit: Option<String>,
    usage: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChangeList {
    changes: Vec<ApiChange>,
    next_page_token: Option<String>,
    new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChange {
    file_id: String,
    removed: Option<bool>,
    time: Option<String>,
    file: Option<ApiFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStartPageToken {
    start_page_token: String,
}

async fn parse_file(response: Response) -> Result<FileMeta, RemoteError> {
    let file: ApiFile = response.json().await.map_err(transport_error)?;
    Ok(file.into_meta())
}

fn query_string(query: &Query) -> String {
    match query {
        Query::ChildrenOf(id) => format!("'{}' in parents and trashed = false", id),
        Query::AppProperty { key, value } => {
            format!("appProperties has {{ key='{key}' and value='{value}' }}")
        }
    }
}

fn parse_u64(value: Option<&str>) -> u64 {
    value.and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn write_body(file: NewFile) -> ApiFileWrite {
    ApiFileWrite {
        name: Some(file.name),
        mime_type: file.mime_type,
        parents: Some(file.parents.iter().map(|p| p.to_string()).collect()),
        app_properties: Some(file.app_properties),
    }
}

fn patch_body(patch: FilePatch) -> ApiFileWrite {
    ApiFileWrite {
        name: None,
        mime_type: None,
        parents: None,
        app_properties: patch.app_properties,
    }
}

// ---------------------------------------------------------------------------
// RemoteStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl RemoteStore for DriveClient {
    async fn get_file(&self, id: &FileId) -> Result<FileMeta, RemoteError> {
        let request = self
            .http
            .get(self.url(&format!("/files/{id}")))
            .query(&[("fields", FILE_FIELDS)]);

        match self.send(request).await {
            Ok(response) => parse_file(response).await,
            Err(RemoteError::Invalid(msg)) if msg.starts_with("not found") => {
                Err(RemoteError::NotFound(id.clone()))
            }
            Err(err) => Err(err),
        }
    }

    async fn list_files(
        &self,
        query: &Query,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<FilePage, RemoteError> {
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let mut request = self.http.get(self.url("/files")).query(&[
            ("q", query_string(query).as_str()),
            ("fields", fields.as_str()),
            ("pageSize", page_size.to_string().as_str()),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self.send(request).await?;
        let list: ApiFileList = response.json().await.map_err(transport_error)?;

        Ok(FilePage {
            files: list.files.into_iter().map(ApiFile::into_meta).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn create_file(
        &self,
        file: NewFile,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError> {
        let body = write_body(file);

        match media {
            None => {
                let request = self
                    .http
                    .post(self.url("/files"))
                    .query(&[("fields", FILE_FIELDS)])
                    .json(&body);
                parse_file(self.send(request).await?).await
            }
            Some(media) => {
                let request = self
                    .http
                    .post(self.upload_url("/files"))
                    .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
                    .json(&body);
                let session_url = self.start_upload_session(request, media.size).await?;
                self.upload_chunks(&session_url, media).await
            }
        }
    }

    async fn update_file(
        &self,
        id: &FileId,
        patch: FilePatch,
        media: Option<Media>,
    ) -> Result<FileMeta, RemoteError> {
        let body = patch_body(patch);

        match media {
            None => {
                let request = self
                    .http
                    .patch(self.url(&format!("/files/{id}")))
                    .query(&[("fields", FILE_FIELDS)])
                    .json(&body);
                parse_file(self.send(request).await?).await
            }
            Some(media) => {
                let request = self
                    .http
                    .patch(self.upload_url(&format!("/files/{id}")))
                    .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
                    .json(&body);
                let session_url = self.start_upload_session(request, media.size).await?;
                self.upload_chunks(&session_url, media).await
            }
        }
    }

    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError> {
        let request = self.http.delete(self.url(&format!("/files/{id}")));
        self.send(request).await?;
        Ok(())
    }

    async fn download_file(
        &self,
        id: &FileId,
        context: CancellationToken,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, RemoteError> {
        let request = self
            .http
            .get(self.url(&format!("/files/{id}")))
            .query(&[("alt", "media")]);

        let response = self.cancellable_send(request, &context).await?;
        let stream = response
            .bytes_stream()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn about(&self) -> Result<About, RemoteError> {
        let request = self
            .http
            .get(self.url("/about"))
            .query(&[("fields", "user,storageQuota,maxUploadSize")]);

        let response = self.send(request).await?;
        let about: ApiAbout = response.json().await.map_err(transport_error)?;

        let quota = about.storage_quota.map(|q| StorageQuota {
            limit: parse_u64(q.limit.as_deref()),
            usage: parse_u64(q.usage.as_deref()),
        });

        Ok(About {
            user: about.user.and_then(|u| u.email_address.or(u.display_name)),
            quota: quota.unwrap_or_default(),
            max_upload_size: parse_u64(about.max_upload_size.as_deref()),
        })
    }

    async fn changes_start_token(&self) -> Result<String, RemoteError> {
        let request = self.http.get(self.url("/changes/startPageToken"));
        let response = self.send(request).await?;
        let token: ApiStartPageToken = response.json().await.map_err(transport_error)?;
        Ok(token.start_page_token)
    }

    async fn list_changes(
        &self,
        page_token: &str,
        page_size: usize,
    ) -> Result<ChangePage, RemoteError> {
        let fields = format!(
            "newStartPageToken,nextPageToken,changes(fileId,removed,time,file({FILE_FIELDS}))"
        );
        let request = self.http.get(self.url("/changes")).query(&[
            ("pageToken", page_token),
            ("pageSize", page_size.to_string().as_str()),
            ("restrictToMyDrive", "true"),
            ("fields", fields.as_str()),
        ]);

        let response = self.send(request).await?;
        let list: ApiChangeList = response.json().await.map_err(transport_error)?;

        Ok(ChangePage {
            changes: list
                .changes
                .into_iter()
                .map(|c| Change {
                    file_id: FileId::new(c.file_id),
                    removed: c.removed.unwrap_or(false),
                    time: c
                        .time
                        .as_deref()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                    file: c.file.map(ApiFile::into_meta),
                })
                .collect(),
            next_page_token: list.next_page_token,
            new_start_page_token: list.new_start_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_strings() {
        assert_eq!(
            query_string(&Query::ChildrenOf(FileId::from("abc"))),
            "'abc' in parents and trashed = false"
        );
        assert_eq!(
            query_string(&Query::app_property("syncRootId", "xyz")),
            "appProperties has { key='syncRootId' and value='xyz' }"
        );
    }

    #[test]
    fn test_api_file_conversion() {
        let api: ApiFile = serde_json::from_str(
            r#"{
                "id": "f1",
                "name": "report.pdf",
                "mimeType": "application/pdf",
                "parents": ["root"],
                "md5Checksum": "aabbcc",
                "size": "2048",
                "modifiedTime": "2024-06-01T12:00:00.000Z",
                "appProperties": {"sync": "true"}
            }"#,
        )
        .unwrap();

        let meta = api.into_meta();
        assert_eq!(meta.id, FileId::from("f1"));
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.parents, vec![FileId::from("root")]);
        assert_eq!(meta.size, 2048);
        assert_eq!(meta.md5.as_deref(), Some("aabbcc"));
        assert_eq!(meta.app_properties.get("sync").map(String::as_str), Some("true"));
        assert!(!meta.is_dir());
    }

    #[test]
    fn test_api_file_conversion_tolerates_missing_fields() {
        let api: ApiFile = serde_json::from_str(r#"{"id": "f2"}"#).unwrap();
        let meta = api.into_meta();
        assert_eq!(meta.id, FileId::from("f2"));
        assert_eq!(meta.size, 0);
        assert!(meta.parents.is_empty());
        assert!(meta.md5.is_none());
    }

    #[test]
    fn test_write_body_serialization_skips_empty() {
        let body = patch_body(FilePatch::default());
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, "{}");
    }
}
