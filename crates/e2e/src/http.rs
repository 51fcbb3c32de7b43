//! HTTP actions against the upload service

use std::path::Path;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::E2eResult;
use crate::inspect::{self, ARCHIVE_MIME_TYPE};

/// Status and body captured from a single response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub body: String,
}

/// One file field of a multipart payload
#[derive(Debug, Clone)]
pub struct Attachment {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Image upload: field `file`, named `image.<ext>`, typed `image/<ext>`
    pub fn image(path: &Path) -> E2eResult<Self> {
        let ext = inspect::path_extension(path);
        Ok(Self {
            field: "file".to_string(),
            file_name: format!("image.{}", ext),
            mime_type: inspect::image_mime_type(&ext),
            bytes: std::fs::read(path)?,
        })
    }

    /// Archive upload: field `file`, named `archive.zip`
    pub fn archive(path: &Path) -> E2eResult<Self> {
        Ok(Self {
            field: "file".to_string(),
            file_name: "archive.zip".to_string(),
            mime_type: ARCHIVE_MIME_TYPE.to_string(),
            bytes: std::fs::read(path)?,
        })
    }

    /// Archive `index` of a multi-file upload: field `file<i>`, named `archive<i>.zip`
    pub fn indexed_archive(path: &Path, index: usize) -> E2eResult<Self> {
        Ok(Self {
            field: format!("file{}", index),
            file_name: format!("archive{}.zip", index),
            mime_type: ARCHIVE_MIME_TYPE.to_string(),
            bytes: std::fs::read(path)?,
        })
    }

    fn into_part(self) -> E2eResult<(String, Part)> {
        let part = Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime_type)?;
        Ok((self.field, part))
    }
}

/// Request context for one scenario
///
/// Each scenario builds its own client so no connection state is shared
/// between scenarios. Dropping the client disposes of the context.
pub struct UploadClient {
    client: Client,
}

impl UploadClient {
    pub fn new() -> E2eResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("upload-e2e/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str) -> E2eResult<ResponseRecord> {
        self.send(Method::GET, url, Vec::new()).await
    }

    pub async fn delete(&self, url: &str) -> E2eResult<ResponseRecord> {
        self.send(Method::DELETE, url, Vec::new()).await
    }

    pub async fn post_image(&self, url: &str, path: &Path) -> E2eResult<ResponseRecord> {
        self.send(Method::POST, url, vec![Attachment::image(path)?]).await
    }

    pub async fn put_image(&self, url: &str, path: &Path) -> E2eResult<ResponseRecord> {
        self.send(Method::PUT, url, vec![Attachment::image(path)?]).await
    }

    pub async fn post_archive(&self, url: &str, path: &Path) -> E2eResult<ResponseRecord> {
        self.send(Method::POST, url, vec![Attachment::archive(path)?]).await
    }

    /// Post several archives in one multipart payload
    pub async fn post_archives<P: AsRef<Path>>(
        &self,
        url: &str,
        paths: &[P],
    ) -> E2eResult<ResponseRecord> {
        let attachments = paths
            .iter()
            .enumerate()
            .map(|(i, p)| Attachment::indexed_archive(p.as_ref(), i))
            .collect::<E2eResult<Vec<_>>>()?;
        self.send(Method::POST, url, attachments).await
    }

    /// Issue a request, attaching files as multipart form data when given
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        attachments: Vec<Attachment>,
    ) -> E2eResult<ResponseRecord> {
        debug!(
            "{} {} [{}]",
            method,
            url,
            attachments
                .iter()
                .map(|a| format!("{}={}", a.field, a.file_name))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut request: RequestBuilder = self.client.request(method, url);
        if !attachments.is_empty() {
            let mut form = Form::new();
            for attachment in attachments {
                let (field, part) = attachment.into_part()?;
                form = form.part(field, part);
            }
            request = request.multipart(form);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("-> {} ({} bytes)", status, body.len());

        Ok(ResponseRecord { status, body })
    }
}
