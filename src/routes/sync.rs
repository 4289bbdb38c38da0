//! POST /topo-sync/ - field submissions
//!
//! Multipart body: a `data` part holding the JSON submission, plus any
//! number of file parts. Any part that carries a filename is an attachment.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

use crate::artifacts::UploadedFile;
use crate::routes::common::{authenticate, respond, BoxBody};
use crate::server::AppState;
use crate::staging::SubmissionEnvelope;
use crate::types::{BridgeError, Result};

/// Name of the multipart part carrying the submission JSON
pub const DATA_FIELD: &str = "data";

/// Largest accepted `data` part
pub const MAX_DATA_BYTES: u64 = 1024 * 1024;

/// Most attachments accepted in one submission
pub const MAX_ATTACHMENTS: usize = 20;

/// Bounds applied while reading a multipart submission
#[derive(Debug, Clone, Copy)]
pub struct SubmissionLimits {
    /// Per-file size; larger files are kept truncated for the artifact store to refuse
    pub max_file_size: u64,
    pub max_data_bytes: u64,
    pub max_attachments: usize,
}

impl SubmissionLimits {
    pub fn for_file_size(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            max_data_bytes: MAX_DATA_BYTES,
            max_attachments: MAX_ATTACHMENTS,
        }
    }

    /// Cap on the whole body: every attachment twice over, plus the data part
    fn whole_stream(&self) -> u64 {
        self.max_file_size
            .saturating_mul(2)
            .saturating_mul(self.max_attachments as u64)
            .saturating_add(self.max_data_bytes)
    }

    fn constraints(&self) -> multer::Constraints {
        multer::Constraints::new().size_limit(
            multer::SizeLimit::new()
                .whole_stream(self.whole_stream())
                .for_field(DATA_FIELD, self.max_data_bytes),
        )
    }
}

pub async fn handle_topo_sync(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let stream = req.into_body().into_data_stream();
        let (envelope, attachments) = read_submission(
            content_type.as_deref(),
            stream,
            SubmissionLimits::for_file_size(state.artifacts.max_file_size()),
        )
        .await?;

        state.ledger.submit(&principal, envelope, attachments).await
    }
    .await;

    respond(StatusCode::CREATED, result)
}

/// Split a multipart submission into its envelope and attachments
///
/// File parts are buffered up to one byte past `max_file_size`; anything
/// beyond that is drained so the artifact store reports the file as too large
/// without holding all of it in memory. The body as a whole, the `data` part,
/// and the attachment count are bounded by `limits`.
pub async fn read_submission<S, E>(
    content_type: Option<&str>,
    body: S,
    limits: SubmissionLimits,
) -> Result<(SubmissionEnvelope, Vec<UploadedFile>)>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let content_type = content_type
        .ok_or_else(|| BridgeError::BadRequest("multipart/form-data body required".to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| BridgeError::BadRequest("multipart/form-data body required".to_string()))?;

    let mut multipart = multer::Multipart::with_constraints(body, boundary, limits.constraints());
    let mut envelope = None;
    let mut attachments = Vec::new();
    let keep = limits.max_file_size.saturating_add(1) as usize;

    while let Some(mut field) = multipart.next_field().await? {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            if attachments.len() >= limits.max_attachments {
                return Err(BridgeError::TooLarge(format!(
                    "At most {} files per submission",
                    limits.max_attachments
                )));
            }
            let content_type = field.content_type().map(|m| m.to_string());
            let mut buffer = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                if buffer.len() < keep {
                    let room = keep - buffer.len();
                    buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
            }

            debug!(file_name = %file_name, size = buffer.len(), "Received attachment");
            attachments.push(UploadedFile {
                original_name: file_name,
                content_type,
                bytes: buffer.freeze(),
            });
        } else if field.name() == Some(DATA_FIELD) {
            let raw = field.text().await?;
            envelope = Some(SubmissionEnvelope::parse(&raw)?);
        }
    }

    let envelope = envelope.ok_or_else(|| {
        BridgeError::ValidationFailed(format!("Missing `{}` field", DATA_FIELD))
    })?;

    Ok((envelope, attachments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::EntityKind;

    const BOUNDARY: &str = "X-TOPO-BOUNDARY";

    fn body(
        parts: &[(&str, Option<&str>, &str)],
    ) -> futures::stream::Iter<std::vec::IntoIter<std::result::Result<Bytes, std::io::Error>>> {
        let mut raw = String::new();
        for (name, file_name, content) in parts {
            raw.push_str(&format!("--{}\r\n", BOUNDARY));
            match file_name {
                Some(f) => raw.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                    name, f
                )),
                None => raw.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            raw.push_str(content);
            raw.push_str("\r\n");
        }
        raw.push_str(&format!("--{}--\r\n", BOUNDARY));
        futures::stream::iter(vec![Ok(Bytes::from(raw))])
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    const DATA: &str = r#"{"entity_type":"propriete","action_suggested":"create","target_dossier_id":12,"entity_data":{"lot":"A12"}}"#;

    #[tokio::test]
    async fn test_reads_envelope_and_files() {
        let ct = content_type();
        let (envelope, files) = read_submission(
            Some(&ct),
            body(&[("data", None, DATA), ("files", Some("plan.pdf"), "%PDF-1.4")]),
            SubmissionLimits::for_file_size(1024),
        )
        .await
        .unwrap();

        assert_eq!(envelope.entity_type, EntityKind::Property);
        assert_eq!(envelope.target_dossier_id, 12);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "plan.pdf");
        assert_eq!(files[0].content_type.as_deref(), Some("application/pdf"));
        assert_eq!(&files[0].bytes[..], b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_oversize_part_is_capped() {
        let ct = content_type();
        let (_, files) = read_submission(
            Some(&ct),
            body(&[("data", None, DATA), ("files", Some("big.pdf"), "0123456789")]),
            SubmissionLimits::for_file_size(4),
        )
        .await
        .unwrap();
        assert_eq!(files[0].bytes.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_data_is_validation_failure() {
        let ct = content_type();
        let err = read_submission(
            Some(&ct),
            body(&[("files", Some("a.pdf"), "x")]),
            SubmissionLimits::for_file_size(1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_non_multipart_is_bad_request() {
        let err = read_submission(
            Some("application/json"),
            body(&[]),
            SubmissionLimits::for_file_size(1024),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_oversize_data_part_is_refused() {
        let ct = content_type();
        let limits = SubmissionLimits {
            max_data_bytes: 16,
            ..SubmissionLimits::for_file_size(1024)
        };
        let err = read_submission(Some(&ct), body(&[("data", None, DATA)]), limits)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_too_many_attachments_is_refused() {
        let ct = content_type();
        let limits = SubmissionLimits {
            max_attachments: 2,
            ..SubmissionLimits::for_file_size(1024)
        };
        let err = read_submission(
            Some(&ct),
            body(&[
                ("data", None, DATA),
                ("files", Some("a.pdf"), "a"),
                ("files", Some("b.pdf"), "b"),
                ("files", Some("c.pdf"), "c"),
            ]),
            limits,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_whole_body_is_bounded() {
        let ct = content_type();
        let limits = SubmissionLimits {
            max_file_size: 4,
            max_data_bytes: 200,
            max_attachments: 1,
        };
        let huge = "x".repeat(4096);
        let err = read_submission(
            Some(&ct),
            body(&[("data", None, DATA), ("files", Some("big.pdf"), huge.as_str())]),
            limits,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::TooLarge(_)));
    }
}
