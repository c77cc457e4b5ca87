// ABOUTME: Attachment resolution for chat turns: images go to vision input, text files are downloaded
// ABOUTME: Download failures are absorbed so a bad attachment never fails the turn
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::constants::prompts;
use crate::models::{AttachmentKind, AttachmentRef};
use crate::storage::ObjectStore;

const TEXT_EXTENSIONS: &[&str] = &[".txt", ".text", ".md", ".markdown"];
const TEXT_MIME_TYPES: &[&str] = &["text/plain", "text/markdown"];

/// A downloaded text attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    /// Display name
    pub name: String,
    /// Decoded text
    pub body: String,
}

/// Attachments split by how they reach the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttachments {
    /// Image URLs for vision input, in attachment order
    pub image_urls: Vec<String>,
    /// Text files whose download succeeded, in attachment order
    pub text_blocks: Vec<TextBlock>,
}

impl ResolvedAttachments {
    /// Whether no attachment contributes to the prompt
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_urls.is_empty() && self.text_blocks.is_empty()
    }
}

/// How one attachment is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Text,
    Image,
    Ignored,
}

fn has_text_extension(file_name: Option<&str>) -> bool {
    file_name.is_some_and(|name| {
        let lower = name.to_lowercase();
        TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    })
}

fn classify(attachment: &AttachmentRef) -> Route {
    let mime = attachment
        .mime_type
        .as_deref()
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_lowercase());
    let text_extension = has_text_extension(attachment.file_name.as_deref());

    // Generic binary uploads still count as text when the filename says so
    let is_text = mime
        .as_deref()
        .is_some_and(|m| TEXT_MIME_TYPES.contains(&m))
        || text_extension;

    if is_text {
        Route::Text
    } else if attachment.kind == AttachmentKind::Image && attachment.url.is_some() {
        Route::Image
    } else {
        Route::Ignored
    }
}

/// Display name used in prompt blocks and titles
#[must_use]
pub fn display_name(attachment: &AttachmentRef) -> String {
    attachment
        .file_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(prompts::UNNAMED_FILE)
        .to_owned()
}

/// Resolve a turn's attachments
///
/// Business rules:
/// - text: MIME `text/plain` or `text/markdown`, or a `.txt`/`.md`/`.markdown`
///   filename (including `application/octet-stream` uploads)
/// - image: kind `image` with a URL, when not text
/// - anything else, and text without a URL, is ignored
/// - downloads run concurrently; output keeps attachment order
/// - a failed or empty download contributes no block
pub async fn resolve_attachments(
    store: &dyn ObjectStore,
    attachments: &[AttachmentRef],
) -> ResolvedAttachments {
    let mut resolved = ResolvedAttachments::default();
    let mut downloads = Vec::new();

    for attachment in attachments {
        match classify(attachment) {
            Route::Text => {
                let name = display_name(attachment);
                if let Some(url) = attachment.url.as_deref() {
                    downloads.push(async move { (name, store.fetch_text(url).await) });
                } else {
                    debug!(attachment_id = %attachment.id, "Text attachment has no URL");
                }
            }
            Route::Image => {
                if let Some(url) = &attachment.url {
                    resolved.image_urls.push(url.clone());
                }
            }
            Route::Ignored => {
                debug!(attachment_id = %attachment.id, "Attachment not usable as model input");
            }
        }
    }

    for (name, body) in join_all(downloads).await {
        match body {
            Some(body) if !body.is_empty() => resolved.text_blocks.push(TextBlock { name, body }),
            _ => warn!(file_name = %name, "Skipping text attachment with no content"),
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const OCTET_STREAM: &str = "application/octet-stream";

    struct MapStore(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl ObjectStore for MapStore {
        async fn fetch_text(&self, url: &str) -> Option<String> {
            self.0.get(url).map(|s| (*s).to_owned())
        }
    }

    fn attachment(
        kind: AttachmentKind,
        url: Option<&str>,
        name: Option<&str>,
        mime: Option<&str>,
    ) -> AttachmentRef {
        AttachmentRef {
            id: "a".into(),
            kind,
            url: url.map(ToOwned::to_owned),
            file_name: name.map(ToOwned::to_owned),
            mime_type: mime.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn test_classification() {
        use AttachmentKind::{File, Image};
        assert_eq!(
            classify(&attachment(File, Some("u"), None, Some("text/plain"))),
            Route::Text
        );
        assert_eq!(
            classify(&attachment(File, Some("u"), Some("a.bin"), Some("text/markdown; charset=utf-8"))),
            Route::Text
        );
        assert_eq!(
            classify(&attachment(File, Some("u"), Some("NOTES.MD"), Some(OCTET_STREAM))),
            Route::Text
        );
        assert_eq!(
            classify(&attachment(File, Some("u"), Some("a.pdf"), Some(OCTET_STREAM))),
            Route::Ignored
        );
        assert_eq!(
            classify(&attachment(File, Some("u"), Some("readme.txt"), None)),
            Route::Text
        );
        assert_eq!(
            classify(&attachment(Image, Some("u"), Some("p.png"), Some("image/png"))),
            Route::Image
        );
        assert_eq!(
            classify(&attachment(Image, None, Some("p.png"), Some("image/png"))),
            Route::Ignored
        );
        assert_eq!(
            classify(&attachment(File, Some("u"), Some("a.pdf"), Some("application/pdf"))),
            Route::Ignored
        );
    }

    #[tokio::test]
    async fn test_failed_download_is_skipped_and_order_kept() {
        let store = MapStore(HashMap::from([("u1", "first"), ("u3", "third")]));
        let attachments = vec![
            attachment(AttachmentKind::File, Some("u1"), Some("a.txt"), None),
            attachment(AttachmentKind::File, Some("u2"), Some("b.txt"), None),
            attachment(AttachmentKind::Image, Some("img"), Some("c.png"), Some("image/png")),
            attachment(AttachmentKind::File, Some("u3"), None, Some("text/plain")),
        ];

        let resolved = resolve_attachments(&store, &attachments).await;
        assert_eq!(resolved.image_urls, vec!["img".to_owned()]);
        assert_eq!(
            resolved.text_blocks,
            vec![
                TextBlock {
                    name: "a.txt".into(),
                    body: "first".into()
                },
                TextBlock {
                    name: prompts::UNNAMED_FILE.into(),
                    body: "third".into()
                },
            ]
        );
    }
}
