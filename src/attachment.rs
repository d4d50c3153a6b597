//! C4: attachment resolution and loading (§4.4).

use std::path::{Path, PathBuf};

use crate::error::AttachmentLoadError;
use crate::message::{Attachment, AttachmentSource};
use crate::mime_types;

/// A fully resolved attachment, ready to be fed to the MIME composer.
#[derive(Debug, Clone)]
pub struct LoadedAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Normalizes `path` against `cwd`: makes it absolute if relative, and
/// resolves `.`/`..` components without requiring the path to exist yet.
fn normalize_against(cwd: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Loads one attachment. Returns `Ok(None)` for the "else: silently skip"
/// branch of §4.4 (neither `path` nor `content` present).
pub async fn load_attachment(
    attachment: &Attachment,
    cwd: &Path,
) -> Result<Option<LoadedAttachment>, AttachmentLoadError> {
    match &attachment.source {
        AttachmentSource::Path(path) => {
            let resolved = normalize_against(cwd, path);

            let metadata = tokio::fs::metadata(&resolved)
                .await
                .map_err(|_| AttachmentLoadError::NotFound(resolved.display().to_string()))?;
            if !metadata.is_file() {
                return Err(AttachmentLoadError::NotFound(resolved.display().to_string()));
            }

            let bytes = tokio::fs::read(&resolved)
                .await
                .map_err(|source| AttachmentLoadError::Io {
                    path: resolved.display().to_string(),
                    source,
                })?;

            let filename = match &attachment.filename {
                Some(name) if Path::new(name).extension().is_some() => name.clone(),
                Some(name) => match extension_of(&resolved) {
                    Some(ext) => format!("{name}{ext}"),
                    None => name.clone(),
                },
                None => basename(&resolved),
            };

            let content_type = attachment
                .content_type
                .clone()
                .unwrap_or_else(|| mime_types::resolve_for_filename(&filename).to_string());

            Ok(Some(LoadedAttachment {
                filename,
                content_type,
                bytes,
            }))
        }
        AttachmentSource::Content(bytes) => {
            let filename = attachment
                .filename
                .clone()
                .unwrap_or_else(|| "attachment".to_string());
            let content_type = attachment
                .content_type
                .clone()
                .unwrap_or_else(|| mime_types::resolve_for_filename(&filename).to_string());

            Ok(Some(LoadedAttachment {
                filename,
                content_type,
                bytes: bytes.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_inline_content() {
        let attachment = Attachment::from_bytes(b"hello world".to_vec());
        let loaded = load_attachment(&attachment, Path::new("/tmp"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.filename, "attachment");
        assert_eq!(loaded.content_type, "application/octet-stream");
        assert_eq!(loaded.bytes, b"hello world");
    }

    #[tokio::test]
    async fn inline_content_type_from_filename() {
        let attachment = Attachment::from_bytes(b"<html></html>".to_vec())
            .with_filename("page.html");
        let loaded = load_attachment(&attachment, Path::new("/tmp"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.content_type, "text/html");
    }

    #[tokio::test]
    async fn loads_from_path_relative_to_cwd() {
        let dir = std::env::temp_dir().join(format!("smtp_mailer_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("report.pdf");
        {
            let mut f = std::fs::File::create(&file_path).unwrap();
            f.write_all(b"%PDF-1.4 fake").unwrap();
        }

        let attachment = Attachment::from_path("report.pdf");
        let loaded = load_attachment(&attachment, &dir).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "report.pdf");
        assert_eq!(loaded.content_type, "application/pdf");
        assert_eq!(loaded.bytes, b"%PDF-1.4 fake");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let attachment = Attachment::from_path("does-not-exist.bin");
        let result = load_attachment(&attachment, Path::new("/tmp")).await;
        assert!(matches!(result, Err(AttachmentLoadError::NotFound(_))));
    }

    #[test]
    fn normalize_resolves_dot_dot() {
        let resolved = normalize_against(Path::new("/a/b/c"), "../d.txt");
        assert_eq!(resolved, PathBuf::from("/a/b/d.txt"));
    }

    #[test]
    fn filename_gets_extension_appended_when_missing() {
        let resolved = PathBuf::from("/tmp/report.pdf");
        assert_eq!(extension_of(&resolved), Some(".pdf".to_string()));
    }
}
