//! C2: extension → media-type lookup (§4.2, §6 "MIME-type table collaborator").
//!
//! The table is a fixed, static mapping reproduced verbatim per §6's
//! allowance ("an implementer may reproduce the table verbatim").

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    // documents
    (".pdf", "application/pdf"),
    (".doc", "application/msword"),
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (".xls", "application/vnd.ms-excel"),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (".ppt", "application/vnd.ms-powerpoint"),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (".txt", "text/plain"),
    (".csv", "text/csv"),
    (".rtf", "application/rtf"),
    (".html", "text/html"),
    (".htm", "text/html"),
    (".xml", "application/xml"),
    (".json", "application/json"),
    // images
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".gif", "image/gif"),
    (".bmp", "image/bmp"),
    (".webp", "image/webp"),
    (".svg", "image/svg+xml"),
    (".ico", "image/vnd.microsoft.icon"),
    (".tiff", "image/tiff"),
    // audio
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
    (".ogg", "audio/ogg"),
    (".m4a", "audio/mp4"),
    // video
    (".mp4", "video/mp4"),
    (".mov", "video/quicktime"),
    (".avi", "video/x-msvideo"),
    (".webm", "video/webm"),
    (".mkv", "video/x-matroska"),
    // fonts
    (".ttf", "font/ttf"),
    (".otf", "font/otf"),
    (".woff", "font/woff"),
    (".woff2", "font/woff2"),
    // archives
    (".zip", "application/zip"),
    (".gz", "application/gzip"),
    (".tar", "application/x-tar"),
    (".7z", "application/x-7z-compressed"),
    (".rar", "application/vnd.rar"),
    // certificates
    (".pem", "application/x-pem-file"),
    (".crt", "application/x-x509-ca-cert"),
    (".cer", "application/pkix-cert"),
    (".p12", "application/x-pkcs12"),
    // source code
    (".c", "text/x-c"),
    (".h", "text/x-c"),
    (".rs", "text/rust"),
    (".py", "text/x-python"),
    (".js", "text/javascript"),
    (".ts", "text/typescript"),
    (".java", "text/x-java-source"),
    (".sh", "application/x-sh"),
    (".yaml", "application/yaml"),
    (".yml", "application/yaml"),
    (".toml", "application/toml"),
];

/// Resolves `extension` (may or may not include the leading dot) to a
/// media type, falling back to `application/octet-stream` on a miss
/// (§4.2, §8 invariant 6 — case-insensitive).
pub fn resolve(extension: &str) -> &'static str {
    let normalized = extension.to_ascii_lowercase();
    let normalized = if normalized.starts_with('.') {
        normalized
    } else {
        format!(".{normalized}")
    };

    TABLE
        .iter()
        .find(|(ext, _)| *ext == normalized)
        .map(|(_, media_type)| *media_type)
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}

/// Resolves the media type for a filename, based on its extension.
pub fn resolve_for_filename(filename: &str) -> &'static str {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => resolve(ext),
        _ => DEFAULT_MEDIA_TYPE,
    }
}
