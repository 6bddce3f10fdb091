mod multipart;
mod progress_stream;

use chrono::Utc;
use crate::core::MediaPayload;

pub use multipart::MultipartTransport;
pub use progress_stream::ProgressStream;

/// MIME essence → file extension
const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("audio/webm", "webm"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/ogg", "ogg"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("text/plain", "txt"),
];

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or(mime_type).trim().to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

/// First MIME type registered for the file's extension
pub fn mime_for_file_name(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };

    // webm without a hint is treated as video
    EXTENSIONS
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(mime, _)| *mime)
}

/// `<family>_<unix-millis>.<ext>`
pub fn generate_file_name(payload: &MediaPayload) -> String {
    format!(
        "{}_{}.{}",
        payload.family().as_str(),
        Utc::now().timestamp_millis(),
        extension_for_mime(&payload.mime_type),
    )
}
