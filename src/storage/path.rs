//! Object keys and public URLs.

use crate::error::{AppError, AppResult};

/// `<prefix>/<uuid>.<ext>`; the extension is taken from the uploaded file name.
pub fn object_key(prefix: &str, file_name: &str) -> AppResult<String> {
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        return Err(AppError::invalid("storage prefix is required"));
    }
    if prefix.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(AppError::invalid(format!("invalid storage prefix: {}", prefix)));
    }
    let id = uuid::Uuid::new_v4();
    Ok(match extension(file_name) {
        Some(ext) => format!("{}/{}.{}", prefix, id, ext),
        None => format!("{}/{}", prefix, id),
    })
}

/// Lowercased extension, when it is short and alphanumeric.
pub fn extension(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// `<base>/<bucket>/<key>`
pub fn public_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

/// Inverse of [`public_url`]; `None` for URLs outside the bucket.
pub fn key_from_public_url(base: &str, bucket: &str, url: &str) -> Option<String> {
    let prefix = format!("{}/{}/", base.trim_end_matches('/'), bucket);
    let key = url.strip_prefix(&prefix)?;
    let key = key.split(['?', '#']).next().unwrap_or(key);
    if key.is_empty() {
        return None;
    }
    urlencoding::decode(key).ok().map(|k| k.into_owned())
}

/// Download name for an object: the title plus the stored extension.
pub fn download_name(title: &str, key_or_url: &str) -> String {
    match extension(key_or_url.split(['?', '#']).next().unwrap_or(key_or_url)) {
        Some(ext) if !title.to_ascii_lowercase().ends_with(&format!(".{}", ext)) => {
            format!("{}.{}", title, ext)
        }
        _ => title.to_string(),
    }
}

/// Best-effort content type from the file extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.example.ao/storage/v1/object/public/";

    #[test]
    fn test_object_key() {
        let key = object_key("educacao", "Plano Anual.PDF").unwrap();
        assert!(key.starts_with("educacao/"));
        assert!(key.ends_with(".pdf"));
        assert_eq!(key.len(), "educacao/".len() + 36 + ".pdf".len());

        let key = object_key("/saude/", "sem-extensao").unwrap();
        assert!(key.starts_with("saude/"));
        assert!(!key.contains('.'));
    }

    #[test]
    fn test_object_key_rejects_bad_prefix() {
        assert!(object_key("", "a.pdf").is_err());
        assert!(object_key("../etc", "a.pdf").is_err());
        assert!(object_key("a//b", "a.pdf").is_err());
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("foto.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension(".env"), None);
        assert_eq!(extension("arquivo."), None);
        assert_eq!(extension("dir.v2/arquivo"), None);
    }

    #[test]
    fn test_public_url_round_trip() {
        let url = public_url(BASE, "acervo-digital", "educacao/abc.pdf");
        assert_eq!(
            url,
            "https://cdn.example.ao/storage/v1/object/public/acervo-digital/educacao/abc.pdf"
        );
        assert_eq!(
            key_from_public_url(BASE, "acervo-digital", &url).as_deref(),
            Some("educacao/abc.pdf")
        );
        assert_eq!(key_from_public_url(BASE, "hero-carousel", &url), None);
        assert_eq!(
            key_from_public_url(BASE, "acervo-digital", &format!("{}?download=1", url)).as_deref(),
            Some("educacao/abc.pdf")
        );
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name("Plano", "educacao/abc.pdf"), "Plano.pdf");
        assert_eq!(download_name("Plano.pdf", "educacao/abc.pdf"), "Plano.pdf");
        assert_eq!(download_name("Plano", "educacao/abc"), "Plano");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("a.PNG"), "image/png");
        assert_eq!(guess_content_type("a.bin"), "application/octet-stream");
    }
}
