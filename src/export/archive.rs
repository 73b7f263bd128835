use std::collections::HashSet;

use crate::error::{AppError, AppResult};

/// In-memory `.tar.gz` of downloaded files. Entry names are made unique.
pub struct ArchiveBuilder {
    tar: tar::Builder<flate2::write::GzEncoder<Vec<u8>>>,
    names: HashSet<String>,
    count: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        let gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        Self {
            tar: tar::Builder::new(gz),
            names: HashSet::new(),
            count: 0,
        }
    }

    fn unique_name(&mut self, name: &str) -> String {
        let name = sanitize(name);
        if self.names.insert(name.clone()) {
            return name;
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
            _ => (name.clone(), String::new()),
        };
        let mut n = 2;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if self.names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> AppResult<()> {
        let entry = self.unique_name(name);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
        header.set_cksum();
        self.tar
            .append_data(&mut header, &entry, data)
            .map_err(|e| AppError::Export(format!("archive append failed: {}", e)))?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> AppResult<Vec<u8>> {
        let gz = self
            .tar
            .into_inner()
            .map_err(|e| AppError::Export(format!("archive finish failed: {}", e)))?;
        gz.finish()
            .map_err(|e| AppError::Export(format!("gzip finish failed: {}", e)))
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps entry names flat and portable.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "arquivo".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize("Relatório: 2024.pdf"), "Relatório_ 2024.pdf");
        assert_eq!(sanitize("  "), "arquivo");
    }

    #[test]
    fn test_archive_round_trip() {
        let mut builder = ArchiveBuilder::new();
        builder.add("plano.pdf", b"one").unwrap();
        builder.add("plano.pdf", b"two").unwrap();
        builder.add("foto", b"three").unwrap();
        assert_eq!(builder.len(), 3);
        let bytes = builder.finish().unwrap();

        let gz = flate2::read::GzDecoder::new(&bytes[..]);
        let mut archive = tar::Archive::new(gz);
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            entries.push((name, body));
        }
        assert_eq!(
            entries,
            vec![
                ("plano.pdf".to_string(), "one".to_string()),
                ("plano (2).pdf".to_string(), "two".to_string()),
                ("foto".to_string(), "three".to_string()),
            ]
        );
    }
}
