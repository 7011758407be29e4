use std::io::Read;

use flate2::read::GzDecoder;
use tar::{Archive, Entries};
use tracing::debug;

use crate::error::ExtractionError;

/// Gunzips and untars a snapshot archive, handing out the JSON documents stored under the data
/// directory.
pub struct ArchiveExtractor<R: Read> {
    archive: Archive<GzDecoder<R>>,
    data_prefix: String,
}

impl<R: Read> ArchiveExtractor<R> {
    pub fn new(reader: R, data_prefix: impl Into<String>) -> Self {
        Self {
            archive: Archive::new(GzDecoder::new(reader)),
            data_prefix: data_prefix.into(),
        }
    }

    /// The payloads in archive order. The archive is consumed as the iterator advances, so this
    /// can only be walked once; a second call yields a single error.
    pub fn payloads(&mut self) -> Payloads<'_, R> {
        match self.archive.entries() {
            Ok(entries) => Payloads {
                entries: Some(entries),
                pending: None,
                data_prefix: &self.data_prefix,
            },
            Err(e) => Payloads {
                entries: None,
                pending: Some(ExtractionError::Archive(e)),
                data_prefix: &self.data_prefix,
            },
        }
    }
}

/// Lazy sequence of payload texts.
///
/// Entries outside the data prefix are skipped without reading their bodies and empty bodies are
/// dropped. The first decompression or framing error is yielded once and ends the sequence;
/// payloads already yielded stay valid.
pub struct Payloads<'a, R: 'a + Read> {
    entries: Option<Entries<'a, GzDecoder<R>>>,
    pending: Option<ExtractionError>,
    data_prefix: &'a str,
}

impl<'a, R: 'a + Read> Payloads<'a, R> {
    fn fail(&mut self, err: std::io::Error) -> Option<Result<String, ExtractionError>> {
        self.entries = None;
        Some(Err(ExtractionError::Archive(err)))
    }
}

impl<'a, R: 'a + Read> Iterator for Payloads<'a, R> {
    type Item = Result<String, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }

        loop {
            let next = self.entries.as_mut()?.next()?;
            let mut entry = match next {
                Ok(entry) => entry,
                Err(e) => return self.fail(e),
            };

            let path = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => return self.fail(e),
            };

            if !path.contains(self.data_prefix) {
                debug!(path = %path, "skipping archive entry outside data directory");
                continue;
            }

            let mut body = Vec::new();
            if let Err(e) = entry.read_to_end(&mut body) {
                return self.fail(e);
            }

            if body.is_empty() {
                debug!(path = %path, "skipping empty archive entry");
                continue;
            }

            debug!(path = %path, bytes = body.len(), "extracted archive entry");
            return Some(Ok(String::from_utf8_lossy(&body).into_owned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ARCHIVE_DATA_PREFIX;
    use crate::test_support::{archive_path, gzip, tar_bytes, tar_gz};
    use std::io::Cursor;

    fn extract(compressed: Vec<u8>) -> Vec<Result<String, ExtractionError>> {
        let mut extractor = ArchiveExtractor::new(Cursor::new(compressed), ARCHIVE_DATA_PREFIX);
        extractor.payloads().collect()
    }

    #[test]
    fn test_only_entries_under_data_prefix_are_yielded() {
        let archive = tar_gz(&[
            ("insights-archive/meta_data/uploader.json", b"{\"a\":1}".as_slice()),
            (archive_path("x.json").as_str(), b"{\"x\":true}".as_slice()),
            ("insights-archive/data/var/log/messages", b"not json".as_slice()),
        ]);

        let payloads: Vec<String> = extract(archive).into_iter().map(Result::unwrap).collect();
        assert_eq!(payloads, vec!["{\"x\":true}".to_string()]);
    }

    #[test]
    fn test_entry_order_preserved_and_empty_bodies_dropped() {
        let archive = tar_gz(&[
            (archive_path("1.json").as_str(), b"one".as_slice()),
            (archive_path("2.json").as_str(), b"".as_slice()),
            (archive_path("3.json").as_str(), b"three".as_slice()),
        ]);

        let payloads: Vec<String> = extract(archive).into_iter().map(Result::unwrap).collect();
        assert_eq!(payloads, vec!["one".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_empty_archive_yields_nothing() {
        assert!(extract(tar_gz(&[])).is_empty());
    }

    #[test]
    fn test_corrupt_header_keeps_earlier_payloads() {
        let first = archive_path("first.json");
        let second = archive_path("second.json");
        let mut raw = tar_bytes(&[
            (first.as_str(), b"first".as_slice()),
            (second.as_str(), b"second".as_slice()),
        ]);
        // second header starts after the first header block and its single data block
        raw[1024 + 10] ^= 0xff;

        let results = extract(gzip(&raw));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "first");
        assert!(matches!(results[1], Err(ExtractionError::Archive(_))));
    }

    #[test]
    fn test_not_gzip_fails_on_first_read() {
        let results = extract(b"plain bytes, not an archive".to_vec());
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_payloads_cannot_be_restarted() {
        let archive = tar_gz(&[(archive_path("x.json").as_str(), b"x".as_slice())]);
        let mut extractor = ArchiveExtractor::new(Cursor::new(archive), ARCHIVE_DATA_PREFIX);

        assert_eq!(extractor.payloads().count(), 1);
        let again: Vec<_> = extractor.payloads().collect();
        assert_eq!(again.len(), 1);
        assert!(again[0].is_err());
    }
}
