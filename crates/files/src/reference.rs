//! File references and the codec that creates them.
//!
//! A reference is the only handle callers keep for a stored file. It has the form
//!
//! ```text
//! <year>/<month>/<day>/<generated-id>[.ext][*<percent-encoded original filename>]
//! ```
//!
//! The part before `*` is the file's path relative to every storage root. The optional suffix
//! carries the original filename for display and is never used to locate bytes.

use crate::clock::Clock;
use crate::constants::REFERENCE_SEPARATOR;
use crate::FilesError;
use depot_uuid::IdGenerator;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Bytes left unescaped in an encoded filename. `*` and `/` are always escaped.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Opaque identifier of a stored file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileReference {
    /// `YYYY/MM/DD`
    date_path: String,
    generated_name: String,
    original_filename: Option<String>,
}

impl FileReference {
    /// Parses a reference string.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidReferenceFormat`] if the path part has fewer than four
    /// segments, or if any segment is empty, `.`/`..`, or contains a path separator.
    pub fn parse(input: &str) -> Result<Self, FilesError> {
        let (path, encoded_name) = match input.split_once(REFERENCE_SEPARATOR) {
            Some((path, name)) => (path, Some(name)),
            None => (input, None),
        };

        let segments: Vec<&str> = path.splitn(4, '/').collect();
        if segments.len() < 4 {
            return Err(FilesError::InvalidReferenceFormat(format!(
                "expected <year>/<month>/<day>/<name>, got: '{}'",
                input
            )));
        }
        for segment in &segments {
            validate_segment(segment, input)?;
        }

        let original_filename = encoded_name
            .filter(|name| !name.is_empty())
            .map(|name| percent_decode_str(name).decode_utf8_lossy().into_owned());

        Ok(Self {
            date_path: segments[..3].join("/"),
            generated_name: segments[3].to_owned(),
            original_filename,
        })
    }

    /// The `YYYY/MM/DD` bucket.
    pub fn date_path(&self) -> &str {
        &self.date_path
    }

    /// The generated file name within the bucket, including any extension.
    pub fn generated_name(&self) -> &str {
        &self.generated_name
    }

    /// The decoded original filename, or `""` when none was recorded.
    pub fn original_filename(&self) -> &str {
        self.original_filename.as_deref().unwrap_or("")
    }

    /// Path of the file relative to a storage root.
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.date_path.split('/').collect();
        path.push(&self.generated_name);
        path
    }
}

fn validate_segment(segment: &str, input: &str) -> Result<(), FilesError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(FilesError::InvalidReferenceFormat(format!(
            "invalid path segment '{}' in reference '{}'",
            segment, input
        )));
    }
    Ok(())
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date_path, self.generated_name)?;
        if let Some(name) = &self.original_filename {
            write!(
                f,
                "{}{}",
                REFERENCE_SEPARATOR,
                utf8_percent_encode(name, FILENAME_ENCODE_SET)
            )?;
        }
        Ok(())
    }
}

impl FromStr for FileReference {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileReference::parse(s)
    }
}

/// Returns the decoded original filename embedded in `reference`, or `""`.
///
/// Performs no validation of the path part.
pub fn extract_original_filename(reference: &str) -> String {
    match reference.split_once(REFERENCE_SEPARATOR) {
        Some((_, name)) => percent_decode_str(name).decode_utf8_lossy().into_owned(),
        None => String::new(),
    }
}

/// Returns the root-relative path of `reference`.
///
/// # Errors
///
/// Returns [`FilesError::InvalidReferenceFormat`] for malformed references.
pub fn to_relative_path(reference: &str) -> Result<PathBuf, FilesError> {
    FileReference::parse(reference).map(|r| r.relative_path())
}

/// Creates new references from a clock and an id generator.
#[derive(Clone)]
pub struct ReferenceCodec {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl fmt::Debug for ReferenceCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCodec").finish_non_exhaustive()
    }
}

impl ReferenceCodec {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// Creates a reference for a new file.
    ///
    /// The date bucket comes from the clock (UTC). If `original_filename` has an extension, the
    /// generated name keeps it; a name that is not blank is recorded after the `*` separator.
    pub fn create_reference(&self, original_filename: Option<&str>) -> FileReference {
        let date_path = self.clock.now().format("%Y/%m/%d").to_string();
        let original_filename = original_filename
            .filter(|name| !name.trim().is_empty())
            .map(str::to_owned);

        let id = self.ids.generate();
        let generated_name = match original_filename.as_deref().and_then(file_extension) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.to_string(),
        };

        FileReference {
            date_path,
            generated_name,
            original_filename,
        }
    }
}

/// Extension of the last path component, if it is non-empty ASCII alphanumeric.
fn file_extension(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use depot_uuid::FileId;
    use std::path::Path;

    struct FixedIds(FileId);

    impl IdGenerator for FixedIds {
        fn generate(&self) -> FileId {
            self.0
        }
    }

    const ID: &str = "550e8400e29b41d4a716446655440000";

    fn codec() -> ReferenceCodec {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap());
        ReferenceCodec::new(
            Arc::new(clock),
            Arc::new(FixedIds(FileId::parse(ID).unwrap())),
        )
    }

    #[test]
    fn test_create_reference_with_extension() {
        let reference = codec().create_reference(Some("report.pdf"));

        assert_eq!(
            reference.to_string(),
            format!("2024/03/05/{}.pdf*report.pdf", ID)
        );
        assert_eq!(reference.date_path(), "2024/03/05");
        assert_eq!(reference.generated_name(), format!("{}.pdf", ID));
        assert_eq!(reference.original_filename(), "report.pdf");
    }

    #[test]
    fn test_create_reference_without_name() {
        let codec = codec();

        for name in [None, Some(""), Some("   "), Some("\t")] {
            let reference = codec.create_reference(name);
            let encoded = reference.to_string();

            assert_eq!(encoded, format!("2024/03/05/{}", ID));
            assert!(!encoded.contains('*'));
            assert_eq!(extract_original_filename(&encoded), "");
        }
    }

    #[test]
    fn test_create_reference_without_recognizable_extension() {
        let codec = codec();

        assert_eq!(
            codec.create_reference(Some("README")).generated_name(),
            ID
        );
        assert_eq!(codec.create_reference(Some("trailing.")).generated_name(), ID);
        assert_eq!(
            codec.create_reference(Some("odd.ta*r")).generated_name(),
            ID
        );
        assert_eq!(
            codec.create_reference(Some("dir.d/archive.tar.gz")).generated_name(),
            format!("{}.gz", ID)
        );
    }

    #[test]
    fn test_original_filename_round_trip_utf8() {
        let codec = codec();

        for name in ["café.pdf", "résumé final (2).docx", "a*b/c.txt", "100% done.txt"] {
            let encoded = codec.create_reference(Some(name)).to_string();
            let after_separator = encoded.split_once('*').unwrap().1;

            assert!(!after_separator.contains('*'));
            assert!(!after_separator.contains('/'));
            assert_eq!(extract_original_filename(&encoded), name);
            assert_eq!(
                FileReference::parse(&encoded).unwrap().original_filename(),
                name
            );
        }
    }

    #[test]
    fn test_relative_path_has_four_segments_from_clock_date() {
        let encoded = codec().create_reference(Some("report.pdf")).to_string();
        let relative = to_relative_path(&encoded).unwrap();

        assert_eq!(relative.components().count(), 4);
        assert_eq!(
            relative,
            Path::new("2024").join("03").join("05").join(format!("{}.pdf", ID))
        );
    }

    #[test]
    fn test_parse_round_trips_display() {
        let encoded = format!("2024/03/05/{}.pdf*caf%C3%A9.pdf", ID);
        let reference: FileReference = encoded.parse().unwrap();

        assert_eq!(reference.original_filename(), "café.pdf");
        assert_eq!(reference.to_string(), encoded);
    }

    #[test]
    fn test_parse_rejects_short_paths() {
        for input in ["", "2024/03", "2024/03/05", "2024/03/05*name.txt"] {
            assert!(
                matches!(
                    FileReference::parse(input),
                    Err(FilesError::InvalidReferenceFormat(_))
                ),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_traversal_segments() {
        for input in [
            "2024/03/../secret",
            "2024//05/file",
            "2024/03/05/..",
            "2024/03/05/a/b",
            "2024/03/05/a\\b",
        ] {
            assert!(
                matches!(
                    FileReference::parse(input),
                    Err(FilesError::InvalidReferenceFormat(_))
                ),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_empty_suffix_has_no_original_filename() {
        let reference = FileReference::parse("2024/03/05/abc*").unwrap();

        assert_eq!(reference.original_filename(), "");
        assert_eq!(reference.to_string(), "2024/03/05/abc");
    }
}
