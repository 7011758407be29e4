use std::fmt;
use std::io;

/// Error categories the harness counts failures under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Fetch,
    Extraction,
    Parse,
    Classification,
    Integrity,
    Persistence,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Fetch,
        ErrorKind::Extraction,
        ErrorKind::Parse,
        ErrorKind::Classification,
        ErrorKind::Integrity,
        ErrorKind::Persistence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::Extraction => "extraction_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::Classification => "classification_error",
            ErrorKind::Integrity => "integrity_error",
            ErrorKind::Persistence => "persistence_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The object store could not be reached or did not hand back a body.
#[derive(Debug)]
pub enum FetchError {
    InvalidUrl { url: String, reason: String },
    Transport { url: String, source: reqwest::Error },
    Status { url: String, status: u16 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl { url, reason } => write!(f, "invalid url {}: {}", url, reason),
            FetchError::Transport { url, source } => {
                write!(f, "request to {} failed: {}", url, source)
            }
            FetchError::Status { url, status } => {
                write!(f, "object store returned status {} for {}", status, url)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Corrupt compression or archive framing.
#[derive(Debug)]
pub enum ExtractionError {
    Blob(io::Error),
    Archive(io::Error),
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::Blob(e) => write!(f, "failed to decompress payload: {}", e),
            ExtractionError::Archive(e) => write!(f, "failed to read archive: {}", e),
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractionError::Blob(e) | ExtractionError::Archive(e) => Some(e),
        }
    }
}

/// Malformed envelope or payload JSON.
#[derive(Debug)]
pub enum ParseError {
    Json(serde_json::Error),
    NotAnObject,
    MissingField(&'static str),
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Json(e) => write!(f, "malformed json: {}", e),
            ParseError::NotAnObject => write!(f, "expected a json object"),
            ParseError::MissingField(field) => write!(f, "missing field `{}`", field),
            ParseError::InvalidField { field, reason } => {
                write!(f, "invalid field `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err)
    }
}

/// The payload parsed, but its shape is not one the classifier knows how to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    UnrecognizedShape,
    MissingField(String),
    InvalidField { field: String, expected: &'static str },
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationError::UnrecognizedShape => {
                write!(f, "payload is neither a new instance nor an update")
            }
            ClassificationError::MissingField(field) => {
                write!(f, "payload is missing required field `{}`", field)
            }
            ClassificationError::InvalidField { field, expected } => {
                write!(f, "payload field `{}` is not {}", field, expected)
            }
        }
    }
}

impl std::error::Error for ClassificationError {}

/// An update that does not line up with exactly one stored instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    UnknownLinkingHash(String),
    LinkingHashNotUnique { linking_hash: String, matches: usize },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::UnknownLinkingHash(hash) => {
                write!(f, "update seen for unknown linking hash: {}", hash)
            }
            IntegrityError::LinkingHashNotUnique {
                linking_hash,
                matches,
            } => write!(
                f,
                "linking hash not unique: {} matches {} instances",
                linking_hash, matches
            ),
        }
    }
}

impl std::error::Error for IntegrityError {}

/// Transaction or constraint failure in the store.
#[derive(Debug)]
pub enum PersistenceError {
    UniqueViolation { linking_hash: String },
    Database(sqlx::Error),
    Inconsistent(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::UniqueViolation { linking_hash } => {
                write!(f, "an instance with linking hash {} already exists", linking_hash)
            }
            PersistenceError::Database(e) => write!(f, "database error: {}", e),
            PersistenceError::Inconsistent(msg) => write!(f, "inconsistent store state: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        PersistenceError::Database(err)
    }
}

/// Everything that can end the processing of one message.
#[derive(Debug)]
pub enum IngestError {
    Fetch(FetchError),
    Extraction(ExtractionError),
    Parse(ParseError),
    Classification(ClassificationError),
    Integrity(IntegrityError),
    Persistence(PersistenceError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Fetch(_) => ErrorKind::Fetch,
            IngestError::Extraction(_) => ErrorKind::Extraction,
            IngestError::Parse(_) => ErrorKind::Parse,
            IngestError::Classification(_) => ErrorKind::Classification,
            IngestError::Integrity(_) => ErrorKind::Integrity,
            IngestError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Fetch(e) => write!(f, "{}", e),
            IngestError::Extraction(e) => write!(f, "{}", e),
            IngestError::Parse(e) => write!(f, "{}", e),
            IngestError::Classification(e) => write!(f, "{}", e),
            IngestError::Integrity(e) => write!(f, "{}", e),
            IngestError::Persistence(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Fetch(e) => Some(e),
            IngestError::Extraction(e) => Some(e),
            IngestError::Parse(e) => Some(e),
            IngestError::Classification(e) => Some(e),
            IngestError::Integrity(e) => Some(e),
            IngestError::Persistence(e) => Some(e),
        }
    }
}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        IngestError::Fetch(err)
    }
}

impl From<ExtractionError> for IngestError {
    fn from(err: ExtractionError) -> Self {
        IngestError::Extraction(err)
    }
}

impl From<ParseError> for IngestError {
    fn from(err: ParseError) -> Self {
        IngestError::Parse(err)
    }
}

impl From<ClassificationError> for IngestError {
    fn from(err: ClassificationError) -> Self {
        IngestError::Classification(err)
    }
}

impl From<IntegrityError> for IngestError {
    fn from(err: IntegrityError) -> Self {
        IngestError::Integrity(err)
    }
}

impl From<PersistenceError> for IngestError {
    fn from(err: PersistenceError) -> Self {
        IngestError::Persistence(err)
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
