//! Outcome values reported by backend jobs.
//!
//! Failures are data, not control flow: every job reports an [`OpError`]
//! which is "no error" when `code() == 0`. Cancellation is a dedicated error
//! code so it can be told apart from a genuine failure.

/// Error codes shared by backends and resources.
pub mod codes {
    pub const NO_ERROR: u32 = 0;
    pub const GENERAL: u32 = 1;
    pub const BAD_SIGNATURE: u32 = 8;
    pub const NO_PUBKEY: u32 = 9;
    pub const BAD_PASSPHRASE: u32 = 11;
    pub const NO_SECKEY: u32 = 17;
    pub const UNUSABLE_PUBKEY: u32 = 53;
    pub const UNUSABLE_SECKEY: u32 = 54;
    pub const INV_VALUE: u32 = 55;
    pub const INTERNAL: u32 = 63;
    pub const CANCELED: u32 = 99;
    pub const DECRYPT_FAILED: u32 = 152;
    pub const NO_PASSPHRASE: u32 = 177;
    pub const FULLY_CANCELED: u32 = 198;

    /// Flag marking codes that wrap an operating-system errno.
    pub const SYSTEM_ERROR: u32 = 1 << 15;
    pub const ENOENT: u32 = SYSTEM_ERROR | 2;
    pub const EIO: u32 = SYSTEM_ERROR | 5;
    pub const EACCES: u32 = SYSTEM_ERROR | 13;
    pub const EEXIST: u32 = SYSTEM_ERROR | 17;

    /// Map an I/O error to the closest code.
    pub fn from_io(err: &std::io::Error) -> u32 {
        match err.kind() {
            std::io::ErrorKind::NotFound => ENOENT,
            std::io::ErrorKind::PermissionDenied => EACCES,
            std::io::ErrorKind::AlreadyExists => EEXIST,
            _ => EIO,
        }
    }
}

/// Who produced an error. Folded into [`OpError::encoded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorSource {
    #[default]
    Unknown,
    Backend,
    Resource,
}

impl ErrorSource {
    fn bits(self) -> u32 {
        match self {
            ErrorSource::Unknown => 0,
            ErrorSource::Backend => 7,
            ErrorSource::Resource => 32,
        }
    }
}

const CODE_MASK: u32 = 0xffff;
const SOURCE_SHIFT: u32 = 24;
const SOURCE_MASK: u32 = 0x7f;

/// Success/failure/cancellation descriptor of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpError {
    code: u32,
    source: ErrorSource,
    description: String,
}

impl OpError {
    /// The "no error" value.
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a backend error.
    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self::with_source(ErrorSource::Backend, code, description)
    }

    /// Codes outside the 16-bit code space become [`codes::GENERAL`].
    pub fn with_source(source: ErrorSource, code: u32, description: impl Into<String>) -> Self {
        let code = if code > CODE_MASK { codes::GENERAL } else { code };
        Self {
            code,
            source,
            description: description.into(),
        }
    }

    /// Create a user-cancellation error.
    pub fn canceled() -> Self {
        Self::new(codes::CANCELED, "Operation cancelled")
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn source(&self) -> ErrorSource {
        self.source
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether an error occurred. Cancellation counts as an error.
    pub fn is_err(&self) -> bool {
        self.code != codes::NO_ERROR
    }

    pub fn is_canceled(&self) -> bool {
        self.code == codes::CANCELED || self.code == codes::FULLY_CANCELED
    }

    /// Code and source packed into one integer; 0 for success.
    pub fn encoded(&self) -> u32 {
        if !self.is_err() {
            return 0;
        }
        ((self.source.bits() & SOURCE_MASK) << SOURCE_SHIFT) | self.code
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_err() {
            f.write_str("Success")
        } else if self.description.is_empty() {
            write!(f, "Error code {}", self.code)
        } else {
            f.write_str(&self.description)
        }
    }
}

/// A signature created by a signing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSignature {
    pub fingerprint: String,
    /// RFC3339 creation time.
    pub created: String,
}

/// Outcome of a signing operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SigningResult {
    error: OpError,
    signatures: Vec<CreatedSignature>,
}

impl SigningResult {
    pub fn new(error: OpError, signatures: Vec<CreatedSignature>) -> Self {
        Self { error, signatures }
    }

    pub fn failed(error: OpError) -> Self {
        Self::new(error, Vec::new())
    }

    pub fn error(&self) -> &OpError {
        &self.error
    }

    pub fn signatures(&self) -> &[CreatedSignature] {
        &self.signatures
    }
}

/// Outcome of an encryption operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionResult {
    error: OpError,
    invalid_recipients: Vec<String>,
}

impl EncryptionResult {
    pub fn new(error: OpError, invalid_recipients: Vec<String>) -> Self {
        Self {
            error,
            invalid_recipients,
        }
    }

    pub fn failed(error: OpError) -> Self {
        Self::new(error, Vec::new())
    }

    pub fn error(&self) -> &OpError {
        &self.error
    }

    /// Fingerprints of recipients that could not be used.
    pub fn invalid_recipients(&self) -> &[String] {
        &self.invalid_recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_error_encodes_to_zero() {
        let err = OpError::none();
        assert!(!err.is_err());
        assert!(!err.is_canceled());
        assert_eq!(err.encoded(), 0);
        assert_eq!(err.to_string(), "Success");
    }

    #[test]
    fn cancellation_is_an_error_with_its_own_flag() {
        let err = OpError::canceled();
        assert!(err.is_err());
        assert!(err.is_canceled());
        assert!(OpError::new(codes::FULLY_CANCELED, "").is_canceled());
        assert!(!OpError::new(codes::GENERAL, "boom").is_canceled());
    }

    #[test]
    fn out_of_range_code_is_still_an_error() {
        let err = OpError::new(0x10000, "huge");
        assert!(err.is_err());
        assert_eq!(err.code(), codes::GENERAL);
        assert_eq!(OpError::new(codes::NO_SECKEY, "").code(), codes::NO_SECKEY);
    }

    #[test]
    fn encoded_error_carries_source_and_code() {
        let backend = OpError::new(codes::NO_SECKEY, "No secret key");
        assert_eq!(backend.encoded(), (7 << 24) | codes::NO_SECKEY);

        let resource = OpError::with_source(ErrorSource::Resource, codes::EEXIST, "exists");
        assert_eq!(resource.encoded() & 0xffff, codes::EEXIST);
        assert_eq!(resource.encoded() >> 24, 32);
    }

    #[test]
    fn io_errors_map_to_system_codes() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(codes::from_io(&not_found), codes::ENOENT);
        let other = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(codes::from_io(&other), codes::EIO);
    }
}
