//! MEGA API error codes.

use std::fmt;

/// Sentinel code shared by errors that only exist on the client side.
const LOCAL_ERROR: i64 = i32::MIN as i64;

/// MEGA API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Internal error
    Internal,
    /// Invalid arguments
    Args,
    /// Try again
    Again,
    /// Rate limit reached
    RateLimit,
    /// Upload failed
    Failed,
    /// Too many IPs on the upload target
    TooMany,
    /// Upload packet out of range
    Range,
    /// Upload target URL expired
    Expired,
    /// Object not found
    NotFound,
    /// Circular linkage attempted
    Circular,
    /// Access violation
    Access,
    /// Object already exists
    Exist,
    /// Incomplete resource
    Incomplete,
    /// Decryption failed
    Key,
    /// Invalid or expired session
    Sid,
    /// User blocked
    Blocked,
    /// Over quota
    OverQuota,
    /// Temporarily unavailable
    TempUnavail,
    /// Too many connections
    TooManyConnections,
    /// Write failure
    Write,
    /// Read failure
    Read,
    /// Invalid application key
    AppKey,
    /// SSL verification failed
    Ssl,
    /// Not enough quota
    GoingOverQuota,
    /// Multi-factor authentication required
    MfaRequired,
    /// Unparseable server response (local)
    BadResponse,
    /// MAC verification failed (local)
    MacMismatch,
    /// Bad node attribute (local)
    BadAttribute,
    /// Any code not in the table
    Unknown(i64),
}

impl ErrorCode {
    /// Map a server error number to a code.
    ///
    /// Returns `None` for `0`, which the server uses for success.
    pub fn parse(errno: i64) -> Option<Self> {
        let code = match errno {
            0 => return None,
            -1 => ErrorCode::Internal,
            -2 => ErrorCode::Args,
            -3 => ErrorCode::Again,
            -4 => ErrorCode::RateLimit,
            -5 => ErrorCode::Failed,
            -6 => ErrorCode::TooMany,
            -7 => ErrorCode::Range,
            -8 => ErrorCode::Expired,
            -9 => ErrorCode::NotFound,
            -10 => ErrorCode::Circular,
            -11 => ErrorCode::Access,
            -12 => ErrorCode::Exist,
            -13 => ErrorCode::Incomplete,
            -14 => ErrorCode::Key,
            -15 => ErrorCode::Sid,
            -16 => ErrorCode::Blocked,
            -17 => ErrorCode::OverQuota,
            -18 => ErrorCode::TempUnavail,
            -19 => ErrorCode::TooManyConnections,
            -20 => ErrorCode::Write,
            -21 => ErrorCode::Read,
            -22 => ErrorCode::AppKey,
            -23 => ErrorCode::Ssl,
            -24 => ErrorCode::GoingOverQuota,
            -26 => ErrorCode::MfaRequired,
            other => ErrorCode::Unknown(other),
        };
        Some(code)
    }

    /// Numeric wire value of this code.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::Internal => -1,
            ErrorCode::Args => -2,
            ErrorCode::Again => -3,
            ErrorCode::RateLimit => -4,
            ErrorCode::Failed => -5,
            ErrorCode::TooMany => -6,
            ErrorCode::Range => -7,
            ErrorCode::Expired => -8,
            ErrorCode::NotFound => -9,
            ErrorCode::Circular => -10,
            ErrorCode::Access => -11,
            ErrorCode::Exist => -12,
            ErrorCode::Incomplete => -13,
            ErrorCode::Key => -14,
            ErrorCode::Sid => -15,
            ErrorCode::Blocked => -16,
            ErrorCode::OverQuota => -17,
            ErrorCode::TempUnavail => -18,
            ErrorCode::TooManyConnections => -19,
            ErrorCode::Write => -20,
            ErrorCode::Read => -21,
            ErrorCode::AppKey => -22,
            ErrorCode::Ssl => -23,
            ErrorCode::GoingOverQuota => -24,
            ErrorCode::MfaRequired => -26,
            ErrorCode::BadResponse | ErrorCode::MacMismatch | ErrorCode::BadAttribute => {
                LOCAL_ERROR
            }
            ErrorCode::Unknown(code) => *code,
        }
    }

    /// Get human-readable description of the error.
    pub fn description(&self) -> String {
        let text = match self {
            ErrorCode::Internal => "Internal error occurred",
            ErrorCode::Args => "Invalid arguments",
            ErrorCode::Again => "Try again",
            ErrorCode::RateLimit => "Rate limit reached",
            ErrorCode::Failed => "The upload failed. Please restart it from scratch",
            ErrorCode::TooMany => {
                "Too many concurrent IP addresses are accessing this upload target URL"
            }
            ErrorCode::Range => {
                "The upload file packet is out of range or not starting and ending on a chunk boundary"
            }
            ErrorCode::Expired => {
                "The upload target URL you are trying to access has expired. Please request a fresh one"
            }
            ErrorCode::NotFound => "Object (typically, node or user) not found",
            ErrorCode::Circular => "Circular linkage attempted",
            ErrorCode::Access => "Access violation",
            ErrorCode::Exist => "Trying to create an object that already exists",
            ErrorCode::Incomplete => "Trying to access an incomplete resource",
            ErrorCode::Key => "A decryption operation failed",
            ErrorCode::Sid => "Invalid or expired user session, please relogin",
            ErrorCode::Blocked => "User blocked",
            ErrorCode::OverQuota => "Request over quota",
            ErrorCode::TempUnavail => "Resource temporarily not available, please try again later",
            ErrorCode::TooManyConnections => "Too many connections on this resource.",
            ErrorCode::Write => {
                "File could not be written to (or failed post-write integrity check)."
            }
            ErrorCode::Read => {
                "File could not be read from (or changed unexpectedly during reading)."
            }
            ErrorCode::AppKey => "Invalid or missing application key.",
            ErrorCode::Ssl => "SSL verification failed",
            ErrorCode::GoingOverQuota => "Not enough quota",
            ErrorCode::MfaRequired => "Multi-factor authentication required",
            ErrorCode::BadResponse => "Bad response from server",
            ErrorCode::MacMismatch => "MAC verification failed",
            ErrorCode::BadAttribute => "Bad node attribute",
            ErrorCode::Unknown(code) => return format!("Unknown mega error code: {}", code),
        };
        text.to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::parse(-1), Some(ErrorCode::Internal));
        assert_eq!(ErrorCode::parse(-3), Some(ErrorCode::Again));
        assert_eq!(ErrorCode::parse(-9), Some(ErrorCode::NotFound));
        assert_eq!(ErrorCode::parse(-17), Some(ErrorCode::OverQuota));
        assert_eq!(ErrorCode::parse(-18), Some(ErrorCode::TempUnavail));
        assert_eq!(ErrorCode::parse(-26), Some(ErrorCode::MfaRequired));
        assert_eq!(ErrorCode::parse(-25), Some(ErrorCode::Unknown(-25)));
        assert_eq!(ErrorCode::parse(0), None);
    }

    #[test]
    fn test_codes_round_trip() {
        for errno in (-24..=-1).chain(std::iter::once(-26)) {
            let code = ErrorCode::parse(errno).unwrap();
            assert!(!matches!(code, ErrorCode::Unknown(_)), "errno {}", errno);
            assert_eq!(code.code(), errno);
        }
    }

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(ErrorCode::Again.description(), "Try again");
        assert_eq!(ErrorCode::OverQuota.description(), "Request over quota");
        assert_eq!(
            ErrorCode::Unknown(-99).description(),
            "Unknown mega error code: -99"
        );
        assert_eq!(ErrorCode::MacMismatch.code(), i64::from(i32::MIN));
    }
}
