use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedArtifact {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedArtifact {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! incompatible_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::IncompatibleConfiguration(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups. Pipeline errors are raised while decoding, composing,
/// generating or defining classes and are always surfaced to the caller. Runtime failures of an
/// intercepted method are not represented here at all; they travel as
/// [`crate::runtime::Thrown`] inside an [`crate::runtime::Outcome`] and are only ever handled by
/// error-recovery injections.
///
/// # Error Categories
///
/// ## Artifact Errors
/// - [`Error::MalformedArtifact`] - The class image could not be decoded
/// - [`Error::OutOfBounds`] - A read ran past the end of the input
/// - [`Error::RecursionLimit`] - Nested annotation values exceeded the configured depth
/// - [`Error::NotSupported`] - A construct the codec cannot re-encode
///
/// ## Pipeline Errors
/// - [`Error::IncompatibleConfiguration`] - An injection the backend cannot realize
/// - [`Error::UnresolvedInjectionReference`] - A callback token without a registry entry
/// - [`Error::LoadFailure`] - The definer rejected a generated image
///
/// ## Environment Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use classweave::{Error, classfile::ClassFile};
///
/// match ClassFile::from_mem(vec![0xCA, 0xFE]) {
///     Ok(_) => unreachable!(),
///     Err(Error::MalformedArtifact { message, .. }) => {
///         eprintln!("broken class image: {}", message);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The binary class image is damaged and could not be decoded.
    ///
    /// Fatal for that artifact and never retried. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    MalformedArtifact {
        /// The message to be printed for the MalformedArtifact error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the class image.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The class image uses a construct the codec cannot reproduce.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// A visitor produced an injection, or an injection and target combination, that the active
    /// backend cannot realize.
    ///
    /// Surfaced immediately and never silently dropped.
    #[error("Incompatible configuration - {0}")]
    IncompatibleConfiguration(String),

    /// A callback token embedded in generated code has no matching registry entry.
    ///
    /// Token generation and registration happen together with code generation, so this indicates
    /// a broken pipeline. It is never handed to error-recovery injections.
    #[error("Unresolved injection reference - {0}")]
    UnresolvedInjectionReference(String),

    /// The class definer rejected a generated image.
    ///
    /// Propagated unchanged; the same plan would produce the same invalid image again.
    #[error("Load failure - {0}")]
    LoadFailure(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while mapping class files from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Recursion limit reached.
    ///
    /// Nested annotation element values are decoded recursively; the depth is bounded by
    /// [`crate::InjectorConfig::max_annotation_depth`].
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}

impl Error {
    /// Folds every decoding failure into [`Error::MalformedArtifact`].
    ///
    /// The decode boundary only reports malformed artifacts; cursor overruns and recursion
    /// limits are details of why the artifact was malformed.
    #[must_use]
    pub fn into_malformed(self) -> Self {
        match self {
            Error::OutOfBounds { file, line } => Error::MalformedArtifact {
                message: "truncated class image".to_string(),
                file,
                line,
            },
            Error::RecursionLimit(depth) => Error::MalformedArtifact {
                message: format!("annotation nesting deeper than {depth}"),
                file: file!(),
                line: line!(),
            },
            Error::NotSupported(message) => Error::MalformedArtifact {
                message,
                file: file!(),
                line: line!(),
            },
            other => other,
        }
    }

    /// Returns true for the variants produced while decoding a class image.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedArtifact { .. })
    }
}
