use crate::service::{ApplicationException, ApplicationExceptionType, CallType};
use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerializerError>;

/// Where a service call failed while being decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    pub method: Option<String>,
    pub call_type: Option<CallType>,
    pub sequence: i32,
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "method {}", method)?,
            None => write!(f, "unknown method")?,
        }
        if let Some(call_type) = self.call_type {
            write!(f, " ({})", call_type)?;
        }
        write!(f, " seq {}", self.sequence)
    }
}

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Protocol(String),
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no field {field} in {message}")]
    UnknownField { message: String, field: String },
    #[error("no {name} value {value}")]
    UnknownEnumValue { name: String, value: String },
    #[error("type mismatch for {context}: expected {expected}, got {actual}")]
    TypeMismatch { context: String, expected: String, actual: String },
    #[error("required field(s) {} missing in {message}", fields.join(", "))]
    MissingRequired { message: String, fields: Vec<String> },
    #[error("{kind:?}: {message}")]
    Application { kind: ApplicationExceptionType, message: String },
    #[error("{source}, in {context}")]
    Call { context: Box<CallContext>, source: Box<SerializerError> },
}

impl SerializerError {
    #[inline]
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    #[inline]
    pub fn application<S: Into<String>>(kind: ApplicationExceptionType, msg: S) -> Self {
        Self::Application { kind, message: msg.into() }
    }

    /// Attach the service call context. An error that already carries one is returned as is.
    pub fn with_call(self, context: CallContext) -> Self {
        match self {
            e @ Self::Call { .. } => e,
            e => Self::Call { context: Box::new(context), source: Box::new(e) },
        }
    }

    /// The application exception type this failure should be reported as.
    pub fn exception_type(&self) -> ApplicationExceptionType {
        match self {
            Self::Application { kind, .. } => *kind,
            Self::Call { source, .. } => source.exception_type(),
            _ => ApplicationExceptionType::ProtocolError,
        }
    }

    pub fn call_context(&self) -> Option<&CallContext> {
        match self {
            Self::Call { context, .. } => Some(context),
            _ => None,
        }
    }

    #[inline]
    pub fn method_name(&self) -> Option<&str> {
        self.call_context().and_then(|c| c.method.as_deref())
    }

    #[inline]
    pub fn call_type(&self) -> Option<CallType> {
        self.call_context().and_then(|c| c.call_type)
    }

    #[inline]
    pub fn sequence(&self) -> Option<i32> {
        self.call_context().map(|c| c.sequence)
    }

    /// The underlying failure, without the service call context.
    pub fn root(&self) -> &SerializerError {
        match self {
            Self::Call { source, .. } => source.root(),
            e => e,
        }
    }

    /// Build the exception payload to send back to the caller.
    pub fn to_application_exception(&self) -> ApplicationException {
        let message = match self.root() {
            Self::Application { message, .. } => message.clone(),
            e => e.to_string(),
        };
        ApplicationException::new(self.exception_type(), message)
    }

    pub(crate) fn unexpected_eof(what: &str) -> Self {
        let message = format!("unexpected end of stream reading {}", what);
        Self::Io(io::Error::new(io::ErrorKind::UnexpectedEof, message))
    }
}

/// A grammar error in pretty text, with the position it was found at.
///
/// Line and column are 1-based. `length` is the number of chars the offending token spans.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error on line {line}, pos {column}: {message}")]
pub struct TokenizerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
    pub line_content: String,
}

impl TokenizerError {
    /// Multi-line form showing the source line and a marker under the offending token.
    pub fn as_long_string(&self) -> String {
        let mut s = format!("Error on line {}, pos {}: {}\n", self.line, self.column, self.message);
        s.push_str(&self.line_content);
        s.push('\n');
        for _ in 1..self.column {
            s.push('-');
        }
        for _ in 0..self.length.max(1) {
            s.push('^');
        }
        s
    }
}
