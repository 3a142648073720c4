//! Failure classification
//!
//! An error returned by a retried operation is either *transient* (worth
//! another attempt) or *permanent* (retrying cannot help). Classification is
//! a capability rather than a type hierarchy: any error type opts in by
//! implementing [`Failure`], and anything that does not say otherwise is
//! transient.
//!
//! Operations that mix failure kinds return [`AnyFailure`], a type-erased
//! error that keeps the classification of whatever it was built from. Error
//! types without a [`Failure`] impl are retried through [`Unclassified`], or
//! wrapped explicitly in [`TransientError`] or [`PermanentError`].

use std::error::Error;
use std::fmt;

/// Type-erased error without a classification of its own
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Whether a failure may succeed on a later attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Retry until the attempt budget is consumed
    #[default]
    Transient,
    /// Stop retrying immediately
    Permanent,
}

impl Classification {
    /// Returns `true` for [`Classification::Permanent`]
    pub fn is_permanent(self) -> bool {
        matches!(self, Classification::Permanent)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Transient => f.write_str("transient"),
            Classification::Permanent => f.write_str("permanent"),
        }
    }
}

/// Capability of an error to declare whether it is worth retrying
///
/// The default implementation reports [`Classification::Transient`], so an
/// empty `impl Failure for MyError {}` opts a type into retrying without
/// changing behaviour.
///
/// ```rust
/// use msx_retry::{Classification, Failure};
///
/// #[derive(Debug)]
/// enum LookupError {
///     Unavailable,
///     NotFound,
/// }
///
/// impl Failure for LookupError {
///     fn classification(&self) -> Classification {
///         match self {
///             LookupError::Unavailable => Classification::Transient,
///             LookupError::NotFound => Classification::Permanent,
///         }
///     }
/// }
///
/// assert!(LookupError::NotFound.is_permanent());
/// assert!(!LookupError::Unavailable.is_permanent());
/// ```
pub trait Failure {
    /// Classification of this failure
    fn classification(&self) -> Classification {
        Classification::Transient
    }

    /// Whether the retry loop must stop on this failure
    fn is_permanent(&self) -> bool {
        self.classification().is_permanent()
    }
}

/// Classify an error that carries no [`Failure`] impl of its own
///
/// Only the outermost error is inspected: a [`PermanentError`] is permanent,
/// anything else is transient. A [`PermanentError`] buried in another error's
/// source chain does not stop the retry loop.
pub fn classify(error: &(dyn Error + 'static)) -> Classification {
    if error.is::<PermanentError>() {
        Classification::Permanent
    } else {
        Classification::Transient
    }
}

impl Failure for std::io::Error {}

/// An error that can be erased into [`AnyFailure`]
///
/// Implemented for every thread-safe error type with a [`Failure`] impl.
pub trait FailureError: Error + Failure + Send + Sync + 'static {
    /// View as a plain error, for downcasting
    fn as_error(&self) -> &(dyn Error + Send + Sync + 'static);

    /// Convert into a plain boxed error
    fn into_box_error(self: Box<Self>) -> BoxError;
}

impl<T> FailureError for T
where
    T: Error + Failure + Send + Sync + 'static,
{
    fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self
    }

    fn into_box_error(self: Box<Self>) -> BoxError {
        self
    }
}

/// Type-erased error that keeps its classification
///
/// Any [`FailureError`] converts into `AnyFailure` with `?`, and the
/// resulting value reports the classification of the original error. A
/// plain [`BoxError`] converts too: the classification wrappers are
/// recognised by downcasting and anything else becomes transient.
///
/// ```rust
/// use msx_retry::{AnyFailure, Classification, Failure};
///
/// #[derive(Debug)]
/// struct NotFound;
///
/// impl std::fmt::Display for NotFound {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("not found")
///     }
/// }
///
/// impl std::error::Error for NotFound {}
///
/// impl Failure for NotFound {
///     fn classification(&self) -> Classification {
///         Classification::Permanent
///     }
/// }
///
/// fn lookup() -> Result<(), NotFound> {
///     Err(NotFound)
/// }
///
/// fn operation() -> Result<(), AnyFailure> {
///     lookup()?;
///     Ok(())
/// }
///
/// assert!(operation().unwrap_err().is_permanent());
/// ```
pub struct AnyFailure {
    inner: Box<dyn FailureError>,
}

impl AnyFailure {
    /// Erase `error`, keeping its classification
    pub fn new(error: impl FailureError) -> Self {
        Self { inner: Box::new(error) }
    }

    /// The erased error
    pub fn inner(&self) -> &dyn FailureError {
        self.inner.as_ref()
    }

    /// Whether the erased error, or the cause inside a classification
    /// wrapper, is of type `E`
    pub fn is<E: Error + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    /// Borrow the erased error, or the cause inside a classification
    /// wrapper, as `E`
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        let error = self.inner.as_error();
        error.downcast_ref::<E>().or_else(|| wrapped_cause(error)?.downcast_ref::<E>())
    }

    /// Unwrap into the erased error
    pub fn into_inner(self) -> Box<dyn FailureError> {
        self.inner
    }

    /// Convert into a plain boxed error, dropping the classification
    pub fn into_box_error(self) -> BoxError {
        self.inner.into_box_error()
    }
}

fn wrapped_cause<'a>(
    error: &'a (dyn Error + Send + Sync + 'static),
) -> Option<&'a (dyn Error + Send + Sync + 'static)> {
    if let Some(permanent) = error.downcast_ref::<PermanentError>() {
        Some(permanent.cause())
    } else {
        error.downcast_ref::<TransientError>().map(TransientError::cause)
    }
}

impl<E: FailureError> From<E> for AnyFailure {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl From<BoxError> for AnyFailure {
    fn from(error: BoxError) -> Self {
        let error = match error.downcast::<PermanentError>() {
            Ok(permanent) => return Self::new(*permanent),
            Err(error) => error,
        };
        match error.downcast::<TransientError>() {
            Ok(transient) => Self::new(*transient),
            Err(error) => Self::new(TransientError::new(error)),
        }
    }
}

impl From<AnyFailure> for BoxError {
    fn from(error: AnyFailure) -> Self {
        error.into_box_error()
    }
}

impl Failure for AnyFailure {
    fn classification(&self) -> Classification {
        self.inner.classification()
    }
}

impl fmt::Debug for AnyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for AnyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Adapter for error types without a [`Failure`] impl
///
/// Always [`Classification::Transient`]; the wrapped error is otherwise
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unclassified<E>(pub E);

impl<E> Unclassified<E> {
    /// Unwrap into the original error
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E> Failure for Unclassified<E> {}

impl<E: fmt::Display> fmt::Display for Unclassified<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Error> Error for Unclassified<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

macro_rules! classified_error {
    ($(#[$meta:meta])* $name:ident => $classification:expr) => {
        $(#[$meta])*
        pub struct $name {
            cause: BoxError,
        }

        impl $name {
            /// Wrap `cause`, keeping it intact for later inspection
            pub fn new(cause: impl Into<BoxError>) -> Self {
                Self { cause: cause.into() }
            }

            /// The wrapped cause
            pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
                self.cause.as_ref()
            }

            /// Unwrap into the original cause
            pub fn into_cause(self) -> BoxError {
                self.cause
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).field("cause", &self.cause).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.cause, f)
            }
        }

        impl Error for $name {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                Some(self.cause.as_ref())
            }
        }

        impl Failure for $name {
            fn classification(&self) -> Classification {
                $classification
            }
        }
    };
}

classified_error!(
    /// Failure explicitly marked as retryable
    TransientError => Classification::Transient
);

classified_error!(
    /// Failure that stops the retry loop immediately
    PermanentError => Classification::Permanent
);

/// Classify the error of a single result in place
///
/// This is the interceptor counterpart of [`mark_transient`] and
/// [`mark_permanent`], for call sites that already hold a `Result`.
///
/// [`mark_transient`]: crate::resilience::mark_transient
/// [`mark_permanent`]: crate::resilience::mark_permanent
pub trait FailureExt<T, E> {
    /// Wrap any error in [`TransientError`]
    fn transient(self) -> Result<T, TransientError>;

    /// Wrap any error in [`PermanentError`]
    fn permanent(self) -> Result<T, PermanentError>;

    /// Mark the error permanent when `predicate` holds, otherwise keep its
    /// own classification
    fn permanent_if<P>(self, predicate: P) -> Result<T, AnyFailure>
    where
        E: FailureError,
        P: FnOnce(&E) -> bool;
}

impl<T, E> FailureExt<T, E> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn transient(self) -> Result<T, TransientError> {
        self.map_err(TransientError::new)
    }

    fn permanent(self) -> Result<T, PermanentError> {
        self.map_err(PermanentError::new)
    }

    fn permanent_if<P>(self, predicate: P) -> Result<T, AnyFailure>
    where
        E: FailureError,
        P: FnOnce(&E) -> bool,
    {
        self.map_err(|error| {
            if predicate(&error) {
                AnyFailure::new(PermanentError::new(error))
            } else {
                AnyFailure::new(error)
            }
        })
    }
}
