//! Error types for the reactive runtime.
//!
//! Two families live here:
//!
//! - [`ReactiveError`] covers misuse and boundary failures that callers
//!   receive as a `Result` (registering a cleanup outside any scope, a
//!   derivation that panicked under [`Computed::try_get`], and so on).
//! - [`EffectError`] is what an error-boundary handler receives when an
//!   effect body fails. If nobody handles it, the runtime escalates it once
//!   the outermost batch has settled.
//!
//! [`Computed::try_get`]: crate::reactive::Computed::try_get

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic;

use thiserror::Error;

/// Errors surfaced by runtime operations.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// `on_cleanup` was called while no disposal scope was active.
    #[error("cleanup registered with no active disposal scope")]
    NoActiveScope,

    /// A computed derivation panicked while being read through `try_get`.
    #[error("derivation panicked: {0}")]
    DerivationPanicked(String),

    /// A computed was read from inside its own derivation.
    #[error("cycle detected: computed read while it is being computed")]
    Cycle,

    /// Effects kept re-triggering each other past the configured limit.
    #[error("effect flush did not settle after {rounds} rounds")]
    FlushLimitExceeded {
        /// Number of rounds that ran before the flush was abandoned.
        rounds: usize,
    },

    /// A registry key is already bound to a value of another type.
    #[error("registry entry `{key}` holds a value of a different type")]
    RegistryTypeMismatch {
        /// The conflicting key.
        key: String,
    },
}

/// A panic payload captured from an effect body.
pub struct PanicPayload(Box<dyn Any + Send>);

impl PanicPayload {
    /// Best-effort rendering of the panic message.
    pub fn message(&self) -> String {
        if let Some(s) = self.0.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(err) = self.0.downcast_ref::<ReactiveError>() {
            err.to_string()
        } else if let Some(s) = self.0.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        }
    }

    /// Returns the raw payload, e.g. to resume unwinding with it.
    pub fn into_inner(self) -> Box<dyn Any + Send> {
        self.0
    }
}

impl From<Box<dyn Any + Send>> for PanicPayload {
    fn from(payload: Box<dyn Any + Send>) -> Self {
        Self(payload)
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicPayload").field(&self.message()).finish()
    }
}

/// Failure of a single effect run.
#[derive(Debug, Error)]
pub enum EffectError {
    /// The effect body panicked.
    #[error("effect panicked: {message}")]
    Panicked {
        /// Rendered panic message.
        message: String,
        /// Original payload, kept so escalation can resume the same panic.
        payload: PanicPayload,
    },

    /// A fallible effect body returned an error.
    #[error("effect failed: {0}")]
    Failed(Box<dyn StdError>),
}

impl EffectError {
    /// Wraps a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = PanicPayload::from(payload);
        Self::Panicked {
            message: payload.message(),
            payload,
        }
    }

    /// Raises the error on the current thread.
    ///
    /// Panics are resumed with their original payload; returned errors become
    /// a new panic carrying the error message.
    pub fn escalate(self) -> ! {
        match self {
            Self::Panicked { payload, .. } => panic::resume_unwind(payload.into_inner()),
            Self::Failed(err) => panic!("unhandled effect error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn panic_message_is_extracted() {
        let payload = catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        let err = EffectError::from_panic(payload);
        assert_eq!(err.to_string(), "effect panicked: boom 7");
    }

    #[test]
    fn escalate_resumes_original_payload() {
        let payload = catch_unwind(|| panic!("original")).unwrap_err();
        let err = EffectError::from_panic(payload);

        let resumed = catch_unwind(AssertUnwindSafe(|| {
            err.escalate();
        }))
        .unwrap_err();
        assert_eq!(resumed.downcast_ref::<&str>(), Some(&"original"));
    }

    #[test]
    fn reactive_error_payload_renders_its_message() {
        let payload = catch_unwind(|| std::panic::panic_any(ReactiveError::Cycle)).unwrap_err();
        assert_eq!(
            PanicPayload::from(payload).message(),
            "cycle detected: computed read while it is being computed"
        );
    }

    #[test]
    fn reactive_error_messages() {
        assert_eq!(
            ReactiveError::FlushLimitExceeded { rounds: 3 }.to_string(),
            "effect flush did not settle after 3 rounds"
        );
        assert_eq!(
            ReactiveError::RegistryTypeMismatch { key: "app".into() }.to_string(),
            "registry entry `app` holds a value of a different type"
        );
    }
}
