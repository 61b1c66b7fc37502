//! Label-addressed injection into test dependency containers.
//!
//! A fixture writes three values into a caller-owned container, each
//! addressed by a label: the client handle, the connection string and the
//! per-case prefix. The container decides which field a label maps to by
//! implementing `Injectable`. The `injectable!` macro generates that mapping
//! from a field list:
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Deps {
//!     client: Option<async_nats::Client>,
//!     conn_string: String,
//!     prefix: String,
//! }
//!
//! broker_fixture::injectable! {
//!     Deps => async_nats::Client {
//!         "nats" => client: client,
//!         "nats.config" => conn_string: text,
//!         "nats.prefix" => prefix: text,
//!     }
//! }
//! ```
//!
//! A `client` field accepts the client handle and a `text` field accepts the
//! connection string or the prefix. The value is converted with `Into`, so
//! `Option<_>` fields work too.

pub use crate::errors::{InjectError, InjectedKind};

/// A value offered to an injection target.
pub enum Injected<C> {
    /// Live client handle.
    Client(C),
    /// Connection string of the running instance.
    ConnectionString(String),
    /// Per-case unique prefix.
    Prefix(String),
}

impl<C> Injected<C> {
    /// Kind of this value.
    #[must_use]
    pub fn kind(&self) -> InjectedKind {
        match self {
            Injected::Client(_) => InjectedKind::Client,
            Injected::ConnectionString(_) => InjectedKind::ConnectionString,
            Injected::Prefix(_) => InjectedKind::Prefix,
        }
    }

    /// Take the client handle out of the value.
    ///
    /// # Errors
    ///
    /// Returns `InjectError::KindMismatch` for textual values.
    pub fn into_client(self, label: &str) -> Result<C, InjectError> {
        match self {
            Injected::Client(client) => Ok(client),
            other => Err(InjectError::KindMismatch {
                label: label.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// Take the text (connection string or prefix) out of the value.
    ///
    /// # Errors
    ///
    /// Returns `InjectError::KindMismatch` for a client handle.
    pub fn into_text(self, label: &str) -> Result<String, InjectError> {
        match self {
            Injected::ConnectionString(text) | Injected::Prefix(text) => Ok(text),
            Injected::Client(_) => Err(InjectError::KindMismatch {
                label: label.to_string(),
                kind: InjectedKind::Client,
            }),
        }
    }
}

/// A container that accepts values by label.
pub trait Injectable<C>: Sized {
    /// Place `value` in the field mapped to `label` and return the container.
    ///
    /// # Errors
    ///
    /// - `InjectError::UnknownLabel` - no field is mapped to `label`
    /// - `InjectError::KindMismatch` - the field cannot hold `value`
    fn set_by_label(self, label: &str, value: Injected<C>) -> Result<Self, InjectError>;
}

/// Implement `Injectable` for a struct from a `label => field: kind` list.
///
/// See the module documentation for an example.
#[macro_export]
macro_rules! injectable {
    (@take client, $label:ident, $value:ident) => {
        $value.into_client($label)?
    };
    (@take text, $label:ident, $value:ident) => {
        $value.into_text($label)?
    };
    ($target:ty => $client:ty { $($label:literal => $field:ident : $kind:ident),+ $(,)? }) => {
        impl $crate::inject::Injectable<$client> for $target {
            fn set_by_label(
                mut self,
                label: &str,
                value: $crate::inject::Injected<$client>,
            ) -> ::std::result::Result<Self, $crate::inject::InjectError> {
                match label {
                    $(
                        $label => {
                            self.$field = ::std::convert::Into::into(
                                $crate::injectable!(@take $kind, label, value),
                            );
                            ::std::result::Result::Ok(self)
                        }
                    )+
                    _ => ::std::result::Result::Err(
                        $crate::inject::InjectError::UnknownLabel(label.to_string()),
                    ),
                }
            }
        }
    };
}
