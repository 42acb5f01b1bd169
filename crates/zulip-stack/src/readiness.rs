//! Readiness of nodes whose side effects are not visible through a referenced value
//!
//! A [Ready] token can only be created by the construct that declares the node. The compute group
//! asks for one token per service it waits on and turns each of them into a dependency edge.
use std::marker::PhantomData;

/// Proof that the node producing `T` has been declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready<T> {
    logical_id: String,
    _marker: PhantomData<T>,
}

impl<T> Ready<T> {
    pub(crate) fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            _marker: PhantomData,
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

/// The database primary instance accepts connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabasePrimary {}

/// The message broker exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broker {}

/// The generated SMTP password exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCredential {}
