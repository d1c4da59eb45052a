//! # PromptChain Core
//!
//! Domain types, traits, and error definitions for the PromptChain runtime.
//! This crate does no I/O. It defines the domain model that all other
//! crates implement against.
//!
//! The completion backend is a trait here; implementations live in
//! `promptchain-providers`, and tests substitute scripted stubs.

pub mod error;
pub mod message;
pub mod provider;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{ChainError, ProviderError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use event::{DomainEvent, EventBus};
