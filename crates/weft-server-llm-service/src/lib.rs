// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Provider selection and failover for chat completion requests.
//!
//! This crate holds the stateful core of the gateway: the credential pool,
//! the provider/model selector with its exhaustion tracking, the error
//! classifier, and the fallback orchestrator that ties them together under
//! a retry policy. Callers interact with [`LlmService`], which validates a
//! [`weft_common_core::ChatRequest`] and dispatches it in direct mode
//! (pinned provider+model, credential rotation only) or auto mode
//! (priority-ordered traversal of the whole catalog).

pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod fallback;
pub mod pool;
pub mod registry;
pub mod selector;
pub mod service;

pub use catalog::{
	CatalogCache, CatalogError, CatalogStore, CredentialRecord, MemoryCatalogStore, ModelRecord,
	ProviderRecord,
};
pub use classify::{classify, classify_message, Classification, ErrorCategory};
pub use config::ServiceConfig;
pub use error::ConfigError;
pub use fallback::FallbackEngine;
pub use pool::CredentialPool;
pub use registry::{BackendRequest, ChatBackend, ProviderRegistry};
pub use selector::{order, ExhaustionTracker, PairKey, Selector};
pub use service::LlmService;
