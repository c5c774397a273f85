// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod error;
pub mod llm;
pub mod message;
pub mod tool;

pub use error::*;
pub use llm::*;
pub use message::*;
pub use tool::*;
