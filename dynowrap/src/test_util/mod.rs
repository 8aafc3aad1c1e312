/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Transports for tests: an in-memory store and a scripted replay.
//!
//! Available with the `test-util` feature.

mod expr;
mod memory;
mod replay;

pub use memory::InMemoryStore;
pub use replay::{RecordingTransport, ReplayTransport, ValidateRequest};
