// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod engine;
pub mod message;
pub mod policy;
pub mod proxy;
pub mod response;
pub mod stream;
