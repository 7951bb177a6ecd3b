/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Operational state behind the cftop dashboard.
//!
//! - [`metadata`]: platform reference data mirrored into atomically
//!   published snapshots, refreshed from a paginated, retried API fetch.
//! - [`diagnostics`]: the bounded in-process log and its scrollable viewport.
//! - [`runtime`]: configuration and the background refresh workers.
//!
//! Rendering is left to the embedding UI; nothing here draws to a terminal.

pub mod diagnostics;
pub mod metadata;
pub mod runtime;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
