/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Application records and the started-app totals the header bar shows.

use std::collections::HashMap;

use serde::Deserialize;

use super::cache::MetadataCache;
use super::snapshot::Aggregate;
use super::{Entity, MetadataKind, null_as_default};

/// The API reports memory and disk quotas in megabytes.
pub const MEGABYTE: u64 = 1024 * 1024;

const STATE_STARTED: &str = "STARTED";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct App {
    #[serde(deserialize_with = "null_as_default")]
    pub guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub space_guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub stack_guid: String,
    #[serde(rename = "memory", deserialize_with = "null_as_default")]
    pub memory_mb: u64,
    #[serde(rename = "disk_quota", deserialize_with = "null_as_default")]
    pub disk_quota_mb: u64,
    #[serde(rename = "environment_json", deserialize_with = "null_as_default")]
    pub environment: HashMap<String, serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub instances: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub enable_ssh: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub package_state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub staging_failed_reason: String,
    #[serde(
        rename = "staging_failed_description",
        deserialize_with = "null_as_default"
    )]
    pub staging_failed_desc: String,
    #[serde(deserialize_with = "null_as_default")]
    pub detected_start_command: String,
    #[serde(deserialize_with = "null_as_default")]
    pub console: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub buildpack: String,
    #[serde(deserialize_with = "null_as_default")]
    pub detected_buildpack: String,
    #[serde(deserialize_with = "null_as_default")]
    pub health_check_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub health_check_timeout: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub production: bool,
}

impl App {
    pub fn is_started(&self) -> bool {
        self.state == STATE_STARTED
    }

    /// Memory reserved across every instance, in bytes.
    pub fn reserved_memory_bytes(&self) -> u64 {
        self.memory_mb
            .saturating_mul(MEGABYTE)
            .saturating_mul(self.instances)
    }

    pub fn reserved_disk_bytes(&self) -> u64 {
        self.disk_quota_mb
            .saturating_mul(MEGABYTE)
            .saturating_mul(self.instances)
    }
}

impl Entity for App {
    const KIND: MetadataKind = MetadataKind::App;
    const COLLECTION_PATH: &'static str = "/v2/apps";

    fn guid(&self) -> &str {
        &self.guid
    }

    fn set_guid(&mut self, guid: String) {
        self.guid = guid;
    }
}

fn sum_started(apps: &[App], per_app: impl Fn(&App) -> u64) -> u64 {
    apps.iter()
        .filter(|app| app.is_started())
        .fold(0_u64, |total, app| total.saturating_add(per_app(app)))
}

impl MetadataCache<App> {
    /// Memory reserved by STARTED apps in the published snapshot, in bytes.
    pub fn total_memory_started(&self) -> u64 {
        self.aggregate(Aggregate::StartedMemoryBytes, |apps| {
            sum_started(apps, App::reserved_memory_bytes)
        })
    }

    pub fn total_disk_started(&self) -> u64 {
        self.aggregate(Aggregate::StartedDiskBytes, |apps| {
            sum_started(apps, App::reserved_disk_bytes)
        })
    }

    pub fn started_instances(&self) -> u64 {
        self.aggregate(Aggregate::StartedInstances, |apps| {
            sum_started(apps, |app| app.instances)
        })
    }
}
