/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::Deserialize;

use super::{Entity, MetadataKind, null_as_default};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Org {
    #[serde(deserialize_with = "null_as_default")]
    pub guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub quota_definition_guid: String,
}

impl Entity for Org {
    const KIND: MetadataKind = MetadataKind::Org;
    const COLLECTION_PATH: &'static str = "/v2/organizations";

    fn guid(&self) -> &str {
        &self.guid
    }

    fn set_guid(&mut self, guid: String) {
        self.guid = guid;
    }
}
