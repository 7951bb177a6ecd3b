/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::Deserialize;

use super::{Entity, MetadataKind, null_as_default};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Route {
    #[serde(deserialize_with = "null_as_default")]
    pub guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub domain_guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub space_guid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_instance_guid: String,
    /// Only TCP routes carry a port.
    pub port: Option<u16>,
}

impl Route {
    /// Host followed by path, as shown in route columns; either part may be
    /// empty.
    pub fn display_name(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

impl Entity for Route {
    const KIND: MetadataKind = MetadataKind::Route;
    const COLLECTION_PATH: &'static str = "/v2/routes";

    fn guid(&self) -> &str {
        &self.guid
    }

    fn set_guid(&mut self, guid: String) {
        self.guid = guid;
    }
}
