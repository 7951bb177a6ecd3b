/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Reference metadata (apps, routes, spaces, orgs) mirrored from the
//! platform API into immutable, atomically published snapshots.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub mod app;
pub mod cache;
pub mod fetch;
pub mod org;
pub mod route;
pub mod snapshot;
pub mod space;
pub mod store;

pub use self::app::{App, MEGABYTE};
pub use self::cache::{MetadataCache, ReloadOutcome};
pub use self::fetch::{
    ApiTransport, FetchError, FetchReport, HttpTransport, PagedFetcher, RetryPolicy,
};
pub use self::org::Org;
pub use self::route::Route;
pub use self::snapshot::{Aggregate, AggregateState, Snapshot};
pub use self::space::Space;
pub use self::store::{AppSummary, MetadataStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    App,
    Route,
    Space,
    Org,
}

impl MetadataKind {
    /// Reload order: owners before the records that reference them.
    pub const ALL: [MetadataKind; 4] = [
        MetadataKind::Org,
        MetadataKind::Space,
        MetadataKind::App,
        MetadataKind::Route,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetadataKind::App => "app",
            MetadataKind::Route => "route",
            MetadataKind::Space => "space",
            MetadataKind::Org => "org",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A record type mirrored from one API collection.
///
/// `Default` is the "not found" record handed out by lookups, so a blank
/// row can be rendered without a presence branch.
pub trait Entity: DeserializeOwned + Clone + Default + Send + Sync + 'static {
    const KIND: MetadataKind;
    const COLLECTION_PATH: &'static str;

    fn guid(&self) -> &str;
    fn set_guid(&mut self, guid: String);
}

#[derive(Debug, Deserialize)]
struct ResourcePage<T> {
    #[serde(default)]
    resources: Vec<Resource<T>>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    #[serde(default)]
    metadata: ResourceMetadata,
    entity: T,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    guid: String,
}

#[derive(Debug)]
pub(crate) struct DecodedPage<T> {
    pub(crate) records: Vec<T>,
    /// Items dropped because their metadata block carried no guid.
    pub(crate) skipped: usize,
}

/// Decodes one envelope page. The metadata guid always wins over whatever
/// the entity body carries.
pub(crate) fn decode_page<T: Entity>(body: &[u8]) -> Result<DecodedPage<T>, FetchError> {
    let page: ResourcePage<T> =
        serde_json::from_slice(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    let mut records = Vec::with_capacity(page.resources.len());
    let mut skipped = 0;
    for resource in page.resources {
        if resource.metadata.guid.is_empty() {
            skipped += 1;
            continue;
        }
        let mut entity = resource.entity;
        entity.set_guid(resource.metadata.guid);
        records.push(entity);
    }
    Ok(DecodedPage { records, skipped })
}

/// The API sends `null` for unset strings and numbers.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_guid_overrides_entity_guid() {
        let body = br#"{
            "resources": [
                {"metadata": {"guid": "G"}, "entity": {"guid": "OTHER", "name": "web"}},
                {"metadata": {"guid": null}, "entity": {"name": "orphan"}},
                {"metadata": {"guid": "H"}, "entity": {"name": null, "space_guid": "s1"}}
            ]
        }"#;
        let page = decode_page::<App>(body).expect("page should decode");

        assert_eq!(page.skipped, 1);
        let guids: Vec<&str> = page.records.iter().map(App::guid).collect();
        assert_eq!(guids, vec!["G", "H"]);
        assert_eq!(page.records[0].name, "web");
        assert_eq!(page.records[1].name, "");
    }

    #[test]
    fn malformed_page_is_a_decode_error() {
        let result = decode_page::<Route>(br#"{"resources": [{"metadata": {}, "entity": 7}]}"#);
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn reload_order_puts_owners_first() {
        let labels: Vec<String> = MetadataKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["org", "space", "app", "route"]);
    }
}
