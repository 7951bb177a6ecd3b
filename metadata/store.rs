/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! All metadata caches behind one handle, plus the cross-kind joins the
//! statistics views use to label rows.

use std::sync::Arc;

use super::cache::{MetadataCache, ReloadOutcome};
use super::fetch::PagedFetcher;
use super::{App, MetadataKind, Org, Route, Space};
use crate::diagnostics::DiagnosticLog;

/// An app row joined with its space and org. Unknown ids leave fields blank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppSummary {
    pub guid: String,
    pub name: String,
    pub space_name: String,
    pub org_name: String,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub instances: u64,
    pub state: String,
}

pub struct MetadataStore {
    apps: MetadataCache<App>,
    routes: MetadataCache<Route>,
    spaces: MetadataCache<Space>,
    orgs: MetadataCache<Org>,
}

impl MetadataStore {
    pub fn new(fetcher: PagedFetcher, log: Arc<DiagnosticLog>) -> Self {
        Self {
            apps: MetadataCache::new(fetcher.clone(), log.clone()),
            routes: MetadataCache::new(fetcher.clone(), log.clone()),
            spaces: MetadataCache::new(fetcher.clone(), log.clone()),
            orgs: MetadataCache::new(fetcher, log),
        }
    }

    pub fn apps(&self) -> &MetadataCache<App> {
        &self.apps
    }

    pub fn routes(&self) -> &MetadataCache<Route> {
        &self.routes
    }

    pub fn spaces(&self) -> &MetadataCache<Space> {
        &self.spaces
    }

    pub fn orgs(&self) -> &MetadataCache<Org> {
        &self.orgs
    }

    pub fn reload(&self, kind: MetadataKind) -> ReloadOutcome {
        match kind {
            MetadataKind::App => self.apps.reload(),
            MetadataKind::Route => self.routes.reload(),
            MetadataKind::Space => self.spaces.reload(),
            MetadataKind::Org => self.orgs.reload(),
        }
    }

    /// Reloads every kind in [`MetadataKind::ALL`] order. One kind failing
    /// does not stop the others.
    pub fn reload_all(&self) -> Vec<(MetadataKind, ReloadOutcome)> {
        MetadataKind::ALL
            .iter()
            .map(|kind| (*kind, self.reload(*kind)))
            .collect()
    }

    pub fn app_summary(&self, app_guid: &str) -> AppSummary {
        let app = self.apps.find_by_id(app_guid);
        let space = self.spaces.find_by_id(&app.space_guid);
        let org = self.orgs.find_by_id(&space.organization_guid);
        AppSummary {
            guid: app_guid.to_string(),
            memory_bytes: app.reserved_memory_bytes(),
            disk_bytes: app.reserved_disk_bytes(),
            instances: app.instances,
            name: app.name,
            space_name: space.name,
            org_name: org.name,
            state: app.state,
        }
    }

    pub fn routes_for_space(&self, space_guid: &str) -> Vec<Route> {
        self.routes
            .all()
            .records()
            .iter()
            .filter(|route| route.space_guid == space_guid)
            .cloned()
            .collect()
    }

    pub fn close(&self) {
        self.apps.close();
        self.routes.close();
        self.spaces.close();
        self.orgs.close();
    }
}
