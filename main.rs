/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Headless cftop: keeps the metadata caches fresh and prints a status line
//! until interrupted. A terminal UI embeds the same services through the
//! library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bpaf::Bpaf;
use tokio_util::sync::CancellationToken;

use cftop::diagnostics::{DiagnosticLog, Viewport, ViewportGeometry, install_global_logger};
use cftop::metadata::{MEGABYTE, MetadataStore};
use cftop::runtime::{DashboardConfig, RefreshSupervisor};

const HEADLESS_COLUMNS: usize = 120;
const HEADLESS_ROWS: usize = 40;

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
struct Options {
    /// TOML configuration file
    #[bpaf(short, long, argument("PATH"))]
    config: Option<PathBuf>,
    /// Platform API endpoint, overrides the configuration file
    #[bpaf(long, argument("URL"))]
    api_endpoint: Option<String>,
    /// Record debug lines in the diagnostic log
    #[bpaf(short, long)]
    debug: bool,
    /// Seconds between status lines
    #[bpaf(long, argument("SECS"), fallback(5))]
    status_interval: u64,
}

fn main() -> ExitCode {
    let opts = options().run();

    let mut config = match opts.config.as_deref() {
        Some(path) => match DashboardConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("cftop: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => DashboardConfig::default(),
    };

    // Installed before env overrides so their warnings land in the log.
    let log = Arc::new(config.log.build_log());
    if let Err(e) = install_global_logger(log.clone()) {
        eprintln!("cftop: diagnostic logger not installed ({e})");
    }
    config.apply_env_overrides();
    if let Some(endpoint) = opts.api_endpoint {
        config.api_endpoint = endpoint;
    }
    if opts.debug {
        config.log.debug_enabled = true;
    }
    log.set_debug_enabled(config.log.debug_enabled);
    log.set_auto_open_on_error(config.log.auto_open_on_error);

    if let Err(e) = config.validate() {
        eprintln!("cftop: {e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    let fetcher = match config.build_fetcher(cancel.clone()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            eprintln!("cftop: {e}");
            return ExitCode::FAILURE;
        }
    };
    let store = Arc::new(MetadataStore::new(fetcher, log.clone()));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("cftop: failed to start runtime ({e})");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(
        store.clone(),
        log,
        config.refresh_interval(),
        Duration::from_secs(opts.status_interval.max(1)),
        cancel,
    ));
    store.close();
    ExitCode::SUCCESS
}

async fn run(
    store: Arc<MetadataStore>,
    log: Arc<DiagnosticLog>,
    refresh_interval: Duration,
    status_interval: Duration,
    cancel: CancellationToken,
) {
    let mut supervisor = RefreshSupervisor::with_cancellation(store.clone(), cancel);
    supervisor.spawn_periodic_refresh(refresh_interval);
    log::info!("cftop {} started, refreshing every {refresh_interval:?}", cftop::VERSION);

    let mut viewport = Viewport::new(log.clone());
    viewport.resize(ViewportGeometry::for_terminal(HEADLESS_COLUMNS, HEADLESS_ROWS));

    let mut ticker = tokio::time::interval(status_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }
        println!("{}", status_line(&store, &log));
        if viewport.poll_auto_open() {
            for row in viewport.render() {
                eprintln!("{}", row.text);
            }
            viewport.close();
        }
    }

    log::info!("cftop shutting down");
    supervisor.shutdown().await;
}

fn status_line(store: &MetadataStore, log: &DiagnosticLog) -> String {
    let apps = store.apps();
    let deltas = log.message_deltas();
    format!(
        "orgs {} | spaces {} | apps {} ({} started instances, {} MiB reserved) | routes {} | log +{}W +{}E",
        store.orgs().len(),
        store.spaces().len(),
        apps.len(),
        apps.started_instances(),
        apps.total_memory_started() / MEGABYTE,
        store.routes().len(),
        deltas.warn,
        deltas.error,
    )
}
