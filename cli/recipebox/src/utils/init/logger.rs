use std::sync::OnceLock;

use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::Verbosity;

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// The filter for a verbosity level, unless `RUST_LOG` says otherwise.
fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,recipebox=error,recipebox_sdk=error",
        // Only show warnings
        Verbosity::Verbose(0) => "off,recipebox=warn,recipebox_sdk=warn,recipebox_catalog=warn",
        // Show our own info logs
        Verbosity::Verbose(1) => "off,recipebox=info,recipebox_sdk=info,recipebox_catalog=info",
        // Also show debug from our libraries
        Verbosity::Verbose(2) => {
            "off,recipebox=debug,recipebox_sdk=debug,recipebox_catalog=debug"
        },
        // Also show the HTTP stack
        Verbosity::Verbose(3) => "debug,recipebox=trace,recipebox_sdk=trace,recipebox_catalog=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

/// Initialize the logger, or update its filter if it is already initialized.
pub(crate) fn init_logger(verbosity: Option<Verbosity>) {
    let log_filter = log_filter(verbosity.unwrap_or_default());

    let filter_handle = LOGGER_HANDLE.get_or_init(|| {
        let (subscriber, reload_handle) = create_registry_and_filter_reload_handle();
        subscriber.init();
        reload_handle
    });

    update_filters(filter_handle, log_filter);
}

pub fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => {
                eprintln!("Updating logger filter failed: {err}");
            },
        };
    });
    if let Err(err) = result {
        eprintln!("Updating logger filter failed: {err}");
    }
}

pub fn create_registry_and_filter_reload_handle() -> (
    impl tracing_subscriber::util::SubscriberInitExt,
    Handle<EnvFilter, Registry>,
) {
    // Start out permissive, the actual level is set by `update_filters`.
    let filter = EnvFilter::new("trace");
    let (filter, filter_reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(tracing_subscriber::fmt::format());
    let registry = tracing_subscriber::registry().with(filter).with(log_layer);
    debug!("initialized logger");

    (registry, filter_reload_handle)
}
