//! Controller runner - builds controller futures for each CRD
//!
//! Each `build_*` function returns a boxed future that `main` composes.
//! This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use stratus_common::crd::{Integration, TargetCluster};

use crate::controller::integration::{error_policy, reconcile, Context};
use crate::controller::target::{
    error_policy as target_error_policy, reconcile as target_reconcile, TargetContext,
};

/// Watcher timeout (seconds) - must be less than the client read timeout
/// so the API server closes idle watches before the client gives up.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future, ready for `join_all`
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the Integration controller future
pub fn build_integration_controller(client: Client, ctx: Arc<Context>) -> ControllerFuture {
    let integrations: Api<Integration> = Api::all(client);

    tracing::info!("- Integration controller");

    Box::pin(
        Controller::new(
            integrations,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Integration")),
    )
}

/// Build the TargetCluster controller future
pub fn build_target_controller(client: Client, ctx: Arc<TargetContext>) -> ControllerFuture {
    let targets: Api<TargetCluster> = Api::all(client);

    tracing::info!("- TargetCluster controller");

    Box::pin(
        Controller::new(
            targets,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(target_reconcile, target_error_policy, ctx)
        .for_each(log_reconcile_result("TargetCluster")),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => {
                tracing::debug!(?action, "{} reconciliation completed", controller_name)
            }
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
