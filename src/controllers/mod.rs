pub mod logcluster;
pub mod logconfig;

use crate::error::{Error, Result};
use crate::kubernetes::{Manifest, ManifestStore};
use kube::runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label stamped on every object the operator writes.
pub const OPERATOR_LABEL: &str = "loggie-operator";

const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Requeue after store failures; anything else waits for the object to change.
pub fn requeue_on(error: &Error) -> Action {
    if error.is_retryable() {
        warn!("reconcile failed, retrying in {:?}: {}", RETRY_INTERVAL, error);
        Action::requeue(RETRY_INTERVAL)
    } else {
        warn!("reconcile failed: {}", error);
        Action::await_change()
    }
}

fn namespace_of(manifest: &Manifest) -> String {
    manifest.namespace().unwrap_or_default()
}

/// Create the object, or replace the whole document when it already exists.
pub async fn create_or_replace(store: &dyn ManifestStore, manifest: &Manifest) -> Result<()> {
    let (kind, name) = (manifest.kind(), manifest.name());
    if store.exists(kind, &namespace_of(manifest), &name).await? {
        info!("Replacing {} {}", kind, name);
        store.replace(manifest).await
    } else {
        info!("Creating {} {}", kind, name);
        store.create(manifest).await
    }
}

/// Create the object unless one with the same name is already there.
pub async fn create_if_absent(store: &dyn ManifestStore, manifest: &Manifest) -> Result<()> {
    let (kind, name) = (manifest.kind(), manifest.name());
    if store.exists(kind, &namespace_of(manifest), &name).await? {
        debug!("{} {} already exists, leaving it alone", kind, name);
        return Ok(());
    }
    info!("Creating {} {}", kind, name);
    store.create(manifest).await
}
