use std::sync::Arc;

use log::{debug, error, warn};
use tokio::task::JoinHandle;

use keyquorum_core::{log, tokio, ApproverId};
use keyquorum_entity::delivery;
use keyquorum_http::ApprovalNotice;

use crate::{ApprovalNotifier, ApprovalStore};

/// Drains queued deliveries concurrently and records each outcome.
///
/// Returns as soon as the sends are spawned. Failed sends stay `Failed` until
/// someone asks for a redelivery.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ApprovalStore>,
    notifier: Arc<dyn ApprovalNotifier>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ApprovalStore>, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        Dispatcher { store, notifier }
    }

    pub fn dispatch(
        &self,
        notice: ApprovalNotice,
        deliveries: Vec<delivery::Model>,
    ) -> Vec<JoinHandle<()>> {
        let notice = Arc::new(notice);
        deliveries
            .into_iter()
            .map(|d| {
                let store = self.store.clone();
                let notifier = self.notifier.clone();
                let notice = notice.clone();
                tokio::spawn(async move {
                    let target = ApproverId(d.target.clone());
                    let result = match notifier.notify(&target, &notice).await {
                        Ok(()) => {
                            debug!("Notified {} of {}", target, notice.client_id);
                            Ok(())
                        }
                        Err(err) => {
                            warn!(
                                "NotificationDeliveryFailed {} -> {}: {}",
                                notice.client_id, target, err
                            );
                            Err(err.to_string())
                        }
                    };
                    if let Err(err) = store.record_delivery(&d.id, result).await {
                        error!("Failed to record delivery {}: {}", d.id, err);
                    }
                })
            })
            .collect()
    }
}
