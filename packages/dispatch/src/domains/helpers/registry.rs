use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::common::{DispatchError, DispatchResult, GeoPoint, HelperId, StoreError};
use crate::domains::bookings::{BookingFilter, BookingStatus};
use crate::domains::dispatch::MAX_CONFLICT_RETRIES;
use crate::domains::helpers::events::HelperEvent;
use crate::domains::helpers::models::{
    Helper, HelperFilter, HelperLease, HelperProfilePatch, HelperStatus, NewHelper, ServiceType,
};
use crate::kernel::store::{BaseDispatchStore, Transaction};
use crate::kernel::StreamHub;

/// Operations a helper's own client performs on its record.
#[derive(Clone)]
pub struct HelperRegistry {
    store: Arc<dyn BaseDispatchStore>,
    stream_hub: StreamHub,
}

impl HelperRegistry {
    pub fn new(store: Arc<dyn BaseDispatchStore>, stream_hub: StreamHub) -> Self {
        Self { store, stream_hub }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn register(&self, input: NewHelper) -> DispatchResult<Helper> {
        if input.name.trim().is_empty() {
            return Err(DispatchError::Validation("helper name is required".into()));
        }
        if !(0.0..=5.0).contains(&input.rating) {
            return Err(DispatchError::Validation(format!(
                "rating must be between 0 and 5, got {}",
                input.rating
            )));
        }
        if input.status == HelperStatus::Busy {
            return Err(busy_without_job());
        }
        if let Some(location) = &input.location {
            location.validate()?;
        }

        let helper = input.into_helper(chrono::Utc::now());
        self.store.insert_helper(helper.clone()).await?;
        info!(helper_id = %helper.id, skills = helper.skills.len(), "Helper registered");

        self.stream_hub
            .publish_helper_event(&HelperEvent::HelperRegistered {
                helper: helper.clone(),
            })
            .await;
        Ok(helper)
    }

    pub async fn get(&self, id: HelperId) -> DispatchResult<Helper> {
        self.store
            .get_helper(id)
            .await?
            .ok_or_else(|| StoreError::helper_not_found(id).into())
    }

    pub async fn list(&self, filter: &HelperFilter) -> DispatchResult<Vec<Helper>> {
        Ok(self.store.list_helpers(filter).await?)
    }

    /// Reset a helper to `available`.
    ///
    /// `busy` is only ever set by accepting a job, so asking for it here is a
    /// validation error. The reset is refused while the helper holds an offer
    /// or is the assignee of an assigned/in-progress booking.
    #[instrument(skip(self), fields(helper_id = %id, status = %status))]
    pub async fn set_status(&self, id: HelperId, status: HelperStatus) -> DispatchResult<Helper> {
        if status == HelperStatus::Busy {
            return Err(busy_without_job());
        }
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let helper = self.get(id).await?;
            if helper.status == status && helper.active_offer.is_none() {
                return Ok(helper);
            }
            if helper.active_offer.is_some() {
                return Err(DispatchError::InvalidTransition {
                    action: "change availability",
                    status: BookingStatus::Offered,
                });
            }

            let held = self
                .store
                .list_bookings(&BookingFilter::for_helper(id))
                .await?
                .into_iter()
                .find(|b| b.status.holds_helper());
            if let Some(booking) = held {
                return Err(DispatchError::InvalidTransition {
                    action: "change availability",
                    status: booking.status,
                });
            }

            let next = HelperLease {
                status,
                active_offer: None,
            };
            let txn = Transaction::new().helper(id, helper.lease(), next);
            match self.store.commit(txn).await {
                Ok(_) => {
                    let helper = self.get(id).await?;
                    info!("Helper availability changed");
                    self.publish_updated(&helper).await;
                    return Ok(helper);
                }
                Err(StoreError::HelperConflict(_)) => {
                    debug!(attempt, "Helper changed underneath status update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DispatchError::no_longer_available())
    }

    #[instrument(skip(self), fields(helper_id = %id))]
    pub async fn set_location(&self, id: HelperId, location: GeoPoint) -> DispatchResult<Helper> {
        location.validate()?;
        let patch = HelperProfilePatch {
            location: Some(location),
            ..Default::default()
        };
        let helper = self.store.update_helper_profile(id, patch).await?;
        debug!(lat = location.latitude, lng = location.longitude, "Helper location updated");
        self.publish_updated(&helper).await;
        Ok(helper)
    }

    #[instrument(skip(self, skills), fields(helper_id = %id))]
    pub async fn set_skills(
        &self,
        id: HelperId,
        skills: BTreeSet<ServiceType>,
    ) -> DispatchResult<Helper> {
        let patch = HelperProfilePatch {
            skills: Some(skills),
            ..Default::default()
        };
        let helper = self.store.update_helper_profile(id, patch).await?;
        self.publish_updated(&helper).await;
        Ok(helper)
    }

    async fn publish_updated(&self, helper: &Helper) {
        self.stream_hub
            .publish_helper_event(&HelperEvent::HelperUpdated {
                helper: helper.clone(),
            })
            .await;
    }
}

fn busy_without_job() -> DispatchError {
    DispatchError::Validation("helpers become busy only by accepting a job".into())
}
