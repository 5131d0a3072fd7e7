//! Reports and the admin console

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::community::views::{AddressView, ReportView, ResidentView};
use crate::db::schemas::{
    normalize_postcode, PostStatus, ReportDoc, ReportStatus, ReportTarget, UserDoc,
};
use crate::membership::MembershipCoordinator;
use crate::store::{not_found, settle, ResidentQuery, Store, UnitOfWork, UserCount};
use crate::types::{CommunityError, Result};

const MIN_REASON_CHARS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReport {
    pub target_type: ReportTarget,
    pub target_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportAction {
    pub action: ReportStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub users: u64,
    pub verified_users: u64,
    pub posts: u64,
    pub open_reports: u64,
    pub streets: u64,
    pub towns: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminToggle {
    pub message: &'static str,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressListing {
    pub addresses: Vec<AddressView>,
    pub residents: Vec<ResidentView>,
}

pub struct ModerationService {
    store: Arc<dyn Store>,
    coordinator: MembershipCoordinator,
}

impl ModerationService {
    pub fn new(store: Arc<dyn Store>, coordinator: MembershipCoordinator) -> Self {
        Self { store, coordinator }
    }

    /// File a report against a post, comment or user
    pub async fn report(&self, reporter: &UserDoc, input: &CreateReport) -> Result<ReportView> {
        let reason = input.reason.trim();
        if reason.chars().count() < MIN_REASON_CHARS {
            return Err(CommunityError::Validation(
                "reason must be at least 5 characters".into(),
            ));
        }
        let target_id = ObjectId::parse_str(&input.target_id)
            .map_err(|_| CommunityError::Validation("Invalid targetId".into()))?;
        let report = ReportDoc::new(reporter.id, input.target_type, target_id, reason);

        let mut uow = self.store.begin().await?;
        let result = Self::report_in(&mut *uow, &report).await;
        settle(uow, result).await?;

        info!(report_id = %report.id, target = ?report.target_type, "Report filed");
        Ok(ReportView::from(&report))
    }

    pub async fn stats(&self) -> Result<Stats> {
        let mut uow = self.store.begin().await?;
        let result = Self::stats_in(&mut *uow).await;
        settle(uow, result).await
    }

    /// Grant or revoke admin. The last admin cannot be demoted.
    pub async fn toggle_admin(&self, actor: &UserDoc, user_id: ObjectId) -> Result<AdminToggle> {
        let mut uow = self.store.begin().await?;
        let result = Self::toggle_in(&mut *uow, user_id).await;
        let is_admin = settle(uow, result).await?;

        info!(actor_id = %actor.id, user_id = %user_id, is_admin, "Admin status changed");
        Ok(AdminToggle {
            message: if is_admin { "User promoted to admin" } else { "Admin rights removed" },
            is_admin,
        })
    }

    /// Open reports, newest first
    pub async fn open_reports(&self) -> Result<Vec<ReportView>> {
        let mut uow = self.store.begin().await?;
        let result = uow.reports_with_status(ReportStatus::Open).await;
        let reports = settle(uow, result).await?;
        Ok(reports.iter().map(ReportView::from).collect())
    }

    /// Close an open report as actioned or dismissed
    pub async fn act_on_report(
        &self,
        actor: &UserDoc,
        report_id: ObjectId,
        action: ReportStatus,
    ) -> Result<ReportView> {
        if action == ReportStatus::Open {
            return Err(CommunityError::Validation(
                "action must be ACTIONED or DISMISSED".into(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let result = Self::act_in(&mut *uow, actor.id, report_id, action).await;
        let report = settle(uow, result).await?;

        info!(report_id = %report_id, actor_id = %actor.id, action = action.as_str(), "Report handled");
        Ok(ReportView::from(&report))
    }

    /// Addresses at a postcode with every resident record on them
    pub async fn addresses_by_postcode(&self, postcode: &str) -> Result<AddressListing> {
        let postcode = normalize_postcode(postcode);
        if postcode.is_empty() {
            return Err(CommunityError::Validation("postcode is required".into()));
        }

        let mut uow = self.store.begin().await?;
        let result = Self::listing_in(&mut *uow, &postcode).await;
        settle(uow, result).await
    }

    /// Hand an address to another of its active residents
    pub async fn transfer_owner(
        &self,
        actor: &UserDoc,
        address_id: ObjectId,
        new_owner_id: ObjectId,
    ) -> Result<&'static str> {
        self.coordinator.transfer(actor.id, address_id, new_owner_id).await
    }

    async fn report_in(uow: &mut dyn UnitOfWork, report: &ReportDoc) -> Result<()> {
        let exists = match report.target_type {
            ReportTarget::Post => uow.post(report.target_id).await?.is_some(),
            ReportTarget::Comment => uow.comment(report.target_id).await?.is_some(),
            ReportTarget::User => uow.user(report.target_id).await?.is_some(),
        };
        if !exists {
            return Err(not_found("Report target"));
        }
        uow.insert_report(report).await
    }

    async fn stats_in(uow: &mut dyn UnitOfWork) -> Result<Stats> {
        Ok(Stats {
            users: uow.count_users(UserCount::All).await?,
            verified_users: uow.count_users(UserCount::Verified).await?,
            posts: uow.count_posts(PostStatus::Active).await?,
            open_reports: uow.count_reports(ReportStatus::Open).await?,
            streets: uow.count_streets().await?,
            towns: uow.count_towns().await?,
        })
    }

    async fn toggle_in(uow: &mut dyn UnitOfWork, user_id: ObjectId) -> Result<bool> {
        let mut user = uow.user(user_id).await?.ok_or_else(|| not_found("User"))?;
        if user.is_admin && uow.count_users(UserCount::Admins).await? <= 1 {
            return Err(CommunityError::InvalidState(
                "Cannot remove the last admin".into(),
            ));
        }
        user.is_admin = !user.is_admin;
        uow.save_user(&user).await?;
        Ok(user.is_admin)
    }

    async fn act_in(
        uow: &mut dyn UnitOfWork,
        actor_id: ObjectId,
        report_id: ObjectId,
        action: ReportStatus,
    ) -> Result<ReportDoc> {
        let mut report = uow.report(report_id).await?.ok_or_else(|| not_found("Report"))?;
        if report.status != ReportStatus::Open {
            return Err(CommunityError::InvalidState("Report already handled".into()));
        }
        report.status = action;
        report.handled_by = Some(actor_id);
        report.handled_at = Some(DateTime::now());
        uow.save_report(&report).await?;

        // An actioned post comes down; deleted posts stay deleted
        if action == ReportStatus::Actioned && report.target_type == ReportTarget::Post {
            if let Some(mut post) = uow.post(report.target_id).await? {
                if post.status == PostStatus::Active {
                    post.status = PostStatus::Hidden;
                    uow.save_post(&post).await?;
                }
            }
        }
        Ok(report)
    }

    async fn listing_in(uow: &mut dyn UnitOfWork, postcode: &str) -> Result<AddressListing> {
        let addresses = uow.addresses_by_postcode(postcode).await?;
        let mut residents = Vec::new();
        for address in &addresses {
            residents.extend(uow.residents(&ResidentQuery::at(address.id)).await?);
        }
        Ok(AddressListing {
            addresses: addresses.iter().map(AddressView::from).collect(),
            residents: residents.iter().map(ResidentView::from).collect(),
        })
    }
}
