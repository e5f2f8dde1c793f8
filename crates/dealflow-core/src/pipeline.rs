use crate::config::{OwnershipPolicy, PipelineConfig};
use crate::directory::{DealRepository, RecipientDirectory};
use crate::error::DealflowError;
use crate::ids::{DealId, OwnerId};
use crate::stage::DealStage;
use crate::types::{Activity, ActivityKind, Deal, NewDeal};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Move a deal to `stage` and re-derive its probability.
///
/// A stage without a default probability keeps the current value so a manual
/// override is not destroyed.
pub fn apply_stage(deal: &mut Deal, stage: DealStage) {
    deal.stage = stage;
    if let Some(probability) = stage.default_probability() {
        deal.probability = probability;
    }
    deal.touch();
}

/// Append one activity at the tail of the deal's sequence.
pub fn push_activity(deal: &mut Deal, kind: ActivityKind, description: &str) {
    deal.activities.push(Activity {
        kind,
        description: description.trim().to_string(),
        date: Utc::now(),
    });
    deal.touch();
}

/// Per-stage rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub count: usize,
    pub total_value: f64,
}

/// Pipeline totals for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_deals: usize,
    pub total_value: f64,
    pub won_deals: usize,
    pub won_value: f64,
    /// Value of every deal not yet closed won or lost.
    pub pipeline_value: f64,
    pub by_stage: BTreeMap<DealStage, StageSummary>,
}

impl PipelineStats {
    pub fn from_deals<'a>(deals: impl IntoIterator<Item = &'a Deal>) -> Self {
        let mut stats = Self::default();
        for deal in deals {
            stats.total_deals += 1;
            stats.total_value += deal.value;
            if deal.stage == DealStage::ClosedWon {
                stats.won_deals += 1;
                stats.won_value += deal.value;
            }
            if !deal.stage.is_closed() {
                stats.pipeline_value += deal.value;
            }
            let summary = stats.by_stage.entry(deal.stage).or_default();
            summary.count += 1;
            summary.total_value += deal.value;
        }
        stats
    }
}

/// Owns deal stage transitions and activity history.
pub struct PipelineEngine {
    deals: Arc<dyn DealRepository>,
    directory: Arc<dyn RecipientDirectory>,
    config: PipelineConfig,
}

impl PipelineEngine {
    pub fn new(
        deals: Arc<dyn DealRepository>,
        directory: Arc<dyn RecipientDirectory>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            deals,
            directory,
            config,
        }
    }

    pub fn ownership_policy(&self) -> OwnershipPolicy {
        self.config.ownership_policy
    }

    pub async fn create_deal(&self, owner: &OwnerId, new: NewDeal) -> Result<Deal, DealflowError> {
        new.validate()?;

        if self
            .directory
            .find_owned_contact(owner, &new.contact)
            .await?
            .is_none()
        {
            return Err(DealflowError::not_found("contact not found or not authorized"));
        }

        let deal = new.into_deal(*owner);
        self.deals.save_deal(deal.clone()).await?;
        info!(deal_id = %deal.id, owner = %owner, stage = %deal.stage, "Created deal");
        Ok(deal)
    }

    pub async fn get_deal(&self, owner: &OwnerId, deal_id: &DealId) -> Result<Deal, DealflowError> {
        self.load_owned(owner, deal_id).await
    }

    pub async fn transition_stage(
        &self,
        owner: &OwnerId,
        deal_id: &DealId,
        requested_stage: &str,
    ) -> Result<Deal, DealflowError> {
        let stage = DealStage::parse(requested_stage)?;
        let mut deal = self.load_owned(owner, deal_id).await?;

        let previous = deal.stage;
        apply_stage(&mut deal, stage);
        self.deals.save_deal(deal.clone()).await?;

        info!(
            deal_id = %deal.id,
            from = %previous,
            to = %deal.stage,
            probability = deal.probability,
            "Transitioned deal stage"
        );
        Ok(deal)
    }

    pub async fn append_activity(
        &self,
        owner: &OwnerId,
        deal_id: &DealId,
        kind: &str,
        description: &str,
    ) -> Result<Deal, DealflowError> {
        let kind = ActivityKind::parse(kind)?;
        if description.trim().is_empty() {
            return Err(DealflowError::invalid("activity description is required"));
        }

        let mut deal = self.load_owned(owner, deal_id).await?;
        push_activity(&mut deal, kind, description);
        self.deals.save_deal(deal.clone()).await?;

        debug!(
            deal_id = %deal.id,
            kind = %kind,
            activities = deal.activities.len(),
            "Appended deal activity"
        );
        Ok(deal)
    }

    /// Owned deals in `stage`, newest first.
    pub async fn deals_by_stage(
        &self,
        owner: &OwnerId,
        stage: DealStage,
    ) -> Result<Vec<Deal>, DealflowError> {
        let mut deals = self.deals.list_deals(owner).await?;
        deals.retain(|deal| deal.is_owned_by(owner) && deal.stage == stage);
        deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deals)
    }

    pub async fn pipeline_stats(&self, owner: &OwnerId) -> Result<PipelineStats, DealflowError> {
        let deals = self.deals.list_deals(owner).await?;
        Ok(PipelineStats::from_deals(
            deals.iter().filter(|deal| deal.is_owned_by(owner)),
        ))
    }

    async fn load_owned(&self, owner: &OwnerId, deal_id: &DealId) -> Result<Deal, DealflowError> {
        let deal = self
            .deals
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| DealflowError::not_found("deal not found"))?;

        if !deal.is_owned_by(owner) {
            return Err(match self.config.ownership_policy {
                OwnershipPolicy::Conceal => DealflowError::not_found("deal not found"),
                OwnershipPolicy::Distinguish => {
                    DealflowError::Forbidden("not authorized to access this deal".to_string())
                }
            });
        }

        Ok(deal)
    }
}
