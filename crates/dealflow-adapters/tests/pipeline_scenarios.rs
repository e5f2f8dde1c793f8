use dealflow_adapters::{InMemoryDealRepository, InMemoryDirectory};
use dealflow_core::{
    Contact, DealStage, DealflowError, NewDeal, OwnerId, OwnershipPolicy, PipelineConfig,
    PipelineEngine,
};
use std::sync::Arc;

async fn seeded(
    policy: OwnershipPolicy,
) -> (PipelineEngine, Arc<InMemoryDirectory>, OwnerId, Contact) {
    let directory = Arc::new(InMemoryDirectory::new());
    let owner = OwnerId::generate();
    let contact = directory
        .insert_contact(
            Contact::new(owner, "Grace", "Hopper", "grace@example.com").with_company("Navy"),
        )
        .await
        .unwrap();
    let engine = PipelineEngine::new(
        Arc::new(InMemoryDealRepository::new()),
        directory.clone(),
        PipelineConfig {
            ownership_policy: policy,
        },
    );
    (engine, directory, owner, contact)
}

#[tokio::test]
async fn prospecting_to_negotiation_to_closed_lost() {
    let (engine, _directory, owner, contact) = seeded(OwnershipPolicy::Conceal).await;
    let mut new = NewDeal::new("COBOL rollout", 12_000.0, contact.id);
    new.probability = Some(10);
    let deal = engine.create_deal(&owner, new).await.unwrap();
    assert_eq!(deal.stage, DealStage::Prospecting);
    assert_eq!(deal.probability, 10);

    let deal = engine
        .transition_stage(&owner, &deal.id, "negotiation")
        .await
        .unwrap();
    assert_eq!((deal.stage, deal.probability), (DealStage::Negotiation, 75));

    let deal = engine
        .transition_stage(&owner, &deal.id, "closed-lost")
        .await
        .unwrap();
    assert_eq!((deal.stage, deal.probability), (DealStage::ClosedLost, 0));
    assert!(deal.updated_at >= deal.created_at);
}

#[tokio::test]
async fn stats_and_stage_listing_ignore_other_owners() {
    let (engine, directory, owner, contact) = seeded(OwnershipPolicy::Conceal).await;

    let other = OwnerId::generate();
    let other_contact = directory
        .insert_contact(Contact::new(other, "Alan", "Turing", "alan@example.com"))
        .await
        .unwrap();
    engine
        .create_deal(&other, NewDeal::new("Bombe", 99_000.0, other_contact.id))
        .await
        .unwrap();

    let won = engine
        .create_deal(&owner, NewDeal::new("Won deal", 1_000.0, contact.id))
        .await
        .unwrap();
    engine
        .transition_stage(&owner, &won.id, "closed-won")
        .await
        .unwrap();
    engine
        .create_deal(
            &owner,
            NewDeal::new("Open deal", 500.0, contact.id).with_stage(DealStage::Proposal),
        )
        .await
        .unwrap();

    let stats = engine.pipeline_stats(&owner).await.unwrap();
    assert_eq!(stats.total_deals, 2);
    assert_eq!(stats.won_deals, 1);
    assert_eq!(stats.won_value, 1_000.0);
    assert_eq!(stats.pipeline_value, 500.0);

    let proposals = engine
        .deals_by_stage(&owner, DealStage::Proposal)
        .await
        .unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].title, "Open deal");
}

#[tokio::test]
async fn deal_for_foreign_contact_is_rejected() {
    let (engine, directory, owner, _contact) = seeded(OwnershipPolicy::Distinguish).await;
    let foreign = directory
        .insert_contact(Contact::new(
            OwnerId::generate(),
            "Alan",
            "Turing",
            "alan@example.com",
        ))
        .await
        .unwrap();

    let err = engine
        .create_deal(&owner, NewDeal::new("Sneaky", 1.0, foreign.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DealflowError::NotFound(_)));
}
