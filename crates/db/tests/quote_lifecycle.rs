use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use rust_decimal::Decimal;

use fabmarket_core::audit::{InMemoryAuditSink, RequestContext};
use fabmarket_core::domain::actor::{Actor, ActorId, ActorRole};
use fabmarket_core::domain::design::{Design, DesignId, DesignStatus, GeometricData};
use fabmarket_core::domain::manufacturer::{
    MachiningFactors, ManufacturerCapabilities, ManufacturerProfile, MaterialProperties,
    PricingFactors,
};
use fabmarket_core::domain::order::{Order, OrderId, OrderStatus};
use fabmarket_core::domain::quote::{Quote, QuoteChange, QuoteId, QuoteStatus};
use fabmarket_core::domain::review::{Review, ReviewId};
use fabmarket_core::errors::ApplicationError;
use fabmarket_core::lifecycle::{AcceptanceOutcome, CreateQuoteRequest, QuoteLifecycle, QuoteView};
use fabmarket_core::pricing::DeterministicPricingEngine;
use fabmarket_core::reviews::{ReviewChange, ReviewDraft, ReviewService};
use fabmarket_core::store::{
    DirectoryStore, MarketplaceStore, QuoteStore, QuoteUnitOfWork, ReviewStore, StoreError,
};
use fabmarket_db::{connect_with_settings, migrations, InMemoryMarketplaceStore, SqlMarketplaceStore};

const CUSTOMER: &str = "cust-1";
const OTHER_CUSTOMER: &str = "cust-2";
const STAFF: &str = "staff-1";
const MAKER_A: &str = "mfr-a";
const MAKER_B: &str = "mfr-b";
const MAKER_C: &str = "mfr-c";
const DESIGN: &str = "design-ready";
const DESIGN_SUBMITTED: &str = "design-submitted";
const DESIGN_OWNED_BY_MAKER: &str = "design-maker-owned";

struct Harness {
    store: Arc<dyn MarketplaceStore>,
    lifecycle: QuoteLifecycle,
    reviews: ReviewService,
    audit: InMemoryAuditSink,
}

impl Harness {
    async fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        seed(store.as_ref()).await;
        Self::over(store)
    }

    /// Builds a harness over an already seeded store.
    fn over(store: Arc<dyn MarketplaceStore>) -> Self {
        let audit = InMemoryAuditSink::default();
        let lifecycle = QuoteLifecycle::new(
            Arc::clone(&store),
            Arc::new(DeterministicPricingEngine),
            Arc::new(audit.clone()),
        );
        let reviews = ReviewService::new(Arc::clone(&store), Arc::new(audit.clone()));
        Self { store, lifecycle, reviews, audit }
    }

    async fn context(&self, actor_id: &str) -> RequestContext {
        let actor = self
            .store
            .find_actor(&ActorId(actor_id.to_owned()))
            .await
            .expect("find actor")
            .expect("actor seeded");
        RequestContext::new(actor, format!("test-{actor_id}"))
    }

    async fn quote_as(&self, maker: &str, design: &str) -> QuoteView {
        let context = self.context(maker).await;
        self.lifecycle
            .create_quote(&context, &DesignId(design.to_owned()), CreateQuoteRequest::default())
            .await
            .expect("create quote")
    }

    async fn accept_as(
        &self,
        actor: &str,
        quote: &QuoteView,
    ) -> Result<AcceptanceOutcome, ApplicationError> {
        let context = self.context(actor).await;
        let change = QuoteChange { status: Some(QuoteStatus::Accepted), ..QuoteChange::default() };
        self.lifecycle.update_quote(&context, &quote.id, change).await.map(|update| update.acceptance)
    }
}

async fn memory_harness() -> Harness {
    Harness::new(Arc::new(InMemoryMarketplaceStore::new())).await
}

async fn sqlite_harness() -> Harness {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    Harness::new(Arc::new(SqlMarketplaceStore::new(pool))).await
}

async fn sqlite_file_harness(directory: &tempfile::TempDir, max_connections: u32) -> Harness {
    let url = format!("sqlite://{}?mode=rwc", directory.path().join("marketplace.db").display());
    let pool = connect_with_settings(&url, max_connections, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    Harness::new(Arc::new(SqlMarketplaceStore::new(pool))).await
}

async fn seed(store: &dyn MarketplaceStore) {
    let now = Utc::now();
    let actors = [
        (CUSTOMER, ActorRole::Customer, false, "Northwind Robotics"),
        (OTHER_CUSTOMER, ActorRole::Customer, false, ""),
        (STAFF, ActorRole::Customer, true, "Operations"),
        (MAKER_A, ActorRole::Manufacturer, false, "Alpha Machining"),
        (MAKER_B, ActorRole::Manufacturer, false, "Beta Fab"),
        (MAKER_C, ActorRole::Manufacturer, false, "Gamma Works"),
    ];
    for (id, role, is_staff, company_name) in actors {
        store
            .save_actor(Actor {
                id: ActorId(id.to_owned()),
                email: format!("{id}@example.test"),
                company_name: company_name.to_owned(),
                role,
                is_staff,
                created_at: now,
            })
            .await
            .expect("seed actor");
    }

    for maker in [MAKER_A, MAKER_B, MAKER_C] {
        store
            .save_manufacturer_profile(ManufacturerProfile {
                actor_id: ActorId(maker.to_owned()),
                markup_factor: Decimal::new(15, 1),
                capabilities: ManufacturerCapabilities {
                    pricing_factors: PricingFactors {
                        material_properties: [(
                            "Al-6061".to_owned(),
                            MaterialProperties {
                                density_g_cm3: Decimal::new(27, 1),
                                cost_usd_kg: Decimal::new(50, 1),
                            },
                        )]
                        .into_iter()
                        .collect(),
                        machining: MachiningFactors {
                            base_time_cost_unit: Decimal::new(10, 0),
                            time_multiplier_complexity_cost_unit: Decimal::new(25, 1),
                        },
                        estimated_lead_time_base_days: Some(serde_json::json!(10)),
                    },
                },
            })
            .await
            .expect("seed profile");
    }

    let designs = [
        (DESIGN, CUSTOMER, DesignStatus::AnalysisComplete),
        (DESIGN_SUBMITTED, CUSTOMER, DesignStatus::Submitted),
        (DESIGN_OWNED_BY_MAKER, MAKER_A, DesignStatus::AnalysisComplete),
    ];
    for (id, owner, status) in designs {
        store
            .save_design(Design {
                id: DesignId(id.to_owned()),
                customer_id: ActorId(owner.to_owned()),
                design_name: format!("{id} part"),
                material: "Al-6061".to_owned(),
                geometric_data: Some(GeometricData {
                    volume_cm3: Decimal::new(100, 0),
                    complexity_score: Decimal::new(2, 0),
                }),
                status,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed design");
    }
}

/// Delegates to a real store but fails sibling rejection inside every unit
/// of work, after the quote write and order insert already happened.
struct FailingSiblingRejection {
    inner: Arc<dyn MarketplaceStore>,
}

struct FailingUnit {
    inner: Box<dyn QuoteUnitOfWork>,
}

#[async_trait]
impl DirectoryStore for FailingSiblingRejection {
    async fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, StoreError> {
        self.inner.find_actor(id).await
    }
    async fn save_actor(&self, actor: Actor) -> Result<(), StoreError> {
        self.inner.save_actor(actor).await
    }
    async fn find_design(&self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        self.inner.find_design(id).await
    }
    async fn save_design(&self, design: Design) -> Result<(), StoreError> {
        self.inner.save_design(design).await
    }
    async fn find_manufacturer_profile(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<ManufacturerProfile>, StoreError> {
        self.inner.find_manufacturer_profile(actor_id).await
    }
    async fn save_manufacturer_profile(
        &self,
        profile: ManufacturerProfile,
    ) -> Result<(), StoreError> {
        self.inner.save_manufacturer_profile(profile).await
    }
}

#[async_trait]
impl QuoteStore for FailingSiblingRejection {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        self.inner.find_quote(id).await
    }
    async fn list_quotes_for_design(&self, design_id: &DesignId) -> Result<Vec<Quote>, StoreError> {
        self.inner.list_quotes_for_design(design_id).await
    }
    async fn find_quote_for_pair(
        &self,
        design_id: &DesignId,
        manufacturer_id: &ActorId,
    ) -> Result<Option<Quote>, StoreError> {
        self.inner.find_quote_for_pair(design_id, manufacturer_id).await
    }
    async fn insert_quote(&self, quote: Quote) -> Result<(), StoreError> {
        self.inner.insert_quote(quote).await
    }
    async fn delete_quote(&self, id: &QuoteId) -> Result<bool, StoreError> {
        self.inner.delete_quote(id).await
    }
    async fn find_order_for_quote(&self, quote_id: &QuoteId) -> Result<Option<Order>, StoreError> {
        self.inner.find_order_for_quote(quote_id).await
    }
    async fn find_order_for_design(
        &self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        self.inner.find_order_for_design(design_id).await
    }
    async fn begin(&self) -> Result<Box<dyn QuoteUnitOfWork>, StoreError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingUnit { inner }))
    }
}

#[async_trait]
impl ReviewStore for FailingSiblingRejection {
    async fn find_review(&self, id: &ReviewId) -> Result<Option<Review>, StoreError> {
        self.inner.find_review(id).await
    }
    async fn list_reviews_for_manufacturer(
        &self,
        manufacturer_id: &ActorId,
    ) -> Result<Vec<Review>, StoreError> {
        self.inner.list_reviews_for_manufacturer(manufacturer_id).await
    }
    async fn find_review_for(
        &self,
        customer_id: &ActorId,
        manufacturer_id: &ActorId,
        order_id: Option<&OrderId>,
    ) -> Result<Option<Review>, StoreError> {
        self.inner.find_review_for(customer_id, manufacturer_id, order_id).await
    }
    async fn insert_review(&self, review: Review) -> Result<(), StoreError> {
        self.inner.insert_review(review).await
    }
    async fn update_review(&self, review: &Review) -> Result<(), StoreError> {
        self.inner.update_review(review).await
    }
    async fn delete_review(&self, id: &ReviewId) -> Result<bool, StoreError> {
        self.inner.delete_review(id).await
    }
}

#[async_trait]
impl QuoteUnitOfWork for FailingUnit {
    async fn find_quote(&mut self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        self.inner.find_quote(id).await
    }
    async fn find_design(&mut self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        self.inner.find_design(id).await
    }
    async fn find_order_for_quote(
        &mut self,
        quote_id: &QuoteId,
    ) -> Result<Option<Order>, StoreError> {
        self.inner.find_order_for_quote(quote_id).await
    }
    async fn find_order_for_design(
        &mut self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        self.inner.find_order_for_design(design_id).await
    }
    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        self.inner.update_quote(quote).await
    }
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.inner.insert_order(order).await
    }
    async fn update_design_status(
        &mut self,
        design_id: &DesignId,
        status: DesignStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.update_design_status(design_id, status, at).await
    }
    async fn reject_pending_quotes(
        &mut self,
        _design_id: &DesignId,
        _keep: &QuoteId,
        _at: DateTime<Utc>,
    ) -> Result<Vec<QuoteId>, StoreError> {
        Err(StoreError::Database("disk I/O error".to_owned()))
    }
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

async fn create_fills_price_and_lead_time_from_pricing(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    assert_eq!(quote.status, QuoteStatus::Pending);
    assert_eq!(quote.price, Decimal::new(2453, 2));
    assert_eq!(quote.lead_time_days, 10);
    assert_eq!(quote.manufacturer_display_name, "Alpha Machining");
    assert!(harness.audit.event_types().contains(&"quote.created".to_owned()));
}

async fn create_keeps_explicit_price(harness: &Harness) {
    let context = harness.context(MAKER_B).await;
    let request = CreateQuoteRequest {
        price: Some(Decimal::new(9999, 2)),
        estimated_lead_time_days: Some(4),
        notes: Some("   ".to_owned()),
    };
    let quote = harness
        .lifecycle
        .create_quote(&context, &DesignId(DESIGN.to_owned()), request)
        .await
        .expect("create quote");

    assert_eq!(quote.price, Decimal::new(9999, 2));
    assert_eq!(quote.lead_time_days, 4);
    assert_eq!(quote.notes, None);
}

async fn second_quote_for_same_design_is_rejected(harness: &Harness) {
    harness.quote_as(MAKER_A, DESIGN).await;
    let context = harness.context(MAKER_A).await;

    let error = harness
        .lifecycle
        .create_quote(&context, &DesignId(DESIGN.to_owned()), CreateQuoteRequest::default())
        .await
        .expect_err("duplicate quote");

    assert_eq!(
        error,
        ApplicationError::Validation("You have already submitted a quote for this design.".to_owned())
    );
}

async fn design_must_be_analysis_complete(harness: &Harness) {
    let context = harness.context(MAKER_A).await;
    let error = harness
        .lifecycle
        .create_quote(&context, &DesignId(DESIGN_SUBMITTED.to_owned()), CreateQuoteRequest::default())
        .await
        .expect_err("submitted design");

    assert_eq!(
        error,
        ApplicationError::Forbidden(
            "Design must be in 'Analysis Complete' status to receive quotes. Current status: Submitted."
                .to_owned()
        )
    );
}

async fn manufacturer_cannot_quote_own_design(harness: &Harness) {
    let context = harness.context(MAKER_A).await;
    let error = harness
        .lifecycle
        .create_quote(
            &context,
            &DesignId(DESIGN_OWNED_BY_MAKER.to_owned()),
            CreateQuoteRequest::default(),
        )
        .await
        .expect_err("own design");

    assert!(matches!(error, ApplicationError::Forbidden(_)));
    assert!(harness.audit.event_types().contains(&"quote.create_denied".to_owned()));
}

async fn customers_cannot_create_quotes(harness: &Harness) {
    let context = harness.context(CUSTOMER).await;
    let error = harness
        .lifecycle
        .create_quote(&context, &DesignId(DESIGN.to_owned()), CreateQuoteRequest::default())
        .await
        .expect_err("customer quote");

    assert_eq!(
        error,
        ApplicationError::Forbidden("Only authenticated manufacturers can create quotes.".to_owned())
    );
}

async fn listing_is_scoped_to_the_caller(harness: &Harness) {
    let first = harness.quote_as(MAKER_A, DESIGN).await;
    let second = harness.quote_as(MAKER_B, DESIGN).await;
    let design = DesignId(DESIGN.to_owned());

    let owner_view = harness
        .lifecycle
        .list_quotes(&harness.context(CUSTOMER).await, &design)
        .await
        .expect("owner list");
    let ids: Vec<_> = owner_view.into_iter().map(|quote| quote.id).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

    let maker_view = harness
        .lifecycle
        .list_quotes(&harness.context(MAKER_B).await, &design)
        .await
        .expect("maker list");
    assert_eq!(maker_view.len(), 1);
    assert_eq!(maker_view[0].id, second.id);

    let stranger_view = harness
        .lifecycle
        .list_quotes(&harness.context(OTHER_CUSTOMER).await, &design)
        .await
        .expect("stranger list");
    assert!(stranger_view.is_empty());
}

async fn third_party_cannot_read_quote(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    let error = harness
        .lifecycle
        .get_quote(&harness.context(MAKER_C).await, &quote.id)
        .await
        .expect_err("third party");
    assert_eq!(
        error,
        ApplicationError::Forbidden("You do not have permission to access this quote.".to_owned())
    );

    harness
        .lifecycle
        .get_quote(&harness.context(STAFF).await, &quote.id)
        .await
        .expect("staff can read any quote");
}

async fn acceptance_materializes_order_and_rejects_siblings(harness: &Harness) {
    let accepted = harness.quote_as(MAKER_A, DESIGN).await;
    let sibling = harness.quote_as(MAKER_B, DESIGN).await;

    let outcome = harness.accept_as(CUSTOMER, &accepted).await.expect("accept");
    let AcceptanceOutcome::Materialized { order_id, rejected_quote_ids } = outcome else {
        panic!("expected an order to be created, got {outcome:?}");
    };
    assert_eq!(rejected_quote_ids, vec![sibling.id.clone()]);

    let order = harness
        .lifecycle
        .order_for_design(&harness.context(CUSTOMER).await, &DesignId(DESIGN.to_owned()))
        .await
        .expect("order");
    assert_eq!(order.id, order_id);
    assert_eq!(order.accepted_quote_id, accepted.id);
    assert_eq!(order.total_price, accepted.price);
    assert_eq!(order.status, OrderStatus::PendingPayment.as_str());
    let expected_delivery = order
        .created_at
        .date_naive()
        .checked_add_days(Days::new(u64::from(accepted.lead_time_days)))
        .expect("delivery date");
    assert_eq!(order.estimated_delivery_date, expected_delivery);

    let design = harness
        .store
        .find_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find design")
        .expect("design");
    assert_eq!(design.status, DesignStatus::Ordered);

    let sibling = harness.store.find_quote(&sibling.id).await.expect("find").expect("sibling");
    assert_eq!(sibling.status, QuoteStatus::Rejected);

    let events = harness.audit.event_types();
    for expected in ["quote.accepted", "order.created", "design.ordered", "quote.sibling_rejected"] {
        assert!(events.contains(&expected.to_owned()), "missing {expected} in {events:?}");
    }
}

async fn reaccepting_does_not_create_a_second_order(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;
    harness.accept_as(CUSTOMER, &quote).await.expect("accept");

    let customer_retry = harness.accept_as(CUSTOMER, &quote).await.expect_err("customer retry");
    assert!(matches!(customer_retry, ApplicationError::Forbidden(_)));

    let staff_retry = harness.accept_as(STAFF, &quote).await.expect("staff retry");
    assert_eq!(staff_retry, AcceptanceOutcome::NotApplicable);

    let order = harness
        .store
        .find_order_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find order")
        .expect("order");
    assert_eq!(order.accepted_quote_id, quote.id);
}

async fn manufacturer_cannot_accept_own_quote(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    let error = harness.accept_as(MAKER_A, &quote).await.expect_err("maker accept");
    assert_eq!(
        error,
        ApplicationError::Forbidden(
            "Manufacturer cannot make this status transition from 'pending' to 'accepted'.".to_owned()
        )
    );
    assert!(harness
        .store
        .find_order_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find order")
        .is_none());
}

async fn third_party_cannot_update_quote(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    let error = harness.accept_as(OTHER_CUSTOMER, &quote).await.expect_err("third party");
    assert_eq!(
        error,
        ApplicationError::Forbidden(
            "You do not have permission to update this quote or perform this status change."
                .to_owned()
        )
    );
}

async fn manufacturer_edits_and_expires_pending_quote(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;
    let context = harness.context(MAKER_A).await;

    let edited = harness
        .lifecycle
        .update_quote(
            &context,
            &quote.id,
            QuoteChange {
                price: Some(Decimal::new(3000, 2)),
                notes: Some("Includes deburring.".to_owned()),
                ..QuoteChange::default()
            },
        )
        .await
        .expect("edit");
    assert_eq!(edited.quote.price, Decimal::new(3000, 2));
    assert_eq!(edited.quote.notes.as_deref(), Some("Includes deburring."));
    assert_eq!(edited.acceptance, AcceptanceOutcome::NotApplicable);

    let expired = harness
        .lifecycle
        .update_quote(
            &context,
            &quote.id,
            QuoteChange { status: Some(QuoteStatus::Expired), ..QuoteChange::default() },
        )
        .await
        .expect("expire");
    assert_eq!(expired.quote.status, QuoteStatus::Expired);

    let error = harness
        .lifecycle
        .update_quote(
            &context,
            &quote.id,
            QuoteChange { price: Some(Decimal::new(1, 0)), ..QuoteChange::default() },
        )
        .await
        .expect_err("edit after expiry");
    assert!(matches!(error, ApplicationError::Forbidden(_)));
}

async fn delete_is_limited_to_pending_quotes_of_the_creator(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    let owner_error = harness
        .lifecycle
        .delete_quote(&harness.context(CUSTOMER).await, &quote.id)
        .await
        .expect_err("owner delete");
    assert_eq!(
        owner_error,
        ApplicationError::Forbidden("You can only delete PENDING quotes that you created.".to_owned())
    );

    harness
        .lifecycle
        .delete_quote(&harness.context(MAKER_A).await, &quote.id)
        .await
        .expect("creator delete");
    let missing = harness
        .lifecycle
        .get_quote(&harness.context(MAKER_A).await, &quote.id)
        .await
        .expect_err("deleted");
    assert!(matches!(missing, ApplicationError::NotFound(_)));
}

async fn accepted_quote_cannot_be_deleted_by_its_creator(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;
    harness.accept_as(CUSTOMER, &quote).await.expect("accept");

    let error = harness
        .lifecycle
        .delete_quote(&harness.context(MAKER_A).await, &quote.id)
        .await
        .expect_err("accepted quote");
    assert!(matches!(error, ApplicationError::Forbidden(_)));
}

async fn concurrent_acceptances_create_exactly_one_order(harness: &Harness) {
    let first = harness.quote_as(MAKER_A, DESIGN).await;
    let second = harness.quote_as(MAKER_B, DESIGN).await;

    let (left, right) =
        tokio::join!(harness.accept_as(CUSTOMER, &first), harness.accept_as(CUSTOMER, &second));

    let materialized = [&left, &right]
        .into_iter()
        .filter(|result| matches!(result, Ok(AcceptanceOutcome::Materialized { .. })))
        .count();
    assert_eq!(materialized, 1, "left: {left:?}, right: {right:?}");
    for result in [&left, &right] {
        match result {
            Ok(AcceptanceOutcome::Materialized { .. }) | Ok(AcceptanceOutcome::Superseded) => {}
            Err(ApplicationError::Forbidden(_)) => {}
            other => panic!("unexpected acceptance result: {other:?}"),
        }
    }

    let order = harness
        .store
        .find_order_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find order")
        .expect("order");
    let quotes = harness
        .store
        .list_quotes_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("list quotes");
    let accepted: Vec<_> =
        quotes.iter().filter(|quote| quote.status == QuoteStatus::Accepted).collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, order.accepted_quote_id);
}

async fn same_quote_accepted_twice_concurrently_yields_one_order(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;

    let (left, right) =
        tokio::join!(harness.accept_as(CUSTOMER, &quote), harness.accept_as(CUSTOMER, &quote));
    let materialized = [&left, &right]
        .into_iter()
        .filter(|result| matches!(result, Ok(AcceptanceOutcome::Materialized { .. })))
        .count();
    assert_eq!(materialized, 1, "left: {left:?}, right: {right:?}");
    assert!(harness
        .store
        .find_order_for_quote(&quote.id)
        .await
        .expect("find order")
        .is_some());
}

async fn order_is_visible_to_participants_only(harness: &Harness) {
    let quote = harness.quote_as(MAKER_A, DESIGN).await;
    harness.accept_as(CUSTOMER, &quote).await.expect("accept");
    let design = DesignId(DESIGN.to_owned());

    harness
        .lifecycle
        .order_for_design(&harness.context(MAKER_A).await, &design)
        .await
        .expect("manufacturer sees order");
    let error = harness
        .lifecycle
        .order_for_design(&harness.context(MAKER_B).await, &design)
        .await
        .expect_err("outsider");
    assert!(matches!(error, ApplicationError::Forbidden(_)));
}

async fn reviews_enforce_one_per_scope(harness: &Harness) {
    let context = harness.context(CUSTOMER).await;
    let maker = ActorId(MAKER_A.to_owned());

    let review = harness
        .reviews
        .create_review(
            &context,
            &maker,
            ReviewDraft { rating: 5, comment: Some("Fast turnaround.".to_owned()), order_id: None },
        )
        .await
        .expect("general review");
    assert_eq!(review.manufacturer_display_name, "Alpha Machining");

    let duplicate = harness
        .reviews
        .create_review(&context, &maker, ReviewDraft { rating: 4, ..ReviewDraft::default() })
        .await
        .expect_err("second general review");
    assert_eq!(
        duplicate,
        ApplicationError::Validation(
            "You have already submitted a review for this manufacturer (general review).".to_owned()
        )
    );

    let out_of_range = harness
        .reviews
        .create_review(
            &harness.context(OTHER_CUSTOMER).await,
            &maker,
            ReviewDraft { rating: 6, ..ReviewDraft::default() },
        )
        .await
        .expect_err("rating six");
    assert!(matches!(out_of_range, ApplicationError::Domain(_)));

    let manufacturer_review = harness
        .reviews
        .create_review(
            &harness.context(MAKER_B).await,
            &maker,
            ReviewDraft { rating: 3, ..ReviewDraft::default() },
        )
        .await
        .expect_err("manufacturer reviewer");
    assert_eq!(
        manufacturer_review,
        ApplicationError::Forbidden("Only authenticated customers can submit reviews.".to_owned())
    );

    let updated = harness
        .reviews
        .update_review(&context, &review.id, ReviewChange { rating: Some(4), comment: None })
        .await
        .expect("author update");
    assert_eq!(updated.rating, 4);

    let foreign = harness
        .reviews
        .delete_review(&harness.context(OTHER_CUSTOMER).await, &review.id)
        .await
        .expect_err("foreign delete");
    assert!(matches!(foreign, ApplicationError::Forbidden(_)));

    let listed = harness.reviews.list_reviews(&maker).await.expect("list");
    assert_eq!(listed.len(), 1);

    harness
        .reviews
        .delete_review(&harness.context(STAFF).await, &review.id)
        .await
        .expect("staff delete");
    assert!(harness.reviews.list_reviews(&maker).await.expect("list").is_empty());
}

async fn reviews_of_unknown_manufacturer_are_not_found(harness: &Harness) {
    let error = harness
        .reviews
        .list_reviews(&ActorId(CUSTOMER.to_owned()))
        .await
        .expect_err("customer is not a manufacturer");
    assert_eq!(error, ApplicationError::NotFound("Manufacturer not found.".to_owned()));
}

async fn failure_inside_acceptance_rolls_back_every_write(harness: &Harness) {
    let accepted = harness.quote_as(MAKER_A, DESIGN).await;
    let sibling = harness.quote_as(MAKER_B, DESIGN).await;
    let failing =
        Harness::over(Arc::new(FailingSiblingRejection { inner: Arc::clone(&harness.store) }));

    let error = failing.accept_as(CUSTOMER, &accepted).await.expect_err("unit must fail");
    assert!(matches!(error, ApplicationError::Persistence(_)), "got {error:?}");
    assert!(failing.audit.event_types().contains(&"quote.update_failed".to_owned()));

    let stored = harness.store.find_quote(&accepted.id).await.expect("find").expect("quote");
    assert_eq!(stored.status, QuoteStatus::Pending);
    let sibling = harness.store.find_quote(&sibling.id).await.expect("find").expect("sibling");
    assert_eq!(sibling.status, QuoteStatus::Pending);
    assert!(harness.store.find_order_for_quote(&accepted.id).await.expect("find order").is_none());
    assert!(harness
        .store
        .find_order_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find order")
        .is_none());
    let design = harness
        .store
        .find_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find design")
        .expect("design");
    assert_eq!(design.status, DesignStatus::AnalysisComplete);

    let outcome = harness.accept_as(CUSTOMER, &accepted).await.expect("retry accept");
    assert!(matches!(outcome, AcceptanceOutcome::Materialized { .. }), "got {outcome:?}");
}

async fn staff_cannot_edit_details_of_accepted_quote(harness: &Harness) {
    let accepted = harness.quote_as(MAKER_A, DESIGN).await;
    harness.accept_as(CUSTOMER, &accepted).await.expect("accept");

    let staff = harness.context(STAFF).await;
    let change = QuoteChange {
        price: Some(Decimal::new(1, 2)),
        estimated_lead_time_days: Some(999),
        ..QuoteChange::default()
    };
    let error = harness
        .lifecycle
        .update_quote(&staff, &accepted.id, change)
        .await
        .expect_err("accepted quote is immutable");
    assert!(matches!(error, ApplicationError::Forbidden(_)), "got {error:?}");

    let stored = harness.store.find_quote(&accepted.id).await.expect("find").expect("quote");
    assert_eq!(stored.status, QuoteStatus::Accepted);
    assert_eq!(stored.price, accepted.price);
    assert_eq!(stored.estimated_lead_time_days, accepted.lead_time_days);
    let order = harness
        .store
        .find_order_for_quote(&accepted.id)
        .await
        .expect("find order")
        .expect("order");
    assert_eq!(order.total_price, stored.price);
}

macro_rules! store_contract_tests {
    ($backend:ident, $harness:path, [$($scenario:ident),+ $(,)?]) => {
        mod $backend {
            $(
                #[tokio::test]
                async fn $scenario() {
                    let harness = $harness().await;
                    super::$scenario(&harness).await;
                }
            )+
        }
    };
}

macro_rules! all_scenarios {
    ($backend:ident, $harness:path) => {
        store_contract_tests!($backend, $harness, [
            create_fills_price_and_lead_time_from_pricing,
            create_keeps_explicit_price,
            second_quote_for_same_design_is_rejected,
            design_must_be_analysis_complete,
            manufacturer_cannot_quote_own_design,
            customers_cannot_create_quotes,
            listing_is_scoped_to_the_caller,
            third_party_cannot_read_quote,
            acceptance_materializes_order_and_rejects_siblings,
            reaccepting_does_not_create_a_second_order,
            manufacturer_cannot_accept_own_quote,
            third_party_cannot_update_quote,
            manufacturer_edits_and_expires_pending_quote,
            delete_is_limited_to_pending_quotes_of_the_creator,
            accepted_quote_cannot_be_deleted_by_its_creator,
            concurrent_acceptances_create_exactly_one_order,
            same_quote_accepted_twice_concurrently_yields_one_order,
            order_is_visible_to_participants_only,
            reviews_enforce_one_per_scope,
            reviews_of_unknown_manufacturer_are_not_found,
            failure_inside_acceptance_rolls_back_every_write,
            staff_cannot_edit_details_of_accepted_quote,
        ]);
    };
}

all_scenarios!(in_memory, super::memory_harness);
all_scenarios!(sqlite, super::sqlite_harness);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pooled_sqlite_racing_acceptances_leave_one_quiet_loser() {
    let directory = tempfile::tempdir().expect("temp dir");
    let harness = sqlite_file_harness(&directory, 4).await;
    let first = harness.quote_as(MAKER_A, DESIGN).await;
    let second = harness.quote_as(MAKER_B, DESIGN).await;

    let (left, right) =
        tokio::join!(harness.accept_as(CUSTOMER, &first), harness.accept_as(CUSTOMER, &second));
    let outcomes = [left, right];

    let materialized = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(AcceptanceOutcome::Materialized { .. })))
        .count();
    assert_eq!(materialized, 1, "{outcomes:?}");
    // The loser either lost inside its unit or saw the rejection before
    // starting one; it never surfaces a storage failure.
    for outcome in &outcomes {
        assert!(
            matches!(
                outcome,
                Ok(AcceptanceOutcome::Materialized { .. } | AcceptanceOutcome::Superseded)
                    | Err(ApplicationError::Forbidden(_))
            ),
            "{outcomes:?}"
        );
    }

    let order = harness
        .store
        .find_order_for_design(&DesignId(DESIGN.to_owned()))
        .await
        .expect("find order")
        .expect("one order");
    let accepted = harness
        .store
        .find_quote(&order.accepted_quote_id)
        .await
        .expect("find")
        .expect("accepted quote");
    assert_eq!(accepted.status, QuoteStatus::Accepted);
}
