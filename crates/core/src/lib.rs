pub mod audit;
pub mod authorization;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod pricing;
pub mod reviews;
pub mod store;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, RequestContext, TracingAuditSink};
pub use authorization::AccessDecision;
pub use domain::actor::{Actor, ActorId, ActorRole};
pub use domain::design::{Design, DesignId, DesignStatus, GeometricData};
pub use domain::manufacturer::ManufacturerProfile;
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::quote::{Quote, QuoteChange, QuoteId, QuoteStatus};
pub use domain::review::{Review, ReviewId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    AcceptanceOutcome, CreateQuoteRequest, OrderView, QuoteLifecycle, QuoteUpdate, QuoteView,
};
pub use pricing::{DeterministicPricingEngine, PricingEngine, PricingOutcome};
pub use reviews::{ReviewChange, ReviewDraft, ReviewService, ReviewView};
pub use store::{MarketplaceStore, QuoteUnitOfWork, StoreError};
