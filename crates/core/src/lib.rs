pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod quoting;
pub mod wire;

pub use domain::discount::{AppliedDiscounts, DiscountDescriptor, DiscountKind, DiscountSource};
pub use domain::line_item::{LineItemId, LineItemSnapshot, TreatmentLineItem};
pub use domain::offer::{SpecialOffer, SpecialOfferId};
pub use domain::package::{PackageId, TreatmentPackage};
pub use domain::quote::{QuoteId, QuoteRecord, QuoteSnapshot, QuoteState, QuoteStatus};
pub use domain::treatment::{Treatment, TreatmentId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use quoting::{
    Catalog, PromoOutcome, PromoResolver, QuoteAggregator, QuoteSession, QuoteStore, ResolveError,
};
