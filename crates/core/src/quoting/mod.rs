pub mod aggregator;
pub mod catalog;
pub mod constraints;
pub mod package;
pub mod pricing;
pub mod promo;
pub mod sequence;
pub mod session;

pub use aggregator::{reduce, IgnoredReason, QuoteAction, QuoteAggregator, QuoteNotice, Reduction};
pub use catalog::{Catalog, ResolvedOffer};
pub use constraints::{validate_for_submit, validate_lines, QuoteViolation, ValidationReport};
pub use package::PackageBundle;
pub use pricing::{calculate_totals, price_quote_with_trace, snapshot_quote, PricingResult, QuoteTotals};
pub use promo::{
    degraded_discount, PromoCodeRule, PromoRequest, PromoResolver, PromoValidation, ResolveError,
    StaticPromoResolver,
};
pub use sequence::{RequestSequencer, RequestToken};
pub use session::{OfferApplication, PromoOutcome, QuoteDraft, QuoteSession, QuoteStore};
