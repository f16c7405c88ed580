//! HTTP adapters for the quote backend: catalog fetch, promo validation and
//! quote persistence over the JSON API.

pub mod api;
pub mod catalog;
pub mod error;
pub mod promo;
pub mod quotes;

pub use api::ApiClient;
pub use catalog::fetch_catalog;
pub use error::ClientError;
pub use promo::HttpPromoResolver;
pub use quotes::HttpQuoteStore;
