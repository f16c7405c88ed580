use dentalfly_core::quoting::catalog::Catalog;
use dentalfly_core::wire::{PackageDto, SpecialOfferDto, TreatmentDto};
use tracing::info;

use crate::api::ApiClient;
use crate::error::ClientError;

/// Fetches treatments, packages and offers in parallel. Any failure aborts the
/// whole fetch; a partial catalog is never returned.
pub async fn fetch_catalog(client: &ApiClient) -> Result<Catalog, ClientError> {
    let (treatments, packages, offers) = tokio::try_join!(
        client.get_json::<Vec<TreatmentDto>>("/treatments"),
        client.get_json::<Vec<PackageDto>>("/packages"),
        client.get_json::<Vec<SpecialOfferDto>>("/special-offers"),
    )?;

    info!(
        event_name = "client.catalog.fetched",
        treatments = treatments.len(),
        packages = packages.len(),
        offers = offers.len(),
        "catalog fetched"
    );

    Ok(Catalog::new(
        treatments.into_iter().map(Into::into).collect(),
        packages.into_iter().map(Into::into).collect(),
        offers.into_iter().map(Into::into).collect(),
    ))
}
