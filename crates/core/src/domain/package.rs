use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::treatment::TreatmentId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub String);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTreatment {
    pub treatment_id: TreatmentId,
    pub quantity: u32,
}

/// Fixed bundle sold at `price` (reference currency). `savings` is the percent
/// saved against buying the same treatments individually.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPackage {
    pub id: PackageId,
    pub name: String,
    pub treatments: Vec<PackageTreatment>,
    pub price: Decimal,
    pub savings: Decimal,
}
