pub mod discount;
pub mod line_item;
pub mod offer;
pub mod package;
pub mod quote;
pub mod treatment;
