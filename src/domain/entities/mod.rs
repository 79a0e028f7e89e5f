pub mod analysis;
pub mod asset;
pub mod position;
pub mod price_sample;
pub mod trade;
