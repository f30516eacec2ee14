pub mod clock;
pub mod data_models;
pub mod retailer;
pub mod schema;

pub use clock::RunClock;
pub use data_models::*;
pub use retailer::Retailer;
