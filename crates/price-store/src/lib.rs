pub mod error;
pub mod loader;
pub mod model;

pub use error::PriceStoreError;
pub use loader::load;
pub use model::{build_db, PriceDB, PriceSeries};
