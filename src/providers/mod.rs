pub mod alpha_vantage;
pub mod eodhd;
pub mod figi;
pub mod util;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageProvider;
pub use eodhd::EodhdProvider;
pub use figi::FigiResolver;
pub use yahoo::YahooProvider;
