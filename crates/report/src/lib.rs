pub mod error;
pub mod inclusion;
pub mod log_parser;
pub mod reconcile;
pub mod tps;

pub use error::Error;
pub use inclusion::InclusionRow;
pub use log_parser::SentTx;
pub use reconcile::{reconcile, BlockSource, BlockSummary};
pub use tps::TpsReport;

pub type Result<T> = std::result::Result<T, Error>;
