pub mod boost;
pub mod candidates;
pub mod cleaning;
pub mod diversity;
pub mod explain;
pub mod filter;
pub mod model;
pub mod profile;
pub mod quality;
pub mod ranking;
pub mod recommend;
pub mod similarity;

pub use filter::{ContentFilter, FilterOptions, FilterReport};
pub use model::{ModelRegistry, TrainSummary};
pub use recommend::Recommender;
