pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod expand;
pub mod keys;
pub mod rank;
pub mod recall;
pub mod response;
pub mod searcher;
pub mod text;
pub mod tracker;

pub use backend::SearchBackend;
pub use config::{
    ExpandConfig, RecallConfig, RerankConfig, RerankStrategy, ReturnType, SearchConfig,
};
pub use context::SearchContext;
pub use error::SearchError;
pub use expand::{ExpandResult, ExpandSearcher};
pub use keys::{KeyEntity, ParentEntity};
pub use recall::{RecallResult, RecallSearcher};
pub use response::{QueryInfo, SearchResponse, SearchStats};
pub use searcher::Searcher;
pub use tracker::{Clue, DisplayLevel, Node, NodeType, Stage, Tracker};
