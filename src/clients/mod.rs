pub mod json_extract;
pub mod scoring_client;

pub use json_extract::extract_json;
pub use scoring_client::{
    ContextHandle, ResponsesClient, ScoringReply, ScoringRequest, ScoringService,
};
