use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::SubmissionPipeline;
use crate::store::MessageStore;
use crate::token::{TokenIssuer, UsedTokenStore};

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub issuer: Arc<TokenIssuer>,
    pub pipeline: Arc<SubmissionPipeline>,
    pub store: Arc<dyn MessageStore>,
    pub used_tokens: Arc<dyn UsedTokenStore>,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        issuer: Arc<TokenIssuer>,
        pipeline: Arc<SubmissionPipeline>,
        store: Arc<dyn MessageStore>,
        used_tokens: Arc<dyn UsedTokenStore>,
    ) -> Self {
        Self {
            config,
            issuer,
            pipeline,
            store,
            used_tokens,
        }
    }
}
