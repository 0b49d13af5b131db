use std::sync::Arc;

use anyhow::Result;
use handlebars::Handlebars;

use crate::config::Config;
use crate::feed::FeedCache;
use crate::schedule::Programs;
use crate::template;

#[derive(Clone)]
pub struct State {
    pub cfg: Arc<Config>,
    pub programs: Arc<Programs>,
    pub feed_cache: Arc<FeedCache>,
    pub template: Arc<Handlebars<'static>>,
}

impl State {
    pub fn new(cfg: Config, programs: Programs) -> Result<Self> {
        let feed_cache = Arc::new(FeedCache::new(
            cfg.marker_path(),
            cfg.cache_ttl.into(),
            cfg.cache_capacity,
        ));
        let template = Arc::new(template::new()?);

        Ok(State {
            cfg: Arc::new(cfg),
            programs: Arc::new(programs),
            feed_cache,
            template,
        })
    }
}
