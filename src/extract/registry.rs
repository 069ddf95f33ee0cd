use crate::config::SiteConfig;
use crate::extract::{DefaultExtractor, Extractor};
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// Hook identifier of the built-in handler
pub const DEFAULT_EXTRACTOR: &str = "default";

/// Extraction handlers keyed by hook identifier
#[derive(Clone)]
pub struct ExtractorRegistry {
    handlers: HashMap<String, Arc<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    /// Creates a registry holding only the default handler
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Arc<dyn Extractor>> = HashMap::new();
        handlers.insert(DEFAULT_EXTRACTOR.to_string(), Arc::new(DefaultExtractor));
        Self { handlers }
    }

    /// Registers (or replaces) a handler
    pub fn register(&mut self, id: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.handlers.insert(id.into(), extractor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Resolves the handler a site asked for
    ///
    /// Sites without a hook get the default handler. Naming an unregistered
    /// hook is a configuration error.
    pub fn resolve(&self, site: &SiteConfig) -> Result<Arc<dyn Extractor>, ConfigError> {
        let id = site.extractor.as_deref().unwrap_or(DEFAULT_EXTRACTOR);
        self.handlers
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownExtractor {
                site: site.name.clone(),
                extractor: id.to_string(),
            })
    }
}
