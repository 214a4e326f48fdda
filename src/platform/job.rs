use std::sync::Arc;

use crate::config::Configuration;

/// One run of a plan on behalf of the host.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    name: Option<String>,
    configuration: Arc<Configuration>,
}

impl Job {
    pub fn new(id: impl Into<String>, configuration: Configuration) -> Self {
        Self {
            id: id.into(),
            name: None,
            configuration: Arc::new(configuration),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }
}
