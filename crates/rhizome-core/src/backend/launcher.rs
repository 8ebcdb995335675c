//! Launches language-server backends

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::client::{ClientTimeouts, LspClient};
use super::defaults::BackendDefaults;
use super::types::{BackendCommand, BackendConfig};
use super::{Backend, BackendLauncher};
use crate::error::BackendError;
use crate::scanner::LanguageTag;

/// Starts an [`LspClient`] per language, from overrides or the defaults
#[derive(Debug, Clone, Default)]
pub struct LspLauncher {
    overrides: BTreeMap<LanguageTag, BackendCommand>,
    timeouts: ClientTimeouts,
}

impl LspLauncher {
    #[must_use]
    pub fn new(timeouts: ClientTimeouts) -> Self {
        Self {
            overrides: BTreeMap::new(),
            timeouts,
        }
    }

    /// Register a custom command for a language
    #[must_use]
    pub fn with_override(mut self, language: LanguageTag, command: BackendCommand) -> Self {
        self.register_server(language, command);
        self
    }

    pub fn register_server(&mut self, language: LanguageTag, command: BackendCommand) {
        self.overrides.insert(language, command);
    }

    /// Config used to start the backend for `language`, if any is known
    #[must_use]
    pub fn config_for(&self, language: &LanguageTag, root: &Path) -> Option<BackendConfig> {
        match self.overrides.get(language) {
            Some(command) => Some(BackendConfig {
                language: language.clone(),
                command: command.clone(),
                root_path: root.to_path_buf(),
            }),
            None => BackendDefaults::for_language(language, root),
        }
    }
}

impl BackendLauncher for LspLauncher {
    fn launch<'a>(
        &'a self,
        language: &'a LanguageTag,
        root: &'a Path,
    ) -> BoxFuture<'a, Result<Arc<dyn Backend>, BackendError>> {
        Box::pin(async move {
            let config = self.config_for(language, root).ok_or_else(|| {
                BackendError::Unavailable {
                    language: language.clone(),
                    reason: "no backend registered".into(),
                }
            })?;
            let client = LspClient::open(config, self.timeouts).await?;
            Ok(Arc::new(client) as Arc<dyn Backend>)
        })
    }
}
