//! Default backend commands per language

use std::path::Path;

use super::types::{BackendCommand, BackendConfig};
use crate::scanner::LanguageTag;

/// Default language server commands for each language
pub struct BackendDefaults;

impl BackendDefaults {
    /// Default command for a language tag, if one is registered
    #[must_use]
    pub fn command_for(language: &LanguageTag) -> Option<BackendCommand> {
        let command = match language.as_str() {
            "rust" => BackendCommand::new("rust-analyzer"),
            "python" => BackendCommand::new("pyright-langserver").with_args(["--stdio"]),
            "typescript" | "javascript" => {
                BackendCommand::new("typescript-language-server").with_args(["--stdio"])
            }
            "go" => BackendCommand::new("gopls"),
            "java" => BackendCommand::new("jdtls"),
            "c" | "cpp" => BackendCommand::new("clangd"),
            "csharp" => BackendCommand::new("csharp-ls"),
            _ => return None,
        };
        Some(command)
    }

    /// Get the default server config for a language
    #[must_use]
    pub fn for_language(language: &LanguageTag, root_path: &Path) -> Option<BackendConfig> {
        Self::command_for(language).map(|command| BackendConfig {
            language: language.clone(),
            command,
            root_path: root_path.to_path_buf(),
        })
    }
}
