// src/provider/combined.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::provider::{DirectoryContents, FileInfo, FileProvider};
use crate::token::{ChangeToken, CombinedChangeToken, NoopToken};

/// Presents several providers as one, in precedence order.
///
/// Lookups take the first provider that has the file; directory listings
/// concatenate entries across providers, first occurrence of a name wins.
/// `watch` fans out to every provider and aggregates the live tokens.
pub struct CombinedFileProvider {
    providers: Vec<Arc<dyn FileProvider>>,
}

impl CombinedFileProvider {
    pub fn new(providers: Vec<Arc<dyn FileProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn FileProvider>] {
        &self.providers
    }
}

impl FileProvider for CombinedFileProvider {
    fn get_file_info(&self, subpath: &str) -> FileInfo {
        for provider in &self.providers {
            let info = provider.get_file_info(subpath);
            if info.exists {
                return info;
            }
        }
        FileInfo::not_found(
            subpath
                .replace('\\', "/")
                .rsplit('/')
                .next()
                .unwrap_or_default(),
        )
    }

    fn get_directory_contents(&self, subpath: &str) -> DirectoryContents {
        let mut exists = false;
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();
        for provider in &self.providers {
            let contents = provider.get_directory_contents(subpath);
            if !contents.exists {
                continue;
            }
            exists = true;
            for entry in contents.entries {
                if seen.insert(entry.name.clone()) {
                    entries.push(entry);
                }
            }
        }
        DirectoryContents { exists, entries }
    }

    /// Watches every provider and keeps the tokens that can actually fire.
    /// When none can, the shared no-op token is returned so callers can
    /// skip registration.
    fn watch(&self, filter: &str) -> Arc<dyn ChangeToken> {
        let live: Vec<Arc<dyn ChangeToken>> = self
            .providers
            .iter()
            .map(|provider| provider.watch(filter))
            .filter(|token| token.active_callbacks())
            .collect();
        if live.is_empty() {
            return NoopToken::shared();
        }
        Arc::new(CombinedChangeToken::new(live))
    }
}
