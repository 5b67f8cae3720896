use std::collections::HashMap;

/// Image-metadata collaborator: looks up the default command recorded for a
/// container image.
///
/// Consulted only for steps that declare neither `command` nor `script`. The
/// real implementation lives outside this crate (it talks to registries and
/// caches digests); the assembler only depends on this interface.
pub trait EntrypointCache: Send + Sync {
    /// Default command for `image`, or a reason the lookup failed.
    fn lookup(&self, image: &str) -> Result<Vec<String>, String>;
}

/// In-memory cache for tests and embedding.
#[derive(Default)]
pub struct StaticEntrypointCache {
    entries: HashMap<String, Vec<String>>,
}

impl StaticEntrypointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the default command for an image reference.
    pub fn insert<I, S>(&mut self, image: impl Into<String>, command: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(image.into(), command.into_iter().map(Into::into).collect());
    }
}

impl EntrypointCache for StaticEntrypointCache {
    fn lookup(&self, image: &str) -> Result<Vec<String>, String> {
        self.entries
            .get(image)
            .cloned()
            .ok_or_else(|| format!("image '{image}' not present in cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::{EntrypointCache, StaticEntrypointCache};

    #[test]
    fn static_cache_returns_recorded_command() {
        let mut cache = StaticEntrypointCache::new();
        cache.insert("bash", ["/bin/bash"]);
        assert_eq!(cache.lookup("bash").unwrap(), vec!["/bin/bash"]);
    }

    #[test]
    fn missing_image_is_a_lookup_failure() {
        let cache = StaticEntrypointCache::new();
        assert!(cache.lookup("unknown").is_err());
    }
}
