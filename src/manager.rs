// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cached access to binding trees
//!
//! [`BindingManager`] builds a binding tree the first time a descriptor is
//! requested and serves the cached tree afterwards. File descriptors are keyed
//! by canonical path and rebuilt when their modification time changes; inline
//! descriptors are keyed by a caller supplied name.

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path as FsPath, PathBuf};
use std::time::SystemTime;

use crate::backend::DataModel;
use crate::binding::BindingRef;
use crate::builder::DescriptorBuilder;
use crate::config::BindingConfig;
use crate::error::{BindingError, BindingResult};
use crate::model::Widget;
use crate::path::PathContext;

/// Where a binding descriptor comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// Descriptor file on disk
    File(PathBuf),
    /// Descriptor text held by the caller, cached under `key`
    Inline { key: String, text: String },
}

impl DescriptorSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Inline {
            key: key.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Inline { key, .. } => write!(f, "inline:{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    File(PathBuf),
    Inline(String),
}

struct CacheEntry {
    binding: BindingRef,
    modified: Option<SystemTime>,
}

/// Descriptor cache counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the cache
    pub hits: u64,
    /// Requests that had to build a tree
    pub misses: u64,
    /// Misses caused by a changed descriptor file
    pub reloads: u64,
    /// Trees currently cached
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio as a percentage
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct DescriptorCache {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// Builds, caches and runs binding trees
///
/// # Examples
///
/// ```rust
/// use cforms_binding::backend::XmlDocument;
/// use cforms_binding::manager::{BindingManager, DescriptorSource};
/// use cforms_binding::model::{Field, Group, Value, Widget};
///
/// let manager = BindingManager::with_defaults();
/// let source = DescriptorSource::inline(
///     "person",
///     r#"<fb:value xmlns:fb="http://apache.org/cocoon/forms/1.0#binding" id="name" path="name"/>"#,
/// );
/// let mut model = XmlDocument::parse("person.xml", "<person><name>Ann</name></person>").unwrap();
/// let mut form: Widget = Group::new("form").with(Field::new("name")).into();
///
/// manager.load_form(&source, &mut form, &mut model).unwrap();
/// assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("Ann")));
/// assert_eq!(manager.cache_stats().misses, 1);
/// ```
pub struct BindingManager {
    builder: DescriptorBuilder,
    config: BindingConfig,
    cache: Mutex<DescriptorCache>,
}

impl fmt::Debug for BindingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingManager")
            .field("builder", &self.builder)
            .field("config", &self.config)
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl BindingManager {
    /// Manager with the built-in builders and the configured default locale
    pub fn new(config: BindingConfig) -> BindingResult<Self> {
        let builder = DescriptorBuilder::new().with_default_locale(config.locale()?);
        Ok(Self::with_builder(builder, config))
    }

    /// Manager with the default configuration
    pub fn with_defaults() -> Self {
        Self::with_builder(DescriptorBuilder::new(), BindingConfig::default())
    }

    /// Manager around an application configured builder
    pub fn with_builder(builder: DescriptorBuilder, config: BindingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            builder,
            config,
            cache: Mutex::new(DescriptorCache {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn builder(&self) -> &DescriptorBuilder {
        &self.builder
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// The binding tree of a descriptor, built on first use
    pub fn create_binding(&self, source: &DescriptorSource) -> BindingResult<BindingRef> {
        let (key, modified) = match source {
            DescriptorSource::File(path) => {
                let canonical = canonical_path(path)?;
                let modified = if self.config.check_file_modification {
                    modification_time(&canonical)?
                } else {
                    None
                };
                (CacheKey::File(canonical), modified)
            }
            DescriptorSource::Inline { key, .. } => (CacheKey::Inline(key.clone()), None),
        };

        let mut cache = self.cache.lock();
        let mut stale = false;
        if let Some(entry) = cache.entries.get(&key) {
            if entry.modified == modified {
                let binding = entry.binding.clone();
                cache.stats.hits += 1;
                log::debug!("Binding cache hit for '{}'", source);
                return Ok(binding);
            }
            stale = true;
        }

        cache.stats.misses += 1;
        if stale {
            cache.stats.reloads += 1;
            log::debug!("Descriptor '{}' changed, rebuilding", source);
        }
        let binding = match source {
            DescriptorSource::Inline { key, text } => self.builder.build_from_str(key, text)?,
            DescriptorSource::File(path) => self.builder.build_from_file(path)?,
        };
        let entry = CacheEntry {
            binding: binding.clone(),
            modified,
        };
        if let Some((evicted, _)) = cache.entries.push(key.clone(), entry) {
            if evicted != key {
                log::debug!("Evicted binding {:?} from the cache", evicted);
            }
        }
        Ok(binding)
    }

    /// Load `form` from `model` with the binding of `source`
    pub fn load_form(
        &self,
        source: &DescriptorSource,
        form: &mut Widget,
        model: &mut dyn DataModel,
    ) -> BindingResult<()> {
        let binding = self.create_binding(source)?;
        let mut context = PathContext::new(model);
        context.set_lenient(self.config.lenient_by_default);
        binding.load(form, &mut context)
    }

    /// Save `form` into `model` with the binding of `source`
    pub fn save_form(
        &self,
        source: &DescriptorSource,
        form: &Widget,
        model: &mut dyn DataModel,
    ) -> BindingResult<()> {
        let binding = self.create_binding(source)?;
        let mut context = PathContext::new(model);
        context.set_lenient(self.config.lenient_by_default);
        binding.save(form, &mut context)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            entries: cache.entries.len(),
            ..cache.stats.clone()
        }
    }

    /// Drop every cached tree and reset the counters
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.stats = CacheStats::default();
    }
}

fn canonical_path(path: &FsPath) -> BindingResult<PathBuf> {
    path.canonicalize().map_err(|cause| BindingError::Io {
        descriptor: path.display().to_string(),
        cause,
    })
}

fn modification_time(path: &FsPath) -> BindingResult<Option<SystemTime>> {
    let metadata = std::fs::metadata(path).map_err(|cause| BindingError::Io {
        descriptor: path.display().to_string(),
        cause,
    })?;
    Ok(metadata.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::XmlDocument;
    use crate::model::{Field, Group, Value};
    use std::fs::File;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    const NAME_BINDING: &str =
        r#"<fb:value xmlns:fb="http://apache.org/cocoon/forms/1.0#binding" id="name" path="name"/>"#;
    const TITLE_BINDING: &str =
        r#"<fb:value xmlns:fb="http://apache.org/cocoon/forms/1.0#binding" id="name" path="title"/>"#;

    fn form() -> Widget {
        Group::new("form").with(Field::new("name")).into()
    }

    #[test]
    fn test_inline_sources_are_cached_by_key() {
        let manager = BindingManager::with_defaults();
        let source = DescriptorSource::inline("person", NAME_BINDING);

        let first = manager.create_binding(&source).unwrap();
        let second = manager.create_binding(&source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = manager.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_ratio(), 50.0);

        manager.clear_cache();
        assert_eq!(manager.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_file_sources_rebuild_after_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binding.xml");
        std::fs::write(&path, NAME_BINDING).unwrap();
        let manager = BindingManager::with_defaults();
        let source = DescriptorSource::file(&path);

        let mut model = XmlDocument::parse("m.xml", "<doc><name>Ann</name><title>Dr</title></doc>").unwrap();
        let mut form = form();
        manager.load_form(&source, &mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("Ann")));

        let mut file = File::options().write(true).truncate(true).open(&path).unwrap();
        file.write_all(TITLE_BINDING.as_bytes()).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
        drop(file);

        manager.load_form(&source, &mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), Some(Value::from("Dr")));
        let stats = manager.cache_stats();
        assert_eq!((stats.misses, stats.reloads, stats.entries), (2, 1, 1));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let manager = BindingManager::with_defaults();
        let err = manager
            .create_binding(&DescriptorSource::file("/nonexistent/binding.xml"))
            .unwrap_err();
        assert!(matches!(err, BindingError::Io { .. }));
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let config = BindingConfig {
            cache_capacity: 1,
            ..BindingConfig::default()
        };
        let manager = BindingManager::new(config).unwrap();
        manager.create_binding(&DescriptorSource::inline("a", NAME_BINDING)).unwrap();
        manager.create_binding(&DescriptorSource::inline("b", TITLE_BINDING)).unwrap();
        manager.create_binding(&DescriptorSource::inline("a", NAME_BINDING)).unwrap();

        let stats = manager.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (0, 3, 1));
    }

    #[test]
    fn test_strict_configuration_reports_missing_paths() {
        let config = BindingConfig {
            lenient_by_default: false,
            ..BindingConfig::default()
        };
        let manager = BindingManager::new(config).unwrap();
        let source = DescriptorSource::inline("person", NAME_BINDING);
        let mut model = XmlDocument::parse("m.xml", "<doc/>").unwrap();

        let mut form = form();
        assert!(manager.load_form(&source, &mut form, &mut model).is_err());

        let lenient = BindingManager::with_defaults();
        lenient.load_form(&source, &mut form, &mut model).unwrap();
        assert_eq!(form.lookup("name").and_then(Widget::value), None);
    }
}
