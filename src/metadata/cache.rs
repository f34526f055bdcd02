use super::{ErrorMetadata, ExceptionMetadata};
use crate::exception::{Descriptor, Exception, PropertyReader};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::any::TypeId;
use std::sync::Arc;

/// Thread-safe, process-lifetime cache of [`ExceptionMetadata`] keyed by type.
///
/// Entries are built lazily on first lookup. The fill goes through
/// `DashMap::entry`, which holds the shard lock while building, so at most one
/// build runs per type and every caller sees the same `Arc`.
///
/// An entry built without derived metadata (the error was wrapped with
/// [`Exception::new`]) is provisional: the first lookup that carries the
/// derive replaces it, together with the property reader. Later lookups of
/// the type, however wrapped, see the derived metadata.
///
/// Foreign error types (std, third-party) cannot carry the derive; give them
/// metadata with [`MetadataCache::declare`] while composing the application.
#[derive(Default)]
pub struct MetadataCache {
    entries: DashMap<TypeId, CachedEntry>,
    declarations: DashMap<TypeId, ExceptionMetadata>,
}

#[derive(Clone)]
struct CachedEntry {
    metadata: Arc<ExceptionMetadata>,
    reader: Option<PropertyReader>,
}

impl CachedEntry {
    fn is_derived(&self) -> bool {
        self.reader.is_some()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares metadata for a type that cannot derive it.
    pub fn declare<E: 'static>(&self, metadata: ExceptionMetadata) -> &Self {
        let type_id = TypeId::of::<E>();
        self.declarations.insert(type_id, metadata);
        // A declaration made after a lookup must not be shadowed by the empty entry.
        self.entries.remove_if(&type_id, |_, entry| !entry.is_derived());
        self
    }

    /// Fills the entry for a derived type up front.
    pub fn register<E: ErrorMetadata>(&self) -> &Self {
        self.get::<E>();
        self
    }

    /// Metadata for a statically known type.
    pub fn get<E: ErrorMetadata>(&self) -> Arc<ExceptionMetadata> {
        self.get_or_build(TypeId::of::<E>(), Some(Descriptor::of::<E>())).metadata
    }

    /// Metadata for a raised exception, keyed by its runtime type.
    pub fn for_exception(&self, exception: &Exception) -> Arc<ExceptionMetadata> {
        self.get_or_build(exception.type_id(), exception.descriptor()).metadata
    }

    /// Reads a mapped property, through the exception's own descriptor or the
    /// reader cached for its type.
    pub(crate) fn read_property(&self, exception: &Exception, source: &str) -> Option<serde_json::Result<Value>> {
        if exception.descriptor().is_some() {
            return exception.property_value(source);
        }
        let reader = self.entries.get(&exception.type_id())?.reader?;
        reader(exception.error(), source)
    }

    fn get_or_build(&self, type_id: TypeId, descriptor: Option<Descriptor>) -> CachedEntry {
        if let Some(entry) = self.entries.get(&type_id) {
            if entry.is_derived() || descriptor.is_none() {
                return entry.value().clone();
            }
        }
        match self.entries.entry(type_id) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_derived() {
                    if let Some(descriptor) = descriptor {
                        tracing::trace!(?type_id, "Replaced provisional exception metadata");
                        occupied.insert(self.build(type_id, Some(descriptor)));
                    }
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant.insert(self.build(type_id, descriptor)).value().clone(),
        }
    }

    fn build(&self, type_id: TypeId, descriptor: Option<Descriptor>) -> CachedEntry {
        let metadata = match descriptor {
            Some(descriptor) => (descriptor.metadata)(),
            None => self
                .declarations
                .get(&type_id)
                .map(|d| d.value().clone())
                .unwrap_or_default(),
        };
        tracing::trace!(?type_id, "Built exception metadata");
        CachedEntry {
            metadata: Arc::new(metadata),
            reader: descriptor.map(|d| d.read_property),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
