use ahash::AHashMap as HashMap;
use vsync_controller_core::ResourceId;

/// The latest version of each watched object of a single kind.
#[derive(Debug)]
pub struct ObjectCache<T> {
    kind: &'static str,
    objects: HashMap<ResourceId, T>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {id} not found")]
pub struct NotFound {
    pub kind: &'static str,
    pub id: ResourceId,
}

// === impl ObjectCache ===

impl<T> ObjectCache<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            objects: HashMap::default(),
        }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Result<&T, NotFound> {
        let id = ResourceId::new(namespace, name);
        match self.objects.get(&id) {
            Some(obj) => Ok(obj),
            None => Err(NotFound {
                kind: self.kind,
                id,
            }),
        }
    }

    pub fn insert(&mut self, namespace: impl Into<String>, name: impl Into<String>, obj: T) {
        self.objects.insert(ResourceId::new(namespace, name), obj);
    }

    pub fn remove(&mut self, namespace: &str, name: &str) -> Option<T> {
        self.objects.remove(&ResourceId::new(namespace, name))
    }
}
