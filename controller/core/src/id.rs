use std::fmt;

/// Identifies a namespaced resource.
///
/// Formats as `namespace/name`. Names containing `/` are not disambiguated.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses a `namespace/name` key.
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, name) = key.split_once('/')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(namespace, name))
    }

    /// Resolves a reference that may or may not carry its own namespace.
    pub fn qualify(reference: &str, default_namespace: &str) -> Self {
        Self::parse(reference).unwrap_or_else(|| Self::new(default_namespace, reference))
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
