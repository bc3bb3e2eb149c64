use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::{Cadastre, Elevation, Orthophoto, Product};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown product '{name}' (available: {available})")]
    NotFound { name: String, available: String },
}

/// Registry mapping portal type tags to product implementations
#[derive(Clone, Default)]
pub struct ProductRegistry {
    products: BTreeMap<String, Arc<dyn Product>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, product: Arc<dyn Product>) {
        self.products.insert(product.name().to_string(), product);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Product>, RegistryError> {
        self.products
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.products.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.products.keys().map(String::as_str).collect()
    }

    /// Registry with every product the portal offers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Elevation));
        registry.register(Arc::new(Cadastre));
        registry.register(Arc::new(Orthophoto));
        registry
    }
}
