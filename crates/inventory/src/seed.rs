//! Reset fixtures: the products `reset_inventory` restores.

use core::str::FromStr;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stocklock_core::{DomainError, DomainResult, ProductId};

use crate::product::Product;

/// One seeded stock-keeping unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedProduct {
    pub id: ProductId,
    pub name: String,
    pub stock: i64,
}

impl SeedProduct {
    pub fn new(id: i64, name: impl Into<String>, stock: i64) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            stock,
        }
    }

    /// The product as it looks right after a reset (`version = 1`).
    pub fn to_product(&self) -> DomainResult<Product> {
        Product::new(self.id, self.name.clone(), self.stock)
    }
}

/// Set of seed products, unique by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCatalog {
    products: Vec<SeedProduct>,
}

impl SeedCatalog {
    pub fn new(products: Vec<SeedProduct>) -> DomainResult<Self> {
        let mut seen = HashSet::new();
        for p in &products {
            if !seen.insert(p.id) {
                return Err(DomainError::validation(format!("duplicate seed product id {}", p.id)));
            }
            if p.name.trim().is_empty() {
                return Err(DomainError::validation("seed product name cannot be empty"));
            }
            if p.stock < 0 {
                return Err(DomainError::validation(format!(
                    "seed product {} has negative stock",
                    p.id
                )));
            }
        }
        Ok(Self { products })
    }

    pub fn products(&self) -> &[SeedProduct] {
        &self.products
    }

    /// Seeded products in id order.
    pub fn to_products(&self) -> DomainResult<Vec<Product>> {
        let mut out = self
            .products
            .iter()
            .map(SeedProduct::to_product)
            .collect::<DomainResult<Vec<_>>>()?;
        out.sort_by_key(|p| p.id_typed());
        Ok(out)
    }
}

impl Default for SeedCatalog {
    fn default() -> Self {
        Self {
            products: vec![
                SeedProduct::new(1, "Super Widget", 100),
                SeedProduct::new(2, "Mega Gadget", 50),
            ],
        }
    }
}

/// Parses `id:name:stock` entries separated by `;`,
/// e.g. `1:Super Widget:100;2:Mega Gadget:50`.
impl FromStr for SeedCatalog {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut products = Vec::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(id), Some(name), Some(stock)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(DomainError::validation(format!(
                    "seed entry '{entry}' must look like id:name:stock"
                )));
            };
            let id: ProductId = id.parse()?;
            let stock = stock
                .trim()
                .parse::<i64>()
                .map_err(|e| DomainError::validation(format!("seed stock '{stock}': {e}")))?;
            products.push(SeedProduct {
                id,
                name: name.trim().to_string(),
                stock,
            });
        }
        Self::new(products)
    }
}
