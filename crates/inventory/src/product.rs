use serde::{Deserialize, Serialize};

use stocklock_core::{DomainError, DomainResult, ProductId, Versioned};

/// Product (one stock-keeping unit).
///
/// `stock` never goes below zero: every decrement is checked before it is
/// applied. `version` is owned by the store, which bumps it on each write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    stock: i64,
    version: i64,
}

impl Product {
    /// A freshly seeded product (`version = 1`).
    pub fn new(id: ProductId, name: impl Into<String>, stock: i64) -> DomainResult<Self> {
        Self::restore(id, name, stock, 1)
    }

    /// Rebuild a product from persisted state.
    pub fn restore(
        id: ProductId,
        name: impl Into<String>,
        stock: i64,
        version: i64,
    ) -> DomainResult<Self> {
        if stock < 0 {
            return Err(DomainError::invariant("stock cannot be negative"));
        }
        if version < 1 {
            return Err(DomainError::invariant("version must start at 1"));
        }
        Ok(Self {
            id,
            name: name.into(),
            stock,
            version,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    /// Fails with an invariant violation if `quantity` exceeds the stock on hand.
    pub fn ensure_can_fulfil(&self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.stock < quantity {
            return Err(DomainError::invariant(format!(
                "insufficient stock: requested {quantity}, available {}",
                self.stock
            )));
        }
        Ok(())
    }

    /// Copy of this product with `quantity` removed from stock.
    ///
    /// The version is left untouched; the store assigns the next one on write.
    pub fn decremented(&self, quantity: i64) -> DomainResult<Self> {
        self.ensure_can_fulfil(quantity)?;
        Ok(Self {
            stock: self.stock - quantity,
            ..self.clone()
        })
    }

    /// Same fields, stamped with the version the store assigned on write.
    pub fn with_version(self, version: i64) -> Self {
        Self { version, ..self }
    }
}

impl Versioned for Product {
    fn version(&self) -> i64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(stock: i64) -> Product {
        Product::new(ProductId::new(1), "Super Widget", stock).unwrap()
    }

    #[test]
    fn new_product_starts_at_version_one() {
        let p = widget(100);
        assert_eq!(p.version(), 1);
        assert_eq!(p.stock(), 100);
        assert_eq!(p.name(), "Super Widget");
    }

    #[test]
    fn negative_stock_is_rejected_on_restore() {
        let err = Product::restore(ProductId::new(1), "x", -1, 1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn decrement_keeps_version_and_reduces_stock() {
        let p = widget(100).decremented(30).unwrap();
        assert_eq!(p.stock(), 70);
        assert_eq!(p.version(), 1);
        assert_eq!(p.with_version(2).version(), 2);
    }

    #[test]
    fn decrement_to_exactly_zero_is_allowed() {
        let p = widget(5).decremented(5).unwrap();
        assert_eq!(p.stock(), 0);
    }

    #[test]
    fn oversized_decrement_is_rejected() {
        let err = widget(5).decremented(10).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn non_positive_quantity_is_a_validation_error() {
        assert!(matches!(
            widget(5).ensure_can_fulfil(0),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            widget(5).ensure_can_fulfil(-3),
            Err(DomainError::Validation(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a sequence of decrements never drives stock below zero,
            /// and the accepted quantities account for the whole difference.
            #[test]
            fn stock_never_negative(
                initial in 0i64..500,
                quantities in proptest::collection::vec(1i64..60, 0..40)
            ) {
                let mut product = widget(initial);
                let mut fulfilled = 0;
                for q in quantities {
                    if let Ok(next) = product.decremented(q) {
                        fulfilled += q;
                        let version = next.version() + 1;
                        product = next.with_version(version);
                    }
                    prop_assert!(product.stock() >= 0);
                }
                prop_assert_eq!(product.stock(), initial - fulfilled);
            }
        }
    }
}
