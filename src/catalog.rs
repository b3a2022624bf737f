//! Product catalog with its paired inventory records
use crate::error::{LogFailure, MarketError, Result};
use crate::model::{InventoryRecord, Product};
use crate::record::{Filter, Patch, SortBy};
use crate::store::{RecordStore, Tx, TxResult, abort, aborting};
use tracing::{info, instrument};

/// Read access to products from inside a caller's transaction.
pub trait ProductReader {
    fn product_in(&self, tx: &Tx<'_>, name: &str) -> TxResult<Option<Product>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub price: u64,
    pub initial_quantity: i64,
}

impl NewProduct {
    pub fn new(name: &str, category: &str, price: u64, initial_quantity: i64) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            price,
            initial_quantity,
        }
    }
}

/// Partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub category: Option<String>,
    pub price: Option<u64>,
}

impl ProductPatch {
    fn to_patch(&self) -> Patch {
        let mut patch = Patch::new();
        if let Some(category) = &self.category {
            patch = patch.set("category", category);
        }
        if let Some(price) = self.price {
            patch = patch.set("price", price);
        }
        patch
    }
}

#[derive(Clone)]
pub struct Catalog {
    store: RecordStore,
}

impl Catalog {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Creates the product and its inventory record in one transaction.
    #[instrument(skip(self), fields(product = %new.name))]
    pub fn create(&self, new: &NewProduct) -> Result<Product> {
        if new.initial_quantity < 0 {
            return Err(MarketError::invalid_quantity(&new.name, new.initial_quantity))
                .log_failure("create_product");
        }
        let product = Product {
            name: new.name.clone(),
            category: new.category.clone(),
            price: new.price,
        };
        let stock = InventoryRecord {
            product_name: new.name.clone(),
            quantity_in_stock: new.initial_quantity.unsigned_abs(),
        };

        self.store
            .with_transaction(|tx| {
                if tx.get::<Product>(product.name.as_bytes())?.is_some() {
                    return abort(MarketError::ProductAlreadyExists(product.name.clone()));
                }
                tx.insert(&product)?;
                tx.put(&stock)
            })
            .log_failure("create_product")?;

        info!(stock = stock.quantity_in_stock, "product created");
        Ok(product)
    }

    /// Returns the product as stored after the update. An empty patch is a
    /// no-op that still requires the product to exist. The read and the
    /// write share one transaction, so a concurrent delete cannot be undone.
    #[instrument(skip(self))]
    pub fn update(&self, name: &str, patch: &ProductPatch) -> Result<Product> {
        let patch = patch.to_patch();
        patch.validate::<Product>().log_failure("update_product")?;

        let product = self
            .store
            .with_transaction(|tx| {
                let Some(mut product) = tx.get::<Product>(name.as_bytes())? else {
                    return abort(MarketError::ProductNotFound(name.to_string()));
                };
                if !patch.is_empty() {
                    aborting(patch.apply(&mut product))?;
                    tx.put(&product)?;
                }
                Ok(product)
            })
            .log_failure("update_product")?;
        if !patch.is_empty() {
            info!(price = product.price, category = %product.category, "product updated");
        }
        Ok(product)
    }

    /// Deletes the product together with its inventory record. Order lines
    /// that name the product are kept as history.
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Result<()> {
        self.store
            .with_transaction(|tx| {
                if !tx.remove::<Product>(name.as_bytes())? {
                    return abort(MarketError::ProductNotFound(name.to_string()));
                }
                tx.remove::<InventoryRecord>(name.as_bytes())?;
                Ok(())
            })
            .log_failure("delete_product")?;
        info!("product deleted");
        Ok(())
    }

    /// All products, optionally of one category, ordered by name.
    #[instrument(skip(self))]
    pub fn get(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let filter = match category {
            Some(category) => Filter::new().eq("category", category),
            None => Filter::new(),
        };
        self.store
            .get_many(&filter, Some(&SortBy::asc("name")))
            .log_failure("get_products")
    }

    pub fn get_product(&self, name: &str) -> Result<Product> {
        match self.store.get_one::<Product>(&Filter::new().eq("name", name)) {
            Err(MarketError::NotFound { .. }) => Err(MarketError::ProductNotFound(name.to_string())),
            other => other,
        }
        .log_failure("get_product")
    }
}

impl ProductReader for Catalog {
    fn product_in(&self, tx: &Tx<'_>, name: &str) -> TxResult<Option<Product>> {
        tx.get::<Product>(name.as_bytes())
    }
}
