//! Inventory ledger: stock per product, never negative.
use crate::error::{LogFailure, MarketError, Result};
use crate::model::{InventoryRecord, Product};
use crate::record::Filter;
use crate::store::{RecordStore, Tx, TxResult, abort, aborting};
use std::str::FromStr;
use tracing::{info, instrument};

/// Stock access that runs inside a caller's transaction, so the read and
/// the write of a stock level commit together with the caller's other writes.
pub trait StockLedger {
    /// Current stock; aborts with `NotFound` if the product has no record.
    fn stock_in(&self, tx: &Tx<'_>, product_name: &str) -> TxResult<u64>;

    /// Applies `delta` and returns the new stock. Aborts with
    /// `InvalidQuantity` instead of going below zero.
    fn adjust_in(&self, tx: &Tx<'_>, product_name: &str, delta: i64) -> TxResult<u64>;
}

/// Named stock adjustment as submitted by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOperation {
    Add,
    Remove,
}

impl FromStr for StockOperation {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(StockOperation::Add),
            "remove" => Ok(StockOperation::Remove),
            other => Err(MarketError::InvalidOperation(format!(
                "unknown stock operation {other:?}, expected \"add\" or \"remove\""
            ))),
        }
    }
}

/// `current + delta`, or `InvalidQuantity` if that is negative or overflows.
pub fn adjusted(product_name: &str, current: u64, delta: i64) -> Result<u64> {
    let next = i128::from(current) + i128::from(delta);
    u64::try_from(next).map_err(|_| MarketError::invalid_quantity(product_name, delta))
}

#[derive(Clone)]
pub struct Ledger {
    store: RecordStore,
}

impl Ledger {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub fn get_stock(&self, product_name: &str) -> Result<u64> {
        self.store
            .get_one::<InventoryRecord>(&Filter::new().eq("product_name", product_name))
            .map(|record| record.quantity_in_stock)
            .log_failure("get_stock")
    }

    /// Standalone restock (`delta > 0`) or withdrawal (`delta < 0`).
    #[instrument(skip(self))]
    pub fn adjust_stock(&self, product_name: &str, delta: i64) -> Result<u64> {
        let stock = self
            .store
            .with_transaction(|tx| self.adjust_in(tx, product_name, delta))
            .log_failure("adjust_stock")?;
        info!(stock, "stock adjusted");
        Ok(stock)
    }

    /// Adjust by a named operation. The product must exist and `quantity`
    /// must not be negative.
    #[instrument(skip(self))]
    pub fn apply(&self, product_name: &str, operation: &str, quantity: i64) -> Result<u64> {
        let operation = operation
            .parse::<StockOperation>()
            .log_failure("apply_stock")?;
        if quantity < 0 {
            return Err(MarketError::invalid_quantity(product_name, quantity))
                .log_failure("apply_stock");
        }
        let delta = match operation {
            StockOperation::Add => quantity,
            StockOperation::Remove => -quantity,
        };

        let stock = self
            .store
            .with_transaction(|tx| {
                if tx.get::<Product>(product_name.as_bytes())?.is_none() {
                    return abort(MarketError::ProductNotFound(product_name.to_string()));
                }
                self.adjust_in(tx, product_name, delta)
            })
            .log_failure("apply_stock")?;
        info!(stock, ?operation, "stock adjusted");
        Ok(stock)
    }
}

impl StockLedger for Ledger {
    fn stock_in(&self, tx: &Tx<'_>, product_name: &str) -> TxResult<u64> {
        match tx.get::<InventoryRecord>(product_name.as_bytes())? {
            Some(record) => Ok(record.quantity_in_stock),
            None => abort(MarketError::NotFound {
                collection: "inventory",
            }),
        }
    }

    fn adjust_in(&self, tx: &Tx<'_>, product_name: &str, delta: i64) -> TxResult<u64> {
        let current = self.stock_in(tx, product_name)?;
        let quantity_in_stock = aborting(adjusted(product_name, current, delta))?;
        tx.put(&InventoryRecord {
            product_name: product_name.to_string(),
            quantity_in_stock,
        })?;
        Ok(quantity_in_stock)
    }
}
