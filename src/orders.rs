//! Order engine: turns a basket into an order, its lines and the matching
//! stock deductions as one unit of work.
use crate::catalog::{Catalog, ProductReader};
use crate::error::{LogFailure, MarketError, Result};
use crate::ledger::{Ledger, StockLedger};
use crate::model::{Order, OrderLine, OrderView, TimeStamp};
use crate::store::{RecordStore, Tx, TxResult, abort};
use crate::utils::new_order_id;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// A checkout request. Items are visited in product-name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub customer_id: String,
    pub items: BTreeMap<String, i64>,
}

impl OrderRequest {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            items: BTreeMap::new(),
        }
    }

    /// Adds `quantity` of `product_name`, summing repeated products. Sums
    /// saturate, so an out-of-range total is rejected by the engine instead
    /// of wrapping.
    pub fn item(mut self, product_name: &str, quantity: i64) -> Self {
        let total = self.items.entry(product_name.to_string()).or_insert(0);
        *total = total.saturating_add(quantity);
        self
    }
}

/// Order and order-line writes from inside a caller's transaction.
pub trait OrderWriter {
    /// Writes a new order; aborts with `AlreadyExists` if the id is taken.
    fn begin_order(&self, tx: &Tx<'_>, order: &Order) -> TxResult<()>;
    /// Overwrites an order begun in the same transaction.
    fn write_order(&self, tx: &Tx<'_>, order: &Order) -> TxResult<()>;
    fn write_line(&self, tx: &Tx<'_>, line: &OrderLine) -> TxResult<()>;
}

/// Writes orders and lines straight to their collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBook;

impl OrderWriter for OrderBook {
    fn begin_order(&self, tx: &Tx<'_>, order: &Order) -> TxResult<()> {
        tx.insert(order)
    }

    fn write_order(&self, tx: &Tx<'_>, order: &Order) -> TxResult<()> {
        tx.put(order)
    }

    fn write_line(&self, tx: &Tx<'_>, line: &OrderLine) -> TxResult<()> {
        tx.insert(line)
    }
}

pub struct OrderEngine<C = Catalog, L = Ledger, W = OrderBook> {
    store: RecordStore,
    products: C,
    stock: L,
    writer: W,
}

impl OrderEngine {
    pub fn from_store(store: RecordStore) -> Self {
        OrderEngine::new(
            store.clone(),
            Catalog::new(store.clone()),
            Ledger::new(store),
            OrderBook,
        )
    }
}

impl<C, L, W> OrderEngine<C, L, W>
where
    C: ProductReader,
    L: StockLedger,
    W: OrderWriter,
{
    pub fn new(store: RecordStore, products: C, stock: L, writer: W) -> Self {
        Self {
            store,
            products,
            stock,
            writer,
        }
    }

    /// Places the order or changes nothing.
    ///
    /// Fails with `ProductNotFound` for an unknown product, `InvalidQuantity`
    /// for a quantity that is not positive or exceeds the stock, and
    /// `InvalidOperation` for an empty basket.
    #[instrument(skip(self, request), fields(customer = %request.customer_id, items = request.items.len()))]
    pub fn create_order(&self, request: &OrderRequest) -> Result<OrderView> {
        if request.items.is_empty() {
            return Err(MarketError::InvalidOperation(
                "an order needs at least one item".to_string(),
            ))
            .log_failure("create_order");
        }
        if let Some((name, &quantity)) = request.items.iter().find(|(_, q)| **q <= 0) {
            return Err(MarketError::invalid_quantity(name, quantity)).log_failure("create_order");
        }

        let order_id = new_order_id()?;
        let created_at = TimeStamp::new();

        let view = self
            .store
            .with_transaction(|tx| {
                let mut order = Order {
                    order_id: order_id.clone(),
                    customer_id: request.customer_id.clone(),
                    total_cost: 0,
                    created_at: created_at.clone(),
                };
                self.writer.begin_order(tx, &order)?;

                let mut lines = Vec::with_capacity(request.items.len());
                for (name, &requested) in &request.items {
                    lines.push(self.place_line(tx, &mut order, name, requested)?);
                }

                self.writer.write_order(tx, &order)?;
                Ok(OrderView::new(order, lines))
            })
            .log_failure("create_order")?;

        info!(order_id = %view.order_id, total_cost = view.total_cost, "order created");
        Ok(view)
    }

    fn place_line(
        &self,
        tx: &Tx<'_>,
        order: &mut Order,
        name: &str,
        requested: i64,
    ) -> TxResult<OrderLine> {
        let Some(product) = self.products.product_in(tx, name)? else {
            return abort(MarketError::ProductNotFound(name.to_string()));
        };
        let quantity = match u64::try_from(requested) {
            Ok(quantity) if quantity > 0 => quantity,
            _ => return abort(MarketError::invalid_quantity(name, requested)),
        };
        if self.stock.stock_in(tx, name)? < quantity {
            return abort(MarketError::invalid_quantity(name, requested));
        }

        let total = product
            .price
            .checked_mul(quantity)
            .and_then(|cost| order.total_cost.checked_add(cost));
        let Some(total) = total else {
            return abort(MarketError::invalid_quantity(name, requested));
        };
        order.total_cost = total;

        let line = OrderLine {
            order_id: order.order_id.clone(),
            product_name: name.to_string(),
            quantity,
        };
        self.writer.write_line(tx, &line)?;
        self.stock.adjust_in(tx, name, -requested)?;
        Ok(line)
    }
}
