//! Read-side joins of orders with their lines
use crate::error::{LogFailure, MarketError, Result};
use crate::model::{Order, OrderLine, OrderView};
use crate::record::{Filter, SortBy};
use crate::store::RecordStore;
use std::str::FromStr;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    TotalCost,
    OrderId,
    CustomerId,
}

impl OrderSortField {
    pub fn field_name(self) -> &'static str {
        match self {
            OrderSortField::CreatedAt => "created_at",
            OrderSortField::TotalCost => "total_cost",
            OrderSortField::OrderId => "order_id",
            OrderSortField::CustomerId => "customer_id",
        }
    }
}

/// Sort order for [`Reporting::orders_filtered`], written as
/// `"<field> [asc|desc]"`. An empty string sorts by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderSort {
    pub field: OrderSortField,
    pub descending: bool,
}

impl OrderSort {
    fn to_sort_by(self) -> SortBy {
        if self.descending {
            SortBy::desc(self.field.field_name())
        } else {
            SortBy::asc(self.field.field_name())
        }
    }
}

impl FromStr for OrderSort {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let field = match words.next() {
            None => return Ok(OrderSort::default()),
            Some("created_at") => OrderSortField::CreatedAt,
            Some("total_cost") => OrderSortField::TotalCost,
            Some("order_id") => OrderSortField::OrderId,
            Some("customer_id") => OrderSortField::CustomerId,
            Some(other) => {
                return Err(MarketError::InvalidOperation(format!(
                    "cannot sort orders by {other:?}"
                )));
            }
        };
        let descending = match words.next() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(MarketError::InvalidOperation(format!(
                    "unknown sort direction {other:?}"
                )));
            }
        };
        if let Some(extra) = words.next() {
            return Err(MarketError::InvalidOperation(format!(
                "unexpected {extra:?} in sort"
            )));
        }
        Ok(OrderSort { field, descending })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub customer_id: Option<String>,
    /// Keep only orders with a line for this product.
    pub product_name: Option<String>,
    pub sort: OrderSort,
}

#[derive(Clone)]
pub struct Reporting {
    store: RecordStore,
}

impl Reporting {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Every order of `customer_id`, oldest first; `NoMatch` if there are none.
    #[instrument(skip(self))]
    pub fn orders_by_customer(&self, customer_id: &str) -> Result<Vec<OrderView>> {
        let orders = self
            .store
            .get_many::<Order>(
                &Filter::new().eq("customer_id", customer_id),
                Some(&SortBy::asc("created_at")),
            )
            .log_failure("orders_by_customer")?;
        self.join_lines(orders).log_failure("orders_by_customer")
    }

    /// Orders matching every given filter, in the requested order. Nothing
    /// matching is an empty list, not an error.
    #[instrument(skip(self))]
    pub fn orders_filtered(&self, query: &OrderQuery) -> Result<Vec<OrderView>> {
        let filter = match &query.customer_id {
            Some(customer_id) => Filter::new().eq("customer_id", customer_id),
            None => Filter::new(),
        };
        let orders = self
            .store
            .find::<Order>(&filter, Some(&query.sort.to_sort_by()))
            .log_failure("orders_filtered")?;

        let mut views = self.join_lines(orders).log_failure("orders_filtered")?;
        if let Some(product) = &query.product_name {
            views.retain(|view| view.contains(product));
        }
        debug!(matched = views.len(), "orders filtered");
        Ok(views)
    }

    fn join_lines(&self, orders: Vec<Order>) -> Result<Vec<OrderView>> {
        orders
            .into_iter()
            .map(|order| {
                let lines = self.store.find::<OrderLine>(
                    &Filter::new().eq("order_id", order.order_id.as_str()),
                    None,
                )?;
                Ok(OrderView::new(order, lines))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeStamp;

    fn order(
        id: &str,
        customer: &str,
        total_cost: u64,
        minute: u32,
        lines: &[(&str, u64)],
    ) -> (Order, Vec<OrderLine>) {
        let order = Order {
            order_id: id.into(),
            customer_id: customer.into(),
            total_cost,
            created_at: TimeStamp::new_with(2024, 6, 15, 10, minute, 0).unwrap(),
        };
        let lines = lines
            .iter()
            .map(|(product, quantity)| OrderLine {
                order_id: id.into(),
                product_name: (*product).into(),
                quantity: *quantity,
            })
            .collect();
        (order, lines)
    }

    fn reporting() -> Reporting {
        let store = RecordStore::temporary().unwrap();
        for (order, lines) in [
            order("o3", "Nikhil", 30, 20, &[("Knob", 1)]),
            order("o1", "Nikhil", 24, 5, &[("Handle", 2)]),
            order("o2", "Asha", 54, 10, &[("Handle", 2), ("Knob", 1)]),
        ] {
            store.create(&order).unwrap();
            for line in &lines {
                store.create(line).unwrap();
            }
        }
        Reporting::new(store)
    }

    fn ids(views: &[OrderView]) -> Vec<&str> {
        views.iter().map(|v| v.order_id.as_str()).collect()
    }

    #[test]
    fn sort_parses_field_and_direction() {
        assert_eq!("".parse::<OrderSort>().unwrap(), OrderSort::default());
        assert_eq!(
            "total_cost desc".parse::<OrderSort>().unwrap(),
            OrderSort {
                field: OrderSortField::TotalCost,
                descending: true
            }
        );
        assert!(!"order_id asc".parse::<OrderSort>().unwrap().descending);
        assert!(matches!(
            "price".parse::<OrderSort>(),
            Err(MarketError::InvalidOperation(_))
        ));
        assert!("created_at sideways".parse::<OrderSort>().is_err());
    }

    #[test]
    fn customer_orders_are_oldest_first_with_lines() {
        let reporting = reporting();
        let views = reporting.orders_by_customer("Nikhil").unwrap();
        assert_eq!(ids(&views), ["o1", "o3"]);
        assert_eq!(views[0].lines, vec![("Handle".to_string(), 2)]);
        assert_eq!(views, reporting.orders_by_customer("Nikhil").unwrap());

        assert!(matches!(
            reporting.orders_by_customer("Ghost"),
            Err(MarketError::NoMatch { .. })
        ));
    }

    #[test]
    fn filtered_combines_customer_product_and_sort() {
        let reporting = reporting();
        let all_by_cost = reporting
            .orders_filtered(&OrderQuery {
                sort: "total_cost desc".parse().unwrap(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&all_by_cost), ["o2", "o3", "o1"]);

        let with_knob = reporting
            .orders_filtered(&OrderQuery {
                product_name: Some("Knob".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&with_knob), ["o2", "o3"]);

        let nikhil_handles = reporting
            .orders_filtered(&OrderQuery {
                customer_id: Some("Nikhil".into()),
                product_name: Some("Handle".into()),
                sort: OrderSort::default(),
            })
            .unwrap();
        assert_eq!(ids(&nikhil_handles), ["o1"]);

        let none = reporting
            .orders_filtered(&OrderQuery {
                customer_id: Some("Asha".into()),
                product_name: Some("Hinge".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }
}
