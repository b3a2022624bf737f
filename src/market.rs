//! Marketplace facade: the services wired together, with the caller's role
//! checked on every call.
use crate::accounts::Accounts;
use crate::catalog::{Catalog, NewProduct, ProductPatch};
use crate::config::MarketConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::model::{OrderView, Principal, Product};
use crate::orders::{OrderEngine, OrderRequest};
use crate::reporting::{OrderQuery, Reporting};
use crate::schema::{self, SchemaReport};
use crate::store::RecordStore;
use std::collections::BTreeMap;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Marketplace {
    store: RecordStore,
    catalog: Catalog,
    ledger: Ledger,
    reporting: Reporting,
    accounts: Accounts,
}

impl Marketplace {
    /// Opens the configured database and runs day-zero initialization.
    pub fn open(config: &MarketConfig) -> Result<(Self, SchemaReport)> {
        let store = RecordStore::open(&config.storage)?;
        let report = schema::initialize(&store, &config.seed)?;
        info!(path = %config.storage.path.display(), temporary = config.storage.temporary, "marketplace open");
        Ok((Self::new(store), report))
    }

    pub fn new(store: RecordStore) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            ledger: Ledger::new(store.clone()),
            reporting: Reporting::new(store.clone()),
            accounts: Accounts::new(store.clone()),
            store,
        }
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    fn engine(&self) -> OrderEngine {
        OrderEngine::new(
            self.store.clone(),
            self.catalog.clone(),
            self.ledger.clone(),
            Default::default(),
        )
    }

    #[instrument(skip(self, new), fields(user = %principal.username, product = %new.name))]
    pub fn add_product(&self, principal: &Principal, new: &NewProduct) -> Result<Product> {
        principal.require_admin()?;
        self.catalog.create(new)
    }

    #[instrument(skip(self, patch), fields(user = %principal.username))]
    pub fn update_product(
        &self,
        principal: &Principal,
        name: &str,
        patch: &ProductPatch,
    ) -> Result<Product> {
        principal.require_admin()?;
        self.catalog.update(name, patch)
    }

    #[instrument(skip(self), fields(user = %principal.username))]
    pub fn remove_product(&self, principal: &Principal, name: &str) -> Result<()> {
        principal.require_admin()?;
        self.catalog.delete(name)
    }

    /// `operation` is `"add"` or `"remove"`.
    #[instrument(skip(self), fields(user = %principal.username))]
    pub fn adjust_inventory(
        &self,
        principal: &Principal,
        name: &str,
        operation: &str,
        quantity: i64,
    ) -> Result<u64> {
        principal.require_admin()?;
        self.ledger.apply(name, operation, quantity)
    }

    pub fn stock(&self, principal: &Principal, name: &str) -> Result<u64> {
        principal.require_authenticated()?;
        self.ledger.get_stock(name)
    }

    pub fn products(&self, principal: &Principal, category: Option<&str>) -> Result<Vec<Product>> {
        principal.require_authenticated()?;
        self.catalog.get(category)
    }

    /// Places an order for the calling user.
    #[instrument(skip(self, items), fields(user = %principal.username))]
    pub fn place_order(
        &self,
        principal: &Principal,
        items: BTreeMap<String, i64>,
    ) -> Result<OrderView> {
        principal.require_authenticated()?;
        let request = OrderRequest {
            customer_id: principal.username.clone(),
            items,
        };
        self.engine().create_order(&request)
    }

    pub fn my_orders(&self, principal: &Principal) -> Result<Vec<OrderView>> {
        principal.require_authenticated()?;
        self.reporting.orders_by_customer(&principal.username)
    }

    #[instrument(skip(self), fields(user = %principal.username))]
    pub fn orders_for_admin(
        &self,
        principal: &Principal,
        query: &OrderQuery,
    ) -> Result<Vec<OrderView>> {
        principal.require_admin()?;
        self.reporting.orders_filtered(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use crate::model::Role;

    fn principal(username: &str, role: Role) -> Principal {
        Principal {
            username: username.into(),
            role,
        }
    }

    #[test]
    fn customers_cannot_touch_the_catalog() {
        let market = Marketplace::new(RecordStore::temporary().unwrap());
        let customer = principal("Nikhil", Role::Customer);
        let new = NewProduct::new("Handle", "Wood", 12, 20);

        assert!(matches!(
            market.add_product(&customer, &new),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.adjust_inventory(&customer, "Handle", "add", 1),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.orders_for_admin(&customer, &OrderQuery::default()),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.products(&customer, None),
            Err(MarketError::NoMatch { .. })
        ));
    }

    #[test]
    fn orders_are_placed_for_the_caller() {
        let market = Marketplace::new(RecordStore::temporary().unwrap());
        let admin = principal("root", Role::Admin);
        let customer = principal("Nikhil", Role::Customer);
        market
            .add_product(&admin, &NewProduct::new("Handle", "Wood", 12, 20))
            .unwrap();

        let view = market
            .place_order(&customer, BTreeMap::from([("Handle".to_string(), 2)]))
            .unwrap();
        assert_eq!(view.customer_id, "Nikhil");
        assert_eq!(market.my_orders(&customer).unwrap(), vec![view]);
        assert!(matches!(
            market.my_orders(&admin),
            Err(MarketError::NoMatch { .. })
        ));
        assert_eq!(market.stock(&customer, "Handle").unwrap(), 18);
    }

    #[test]
    fn nameless_callers_are_refused_everywhere() {
        let market = Marketplace::new(RecordStore::temporary().unwrap());
        let admin = principal("root", Role::Admin);
        market
            .add_product(&admin, &NewProduct::new("Handle", "Wood", 12, 20))
            .unwrap();
        let nobody = principal("", Role::Customer);

        assert!(matches!(
            market.products(&nobody, None),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.stock(&nobody, "Handle"),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.place_order(&nobody, BTreeMap::from([("Handle".to_string(), 1)])),
            Err(MarketError::Unauthorized(_))
        ));
        assert!(matches!(
            market.my_orders(&nobody),
            Err(MarketError::Unauthorized(_))
        ));
        assert_eq!(market.stock(&admin, "Handle").unwrap(), 20);
    }
}
