use anyhow::Context;
use market::catalog::NewProduct;
use market::config::MarketConfig;
use market::reporting::OrderQuery;
use market::telemetry::setup_tracing;
use market::Marketplace;
use std::collections::BTreeMap;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let config = MarketConfig::load().context("loading configuration")?;
    setup_tracing(&config.log_level.0);

    let (market, report) = Marketplace::open(&config).context("opening marketplace")?;
    info!(?report, "startup complete");

    // demo walk-through against whatever the configured store holds
    let accounts = market.accounts();
    if accounts.user("demo-admin").is_err() {
        accounts.register("demo-admin", "admin@example.com", Vec::new())?;
        accounts.grant_admin("demo-admin")?;
    }
    if accounts.user("Nikhil").is_err() {
        accounts.register("Nikhil", "nikhil@example.com", Vec::new())?;
    }
    let admin = accounts.principal("demo-admin")?;
    let customer = accounts.principal("Nikhil")?;

    if market.stock(&admin, "Handle").is_err() {
        market.add_product(&admin, &NewProduct::new("Handle", "Wood", 12, 20))?;
    }

    match market.place_order(&customer, BTreeMap::from([("Handle".to_string(), 2)])) {
        Ok(order) => info!(
            order_id = %order.order_id,
            total_cost = order.total_cost,
            "order placed"
        ),
        Err(err) => error!(reason = %err.public_message(), "order rejected"),
    }

    let orders = market.orders_for_admin(&admin, &OrderQuery::default())?;
    info!(
        orders = orders.len(),
        stock = market.stock(&admin, "Handle")?,
        "inventory after demo"
    );
    Ok(())
}
