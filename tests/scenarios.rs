use anyhow::Context;
use market::catalog::{Catalog, NewProduct, ProductPatch};
use market::ledger::Ledger;
use market::model::{Principal, Role};
use market::orders::{OrderEngine, OrderRequest};
use market::reporting::{OrderQuery, Reporting};
use market::store::RecordStore;
use market::{MarketError, Marketplace};
use sled::open;
use std::collections::BTreeMap;
use std::sync::Barrier;

use tempfile::tempdir; // Use for test db cleanup.

fn open_store(name: &str) -> anyhow::Result<(tempfile::TempDir, RecordStore)> {
    // Sled locks its files, so every test gets its own database under a
    // temp directory.
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join(name))?;
    Ok((temp_dir, RecordStore::from_db(db)?))
}

/// Opens a marketplace over a fresh on-disk database with "Handle" (Wood, 12)
/// stocked at 20. The returned guard keeps the directory alive.
fn market_with_handle(name: &str) -> anyhow::Result<(tempfile::TempDir, Marketplace, Principal)> {
    let (temp_dir, store) = open_store(name)?;
    let market = Marketplace::new(store);

    let admin = Principal {
        username: "root".into(),
        role: Role::Admin,
    };
    market
        .add_product(&admin, &NewProduct::new("Handle", "Wood", 12, 20))
        .context("creating Handle")?;
    Ok((temp_dir, market, admin))
}

fn customer(name: &str) -> Principal {
    Principal {
        username: name.into(),
        role: Role::Customer,
    }
}

fn basket(items: &[(&str, i64)]) -> BTreeMap<String, i64> {
    items
        .iter()
        .map(|(name, quantity)| (name.to_string(), *quantity))
        .collect()
}

/// A: ordering 2 Handles costs 24 and leaves 18 in stock.
#[test]
fn order_deducts_stock_and_totals_cost() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_a.db")?;
    let nikhil = customer("Nikhil");

    let order = market
        .place_order(&nikhil, basket(&[("Handle", 2)]))
        .context("Order failed: ")?;

    assert_eq!(order.total_cost, 24);
    assert_eq!(order.lines, vec![("Handle".to_string(), 2)]);
    assert!(order.order_id.starts_with("order_1"));
    assert_eq!(market.stock(&admin, "Handle")?, 18);

    let history = market.my_orders(&nikhil)?;
    assert_eq!(history, vec![order]);
    Ok(())
}

/// B: an unknown product aborts the whole basket.
#[test]
fn unknown_product_leaves_other_items_untouched() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_b.db")?;

    let err = market
        .place_order(&customer("Nikhil"), basket(&[("Ghost", 1), ("Handle", 2)]))
        .unwrap_err();

    assert!(matches!(err, MarketError::ProductNotFound(ref name) if name == "Ghost"));
    assert_eq!(market.stock(&admin, "Handle")?, 20);
    assert!(
        market
            .orders_for_admin(&admin, &OrderQuery::default())?
            .is_empty()
    );
    Ok(())
}

/// B, with the failing item visited last: the staged Handle deduction is
/// discarded too.
#[test]
fn failure_after_staged_deduction_rolls_back() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_b_late.db")?;

    let err = market
        .place_order(&customer("Nikhil"), basket(&[("Handle", 2), ("Zebra", 1)]))
        .unwrap_err();

    assert!(matches!(err, MarketError::ProductNotFound(_)));
    assert_eq!(market.stock(&admin, "Handle")?, 20);
    assert!(matches!(
        market.my_orders(&customer("Nikhil")),
        Err(MarketError::NoMatch { .. })
    ));
    Ok(())
}

/// C: asking for more than is in stock is rejected.
#[test]
fn oversized_order_is_rejected() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_c.db")?;

    let err = market
        .place_order(&customer("Nikhil"), basket(&[("Handle", 100)]))
        .unwrap_err();

    assert!(matches!(
        err,
        MarketError::InvalidQuantity { requested: 100, .. }
    ));
    assert_eq!(market.stock(&admin, "Handle")?, 20);
    Ok(())
}

/// D: two concurrent orders for 15 of 20 Handles; exactly one wins.
#[test]
fn concurrent_orders_never_oversell() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_d.db")?;
    let start = Barrier::new(2);

    let results: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = ["Nikhil", "Asha"]
            .into_iter()
            .map(|name| {
                // each worker holds its own handle, as request workers would
                let market = market.clone();
                let start = &start;
                scope.spawn(move || {
                    start.wait();
                    market.place_order(&customer(name), basket(&[("Handle", 15)]))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("order worker panicked"))
            .collect()
    });

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(MarketError::InvalidQuantity { requested: 15, .. })
    )));
    assert_eq!(market.stock(&admin, "Handle")?, 5);
    assert_eq!(
        market
            .orders_for_admin(&admin, &OrderQuery::default())?
            .len(),
        1
    );
    Ok(())
}

/// Many small concurrent orders drain stock exactly to zero.
#[test]
fn concurrent_orders_drain_stock_exactly() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("scenario_d_many.db")?;

    let placed = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let market = market.clone();
                scope.spawn(move || {
                    let me = customer(&format!("customer-{worker}"));
                    (0..5)
                        .filter(|_| market.place_order(&me, basket(&[("Handle", 1)])).is_ok())
                        .count()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("order worker panicked"))
            .sum::<usize>()
    });

    assert_eq!(placed, 20);
    assert_eq!(market.stock(&admin, "Handle")?, 0);
    Ok(())
}

/// E: a withdrawal past zero is refused.
#[test]
fn withdrawal_below_zero_is_refused() -> anyhow::Result<()> {
    let (_dir, store) = open_store("scenario_e.db")?;
    let market = Marketplace::new(store.clone());
    let admin = Principal {
        username: "root".into(),
        role: Role::Admin,
    };
    market.add_product(&admin, &NewProduct::new("Handle", "Wood", 12, 20))?;

    let err = market
        .adjust_inventory(&admin, "Handle", "remove", 100)
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidQuantity { .. }));
    assert_eq!(market.stock(&admin, "Handle")?, 20);

    // the raw ledger call behaves the same way
    let ledger = Ledger::new(store);
    assert!(matches!(
        ledger.adjust_stock("Handle", -100),
        Err(MarketError::InvalidQuantity { requested: -100, .. })
    ));
    assert_eq!(ledger.get_stock("Handle")?, 20);
    Ok(())
}

/// Order totals use the price at order time and reports join every line.
#[test]
fn reports_join_lines_and_keep_historical_totals() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("reports.db")?;
    market.add_product(&admin, &NewProduct::new("Knob", "Metal", 30, 10))?;
    let nikhil = customer("Nikhil");

    let first = market.place_order(&nikhil, basket(&[("Handle", 1), ("Knob", 2)]))?;
    assert_eq!(first.total_cost, 12 + 60);

    market.update_product(
        &admin,
        "Knob",
        &ProductPatch {
            price: Some(50),
            ..Default::default()
        },
    )?;
    let second = market.place_order(&nikhil, basket(&[("Knob", 1)]))?;
    assert_eq!(second.total_cost, 50);

    let history = market.my_orders(&nikhil)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].total_cost, 72);

    let with_handle = market.orders_for_admin(
        &admin,
        &OrderQuery {
            product_name: Some("Handle".into()),
            ..Default::default()
        },
    )?;
    assert_eq!(with_handle, vec![first]);
    Ok(())
}

/// The engine also runs standalone over a bare store.
#[test]
fn engine_runs_without_facade() -> anyhow::Result<()> {
    let (_dir, store) = open_store("engine.db")?;
    Catalog::new(store.clone())
        .create(&NewProduct::new("Handle", "Wood", 12, 3))?;

    let engine = OrderEngine::from_store(store.clone());
    let order = engine.create_order(&OrderRequest::new("Nikhil").item("Handle", 3))?;
    assert_eq!(order.total_cost, 36);

    let reports = Reporting::new(store).orders_by_customer("Nikhil")?;
    assert_eq!(reports, vec![order]);
    Ok(())
}

/// Reads with no writes in between return identical results.
#[test]
fn repeated_reads_are_identical() -> anyhow::Result<()> {
    let (_dir, market, admin) = market_with_handle("idempotent_reads.db")?;
    market.add_product(&admin, &NewProduct::new("Knob", "Metal", 30, 5))?;
    let nikhil = customer("Nikhil");
    market.place_order(&nikhil, basket(&[("Handle", 1), ("Knob", 1)]))?;

    assert_eq!(market.products(&nikhil, None)?, market.products(&nikhil, None)?);
    assert_eq!(
        market.products(&nikhil, Some("Metal"))?,
        market.products(&nikhil, Some("Metal"))?
    );
    assert_eq!(market.my_orders(&nikhil)?, market.my_orders(&nikhil)?);
    Ok(())
}
