//! Day-zero initialization.
//!
//! [`initialize`] runs once at process start, before any request is served.
//! It stamps the database with a schema marker and writes the configured
//! seed record set. Running it again is harmless: seed entries that already
//! exist are left alone and an unchanged seed is not re-applied at all.
use crate::accounts::Accounts;
use crate::catalog::{Catalog, NewProduct};
use crate::config::SeedConfig;
use crate::error::{LogFailure, MarketError, Result};
use crate::model::{TimeStamp, User};
use crate::store::RecordStore;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

pub const SCHEMA_VERSION: u32 = 1;

const MARKER_KEY: &str = "schema";

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct SchemaMarker {
    #[n(0)]
    pub version: u32,
    /// Hex sha256 of the last seed applied.
    #[n(1)]
    pub seed_digest: String,
    #[n(2)]
    pub initialized_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// The marker was already present with the same version and seed.
    pub up_to_date: bool,
    pub products_created: usize,
    pub users_created: usize,
    pub admins_granted: usize,
}

/// Hex sha256 over a canonical rendering of the seed. Order of entries
/// matters; formatting of the source file does not.
pub fn seed_digest(seed: &SeedConfig) -> String {
    let mut canonical = String::new();
    for product in &seed.products {
        canonical.push_str(&format!(
            "product\0{}\0{}\0{}\0{}\n",
            product.name, product.category, product.price, product.stock
        ));
    }
    for user in &seed.users {
        canonical.push_str(&format!("user\0{}\0{}\n", user.username, user.email));
    }
    for admin in &seed.admins {
        canonical.push_str(&format!("admin\0{admin}\n"));
    }
    sha256::digest(canonical)
}

pub fn marker(store: &RecordStore) -> Result<Option<SchemaMarker>> {
    match store.meta_get(MARKER_KEY)? {
        Some(bytes) => minicbor::decode(&bytes)
            .map(Some)
            .map_err(MarketError::codec),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub fn initialize(store: &RecordStore, seed: &SeedConfig) -> Result<SchemaReport> {
    let digest = seed_digest(seed);

    if let Some(existing) = marker(store).log_failure("initialize")? {
        if existing.version > SCHEMA_VERSION {
            return Err(MarketError::InvalidOperation(format!(
                "database schema version {} is newer than supported version {SCHEMA_VERSION}",
                existing.version
            )))
            .log_failure("initialize");
        }
        if existing.version == SCHEMA_VERSION && existing.seed_digest == digest {
            debug!("schema up to date");
            return Ok(SchemaReport {
                up_to_date: true,
                ..Default::default()
            });
        }
        info!(from = existing.version, to = SCHEMA_VERSION, "re-applying seed");
    }

    let report = if seed.is_empty() {
        debug!("no seed configured");
        SchemaReport::default()
    } else {
        apply_seed(store, seed).log_failure("initialize")?
    };

    let marker = SchemaMarker {
        version: SCHEMA_VERSION,
        seed_digest: digest,
        initialized_at: TimeStamp::new(),
    };
    let bytes = minicbor::to_vec(&marker).map_err(MarketError::codec)?;
    store.meta_put(MARKER_KEY, bytes)?;
    store.flush()?;

    info!(
        products = report.products_created,
        users = report.users_created,
        admins = report.admins_granted,
        "schema initialized"
    );
    Ok(report)
}

fn apply_seed(store: &RecordStore, seed: &SeedConfig) -> Result<SchemaReport> {
    let catalog = Catalog::new(store.clone());
    let accounts = Accounts::new(store.clone());
    let mut report = SchemaReport::default();

    for product in &seed.products {
        let stock = i64::try_from(product.stock)
            .map_err(|_| MarketError::invalid_quantity(&product.name, i64::MAX))?;
        let new = NewProduct::new(&product.name, &product.category, product.price, stock);
        match catalog.create(&new) {
            Ok(_) => report.products_created += 1,
            Err(MarketError::ProductAlreadyExists(name)) => debug!(product = %name, "seed product exists"),
            Err(err) => return Err(err),
        }
    }

    for user in &seed.users {
        // seeded accounts get no password; the external auth layer sets one
        let record = User {
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: Vec::new(),
        };
        match store.create(&record) {
            Ok(()) => report.users_created += 1,
            Err(MarketError::AlreadyExists { .. }) => debug!(user = %user.username, "seed user exists"),
            Err(err) => return Err(err),
        }
    }

    for admin in &seed.admins {
        if accounts.principal(admin).is_ok_and(|p| p.is_admin()) {
            continue;
        }
        match accounts.grant_admin(admin) {
            Ok(()) => report.admins_granted += 1,
            Err(MarketError::NotFound { .. }) => {
                warn!(admin = %admin, "seed admin has no user record");
                return Err(MarketError::InvalidOperation(format!(
                    "seed admin {admin} is not a seeded or registered user"
                )));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}
