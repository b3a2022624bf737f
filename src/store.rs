//! Record store over sled: one tree per collection, generic CRUD by filter,
//! and multi-collection transactions.
use crate::config::StorageConfig;
use crate::error::{MarketError, Result};
use crate::record::{Collection, Filter, Patch, Record, SortBy};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, IVec, Transactional, Tree};
use tracing::{debug, instrument};

const META_TREE: &str = "__meta";

/// Result of a step inside [`RecordStore::with_transaction`].
pub type TxResult<T> = ConflictableTransactionResult<T, MarketError>;

/// Abort the enclosing transaction with a domain error.
pub fn abort<T>(err: MarketError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn aborting<T>(result: Result<T>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

/// Handle to the embedded database. Cloning is cheap and every clone sees
/// the same data, so workers each hold their own.
#[derive(Clone)]
pub struct RecordStore {
    db: Db,
    products: Tree,
    inventory: Tree,
    orders: Tree,
    order_lines: Tree,
    users: Tree,
    admins: Tree,
    meta: Tree,
}

impl RecordStore {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let mut sled_config = sled::Config::new()
            .temporary(config.temporary)
            .flush_every_ms(config.flush_every_ms);
        if !config.temporary {
            sled_config = sled_config.path(&config.path);
        }
        Self::from_db(sled_config.open()?)
    }

    /// A store that is removed when the last handle drops.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: Db) -> Result<Self> {
        let tree = |collection: Collection| db.open_tree(collection.name());
        Ok(Self {
            products: tree(Collection::Products)?,
            inventory: tree(Collection::Inventory)?,
            orders: tree(Collection::Orders)?,
            order_lines: tree(Collection::OrderLines)?,
            users: tree(Collection::Users)?,
            admins: tree(Collection::Admins)?,
            meta: db.open_tree(META_TREE)?,
            db,
        })
    }

    fn tree(&self, collection: Collection) -> &Tree {
        match collection {
            Collection::Products => &self.products,
            Collection::Inventory => &self.inventory,
            Collection::Orders => &self.orders,
            Collection::OrderLines => &self.order_lines,
            Collection::Users => &self.users,
            Collection::Admins => &self.admins,
        }
    }

    /// Insert a new record; fails with `AlreadyExists` if its key is taken.
    pub fn create<R: Record>(&self, record: &R) -> Result<()> {
        let bytes = record.encode_record()?;
        let swapped =
            self.tree(R::COLLECTION)
                .compare_and_swap(record.key(), None::<&[u8]>, Some(bytes))?;
        match swapped {
            Ok(()) => {
                debug!(collection = R::COLLECTION.name(), "record created");
                Ok(())
            }
            Err(_) => Err(MarketError::AlreadyExists {
                collection: R::COLLECTION.name(),
            }),
        }
    }

    /// Insert or overwrite a record under its key.
    pub fn put<R: Record>(&self, record: &R) -> Result<()> {
        self.tree(R::COLLECTION)
            .insert(record.key(), record.encode_record()?)?;
        Ok(())
    }

    /// Apply `patch` to every record matching `filter`. Returns how many
    /// records were rewritten.
    #[instrument(skip_all, fields(collection = R::COLLECTION.name()))]
    pub fn update<R: Record>(&self, patch: &Patch, filter: &Filter) -> Result<usize> {
        patch.validate::<R>()?;
        if patch.is_empty() {
            return Ok(0);
        }
        let records = self.find::<R>(filter, None)?;
        for record in &records {
            let mut updated = record.clone();
            patch.apply(&mut updated)?;
            self.put(&updated)?;
        }
        debug!(updated = records.len(), "records patched");
        Ok(records.len())
    }

    /// Remove every record matching `filter`. Returns how many were removed.
    #[instrument(skip_all, fields(collection = R::COLLECTION.name()))]
    pub fn delete<R: Record>(&self, filter: &Filter) -> Result<usize> {
        let records = self.find::<R>(filter, None)?;
        let tree = self.tree(R::COLLECTION);
        for record in &records {
            tree.remove(record.key())?;
        }
        debug!(removed = records.len(), "records deleted");
        Ok(records.len())
    }

    /// The first record matching `filter`, or `NotFound`.
    pub fn get_one<R: Record>(&self, filter: &Filter) -> Result<R> {
        self.find::<R>(filter, None)?
            .into_iter()
            .next()
            .ok_or(MarketError::NotFound {
                collection: R::COLLECTION.name(),
            })
    }

    /// Every record matching `filter`; `NoMatch` when there are none.
    pub fn get_many<R: Record>(&self, filter: &Filter, sort: Option<&SortBy>) -> Result<Vec<R>> {
        let records = self.find::<R>(filter, sort)?;
        if records.is_empty() {
            return Err(MarketError::NoMatch {
                collection: R::COLLECTION.name(),
            });
        }
        Ok(records)
    }

    /// Every record matching `filter`, possibly none. Records come back in
    /// key order unless a sort is given.
    pub fn find<R: Record>(&self, filter: &Filter, sort: Option<&SortBy>) -> Result<Vec<R>> {
        filter.validate::<R>()?;
        let tree = self.tree(R::COLLECTION);
        let mut records = Vec::new();

        if let Some(key) = R::key_for(filter) {
            if let Some(bytes) = tree.get(key)? {
                let record = R::decode_record(&bytes)?;
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        } else {
            let entries = match R::prefix_for(filter) {
                Some(prefix) => tree.scan_prefix(prefix),
                None => tree.iter(),
            };
            for entry in entries {
                let (_, bytes) = entry?;
                let record = R::decode_record(&bytes)?;
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }

        if let Some(sort) = sort {
            sort.sort(&mut records)?;
        }
        Ok(records)
    }

    pub fn exists<R: Record>(&self, filter: &Filter) -> Result<bool> {
        Ok(!self.find::<R>(filter, None)?.is_empty())
    }

    pub fn count<R: Record>(&self, filter: &Filter) -> Result<usize> {
        Ok(self.find::<R>(filter, None)?.len())
    }

    /// Run `f` as one serializable unit of work over every collection.
    ///
    /// Writes made through the [`Tx`] handle become visible together when
    /// `f` returns `Ok`. An aborted step or a panic leaves the store as it
    /// was. sled resolves conflicts by re-running `f` against the newly
    /// committed state, so `f` must derive everything it writes from what it
    /// reads through the handle.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let trees = (
            &self.products,
            &self.inventory,
            &self.orders,
            &self.order_lines,
            &self.users,
            &self.admins,
        );
        let result = trees.transaction(|(products, inventory, orders, order_lines, users, admins)| {
            let tx = Tx {
                products,
                inventory,
                orders,
                order_lines,
                users,
                admins,
            };
            f(&tx)
        });

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(err)) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    pub(crate) fn meta_get(&self, key: &str) -> Result<Option<IVec>> {
        Ok(self.meta.get(key)?)
    }

    pub(crate) fn meta_put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.meta.insert(key, value)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Transaction-scoped view of the store. Only key-addressed access is
/// available inside a transaction.
pub struct Tx<'a> {
    products: &'a TransactionalTree,
    inventory: &'a TransactionalTree,
    orders: &'a TransactionalTree,
    order_lines: &'a TransactionalTree,
    users: &'a TransactionalTree,
    admins: &'a TransactionalTree,
}

impl<'a> Tx<'a> {
    fn tree(&self, collection: Collection) -> &'a TransactionalTree {
        match collection {
            Collection::Products => self.products,
            Collection::Inventory => self.inventory,
            Collection::Orders => self.orders,
            Collection::OrderLines => self.order_lines,
            Collection::Users => self.users,
            Collection::Admins => self.admins,
        }
    }

    pub fn get<R: Record>(&self, key: &[u8]) -> TxResult<Option<R>> {
        match self.tree(R::COLLECTION).get(key)? {
            Some(bytes) => aborting(R::decode_record(&bytes)).map(Some),
            None => Ok(None),
        }
    }

    /// Insert a new record; aborts with `AlreadyExists` if its key is taken.
    pub fn insert<R: Record>(&self, record: &R) -> TxResult<()> {
        let tree = self.tree(R::COLLECTION);
        let key = record.key();
        if tree.get(&key)?.is_some() {
            return abort(MarketError::AlreadyExists {
                collection: R::COLLECTION.name(),
            });
        }
        tree.insert(key, aborting(record.encode_record())?)?;
        Ok(())
    }

    pub fn put<R: Record>(&self, record: &R) -> TxResult<()> {
        self.tree(R::COLLECTION)
            .insert(record.key(), aborting(record.encode_record())?)?;
        Ok(())
    }

    /// Remove the record under `key`, reporting whether one was there.
    pub fn remove<R: Record>(&self, key: &[u8]) -> TxResult<bool> {
        Ok(self.tree(R::COLLECTION).remove(key)?.is_some())
    }
}
