//! User and admin records, and principal resolution
use crate::error::{LogFailure, MarketError, Result};
use crate::model::{Admin, Principal, Role, User};
use crate::record::Filter;
use crate::store::{RecordStore, abort};
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Accounts {
    store: RecordStore,
}

impl Accounts {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Stores a new user. `password_hash` comes from the caller's hasher.
    #[instrument(skip(self, password_hash))]
    pub fn register(&self, username: &str, email: &str, password_hash: Vec<u8>) -> Result<User> {
        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        };
        self.store.create(&user).log_failure("register")?;
        info!("user registered");
        Ok(user)
    }

    pub fn user(&self, username: &str) -> Result<User> {
        self.store
            .get_one::<User>(&Filter::new().eq("username", username))
            .log_failure("get_user")
    }

    /// Removes the user and any admin grant it held.
    #[instrument(skip(self))]
    pub fn delete_user(&self, username: &str) -> Result<()> {
        self.store
            .with_transaction(|tx| {
                if !tx.remove::<User>(username.as_bytes())? {
                    return abort(MarketError::NotFound { collection: "users" });
                }
                tx.remove::<Admin>(username.as_bytes())?;
                Ok(())
            })
            .log_failure("delete_user")?;
        info!("user deleted");
        Ok(())
    }

    /// Makes an existing user an admin. Granting twice is not an error.
    #[instrument(skip(self))]
    pub fn grant_admin(&self, username: &str) -> Result<()> {
        self.store
            .with_transaction(|tx| {
                if tx.get::<User>(username.as_bytes())?.is_none() {
                    return abort(MarketError::NotFound { collection: "users" });
                }
                tx.put(&Admin {
                    username: username.to_string(),
                })
            })
            .log_failure("grant_admin")?;
        info!("admin granted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn revoke_admin(&self, username: &str) -> Result<()> {
        let removed = self
            .store
            .delete::<Admin>(&Filter::new().eq("username", username))
            .log_failure("revoke_admin")?;
        if removed == 0 {
            return Err(MarketError::NotFound {
                collection: "admins",
            })
            .log_failure("revoke_admin");
        }
        Ok(())
    }

    /// The principal for a user whose session the transport already verified.
    pub fn principal(&self, username: &str) -> Result<Principal> {
        let user = self.user(username)?;
        let is_admin = self
            .store
            .exists::<Admin>(&Filter::new().eq("username", username))
            .log_failure("principal")?;
        Ok(Principal {
            username: user.username,
            role: if is_admin { Role::Admin } else { Role::Customer },
        })
    }
}
