//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{CategoryPolicy, Error, db::initialize};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// Which categories new expenses may use.
    pub category_policy: CategoryPolicy,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, category_policy: CategoryPolicy) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            category_policy,
        })
    }

    /// Close the database connection.
    ///
    /// The connection is only closed here if this is the last copy of the
    /// state, otherwise it is closed when the last copy is dropped.
    ///
    /// # Errors
    /// Returns an error if SQLite could not close the connection cleanly.
    pub fn close(self) -> Result<(), Error> {
        let Ok(mutex) = Arc::try_unwrap(self.db_connection) else {
            tracing::debug!("Database connection still in use, it will be closed on drop.");
            return Ok(());
        };

        let connection = mutex.into_inner().map_err(|_| Error::DatabaseLockError)?;

        connection
            .close()
            .map_err(|(_, error)| Error::SqlError(error))
    }
}
