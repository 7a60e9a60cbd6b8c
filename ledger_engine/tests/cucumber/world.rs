use std::collections::HashMap;

use cucumber::World;
use ledger_engine::{test_utils::prepare_env::fresh_database, InvoiceApi, LedgerError, SqliteDatabase};
use log::*;

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<LedgerSystem>,
    /// Invoice ids, keyed by the name the scenario gave them.
    pub invoices: HashMap<String, i64>,
    pub last_error: Option<LedgerError>,
}

#[derive(Debug)]
pub struct LedgerSystem {
    pub db_path: String,
    pub api: InvoiceApi<SqliteDatabase>,
}

impl LedgerWorld {
    pub fn api(&self) -> &InvoiceApi<SqliteDatabase> {
        &self.system.as_ref().expect("InvoiceApi not initialised").api
    }

    pub fn invoice_id(&self, name: &str) -> i64 {
        *self.invoices.get(name).unwrap_or_else(|| panic!("No invoice called {name} has been created"))
    }
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let db = fresh_database(1).await;
        let db_path = ledger_engine::LedgerDatabase::url(&db).to_string();
        debug!("Created database: {db_path}");
        Self { db_path, api: InvoiceApi::new(db) }
    }
}
