mod ledger;

pub use ledger::{passport_key, HistoryCategory, HistoryLedger, HISTORY_CAPACITY};
