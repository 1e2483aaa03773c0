pub mod history;
pub mod ledger;
pub mod prices;
pub mod setup;
pub mod summary;
pub mod ui;
