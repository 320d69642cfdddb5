pub mod auth;
pub mod backup_bundle;
pub mod classes;
pub mod contact;
pub mod core;
pub mod ledger;
pub mod notifications;
pub mod proofs;
pub mod reports;
pub mod schedule;
pub mod students;
pub mod users;
