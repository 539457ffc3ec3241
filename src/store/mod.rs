//! Record storage module.
//!
//! Keeps the key file and the user file in step. Each line of the key file
//! holds one opaque hardware key; the same line of the user file holds
//! `name -> status` for that key.

mod files;
mod record_store;
mod records;

pub use record_store::{BatchUpdate, RecordStore, StoreAudit, StoreError};
pub use records::{
    DELIMITER, STATUS_BAN, STATUS_DELETE, STATUS_SAFE, UserRecord, compose_status,
};
