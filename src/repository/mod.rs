pub mod database;
pub mod inscription_repository;
pub mod meta_repository;
pub mod models;
pub mod token_repository;

pub use database::Database;
pub use inscription_repository::{InscriptionFilter, InscriptionRepository};
pub use meta_repository::{LAST_SYNCED_BLOCK, MetaRepository};
pub use models::{InscriptionRecord, LogPosition, TokenRecord};
pub use token_repository::TokenRepository;
