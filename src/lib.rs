pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod registry;
pub mod services;
pub mod sword_xml_parser;

pub use client::SwordClient;
pub use config::SwordConfig;
pub use errors::{ErrorKind, Result, SwordError};
pub use models::{Collection, DepositReceipt, FeedItem, PropertyValue, ServiceDocument};
pub use registry::Registry;
pub use services::sword::{CollectionSelector, DepositRequest, Repository, SwordConnection};
