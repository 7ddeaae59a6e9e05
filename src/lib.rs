//! Catalog Bot: WhatsApp conversations that turn an Instagram profile
//! into a product catalog.

pub mod catalog;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod store;
pub mod testing;
pub mod webhook;
pub mod worker;
