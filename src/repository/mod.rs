pub mod blob_store;
pub mod collection_service;
pub mod document_store;
pub mod memory;
pub mod postgres;
