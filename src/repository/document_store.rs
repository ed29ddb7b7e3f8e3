use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;

pub type Fields = Map<String, Value>;

/// A stored document: its id plus the loosely-typed field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// JSON view with the id folded in, as returned to API callers.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Value::Object(data)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Equality filters on top-level fields.
    pub filters: Fields,
    pub order_by: Option<String>,
    pub ascending: bool,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: Fields,
    },
    Merge {
        collection: String,
        id: String,
        data: Fields,
    },
}

impl WriteOp {
    pub fn set(collection: &str, id: &str, data: Fields) -> Self {
        Self::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }
    }

    pub fn merge(collection: &str, id: &str, data: Fields) -> Self {
        Self::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }
    }
}

/// What a transaction body decided: the writes to apply atomically and a
/// value handed back to the caller once they are committed.
#[derive(Debug, Clone, Default)]
pub struct TxCommit {
    pub writes: Vec<WriteOp>,
    pub output: Value,
}

impl TxCommit {
    pub fn new(writes: Vec<WriteOp>) -> Self {
        Self {
            writes,
            output: Value::Null,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }
}

/// Transaction body. Receives the current fields of the locked document (or
/// `None` when it does not exist). Returning an error aborts the transaction
/// without applying any write.
pub type Transaction = Box<dyn FnOnce(Option<Fields>) -> Result<TxCommit, AppError> + Send>;

/// Document database collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    async fn ping(&self) -> Result<(), AppError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Document>, AppError>;

    async fn write(&self, op: WriteOp) -> Result<(), AppError>;

    /// Reads `collection/id` under an exclusive lock, runs `body`, and applies
    /// its writes atomically. A failed transaction is reported once and never
    /// retried.
    async fn run_transaction(
        &self,
        collection: &str,
        id: &str,
        body: Transaction,
    ) -> Result<Value, AppError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError>;
}
