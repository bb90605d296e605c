//! Document engine handles and the yrs-backed document

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

/// Per-document unique client identifier
pub type ClientId = u64;

/// Name of the root text used by [`Document::text`] and [`Document::replace_text`]
pub const TEXT_ROOT: &str = "content";

/// Read capability over a document engine.
pub trait ReadHandle {
    /// Encoded state vector of the document
    fn state_vector(&self) -> Vec<u8>;

    /// Encoded update containing everything not covered by `since`
    fn diff(&self, since: &[u8]) -> Result<Vec<u8>>;
}

/// Write capability over a document engine.
pub trait WriteHandle: ReadHandle {
    /// Apply an encoded update coming from another peer
    fn apply_update(&mut self, update: &[u8]) -> Result<()>;
}

/// An external CRDT document.
///
/// Sync code only ever calls the four operations below. Updates can only be
/// applied through a [`WriteHandle`].
pub trait DocumentEngine {
    type Read<'a>: ReadHandle
    where
        Self: 'a;
    type Write<'a>: WriteHandle
    where
        Self: 'a;

    fn client_id(&self) -> ClientId;

    fn read(&self) -> Result<Self::Read<'_>>;

    fn write(&self) -> Result<Self::Write<'_>>;

    fn get_state(&self) -> Result<Vec<u8>> {
        Ok(self.read()?.state_vector())
    }

    fn get_update(&self, since: &[u8]) -> Result<Vec<u8>> {
        self.read()?.diff(since)
    }

    fn apply_update(&self, update: &[u8]) -> Result<()> {
        self.write()?.apply_update(update)
    }
}

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidDocumentId(
                "Document ID must match pattern [a-zA-Z0-9:_-]+".into()
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub client_id: ClientId,
    pub created_at: u64,
    pub updated_at: u64,
    /// Number of updates applied since creation
    pub version: u64,
}

impl DocumentMeta {
    pub fn new(id: DocumentId, client_id: ClientId) -> Self {
        let now = now_millis();

        Self {
            id,
            client_id,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = now_millis();
    }
}

/// A yrs document acting as the document engine
pub struct Document {
    meta: RwLock<DocumentMeta>,
    ydoc: Doc,
}

impl Document {
    /// Create a new document with a random client ID
    pub fn new(id: DocumentId) -> Self {
        Self::from_doc(id, Doc::new())
    }

    /// Create a new document with a fixed client ID
    pub fn with_client_id(id: DocumentId, client_id: ClientId) -> Self {
        Self::from_doc(id, Doc::with_client_id(client_id))
    }

    fn from_doc(id: DocumentId, ydoc: Doc) -> Self {
        Self {
            meta: RwLock::new(DocumentMeta::new(id, ydoc.client_id())),
            ydoc,
        }
    }

    /// Get the document ID
    pub fn id(&self) -> DocumentId {
        self.meta.read().id.clone()
    }

    /// Get document metadata
    pub fn meta(&self) -> DocumentMeta {
        self.meta.read().clone()
    }

    /// Get the current version
    pub fn version(&self) -> u64 {
        self.meta.read().version
    }

    /// The underlying yrs document
    pub fn ydoc(&self) -> &Doc {
        &self.ydoc
    }

    /// Current content of the root text
    pub fn text(&self) -> Result<String> {
        let text = self.ydoc.get_or_insert_text(TEXT_ROOT);
        let txn = self
            .ydoc
            .try_transact()
            .map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(text.get_string(&txn))
    }

    /// Replace the root text, returning the encoded local update
    pub fn replace_text(&self, content: &str) -> Result<Vec<u8>> {
        let text = self.ydoc.get_or_insert_text(TEXT_ROOT);
        let mut txn = self
            .ydoc
            .try_transact_mut()
            .map_err(|e| Error::Transaction(e.to_string()))?;
        let current_len = text.get_string(&txn).len() as u32;
        text.remove_range(&mut txn, 0, current_len);
        text.insert(&mut txn, 0, content);
        let update = txn.encode_update_v1();
        drop(txn);

        self.meta.write().touch();
        Ok(update)
    }
}

impl DocumentEngine for Document {
    type Read<'a> = DocRead<'a>;
    type Write<'a> = DocWrite<'a>;

    fn client_id(&self) -> ClientId {
        self.ydoc.client_id()
    }

    fn read(&self) -> Result<DocRead<'_>> {
        let txn = self
            .ydoc
            .try_transact()
            .map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(DocRead { txn })
    }

    fn write(&self) -> Result<DocWrite<'_>> {
        let txn = self
            .ydoc
            .try_transact_mut()
            .map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(DocWrite {
            txn,
            meta: &self.meta,
        })
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("meta", &self.meta)
            .finish()
    }
}

/// Read transaction over a [`Document`]
pub struct DocRead<'a> {
    txn: yrs::Transaction<'a>,
}

impl ReadHandle for DocRead<'_> {
    fn state_vector(&self) -> Vec<u8> {
        self.txn.state_vector().encode_v1()
    }

    fn diff(&self, since: &[u8]) -> Result<Vec<u8>> {
        encode_diff(&self.txn, since)
    }
}

/// Write transaction over a [`Document`]; committed when dropped
pub struct DocWrite<'a> {
    txn: yrs::TransactionMut<'a>,
    meta: &'a RwLock<DocumentMeta>,
}

impl ReadHandle for DocWrite<'_> {
    fn state_vector(&self) -> Vec<u8> {
        self.txn.state_vector().encode_v1()
    }

    fn diff(&self, since: &[u8]) -> Result<Vec<u8>> {
        encode_diff(&self.txn, since)
    }
}

impl WriteHandle for DocWrite<'_> {
    fn apply_update(&mut self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e: yrs::encoding::read::Error| Error::Validation(e.to_string()))?;
        self.txn.apply_update(decoded);

        let mut meta = self.meta.write();
        meta.touch();
        debug!(document = %meta.id, version = meta.version, len = update.len(), "Applied update");
        Ok(())
    }
}

fn encode_diff<T: ReadTxn>(txn: &T, since: &[u8]) -> Result<Vec<u8>> {
    let sv = StateVector::decode_v1(since)
        .map_err(|e: yrs::encoding::read::Error| Error::InvalidState(e.to_string()))?;
    Ok(txn.encode_diff_v1(&sv))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
