//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `registry` - Exporter/investor registrations (key: kind || address)
//! - `invoices` - Invoice records (key: invoice_id)
//! - `pools` - Pool records (key: pool_id)
//! - `investments` - Investment records (key: pool_id || investor)
//! - `events` - Append-only event log (key: sequence)
//! - `indices` - Secondary indices for fast lookups
//! - `meta` - Id and sequence counters
//!
//! Every mutating operation builds a [`Txn`] and commits it as one RocksDB
//! `WriteBatch`, so state changes, index updates, counter bumps, and event
//! appends land atomically or not at all.

use crate::{
    error::{Error, Result},
    types::{
        Address, EngineEvent, EventRecord, Investment, Invoice, InvoiceId, InvoiceStatus, Pool,
        PoolId, PoolStatus,
    },
    Config,
};
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_REGISTRY: &str = "registry";
const CF_INVOICES: &str = "invoices";
const CF_POOLS: &str = "pools";
const CF_INVESTMENTS: &str = "investments";
const CF_EVENTS: &str = "events";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

/// Meta counter keys (value: last allocated id / sequence, u64 BE)
const META_INVOICE_ID: &[u8] = b"invoice_id";
const META_POOL_ID: &[u8] = b"pool_id";
const META_EVENT_SEQ: &[u8] = b"event_seq";

/// Registry kinds
const REG_EXPORTER: u8 = b'e';
const REG_INVESTOR: u8 = b'i';

/// Index key prefixes
const IDX_EXPORTER_INVOICE: u8 = b'x';
const IDX_INVOICE_STATUS: u8 = b's';
const IDX_POOL_STATUS: u8 = b'p';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy event log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_REGISTRY, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_INVOICES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_POOLS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INVESTMENTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_point_lookup()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened ledger storage");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Frequently read back, favor decompression speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key encodings

    fn registry_key(kind: u8, address: &Address) -> Vec<u8> {
        let mut key = vec![kind];
        key.extend_from_slice(address.as_str().as_bytes());
        key
    }

    fn investment_key(pool_id: PoolId, investor: &Address) -> Vec<u8> {
        let mut key = pool_id.to_be_bytes().to_vec();
        key.extend_from_slice(investor.as_str().as_bytes());
        key
    }

    fn index_key_exporter_invoice(exporter: &Address, invoice_id: Option<InvoiceId>) -> Vec<u8> {
        // Length-prefix the address: a separator byte can appear inside an
        // address, so one exporter's prefix must never extend into another's.
        let addr = exporter.as_str().as_bytes();
        let mut key = vec![IDX_EXPORTER_INVOICE];
        key.extend_from_slice(&(addr.len() as u32).to_be_bytes());
        key.extend_from_slice(addr);
        if let Some(id) = invoice_id {
            key.extend_from_slice(&id.to_be_bytes());
        }
        key
    }

    fn index_key_invoice_status(status: InvoiceStatus, invoice_id: Option<InvoiceId>) -> Vec<u8> {
        let mut key = vec![IDX_INVOICE_STATUS, status as u8];
        if let Some(id) = invoice_id {
            key.extend_from_slice(&id.to_be_bytes());
        }
        key
    }

    fn index_key_pool_status(status: PoolStatus, pool_id: Option<PoolId>) -> Vec<u8> {
        let mut key = vec![IDX_POOL_STATUS, status as u8];
        if let Some(id) = pool_id {
            key.extend_from_slice(&id.to_be_bytes());
        }
        key
    }

    /// Decode the trailing u64 of an index key
    fn trailing_id(key: &[u8]) -> Option<u64> {
        if key.len() < 8 {
            return None;
        }
        let bytes: [u8; 8] = key[key.len() - 8..].try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Collect all keys under a prefix
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    // Registry

    /// Check exporter registration
    pub fn is_registered_exporter(&self, address: &Address) -> Result<bool> {
        let cf = self.cf(CF_REGISTRY)?;
        let key = Self::registry_key(REG_EXPORTER, address);
        Ok(self.db.get_cf(cf, key)?.is_some())
    }

    /// Check investor registration
    pub fn is_registered_investor(&self, address: &Address) -> Result<bool> {
        let cf = self.cf(CF_REGISTRY)?;
        let key = Self::registry_key(REG_INVESTOR, address);
        Ok(self.db.get_cf(cf, key)?.is_some())
    }

    // Invoices

    /// Get invoice by id
    pub fn get_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        let cf = self.cf(CF_INVOICES)?;
        let value = self
            .db
            .get_cf(cf, id.to_be_bytes())?
            .ok_or_else(|| Error::NotFound(format!("invoice {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// List invoice ids owned by an exporter
    pub fn invoice_ids_by_exporter(&self, exporter: &Address) -> Result<Vec<InvoiceId>> {
        let prefix = Self::index_key_exporter_invoice(exporter, None);
        let keys = self.scan_prefix(CF_INDICES, &prefix)?;
        Ok(keys.iter().filter_map(|k| Self::trailing_id(k)).collect())
    }

    /// List invoice ids with the given status
    pub fn invoice_ids_by_status(&self, status: InvoiceStatus) -> Result<Vec<InvoiceId>> {
        let prefix = Self::index_key_invoice_status(status, None);
        let keys = self.scan_prefix(CF_INDICES, &prefix)?;
        Ok(keys.iter().filter_map(|k| Self::trailing_id(k)).collect())
    }

    // Pools

    /// Get pool by id
    pub fn get_pool(&self, id: PoolId) -> Result<Pool> {
        let cf = self.cf(CF_POOLS)?;
        let value = self
            .db
            .get_cf(cf, id.to_be_bytes())?
            .ok_or_else(|| Error::NotFound(format!("pool {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// List pool ids with the given status
    pub fn pool_ids_by_status(&self, status: PoolStatus) -> Result<Vec<PoolId>> {
        let prefix = Self::index_key_pool_status(status, None);
        let keys = self.scan_prefix(CF_INDICES, &prefix)?;
        Ok(keys.iter().filter_map(|k| Self::trailing_id(k)).collect())
    }

    // Investments

    /// Get one investor's record in a pool, if any
    pub fn get_investment(
        &self,
        pool_id: PoolId,
        investor: &Address,
    ) -> Result<Option<Investment>> {
        let cf = self.cf(CF_INVESTMENTS)?;
        let key = Self::investment_key(pool_id, investor);
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All investment records for a pool
    pub fn pool_investments(&self, pool_id: PoolId) -> Result<Vec<Investment>> {
        let cf = self.cf(CF_INVESTMENTS)?;
        let prefix = pool_id.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut investments = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            investments.push(bincode::deserialize(&value)?);
        }
        Ok(investments)
    }

    // Events

    /// Get event by sequence number
    pub fn get_event(&self, sequence: u64) -> Result<EventRecord> {
        let cf = self.cf(CF_EVENTS)?;
        let value = self
            .db
            .get_cf(cf, sequence.to_be_bytes())?
            .ok_or_else(|| Error::NotFound(format!("event {}", sequence)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All events from the given sequence (inclusive), in order
    ///
    /// The compensation checker replays from its last seen sequence.
    pub fn events_since(&self, sequence: u64) -> Result<Vec<EventRecord>> {
        let cf = self.cf(CF_EVENTS)?;
        let from = sequence.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&from, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Sequence number of the most recently committed event (0 if none)
    pub fn latest_event_seq(&self) -> Result<u64> {
        self.counter(META_EVENT_SEQ)
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt counter value".to_string()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Begin a write transaction
    pub fn begin(&self) -> Result<Txn<'_>> {
        Ok(Txn {
            storage: self,
            batch: WriteBatch::default(),
            events: Vec::new(),
            invoice_id: self.counter(META_INVOICE_ID)?,
            pool_id: self.counter(META_POOL_ID)?,
            event_seq: self.counter(META_EVENT_SEQ)?,
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// One atomic unit of ledger mutation
///
/// Collects record puts, index maintenance, counter bumps, and event
/// appends; `commit` writes everything in a single `WriteBatch`.
pub struct Txn<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    events: Vec<EventRecord>,
    invoice_id: u64,
    pool_id: u64,
    event_seq: u64,
}

impl Txn<'_> {
    /// Allocate the next invoice id
    pub fn alloc_invoice_id(&mut self) -> InvoiceId {
        self.invoice_id += 1;
        self.invoice_id
    }

    /// Allocate the next pool id
    pub fn alloc_pool_id(&mut self) -> PoolId {
        self.pool_id += 1;
        self.pool_id
    }

    /// Mark an address as a registered exporter
    pub fn put_exporter_registration(&mut self, address: &Address) -> Result<()> {
        let cf = self.storage.cf(CF_REGISTRY)?;
        self.batch
            .put_cf(cf, Storage::registry_key(REG_EXPORTER, address), []);
        Ok(())
    }

    /// Mark an address as a registered investor
    pub fn put_investor_registration(&mut self, address: &Address) -> Result<()> {
        let cf = self.storage.cf(CF_REGISTRY)?;
        self.batch
            .put_cf(cf, Storage::registry_key(REG_INVESTOR, address), []);
        Ok(())
    }

    /// Write an invoice record, maintaining its indices
    ///
    /// `prev_status` is `None` on first insert (adds the exporter index) and
    /// the pre-mutation status on update (moves the status index entry).
    pub fn put_invoice(&mut self, invoice: &Invoice, prev_status: Option<InvoiceStatus>) -> Result<()> {
        let cf = self.storage.cf(CF_INVOICES)?;
        let value = bincode::serialize(invoice)?;
        self.batch.put_cf(cf, invoice.id.to_be_bytes(), value);

        let cf_idx = self.storage.cf(CF_INDICES)?;
        match prev_status {
            None => {
                let idx = Storage::index_key_exporter_invoice(&invoice.exporter, Some(invoice.id));
                self.batch.put_cf(cf_idx, idx, []);
            }
            Some(prev) if prev != invoice.status => {
                let old = Storage::index_key_invoice_status(prev, Some(invoice.id));
                self.batch.delete_cf(cf_idx, old);
            }
            Some(_) => return Ok(()),
        }

        let new = Storage::index_key_invoice_status(invoice.status, Some(invoice.id));
        self.batch.put_cf(cf_idx, new, []);
        Ok(())
    }

    /// Write a pool record, maintaining its status index
    pub fn put_pool(&mut self, pool: &Pool, prev_status: Option<PoolStatus>) -> Result<()> {
        let cf = self.storage.cf(CF_POOLS)?;
        let value = bincode::serialize(pool)?;
        self.batch.put_cf(cf, pool.id.to_be_bytes(), value);

        let cf_idx = self.storage.cf(CF_INDICES)?;
        match prev_status {
            None => {}
            Some(prev) if prev != pool.status => {
                let old = Storage::index_key_pool_status(prev, Some(pool.id));
                self.batch.delete_cf(cf_idx, old);
            }
            Some(_) => return Ok(()),
        }

        let new = Storage::index_key_pool_status(pool.status, Some(pool.id));
        self.batch.put_cf(cf_idx, new, []);
        Ok(())
    }

    /// Write an investment record
    pub fn put_investment(&mut self, investment: &Investment) -> Result<()> {
        let cf = self.storage.cf(CF_INVESTMENTS)?;
        let key = Storage::investment_key(investment.pool_id, &investment.investor);
        let value = bincode::serialize(investment)?;
        self.batch.put_cf(cf, key, value);
        Ok(())
    }

    /// Append an event to the log
    pub fn emit(&mut self, event: EngineEvent) -> Result<()> {
        self.event_seq += 1;
        let record = EventRecord {
            sequence: self.event_seq,
            timestamp: Utc::now(),
            event,
        };

        let cf = self.storage.cf(CF_EVENTS)?;
        let value = bincode::serialize(&record)?;
        self.batch.put_cf(cf, record.sequence.to_be_bytes(), value);
        self.events.push(record);
        Ok(())
    }

    /// Commit the transaction atomically, returning the committed events
    pub fn commit(mut self) -> Result<Vec<EventRecord>> {
        let cf = self.storage.cf(CF_META)?;
        self.batch
            .put_cf(cf, META_INVOICE_ID, self.invoice_id.to_be_bytes());
        self.batch
            .put_cf(cf, META_POOL_ID, self.pool_id.to_be_bytes());
        self.batch
            .put_cf(cf, META_EVENT_SEQ, self.event_seq.to_be_bytes());

        self.storage.db.write(self.batch)?;
        Ok(self.events)
    }
}
