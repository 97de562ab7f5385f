use anyhow::Result;
use dashmap::DashMap;
use heed::types::Bytes;
use heed::{Env, EnvOpenOptions};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeSet;
use std::path::Path;

/// Persistence collaborator behind the registry.
///
/// Records are grouped in named tables. Writes arrive as a [`WriteBatch`] and
/// must become visible all at once.
pub trait Storage: Send + Sync {
    fn get_raw(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>>;
    fn scan_raw(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>>;
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}

impl<'a> dyn Storage + 'a {
    /// Get by key
    pub fn get<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>> {
        match self.get_raw(table, key)? {
            Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get all records of a table, in no particular order
    pub fn all<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for (_key, bytes) in self.scan_raw(table)? {
            out.push(rmp_serde::from_slice(&bytes)?);
        }
        Ok(out)
    }

    /// Filter records by predicate
    pub fn filter<T, F>(&self, table: &str, mut pred: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        Ok(self.all(table)?.into_iter().filter(|x| pred(x)).collect())
    }

    pub fn exists(&self, table: &str, key: &str) -> Result<bool> {
        Ok(self.get_raw(table, key)?.is_some())
    }
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        table: &'static str,
        key: String,
        bytes: Vec<u8>,
    },
    Delete {
        table: &'static str,
        key: String,
    },
}

/// Ordered list of puts and deletes committed as one unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update (upsert)
    pub fn put<T: Serialize>(&mut self, table: &'static str, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(value)?;
        self.ops.push(WriteOp::Put {
            table,
            key: key.into(),
            bytes,
        });
        Ok(())
    }

    pub fn delete(&mut self, table: &'static str, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            table,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn tables(&self) -> BTreeSet<&'static str> {
        self.ops
            .iter()
            .map(|op| match op {
                WriteOp::Put { table, .. } | WriteOp::Delete { table, .. } => *table,
            })
            .collect()
    }
}

pub struct Memory {
    kind: MemoryKind,
}

enum MemoryKind {
    LMDB {
        env: Env,
        dbs: DashMap<String, heed::Database<Bytes, Bytes>>,
    },
    Memory {
        map: DashMap<String, Vec<u8>>,
    },
}

impl Memory {
    /// Open LMDB storage at given path
    pub fn open_lmdb<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(16)
                .map_size(1024 * 1024 * 1024)
                .open(path)?
        };
        Ok(Self {
            kind: MemoryKind::LMDB {
                env,
                dbs: DashMap::new(),
            },
        })
    }

    /// Open in-memory storage
    pub fn memory() -> Self {
        Self {
            kind: MemoryKind::Memory {
                map: DashMap::new(),
            },
        }
    }

    /// Pick the backend by engine name (`lmdb` or `memory`).
    pub fn open(engine: &str, path: &str) -> Result<Self> {
        match engine {
            "lmdb" if path.trim().is_empty() => anyhow::bail!("lmdb storage needs a `storage.path`"),
            "lmdb" => Self::open_lmdb(path),
            "memory" | "" => Ok(Self::memory()),
            other => anyhow::bail!("unknown storage engine `{}`", other),
        }
    }

    fn make_key(table: &str, key: &str) -> String {
        format!("{}/{}", table, key)
    }

    fn get_db(
        env: &Env,
        dbs: &DashMap<String, heed::Database<Bytes, Bytes>>,
        db_name: &str,
    ) -> Result<heed::Database<Bytes, Bytes>> {
        if let Some(dbi) = dbs.get(db_name) {
            Ok(*dbi)
        } else {
            let mut wtxn = env.write_txn()?;
            let dbi: heed::Database<Bytes, Bytes> =
                env.create_database::<Bytes, Bytes>(&mut wtxn, Some(db_name))?;
            wtxn.commit()?;
            dbs.insert(db_name.to_string(), dbi);
            Ok(dbi)
        }
    }
}

impl Storage for Memory {
    fn get_raw(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, table)?;
                let rtxn = env.read_txn()?;
                Ok(dbi.get(&rtxn, key.as_bytes())?.map(|b| b.to_vec()))
            }
            MemoryKind::Memory { map } => Ok(map.get(&Self::make_key(table, key)).map(|v| v.clone())),
        }
    }

    fn scan_raw(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                let dbi = Self::get_db(env, dbs, table)?;
                let rtxn = env.read_txn()?;
                for item in dbi.iter(&rtxn)? {
                    let (k, v) = item?;
                    out.push((String::from_utf8_lossy(k).to_string(), v.to_vec()));
                }
            }
            MemoryKind::Memory { map } => {
                let prefix = format!("{}/", table);
                for entry in map.iter() {
                    if let Some(key) = entry.key().strip_prefix(&prefix) {
                        out.push((key.to_string(), entry.value().clone()));
                    }
                }
            }
        }
        Ok(out)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        match &self.kind {
            MemoryKind::LMDB { env, dbs } => {
                // databases are created up front: LMDB allows one write txn at a time
                for table in batch.tables() {
                    Self::get_db(env, dbs, table)?;
                }
                let mut wtxn = env.write_txn()?;
                for op in batch.ops {
                    match op {
                        WriteOp::Put { table, key, bytes } => {
                            let dbi = Self::get_db(env, dbs, table)?;
                            dbi.put(&mut wtxn, key.as_bytes(), &bytes)?;
                        }
                        WriteOp::Delete { table, key } => {
                            let dbi = Self::get_db(env, dbs, table)?;
                            dbi.delete(&mut wtxn, key.as_bytes())?;
                        }
                    }
                }
                wtxn.commit()?;
                Ok(())
            }
            MemoryKind::Memory { map } => {
                for op in batch.ops {
                    match op {
                        WriteOp::Put { table, key, bytes } => {
                            map.insert(Self::make_key(table, &key), bytes);
                        }
                        WriteOp::Delete { table, key } => {
                            map.remove(&Self::make_key(table, &key));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
