use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::announce::Amount;

/// Errors from reading or writing the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem failure
    #[error("ledger I/O failed at {path}: {source}")]
    Io {
        /// Ledger file
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Ledger file exists but is not valid
    #[error("ledger file {path} is corrupt: {message}")]
    Corrupt {
        /// Ledger file
        path: String,
        /// Parser message
        message: String,
    },

    /// Ledger contents could not be serialized
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Stored amount is out of range
    #[error("stored amount is invalid")]
    InvalidAmount,
}

/// Last announced transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastTx {
    /// Transaction hash
    pub hash: String,
    /// Amount that was announced
    pub amount: Amount,
}

/// Remembers the last processed transaction across restarts
#[cfg_attr(test, mockall::automock)]
pub trait DedupStore: Send {
    /// Last recorded transaction, if any
    fn last(&self) -> Option<LastTx>;

    /// Records `hash` as processed with `amount`
    ///
    /// # Errors
    /// Returns [`LedgerError`] if the record cannot be persisted
    fn record(&mut self, hash: &str, amount: Amount) -> Result<(), LedgerError>;
}

/// Ledger kept in memory only
#[derive(Debug, Default)]
pub struct MemoryLedger {
    last: Option<LastTx>,
}

impl MemoryLedger {
    /// Creates an empty ledger
    pub const fn new() -> Self {
        Self { last: None }
    }
}

impl DedupStore for MemoryLedger {
    fn last(&self) -> Option<LastTx> {
        self.last.clone()
    }

    fn record(&mut self, hash: &str, amount: Amount) -> Result<(), LedgerError> {
        self.last = Some(LastTx {
            hash: hash.to_owned(),
            amount,
        });
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    last_tx: Option<String>,
    #[serde(default)]
    last_amount: Option<StoredAmount>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAmount {
    major: u64,
    minor: u8,
}

/// Ledger persisted as a small TOML file
///
/// Writes go to a temporary file that is renamed over the old one.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    last: Option<LastTx>,
}

impl FileLedger {
    /// Opens the ledger at `path`; a missing file is an empty ledger
    ///
    /// # Errors
    /// Returns [`LedgerError`] if the file exists but cannot be read or parsed
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let last = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| LedgerError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let file: LedgerFile =
                toml::from_str(&contents).map_err(|e| LedgerError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            Self::decode(file)?
        } else {
            debug!(path = %path.display(), "no ledger file yet");
            None
        };

        if let Some(last) = &last {
            info!(
                hash = %last.hash,
                amount = %last.amount,
                "retrieved last processed transaction"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            last,
        })
    }

    fn decode(file: LedgerFile) -> Result<Option<LastTx>, LedgerError> {
        let Some(hash) = file.last_tx else {
            return Ok(None);
        };

        let amount = match file.last_amount {
            Some(stored) => {
                let major = i64::try_from(stored.major).map_err(|_| LedgerError::InvalidAmount)?;
                Amount::new(major, i64::from(stored.minor))
                    .map_err(|_| LedgerError::InvalidAmount)?
            }
            None => Amount::ZERO,
        };

        Ok(Some(LastTx { hash, amount }))
    }

    fn write(&self, file: &LedgerFile) -> Result<(), LedgerError> {
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = toml::to_string(file)?;
        let temp_path = self.path.with_extension("tmp");

        let mut temp = fs::File::create(&temp_path).map_err(io_err)?;
        temp.write_all(contents.as_bytes()).map_err(io_err)?;
        temp.sync_all().map_err(io_err)?;
        drop(temp);

        fs::rename(&temp_path, &self.path).map_err(io_err)
    }
}

impl DedupStore for FileLedger {
    fn last(&self) -> Option<LastTx> {
        self.last.clone()
    }

    fn record(&mut self, hash: &str, amount: Amount) -> Result<(), LedgerError> {
        let file = LedgerFile {
            last_tx: Some(hash.to_owned()),
            last_amount: Some(StoredAmount {
                major: amount.major(),
                minor: amount.minor(),
            }),
        };
        self.write(&file)?;

        self.last = Some(LastTx {
            hash: hash.to_owned(),
            amount,
        });
        info!(hash = %hash, amount = %amount, "saved last processed transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(major: i64, minor: i64) -> Amount {
        Amount::new(major, minor).unwrap()
    }

    #[test]
    fn test_memory_ledger_starts_empty() {
        let mut ledger = MemoryLedger::new();
        assert_eq!(ledger.last(), None);

        ledger.record("0xabc", amount(5, 50)).unwrap();
        assert_eq!(
            ledger.last(),
            Some(LastTx {
                hash: "0xabc".to_owned(),
                amount: amount(5, 50)
            })
        );
    }

    #[test]
    fn test_file_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(&dir.path().join("ledger.toml")).unwrap();
        assert_eq!(ledger.last(), None);
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.toml");

        let mut ledger = FileLedger::open(&path).unwrap();
        ledger.record("0x1", amount(100, 0)).unwrap();
        ledger.record("0x2", amount(1050, 25)).unwrap();
        drop(ledger);

        let reopened = FileLedger::open(&path).unwrap();
        assert_eq!(
            reopened.last(),
            Some(LastTx {
                hash: "0x2".to_owned(),
                amount: amount(1050, 25)
            })
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_ledger_hash_without_amount() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "last_tx = \"0xold\"\n").unwrap();

        let ledger = FileLedger::open(&path).unwrap();
        assert_eq!(ledger.last().unwrap().amount, Amount::ZERO);
    }

    #[test]
    fn test_file_ledger_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "last_tx = [[[").unwrap();

        assert!(matches!(
            FileLedger::open(&path),
            Err(LedgerError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_file_ledger_rejects_out_of_range_amount() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(
            &path,
            "last_tx = \"0x1\"\n\n[last_amount]\nmajor = 5\nminor = 150\n",
        )
        .unwrap();

        assert!(matches!(
            FileLedger::open(&path),
            Err(LedgerError::InvalidAmount)
        ));
    }
}
