//! Result collection: immediate line output or a buffered map flushed at the end

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

/// Header line written before buffered records
pub const CSV_HEADER: &str = "Word,Index";

/// Write one `"<value>",<key>` record
pub fn write_record(out: &mut impl Write, key: u64, value: &str) -> io::Result<()> {
    writeln!(out, "\"{value}\",{key}")
}

enum Mode {
    /// Each record goes straight to the writer
    Immediate(Box<dyn Write + Send>),
    /// Records are kept until [`Collector::flush`]
    Buffered {
        records: FxHashMap<u64, String>,
        dest: Box<dyn Write + Send>,
    },
}

/// Thread-safe result collector.
///
/// All access to the writer or map goes through one mutex, held only for
/// the insert or the single-line write.
pub struct Collector {
    mode: Mutex<Mode>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("buffered", &self.is_buffered())
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Write every record as soon as it arrives (unordered)
    pub fn immediate(out: impl Write + Send + 'static) -> Self {
        Self {
            mode: Mutex::new(Mode::Immediate(Box::new(out))),
        }
    }

    /// Buffer records; header + sorted records are written to `dest` on flush
    pub fn buffered(dest: impl Write + Send + 'static) -> Self {
        Self {
            mode: Mutex::new(Mode::Buffered {
                records: FxHashMap::default(),
                dest: Box::new(dest),
            }),
        }
    }

    // Inserts and single-line writes leave the state consistent even if a
    // holder panicked, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Mode> {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_buffered(&self) -> bool {
        matches!(*self.lock(), Mode::Buffered { .. })
    }

    /// Accept one result
    pub fn collect(&self, key: u64, value: String) -> io::Result<()> {
        match &mut *self.lock() {
            Mode::Immediate(out) => write_record(out, key, &value),
            Mode::Buffered { records, .. } => {
                if records.insert(key, value).is_some() {
                    log::warn!("key {key} collected twice, keeping latest");
                }
                Ok(())
            }
        }
    }

    /// Records currently buffered (always 0 in immediate mode)
    pub fn buffered_len(&self) -> usize {
        match &*self.lock() {
            Mode::Immediate(_) => 0,
            Mode::Buffered { records, .. } => records.len(),
        }
    }

    /// Finish output and return the number of records written by the flush.
    ///
    /// Buffered: writes the header then every record sorted by key.
    /// Immediate: flushes the writer; records were already written.
    pub fn flush(self) -> io::Result<usize> {
        let mode = self.mode.into_inner().unwrap_or_else(PoisonError::into_inner);
        match mode {
            Mode::Immediate(mut out) => {
                out.flush()?;
                Ok(0)
            }
            Mode::Buffered { records, mut dest } => {
                let mut sorted: Vec<(u64, String)> = records.into_iter().collect();
                sorted.sort_unstable_by_key(|(k, _)| *k);

                let mut out = io::BufWriter::new(&mut dest);
                writeln!(out, "{CSV_HEADER}")?;
                for (key, value) in &sorted {
                    write_record(&mut out, *key, value)?;
                }
                out.flush()?;
                Ok(sorted.len())
            }
        }
    }
}
