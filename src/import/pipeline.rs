//! Batch import orchestration
//!
//! Files are processed strictly one at a time, in submission order. A file
//! that fails at any stage becomes an entry in the outcome; the batch always
//! runs to the end.

use super::config::{ImportConfig, ImportMode};
use super::source::{scan_directory, AudioSource, DiskFile};
use crate::analysis::AudioAnalyzer;
use crate::error::ImportError;
use crate::model::{AudioFeatures, Beat, FileRef, ImportOutcome, ImportProgress};
use crate::store::BeatStore;
use std::io;
use std::path::Path;

/// Main import pipeline
pub struct ImportPipeline<A: AudioAnalyzer, S: BeatStore> {
    config: ImportConfig,
    analyzer: A,
    store: S,
}

impl<A: AudioAnalyzer, S: BeatStore> ImportPipeline<A, S> {
    /// Create a new import pipeline
    pub fn new(config: ImportConfig, analyzer: A, store: S) -> Self {
        Self {
            config,
            analyzer,
            store,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Import a flat collection of files
    ///
    /// Each file is read once; the stored beat keeps a copy of exactly the
    /// bytes that were analyzed.
    pub fn import_files<I, F>(&self, files: I, progress: impl FnMut(&ImportProgress)) -> ImportOutcome
    where
        I: IntoIterator<Item = F>,
        F: AudioSource,
    {
        self.run_flat(files, ImportOutcome::new(), progress)
    }

    /// Import every matching file yielded by a directory scan
    ///
    /// Each stored beat keeps the path of the original file. Scan errors are
    /// recorded as failures and the walk continues.
    pub fn import_tree<I>(&self, entries: I, mut progress: impl FnMut(&ImportProgress)) -> ImportOutcome
    where
        I: IntoIterator<Item = Result<DiskFile, walkdir::Error>>,
    {
        log::info!("Starting recursive import");
        let mut outcome = ImportOutcome::new();
        let mut index = 0;

        for entry in entries {
            let (label, result) = match entry {
                Ok(file) => {
                    if !self.config.accepts(file.name()) {
                        log::trace!("Skipping {:?}", file.path());
                        continue;
                    }
                    index += 1;
                    log::info!("[{}] Analyzing: {}", index, file.path().display());
                    (file.name().to_string(), self.import_handle(&file))
                }
                Err(e) => {
                    index += 1;
                    let label = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    (label, Err(ImportError::Scan(e)))
                }
            };

            Self::record(&mut outcome, &label, result);
            progress(&ImportProgress {
                index,
                total: None,
                file: label,
                imported_count: outcome.imported_count,
                failed_count: outcome.failed_count(),
            });
        }

        log::info!("Import complete: {}", outcome.summary());
        outcome
    }

    /// Import the audio files under `root`
    ///
    /// Both modes take every matching file in the tree. `Flat` stores a copy
    /// of each file's bytes; `Recursive` stores paths.
    pub fn import_directory(
        &self,
        root: &Path,
        mode: ImportMode,
        progress: impl FnMut(&ImportProgress),
    ) -> ImportOutcome {
        log::info!("Importing from {:?} ({:?})", root, mode);
        match mode {
            ImportMode::Recursive => {
                self.import_tree(scan_directory(root, self.config.follow_links), progress)
            }
            ImportMode::Flat => {
                let mut outcome = ImportOutcome::new();
                let mut files = Vec::new();
                for entry in scan_directory(root, self.config.follow_links) {
                    match entry {
                        Ok(file) => files.push(file),
                        Err(e) => {
                            let label = e
                                .path()
                                .unwrap_or(root)
                                .display()
                                .to_string();
                            log::warn!("Failed to list {}: {}", label, e);
                            outcome.record_failure(label, e.to_string());
                        }
                    }
                }
                self.run_flat(files, outcome, progress)
            }
        }
    }

    fn run_flat<I, F>(
        &self,
        files: I,
        mut outcome: ImportOutcome,
        mut progress: impl FnMut(&ImportProgress),
    ) -> ImportOutcome
    where
        I: IntoIterator<Item = F>,
        F: AudioSource,
    {
        let candidates: Vec<F> = files
            .into_iter()
            .filter(|f| self.config.accepts(f.name()))
            .collect();
        let total = candidates.len();
        log::info!("Importing {} files", total);

        for (i, file) in candidates.iter().enumerate() {
            log::info!("[{}/{}] Analyzing: {}", i + 1, total, file.name());

            let result = self.import_copy(file);
            Self::record(&mut outcome, file.name(), result);

            progress(&ImportProgress {
                index: i + 1,
                total: Some(total),
                file: file.name().to_string(),
                imported_count: outcome.imported_count,
                failed_count: outcome.failed_count(),
            });
        }

        log::info!("Import complete: {}", outcome.summary());
        outcome
    }

    /// Read a file once, analyze that copy and store it
    fn import_copy(&self, file: &dyn AudioSource) -> Result<String, ImportError> {
        let bytes = file.read_bytes().map_err(|source| ImportError::Read {
            name: file.name().to_string(),
            source,
        })?;
        let features = self.analyze(&Snapshot {
            name: file.name(),
            bytes: &bytes,
        })?;
        self.persist(file.name(), &features, FileRef::Blob(bytes))
    }

    fn import_handle(&self, file: &DiskFile) -> Result<String, ImportError> {
        let features = self.analyze(file)?;
        self.persist(
            file.name(),
            &features,
            FileRef::Handle(file.path().to_path_buf()),
        )
    }

    fn analyze(&self, file: &dyn AudioSource) -> Result<AudioFeatures, ImportError> {
        let features = self.analyzer.analyze(file)?;
        log::debug!(
            "{}: {:.2} BPM, {}, energy {:.3}",
            file.name(),
            features.bpm,
            features.key,
            features.energy
        );
        Ok(features)
    }

    fn persist(
        &self,
        title: &str,
        features: &AudioFeatures,
        file: FileRef,
    ) -> Result<String, ImportError> {
        let beat =
            Beat::from_features(title, features, file).map_err(ImportError::InvalidBeat)?;
        Ok(self.store.put(&beat)?)
    }

    fn record(outcome: &mut ImportOutcome, file: &str, result: Result<String, ImportError>) {
        match result {
            Ok(id) => {
                log::debug!("Stored {} as {}", file, id);
                outcome.record_success();
            }
            Err(e) => {
                log::warn!("Failed to import {}: {}", file, e);
                outcome.record_failure(file, e.to_string());
            }
        }
    }
}

/// Bytes already read from a source, analyzed under the source's name
struct Snapshot<'a> {
    name: &'a str,
    bytes: &'a [u8],
}

impl AudioSource for Snapshot<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}
