// ABOUTME: Builds a deployable package from the pending change ledger and commits the ledger afterwards.
// ABOUTME: Snapshot read, per-kind resolution, XML serialization, durable write, manifest append, commit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use changeset_core::{
    ChangeKind, ChangeRecord, EntityKind, EntityResolver, LiveEntity, NameError, Package,
    RecordKey, ResolveError, SECTION_ORDER, SerializeError, SerializerRegistry, Unresolved,
    default_package_name, validate_package_name,
};
use changeset_store::{
    ArtifactError, ChangeLedger, DeliveryManifest, LedgerError, ManifestError, artifact_path,
    write_artifact,
};
use thiserror::Error;

use crate::config::CommitMode;

/// Errors that can end a build. Everything except `PartialCommit` leaves the
/// ledger exactly as it was before the build started.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("ledger error: {0}")]
    Storage(#[from] LedgerError),

    #[error("resolver error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("serialization error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("invalid package name: {0}")]
    InvalidName(#[from] NameError),

    #[error("package already exists: {}", .0.display())]
    ArtifactExists(PathBuf),

    #[error("failed to write package: {0}")]
    ArtifactWrite(#[from] ArtifactError),

    #[error("failed to append delivery manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("build cancelled before the package was written")]
    Cancelled,

    #[error(
        "package '{package}' was written to {} but the ledger could not be cleared: {source}",
        .artifact.display()
    )]
    PartialCommit {
        package: String,
        artifact: PathBuf,
        source: LedgerError,
    },
}

impl BuildError {
    /// Whether the ledger is guaranteed unchanged, so the build can simply
    /// be run again.
    pub fn ledger_untouched(&self) -> bool {
        !matches!(self, BuildError::PartialCommit { .. })
    }
}

/// Where and how builds write their output and commit the ledger.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output_dir: PathBuf,
    pub commit_mode: CommitMode,
    /// When set, every build appends to `<delivery_log>.delivery` instead of
    /// a per-package `<package>.delivery` file.
    pub delivery_log: Option<String>,
    pub no_clobber: bool,
    pub include_partial_views: bool,
}

impl BuildOptions {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            commit_mode: CommitMode::default(),
            delivery_log: None,
            no_clobber: false,
            include_partial_views: false,
        }
    }

    fn section_order(&self) -> Vec<EntityKind> {
        let mut order = SECTION_ORDER.to_vec();
        if self.include_partial_views {
            order.push(EntityKind::PartialView);
        }
        order
    }
}

/// A cancellation flag shared between a running build and whoever may
/// cancel it. Honoured up to the artifact write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Parameters of a single build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Operator-supplied package name; the timestamp default when `None`.
    pub name: Option<String>,
    pub cancel: CancelFlag,
}

impl BuildRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Phases of a single build, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Reading,
    Resolving,
    Serializing,
    Writing,
    Committing,
    Done,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildPhase::Reading => "reading",
            BuildPhase::Resolving => "resolving",
            BuildPhase::Serializing => "serializing",
            BuildPhase::Writing => "writing",
            BuildPhase::Committing => "committing",
            BuildPhase::Done => "done",
        };
        f.write_str(label)
    }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub package_name: String,
    pub artifact_path: PathBuf,
    pub manifest_path: PathBuf,
    /// Entity count per packaged section, in section order.
    pub sections: Vec<(EntityKind, usize)>,
    /// Changed names with no live entity at build time.
    pub unresolved: Vec<Unresolved>,
    /// Deleted records, skipped from the package and noted here.
    pub noted_deletions: Vec<ChangeRecord>,
    /// Saved records of kinds this build does not package.
    pub unpackaged: Vec<ChangeRecord>,
    /// Ledger records removed by the commit.
    pub committed: usize,
}

/// Result of a build that did not fail.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// The ledger was empty; nothing was written and nothing was cleared.
    NoChanges,
    Built(BuildReport),
}

/// A package and the records it deliberately left out.
struct Assembled {
    package: Package,
    unpackaged: Vec<ChangeRecord>,
}

/// Compiles pending ledger records into a package artifact.
pub struct PackageBuilder {
    ledger: Arc<dyn ChangeLedger>,
    resolver: Arc<dyn EntityResolver>,
    serializers: SerializerRegistry,
    options: BuildOptions,
    build_lock: Mutex<()>,
}

impl PackageBuilder {
    /// A builder using the built-in serializers.
    pub fn new(
        ledger: Arc<dyn ChangeLedger>,
        resolver: Arc<dyn EntityResolver>,
        options: BuildOptions,
    ) -> Self {
        let serializers = SerializerRegistry::with_defaults();
        Self::with_serializers(ledger, resolver, serializers, options)
    }

    pub fn with_serializers(
        ledger: Arc<dyn ChangeLedger>,
        resolver: Arc<dyn EntityResolver>,
        serializers: SerializerRegistry,
        options: BuildOptions,
    ) -> Self {
        Self {
            ledger,
            resolver,
            serializers,
            options,
            build_lock: Mutex::new(()),
        }
    }

    /// Run one build. Builds in the same process are serialized.
    pub fn build(&self, request: BuildRequest) -> Result<BuildOutcome, BuildError> {
        // The lock only orders builds; a panicked build leaves nothing to repair.
        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        enter(BuildPhase::Reading);
        let records = self.ledger.read_all()?;
        if records.is_empty() {
            tracing::info!("no changes recorded; nothing written to disk");
            return Ok(BuildOutcome::NoChanges);
        }

        let name = match request.name.as_deref() {
            Some(name) => validate_package_name(name)?,
            None => default_package_name(),
        };

        let target = artifact_path(&self.options.output_dir, &name);
        if self.options.no_clobber && target.exists() {
            return Err(BuildError::ArtifactExists(target));
        }
        request.cancel.check()?;

        enter(BuildPhase::Resolving);
        let Assembled {
            package,
            unpackaged,
        } = self.assemble(name, &records)?;
        request.cancel.check()?;

        enter(BuildPhase::Serializing);
        let document = self.serializers.render_package(&package)?;
        request.cancel.check()?;

        enter(BuildPhase::Writing);
        let artifact = write_artifact(&self.options.output_dir, &package.name, &document)?;
        let manifest_path = self.append_manifest(&package.name)?;

        enter(BuildPhase::Committing);
        let committed = self.commit(&records).map_err(|source| {
            tracing::warn!(
                "package '{}' written but ledger commit failed: {}",
                package.name,
                source
            );
            BuildError::PartialCommit {
                package: package.name.clone(),
                artifact: artifact.clone(),
                source,
            }
        })?;

        enter(BuildPhase::Done);
        tracing::info!(
            "packaged {} entities into '{}' ({} ledger records committed)",
            package.entity_count(),
            package.name,
            committed
        );

        Ok(BuildOutcome::Built(BuildReport {
            sections: package
                .sections
                .iter()
                .map(|s| (s.kind, s.entities.len()))
                .collect(),
            package_name: package.name,
            artifact_path: artifact,
            manifest_path,
            unresolved: package.unresolved,
            noted_deletions: package.noted_deletions,
            unpackaged,
            committed,
        }))
    }

    /// Partition records by kind, resolve each populated kind once, and
    /// assemble the package in section order.
    fn assemble(&self, name: String, records: &[ChangeRecord]) -> Result<Assembled, BuildError> {
        let order = self.options.section_order();
        let mut changed: BTreeMap<EntityKind, BTreeSet<&str>> = BTreeMap::new();
        let mut noted_deletions = Vec::new();
        let mut unpackaged = Vec::new();

        for record in records {
            match record.change_kind {
                ChangeKind::Deleted => noted_deletions.push(record.clone()),
                ChangeKind::Saved if !order.contains(&record.kind) => {
                    unpackaged.push(record.clone());
                }
                ChangeKind::Saved => {
                    changed.entry(record.kind).or_default().insert(&record.name);
                }
            }
        }

        for record in &noted_deletions {
            tracing::info!("skipping deleted {} '{}'", record.kind, record.name);
        }
        for record in &unpackaged {
            tracing::debug!("{} '{}' is tracked but not packaged", record.kind, record.name);
        }

        let mut resolved: BTreeMap<EntityKind, Vec<LiveEntity>> = BTreeMap::new();
        let mut unresolved = Vec::new();

        for (kind, names) in &changed {
            let mut seen = BTreeSet::new();
            let matched: Vec<LiveEntity> = self
                .resolver
                .resolve_all(*kind)?
                .into_iter()
                .filter(|entity| names.contains(entity.name.as_str()))
                .filter(|entity| seen.insert(entity.name.clone()))
                .collect();

            for name in names {
                if !seen.contains(*name) {
                    tracing::debug!("{} '{}' has no live entity; leaving it out", kind, name);
                    unresolved.push(Unresolved {
                        kind: *kind,
                        name: name.to_string(),
                    });
                }
            }

            resolved.insert(*kind, matched);
        }

        let mut package = Package::assemble(name, resolved, &order);
        package.unresolved = unresolved;
        package.noted_deletions = noted_deletions;

        Ok(Assembled {
            package,
            unpackaged,
        })
    }

    fn append_manifest(&self, package_name: &str) -> Result<PathBuf, ManifestError> {
        let log = self.options.delivery_log.as_deref();
        let stem = log.unwrap_or(package_name);
        let mut manifest = DeliveryManifest::open(&self.options.output_dir, stem)?;
        manifest.append(package_name)?;
        Ok(manifest.path().to_path_buf())
    }

    fn commit(&self, records: &[ChangeRecord]) -> Result<usize, LedgerError> {
        match self.options.commit_mode {
            CommitMode::Snapshot => {
                let keys: Vec<RecordKey> = records.iter().map(ChangeRecord::key).collect();
                self.ledger.remove(&keys)
            }
            CommitMode::Truncate => self.ledger.clear(),
        }
    }
}

fn enter(phase: BuildPhase) {
    tracing::debug!("build phase: {}", phase);
}
