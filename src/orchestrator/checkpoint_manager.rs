//! Checkpoint save, restore, export, and branching across both backends.
//!
//! The JSON file store is always written and is authoritative for export.
//! The relational store is optional; when configured it receives an
//! independent copy on every save and is consulted first on restore.

use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};

use crate::models::checkpoint::{Checkpoint, CheckpointMetadata, CheckpointParent, CheckpointReason};
use crate::models::diff;
use crate::models::state::RuntimeState;
use crate::persistence::checkpoint_repo::CheckpointRepo;
use crate::persistence::file_store::FileCheckpointStore;
use crate::{AppError, Result};

/// Identity and clock of the execution a checkpoint belongs to.
#[derive(Debug, Clone)]
pub struct CheckpointScope {
    /// Owning execution.
    pub execution_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Human-readable agent name.
    pub agent_name: Option<String>,
    /// When the execution started; drives `metadata.duration_ms`.
    pub started_at: Instant,
}

impl CheckpointScope {
    /// Scope for an execution starting now.
    #[must_use]
    pub fn new(execution_id: String, agent_id: String, agent_name: Option<String>) -> Self {
        Self {
            execution_id,
            agent_id,
            agent_name,
            started_at: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the execution started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Optional lineage and labels for a save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions<'a> {
    /// Checkpoint the new one follows; enables the diff.
    pub parent: Option<&'a Checkpoint>,
    /// Whether the new checkpoint forks from `parent`.
    pub is_branch: bool,
    /// Why the fork was taken.
    pub branch_reason: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
}

impl<'a> SaveOptions<'a> {
    /// Options that linearly follow `parent`, if any.
    #[must_use]
    pub fn following(parent: Option<&'a Checkpoint>) -> Self {
        Self {
            parent,
            ..Self::default()
        }
    }
}

/// Result of the relational half of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationalWrite {
    /// No relational store is configured.
    Skipped,
    /// Rows were written.
    Written,
    /// The write failed; the file checkpoint still stands.
    Failed(String),
}

/// A saved checkpoint and the outcome of its relational write.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// The checkpoint as written to the file store.
    pub checkpoint: Checkpoint,
    /// Relational write outcome.
    pub relational: RelationalWrite,
}

/// Coordinates the file and relational checkpoint backends.
#[derive(Clone)]
pub struct CheckpointManager {
    files: FileCheckpointStore,
    repo: Option<CheckpointRepo>,
}

impl CheckpointManager {
    /// Create a manager over a file store and an optional relational store.
    #[must_use]
    pub fn new(files: FileCheckpointStore, repo: Option<CheckpointRepo>) -> Self {
        Self { files, repo }
    }

    /// The file backend.
    #[must_use]
    pub fn files(&self) -> &FileCheckpointStore {
        &self.files
    }

    /// The relational backend, if configured.
    #[must_use]
    pub fn repo(&self) -> Option<&CheckpointRepo> {
        self.repo.as_ref()
    }

    /// Snapshot `state` with no lineage.
    ///
    /// # Errors
    ///
    /// See [`CheckpointManager::save_with`].
    pub async fn save(
        &self,
        scope: &CheckpointScope,
        state: &RuntimeState,
        reason: CheckpointReason,
    ) -> Result<SaveOutcome> {
        self.save_with(scope, state, reason, SaveOptions::default())
            .await
    }

    /// Snapshot `state`, validate it, and write it to both backends.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the checkpoint fails schema
    /// validation, or `AppError::Io` if the file write fails. Relational
    /// failures are reported in [`SaveOutcome::relational`] instead.
    pub async fn save_with(
        &self,
        scope: &CheckpointScope,
        state: &RuntimeState,
        reason: CheckpointReason,
        options: SaveOptions<'_>,
    ) -> Result<SaveOutcome> {
        let metadata = CheckpointMetadata {
            step_number: state.progress.step_number,
            total_steps_estimate: state.progress.total_steps_estimate,
            tokens_used: state.progress.tokens_used,
            duration_ms: scope.elapsed_ms(),
            checkpoint_reason: reason,
            agent_name: scope.agent_name.clone(),
            agent_id: scope.agent_id.clone(),
        };
        let mut checkpoint = Checkpoint::new(
            scope.execution_id.clone(),
            scope.agent_id.clone(),
            state.clone(),
            metadata,
        );
        if let Some(parent) = options.parent {
            checkpoint.diff = Some(diff::compute(&parent.id, &parent.snapshot, state));
            checkpoint.parent = Some(CheckpointParent {
                checkpoint_id: parent.id.clone(),
                is_branch: options.is_branch,
                branch_reason: options.branch_reason,
            });
        }
        checkpoint.name = options.name;
        checkpoint.description = options.description;

        let span = info_span!(
            "save_checkpoint",
            checkpoint_id = %checkpoint.id,
            execution_id = %scope.execution_id,
            reason = reason.as_str()
        );
        self.persist(checkpoint).instrument(span).await
    }

    async fn persist(&self, checkpoint: Checkpoint) -> Result<SaveOutcome> {
        checkpoint.validate()?;
        self.files.write(&checkpoint).await?;

        let relational = match &self.repo {
            None => RelationalWrite::Skipped,
            Some(repo) => match repo.create(&checkpoint).await {
                Ok(()) => RelationalWrite::Written,
                Err(err) => {
                    warn!(
                        checkpoint_id = %checkpoint.id,
                        %err,
                        "relational checkpoint write failed; file checkpoint retained"
                    );
                    RelationalWrite::Failed(err.to_string())
                }
            },
        };

        info!(
            checkpoint_id = %checkpoint.id,
            step_number = checkpoint.metadata.step_number,
            relational = ?relational,
            "checkpoint saved"
        );
        Ok(SaveOutcome {
            checkpoint,
            relational,
        })
    }

    /// Load a checkpoint, relational store first, then the file store.
    ///
    /// A relational lookup error other than validation is logged and the
    /// file store is tried.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if neither backend holds `id`, or
    /// `AppError::Validation` if the stored record is malformed.
    pub async fn restore_checkpoint(&self, id: &str) -> Result<Checkpoint> {
        let span = info_span!("restore_checkpoint", checkpoint_id = id);
        async {
            if let Some(repo) = &self.repo {
                match repo.get_by_id(id).await {
                    Ok(Some(checkpoint)) => {
                        info!(source = "relational", "checkpoint restored");
                        return Ok(checkpoint);
                    }
                    Ok(None) => {}
                    Err(err @ AppError::Validation(_)) => return Err(err),
                    Err(err) => {
                        warn!(%err, "relational restore failed; trying file store");
                    }
                }
            }

            match self.files.read(id).await? {
                Some(checkpoint) => {
                    info!(source = "file", "checkpoint restored");
                    Ok(checkpoint)
                }
                None => Err(AppError::NotFound(format!("checkpoint {id}"))),
            }
        }
        .instrument(span)
        .await
    }

    /// Restore the runtime state captured by checkpoint `id`.
    ///
    /// # Errors
    ///
    /// Same as [`CheckpointManager::restore_checkpoint`].
    pub async fn restore(&self, id: &str) -> Result<RuntimeState> {
        let checkpoint = self.restore_checkpoint(id).await?;
        RuntimeState::load_from_snapshot(checkpoint.snapshot)
    }

    /// Read-only retrieval of a full checkpoint, file store first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if neither backend holds `id`, or
    /// `AppError::Validation` if the stored record is malformed.
    pub async fn export(&self, id: &str) -> Result<Checkpoint> {
        if let Some(checkpoint) = self.files.read(id).await? {
            return Ok(checkpoint);
        }
        if let Some(repo) = &self.repo {
            if let Some(checkpoint) = repo.get_by_id(id).await? {
                return Ok(checkpoint);
            }
        }
        Err(AppError::NotFound(format!("checkpoint {id}")))
    }

    /// Fork checkpoint `id` into a new branch checkpoint.
    ///
    /// The branch carries the source snapshot unchanged, reason `branch`,
    /// and a parent link with `is_branch = true`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` does not exist, plus any error
    /// from [`CheckpointManager::save_with`].
    pub async fn branch(&self, id: &str, reason: &str) -> Result<SaveOutcome> {
        let source = self.restore_checkpoint(id).await?;
        let scope = CheckpointScope {
            execution_id: source.execution_id.clone(),
            agent_id: source.agent_id.clone(),
            agent_name: source.metadata.agent_name.clone(),
            started_at: Instant::now(),
        };
        let options = SaveOptions {
            parent: Some(&source),
            is_branch: true,
            branch_reason: Some(reason.to_owned()),
            name: None,
            description: Some(format!("branch of {id}: {reason}")),
        };
        self.save_with(&scope, &source.snapshot, CheckpointReason::Branch, options)
            .await
    }
}
