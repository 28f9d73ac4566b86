use std::{fs::File, io, sync::Arc};

use karaoke_core::{BatchArchive, BatchCompletion, EventSink, GroupSummary, PipelineEvent};
use karaoke_paths::{OutputLayout, batch_archive_name, group_archive_name};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::{CompressionMethod, DateTime, write::SimpleFileOptions};

use crate::{config::GroupingPolicy, error::PipelineError, packing::write_zip, reorder::ReorderBuffer};

/// Resultado del agrupador al terminar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub groups: Vec<GroupSummary>,
    /// Lotes que quedaron sueltos sin grupo (solo tras una cancelación).
    pub ungrouped_batches: Vec<usize>,
}

/// Junta los `{b}.zip` en `karaoke_{g}.zip` siguiendo el orden de lote, no el
/// de finalización. Es el único dueño de su acumulador.
pub struct ArchiveGrouper {
    layout: OutputLayout,
    limit: u64,
    policy: GroupingPolicy,
    keep_batch_archives: bool,
    buffer: ReorderBuffer<Arc<BatchCompletion>>,
    current: Vec<(usize, BatchArchive)>,
    current_size: u64,
    sealed: Vec<GroupSummary>,
}

impl ArchiveGrouper {
    pub fn new(layout: OutputLayout, limit: u64, policy: GroupingPolicy) -> Self {
        Self {
            layout,
            limit: limit.max(1),
            policy,
            keep_batch_archives: false,
            buffer: ReorderBuffer::new(),
            current: Vec::new(),
            current_size: 0,
            sealed: Vec::new(),
        }
    }

    pub fn keep_batch_archives(mut self, keep: bool) -> Self {
        self.keep_batch_archives = keep;
        self
    }

    /// Recibe un resultado en cualquier orden. Devuelve los grupos que se cerraron.
    pub fn accept(&mut self, completion: Arc<BatchCompletion>) -> Result<Vec<GroupSummary>, PipelineError> {
        let index = completion.batch_index;
        if !self.buffer.insert(index, completion) {
            warn!(batch = index, "duplicate batch completion ignored");
            return Ok(Vec::new());
        }

        let mut sealed = Vec::new();
        while let Some(ready) = self.buffer.pop_ready() {
            // lotes fallidos o vacíos solo avanzan el cursor
            if let Some(archive) = ready.archive() {
                sealed.extend(self.add(ready.batch_index, archive.clone())?);
            }
        }
        Ok(sealed)
    }

    fn add(&mut self, batch: usize, archive: BatchArchive) -> Result<Option<GroupSummary>, PipelineError> {
        let size = archive.size_bytes;
        match self.policy {
            GroupingPolicy::SealBeforeAdd => {
                let sealed = if !self.current.is_empty() && self.current_size + size > self.limit {
                    Some(self.seal()?)
                } else {
                    None
                };
                self.push(batch, archive);
                Ok(sealed)
            }
            GroupingPolicy::SealAfterAdd => {
                self.push(batch, archive);
                if self.current_size >= self.limit {
                    Ok(Some(self.seal()?))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn push(&mut self, batch: usize, archive: BatchArchive) {
        self.current_size += archive.size_bytes;
        self.current.push((batch, archive));
    }

    fn seal(&mut self) -> Result<GroupSummary, PipelineError> {
        let group = self.sealed.len();
        let dest = self.layout.group_archive(group);
        let members = std::mem::take(&mut self.current);
        let size_bytes = std::mem::take(&mut self.current_size);

        write_zip::<PipelineError, _>(&dest, |zip| {
            for (batch, archive) in &members {
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(DateTime::default())
                    .large_file(archive.size_bytes >= u32::MAX as u64);
                zip.start_file(batch_archive_name(*batch), options)?;
                io::copy(&mut File::open(&archive.path)?, zip)?;
            }
            Ok(true)
        })?;

        if !self.keep_batch_archives {
            for (_, archive) in &members {
                if let Err(e) = std::fs::remove_file(&archive.path) {
                    warn!(path = %archive.path.display(), error = %e, "could not remove grouped batch archive");
                }
            }
        }

        let summary = GroupSummary {
            group,
            file: group_archive_name(group),
            batches: members.iter().map(|(b, _)| *b).collect(),
            size_bytes,
        };
        info!(group, batches = summary.batches.len(), size_bytes, "group sealed");
        self.sealed.push(summary.clone());
        Ok(summary)
    }

    /// Fin del flujo: cierra el último grupo si tiene algo.
    pub fn finish(mut self) -> Result<(GroupReport, Option<GroupSummary>), PipelineError> {
        if !self.buffer.is_empty() {
            warn!(
                waiting_for = self.buffer.next_expected(),
                held = self.buffer.pending(),
                "stream ended with batches still waiting for an earlier one"
            );
        }
        let last = if self.current.is_empty() {
            None
        } else {
            Some(self.seal()?)
        };
        Ok((
            GroupReport {
                groups: self.sealed,
                ungrouped_batches: Vec::new(),
            },
            last,
        ))
    }

    /// Cancelación: no se cierra el grupo en curso; sus lotes quedan en disco.
    pub fn abandon(self) -> GroupReport {
        GroupReport {
            groups: self.sealed,
            ungrouped_batches: self.current.into_iter().map(|(b, _)| b).collect(),
        }
    }

    /// Bucle del consumidor; pensado para correr en `spawn_blocking`.
    pub fn run_blocking(
        mut self,
        mut completions: mpsc::UnboundedReceiver<Arc<BatchCompletion>>,
        cancel: CancellationToken,
        sink: Arc<dyn EventSink>,
    ) -> Result<GroupReport, PipelineError> {
        let announce = |g: &GroupSummary| {
            sink.emit(PipelineEvent::GroupSealed {
                group_index: g.group,
                batches: g.batches.clone(),
                size_bytes: g.size_bytes,
            })
        };

        while let Some(completion) = completions.blocking_recv() {
            if cancel.is_cancelled() {
                break;
            }
            debug!(batch = completion.batch_index, "grouper received batch");
            for g in self.accept(completion)? {
                announce(&g);
            }
        }

        if cancel.is_cancelled() {
            let report = self.abandon();
            info!(
                sealed = report.groups.len(),
                ungrouped = report.ungrouped_batches.len(),
                "grouping cancelled, last group left unsealed"
            );
            return Ok(report);
        }

        let (report, last) = self.finish()?;
        if let Some(g) = &last {
            announce(g);
        }
        Ok(report)
    }
}
