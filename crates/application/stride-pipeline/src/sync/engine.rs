use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use stride_core::classify::{classify, ChangeDetection, Classification};
use stride_core::filter::{evaluate, FilterVerdict};
use stride_core::{expected_outputs, ActivityRecord, ActivitySummary, OutputKind};
use stride_infra::net::RemoteError;
use stride_persistence::ActivityStore;
use stride_scanner::{PresenceIndex, Scanner};

use crate::sync::writer::OutputWriter;
use crate::sync::{
    ActivityProvider, PassEvent, PassOptions, PassReport, PassStats, SyncError,
};

pub struct SyncEngine {
    provider: Box<dyn ActivityProvider>,
    store: Arc<dyn ActivityStore>,
    writer: OutputWriter,
    state_dir: Utf8PathBuf,
    options: PassOptions,
}

impl SyncEngine {
    pub fn with_components(
        provider: Box<dyn ActivityProvider>,
        store: Arc<dyn ActivityStore>,
        output_root: Utf8PathBuf,
        state_dir: Utf8PathBuf,
        options: PassOptions,
    ) -> Self {
        Self {
            provider,
            store,
            writer: OutputWriter::new(output_root),
            state_dir,
            options,
        }
    }

    /// One full pass: scan window selection, paged listing, classify,
    /// download, checkpoint. Per-activity state is committed as it is
    /// produced, so an interrupted pass resumes correctly; the checkpoint
    /// is only written after the whole pass succeeds.
    pub async fn run_pass(
        &self,
        now: DateTime<Utc>,
        progress: Option<Sender<PassEvent>>,
    ) -> Result<PassReport, SyncError> {
        let checkpoint = self.store.load_checkpoint(&self.state_dir)?;
        let full_scan = self.options.always_recheck_all_activities
            || checkpoint.last_full_scan_time.is_none();
        let cursor = if full_scan {
            None
        } else {
            checkpoint.last_incremental_cursor
        };

        info!(
            full_scan,
            cursor = cursor.map(|c| c.to_rfc3339()).unwrap_or_default(),
            "starting pass"
        );

        self.writer
            .ensure_layout()
            .map_err(|e| SyncError::OutputTree(e.to_string()))?;

        let root = self.writer.root().to_owned();
        let (presence, scan_stats) =
            tokio::task::spawn_blocking(move || Scanner::scan_output_tree(&root))
                .await
                .map_err(|e| SyncError::OutputTree(format!("scan join failed: {e}")))?
                .map_err(|e| SyncError::OutputTree(e.to_string()))?;
        debug!(
            matched = scan_stats.files_matched,
            ignored = scan_stats.files_ignored,
            "output tree scanned"
        );

        let mut stats = PassStats::default();
        let mut newest_seen: Option<DateTime<Utc>> = None;
        let mut oldest_unsettled: Option<DateTime<Utc>> = None;
        let mut start = 0usize;

        'pages: loop {
            let page = self
                .provider
                .list_activities(start, self.options.batch_size)
                .await
                .map_err(map_listing_error)?;
            if page.is_empty() {
                break;
            }
            if let Some(tx) = &progress {
                let _ = tx
                    .send(PassEvent::PageFetched {
                        start,
                        count: page.len(),
                    })
                    .await;
            }

            let page_len = page.len();
            for summary in page {
                stats.listed += 1;
                newest_seen = Some(match newest_seen {
                    Some(n) => n.max(summary.start_time),
                    None => summary.start_time,
                });

                if let Some(cursor) = cursor {
                    if summary.start_time <= cursor {
                        debug!(
                            activity_id = summary.id,
                            "reached incremental boundary, stopping listing"
                        );
                        break 'pages;
                    }
                }

                match evaluate(&summary, &self.options.filter, now) {
                    FilterVerdict::Exclude => {
                        stats.excluded += 1;
                        continue;
                    }
                    FilterVerdict::Defer => {
                        stats.deferred += 1;
                        oldest_unsettled = Some(match oldest_unsettled {
                            Some(o) => o.min(summary.start_time),
                            None => summary.start_time,
                        });
                        continue;
                    }
                    FilterVerdict::Include => {}
                }

                let settled = self
                    .process_one(&summary, &presence, &mut stats, &progress)
                    .await?;
                if !settled {
                    oldest_unsettled = Some(match oldest_unsettled {
                        Some(o) => o.min(summary.start_time),
                        None => summary.start_time,
                    });
                }
            }

            if page_len < self.options.batch_size {
                break;
            }
            start += self.options.batch_size;
        }

        // The cursor must never advance past work the next pass still owes:
        // deferred activities and units with failed outputs hold it back.
        let mut updated = checkpoint.clone();
        updated.last_incremental_cursor = match oldest_unsettled {
            Some(t) => Some(t - Duration::seconds(1)),
            None => match newest_seen {
                Some(n) => Some(
                    updated
                        .last_incremental_cursor
                        .map_or(n, |old| old.max(n)),
                ),
                None => updated.last_incremental_cursor,
            },
        };
        if full_scan {
            updated.last_full_scan_time = Some(now);
        }
        self.store.save_checkpoint(&self.state_dir, &updated)?;

        info!(
            listed = stats.listed,
            written = stats.outputs_written,
            failed = stats.outputs_failed,
            "pass complete"
        );

        Ok(PassReport {
            stats,
            full_scan,
            checkpoint: updated,
        })
    }

    /// Handle one included activity. Returns whether the activity is
    /// settled (complete, or untouched) after this pass; an activity with
    /// a failed output is not, and holds the checkpoint cursor back.
    async fn process_one(
        &self,
        summary: &ActivitySummary,
        presence: &PresenceIndex,
        stats: &mut PassStats,
        progress: &Option<Sender<PassEvent>>,
    ) -> Result<bool, SyncError> {
        let expected = expected_outputs(
            &summary.activity_type,
            &self.options.filter.excluded_output_kinds,
        );
        let stored = self.store.get(&self.state_dir, summary.id)?;
        let on_disk = presence.kinds_for(summary.id);
        let detection = if self.options.check_for_activity_changes {
            ChangeDetection::Fingerprint
        } else {
            ChangeDetection::PresenceOnly
        };

        let classification = classify(summary, &expected, stored.as_ref(), &on_disk, detection);

        let (mut record, to_fetch) = match classification {
            Classification::Unchanged => {
                stats.unchanged += 1;
                return Ok(true);
            }
            Classification::New => {
                stats.new += 1;
                debug!(activity_id = summary.id, "new activity");
                let record = ActivityRecord::from_summary(summary, expected.clone());
                (record, expected)
            }
            Classification::Modified => {
                stats.modified += 1;
                info!(
                    activity_id = summary.id,
                    "activity changed upstream, discarding local outputs"
                );
                for (kind, path) in presence.paths_for(summary.id) {
                    if let Err(e) = self.writer.remove(&path) {
                        warn!(activity_id = summary.id, %kind, "failed to remove stale output: {e}");
                    }
                }
                // Persist the new fingerprint with an emptied ledger before
                // any rewrite: a crash from here on classifies as
                // Incomplete, never as a false Unchanged.
                let record = ActivityRecord::from_summary(summary, expected.clone());
                self.store.upsert(&self.state_dir, &record)?;
                (record, expected)
            }
            Classification::Incomplete { missing } => {
                stats.incomplete += 1;
                debug!(activity_id = summary.id, missing = missing.len(), "incomplete activity");
                let mut record = match stored {
                    Some(record) => record,
                    None => ActivityRecord::from_summary(summary, expected.clone()),
                };
                record.expected_outputs = expected;
                record.present_outputs = record
                    .present_outputs
                    .intersection(&on_disk)
                    .copied()
                    .collect();
                (record, missing)
            }
        };

        let mut settled = true;
        // BTreeSet order puts Json first, matching the original's
        // json-then-exports write order.
        for kind in to_fetch {
            let payload = if kind == OutputKind::Json {
                bytes::Bytes::from(summary.dump())
            } else {
                match self.provider.fetch_export(summary.id, kind).await {
                    Ok(payload) => payload,
                    Err(e @ RemoteError::Auth(_)) => {
                        return Err(SyncError::Auth(e.to_string()));
                    }
                    Err(e) => {
                        warn!(activity_id = summary.id, %kind, "export failed: {e}");
                        stats.outputs_failed += 1;
                        settled = false;
                        if let Some(tx) = progress {
                            let _ = tx
                                .send(PassEvent::OutputFailed {
                                    id: summary.id,
                                    kind,
                                })
                                .await;
                        }
                        continue;
                    }
                }
            };

            match self.writer.write(&record, kind, &payload) {
                Ok(path) => {
                    record.present_outputs.insert(kind);
                    self.store.upsert(&self.state_dir, &record)?;
                    debug!(activity_id = summary.id, %kind, "saved {path}");
                    stats.outputs_written += 1;
                    stats.bytes_written += payload.len() as u64;
                    if let Some(tx) = progress {
                        let _ = tx
                            .send(PassEvent::OutputWritten {
                                id: summary.id,
                                kind,
                            })
                            .await;
                    }
                }
                Err(e) => {
                    warn!(activity_id = summary.id, %kind, "write failed: {e}");
                    stats.outputs_failed += 1;
                    settled = false;
                }
            }
        }

        if let Some(tx) = progress {
            let _ = tx.send(PassEvent::ActivityProcessed { id: summary.id }).await;
        }
        Ok(settled)
    }

}

fn map_listing_error(e: RemoteError) -> SyncError {
    if matches!(e, RemoteError::Auth(_)) {
        SyncError::Auth(e.to_string())
    } else {
        SyncError::Listing(e.to_string())
    }
}
