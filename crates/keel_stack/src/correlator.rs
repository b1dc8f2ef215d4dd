//! Projection of provisioning events onto progress phases.
//!
//! A [`PhaseTable`] is an ordered list of `(matcher, expected count)` pairs.
//! Every event is offered to every phase; a phase counts each distinct
//! logical resource that reaches `Complete` once, up to its expected count.
//! Rows are always reported in declared order, whatever order events arrive in.
//!
//! The rows are a projection for display. Whether the stack succeeded is
//! decided by the stream's terminal result alone.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::{EventStream, StackOutputs};
use crate::error::{StackError, StackResult};
use crate::event::{ProvisioningEvent, ResourceStatus};

/// Predicate deciding whether an event belongs to a phase.
pub type ResourceMatcher = Box<dyn Fn(&ProvisioningEvent) -> bool + Send + Sync>;

/// A user-facing group of resources.
pub struct ProgressPhase {
    label: String,
    expected: usize,
    matcher: ResourceMatcher,
}

impl ProgressPhase {
    /// Declare a phase expecting `expected` resources.
    ///
    /// An `expected` of zero is raised to one: the phase still waits for a
    /// single matching resource before it reports `Complete`.
    pub fn new<F>(label: impl Into<String>, expected: usize, matcher: F) -> Self
    where
        F: Fn(&ProvisioningEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            expected: expected.max(1),
            matcher: Box::new(matcher),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn matches(&self, event: &ProvisioningEvent) -> bool {
        (self.matcher)(event)
    }
}

impl std::fmt::Debug for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressPhase")
            .field("label", &self.label)
            .field("expected", &self.expected)
            .finish()
    }
}

/// Ordered phase declarations for one workflow.
#[derive(Debug, Default)]
pub struct PhaseTable {
    phases: Vec<ProgressPhase>,
}

impl PhaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: ProgressPhase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn phases(&self) -> &[ProgressPhase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Display status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// No matching event seen yet
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rendered progress row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRow {
    pub label: String,
    pub status: PhaseStatus,
    pub completed: usize,
    pub expected: usize,
    /// Reason of the first failure seen, if any
    pub reason: Option<String>,
}

impl std::fmt::Display for PhaseRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t[{}] {}/{}",
            self.label, self.status, self.completed, self.expected
        )?;
        if let Some(reason) = &self.reason {
            write!(f, " {}", reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PhaseProgress {
    started: bool,
    failed: bool,
    reason: Option<String>,
    completed: HashSet<String>,
}

/// Running counters for one phase table.
#[derive(Debug)]
pub struct EventCorrelator<'a> {
    table: &'a PhaseTable,
    progress: Vec<PhaseProgress>,
}

impl<'a> EventCorrelator<'a> {
    pub fn new(table: &'a PhaseTable) -> Self {
        let progress = table.phases().iter().map(|_| PhaseProgress::default()).collect();
        Self { table, progress }
    }

    /// Fold one event into the counters. Returns whether any row changed.
    pub fn observe(&mut self, event: &ProvisioningEvent) -> bool {
        let mut changed = false;
        let mut matched = false;

        for (phase, progress) in self.table.phases().iter().zip(self.progress.iter_mut()) {
            if !phase.matches(event) {
                continue;
            }
            matched = true;

            if progress.failed {
                continue;
            }
            if !progress.started {
                progress.started = true;
                changed = true;
            }
            match event.status {
                ResourceStatus::Complete => {
                    if progress.completed.len() < phase.expected()
                        && progress.completed.insert(event.logical_name.clone())
                    {
                        changed = true;
                    }
                }
                ResourceStatus::Failed => {
                    progress.failed = true;
                    progress.reason = event.status_reason.clone();
                    changed = true;
                }
                ResourceStatus::InProgress | ResourceStatus::Other => {}
            }
        }

        if !matched {
            trace!(
                "Ignoring event for {} ({})",
                event.logical_name, event.resource_type
            );
        }
        changed
    }

    /// Rows in declared phase order.
    pub fn rows(&self) -> Vec<PhaseRow> {
        self.table
            .phases()
            .iter()
            .zip(self.progress.iter())
            .map(|(phase, progress)| {
                let completed = progress.completed.len();
                let status = if progress.failed {
                    PhaseStatus::Failed
                } else if completed >= phase.expected() {
                    PhaseStatus::Complete
                } else if progress.started {
                    PhaseStatus::InProgress
                } else {
                    PhaseStatus::Pending
                };
                PhaseRow {
                    label: phase.label().to_string(),
                    status,
                    completed,
                    expected: phase.expected(),
                    reason: progress.reason.clone(),
                }
            })
            .collect()
    }

    /// Whether every phase reached its expected count.
    pub fn all_complete(&self) -> bool {
        self.rows().iter().all(|r| r.status == PhaseStatus::Complete)
    }
}

/// Final state of a correlated stream.
#[derive(Debug)]
pub struct Correlation {
    /// Rows as of the last event processed
    pub rows: Vec<PhaseRow>,
    /// Terminal result delivered by the watcher
    pub outcome: StackResult<StackOutputs>,
}

/// Drive an event stream to its terminal result.
///
/// `on_update` is called with the initial rows and again whenever an event
/// changes them. The function returns once the event channel is closed and
/// the terminal result has arrived. Queued events are always drained before
/// the result is read; an error result ends the loop at once, leaving the
/// rows as the events before it advanced them.
pub async fn correlate<F>(table: &PhaseTable, stream: EventStream, mut on_update: F) -> Correlation
where
    F: FnMut(&[PhaseRow]),
{
    let EventStream {
        stack_name,
        mut events,
        mut outcome,
    } = stream;

    let mut correlator = EventCorrelator::new(table);
    if !table.is_empty() {
        on_update(&correlator.rows());
    }

    let mut result: Option<StackResult<StackOutputs>> = None;
    let mut events_open = true;
    let mut observed = 0usize;

    while events_open || result.is_none() {
        tokio::select! {
            biased;
            received = events.recv(), if events_open => match received {
                Some(event) => {
                    observed += 1;
                    if correlator.observe(&event) {
                        on_update(&correlator.rows());
                    }
                }
                None => {
                    debug!("Event stream for {} closed after {} events", stack_name, observed);
                    events_open = false;
                }
            },
            delivered = &mut outcome, if result.is_none() => {
                let delivered = delivered.unwrap_or_else(|_| {
                    Err(StackError::WatcherDropped {
                        stack_name: stack_name.clone(),
                    })
                });
                let failed = delivered.is_err();
                result = Some(delivered);
                if failed {
                    debug!("Stack {} reported failure after {} events", stack_name, observed);
                    break;
                }
            }
        }
    }

    let outcome = match result {
        Some(outcome) => outcome,
        None => Err(StackError::WatcherDropped { stack_name }),
    };

    Correlation {
        rows: correlator.rows(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PhaseTable {
        PhaseTable::new()
            .phase(ProgressPhase::new("Network", 1, |e| e.resource_type == "AWS::EC2::VPC"))
            .phase(ProgressPhase::new("Subnets", 2, |e| e.resource_type == "AWS::EC2::Subnet"))
            .phase(ProgressPhase::new("Cluster", 1, |e| e.resource_type == "AWS::ECS::Cluster"))
    }

    fn statuses(rows: &[PhaseRow]) -> Vec<PhaseStatus> {
        rows.iter().map(|r| r.status).collect()
    }

    #[test]
    fn test_rows_start_pending_in_declared_order() {
        let table = table();
        let correlator = EventCorrelator::new(&table);
        let rows = correlator.rows();
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Network", "Subnets", "Cluster"]);
        assert!(rows.iter().all(|r| r.status == PhaseStatus::Pending));
    }

    #[test]
    fn test_later_phase_completes_first() {
        let table = table();
        let mut correlator = EventCorrelator::new(&table);

        correlator.observe(&ProvisioningEvent::complete("AWS::ECS::Cluster", "Cluster"));
        correlator.observe(&ProvisioningEvent::new(
            "AWS::EC2::Subnet",
            "PublicSubnet1",
            ResourceStatus::InProgress,
        ));

        assert_eq!(
            statuses(&correlator.rows()),
            vec![PhaseStatus::Pending, PhaseStatus::InProgress, PhaseStatus::Complete]
        );
    }

    #[test]
    fn test_duplicate_events_count_once() {
        let table = table();
        let mut correlator = EventCorrelator::new(&table);

        let subnet = ProvisioningEvent::complete("AWS::EC2::Subnet", "PublicSubnet1");
        assert!(correlator.observe(&subnet));
        assert!(!correlator.observe(&subnet));

        let rows = correlator.rows();
        assert_eq!(rows[1].completed, 1);
        assert_eq!(rows[1].status, PhaseStatus::InProgress);
    }

    #[test]
    fn test_counter_capped_at_expected() {
        let table = table();
        let mut correlator = EventCorrelator::new(&table);

        for i in 0..5 {
            correlator.observe(&ProvisioningEvent::complete("AWS::EC2::Subnet", format!("Subnet{i}")));
        }

        let rows = correlator.rows();
        assert_eq!(rows[1].completed, 2);
        assert_eq!(rows[1].status, PhaseStatus::Complete);
    }

    #[test]
    fn test_zero_expected_waits_for_one_resource() {
        let table = PhaseTable::new().phase(ProgressPhase::new("Cluster", 0, |e| {
            e.resource_type == "AWS::ECS::Cluster"
        }));
        assert_eq!(table.phases()[0].expected(), 1);

        let mut correlator = EventCorrelator::new(&table);
        assert!(!correlator.all_complete());
        assert_eq!(correlator.rows()[0].status, PhaseStatus::Pending);

        correlator.observe(&ProvisioningEvent::complete("AWS::ECS::Cluster", "Cluster"));
        assert!(correlator.all_complete());
    }

    #[test]
    fn test_unmatched_event_is_ignored() {
        let table = table();
        let mut correlator = EventCorrelator::new(&table);

        let changed = correlator.observe(&ProvisioningEvent::complete("AWS::S3::Bucket", "Logs"));

        assert!(!changed);
        assert!(correlator
            .rows()
            .iter()
            .all(|r| r.status == PhaseStatus::Pending && r.completed == 0));
    }

    #[test]
    fn test_failure_is_sticky_and_keeps_reason() {
        let table = table();
        let mut correlator = EventCorrelator::new(&table);

        correlator.observe(
            &ProvisioningEvent::new("AWS::EC2::VPC", "VPC", ResourceStatus::Failed)
                .with_reason("CIDR block conflicts"),
        );
        correlator.observe(&ProvisioningEvent::complete("AWS::EC2::VPC", "VPC"));

        let row = &correlator.rows()[0];
        assert_eq!(row.status, PhaseStatus::Failed);
        assert_eq!(row.completed, 0);
        assert_eq!(row.reason.as_deref(), Some("CIDR block conflicts"));
        assert!(row.to_string().contains("CIDR block conflicts"));
    }

    #[test]
    fn test_one_event_may_advance_several_phases() {
        let table = PhaseTable::new()
            .phase(ProgressPhase::new("Subnets", 1, |e| e.resource_type == "AWS::EC2::Subnet"))
            .phase(ProgressPhase::new("Public", 1, |e| e.logical_name.starts_with("Public")));
        let mut correlator = EventCorrelator::new(&table);

        correlator.observe(&ProvisioningEvent::complete("AWS::EC2::Subnet", "PublicSubnet1"));

        assert!(correlator.all_complete());
    }

    #[tokio::test]
    async fn test_correlate_until_success() {
        let table = table();
        let (sink, stream) = EventStream::channel("shop-test", 2);
        tokio::spawn(async move {
            sink.send(ProvisioningEvent::complete("AWS::EC2::Subnet", "Subnet2")).await;
            sink.send(ProvisioningEvent::complete("AWS::ECS::Cluster", "Cluster")).await;
            sink.send(ProvisioningEvent::complete("AWS::EC2::Subnet", "Subnet1")).await;
            sink.send(ProvisioningEvent::complete("AWS::EC2::VPC", "VPC")).await;
            sink.finish(Ok(StackOutputs::new("shop-test", "1", "us-west-2")));
        });

        let mut updates = 0;
        let correlation = correlate(&table, stream, |_| updates += 1).await;

        assert!(correlation.outcome.is_ok());
        assert_eq!(
            statuses(&correlation.rows),
            vec![PhaseStatus::Complete; 3]
        );
        // initial rows + one per changing event
        assert_eq!(updates, 5);
    }

    #[tokio::test]
    async fn test_correlate_surfaces_error_with_partial_rows() {
        let table = table();
        let (sink, stream) = EventStream::channel("shop-test", 8);
        sink.send(ProvisioningEvent::complete("AWS::EC2::VPC", "VPC")).await;
        sink.finish(Err(StackError::StreamFailed {
            stack_name: "shop-test".to_string(),
            reason: "ROLLBACK_COMPLETE".to_string(),
        }));

        let correlation = correlate(&table, stream, |_| {}).await;

        assert!(matches!(correlation.outcome, Err(StackError::StreamFailed { .. })));
        assert_eq!(
            statuses(&correlation.rows),
            vec![PhaseStatus::Complete, PhaseStatus::Pending, PhaseStatus::Pending]
        );
    }

    #[tokio::test]
    async fn test_correlate_reports_dropped_watcher() {
        let table = table();
        let (sink, stream) = EventStream::channel("shop-test", 1);
        drop(sink);

        let correlation = correlate(&table, stream, |_| {}).await;

        assert!(matches!(
            correlation.outcome,
            Err(StackError::WatcherDropped { ref stack_name }) if stack_name == "shop-test"
        ));
    }

    #[tokio::test]
    async fn test_correlate_with_empty_table() {
        let table = PhaseTable::new();
        let (sink, stream) = EventStream::channel("shop-test-frontend", 1);
        tokio::spawn(async move {
            sink.send(ProvisioningEvent::complete("AWS::ECS::Service", "Service")).await;
            sink.finish(Ok(StackOutputs::default()));
        });

        let mut updates = 0;
        let correlation = correlate(&table, stream, |_| updates += 1).await;

        assert!(correlation.outcome.is_ok());
        assert!(correlation.rows.is_empty());
        assert_eq!(updates, 0);
    }
}
