//! Single-slot print job controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Submitting -> Polling -> Ready | Failed | TimedOut -> Idle
//!              \            \
//!               +------------+--> Cancelled -> Idle
//! ```
//!
//! At most one job occupies the slot. A job leaves the slot only after its
//! terminal event is emitted; `Idle` always follows. When a cancellation has
//! to reach the print service, the slot stays occupied until the service has
//! answered, so a new print is refused in the meantime.
//!
//! ## Cancellation
//!
//! Cancelling while polling wins over any poll result still in flight: the
//! waiting task is signalled, `Cancelled` is emitted at once, and a result
//! that arrives afterwards is discarded because its [`JobToken`] no longer
//! owns the slot. Cancelling while submitting is deferred: the reference is
//! cancelled on the service as soon as the submission returns, and is never
//! polled.
//!
//! A `start_print` or `cancel_current_print` future dropped halfway (by a
//! timeout or a `select!`) frees the slot it held. A job abandoned while
//! polling is cancelled on the service from a detached task.

mod state;

pub use crate::client::PollingPolicy;
pub use state::{CancelOutcome, JobOutcome, JobState, JobToken, StateChange};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::client::{CancelAck, JobReference, PrintService, wait_for_download_url};
use crate::config::Config;
use crate::encoder::{BaseCustomizer, Customizer, EncoderOptions, MapSpecEncoder, MapView, PrintSpec};
use crate::error::{PrintError, Result};
use crate::extent::{PageSize, compute_extent_in, meters_per_unit};
use crate::observability::{Metrics, MetricsSnapshot};

/// What the user asked to print.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub view: MapView,
    pub page_size: PageSize,
    /// Scale denominator of the printed map
    pub scale: f64,
    pub dpi: u32,
}

impl PrintRequest {
    /// Print `view` at its own scale and dpi
    pub fn new(view: MapView, page_size: PageSize) -> Self {
        let scale = view.scale;
        let dpi = view.dpi;
        Self {
            view,
            page_size,
            scale,
            dpi,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub layout: String,
    pub format: String,
    pub policy: PollingPolicy,
    pub encoder: EncoderOptions,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            layout: "A4 portrait".to_string(),
            format: "pdf".to_string(),
            policy: PollingPolicy::default(),
            encoder: EncoderOptions::default(),
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.service.layout.clone(),
            format: config.service.format.clone(),
            policy: config.polling_policy(),
            encoder: EncoderOptions {
                position: config.print.position,
            },
        }
    }
}

enum Phase {
    Submitting,
    Polling(JobReference),
    /// Cancelled while submitting; the submitter tells the service and frees the slot
    CancelDeferred,
    /// Cancelled locally; the canceller frees the slot once the service answered
    Cancelling,
}

impl Phase {
    fn is_cancelled(&self) -> bool {
        matches!(self, Phase::CancelDeferred | Phase::Cancelling)
    }
}

struct ActiveJob {
    token: JobToken,
    phase: Phase,
    cancel: Option<oneshot::Sender<()>>,
}

struct Slot {
    next_token: u64,
    state: JobState,
    active: Option<ActiveJob>,
}

impl Slot {
    fn owned_by(&self, token: JobToken) -> Option<&ActiveJob> {
        self.active.as_ref().filter(|active| active.token == token)
    }
}

enum Role {
    Submitter,
    Canceller,
}

/// Frees the slot held by `token` when the future owning it is dropped
/// before it could do so itself. A no-op once the slot has moved on.
struct SlotGuard<'a> {
    controller: &'a PrintJobController,
    token: JobToken,
    role: Role,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        match self.role {
            Role::Submitter => self.controller.abandon(self.token),
            Role::Canceller => self.controller.release(self.token),
        }
    }
}

/// Decision taken once a submission has returned
enum AfterSubmit {
    Poll(JobReference),
    Abandon(Option<JobReference>),
    Fail(PrintError),
}

/// Drives print jobs through submit, poll and cancel against a [`PrintService`].
///
/// Every transition is sent as a [`StateChange`] on the channel returned by
/// [`PrintJobController::new`]. Share the controller behind an `Arc` to cancel
/// from another task while `start_print` is awaiting.
pub struct PrintJobController {
    service: Arc<dyn PrintService>,
    settings: ControllerSettings,
    encoder: MapSpecEncoder,
    customizer: Option<Arc<dyn Customizer>>,
    slot: Mutex<Slot>,
    events: mpsc::UnboundedSender<StateChange>,
    metrics: Arc<Metrics>,
}

impl PrintJobController {
    /// Create a controller and the receiving end of its state events
    pub fn new(
        service: Arc<dyn PrintService>,
        settings: ControllerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<StateChange>) {
        let (events, receiver) = mpsc::unbounded_channel();

        info!(
            layout = %settings.layout,
            format = %settings.format,
            interval_ms = settings.policy.interval.as_millis() as u64,
            timeout_ms = settings.policy.timeout.as_millis() as u64,
            "Creating print job controller"
        );

        let controller = Self {
            service,
            encoder: MapSpecEncoder::new(settings.encoder.clone()),
            settings,
            customizer: None,
            slot: Mutex::new(Slot {
                next_token: 0,
                state: JobState::Idle,
                active: None,
            }),
            events,
            metrics: Arc::new(Metrics::new()),
        };

        (controller, receiver)
    }

    /// Adjust layers of every job with `customizer`
    pub fn with_customizer(mut self, customizer: impl Customizer + 'static) -> Self {
        self.customizer = Some(Arc::new(customizer));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Last emitted state
    pub fn state(&self) -> JobState {
        self.lock().state.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run one print job to completion.
    ///
    /// Fails with [`PrintError::JobInProgress`] while another job holds the
    /// slot, and with the encoding error when the view cannot be turned into
    /// a print spec. Everything that happens after encoding (submission
    /// failures, server errors, deadline, cancellation) is reported as the
    /// returned [`JobOutcome`].
    pub async fn start_print(&self, request: PrintRequest) -> Result<JobOutcome> {
        let (token, mut cancelled) = self.reserve()?;
        let _guard = SlotGuard {
            controller: self,
            token,
            role: Role::Submitter,
        };

        let spec = match self.build_spec(&request) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(job = token.0, error = %e, "Print spec could not be built");
                self.conclude(token, JobOutcome::failed(&e));
                return Err(e);
            }
        };

        let submitted = self.service.submit(&spec).await;

        let next = {
            let mut slot = self.lock();
            let cancelling = match slot.owned_by(token) {
                Some(active) => active.phase.is_cancelled(),
                None => true,
            };

            match (submitted, cancelling) {
                (Ok(reference), true) => AfterSubmit::Abandon(Some(reference)),
                (Err(e), true) => {
                    debug!(job = token.0, error = %e, "Submission failed after cancellation");
                    AfterSubmit::Abandon(None)
                }
                (Ok(reference), false) => {
                    if let Some(active) = slot.active.as_mut() {
                        active.phase = Phase::Polling(reference.clone());
                    }
                    self.emit(
                        &mut slot,
                        token,
                        JobState::Polling {
                            reference: reference.clone(),
                        },
                    );
                    AfterSubmit::Poll(reference)
                }
                (Err(e), false) => AfterSubmit::Fail(e),
            }
        };

        let reference = match next {
            AfterSubmit::Poll(reference) => reference,
            AfterSubmit::Fail(e) => {
                warn!(job = token.0, error = %e, "Submission failed");
                return Ok(self.conclude(token, JobOutcome::failed(&e)));
            }
            AfterSubmit::Abandon(reference) => {
                if let Some(reference) = reference {
                    info!(job = token.0, job_ref = %reference.id, "Cancelling report submitted after cancellation");
                    let ack = self.service.cancel(&reference).await;
                    record_cancel(&self.metrics, reference, ack);
                }
                self.release(token);
                return Ok(JobOutcome::Cancelled);
            }
        };

        let waited = tokio::select! {
            biased;
            _ = &mut cancelled => None,
            result = wait_for_download_url(self.service.as_ref(), &reference, self.settings.policy) => Some(result),
        };

        let Some(result) = waited else {
            debug!(job = token.0, job_ref = %reference.id, "Stopped polling after cancellation");
            return Ok(JobOutcome::Cancelled);
        };

        let outcome = match result {
            Ok(url) => JobOutcome::Ready(url),
            Err(e) => {
                warn!(job = token.0, job_ref = %reference.id, error = %e, "Print did not complete");
                JobOutcome::from_error(&e)
            }
        };

        Ok(self.conclude(token, outcome))
    }

    /// Cancel the job in the slot.
    ///
    /// `Cancelled` is emitted before the print service is contacted. A
    /// refusal from the service does not undo the local cancellation; it is
    /// reported as [`CancelOutcome::Rejected`].
    pub async fn cancel_current_print(&self) -> Result<CancelOutcome> {
        let (token, reference) = {
            let mut slot = self.lock();
            let Some(active) = slot.active.as_mut() else {
                debug!("Cancel requested with no print in progress");
                return Err(PrintError::NoJobInProgress);
            };
            if active.phase.is_cancelled() {
                debug!(job = active.token.0, "Cancel requested twice");
                return Err(PrintError::NoJobInProgress);
            }

            let token = active.token;
            let next = match active.phase {
                Phase::Submitting => Phase::CancelDeferred,
                _ => Phase::Cancelling,
            };
            let reference = match std::mem::replace(&mut active.phase, next) {
                Phase::Polling(reference) => Some(reference),
                _ => None,
            };
            if let Some(signal) = active.cancel.take() {
                let _ = signal.send(());
            }

            self.metrics.job_cancelled();
            self.emit(&mut slot, token, JobState::Cancelled);
            (token, reference)
        };

        let Some(reference) = reference else {
            info!(job = token.0, "Cancellation deferred until submission returns");
            return Ok(CancelOutcome::Deferred);
        };

        let _guard = SlotGuard {
            controller: self,
            token,
            role: Role::Canceller,
        };

        info!(job = token.0, job_ref = %reference.id, "Cancelling report");
        let ack = self.service.cancel(&reference).await;
        let outcome = record_cancel(&self.metrics, reference, ack);
        self.release(token);

        Ok(outcome)
    }

    /// The print spec `start_print` would submit for `request`. Nothing is sent.
    pub fn build_spec(&self, request: &PrintRequest) -> Result<PrintSpec> {
        let mut view = request.view.clone();
        view.scale = request.scale;
        view.dpi = request.dpi;

        let extent = compute_extent_in(
            request.page_size,
            view.center,
            view.scale,
            meters_per_unit(&view.projection),
        )?;

        let map = match &self.customizer {
            Some(customizer) => self.encoder.encode_map(&view, &extent, customizer.as_ref())?,
            None => self
                .encoder
                .encode_map(&view, &extent, &BaseCustomizer::new(extent))?,
        };

        debug!(
            layers = map.layers.len(),
            scale = view.scale,
            dpi = view.dpi,
            "Print spec built"
        );

        Ok(PrintSpec::new(map, &self.settings.layout, &self.settings.format))
    }

    fn reserve(&self) -> Result<(JobToken, oneshot::Receiver<()>)> {
        let mut slot = self.lock();

        if let Some(active) = &slot.active {
            warn!(job = active.token.0, "Print requested while a job is in progress");
            self.metrics.print_rejected();
            return Err(PrintError::JobInProgress);
        }

        slot.next_token += 1;
        let token = JobToken(slot.next_token);
        let (signal, cancelled) = oneshot::channel();
        slot.active = Some(ActiveJob {
            token,
            phase: Phase::Submitting,
            cancel: Some(signal),
        });

        self.metrics.job_started();
        self.emit(&mut slot, token, JobState::Submitting);

        Ok((token, cancelled))
    }

    /// Emit the terminal event for `outcome` and free the slot, unless the
    /// job was cancelled or replaced meanwhile; then the result is dropped.
    fn conclude(&self, token: JobToken, outcome: JobOutcome) -> JobOutcome {
        let mut slot = self.lock();

        let owns = slot
            .owned_by(token)
            .is_some_and(|active| !active.phase.is_cancelled());
        if !owns {
            debug!(job = token.0, ?outcome, "Late result discarded");
            return JobOutcome::Cancelled;
        }

        slot.active = None;

        match &outcome {
            JobOutcome::Ready(_) => self.metrics.job_ready(),
            JobOutcome::Failed { .. } => self.metrics.job_failed(),
            JobOutcome::TimedOut => self.metrics.job_timed_out(),
            JobOutcome::Cancelled => self.metrics.job_cancelled(),
            JobOutcome::Pending => {}
        }

        if let Some(state) = outcome.to_state() {
            self.emit(&mut slot, token, state);
        }
        self.emit(&mut slot, token, JobState::Idle);

        outcome
    }

    /// Free the slot of a cancelled job
    fn release(&self, token: JobToken) {
        let mut slot = self.lock();
        if slot.owned_by(token).is_some() {
            slot.active = None;
            self.emit(&mut slot, token, JobState::Idle);
        }
    }

    /// Free the slot of a job whose `start_print` future was dropped.
    ///
    /// A job that was not cancelled yet gets its `Cancelled` event here. A job
    /// being cancelled by `cancel_current_print` is left to the canceller.
    fn abandon(&self, token: JobToken) {
        let mut slot = self.lock();

        let (announce, reference) = match slot.owned_by(token).map(|active| &active.phase) {
            None | Some(Phase::Cancelling) => return,
            Some(Phase::CancelDeferred) => (false, None),
            Some(Phase::Submitting) => (true, None),
            Some(Phase::Polling(reference)) => (true, Some(reference.clone())),
        };

        warn!(job = token.0, "Print abandoned before it finished");
        slot.active = None;
        if announce {
            self.metrics.job_cancelled();
            self.emit(&mut slot, token, JobState::Cancelled);
        }
        self.emit(&mut slot, token, JobState::Idle);
        drop(slot);

        if let Some(reference) = reference {
            self.cancel_detached(reference);
        }
    }

    /// Tell the service to drop `reference` without waiting for its answer
    fn cancel_detached(&self, reference: JobReference) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(job_ref = %reference.id, "No runtime left to cancel abandoned report");
            return;
        };

        let service = self.service.clone();
        let metrics = self.metrics.clone();
        runtime.spawn(async move {
            info!(job_ref = %reference.id, "Cancelling abandoned report");
            let ack = service.cancel(&reference).await;
            record_cancel(&metrics, reference, ack);
        });
    }

    /// Record and publish a transition. Called with the slot locked so events
    /// leave in transition order.
    fn emit(&self, slot: &mut Slot, job: JobToken, state: JobState) {
        match &state {
            JobState::Failed { code, .. } => {
                warn!(job = job.0, code = *code, "{}", state.message())
            }
            JobState::TimedOut => warn!(job = job.0, "{}", state.message()),
            _ => info!(job = job.0, "{}", state.message()),
        }

        slot.state = state.clone();
        let change = StateChange {
            job,
            state,
            at: OffsetDateTime::now_utc(),
        };
        if self.events.send(change).is_err() {
            trace!(job = job.0, "No state listener");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_cancel(metrics: &Metrics, reference: JobReference, ack: CancelAck) -> CancelOutcome {
    if ack.accepted {
        info!(job_ref = %reference.id, "Print service acknowledged cancellation");
        metrics.cancel_acknowledged();
        CancelOutcome::Acknowledged(reference)
    } else {
        warn!(
            job_ref = %reference.id,
            status = ?ack.status,
            "Print service did not acknowledge cancellation"
        );
        metrics.cancel_rejected();
        CancelOutcome::Rejected(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReportStatus;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl PrintService for Offline {
        async fn submit(&self, _spec: &PrintSpec) -> Result<JobReference> {
            Err(PrintError::Submission("offline".to_string()))
        }

        async fn poll(&self, _reference: &JobReference) -> Result<ReportStatus> {
            Ok(ReportStatus::pending())
        }

        async fn cancel(&self, _reference: &JobReference) -> CancelAck {
            CancelAck {
                accepted: true,
                status: Some(200),
            }
        }

        fn report_url(&self, reference: &JobReference) -> String {
            format!("https://print.test/report/{}", reference.id)
        }
    }

    fn reference() -> JobReference {
        JobReference {
            id: "R1".to_string(),
            status_url: "https://print.test/status/R1.json".to_string(),
            download_url: None,
        }
    }

    fn set_phase(controller: &PrintJobController, phase: Phase) {
        if let Some(active) = controller.lock().active.as_mut() {
            active.phase = phase;
        }
    }

    fn states(events: &mut mpsc::UnboundedReceiver<StateChange>) -> Vec<JobState> {
        let mut states = Vec::new();
        while let Ok(change) = events.try_recv() {
            states.push(change.state);
        }
        states
    }

    #[test]
    fn test_result_after_cancel_is_discarded() {
        let (controller, mut events) =
            PrintJobController::new(Arc::new(Offline), ControllerSettings::default());
        let (token, _cancelled) = controller.reserve().unwrap();
        set_phase(&controller, Phase::Polling(reference()));

        // a cancel took the slot after the wait returned
        set_phase(&controller, Phase::Cancelling);
        let outcome = controller.conclude(token, JobOutcome::Ready("https://x/late.pdf".into()));

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert!(controller.lock().owned_by(token).is_some());
        assert_eq!(states(&mut events), vec![JobState::Submitting]);
        assert_eq!(controller.metrics().jobs_ready, 0);

        controller.release(token);
        assert_eq!(controller.state(), JobState::Idle);

        // the slot has moved on; an older token concludes nothing
        let stale = controller.conclude(token, JobOutcome::TimedOut);
        assert_eq!(stale, JobOutcome::Cancelled);
        assert_eq!(states(&mut events), vec![JobState::Idle]);
        assert_eq!(controller.metrics().jobs_timed_out, 0);
    }

    #[test]
    fn test_abandon_leaves_cancelling_job_to_canceller() {
        let (controller, mut events) =
            PrintJobController::new(Arc::new(Offline), ControllerSettings::default());
        let (token, _cancelled) = controller.reserve().unwrap();

        set_phase(&controller, Phase::Cancelling);
        controller.abandon(token);
        assert!(controller.lock().owned_by(token).is_some());

        set_phase(&controller, Phase::CancelDeferred);
        controller.abandon(token);
        assert!(controller.lock().active.is_none());
        assert_eq!(
            states(&mut events),
            vec![JobState::Submitting, JobState::Idle]
        );
    }
}
