//! Conversion session: the state machine tying artifact, operation and result.
//!
//! ## Pure transitions
//!
//! All decision logic lives in [`transition`], a pure function from
//! `(state, event)` to `(new state, effect)`. It never performs I/O; the
//! [`Effect`] it returns describes what the caller must do next (start a
//! request, cancel one, release a result buffer). [`ConversionSession`] is the
//! thin driver that applies transitions and carries out those effects.
//!
//! ```text
//!            selectFiles            chooseOperation          submit
//!   Idle ───────────────▶ FileSelected ─────────────▶ OperationChosen ──────▶ Converting
//!    ▲                        │  ▲                                             │     │
//!    │                        └──┘ selectFiles (replaces)              success │     │ failure
//!    │                                                                         ▼     ▼
//!    └──────────────────────────── reset ──────────────────────────── Succeeded   Failed
//! ```
//!
//! ## One request per session
//!
//! Submitting while `Converting` is a no-op, so at most one request is ever
//! outstanding. Each submission gets a fresh request id; a settlement is
//! applied only if the session is still `Converting` that same id. Resetting
//! while `Converting` cancels the request's token, and any settlement that
//! still arrives afterwards is discarded.

use crate::acquisition::{self, AcquisitionLimits, InputArtifact, RawFile};
use crate::client::{ConversionRequest, ConversionResult, RemoteConversionClient};
use crate::config::ClientConfig;
use crate::error::{ConversionFailure, ConvertError};
use crate::presenter::{DownloadHandle, ResultPresenter};
use crate::progress::ObserverHandle;
use crate::registry::{CapabilityRegistry, Operation, ParameterKind, ParameterValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identifier of one submission within a session.
pub type RequestId = u64;

/// The six session phases, without their data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    FileSelected,
    OperationChosen,
    Converting,
    Succeeded,
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Idle => "idle",
            SessionPhase::FileSelected => "file selected",
            SessionPhase::OperationChosen => "operation chosen",
            SessionPhase::Converting => "converting",
            SessionPhase::Succeeded => "succeeded",
            SessionPhase::Failed => "failed",
        })
    }
}

/// Immutable snapshot of what was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: RequestId,
    pub operation: &'static Operation,
    pub artifacts: Vec<InputArtifact>,
    pub params: Vec<ParameterValue>,
    pub request: ConversionRequest,
}

/// Session state with the data each phase owns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    FileSelected {
        artifacts: Vec<InputArtifact>,
    },
    OperationChosen {
        artifacts: Vec<InputArtifact>,
        operation: &'static Operation,
        params: BTreeMap<String, String>,
    },
    Converting {
        submission: Arc<Submission>,
    },
    Succeeded {
        submission: Arc<Submission>,
        result: ConversionResult,
    },
    Failed {
        submission: Arc<Submission>,
        failure: ConversionFailure,
    },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::FileSelected { .. } => SessionPhase::FileSelected,
            SessionState::OperationChosen { .. } => SessionPhase::OperationChosen,
            SessionState::Converting { .. } => SessionPhase::Converting,
            SessionState::Succeeded { .. } => SessionPhase::Succeeded,
            SessionState::Failed { .. } => SessionPhase::Failed,
        }
    }

    /// The artifacts the session currently holds, if any.
    pub fn artifacts(&self) -> &[InputArtifact] {
        match self {
            SessionState::Idle => &[],
            SessionState::FileSelected { artifacts }
            | SessionState::OperationChosen { artifacts, .. } => artifacts,
            SessionState::Converting { submission }
            | SessionState::Succeeded { submission, .. }
            | SessionState::Failed { submission, .. } => &submission.artifacts,
        }
    }

    pub fn operation(&self) -> Option<&'static Operation> {
        match self {
            SessionState::OperationChosen { operation, .. } => Some(*operation),
            SessionState::Converting { submission }
            | SessionState::Succeeded { submission, .. }
            | SessionState::Failed { submission, .. } => Some(submission.operation),
            _ => None,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    SelectFiles(Vec<InputArtifact>),
    ChooseOperation(String),
    SetParameter(ParameterValue),
    Submit,
    Settle {
        request_id: RequestId,
        outcome: Result<ConversionResult, ConversionFailure>,
    },
    Reset,
}

impl Event {
    fn describe(&self) -> &'static str {
        match self {
            Event::SelectFiles(_) => "select files",
            Event::ChooseOperation(_) => "choose an operation",
            Event::SetParameter(_) => "set a parameter",
            Event::Submit => "submit",
            Event::Settle { .. } => "settle a request",
            Event::Reset => "reset",
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Send this submission's request.
    StartRequest(Arc<Submission>),
    /// Abort the in-flight request; its settlement must be ignored.
    CancelRequest(RequestId),
    /// The retained result buffer is no longer needed.
    ReleaseResult,
    /// A settlement arrived for a request nobody waits for.
    IgnoredSettlement(RequestId),
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub effect: Effect,
}

impl Transition {
    fn to(state: SessionState) -> Self {
        Self {
            state,
            effect: Effect::None,
        }
    }

    fn with(state: SessionState, effect: Effect) -> Self {
        Self { state, effect }
    }
}

/// Read-only environment of a transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub registry: &'a CapabilityRegistry,
    /// Set for tool sessions: the only operation the session may use.
    pub pinned: Option<&'static Operation>,
    /// Id assigned to the next submission.
    pub next_request_id: RequestId,
}

/// Compute the next state for `event`.
///
/// On `Err` the caller keeps its current state unchanged.
pub fn transition(
    state: &SessionState,
    ctx: &TransitionContext<'_>,
    event: Event,
) -> Result<Transition, ConvertError> {
    let illegal = |event: &Event| ConvertError::illegal_state(state.phase(), event.describe());

    match event {
        Event::SelectFiles(artifacts) => {
            validate_selection(&artifacts, ctx.pinned)?;
            match state {
                SessionState::Idle
                | SessionState::FileSelected { .. }
                | SessionState::OperationChosen { .. } => Ok(Transition::to(match ctx.pinned {
                    Some(op) => SessionState::OperationChosen {
                        artifacts,
                        operation: op,
                        params: default_params(op),
                    },
                    None => SessionState::FileSelected { artifacts },
                })),
                _ => Err(illegal(&Event::SelectFiles(Vec::new()))),
            }
        }

        Event::ChooseOperation(id) => match state {
            SessionState::FileSelected { artifacts }
            | SessionState::OperationChosen { artifacts, .. } => {
                let extension = artifacts
                    .first()
                    .map(|a| a.extension.as_str())
                    .unwrap_or_default();
                let operation = match ctx.pinned {
                    Some(op) => Some(op).filter(|op| op.id == id),
                    None => ctx
                        .registry
                        .lookup(extension)
                        .iter()
                        .copied()
                        .find(|op| op.id == id),
                };
                let operation = operation.ok_or_else(|| ConvertError::InvalidOperation {
                    operation: id.clone(),
                    extension: extension.to_string(),
                })?;
                Ok(Transition::to(SessionState::OperationChosen {
                    artifacts: artifacts.clone(),
                    operation,
                    params: default_params(operation),
                }))
            }
            _ => Err(illegal(&Event::ChooseOperation(id))),
        },

        Event::SetParameter(pv) => match state {
            SessionState::OperationChosen {
                artifacts,
                operation,
                params,
            } => {
                let spec = operation
                    .parameter(&pv.name)
                    .ok_or_else(|| ConvertError::UnknownParameter {
                        operation: operation.id.to_string(),
                        name: pv.name.clone(),
                    })?;
                // Hidden parameters are fixed by the operation's target format.
                if spec.kind == ParameterKind::Hidden {
                    return Err(ConvertError::InvalidParameterValue {
                        name: pv.name,
                        value: pv.value,
                        allowed: spec.default.unwrap_or_default().to_string(),
                    });
                }
                let mut params = params.clone();
                let value = pv.value.trim();
                if value.is_empty() {
                    params.remove(spec.name);
                } else if spec.allows(value) {
                    params.insert(spec.name.to_string(), value.to_string());
                } else {
                    return Err(ConvertError::InvalidParameterValue {
                        name: pv.name,
                        value: pv.value,
                        allowed: spec.allowed_values(),
                    });
                }
                Ok(Transition::to(SessionState::OperationChosen {
                    artifacts: artifacts.clone(),
                    operation: *operation,
                    params,
                }))
            }
            _ => Err(illegal(&Event::SetParameter(pv))),
        },

        Event::Submit => match state {
            SessionState::OperationChosen {
                artifacts,
                operation,
                params,
            } => {
                let params = ordered_params(operation, params)?;
                let request = ConversionRequest::build(operation, artifacts, &params)?;
                let submission = Arc::new(Submission {
                    id: ctx.next_request_id,
                    operation: *operation,
                    artifacts: artifacts.clone(),
                    params,
                    request,
                });
                Ok(Transition::with(
                    SessionState::Converting {
                        submission: Arc::clone(&submission),
                    },
                    Effect::StartRequest(submission),
                ))
            }
            // Re-entrant submit: the outstanding request stays the only one.
            SessionState::Converting { .. } => Ok(Transition::to(state.clone())),
            _ => Err(illegal(&Event::Submit)),
        },

        Event::Settle {
            request_id,
            outcome,
        } => match state {
            SessionState::Converting { submission } if submission.id == request_id => {
                let submission = Arc::clone(submission);
                match outcome {
                    Ok(result) => Ok(Transition::to(SessionState::Succeeded { submission, result })),
                    Err(ConversionFailure::Cancelled) => Ok(Transition::with(
                        state.clone(),
                        Effect::IgnoredSettlement(request_id),
                    )),
                    Err(failure) => Ok(Transition::to(SessionState::Failed { submission, failure })),
                }
            }
            _ => Ok(Transition::with(
                state.clone(),
                Effect::IgnoredSettlement(request_id),
            )),
        },

        Event::Reset => Ok(match state {
            SessionState::Converting { submission } => {
                Transition::with(SessionState::Idle, Effect::CancelRequest(submission.id))
            }
            SessionState::Succeeded { .. } => {
                Transition::with(SessionState::Idle, Effect::ReleaseResult)
            }
            _ => Transition::to(SessionState::Idle),
        }),
    }
}

fn validate_selection(
    artifacts: &[InputArtifact],
    pinned: Option<&'static Operation>,
) -> Result<(), ConvertError> {
    let max = pinned.map_or(1, |op| op.max_files);
    if artifacts.is_empty() {
        return Err(ConvertError::NoFilesSelected);
    }
    if artifacts.len() > max {
        return Err(ConvertError::TooManyFiles {
            count: artifacts.len(),
            max,
        });
    }
    if let Some(op) = pinned {
        if let Some(bad) = artifacts.iter().find(|a| !op.accepts(&a.extension)) {
            return Err(ConvertError::UnsupportedExtension {
                name: bad.name.clone(),
                extension: bad.extension.clone(),
                operation: op.id.to_string(),
            });
        }
    }
    Ok(())
}

fn default_params(op: &Operation) -> BTreeMap<String, String> {
    op.parameters
        .iter()
        .filter_map(|p| p.default.map(|d| (p.name.to_string(), d.to_string())))
        .collect()
}

/// Parameter values in schema order, failing on the first missing required one.
fn ordered_params(
    op: &Operation,
    values: &BTreeMap<String, String>,
) -> Result<Vec<ParameterValue>, ConvertError> {
    let mut out = Vec::with_capacity(op.parameters.len());
    for spec in op.parameters {
        match values.get(spec.name) {
            Some(v) => out.push(ParameterValue::new(spec.name, v.clone())),
            None if spec.required => {
                return Err(ConvertError::MissingParameter {
                    operation: op.id.to_string(),
                    name: spec.name.to_string(),
                })
            }
            None => {}
        }
    }
    Ok(out)
}

// ── Driver ───────────────────────────────────────────────────────────────

/// A request that has been started by [`ConversionSession::begin_submit`]
/// and must be run to completion, then fed back via
/// [`ConversionSession::settle`].
pub struct PendingRequest {
    submission: Arc<Submission>,
    cancel: CancellationToken,
    client: RemoteConversionClient,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.submission.id
    }

    pub fn request(&self) -> &ConversionRequest {
        &self.submission.request
    }

    /// Perform the network exchange.
    pub async fn run(self) -> Settlement {
        let outcome = self
            .client
            .send(&self.submission.request, &self.cancel)
            .await;
        Settlement {
            request_id: self.submission.id,
            outcome,
        }
    }
}

/// The resolution of a [`PendingRequest`].
#[derive(Debug, Clone)]
pub struct Settlement {
    pub request_id: RequestId,
    pub outcome: Result<ConversionResult, ConversionFailure>,
}

/// One user's conversion session.
pub struct ConversionSession {
    registry: &'static CapabilityRegistry,
    pinned: Option<&'static Operation>,
    state: SessionState,
    next_request_id: RequestId,
    in_flight: Option<(RequestId, CancellationToken)>,
    client: RemoteConversionClient,
    observer: Option<ObserverHandle>,
    max_file_bytes: Option<u64>,
}

impl ConversionSession {
    /// A choice-driven session over the built-in registry.
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let client = RemoteConversionClient::new(config)?;
        let mut session = Self::with_client(CapabilityRegistry::builtin(), client);
        session.observer = config.observer.clone();
        session.max_file_bytes = config.max_file_bytes;
        Ok(session)
    }

    /// A session pinned to one tool: selecting files chooses it directly.
    pub fn for_tool(config: &ClientConfig, operation_id: &str) -> Result<Self, ConvertError> {
        let mut session = Self::new(config)?;
        let op = session
            .registry
            .operation(operation_id)
            .ok_or_else(|| ConvertError::UnknownOperation(operation_id.to_string()))?;
        session.pinned = Some(op);
        Ok(session)
    }

    pub fn with_client(registry: &'static CapabilityRegistry, client: RemoteConversionClient) -> Self {
        Self {
            registry,
            pinned: None,
            state: SessionState::Idle,
            next_request_id: 1,
            in_flight: None,
            client,
            observer: None,
            max_file_bytes: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn pinned_operation(&self) -> Option<&'static Operation> {
        self.pinned
    }

    /// Operations the user may choose for the current selection.
    pub fn available_operations(&self) -> Vec<&'static Operation> {
        if let Some(op) = self.pinned {
            return vec![op];
        }
        match self.state.artifacts().first() {
            Some(a) => self.registry.lookup(&a.extension).to_vec(),
            None => Vec::new(),
        }
    }

    /// Whether a request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    fn apply(&mut self, event: Event) -> Result<Effect, ConvertError> {
        let ctx = TransitionContext {
            registry: self.registry,
            pinned: self.pinned,
            next_request_id: self.next_request_id,
        };
        let from = self.state.phase();
        let Transition { state, effect } = transition(&self.state, &ctx, event)?;
        self.state = state;
        let to = self.state.phase();

        if from != to {
            debug!("Session {} → {}", from, to);
            if let Some(ref o) = self.observer {
                o.on_state_change(from, to);
            }
        }

        match &effect {
            Effect::StartRequest(sub) => {
                self.next_request_id += 1;
                self.in_flight = Some((sub.id, CancellationToken::new()));
            }
            Effect::CancelRequest(id) => {
                if let Some((in_flight_id, token)) = self.in_flight.take() {
                    if in_flight_id == *id {
                        token.cancel();
                    }
                }
                debug!("Cancelled request {}", id);
            }
            Effect::IgnoredSettlement(id) => {
                warn!("Discarding stale settlement for request {}", id);
                if let Some(ref o) = self.observer {
                    o.on_stale_settlement(*id);
                }
            }
            Effect::ReleaseResult | Effect::None => {}
        }
        if !matches!(self.state, SessionState::Converting { .. }) {
            self.in_flight = None;
        }
        Ok(effect)
    }

    /// Validate raw files (Acquisition) and, if valid, select them.
    pub fn accept_files(&mut self, raw_files: Vec<RawFile>) -> Result<(), ConvertError> {
        let artifacts = match self.pinned {
            Some(op) => acquisition::accept_for(raw_files, op, self.max_file_bytes)?,
            None => acquisition::accept_with(
                raw_files,
                AcquisitionLimits::files(1).max_file_bytes(self.max_file_bytes),
            )?,
        };
        self.select_files(artifacts)
    }

    /// Replace the current selection.
    pub fn select_files(&mut self, artifacts: Vec<InputArtifact>) -> Result<(), ConvertError> {
        self.apply(Event::SelectFiles(artifacts)).map(|_| ())
    }

    /// Choose an operation offered for the selected file.
    pub fn choose_operation(&mut self, operation_id: &str) -> Result<&'static Operation, ConvertError> {
        self.apply(Event::ChooseOperation(operation_id.to_string()))?;
        self.state
            .operation()
            .ok_or_else(|| ConvertError::Internal("operation missing after choice".into()))
    }

    pub fn set_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConvertError> {
        self.apply(Event::SetParameter(ParameterValue::new(name, value)))
            .map(|_| ())
    }

    /// Enter `Converting` and hand back the request to run.
    ///
    /// Returns `Ok(None)` when a request is already outstanding.
    pub fn begin_submit(&mut self) -> Result<Option<PendingRequest>, ConvertError> {
        match self.apply(Event::Submit)? {
            Effect::StartRequest(submission) => {
                let cancel = self
                    .in_flight
                    .as_ref()
                    .map(|(_, t)| t.clone())
                    .unwrap_or_default();
                Ok(Some(PendingRequest {
                    submission,
                    cancel,
                    client: self.client.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Feed a settlement back. Returns `true` if it drove a transition.
    pub fn settle(&mut self, settlement: Settlement) -> bool {
        let event = Event::Settle {
            request_id: settlement.request_id,
            outcome: settlement.outcome,
        };
        match self.apply(event) {
            Ok(Effect::IgnoredSettlement(_)) | Err(_) => false,
            Ok(_) => true,
        }
    }

    /// Submit and wait for the outcome. The returned phase is `Succeeded` or
    /// `Failed`; refusals before any network call are returned as `Err`.
    pub async fn submit(&mut self) -> Result<SessionPhase, ConvertError> {
        if let Some(pending) = self.begin_submit()? {
            let settlement = pending.run().await;
            self.settle(settlement);
        }
        Ok(self.phase())
    }

    /// Return to `Idle`, cancelling or releasing whatever the session held.
    pub fn reset(&mut self) {
        // Reset is valid from every state.
        let _ = self.apply(Event::Reset);
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        match &self.state {
            SessionState::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ConversionFailure> {
        match &self.state {
            SessionState::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Message to show for a failed session.
    pub fn error_message(&self) -> Option<String> {
        self.failure().map(ConversionFailure::message)
    }

    /// Wrap the successful result as a downloadable handle.
    pub fn present(&self) -> Result<DownloadHandle, ConvertError> {
        match &self.state {
            SessionState::Succeeded { submission, result } => {
                ResultPresenter::present(result, &submission.artifacts)
            }
            other => Err(ConvertError::illegal_state(other.phase(), "download a result")),
        }
    }
}
