use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use eyre::WrapErr;
use launcher::{ProgramSettings, TracedProcess};
use transport::{
    Channel, CodecError, CorrelationId, DataRequest, DataResponse, EventKind, Request,
    RequestBody, Response, ResponseBody, StateNode,
};

use crate::status::Status;

/// A decoded response, or the failure that ended the channel
pub type Incoming = Result<Response, CodecError>;

/// Correlation id used when replaying breakpoints before run
const REPLAY_ID: CorrelationId = 0;

struct Connection {
    writer: Box<dyn Write + Send>,
    incoming: Receiver<Incoming>,
}

/// Decode responses on a background thread so callers can wait on a channel
fn spawn_reader(mut reader: impl Read + Send + 'static) -> eyre::Result<Receiver<Incoming>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("gldb-responses".to_string())
        .spawn(move || {
            loop {
                let incoming = Response::recv(&mut reader);
                let finished = incoming.is_err();
                if let Err(e) = &incoming {
                    tracing::debug!(error = %e, "response reader finished");
                }
                if tx.send(incoming).is_err() || finished {
                    break;
                }
            }
        })
        .wrap_err("spawning response reader")?;
    Ok(rx)
}

/// The client half of a debugging session
///
/// Mirrors the breakpoints so a freshly started program can be brought up to
/// date, tracks the program's status from the responses it sends, and caches
/// the state tree until the program next runs or stops.
pub struct Session {
    settings: ProgramSettings,
    status: Status,
    pid: Option<u64>,
    breakpoints: BTreeMap<String, bool>,
    break_events: [bool; EventKind::COUNT],
    connection: Option<Connection>,
    process: Option<TracedProcess>,
    /// `None` whenever the cached tree is stale
    state: Option<StateNode>,
    /// responses that arrived while waiting for a specific reply
    deferred: VecDeque<Response>,
    next_id: CorrelationId,
}

impl Session {
    pub fn new(settings: ProgramSettings) -> Self {
        Self {
            settings,
            status: Status::Dead,
            pid: None,
            breakpoints: BTreeMap::new(),
            break_events: [true; EventKind::COUNT],
            connection: None,
            process: None,
            state: None,
            deferred: VecDeque::new(),
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &ProgramSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ProgramSettings {
        &mut self.settings
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Process id reported by the traced program once it is running
    pub fn pid(&self) -> Option<u64> {
        self.pid
    }

    /// Move to `status`, dropping whatever the new status invalidates
    pub fn set_status(&mut self, status: Status) {
        // a dead session never keeps its connection, even if it was already dead
        if status == Status::Dead {
            self.connection = None;
            self.pid = None;
            self.state = None;
        }
        if self.status == status {
            return;
        }
        tracing::debug!(from = %self.status, to = %status, "session status changed");
        self.status = status;
        if matches!(status, Status::Running | Status::Stopped) {
            self.state = None;
        }
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = (&str, bool)> {
        self.breakpoints.iter().map(|(name, on)| (name.as_str(), *on))
    }

    pub fn breaks_on_event(&self, event: EventKind) -> bool {
        self.break_events[event.index()]
    }

    fn allocate_id(&mut self) -> CorrelationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn send(&mut self, id: CorrelationId, body: RequestBody) -> eyre::Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            eyre::bail!("no traced program");
        };
        tracing::debug!(id, code = body.code(), "sending request");
        if let Err(e) = Request::new(id, body).send(&mut connection.writer) {
            self.set_status(Status::Dead);
            return Err(e).wrap_err("sending request to traced program");
        }
        Ok(())
    }

    fn send_new(&mut self, body: RequestBody) -> eyre::Result<CorrelationId> {
        let id = self.allocate_id();
        self.send(id, body)?;
        Ok(id)
    }

    fn require(&self, allowed: bool, operation: &str) {
        assert!(allowed, "cannot {operation} while {}", self.status);
    }

    /// Record a call breakpoint, telling the program if there is one
    pub fn set_breakpoint(
        &mut self,
        function: &str,
        enabled: bool,
    ) -> eyre::Result<Option<CorrelationId>> {
        self.breakpoints.insert(function.to_string(), enabled);
        if self.status == Status::Dead {
            return Ok(None);
        }
        self.send_new(RequestBody::SetBreakpoint {
            function: function.to_string(),
            enabled,
        })
        .map(Some)
    }

    pub fn set_break_event(
        &mut self,
        event: EventKind,
        enabled: bool,
    ) -> eyre::Result<Option<CorrelationId>> {
        self.break_events[event.index()] = enabled;
        if self.status == Status::Dead {
            return Ok(None);
        }
        self.send_new(RequestBody::SetBreakEvent {
            event: event.code(),
            enabled,
        })
        .map(Some)
    }

    /// Launch the program from the session's settings and run it
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> eyre::Result<CorrelationId> {
        eyre::ensure!(
            self.status == Status::Dead,
            "the program is already {}",
            self.status
        );
        let launched = launcher::launch(&self.settings).wrap_err("starting traced program")?;
        self.run_on(launched.channel, launched.process)
    }

    /// Run a program already reachable through `channel`
    ///
    /// Replays every event flag and call breakpoint, then sends run.
    pub fn run_on<C: Channel>(
        &mut self,
        channel: C,
        process: Option<TracedProcess>,
    ) -> eyre::Result<CorrelationId> {
        eyre::ensure!(
            self.status == Status::Dead,
            "the program is already {}",
            self.status
        );
        let (reader, writer) = channel.split().wrap_err("splitting debugger channel")?;
        let incoming = spawn_reader(reader)?;
        self.connection = Some(Connection {
            writer: Box::new(writer),
            incoming,
        });
        self.process = process;
        self.deferred.clear();

        match self.start_program() {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(kill_error) = self.kill() {
                    tracing::debug!(error = %kill_error, "could not clean up after failed start");
                }
                Err(e)
            }
        }
    }

    /// Replay the breakpoint configuration and send run
    fn start_program(&mut self) -> eyre::Result<CorrelationId> {
        for event in EventKind::ALL {
            let enabled = self.break_events[event.index()];
            self.send(
                REPLAY_ID,
                RequestBody::SetBreakEvent {
                    event: event.code(),
                    enabled,
                },
            )?;
        }
        let breakpoints: Vec<(String, bool)> = self
            .breakpoints
            .iter()
            .map(|(name, on)| (name.clone(), *on))
            .collect();
        for (function, enabled) in breakpoints {
            self.send(REPLAY_ID, RequestBody::SetBreakpoint { function, enabled })?;
        }

        let id = self.send_new(RequestBody::Run)?;
        self.set_status(Status::Started);
        Ok(id)
    }

    pub fn send_continue(&mut self) -> eyre::Result<CorrelationId> {
        self.require(self.status == Status::Stopped, "continue");
        self.set_status(Status::Running);
        self.send_new(RequestBody::Continue)
    }

    pub fn send_step(&mut self) -> eyre::Result<CorrelationId> {
        self.require(self.status == Status::Stopped, "step");
        self.set_status(Status::Running);
        self.send_new(RequestBody::Step)
    }

    pub fn send_quit(&mut self) -> eyre::Result<CorrelationId> {
        self.require(self.status != Status::Dead, "quit");
        self.send_new(RequestBody::Quit)
    }

    pub fn send_async(&mut self) -> eyre::Result<CorrelationId> {
        self.require(
            !matches!(self.status, Status::Dead | Status::Stopped),
            "interrupt",
        );
        self.send_new(RequestBody::Async)
    }

    pub fn send_module(&mut self, name: &str, activate: bool) -> eyre::Result<CorrelationId> {
        self.require(self.status != Status::Dead, "toggle a module");
        let name = name.to_string();
        if activate {
            self.send_new(RequestBody::ActivateModule { name })
        } else {
            self.send_new(RequestBody::DeactivateModule { name })
        }
    }

    pub fn send_state_request(&mut self) -> eyre::Result<CorrelationId> {
        self.require(self.status != Status::Dead, "request state");
        self.send_new(RequestBody::StateTree)
    }

    pub fn send_data_request(&mut self, request: DataRequest) -> eyre::Result<CorrelationId> {
        self.require(self.status != Status::Dead, "request object data");
        self.send_new(RequestBody::Data(request))
    }

    /// Receiver to wait on alongside other sources, e.g. with `select!`
    ///
    /// Pass whatever it yields to [`handle`](Self::handle). Never fires while
    /// there is no program.
    pub fn incoming(&self) -> Receiver<Incoming> {
        match &self.connection {
            Some(connection) => connection.incoming.clone(),
            None => crossbeam_channel::never(),
        }
    }

    /// Responses held back while waiting for a particular reply
    pub fn take_deferred(&mut self) -> Vec<Response> {
        self.deferred.drain(..).collect()
    }

    /// Apply a response's effect on the session
    pub fn handle(&mut self, incoming: Incoming) -> eyre::Result<Response> {
        let response = match incoming {
            Ok(response) => response,
            Err(e) => {
                self.set_status(Status::Dead);
                return Err(e).wrap_err("lost connection to traced program");
            }
        };

        match &response.body {
            ResponseBody::Break { .. } | ResponseBody::BreakEvent { .. } => {
                self.set_status(Status::Stopped)
            }
            ResponseBody::Running { pid } => {
                self.pid = Some(*pid);
                self.set_status(Status::Running);
            }
            ResponseBody::StateTree(root) => self.state = Some(root.clone()),
            ResponseBody::Error { message, .. } => {
                tracing::debug!(id = response.id, %message, "error response");
            }
            ResponseBody::Ans { .. } | ResponseBody::Data(_) => {}
        }
        Ok(response)
    }

    /// Block until the next response, deferred ones first
    pub fn recv_response(&mut self) -> eyre::Result<Response> {
        if let Some(response) = self.deferred.pop_front() {
            return Ok(response);
        }
        let incoming = self.incoming().recv();
        self.handle_received(incoming.ok())
    }

    pub fn recv_response_timeout(&mut self, timeout: Duration) -> eyre::Result<Option<Response>> {
        if let Some(response) = self.deferred.pop_front() {
            return Ok(Some(response));
        }
        match self.incoming().recv_timeout(timeout) {
            Ok(incoming) => self.handle(incoming).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => self.handle_received(None).map(Some),
        }
    }

    fn handle_received(&mut self, incoming: Option<Incoming>) -> eyre::Result<Response> {
        match incoming {
            Some(incoming) => self.handle(incoming),
            None => {
                self.set_status(Status::Dead);
                eyre::bail!("no traced program")
            }
        }
    }

    /// Wait for the reply to `id`, deferring anything else that arrives
    fn await_reply(&mut self, id: CorrelationId) -> eyre::Result<Response> {
        loop {
            let incoming = self.incoming().recv();
            let response = self.handle_received(incoming.ok())?;
            if response.id == id && !response.body.is_halt() {
                if let ResponseBody::Error { message, .. } = response.body {
                    eyre::bail!("{message}");
                }
                return Ok(response);
            }
            tracing::debug!(id = response.id, "deferring response");
            self.deferred.push_back(response);
        }
    }

    /// The program's state tree, fetched when the cached copy is stale
    pub fn state_tree(&mut self) -> eyre::Result<&StateNode> {
        if self.state.is_none() {
            let id = self.send_state_request()?;
            self.await_reply(id)?;
        }
        self.state
            .as_ref()
            .ok_or_else(|| eyre::eyre!("state tree was invalidated while it was fetched"))
    }

    /// Whether a fresh tree is cached
    pub fn has_cached_state(&self) -> bool {
        self.state.is_some()
    }

    /// Fetch one object's contents and wait for them
    pub fn fetch_data(&mut self, request: DataRequest) -> eyre::Result<DataResponse> {
        let id = self.send_data_request(request)?;
        match self.await_reply(id)?.body {
            ResponseBody::Data(data) => Ok(data),
            other => eyre::bail!("unexpected reply to data request: {other:?}"),
        }
    }

    /// Stop the program: interrupt it if running, ask it to quit, then
    /// make sure the process is gone
    #[tracing::instrument(skip(self), fields(status = %self.status))]
    pub fn kill(&mut self) -> eyre::Result<()> {
        if self.status == Status::Running
            && let Err(e) = self.send_async()
        {
            tracing::debug!(error = %e, "could not interrupt traced program");
        }
        if self.status != Status::Dead
            && let Err(e) = self.send_quit()
        {
            tracing::debug!(error = %e, "could not ask traced program to quit");
        }
        self.set_status(Status::Dead);

        if let Some(mut process) = self.process.take() {
            process.terminate()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.status == Status::Dead && self.process.is_none() {
            return;
        }
        if let Err(e) = self.kill() {
            tracing::warn!(error = %e, "could not shut down traced program");
        }
    }
}
